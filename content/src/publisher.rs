//! publish an asset's image + manifest and return the permanent uri.
//!
//! the image goes up first. its permanent uri is then written into the
//! manifest's `image` and first `properties.files` entry, and the linked
//! manifest goes up second. the manifest uri is the asset's content uri.

use serde_json::{json, Map, Value};

use crate::error::ContentError;
use crate::gateway::{StorageGateway, UploadFile, UploadReceipt};

pub const IMAGE_FILE: &str = "image.png";
pub const MANIFEST_FILE: &str = "manifest.json";

/// two transactions, each paying for tags and data.
const BASE_FEE_MULTIPLIER: u64 = 4;

/// winston needed to store `total_bytes` given the base and per-size fees.
#[inline]
pub fn upload_cost(base_fee: u64, size_fee: u64) -> u64 {
    base_fee
        .saturating_mul(BASE_FEE_MULTIPLIER)
        .saturating_add(size_fee)
}

/// transaction id of the `filename` entry.
pub fn receipt_id<'r>(receipts: &'r [UploadReceipt], filename: &str) -> Result<&'r str, ContentError> {
    let receipt = receipts
        .iter()
        .find(|r| r.filename == filename)
        .ok_or_else(|| ContentError::UploadFailed(format!("no {} receipt", filename)))?;
    let id = receipt.transaction_id.trim();
    if id.is_empty() {
        return Err(ContentError::UploadFailed(format!(
            "{} receipt has no transaction id (status {:?})",
            filename, receipt.status
        )));
    }
    Ok(id)
}

/// id of the manifest entry, which addresses the published asset.
pub fn manifest_id(receipts: &[UploadReceipt]) -> Result<&str, ContentError> {
    receipt_id(receipts, MANIFEST_FILE)
}

/// `<image uri>?ext=png`, the form wallets resolve as a png.
pub fn image_link(image_uri: &str) -> String {
    format!("{}?ext=png", image_uri)
}

fn parse_manifest(metadata: &[u8]) -> Result<Map<String, Value>, ContentError> {
    match serde_json::from_slice(metadata) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(ContentError::InvalidManifest("not a json object".to_string())),
        Err(e) => Err(ContentError::InvalidManifest(e.to_string())),
    }
}

/// point `image` and `properties.files[0]` at the published image.
/// other fields are kept as they are.
pub fn link_image(mut manifest: Map<String, Value>, image_link: &str) -> Result<Vec<u8>, ContentError> {
    let file = json!({ "uri": image_link, "type": "image/png" });
    manifest.insert("image".to_string(), Value::String(image_link.to_string()));

    let properties = manifest
        .entry("properties")
        .or_insert_with(|| Value::Object(Map::new()));
    let properties = properties
        .as_object_mut()
        .ok_or_else(|| ContentError::InvalidManifest("properties is not an object".to_string()))?;
    match properties.get_mut("files").and_then(Value::as_array_mut) {
        Some(files) if !files.is_empty() => files[0] = file,
        Some(files) => files.push(file),
        None => {
            properties.insert("files".to_string(), Value::Array(vec![file]));
        }
    }

    serde_json::to_vec(&manifest).map_err(|e| ContentError::InvalidManifest(e.to_string()))
}

pub struct ContentPublisher<G> {
    gateway: G,
}

impl<G: StorageGateway> ContentPublisher<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    #[inline]
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// fee for publishing `total_bytes`, fetched from the network.
    pub async fn estimate(&self, total_bytes: u64) -> Result<u64, ContentError> {
        let (base, size) = tokio::try_join!(self.gateway.price(0), self.gateway.price(total_bytes))?;
        Ok(upload_cost(base, size))
    }

    /// upload the image, then the manifest linked to it. nothing is sent when
    /// the wallet cannot cover the fee or the manifest is not a json object.
    pub async fn publish(&self, image: &[u8], metadata: &[u8]) -> Result<String, ContentError> {
        let manifest = parse_manifest(metadata)?;
        let total = (image.len() + metadata.len()) as u64;
        let (needed, available) = tokio::try_join!(self.estimate(total), self.gateway.balance())?;
        if available < needed {
            return Err(ContentError::InsufficientFunds { needed, available });
        }

        let receipts = self
            .gateway
            .upload(vec![UploadFile::new(IMAGE_FILE, "image/png", image.to_vec())])
            .await?;
        let image_uri = image_link(&self.gateway.content_uri(receipt_id(&receipts, IMAGE_FILE)?));
        tracing::debug!(%image_uri, "image published");

        let linked = link_image(manifest, &image_uri)?;
        let receipts = self
            .gateway
            .upload(vec![UploadFile::new(MANIFEST_FILE, "application/json", linked)])
            .await?;

        let uri = self.gateway.content_uri(manifest_id(&receipts)?);
        tracing::info!(bytes = total, cost = needed, %uri, "content published");
        Ok(uri)
    }
}
