//! asset lookup on the local images folder.
//!
//! asset `i` is the pair `<i>.png` + `<i>.json`. lookup is all-or-nothing.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// file name the image is published under.
pub const IMAGE_PLACEHOLDER: &str = "image.png";

#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("asset {index} not found: {path}")]
    NotFound { index: u64, path: PathBuf },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid manifest {path}: {reason}")]
    Manifest { path: PathBuf, reason: String },
}

impl AssetError {
    /// manifest content that cannot be parsed is data corruption, not a missing file.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, AssetError::Manifest { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetPair {
    pub index: u64,
    pub image_path: PathBuf,
    pub metadata_path: PathBuf,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestCreator {
    pub address: String,
    pub share: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFile {
    pub uri: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestProperties {
    #[serde(default)]
    pub creators: Vec<ManifestCreator>,
    #[serde(default)]
    pub files: Vec<ManifestFile>,
}

/// the fields of `<i>.json` the crank uses. unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub name: String,
    pub symbol: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, alias = "sellerFeeBasisPoints")]
    pub seller_fee_basis_points: u16,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub properties: ManifestProperties,
}

/// a loaded asset, metadata already rewritten.
#[derive(Debug, Clone)]
pub struct AssetPayload {
    pub index: u64,
    pub image: Vec<u8>,
    pub metadata: Vec<u8>,
    pub manifest: Manifest,
}

/// hex sha-256 of both payloads, carried as memos in the mint transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentDigests {
    pub image: String,
    pub metadata: String,
}

impl AssetPayload {
    pub fn digests(&self) -> ContentDigests {
        ContentDigests {
            image: hex_sha256(&self.image),
            metadata: hex_sha256(&self.metadata),
        }
    }

    /// total bytes to publish.
    #[inline]
    pub fn content_len(&self) -> usize {
        self.image.len() + self.metadata.len()
    }
}

pub fn hex_sha256(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// replace every quoted `<i>.png` reference with the published image name.
pub fn rewrite_image_refs(manifest: &str, index: u64) -> String {
    let local = format!("\"{}.png\"", index);
    manifest.replace(&local, &format!("\"{}\"", IMAGE_PLACEHOLDER))
}

/// maps asset indices onto the images folder.
#[derive(Debug, Clone)]
pub struct AssetLocator {
    root: PathBuf,
}

impl AssetLocator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[inline]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// pairs for `index..index + count`, or `NotFound` for the first missing file.
    pub fn locate(&self, index: u64, count: u64) -> Result<Vec<AssetPair>, AssetError> {
        (index..index.saturating_add(count))
            .map(|i| {
                let image_path = self.root.join(format!("{}.png", i));
                let metadata_path = self.root.join(format!("{}.json", i));
                for path in [&image_path, &metadata_path] {
                    if !path.is_file() {
                        return Err(AssetError::NotFound {
                            index: i,
                            path: path.clone(),
                        });
                    }
                }
                Ok(AssetPair {
                    index: i,
                    image_path,
                    metadata_path,
                })
            })
            .collect()
    }

    /// read both files and rewrite the manifest's image references.
    pub async fn load(&self, pair: &AssetPair) -> Result<AssetPayload, AssetError> {
        let image = read(&pair.image_path).await?;
        let raw = read(&pair.metadata_path).await?;

        let corrupt = |reason: String| AssetError::Manifest {
            path: pair.metadata_path.clone(),
            reason,
        };
        let text = String::from_utf8(raw).map_err(|e| corrupt(e.to_string()))?;
        let rewritten = rewrite_image_refs(&text, pair.index);
        let manifest: Manifest =
            serde_json::from_str(&rewritten).map_err(|e| corrupt(e.to_string()))?;

        tracing::debug!(
            index = pair.index,
            image_bytes = image.len(),
            name = %manifest.name,
            "asset loaded"
        );

        Ok(AssetPayload {
            index: pair.index,
            image,
            metadata: rewritten.into_bytes(),
            manifest,
        })
    }

    /// locate and load a single asset.
    pub async fn load_index(&self, index: u64) -> Result<AssetPayload, AssetError> {
        let pairs = self.locate(index, 1)?;
        match pairs.first() {
            Some(pair) => self.load(pair).await,
            None => Err(AssetError::NotFound {
                index,
                path: self.root.clone(),
            }),
        }
    }
}

async fn read(path: &Path) -> Result<Vec<u8>, AssetError> {
    tokio::fs::read(path).await.map_err(|source| AssetError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const MANIFEST: &str = r#"{
        "name": "Item #1",
        "symbol": "ITM",
        "description": "one item",
        "sellerFeeBasisPoints": 500,
        "image": "1.png",
        "properties": {
            "files": [{"uri": "1.png", "type": "image/png"}],
            "creators": [{"address": "11111111111111111111111111111111", "share": 100}]
        }
    }"#;

    fn folder(indices: &[u64]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for i in indices {
            fs::write(dir.path().join(format!("{}.png", i)), [0x89, b'P', b'N', b'G']).unwrap();
            fs::write(
                dir.path().join(format!("{}.json", i)),
                MANIFEST.replace("1.png", &format!("{}.png", i)),
            )
            .unwrap();
        }
        dir
    }

    #[test]
    fn test_locate_is_deterministic() {
        let dir = folder(&[0, 1, 2]);
        let locator = AssetLocator::new(dir.path());
        let pairs = locator.locate(1, 2).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].index, 1);
        assert_eq!(pairs[1].image_path, dir.path().join("2.png"));
        assert_eq!(pairs, locator.locate(1, 2).unwrap());
    }

    #[test]
    fn test_locate_all_or_nothing() {
        let dir = folder(&[0, 1]);
        fs::remove_file(dir.path().join("1.json")).unwrap();
        let locator = AssetLocator::new(dir.path());

        match locator.locate(0, 2) {
            Err(AssetError::NotFound { index, path }) => {
                assert_eq!(index, 1);
                assert!(path.ends_with("1.json"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(locator.locate(5, 1).is_err());
        assert!(locator.locate(0, 0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_load_rewrites_image_refs() {
        let dir = folder(&[7]);
        let locator = AssetLocator::new(dir.path());
        let payload = locator.load_index(7).await.unwrap();

        let text = String::from_utf8(payload.metadata.clone()).unwrap();
        assert!(!text.contains("7.png"));
        assert_eq!(text.matches("\"image.png\"").count(), 2);
        assert_eq!(payload.manifest.image.as_deref(), Some(IMAGE_PLACEHOLDER));
        assert_eq!(payload.manifest.seller_fee_basis_points, 500);
        assert_eq!(payload.manifest.properties.creators[0].share, 100);
    }

    #[tokio::test]
    async fn test_corrupt_manifest() {
        let dir = folder(&[0]);
        fs::write(dir.path().join("0.json"), "{not json").unwrap();
        let err = AssetLocator::new(dir.path()).load_index(0).await.unwrap_err();
        assert!(err.is_corrupt());
    }

    #[tokio::test]
    async fn test_non_utf8_manifest_is_corrupt() {
        let dir = folder(&[0]);
        let mut bytes = MANIFEST.replace("1.png", "0.png").into_bytes();
        bytes.insert(20, 0xff);
        fs::write(dir.path().join("0.json"), bytes).unwrap();

        let err = AssetLocator::new(dir.path()).load_index(0).await.unwrap_err();
        assert!(err.is_corrupt());
    }

    #[test]
    fn test_rewrite_leaves_other_names() {
        let text = r#"{"image":"17.png","other":"7.png"}"#;
        assert_eq!(
            rewrite_image_refs(text, 7),
            r#"{"image":"17.png","other":"image.png"}"#
        );
    }

    #[test]
    fn test_hex_digest() {
        assert_eq!(
            hex_sha256(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
