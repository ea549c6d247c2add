//! storage network seam and its http implementation.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use crate::config::GatewayConfig;
use crate::error::ContentError;

/// one file of an upload bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(filename: &str, content_type: &str, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            bytes,
        }
    }
}

/// per-file result returned by the upload service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub filename: String,
    #[serde(default, alias = "success")]
    pub status: String,
    #[serde(rename = "transactionId", default)]
    pub transaction_id: String,
}

/// storage network operations the publisher needs. amounts are winston.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// fee for storing `bytes` bytes in one transaction.
    async fn price(&self, bytes: u64) -> Result<u64, ContentError>;

    /// balance of the paying wallet.
    async fn balance(&self) -> Result<u64, ContentError>;

    /// upload the bundle; one receipt per file.
    async fn upload(&self, files: Vec<UploadFile>) -> Result<Vec<UploadReceipt>, ContentError>;

    /// permanent uri for a stored transaction.
    fn content_uri(&self, transaction_id: &str) -> String;
}

#[async_trait]
impl<T: StorageGateway + ?Sized> StorageGateway for Arc<T> {
    async fn price(&self, bytes: u64) -> Result<u64, ContentError> {
        (**self).price(bytes).await
    }

    async fn balance(&self) -> Result<u64, ContentError> {
        (**self).balance().await
    }

    async fn upload(&self, files: Vec<UploadFile>) -> Result<Vec<UploadReceipt>, ContentError> {
        (**self).upload(files).await
    }

    fn content_uri(&self, transaction_id: &str) -> String {
        (**self).content_uri(transaction_id)
    }
}

/// gateway over the arweave http api plus an upload service.
pub struct HttpGateway {
    client: reqwest::Client,
    config: GatewayConfig,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, ContentError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    #[inline]
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    async fn get_number(&self, url: &str) -> Result<u64, ContentError> {
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_winston(&body)
    }
}

fn parse_winston(body: &str) -> Result<u64, ContentError> {
    body.trim()
        .parse()
        .map_err(|_| ContentError::InvalidResponse(format!("expected winston amount, got {:?}", body)))
}

#[async_trait]
impl StorageGateway for HttpGateway {
    async fn price(&self, bytes: u64) -> Result<u64, ContentError> {
        let url = format!("{}/price/{}", self.config.gateway_url, bytes);
        self.get_number(&url).await
    }

    async fn balance(&self) -> Result<u64, ContentError> {
        let url = format!(
            "{}/wallet/{}/balance",
            self.config.gateway_url, self.config.wallet_address
        );
        self.get_number(&url).await
    }

    async fn upload(&self, files: Vec<UploadFile>) -> Result<Vec<UploadReceipt>, ContentError> {
        let mut form = Form::new();
        for file in files {
            let part = Part::bytes(file.bytes)
                .file_name(file.filename)
                .mime_str(&file.content_type)?;
            form = form.part("file[]", part);
        }

        let receipts = self
            .client
            .post(&self.config.upload_url)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<UploadReceipt>>()
            .await?;

        tracing::debug!(files = receipts.len(), "upload accepted");
        Ok(receipts)
    }

    fn content_uri(&self, transaction_id: &str) -> String {
        self.config.content_uri(transaction_id)
    }
}
