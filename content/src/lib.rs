//! content publication to a permanent storage network.
//!
//! # architecture
//!
//! - **StorageGateway**: price, balance and bundle upload; `HttpGateway` speaks http via reqwest
//! - **ContentPublisher**: fee check, `image.png` upload, manifest linked to the image uri, uri from the manifest receipt
//!
//! # usage
//!
//! ```no_run
//! use crank_content::{ContentPublisher, GatewayConfig, HttpGateway};
//!
//! # async fn run() -> Result<(), crank_content::ContentError> {
//! let config = GatewayConfig::mainnet("https://upload.example", "wallet-address");
//! let publisher = ContentPublisher::new(HttpGateway::new(config)?);
//! let uri = publisher.publish(&[0x89, b'P', b'N', b'G'], b"{}").await?;
//! # let _ = uri;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod publisher;

pub use config::GatewayConfig;
pub use error::ContentError;
pub use gateway::{HttpGateway, StorageGateway, UploadFile, UploadReceipt};
pub use publisher::{
    image_link, link_image, manifest_id, receipt_id, upload_cost, ContentPublisher, IMAGE_FILE,
    MANIFEST_FILE,
};
