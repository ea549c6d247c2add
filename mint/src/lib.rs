//! mint side of the crank: which asset, which instructions, how to finalize.
//!
//! - **AssetLocator**: `<i>.png` / `<i>.json` pairs on disk, manifest rewriting
//! - **TransactionBuilder**: the atomic mint transaction (memos, mint, token account, metadata)
//! - **MetadataReconciler**: uri patch-back, one unit minted, master edition

pub mod assets;
pub mod builder;
pub mod programs;
pub mod reconciler;

pub use assets::{
    hex_sha256, AssetError, AssetLocator, AssetPair, AssetPayload, ContentDigests, Manifest,
    IMAGE_PLACEHOLDER,
};
pub use builder::{metadata_data, BuildError, MintPlan, TransactionBuilder, URI_PLACEHOLDER_LEN};
pub use programs::{associated_token_address, edition_address, metadata_address};
pub use reconciler::{
    finalize_instructions, FinalizationState, FinalizeTarget, MetadataReconciler, ReconcileError,
};
