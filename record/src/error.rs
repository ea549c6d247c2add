use std::path::PathBuf;

use solana_sdk::pubkey::Pubkey;

use crate::model::MintState;

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    #[error("a record for recipient {0} already exists")]
    Duplicate(Pubkey),
    #[error("record {0} not found")]
    NotFound(u64),
    #[error("illegal transition {from:?} -> {to:?}")]
    IllegalTransition { from: MintState, to: MintState },
    #[error("record file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("record file {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
