//! operator-facing error taxonomy for one cycle.

use crank_content::ContentError;
use crank_ledger::{AllocationError, SubmitError};
use crank_mint::{AssetError, BuildError, ReconcileError};
use crank_record::RecordError;
use crank_traits::LedgerError;
use serde_json::json;

/// step of the cycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStep {
    AllocateSlot,
    BuildAndSubmitMint,
    ConfirmMint,
    PublishContent,
    ReconcileMetadata,
    PersistRecord,
}

impl CycleStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStep::AllocateSlot => "allocate_slot",
            CycleStep::BuildAndSubmitMint => "build_and_submit_mint",
            CycleStep::ConfirmMint => "confirm_mint",
            CycleStep::PublishContent => "publish_content",
            CycleStep::ReconcileMetadata => "reconcile_metadata",
            CycleStep::PersistRecord => "persist_record",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CycleError {
    #[error("ledger read failed: {0}")]
    LedgerReadFailed(String),
    #[error("sub-account {account_index} exhausted: {reason}")]
    AllocationExhausted { account_index: u32, reason: String },
    #[error("insufficient {unit}: need {needed}, have {available}")]
    InsufficientFunds {
        unit: &'static str,
        needed: u64,
        available: u64,
    },
    #[error("transaction {signature} not confirmed before the deadline")]
    TransactionTimedOut { signature: String },
    #[error("transaction {signature} rejected: {reason}")]
    TransactionRejected { signature: String, reason: String },
    #[error("asset not found: {0}")]
    AssetNotFound(String),
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("content upload failed: {0}")]
    ContentUploadFailed(String),
    #[error("record store write failed: {0}")]
    PersistenceFailure(String),
}

impl CycleError {
    /// only a confirmation timeout is worth another attempt inside a cycle.
    #[inline]
    pub fn retryable(&self) -> bool {
        matches!(self, CycleError::TransactionTimedOut { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            CycleError::LedgerReadFailed(_) => "LedgerReadFailed",
            CycleError::AllocationExhausted { .. } => "AllocationExhausted",
            CycleError::InsufficientFunds { .. } => "InsufficientFunds",
            CycleError::TransactionTimedOut { .. } => "TransactionTimedOut",
            CycleError::TransactionRejected { .. } => "TransactionRejected",
            CycleError::AssetNotFound(_) => "AssetNotFound",
            CycleError::SchemaMismatch(_) => "SchemaMismatch",
            CycleError::ContentUploadFailed(_) => "ContentUploadFailed",
            CycleError::PersistenceFailure(_) => "PersistenceFailure",
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({ "kind": self.kind(), "message": self.to_string() })
    }
}

impl From<LedgerError> for CycleError {
    fn from(e: LedgerError) -> Self {
        CycleError::LedgerReadFailed(e.to_string())
    }
}

impl From<AllocationError> for CycleError {
    fn from(e: AllocationError) -> Self {
        match e {
            AllocationError::Ledger(e) => e.into(),
            AllocationError::Codec(e) => CycleError::SchemaMismatch(e.to_string()),
            AllocationError::MissingAccount(key) => {
                CycleError::SchemaMismatch(format!("account {} does not exist", key))
            }
            AllocationError::RolloverAlreadyRequested => CycleError::AllocationExhausted {
                account_index: 0,
                reason: "rollover already requested for this read".to_string(),
            },
            AllocationError::NotExhausted { account_index } => CycleError::AllocationExhausted {
                account_index,
                reason: "rollover requested for a sub-account with room".to_string(),
            },
        }
    }
}

impl From<SubmitError> for CycleError {
    fn from(e: SubmitError) -> Self {
        match e {
            SubmitError::Ledger(e) => e.into(),
            SubmitError::Signing(reason) => CycleError::TransactionRejected {
                signature: String::new(),
                reason,
            },
            SubmitError::InsufficientFunds { needed, available } => {
                CycleError::InsufficientFunds {
                    unit: "lamports",
                    needed,
                    available,
                }
            }
        }
    }
}

impl From<AssetError> for CycleError {
    fn from(e: AssetError) -> Self {
        if e.is_corrupt() {
            CycleError::SchemaMismatch(e.to_string())
        } else {
            CycleError::AssetNotFound(e.to_string())
        }
    }
}

impl From<BuildError> for CycleError {
    fn from(e: BuildError) -> Self {
        CycleError::SchemaMismatch(e.to_string())
    }
}

impl From<ContentError> for CycleError {
    fn from(e: ContentError) -> Self {
        match e {
            ContentError::InsufficientFunds { needed, available } => {
                CycleError::InsufficientFunds {
                    unit: "winston",
                    needed,
                    available,
                }
            }
            other => CycleError::ContentUploadFailed(other.to_string()),
        }
    }
}

impl From<ReconcileError> for CycleError {
    fn from(e: ReconcileError) -> Self {
        match e {
            ReconcileError::Ledger(e) => e.into(),
            ReconcileError::Submit(e) => e.into(),
            ReconcileError::Codec(e) => CycleError::SchemaMismatch(e.to_string()),
            ReconcileError::MissingMetadata(key) => {
                CycleError::SchemaMismatch(format!("metadata account {} does not exist", key))
            }
        }
    }
}

impl From<RecordError> for CycleError {
    fn from(e: RecordError) -> Self {
        CycleError::PersistenceFailure(e.to_string())
    }
}

/// a cycle error tagged with the step that raised it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step: CycleStep,
    pub error: CycleError,
}

pub(crate) trait AtStep<T> {
    fn at(self, step: CycleStep) -> Result<T, StepFailure>;
}

impl<T, E: Into<CycleError>> AtStep<T> for Result<T, E> {
    #[inline]
    fn at(self, step: CycleStep) -> Result<T, StepFailure> {
        self.map_err(|e| StepFailure {
            step,
            error: e.into(),
        })
    }
}
