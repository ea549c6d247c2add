//! shared traits for crank_* crates.
//!
//! - [`LedgerClient`]: everything the crank asks of the ledger
//! - [`CycleTrigger`]: what the trigger server may ask of the scheduler
use async_trait::async_trait;
use solana_sdk::hash::Hash;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::Transaction;
use thiserror::Error;

pub mod memory;

/// where a broadcast transaction stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureStatus {
    /// not seen, or seen but not yet confirmed.
    Pending,
    Confirmed,
    /// landed with an execution error.
    Failed(String),
}

impl SignatureStatus {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SignatureStatus::Pending)
    }
}

/// result of a non-mutating simulation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationOutcome {
    pub err: Option<String>,
    pub logs: Vec<String>,
}

impl SimulationOutcome {
    /// last `Program log: ` line, prefix stripped.
    pub fn last_program_log(&self) -> Option<&str> {
        self.logs
            .iter()
            .rev()
            .find_map(|line| line.strip_prefix("Program log: "))
    }
}

/// ledger client errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("subscription error: {0}")]
    Subscription(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// ledger access - everything the crank reads from or sends to the chain.
///
/// reads are commitment `confirmed`. sends skip preflight; callers run
/// [`LedgerClient::simulate`] themselves when they need a diagnosis.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// raw account data, `None` if the account does not exist.
    async fn get_account_data(&self, key: &Pubkey) -> Result<Option<Vec<u8>>, LedgerError>;

    async fn latest_blockhash(&self) -> Result<Hash, LedgerError>;

    /// broadcast a signed transaction. re-sending the same transaction is allowed.
    async fn send_transaction(&self, tx: &Transaction) -> Result<Signature, LedgerError>;

    async fn signature_status(&self, signature: &Signature) -> Result<SignatureStatus, LedgerError>;

    /// resolves once the ledger pushes a status for `signature`.
    ///
    /// default implementation never resolves; clients without a push channel
    /// rely on polling.
    async fn wait_signature_event(
        &self,
        signature: &Signature,
    ) -> Result<SignatureStatus, LedgerError> {
        let _ = signature;
        futures::future::pending().await
    }

    async fn simulate(&self, tx: &Transaction) -> Result<SimulationOutcome, LedgerError>;

    async fn minimum_balance_for_rent_exemption(&self, len: usize) -> Result<u64, LedgerError>;

    async fn balance(&self, key: &Pubkey) -> Result<u64, LedgerError>;
}

/// blanket impl for Arc<T> - just forwards.
#[async_trait]
impl<T: LedgerClient + ?Sized> LedgerClient for std::sync::Arc<T> {
    #[inline]
    async fn get_account_data(&self, key: &Pubkey) -> Result<Option<Vec<u8>>, LedgerError> {
        (**self).get_account_data(key).await
    }

    #[inline]
    async fn latest_blockhash(&self) -> Result<Hash, LedgerError> {
        (**self).latest_blockhash().await
    }

    #[inline]
    async fn send_transaction(&self, tx: &Transaction) -> Result<Signature, LedgerError> {
        (**self).send_transaction(tx).await
    }

    #[inline]
    async fn signature_status(&self, signature: &Signature) -> Result<SignatureStatus, LedgerError> {
        (**self).signature_status(signature).await
    }

    #[inline]
    async fn wait_signature_event(
        &self,
        signature: &Signature,
    ) -> Result<SignatureStatus, LedgerError> {
        (**self).wait_signature_event(signature).await
    }

    #[inline]
    async fn simulate(&self, tx: &Transaction) -> Result<SimulationOutcome, LedgerError> {
        (**self).simulate(tx).await
    }

    #[inline]
    async fn minimum_balance_for_rent_exemption(&self, len: usize) -> Result<u64, LedgerError> {
        (**self).minimum_balance_for_rent_exemption(len).await
    }

    #[inline]
    async fn balance(&self, key: &Pubkey) -> Result<u64, LedgerError> {
        (**self).balance(key).await
    }
}

/// result of a manual trigger.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    /// the cycle ran; json report.
    Ran(serde_json::Value),
    /// a cycle was already in flight.
    Skipped,
}

/// handle the trigger server uses to drive the crank.
#[async_trait]
pub trait CycleTrigger: Send + Sync {
    /// run one cycle unless one is in flight.
    async fn trigger(&self) -> TriggerOutcome;

    /// scheduler state as json.
    fn status(&self) -> serde_json::Value;
}

#[async_trait]
impl<T: CycleTrigger + ?Sized> CycleTrigger for std::sync::Arc<T> {
    async fn trigger(&self) -> TriggerOutcome {
        (**self).trigger().await
    }

    fn status(&self) -> serde_json::Value {
        (**self).status()
    }
}
