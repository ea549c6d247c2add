//! ledger side of the mint crank.
//!
//! # architecture
//!
//! - **RpcLedger**: `LedgerClient` over json-rpc with websocket signature notifications
//! - **SlotAllocator**: reads the router + vault index and picks the next recipient
//! - **TransactionSubmitter**: sign, broadcast, rebroadcast, confirm or classify
//! - **load_keypair**: key file decoding at startup
//!
//! # usage
//!
//! ```no_run
//! use crank_ledger::{Config, RpcLedger, SubmitterConfig, TransactionSubmitter};
//! use std::sync::Arc;
//!
//! let config = Config::devnet();
//! let ledger = Arc::new(RpcLedger::new(&config));
//! let submitter = TransactionSubmitter::new(ledger, SubmitterConfig::from(&config));
//! ```

pub mod allocator;
pub mod config;
pub mod keypair;
pub mod rpc;
pub mod submitter;

pub use allocator::{
    asset_ordinal, rollover_instruction, Allocation, AllocationError, AllocatorConfig, Recipient,
    RouterSnapshot, SlotAllocator, SUB_ACCOUNT_CAPACITY,
};
pub use config::Config;
pub use keypair::{load_keypair, KeyError};
pub use rpc::RpcLedger;
pub use submitter::{
    Confirmation, PendingTransaction, SubmitError, SubmitterConfig, TransactionSubmitter,
};

// re-export trait for convenience.
pub use crank_traits::LedgerClient;
