//! mint crank core.
//!
//! wires the ledger, content and record crates into one cycle, runs it on
//! a schedule and exposes a manual trigger:
//! - **CrankCycle**: allocate, mint, publish, finalize, persist
//! - **Scheduler**: single-flight trigger plus the aligned timer loop
//! - **CrankConfig**: environment and command line settings
//!
//! # architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐
//! │  timer (tokio)  │     │ trigger server  │
//! └────────┬────────┘     └────────┬────────┘
//!          │                       │
//!          ▼                       ▼
//! ┌─────────────────────────────────────────┐
//! │     Scheduler (single flight guard)     │
//! └────────────────────┬────────────────────┘
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │ CrankCycle: ledger / content / records  │
//! └─────────────────────────────────────────┘
//! ```

pub mod config;
pub mod cycle;
pub mod error;
pub mod retry;
pub mod scheduler;

pub use config::{AssetConfig, ConfigError, CrankConfig, KeyPaths, ProgramConfig};
pub use cycle::{
    CrankCycle, CycleConfig, CycleOutcome, CycleReport, IdleReason, MASTER_EDITION_LEN,
    METADATA_ACCOUNT_LEN, SIGNATURE_FEE, TOKEN_ACCOUNT_LEN,
};
pub use error::{CycleError, CycleStep, StepFailure};
pub use retry::RetryPolicy;
pub use scheduler::{
    parse_utc_offset, CycleRunner, CycleSummary, FlightGuard, RunOutcome, Schedule, Scheduler,
    SchedulerState,
};
