//! local record of every mint attempt.
//!
//! one record per recipient, never deleted. the state machine lives on
//! [`MintRecord`]; stores only persist what they are given.

pub mod error;
pub mod model;
pub mod store;

pub use error::RecordError;
pub use model::{MintRecord, MintState};
pub use store::{JsonFileRecordStore, MemoryRecordStore, RecordStore};
