//! Resume capability for partitions
//!
//! Provides persistent checkpoint state with atomic writes and file locking.

pub mod lock;
pub mod state;

pub use lock::PartitionLock;
pub use state::{CheckpointState, ResumeError, MAX_STATE_FILE_SIZE, SCHEMA_VERSION};
