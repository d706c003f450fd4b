//! Instance lifecycle state.

pub mod state;

pub use state::{InstanceStatus, reconciled_status};
