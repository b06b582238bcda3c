//! Table lifecycle operations.
//!
//! This module provides:
//! - `create` - Build create-table parameters from a schema
//! - `wait` - Describe, create if missing, and poll until the table is active

mod create;
mod wait;

pub use create::create_table_params;
pub use wait::{DEFAULT_POLL_INTERVAL, wait_for_table_active};
