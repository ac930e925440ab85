//! Database pool, schema and transaction helpers

pub mod init;
pub mod settings;
pub mod transaction;

pub use init::*;
pub use settings::*;
pub use transaction::{begin_monitored, MonitoredTransaction};
