pub mod cli;
pub mod config;
pub mod domain;
pub mod error;
pub mod storage;

pub use config::BillingConfig;
pub use domain::rate_table::{calculate_fee, validate_ascending};
pub use error::{BillingError, Result};
