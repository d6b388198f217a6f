//! Shared building blocks for the residence management binaries

pub mod logging;

pub use logging::{default_filter_for, init_logging};
