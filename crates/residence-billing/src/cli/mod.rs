pub mod args;
pub mod commands;
pub mod handlers;
pub mod output;

pub use args::Args;
pub use commands::Commands;
