pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod parse;
pub mod transfer;
pub mod util;

pub use error::TransferError;
