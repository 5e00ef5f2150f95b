pub mod commands;
pub mod history;
pub mod run;
pub mod serve;
pub mod status;
pub mod validate;

pub use commands::{Cli, Commands};
