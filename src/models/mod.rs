pub mod target;
pub mod agent;
pub mod run_result;
pub mod event;

pub use target::*;
pub use agent::*;
pub use run_result::*;
pub use event::*;
