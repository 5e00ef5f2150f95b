pub mod service;
pub mod client;
pub mod arr;

pub use service::TargetService;
pub use client::{ArrHttpClient, SourceHttpClient};
pub use arr::{ArrService, ServiceKind};
