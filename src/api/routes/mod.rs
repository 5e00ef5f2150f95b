pub mod agents;
pub mod health;
pub mod history;
pub mod observability;
pub mod services;
