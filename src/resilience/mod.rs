pub mod breaker;
pub mod wrapper;

pub use breaker::{BreakerConfig, BreakerPermit, BreakerSnapshot, CircuitBreakerRegistry, CircuitState};
pub use wrapper::ResilientCaller;
