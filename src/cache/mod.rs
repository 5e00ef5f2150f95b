pub mod result_cache;

pub use result_cache::{CacheConfig, CacheStats, CachedProbe, ResultCache};
