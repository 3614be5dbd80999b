pub mod response_cache;

pub use response_cache::{CacheKey, Clock, ResponseCache, SystemClock, DEFAULT_TTL};
