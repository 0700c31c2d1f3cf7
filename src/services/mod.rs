//! External service integrations

pub mod bangumi;
pub mod cache;
pub mod error;
pub mod override_source;
pub mod rate_limiter;
pub mod remapper;
pub mod tmdb;

pub use bangumi::BangumiClient;
pub use cache::ResponseCache;
pub use error::{SourceError, SourceResult};
pub use override_source::{FetchOutcome, OverrideSource, OVERRIDE_FILE_NAME};
pub use rate_limiter::{ApiService, RateLimitedClient, RetryConfig, retry_async};
pub use remapper::{EpisodeMeta, Remapper, correct_meta};
pub use tmdb::TmdbClient;
