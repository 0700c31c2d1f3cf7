//! Season/episode remapping engine
//!
//! Providers sometimes collapse several in-universe seasons into one reported
//! season. This module rebuilds the logical seasons from curated or heuristic
//! boundary declarations and keeps a reverse map between provider-native and
//! logical coordinates.

pub mod cache;
pub mod dedup;
pub mod entry;
pub mod episode_map;
pub mod logic;
pub mod providers;
pub mod scope;
pub mod splitter;

pub use cache::{NativeLookup, NativeTarget, SeasonCache, DEFAULT_SEASON_CACHE_CAPACITY};
pub use dedup::{completeness_score, resolve_duplicate_episodes};
pub use entry::{IncludeEntry, SeasonEntry, SeriesEntry};
pub use episode_map::{EpisodeMap, MappingKey, Origin, OriginIdentity, OriginKind};
pub use logic::{LogicSeason, LogicSeries, OrgMap};
pub use providers::{
    EpisodeProgress, HeuristicSource, MediaType, OverrideLookup, ProviderEpisode, ProviderSeason,
    SeasonProvider, SeasonSummary, ShowInfo, SubjectHit, ANIMATION_GENRE_ID,
};
pub use scope::RecognitionScope;
pub use splitter::{build_logic_series, fetch_raw_seasons, fill_from_raw, materialize_includes, SeasonSplitter};
