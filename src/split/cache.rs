//! Bounded cache of rebuilt series
//!
//! One [`LogicSeries`] per provider id, least-recently-used eviction. The
//! cache is owned by the remapper and injected into it, so tests and
//! embedders can hold their own instance.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use super::episode_map::{MappingKey, Origin, OriginIdentity};
use super::logic::{LogicSeason, LogicSeries, OrgMap};
use super::providers::SeasonSummary;

pub const DEFAULT_SEASON_CACHE_CAPACITY: usize = 100;

/// Native coordinates a logical request resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NativeTarget {
    #[serde(rename = "tv")]
    Season { season: u32, episode: Option<u32> },
    Movie { tmdb_id: u32 },
}

/// Result of [`SeasonCache::org_season_episode`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NativeLookup {
    pub target: NativeTarget,
    /// Summary of the logical season, when one is cached
    pub summary: Option<SeasonSummary>,
}

#[derive(Default)]
struct LruState {
    entries: HashMap<u32, Arc<LogicSeries>>,
    recency: VecDeque<u32>,
}

impl LruState {
    fn touch(&mut self, key: u32) {
        if let Some(pos) = self.recency.iter().position(|k| *k == key) {
            self.recency.remove(pos);
        }
        self.recency.push_back(key);
    }
}

pub struct SeasonCache {
    state: Mutex<LruState>,
    capacity: usize,
    use_cont_eps: bool,
}

impl SeasonCache {
    pub fn new(capacity: usize, use_cont_eps: bool) -> Self {
        Self {
            state: Mutex::new(LruState::default()),
            capacity: capacity.max(1),
            use_cont_eps,
        }
    }

    pub fn use_cont_eps(&self) -> bool {
        self.use_cont_eps
    }

    /// Store a series, replacing any previous one for the id
    pub fn put(&self, tmdb_id: u32, series: LogicSeries) -> Arc<LogicSeries> {
        let series = Arc::new(series);
        let mut state = self.state.lock();
        state.entries.insert(tmdb_id, series.clone());
        state.touch(tmdb_id);

        while state.entries.len() > self.capacity {
            let Some(oldest) = state.recency.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
            debug!(tmdb_id = oldest, "Evicted logical series");
        }
        series
    }

    pub fn get(&self, tmdb_id: u32) -> Option<Arc<LogicSeries>> {
        let mut state = self.state.lock();
        let series = state.entries.get(&tmdb_id).cloned()?;
        state.touch(tmdb_id);
        Some(series)
    }

    fn logic_season(&self, tmdb_id: u32, season: u32) -> Option<LogicSeason> {
        self.get(tmdb_id)?.season_info(season).cloned()
    }

    pub fn season_info(&self, tmdb_id: u32, season: u32) -> Option<SeasonSummary> {
        self.logic_season(tmdb_id, season).map(|s| s.summary())
    }

    /// Translate a logical season/episode back to native coordinates.
    ///
    /// Logical coordinates are matched before native ones. Without an episode
    /// the request resolves to the native season of the logical season's first
    /// tv entry. Requests for seasons that are not cached come back unchanged.
    pub fn org_season_episode(&self, tmdb_id: u32, season: u32, episode: Option<u32>) -> NativeLookup {
        let unchanged = NativeTarget::Season { season, episode };
        let Some(logic) = self.logic_season(tmdb_id, season) else {
            return NativeLookup {
                target: unchanged,
                summary: None,
            };
        };

        let target = match episode {
            Some(episode) => {
                let map = logic.org_map(self.use_cont_eps);
                let requested = MappingKey::episode(season, episode);
                map.iter()
                    .find(|(_, logical)| **logical == (season, episode))
                    .or_else(|| map.iter().find(|(key, _)| **key == requested))
                    .map(|(key, _)| native_target(*key))
                    .unwrap_or(unchanged)
            }
            None => logic
                .episodes_map
                .values()
                .find_map(|map| match map.origin {
                    Origin::Tv { season_number, .. } => Some(NativeTarget::Season {
                        season: season_number,
                        episode: None,
                    }),
                    Origin::Movie { .. } => None,
                })
                .unwrap_or(unchanged),
        };

        NativeLookup {
            target,
            summary: Some(logic.summary()),
        }
    }

    /// Reverse map of one logical season
    pub fn org_to_logic(&self, tmdb_id: u32, season: u32) -> Option<OrgMap> {
        self.logic_season(tmdb_id, season)
            .map(|s| s.org_map(self.use_cont_eps))
    }

    /// Reverse map of the whole series
    pub fn org_map(&self, tmdb_id: u32) -> Option<OrgMap> {
        self.get(tmdb_id).map(|s| s.org_map(self.use_cont_eps))
    }

    /// Provider records needed to assemble one logical season
    pub fn unique_seasons(&self, tmdb_id: u32, season: u32) -> Vec<OriginIdentity> {
        self.logic_season(tmdb_id, season)
            .map(|s| s.unique_entry())
            .unwrap_or_default()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.recency.clear();
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SeasonCache {
    fn default() -> Self {
        Self::new(DEFAULT_SEASON_CACHE_CAPACITY, false)
    }
}

fn native_target(key: MappingKey) -> NativeTarget {
    match key {
        MappingKey::Episode { season, episode } => NativeTarget::Season {
            season,
            episode: Some(episode),
        },
        MappingKey::Movie(tmdb_id) => NativeTarget::Movie { tmdb_id },
    }
}
