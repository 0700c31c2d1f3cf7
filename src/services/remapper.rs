//! Recognition hooks that serve logical seasons in place of provider ones
//!
//! The remapper sits in front of the upstream provider. Calls made from
//! outside the engine get the rebuilt logical structure when one is known for
//! the title; calls made from inside the engine (nested scope), and titles the
//! engine knows nothing about, go straight to the upstream provider.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::split::{
    LogicSeries, MappingKey, MediaType, OrgMap, OriginIdentity, ProviderEpisode, ProviderSeason,
    RecognitionScope, SeasonCache, SeasonProvider, SeasonSplitter, SeasonSummary, ShowInfo,
};

/// Season/episode range parsed from a file or torrent name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeMeta {
    pub begin_season: Option<u32>,
    pub end_season: Option<u32>,
    pub begin_episode: Option<u32>,
    pub end_episode: Option<u32>,
}

/// Translate a parsed episode range from native to logical coordinates.
///
/// A missing begin season means season 1, a missing end season means the
/// begin season. Returns whether anything changed.
pub fn correct_meta(meta: &mut EpisodeMeta, org_map: &OrgMap) -> bool {
    if org_map.is_empty() {
        return false;
    }

    let begin_season = meta.begin_season.unwrap_or(1);
    let mut corrected = false;

    if let Some(episode) = meta.begin_episode
        && let Some(&(season, logical)) = org_map.get(&MappingKey::episode(begin_season, episode))
    {
        meta.begin_season = Some(season);
        meta.begin_episode = Some(logical);
        corrected = true;
    }

    let end_season = meta.end_season.unwrap_or(begin_season);
    if let Some(episode) = meta.end_episode
        && let Some(&(season, logical)) = org_map.get(&MappingKey::episode(end_season, episode))
    {
        meta.end_season = meta.end_season.map(|_| season);
        meta.end_episode = Some(logical);
        corrected = true;
    }

    if corrected {
        info!(meta = ?meta, "Episode range adjusted to logical seasons");
    }
    corrected
}

/// Rewrite show-level season data with the logical structure
fn apply_logic(show: &mut ShowInfo, logic: &LogicSeries, use_cont_eps: bool) {
    let season_info = logic.seasons_info();
    let seasons = logic.seasons_eps(use_cont_eps);
    let season_years: BTreeMap<u32, String> = season_info
        .iter()
        .filter_map(|s| s.year().map(|y| (s.season_number, y)))
        .collect();

    if !seasons.is_empty() {
        show.number_of_seasons = u32::try_from(seasons.len()).unwrap_or(u32::MAX);
        show.seasons = seasons;
    }
    if !season_years.is_empty() {
        show.season_years = season_years;
    }
    if let Some(name) = logic.name.as_deref().filter(|n| !n.is_empty())
        && show.title != name
    {
        info!(tmdb_id = show.tmdb_id, from = %show.title, to = %name, "Title adjusted");
        show.title = name.to_string();
    }
    show.season_info = season_info;
}

pub struct Remapper {
    upstream: Arc<dyn SeasonProvider>,
    splitter: SeasonSplitter,
    cache: Arc<SeasonCache>,
}

impl Remapper {
    pub fn new(upstream: Arc<dyn SeasonProvider>, splitter: SeasonSplitter, cache: Arc<SeasonCache>) -> Self {
        Self {
            upstream,
            splitter,
            cache,
        }
    }

    pub fn cache(&self) -> &SeasonCache {
        &self.cache
    }

    /// Whether a call should be served from logical data
    pub fn is_eligible(
        &self,
        scope: RecognitionScope,
        tmdb_id: Option<u32>,
        media_type: Option<MediaType>,
        episode_group: Option<&str>,
    ) -> bool {
        if scope.is_nested() {
            return false;
        }
        if episode_group.is_some_and(|g| !g.is_empty()) {
            return false;
        }
        if media_type == Some(MediaType::Movie) {
            return false;
        }
        if let Some(id) = tmdb_id
            && self.cache.get(id).is_none()
        {
            return false;
        }
        true
    }

    /// Recognize a show and rewrite its seasons to the logical structure.
    ///
    /// When no logical structure can be built and none is cached the show is
    /// returned with its provider numbering. `meta`, when given, is corrected
    /// in place.
    pub async fn recognize(
        &self,
        scope: RecognitionScope,
        tmdb_id: u32,
        meta: Option<&mut EpisodeMeta>,
    ) -> Option<ShowInfo> {
        if !self.is_eligible(scope, None, Some(MediaType::Tv), None) {
            return None;
        }

        let mut show = self.upstream.fetch_show(scope.nested(), tmdb_id).await?;

        let logic = match self.splitter.from_tmdb(scope, self, &show).await {
            Some(series) => Some(self.cache.put(tmdb_id, series)),
            None => self.cache.get(tmdb_id),
        };
        let Some(logic) = logic else {
            debug!(tmdb_id, "No logical seasons, keeping provider numbering");
            return Some(show);
        };

        apply_logic(&mut show, &logic, self.cache.use_cont_eps());
        if let Some(meta) = meta {
            self.correct_meta(meta, tmdb_id);
        }
        Some(show)
    }

    /// Translate `meta` through the cached reverse map of a title
    pub fn correct_meta(&self, meta: &mut EpisodeMeta, tmdb_id: u32) -> bool {
        self.cache
            .org_map(tmdb_id)
            .is_some_and(|map| correct_meta(meta, &map))
    }

    /// One logical season assembled from every provider record it draws from
    pub async fn season_detail(
        &self,
        scope: RecognitionScope,
        tmdb_id: u32,
        season: u32,
    ) -> Option<ProviderSeason> {
        if !self.is_eligible(scope, Some(tmdb_id), Some(MediaType::Tv), None) {
            return None;
        }

        let nested = scope.nested();
        let mut episodes: Vec<ProviderEpisode> = Vec::new();
        let mut latest: Option<ProviderSeason> = None;

        for identity in self.cache.unique_seasons(tmdb_id, season) {
            match identity {
                OriginIdentity::TvSeason {
                    show_id,
                    season_number,
                } => {
                    let source_id = show_id.unwrap_or(tmdb_id);
                    let Some(mut raw) = self.upstream.fetch_season(nested, source_id, season_number).await else {
                        warn!(tmdb_id = source_id, season = season_number, "Origin season unavailable");
                        continue;
                    };
                    for mut episode in raw.episodes.drain(..) {
                        episode.season_number.get_or_insert(raw.season_number);
                        episodes.push(episode);
                    }
                    if latest.as_ref().is_none_or(|l| raw.season_number > l.season_number) {
                        latest = Some(raw);
                    }
                }
                OriginIdentity::Movie { tmdb_id: movie_id } => {
                    match self.upstream.fetch_movie(nested, movie_id).await {
                        Some(movie) => episodes.push(movie),
                        None => warn!(tmdb_id = movie_id, "Origin movie unavailable"),
                    }
                }
            }
        }

        if latest.is_none() && episodes.is_empty() {
            return None;
        }

        let mut detail = latest.unwrap_or_default();
        if let Some(org_map) = self.cache.org_to_logic(tmdb_id, season) {
            let mut logical: Vec<ProviderEpisode> = episodes
                .into_iter()
                .filter_map(|mut episode| {
                    let &(season_number, episode_number) = org_map.get(&episode.mapping_key())?;
                    episode.season_number = Some(season_number);
                    episode.episode_number = episode_number;
                    Some(episode)
                })
                .collect();
            logical.sort_by_key(|e| e.episode_number);
            detail.episodes = logical;
        }

        if let Some(summary) = self.cache.season_info(tmdb_id, season) {
            overlay_summary(&mut detail, summary);
        }
        Some(detail)
    }

    /// Episodes of one logical season
    pub async fn episodes(
        &self,
        scope: RecognitionScope,
        tmdb_id: u32,
        season: u32,
    ) -> Option<Vec<ProviderEpisode>> {
        self.season_detail(scope, tmdb_id, season)
            .await
            .map(|detail| detail.episodes)
    }

    /// Logical season summaries, specials excluded
    pub fn seasons(&self, scope: RecognitionScope, tmdb_id: u32) -> Option<Vec<SeasonSummary>> {
        if !self.is_eligible(scope, Some(tmdb_id), None, None) {
            return None;
        }
        let logic = self.cache.get(tmdb_id)?;
        Some(
            logic
                .seasons_info()
                .into_iter()
                .filter(|s| s.season_number != 0)
                .collect(),
        )
    }

    /// Drop splitter caches and every cached series
    pub fn clear(&self) {
        self.splitter.clear();
        self.cache.clear();
        info!("Season caches cleared");
    }
}

fn overlay_summary(detail: &mut ProviderSeason, summary: SeasonSummary) {
    detail.season_number = summary.season_number;
    detail.name = Some(summary.name);
    if summary.air_date.is_some() {
        detail.air_date = summary.air_date;
    }
    if summary.poster_path.is_some() {
        detail.poster_path = summary.poster_path;
    }
    if summary.vote_average.is_some() {
        detail.vote_average = summary.vote_average;
    }
}

#[async_trait]
impl SeasonProvider for Remapper {
    async fn fetch_show(&self, scope: RecognitionScope, tmdb_id: u32) -> Option<ShowInfo> {
        if scope.is_nested() {
            return self.upstream.fetch_show(scope, tmdb_id).await;
        }
        self.recognize(scope, tmdb_id, None).await
    }

    async fn fetch_season(
        &self,
        scope: RecognitionScope,
        tmdb_id: u32,
        season_number: u32,
    ) -> Option<ProviderSeason> {
        if self.is_eligible(scope, Some(tmdb_id), Some(MediaType::Tv), None)
            && let Some(detail) = self.season_detail(scope, tmdb_id, season_number).await
        {
            return Some(detail);
        }
        self.upstream.fetch_season(scope, tmdb_id, season_number).await
    }

    async fn fetch_movie(&self, scope: RecognitionScope, tmdb_id: u32) -> Option<ProviderEpisode> {
        self.upstream.fetch_movie(scope, tmdb_id).await
    }
}
