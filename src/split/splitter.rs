//! Season splitter
//!
//! Rebuilds the logical season structure of a title from the provider's raw
//! per-season episode lists and a [`SeriesEntry`] taken from the curated
//! override dataset or, failing that, derived from the heuristic source.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::dedup::resolve_duplicate_episodes;
use super::entry::SeriesEntry;
use super::episode_map::EpisodeMap;
use super::logic::{LogicSeason, LogicSeries};
use super::providers::{
    HeuristicSource, OverrideLookup, ProviderEpisode, ProviderSeason, SeasonProvider, ShowInfo,
    SubjectHit,
};
use super::scope::RecognitionScope;

/// Provider season counts the heuristic source is consulted for
pub const HEURISTIC_SEASON_RANGE: std::ops::RangeInclusive<u32> = 2..=3;

/// `season -> order -> EpisodeMap`
pub type SeasonMapping = BTreeMap<u32, BTreeMap<u32, EpisodeMap>>;

/// Orchestrates fetch, duplicate resolution and reconstruction
pub struct SeasonSplitter {
    overrides: Arc<dyn OverrideLookup>,
    heuristic: Option<Arc<dyn HeuristicSource>>,
}

impl SeasonSplitter {
    pub fn new(
        overrides: Arc<dyn OverrideLookup>,
        heuristic: Option<Arc<dyn HeuristicSource>>,
    ) -> Self {
        Self {
            overrides,
            heuristic,
        }
    }

    /// Build the logical series for a show.
    ///
    /// Returns `None` when no season declaration is available or no raw
    /// season could be fetched; the caller then keeps the provider's own
    /// numbering.
    pub async fn from_tmdb(
        &self,
        scope: RecognitionScope,
        provider: &dyn SeasonProvider,
        show: &ShowInfo,
    ) -> Option<LogicSeries> {
        let entry = match self.override_entry(show).await {
            Some(entry) => entry,
            None => self.heuristic_entry(show).await?,
        };

        let raw = fetch_raw_seasons(scope, provider, show, entry.min_season()).await;
        if raw.is_empty() {
            warn!(tmdb_id = show.tmdb_id, "No raw season data, keeping provider numbering");
            return None;
        }

        let mut series = build_logic_series(&entry, raw)?;
        if series.seasons.is_empty() {
            warn!(tmdb_id = show.tmdb_id, "Reconstruction produced no seasons");
            return None;
        }
        series.vote_average = show.vote_average.unwrap_or_default();
        series.poster_path = show.poster_path.clone();

        info!(
            tmdb_id = show.tmdb_id,
            title = %show.title,
            seasons = series.seasons.len(),
            episodes = series.episode_count(),
            "Logical seasons rebuilt"
        );
        Some(series)
    }

    async fn override_entry(&self, show: &ShowInfo) -> Option<SeriesEntry> {
        let entry = self.overrides.lookup_override(show.tmdb_id).await?;
        debug!(tmdb_id = show.tmdb_id, seasons = entry.seasons.len(), "Using curated override");
        Some(entry)
    }

    /// Season boundaries from the heuristic source.
    ///
    /// Only Japanese animation with two or three provider seasons qualifies.
    /// When the entry found at the last season's air date restarts its own
    /// numbering, the provider already splits the title correctly.
    async fn heuristic_entry(&self, show: &ShowInfo) -> Option<SeriesEntry> {
        let heuristic = self.heuristic.as_ref()?;
        if !show.is_japanese_animation() || !HEURISTIC_SEASON_RANGE.contains(&show.number_of_seasons) {
            return None;
        }

        let title = show.search_title();
        let last_season = show.number_of_seasons;
        let last_hit = first_tv_hit(heuristic.search(title, show.season_air_date(Some(last_season))).await);
        if let Some(hit) = last_hit {
            let progress = heuristic.get_sort_and_ep(hit.id).await;
            if progress.is_some_and(|p| p.restarts_numbering()) {
                info!(
                    tmdb_id = show.tmdb_id,
                    subject = hit.id,
                    season = last_season,
                    "Last season numbers independently, not splitting"
                );
                return None;
            }
        }

        let hit = first_tv_hit(heuristic.search(title, show.season_air_date(None)).await)?;
        let entry = heuristic.season_info(&hit).await?;
        debug!(
            tmdb_id = show.tmdb_id,
            subject = hit.id,
            seasons = entry.seasons.len(),
            "Using heuristic season boundaries"
        );
        Some(entry)
    }

    /// Drop cached override and heuristic data
    pub fn clear(&self) {
        self.overrides.clear();
        if let Some(heuristic) = &self.heuristic {
            heuristic.clear();
        }
    }
}

fn first_tv_hit(hits: Vec<SubjectHit>) -> Option<SubjectHit> {
    hits.into_iter().find(SubjectHit::is_tv)
}

/// Raw seasons `first..=number_of_seasons`, skipping those without episodes.
///
/// The fetch runs in a nested scope so it reaches the upstream provider even
/// when `provider` is the remapper itself.
pub async fn fetch_raw_seasons(
    scope: RecognitionScope,
    provider: &dyn SeasonProvider,
    show: &ShowInfo,
    first: u32,
) -> Vec<ProviderSeason> {
    let nested = scope.nested();
    let mut seasons = Vec::new();

    for season_number in first..=show.number_of_seasons {
        match provider.fetch_season(nested, show.tmdb_id, season_number).await {
            Some(season) if !season.episodes.is_empty() => seasons.push(season),
            Some(_) => debug!(tmdb_id = show.tmdb_id, season = season_number, "Raw season has no episodes"),
            None => debug!(tmdb_id = show.tmdb_id, season = season_number, "Raw season unavailable"),
        }
    }

    seasons
}

/// Resolve duplicates and rebuild the logical series from raw seasons.
///
/// Returns `None` when there is no raw episode at all.
pub fn build_logic_series(entry: &SeriesEntry, mut raw: Vec<ProviderSeason>) -> Option<LogicSeries> {
    raw.retain(|s| !s.episodes.is_empty());
    if raw.len() >= 2 {
        resolve_duplicate_episodes(&mut raw);
    }
    if raw.is_empty() {
        return None;
    }
    Some(fill_from_raw(entry, materialize_includes(entry), &raw))
}

/// First phase: every include-run expanded into its declared slots
pub fn materialize_includes(entry: &SeriesEntry) -> SeasonMapping {
    entry.episode_mapping()
}

/// Second phase: assign raw episodes, in raw order, to the slots the
/// include-runs left open and close seasons as their slots fill up.
///
/// The last raw episode always closes the season it lands in.
pub fn fill_from_raw(entry: &SeriesEntry, includes: SeasonMapping, raw: &[ProviderSeason]) -> LogicSeries {
    let last_episode_id = raw
        .last()
        .and_then(|s| s.episodes.last())
        .map(|ep| ep.id);

    let mut walk = SeasonWalk::new(entry, includes);

    for raw_season in raw {
        if walk.air_date.is_none() {
            walk.air_date = raw_season.air_date.clone().filter(|d| !d.is_empty());
        }
        for episode in &raw_season.episodes {
            walk.close_drained();
            walk.record(raw_season.season_number, episode);
            if walk.is_drained(walk.current_season) || Some(episode.id) == last_episode_id {
                walk.close(Some(raw_season));
            }
        }
    }
    // Seasons made up entirely of include-runs after the last raw episode
    walk.close_drained();

    walk.series
}

/// Mutable state of one reconstruction pass
struct SeasonWalk<'a> {
    entry: &'a SeriesEntry,
    mapping: SeasonMapping,
    missing: BTreeMap<u32, VecDeque<u32>>,
    current_season: u32,
    last_order: u32,
    air_date: Option<String>,
    series: LogicSeries,
}

impl<'a> SeasonWalk<'a> {
    fn new(entry: &'a SeriesEntry, mapping: SeasonMapping) -> Self {
        let missing = entry
            .missing_episodes_by_season()
            .into_iter()
            .map(|(season, orders)| (season, VecDeque::from(orders)))
            .collect();

        Self {
            entry,
            mapping,
            missing,
            current_season: entry.min_season(),
            last_order: 0,
            air_date: None,
            series: LogicSeries::new(entry.name.clone()),
        }
    }

    /// True when `season` is declared with a finite set of slots and all of
    /// them are taken. Undeclared seasons, and declared ones without a count
    /// or include-runs, only close on the last raw episode.
    fn is_drained(&self, season: u32) -> bool {
        let bounded = self
            .entry
            .season(season)
            .is_some_and(|s| s.episode_count > 0 || s.has_includes());
        bounded && self.missing.get(&season).is_some_and(VecDeque::is_empty)
    }

    fn next_order(&mut self) -> u32 {
        let order = self
            .missing
            .get_mut(&self.current_season)
            .and_then(VecDeque::pop_front)
            .unwrap_or(self.last_order + 1);
        self.last_order = order;
        order
    }

    fn record(&mut self, raw_season_number: u32, episode: &ProviderEpisode) {
        if self.air_date.is_none() {
            self.air_date = episode.air_date.clone().filter(|d| !d.is_empty());
        }
        let order = self.next_order();
        self.mapping
            .entry(self.current_season)
            .or_default()
            .insert(order, EpisodeMap::from_provider(order, raw_season_number, episode));
    }

    /// Close every season at the cursor that needs no raw episode
    fn close_drained(&mut self) {
        while self.is_drained(self.current_season) {
            self.close(None);
        }
    }

    /// Emit the current season and advance. Every close moves the cursor,
    /// so no logical season number is emitted twice.
    ///
    /// `raw` is the raw season the closing episode came from; seasons closed
    /// without consuming raw episodes carry no provider metadata.
    fn close(&mut self, raw: Option<&ProviderSeason>) {
        let season_number = self.current_season;
        let episodes_map = self.mapping.remove(&season_number).unwrap_or_default();

        let name = match self.entry.season(season_number) {
            Some(declared) => Some(declared.display_name()),
            None => raw.and_then(|r| r.name.clone()),
        };

        let season = LogicSeason {
            name,
            air_date: if raw.is_some() { self.air_date.take() } else { None },
            season_number,
            episodes_map,
            vote_average: raw.and_then(|r| r.vote_average),
            poster_path: raw.and_then(|r| r.poster_path.clone()),
            overview: raw.and_then(|r| r.overview.clone()),
        };

        info!(
            season = season_number,
            name = season.name.as_deref().unwrap_or_default(),
            episodes = season.episode_count(),
            "Closing logical season"
        );
        self.series.add_season(season);

        self.current_season += 1;
        self.last_order = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::entry::{IncludeEntry, SeasonEntry};
    use crate::split::episode_map::{MappingKey, OriginIdentity, OriginKind};

    fn raw_season(number: u32, count: u32, first_id: u64) -> ProviderSeason {
        ProviderSeason {
            season_number: number,
            name: Some(format!("Raw {}", number)),
            air_date: Some(format!("20{:02}-01-01", number + 10)),
            episodes: (1..=count)
                .map(|e| ProviderEpisode {
                    id: first_id + u64::from(e),
                    episode_number: e,
                    season_number: Some(number),
                    air_date: Some(format!("20{:02}-{:02}-{:02}", number + 10, 1 + e / 28, 1 + e % 28)),
                    name: Some(format!("Episode {}", e)),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn series(seasons: Vec<SeasonEntry>) -> SeriesEntry {
        SeriesEntry {
            name: Some("Show".to_string()),
            seasons,
        }
    }

    #[test]
    fn test_gap_filling_splits_merged_season() {
        let entry = series(vec![SeasonEntry::new(1, 12), SeasonEntry::new(2, 13)]);
        let logic = build_logic_series(&entry, vec![raw_season(1, 25, 100)]).unwrap();

        assert_eq!(logic.seasons.len(), 2);
        assert_eq!(logic.seasons[0].episodes_map.keys().copied().collect::<Vec<_>>(), (1..=12).collect::<Vec<_>>());
        assert_eq!(logic.seasons[1].episodes_map.keys().copied().collect::<Vec<_>>(), (1..=13).collect::<Vec<_>>());

        let map = logic.org_map(false);
        assert_eq!(map[&MappingKey::episode(1, 13)], (2, 1));
        assert_eq!(map[&MappingKey::episode(1, 25)], (2, 13));
        assert_eq!(logic.seasons[1].name.as_deref(), Some("Season 2"));
    }

    #[test]
    fn test_movie_insertion() {
        let movie = IncludeEntry {
            order: 1,
            episode_number: None,
            season_number: None,
            count: 1,
            kind: OriginKind::Movie,
            tmdbid: Some(999),
        };
        let entry = series(vec![
            SeasonEntry::new(2, 13).with_include(movie),
        ]);
        let logic = build_logic_series(&entry, vec![raw_season(2, 12, 200)]).unwrap();

        let season = logic.season_info(2).unwrap();
        assert_eq!(season.episode_count(), 13);
        assert_eq!(season.episodes_map[&1].mapping_key(), MappingKey::Movie(999));
        for order in 2..=13 {
            assert_eq!(season.episodes_map[&order].mapping_key(), MappingKey::episode(2, order - 1));
        }
        assert_eq!(
            season.unique_entry(),
            vec![
                OriginIdentity::Movie { tmdb_id: 999 },
                OriginIdentity::TvSeason {
                    show_id: None,
                    season_number: 2
                },
            ]
        );
    }

    #[test]
    fn test_last_episode_closes_short_season() {
        // Still airing: declared 13 but only 5 aired
        let entry = series(vec![SeasonEntry::new(1, 12), SeasonEntry::new(2, 13)]);
        let logic = build_logic_series(&entry, vec![raw_season(1, 17, 0)]).unwrap();
        assert_eq!(logic.seasons.len(), 2);
        assert_eq!(logic.seasons[1].episode_count(), 5);
    }

    #[test]
    fn test_undeclared_seasons_continue_counting() {
        let entry = series(vec![SeasonEntry::new(1, 10)]);
        let logic = build_logic_series(&entry, vec![raw_season(1, 10, 0), raw_season(2, 4, 100)]).unwrap();
        assert_eq!(logic.seasons.len(), 2);
        let second = &logic.seasons[1];
        assert_eq!(second.season_number, 2);
        assert_eq!(second.name.as_deref(), Some("Raw 2"));
        assert_eq!(second.eps(false), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_include_only_season_closed_in_place() {
        let ova = IncludeEntry {
            order: 1,
            episode_number: None,
            season_number: None,
            count: 1,
            kind: OriginKind::Movie,
            tmdbid: Some(55),
        };
        let entry = series(vec![
            SeasonEntry::new(1, 3),
            SeasonEntry::new(2, 1).with_include(ova),
            SeasonEntry::new(3, 2),
        ]);
        let logic = build_logic_series(&entry, vec![raw_season(1, 5, 0)]).unwrap();

        let numbers: Vec<u32> = logic.seasons.iter().map(|s| s.season_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert_eq!(logic.seasons[1].episode_count(), 1);
        assert_eq!(logic.seasons[1].air_date, None);
        assert_eq!(logic.seasons[2].episodes_map[&1].mapping_key(), MappingKey::episode(1, 4));
    }

    #[test]
    fn test_org_map_is_injective_after_dedup() {
        let mut second = raw_season(2, 3, 100);
        // Same broadcast listed in both raw seasons
        second.episodes[0].air_date = raw_season(1, 4, 0).episodes[3].air_date.clone();
        let entry = series(vec![SeasonEntry::new(1, 3), SeasonEntry::new(2, 3)]);
        let logic = build_logic_series(&entry, vec![raw_season(1, 4, 0), second]).unwrap();

        assert_eq!(logic.org_map(false).len(), logic.episode_count());
        assert_eq!(logic.episode_count(), 6);
    }

    #[test]
    fn test_seasons_aired_days_apart_both_kept() {
        // Second part starts three days after the raw season date
        let entry = series(vec![SeasonEntry::new(1, 2), SeasonEntry::new(2, 4)]);
        let logic = build_logic_series(&entry, vec![raw_season(1, 6, 0)]).unwrap();

        assert_eq!(logic.seasons[0].air_date.as_deref(), Some("2011-01-01"));
        assert_eq!(logic.seasons[1].air_date.as_deref(), Some("2011-01-04"));
        let counts: Vec<(u32, u32)> = logic.seasons.iter().map(|s| (s.season_number, s.episode_count())).collect();
        assert_eq!(counts, vec![(1, 2), (2, 4)]);
    }

    #[test]
    fn test_no_raw_data() {
        let entry = series(vec![SeasonEntry::new(1, 12)]);
        assert!(build_logic_series(&entry, Vec::new()).is_none());
        assert!(build_logic_series(&entry, vec![raw_season(1, 0, 0)]).is_none());
    }

    #[test]
    fn test_min_season_starts_numbering() {
        let entry = series(vec![SeasonEntry::new(2, 2), SeasonEntry::new(3, 2)]);
        let logic = build_logic_series(&entry, vec![raw_season(2, 4, 0)]).unwrap();
        assert_eq!(logic.seasons_eps(false).keys().copied().collect::<Vec<_>>(), vec![2, 3]);
    }
}
