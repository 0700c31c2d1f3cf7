//! Reconstructed logical structure and its reverse-mapping builders

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::episode_map::{EpisodeMap, MappingKey, Origin, OriginIdentity};
use super::providers::SeasonSummary;

/// `origin key -> (logical season, logical episode)`
pub type OrgMap = BTreeMap<MappingKey, (u32, u32)>;

/// One logical season
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LogicSeason {
    pub name: Option<String>,
    pub air_date: Option<String>,
    pub season_number: u32,
    /// `order -> EpisodeMap`; orders are the logical episode numbers
    pub episodes_map: BTreeMap<u32, EpisodeMap>,
    pub vote_average: Option<f64>,
    pub poster_path: Option<String>,
    pub overview: Option<String>,
}

impl LogicSeason {
    pub fn new(season_number: u32, episodes_map: BTreeMap<u32, EpisodeMap>) -> Self {
        Self {
            season_number,
            episodes_map,
            ..Default::default()
        }
    }

    pub fn episode_count(&self) -> u32 {
        u32::try_from(self.episodes_map.len()).unwrap_or(u32::MAX)
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Season {}", self.season_number))
    }

    pub fn summary(&self) -> SeasonSummary {
        SeasonSummary {
            name: self.display_name(),
            air_date: self.air_date.clone(),
            episode_count: self.episode_count(),
            season_number: self.season_number,
            vote_average: self.vote_average,
            poster_path: self.poster_path.clone(),
        }
    }

    /// Offset applied in continuous-numbering mode.
    ///
    /// Derived from this season's first tv-origin entry only; seasons with no
    /// tv-origin entry get no offset.
    pub fn continuous_offset(&self) -> i64 {
        self.episodes_map
            .iter()
            .find_map(|(order, map)| match map.origin {
                Origin::Tv { episode_number, .. } => {
                    Some(i64::from(episode_number) - i64::from(*order))
                }
                Origin::Movie { .. } => None,
            })
            .unwrap_or(0)
    }

    /// Reverse mapping for this season
    pub fn org_map(&self, use_cont_eps: bool) -> OrgMap {
        let offset = if use_cont_eps {
            self.continuous_offset()
        } else {
            0
        };
        self.episodes_map
            .iter()
            .map(|(order, map)| {
                let episode = u32::try_from(i64::from(*order) + offset).unwrap_or(0);
                (map.mapping_key(), (self.season_number, episode))
            })
            .collect()
    }

    /// Logical episode numbers in presentation order
    pub fn eps(&self, use_cont_eps: bool) -> Vec<u32> {
        let mut eps: Vec<u32> = self.org_map(use_cont_eps).into_values().map(|(_, e)| e).collect();
        eps.sort_unstable();
        eps
    }

    /// Native seasons this logical season draws tv episodes from
    pub fn org_seasons(&self) -> Vec<u32> {
        let mut seasons: Vec<u32> = self
            .episodes_map
            .values()
            .filter_map(|map| match map.identity() {
                OriginIdentity::TvSeason { season_number, .. } => Some(season_number),
                OriginIdentity::Movie { .. } => None,
            })
            .collect();
        seasons.sort_unstable();
        seasons.dedup();
        seasons
    }

    /// Distinct origin records, in logical order of first appearance
    pub fn unique_entry(&self) -> Vec<OriginIdentity> {
        let mut seen = HashSet::new();
        self.episodes_map
            .values()
            .map(EpisodeMap::identity)
            .filter(|identity| seen.insert(*identity))
            .collect()
    }
}

/// The reconstructed series
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LogicSeries {
    pub name: Option<String>,
    pub seasons: Vec<LogicSeason>,
    pub vote_average: f64,
    pub poster_path: Option<String>,
}

impl LogicSeries {
    pub fn new(name: Option<String>) -> Self {
        Self {
            name,
            ..Default::default()
        }
    }

    /// Reverse mapping for every season
    pub fn org_map(&self, use_cont_eps: bool) -> OrgMap {
        self.seasons
            .iter()
            .flat_map(|season| season.org_map(use_cont_eps))
            .collect()
    }

    pub fn add_season(&mut self, season: LogicSeason) {
        self.seasons.push(season);
    }

    pub fn has_season(&self, season_number: u32) -> bool {
        self.seasons.iter().any(|s| s.season_number == season_number)
    }

    pub fn season_info(&self, season_number: u32) -> Option<&LogicSeason> {
        self.seasons.iter().find(|s| s.season_number == season_number)
    }

    /// `logical season -> episode numbers`
    pub fn seasons_eps(&self, use_cont_eps: bool) -> BTreeMap<u32, Vec<u32>> {
        self.seasons
            .iter()
            .map(|s| (s.season_number, s.eps(use_cont_eps)))
            .collect()
    }

    pub fn seasons_info(&self) -> Vec<SeasonSummary> {
        self.seasons.iter().map(LogicSeason::summary).collect()
    }

    /// Total logical episodes over all seasons
    pub fn episode_count(&self) -> usize {
        self.seasons.iter().map(|s| s.episodes_map.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn season(number: u32, entries: Vec<EpisodeMap>) -> LogicSeason {
        LogicSeason::new(number, entries.into_iter().map(|m| (m.order, m)).collect())
    }

    fn split_series() -> LogicSeries {
        let mut series = LogicSeries::new(Some("Show".to_string()));
        series.add_season(season(1, (1..=12).map(|e| EpisodeMap::tv(e, 1, e)).collect()));
        series.add_season(season(2, (1..=13).map(|e| EpisodeMap::tv(e, 1, e + 12)).collect()));
        series
    }

    #[test]
    fn test_org_map_plain() {
        let map = split_series().org_map(false);
        assert_eq!(map.len(), 25);
        assert_eq!(map[&MappingKey::episode(1, 12)], (1, 12));
        assert_eq!(map[&MappingKey::episode(1, 13)], (2, 1));
        assert_eq!(map[&MappingKey::episode(1, 25)], (2, 13));
    }

    #[test]
    fn test_org_map_continuous() {
        let map = split_series().org_map(true);
        assert_eq!(map[&MappingKey::episode(1, 13)], (2, 13));
        assert_eq!(map[&MappingKey::episode(1, 25)], (2, 25));
        assert_eq!(map[&MappingKey::episode(1, 1)], (1, 1));
    }

    #[test]
    fn test_continuous_offset_skips_movies() {
        let mut entries = vec![EpisodeMap::movie(1, 999)];
        entries.extend((2..=4).map(|o| EpisodeMap::tv(o, 2, o + 10)));
        let s = season(2, entries);
        assert_eq!(s.continuous_offset(), 10);
        assert_eq!(s.eps(true), vec![11, 12, 13, 14]);
    }

    #[test]
    fn test_unique_entry() {
        let mut entries = vec![EpisodeMap::movie(1, 999)];
        entries.extend((2..=13).map(|o| EpisodeMap::tv(o, 2, o - 1)));
        let s = season(2, entries);
        assert_eq!(
            s.unique_entry(),
            vec![
                OriginIdentity::Movie { tmdb_id: 999 },
                OriginIdentity::TvSeason {
                    show_id: None,
                    season_number: 2
                },
            ]
        );
        assert_eq!(s.org_seasons(), vec![2]);
    }

    #[test]
    fn test_summary_defaults_name() {
        let s = season(3, vec![EpisodeMap::tv(1, 1, 30)]);
        let summary = s.summary();
        assert_eq!(summary.name, "Season 3");
        assert_eq!(summary.episode_count, 1);
    }

    #[test]
    fn test_seasons_eps_and_lookup() {
        let series = split_series();
        assert!(series.has_season(2));
        assert!(!series.has_season(3));
        assert_eq!(series.season_info(2).map(|s| s.episode_count()), Some(13));
        assert_eq!(series.seasons_eps(false)[&2], (1..=13).collect::<Vec<_>>());
        assert_eq!(series.episode_count(), 25);
    }
}
