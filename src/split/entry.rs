//! Override model: declared logical season boundaries
//!
//! A [`SeriesEntry`] comes either from the curated override document or is
//! derived from the heuristic source. Each [`SeasonEntry`] declares how many
//! episodes a logical season has and, optionally, runs of episodes that are
//! pre-assigned (episodes borrowed from another season or show, movies).
//! Every field is optional in the document; missing keys fall back to empty
//! lists and zeroes.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::episode_map::{EpisodeMap, Origin, OriginKind};

fn default_count() -> u32 {
    1
}

/// A contiguous run of pre-assigned episodes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeEntry {
    /// Logical order of the first episode of the run
    #[serde(default)]
    pub order: u32,
    /// Native episode number of the first episode of the run
    #[serde(default)]
    pub episode_number: Option<u32>,
    #[serde(default)]
    pub season_number: Option<u32>,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default, rename = "type")]
    pub kind: OriginKind,
    #[serde(default)]
    pub tmdbid: Option<u32>,
}

impl IncludeEntry {
    /// Expand the run into one mapping per episode
    pub fn expand(&self) -> impl Iterator<Item = EpisodeMap> + '_ {
        (0..self.count).map(move |e| {
            let order = self.order + e;
            let origin = match self.kind {
                OriginKind::Tv => Origin::Tv {
                    season_number: self.season_number.unwrap_or(0),
                    episode_number: self.episode_number.unwrap_or(0) + e,
                    show_id: self.tmdbid,
                    id: None,
                },
                OriginKind::Movie => Origin::Movie {
                    tmdb_id: self.tmdbid.unwrap_or(0),
                },
            };
            EpisodeMap {
                order,
                origin,
                name: None,
                air_date: None,
            }
        })
    }
}

/// Declaration of one logical season
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeasonEntry {
    #[serde(default)]
    pub name: Option<String>,
    /// Declared total for this logical season
    #[serde(default)]
    pub episode_count: u32,
    #[serde(default)]
    pub season_number: u32,
    #[serde(default)]
    pub include: Option<Vec<IncludeEntry>>,
}

impl SeasonEntry {
    pub fn new(season_number: u32, episode_count: u32) -> Self {
        Self {
            season_number,
            episode_count,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_include(mut self, run: IncludeEntry) -> Self {
        self.include.get_or_insert_with(Vec::new).push(run);
        self
    }

    fn runs(&self) -> &[IncludeEntry] {
        self.include.as_deref().unwrap_or_default()
    }

    /// Name to show for this season
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Season {}", self.season_number))
    }

    /// Every order covered by an include-run
    fn included_orders(&self) -> BTreeSet<u32> {
        self.runs()
            .iter()
            .flat_map(|run| (0..run.count).map(move |e| run.order + e))
            .collect()
    }

    pub fn has_includes(&self) -> bool {
        self.runs().iter().any(|run| run.count > 0)
    }

    /// Materialize every include-run: `order -> EpisodeMap`
    pub fn included_episodes(&self) -> BTreeMap<u32, EpisodeMap> {
        self.runs()
            .iter()
            .flat_map(IncludeEntry::expand)
            .map(|map| (map.order, map))
            .collect()
    }

    /// Orders in `1..=episode_count` not taken by an include-run.
    ///
    /// When runs cover orders beyond `episode_count`, that many positions are
    /// trimmed off the tail of the result.
    pub fn missing_episodes(&self) -> Vec<u32> {
        let current = self.included_orders();
        let expected: BTreeSet<u32> = (1..=self.episode_count).collect();

        let extra = current.difference(&expected).count();
        let mut missing: Vec<u32> = expected.difference(&current).copied().collect();

        missing.truncate(missing.len().saturating_sub(extra));
        missing
    }
}

/// Declaration of a whole series
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SeriesEntry {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub seasons: Vec<SeasonEntry>,
}

impl SeriesEntry {
    pub fn season(&self, number: u32) -> Option<&SeasonEntry> {
        self.seasons.iter().find(|s| s.season_number == number)
    }

    pub fn season_names(&self) -> BTreeMap<u32, String> {
        self.seasons
            .iter()
            .map(|s| (s.season_number, s.display_name()))
            .collect()
    }

    pub fn missing_episodes_by_season(&self) -> BTreeMap<u32, Vec<u32>> {
        self.seasons
            .iter()
            .map(|s| (s.season_number, s.missing_episodes()))
            .collect()
    }

    /// `season -> order -> EpisodeMap`, from include-runs only
    pub fn episode_mapping(&self) -> BTreeMap<u32, BTreeMap<u32, EpisodeMap>> {
        self.seasons
            .iter()
            .map(|s| (s.season_number, s.included_episodes()))
            .filter(|(_, eps)| !eps.is_empty())
            .collect()
    }

    pub fn min_season(&self) -> u32 {
        self.seasons.iter().map(|s| s.season_number).min().unwrap_or(1)
    }

    pub fn max_season(&self) -> u32 {
        self.seasons.iter().map(|s| s.season_number).max().unwrap_or(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::split::episode_map::MappingKey;

    fn movie_run(order: u32, tmdbid: u32) -> IncludeEntry {
        IncludeEntry {
            order,
            episode_number: None,
            season_number: None,
            count: 1,
            kind: OriginKind::Movie,
            tmdbid: Some(tmdbid),
        }
    }

    #[test]
    fn test_missing_without_includes() {
        let season = SeasonEntry::new(1, 4);
        assert_eq!(season.missing_episodes(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_missing_skips_included_orders() {
        let season = SeasonEntry::new(2, 13).with_include(movie_run(1, 999));
        assert_eq!(season.missing_episodes(), (2..=13).collect::<Vec<_>>());
    }

    #[test]
    fn test_missing_tail_trimmed_by_extra_runs() {
        // Run declared at order 14 with only 13 slots: one tail slot is dropped
        let season = SeasonEntry::new(1, 13).with_include(movie_run(14, 5));
        assert_eq!(season.missing_episodes(), (1..=12).collect::<Vec<_>>());
    }

    #[test]
    fn test_tv_run_expansion() {
        let run = IncludeEntry {
            order: 3,
            episode_number: Some(10),
            season_number: Some(1),
            count: 3,
            kind: OriginKind::Tv,
            tmdbid: None,
        };
        let season = SeasonEntry::new(2, 5).with_include(run);
        let included = season.included_episodes();
        assert_eq!(included.len(), 3);
        assert_eq!(included[&3].mapping_key(), MappingKey::episode(1, 10));
        assert_eq!(included[&5].mapping_key(), MappingKey::episode(1, 12));
        assert_eq!(season.missing_episodes(), vec![1, 2]);
    }

    #[test]
    fn test_series_derived_views() {
        let series = SeriesEntry {
            name: Some("Show".to_string()),
            seasons: vec![
                SeasonEntry::new(2, 13).with_include(movie_run(1, 999)),
                SeasonEntry::new(1, 12).with_name("Part One"),
            ],
        };
        assert_eq!(series.min_season(), 1);
        assert_eq!(series.max_season(), 2);
        assert_eq!(series.season_names()[&1], "Part One");
        assert_eq!(series.season_names()[&2], "Season 2");
        assert!(series.episode_mapping().contains_key(&2));
        assert!(!series.episode_mapping().contains_key(&1));
        assert_eq!(series.season(2).map(|s| s.episode_count), Some(13));
    }

    #[test]
    fn test_empty_series_defaults() {
        let series = SeriesEntry::default();
        assert_eq!(series.min_season(), 1);
        assert_eq!(series.max_season(), 1);
    }

    #[test]
    fn test_permissive_document() {
        let json = r#"{
            "name": "Show",
            "seasons": [
                {"season_number": 1, "episode_count": 12, "include": null},
                {"season_number": 2, "include": [{"order": 1, "type": "movie", "tmdbid": 7}]},
                {}
            ]
        }"#;
        let series: SeriesEntry = serde_json::from_str(json).unwrap();
        assert_eq!(series.seasons.len(), 3);
        assert_eq!(series.seasons[1].episode_count, 0);
        assert_eq!(series.seasons[2].season_number, 0);
        let run = &series.seasons[1].include.as_ref().unwrap()[0];
        assert_eq!(run.count, 1);
        assert_eq!(run.kind, OriginKind::Movie);
    }
}
