//! Data shapes and traits for the engine's external collaborators
//!
//! The provider accessor, the curated override source and the heuristic
//! source are all injected behind these traits. Every call is allowed to come
//! back empty; absence of data is never an error at this boundary.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::entry::SeriesEntry;
use super::episode_map::MappingKey;
use super::scope::RecognitionScope;

/// TMDB genre id for "Animation"
pub const ANIMATION_GENRE_ID: u32 = 16;

/// Media type as seen by the recognition pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Tv,
    Movie,
}

/// One raw episode as reported by the provider.
///
/// Movies fetched for insertion into a logical season are carried in the
/// same shape with `season_number == None` and `id` set to the movie id.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProviderEpisode {
    pub id: u64,
    #[serde(default)]
    pub episode_number: u32,
    #[serde(default)]
    pub season_number: Option<u32>,
    #[serde(default)]
    pub air_date: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub still_path: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub vote_count: Option<u32>,
    #[serde(default)]
    pub runtime: Option<u32>,
    #[serde(default)]
    pub episode_type: Option<String>,
    #[serde(default)]
    pub production_code: Option<String>,
}

impl ProviderEpisode {
    /// Reverse-map key of this raw record
    pub fn mapping_key(&self) -> MappingKey {
        match self.season_number {
            Some(season) => MappingKey::episode(season, self.episode_number),
            None => MappingKey::Movie(u32::try_from(self.id).unwrap_or(u32::MAX)),
        }
    }
}

/// One raw season as reported by the provider
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProviderSeason {
    #[serde(default)]
    pub id: Option<u64>,
    pub season_number: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub air_date: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub episodes: Vec<ProviderEpisode>,
}

/// Season summary as exposed to the rest of the pipeline
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SeasonSummary {
    pub name: String,
    pub air_date: Option<String>,
    pub episode_count: u32,
    pub season_number: u32,
    pub vote_average: Option<f64>,
    pub poster_path: Option<String>,
}

impl SeasonSummary {
    /// Four-digit year of the air date
    pub fn year(&self) -> Option<String> {
        self.air_date
            .as_deref()
            .and_then(|d| d.split('-').next())
            .filter(|y| !y.is_empty())
            .map(str::to_string)
    }
}

/// Show-level metadata the recognition pipeline works with
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ShowInfo {
    pub tmdb_id: u32,
    pub title: String,
    pub original_title: Option<String>,
    /// First air date of the show
    pub release_date: Option<String>,
    pub number_of_seasons: u32,
    pub genre_ids: Vec<u32>,
    pub origin_country: Vec<String>,
    /// Per-season summaries
    pub season_info: Vec<SeasonSummary>,
    /// Season number -> episode numbers
    pub seasons: BTreeMap<u32, Vec<u32>>,
    /// Season number -> air year
    pub season_years: BTreeMap<u32, String>,
    pub poster_path: Option<String>,
    pub vote_average: Option<f64>,
}

impl ShowInfo {
    /// Air date of a season, falling back to the show's first air date
    pub fn season_air_date(&self, season: Option<u32>) -> Option<&str> {
        let Some(season) = season else {
            return self.release_date.as_deref();
        };
        self.season_info
            .iter()
            .find(|s| s.season_number == season)
            .and_then(|s| s.air_date.as_deref())
            .or(self.release_date.as_deref())
    }

    /// Japanese-origin animation, the only kind of title the heuristic source
    /// knows how to split
    pub fn is_japanese_animation(&self) -> bool {
        self.genre_ids.contains(&ANIMATION_GENRE_ID)
            && self.origin_country.iter().any(|c| c.eq_ignore_ascii_case("JP"))
    }

    /// Title to search the heuristic source with
    pub fn search_title(&self) -> &str {
        self.original_title
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(&self.title)
    }
}

/// A search hit from the heuristic source
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SubjectHit {
    pub id: u64,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub name_cn: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
}

impl SubjectHit {
    pub fn is_tv(&self) -> bool {
        self.platform.as_deref() == Some("TV")
    }
}

/// Numbering of the first episode of a heuristic-source entry.
///
/// `sort` is the position within the whole franchise, `ep` the number within
/// the entry itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpisodeProgress {
    pub sort: f64,
    pub ep: f64,
}

impl EpisodeProgress {
    /// True when the entry numbers its episodes from its own start, meaning
    /// it is a separate season rather than a continuation
    pub fn restarts_numbering(&self) -> bool {
        self.sort == self.ep
    }
}

/// Provider accessor (season and movie metadata)
#[async_trait]
pub trait SeasonProvider: Send + Sync {
    /// Show-level metadata for a TV title
    async fn fetch_show(&self, scope: RecognitionScope, tmdb_id: u32) -> Option<ShowInfo>;

    /// One season with its episode list
    async fn fetch_season(
        &self,
        scope: RecognitionScope,
        tmdb_id: u32,
        season_number: u32,
    ) -> Option<ProviderSeason>;

    /// A movie rendered as a single episode record
    async fn fetch_movie(&self, scope: RecognitionScope, tmdb_id: u32) -> Option<ProviderEpisode>;
}

/// Curated override dataset
#[async_trait]
pub trait OverrideLookup: Send + Sync {
    async fn lookup_override(&self, tmdb_id: u32) -> Option<SeriesEntry>;

    /// Drop any cached copy of the dataset
    fn clear(&self) {}
}

/// Secondary community database used when no override exists
#[async_trait]
pub trait HeuristicSource: Send + Sync {
    async fn search(&self, title: &str, air_date: Option<&str>) -> Vec<SubjectHit>;

    /// Season boundaries derived from the subject's sequel chain
    async fn season_info(&self, subject: &SubjectHit) -> Option<SeriesEntry>;

    async fn get_sort_and_ep(&self, subject_id: u64) -> Option<EpisodeProgress>;

    /// Drop cached responses
    fn clear(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn show() -> ShowInfo {
        ShowInfo {
            tmdb_id: 1,
            title: "Title".to_string(),
            release_date: Some("2020-01-05".to_string()),
            season_info: vec![SeasonSummary {
                season_number: 2,
                air_date: Some("2021-04-02".to_string()),
                ..Default::default()
            }],
            genre_ids: vec![16, 10759],
            origin_country: vec!["JP".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_season_air_date_fallback() {
        let show = show();
        assert_eq!(show.season_air_date(Some(2)), Some("2021-04-02"));
        assert_eq!(show.season_air_date(Some(3)), Some("2020-01-05"));
        assert_eq!(show.season_air_date(None), Some("2020-01-05"));
    }

    #[test]
    fn test_japanese_animation() {
        let mut show = show();
        assert!(show.is_japanese_animation());
        show.origin_country = vec!["US".to_string()];
        assert!(!show.is_japanese_animation());
    }

    #[test]
    fn test_movie_record_mapping_key() {
        let movie = ProviderEpisode {
            id: 999,
            ..Default::default()
        };
        assert_eq!(movie.mapping_key(), MappingKey::Movie(999));
    }

    #[test]
    fn test_progress_restart() {
        assert!(EpisodeProgress { sort: 1.0, ep: 1.0 }.restarts_numbering());
        assert!(!EpisodeProgress { sort: 13.0, ep: 1.0 }.restarts_numbering());
    }
}
