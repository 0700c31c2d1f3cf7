//! TMDB (The Movie Database) API client, the upstream season provider
//!
//! Base URL: https://api.themoviedb.org/3
//!
//! Quota and retries come from `ApiService::Tmdb`; a 404 is `Ok(None)`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::rate_limiter::{ApiService, RateLimitedClient};
use crate::split::{
    ProviderEpisode, ProviderSeason, RecognitionScope, SeasonProvider, SeasonSummary, ShowInfo,
};

/// TMDB API client with rate limiting and retry logic
pub struct TmdbClient {
    client: RateLimitedClient,
    base_url: String,
    api_key: String,
    language: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbGenre {
    pub id: u32,
    pub name: String,
}

/// Season summary embedded in TV details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbSeasonSummary {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub air_date: Option<String>,
    #[serde(default)]
    pub episode_count: u32,
    pub season_number: u32,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
}

/// TV show details from TMDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbTvDetails {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub original_name: Option<String>,
    #[serde(default)]
    pub first_air_date: Option<String>,
    /// Regular seasons only; specials are listed in `seasons` as season 0
    #[serde(default)]
    pub number_of_seasons: u32,
    #[serde(default)]
    pub genres: Vec<TmdbGenre>,
    #[serde(default)]
    pub origin_country: Vec<String>,
    #[serde(default)]
    pub seasons: Vec<TmdbSeasonSummary>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub overview: Option<String>,
}

/// Movie details from TMDB
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TmdbMovie {
    pub id: u32,
    pub title: String,
    #[serde(default)]
    pub original_title: Option<String>,
    #[serde(default)]
    pub overview: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub runtime: Option<u32>,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub backdrop_path: Option<String>,
    #[serde(default)]
    pub vote_average: Option<f64>,
    #[serde(default)]
    pub vote_count: Option<u32>,
}

impl TmdbClient {
    /// Create a new TMDB client
    pub fn new(api_key: String, language: String) -> Self {
        Self {
            client: RateLimitedClient::new(ApiService::Tmdb),
            base_url: "https://api.themoviedb.org/3".to_string(),
            api_key,
            language,
        }
    }

    /// Check if the client has a valid API key configured
    pub fn has_api_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// GET `path`, `Ok(None)` on 404
    async fn fetch<T: DeserializeOwned>(&self, path: &str, operation: &str) -> Result<Option<T>> {
        if !self.has_api_key() {
            anyhow::bail!("TMDB API key not configured");
        }

        let url = format!("{}{}", self.base_url, path);
        let query = [("api_key", self.api_key.as_str()), ("language", self.language.as_str())];
        self.client
            .fetch_json(|client| client.get(&url).query(&query), operation)
            .await
            .with_context(|| format!("TMDB request for {path} failed"))
    }

    /// Get TV show details by TMDB ID
    pub async fn get_tv_details(&self, tmdb_id: u32) -> Result<Option<TmdbTvDetails>> {
        debug!("Fetching TV details from TMDB (ID: {})", tmdb_id);
        self.fetch(&format!("/tv/{}", tmdb_id), "tmdb_get_tv_details").await
    }

    /// Get one season with its episode list
    pub async fn get_tv_season(&self, tmdb_id: u32, season_number: u32) -> Result<Option<ProviderSeason>> {
        debug!("Fetching season {} of TMDB show {}", season_number, tmdb_id);
        self.fetch(
            &format!("/tv/{}/season/{}", tmdb_id, season_number),
            "tmdb_get_tv_season",
        )
        .await
    }

    /// Get movie details by TMDB ID
    pub async fn get_movie(&self, tmdb_id: u32) -> Result<Option<TmdbMovie>> {
        debug!("Fetching movie details from TMDB (ID: {})", tmdb_id);
        self.fetch(&format!("/movie/{}", tmdb_id), "tmdb_get_movie").await
    }
}

impl From<TmdbTvDetails> for ShowInfo {
    fn from(details: TmdbTvDetails) -> Self {
        let season_info: Vec<SeasonSummary> = details
            .seasons
            .iter()
            .map(|s| SeasonSummary {
                name: s
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("Season {}", s.season_number)),
                air_date: s.air_date.clone(),
                episode_count: s.episode_count,
                season_number: s.season_number,
                vote_average: s.vote_average,
                poster_path: s.poster_path.clone(),
            })
            .collect();

        let seasons = details
            .seasons
            .iter()
            .map(|s| (s.season_number, (1..=s.episode_count).collect()))
            .collect();

        let season_years = season_info
            .iter()
            .filter_map(|s| s.year().map(|y| (s.season_number, y)))
            .collect();

        ShowInfo {
            tmdb_id: details.id,
            title: details.name,
            original_title: details.original_name,
            release_date: details.first_air_date,
            number_of_seasons: details.number_of_seasons,
            genre_ids: details.genres.iter().map(|g| g.id).collect(),
            origin_country: details.origin_country,
            season_info,
            seasons,
            season_years,
            poster_path: details.poster_path,
            vote_average: details.vote_average,
        }
    }
}

/// A movie inserted into a logical season is carried as an episode record
/// without a season number
impl From<TmdbMovie> for ProviderEpisode {
    fn from(movie: TmdbMovie) -> Self {
        ProviderEpisode {
            id: u64::from(movie.id),
            episode_number: 0,
            season_number: None,
            air_date: movie.release_date,
            name: Some(movie.title),
            overview: movie.overview,
            still_path: movie.backdrop_path.or(movie.poster_path),
            vote_average: movie.vote_average,
            vote_count: movie.vote_count,
            runtime: movie.runtime,
            episode_type: None,
            production_code: None,
        }
    }
}

#[async_trait]
impl SeasonProvider for TmdbClient {
    async fn fetch_show(&self, _scope: RecognitionScope, tmdb_id: u32) -> Option<ShowInfo> {
        match self.get_tv_details(tmdb_id).await {
            Ok(Some(details)) => {
                info!(tmdb_id, title = %details.name, seasons = details.number_of_seasons, "Fetched TMDB show");
                Some(details.into())
            }
            Ok(None) => {
                warn!(tmdb_id, "TV show not found on TMDB");
                None
            }
            Err(e) => {
                warn!(tmdb_id, error = %e, "Failed to fetch TV details");
                None
            }
        }
    }

    async fn fetch_season(
        &self,
        _scope: RecognitionScope,
        tmdb_id: u32,
        season_number: u32,
    ) -> Option<ProviderSeason> {
        match self.get_tv_season(tmdb_id, season_number).await {
            Ok(season) => season,
            Err(e) => {
                warn!(tmdb_id, season = season_number, error = %e, "Failed to fetch TV season");
                None
            }
        }
    }

    async fn fetch_movie(&self, _scope: RecognitionScope, tmdb_id: u32) -> Option<ProviderEpisode> {
        match self.get_movie(tmdb_id).await {
            Ok(movie) => movie.map(ProviderEpisode::from),
            Err(e) => {
                warn!(tmdb_id, error = %e, "Failed to fetch movie");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TV_DETAILS: &str = r#"{
        "id": 1429,
        "name": "进击的巨人",
        "original_name": "進撃の巨人",
        "first_air_date": "2013-04-07",
        "number_of_seasons": 1,
        "genres": [{"id": 16, "name": "动画"}, {"id": 10759, "name": "动作冒险"}],
        "origin_country": ["JP"],
        "seasons": [
            {"id": 1, "name": "特别篇", "air_date": "2013-12-09", "episode_count": 2, "season_number": 0},
            {"id": 2, "name": "第 1 季", "air_date": "2013-04-07", "episode_count": 25, "season_number": 1}
        ],
        "vote_average": 8.7
    }"#;

    #[test]
    fn test_tv_details_into_show_info() {
        let details: TmdbTvDetails = serde_json::from_str(TV_DETAILS).unwrap();
        let show = ShowInfo::from(details);

        assert_eq!(show.tmdb_id, 1429);
        assert_eq!(show.search_title(), "進撃の巨人");
        assert!(show.is_japanese_animation());
        assert_eq!(show.seasons[&1].len(), 25);
        assert_eq!(show.season_years[&0], "2013");
        assert_eq!(show.season_air_date(Some(1)), Some("2013-04-07"));
        assert_eq!(show.season_info.len(), 2);
    }

    #[test]
    fn test_season_response_decodes() {
        let json = r#"{
            "_id": "abc",
            "air_date": "2013-04-07",
            "name": "第 1 季",
            "season_number": 1,
            "id": 3572,
            "episodes": [
                {"id": 63056, "episode_number": 1, "season_number": 1, "air_date": "2013-04-07",
                 "name": "致两千年后的你", "overview": "...", "still_path": "/a.jpg",
                 "vote_average": 8.1, "vote_count": 30, "runtime": 24, "crew": [], "guest_stars": []}
            ]
        }"#;
        let season: ProviderSeason = serde_json::from_str(json).unwrap();
        assert_eq!(season.episodes.len(), 1);
        assert_eq!(season.episodes[0].id, 63056);
        assert_eq!(season.episodes[0].runtime, Some(24));
    }

    #[test]
    fn test_movie_into_episode_record() {
        let movie = TmdbMovie {
            id: 999,
            title: "剧场版".to_string(),
            original_title: None,
            overview: None,
            release_date: Some("2020-08-01".to_string()),
            runtime: Some(105),
            poster_path: Some("/p.jpg".to_string()),
            backdrop_path: None,
            vote_average: None,
            vote_count: None,
        };
        let record = ProviderEpisode::from(movie);
        assert_eq!(record.season_number, None);
        assert_eq!(record.id, 999);
        assert_eq!(record.still_path.as_deref(), Some("/p.jpg"));
        assert_eq!(record.air_date.as_deref(), Some("2020-08-01"));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = TmdbClient::new(String::new(), "zh-CN".to_string());
        assert!(!client.has_api_key());
        assert!(client.get_tv_details(1).await.is_err());
        assert!(client.fetch_season(RecognitionScope::root(), 1, 1).await.is_none());
    }
}
