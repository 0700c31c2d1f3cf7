//! Application configuration management

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::split::DEFAULT_SEASON_CACHE_CAPACITY;

/// Public CureTMDb season declarations
pub const DEFAULT_OVERRIDE_SOURCE: &str = "https://raw.githubusercontent.com/wikrin/CureTMDb/main/tv.json";

pub const DEFAULT_LANGUAGE: &str = "zh-CN";

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// TMDB API key
    pub tmdb_api_key: Option<String>,

    /// Language for TMDB responses
    pub tmdb_language: String,

    /// Override document, local path or http(s) URL
    pub override_source: String,

    /// Number episodes continuously across logical seasons
    pub use_cont_eps: bool,

    /// Directory for the downloaded override copy
    pub data_path: PathBuf,

    /// Maximum number of rebuilt series kept in memory
    pub season_cache_capacity: usize,

    /// Fall back to Bangumi when no override exists
    pub bangumi_enabled: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let data_path = env::var("DATA_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_data_path());

        Ok(Self {
            tmdb_api_key: env::var("TMDB_API_KEY").ok().filter(|k| !k.trim().is_empty()),

            tmdb_language: env::var("TMDB_LANGUAGE").unwrap_or_else(|_| DEFAULT_LANGUAGE.to_string()),

            override_source: env::var("CTMDB_SOURCE")
                .unwrap_or_else(|_| DEFAULT_OVERRIDE_SOURCE.to_string()),

            use_cont_eps: env::var("USE_CONT_EPS")
                .map(|v| parse_flag(&v))
                .unwrap_or(false),

            data_path,

            season_cache_capacity: match env::var("SEASON_CACHE_CAPACITY") {
                Ok(v) => v.trim().parse().context("Invalid SEASON_CACHE_CAPACITY")?,
                Err(_) => DEFAULT_SEASON_CACHE_CAPACITY,
            },

            bangumi_enabled: env::var("BANGUMI_ENABLED")
                .map(|v| parse_flag(&v))
                .unwrap_or(true),
        })
    }

    /// API key, or an error naming the variable to set
    pub fn require_tmdb_api_key(&self) -> Result<&str> {
        self.tmdb_api_key
            .as_deref()
            .context("TMDB_API_KEY is required")
    }
}

fn default_data_path() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("seasonsplit"))
        .unwrap_or_else(|| PathBuf::from("./data"))
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1")
}
