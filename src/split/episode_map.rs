//! Atomic mapping record: one logical episode and where it came from
//!
//! A logical episode is either a provider TV episode (season/episode in the
//! provider's own numbering) or a whole movie inserted into the season.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use super::providers::ProviderEpisode;

/// Kind of record an include-run points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OriginKind {
    #[default]
    Tv,
    Movie,
}

impl fmt::Display for OriginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OriginKind::Tv => write!(f, "tv"),
            OriginKind::Movie => write!(f, "movie"),
        }
    }
}

/// Native coordinates of a logical episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Origin {
    Tv {
        season_number: u32,
        episode_number: u32,
        /// Provider id of another show this episode is borrowed from
        #[serde(default, skip_serializing_if = "Option::is_none")]
        show_id: Option<u32>,
        /// Provider-native episode id (absent for override-declared runs)
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
    },
    Movie {
        tmdb_id: u32,
    },
}

impl Origin {
    pub fn kind(&self) -> OriginKind {
        match self {
            Origin::Tv { .. } => OriginKind::Tv,
            Origin::Movie { .. } => OriginKind::Movie,
        }
    }

    /// Key used in the reverse mapping table.
    ///
    /// TV origins key on `(season, episode)`, movies on their id, so the two
    /// forms can never collide.
    pub fn mapping_key(&self) -> MappingKey {
        match self {
            Origin::Tv {
                season_number,
                episode_number,
                ..
            } => MappingKey::Episode {
                season: *season_number,
                episode: *episode_number,
            },
            Origin::Movie { tmdb_id } => MappingKey::Movie(*tmdb_id),
        }
    }

    /// The record that has to be fetched separately to get full metadata
    pub fn identity(&self) -> OriginIdentity {
        match self {
            Origin::Tv {
                season_number,
                show_id,
                ..
            } => OriginIdentity::TvSeason {
                show_id: *show_id,
                season_number: *season_number,
            },
            Origin::Movie { tmdb_id } => OriginIdentity::Movie { tmdb_id: *tmdb_id },
        }
    }
}

/// Key of the reverse mapping table (`origin -> logical coordinates`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MappingKey {
    Episode { season: u32, episode: u32 },
    Movie(u32),
}

impl MappingKey {
    pub fn episode(season: u32, episode: u32) -> Self {
        MappingKey::Episode { season, episode }
    }
}

impl fmt::Display for MappingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingKey::Episode { season, episode } => write!(f, "S{:02}E{:02}", season, episode),
            MappingKey::Movie(id) => write!(f, "movie:{}", id),
        }
    }
}

// Serialized as a string so it can be a JSON object key.
impl Serialize for MappingKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Distinct provider record a logical season draws from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OriginIdentity {
    #[serde(rename = "tv")]
    TvSeason {
        show_id: Option<u32>,
        season_number: u32,
    },
    Movie {
        tmdb_id: u32,
    },
}

/// One logical episode of a [`LogicSeason`](super::logic::LogicSeason)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeMap {
    /// Logical episode number within the owning season
    pub order: u32,
    pub origin: Origin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub air_date: Option<String>,
}

impl EpisodeMap {
    pub fn tv(order: u32, season_number: u32, episode_number: u32) -> Self {
        Self {
            order,
            origin: Origin::Tv {
                season_number,
                episode_number,
                show_id: None,
                id: None,
            },
            name: None,
            air_date: None,
        }
    }

    pub fn movie(order: u32, tmdb_id: u32) -> Self {
        Self {
            order,
            origin: Origin::Movie { tmdb_id },
            name: None,
            air_date: None,
        }
    }

    /// Record a raw provider episode at a logical position.
    ///
    /// `season_number` is the raw season the episode was fetched from; the
    /// episode's own field wins when present.
    pub fn from_provider(order: u32, season_number: u32, episode: &ProviderEpisode) -> Self {
        Self {
            order,
            origin: Origin::Tv {
                season_number: episode.season_number.unwrap_or(season_number),
                episode_number: episode.episode_number,
                show_id: None,
                id: Some(episode.id),
            },
            name: episode.name.clone(),
            air_date: episode.air_date.clone(),
        }
    }

    pub fn mapping_key(&self) -> MappingKey {
        self.origin.mapping_key()
    }

    pub fn identity(&self) -> OriginIdentity {
        self.origin.identity()
    }

    pub fn kind(&self) -> OriginKind {
        self.origin.kind()
    }

    pub fn is_tv(&self) -> bool {
        matches!(self.origin, Origin::Tv { .. })
    }

    /// Provider-native unique id (movie id for movie origins)
    pub fn native_id(&self) -> Option<u64> {
        match &self.origin {
            Origin::Tv { id, .. } => *id,
            Origin::Movie { tmdb_id } => Some(u64::from(*tmdb_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_keys_do_not_collide() {
        let tv = EpisodeMap::tv(1, 1, 999);
        let movie = EpisodeMap::movie(1, 999);
        assert_ne!(tv.mapping_key(), movie.mapping_key());
        assert_eq!(tv.mapping_key(), MappingKey::episode(1, 999));
        assert_eq!(movie.mapping_key(), MappingKey::Movie(999));
    }

    #[test]
    fn test_mapping_key_display() {
        assert_eq!(MappingKey::episode(1, 13).to_string(), "S01E13");
        assert_eq!(MappingKey::Movie(999).to_string(), "movie:999");
    }

    #[test]
    fn test_mapping_key_as_json_object_key() {
        let mut map = std::collections::BTreeMap::new();
        map.insert(MappingKey::episode(2, 1), (3u32, 1u32));
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"S02E01":[3,1]}"#);
    }

    #[test]
    fn test_from_provider_prefers_episode_season() {
        let ep = ProviderEpisode {
            id: 42,
            episode_number: 7,
            season_number: Some(3),
            ..Default::default()
        };
        let map = EpisodeMap::from_provider(2, 1, &ep);
        assert_eq!(map.mapping_key(), MappingKey::episode(3, 7));
        assert_eq!(map.native_id(), Some(42));
    }
}
