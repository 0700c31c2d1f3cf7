//! Duplicate-episode resolver
//!
//! Providers sometimes list the same broadcast in two reported seasons, with
//! different amounts of metadata filled in. Before the raw episodes are walked
//! those duplicates are collapsed so the episode counts used for splitting
//! are accurate.

use std::collections::HashMap;

use tracing::{debug, info};

use super::providers::{ProviderEpisode, ProviderSeason};

/// How complete an episode record is.
///
/// Name 10, overview 8, still image 5, a nonzero vote average 3, and 1 for
/// every other populated optional field. Crew and guest stars are not carried
/// on [`ProviderEpisode`] and never score.
pub fn completeness_score(episode: &ProviderEpisode) -> u32 {
    fn filled(value: &Option<String>) -> bool {
        value.as_deref().is_some_and(|v| !v.trim().is_empty())
    }

    let mut score = 0;
    if filled(&episode.name) {
        score += 10;
    }
    if filled(&episode.overview) {
        score += 8;
    }
    if filled(&episode.still_path) {
        score += 5;
    }
    if episode.vote_average.is_some_and(|v| v > 0.0) {
        score += 3;
    }

    score += [
        filled(&episode.air_date),
        episode.season_number.is_some(),
        episode.vote_count.is_some(),
        episode.runtime.is_some(),
        filled(&episode.episode_type),
        filled(&episode.production_code),
    ]
    .into_iter()
    .filter(|present| *present)
    .count() as u32;

    score
}

/// Collapse episodes that share an air date across different raw seasons.
///
/// The first-seen slot survives and takes the data of whichever record scores
/// higher (ties keep the first-seen record); the later slot is removed.
/// Seasons left without episodes are dropped. Returns the number of removed
/// episodes.
pub fn resolve_duplicate_episodes(seasons: &mut Vec<ProviderSeason>) -> usize {
    let mut first_seen: HashMap<String, (usize, usize)> = HashMap::new();
    let mut removals: Vec<(usize, usize)> = Vec::new();

    for season_idx in 0..seasons.len() {
        for episode_idx in 0..seasons[season_idx].episodes.len() {
            let Some(air_date) = seasons[season_idx].episodes[episode_idx]
                .air_date
                .clone()
                .filter(|d| !d.is_empty())
            else {
                continue;
            };

            let Some(&(kept_season, kept_episode)) = first_seen.get(&air_date) else {
                first_seen.insert(air_date, (season_idx, episode_idx));
                continue;
            };

            // Same-day episodes within one season are double features, not duplicates
            if kept_season == season_idx {
                continue;
            }

            let kept_score = completeness_score(&seasons[kept_season].episodes[kept_episode]);
            let candidate = &seasons[season_idx].episodes[episode_idx];
            let candidate_score = completeness_score(candidate);

            info!(
                air_date = %air_date,
                kept_season = seasons[kept_season].season_number,
                duplicate_season = seasons[season_idx].season_number,
                kept_score,
                candidate_score,
                "Collapsing duplicate episode"
            );

            if candidate_score > kept_score {
                let replacement = candidate.clone();
                seasons[kept_season].episodes[kept_episode] = replacement;
            }
            removals.push((season_idx, episode_idx));
        }
    }

    // Descending so earlier indices stay valid
    removals.sort_unstable_by(|a, b| b.cmp(a));
    for (season_idx, episode_idx) in &removals {
        seasons[*season_idx].episodes.remove(*episode_idx);
    }

    let before = seasons.len();
    seasons.retain(|s| !s.episodes.is_empty());
    if seasons.len() != before {
        debug!(dropped = before - seasons.len(), "Dropped raw seasons left empty");
    }

    removals.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(id: u64, season: u32, number: u32, air_date: &str) -> ProviderEpisode {
        ProviderEpisode {
            id,
            episode_number: number,
            season_number: Some(season),
            air_date: Some(air_date.to_string()),
            ..Default::default()
        }
    }

    fn season(number: u32, episodes: Vec<ProviderEpisode>) -> ProviderSeason {
        ProviderSeason {
            season_number: number,
            episodes,
            ..Default::default()
        }
    }

    #[test]
    fn test_score_weights() {
        let mut ep = ProviderEpisode::default();
        assert_eq!(completeness_score(&ep), 0);
        ep.name = Some("Pilot".to_string());
        assert_eq!(completeness_score(&ep), 10);
        ep.overview = Some("Things happen".to_string());
        ep.still_path = Some("/a.jpg".to_string());
        ep.vote_average = Some(8.0);
        assert_eq!(completeness_score(&ep), 26);
        ep.runtime = Some(24);
        assert_eq!(completeness_score(&ep), 27);
        ep.overview = Some("   ".to_string());
        assert_eq!(completeness_score(&ep), 19);
    }

    #[test]
    fn test_unrated_episode_scores_no_vote_points() {
        let mut rated = episode(1, 1, 1, "2020-01-01");
        let mut unrated = rated.clone();
        rated.vote_average = Some(7.5);
        unrated.vote_average = Some(0.0);
        assert_eq!(completeness_score(&rated), completeness_score(&unrated) + 3);
        unrated.vote_average = None;
        assert_eq!(completeness_score(&rated), completeness_score(&unrated) + 3);
    }

    #[test]
    fn test_better_duplicate_replaces_first_slot() {
        let mut a = vec![
            episode(1, 1, 1, "2020-01-01"),
            episode(2, 1, 2, "2020-01-08"),
            episode(3, 1, 3, "2020-01-15"),
        ];
        let mut better = episode(10, 2, 1, "2020-01-15");
        better.overview = Some("Full synopsis".to_string());
        let b = vec![better.clone(), episode(11, 2, 2, "2020-01-22")];
        a[2].name = None;

        let mut seasons = vec![season(1, a), season(2, b)];
        let removed = resolve_duplicate_episodes(&mut seasons);

        assert_eq!(removed, 1);
        let total: usize = seasons.iter().map(|s| s.episodes.len()).sum();
        assert_eq!(total, 4);
        assert_eq!(seasons[0].episodes[2], better);
        assert_eq!(seasons[1].episodes.len(), 1);
        assert_eq!(seasons[1].episodes[0].id, 11);
    }

    #[test]
    fn test_tie_keeps_first_seen() {
        let first = episode(1, 1, 1, "2020-01-01");
        let mut seasons = vec![
            season(1, vec![first.clone()]),
            season(2, vec![episode(2, 2, 1, "2020-01-01"), episode(3, 2, 2, "2020-01-08")]),
        ];
        resolve_duplicate_episodes(&mut seasons);
        assert_eq!(seasons[0].episodes[0], first);
        assert_eq!(seasons[1].episodes.len(), 1);
    }

    #[test]
    fn test_same_season_same_day_untouched() {
        let mut seasons = vec![season(
            1,
            vec![episode(1, 1, 1, "2020-01-01"), episode(2, 1, 2, "2020-01-01")],
        )];
        assert_eq!(resolve_duplicate_episodes(&mut seasons), 0);
        assert_eq!(seasons[0].episodes.len(), 2);
    }

    #[test]
    fn test_emptied_season_is_dropped() {
        let mut seasons = vec![
            season(1, vec![episode(1, 1, 1, "2020-01-01"), episode(2, 1, 2, "2020-01-08")]),
            season(2, vec![episode(3, 2, 1, "2020-01-08")]),
        ];
        assert_eq!(resolve_duplicate_episodes(&mut seasons), 1);
        assert_eq!(seasons.len(), 1);
        assert_eq!(seasons[0].season_number, 1);
    }

    #[test]
    fn test_missing_air_dates_never_match() {
        let mut a = episode(1, 1, 1, "");
        a.air_date = None;
        let b = episode(2, 2, 1, "");
        let mut seasons = vec![season(1, vec![a]), season(2, vec![b])];
        assert_eq!(resolve_duplicate_episodes(&mut seasons), 0);
    }
}
