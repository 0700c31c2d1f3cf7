//! Bangumi API client, used as the heuristic season source
//!
//! Bangumi lists each broadcast season of an anime as its own subject and
//! links them with sequel relations. Walking that chain from the subject that
//! matches a provider title gives one declared season per subject.
//!
//! API docs: https://bangumi.github.io/api/

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::cache::ResponseCache;
use super::rate_limiter::{ApiService, RateLimitedClient};
use crate::split::{EpisodeProgress, HeuristicSource, SeasonEntry, SeriesEntry, SubjectHit};

const BASE_URL: &str = "https://api.bgm.tv/";
const RESPONSE_TTL: Duration = Duration::from_secs(6 * 60 * 60);
/// Subject type id for anime
const SUBJECT_TYPE_ANIME: u32 = 2;
/// Search window around the provider air date
const SEARCH_WINDOW_DAYS: i64 = 10;
const SEARCH_LIMIT: &str = "10";
const RELATION_SEQUEL: &str = "续集";
const PLATFORM_THEATRICAL: &str = "剧场版";

static KEYWORD_STRIP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\x{2000}-\x{206f}\x{3000}-\x{303f}\x{ff00}-\x{ffef}\W_]").expect("valid keyword regex")
});
static CJK_SEASON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[第\s]*([一二三四五六七八九十ⅠⅡⅢⅣ0-9]+)\s*(?:季|期)").expect("valid season regex")
});
static SEASON_WORD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)Season\s*([0-9ⅠⅡⅢⅣ]+)").expect("valid season regex"));
static ORDINAL_SEASON_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)([0-9]{1,2})(?:st|nd|rd|th)\s+season").expect("valid season regex")
});

/// Subject details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectDetail {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub name_cn: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    /// Episode total
    #[serde(default)]
    pub eps: u32,
}

/// Entry of a subject's relation list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelatedSubject {
    pub id: u64,
    #[serde(default)]
    pub relation: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub name_cn: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EpisodePage {
    #[serde(default)]
    pub data: Vec<BangumiEpisode>,
    #[serde(default)]
    pub total: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BangumiEpisode {
    #[serde(default)]
    pub id: Option<u64>,
    /// Position within the whole franchise
    #[serde(default)]
    pub sort: Option<f64>,
    /// Number within the subject
    #[serde(default)]
    pub ep: Option<f64>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SubjectHit>,
}

/// Bangumi API client with rate limiting, retry and a response cache
pub struct BangumiClient {
    client: RateLimitedClient,
    base_url: String,
    cache: ResponseCache,
}

impl Default for BangumiClient {
    fn default() -> Self {
        Self::new()
    }
}

impl BangumiClient {
    pub fn new() -> Self {
        Self {
            client: RateLimitedClient::new(ApiService::Bangumi),
            base_url: BASE_URL.to_string(),
            cache: ResponseCache::new(RESPONSE_TTL),
        }
    }

    /// Cache-busting stamp; subject data is refreshed at most once a day
    fn day_stamp() -> String {
        Utc::now().format("%Y%m%d").to_string()
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: Vec<(&'static str, String)>) -> Option<T> {
        let params = query.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
        let url = format!("{}{}", self.base_url, path);
        self.cached(ResponseCache::key("GET", path, &params), path, |client| {
            client.get(&url).query(&query)
        })
        .await
    }

    async fn post_json<T: DeserializeOwned>(&self, path: &str, body: Value) -> Option<T> {
        let url = format!("{}{}", self.base_url, path);
        self.cached(ResponseCache::key("POST", path, &body.to_string()), path, |client| {
            client.post(&url).query(&[("limit", SEARCH_LIMIT)]).json(&body)
        })
        .await
    }

    /// Serve from the response cache, else send and cache the body.
    /// Failures and 404s are logged and yield `None`.
    async fn cached<T, F>(&self, key: String, path: &str, build: F) -> Option<T>
    where
        T: DeserializeOwned,
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    {
        if let Some(value) = self.cache.get(&key) {
            return decode(value, path);
        }
        match self.client.fetch_json::<Value, _>(build, "bangumi_request").await {
            Ok(Some(value)) => {
                self.cache.insert(key, value.clone());
                decode(value, path)
            }
            Ok(None) => {
                debug!(path = %path, "Bangumi returned 404");
                None
            }
            Err(e) => {
                warn!(path = %path, error = %format!("{e:#}"), "Bangumi request failed");
                None
            }
        }
    }

    /// Search anime subjects aired within ten days of `air_date`
    pub async fn search(&self, title: &str, air_date: Option<&str>) -> Vec<SubjectHit> {
        let keyword = sanitize_keyword(title);
        if keyword.is_empty() {
            return Vec::new();
        }
        let Some(air_date) = air_date else {
            return Vec::new();
        };
        let date = match NaiveDate::parse_from_str(air_date, "%Y-%m-%d") {
            Ok(date) => date,
            Err(e) => {
                warn!(air_date = %air_date, error = %e, "Unparseable air date, skipping Bangumi search");
                return Vec::new();
            }
        };
        let window = chrono::Duration::days(SEARCH_WINDOW_DAYS);

        let body = json!({
            "keyword": keyword,
            "sort": "match",
            "filter": {
                "type": [SUBJECT_TYPE_ANIME],
                "air_date": [
                    format!(">={}", date - window),
                    format!("<={}", date + window),
                ],
            },
        });

        let hits = self
            .post_json::<SearchResponse>("v0/search/subjects", body)
            .await
            .map(|r| r.data)
            .unwrap_or_default();
        debug!(keyword = %keyword, count = hits.len(), "Bangumi search returned results");
        hits
    }

    pub async fn detail(&self, subject_id: u64) -> Option<SubjectDetail> {
        self.get_json(
            &format!("v0/subjects/{}", subject_id),
            vec![("_ts", Self::day_stamp())],
        )
        .await
    }

    /// Related subjects of a subject
    pub async fn subjects(&self, subject_id: u64) -> Vec<RelatedSubject> {
        self.get_json(
            &format!("v0/subjects/{}/subjects", subject_id),
            vec![("_ts", Self::day_stamp())],
        )
        .await
        .unwrap_or_default()
    }

    /// One page of a subject's episodes; `kind` 0 is the main story
    pub async fn episodes(&self, subject_id: u64, kind: u32, limit: u32, offset: u32) -> Option<EpisodePage> {
        self.get_json(
            "v0/episodes",
            vec![
                ("subject_id", subject_id.to_string()),
                ("type", kind.to_string()),
                ("limit", limit.to_string()),
                ("offset", offset.to_string()),
                ("_ts", Self::day_stamp()),
            ],
        )
        .await
    }

    /// The subject followed by its sequel chain, depth first
    pub async fn get_all_sequels(&self, subject_id: u64) -> Vec<u64> {
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![subject_id];

        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            chain.push(current);

            let sequels: Vec<u64> = self
                .subjects(current)
                .await
                .into_iter()
                .filter(|s| s.relation == RELATION_SEQUEL)
                .map(|s| s.id)
                .collect();
            // Reversed so the first listed sequel is walked first
            stack.extend(sequels.into_iter().rev());
        }

        debug!(subject = subject_id, chain = ?chain, "Collected sequel chain");
        chain
    }

    /// Season boundaries from the sequel chain of `subject`.
    ///
    /// Theatrical subjects are skipped. Returns `None` unless at least two
    /// seasons come out of the chain.
    pub async fn season_info(&self, subject: &SubjectHit) -> Option<SeriesEntry> {
        let mut seasons: Vec<SeasonEntry> = Vec::new();

        for sid in self.get_all_sequels(subject.id).await {
            let Some(detail) = self.detail(sid).await else {
                continue;
            };
            if detail.platform.as_deref() == Some(PLATFORM_THEATRICAL) {
                continue;
            }

            let number = extract_season_number(detail.name.as_deref(), detail.name_cn.as_deref());
            let progress = if seasons.iter().any(|s| s.season_number == number) {
                match self.get_sort_and_ep(sid).await {
                    Some(progress) => Some(progress),
                    None => continue,
                }
            } else {
                None
            };

            let name = detail.name_cn.filter(|n| !n.is_empty());
            fold_subject(&mut seasons, number, name, detail.eps, progress);
        }

        if seasons.len() < 2 {
            debug!(subject = subject.id, seasons = seasons.len(), "Sequel chain does not split");
            return None;
        }
        Some(SeriesEntry {
            name: None,
            seasons,
        })
    }

    /// Numbering of the subject's first main-story episode
    pub async fn get_sort_and_ep(&self, subject_id: u64) -> Option<EpisodeProgress> {
        let page = self.episodes(subject_id, 0, 1, 0).await?;
        let first = page.data.first()?;
        let progress = EpisodeProgress {
            sort: first.sort?,
            ep: first.ep?,
        };
        debug!(subject = subject_id, sort = progress.sort, ep = progress.ep, "Episode progress");
        Some(progress)
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}

#[async_trait]
impl HeuristicSource for BangumiClient {
    async fn search(&self, title: &str, air_date: Option<&str>) -> Vec<SubjectHit> {
        BangumiClient::search(self, title, air_date).await
    }

    async fn season_info(&self, subject: &SubjectHit) -> Option<SeriesEntry> {
        BangumiClient::season_info(self, subject).await
    }

    async fn get_sort_and_ep(&self, subject_id: u64) -> Option<EpisodeProgress> {
        BangumiClient::get_sort_and_ep(self, subject_id).await
    }

    fn clear(&self) {
        BangumiClient::clear(self);
    }
}

fn decode<T: DeserializeOwned>(value: Value, path: &str) -> Option<T> {
    serde_json::from_value(value)
        .map_err(|e| warn!(path = %path, error = %e, "Unexpected Bangumi response shape"))
        .ok()
}

/// Search keyword with punctuation, symbols and full-width forms removed
pub fn sanitize_keyword(title: &str) -> String {
    KEYWORD_STRIP_RE.replace_all(title, "").into_owned()
}

/// Add one chained subject to the season list.
///
/// A new season number opens a season. A repeated one either extends that
/// season (numbering continues) or, when the subject restarts its own
/// numbering, opens a season after the highest seen so far.
pub fn fold_subject(
    seasons: &mut Vec<SeasonEntry>,
    number: u32,
    name: Option<String>,
    eps: u32,
    progress: Option<EpisodeProgress>,
) {
    let existing = seasons.iter().position(|s| s.season_number == number);
    match (existing, progress) {
        (None, _) => seasons.push(SeasonEntry {
            name,
            episode_count: eps,
            season_number: number,
            include: None,
        }),
        (Some(_), Some(p)) if p.restarts_numbering() => {
            let next = seasons.iter().map(|s| s.season_number).max().unwrap_or(0) + 1;
            seasons.push(SeasonEntry {
                name,
                episode_count: eps,
                season_number: next,
                include: None,
            });
        }
        (Some(idx), Some(_)) => seasons[idx].episode_count += eps,
        (Some(_), None) => {}
    }
}

/// Season number from a subject's names, `name_cn` taking precedence.
/// Defaults to 1.
pub fn extract_season_number(name: Option<&str>, name_cn: Option<&str>) -> u32 {
    name_cn
        .and_then(parse_season_number)
        .or_else(|| name.and_then(parse_season_number))
        .unwrap_or(1)
}

fn parse_season_number(text: &str) -> Option<u32> {
    if text.is_empty() {
        return None;
    }
    if let Some(n) = CJK_SEASON_RE
        .captures(text)
        .and_then(|c| parse_numeral(c[1].trim()))
    {
        return Some(n);
    }
    if let Some(n) = SEASON_WORD_RE
        .captures(text)
        .and_then(|c| parse_numeral(c[1].trim()))
    {
        return Some(n);
    }
    ORDINAL_SEASON_RE
        .captures(text)
        .and_then(|c| c[1].parse().ok())
        .filter(|n| *n > 0)
}

/// ASCII digits, a single Roman numeral Ⅰ-Ⅳ, or a Chinese numeral up to 99
fn parse_numeral(text: &str) -> Option<u32> {
    if text.chars().all(|c| c.is_ascii_digit()) {
        return text.parse().ok().filter(|n| *n > 0);
    }

    let roman = match text {
        "Ⅰ" => Some(1),
        "Ⅱ" => Some(2),
        "Ⅲ" => Some(3),
        "Ⅳ" => Some(4),
        _ => None,
    };
    if roman.is_some() {
        return roman;
    }

    let mut total = 0;
    let mut digit = 0;
    for c in text.chars() {
        match c {
            '十' => {
                total += if digit == 0 { 10 } else { digit * 10 };
                digit = 0;
            }
            _ => {
                digit = match c {
                    '一' => 1,
                    '二' => 2,
                    '三' => 3,
                    '四' => 4,
                    '五' => 5,
                    '六' => 6,
                    '七' => 7,
                    '八' => 8,
                    '九' => 9,
                    _ => return None,
                };
            }
        }
    }
    Some(total + digit).filter(|n| *n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_season_number_patterns() {
        assert_eq!(extract_season_number(Some("進撃の巨人 Season 2"), None), 2);
        assert_eq!(extract_season_number(Some("Kaguya-sama 2nd Season"), None), 2);
        assert_eq!(extract_season_number(None, Some("辉夜大小姐想让我告白 第三季")), 3);
        assert_eq!(extract_season_number(None, Some("某作品 第十二期")), 12);
        assert_eq!(extract_season_number(None, Some("某作品 第二十一季")), 21);
        assert_eq!(extract_season_number(Some("Overlord Ⅲ Season Ⅲ"), None), 3);
        assert_eq!(extract_season_number(Some("Plain Title"), Some("普通标题")), 1);
        assert_eq!(extract_season_number(None, None), 1);
    }

    #[test]
    fn test_name_cn_wins() {
        assert_eq!(extract_season_number(Some("Season 3"), Some("第二季")), 2);
        // Falls back to name when name_cn has no marker
        assert_eq!(extract_season_number(Some("Season 3"), Some("标题")), 3);
    }

    #[test]
    fn test_parse_numeral() {
        assert_eq!(parse_numeral("十"), Some(10));
        assert_eq!(parse_numeral("十五"), Some(15));
        assert_eq!(parse_numeral("四十"), Some(40));
        assert_eq!(parse_numeral("0"), None);
        assert_eq!(parse_numeral("二Ⅱ"), None);
    }

    #[test]
    fn test_sanitize_keyword() {
        assert_eq!(sanitize_keyword("Re:ゼロから始める異世界生活"), "Reゼロから始める異世界生活");
        assert_eq!(sanitize_keyword("【推しの子】"), "推しの子");
        assert_eq!(sanitize_keyword("Kaguya-sama: Love is War"), "KaguyasamaLoveisWar");
    }

    #[test]
    fn test_fold_subject_new_and_merged() {
        let mut seasons = Vec::new();
        fold_subject(&mut seasons, 1, Some("第一季".to_string()), 12, None);
        fold_subject(&mut seasons, 2, None, 12, None);
        // Split cour numbered after the first part
        fold_subject(&mut seasons, 2, None, 13, Some(EpisodeProgress { sort: 25.0, ep: 13.0 }));
        assert_eq!(seasons.len(), 2);
        assert_eq!(seasons[1].episode_count, 25);
    }

    #[test]
    fn test_fold_subject_restart_opens_season() {
        let mut seasons = Vec::new();
        fold_subject(&mut seasons, 1, None, 12, None);
        fold_subject(&mut seasons, 1, Some("续篇".to_string()), 10, Some(EpisodeProgress { sort: 1.0, ep: 1.0 }));
        assert_eq!(seasons.len(), 2);
        assert_eq!(seasons[1].season_number, 2);
        assert_eq!(seasons[1].episode_count, 10);
    }

    #[test]
    fn test_fold_subject_unknown_progress_ignored() {
        let mut seasons = Vec::new();
        fold_subject(&mut seasons, 1, None, 12, None);
        fold_subject(&mut seasons, 1, None, 12, None);
        assert_eq!(seasons.len(), 1);
        assert_eq!(seasons[0].episode_count, 12);
    }

    #[test]
    fn test_episode_page_decoding() {
        let value = json!({"data": [{"id": 5, "sort": 13, "ep": 1, "name": "x"}], "total": 12});
        let page: EpisodePage = decode(value, "v0/episodes").unwrap();
        assert_eq!(page.data[0].sort, Some(13.0));
        assert_eq!(page.total, 12);
    }

    #[tokio::test]
    async fn test_search_without_air_date_is_empty() {
        let client = BangumiClient::new();
        assert!(client.search("Title", None).await.is_empty());
        assert!(client.search("", Some("2020-01-01")).await.is_empty());
        assert!(client.search("Title", Some("not a date")).await.is_empty());
    }
}
