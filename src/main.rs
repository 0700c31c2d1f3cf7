//! seasonsplit CLI
//!
//! Recognizes a TMDB title, rebuilds its logical seasons and prints them as
//! JSON on stdout. Logs go to stderr.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seasonsplit::cli::CliOptions;
use seasonsplit::config::Config;
use seasonsplit::services::{BangumiClient, FetchOutcome, OverrideSource, Remapper, TmdbClient};
use seasonsplit::split::{HeuristicSource, RecognitionScope, SeasonCache, SeasonProvider, SeasonSplitter};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "seasonsplit=info".into());
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let options = CliOptions::from_args()?;
    let config = Config::from_env()?;
    tracing::debug!(
        language = %config.tmdb_language,
        source = %config.override_source,
        use_cont_eps = config.use_cont_eps,
        "Configuration loaded"
    );

    let tmdb = Arc::new(TmdbClient::new(
        config.require_tmdb_api_key()?.to_string(),
        config.tmdb_language.clone(),
    ));

    let overrides = Arc::new(OverrideSource::new(&config.override_source, &config.data_path));
    match overrides.fetch_and_save_remote(options.refresh).await {
        Ok(FetchOutcome::Downloaded) => tracing::info!("Override document refreshed"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "Override document unavailable, continuing without it"),
    }

    let heuristic: Option<Arc<dyn HeuristicSource>> = config
        .bangumi_enabled
        .then(|| Arc::new(BangumiClient::new()) as Arc<dyn HeuristicSource>);

    let cache = Arc::new(SeasonCache::new(
        config.season_cache_capacity,
        config.use_cont_eps || options.cont_eps,
    ));
    let upstream: Arc<dyn SeasonProvider> = tmdb;
    let remapper = Remapper::new(upstream, SeasonSplitter::new(overrides, heuristic), cache.clone());

    let show = remapper
        .recognize(RecognitionScope::root(), options.tmdb_id, None)
        .await
        .with_context(|| format!("TMDB title {} not found", options.tmdb_id))?;

    let lookup = options
        .season
        .map(|season| cache.org_season_episode(options.tmdb_id, season, options.episode));

    let output = json!({
        "tmdb_id": show.tmdb_id,
        "title": show.title,
        "remapped": cache.get(options.tmdb_id).is_some(),
        "number_of_seasons": show.number_of_seasons,
        "seasons": show.season_info,
        "episodes": show.seasons,
        "reverse_map": cache.org_map(options.tmdb_id),
        "lookup": lookup,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}
