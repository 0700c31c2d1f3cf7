//! Minimal CLI parsing.

use std::env;

use anyhow::{Context, Result, bail};

pub const USAGE: &str =
    "usage: seasonsplit <tmdb_id> [--season N] [--episode N] [--cont-eps] [--refresh]";

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CliOptions {
    pub tmdb_id: u32,
    /// Logical season to translate back to provider coordinates
    pub season: Option<u32>,
    pub episode: Option<u32>,
    /// Force continuous numbering regardless of config
    pub cont_eps: bool,
    /// Re-download the remote override document
    pub refresh: bool,
}

impl CliOptions {
    pub fn from_args() -> Result<Self> {
        Self::parse(env::args().skip(1))
    }

    pub fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut options = CliOptions::default();
        let mut tmdb_id = None;
        let mut args = args.into_iter();

        while let Some(arg) = args.next() {
            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) if arg.starts_with("--") => (flag.to_string(), Some(value.to_string())),
                _ => (arg.clone(), None),
            };

            match flag.as_str() {
                "--season" => options.season = Some(number(&flag, inline.or_else(|| args.next()))?),
                "--episode" => options.episode = Some(number(&flag, inline.or_else(|| args.next()))?),
                "--cont-eps" => options.cont_eps = true,
                "--refresh" => options.refresh = true,
                "-h" | "--help" => bail!(USAGE),
                _ if flag.starts_with('-') => bail!("unknown option {flag}\n{USAGE}"),
                _ if tmdb_id.is_none() => {
                    tmdb_id = Some(arg.parse().with_context(|| format!("invalid tmdb id {arg:?}"))?);
                }
                _ => bail!("unexpected argument {arg:?}\n{USAGE}"),
            }
        }

        options.tmdb_id = tmdb_id.context(USAGE)?;
        if options.episode.is_some() && options.season.is_none() {
            bail!("--episode requires --season");
        }
        Ok(options)
    }
}

fn number(flag: &str, value: Option<String>) -> Result<u32> {
    let value = value.with_context(|| format!("{flag} needs a value"))?;
    value
        .parse()
        .with_context(|| format!("invalid value for {flag}: {value:?}"))
}
