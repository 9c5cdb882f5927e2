// src/config.rs
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};

use crate::ingest::types::SubSource;

const ENV_SOURCES_PATH: &str = "SOURCES_CONFIG_PATH";

/// Everything the composition root needs to wire the service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub schedule: ScheduleConfig,
    pub harvest: HarvestConfig,
    pub reddit: RedditConfig,
    pub instagram: InstagramConfig,
    pub port: u16,
    pub state_path: PathBuf,
}

/// Night-session timing. The session starts daily at `start_hour` and keeps
/// cycling until `duration_minutes` have elapsed.
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub start_hour: u8,
    pub duration_minutes: u64,
    pub interval_minutes: u64,
    /// Pause after a failed cycle before re-entering the loop.
    pub recovery_seconds: u64,
}

impl ScheduleConfig {
    /// Six-field cron expression (sec min hour dom mon dow) for the nightly
    /// trigger.
    pub fn cron_expr(&self) -> String {
        format!("0 0 {} * * *", self.start_hour)
    }
}

/// Per-invocation fetch bounds shared by both sources.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    pub categories_per_cycle: usize,
    /// Cooperative pacing between sub-source fetches.
    pub fetch_delay_seconds: u64,
    pub max_sweeps: u32,
    pub target_items: u32,
    pub workers: usize,
}

#[derive(Debug, Clone)]
pub struct RedditConfig {
    pub base_url: String,
    pub sub_sources: Vec<SubSource>,
    pub poll_limit: usize,
}

#[derive(Debug, Clone)]
pub struct InstagramConfig {
    pub base_url: String,
    pub accounts: Vec<SubSource>,
    pub accounts_per_cycle: usize,
    pub posts_per_account: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let schedule = ScheduleConfig {
            enabled: env_parse("SCHEDULER_ENABLED", true),
            start_hour: env_parse("NIGHT_FETCH_START_HOUR", 3u8),
            duration_minutes: env_parse("NIGHT_FETCH_DURATION_MINUTES", 30),
            interval_minutes: env_parse("NIGHT_FETCH_INTERVAL_MINUTES", 5),
            recovery_seconds: env_parse("CYCLE_RECOVERY_SECONDS", 60),
        };
        if schedule.start_hour > 23 {
            bail!("NIGHT_FETCH_START_HOUR must be 0-23, got {}", schedule.start_hour);
        }
        if schedule.duration_minutes == 0 || schedule.interval_minutes == 0 {
            bail!("night fetch duration and interval must be positive");
        }

        let harvest = HarvestConfig {
            categories_per_cycle: env_parse("CATEGORIES_PER_CYCLE", 3),
            fetch_delay_seconds: env_parse("FETCH_DELAY_SECONDS", 2),
            max_sweeps: env_parse("MAX_SWEEPS_PER_FETCH", 20),
            target_items: env_parse("TARGET_ITEMS_PER_FETCH", 30),
            workers: env_parse("FETCH_WORKERS", 4),
        };
        if harvest.categories_per_cycle == 0 || harvest.max_sweeps == 0 || harvest.target_items == 0
        {
            bail!("categories per cycle, max sweeps and target items must be positive");
        }

        let (reddit_pool, instagram_accounts) = load_sources_default()?;

        Ok(Self {
            schedule,
            harvest,
            reddit: RedditConfig {
                base_url: env_string("REDDIT_BASE_URL", "https://www.reddit.com"),
                sub_sources: reddit_pool,
                poll_limit: env_parse("REDDIT_POLL_LIMIT", 25),
            },
            instagram: InstagramConfig {
                base_url: env_string("INSTAGRAM_BASE_URL", "https://i.instagram.com"),
                accounts: instagram_accounts,
                accounts_per_cycle: env_parse("INSTAGRAM_ACCOUNTS_PER_CYCLE", 1),
                posts_per_account: env_parse("INSTAGRAM_POSTS_PER_ACCOUNT", 10),
            },
            port: env_parse("PORT", 8000),
            state_path: PathBuf::from(env_string("STATE_PATH", "state/memes.json")),
        })
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

// --- sub-source pools ---

/// Built-in category → subreddit mapping, used when no sources file is
/// configured.
const DEFAULT_REDDIT_CATEGORIES: &[(&str, &[&str])] = &[
    (
        "dark",
        &["DarkMemes_", "DarkMemesPh", "darkmemers", "darkmemes", "dankmemes"],
    ),
    ("comedy", &["memes", "funny"]),
    ("wholesome", &["wholesomememes"]),
    ("general", &["memes"]),
];

const DEFAULT_INSTAGRAM_ACCOUNTS: &[&str] = &[
    "theanimeboiis",
    "weebily",
    "idleglance",
    "isekaij",
    "spiffydripmemes",
    "good.life.good.thoughts",
    "meme_in_my_way",
    "memes_with_aaruhi",
    "societyofmature",
    "alwayschillin",
];

pub fn default_reddit_pool() -> Vec<SubSource> {
    let mut pool = Vec::new();
    for (category, subs) in DEFAULT_REDDIT_CATEGORIES {
        for name in *subs {
            pool.push(SubSource::new(*name, *category));
        }
    }
    pool
}

pub fn default_instagram_pool() -> Vec<SubSource> {
    DEFAULT_INSTAGRAM_ACCOUNTS
        .iter()
        .map(|name| SubSource::new(*name, "instagram"))
        .collect()
}

#[derive(Debug, Default, serde::Deserialize)]
struct SourcesFile {
    #[serde(default)]
    reddit: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    instagram: InstagramSection,
}

#[derive(Debug, Default, serde::Deserialize)]
struct InstagramSection {
    #[serde(default)]
    accounts: Vec<String>,
}

/// Load sub-source pools from an explicit TOML file:
///
/// ```toml
/// [reddit]
/// comedy = ["memes", "funny"]
///
/// [instagram]
/// accounts = ["some.account"]
/// ```
pub fn load_sources_from(path: &Path) -> Result<(Vec<SubSource>, Vec<SubSource>)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    parse_sources(&content)
}

/// Load pools using env var + fallbacks:
/// 1) $SOURCES_CONFIG_PATH
/// 2) config/sources.toml
/// 3) built-in defaults
pub fn load_sources_default() -> Result<(Vec<SubSource>, Vec<SubSource>)> {
    if let Ok(p) = std::env::var(ENV_SOURCES_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_sources_from(&pb);
        }
        return Err(anyhow!("SOURCES_CONFIG_PATH points to non-existent path"));
    }
    let toml_p = PathBuf::from("config/sources.toml");
    if toml_p.exists() {
        return load_sources_from(&toml_p);
    }
    Ok((default_reddit_pool(), default_instagram_pool()))
}

fn parse_sources(s: &str) -> Result<(Vec<SubSource>, Vec<SubSource>)> {
    let file: SourcesFile = toml::from_str(s).context("parsing sources toml")?;

    let mut reddit = Vec::new();
    for (category, subs) in &file.reddit {
        for name in clean_list(subs) {
            reddit.push(SubSource::new(name, category.as_str()));
        }
    }
    let instagram = clean_list(&file.instagram.accounts)
        .into_iter()
        .map(|name| SubSource::new(name, "instagram"))
        .collect();
    Ok((reddit, instagram))
}

fn clean_list(items: &[String]) -> Vec<String> {
    use std::collections::BTreeSet;
    let mut set = BTreeSet::new();
    for it in items {
        let t = it.trim();
        if !t.is_empty() {
            set.insert(t.to_string());
        }
    }
    set.into_iter().collect()
}
