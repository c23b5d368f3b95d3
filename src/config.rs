use crate::error::{config_error, env_error, BotResult};
use chrono_tz::Tz;
use dotenvy::dotenv;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::fs;
use std::str::FromStr;
use url::Url;

/// Default activity text for the bot
pub const DEFAULT_ACTIVITY: &str = "Watching the lab calendar";
/// Location used when a feed event has none
pub const DEFAULT_LOCATION: &str = "MAG Laboratory";
/// Description used when a feed event has none
pub const DEFAULT_DESCRIPTION: &str = "No description provided";
/// Name marker owned by the lab status reporter
pub const LAB_STATUS_MARKER: &str = "We are";

/// Longest look-ahead window, in days
const MAX_SYNC_DAYS: i64 = 366;
const MIN_SYNC_INTERVAL_SECS: u64 = 60;
/// One week
const MAX_SYNC_INTERVAL_SECS: u64 = 604_800;

/// How to interpret datetimes that carry no zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaiveTimePolicy {
    /// Floating times are UTC
    Utc,
    /// Floating times are wall-clock times in the configured zone
    Local(Tz),
}

/// Which fields make up an identity key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchPolicy {
    /// name + start + location
    #[default]
    Standard,
    /// name + start + location + description
    Strict,
}

impl FromStr for MatchPolicy {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> BotResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(MatchPolicy::Standard),
            "strict" => Ok(MatchPolicy::Strict),
            other => Err(config_error(&format!("Unknown MATCH_POLICY '{}'", other))),
        }
    }
}

/// Engine-facing settings for one reconciliation pass
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub feed_urls: Vec<String>,
    pub sync_days: i64,
    pub description_max_length: usize,
    pub default_location: String,
    pub default_description: String,
    pub reserved_name_markers: Vec<String>,
    pub naive_time_policy: NaiveTimePolicy,
    pub match_policy: MatchPolicy,
    pub refresh_drifted: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            feed_urls: Vec::new(),
            sync_days: 7,
            description_max_length: 1000,
            default_location: DEFAULT_LOCATION.to_string(),
            default_description: DEFAULT_DESCRIPTION.to_string(),
            reserved_name_markers: vec![LAB_STATUS_MARKER.to_string()],
            naive_time_policy: NaiveTimePolicy::Utc,
            match_policy: MatchPolicy::Standard,
            refresh_drifted: false,
        }
    }
}

/// Optional `config/sync.toml` contents
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SyncFile {
    feed_urls: Vec<String>,
    sync_days: Option<i64>,
    sync_interval_secs: Option<u64>,
    description_max_length: Option<usize>,
    default_location: Option<String>,
    default_description: Option<String>,
    reserved_name_markers: Option<Vec<String>>,
    fetch_timeout_secs: Option<u64>,
}

/// Main configuration structure for the bot
#[derive(Debug, Clone)]
pub struct Config {
    /// Discord bot token
    pub discord_token: String,
    /// Discord guild ID (server) whose scheduled events are managed
    pub guild_id: u64,
    /// Map of component names to their enabled status
    pub components: HashMap<String, bool>,
    /// Timezone for display and for the local naive-time policy
    pub timezone: String,
    /// Bot activity status text
    pub activity: String,
    /// Seconds between scheduled reconciliation passes
    pub sync_interval_secs: u64,
    /// Per-request timeout for feed downloads
    pub fetch_timeout_secs: u64,
    /// Settings handed to the sync engine
    pub sync: SyncSettings,
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> BotResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let env_map: HashMap<String, String> = env::vars().collect();
        let sync_toml = fs::read_to_string("config/sync.toml").ok();
        let components_toml = fs::read_to_string("config/components.toml").ok();

        Self::from_sources(&env_map, sync_toml.as_deref(), components_toml.as_deref())
    }

    /// Build configuration from already-read sources. Environment values win over file values.
    pub fn from_sources(
        env_map: &HashMap<String, String>,
        sync_toml: Option<&str>,
        components_toml: Option<&str>,
    ) -> BotResult<Self> {
        let var = |name: &str| {
            env_map
                .get(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let discord_token = var("DISCORD_TOKEN").ok_or_else(|| env_error("DISCORD_TOKEN"))?;
        let guild_id = var("GUILD_ID")
            .ok_or_else(|| env_error("GUILD_ID"))?
            .parse::<u64>()
            .map_err(|_| config_error("Invalid GUILD_ID format"))?;

        let timezone = var("TIMEZONE").unwrap_or_else(|| String::from("UTC"));
        let tz: Tz = timezone
            .parse()
            .map_err(|_| config_error(&format!("Invalid TIMEZONE '{}'", timezone)))?;

        let activity = var("BOT_ACTIVITY").unwrap_or_else(|| String::from(DEFAULT_ACTIVITY));

        let file: SyncFile = match sync_toml {
            Some(content) => toml::from_str(content)?,
            None => SyncFile::default(),
        };

        let feed_urls = match var("FEED_URLS") {
            Some(list) => list
                .split(',')
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .collect(),
            None => file.feed_urls,
        };

        let sync_days = match var("SYNC_DAYS") {
            Some(v) => v
                .parse::<i64>()
                .map_err(|_| config_error("Invalid SYNC_DAYS format"))?,
            None => file.sync_days.unwrap_or(7),
        };

        let sync_interval_secs = match var("SYNC_INTERVAL_SECS") {
            Some(v) => v
                .parse::<u64>()
                .map_err(|_| config_error("Invalid SYNC_INTERVAL_SECS format"))?,
            None => file.sync_interval_secs.unwrap_or(3600),
        };

        let naive_time_policy = match var("NAIVE_TIME_POLICY").as_deref() {
            None | Some("utc") | Some("UTC") => NaiveTimePolicy::Utc,
            Some("local") | Some("LOCAL") => NaiveTimePolicy::Local(tz),
            Some(other) => {
                return Err(config_error(&format!(
                    "Unknown NAIVE_TIME_POLICY '{}'",
                    other
                )))
            }
        };

        let match_policy = match var("MATCH_POLICY") {
            Some(v) => v.parse()?,
            None => MatchPolicy::Standard,
        };

        let refresh_drifted = match var("REFRESH_DRIFTED") {
            Some(v) => parse_bool(&v)
                .ok_or_else(|| config_error("Invalid REFRESH_DRIFTED value"))?,
            None => false,
        };

        let defaults = SyncSettings::default();
        let sync = SyncSettings {
            feed_urls,
            sync_days,
            description_max_length: file
                .description_max_length
                .unwrap_or(defaults.description_max_length),
            default_location: file.default_location.unwrap_or(defaults.default_location),
            default_description: file
                .default_description
                .unwrap_or(defaults.default_description),
            reserved_name_markers: file
                .reserved_name_markers
                .unwrap_or(defaults.reserved_name_markers),
            naive_time_policy,
            match_policy,
            refresh_drifted,
        };

        // Initialize default components
        let mut components = HashMap::new();
        components.insert("event_sync".to_string(), true);
        if let Some(content) = components_toml {
            let file_components: HashMap<String, bool> = toml::from_str(content)?;
            // Merge with defaults
            components.extend(file_components);
        }

        let config = Config {
            discord_token,
            guild_id,
            components,
            timezone,
            activity,
            sync_interval_secs,
            fetch_timeout_secs: file.fetch_timeout_secs.unwrap_or(30),
            sync,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> BotResult<()> {
        if self.sync.feed_urls.is_empty() {
            return Err(config_error(
                "No feed URLs configured (set FEED_URLS or feed_urls in config/sync.toml)",
            ));
        }
        for feed in &self.sync.feed_urls {
            let parsed = Url::parse(feed)
                .map_err(|e| config_error(&format!("Invalid feed URL '{}': {}", feed, e)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(config_error(&format!(
                    "Feed URL '{}' must use http or https",
                    feed
                )));
            }
        }
        if !(1..=MAX_SYNC_DAYS).contains(&self.sync.sync_days) {
            return Err(config_error(&format!(
                "SYNC_DAYS must be between 1 and {}",
                MAX_SYNC_DAYS
            )));
        }
        if !(MIN_SYNC_INTERVAL_SECS..=MAX_SYNC_INTERVAL_SECS).contains(&self.sync_interval_secs) {
            return Err(config_error(&format!(
                "SYNC_INTERVAL_SECS must be between {} and {}",
                MIN_SYNC_INTERVAL_SECS, MAX_SYNC_INTERVAL_SECS
            )));
        }
        if self.sync.description_max_length == 0 {
            return Err(config_error("description_max_length must be positive"));
        }
        Ok(())
    }

    /// Check if a component is enabled
    pub fn is_component_enabled(&self, name: &str) -> bool {
        *self.components.get(name).unwrap_or(&false)
    }

    /// Settings consumed by the sync engine
    pub fn sync_settings(&self) -> SyncSettings {
        self.sync.clone()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
