use std::time::Duration;
use std::{env, io};

use serde::Serialize;
use tracing::{debug, warn};

use crate::categories::DEFAULT_CATEGORIES;
use crate::collector::CollectorSettings;
use crate::retry::RetryPolicy;

pub const DEFAULT_ENDPOINTS: &[&str] = &[
    "https://overpass-api.de/api/interpreter",
    "https://overpass.kumi.systems/api/interpreter",
    "http://overpass.openstreetmap.ru/api/interpreter",
];
pub const DEFAULT_CITY: &str = "Ярославль";

const DEFAULT_DATABASE_FILE: &str = "organizations.db";
const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_BACKOFF_STEP_SECS: u64 = 30;
const DEFAULT_OVERLOAD_PAUSE_SECS: u64 = 10;
const DEFAULT_CATEGORY_DELAY_SECS: u64 = 10;
const DEFAULT_CLIENT_TIMEOUT_SECS: u64 = 180;
const DEFAULT_SERVER_TIMEOUT_SECS: u64 = 90;

#[derive(Clone, Debug, Serialize)]
pub struct AppConfig {
    pub endpoints: Vec<String>,
    pub database_file_name: String,
    pub default_city: String,
    pub categories: Vec<String>,
    pub max_attempts: u32,
    pub backoff_step_secs: u64,
    pub overload_pause_secs: u64,
    pub category_delay_secs: u64,
    pub client_timeout_secs: u64,
    pub server_timeout_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup; missing or
    /// unparseable values fall back to the built-in defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            endpoints: parse_list(&lookup, "OVERPASS_ENDPOINTS", DEFAULT_ENDPOINTS),
            database_file_name: lookup("DATABASE_FILE_NAME")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_DATABASE_FILE.to_string()),
            default_city: lookup("DEFAULT_CITY")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_CITY.to_string()),
            categories: parse_list(&lookup, "COLLECTOR_CATEGORIES", DEFAULT_CATEGORIES),
            max_attempts: parse_num(&lookup, "OVERPASS_MAX_ATTEMPTS", DEFAULT_MAX_ATTEMPTS).max(1),
            backoff_step_secs: parse_num(
                &lookup,
                "OVERPASS_BACKOFF_STEP_SECS",
                DEFAULT_BACKOFF_STEP_SECS,
            ),
            overload_pause_secs: parse_num(
                &lookup,
                "OVERPASS_OVERLOAD_PAUSE_SECS",
                DEFAULT_OVERLOAD_PAUSE_SECS,
            ),
            category_delay_secs: parse_num(
                &lookup,
                "CATEGORY_DELAY_SECS",
                DEFAULT_CATEGORY_DELAY_SECS,
            ),
            client_timeout_secs: parse_num(
                &lookup,
                "OVERPASS_CLIENT_TIMEOUT_SECS",
                DEFAULT_CLIENT_TIMEOUT_SECS,
            )
            .max(1),
            server_timeout_secs: parse_num(
                &lookup,
                "OVERPASS_SERVER_TIMEOUT_SECS",
                DEFAULT_SERVER_TIMEOUT_SECS,
            )
            .max(1),
        };
        config.with_consistent_timeouts()
    }

    /// The client must outlive the server-side `[timeout:N]` so Overpass can
    /// answer with its own timeout error instead of being cut off.
    fn with_consistent_timeouts(mut self) -> Self {
        if self.client_timeout_secs <= self.server_timeout_secs {
            let raised = self.server_timeout_secs.saturating_mul(2);
            warn!(
                client_timeout_secs = self.client_timeout_secs,
                server_timeout_secs = self.server_timeout_secs,
                raised,
                "client timeout does not exceed server timeout; raising it"
            );
            self.client_timeout_secs = raised;
        }
        self
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff_step: Duration::from_secs(self.backoff_step_secs),
            overload_pause: Duration::from_secs(self.overload_pause_secs),
        }
    }

    pub fn collector_settings(&self) -> CollectorSettings {
        CollectorSettings {
            categories: self.categories.clone(),
            category_delay: Duration::from_secs(self.category_delay_secs),
            server_timeout_secs: self.server_timeout_secs,
        }
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions)
        || env::var("ALLOW_DOTENV")
            .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
            .unwrap_or(false)
}

fn parse_num<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_list<F>(lookup: &F, key: &str, default: &[&str]) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    let values: Vec<String> = lookup(key)
        .map(|raw| {
            raw.split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        })
        .unwrap_or_default();
    if values.is_empty() {
        default.iter().map(|item| item.to_string()).collect()
    } else {
        values
    }
}
