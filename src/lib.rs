mod categories;
mod cli;
mod collector;
mod config;
mod db;
mod errors;
mod normalize;
mod overpass;
mod query;
mod retry;

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use crate::categories::{tag_for, DEFAULT_CATEGORIES, FALLBACK_TAG};
pub use crate::cli::{capitalize, resolve_city, Cli};
pub use crate::collector::{CategorySummary, CollectionReport, Collector, CollectorSettings};
pub use crate::config::{AppConfig, DEFAULT_CITY, DEFAULT_ENDPOINTS};
pub use crate::db::{OrganizationStore, SaveSummary};
pub use crate::errors::{AppError, AppResult};
pub use crate::normalize::{
    normalize, normalize_all, Centroid, OrganizationRecord, OverpassResponse, RawElement,
};
pub use crate::overpass::{FetchFailure, HttpOverpassClient, OverpassTransport};
pub use crate::query::build_query;
pub use crate::retry::{
    CategoryFetch, FailoverController, FetchStatus, RetryPolicy, Sleeper, TokioSleeper,
};

/// Wires the HTTP client, the failover controller and the SQLite store from
/// `config`, then collects `city`.
pub async fn collect_city(config: &AppConfig, city: &str) -> AppResult<CollectionReport> {
    let transport = Arc::new(HttpOverpassClient::new(config.client_timeout())?);
    let sleeper: Arc<dyn Sleeper> = Arc::new(TokioSleeper);
    let controller = FailoverController::new(
        transport,
        Arc::clone(&sleeper),
        config.endpoints.clone(),
        config.retry_policy(),
    );
    let store = OrganizationStore::new(&config.database_file_name);
    info!(
        city,
        database = %store.path().display(),
        endpoints = config.endpoints.len(),
        "starting collection"
    );

    Collector::new(controller, store, sleeper, config.collector_settings())
        .run(city)
        .await
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,city_poi_collector=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
