use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::categories::tag_for;
use crate::db::{OrganizationStore, SaveSummary};
use crate::errors::AppResult;
use crate::query::build_query;
use crate::retry::{FailoverController, FetchStatus, Sleeper};

#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub categories: Vec<String>,
    /// Pause between two consecutive categories, even after a success.
    pub category_delay: Duration,
    pub server_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategorySummary {
    pub category: String,
    pub found: usize,
    pub succeeded: bool,
    pub fetch: FetchStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionReport {
    pub city: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub categories: Vec<CategorySummary>,
    pub total_found: usize,
    pub saved: SaveSummary,
    pub rows_in_store: usize,
}

impl CollectionReport {
    pub fn failed_categories(&self) -> impl Iterator<Item = &str> {
        self.categories
            .iter()
            .filter(|summary| !summary.succeeded)
            .map(|summary| summary.category.as_str())
    }
}

pub struct Collector {
    controller: FailoverController,
    store: OrganizationStore,
    sleeper: Arc<dyn Sleeper>,
    settings: CollectorSettings,
}

impl Collector {
    pub fn new(
        controller: FailoverController,
        store: OrganizationStore,
        sleeper: Arc<dyn Sleeper>,
        settings: CollectorSettings,
    ) -> Self {
        Self {
            controller,
            store,
            sleeper,
            settings,
        }
    }

    /// Collects every configured category for `city` and stores the results
    /// in a single batch at the end of the run.
    pub async fn run(&self, city: &str) -> AppResult<CollectionReport> {
        let started_at = Utc::now();
        self.store.ensure_schema()?;

        let mut all_records = Vec::new();
        let mut categories = Vec::with_capacity(self.settings.categories.len());
        for (index, category) in self.settings.categories.iter().enumerate() {
            if index > 0 && !self.settings.category_delay.is_zero() {
                self.sleeper.sleep(self.settings.category_delay).await;
            }

            let query = build_query(city, tag_for(category), self.settings.server_timeout_secs);
            let fetch = self.controller.fetch_category(city, category, &query).await;
            let succeeded = fetch.succeeded();
            if !succeeded {
                warn!(category = %category, city, "no data collected for category");
            }
            categories.push(CategorySummary {
                category: category.clone(),
                found: fetch.records.len(),
                succeeded,
                fetch: fetch.status,
            });
            all_records.extend(fetch.records);
        }

        info!(city, total = all_records.len(), "collection finished; saving");
        let saved = self.store.save(&all_records)?;
        let rows_in_store = self.store.count()?;

        Ok(CollectionReport {
            city: city.to_string(),
            started_at,
            finished_at: Utc::now(),
            categories,
            total_found: all_records.len(),
            saved,
            rows_in_store,
        })
    }
}
