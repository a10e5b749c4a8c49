use std::io;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, warn};

use city_poi_collector::{collect_city, init_tracing, resolve_city, AppConfig, Cli};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();
    let config = AppConfig::from_env();

    let city = resolve_city(
        cli.city.as_deref(),
        io::stdin().lock(),
        io::stdout(),
        &config.default_city,
    )
    .context("failed to read the target city")?;

    let report = collect_city(&config, &city)
        .await
        .with_context(|| format!("collection for {city} failed"))?;

    for category in report.failed_categories() {
        warn!(category, "category returned no data after all attempts");
    }
    debug!(report = %serde_json::to_string(&report)?, "collection report");

    println!();
    println!("Всего найдено организаций: {}", report.total_found);
    println!(
        "Сохранено новых организаций: {} (уже были в базе: {}, отклонено: {})",
        report.saved.inserted, report.saved.duplicates, report.saved.rejected
    );
    println!("Всего записей в базе: {}", report.rows_in_store);
    Ok(())
}
