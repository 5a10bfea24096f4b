//! Librarian Match - release identification and subscription matching
//!
//! `parse` and `resolve` inspect a single title; `scan` runs one batch over
//! the plan file and `watch` keeps scanning on a schedule.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use librarian_match::app::{build_parser, build_resolver, build_scanner};
use librarian_match::cli::Command;
use librarian_match::config::Config;
use librarian_match::jobs::{ScanPlan, start_scheduler};

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "librarian_match=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("pretty")) {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let command = match Command::from_args() {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };
    let config = Config::from_env()?;
    tracing::debug!(?config, "Configuration loaded");

    match command {
        Command::Parse { title, subtitle } => {
            let parser = build_parser(&config)?;
            let parsed = parser.parse(&title, subtitle.as_deref());
            println!("{}", serde_json::to_string_pretty(&parsed)?);
        }
        Command::Resolve {
            title,
            year,
            strict,
        } => {
            let parser = build_parser(&config)?;
            let resolver = build_resolver(&config)?;
            let parsed = parser.parse(&title, None);
            let strict = strict || config.is_strict();
            let record = resolver.resolve(&parsed, year.as_deref(), strict).await;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Command::Scan => {
            let plan = ScanPlan::load(&config.plan_path).await?;
            let scanner = build_scanner(&config, &plan)?;
            let summary = scanner.run().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Watch => {
            let plan = ScanPlan::load(&config.plan_path).await?;
            let scanner = Arc::new(build_scanner(&config, &plan)?);
            let mut scheduler = start_scheduler(scanner, &config.scan_schedule).await?;
            tracing::info!("Watching, press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
            scheduler.shutdown().await?;
            tracing::info!("Stopped");
        }
    }
    Ok(())
}
