mod bootstrap;
mod report;

use std::time::Duration;

use anyhow::{Context, Result};
use licence_analytics::analysis::{AnalysisEngine, AnalysisReport};
use licence_analytics::config::EngineConfig;
use licence_core::settings::Settings;
use licence_runtime::data_manager::DataManager;
use licence_runtime::orchestrator::AnalysisOrchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load();

    bootstrap::setup_logging(settings.effective_log_level())?;

    tracing::info!("licence-intel v{} starting", env!("CARGO_PKG_VERSION"));

    let config = EngineConfig::load_or_default(settings.config.as_deref())
        .context("loading engine configuration")?;
    let engine = AnalysisEngine::new(config)?;

    let reference_date = settings.reference_date()?;

    let data_dir = bootstrap::resolve_data_dir(settings.data_dir.as_ref());
    tracing::info!(path = %data_dir.display(), "reading licence records");

    let data_manager = DataManager::new(data_dir, !settings.no_telemetry);
    let mut orchestrator = AnalysisOrchestrator::new(engine, data_manager, reference_date);

    match settings.watch {
        None => {
            let report = orchestrator.run_once().await?;
            print_report(&report, settings.wants_json())?;
        }
        Some(secs) => {
            tracing::info!(interval_secs = secs, "watching for changes; Ctrl+C to stop");
            let (mut rx, handle) = orchestrator.start(Duration::from_secs(secs));

            loop {
                tokio::select! {
                    next = rx.recv() => match next {
                        Some(report) => print_report(&report, settings.wants_json())?,
                        None => break,
                    },
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("Ctrl+C received; stopping reload loop");
                        break;
                    }
                }
            }
            handle.abort();
        }
    }

    Ok(())
}

fn print_report(report: &AnalysisReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{}", report::render_text(report));
    }
    Ok(())
}
