//! `ferry import ...`: read a source and run the pipeline against the
//! reference forum.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use ferry_core::sources::csv::{CsvExport, CsvFiles};
use ferry_core::sources::json::JsonExport;
use ferry_core::{FerryConfig, ImportPipeline, ImportSources, SqliteForum};
use miette::{miette, Result};
use tracing::{info, warn};

use crate::output::Output;

/// Skipped records listed per stage before the rest are summarised.
const SKIPPED_SHOWN: usize = 20;

pub async fn json(config: &FerryConfig, file: Option<PathBuf>, output: &Output) -> Result<()> {
    let Some(path) = file.or_else(|| config.sources.json_file.clone()) else {
        return Err(miette!(
            help = "pass --file or set FERRY_JSON_FILE",
            "no JSON export configured"
        ));
    };

    output.info("Reading:", &path.display().to_string());
    let export = JsonExport::load(&path).await?;
    output.kv("groups", &export.groups.len().to_string());
    output.kv("users", &export.users.len().to_string());

    let name = path.display().to_string();
    run(config, export.into_sources(&name), output).await
}

pub async fn csv(config: &FerryConfig, files: CsvFiles, output: &Output) -> Result<()> {
    if files.users.is_none() && files.categories.is_none() && files.topics.is_none() {
        return Err(miette!(
            help = "pass --users, --categories or --topics, or set the FERRY_CSV_* variables",
            "no CSV files configured"
        ));
    }

    let export = CsvExport::load(&files).await?;
    output.success("Read CSV export");
    output.kv("users", &export.users.len().to_string());
    output.kv("sso records", &export.accounts.len().to_string());
    output.kv("categories", &export.categories.len().to_string());
    output.kv("topics", &export.topics.len().to_string());
    output.kv("posts", &export.replies.len().to_string());

    run(config, export.into_sources(), output).await
}

#[cfg(feature = "flarum")]
pub async fn flarum(config: &FerryConfig, output: &Output) -> Result<()> {
    use ferry_core::sources::flarum::FlarumSource;

    output.info(
        "Connecting:",
        &format!(
            "{}@{}:{}/{}",
            config.flarum.user, config.flarum.host, config.flarum.port, config.flarum.database
        ),
    );
    let source = FlarumSource::connect(&config.flarum).await?;
    run(config, source.into_sources(), output).await
}

/// Run the pipeline over `sources` and print the outcome.
async fn run(config: &FerryConfig, sources: ImportSources, output: &Output) -> Result<()> {
    let (db, identity) = super::open_identity(config).await?;
    let forum = SqliteForum::new(db.clone(), config.import.placeholder_username.clone());

    let pipeline =
        ImportPipeline::from_config(Arc::new(identity), Arc::new(forum), &config.import)?;

    let stop = pipeline.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current batch");
            stop.store(true, Ordering::SeqCst);
        }
    });

    if config.import.dry_run {
        output.warning(&format!(
            "Dry run: post bodies go to {} instead of the forum",
            config.import.inspect_dir.display()
        ));
    }
    output.info("Namespace:", &config.import.namespace);
    output.info("Database:", &config.database.path.display().to_string());

    let result = pipeline.run(sources).await;
    db.checkpoint().await?;
    db.close().await;

    let reports = match result {
        Ok(reports) => reports,
        Err(e) => {
            output.error("Import stopped");
            output.status("Everything recorded so far is kept; re-run to resume.");
            return Err(e.into());
        }
    };

    output.section("Import summary");
    output.reports(&reports);
    output.skipped(&reports, SKIPPED_SHOWN);

    if reports.iter().any(|r| r.stopped) {
        output.warning("Stopped early; re-run to continue where this run left off.");
    } else {
        output.success("Import finished");
    }
    info!(stages = reports.len(), "import run complete");
    Ok(())
}
