use anyhow::{bail, Context, Result};
use chrono::Local;
use reqwest::blocking::Client;
use std::collections::BTreeSet;
use std::path::Path;
use std::process::Command;
use tracing::{debug, info, warn};

use crate::config::UserConfig;
use crate::links::Resolution;
use crate::{archive, batch, links, logging};

pub const FETCH_REPORT_FILE: &str = "fetch_report.json";

/// One full fetch run: resolve links, download and extract, rewrite the
/// batch file, launch AmiBroker.
pub fn run(config_path: &Path) -> Result<()> {
    logging::init(Path::new(logging::LOG_FILE))?;
    let config = UserConfig::load(config_path)?;
    info!("Start scraping {}", config.source_webpage);

    let today = Local::now().format("%d%m%Y").to_string();
    debug!("{today}");

    let client = Client::new();
    let resolution = links::resolve(
        &client,
        &config.source_webpage,
        &config.source_pattern,
        &today,
    )?;
    let links = match resolution {
        Resolution::Today(links) => {
            info!("Found the link to trade data for {today}!");
            links
        }
        Resolution::Latest(link) => {
            warn!("Cannot find link to trade data for {today}! Falling back to the latest available: {link}");
            BTreeSet::from([link])
        }
        Resolution::Exhausted => {
            bail!(
                "No trade data links found on {} for today or any earlier date",
                config.source_webpage
            )
        }
    };

    let report = archive::download_and_extract(&client, &links, &config.dest_dir)?;
    report.save(Path::new(FETCH_REPORT_FILE))?;
    let failures = report.failures();
    if !failures.is_empty() {
        bail!(
            "{} of {} links failed to download or extract, see {FETCH_REPORT_FILE}",
            failures.len(),
            report.outcomes.len()
        );
    }

    let data_files = archive::sorted_data_files(&config.dest_dir)?;
    let rewritten = batch::rewrite_import_steps(&config.batch_file, &data_files)?;
    info!(
        "Rewrote {rewritten} import steps in {}",
        config.batch_file.display()
    );

    launch(&config.amibroker)
}

fn launch(program: &Path) -> Result<()> {
    info!("Launching {}", program.display());
    let status = Command::new(program)
        .status()
        .with_context(|| format!("Failed to launch \"{}\"", program.display()))?;
    if !status.success() {
        warn!("\"{}\" exited with {status}", program.display());
    }
    Ok(())
}
