use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use zip::ZipArchive;

/// Result of downloading and extracting one link.
#[derive(Debug, Serialize)]
pub struct LinkOutcome {
    pub url: String,
    /// File name the archive was saved under, when the download succeeded.
    pub archive: Option<String>,
    /// Number of entries extracted from the archive.
    pub extracted: usize,
    pub error: Option<String>,
}

/// Per-link accounting for one download stage, persisted as JSON so a failed
/// run says exactly which links went wrong.
#[derive(Debug, Default, Serialize)]
pub struct FetchReport {
    pub outcomes: Vec<LinkOutcome>,
}

impl FetchReport {
    pub fn failures(&self) -> Vec<&LinkOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| outcome.error.is_some())
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.error.is_none())
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("Failed to serialize fetch report")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write fetch report to \"{}\"", path.display()))
    }
}

/// Download each link, persist the archive, and extract its entries.
///
/// Everything lands in a staging directory first; the destination directory
/// is only replaced (atomically, via rename) when every link succeeded, so a
/// failed run leaves the previous data intact.
pub fn download_and_extract(
    client: &Client,
    links: &BTreeSet<String>,
    dest_dir: &Path,
) -> Result<FetchReport> {
    let staging_parent = staging_parent(dest_dir);
    let staging = tempfile::Builder::new()
        .prefix(".fetch-staging-")
        .tempdir_in(staging_parent)
        .with_context(|| {
            format!(
                "Failed to create staging directory in \"{}\"",
                staging_parent.display()
            )
        })?;
    let archives_dir = staging.path().join("archives");
    let data_dir = staging.path().join("data");
    fs::create_dir(&archives_dir).context("Failed to create archive staging directory")?;
    fs::create_dir(&data_dir).context("Failed to create data staging directory")?;

    let mut report = FetchReport::default();
    for link in links {
        match fetch_one(client, link, &archives_dir, &data_dir) {
            Ok(outcome) => report.outcomes.push(outcome),
            Err(error) => {
                warn!("Failed to fetch {link}: {error:#}");
                report.outcomes.push(LinkOutcome {
                    url: link.clone(),
                    archive: None,
                    extracted: 0,
                    error: Some(format!("{error:#}")),
                });
            }
        }
    }

    if report.all_succeeded() {
        swap_into_place(&data_dir, dest_dir)?;
    }
    Ok(report)
}

fn fetch_one(
    client: &Client,
    link: &str,
    archives_dir: &Path,
    data_dir: &Path,
) -> Result<LinkOutcome> {
    let name = archive_file_name(link)?;
    info!("Downloading trade data from {link}");
    let response = client
        .get(link)
        .send()
        .context("Failed to send request")?
        .error_for_status()
        .context("Server rejected the download")?;
    let bytes = response.bytes().context("Failed to read download body")?;

    let archive_path = archives_dir.join(&name);
    fs::write(&archive_path, &bytes)
        .with_context(|| format!("Failed to save archive \"{}\"", archive_path.display()))?;
    debug!("Saved {} bytes to {}", bytes.len(), archive_path.display());

    info!("Unzipping {name} into the data directory");
    let extracted = extract_archive(&archive_path, data_dir)?;
    Ok(LinkOutcome {
        url: link.to_string(),
        archive: Some(name),
        extracted,
        error: None,
    })
}

/// Extract all entries of a zip archive into a directory, returning the
/// number of entries.
pub fn extract_archive(archive_path: &Path, into: &Path) -> Result<usize> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive \"{}\"", archive_path.display()))?;
    let mut archive = ZipArchive::new(file)
        .with_context(|| format!("\"{}\" is not a zip archive", archive_path.display()))?;
    let entries = archive.len();
    archive
        .extract(into)
        .with_context(|| format!("Failed to extract \"{}\"", archive_path.display()))?;
    Ok(entries)
}

/// Regular files in the destination directory, sorted by path so positional
/// pairing with the batch file is deterministic.
pub fn sorted_data_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to list data directory \"{}\"", dir.display()))?;
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Replace the destination directory with the staged data directory.
/// Both live on the same filesystem, so the rename is atomic.
pub(crate) fn swap_into_place(data_dir: &Path, dest_dir: &Path) -> Result<()> {
    let dest_str = dest_dir.display();
    if fs::exists(dest_dir)
        .with_context(|| format!("Failed to check if directory exists: {dest_str}"))?
    {
        fs::remove_dir_all(dest_dir)
            .with_context(|| format!("Failed to remove existing directory: {dest_str}"))?;
    }
    fs::rename(data_dir, dest_dir)
        .with_context(|| format!("Failed to move staged data into place: {dest_str}"))
}

fn staging_parent(dest_dir: &Path) -> &Path {
    match dest_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn archive_file_name(link: &str) -> Result<String> {
    let trimmed = link.split(['?', '#']).next().unwrap_or(link);
    match trimmed.rsplit('/').next() {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => bail!("Cannot derive an archive file name from \"{link}\""),
    }
}
