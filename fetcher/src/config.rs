use anyhow::{anyhow, Context, Result};
use configparser::ini::Ini;
use std::path::{Path, PathBuf};

const SECTION: &str = "USER_DATA";

/// User-editable settings for one fetch run, read from an INI file.
#[derive(Debug, Clone)]
pub struct UserConfig {
    /// Page listing the daily trade data archives.
    pub source_webpage: String,
    /// Link pattern with a `{today}` placeholder for the date token.
    pub source_pattern: String,
    /// AmiBroker batch file whose ImportASCII steps get rewritten.
    pub batch_file: PathBuf,
    /// Directory receiving the extracted data files.
    pub dest_dir: PathBuf,
    /// AmiBroker executable launched after the rewrite.
    pub amibroker: PathBuf,
}

impl UserConfig {
    pub fn load(path: &Path) -> Result<UserConfig> {
        let mut config = Ini::new();
        config
            .load(path)
            .map_err(|error| anyhow!(error))
            .with_context(|| {
                format!(
                    "Failed to read configuration file from \"{}\"",
                    path.display()
                )
            })?;
        let get = |key: &str| {
            config.get(SECTION, key).ok_or_else(|| {
                anyhow!(
                    "Missing \"{key}\" in [{SECTION}] of \"{}\"",
                    path.display()
                )
            })
        };
        Ok(UserConfig {
            source_webpage: get("source_webpage")?,
            source_pattern: get("source_pattern")?,
            batch_file: PathBuf::from(get("abb_file")?),
            dest_dir: PathBuf::from(get("dest_dir")?),
            amibroker: PathBuf::from(get("amibroker")?),
        })
    }
}
