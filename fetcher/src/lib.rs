// Export the fetcher modules
pub mod archive;
pub mod batch;
pub mod config;
pub mod links;
pub mod logging;
pub mod run;

// Re-export tests for integration testing
#[cfg(test)]
pub mod tests;

// Re-export key types and functions for easier access
pub use crate::archive::{
    download_and_extract, extract_archive, sorted_data_files, FetchReport, LinkOutcome,
};
pub use crate::batch::{rewrite_import_steps, rewrite_steps};
pub use crate::config::UserConfig;
pub use crate::links::{
    anchored_pattern, extract_links, fetch_matching_links, resolve, resolve_with, Resolution,
};
pub use crate::run::run;
