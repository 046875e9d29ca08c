//! Where provider exports come from.

use std::path::{Path, PathBuf};

use billing_core::error::{BillingError, Result};
use billing_core::models::Provider;
use tracing::{debug, warn};

/// Supplies the raw bytes of a provider's exports.
pub trait ExportSource: Send + Sync {
    fn provider(&self) -> Provider;

    /// Every export this source holds, in processing order.
    fn fetch(&self) -> Result<Vec<Vec<u8>>>;
}

fn read_exports(provider: Provider, paths: &[PathBuf]) -> Result<Vec<Vec<u8>>> {
    paths
        .iter()
        .map(|path| {
            std::fs::read(path).map_err(|source| BillingError::Fetch {
                provider,
                source: Box::new(BillingError::File {
                    path: path.clone(),
                    source,
                }),
            })
        })
        .collect()
}

// ── FileSource ────────────────────────────────────────────────────────────────

/// Explicitly listed export files.
#[derive(Debug, Clone)]
pub struct FileSource {
    provider: Provider,
    paths: Vec<PathBuf>,
}

impl FileSource {
    pub fn new(provider: Provider, paths: Vec<PathBuf>) -> Self {
        Self { provider, paths }
    }
}

impl ExportSource for FileSource {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn fetch(&self) -> Result<Vec<Vec<u8>>> {
        read_exports(self.provider, &self.paths)
    }
}

// ── DirectorySource ───────────────────────────────────────────────────────────

/// Every `.csv` file found recursively under a directory.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    provider: Provider,
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(provider: Provider, dir: impl Into<PathBuf>) -> Self {
        Self {
            provider,
            dir: dir.into(),
        }
    }
}

impl ExportSource for DirectorySource {
    fn provider(&self) -> Provider {
        self.provider
    }

    fn fetch(&self) -> Result<Vec<Vec<u8>>> {
        if !self.dir.is_dir() {
            return Err(BillingError::Fetch {
                provider: self.provider,
                source: format!("export directory {} does not exist", self.dir.display()).into(),
            });
        }
        let files = find_csv_files(&self.dir);
        if files.is_empty() {
            return Err(BillingError::Fetch {
                provider: self.provider,
                source: format!("no CSV exports found under {}", self.dir.display()).into(),
            });
        }
        debug!(provider = %self.provider, files = files.len(), "discovered exports");
        read_exports(self.provider, &files)
    }
}

/// Find all `.csv` files recursively under `dir`, sorted by path.
pub fn find_csv_files(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        warn!("Export path does not exist: {}", dir.display());
        return Vec::new();
    }

    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort();
    files
}
