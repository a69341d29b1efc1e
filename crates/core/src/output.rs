//! Destination paths and file handling for saved labels.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::AsyncReadExt;
use tracing::warn;

/// Errors preparing or inspecting output files.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to create directory: {path}")]
    DirectoryCreationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove stale file: {path}")]
    StaleFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to calculate checksum for {path}")]
    ChecksumCalculationFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// `[output]` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory under which per-trip folders are created.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    #[serde(default = "default_extension")]
    pub file_extension: String,
}

fn default_root() -> PathBuf {
    PathBuf::from("output")
}

fn default_extension() -> String {
    "pdf".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            file_extension: default_extension(),
        }
    }
}

/// Maps an item/lot pair to the file its label is saved to.
///
/// Must be deterministic: the same pair always yields the same path.
pub trait OutputPathBuilder: Send + Sync {
    fn build(&self, item_key: &str, lot_key: &str) -> PathBuf;
}

/// `{root}/{trip}/{item}_{lot}.{ext}`.
#[derive(Debug, Clone)]
pub struct TripOutputPaths {
    root: PathBuf,
    trip: String,
    extension: String,
}

impl TripOutputPaths {
    pub fn new(config: &OutputConfig, trip: &str) -> Self {
        let trip = sanitize_component(trip);
        Self {
            root: config.root.clone(),
            trip: if trip.is_empty() { "unassigned".to_string() } else { trip },
            extension: config.file_extension.trim_start_matches('.').to_string(),
        }
    }

    /// Directory all files of this trip land in.
    pub fn directory(&self) -> PathBuf {
        self.root.join(&self.trip)
    }
}

impl OutputPathBuilder for TripOutputPaths {
    fn build(&self, item_key: &str, lot_key: &str) -> PathBuf {
        let name = format!(
            "{}_{}.{}",
            sanitize_component(item_key),
            sanitize_component(lot_key),
            self.extension
        );
        self.directory().join(name)
    }
}

/// Routes each item/lot pair to the directory of the trip it ships on.
///
/// Registered pairs get distinct paths: when two pairs sanitize to the same
/// file name, the later one gets a `-2`, `-3`, ... suffix. Pairs that were
/// never registered land under `unassigned`.
#[derive(Debug, Clone)]
pub struct TripRoutedPaths {
    config: OutputConfig,
    routes: HashMap<(String, String), PathBuf>,
    taken: HashSet<PathBuf>,
    fallback: TripOutputPaths,
}

impl TripRoutedPaths {
    pub fn new(config: &OutputConfig) -> Self {
        Self {
            config: config.clone(),
            routes: HashMap::new(),
            taken: HashSet::new(),
            fallback: TripOutputPaths::new(config, ""),
        }
    }

    /// Assign the pair its path. Registering a pair again keeps its path.
    pub fn register(&mut self, item_key: &str, lot_key: &str, trip: &str) -> PathBuf {
        let key = (item_key.to_string(), lot_key.to_string());
        if let Some(path) = self.routes.get(&key) {
            return path.clone();
        }

        let base = TripOutputPaths::new(&self.config, trip).build(item_key, lot_key);
        let mut path = base.clone();
        let mut n = 2;
        while self.taken.contains(&path) {
            path = with_suffix(&base, n);
            n += 1;
        }
        if path != base {
            warn!(
                item = item_key,
                lot = lot_key,
                path = %path.display(),
                "Output name already taken by another item, using a suffixed name"
            );
        }

        self.taken.insert(path.clone());
        self.routes.insert(key, path.clone());
        path
    }
}

impl OutputPathBuilder for TripRoutedPaths {
    fn build(&self, item_key: &str, lot_key: &str) -> PathBuf {
        match self.routes.get(&(item_key.to_string(), lot_key.to_string())) {
            Some(path) => path.clone(),
            None => self.fallback.build(item_key, lot_key),
        }
    }
}

/// `dir/name.ext` -> `dir/name-{n}.ext`.
fn with_suffix(path: &Path, n: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}-{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}-{}", stem, n),
    };
    path.with_file_name(name)
}

/// Replace anything that is not safe in a file name.
pub fn sanitize_component(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_matches('.')
        .to_string()
}

/// Make sure the parent directory exists and no earlier file is in the way.
///
/// A leftover file would satisfy the "file appeared" check before the new
/// save completes.
pub async fn prepare_destination(path: &Path) -> Result<(), OutputError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|source| OutputError::DirectoryCreationFailed {
                path: parent.to_path_buf(),
                source,
            })?;
    }

    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(OutputError::StaleFile {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Hex sha256 of a file's contents.
pub async fn sha256_file(path: &Path) -> Result<String, OutputError> {
    let failed = |source| OutputError::ChecksumCalculationFailed {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).await.map_err(failed)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer).await.map_err(failed)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
