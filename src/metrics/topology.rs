//! Logical core discovery from the CPU topology tree.

use crate::error::{Result, SystemError};
use crate::metrics::data::CoreIndex;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The set of logical cores found at startup.
///
/// `CoreIndex` `i` refers to the `i`-th smallest kernel core id, so the
/// index space is contiguous even when the kernel ids are not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    root: PathBuf,
    core_ids: Vec<u32>,
}

impl Topology {
    /// Scan `root` for `cpu<N>` entries.
    ///
    /// Fails if `root` is missing or not a directory. Zero matches is valid
    /// and leaves only the aggregate to report.
    pub fn scan(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(SystemError::discovery_error(
                root,
                "CPU topology root is missing or not a directory",
            ));
        }

        let entries =
            fs::read_dir(root).map_err(|e| SystemError::discovery_error(root, e.to_string()))?;

        let mut ids = BTreeSet::new();
        for entry in entries.flatten() {
            let name = entry.file_name();
            match parse_core_id(&name.to_string_lossy()) {
                Some(id) => {
                    ids.insert(id);
                }
                None => debug!("Skipping topology entry {:?}", name),
            }
        }

        let topology = Self {
            root: root.to_path_buf(),
            core_ids: ids.into_iter().collect(),
        };
        info!(
            "Discovered {} logical cores under {}",
            topology.core_count(),
            root.display()
        );
        Ok(topology)
    }

    pub fn core_count(&self) -> usize {
        self.core_ids.len()
    }

    /// Kernel core ids in `CoreIndex` order.
    pub fn core_ids(&self) -> &[u32] {
        &self.core_ids
    }

    /// Position of kernel core `id` in the index space.
    pub fn index_of(&self, id: u32) -> Option<CoreIndex> {
        self.core_ids.binary_search(&id).ok()
    }

    /// Directory of the core at `index`.
    pub fn core_dir(&self, index: CoreIndex) -> Option<PathBuf> {
        self.core_ids
            .get(index)
            .map(|id| self.root.join(format!("cpu{}", id)))
    }
}

/// `cpu17` -> `Some(17)`; `cpu`, `cpufreq`, `notcpu3`, `cpu+1` -> `None`.
pub(crate) fn parse_core_id(name: &str) -> Option<u32> {
    let digits = name.strip_prefix("cpu")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
