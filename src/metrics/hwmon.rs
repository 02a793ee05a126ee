//! Hardware-monitoring (hwmon) subsystem discovery and sensor resolution.
//!
//! Each `hwmon<N>` directory under the root declares its identity in a
//! `name` file and exposes one file per field (`temp1_input`, `fan1_input`,
//! ...). Driver names differ between kernels and vendors, so sensors are
//! resolved against ordered candidate lists.

use crate::error::{Result, SystemError};
use crate::metrics::reader::read_value_file;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File holding a subsystem's declared name.
pub const NAME_FILE: &str = "name";

/// A resolved hwmon field, read once per tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorHandle {
    pub subsystem: String,
    pub field: String,
    pub path: PathBuf,
}

impl SensorHandle {
    /// `subsystem/field`
    pub fn label(&self) -> String {
        format!("{}/{}", self.subsystem, self.field)
    }

    /// Field content with the trailing line terminator removed.
    ///
    /// A sensor removed after discovery surfaces here as a read failure.
    pub fn read_raw(&self) -> Result<String> {
        read_value_file(&self.path).map_err(|e| SystemError::transient_read(&self.path, e))
    }

    /// Field content parsed as a number.
    pub fn read_value(&self) -> Result<f64> {
        let raw = self.read_raw()?;
        raw.trim().parse::<f64>().map_err(|_| {
            SystemError::transient_read(&self.path, format!("non-numeric value {:?}", raw))
        })
    }

    /// Temperature fields report millidegrees Celsius.
    pub fn read_celsius(&self) -> Result<f32> {
        Ok((self.read_value()? / 1000.0) as f32)
    }
}

/// One `hwmon<N>` directory with a readable name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HwmonSubsystem {
    pub index: u32,
    pub name: String,
    pub dir: PathBuf,
}

impl HwmonSubsystem {
    /// Path of `field` if the subsystem exposes it as a file.
    pub fn field_path(&self, field: &str) -> Option<PathBuf> {
        let path = self.dir.join(field);
        path.is_file().then_some(path)
    }

    /// Every readable field and its current value, sorted by field name.
    pub fn fields(&self) -> BTreeMap<String, String> {
        let mut fields = BTreeMap::new();
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return fields;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            // Some attributes are write-only or fail on read; skip them.
            if let Ok(value) = read_value_file(&path) {
                fields.insert(entry.file_name().to_string_lossy().into_owned(), value);
            }
        }
        fields
    }
}

/// Scanner over a hardware-monitoring root such as `/sys/class/hwmon`.
#[derive(Debug, Clone)]
pub struct SensorDiscovery {
    root: PathBuf,
}

impl SensorDiscovery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// All subsystems with a readable `name`, ordered by their number.
    pub fn subsystems(&self) -> Vec<HwmonSubsystem> {
        let Ok(entries) = fs::read_dir(&self.root) else {
            debug!("hwmon root {} is not readable", self.root.display());
            return Vec::new();
        };

        let mut subsystems: Vec<HwmonSubsystem> = entries
            .flatten()
            .filter_map(|entry| {
                let file_name = entry.file_name();
                let index = parse_subsystem_index(&file_name.to_string_lossy())?;
                // Entries are usually symlinks into the device tree.
                let dir = entry.path();
                if !dir.is_dir() {
                    return None;
                }
                match read_value_file(&dir.join(NAME_FILE)) {
                    Ok(name) => Some(HwmonSubsystem {
                        index,
                        name: name.trim().to_string(),
                        dir,
                    }),
                    Err(e) => {
                        debug!("Skipping {}: no readable name ({})", dir.display(), e);
                        None
                    }
                }
            })
            .collect();
        subsystems.sort_by_key(|s| s.index);
        subsystems
    }

    /// Resolve the first field matching the candidate lists.
    ///
    /// Subsystem candidates are tried in order of preference; within a
    /// subsystem, field candidates are tried in order. A subsystem that
    /// matches by name but exposes none of the fields does not end the
    /// search.
    pub fn resolve<S, F>(&self, subsystems: &[S], fields: &[F]) -> Result<SensorHandle>
    where
        S: AsRef<str>,
        F: AsRef<str>,
    {
        let available = self.subsystems();

        for candidate in subsystems {
            let candidate = candidate.as_ref();
            for subsystem in available.iter().filter(|s| name_matches(&s.name, candidate)) {
                for field in fields {
                    let field = field.as_ref();
                    if let Some(path) = subsystem.field_path(field) {
                        let handle = SensorHandle {
                            subsystem: subsystem.name.clone(),
                            field: field.to_string(),
                            path,
                        };
                        info!("Resolved sensor {} at {}", handle.label(), handle.path.display());
                        return Ok(handle);
                    }
                }
                debug!(
                    "Subsystem {} ({}) has none of the candidate fields",
                    subsystem.name,
                    subsystem.dir.display()
                );
            }
        }

        Err(SystemError::sensor_unavailable(format!(
            "no subsystem in {} matched [{}] with a field in [{}]",
            self.root.display(),
            join(subsystems),
            join(fields)
        )))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Declared names may carry trailing whitespace or differ in case.
fn name_matches(declared: &str, candidate: &str) -> bool {
    declared.trim().eq_ignore_ascii_case(candidate.trim())
}

fn parse_subsystem_index(name: &str) -> Option<u32> {
    let digits = name.strip_prefix("hwmon")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn join<S: AsRef<str>>(items: &[S]) -> String {
    items.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(", ")
}
