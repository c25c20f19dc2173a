use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{ScheduleError, SkyfallResult};

use super::types::{default_schedule_name, NewSchedule, Schedule};

/// All schedules in a single YAML file keyed by schedule name.
///
/// Every mutation reads the whole file, changes the map and writes the whole file
/// back. There is no locking between processes.
#[derive(Debug, Clone)]
pub struct ScheduleStore {
    path: PathBuf,
}

impl ScheduleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stores `schedule` and returns its name. An existing schedule with the same
    /// name is replaced.
    pub fn add_schedule(&self, schedule: NewSchedule) -> SkyfallResult<String> {
        let (name, schedule) = schedule.into_parts();
        let name = match name {
            Some(name) if !name.trim().is_empty() => name,
            _ => default_schedule_name(),
        };

        let mut schedules = self.list_schedules()?;
        if schedules.insert(name.clone(), schedule).is_some() {
            warn!(schedule = %name, "Replacing existing schedule");
        }
        self.write_all(&schedules)?;

        info!(schedule = %name, "Added schedule");
        Ok(name)
    }

    /// The full collection. A missing or empty file is an empty collection.
    pub fn list_schedules(&self) -> SkyfallResult<BTreeMap<String, Schedule>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        let schedules: Option<BTreeMap<String, Schedule>> = serde_yaml::from_str(&content)
            .map_err(|e| ScheduleError::Corrupt {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(schedules.unwrap_or_default())
    }

    pub fn get_schedule(&self, name: &str) -> SkyfallResult<Option<Schedule>> {
        Ok(self.list_schedules()?.remove(name))
    }

    pub fn remove_schedule(&self, name: &str) -> SkyfallResult<Schedule> {
        let mut schedules = self.list_schedules()?;
        let removed = schedules
            .remove(name)
            .ok_or_else(|| ScheduleError::NotFound(name.to_string()))?;
        self.write_all(&schedules)?;

        info!(schedule = %name, "Removed schedule");
        Ok(removed)
    }

    fn write_all(&self, schedules: &BTreeMap<String, Schedule>) -> SkyfallResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = serde_yaml::to_string(schedules)?;
        let tmp = self.path.with_extension("yml.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), count = schedules.len(), "Wrote schedules");
        Ok(())
    }
}
