//! Per-project "last opened step" pointers, kept outside the workspace database.
//!
//! Pointers are written the moment a step is opened and are never validated against
//! the step collection: a pointer may name a step that has since been deleted.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::Context;

pub trait LastOpenedStore {
    /// `None` when nothing was recorded for the project.
    fn get(&self, project_id: &str) -> Option<String>;
    /// Records (or with `None`, forgets) the pointer for a project.
    fn set(&self, project_id: &str, step_id: Option<&str>) -> anyhow::Result<()>;
}

impl<S: LastOpenedStore + ?Sized> LastOpenedStore for Arc<S> {
    fn get(&self, project_id: &str) -> Option<String> {
        (**self).get(project_id)
    }

    fn set(&self, project_id: &str, step_id: Option<&str>) -> anyhow::Result<()> {
        (**self).set(project_id, step_id)
    }
}

/// Pointers held in memory only.
#[derive(Debug, Default)]
pub struct MemoryLastOpened {
    entries: Mutex<BTreeMap<String, String>>,
}

impl LastOpenedStore for MemoryLastOpened {
    fn get(&self, project_id: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(project_id).cloned()
    }

    fn set(&self, project_id: &str, step_id: Option<&str>) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        apply(&mut entries, project_id, step_id);
        Ok(())
    }
}

/// Pointers persisted as a JSON object `{ projectId: stepId }`, rewritten on every set.
#[derive(Debug)]
pub struct JsonFileLastOpened {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileLastOpened {
    /// Loads existing pointers. A missing file starts empty; so does an unreadable
    /// one, with a warning, since the pointers are only a convenience.
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt last-opened store");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read last-opened store {:?}", path));
            }
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("Failed to write {:?}", tmp))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace last-opened store {:?}", self.path))?;
        Ok(())
    }
}

impl LastOpenedStore for JsonFileLastOpened {
    fn get(&self, project_id: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(project_id).cloned()
    }

    /// Memory only changes once the file has been replaced.
    fn set(&self, project_id: &str, step_id: Option<&str>) -> anyhow::Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = entries.clone();
        apply(&mut next, project_id, step_id);
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }
}

fn apply(entries: &mut BTreeMap<String, String>, project_id: &str, step_id: Option<&str>) {
    match step_id {
        Some(step_id) => {
            entries.insert(project_id.to_string(), step_id.to_string());
        }
        None => {
            entries.remove(project_id);
        }
    }
}
