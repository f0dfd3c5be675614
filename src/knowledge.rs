//! Knowledge base definitions loaded from JSON files
//!
//! Definition files may splice other files in through `redirect` entries.
//! Every file read while building a definition set is tracked by mtime;
//! callers ask for the current value and get a rebuilt one whenever a
//! tracked file changed since the last build.

pub mod rules;
mod search;
pub mod subjects;

pub use rules::{RegexRule, RuleSet};
pub use subjects::{NodeId, SubjectIndex, SubjectMatch, SubjectNode};

use crate::state_machine::StateRegistry;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid definition in {}: {message}", path.display())]
    Definition { path: PathBuf, message: String },
    #[error("Invalid regex {pattern:?}: {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("Search index error: {0}")]
    Index(#[from] tantivy::TantivyError),
}

impl LoadError {
    fn definition(path: &Path, message: impl Into<String>) -> Self {
        Self::Definition {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

// ============================================================================
// File tracking
// ============================================================================

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Modification times of every file a definition set was built from
#[derive(Debug, Default, Clone)]
pub struct FileTracker {
    mtimes: HashMap<PathBuf, Option<SystemTime>>,
}

impl FileTracker {
    /// Whether any tracked file was modified, created or removed since it was read
    pub fn is_stale(&self) -> bool {
        self.mtimes
            .iter()
            .any(|(path, seen)| modified(path) != *seen)
    }

    pub fn len(&self) -> usize {
        self.mtimes.len()
    }

    /// Read and parse a JSON file, remembering its mtime
    pub fn read_json(&mut self, path: &Path) -> Result<Value, LoadError> {
        // Record before reading so a write racing the read triggers another rebuild
        self.mtimes.insert(path.to_path_buf(), modified(path));
        let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| LoadError::Json {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Resolves redirect targets and guards against redirect cycles
pub(crate) struct DefinitionReader<'a> {
    data_dir: &'a Path,
    files: &'a mut FileTracker,
    open: Vec<PathBuf>,
}

impl<'a> DefinitionReader<'a> {
    pub(crate) fn new(data_dir: &'a Path, files: &'a mut FileTracker) -> Self {
        Self {
            data_dir,
            files,
            open: Vec::new(),
        }
    }

    /// Read a top-level list from `name` (relative to the data directory)
    /// and hand every entry to `visit` together with the file it came from
    pub(crate) fn read_list(
        &mut self,
        name: &str,
        visit: &mut dyn FnMut(&mut Self, &Path, Value) -> Result<(), LoadError>,
    ) -> Result<(), LoadError> {
        let path = self.data_dir.join(name);
        if self.open.contains(&path) {
            return Err(LoadError::definition(&path, "redirect cycle"));
        }
        let Value::Array(entries) = self.files.read_json(&path)? else {
            return Err(LoadError::definition(&path, "expected a JSON list"));
        };
        self.open.push(path.clone());
        let result = entries
            .into_iter()
            .try_for_each(|entry| visit(self, &path, entry));
        self.open.pop();
        result
    }
}

// ============================================================================
// Reloadable definition sets
// ============================================================================

/// A value built from definition files under a data directory
pub trait Definitions: Sized + Send + Sync + 'static {
    /// Human readable name used in logs
    const KIND: &'static str;

    fn load(data_dir: &Path, files: &mut FileTracker) -> Result<Self, LoadError>;
}

struct Loaded<T> {
    value: Arc<T>,
    files: FileTracker,
}

/// Shared definition set, swapped wholesale when its files change
pub struct Reloadable<T> {
    data_dir: PathBuf,
    current: RwLock<Loaded<T>>,
}

impl<T: Definitions> Reloadable<T> {
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, LoadError> {
        let data_dir = data_dir.into();
        let loaded = Self::build(&data_dir)?;
        Ok(Self {
            data_dir,
            current: RwLock::new(loaded),
        })
    }

    fn build(data_dir: &Path) -> Result<Loaded<T>, LoadError> {
        let mut files = FileTracker::default();
        let value = T::load(data_dir, &mut files)?;
        tracing::info!(
            kind = T::KIND,
            dir = %data_dir.display(),
            files = files.len(),
            "Loaded definitions"
        );
        Ok(Loaded {
            value: Arc::new(value),
            files,
        })
    }

    /// The current value, rebuilt first when any tracked file changed
    ///
    /// A failed rebuild leaves the previous value in place.
    pub fn current(&self) -> Result<Arc<T>, LoadError> {
        {
            let loaded = self.current.read().unwrap_or_else(PoisonError::into_inner);
            if !loaded.files.is_stale() {
                return Ok(Arc::clone(&loaded.value));
            }
        }

        let mut loaded = self.current.write().unwrap_or_else(PoisonError::into_inner);
        // Another caller may have rebuilt while we waited for the write lock
        if loaded.files.is_stale() {
            *loaded = Self::build(&self.data_dir)?;
        }
        Ok(Arc::clone(&loaded.value))
    }

    /// Rebuild unconditionally
    pub fn reload(&self) -> Result<(), LoadError> {
        let rebuilt = Self::build(&self.data_dir)?;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = rebuilt;
        Ok(())
    }
}

impl<T> std::fmt::Debug for Reloadable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reloadable")
            .field("data_dir", &self.data_dir)
            .finish_non_exhaustive()
    }
}

/// Everything the dialogue engine consults, shared by all instances
#[derive(Clone)]
pub struct Knowledge {
    pub subjects: Arc<Reloadable<SubjectIndex>>,
    pub rules: Arc<Reloadable<RuleSet>>,
    pub registry: Arc<StateRegistry>,
}

impl Knowledge {
    pub fn load(data_dir: &Path) -> Result<Self, LoadError> {
        Ok(Self {
            subjects: Arc::new(Reloadable::open(data_dir)?),
            rules: Arc::new(Reloadable::open(data_dir)?),
            registry: Arc::new(crate::states::builtin_registry()),
        })
    }

    /// Rebuild every definition set and reset the registry to the built-in
    /// modules. A set that fails to load keeps its previous value.
    pub fn reload(&self) -> Result<(), LoadError> {
        self.subjects.reload()?;
        self.rules.reload()?;
        self.registry.reload(crate::states::builtin_modules());
        Ok(())
    }
}
