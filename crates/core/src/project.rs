//! Project definitions and the active-project pointer.
//!
//! Projects are stored one JSON file per project in a fixed directory;
//! the file stem is the project name. There is no cross-file
//! transactionality — each write is individually atomic. Deleting a
//! project removes only its file; windows carrying the deleted name
//! become orphans, which the rest of the system tolerates as "no known
//! project".

use crate::atomic_write_json;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Schema version written into project files.
pub const PROJECT_VERSION: &str = "1.0";

/// Errors from project CRUD.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("project '{0}' already exists")]
    AlreadyExists(String),

    #[error("project '{0}' not found")]
    NotFound(String),

    #[error("invalid project name '{0}'")]
    InvalidName(String),

    #[error("project storage error: {0}")]
    Io(#[from] std::io::Error),

    #[error("project file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A named user context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    #[serde(default = "default_version")]
    pub version: String,
    /// Unique key; matches the file stem exactly.
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub icon: String,
    /// Working directory. Need not exist; a missing directory is worth a
    /// warning, not a failure.
    pub directory: PathBuf,
    /// Optional per-workspace output pinning.
    #[serde(default)]
    pub workspace_outputs: BTreeMap<i32, String>,
}

fn default_version() -> String {
    PROJECT_VERSION.to_string()
}

impl Project {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>, directory: PathBuf) -> Self {
        Self {
            version: default_version(),
            name: name.into(),
            display_name: display_name.into(),
            icon: String::new(),
            directory,
            workspace_outputs: BTreeMap::new(),
        }
    }
}

/// The currently active project, persisted as one small JSON file.
/// Empty object on disk means "no active project".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActiveProject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

impl ActiveProject {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_project(project: &Project) -> Self {
        Self {
            name: Some(project.name.clone()),
            display_name: Some(project.display_name.clone()),
            icon: Some(project.icon.clone()),
        }
    }

    pub fn is_none(&self) -> bool {
        self.name.is_none()
    }

    /// Load the pointer; missing or corrupt files mean "no active
    /// project".
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                warn!("corrupt active-project file {:?}: {}", path, e);
                Self::none()
            }),
            Err(_) => Self::none(),
        }
    }

    pub fn persist(&self, path: &Path) -> Result<(), ProjectError> {
        atomic_write_json(path, self)?;
        Ok(())
    }
}

/// CRUD over the per-project JSON files.
#[derive(Debug, Clone)]
pub struct ProjectRegistry {
    dir: PathBuf,
}

impl ProjectRegistry {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, ProjectError> {
        validate_name(name)?;
        Ok(self.dir.join(format!("{name}.json")))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|p| p.exists()).unwrap_or(false)
    }

    /// Create a new project. Fails if the name is already taken.
    pub fn create(&self, project: &Project) -> Result<(), ProjectError> {
        let path = self.path_for(&project.name)?;
        if path.exists() {
            return Err(ProjectError::AlreadyExists(project.name.clone()));
        }
        if !project.directory.is_dir() {
            warn!(
                "project '{}' directory {:?} does not exist",
                project.name, project.directory
            );
        }
        atomic_write_json(&path, project)?;
        debug!("created project '{}'", project.name);
        Ok(())
    }

    /// Overwrite an existing project definition.
    pub fn save(&self, project: &Project) -> Result<(), ProjectError> {
        let path = self.path_for(&project.name)?;
        if !path.exists() {
            return Err(ProjectError::NotFound(project.name.clone()));
        }
        atomic_write_json(&path, project)?;
        Ok(())
    }

    pub fn load(&self, name: &str) -> Result<Project, ProjectError> {
        let path = self.path_for(name)?;
        let text = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProjectError::NotFound(name.to_string())
            } else {
                ProjectError::Io(e)
            }
        })?;
        let project: Project = serde_json::from_str(&text)?;
        Ok(project)
    }

    /// Remove the project file. Windows tagged with the name are not
    /// touched; they become orphans.
    pub fn delete(&self, name: &str) -> Result<(), ProjectError> {
        let path = self.path_for(name)?;
        std::fs::remove_file(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ProjectError::NotFound(name.to_string())
            } else {
                ProjectError::Io(e)
            }
        })?;
        debug!("deleted project '{}'", name);
        Ok(())
    }

    /// All projects, sorted by name. Unparseable files are skipped with a
    /// warning so one bad file cannot take down the listing.
    pub fn list(&self) -> Result<Vec<Project>, ProjectError> {
        let mut projects = Vec::new();
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(projects),
            Err(e) => return Err(ProjectError::Io(e)),
        };

        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match std::fs::read_to_string(&path)
                .map_err(ProjectError::Io)
                .and_then(|t| serde_json::from_str::<Project>(&t).map_err(ProjectError::Json))
            {
                Ok(project) => projects.push(project),
                Err(e) => warn!("skipping unreadable project file {:?}: {}", path, e),
            }
        }

        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(projects)
    }
}

fn validate_name(name: &str) -> Result<(), ProjectError> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\0')
    {
        return Err(ProjectError::InvalidName(name.to_string()));
    }
    Ok(())
}
