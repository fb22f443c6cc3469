//! Window ownership tags.
//!
//! A window belongs to at most one project. Ownership is derived once,
//! near window creation, from the owning process's environment (or from a
//! matched pending launch) and is immutable afterwards — re-reading the
//! environment later is unreliable because the process may have exited or
//! exec'd.
//!
//! For fast re-lookup without touching `/proc`, the project name is also
//! encoded as a WM mark (`project:<name>`) on the window.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Environment variable carrying the owning project name.
pub const ENV_PROJECT: &str = "PROJECT_NAME";
/// Environment variable carrying the application name.
pub const ENV_APP: &str = "APP_NAME";
/// Environment variable carrying the window scope (`scoped` or `global`).
pub const ENV_SCOPE: &str = "SCOPE";
/// Environment variable carrying the per-launch application id.
pub const ENV_APP_ID: &str = "APP_ID";

/// Prefix of the WM mark that encodes project ownership.
const MARK_PREFIX: &str = "project:";

/// Whether a window participates in project switching.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    /// Hidden and restored as projects switch.
    #[default]
    Scoped,
    /// Always visible, regardless of the active project.
    Global,
}

impl Scope {
    /// Parse a scope string. Anything other than `global` is treated as
    /// scoped; this is the single place loose environment input is
    /// normalized.
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("global") {
            Scope::Global
        } else {
            Scope::Scoped
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Scoped => "scoped",
            Scope::Global => "global",
        }
    }
}

/// Validated ownership tag for one window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowOwnership {
    /// Owning project name, if any. A name that no longer resolves to a
    /// registered project is tolerated and treated as "no known project"
    /// by consumers.
    pub project: Option<String>,
    /// Application name the launch wrapper reported.
    pub app: String,
    /// Scoped windows follow project switches; global windows never hide.
    pub scope: Scope,
}

impl WindowOwnership {
    /// Build an ownership tag from a process environment.
    ///
    /// Returns `None` when the environment carries none of the launch
    /// tags, meaning the window was not started through a project-aware
    /// launcher and is untracked.
    pub fn from_env_map(env: &HashMap<String, String>) -> Option<Self> {
        let project = env.get(ENV_PROJECT).filter(|v| !v.is_empty()).cloned();
        let app = env.get(ENV_APP).filter(|v| !v.is_empty()).cloned();
        let scope = env.get(ENV_SCOPE).filter(|v| !v.is_empty());

        if project.is_none() && app.is_none() && scope.is_none() {
            return None;
        }

        Some(Self {
            project,
            app: app.unwrap_or_else(|| "unknown".to_string()),
            scope: scope.map(|s| Scope::parse(s)).unwrap_or_default(),
        })
    }

    /// True when a `hide(project)` call selects this window.
    pub fn is_hidden_by(&self, project: &str) -> bool {
        self.scope == Scope::Scoped && self.project.as_deref() == Some(project)
    }

    /// The WM mark encoding this ownership, if it names a project.
    pub fn mark(&self) -> Option<String> {
        self.project.as_deref().map(|p| format!("{MARK_PREFIX}{p}"))
    }
}

/// Extract the project name from an ownership mark.
pub fn project_from_mark(mark: &str) -> Option<&str> {
    mark.strip_prefix(MARK_PREFIX).filter(|p| !p.is_empty())
}

/// Find the project name among a window's marks.
pub fn project_from_marks<'a, I>(marks: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a String>,
{
    marks.into_iter().find_map(|m| project_from_mark(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn ownership_from_full_environment() {
        let ownership = WindowOwnership::from_env_map(&env(&[
            (ENV_PROJECT, "alpha"),
            (ENV_APP, "editor"),
            (ENV_SCOPE, "scoped"),
        ]))
        .unwrap();

        assert_eq!(ownership.project.as_deref(), Some("alpha"));
        assert_eq!(ownership.app, "editor");
        assert_eq!(ownership.scope, Scope::Scoped);
        assert!(ownership.is_hidden_by("alpha"));
        assert!(!ownership.is_hidden_by("beta"));
    }

    #[test]
    fn untagged_environment_yields_none() {
        let plain = env(&[("HOME", "/home/user"), ("PATH", "/usr/bin")]);
        assert!(WindowOwnership::from_env_map(&plain).is_none());
    }

    #[test]
    fn global_scope_is_never_hidden() {
        let ownership = WindowOwnership::from_env_map(&env(&[
            (ENV_PROJECT, "alpha"),
            (ENV_APP, "browser"),
            (ENV_SCOPE, "global"),
        ]))
        .unwrap();

        assert_eq!(ownership.scope, Scope::Global);
        assert!(!ownership.is_hidden_by("alpha"));
    }

    #[test]
    fn unknown_scope_degrades_to_scoped() {
        let ownership = WindowOwnership::from_env_map(&env(&[
            (ENV_PROJECT, "alpha"),
            (ENV_SCOPE, "banana"),
        ]))
        .unwrap();
        assert_eq!(ownership.scope, Scope::Scoped);
    }

    #[test]
    fn empty_values_are_ignored() {
        let ownership = WindowOwnership::from_env_map(&env(&[
            (ENV_PROJECT, ""),
            (ENV_APP, "terminal"),
        ]))
        .unwrap();
        assert_eq!(ownership.project, None);
        assert_eq!(ownership.app, "terminal");
    }

    #[test]
    fn mark_roundtrip() {
        let ownership = WindowOwnership {
            project: Some("alpha".to_string()),
            app: "editor".to_string(),
            scope: Scope::Scoped,
        };
        let mark = ownership.mark().unwrap();
        assert_eq!(mark, "project:alpha");
        assert_eq!(project_from_mark(&mark), Some("alpha"));
        assert_eq!(project_from_mark("project:"), None);
        assert_eq!(project_from_mark("unrelated"), None);
    }

    #[test]
    fn project_found_among_marks() {
        let marks = vec![
            "_sticky".to_string(),
            "project:beta".to_string(),
        ];
        assert_eq!(project_from_marks(&marks), Some("beta"));

        let no_marks: Vec<String> = Vec::new();
        assert_eq!(project_from_marks(&no_marks), None);
    }
}
