//! i3pm Control Protocol
//!
//! Shared types for daemon-CLI communication over a per-user Unix
//! socket. The wire format is JSON-RPC 2.0 shaped and newline-delimited:
//! each request and each reply is a single line of JSON. The daemon also
//! pushes unsolicited notification lines (no `id`) to every connected
//! client after successful mutations, so status bars can react without
//! polling.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Protocol version string carried in every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// Resolve the control socket path: `$XDG_RUNTIME_DIR/i3pm/ipc.sock`,
/// with a temp-dir fallback for sessions without a runtime dir.
pub fn socket_path() -> PathBuf {
    directories::BaseDirs::new()
        .and_then(|dirs| dirs.runtime_dir().map(|d| d.join("i3pm").join("ipc.sock")))
        .unwrap_or_else(|| std::env::temp_dir().join("i3pm-ipc.sock"))
}

// ============================================================================
// Envelopes
// ============================================================================

/// A request from a client to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl Request {
    pub fn new(method: impl Into<String>, params: Value, id: u64) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: Some(Value::from(id)),
        }
    }
}

/// A reply to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    pub id: Value,
}

impl Response {
    pub fn ok(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn err(id: Value, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// An unsolicited server-to-client message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Anything the daemon may write to a client connection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Response(Response),
    Notification(Notification),
}

// ============================================================================
// Errors
// ============================================================================

/// A typed error in a response. Always coded so callers can branch on
/// kind; never a raw stack trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(error_code::INVALID_PARAMS, message)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            error_code::METHOD_NOT_FOUND,
            format!("unknown method '{method}'"),
        )
    }

    pub fn wm_unreachable() -> Self {
        Self::new(
            error_code::WM_UNREACHABLE,
            "window manager unreachable, is it running?",
        )
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::new(error_code::NOT_FOUND, what)
    }
}

/// Error codes: JSON-RPC reserved range plus application codes.
pub mod error_code {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    /// The WM IPC connection is down; mutating calls fail fast.
    pub const WM_UNREACHABLE: i64 = 1001;
    /// A process environment could not be read for some windows.
    pub const PROC_READ_FAILED: i64 = 1002;
    /// The persisted state file was unreadable.
    pub const STATE_CORRUPT: i64 = 1003;
    /// Project name already taken.
    pub const PROJECT_EXISTS: i64 = 1004;
    /// Referenced project or window does not exist.
    pub const NOT_FOUND: i64 = 1005;
    /// The operation exceeded its deadline.
    pub const TIMEOUT: i64 = 1006;
}

// ============================================================================
// Methods
// ============================================================================

/// Method names exposed by the daemon.
pub mod method {
    pub const PROJECT_SWITCH: &str = "project.switch";
    pub const PROJECT_HIDE_WINDOWS: &str = "project.hideWindows";
    pub const PROJECT_RESTORE_WINDOWS: &str = "project.restoreWindows";
    pub const PROJECT_SWITCH_WITH_FILTERING: &str = "project.switchWithFiltering";
    pub const PROJECT_LIST: &str = "project.list";
    pub const PROJECT_CREATE: &str = "project.create";
    pub const PROJECT_DELETE: &str = "project.delete";
    pub const LAUNCH_REGISTER: &str = "launch.register";
    pub const WINDOWS_GET_HIDDEN: &str = "windows.getHidden";
    pub const WINDOWS_GET_STATE: &str = "windows.getState";
    pub const DAEMON_STATUS: &str = "daemon.status";
    pub const DAEMON_STOP: &str = "daemon.stop";
}

/// Notification method names pushed by the daemon.
pub mod notify {
    pub const WINDOW_HIDDEN: &str = "window.hidden";
    pub const WINDOW_RESTORED: &str = "window.restored";
    pub const PROJECT_SWITCHED: &str = "project.switched";
}

// ============================================================================
// Params
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectParams {
    pub project_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchParams {
    #[serde(default)]
    pub from_project: Option<String>,
    pub to_project: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowIdParams {
    pub window_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateProjectParams {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub icon: String,
    pub directory: String,
    #[serde(default)]
    pub workspace_outputs: BTreeMap<i32, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterLaunchParams {
    pub app_id: String,
    pub expected_class: String,
    #[serde(default)]
    pub project_name: Option<String>,
    pub app_name: String,
    /// `scoped` or `global`.
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub workspace: Option<i32>,
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowErrorEntry {
    pub window_id: i64,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HideResult {
    pub windows_hidden: usize,
    pub window_ids: Vec<i64>,
    pub errors: Vec<WindowErrorEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestorationEntry {
    pub window_id: i64,
    pub workspace: i32,
    pub floating: bool,
    /// True when the tracked workspace was unreachable and the window
    /// landed on the fallback workspace.
    pub fallback: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestoreResult {
    pub windows_restored: usize,
    pub restorations: Vec<RestorationEntry>,
    pub errors: Vec<WindowErrorEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchResult {
    /// Absent when the switch had no source project to hide.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hide: Option<HideResult>,
    pub restore: RestoreResult,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HiddenWindow {
    pub window_id: i64,
    pub app_name: String,
    pub tracked_workspace: i32,
    pub floating: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HiddenProject {
    pub project_name: String,
    pub windows: Vec<HiddenWindow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HiddenResult {
    pub projects: Vec<HiddenProject>,
    pub total_hidden: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowStateResult {
    pub window_id: i64,
    pub visible: bool,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub app_name: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub tracked_workspace: Option<i32>,
    #[serde(default)]
    pub floating: Option<bool>,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default)]
    pub marks: Vec<String>,
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInfo {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub icon: String,
    pub directory: String,
    #[serde(default)]
    pub workspace_outputs: BTreeMap<i32, String>,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectListResult {
    pub projects: Vec<ProjectInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResult {
    pub version: String,
    /// `running`, `degraded`, or `stopping`.
    pub lifecycle: String,
    pub wm_connected: bool,
    pub uptime_seconds: u64,
    pub tracked_windows: usize,
    pub hidden_windows: usize,
    pub pending_launches: usize,
    #[serde(default)]
    pub active_project: Option<String>,
}

/// Payload of `window.hidden` and `window.restored` notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowsChangedParams {
    pub project_name: String,
    pub window_ids: Vec<i64>,
}

/// Payload of `project.switched`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSwitchedParams {
    #[serde(default)]
    pub project_name: Option<String>,
}
