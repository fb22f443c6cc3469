//! Integration tests for the i3pm control protocol.
//!
//! These tests verify the protocol correctness without requiring a
//! running window manager. They test:
//! - Request/response serialization across every method
//! - Error code mapping
//! - The newline-delimited wire flow a client actually performs

use i3pm_ipc::{
    error_code, method, notify, HiddenProject, HiddenResult, HiddenWindow, HideResult,
    Notification, ProjectInfo, ProjectListResult, RegisterLaunchParams, Request, RestorationEntry,
    RestoreResult, Response, RpcError, ServerMessage, StatusResult, SwitchParams, SwitchResult,
    WindowErrorEntry, WindowStateResult, WindowsChangedParams,
};
use serde_json::{json, Value};

// ============================================================================
// Request construction for every method
// ============================================================================

/// Every method's request serializes with the right name and roundtrips.
#[test]
fn test_all_method_requests_roundtrip() {
    let requests = vec![
        Request::new(method::PROJECT_SWITCH, json!({"project_name": "alpha"}), 1),
        Request::new(
            method::PROJECT_HIDE_WINDOWS,
            json!({"project_name": "alpha"}),
            2,
        ),
        Request::new(
            method::PROJECT_RESTORE_WINDOWS,
            json!({"project_name": "alpha"}),
            3,
        ),
        Request::new(
            method::PROJECT_SWITCH_WITH_FILTERING,
            serde_json::to_value(SwitchParams {
                from_project: Some("alpha".to_string()),
                to_project: "beta".to_string(),
            })
            .unwrap(),
            4,
        ),
        Request::new(method::PROJECT_LIST, Value::Null, 5),
        Request::new(
            method::PROJECT_CREATE,
            json!({
                "name": "alpha",
                "display_name": "Alpha",
                "directory": "/home/user/src/alpha"
            }),
            6,
        ),
        Request::new(method::PROJECT_DELETE, json!({"project_name": "alpha"}), 7),
        Request::new(
            method::LAUNCH_REGISTER,
            serde_json::to_value(RegisterLaunchParams {
                app_id: "code-1700000000".to_string(),
                expected_class: "Code".to_string(),
                project_name: Some("alpha".to_string()),
                app_name: "code".to_string(),
                scope: Some("scoped".to_string()),
                workspace: Some(2),
            })
            .unwrap(),
            8,
        ),
        Request::new(method::WINDOWS_GET_HIDDEN, Value::Null, 9),
        Request::new(method::WINDOWS_GET_STATE, json!({"window_id": 42}), 10),
        Request::new(method::DAEMON_STATUS, Value::Null, 11),
        Request::new(method::DAEMON_STOP, Value::Null, 12),
    ];

    for request in requests {
        let wire = serde_json::to_string(&request).expect("serialize");
        let parsed: Request = serde_json::from_str(&wire).expect("deserialize");
        assert_eq!(parsed, request, "roundtrip failed for {}", request.method);
    }
}

// ============================================================================
// Result payloads
// ============================================================================

#[test]
fn test_hide_result_shape() {
    let result = HideResult {
        windows_hidden: 2,
        window_ids: vec![10, 11],
        errors: vec![],
    };
    let wire = serde_json::to_string(&result).unwrap();
    assert!(wire.contains("\"windows_hidden\":2"));
    assert!(wire.contains("\"window_ids\":[10,11]"));

    let parsed: HideResult = serde_json::from_str(&wire).unwrap();
    assert_eq!(parsed, result);
}

#[test]
fn test_restore_result_reports_fallbacks() {
    let result = RestoreResult {
        windows_restored: 2,
        restorations: vec![
            RestorationEntry {
                window_id: 10,
                workspace: 2,
                floating: false,
                fallback: false,
            },
            RestorationEntry {
                window_id: 11,
                workspace: 1,
                floating: true,
                fallback: true,
            },
        ],
        errors: vec![],
    };
    let wire = serde_json::to_string(&result).unwrap();
    let parsed: RestoreResult = serde_json::from_str(&wire).unwrap();
    assert_eq!(parsed, result);
    assert!(parsed.restorations[1].fallback);
}

#[test]
fn test_partial_failure_payload() {
    // One window of the batch vanished mid-operation: still a success
    // payload, with exactly one error entry.
    let result = HideResult {
        windows_hidden: 1,
        window_ids: vec![10],
        errors: vec![WindowErrorEntry {
            window_id: 11,
            error: "No matching window".to_string(),
        }],
    };
    let wire = serde_json::to_string(&result).unwrap();
    let parsed: HideResult = serde_json::from_str(&wire).unwrap();
    assert_eq!(parsed.errors.len(), 1);
    assert_eq!(parsed.errors[0].window_id, 11);
}

#[test]
fn test_nested_switch_result() {
    let result = SwitchResult {
        hide: Some(HideResult {
            windows_hidden: 2,
            window_ids: vec![10, 11],
            errors: vec![],
        }),
        restore: RestoreResult {
            windows_restored: 0,
            restorations: vec![],
            errors: vec![],
        },
        duration_ms: 23,
    };
    let wire = serde_json::to_string(&result).unwrap();
    let parsed: SwitchResult = serde_json::from_str(&wire).unwrap();
    assert_eq!(parsed.hide.as_ref().unwrap().windows_hidden, 2);
    assert_eq!(parsed.restore.windows_restored, 0);
}

#[test]
fn test_hidden_result_grouping() {
    let result = HiddenResult {
        projects: vec![HiddenProject {
            project_name: "alpha".to_string(),
            windows: vec![HiddenWindow {
                window_id: 10,
                app_name: "code".to_string(),
                tracked_workspace: 2,
                floating: false,
            }],
        }],
        total_hidden: 1,
    };
    let wire = serde_json::to_string(&result).unwrap();
    let parsed: HiddenResult = serde_json::from_str(&wire).unwrap();
    assert_eq!(parsed, result);
}

#[test]
fn test_window_state_optional_fields_default() {
    // A window known only to the WM (never tracked) has no ownership
    // fields.
    let parsed: WindowStateResult =
        serde_json::from_str(r#"{"window_id": 7, "visible": true}"#).unwrap();
    assert_eq!(parsed.window_id, 7);
    assert!(parsed.visible);
    assert_eq!(parsed.project_name, None);
    assert_eq!(parsed.tracked_workspace, None);
    assert!(parsed.marks.is_empty());
}

#[test]
fn test_status_result_roundtrip() {
    let status = StatusResult {
        version: "0.1.0".to_string(),
        lifecycle: "running".to_string(),
        wm_connected: true,
        uptime_seconds: 3600,
        tracked_windows: 12,
        hidden_windows: 4,
        pending_launches: 1,
        active_project: Some("alpha".to_string()),
    };
    let wire = serde_json::to_string(&status).unwrap();
    let parsed: StatusResult = serde_json::from_str(&wire).unwrap();
    assert_eq!(parsed, status);
}

#[test]
fn test_project_list_marks_active() {
    let result = ProjectListResult {
        projects: vec![ProjectInfo {
            name: "alpha".to_string(),
            display_name: "Alpha".to_string(),
            icon: String::new(),
            directory: "/home/user/src/alpha".to_string(),
            workspace_outputs: [(2, "DP-1".to_string())].into_iter().collect(),
            active: true,
        }],
    };
    let wire = serde_json::to_string(&result).unwrap();
    let parsed: ProjectListResult = serde_json::from_str(&wire).unwrap();
    assert!(parsed.projects[0].active);
    assert_eq!(
        parsed.projects[0].workspace_outputs.get(&2).map(String::as_str),
        Some("DP-1")
    );
}

// ============================================================================
// Errors
// ============================================================================

#[test]
fn test_error_codes_are_distinct() {
    let codes = [
        error_code::PARSE_ERROR,
        error_code::INVALID_REQUEST,
        error_code::METHOD_NOT_FOUND,
        error_code::INVALID_PARAMS,
        error_code::INTERNAL_ERROR,
        error_code::WM_UNREACHABLE,
        error_code::PROC_READ_FAILED,
        error_code::STATE_CORRUPT,
        error_code::PROJECT_EXISTS,
        error_code::NOT_FOUND,
        error_code::TIMEOUT,
    ];
    for (i, a) in codes.iter().enumerate() {
        for b in &codes[i + 1..] {
            assert_ne!(a, b);
        }
    }
}

#[test]
fn test_wm_unreachable_error_guides_the_user() {
    let error = RpcError::wm_unreachable();
    assert_eq!(error.code, error_code::WM_UNREACHABLE);
    assert!(error.message.contains("is it running"));
}

#[test]
fn test_error_response_echoes_request_id() {
    let response = Response::err(json!(42), RpcError::method_not_found("daemon.fly"));
    let wire = serde_json::to_string(&response).unwrap();
    let parsed: Response = serde_json::from_str(&wire).unwrap();
    assert_eq!(parsed.id, json!(42));
    assert_eq!(parsed.error.unwrap().code, error_code::METHOD_NOT_FOUND);
}

// ============================================================================
// Wire flow
// ============================================================================

/// Simulate what a client does: write a request line, read reply lines,
/// skipping interleaved notifications until the response arrives.
#[test]
fn test_client_skips_notifications_until_response() {
    let request = Request::new(method::PROJECT_HIDE_WINDOWS, json!({"project_name": "alpha"}), 5);
    let _request_line = serde_json::to_string(&request).unwrap() + "\n";

    let server_lines = [
        serde_json::to_string(&Notification::new(
            notify::WINDOW_HIDDEN,
            serde_json::to_value(WindowsChangedParams {
                project_name: "alpha".to_string(),
                window_ids: vec![10, 11],
            })
            .unwrap(),
        ))
        .unwrap(),
        serde_json::to_string(&Response::ok(
            json!(5),
            serde_json::to_value(HideResult {
                windows_hidden: 2,
                window_ids: vec![10, 11],
                errors: vec![],
            })
            .unwrap(),
        ))
        .unwrap(),
    ];

    let mut response = None;
    let mut notifications = Vec::new();
    for line in &server_lines {
        match serde_json::from_str::<ServerMessage>(line).unwrap() {
            ServerMessage::Notification(n) => notifications.push(n),
            ServerMessage::Response(r) => {
                response = Some(r);
                break;
            }
        }
    }

    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].method, notify::WINDOW_HIDDEN);
    let response = response.unwrap();
    assert_eq!(response.id, json!(5));
    let result: HideResult = serde_json::from_value(response.result.unwrap()).unwrap();
    assert_eq!(result.windows_hidden, 2);
}

#[test]
fn test_malformed_request_line_is_detectable() {
    assert!(serde_json::from_str::<Request>("{\"method\": 12}").is_err());
    assert!(serde_json::from_str::<Request>("").is_err());
}
