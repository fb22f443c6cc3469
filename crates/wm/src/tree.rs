//! Typed view of the window manager's tree and query replies.
//!
//! The tree mirrors the WM's `GET_TREE` JSON: outputs contain
//! workspaces, workspaces contain containers, and leaf containers with
//! window metadata are the actual windows. Scratchpad-resident windows
//! hang off the reserved `__i3_scratch` workspace.

use i3pm_core::{Rect, WindowId};
use serde::{Deserialize, Serialize};

/// Name of the reserved workspace holding scratchpad windows.
pub const SCRATCH_WORKSPACE: &str = "__i3_scratch";

/// Container kind in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Root,
    Output,
    Workspace,
    #[default]
    Con,
    FloatingCon,
    Dockarea,
    #[serde(other)]
    Unknown,
}

/// X11 window properties reported by the WM.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindowProperties {
    #[serde(default)]
    pub class: Option<String>,
    #[serde(default)]
    pub instance: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

/// One node of the WM tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Node {
    pub id: WindowId,
    #[serde(rename = "type", default)]
    pub node_type: NodeType,
    #[serde(default)]
    pub name: Option<String>,
    /// Workspace number; present on workspace nodes only.
    #[serde(default)]
    pub num: Option<i32>,
    /// Owning process id, when the WM reports one.
    #[serde(default)]
    pub pid: Option<i32>,
    #[serde(default)]
    pub marks: Vec<String>,
    #[serde(default)]
    pub focused: bool,
    #[serde(default)]
    pub rect: Rect,
    /// Floating discriminator: `auto_on`, `user_on`, `auto_off`, `user_off`.
    #[serde(default)]
    pub floating: Option<String>,
    #[serde(default)]
    pub scratchpad_state: Option<String>,
    /// X11 window id, absent for Wayland-native windows.
    #[serde(default)]
    pub window: Option<i64>,
    #[serde(default)]
    pub window_properties: Option<WindowProperties>,
    /// Wayland application id (sway).
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub floating_nodes: Vec<Node>,
}

/// A window and where the tree places it.
#[derive(Debug, Clone, Copy)]
pub struct WindowLocation<'a> {
    pub node: &'a Node,
    /// Workspace number, `None` for scratchpad residents.
    pub workspace: Option<i32>,
    pub in_scratchpad: bool,
}

impl Node {
    /// True for leaf containers that hold an actual window.
    pub fn is_window(&self) -> bool {
        matches!(self.node_type, NodeType::Con | NodeType::FloatingCon)
            && self.nodes.is_empty()
            && (self.window.is_some()
                || self.window_properties.is_some()
                || self.app_id.is_some()
                || self.pid.is_some())
    }

    /// Window class: X11 class, or the Wayland app id.
    pub fn class(&self) -> Option<&str> {
        self.window_properties
            .as_ref()
            .and_then(|p| p.class.as_deref())
            .or(self.app_id.as_deref())
    }

    pub fn title(&self) -> Option<&str> {
        self.window_properties
            .as_ref()
            .and_then(|p| p.title.as_deref())
            .or(self.name.as_deref())
    }

    pub fn is_floating(&self) -> bool {
        self.floating
            .as_deref()
            .is_some_and(|f| f.ends_with("_on"))
    }

    /// Every window in the tree with its resolved location.
    pub fn windows(&self) -> Vec<WindowLocation<'_>> {
        let mut out = Vec::new();
        self.collect_windows(None, false, &mut out);
        out
    }

    fn collect_windows<'a>(
        &'a self,
        workspace: Option<i32>,
        in_scratchpad: bool,
        out: &mut Vec<WindowLocation<'a>>,
    ) {
        let (workspace, in_scratchpad) = if self.node_type == NodeType::Workspace {
            let scratch = self.name.as_deref() == Some(SCRATCH_WORKSPACE)
                || self.num == Some(-1);
            (if scratch { None } else { self.num }, scratch)
        } else {
            (workspace, in_scratchpad)
        };

        if self.is_window() {
            out.push(WindowLocation {
                node: self,
                workspace,
                in_scratchpad,
            });
        }

        for child in self.nodes.iter().chain(self.floating_nodes.iter()) {
            child.collect_windows(workspace, in_scratchpad, out);
        }
    }

    /// Find a node anywhere in the tree by id.
    pub fn find(&self, id: WindowId) -> Option<&Node> {
        if self.id == id {
            return Some(self);
        }
        self.nodes
            .iter()
            .chain(self.floating_nodes.iter())
            .find_map(|child| child.find(id))
    }

    /// Workspace number a window currently occupies, if it is on one.
    pub fn workspace_of(&self, id: WindowId) -> Option<i32> {
        self.windows()
            .into_iter()
            .find(|w| w.node.id == id)
            .and_then(|w| w.workspace)
    }
}

/// One entry of a `GET_WORKSPACES` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceInfo {
    pub num: i32,
    pub name: String,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub focused: bool,
    pub output: String,
    #[serde(default)]
    pub rect: Rect,
}

/// One entry of a `GET_OUTPUTS` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputInfo {
    pub name: String,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub current_workspace: Option<String>,
    #[serde(default)]
    pub rect: Rect,
}

/// Per-command result of a `RUN_COMMAND` reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const TREE_FIXTURE: &str = r#"{
        "id": 1, "type": "root", "name": "root",
        "nodes": [
            {
                "id": 2, "type": "output", "name": "__i3",
                "nodes": [
                    {
                        "id": 3, "type": "workspace", "name": "__i3_scratch", "num": -1,
                        "floating_nodes": [
                            {
                                "id": 100, "type": "floating_con",
                                "nodes": [
                                    {
                                        "id": 101, "type": "con", "name": "hidden term",
                                        "window": 555, "pid": 4242,
                                        "floating": "user_on",
                                        "marks": ["project:alpha"],
                                        "window_properties": {"class": "Alacritty", "title": "hidden term"}
                                    }
                                ]
                            }
                        ]
                    }
                ]
            },
            {
                "id": 4, "type": "output", "name": "DP-1",
                "nodes": [
                    {
                        "id": 5, "type": "workspace", "name": "2", "num": 2,
                        "nodes": [
                            {
                                "id": 200, "type": "con", "name": "editor",
                                "window": 777, "pid": 1234,
                                "floating": "auto_off",
                                "rect": {"x": 0, "y": 0, "width": 1920, "height": 1040},
                                "window_properties": {"class": "Code", "title": "editor"}
                            }
                        ]
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn tree_fixture_parses_and_walks() {
        let tree: Node = serde_json::from_str(TREE_FIXTURE).unwrap();
        let windows = tree.windows();
        assert_eq!(windows.len(), 2);

        let hidden = windows.iter().find(|w| w.node.id == 101).unwrap();
        assert!(hidden.in_scratchpad);
        assert_eq!(hidden.workspace, None);
        assert_eq!(hidden.node.class(), Some("Alacritty"));
        assert!(hidden.node.is_floating());
        assert_eq!(hidden.node.marks, vec!["project:alpha".to_string()]);

        let editor = windows.iter().find(|w| w.node.id == 200).unwrap();
        assert!(!editor.in_scratchpad);
        assert_eq!(editor.workspace, Some(2));
        assert!(!editor.node.is_floating());
    }

    #[test]
    fn find_and_workspace_of() {
        let tree: Node = serde_json::from_str(TREE_FIXTURE).unwrap();
        assert_eq!(tree.find(200).unwrap().class(), Some("Code"));
        assert!(tree.find(999).is_none());
        assert_eq!(tree.workspace_of(200), Some(2));
        assert_eq!(tree.workspace_of(101), None);
    }

    #[test]
    fn unknown_node_type_does_not_break_parsing() {
        let node: Node =
            serde_json::from_str(r#"{"id": 9, "type": "something_new"}"#).unwrap();
        assert_eq!(node.node_type, NodeType::Unknown);
        assert!(!node.is_window());
    }

    #[test]
    fn wayland_app_id_counts_as_class() {
        let node: Node = serde_json::from_str(
            r#"{"id": 9, "type": "con", "app_id": "org.mozilla.firefox", "pid": 7}"#,
        )
        .unwrap();
        assert!(node.is_window());
        assert_eq!(node.class(), Some("org.mozilla.firefox"));
    }

    #[test]
    fn command_outcome_parses_errors() {
        let outcomes: Vec<CommandOutcome> = serde_json::from_str(
            r#"[{"success": true}, {"success": false, "error": "No matching window"}]"#,
        )
        .unwrap();
        assert!(outcomes[0].success);
        assert_eq!(outcomes[1].error.as_deref(), Some("No matching window"));
    }
}
