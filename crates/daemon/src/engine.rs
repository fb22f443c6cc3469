//! Daemon engine.
//!
//! Owns the runtime state (window store, launch registry, project
//! registry, active-project pointer) and implements both halves of the
//! daemon's work: dispatching WM events into state updates, and serving
//! control-protocol requests. Everything here runs on the single
//! serialized event loop in `main.rs`; the engine itself has no
//! internal locking.
//!
//! The WM is reached through the `WmClient` trait so tests can inject a
//! scripted fake.

use crate::config::Config;
use i3pm_core::filter::{self, WindowView};
use i3pm_core::launch::{LaunchRegistry, PendingLaunch};
use i3pm_core::ownership::{self, Scope, WindowOwnership};
use i3pm_core::project::{ActiveProject, Project, ProjectError, ProjectRegistry};
use i3pm_core::store::{TrackedWindowState, WindowStore};
use i3pm_core::WindowId;
use i3pm_ipc::{self as proto, error_code, RpcError};
use i3pm_wm::{proc_env, Event, Node, WindowChange, WmClient, WmError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Daemon health as seen by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Running,
    Degraded,
}

impl Lifecycle {
    fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Running => "running",
            Lifecycle::Degraded => "degraded",
        }
    }
}

pub struct Engine {
    /// WM connection; `None` while degraded. Replaced wholesale on
    /// reconnect.
    wm: Option<Arc<dyn WmClient>>,
    store: WindowStore,
    launches: LaunchRegistry,
    projects: ProjectRegistry,
    active: ActiveProject,
    lifecycle: Lifecycle,
    config: Config,
    state_path: PathBuf,
    active_path: PathBuf,
    start: Instant,
    notifier: broadcast::Sender<proto::Notification>,
}

fn now_unix() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))
}

fn to_result<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::new(error_code::INTERNAL_ERROR, e.to_string()))
}

fn rpc_from_wm(e: WmError) -> RpcError {
    match e {
        WmError::SocketNotFound | WmError::Transport(_) | WmError::Timeout(_) => RpcError::new(
            error_code::WM_UNREACHABLE,
            format!("window manager unreachable, is it running? ({e})"),
        ),
        other => RpcError::new(error_code::INTERNAL_ERROR, other.to_string()),
    }
}

fn rpc_from_project(e: ProjectError) -> RpcError {
    match e {
        ProjectError::AlreadyExists(name) => RpcError::new(
            error_code::PROJECT_EXISTS,
            format!("project '{name}' already exists"),
        ),
        ProjectError::NotFound(name) => RpcError::not_found(format!("project '{name}' not found")),
        ProjectError::InvalidName(name) => {
            RpcError::invalid_params(format!("invalid project name '{name}'"))
        }
        ProjectError::Json(e) => RpcError::new(error_code::STATE_CORRUPT, e.to_string()),
        ProjectError::Io(e) => RpcError::new(error_code::INTERNAL_ERROR, e.to_string()),
    }
}

impl Engine {
    pub fn new(
        config: Config,
        store: WindowStore,
        projects: ProjectRegistry,
        active: ActiveProject,
        notifier: broadcast::Sender<proto::Notification>,
    ) -> Self {
        let state_path = config.state_file();
        let active_path = config.active_file();
        Self {
            wm: None,
            store,
            launches: LaunchRegistry::new(config.launch_ttl()),
            projects,
            active,
            lifecycle: Lifecycle::Degraded,
            config,
            state_path,
            active_path,
            start: Instant::now(),
            notifier,
        }
    }

    pub fn set_wm(&mut self, wm: Arc<dyn WmClient>) {
        self.wm = Some(wm);
        self.lifecycle = Lifecycle::Running;
    }

    pub fn set_degraded(&mut self) {
        self.wm = None;
        self.lifecycle = Lifecycle::Degraded;
    }

    fn wm(&self) -> Result<Arc<dyn WmClient>, RpcError> {
        self.wm.clone().ok_or_else(RpcError::wm_unreachable)
    }

    /// Flush the window store; losing one persist is tolerable, so this
    /// only warns.
    pub fn persist_store(&self) {
        if let Err(e) = self.store.persist(&self.state_path) {
            warn!("failed to persist window state: {}", e);
        }
    }

    fn notify<T: Serialize>(&self, method: &str, params: &T) {
        match serde_json::to_value(params) {
            Ok(value) => {
                let _ = self.notifier.send(proto::Notification::new(method, value));
            }
            Err(e) => warn!("failed to encode notification: {}", e),
        }
    }

    // ------------------------------------------------------------------
    // WM access with one retry
    // ------------------------------------------------------------------

    async fn get_tree(&self, wm: &Arc<dyn WmClient>) -> Result<Node, WmError> {
        match wm.get_tree().await {
            Err(e) if e.is_retryable() => {
                warn!("get_tree failed ({}), retrying once", e);
                wm.get_tree().await
            }
            other => other,
        }
    }

    async fn get_outputs(
        &self,
        wm: &Arc<dyn WmClient>,
    ) -> Result<Vec<i3pm_wm::OutputInfo>, WmError> {
        match wm.get_outputs().await {
            Err(e) if e.is_retryable() => {
                warn!("get_outputs failed ({}), retrying once", e);
                wm.get_outputs().await
            }
            other => other,
        }
    }

    async fn run_command(
        &self,
        wm: &Arc<dyn WmClient>,
        command: &str,
    ) -> Result<Vec<i3pm_wm::CommandOutcome>, WmError> {
        match wm.run_command(command).await {
            Err(e) if e.is_retryable() => {
                warn!("run_command failed ({}), retrying once", e);
                wm.run_command(command).await
            }
            other => other,
        }
    }

    // ------------------------------------------------------------------
    // Ownership resolution
    // ------------------------------------------------------------------

    /// Resolve a window's ownership: store entry first, then the WM
    /// mark, then the process environment. A failed environment read is
    /// "ownership unknown", not an error.
    async fn resolve_ownership(&self, node: &Node) -> Option<WindowOwnership> {
        if let Some(entry) = self.store.get(node.id) {
            return Some(WindowOwnership {
                project: Some(entry.project_name.clone()),
                app: entry.app_name.clone(),
                scope: Scope::Scoped,
            });
        }

        if let Some(project) = ownership::project_from_marks(&node.marks) {
            return Some(WindowOwnership {
                project: Some(project.to_string()),
                app: node.class().unwrap_or("unknown").to_string(),
                scope: Scope::Scoped,
            });
        }

        if let Some(pid) = node.pid {
            match proc_env::read_process_env(pid).await {
                Ok(env) => return WindowOwnership::from_env_map(&env),
                Err(e) => debug!(window = node.id, "environment read failed: {}", e),
            }
        }

        None
    }

    async fn build_views(&self, tree: &Node) -> Vec<WindowView> {
        let mut views = Vec::new();
        for location in tree.windows() {
            let node = location.node;
            views.push(WindowView {
                id: node.id,
                ownership: self.resolve_ownership(node).await,
                workspace: location.workspace,
                floating: node.is_floating(),
                geometry: node.rect,
                in_scratchpad: location.in_scratchpad,
            });
        }
        views
    }

    // ------------------------------------------------------------------
    // Filter operations
    // ------------------------------------------------------------------

    /// Hide all scoped windows of `project` into the scratchpad.
    pub async fn hide_windows(&mut self, project: &str) -> Result<proto::HideResult, RpcError> {
        let wm = self.wm()?;
        let tree = self.get_tree(&wm).await.map_err(rpc_from_wm)?;
        let views = self.build_views(&tree).await;
        let now = now_unix();

        let plan = filter::plan_hide(project, &views, &self.store, now);
        let Some(command) = filter::batched_command(&plan.moves) else {
            return Ok(proto::HideResult {
                windows_hidden: 0,
                window_ids: vec![],
                errors: vec![],
            });
        };

        let results = self.run_command(&wm, &command).await.map_err(rpc_from_wm)?;
        let flat: Vec<(bool, Option<String>)> =
            results.into_iter().map(|o| (o.success, o.error)).collect();
        let outcomes = filter::map_outcomes(&plan.moves, &flat);

        let mut window_ids = Vec::new();
        let mut errors = Vec::new();
        for outcome in &outcomes {
            if outcome.success {
                // First hide since the last restore: fresh capture.
                // Repeat hide: the stored capture stays authoritative.
                if let Some(capture) = plan.capture_for(outcome.window_id) {
                    self.store.upsert(capture.clone());
                } else {
                    self.store.mark_hidden(outcome.window_id, now);
                }
                window_ids.push(outcome.window_id);
            } else {
                errors.push(proto::WindowErrorEntry {
                    window_id: outcome.window_id,
                    error: outcome
                        .error
                        .clone()
                        .unwrap_or_else(|| "command failed".to_string()),
                });
            }
        }

        self.persist_store();
        if !window_ids.is_empty() {
            self.notify(
                proto::notify::WINDOW_HIDDEN,
                &proto::WindowsChangedParams {
                    project_name: project.to_string(),
                    window_ids: window_ids.clone(),
                },
            );
        }
        info!(
            project,
            hidden = window_ids.len(),
            failed = errors.len(),
            "hide complete"
        );

        Ok(proto::HideResult {
            windows_hidden: window_ids.len(),
            window_ids,
            errors,
        })
    }

    /// Restore all hidden windows of `project` to their tracked
    /// workspaces.
    pub async fn restore_windows(
        &mut self,
        project: &str,
    ) -> Result<proto::RestoreResult, RpcError> {
        let wm = self.wm()?;
        let tree = self.get_tree(&wm).await.map_err(rpc_from_wm)?;
        let views = self.build_views(&tree).await;
        let now = now_unix();

        // A tracked workspace is unreachable only when the project pins
        // it to an output that is currently disconnected.
        let active_outputs: HashSet<String> = self
            .get_outputs(&wm)
            .await
            .map_err(rpc_from_wm)?
            .into_iter()
            .filter(|o| o.active)
            .map(|o| o.name)
            .collect();
        let assignments = match self.projects.load(project) {
            Ok(p) => p.workspace_outputs,
            Err(_) => BTreeMap::new(),
        };
        let workspace_ok = move |ws: i32| match assignments.get(&ws) {
            Some(output) => active_outputs.contains(output),
            None => true,
        };

        let plan = filter::plan_restore(
            project,
            &views,
            &self.store,
            &workspace_ok,
            self.config.behavior.fallback_workspace,
        );
        let Some(command) = filter::batched_command(&plan.moves) else {
            return Ok(proto::RestoreResult {
                windows_restored: 0,
                restorations: vec![],
                errors: vec![],
            });
        };

        let results = self.run_command(&wm, &command).await.map_err(rpc_from_wm)?;
        let flat: Vec<(bool, Option<String>)> =
            results.into_iter().map(|o| (o.success, o.error)).collect();
        let outcomes = filter::map_outcomes(&plan.moves, &flat);

        let mut restorations = Vec::new();
        let mut errors = Vec::new();
        for (outcome, restoration) in outcomes.iter().zip(plan.restorations.iter()) {
            if outcome.success {
                self.store
                    .mark_restored(restoration.window_id, restoration.workspace, now);
                if restoration.fallback {
                    info!(
                        window = restoration.window_id,
                        workspace = restoration.workspace,
                        "restored to fallback workspace"
                    );
                }
                restorations.push(proto::RestorationEntry {
                    window_id: restoration.window_id,
                    workspace: restoration.workspace,
                    floating: restoration.floating,
                    fallback: restoration.fallback,
                });
            } else {
                errors.push(proto::WindowErrorEntry {
                    window_id: outcome.window_id,
                    error: outcome
                        .error
                        .clone()
                        .unwrap_or_else(|| "command failed".to_string()),
                });
            }
        }

        self.persist_store();
        if !restorations.is_empty() {
            self.notify(
                proto::notify::WINDOW_RESTORED,
                &proto::WindowsChangedParams {
                    project_name: project.to_string(),
                    window_ids: restorations.iter().map(|r| r.window_id).collect(),
                },
            );
        }
        info!(
            project,
            restored = restorations.len(),
            failed = errors.len(),
            "restore complete"
        );

        Ok(proto::RestoreResult {
            windows_restored: restorations.len(),
            restorations,
            errors,
        })
    }

    /// Hide the outgoing project (when there is one), restore the
    /// incoming one, and move the active-project pointer.
    pub async fn switch_with_filtering(
        &mut self,
        from: Option<&str>,
        to: &str,
    ) -> Result<proto::SwitchResult, RpcError> {
        let started = Instant::now();

        let hide = match from {
            Some(p) if !p.is_empty() => Some(self.hide_windows(p).await?),
            _ => None,
        };
        let restore = self.restore_windows(to).await?;
        self.set_active(Some(to));

        Ok(proto::SwitchResult {
            hide,
            restore,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// Move the active-project pointer without filtering.
    pub fn switch_project(&mut self, to: &str) -> Result<(), RpcError> {
        if !self.projects.exists(to) {
            return Err(RpcError::not_found(format!("project '{to}' not found")));
        }
        self.set_active(Some(to));
        Ok(())
    }

    fn set_active(&mut self, to: Option<&str>) {
        self.active = match to {
            Some(name) => match self.projects.load(name) {
                Ok(project) => ActiveProject::from_project(&project),
                // Unknown project names are tolerated as weak references.
                Err(_) => ActiveProject {
                    name: Some(name.to_string()),
                    display_name: Some(name.to_string()),
                    icon: None,
                },
            },
            None => ActiveProject::none(),
        };
        if let Err(e) = self.active.persist(&self.active_path) {
            warn!("failed to persist active project: {}", e);
        }
        self.notify(
            proto::notify::PROJECT_SWITCHED,
            &proto::ProjectSwitchedParams {
                project_name: to.map(str::to_string),
            },
        );
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get_hidden(&self) -> proto::HiddenResult {
        let mut by_project: BTreeMap<String, Vec<proto::HiddenWindow>> = BTreeMap::new();
        for entry in self.store.iter().filter(|e| e.hidden) {
            by_project
                .entry(entry.project_name.clone())
                .or_default()
                .push(proto::HiddenWindow {
                    window_id: entry.window_id,
                    app_name: entry.app_name.clone(),
                    tracked_workspace: entry.tracked_workspace,
                    floating: entry.floating,
                });
        }

        let mut total_hidden = 0;
        let projects = by_project
            .into_iter()
            .map(|(project_name, mut windows)| {
                windows.sort_by_key(|w| w.window_id);
                total_hidden += windows.len();
                proto::HiddenProject {
                    project_name,
                    windows,
                }
            })
            .collect();

        proto::HiddenResult {
            projects,
            total_hidden,
        }
    }

    pub async fn get_window_state(
        &self,
        id: WindowId,
    ) -> Result<proto::WindowStateResult, RpcError> {
        let entry = self.store.get(id).cloned();

        // While degraded, answer from the cached store alone.
        let mut live: Option<(Node, bool)> = None;
        if let Some(wm) = self.wm.clone() {
            if let Ok(tree) = self.get_tree(&wm).await {
                live = tree
                    .windows()
                    .into_iter()
                    .find(|w| w.node.id == id)
                    .map(|w| (w.node.clone(), w.in_scratchpad));
            }
        }

        if entry.is_none() && live.is_none() {
            return Err(RpcError::not_found(format!("window {id} not known")));
        }

        let visible = live
            .as_ref()
            .map(|(_, in_scratchpad)| !in_scratchpad)
            .unwrap_or(false);
        let node = live.map(|(node, _)| node);

        Ok(proto::WindowStateResult {
            window_id: id,
            visible,
            project_name: entry
                .as_ref()
                .map(|e| e.project_name.clone())
                .or_else(|| {
                    node.as_ref()
                        .and_then(|n| ownership::project_from_marks(&n.marks).map(String::from))
                }),
            app_name: entry.as_ref().map(|e| e.app_name.clone()),
            scope: entry.as_ref().map(|_| Scope::Scoped.as_str().to_string()),
            tracked_workspace: entry.as_ref().map(|e| e.tracked_workspace),
            floating: entry.as_ref().map(|e| e.floating),
            geometry: entry.as_ref().and_then(|e| {
                e.geometry.map(|g| proto::Geometry {
                    x: g.x,
                    y: g.y,
                    width: g.width,
                    height: g.height,
                })
            }),
            marks: node.as_ref().map(|n| n.marks.clone()).unwrap_or_default(),
            class: node.as_ref().and_then(|n| n.class().map(String::from)),
            title: node.as_ref().and_then(|n| n.title().map(String::from)),
        })
    }

    pub fn status(&self) -> proto::StatusResult {
        proto::StatusResult {
            version: env!("CARGO_PKG_VERSION").to_string(),
            lifecycle: self.lifecycle.as_str().to_string(),
            wm_connected: self.wm.is_some(),
            uptime_seconds: self.start.elapsed().as_secs(),
            tracked_windows: self.store.len(),
            hidden_windows: self.store.hidden_count(),
            pending_launches: self.launches.len(),
            active_project: self.active.name.clone(),
        }
    }

    // ------------------------------------------------------------------
    // Launch registry
    // ------------------------------------------------------------------

    pub fn register_launch(&mut self, params: proto::RegisterLaunchParams) {
        let ownership = WindowOwnership {
            project: params.project_name,
            app: params.app_name,
            scope: params
                .scope
                .as_deref()
                .map(Scope::parse)
                .unwrap_or_default(),
        };
        self.launches.register(PendingLaunch {
            app_id: params.app_id,
            expected_class: params.expected_class,
            ownership,
            workspace: params.workspace,
            requested_at: Instant::now(),
        });
    }

    pub fn expire_launches(&mut self) {
        self.launches.expire(Instant::now());
    }

    // ------------------------------------------------------------------
    // Project CRUD
    // ------------------------------------------------------------------

    fn list_projects(&self) -> Result<proto::ProjectListResult, RpcError> {
        let projects = self
            .projects
            .list()
            .map_err(rpc_from_project)?
            .into_iter()
            .map(|p| proto::ProjectInfo {
                active: self.active.name.as_deref() == Some(p.name.as_str()),
                name: p.name,
                display_name: p.display_name,
                icon: p.icon,
                directory: p.directory.display().to_string(),
                workspace_outputs: p.workspace_outputs,
            })
            .collect();
        Ok(proto::ProjectListResult { projects })
    }

    fn create_project(&self, params: proto::CreateProjectParams) -> Result<(), RpcError> {
        let mut project = Project::new(params.name, params.display_name, params.directory.into());
        project.icon = params.icon;
        project.workspace_outputs = params.workspace_outputs;
        self.projects.create(&project).map_err(rpc_from_project)
    }

    // ------------------------------------------------------------------
    // Event dispatch
    // ------------------------------------------------------------------

    /// Process one WM event. Never propagates failure: one bad event
    /// must not stall the stream.
    pub async fn handle_wm_event(&mut self, event: Event) {
        match event {
            Event::Window(ev) => match ev.change {
                WindowChange::New => self.on_window_new(ev.container).await,
                WindowChange::Close => self.on_window_close(ev.container.id),
                WindowChange::Move => self.on_window_move(ev.container.id).await,
                WindowChange::Floating => self.on_window_floating(&ev.container),
                _ => {}
            },
            Event::Workspace(ev) => debug!(change = %ev.change, "workspace event"),
            Event::Output(ev) => debug!(change = %ev.change, "output event"),
            Event::Shutdown(ev) => {
                info!(change = %ev.change, "window manager is shutting down")
            }
        }
    }

    async fn on_window_new(&mut self, container: Node) {
        let class = container.class().unwrap_or_default().to_string();
        let workspace = self.lookup_workspace(container.id).await;
        let now = now_unix();

        // Launch correlation first: it disambiguates rapid multi-instance
        // launches, which the environment alone cannot.
        let ownership = match self.launches.correlate(&class, workspace, Instant::now()) {
            Some(matched) => {
                debug!(
                    window = container.id,
                    app_id = %matched.launch.app_id,
                    confidence = ?matched.confidence,
                    "window attributed via launch registry"
                );
                Some(matched.launch.ownership)
            }
            None => match container.pid {
                Some(pid) => match proc_env::read_process_env(pid).await {
                    Ok(env) => WindowOwnership::from_env_map(&env),
                    Err(e) => {
                        debug!(window = container.id, "environment read failed: {}", e);
                        None
                    }
                },
                None => None,
            },
        };

        let Some(ownership) = ownership else { return };
        if ownership.scope == Scope::Global {
            debug!(window = container.id, "global window, not tracked");
            return;
        }
        let Some(project) = ownership.project.clone() else {
            return;
        };

        // Mark the window so future lookups skip /proc entirely.
        if let Some(mark) = ownership.mark() {
            if let Some(wm) = self.wm.clone() {
                let command = format!("[con_id={}] mark --add {}", container.id, mark);
                if let Err(e) = wm.run_command(&command).await {
                    warn!(window = container.id, "failed to apply ownership mark: {}", e);
                }
            }
        }

        info!(window = container.id, project = %project, "tracking new window");
        self.store.upsert(TrackedWindowState {
            window_id: container.id,
            project_name: project,
            app_name: ownership.app,
            tracked_workspace: workspace.unwrap_or(self.config.behavior.fallback_workspace),
            floating: container.is_floating(),
            geometry: container.is_floating().then_some(container.rect),
            hidden: false,
            last_seen: now,
        });
        self.persist_store();
    }

    fn on_window_close(&mut self, id: WindowId) {
        if self.store.remove(id).is_some() {
            debug!(window = id, "window closed, dropped from store");
            self.persist_store();
        }
    }

    async fn on_window_move(&mut self, id: WindowId) {
        // Only visible tracked windows keep their position fresh; moves
        // of hidden windows are scratchpad mechanics.
        let tracked_visible = self.store.get(id).is_some_and(|e| !e.hidden);
        if !tracked_visible {
            return;
        }
        if let Some(workspace) = self.lookup_workspace(id).await {
            self.store.note_move(id, workspace, now_unix());
            self.persist_store();
        }
    }

    fn on_window_floating(&mut self, container: &Node) {
        let tracked_visible = self
            .store
            .get(container.id)
            .is_some_and(|e| !e.hidden);
        if !tracked_visible {
            return;
        }
        self.store.note_floating(
            container.id,
            container.is_floating(),
            Some(container.rect),
            now_unix(),
        );
        self.persist_store();
    }

    async fn lookup_workspace(&self, id: WindowId) -> Option<i32> {
        let wm = self.wm.clone()?;
        match self.get_tree(&wm).await {
            Ok(tree) => tree.workspace_of(id),
            Err(e) => {
                debug!("workspace lookup failed: {}", e);
                None
            }
        }
    }

    // ------------------------------------------------------------------
    // Startup / recovery
    // ------------------------------------------------------------------

    /// Compare the store against the live tree: drop entries whose
    /// window is gone, adopt marked windows the store has never seen.
    pub async fn reconcile(&mut self) -> Result<(), WmError> {
        let Some(wm) = self.wm.clone() else {
            return Ok(());
        };
        let tree = self.get_tree(&wm).await?;
        let now = now_unix();

        let mut live = HashSet::new();
        for location in tree.windows() {
            let node = location.node;
            live.insert(node.id);

            if self.store.get(node.id).is_none() {
                if let Some(project) = ownership::project_from_marks(&node.marks) {
                    self.store.upsert(TrackedWindowState {
                        window_id: node.id,
                        project_name: project.to_string(),
                        app_name: node.class().unwrap_or("unknown").to_string(),
                        tracked_workspace: location
                            .workspace
                            .unwrap_or(self.config.behavior.fallback_workspace),
                        floating: node.is_floating(),
                        geometry: node.is_floating().then_some(node.rect),
                        hidden: location.in_scratchpad,
                        last_seen: now,
                    });
                }
            }
        }

        let removed = self.store.reconcile(&live);
        info!(
            tracked = self.store.len(),
            removed, "reconciled store against live tree"
        );
        self.persist_store();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Control protocol
    // ------------------------------------------------------------------

    pub async fn handle_request(&mut self, request: proto::Request) -> proto::Response {
        let id = request.id.clone().unwrap_or(Value::Null);
        match self.dispatch(&request.method, request.params).await {
            Ok(result) => proto::Response::ok(id, result),
            Err(error) => proto::Response::err(id, error),
        }
    }

    async fn dispatch(&mut self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            proto::method::PROJECT_HIDE_WINDOWS => {
                let p: proto::ProjectParams = parse_params(params)?;
                to_result(self.hide_windows(&p.project_name).await?)
            }
            proto::method::PROJECT_RESTORE_WINDOWS => {
                let p: proto::ProjectParams = parse_params(params)?;
                to_result(self.restore_windows(&p.project_name).await?)
            }
            proto::method::PROJECT_SWITCH_WITH_FILTERING => {
                let p: proto::SwitchParams = parse_params(params)?;
                to_result(
                    self.switch_with_filtering(p.from_project.as_deref(), &p.to_project)
                        .await?,
                )
            }
            proto::method::PROJECT_SWITCH => {
                let p: proto::ProjectParams = parse_params(params)?;
                self.switch_project(&p.project_name)?;
                Ok(json!({ "switched_to": p.project_name }))
            }
            proto::method::PROJECT_LIST => to_result(self.list_projects()?),
            proto::method::PROJECT_CREATE => {
                let p: proto::CreateProjectParams = parse_params(params)?;
                let name = p.name.clone();
                self.create_project(p)?;
                Ok(json!({ "created": name }))
            }
            proto::method::PROJECT_DELETE => {
                let p: proto::ProjectParams = parse_params(params)?;
                self.projects
                    .delete(&p.project_name)
                    .map_err(rpc_from_project)?;
                Ok(json!({ "deleted": p.project_name }))
            }
            proto::method::LAUNCH_REGISTER => {
                let p: proto::RegisterLaunchParams = parse_params(params)?;
                let app_id = p.app_id.clone();
                self.register_launch(p);
                Ok(json!({ "registered": app_id }))
            }
            proto::method::WINDOWS_GET_HIDDEN => to_result(self.get_hidden()),
            proto::method::WINDOWS_GET_STATE => {
                let p: proto::WindowIdParams = parse_params(params)?;
                to_result(self.get_window_state(p.window_id).await?)
            }
            proto::method::DAEMON_STATUS => to_result(self.status()),
            // The event loop sees the stop method and shuts down after
            // the response is written.
            proto::method::DAEMON_STOP => Ok(json!({ "stopping": true })),
            other => Err(RpcError::method_not_found(other)),
        }
    }
}
