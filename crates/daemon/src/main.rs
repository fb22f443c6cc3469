//! i3pm Daemon
//!
//! Long-running process that keeps project-scoped window state in sync
//! with the window manager.
//!
//! Responsibilities:
//! - Subscribe to WM lifecycle events and maintain the window store
//! - Correlate new windows to registered launches
//! - Hide/restore project windows with state capture
//! - Serve the control protocol on a per-user Unix socket
//! - Persist state across restarts and reconcile on startup
//!
//! Concurrency model: one event loop consumes a single channel fed by
//! the WM event reader, the control server, the expiry timer, and the
//! signal handler. Every state-mutating operation runs to completion on
//! that loop before the next one starts, so rapid project switches apply
//! in request order and batched hide/restore sequences never interleave.

mod config;
mod engine;

use anyhow::{Context, Result};
use config::Config;
use engine::Engine;
use i3pm_core::project::{ActiveProject, ProjectRegistry};
use i3pm_core::store::WindowStore;
use i3pm_ipc::{self as proto, error_code, RpcError};
use i3pm_wm::{EventKind, EventStream, I3Client, WmClient};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Events that the daemon event loop processes.
enum DaemonEvent {
    /// A control-protocol request from a connected client.
    Rpc {
        request: proto::Request,
        responder: oneshot::Sender<proto::Response>,
    },
    /// A lifecycle event from the window manager.
    Wm(i3pm_wm::Event),
    /// The WM event stream dropped; enter degraded mode and reconnect.
    WmDisconnected,
    /// A reconnect attempt succeeded.
    WmReconnected {
        client: Arc<dyn WmClient>,
        events: EventStream,
    },
    /// Periodic launch-registry sweep.
    ExpireSweep,
    /// Shutdown signal.
    Shutdown,
}

/// Event kinds the daemon subscribes to.
const EVENT_KINDS: &[EventKind] = &[
    EventKind::Window,
    EventKind::Workspace,
    EventKind::Output,
    EventKind::Shutdown,
];

/// Upper bound on one control request, queueing included.
const RPC_DEADLINE: Duration = Duration::from_secs(15);

/// Initial reconnect backoff after losing the WM connection.
const RECONNECT_INITIAL_BACKOFF: Duration = Duration::from_millis(250);

/// Launch-registry sweep interval.
const EXPIRE_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Open both WM connections: request/response and event subscription.
async fn connect_wm(timeout: Duration) -> Result<(Arc<dyn WmClient>, EventStream), i3pm_wm::WmError> {
    let client = I3Client::connect(timeout).await?;
    let events = i3pm_wm::subscribe(EVENT_KINDS, timeout).await?;
    Ok((Arc::new(client), events))
}

/// Forward WM events into the daemon channel until the stream drops.
fn spawn_event_reader(mut events: EventStream, event_tx: mpsc::Sender<DaemonEvent>) {
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if event_tx.send(DaemonEvent::Wm(event)).await.is_err() {
                return; // Channel closed, daemon shutting down
            }
        }
        let _ = event_tx.send(DaemonEvent::WmDisconnected).await;
    });
}

/// Retry the WM connection with exponential backoff until it succeeds.
fn spawn_reconnect(event_tx: mpsc::Sender<DaemonEvent>, timeout: Duration, max_backoff: Duration) {
    tokio::spawn(async move {
        let mut backoff = RECONNECT_INITIAL_BACKOFF;
        loop {
            tokio::time::sleep(backoff).await;
            match connect_wm(timeout).await {
                Ok((client, events)) => {
                    info!("reconnected to window manager");
                    let _ = event_tx
                        .send(DaemonEvent::WmReconnected { client, events })
                        .await;
                    return;
                }
                Err(e) => {
                    debug!("reconnect attempt failed: {}", e);
                    backoff = (backoff * 2).min(max_backoff);
                }
            }
        }
    });
}

/// Accept control-protocol clients.
async fn run_control_server(
    listener: UnixListener,
    event_tx: mpsc::Sender<DaemonEvent>,
    notifier: broadcast::Sender<proto::Notification>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                debug!("control client connected");
                let event_tx = event_tx.clone();
                let notifications = notifier.subscribe();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, event_tx, notifications).await {
                        debug!("control client ended: {}", e);
                    }
                });
            }
            Err(e) => {
                warn!("failed to accept control client: {}", e);
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Serve one client connection: newline-delimited requests in, responses
/// and pushed notifications out. Connections are long-lived so status
/// bars can sit on the notification stream.
async fn handle_client(
    stream: UnixStream,
    event_tx: mpsc::Sender<DaemonEvent>,
    mut notifications: broadcast::Receiver<proto::Notification>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    return Ok(()); // Client disconnected
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let (response, stop_after_reply) = match serde_json::from_str::<proto::Request>(line) {
                    Ok(request) => {
                        let request_id = request.id.clone().unwrap_or(Value::Null);
                        let is_stop = request.method == proto::method::DAEMON_STOP;

                        let (resp_tx, resp_rx) = oneshot::channel();
                        let queued = event_tx
                            .send(DaemonEvent::Rpc { request, responder: resp_tx })
                            .await
                            .is_ok();

                        let response = if !queued {
                            proto::Response::err(
                                request_id,
                                RpcError::new(error_code::INTERNAL_ERROR, "daemon is shutting down"),
                            )
                        } else {
                            match tokio::time::timeout(RPC_DEADLINE, resp_rx).await {
                                Ok(Ok(response)) => response,
                                Ok(Err(_)) => proto::Response::err(
                                    request_id,
                                    RpcError::new(error_code::INTERNAL_ERROR, "no response from daemon"),
                                ),
                                Err(_) => proto::Response::err(
                                    request_id,
                                    RpcError::new(error_code::TIMEOUT, "request deadline exceeded"),
                                ),
                            }
                        };
                        (response, is_stop)
                    }
                    Err(e) => (
                        proto::Response::err(
                            Value::Null,
                            RpcError::new(error_code::PARSE_ERROR, format!("invalid request: {e}")),
                        ),
                        false,
                    ),
                };

                let json = serde_json::to_string(&response)
                    .unwrap_or_else(|_| {
                        r#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"internal serialization error"},"id":null}"#.to_string()
                    });
                writer.write_all(json.as_bytes()).await?;
                writer.write_all(b"\n").await?;

                if stop_after_reply {
                    let _ = event_tx.send(DaemonEvent::Shutdown).await;
                }
            }
            note = notifications.recv() => {
                match note {
                    Ok(note) => {
                        if let Ok(json) = serde_json::to_string(&note) {
                            writer.write_all(json.as_bytes()).await?;
                            writer.write_all(b"\n").await?;
                        }
                    }
                    // A slow client that missed notifications just keeps going.
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("client lagged, skipped {} notifications", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return Ok(()),
                }
            }
        }
    }
}

/// Check if another daemon instance is already serving the control socket.
async fn check_already_running(socket: &Path) -> bool {
    UnixStream::connect(socket).await.is_ok()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (needed for log level)
    let mut config = Config::load().unwrap_or_else(|e| {
        // Can't use tracing yet, fall back to eprintln
        eprintln!("Failed to load configuration: {}. Using defaults.", e);
        Config::default()
    });

    // Initialize logging with configured log level
    let log_level = match config.behavior.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO, // default fallback for invalid values
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config_warnings = config.validate();
    for w in &config_warnings {
        warn!("Config: {} - {}", w.field, w.message);
    }

    info!("i3pm daemon starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Refuse to start twice against the same socket.
    let socket = proto::socket_path();
    if check_already_running(&socket).await {
        error!(
            "Another i3pm daemon is already running (socket {:?} is active)",
            socket
        );
        return Ok(());
    }

    // Bind the control socket. Failure here is the one fatal startup
    // condition; everything else degrades.
    if let Some(parent) = socket.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create runtime dir {:?}", parent))?;
    }
    let _ = std::fs::remove_file(&socket); // stale socket from a crash
    let listener = UnixListener::bind(&socket)
        .with_context(|| format!("failed to bind control socket {:?}", socket))?;
    info!("Control server listening on {:?}", socket);

    // Load persisted state; missing or corrupt files start empty.
    let store = WindowStore::load(&config.state_file());
    info!("Loaded {} tracked windows from state file", store.len());
    let projects = ProjectRegistry::new(config.projects_dir());
    let active = ActiveProject::load(&config.active_file());
    if let Some(name) = &active.name {
        info!("Active project: {}", name);
    }

    let (notifier, _) = broadcast::channel::<proto::Notification>(64);
    let mut daemon = Engine::new(config.clone(), store, projects, active, notifier.clone());

    // Create event channel
    let (event_tx, mut event_rx) = mpsc::channel::<DaemonEvent>(100);

    // Connect to the window manager. An unreachable WM is not fatal: the
    // daemon starts degraded and keeps retrying.
    match connect_wm(config.wm_timeout()).await {
        Ok((client, events)) => {
            daemon.set_wm(client);
            spawn_event_reader(events, event_tx.clone());
            if let Err(e) = daemon.reconcile().await {
                warn!("startup reconcile failed: {}", e);
            }
            info!("Connected to window manager");
        }
        Err(e) => {
            warn!(
                "Window manager not reachable at startup ({}), running degraded",
                e
            );
            spawn_reconnect(
                event_tx.clone(),
                config.wm_timeout(),
                config.reconnect_max_backoff(),
            );
        }
    }

    // Spawn control server
    {
        let server_tx = event_tx.clone();
        let server_notifier = notifier.clone();
        tokio::spawn(async move {
            run_control_server(listener, server_tx, server_notifier).await;
        });
    }

    // Periodic launch-registry expiry, off the mutation path.
    {
        let sweep_tx = event_tx.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(EXPIRE_SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                if sweep_tx.send(DaemonEvent::ExpireSweep).await.is_err() {
                    break; // Channel closed
                }
            }
        });
    }

    // Shutdown on SIGINT or SIGTERM.
    {
        let shutdown_tx = event_tx.clone();
        tokio::spawn(async move {
            let mut sigterm =
                match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                    Ok(sig) => sig,
                    Err(e) => {
                        warn!("failed to install SIGTERM handler: {}", e);
                        return;
                    }
                };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("SIGINT received, initiating shutdown..."),
                _ = sigterm.recv() => info!("SIGTERM received, initiating shutdown..."),
            }
            let _ = shutdown_tx.send(DaemonEvent::Shutdown).await;
        });
    }

    info!("Ready. Use i3pm to send commands.");

    // Main event loop
    loop {
        let event = match event_rx.recv().await {
            Some(e) => e,
            None => break,
        };

        match event {
            DaemonEvent::Rpc { request, responder } => {
                let response = daemon.handle_request(request).await;
                // Log if client disconnected before receiving response
                if responder.send(response).is_err() {
                    debug!("client disconnected before receiving response");
                }
            }
            DaemonEvent::Wm(wm_event) => {
                daemon.handle_wm_event(wm_event).await;
            }
            DaemonEvent::WmDisconnected => {
                warn!("Window manager event stream lost, entering degraded mode");
                daemon.set_degraded();
                spawn_reconnect(
                    event_tx.clone(),
                    config.wm_timeout(),
                    config.reconnect_max_backoff(),
                );
            }
            DaemonEvent::WmReconnected { client, events } => {
                daemon.set_wm(client);
                spawn_event_reader(events, event_tx.clone());
                if let Err(e) = daemon.reconcile().await {
                    warn!("post-reconnect reconcile failed: {}", e);
                }
                info!("Window manager connection restored");
            }
            DaemonEvent::ExpireSweep => {
                daemon.expire_launches();
            }
            DaemonEvent::Shutdown => {
                info!("Shutting down...");
                break;
            }
        }
    }

    // Persist state and remove the socket on the way out.
    daemon.persist_store();
    let _ = std::fs::remove_file(&socket);
    info!("i3pm daemon stopped");

    Ok(())
}
