//! i3pm CLI
//!
//! Command-line interface for the i3pm daemon.
//!
//! Commands are sent to the daemon over its Unix control socket as
//! newline-delimited JSON-RPC. Notification lines pushed by the daemon
//! are skipped while waiting for the matching response.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use i3pm_ipc::{error_code, method, Request, Response, ServerMessage};
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;

#[derive(Parser)]
#[command(name = "i3pm")]
#[command(version, about = "Control the i3pm project window daemon")]
struct Cli {
    /// Print raw JSON results instead of formatted output
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Switch to a project, hiding the previous project's windows
    Switch {
        /// Project to switch to
        project: String,
        /// Project to hide (defaults to the daemon's active project semantics)
        #[arg(long)]
        from: Option<String>,
        /// Only move the active-project pointer, without window filtering
        #[arg(long)]
        no_filter: bool,
    },
    /// Hide all windows of a project into the scratchpad
    Hide {
        /// Project whose windows to hide
        project: String,
    },
    /// Restore a project's hidden windows to their tracked workspaces
    Restore {
        /// Project whose windows to restore
        project: String,
    },
    /// List all projects
    Projects,
    /// Create a new project
    CreateProject {
        /// Unique project name
        name: String,
        /// Human-readable name (defaults to the project name)
        #[arg(long)]
        display_name: Option<String>,
        /// Working directory
        #[arg(long)]
        directory: String,
        /// Icon glyph for status bars
        #[arg(long, default_value = "")]
        icon: String,
    },
    /// Delete a project (its windows become orphans, not closed)
    DeleteProject {
        /// Project to delete
        name: String,
    },
    /// Announce an app launch so its window can be attributed
    RegisterLaunch {
        /// Unique id for this launch attempt
        #[arg(long)]
        app_id: String,
        /// Window class the app will create
        #[arg(long)]
        class: String,
        /// Owning project
        #[arg(long)]
        project: Option<String>,
        /// Application name
        #[arg(long)]
        app: String,
        /// scoped or global
        #[arg(long)]
        scope: Option<String>,
        /// Workspace the window is intended for
        #[arg(long)]
        workspace: Option<i32>,
    },
    /// Show hidden windows grouped by project
    Hidden,
    /// Show everything known about one window
    Window {
        /// Window (container) id
        window_id: i64,
    },
    /// Show daemon status
    Status,
    /// Stop the daemon
    Stop,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (method, params) = match &cli.command {
        Commands::Switch {
            project,
            from,
            no_filter,
        } => {
            if *no_filter {
                (method::PROJECT_SWITCH, json!({"project_name": project}))
            } else {
                (
                    method::PROJECT_SWITCH_WITH_FILTERING,
                    json!({"from_project": from, "to_project": project}),
                )
            }
        }
        Commands::Hide { project } => (
            method::PROJECT_HIDE_WINDOWS,
            json!({"project_name": project}),
        ),
        Commands::Restore { project } => (
            method::PROJECT_RESTORE_WINDOWS,
            json!({"project_name": project}),
        ),
        Commands::Projects => (method::PROJECT_LIST, Value::Null),
        Commands::CreateProject {
            name,
            display_name,
            directory,
            icon,
        } => (
            method::PROJECT_CREATE,
            json!({
                "name": name,
                "display_name": display_name.clone().unwrap_or_else(|| name.clone()),
                "directory": directory,
                "icon": icon,
            }),
        ),
        Commands::DeleteProject { name } => {
            (method::PROJECT_DELETE, json!({"project_name": name}))
        }
        Commands::RegisterLaunch {
            app_id,
            class,
            project,
            app,
            scope,
            workspace,
        } => (
            method::LAUNCH_REGISTER,
            json!({
                "app_id": app_id,
                "expected_class": class,
                "project_name": project,
                "app_name": app,
                "scope": scope,
                "workspace": workspace,
            }),
        ),
        Commands::Hidden => (method::WINDOWS_GET_HIDDEN, Value::Null),
        Commands::Window { window_id } => {
            (method::WINDOWS_GET_STATE, json!({"window_id": window_id}))
        }
        Commands::Status => (method::DAEMON_STATUS, Value::Null),
        Commands::Stop => (method::DAEMON_STOP, Value::Null),
    };

    let result = send_request(method, params)?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        render(method, &result);
    }

    Ok(())
}

/// Send one request and wait for its response, skipping pushed
/// notification lines.
fn send_request(method: &str, params: Value) -> Result<Value> {
    let socket = i3pm_ipc::socket_path();
    let stream = UnixStream::connect(&socket).with_context(|| {
        format!(
            "could not connect to the i3pm daemon at {:?} - is it running?",
            socket
        )
    })?;

    let request = Request::new(method, params, 1);
    let mut writer = stream.try_clone().context("failed to clone socket")?;
    writer.write_all((serde_json::to_string(&request)? + "\n").as_bytes())?;

    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<ServerMessage>(line.trim()) {
            Ok(ServerMessage::Response(response)) => return unwrap_response(response),
            Ok(ServerMessage::Notification(_)) => continue,
            Err(e) => bail!("malformed reply from daemon: {e}"),
        }
    }

    bail!("daemon closed the connection without replying")
}

fn unwrap_response(response: Response) -> Result<Value> {
    if let Some(error) = response.error {
        let hint = match error.code {
            error_code::WM_UNREACHABLE => "\n  The daemon cannot reach the window manager. Check that i3/sway is running, then retry.",
            error_code::TIMEOUT => "\n  The operation timed out. Retry once the window manager responds.",
            _ => "",
        };
        return Err(anyhow!("{} (code {}){}", error.message, error.code, hint));
    }
    Ok(response.result.unwrap_or(Value::Null))
}

/// Human-readable rendering per method.
fn render(method_name: &str, result: &Value) {
    match method_name {
        method::PROJECT_HIDE_WINDOWS => {
            let hidden = result["windows_hidden"].as_u64().unwrap_or(0);
            let failed = result["errors"].as_array().map(Vec::len).unwrap_or(0);
            if failed > 0 {
                println!("Hidden {} windows ({} failed)", hidden, failed);
            } else {
                println!("Hidden {} windows", hidden);
            }
        }
        method::PROJECT_RESTORE_WINDOWS => render_restore(result),
        method::PROJECT_SWITCH_WITH_FILTERING => {
            if let Some(hide) = result.get("hide").filter(|h| !h.is_null()) {
                println!(
                    "Hidden {} windows",
                    hide["windows_hidden"].as_u64().unwrap_or(0)
                );
            }
            render_restore(&result["restore"]);
            println!("Switched in {}ms", result["duration_ms"].as_u64().unwrap_or(0));
        }
        method::PROJECT_LIST => {
            let projects = result["projects"].as_array().cloned().unwrap_or_default();
            if projects.is_empty() {
                println!("No projects defined");
            }
            for p in projects {
                let marker = if p["active"].as_bool().unwrap_or(false) {
                    "*"
                } else {
                    " "
                };
                println!(
                    "{} {}  {}  ({})",
                    marker,
                    p["name"].as_str().unwrap_or("?"),
                    p["display_name"].as_str().unwrap_or(""),
                    p["directory"].as_str().unwrap_or("")
                );
            }
        }
        method::WINDOWS_GET_HIDDEN => {
            let total = result["total_hidden"].as_u64().unwrap_or(0);
            println!("{} hidden windows", total);
            for project in result["projects"].as_array().cloned().unwrap_or_default() {
                println!("  {}:", project["project_name"].as_str().unwrap_or("?"));
                for w in project["windows"].as_array().cloned().unwrap_or_default() {
                    println!(
                        "    {} {} (workspace {}{})",
                        w["window_id"].as_i64().unwrap_or(0),
                        w["app_name"].as_str().unwrap_or("?"),
                        w["tracked_workspace"].as_i64().unwrap_or(0),
                        if w["floating"].as_bool().unwrap_or(false) {
                            ", floating"
                        } else {
                            ""
                        }
                    );
                }
            }
        }
        method::DAEMON_STATUS => {
            println!(
                "i3pm {} [{}], up {}s",
                result["version"].as_str().unwrap_or("?"),
                result["lifecycle"].as_str().unwrap_or("?"),
                result["uptime_seconds"].as_u64().unwrap_or(0)
            );
            println!(
                "  tracked: {}  hidden: {}  pending launches: {}",
                result["tracked_windows"].as_u64().unwrap_or(0),
                result["hidden_windows"].as_u64().unwrap_or(0),
                result["pending_launches"].as_u64().unwrap_or(0)
            );
            match result["active_project"].as_str() {
                Some(name) => println!("  active project: {}", name),
                None => println!("  active project: none"),
            }
        }
        method::DAEMON_STOP => println!("Daemon stopping"),
        _ => {
            // CRUD acknowledgements and window state read fine as JSON.
            match serde_json::to_string_pretty(result) {
                Ok(pretty) => println!("{}", pretty),
                Err(_) => println!("{}", result),
            }
        }
    }
}

fn render_restore(result: &Value) {
    let restored = result["windows_restored"].as_u64().unwrap_or(0);
    let failed = result["errors"].as_array().map(Vec::len).unwrap_or(0);
    let fallbacks = result["restorations"]
        .as_array()
        .map(|r| {
            r.iter()
                .filter(|e| e["fallback"].as_bool().unwrap_or(false))
                .count()
        })
        .unwrap_or(0);

    if failed > 0 {
        println!(
            "Restored {} of {} windows",
            restored,
            restored + failed as u64
        );
    } else {
        println!("Restored {} windows", restored);
    }
    if fallbacks > 0 {
        println!("  {} restored to the fallback workspace", fallbacks);
    }
}
