//! Subcommand implementations for the `ludocore` binary.

use std::{future::IntoFuture, net::SocketAddr, process::Stdio, sync::Arc, time::Duration};

use nix::{
    sys::signal::{self, Signal},
    unistd::Pid,
};
use tokio::{fs, net::TcpListener, process::Command};

use ludocore::{
    client::ControlClient,
    config::{DEFAULT_API_PORT, IP_DETECT_TIMEOUT_SECS, IP_ECHO_URL},
    fleet::FleetState,
    history::EventLog,
    matchmaking::{create_match_router, MatchState},
    runtime::{DockerCli, RecipeManager},
    security::{self, CSRF_SWEEP_INTERVAL, SESSION_SWEEP_INTERVAL},
    server::{
        create_api_router, create_edge_router, ensure_staging_dir, serve_edge, ApiState,
        EdgeState, MatchConfigResponse,
    },
    utils, LudocoreError, LudocoreResult,
};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Environment sentinel marking the re-executed daemon process.
const DAEMON_ENV_VAR: &str = "LUDOCORE_DAEMONIZED";

/// How many trailing daemon-log lines `logs` prints.
const DAEMON_LOG_TAIL: usize = 100;

//--------------------------------------------------------------------------------------------------
// Functions: Subcommands
//--------------------------------------------------------------------------------------------------

/// Implementation of the `serve` subcommand. By default this re-executes
/// itself detached into its own session with output going to the daemon log;
/// `--foreground` keeps it attached.
pub async fn serve_subcommand(
    api_port: u16,
    gui_port: u16,
    match_port: u16,
    public_ip: Option<String>,
    token_secret: Option<String>,
    foreground: bool,
) -> LudocoreResult<()> {
    let docker = DockerCli::new();
    docker.check_installed().await?;

    let (api_key, newly_generated) = security::ensure_api_key().await?;
    if newly_generated {
        print_api_key_banner(&api_key, api_port);
    }

    let daemonized = std::env::var(DAEMON_ENV_VAR).is_ok();
    if foreground || daemonized {
        return run_daemon(
            api_port,
            gui_port,
            match_port,
            public_ip,
            token_secret,
            api_key,
        )
        .await;
    }

    let home = utils::ludocore_home_path();
    let pid_path = home.join(utils::DAEMON_PID_FILENAME);
    if pid_path.exists() {
        return Err(LudocoreError::Conflict(
            "daemon appears to be running already; use 'ludocore shutdown' first".to_string(),
        ));
    }

    let log_path = home.join(utils::DAEMON_LOG_FILENAME);
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let mut command = Command::new(std::env::current_exe()?);
    command
        .arg("serve")
        .arg("--api-port")
        .arg(api_port.to_string())
        .arg("--gui-port")
        .arg(gui_port.to_string())
        .arg("--match-port")
        .arg(match_port.to_string());
    if let Some(ip) = &public_ip {
        command.arg("--public-ip").arg(ip);
    }
    if let Some(secret) = &token_secret {
        command.arg("--token-secret").arg(secret);
    }
    command.env(DAEMON_ENV_VAR, "1");

    unsafe {
        command.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }
    command.stdout(Stdio::from(log_file.try_clone()?));
    command.stderr(Stdio::from(log_file));
    command.stdin(Stdio::null());

    let child = command.spawn()?;
    let pid = child.id().unwrap_or(0);

    println!("ludocore started");
    println!("  PID:       {}", pid);
    println!("  API:       127.0.0.1:{}  (localhost only)", api_port);
    println!("  Dashboard: https://0.0.0.0:{}  (self-signed cert)", gui_port);
    println!("  Match:     0.0.0.0:{}", match_port);
    println!();
    println!("Use 'ludocore logs' to view logs");
    println!("Use 'ludocore shutdown' to stop");
    Ok(())
}

/// Implementation of the `shutdown` subcommand: stops all running instances
/// through the API, then signals the daemon.
pub async fn shutdown_subcommand() -> LudocoreResult<()> {
    let pid_path = utils::ludocore_home_path().join(utils::DAEMON_PID_FILENAME);
    let pid_str = fs::read_to_string(&pid_path).await.map_err(|_| {
        LudocoreError::NotFound("daemon is not running (PID file not found)".to_string())
    })?;
    let pid: i32 = pid_str.trim().parse().map_err(|_| {
        LudocoreError::Validation("invalid PID found in the daemon PID file".to_string())
    })?;

    match ControlClient::connect(default_api_url()).await {
        Ok(client) => {
            println!("Stopping all running game servers...");
            match client.list_servers().await {
                Ok(listing) if listing.count == 0 => println!("  no running servers to stop"),
                Ok(listing) => {
                    for server in &listing.servers {
                        match client.stop_server(&server.container_name).await {
                            Ok(()) => println!("  stopped {}", server.container_name),
                            Err(e) => {
                                println!("  warning: failed to stop {}: {}", server.container_name, e)
                            }
                        }
                    }
                }
                Err(e) => println!("  warning: could not list servers: {}", e),
            }
        }
        Err(e) => println!("warning: could not reach the API: {}", e),
    }

    println!("Shutting down ludocore daemon (PID: {})...", pid);
    match signal::kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => {}
        Err(nix::errno::Errno::ESRCH) => {
            let _ = fs::remove_file(&pid_path).await;
            println!("daemon already stopped; cleaned up stale PID file");
            return Ok(());
        }
        Err(e) => {
            return Err(LudocoreError::custom(anyhow::anyhow!(
                "failed to signal daemon (PID {}): {}",
                pid,
                e
            )));
        }
    }

    let _ = fs::remove_file(&pid_path).await;
    println!("daemon stopped");
    Ok(())
}

/// Implementation of the `start` subcommand.
pub async fn start_subcommand(port: Option<u16>) -> LudocoreResult<()> {
    let client = ControlClient::connect(default_api_url()).await?;
    client.health_check().await?;

    let started = client.start_server(port).await?;
    println!("started {} on port {}", started.container_name, started.port);
    Ok(())
}

/// Implementation of the `stop` subcommand.
pub async fn stop_subcommand(name: &str) -> LudocoreResult<()> {
    let client = ControlClient::connect(default_api_url()).await?;
    client.stop_server(name).await?;
    println!("stopped {}", name);
    Ok(())
}

/// Implementation of the `ps` subcommand.
pub async fn ps_subcommand() -> LudocoreResult<()> {
    let client = ControlClient::connect(default_api_url()).await?;
    let listing = client.list_servers().await?;

    if listing.count == 0 {
        println!("no running servers");
        return Ok(());
    }

    println!("{:<24} {:<8} {:<10} STARTED", "NAME", "PORT", "PLAYERS");
    for server in &listing.servers {
        let port = server
            .port
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        let max = if server.max_players > 0 {
            server.max_players.to_string()
        } else {
            "?".to_string()
        };
        println!(
            "{:<24} {:<8} {:<10} {}",
            server.container_name,
            port,
            format!("{}/{}", server.player_count, max),
            server.started_at.format("%Y-%m-%d %H:%M:%S"),
        );
    }
    Ok(())
}

/// Implementation of the `logs` subcommand.
pub async fn logs_subcommand(name: Option<&str>) -> LudocoreResult<()> {
    if let Some(name) = name {
        let client = ControlClient::connect(default_api_url()).await?;
        let logs = client.server_logs(name).await?;
        print!("{}", logs);
        return Ok(());
    }

    let log_path = utils::ludocore_home_path().join(utils::DAEMON_LOG_FILENAME);
    let contents = fs::read_to_string(&log_path).await.map_err(|_| {
        LudocoreError::NotFound(format!("no daemon log at {}", log_path.display()))
    })?;

    let lines: Vec<&str> = contents.lines().collect();
    let start = lines.len().saturating_sub(DAEMON_LOG_TAIL);
    for line in &lines[start..] {
        println!("{}", line);
    }
    Ok(())
}

/// Implementation of the `recipes` subcommand.
pub async fn recipes_subcommand() -> LudocoreResult<()> {
    let recipes = RecipeManager::new();

    println!("Available presets:");
    for name in recipes.list_presets() {
        println!("  - {}", name);
    }
    println!();
    println!("Active recipe: {}", recipes.active_name().await);
    println!();

    let content = recipes.get_active().await?;
    println!("Preview (first 10 lines):");
    for (i, line) in content.lines().enumerate() {
        if i >= 10 {
            println!("  ...");
            break;
        }
        println!("  {}", line);
    }
    println!();
    println!("Use the dashboard or API to change the active recipe.");
    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// The daemon proper: binds the three servers and runs until signalled.
async fn run_daemon(
    api_port: u16,
    gui_port: u16,
    match_port: u16,
    public_ip: Option<String>,
    token_secret: Option<String>,
    api_key: String,
) -> LudocoreResult<()> {
    let home = utils::ludocore_home_path();
    fs::create_dir_all(&home).await?;

    let pid_path = home.join(utils::DAEMON_PID_FILENAME);
    fs::write(&pid_path, std::process::id().to_string()).await?;

    // Externally reachable address for matchmaking responses. Startup
    // continues even if detection fails; /match then returns an empty ip.
    let resolved_ip = match &public_ip {
        Some(ip) => {
            tracing::info!("public IP: {} (from flag)", ip);
            ip.clone()
        }
        None => match detect_public_ip().await {
            Ok(ip) => {
                tracing::info!("public IP detected: {}", ip);
                ip
            }
            Err(e) => {
                tracing::warn!(
                    "could not auto-detect public IP ({}); use --public-ip to set it explicitly",
                    e
                );
                String::new()
            }
        },
    };

    let secret = match token_secret.clone() {
        Some(secret) => secret,
        None => {
            tracing::warn!(
                "--token-secret not set, using a random secret; join tokens will not survive a restart"
            );
            security::generate_api_key()
        }
    };

    let events = match EventLog::open(&home.join(utils::HISTORY_DB_FILENAME)).await {
        Ok(events) => {
            tracing::info!("history tracking enabled");
            Some(events)
        }
        Err(e) => {
            tracing::warn!("history tracking disabled: {}", e);
            None
        }
    };

    let docker = DockerCli::new();
    let recipes = RecipeManager::new();
    recipes.ensure_dir().await?;
    ensure_staging_dir().await?;

    let fleet = Arc::new(FleetState::new());
    let state = ApiState::new(fleet, docker, recipes, events, api_key.clone());
    state.set_match_config(MatchConfigResponse {
        public_ip: resolved_ip.clone(),
        match_port,
        token_secret_status: if token_secret.is_some() {
            "configured".to_string()
        } else {
            "auto-generated".to_string()
        },
    });

    spawn_sweeps(&state);

    let api_addr = SocketAddr::from(([127, 0, 0, 1], api_port));
    let gui_addr = SocketAddr::from(([0, 0, 0, 0], gui_port));
    let match_addr = SocketAddr::from(([0, 0, 0, 0], match_port));

    // Dashboard over TLS, proxying inward.
    let tls = security::ensure_tls_cert(std::slice::from_ref(&resolved_ip)).await?;
    let edge_router = create_edge_router(EdgeState::new(
        api_addr,
        SocketAddr::from(([127, 0, 0, 1], match_port)),
    ));
    tokio::spawn(async move {
        tracing::info!("dashboard listening on https://{}", gui_addr);
        if let Err(e) = serve_edge(gui_addr, tls, edge_router).await {
            tracing::error!("dashboard server failed: {}", e);
        }
    });

    // Matchmaking surface, talking to the API over loopback like any client.
    let match_client =
        ControlClient::with_api_key(format!("http://127.0.0.1:{}", api_port), api_key);
    let match_router = create_match_router(MatchState {
        client: Arc::new(match_client),
        public_ip: resolved_ip,
        token_secret: Arc::new(secret),
    });
    tokio::spawn(async move {
        let listener = match TcpListener::bind(match_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!("failed to bind matchmaking server on {}: {}", match_addr, e);
                return;
            }
        };
        tracing::info!("matchmaking listening on {}", match_addr);
        if let Err(e) = axum::serve(listener, match_router).await {
            tracing::error!("matchmaking server failed: {}", e);
        }
    });

    // The privileged API itself, loopback only.
    let api_router = create_api_router(state);
    let listener = TcpListener::bind(api_addr).await?;
    tracing::info!("API listening on {} (PID {})", api_addr, std::process::id());

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    tokio::select! {
        result = axum::serve(listener, api_router).into_future() => result?,
        _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted, shutting down"),
    }

    let _ = fs::remove_file(&pid_path).await;
    Ok(())
}

/// Starts the hourly session and CSRF sweeps.
fn spawn_sweeps(state: &ApiState) {
    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            let evicted = sessions.sweep_expired();
            if evicted > 0 {
                tracing::debug!("evicted {} expired sessions", evicted);
            }
        }
    });

    let csrf = state.csrf.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CSRF_SWEEP_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            let evicted = csrf.sweep_stale();
            if evicted > 0 {
                tracing::debug!("discarded {} stale CSRF tokens", evicted);
            }
        }
    });
}

/// Asks the configured echo service for this host's external address.
async fn detect_public_ip() -> LudocoreResult<String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(IP_DETECT_TIMEOUT_SECS))
        .build()
        .map_err(LudocoreError::custom)?;

    let ip = client
        .get(IP_ECHO_URL)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;

    Ok(ip.trim().to_string())
}

fn default_api_url() -> String {
    format!("http://127.0.0.1:{}", DEFAULT_API_PORT)
}

fn print_api_key_banner(api_key: &str, api_port: u16) {
    let rule = "=".repeat(70);
    println!();
    println!("{}", rule);
    println!("  NEW API KEY GENERATED");
    println!("{}", rule);
    println!();
    println!("  Your API key: {}", api_key);
    println!();
    println!(
        "  It has been saved to: {}",
        utils::ludocore_home_path()
            .join(utils::API_KEY_FILENAME)
            .display()
    );
    println!("  Keep it secure; every API request must present it.");
    println!();
    println!("  Example:");
    println!("    curl -H \"Authorization: Bearer {}\" \\", api_key);
    println!("         http://localhost:{}/api/v1/servers", api_port);
    println!();
    println!("{}", rule);
    println!();
}
