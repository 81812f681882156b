//! Realtime Monitor CLI
//!
//! Command-line front end for the monitoring server:
//! - Log in, register and log out
//! - List and control streams
//! - Triage alerts
//! - Watch live stream updates

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use realtime_monitor::{
    AlertQuery, ApiError, App, ChannelEvent, ChannelState, Config, Credentials, Registration,
    StreamConfig, StreamId,
};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "monitor")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Client for the real-time video monitoring server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in and store the access token
    Login {
        username: String,
        #[arg(long, env = "MONITOR_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Register a new account
    Register {
        username: String,
        email: String,
        #[arg(long, env = "MONITOR_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Forget the stored access token
    Logout,

    /// Show session and server status
    Status,

    /// Manage video streams
    Streams {
        #[command(subcommand)]
        command: StreamCommands,
    },

    /// Browse and triage alerts
    Alerts {
        #[command(subcommand)]
        command: AlertCommands,
    },

    /// Connect the push channel and print live updates until Ctrl-C
    Watch {
        /// Streams to join (default: all active streams)
        stream_ids: Vec<String>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum StreamCommands {
    /// List all streams
    List,
    /// Register a new RTMP stream
    Add {
        name: String,
        rtmp_url: String,
        #[arg(short, long)]
        description: Option<String>,
        /// Detection modes (default: object_detection)
        #[arg(short = 'm', long = "mode")]
        modes: Vec<String>,
    },
    /// Start processing a stream
    Start { id: String },
    /// Stop processing a stream
    Stop { id: String },
    /// Delete a stream
    Delete { id: String },
    /// Show the server-side status of a stream
    Status { id: String },
}

#[derive(Subcommand)]
pub enum AlertCommands {
    /// List alerts
    List {
        #[arg(long, default_value = "1")]
        page: u32,
        #[arg(long, default_value = "10")]
        per_page: u32,
        /// Filter by status (unprocessed, viewed, resolved)
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Update an alert's status
    SetStatus { id: i64, status: String },
    /// Show replay info for an alert
    Replay { id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        return write_default_config(output.as_ref());
    }

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::try_load_default()
            .context("Fix the config file or pass --config <path>")?,
    };
    init_logging(&config);

    let app = App::new(config).context("Failed to initialise client")?;
    let result = run(&app, cli).await;
    app.shutdown();

    if let Err(err) = &result {
        if requires_login(err) {
            eprintln!("Not logged in or session expired. Run `monitor login <username>`.");
            std::process::exit(2);
        }
    }
    result
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "realtime_monitor={level},monitor={level}",
            level = config.logging.level
        ))
    });
    let registry = tracing_subscriber::registry().with(filter);

    if config.logging.format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn write_default_config(output: Option<&PathBuf>) -> anyhow::Result<()> {
    let content = realtime_monitor::config::generate_default_config();
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Config written to {}", path.display());
        }
        None => print!("{}", content),
    }
    Ok(())
}

fn requires_login(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<ApiError>()
            .is_some_and(ApiError::is_unauthorized)
    })
}

async fn run(app: &App, cli: Cli) -> anyhow::Result<()> {
    let json = cli.format == "json";

    match cli.command {
        Commands::Login { username, password } => {
            if app.auth().login(&Credentials::new(username, password)).await? {
                println!("Logged in");
            } else {
                bail!("Login was not accepted by the server");
            }
        }

        Commands::Register {
            username,
            email,
            password,
        } => {
            let registration = Registration {
                username,
                email,
                password,
            };
            if app.auth().register(&registration).await? {
                println!("Account created, you can now log in");
            } else {
                bail!("Registration was not accepted by the server");
            }
        }

        Commands::Logout => {
            app.auth().logout().await?;
            println!("Logged out");
        }

        Commands::Status => {
            let config = app.config();
            println!("Realtime Monitor v{}", env!("CARGO_PKG_VERSION"));
            println!();
            println!("API:      {}", config.api.base_url);
            println!("Socket:   {}{}", config.socket.url, config.socket.namespace);
            println!(
                "Session:  {}",
                if app.auth().is_authenticated().await {
                    "logged in"
                } else {
                    "not logged in"
                }
            );

            match app.streams().load_streams().await {
                Ok(()) => {
                    let total = app.streams().streams().await.len();
                    let active = app.streams().active_streams().await.len();
                    println!("Streams:  {} total, {} active", total, active);
                }
                Err(e) if e.is_unauthorized() => return Err(e.into()),
                Err(e) => println!("Streams:  unavailable ({})", e),
            }
        }

        Commands::Streams { command } => run_streams(app, command, json).await?,
        Commands::Alerts { command } => run_alerts(app, command, json).await?,
        Commands::Watch { stream_ids } => watch(app, stream_ids).await?,
        Commands::Config { .. } => {}
    }

    Ok(())
}

async fn run_streams(app: &App, command: StreamCommands, json: bool) -> anyhow::Result<()> {
    let streams = app.streams();

    match command {
        StreamCommands::List => {
            streams.load_streams().await?;
            let list = streams.streams().await;

            if json {
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else if list.is_empty() {
                println!("No streams");
            } else {
                println!("{:<38} {:<20} {:<10} {}", "ID", "NAME", "STATUS", "SOURCE");
                println!("{}", "-".repeat(90));
                for s in list {
                    println!(
                        "{:<38} {:<20} {:<10} {}",
                        s.id,
                        truncate(&s.name, 20),
                        s.status,
                        s.rtmp_url.as_deref().unwrap_or("-")
                    );
                }
            }
        }

        StreamCommands::Add {
            name,
            rtmp_url,
            description,
            modes,
        } => {
            let mut config = StreamConfig::new(name, rtmp_url);
            if let Some(description) = description {
                config = config.description(description);
            }
            if !modes.is_empty() {
                config = config.detection_modes(modes);
            }

            let created = streams.add_stream(&config).await?;
            println!("Created stream {}", created.stream_id);
        }

        StreamCommands::Start { id } => {
            let id = StreamId::from(id);
            streams.load_streams().await?;
            streams.start_stream(&id).await?;
            println!("Started {}", id);
        }

        StreamCommands::Stop { id } => {
            let id = StreamId::from(id);
            streams.stop_stream(&id).await?;
            println!("Stopped {}", id);
        }

        StreamCommands::Delete { id } => {
            let id = StreamId::from(id);
            streams.delete_stream(&id).await?;
            println!("Deleted {}", id);
        }

        StreamCommands::Status { id } => {
            let report = streams.stream_status(&StreamId::from(id)).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Status: {}", report.status);
                for (key, value) in &report.details {
                    println!("  {}: {}", key, value);
                }
            }
        }
    }

    Ok(())
}

async fn run_alerts(app: &App, command: AlertCommands, json: bool) -> anyhow::Result<()> {
    let api = app.api();

    match command {
        AlertCommands::List {
            page,
            per_page,
            status,
        } => {
            let mut query = AlertQuery::default().page(page).per_page(per_page);
            if let Some(status) = status {
                query = query.status(status);
            }
            let result = api.list_alerts(&query).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
                return Ok(());
            }

            println!(
                "Page {}/{} ({} alerts)",
                result.current_page, result.pages, result.total
            );
            println!();
            println!("{:<8} {:<20} {:<24} {}", "ID", "TIME", "EVENT", "STATUS");
            println!("{}", "-".repeat(66));
            for alert in result.alerts {
                println!(
                    "{:<8} {:<20} {:<24} {}",
                    alert.id,
                    alert.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    truncate(&alert.event_type, 24),
                    alert.status
                );
            }
        }

        AlertCommands::SetStatus { id, status } => {
            let alert = api.update_alert_status(id, &status).await?;
            println!("Alert {} is now {}", alert.id, alert.status);
        }

        AlertCommands::Replay { id } => {
            let replay = api.alert_replay(id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&replay)?);
            } else {
                println!("Event:    {}", replay.event_type);
                println!("Time:     {}", replay.timestamp.format("%Y-%m-%d %H:%M:%S"));
                println!("Video:    {}", replay.video_path.as_deref().unwrap_or("-"));
                println!(
                    "Snapshot: {}",
                    replay.frame_snapshot_path.as_deref().unwrap_or("-")
                );
                if let Some(details) = replay.details {
                    println!("Details:  {}", details);
                }
            }
        }
    }

    Ok(())
}

async fn watch(app: &App, stream_ids: Vec<String>) -> anyhow::Result<()> {
    app.streams()
        .load_streams()
        .await
        .context("Failed to load streams")?;

    let targets: Vec<StreamId> = if stream_ids.is_empty() {
        app.streams()
            .active_streams()
            .await
            .into_iter()
            .map(|s| s.id)
            .collect()
    } else {
        stream_ids.into_iter().map(StreamId::from).collect()
    };

    if targets.is_empty() {
        println!("No active streams to watch");
        return Ok(());
    }

    let mut updates = app.subscribe_updates();
    let mut status = app.channel().watch_status();
    app.channel().connect()?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                match current.state {
                    // Membership does not survive a reconnect
                    ChannelState::Connected => {
                        for id in &targets {
                            app.channel().join_stream(id)?;
                        }
                        eprintln!("Connected, watching {} stream(s)", targets.len());
                    }
                    ChannelState::Failed => {
                        bail!("Push channel gave up after {} attempts", current.attempts);
                    }
                    ChannelState::Disconnected if current.reconnect_pending => {
                        eprintln!("Connection lost, retry {} scheduled", current.attempts);
                    }
                    _ => {}
                }
            }
            update = updates.recv() => {
                match update {
                    Ok(event) if targets.contains(event.stream_id()) => print_update(&event),
                    Ok(_) => {}
                    Err(RecvError::Lagged(n)) => eprintln!("Skipped {} updates", n),
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    app.channel().disconnect()?;
    Ok(())
}

fn print_update(event: &ChannelEvent) {
    match event {
        ChannelEvent::StreamData { frame, received_at } => {
            println!(
                "{} {} fps={:.1} detections={} frame={}KB",
                received_at.format("%H:%M:%S%.3f"),
                frame.stream_id,
                frame.fps,
                detection_count(&frame.ai_results),
                frame.frame.len() * 3 / 4 / 1024
            );
        }
        ChannelEvent::StreamError { stream_id, error } => {
            println!("{} ERROR {}", stream_id, error);
        }
        ChannelEvent::StreamStopped { stream_id } => {
            println!("{} stopped", stream_id);
        }
    }
}

/// Detections in an analysis result, whether given as a list or under a key
fn detection_count(ai_results: &serde_json::Value) -> usize {
    match ai_results {
        serde_json::Value::Array(items) => items.len(),
        serde_json::Value::Object(map) => map
            .get("detections")
            .and_then(|d| d.as_array())
            .map(|d| d.len())
            .unwrap_or(0),
        _ => 0,
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
