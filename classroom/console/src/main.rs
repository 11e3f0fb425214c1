//! Classroom Console - Operator Front-end for the Classroom Backend
//!
//! Connects to a classroom room as a teacher front-end, prints every
//! decision the backend pushes, and sends one-off commands.
//!
//! # Usage
//!
//! ```bash
//! # Watch a room
//! classroom-console listen
//!
//! # Praise a student and show the reaction
//! classroom-console teacher student_001 praise --content "Great job!"
//!
//! # Simulate a student action
//! classroom-console student student_002 raise_hand "I know this one"
//!
//! # Send a hand-built frame
//! classroom-console raw '{"type":"ping","data":{}}'
//!
//! # Another backend, verbose logging
//! RUST_LOG=debug classroom-console --host 10.0.0.5 --room room_042 listen
//! ```
//!
//! # Configuration
//!
//! Settings come from `~/.config/virtual-classroom/client.toml`, then the
//! `CLASSROOM_*` environment variables, then the flags below.
//!
//! # Signals
//!
//! - `SIGINT` (Ctrl-C): Disconnect cleanly and exit

mod render;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing::{info, warn};

use classroom_core::{
    config, BusEvent, ConfigOverrides, EventBus, SessionClient, TeacherAction, Topic,
};

/// Classroom Console - Operator front-end for the Virtual Classroom backend
#[derive(Parser, Debug)]
#[command(name = "classroom-console")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Backend host
    #[arg(long, global = true, value_name = "HOST")]
    host: Option<String>,

    /// Backend port
    #[arg(short = 'p', long, global = true, value_name = "PORT")]
    port: Option<u16>,

    /// Room identifier
    #[arg(short = 'r', long, global = true, value_name = "ROOM")]
    room: Option<String>,

    /// Auth token
    #[arg(short = 't', long, global = true, value_name = "TOKEN")]
    token: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long, global = true, env = "CLASSROOM_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Do not reconnect after a dropped connection
    #[arg(long, global = true)]
    no_reconnect: bool,

    /// Reconnect attempts before giving up (0 = unlimited)
    #[arg(long, global = true, value_name = "N")]
    max_attempts: Option<u32>,

    /// Delay between reconnect attempts in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    delay_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, global = true, env = "CLASSROOM_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// What to do once connected
    #[command(subcommand)]
    command: Command,
}

/// Console actions
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print decisions until interrupted
    Listen,

    /// Send a teacher command to one student
    Teacher {
        /// Target student id
        student: String,
        /// Action name (praise, warn, encourage, question, command_sit, ...)
        action: String,
        /// Text spoken with the command
        #[arg(long, default_value = "")]
        content: String,
        /// Seconds to keep printing responses after sending
        #[arg(long, default_value_t = 5)]
        linger: u64,
    },

    /// Send a student action on behalf of one student
    Student {
        /// Student id
        student: String,
        /// Action type (raise_hand, answer, ...)
        action_type: String,
        /// Free-text content
        #[arg(default_value = "")]
        content: String,
        /// Seconds to keep printing responses after sending
        #[arg(long, default_value_t = 5)]
        linger: u64,
    },

    /// Send a raw JSON object as-is
    Raw {
        /// JSON object
        json: String,
        /// Seconds to keep printing responses after sending
        #[arg(long, default_value_t = 5)]
        linger: u64,
    },
}

impl Command {
    /// How long to stay connected after the action was sent
    fn linger(&self) -> Option<Duration> {
        match self {
            Self::Listen => None,
            Self::Teacher { linger, .. } | Self::Student { linger, .. } | Self::Raw { linger, .. } => {
                Some(Duration::from_secs(*linger))
            }
        }
    }
}

impl Args {
    /// Flags that override file and environment settings
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            host: self.host.clone(),
            port: self.port,
            room_id: self.room.clone(),
            auth_token: self.token.clone(),
            auto_reconnect: self.no_reconnect.then_some(false),
            reconnect_delay_ms: self.delay_ms,
            max_reconnect_attempts: self.max_attempts,
            ..Default::default()
        }
    }
}

/// Initialize logging with the specified level
fn init_logging(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "classroom_console={level},classroom_core={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

/// Forward every bus event to the main loop
fn bridge(bus: &EventBus) -> mpsc::UnboundedReceiver<BusEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    for topic in Topic::ALL {
        let tx = tx.clone();
        bus.subscribe(topic, move |event| {
            tx.send(event.clone())
                .map_err(|_| anyhow::anyhow!("console loop stopped"))
        });
    }
    rx
}

/// Submit the command's action; `Listen` sends nothing
fn submit(client: &SessionClient, command: &Command) -> Result<()> {
    match command {
        Command::Listen => Ok(()),
        Command::Teacher {
            student,
            action,
            content,
            ..
        } => client
            .send_teacher_command(student, TeacherAction::parse(action), content)
            .context("Failed to send teacher command"),
        Command::Student {
            student,
            action_type,
            content,
            ..
        } => client
            .send_student_action(student, action_type, content)
            .context("Failed to send student action"),
        Command::Raw { json, .. } => client.send_raw(json).context("Failed to send raw frame"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let path = args.config.clone().or_else(config::default_config_path);
    let loaded = config::load_config_from_path(path)
        .and_then(|loaded| loaded.with_cli(&args.overrides()))
        .context("Failed to load configuration")?;

    info!(
        endpoint = %loaded.session.endpoint.redacted_url(),
        source = %loaded.source,
        "Classroom console starting"
    );

    let bus = EventBus::new();
    let mut events = bridge(&bus);
    let client = SessionClient::websocket(loaded.session, bus);

    // Failures are reported on the bus and retried by the client
    if let Err(e) = client.connect().await {
        if !client.auto_reconnect() {
            return Err(e).context("Failed to connect");
        }
        warn!(error = %e, "Initial connect failed");
    }

    let mut submitted = matches!(args.command, Command::Listen);
    let mut deadline: Option<tokio::time::Instant> = None;

    let outcome = loop {
        let linger = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received SIGINT, disconnecting");
                break Ok(());
            }
            () = linger => break Ok(()),
            event = events.recv() => {
                let Some(event) = event else {
                    break Ok(());
                };
                println!("{}", render::line(&event));

                match event {
                    BusEvent::ConnectionOpened if !submitted => {
                        if let Err(e) = submit(&client, &args.command) {
                            break Err(e);
                        }
                        submitted = true;
                        deadline = args
                            .command
                            .linger()
                            .map(|d| tokio::time::Instant::now() + d);
                    }
                    BusEvent::ReconnectExhausted { attempts } => {
                        break Err(anyhow::anyhow!(
                            "Gave up after {attempts} reconnect attempts"
                        ));
                    }
                    BusEvent::ConnectionClosed { code } if code.is_normal() => break Ok(()),
                    BusEvent::ConnectionClosed { code } if !client.auto_reconnect() => {
                        break Err(anyhow::anyhow!("Connection closed: {code}"));
                    }
                    _ => {}
                }
            }
        }
    };

    client.disconnect().await;
    info!("Classroom console stopped");
    outcome
}
