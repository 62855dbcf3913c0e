//! Sense Record - command-line front-end
//!
//! ## Subcommands
//!
//! - `boards`: list the supported boards
//! - `tasks`: list the tasks of a config file
//! - `status`: probe one board
//! - `start`: record one board, prompting for anything not given as a flag
//! - `record`: record every board of a configured task
//! - `serve`: run the REST API

mod console;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use console::Console;
use senserecord::server::{AppState, ServerConfig};
use senserecord::sidecar::RecordingMetadata;
use senserecord::{
    catalog, ConnectionParams, DefaultDriver, RecordingParams, RecordingSession, SessionError,
    StudyConfig,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::filter::LevelFilter;

#[derive(Parser)]
#[command(name = "senserecord")]
#[command(about = "Record data streams from biosensor hardware")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List supported boards
    Boards,

    /// List the tasks defined in a config file
    Tasks {
        /// Config file (defaults to the user config directory)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Report whether a board is ready
    Status {
        /// Board name, e.g. CYTON_BOARD
        board: String,

        /// Connection setting for the board driver
        #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },

    /// Record from one board until told to stop
    Start(StartArgs),

    /// Record every board of a configured task
    Record {
        /// Task name from the config file
        task: String,

        /// Subject label
        #[arg(long)]
        sub: String,

        /// Session label
        #[arg(long)]
        ses: String,

        /// Run number
        #[arg(long)]
        run: String,

        /// Only record this board key of the task
        #[arg(long)]
        board: Option<String>,

        /// Config file (defaults to the user config directory)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Run the REST API
    Serve {
        /// Bind address (overrides the config file)
        #[arg(long)]
        host: Option<String>,

        /// Port (overrides the config file)
        #[arg(long)]
        port: Option<u16>,

        /// Config file for server settings
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct StartArgs {
    /// Board name, e.g. CYTON_BOARD
    #[arg(long)]
    board: Option<String>,

    /// Root directory of the project
    #[arg(long, visible_alias = "bidsroot")]
    output_root: Option<PathBuf>,

    /// Subject label
    #[arg(long)]
    sub: Option<String>,

    /// Session label
    #[arg(long)]
    ses: Option<String>,

    /// Task name
    #[arg(long)]
    task: Option<String>,

    /// Run number
    #[arg(long)]
    run: Option<String>,

    /// Data type directory, defaults to the modality
    #[arg(long)]
    data_type: Option<String>,

    /// Modality file suffix, defaults to the data type
    #[arg(long)]
    modality: Option<String>,

    /// Acquisition label
    #[arg(long)]
    acq: Option<String>,

    /// Connection setting for the board driver
    #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(
                "senserecord=info"
                    .parse()
                    .unwrap_or_else(|_| LevelFilter::INFO.into()),
            ),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Boards => list_boards(),
        Commands::Tasks { config } => list_tasks(config.as_deref()),
        Commands::Status { board, params } => status(&board, &params),
        Commands::Start(args) => start(args),
        Commands::Record {
            task,
            sub,
            ses,
            run,
            board,
            config,
        } => record(
            &task,
            &RunLabels {
                sub: &sub,
                ses: &ses,
                run: &run,
            },
            board.as_deref(),
            config.as_deref(),
        ),
        Commands::Serve { host, port, config } => serve(host, port, config.as_deref()),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn connection_params(assignments: &[String]) -> Result<ConnectionParams> {
    let pairs = assignments
        .iter()
        .map(|a| ConnectionParams::parse_assignment(a))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ConnectionParams::from_pairs(pairs)?)
}

fn load_config(path: Option<&Path>) -> Result<StudyConfig> {
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(StudyConfig::default_path);
    Ok(StudyConfig::load(&path)?)
}

fn list_boards() -> Result<()> {
    println!("{:<16} {:>8} {:>9}", "BOARD", "RATE", "CHANNELS");
    for device in catalog::all() {
        println!(
            "{:<16} {:>5} Hz {:>9}",
            device.name,
            device.sampling_rate,
            device.channel_count()
        );
    }
    Ok(())
}

fn list_tasks(config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    for (name, task) in &config.tasks {
        let label = task.label.as_deref().unwrap_or(name);
        println!("{name}: {label}");
        for (key, board) in &task.boards {
            println!("  {key} ({})", board.name);
        }
        for (id, session) in &task.sessions {
            println!("  session {id}: {session}");
        }
    }
    Ok(())
}

fn status(board: &str, params: &[String]) -> Result<()> {
    let params = connection_params(params)?;
    let session = RecordingSession::open(board, params, &DefaultDriver)?;
    if session.is_ready() {
        println!("{} is ready", session.name());
    } else {
        println!("{} is not reachable", session.name());
    }
    Ok(())
}

fn start(args: StartArgs) -> Result<()> {
    let console = Console::new()?;
    let params = connection_params(&args.params)?;

    let board = match args.board {
        Some(board) => board,
        None => console.prompt("Enter your board name")?,
    };
    if !catalog::is_known(&board) {
        return Err(SessionError::UnknownDevice(board).into());
    }
    let output_root = match args.output_root {
        Some(root) => root,
        None => PathBuf::from(console.prompt("Enter the path to the root directory of your project")?),
    };
    let value = |given: Option<String>, label: &str| match given {
        Some(v) => Ok(v),
        None => console.prompt(label),
    };
    let sub = value(args.sub, "Subject name/ID")?;
    let ses = value(args.ses, "Session name")?;
    let task = value(args.task, "Task name")?;
    let run = value(args.run, "Run number")?;

    let mut recording = RecordingParams::new(sub, ses, task, run);
    recording.data_type = args.data_type;
    recording.modality = args.modality;
    recording.acquisition = args.acq;

    let mut session = RecordingSession::open(&board, params, &DefaultDriver)?;
    let paths = session
        .start(&output_root, recording, RecordingMetadata::default())
        .with_context(|| format!("Failed to start recording from {board}"))?;

    println!("Now recording from {board} to {}", paths.data_path().display());
    println!("Press Ctrl+C or answer the prompt to stop.");
    console.wait_for_stop()?;

    let sidecar = stop_with_retry(&console, &mut session)?;
    println!("Stopped recording from {}", session.name());
    println!("Sidecar written to {}", sidecar.display());
    Ok(())
}

/// Stop a session, offering to retry whatever part failed
fn stop_with_retry(console: &Console, session: &mut RecordingSession) -> Result<PathBuf> {
    let mut result = session.stop();
    loop {
        let err = match result {
            Ok(sidecar) => return Ok(sidecar),
            Err(e) => e,
        };
        eprintln!("Failed to stop recording from {}\n{err}", session.name());
        if !console.confirm("Retry?", true)? {
            return Err(err.into());
        }
        result = session.retry_stop(&err);
    }
}

/// Subject, session, and run shared by every board of a task recording
struct RunLabels<'a> {
    sub: &'a str,
    ses: &'a str,
    run: &'a str,
}

fn record(
    task_name: &str,
    labels: &RunLabels<'_>,
    only_board: Option<&str>,
    config: Option<&Path>,
) -> Result<()> {
    let config = load_config(config)?;
    let task = config.task(task_name)?;
    if let Some(key) = only_board {
        if !task.boards.contains_key(key) {
            bail!("Task {task_name} has no board {key}");
        }
    }
    let console = Console::new()?;

    let boards = task
        .boards
        .iter()
        .filter(|(key, _)| only_board.map_or(true, |only| only == key.as_str()));

    let mut sessions: Vec<(&str, RecordingSession)> = Vec::new();
    for (key, board) in boards {
        // One connection per board, even when a task lists it twice
        let outcome = if sessions.iter().any(|(_, s)| s.name() == board.name) {
            Err(SessionError::AlreadyRecording(board.name.clone()))
        } else {
            let params =
                task.recording_params(task_name, board, labels.sub, labels.ses, labels.run);
            let metadata = task.metadata_for(board);
            RecordingSession::open(&board.name, board.params.clone(), &DefaultDriver).and_then(
                |mut session| {
                    let paths = session.start(&task.output_root, params, metadata)?;
                    Ok((session, paths))
                },
            )
        };
        match outcome {
            Ok((session, paths)) => {
                println!("Now recording {key} ({}) to {}", board.name, paths.data_path().display());
                sessions.push((key.as_str(), session));
            }
            Err(e) => {
                eprintln!("Failed to start recording from {key} ({}): {e}", board.name);
                stop_all(&console, &mut sessions)?;
                bail!("Task {task_name} aborted");
            }
        }
    }

    info!(task = task_name, boards = sessions.len(), "Task recording started");
    println!("Press Ctrl+C or answer the prompt to stop.");
    console.wait_for_stop()?;
    stop_all(&console, &mut sessions)
}

fn stop_all(console: &Console, sessions: &mut [(&str, RecordingSession)]) -> Result<()> {
    let mut failed = 0;
    for (key, session) in sessions.iter_mut() {
        if !session.is_recording() {
            continue;
        }
        match stop_with_retry(console, session) {
            Ok(sidecar) => println!("Stopped {key}, sidecar written to {}", sidecar.display()),
            Err(e) => {
                warn!(board = session.name(), error = %e, "Board left without a sidecar");
                failed += 1;
            }
        }
    }
    if failed > 0 {
        bail!("{failed} board(s) did not stop cleanly");
    }
    Ok(())
}

fn serve(host: Option<String>, port: Option<u16>, config: Option<&Path>) -> Result<()> {
    let mut server = match config {
        Some(path) => ServerConfig::from(&StudyConfig::load(path)?.server),
        None => ServerConfig::default(),
    };
    if let Some(host) = host {
        server.bind_addr = host;
    }
    if let Some(port) = port {
        server.port = port;
    }

    let state = AppState::with_driver(Arc::new(DefaultDriver), server);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(senserecord::server::start_server(state))
}
