//! Whiteboard CLI — drive a running server over its WebSocket for manual
//! interop testing: watch the board, add and remove shapes, manage
//! checkpoints, clear the state.

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use board::{Shape, ShapeKind, UserLevel};
use client::{BoardEvent, BoardListener, CommError, Communicator, OperationFacade, StateManager};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Connect(#[from] CommError),
    #[error("shape not found on the board: {0}")]
    UnknownShape(Uuid),
    #[error("operation refused by the state manager")]
    Refused,
}

#[derive(Parser, Debug)]
#[command(name = "whiteboard-cli", about = "Whiteboard state-engine CLI")]
struct Cli {
    #[arg(long, env = "WHITEBOARD_URL", default_value = "ws://127.0.0.1:4600")]
    url: String,

    #[arg(long, env = "WHITEBOARD_USER", default_value = "cli")]
    user: String,

    /// Connect with the high permission level (required for `clear`).
    #[arg(long)]
    admin: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print every board event until interrupted.
    Watch,
    /// Create a shape and print its assigned id.
    Create(CreateArgs),
    /// Delete a shape by id.
    Delete { id: Uuid },
    /// Undo the most recent operation issued in this session.
    Undo,
    /// Wipe the board (high level only).
    Clear,
    /// Snapshot the current board as a new checkpoint.
    Save,
    /// Restore a checkpoint by number.
    Restore { number: u64 },
}

#[derive(Args, Debug)]
struct CreateArgs {
    #[arg(long, value_enum, default_value = "rectangle")]
    kind: CliShapeKind,
    #[arg(long, default_value_t = 0.0)]
    x: f64,
    #[arg(long, default_value_t = 0.0)]
    y: f64,
    #[arg(long, default_value_t = 100.0)]
    width: f64,
    #[arg(long, default_value_t = 100.0)]
    height: f64,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum CliShapeKind {
    Rectangle,
    Ellipse,
    Line,
    Polyline,
}

impl From<CliShapeKind> for ShapeKind {
    fn from(value: CliShapeKind) -> Self {
        match value {
            CliShapeKind::Rectangle => Self::Rectangle,
            CliShapeKind::Ellipse => Self::Ellipse,
            CliShapeKind::Line => Self::Line,
            CliShapeKind::Polyline => Self::Polyline,
        }
    }
}

/// Prints board events as they arrive from the state manager.
struct PrintListener;

impl BoardListener for PrintListener {
    fn on_update(&self, event: &BoardEvent) {
        match event {
            BoardEvent::Shapes(deltas) => {
                for delta in deltas {
                    println!("{:?} {} ({:?})", delta.op, delta.id, delta.shape.kind);
                }
            }
            BoardEvent::Cleared { generation } => println!("board cleared, generation {generation}"),
            BoardEvent::CheckpointSaved { number } => println!("checkpoint {number} saved"),
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let level = if cli.admin { UserLevel::High } else { UserLevel::Low };
    let endpoint = Communicator::endpoint(&cli.url, &cli.user, level);
    let communicator = Arc::new(Communicator::connect(&endpoint).await?);

    let manager = Arc::new(StateManager::new(&cli.user, level, communicator.clone()));
    communicator.subscribe(manager.clone());
    manager.subscribe("cli", Arc::new(PrintListener));

    // Let the fetch-state snapshot land before issuing operations.
    tokio::time::sleep(Duration::from_millis(300)).await;

    let facade = OperationFacade::new(manager.clone());
    match cli.command {
        Command::Watch => {
            println!(
                "watching board: {} shapes, generation {}",
                manager.shape_count(),
                manager.generation()
            );
            let _ = tokio::signal::ctrl_c().await;
            return Ok(());
        }
        Command::Create(args) => {
            let mut shape = Shape::rectangle(args.x, args.y, args.width, args.height);
            shape.kind = args.kind.into();
            let id = facade.create_shape(shape).ok_or(CliError::Refused)?;
            println!("{id}");
        }
        Command::Delete { id } => {
            if manager.get_shape(&id).is_none() {
                return Err(CliError::UnknownShape(id));
            }
            if !facade.delete_shape(id) {
                return Err(CliError::Refused);
            }
        }
        Command::Undo => {
            if !facade.undo() {
                return Err(CliError::Refused);
            }
        }
        Command::Clear => {
            if !facade.clear_board() {
                return Err(CliError::Refused);
            }
        }
        Command::Save => {
            facade.save_checkpoint();
        }
        Command::Restore { number } => {
            facade.fetch_checkpoint(number);
        }
    }

    // Give the writer task time to flush the outbound queue.
    tokio::time::sleep(Duration::from_millis(200)).await;
    Ok(())
}
