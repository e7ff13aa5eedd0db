//! LC-3 Emulator - CLI Entry Point
//!
//! Commands:
//! - `lc3-emu run <image>` - Load an object image and run it until HALT
//! - `lc3-emu info <image>` - Show where an image loads and how big it is

use clap::{Parser, Subcommand};
use lc3::{load_image, Cpu, Image, ImageError};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lc3-emu")]
#[command(version)]
#[command(about = "An emulator of the LC-3 16-bit educational computer")]
struct Cli {
    /// Log level when RUST_LOG is not set (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an image until it halts or is interrupted (Esc / Ctrl-C)
    Run {
        /// Path to the object image
        image: PathBuf,
        /// Stop after this many instructions
        #[arg(short, long)]
        max_cycles: Option<u64>,
        /// Read keys from stdin instead of the raw terminal
        #[arg(long)]
        plain: bool,
        /// Give up waiting for a key after this many milliseconds
        #[arg(long)]
        key_timeout_ms: Option<u64>,
        /// Write the final machine state as JSON to this file
        #[arg(long)]
        dump_state: Option<PathBuf>,
    },
    /// Print an image's origin and size
    Info {
        /// Path to the object image
        image: PathBuf,
    },
}

/// Errors that stop the emulator before (or after) the machine runs.
#[derive(Debug, Error)]
enum CliError {
    #[error("image not found: {0}")]
    NotFound(String),

    #[error("image must be a file: {0}")]
    NotAFile(String),

    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot write state dump: {0}")]
    Dump(#[from] serde_json::Error),
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let raw_terminal = matches!(cli.command, Commands::Run { plain: false, .. });
    init_logging(&cli.log_level, raw_terminal);

    let result = match cli.command {
        Commands::Run { image, max_cycles, plain, key_timeout_ms, dump_state } => {
            run_image(&image, max_cycles, plain, key_timeout_ms, dump_state.as_deref())
        }
        Commands::Info { image } => show_info(&image),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn log_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Logs go to stderr. While the terminal is in raw mode they need the same
/// newline translation as program output.
#[cfg(feature = "term")]
fn init_logging(default_level: &str, raw_terminal: bool) {
    use lc3::io::TerminalOutput;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(log_filter(default_level))
        .with_target(false);
    if raw_terminal {
        builder
            .with_writer(|| TerminalOutput::from_writer(std::io::stderr()))
            .init();
    } else {
        builder.with_writer(std::io::stderr).init();
    }
}

#[cfg(not(feature = "term"))]
fn init_logging(default_level: &str, _raw_terminal: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(default_level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Check the path and read the image, before any terminal state changes.
fn read_image(path: &Path) -> Result<Image, CliError> {
    let meta = std::fs::metadata(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => CliError::NotFound(path.display().to_string()),
        _ => CliError::Io(e),
    })?;
    if meta.is_dir() {
        return Err(CliError::NotAFile(path.display().to_string()));
    }

    let image = load_image(path)?;
    tracing::info!(
        "loaded {} words at 0x{:04X} from {}",
        image.len(),
        image.origin,
        path.display()
    );
    Ok(image)
}

fn run_image(
    path: &Path,
    max_cycles: Option<u64>,
    plain: bool,
    key_timeout_ms: Option<u64>,
    dump_state: Option<&Path>,
) -> Result<(), CliError> {
    let image = read_image(path)?;

    let mut cpu = make_cpu(plain, key_timeout_ms)?;
    cpu.load_image(&image);

    tracing::info!("starting at 0x{:04X}", cpu.regs.pc);
    let executed = match max_cycles {
        Some(max) => cpu.run_limited(max),
        None => cpu.run(),
    };
    tracing::info!(
        "stopped after {} instructions: {:?} ({} diagnostics)",
        executed,
        cpu.state,
        cpu.diagnostic_count()
    );

    if let Some(max) = max_cycles {
        if cpu.is_running() {
            tracing::warn!("reached max cycles limit ({}); use --max-cycles to increase", max);
        }
    }

    // Drop the CPU first so the terminal leaves raw mode before we print.
    let snapshot = dump_state.map(|_| cpu.snapshot());
    drop(cpu);

    if let (Some(path), Some(snapshot)) = (dump_state, snapshot) {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, &snapshot)?;
        tracing::info!("state written to {}", path.display());
    }

    Ok(())
}

#[cfg(feature = "term")]
fn make_cpu(plain: bool, key_timeout_ms: Option<u64>) -> Result<Cpu, CliError> {
    use lc3::io::{TerminalInput, TerminalOutput};
    use std::time::Duration;

    if plain {
        return Ok(Cpu::new(lc3::StdinInput::new(), std::io::stdout()));
    }

    let input = TerminalInput::new(key_timeout_ms.map(Duration::from_millis))?;
    Ok(Cpu::new(input, TerminalOutput::new()))
}

#[cfg(not(feature = "term"))]
fn make_cpu(_plain: bool, key_timeout_ms: Option<u64>) -> Result<Cpu, CliError> {
    if key_timeout_ms.is_some() {
        tracing::warn!("--key-timeout-ms needs the `term` feature; ignoring");
    }
    Ok(Cpu::new(lc3::StdinInput::new(), std::io::stdout()))
}

fn show_info(path: &Path) -> Result<(), CliError> {
    let image = read_image(path)?;

    println!("Image:  {}", path.display());
    println!("Origin: 0x{:04X}", image.origin);
    println!("Words:  {}", image.len());
    match image.end() {
        Some(end) => println!("End:    0x{:04X}", end),
        None => println!("End:    (empty)"),
    }
    if image.origin != lc3::cpu::registers::PC_START {
        println!(
            "Note:   execution starts at 0x{:04X}, not at the origin",
            lc3::cpu::registers::PC_START
        );
    }

    Ok(())
}
