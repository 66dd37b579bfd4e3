use std::error::Error;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process;

use ballast_core::commands::CommandRegistry;
use ballast_core::tracer::TraceConfig;
use ballast_core::{Result as BallastResult, Session};
use ballast_utils::{info, init_logging, warn, LogLevel, LoggingConfig};
use clap::{Parser, Subcommand};

/// Measure how much memory live C++ containers use inside a running process.
#[derive(Parser, Debug)]
#[command(name = "ballast")]
#[command(version)]
#[command(about = "Measure the heap footprint of C++ containers in a running process", long_about = None)]
struct Cli
{
    /// Process ID (PID) to attach to
    #[arg(long, env = "BALLAST_PID", global = true)]
    pid: Option<u32>,

    /// Executable to read debug information from (default: the process's own executable)
    #[arg(long, env = "BALLAST_BINARY", global = true)]
    binary: Option<PathBuf>,

    /// Log level (overrides RUST_LOG)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Append "<expression>: <bytes>" to a log file
    Logsize
    {
        /// Value to measure, e.g. `mnodeman` or `*(CMasternode *)0x55d1c0a0`
        expression: String,
        /// File to append to
        logfile: PathBuf,
    },
    /// Print the type and used size of a value
    Usedsize
    {
        /// Session variable to store the result in
        variable: String,
        /// Value to measure
        expression: String,
    },
    /// Log allocator calls until the process starts to exit
    Memtrace
    {
        /// Trace log file
        #[arg(long, default_value = ballast_core::tracer::DEFAULT_TRACE_LOG)]
        log: PathBuf,
        /// Functions to break on (default: exit and the glibc allocator)
        #[arg(long = "symbol")]
        symbols: Vec<String>,
    },
    /// Read commands from stdin, one per line
    Repl,
}

fn main()
{
    let cli = Cli::parse();

    let logging = LoggingConfig::from_env().with_level(cli.log_level);
    let _guard = match init_logging(&logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = run(cli) {
        report(&e);
        process::exit(1);
    }
}

fn report(err: &dyn Error)
{
    eprintln!("Error: {err}");
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }
}

fn run(cli: Cli) -> BallastResult<()>
{
    let trace_config = match &cli.command {
        Commands::Memtrace { log, symbols } => {
            let mut config = TraceConfig {
                log_path: log.clone(),
                ..TraceConfig::default()
            };
            if !symbols.is_empty() {
                config.symbols = symbols.clone();
            }
            config
        }
        _ => TraceConfig::default(),
    };

    let mut session = open_session(cli.pid, cli.binary)?.with_trace_config(trace_config);
    let registry = CommandRegistry::builtin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Logsize { expression, logfile } => registry.run(
            "logsize",
            &[expression, logfile.to_string_lossy().into_owned()],
            &mut session,
            &mut out,
        ),
        Commands::Usedsize { variable, expression } => {
            registry.run("usedsize", &[variable, expression], &mut session, &mut out)
        }
        Commands::Memtrace { .. } => registry.run("memtrace", &[], &mut session, &mut out),
        Commands::Repl => repl(&registry, &mut session, &mut out),
    }
}

/// Run registry commands from stdin until end of input.
///
/// A failing command is reported and the prompt continues; the exit status
/// only reflects I/O errors.
fn repl(registry: &CommandRegistry, session: &mut Session, out: &mut dyn Write) -> BallastResult<()>
{
    let stdin = io::stdin();
    let interactive = stdin.is_terminal();
    let mut lines = stdin.lock().lines();

    loop {
        if interactive {
            write!(out, "(ballast) ")?;
            out.flush()?;
        }
        let Some(line) = lines.next() else {
            break;
        };
        let line = line?;
        if matches!(line.trim(), "quit" | "exit") {
            break;
        }
        if let Err(e) = registry.dispatch(&line, session, out) {
            report(&e);
        }
        out.flush()?;
    }
    Ok(())
}

#[cfg(target_os = "linux")]
fn open_session(pid: Option<u32>, binary: Option<PathBuf>) -> BallastResult<Session>
{
    use std::sync::Arc;

    use ballast_core::symbols::{BinaryImage, DwarfTypes};
    use ballast_core::types::ProcessId;
    use ballast_core::{BallastError, LinuxInferior};

    let pid = pid.ok_or_else(|| BallastError::InvalidArgument("--pid (or BALLAST_PID) is required".to_string()))?;
    let inferior = LinuxInferior::attach(ProcessId::from(pid))?;

    let types = match binary {
        Some(path) => {
            let canonical = path.canonicalize()?;
            match inferior.images().find(&canonical) {
                Some(image) => DwarfTypes::new(image),
                None => {
                    warn!("{} is not mapped into process {}; assuming no load bias", path.display(), pid);
                    DwarfTypes::new(Arc::new(BinaryImage::open(canonical)?))
                }
            }
        }
        None => inferior.main_types()?,
    };
    info!("Reading types from {}", types.image().path().display());

    Ok(Session::new(Box::new(inferior), Box::new(types)))
}

#[cfg(not(target_os = "linux"))]
fn open_session(_pid: Option<u32>, _binary: Option<PathBuf>) -> BallastResult<Session>
{
    Err(ballast_core::BallastError::InvalidArgument(
        "attaching to live processes is only supported on Linux".to_string(),
    ))
}
