use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde_json::Value;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use otcmod::config::Config;
use otcmod::envelope::{Envelope, OutcomeChannel};
use otcmod::error::ModuleError;
use otcmod::module::{find_module, module_names, Harness, Invocation};
use otcmod::otc::OtcConnector;

/// Open Telekom Cloud automation modules
#[derive(Parser, Debug)]
#[command(name = "otcmod", version, about, long_about = None)]
struct Args {
    /// Module to run; defaults to the name this binary was invoked as
    #[arg(short, long)]
    module: Option<String>,

    /// JSON file with the module arguments; stdin when omitted
    args_file: Option<PathBuf>,

    /// Report what would change without changing anything
    #[arg(long)]
    check: bool,

    /// Include before/after diff in the result
    #[arg(long)]
    diff: bool,

    /// clouds.yaml to read profiles from
    #[arg(long)]
    clouds_file: Option<PathBuf>,

    /// Log level for debugging
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,

    /// Print the available modules and exit
    #[arg(long)]
    list_modules: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

/// Logs go to a file; stdout carries only the result envelope
fn setup_logging(level: LogLevel, log_path: &Path) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let tracing_level = level.to_tracing_level()?;

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = match std::fs::OpenOptions::new().create(true).append(true).open(log_path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("otcmod: cannot open log file {:?}: {}", log_path, e);
            return None;
        }
    };

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("otcmod {} started with log level: {:?}", env!("CARGO_PKG_VERSION"), level);
    tracing::info!("Log file: {:?}", log_path);

    Some(guard)
}

/// Module name from argv[0], for symlinked invocations
fn invoked_as() -> Option<String> {
    let argv0 = std::env::args_os().next()?;
    let stem = Path::new(&argv0).file_stem()?.to_str()?.to_string();
    (stem != "otcmod").then_some(stem)
}

fn read_payload(path: Option<&Path>) -> Result<Value> {
    let raw = match path {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading {:?}", path))?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).context("reading stdin")?;
            buf
        }
    };
    serde_json::from_str(&raw).context("module arguments are not valid JSON")
}

fn emit(envelope: &Envelope) -> Result<i32> {
    let mut channel = OutcomeChannel::new(io::stdout().lock());
    channel.emit(envelope)?;
    Ok(envelope.exit_code())
}

async fn run(args: &Args, config: &Config) -> Result<i32> {
    let Some(name) = args.module.clone().or_else(invoked_as) else {
        let err = ModuleError::invalid("no module given; use --module NAME");
        return emit(&Envelope::fail(&err));
    };
    let Some(module) = find_module(&name) else {
        let err = ModuleError::invalid(format!(
            "unknown module '{}'; available: {}",
            name,
            module_names().join(", ")
        ));
        return emit(&Envelope::fail(&err));
    };

    let payload = match read_payload(args.args_file.as_deref()) {
        Ok(payload) => payload,
        Err(e) => return emit(&Envelope::fail(&ModuleError::invalid(format!("{:#}", e)))),
    };
    let mut invocation = match Invocation::from_payload(&payload) {
        Ok(invocation) => invocation,
        Err(e) => return emit(&Envelope::fail(&e)),
    };
    invocation.check_mode |= args.check;
    invocation.diff |= args.diff;

    let clouds_file = args.clouds_file.clone().or_else(|| config.clouds_file.clone());
    let harness = Harness::new(OtcConnector::new(clouds_file)).with_poll_interval(config.poll_interval());

    let envelope = harness.run(module, invocation).await;
    emit(&envelope)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load();

    if args.list_modules {
        for name in module_names() {
            println!("{}", name);
        }
        return Ok(());
    }

    let level = args
        .log_level
        .or_else(|| {
            config
                .log_level
                .as_deref()
                .and_then(|l| LogLevel::from_str(l, true).ok())
        })
        .unwrap_or(LogLevel::Off);
    let log_guard = setup_logging(level, &config.log_path());

    let code = run(&args, &config).await?;

    // Flush the log writer before exiting
    drop(log_guard);
    std::process::exit(code);
}
