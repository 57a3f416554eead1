//! Purpose: `mdbfetch` CLI entry point.
//! Role: Binary crate root; parses args, wires collaborators, runs the resolver.
//! Invariants: Progress goes to stderr via tracing; stdout carries only the result.
//! Invariants: Errors are text on a terminal and a JSON envelope otherwise.
//! Invariants: Exit code is 0 on success and 1 on any error.
use std::error::Error as StdError;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum, ValueHint, error::ErrorKind as ClapErrorKind};
use serde_json::{Map, Value, json};
use tracing_subscriber::EnvFilter;

use mdbfetch::api::{
    CancelToken, DEFAULT_BASE_URL, DirSink, Endpoints, Error, ErrorKind, HttpTransport,
    ResolveRequest, Resolution, Resolver, to_exit_code,
};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Platform {
    #[value(name = "Windows")]
    Windows,
    #[value(name = "iOS")]
    Ios,
    #[value(name = "Android")]
    Android,
}

impl Platform {
    fn as_str(self) -> &'static str {
        match self {
            Platform::Windows => "Windows",
            Platform::Ios => "iOS",
            Platform::Android => "Android",
        }
    }
}

#[derive(Parser)]
#[command(
    name = "mdbfetch",
    version,
    about = "Fetch master.mdb by resolving the asset manifest chain",
    long_about = None,
    after_help = r#"EXAMPLES
  $ mdbfetch 10004010
  $ mdbfetch 10004010 --output ./downloads
  $ mdbfetch 10004010 --platform Android --quiet

MANIFEST CHAIN
  root manifest -> platform manifest -> master manifest -> master.mdb"#
)]
struct Cli {
    #[arg(help = "Application version (e.g. 10004010)")]
    app_version: String,
    #[arg(
        short,
        long,
        default_value = ".",
        help = "Output directory",
        value_hint = ValueHint::DirPath
    )]
    output: PathBuf,
    #[arg(
        short,
        long,
        value_enum,
        default_value_t = Platform::Windows,
        help = "Target platform"
    )]
    platform: Platform,
    #[arg(short, long, help = "Suppress progress messages")]
    quiet: bool,
    #[arg(long, default_value = DEFAULT_BASE_URL, help = "Asset CDN base url", value_hint = ValueHint::Url)]
    base_url: String,
    #[arg(long, default_value_t = 30, help = "Network timeout per request, in seconds")]
    timeout: u64,
    #[arg(long, help = "Print the resolution summary as JSON")]
    json: bool,
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err(err) => {
            emit_error(&err);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, Error> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => {
                err.print().map_err(|io_err| {
                    Error::new(ErrorKind::Io)
                        .with_message("failed to write help")
                        .with_source(io_err)
                })?;
                return Ok(RunOutcome::ok());
            }
            _ => {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message(clap_error_summary(&err))
                    .with_hint("Try `mdbfetch --help`."));
            }
        },
    };

    init_tracing(cli.quiet);

    let endpoints = Endpoints::new(&cli.base_url)?;
    let transport = HttpTransport::new(Duration::from_secs(cli.timeout));
    let sink = DirSink::new(output_dir(&cli.output));
    let cancel = CancelToken::new();
    cancel.install_signal_handlers().map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to install signal handlers")
            .with_source(err)
    })?;

    let request = ResolveRequest::new(cli.app_version, cli.platform.as_str());
    let resolution = Resolver::new(&endpoints, &transport, &sink)
        .with_cancel(cancel)
        .resolve(&request)?;

    emit_resolution(&resolution, cli.json)?;
    Ok(RunOutcome::ok())
}

fn init_tracing(quiet: bool) {
    let env_filter = if quiet {
        EnvFilter::new("warn")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(io::stderr().is_terminal())
        .with_writer(io::stderr)
        .try_init();
}

fn output_dir(raw: &Path) -> PathBuf {
    let dir = if raw.as_os_str().to_string_lossy().trim().is_empty() {
        PathBuf::from(".")
    } else {
        raw.to_path_buf()
    };
    std::path::absolute(&dir).unwrap_or(dir)
}

fn emit_resolution(resolution: &Resolution, as_json: bool) -> Result<(), Error> {
    if as_json {
        let json = serde_json::to_string(resolution).map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("failed to encode resolution json")
                .with_source(err)
        })?;
        println!("{json}");
    } else {
        println!("Output: {}", resolution.artifact_path.display());
    }
    Ok(())
}

fn clap_error_summary(err: &clap::Error) -> String {
    for line in err.to_string().lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("error:") {
            return rest.trim().to_string();
        }
        return trimmed.to_string();
    }
    "invalid arguments".to_string()
}

fn emit_error(err: &Error) {
    if io::stderr().is_terminal() {
        eprintln!("{}", error_text(err));
        return;
    }
    let json = serde_json::to_string(&error_json(err)).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::Format => "malformed manifest data".to_string(),
        ErrorKind::Lookup => "entry not found".to_string(),
        ErrorKind::Transport => "download failed".to_string(),
        ErrorKind::Codec => "decompression failed".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
        ErrorKind::Cancelled => "cancelled".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(stage) = err.stage() {
        inner.insert("stage".to_string(), json!(stage.as_str()));
    }
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(url) = err.url() {
        inner.insert("url".to_string(), json!(url));
    }
    if let Some(status) = err.status() {
        inner.insert("status".to_string(), json!(status));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(offset) = err.offset() {
        inner.insert("offset".to_string(), json!(offset));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error) -> String {
    let mut lines = vec![format!("error: {}", error_message(err))];
    if let Some(stage) = err.stage() {
        lines.push(format!("stage: {stage}"));
    }
    if let Some(url) = err.url() {
        lines.push(format!("url: {url}"));
    }
    if let Some(path) = err.path() {
        lines.push(format!("path: {}", path.display()));
    }
    if let Some(offset) = err.offset() {
        lines.push(format!("offset: {offset}"));
    }
    for cause in error_causes(err) {
        lines.push(format!("caused by: {cause}"));
    }
    if let Some(hint) = err.hint() {
        lines.push(format!("hint: {hint}"));
    }
    lines.join("\n")
}
