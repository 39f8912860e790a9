use lrcedit_core::{LrcDocument, LrcEditConfig, LrcError};
use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const USAGE: &str = "usage: lrc-check <FILE> [--fix]";

/// Parsed command line
struct Args {
    path: PathBuf,
    fix: bool,
}

fn main() -> ExitCode {
    let file_logging_enabled = check_file_logging_enabled();
    init_tracing(file_logging_enabled);

    let Some(args) = parse_args(std::env::args().skip(1)) else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };

    let config = match LrcEditConfig::load_or_create() {
        Ok(config) => config,
        Err(LrcError::ConfigNotFound { path }) => {
            // Template was just written with default values
            info!("Created config template at {}", path.display());
            LrcEditConfig::default()
        }
        Err(e) => {
            error!("{e}");
            return ExitCode::from(2);
        }
    };

    match run(&args, &config) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            error!("{e}");
            ExitCode::from(2)
        }
    }
}

/// Check one file; returns whether it ends up free of problems
fn run(args: &Args, config: &LrcEditConfig) -> Result<bool, LrcError> {
    let mut doc = LrcDocument::open(&args.path, config.document)?;

    for message in doc.get_errors() {
        println!("{}: {message}", args.path.display());
    }

    if args.fix && !doc.errors().is_empty() {
        doc.save()?;
        info!("Rewrote {}", args.path.display());
        for message in doc.get_errors() {
            warn!("Still present after rewrite: {message}");
        }
    }

    Ok(doc.errors().is_empty())
}

fn parse_args(args: impl Iterator<Item = String>) -> Option<Args> {
    let mut path = None;
    let mut fix = false;

    for arg in args {
        match arg.as_str() {
            "--fix" => fix = true,
            _ if arg.starts_with('-') => return None,
            _ if path.is_none() => path = Some(PathBuf::from(arg)),
            _ => return None,
        }
    }

    path.map(|path| Args { path, fix })
}

/// Read `logging.enabled` before tracing exists; any problem means console only
fn check_file_logging_enabled() -> bool {
    std::fs::read_to_string(LrcEditConfig::config_path())
        .ok()
        .and_then(|content| LrcEditConfig::from_toml_str(&content).ok())
        .is_some_and(|config| config.logging.enabled)
}

/// Console logging on stderr, plus a log file when enabled in the config
fn init_tracing(file_logging_enabled: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(env_filter).with(fmt_layer);

    let file_layer = file_logging_enabled
        .then(open_log_file)
        .flatten()
        .map(|file| {
            tracing_subscriber::fmt::layer()
                .with_writer(Arc::new(file))
                .with_ansi(false)
        });

    registry.with(file_layer).init();
}

/// The subscriber is not installed yet, so failures go straight to stderr
fn open_log_file() -> Option<File> {
    let log_path = lrcedit_core::log_file_path();

    if let Some(parent) = log_path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!("Failed to create log directory {}: {e}", parent.display());
            return None;
        }
    }

    File::create(&log_path)
        .map_err(|e| eprintln!("Failed to create log file at {}: {e}", log_path.display()))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Option<Args> {
        parse_args(list.iter().map(ToString::to_string))
    }

    #[test]
    fn test_parse_args() {
        let parsed = args(&["song.lrc"]).unwrap();
        assert_eq!(parsed.path, PathBuf::from("song.lrc"));
        assert!(!parsed.fix);

        let parsed = args(&["--fix", "song.lrc"]).unwrap();
        assert!(parsed.fix);
    }

    #[test]
    fn test_parse_args_rejects_bad_input() {
        assert!(args(&[]).is_none());
        assert!(args(&["--fix"]).is_none());
        assert!(args(&["a.lrc", "b.lrc"]).is_none());
        assert!(args(&["--verbose", "a.lrc"]).is_none());
    }
}
