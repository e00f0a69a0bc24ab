//! Terminal driver for the viewer core.
//!
//! Loads a book, opens a viewer session and reads one command per line from
//! stdin, printing the resulting snapshot as JSON.

use anyhow::{Context, Result, anyhow, bail};
use pageleaf::book::load_book;
use pageleaf::config::load_config;
use pageleaf::durable::{DurableCache, FsDurableCache};
use pageleaf::network::HttpFetcher;
use pageleaf::offline::OfflineBridge;
use pageleaf::pagination::page_budget;
use pageleaf::profile::{ProfileTracker, ViewportSignals};
use pageleaf::viewer::{ViewerCommand, ViewerSession};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, reload};

type ReloadHandle = reload::Handle<EnvFilter, tracing_subscriber::Registry>;

const DEFAULT_VIEWPORT: (u32, u32) = (1280, 800);

#[tokio::main]
async fn main() {
    let reload_handle = init_tracing();
    if let Err(err) = run(&reload_handle).await {
        error!("{err:?}");
        std::process::exit(1);
    }
}

struct Args {
    book_path: PathBuf,
    config_path: PathBuf,
    viewport: ViewportSignals,
}

#[derive(Debug, Clone, PartialEq)]
enum DriverCommand {
    Viewer(ViewerCommand),
    Resize(ViewportSignals),
    Rotate(ViewportSignals),
    Stats,
    Log,
    Quit,
}

async fn run(reload_handle: &ReloadHandle) -> Result<()> {
    let args = parse_args(env::args().skip(1))?;
    let config = load_config(&args.config_path);
    set_log_level(reload_handle, config.log_level.as_filter_str());
    info!(
        path = %args.book_path.display(),
        level = %config.log_level,
        "Starting viewer"
    );

    let profiles = ProfileTracker::new(
        args.viewport,
        Duration::from_millis(config.orientation_settle_ms),
    );
    let profile = profiles.current();
    info!(
        device = ?profile.device,
        font_size = profile.font_size,
        base_scale = profile.base_scale,
        "Active device profile"
    );
    let book = load_book(&args.book_path, page_budget(&profile))?;

    let bridge = if config.offline_enabled {
        let durable = FsDurableCache::new(&config.durable_cache_dir);
        let handle = durable
            .open(&config.durable_cache_name)
            .await
            .context("Failed to open the offline cache")?;
        Some(OfflineBridge::new(handle, Arc::new(HttpFetcher::new())))
    } else {
        None
    };

    let session = ViewerSession::open_book(book, config, bridge)
        .await
        .context("Failed to open viewer session")?;
    print_json(&session.snapshot())?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(err) => {
                warn!("{err}");
                continue;
            }
        };
        match command {
            DriverCommand::Quit => break,
            DriverCommand::Viewer(command) => {
                let navigates = matches!(
                    command,
                    ViewerCommand::GoToPage { .. }
                        | ViewerCommand::NextPage
                        | ViewerCommand::PreviousPage
                );
                match session.apply_command(command) {
                    Ok(_) if navigates => {
                        session.settle().await;
                        print_json(&session.snapshot())?;
                    }
                    Ok(event) => print_json(&event.snapshot)?,
                    Err(err) => warn!("{err}"),
                }
            }
            DriverCommand::Resize(signals) => {
                profiles.on_resize(signals);
                print_json(&profiles.current())?;
            }
            DriverCommand::Rotate(signals) => {
                profiles.on_orientation_change(signals);
                let mut updates = profiles.subscribe();
                let settle = Duration::from_millis(session.config().orientation_settle_ms * 2);
                let _ = tokio::time::timeout(settle, updates.changed()).await;
                print_json(&profiles.current())?;
            }
            DriverCommand::Stats => print_json(&serde_json::json!({
                "cache": session.cache_stats(),
                "resident_pages": session.resident_pages(),
                "capabilities": session.capabilities(),
                "profile": profiles.current(),
            }))?,
            DriverCommand::Log => print_json(&session.telemetry().records())?,
        }
    }

    session.dispose();
    if let Some(report) = session.offline_report().await {
        info!(
            book_id = %report.book_id,
            pages = report.pages_cached,
            assets = report.assets_cached,
            failures = report.failures.len(),
            "Offline caching finished"
        );
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let usage = "Usage: pageleaf <book.json|book.txt|book.epub> [--config PATH] [--viewport WxH] [--touch]";
    let mut book_path = None;
    let mut config_path = PathBuf::from("conf/config.toml");
    let (width, height) = DEFAULT_VIEWPORT;
    let mut viewport = ViewportSignals {
        width,
        height,
        pixel_ratio: 1.0,
        is_touch: false,
    };

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                config_path = args.next().map(PathBuf::from).ok_or_else(|| anyhow!(usage))?;
            }
            "--viewport" => {
                let spec = args.next().ok_or_else(|| anyhow!(usage))?;
                let (width, height) = parse_dimensions(&spec)?;
                viewport.width = width;
                viewport.height = height;
            }
            "--touch" => viewport.is_touch = true,
            _ if book_path.is_none() => book_path = Some(PathBuf::from(&arg)),
            other => bail!("Unexpected argument {other:?}. {usage}"),
        }
    }

    let book_path = book_path.ok_or_else(|| anyhow!(usage))?;
    if !Path::new(&book_path).exists() {
        bail!("File not found: {}", book_path.display());
    }
    Ok(Args {
        book_path,
        config_path,
        viewport,
    })
}

fn parse_dimensions(spec: &str) -> Result<(u32, u32)> {
    let (width, height) = spec
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow!("Expected WIDTHxHEIGHT, got {spec:?}"))?;
    let width = width.trim().parse().with_context(|| format!("Bad width in {spec:?}"))?;
    let height = height.trim().parse().with_context(|| format!("Bad height in {spec:?}"))?;
    Ok((width, height))
}

fn parse_command(line: &str) -> Result<DriverCommand> {
    let mut parts = line.split_whitespace();
    let verb = parts.next().unwrap_or_default();
    let argument = parts.next();
    let viewport = |arg: Option<&str>| -> Result<ViewportSignals> {
        let (width, height) = parse_dimensions(arg.ok_or_else(|| anyhow!("{verb} needs WxH"))?)?;
        Ok(ViewportSignals {
            width,
            height,
            pixel_ratio: 1.0,
            is_touch: false,
        })
    };
    let command = match verb {
        "next" => DriverCommand::Viewer(ViewerCommand::NextPage),
        "prev" => DriverCommand::Viewer(ViewerCommand::PreviousPage),
        "goto" => {
            let page = argument
                .ok_or_else(|| anyhow!("goto needs a page number"))?
                .parse()
                .with_context(|| format!("Bad page number in {line:?}"))?;
            DriverCommand::Viewer(ViewerCommand::GoToPage { page })
        }
        "zoom+" => DriverCommand::Viewer(ViewerCommand::ZoomIn),
        "zoom-" => DriverCommand::Viewer(ViewerCommand::ZoomOut),
        "mark" => DriverCommand::Viewer(ViewerCommand::ToggleBookmark),
        "touch" => DriverCommand::Viewer(ViewerCommand::Activity),
        "show" => DriverCommand::Viewer(ViewerCommand::GetSnapshot),
        "resize" => DriverCommand::Resize(viewport(argument)?),
        "rotate" => DriverCommand::Rotate(viewport(argument)?),
        "stats" => DriverCommand::Stats,
        "log" => DriverCommand::Log,
        "quit" | "exit" => DriverCommand::Quit,
        other => bail!("Unknown command {other:?}"),
    };
    Ok(command)
}

fn init_tracing() -> ReloadHandle {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (filter_layer, handle) = reload::Layer::new(env_filter);
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(filter_layer),
        )
        .init();
    handle
}

fn set_log_level(handle: &ReloadHandle, level: &str) {
    let parsed = EnvFilter::builder()
        .parse(level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if let Err(err) = handle.modify(|filter| *filter = parsed) {
        warn!(%level, "Failed to update log level from config: {err}");
    } else {
        info!(%level, "Applied log level from config");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_driver_commands() {
        assert_eq!(
            parse_command("goto 12").expect("goto"),
            DriverCommand::Viewer(ViewerCommand::GoToPage { page: 12 })
        );
        assert_eq!(
            parse_command("  zoom+ ").expect("zoom"),
            DriverCommand::Viewer(ViewerCommand::ZoomIn)
        );
        assert_eq!(parse_command("quit").expect("quit"), DriverCommand::Quit);
        match parse_command("rotate 800x1280").expect("rotate") {
            DriverCommand::Rotate(signals) => assert_eq!((signals.width, signals.height), (800, 1280)),
            other => panic!("unexpected {other:?}"),
        }
        assert!(parse_command("goto").is_err());
        assert!(parse_command("goto five").is_err());
        assert!(parse_command("fly").is_err());
    }

    #[test]
    fn parses_arguments() {
        let dir = tempfile::tempdir().expect("tempdir");
        let book = dir.path().join("book.txt");
        std::fs::write(&book, "text").expect("write");

        let args = parse_args(
            [
                book.display().to_string(),
                "--viewport".into(),
                "390x844".into(),
                "--touch".into(),
            ]
            .into_iter(),
        )
        .expect("args");
        assert_eq!(args.book_path, book);
        assert_eq!((args.viewport.width, args.viewport.height), (390, 844));
        assert!(args.viewport.is_touch);
        assert_eq!(args.config_path, PathBuf::from("conf/config.toml"));

        assert!(parse_args(Vec::<String>::new()).is_err());
        assert!(parse_args(["missing.txt".to_string()]).is_err());
    }
}
