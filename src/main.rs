use anyhow::{anyhow, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use yt_feed_filter::extract::parse_duration_to_seconds;
use yt_feed_filter::monitor::{self, FeedMonitor};
use yt_feed_filter::settings::{
    watch_settings_file, ConfigGateway, FilterSettings, MemorySettingsStore, SettingsStore,
    TomlSettingsStore,
};
use yt_feed_filter::{ActiveConfig, AppConfig, CardRow, Page, PageEdit, ScanDriver};

const SNAPSHOT_URL: &str = "https://www.youtube.com/";

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    let verbose = matches.get_flag("verbose");

    // Initialize logging
    let default_filter = if verbose {
        "yt_feed_filter=debug,ytf=debug,info"
    } else {
        "yt_feed_filter=info,warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    // Load configuration
    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::load().unwrap_or_else(|e| {
            warn!("Failed to load config, using defaults: {}", e);
            AppConfig::default()
        }),
    };
    config.validate()?;
    if verbose {
        info!("{}", config.summary());
    }

    match matches.subcommand() {
        Some(("scan", sub)) => run_scan(&config, sub).await,
        Some(("diagnose", sub)) => run_diagnose(sub).await,
        Some(("parse-duration", sub)) => {
            let text = sub
                .get_one::<String>("text")
                .ok_or_else(|| anyhow!("missing duration text"))?;
            match parse_duration_to_seconds(text) {
                Some(seconds) => println!("{}", seconds),
                None => println!("unknown"),
            }
            Ok(())
        }
        Some(("replay", sub)) => run_replay(&config, sub).await,
        _ => Err(anyhow!("No subcommand given")),
    }
}

fn cli() -> Command {
    let files = Arg::new("files")
        .value_name("FILE")
        .help("HTML snapshot of feed markup")
        .num_args(1..)
        .required(true)
        .value_parser(clap::value_parser!(PathBuf));
    let settings = Arg::new("settings")
        .short('s')
        .long("settings")
        .value_name("PATH")
        .help("TOML file with a [ytf_settings] table")
        .value_parser(clap::value_parser!(PathBuf));

    Command::new("YouTube Feed Filter")
        .version(env!("CARGO_PKG_VERSION"))
        .author("TigreRoll")
        .about("Classify, hide, dim and order video feed cards")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .global(true)
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("Application config file")
                .global(true)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .subcommand(
            Command::new("scan")
                .about("Run one scan pass over snapshot files and print every card")
                .arg(files.clone())
                .arg(settings.clone())
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print cards as JSON")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("diagnose")
                .about("Show how the page contract matches a snapshot")
                .arg(
                    Arg::new("file")
                        .value_name("FILE")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf)),
                ),
        )
        .subcommand(
            Command::new("parse-duration")
                .about("Parse a duration badge into seconds")
                .arg(Arg::new("text").value_name("TEXT").required(true)),
        )
        .subcommand(
            Command::new("replay")
                .about("Feed snapshot files to a live monitor as infinite-scroll appends")
                .arg(files)
                .arg(settings)
                .arg(
                    Arg::new("step-ms")
                        .long("step-ms")
                        .value_name("MS")
                        .help("Delay between appended sections")
                        .default_value("300")
                        .value_parser(clap::value_parser!(u64)),
                ),
        )
}

fn settings_store(config: &AppConfig, sub: &ArgMatches) -> Arc<dyn SettingsStore> {
    match settings_path(config, sub) {
        Some(path) => Arc::new(TomlSettingsStore::new(path)),
        None => Arc::new(MemorySettingsStore::default()),
    }
}

/// `--settings` wins over the application config
fn settings_path<'a>(config: &'a AppConfig, sub: &'a ArgMatches) -> Option<&'a PathBuf> {
    sub.get_one::<PathBuf>("settings").or(config.settings.path.as_ref())
}

async fn load_page(files: &[PathBuf]) -> Result<Page> {
    let mut page = Page::new(SNAPSHOT_URL);
    for file in files {
        page.append_section(&read_snapshot(file).await?);
    }
    Ok(page)
}

async fn read_snapshot(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| anyhow!("Cannot read snapshot {}: {}", path.display(), e))
}

fn file_args(sub: &ArgMatches) -> Vec<PathBuf> {
    sub.get_many::<PathBuf>("files")
        .map(|files| files.cloned().collect())
        .unwrap_or_default()
}

async fn run_scan(config: &AppConfig, sub: &ArgMatches) -> Result<()> {
    let gateway = ConfigGateway::new(settings_store(config, sub));
    let settings = gateway.load_configuration().await;
    let mut page = load_page(&file_args(sub)).await?;

    let mut driver = ScanDriver::standard()?;
    let start_time = std::time::Instant::now();
    let report = driver.scan(&mut page, &ActiveConfig::new(settings))?;
    let rows = driver.rows(&page);

    if sub.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print_rows(&rows);
    }

    info!(
        "🎉 Scanned {} cards in {:.2}ms: {} filtered, {} watched",
        report.total_cards,
        start_time.elapsed().as_secs_f64() * 1000.0,
        report.suppressed,
        report.dimmed
    );
    Ok(())
}

async fn run_diagnose(sub: &ArgMatches) -> Result<()> {
    let file = sub
        .get_one::<PathBuf>("file")
        .ok_or_else(|| anyhow!("missing snapshot file"))?;
    let page = load_page(std::slice::from_ref(file)).await?;
    let driver = ScanDriver::standard()?;
    println!("{}", serde_json::to_string_pretty(&driver.diagnose(&page))?);
    Ok(())
}

async fn run_replay(config: &AppConfig, sub: &ArgMatches) -> Result<()> {
    let gateway = ConfigGateway::new(settings_store(config, sub));
    let settings: FilterSettings = gateway.load_configuration().await;
    let step = Duration::from_millis(sub.get_one::<u64>("step-ms").copied().unwrap_or(300));
    let timings = config.monitor.timings();
    let files = file_args(sub);
    let watched_path = settings_path(config, sub).cloned();
    let poll_interval = config.settings.poll_interval();

    let local = tokio::task::LocalSet::new();
    let rows = local
        .run_until(async move {
            let monitor =
                FeedMonitor::new(Page::new(SNAPSHOT_URL), ScanDriver::standard()?, settings)
                    .with_timings(timings)
                    .with_defaults(gateway.defaults().clone());
            let (handle, task) = monitor::spawn(monitor);

            let watcher = watched_path.map(|path| {
                let (changes, watch_task) =
                    watch_settings_file(TomlSettingsStore::new(path), poll_interval);
                (watch_task, monitor::forward_settings(handle.clone(), changes))
            });

            for file in &files {
                tokio::time::sleep(step).await;
                let html = read_snapshot(file).await?;
                handle.send(PageEdit::Append(html)).await?;
                info!("📥 Appended {}", file.display());
            }

            // Let the trailing debounce and any settle scan run.
            tokio::time::sleep(timings.debounce + timings.settle).await;
            let rows = handle.rows().await?;
            let snapshot = handle.snapshot().await?;
            info!(
                "📊 {} scans, {} resets, {} cards",
                snapshot.stats.scans, snapshot.stats.resets, snapshot.total_cards
            );

            if let Some((watch_task, forward_task)) = watcher {
                watch_task.abort();
                forward_task.abort();
            }
            task.shutdown().await?;
            Ok::<Vec<CardRow>, anyhow::Error>(rows)
        })
        .await?;

    print_rows(&rows);
    Ok(())
}

fn print_rows(rows: &[CardRow]) {
    for row in rows {
        println!(
            "{:<8} {:<17} {:>8} {:<14} {:>5}  {}",
            row.disposition.label(),
            row.disposition.reason().map(|r| r.as_str()).unwrap_or("-"),
            row.duration_text.as_deref().unwrap_or("?"),
            row.watched,
            row.order.map(|o| o.to_string()).unwrap_or_else(|| "-".to_string()),
            row.title
        );
    }
}
