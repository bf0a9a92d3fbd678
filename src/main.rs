use chrono::{DateTime, Local, Utc};
use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ratelens::cache::CacheStore;
use ratelens::cli::{CacheCommands, Cli, Commands};
use ratelens::clock::now_ms;
use ratelens::config::Config;
use ratelens::domain::{CacheEntry, EntityDescriptor, PipelineEvent, Rating, normalize_key, review_url};
use ratelens::fetch::HttpSource;
use ratelens::pipeline::Pipeline;
use ratelens::report::{SortKey, sort_entries};
use ratelens::sink::ChannelSink;
use ratelens::storage::SqliteStore;

fn setup_logging(level: Option<&str>) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ratelens")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("ratelens.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    let env = env_logger::Env::default().default_filter_or(level.unwrap_or("info"));
    env_logger::Builder::from_env(env)
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Enrich {
            file,
            sort,
            desc,
            retry_failed,
        } => handle_enrich_command(file.as_deref(), *sort, *desc, *retry_failed, cli.is_verbose(), config).await,
        Commands::Cache { command } => handle_cache_command(command, config),
    }
}

fn read_descriptors(file: Option<&Path>) -> Result<Vec<EntityDescriptor>> {
    let content = match file {
        Some(path) => fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf).context("Failed to read stdin")?;
            buf
        }
    };
    Ok(content.lines().filter_map(EntityDescriptor::parse_line).collect())
}

fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(&config.cache.path)
        .context(format!("Failed to open cache at {}", config.cache.path.display()))?;
    Ok(Arc::new(store))
}

async fn handle_enrich_command(
    file: Option<&Path>,
    sort: SortKey,
    desc: bool,
    retry_failed: bool,
    verbose: bool,
    config: &Config,
) -> Result<()> {
    let descriptors = read_descriptors(file)?;
    if descriptors.is_empty() {
        println!("{}", "No entities to enrich".yellow());
        return Ok(());
    }
    info!("Enriching {} entities", descriptors.len());

    let pipeline_config = config.pipeline_config();
    let source = HttpSource::new(config.endpoints.clone(), pipeline_config.pacing.fetch_timeout)
        .context("Failed to create HTTP source")?;
    let (sink, mut rx) = ChannelSink::channel();
    let pipeline = Pipeline::new(open_store(config)?, Arc::new(source), Arc::new(sink), pipeline_config)
        .context("Failed to start pipeline")?;

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                PipelineEvent::Progress(p) => eprint!("\r{} {}/{}", "Progress:".cyan(), p.completed, p.total),
                PipelineEvent::ItemResolved { key, patch } if verbose => {
                    if let Some(rating) = patch.rating {
                        eprintln!("\r{}: {}", key, rating);
                    }
                }
                _ => {}
            }
        }
    });

    pipeline.scan(&descriptors);
    pipeline.wait_idle().await;

    if retry_failed {
        let requeued = pipeline.sweep();
        if requeued > 0 {
            eprintln!("\r{} {} failed lookups", "Retrying".yellow(), requeued);
            pipeline.wait_idle().await;
        }
    }
    printer.abort();
    eprintln!();

    let mut entries: Vec<CacheEntry> = pipeline
        .discovery()
        .known_keys()
        .iter()
        .filter_map(|key| pipeline.cache().get(key))
        .collect();
    sort_entries(&mut entries, sort, desc);
    print_table(&entries, verbose);

    let stats = pipeline.client().stats();
    info!(
        "Session done: {} rating calls, {} batch pauses, {} refusals",
        stats.rating_calls, stats.batch_pauses, stats.forbidden
    );
    Ok(())
}

fn handle_cache_command(command: &CacheCommands, config: &Config) -> Result<()> {
    info!("Handling cache command: {:?}", command);
    let cache = CacheStore::open(open_store(config)?, config.ttl()).context("Failed to load cache")?;

    match command {
        CacheCommands::List { sort, desc } => {
            let mut entries = cache.entries_sorted();
            if entries.is_empty() {
                println!("{}", "Cache is empty".yellow());
                return Ok(());
            }
            sort_entries(&mut entries, *sort, *desc);
            print_table(&entries, false);
        }
        CacheCommands::Show { name } => {
            let key = normalize_key(name);
            match cache.get(&key) {
                Some(entry) => print_entry(&entry),
                None => println!("{} {}", "Not cached:".yellow(), key),
            }
        }
        CacheCommands::Expire { name } => {
            let key = normalize_key(name);
            if cache.force_expire(&key)? {
                println!("{} {}", "Expired:".green(), key);
            } else {
                println!("{} {}", "Not cached:".yellow(), key);
            }
        }
        CacheCommands::Reset => {
            let count = cache.len();
            cache.clear()?;
            println!("{} {} entries", "Cleared".green(), count);
        }
    }
    Ok(())
}

fn format_rating(rating: Option<Rating>) -> ColoredString {
    match rating {
        Some(Rating::Score(score)) if score >= 4.0 => format!("{:.1}", score).green(),
        Some(Rating::Score(score)) if score >= 3.0 => format!("{:.1}", score).yellow(),
        Some(Rating::Score(score)) => format!("{:.1}", score).red(),
        Some(sentinel) => sentinel.to_string().dimmed(),
        None => "-".dimmed(),
    }
}

/// Amount in units of 100 million won.
fn format_amount(amount: i64) -> String {
    format!("{:.1}억", amount as f64 / 100_000_000.0)
}

fn format_timestamp(ms: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms as i64)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn print_table(entries: &[CacheEntry], show_links: bool) {
    let width = entries.iter().map(|e| e.key.chars().count()).max().unwrap_or(4).max(4);
    println!(
        "{:<width$}  {:>11}  {:>10}  {:>10}  {:>10}  {}",
        "Name".bold(),
        "Rating".bold(),
        "Revenue".bold(),
        "Op. income".bold(),
        "Net income".bold(),
        "Year".bold(),
        width = width
    );

    for entry in entries {
        let (revenue, operating, net, year) = match &entry.financial {
            Some(f) => (
                format_amount(f.revenue),
                format_amount(f.operating_income),
                format_amount(f.net_income),
                f.period_label.clone(),
            ),
            None => ("-".to_string(), "-".to_string(), "-".to_string(), String::new()),
        };
        println!(
            "{:<width$}  {:>11}  {:>10}  {:>10}  {:>10}  {}",
            entry.key,
            format_rating(entry.rating),
            revenue,
            operating,
            net,
            year,
            width = width
        );
        if show_links {
            println!("  {}", review_url(&entry.key).dimmed());
        }
    }
}

fn print_entry(entry: &CacheEntry) {
    let now = now_ms();
    println!("{} {}", "Name:".bold(), entry.key);
    println!("{} {}", "Rating:".bold(), format_rating(entry.rating));
    match entry.expires_at {
        Some(at) if entry.is_expired(now) => println!("{} {} (expired)", "Expires:".bold(), format_timestamp(at)),
        Some(at) => println!("{} {}", "Expires:".bold(), format_timestamp(at)),
        None => println!("{} -", "Expires:".bold()),
    }
    println!("{} {}", "External ref:".bold(), entry.external_ref.as_deref().unwrap_or("-"));
    if let Some(f) = &entry.financial {
        println!(
            "{} {} revenue {}, operating income {}, net income {}",
            "Financials:".bold(),
            f.period_label,
            format_amount(f.revenue),
            format_amount(f.operating_income),
            format_amount(f.net_income)
        );
    }
    println!("{} {}", "Updated:".bold(), format_timestamp(entry.updated_at));
    println!("{} {}", "Reviews:".bold(), review_url(&entry.key));
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging once the configured level is known
    setup_logging(config.log_level.as_deref()).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}
