//! CLI entry point for `mailsift`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailsift::config::{self, Config, OnMalformed};
use mailsift::ingest::listeners::{ClassificationTally, LogListener};
use mailsift::ingest::{DedupEngine, ImportOptions, Importer, SenderPolicy};
use mailsift::source;
use mailsift::{Catalog, EmailStore, StoredEmail};

#[derive(Parser)]
#[command(
    name = "mailsift",
    version,
    about = "Import, deduplicate and classify email messages"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Record store file (defaults to the data directory)
    #[arg(long, global = true, value_name = "PATH", env = "MAILSIFT_STORE")]
    store: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Import .eml/.mbox files or directories into the store
    Import {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Processing ID to attach to every imported message
        #[arg(long)]
        pid: Option<String>,
        /// Skip malformed messages instead of aborting the batch
        #[arg(long)]
        skip_malformed: bool,
        /// Template catalog; prints a per-type tally of accepted messages
        #[arg(long)]
        catalog: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Show one stored message
    Show {
        message_id: String,
        /// Print the HTML alternative instead of the text
        #[arg(long)]
        html: bool,
        #[arg(long)]
        json: bool,
    },
    /// List stored messages
    List {
        #[arg(long)]
        json: bool,
    },
    /// Print every processing ID in the store
    Pids,
    /// Classify one or all stored messages
    Classify {
        message_id: Option<String>,
        #[arg(long)]
        catalog: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Show store statistics
    Stats {
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Print the effective configuration as TOML
    Config {
        /// Write it to the config file instead
        #[arg(long)]
        init: bool,
    },
    /// Generate a man page
    Manpage,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    let store_path = cli
        .store
        .clone()
        .unwrap_or_else(|| config::store_path(&config));

    match cli.command {
        Commands::Import {
            paths,
            pid,
            skip_malformed,
            catalog,
            json,
        } => cmd_import(
            &config,
            &store_path,
            &paths,
            pid.or_else(|| config.import.default_pid.clone()),
            skip_malformed,
            catalog.as_deref(),
            json,
        ),
        Commands::Show {
            message_id,
            html,
            json,
        } => cmd_show(&store_path, &message_id, html, json),
        Commands::List { json } => cmd_list(&store_path, json),
        Commands::Pids => cmd_pids(&store_path),
        Commands::Classify {
            message_id,
            catalog,
            json,
        } => cmd_classify(
            &config,
            &store_path,
            message_id.as_deref(),
            catalog.as_deref(),
            json,
        ),
        Commands::Stats { json } => cmd_stats(&store_path, json),
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Config { init } => cmd_config(&config, init),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let log_path = config::log_file_path(config);
    let log_dir = config::cache_dir(config);
    let log_name = log_path.file_name().unwrap_or_default();
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, log_name);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailsift", &mut std::io::stdout());
    Ok(())
}

/// Print the configuration in effect, or save it with `--init`.
fn cmd_config(config: &Config, init: bool) -> anyhow::Result<()> {
    if init {
        let path = config::save_config(config)?;
        println!("Wrote {}", path.display());
        println!("Log file: {}", config::log_file_path(config).display());
        return Ok(());
    }
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Catalog from the command line, else from the config file.
fn load_catalog(config: &Config, explicit: Option<&Path>) -> anyhow::Result<Option<Catalog>> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| config.classifier.catalog.clone());
    match path {
        Some(path) => Ok(Some(Catalog::load(&path)?)),
        None => Ok(None),
    }
}

/// Import files into the store and print the outcome counters.
fn cmd_import(
    config: &Config,
    store_path: &Path,
    paths: &[PathBuf],
    pid: Option<String>,
    skip_malformed: bool,
    catalog: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let files = source::collect_paths(paths)?;
    let total_bytes: u64 = files
        .iter()
        .filter_map(|f| std::fs::metadata(f).ok())
        .map(|m| m.len())
        .sum();

    let mut options = ImportOptions::from(&config.import);
    if skip_malformed {
        options.on_malformed = OnMalformed::Skip;
    }

    let engine = DedupEngine::new(SenderPolicy::from_config(&config.policy));
    let mut importer = Importer::new(engine).with_options(options);
    importer.register(LogListener::factory());

    let tally = match load_catalog(config, catalog)? {
        Some(catalog) => {
            let (factory, handle) = ClassificationTally::factory(Arc::new(catalog));
            importer.register(factory);
            Some(handle)
        }
        None => None,
    };

    let mut store = EmailStore::open(store_path)?;

    let pb = ProgressBar::new(total_bytes);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} Importing [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg} ({eta})",
            )
            .expect("valid template")
            .progress_chars("#>-"),
    );

    let normalize = config.import.normalize_newlines;
    let messages = source::open_paths(files.clone()).map(|message| {
        message.map(|m| {
            pb.inc(m.contents.len() as u64);
            let m = if normalize { m.normalized() } else { m };
            match &pid {
                Some(pid) => m.with_processing_id(pid.clone()),
                None => m,
            }
        })
    });

    let start = Instant::now();
    let stats = importer.import_stream(
        &mut store,
        messages,
        Some(&|processed| pb.set_message(format!("{processed} messages"))),
    );
    pb.finish_and_clear();
    let stats = stats?;
    let elapsed = start.elapsed();

    let tally = tally
        .map(|handle| handle.lock().map(|t| t.clone()).unwrap_or_default())
        .unwrap_or_default();

    if json {
        let output = serde_json::json!({
            "files": files.len(),
            "stats": stats,
            "classifications": tally,
            "elapsed_ms": elapsed.as_millis(),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!();
    println!("  {:<20} {}", "Files", files.len());
    println!("  {:<20} {}", "Inserted", stats.inserted);
    println!("  {:<20} {}", "Replaced", stats.replaced);
    println!("  {:<20} {}", "Retained", stats.retained);
    println!("  {:<20} {}", "Ignored", stats.ignored);
    if stats.failed > 0 {
        println!("  {:<20} {}", "Failed", stats.failed);
    }
    println!("  {:<20} {:.2?}", "Time", elapsed);
    if !tally.is_empty() {
        println!();
        println!("  Classifications:");
        for (kind, count) in &tally {
            println!("    {count:>6}  {kind}");
        }
    }
    println!();
    Ok(())
}

/// Print headers and the decoded body of one stored message.
fn cmd_show(store_path: &Path, id: &str, html: bool, json: bool) -> anyhow::Result<()> {
    let store = EmailStore::open(store_path)?;
    let record = store.get(id)?;
    let email = record.email();

    let content_type = if html { "text/html" } else { "text/plain" };
    let body = match email.body_for(content_type)? {
        Some(body) => body,
        // No plain alternative: fall back to the rendered HTML
        None if !html => email
            .document()?
            .map(|doc| doc.text().to_string())
            .unwrap_or_default(),
        None => String::new(),
    };

    if json {
        let output = serde_json::json!({
            "record": record,
            "content_type": content_type,
            "body": body,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for header in &record.headers {
        println!("{}: {}", header.name, header.value);
    }
    println!();
    println!("{body}");
    Ok(())
}

/// Records ordered by import time, then Message-ID.
fn sorted_records(store: &EmailStore) -> Vec<&StoredEmail> {
    let mut records: Vec<&StoredEmail> = store.records().collect();
    records.sort_by(|a, b| a.ts.cmp(&b.ts).then_with(|| a.id.cmp(&b.id)));
    records
}

fn format_ts(ts: i64) -> String {
    chrono::DateTime::from_timestamp_millis(ts)
        .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

/// List stored records.
fn cmd_list(store_path: &Path, json: bool) -> anyhow::Result<()> {
    let store = EmailStore::open(store_path)?;
    let records = sorted_records(&store);

    if json {
        let items: Vec<serde_json::Value> = records
            .iter()
            .map(|r| {
                serde_json::json!({
                    "id": r.id,
                    "filename": r.filename,
                    "ts": r.ts,
                    "subject": r.subject(),
                    "pids": r.pids,
                    "hops": r.hop_count(),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    println!();
    println!("  {} record(s)", records.len());
    println!();
    if records.is_empty() {
        return Ok(());
    }

    println!(
        "  {:<17} {:<36} {:<20} {:<40}",
        "Imported", "Message-ID", "File", "Subject"
    );
    println!("  {}", "-".repeat(116));
    for record in records {
        let id: String = record.id.chars().take(35).collect();
        let file: String = record.filename.chars().take(19).collect();
        let subject: String = record.subject().chars().take(39).collect();
        println!(
            "  {:<17} {:<36} {:<20} {:<40}",
            format_ts(record.ts),
            id,
            file,
            subject
        );
    }
    println!();
    Ok(())
}

/// Print the union of all processing IDs.
fn cmd_pids(store_path: &Path) -> anyhow::Result<()> {
    let store = EmailStore::open(store_path)?;
    for pid in store.all_pids() {
        println!("{pid}");
    }
    Ok(())
}

/// Classify one or every stored record.
fn cmd_classify(
    config: &Config,
    store_path: &Path,
    id: Option<&str>,
    catalog: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let Some(catalog) = load_catalog(config, catalog)? else {
        anyhow::bail!("No template catalog given (use --catalog or [classifier].catalog)");
    };
    let store = EmailStore::open(store_path)?;

    let records = match id {
        Some(id) => vec![store.get(id)?],
        None => sorted_records(&store),
    };

    let results: Vec<(&StoredEmail, Result<mailsift::Classification, mailsift::ClassifyError>)> =
        records
            .into_iter()
            .map(|record| (record, record.email().classify(&catalog)))
            .collect();

    if json {
        let items: Vec<serde_json::Value> = results
            .iter()
            .map(|(record, result)| match result {
                Ok(classification) => serde_json::json!({
                    "id": record.id,
                    "classification": classification,
                }),
                Err(e) => serde_json::json!({
                    "id": record.id,
                    "error": e.to_string(),
                }),
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    for (record, result) in &results {
        match result {
            Ok(classification) => println!("  {:<40} {}", record.id, classification),
            Err(e) => println!("  {:<40} ! {}", record.id, e),
        }
    }
    Ok(())
}

/// Show store statistics.
fn cmd_stats(store_path: &Path, json: bool) -> anyhow::Result<()> {
    use humansize::{format_size, BINARY};

    let store = EmailStore::open(store_path)?;
    let file_size = std::fs::metadata(store_path).map(|m| m.len()).unwrap_or(0);
    let pid_count = store.all_pids().len();
    let oldest = store.records().map(|r| r.ts).min();
    let newest = store.records().map(|r| r.ts).max();

    if json {
        let stats = serde_json::json!({
            "store": store_path.to_string_lossy(),
            "store_size": file_size,
            "record_count": store.len(),
            "pid_count": pid_count,
            "first_import_ms": oldest,
            "last_import_ms": newest,
        });
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!();
    println!("  {:<20} {}", "Store", store_path.display());
    println!("  {:<20} {}", "Store size", format_size(file_size, BINARY));
    println!("  {:<20} {}", "Records", store.len());
    println!("  {:<20} {}", "Processing IDs", pid_count);
    if let (Some(oldest), Some(newest)) = (oldest, newest) {
        println!(
            "  {:<20} {} to {}",
            "Imported",
            format_ts(oldest),
            format_ts(newest)
        );
    }
    println!();
    Ok(())
}
