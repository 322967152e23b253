//! Wearable Activity Agent CLI
//!
//! Runs the two-sensor classification pipeline over recorded sessions and
//! reports on what it stored.

use anyhow::{anyhow, Context};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wearable_activity_agent::{
    history, model,
    sink::read_records,
    source::Pace,
    stats::create_shared_stats_with_persistence,
    Config, JsonlStore, Pipeline, RecordingSource, VERSION,
};

#[derive(Parser)]
#[command(name = "activity-agent")]
#[command(version = VERSION)]
#[command(about = "Two-sensor activity and respiratory classification", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline over a recorded session
    Replay {
        /// JSON-lines recording of primary and secondary samples
        #[arg(long, short)]
        recording: PathBuf,

        /// Deliver samples at their recorded pace instead of as fast as possible
        #[arg(long)]
        realtime: bool,
    },

    /// Summarize stored events for one day
    History {
        /// Local date (YYYY-MM-DD), defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Show models, store and cumulative statistics
    Status,

    /// Show configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            recording,
            realtime,
        } => cmd_replay(recording, realtime),
        Commands::History { date } => cmd_history(date),
        Commands::Status => cmd_status(),
        Commands::Config => cmd_config(),
    }
}

fn cmd_replay(recording_path: PathBuf, realtime: bool) -> anyhow::Result<()> {
    println!("Wearable Activity Agent v{VERSION}");
    println!();

    let config = Config::load().context("loading configuration")?;
    if let Err(e) = config.ensure_directories() {
        warn!(error = %e, "could not create data directories");
    }

    let models = model::load_cascade(&config.models).context("loading models")?;
    let recording = RecordingSource::from_path(&recording_path)
        .with_context(|| format!("reading recording {}", recording_path.display()))?;
    let store = JsonlStore::open(&config.store_path)
        .with_context(|| format!("opening event store {}", config.store_path.display()))?;
    let stats = create_shared_stats_with_persistence(config.stats_path());

    println!("Recording: {}", recording_path.display());
    println!(
        "  Primary samples: {}, secondary samples: {}",
        recording.primary_count(),
        recording.secondary_count()
    );
    if recording.skipped_lines() > 0 {
        println!("  Skipped lines: {}", recording.skipped_lines());
    }
    println!("  Event store: {}", config.store_path.display());
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let pace = if realtime {
        Pace::RealTime
    } else {
        Pace::Unthrottled
    };
    let mut builder = Pipeline::builder().settings(&config);
    if pace == Pace::Unthrottled {
        // Keep both lanes within a sample of the merged timeline.
        builder = builder.lane_queue_capacity(1);
    }

    let handle = builder
        .models(models)
        .store(store)
        .stats(stats.clone())
        .display(|event| {
            println!(
                "[{}] {}: {}",
                event.timestamp.format("%H:%M:%S%.3f"),
                event.kind,
                event.label
            );
        })
        .build()?
        .spawn();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("setting Ctrl+C handler")?;

    let primary = handle
        .primary_sender()
        .ok_or_else(|| anyhow!("primary lane is closed"))?;
    let secondary = handle
        .secondary_sender()
        .ok_or_else(|| anyhow!("secondary lane is closed"))?;
    let report = recording.play_while(primary, secondary, pace, running);
    info!(
        primary = report.primary_delivered,
        secondary = report.secondary_delivered,
        "replay finished"
    );

    let result = handle.shutdown();

    if let Err(e) = stats.save() {
        warn!(error = %e, "could not save pipeline stats");
    }

    println!();
    println!("{}", stats.summary());

    result?;
    Ok(())
}

fn cmd_history(date: Option<NaiveDate>) -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;
    let tz = config.tz();
    let date = date.unwrap_or_else(|| history::local_date(Utc::now(), tz));

    let summary = history::load_day(&config.store_path, date, tz)
        .with_context(|| format!("reading event store {}", config.store_path.display()))?;
    println!("{summary}");
    Ok(())
}

fn cmd_status() -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;

    println!("Wearable Activity Agent Status");
    println!("==============================");
    println!();

    println!("Models:");
    for (name, path) in [
        ("branch", &config.models.branch),
        ("static", &config.models.static_activity),
        ("dynamic", &config.models.dynamic_activity),
        ("secondary_aux", &config.models.secondary_aux),
        ("respiratory", &config.models.respiratory),
    ] {
        let mark = if path.exists() { "✓" } else { "✗ missing" };
        println!("  {name:<14} {} {mark}", path.display());
    }
    println!();

    println!("Configuration:");
    println!("  Debounce dwell: {}ms", config.debounce_dwell.as_millis());
    println!("  Liveness window: {}ms", config.liveness_window.as_millis());
    println!("  Persistence: {:?}", config.persistence);
    println!("  Timezone: {}", config.timezone);
    println!();

    match read_records(&config.store_path) {
        Ok(records) => {
            let committed = records.iter().filter(|r| r.committed).count();
            println!("Event store: {}", config.store_path.display());
            println!("  Records: {} ({committed} committed)", records.len());
        }
        Err(e) => warn!(error = %e, "could not read event store"),
    }
    println!();

    let stats_path = config.stats_path();
    if stats_path.exists() {
        let content = std::fs::read_to_string(&stats_path)?;
        let stats: serde_json::Value = serde_json::from_str(&content)?;
        println!("Cumulative Statistics:");
        for key in [
            "primary_samples",
            "secondary_samples",
            "dropped_samples",
            "classifications",
            "respiratory_skips",
            "committed_events",
            "records_persisted",
            "persist_failures",
        ] {
            if let Some(value) = stats.get(key) {
                println!("  {key}: {value}");
            }
        }
    } else {
        println!("No previous session data found.");
    }
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
