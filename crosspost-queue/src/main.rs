//! crosspost-queue - Manage the publish queue
//!
//! Unix-style tool for inspecting and adjusting queued publish entries.

use clap::{Parser, Subcommand};
use libcrosspost::types::EntryStatus;
use libcrosspost::{Config, CrosspostError, Database, Result};

#[derive(Parser, Debug)]
#[command(name = "crosspost-queue")]
#[command(version)]
#[command(about = "Manage queued publish entries")]
#[command(long_about = "\
crosspost-queue - Manage queued publish entries

DESCRIPTION:
    crosspost-queue inspects and adjusts the per-platform publish queue.
    Use it to list open entries, cancel pending ones, reschedule, or view
    queue statistics.

COMMANDS:
    list        List open (pending or in-flight) entries
    cancel      Cancel a pending entry
    reschedule  Move a pending entry to a different time
    stats       Show per-status entry counts

USAGE EXAMPLES:
    # List open entries
    crosspost-queue list

    # List in JSON
    crosspost-queue list --format json

    # Cancel a pending entry
    crosspost-queue cancel 42

    # Reschedule an entry
    crosspost-queue reschedule 42 \"tomorrow 3pm\"
    crosspost-queue reschedule 42 2h

    # View statistics
    crosspost-queue stats

CONFIGURATION:
    Configuration file: ~/.config/crosspost/config.toml
    Override with the CROSSPOST_CONFIG environment variable.

EXIT CODES:
    0 - Success
    1 - Operation failed
    2 - Database or configuration error
    3 - Invalid input (bad entry id, time format, etc.)
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List open entries
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Filter by platform
        #[arg(short, long)]
        platform: Option<String>,
    },

    /// Cancel a pending entry
    Cancel {
        /// Entry id to cancel
        entry_id: i64,
    },

    /// Reschedule a pending entry
    Reschedule {
        /// Entry id to reschedule
        entry_id: i64,

        /// New time (e.g. "tomorrow 3pm", "2h")
        time: String,
    },

    /// Show queue statistics
    Stats {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    libcrosspost::logging::init_default(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::new(&config.database.path).await?;

    match cli.command {
        Commands::List { format, platform } => cmd_list(&db, &format, platform.as_deref()).await,
        Commands::Cancel { entry_id } => cmd_cancel(&db, entry_id).await,
        Commands::Reschedule { entry_id, time } => cmd_reschedule(&db, entry_id, &time).await,
        Commands::Stats { format } => cmd_stats(&db, &format).await,
    }
}

fn check_format(format: &str) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(CrosspostError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        )));
    }
    Ok(())
}

async fn cmd_list(db: &Database, format: &str, platform: Option<&str>) -> Result<()> {
    check_format(format)?;

    let mut entries = db.list_open_entries(200).await?;
    if let Some(platform) = platform {
        entries.retain(|e| e.platform.as_str() == platform);
    }

    if format == "json" {
        let rows: Vec<serde_json::Value> = entries
            .iter()
            .map(|e| {
                serde_json::json!({
                    "id": e.id,
                    "post_id": e.post_id,
                    "platform": e.platform,
                    "status": e.status,
                    "process_after": e.process_after,
                    "attempts": e.attempts,
                    "last_error": e.last_error,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows).unwrap());
        return Ok(());
    }

    let now = chrono::Utc::now().timestamp();
    for entry in &entries {
        let preview = match db.get_post(&entry.post_id).await? {
            Some(post) => truncate_content(&post.content, 40),
            None => "<missing post>".to_string(),
        };
        println!(
            "{} | {} | {} | {} | {}",
            entry.id,
            entry.platform,
            entry.status.as_str(),
            format_time_until(now, entry.process_after),
            preview
        );
    }

    Ok(())
}

async fn cmd_cancel(db: &Database, entry_id: i64) -> Result<()> {
    let entry = db.get_entry(entry_id).await?.ok_or_else(|| {
        CrosspostError::InvalidInput(format!("No queue entry with id {}", entry_id))
    })?;

    if !db.cancel_entry(entry_id).await? {
        let reason = match entry.status {
            EntryStatus::InFlight => "it is in flight; it will run to completion",
            _ => "it is already terminal",
        };
        return Err(CrosspostError::InvalidInput(format!(
            "Cannot cancel entry {}: {}",
            entry_id, reason
        )));
    }

    db.recompute_post_status(&entry.post_id).await?;
    println!("Cancelled entry {}", entry_id);
    Ok(())
}

async fn cmd_reschedule(db: &Database, entry_id: i64, time: &str) -> Result<()> {
    let when = libcrosspost::scheduling::parse_schedule(time)?;

    if !db.reschedule_entry(entry_id, when.timestamp()).await? {
        return Err(CrosspostError::InvalidInput(format!(
            "Cannot reschedule entry {}: not found or not pending",
            entry_id
        )));
    }

    println!("Entry {} rescheduled for {}", entry_id, when.to_rfc3339());
    Ok(())
}

async fn cmd_stats(db: &Database, format: &str) -> Result<()> {
    check_format(format)?;
    let stats = db.queue_stats().await?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&stats).unwrap());
    } else {
        println!("pending:    {}", stats.pending);
        println!("in flight:  {}", stats.in_flight);
        println!("succeeded:  {}", stats.succeeded);
        println!("failed:     {}", stats.failed);
        println!("abandoned:  {}", stats.abandoned);
    }

    Ok(())
}

/// Truncate content to max length with ellipsis
fn truncate_content(content: &str, max_len: usize) -> String {
    if content.chars().count() <= max_len {
        content.to_string()
    } else {
        let truncated: String = content.chars().take(max_len).collect();
        format!("{}...", truncated)
    }
}

/// Human-friendly "in 5m" / "overdue 2h" rendering
fn format_time_until(now: i64, when: i64) -> String {
    let delta = when - now;
    let (magnitude, suffix) = if delta >= 0 {
        (delta, "")
    } else {
        (-delta, " overdue")
    };

    let rendered = if magnitude < 60 {
        format!("{}s", magnitude)
    } else if magnitude < 3600 {
        format!("{}m", magnitude / 60)
    } else if magnitude < 86_400 {
        format!("{}h", magnitude / 3600)
    } else {
        format!("{}d", magnitude / 86_400)
    };

    if delta >= 0 {
        format!("in {}", rendered)
    } else {
        format!("{}{}", rendered, suffix)
    }
}
