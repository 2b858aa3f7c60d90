//! reel-queue - Manage scheduled reels
//!
//! Unix-style tool for the scheduled post queue: add, list, publish now,
//! reschedule, cancel and view statistics.

use clap::{Parser, Subcommand};
use libreelcast::logging::{format_from_env, LoggingConfig};
use libreelcast::scheduling::{format_timestamp, parse_schedule};
use libreelcast::{
    Config, Database, Media, NewPost, Post, PostQueue, PostRepository, PostStatus, ReelcastError,
    Result, Scheduler,
};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "reel-queue")]
#[command(version)]
#[command(about = "Manage scheduled reels")]
#[command(long_about = "\
reel-queue - Manage scheduled reels

DESCRIPTION:
    reel-queue is a Unix-style tool for managing the Reelcast queue.
    Use it to schedule reels, inspect the queue, publish a reel right away,
    move or cancel a scheduled reel, or view queue statistics.

COMMANDS:
    add         Schedule a new reel
    list        List posts (scheduled by default)
    now         Publish a scheduled reel immediately
    reschedule  Move a scheduled reel to a different time
    cancel      Cancel a scheduled reel
    stats       Show queue statistics

USAGE EXAMPLES:
    # Schedule a reel
    reel-queue add \"Sunset timelapse\" --media ~/videos/sunset.mp4 --at \"tomorrow 6pm\"

    # List scheduled posts as JSON
    reel-queue list --format json

    # List failed posts
    reel-queue list --status failed

    # Publish a scheduled reel now
    reel-queue now <POST_ID>

    # Reschedule a reel
    reel-queue reschedule <POST_ID> \"2h\"

    # Cancel a reel
    reel-queue cancel <POST_ID>

TIME FORMATS:
    2025-11-20T15:00:00Z   RFC 3339
    2025-11-20 15:00       UTC
    30m, 2h, 1d 6h         From now
    tomorrow 3pm           Natural language

CONFIGURATION:
    Configuration file: ~/.config/reelcast/config.toml
    Database location: ~/.local/share/reelcast/posts.db

    Override with environment variables:
        REELCAST_CONFIG    - Path to config file
        REELCAST_DB_PATH   - Path to database file

EXIT CODES:
    0 - Success
    1 - Publishing failed
    2 - Database or configuration error
    3 - Invalid input (unknown post, bad time format, post not scheduled)
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
    /// Schedule a new reel
    Add {
        /// Reel caption
        caption: String,

        /// Local video file
        #[arg(short, long)]
        media: String,

        /// When to publish (e.g., "tomorrow 3pm", "2h")
        #[arg(short, long)]
        at: String,
    },

    /// List posts
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,

        /// Status to list: scheduled, publishing, published, failed or all
        #[arg(short, long, default_value = "scheduled")]
        status: String,
    },

    /// Publish a scheduled reel immediately
    Now {
        /// Post ID to publish
        post_id: String,
    },

    /// Reschedule a reel
    Reschedule {
        /// Post ID to reschedule
        post_id: String,

        /// New schedule time (e.g., "tomorrow 3pm", "+2h")
        time: String,
    },

    /// Cancel a scheduled reel
    Cancel {
        /// Post ID to cancel
        post_id: Option<String>,

        /// Cancel all scheduled reels
        #[arg(long, conflicts_with = "post_id")]
        all: bool,
    },

    /// Show queue statistics
    Stats {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

/// How a successful command ended
enum Completion {
    Done,
    /// The command ran but the publication it started failed
    PublishFailed,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    LoggingConfig::new(format_from_env(), "error".to_string(), cli.verbose).init();

    match run(cli).await {
        Ok(Completion::Done) => {}
        Ok(Completion::PublishFailed) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<Completion> {
    let config = Config::load()?;

    match cli.command {
        Commands::Add { caption, media, at } => {
            let queue = open_queue(&config).await?;
            cmd_add(&queue, caption, media, &at).await?;
        }
        Commands::List { format, status } => {
            let db = Database::new(&config.database_path()).await?;
            cmd_list(&db, &format, &status).await?;
        }
        Commands::Now { post_id } => {
            let scheduler = Scheduler::from_config(&config).await?;
            return cmd_now(&scheduler, &post_id).await;
        }
        Commands::Reschedule { post_id, time } => {
            let queue = open_queue(&config).await?;
            cmd_reschedule(&queue, &post_id, &time).await?;
        }
        Commands::Cancel { post_id, all } => {
            let queue = open_queue(&config).await?;
            cmd_cancel(&queue, post_id.as_deref(), all).await?;
        }
        Commands::Stats { format } => {
            let db = Database::new(&config.database_path()).await?;
            cmd_stats(&db, &format).await?;
        }
    }

    Ok(Completion::Done)
}

/// Repository-only controls; publishing backends are not configured
async fn open_queue(config: &Config) -> Result<PostQueue> {
    let db = Database::new(&config.database_path()).await?;
    Ok(PostQueue::new(Arc::new(db)))
}

fn validate_format(format: &str) -> Result<()> {
    if format != "text" && format != "json" {
        return Err(ReelcastError::InvalidInput(format!(
            "Invalid format '{}'. Must be 'text' or 'json'",
            format
        )));
    }
    Ok(())
}

/// Schedule a new reel and print its id
async fn cmd_add(queue: &PostQueue, caption: String, media: String, at: &str) -> Result<()> {
    let scheduled_for = parse_schedule(at)?.timestamp();
    let path = libreelcast::config::expand_path(&media);

    if !std::path::Path::new(&path).is_file() {
        return Err(ReelcastError::InvalidInput(format!(
            "Video file not found: {}",
            path
        )));
    }

    let post = queue
        .schedule_post(NewPost {
            caption,
            media: Some(Media::reel(path)),
            scheduled_for: Some(scheduled_for),
        })
        .await?;

    println!("{}", post.id);
    Ok(())
}

/// List posts with the given status
async fn cmd_list(db: &Database, format: &str, status: &str) -> Result<()> {
    validate_format(format)?;

    let mut posts = if status == "all" {
        db.get_all().await?
    } else {
        let status: PostStatus = status.parse().map_err(ReelcastError::InvalidInput)?;
        db.list_by_status(status).await?
    };
    posts.sort_by_key(|p| (p.scheduled_for, p.created_at));

    if format == "json" {
        output_list_json(&posts);
    } else {
        output_list_text(&posts);
    }

    Ok(())
}

fn output_list_json(posts: &[Post]) {
    let json: Vec<serde_json::Value> = posts
        .iter()
        .map(|p| {
            serde_json::json!({
                "id": p.id,
                "status": p.status,
                "caption": p.caption,
                "media": p.reel_path(),
                "scheduled_for": p.scheduled_for,
                "published_at": p.published_at,
                "remote_post_id": p.remote_post_id,
                "remote_url": p.remote_url,
                "error": p.error,
            })
        })
        .collect();

    println!("{:#}", serde_json::Value::Array(json));
}

fn output_list_text(posts: &[Post]) {
    let now = chrono::Utc::now().timestamp();

    for post in posts {
        let caption_preview = truncate_caption(&post.caption, 50);
        let when = match post.status {
            PostStatus::Scheduled => post
                .scheduled_for
                .map(|ts| format_time_until(now, ts))
                .unwrap_or_else(|| "draft".to_string()),
            PostStatus::Published => post
                .remote_url
                .clone()
                .unwrap_or_else(|| "published".to_string()),
            PostStatus::Failed => post.error.clone().unwrap_or_default(),
            PostStatus::Publishing => "publishing".to_string(),
        };

        println!("{} | {} | {} | {}", post.id, post.status, caption_preview, when);
    }
}

/// Truncate to `max_chars` characters with an ellipsis
fn truncate_caption(caption: &str, max_chars: usize) -> String {
    let first_line = caption.lines().next().unwrap_or_default();
    if first_line.chars().count() <= max_chars && first_line.len() == caption.len() {
        return caption.to_string();
    }

    let truncated: String = first_line.chars().take(max_chars).collect();
    format!("{}...", truncated)
}

/// Human-readable time until `scheduled_for`
fn format_time_until(now: i64, scheduled_for: i64) -> String {
    let diff = scheduled_for - now;

    if diff < 0 {
        return "overdue".to_string();
    }

    let minutes = diff / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("in {} day{}", days, if days == 1 { "" } else { "s" })
    } else if hours > 0 {
        format!("in {} hour{}", hours, if hours == 1 { "" } else { "s" })
    } else if minutes > 0 {
        format!("in {} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else {
        "in <1 minute".to_string()
    }
}

/// Publish immediately
async fn cmd_now(scheduler: &Scheduler, post_id: &str) -> Result<Completion> {
    let outcome = scheduler.publish_now(post_id).await?;

    if outcome.success {
        println!(
            "Published {}: {}",
            post_id,
            outcome.post.remote_url.as_deref().unwrap_or_default()
        );
        Ok(Completion::Done)
    } else {
        eprintln!(
            "Failed to publish {}: {}",
            post_id,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
        Ok(Completion::PublishFailed)
    }
}

/// Reschedule a post
async fn cmd_reschedule(queue: &PostQueue, post_id: &str, time: &str) -> Result<()> {
    let scheduled_for = parse_schedule(time)?.timestamp();
    let post = queue.reschedule_post(post_id, scheduled_for).await?;

    println!(
        "Rescheduled {} to {}",
        post.id,
        format_timestamp(post.scheduled_for.unwrap_or(scheduled_for))
    );
    Ok(())
}

/// Cancel one or all scheduled posts
async fn cmd_cancel(queue: &PostQueue, post_id: Option<&str>, all: bool) -> Result<()> {
    if all {
        let scheduled: Vec<Post> = queue
            .repository()
            .get_all()
            .await?
            .into_iter()
            .filter(|p| p.status == PostStatus::Scheduled)
            .collect();

        let mut cancelled = 0;
        for post in scheduled {
            match queue.cancel_scheduled_post(&post.id).await {
                Ok(()) => cancelled += 1,
                // Claimed or removed since it was listed
                Err(ReelcastError::InvalidState { .. }) | Err(ReelcastError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        println!("Cancelled {} scheduled post(s)", cancelled);
        return Ok(());
    }

    let post_id = post_id.ok_or_else(|| {
        ReelcastError::InvalidInput("Provide a post ID or --all".to_string())
    })?;

    queue.cancel_scheduled_post(post_id).await?;
    println!("Cancelled {}", post_id);
    Ok(())
}

/// Show queue statistics
async fn cmd_stats(db: &Database, format: &str) -> Result<()> {
    validate_format(format)?;

    let now = chrono::Utc::now().timestamp();
    let stats = db.stats().await?;
    let upcoming = db.upcoming(now, 5).await?;

    if format == "json" {
        let upcoming: Vec<serde_json::Value> = upcoming
            .iter()
            .map(|p| {
                serde_json::json!({
                    "id": p.id,
                    "scheduled_for": p.scheduled_for,
                })
            })
            .collect();
        let json = serde_json::json!({
            "stats": stats,
            "upcoming": upcoming,
        });
        println!("{:#}", json);
        return Ok(());
    }

    println!("Total posts: {}", stats.total);
    println!("  Scheduled:  {}", stats.scheduled);
    println!("  Publishing: {}", stats.publishing);
    println!("  Published:  {}", stats.published);
    println!("  Failed:     {}", stats.failed);

    if !upcoming.is_empty() {
        println!();
        println!("Next up:");
        for post in upcoming {
            let at = post.scheduled_for.unwrap_or_default();
            println!("  {} {} ({})", post.id, format_timestamp(at), format_time_until(now, at));
        }
    }

    Ok(())
}
