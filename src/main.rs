use anyhow::{Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use feedsync::config::Config;
use feedsync::content::HttpImageFetcher;
use feedsync::feed::{refresh_all, refresh_one, resolve_image_placeholders, RefreshOptions};
use feedsync::storage::{Database, DatabaseError};
use feedsync::util::validate_url;

/// Get the config directory path (~/.config/feedsync/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedsync"))
}

#[derive(Parser, Debug)]
#[command(name = "feedsync", about = "Incremental RSS/RDF/Atom feed refresher")]
struct Args {
    /// Config file (defaults to ~/.config/feedsync/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe to a feed
    Add {
        url: String,
        /// Display title; when omitted the feed's own title is used
        #[arg(long)]
        title: Option<String>,
    },
    /// Refresh all feeds, or a single feed by id
    Refresh {
        #[arg(long, value_name = "ID")]
        feed: Option<i64>,
    },
    /// List subscribed feeds
    Feeds,
    /// List entries of a feed, newest first
    Entries {
        feed_id: i64,
        #[arg(long, default_value_t = 20)]
        limit: i64,
        /// Print entry bodies as well
        #[arg(long)]
        full: bool,
    },
    /// Mark an entry as read
    Read { entry_id: i64 },
    /// Toggle the favorite flag of an entry; favorites outlive the retention window
    Favorite { entry_id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        tracing::info!(path = %config_dir.display(), "Created config directory");
    }

    // SEC-007: User-only access to the config directory on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) =
            std::fs::set_permissions(&config_dir, std::fs::Permissions::from_mode(0o700))
        {
            tracing::warn!(
                path = %config_dir.display(),
                error = %e,
                "Failed to set config directory permissions to 0700"
            );
        }
    }

    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path).context("Failed to load config")?;

    let db_path = config_dir.join("feeds.db");
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: Another instance of feedsync appears to be running. Please wait and try again.");
            std::process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Failed to open database: {}", e)),
    };

    match args.command {
        Command::Add { url, title } => {
            let url = validate_url(&url, config.host_policy()).context("Invalid feed URL")?;
            let id = db
                .insert_feed(url.as_str(), title.as_deref())
                .await
                .context("Failed to add feed")?;
            println!("Added feed {id}: {url}");
        }
        Command::Refresh { feed } => {
            let client = reqwest::Client::builder()
                .user_agent(concat!("feedsync/", env!("CARGO_PKG_VERSION")))
                .build()
                .context("Failed to build HTTP client")?;
            let images = HttpImageFetcher::new(client.clone(), config.request_timeout())
                .with_host_policy(config.host_policy());
            let options = RefreshOptions::from_config(&config, &config_dir);

            let results = match feed {
                Some(feed_id) => {
                    let feed = db
                        .get_feed(feed_id)
                        .await?
                        .ok_or_else(|| anyhow::anyhow!("No feed with id {feed_id}"))?;
                    vec![refresh_one(&db, &client, &images, &feed, &options).await]
                }
                None => {
                    let feeds = db.get_feeds().await.context("Failed to load feeds")?;
                    refresh_all(&db, &client, &images, &feeds, &options).await
                }
            };

            let mut failed = 0;
            for result in &results {
                match &result.result {
                    Ok(count) => println!("feed {}: {} new", result.feed_id, count),
                    Err(e) => {
                        failed += 1;
                        println!("feed {}: error: {}", result.feed_id, e);
                    }
                }
            }
            if failed > 0 {
                std::process::exit(2);
            }
        }
        Command::Feeds => {
            for feed in db.get_feeds().await.context("Failed to load feeds")? {
                let status = match &feed.error {
                    Some(error) => format!("  [error: {error}]"),
                    None => String::new(),
                };
                println!(
                    "{:>4}  {:>4} unread  {}  <{}>{}",
                    feed.id,
                    feed.unread_count,
                    feed.display_title(),
                    feed.url,
                    status
                );
            }
        }
        Command::Entries {
            feed_id,
            limit,
            full,
        } => {
            let entries = db
                .get_entries_for_feed(feed_id, Some(limit))
                .await
                .context("Failed to load entries")?;
            for entry in entries {
                let date = DateTime::from_timestamp(entry.date, 0)
                    .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                let marker = match (entry.favorite, entry.is_read()) {
                    (true, _) => '*',
                    (false, false) => '+',
                    (false, true) => ' ',
                };
                println!("{marker} {date}  {}  <{}>", entry.title, entry.link);
                if full {
                    if let Some(description) = &entry.description {
                        println!("    {}", resolve_image_placeholders(description, entry.id));
                    }
                }
            }
        }
        Command::Read { entry_id } => {
            if !db.mark_entry_read(entry_id).await? {
                println!("Entry {entry_id} was already read or does not exist");
            }
        }
        Command::Favorite { entry_id } => {
            let favorite = db
                .toggle_entry_favorite(entry_id)
                .await
                .with_context(|| format!("No entry with id {entry_id}"))?;
            println!(
                "Entry {entry_id} {}",
                if favorite { "is now a favorite" } else { "is no longer a favorite" }
            );
        }
    }

    Ok(())
}
