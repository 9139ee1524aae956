use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use feedpoll::config::Config;
use feedpoll::feed::{fetch_feed, validate_stream, FieldKind};
use feedpoll::poller::{self, PollSettings};
use feedpoll::sink;
use feedpoll::storage::{Database, DatabaseError, FeedRecord};
use feedpoll::util::validate_url;

/// Get the config directory path ($XDG_CONFIG_HOME/feedpoll or ~/.config/feedpoll)
fn get_config_dir() -> Result<PathBuf> {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(xdg).join("feedpoll"));
    }
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedpoll"))
}

#[derive(Parser, Debug)]
#[command(
    name = "feedpoll",
    version,
    about = "Polls RSS/Atom feeds and appends new items to per-feed files"
)]
struct Args {
    /// Config file (default: ~/.config/feedpoll/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe to a feed, writing its new items to FILE
    Add {
        url: String,
        file: PathBuf,
        /// Maximum items written per poll
        #[arg(long, value_name = "N")]
        max: Option<usize>,
        /// Allow localhost and private network addresses
        #[arg(long)]
        allow_local: bool,
    },
    /// Unsubscribe from feeds
    Remove {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Resume polling feeds
    Enable {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Pause polling feeds without forgetting them
    Disable {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Show or change a feed's output file
    Output { url: String, file: Option<PathBuf> },
    /// List subscribed feeds
    List,
    /// Show legal channel fields, or show/set a feed's channel fields
    ChannelFields { url: Option<String>, fields: Vec<String> },
    /// Show legal item fields, or show/set a feed's item fields
    ItemFields { url: Option<String>, fields: Vec<String> },
    /// Show or set how many items a feed writes per poll
    MaxItems { url: String, count: Option<usize> },
    /// Show or set the poll interval in seconds
    Interval { secs: Option<u64> },
    /// Check that a URL serves a usable feed
    Validate {
        url: String,
        /// Allow localhost and private network addresses
        #[arg(long)]
        allow_local: bool,
    },
    /// Run a single poll cycle
    Poll,
    /// Poll until interrupted with Ctrl-C
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;
        tracing::info!(path = %config_dir.display(), "Created config directory");
    }

    // SEC-007: Set directory permissions on Unix (user-only access)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        if let Err(e) = std::fs::set_permissions(&config_dir, perms) {
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
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    let db_path = config.database_path_or(&config_dir);
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            tracing::error!(path = %db_path.display(), "Database is locked");
            eprintln!("Error: {}", DatabaseError::InstanceLocked);
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    let client = reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.poll_settings().request_timeout)
        .pool_idle_timeout(std::time::Duration::from_secs(30))
        .build()
        .context("Failed to build HTTP client")?;

    match execute(args.command, &db, &client, &config).await {
        Ok(()) => Ok(()),
        Err(e) => match e.downcast_ref::<DatabaseError>() {
            // Mistakes in the command line get a plain message, not a backtrace
            Some(db_err) if db_err.is_usage_error() => {
                eprintln!("Error: {db_err}");
                std::process::exit(2);
            }
            _ => Err(e),
        },
    }
}

async fn execute(
    command: Command,
    db: &Database,
    client: &reqwest::Client,
    config: &Config,
) -> Result<()> {
    let poll_settings = config.poll_settings();

    match command {
        Command::Add {
            url,
            file,
            max,
            allow_local,
        } => {
            validate_url(&url, allow_local)?;
            check_document(client, &url, &poll_settings).await?;
            let max = max.unwrap_or(config.default_max_items);
            let settings = sink::subscribe(db, &url, &file, max).await?;
            println!("Added {url}");
            println!("  output: {}", settings.output_file);
            println!("  max items: {}", settings.max_items);
        }
        Command::Remove { urls } => {
            for url in urls {
                db.remove_feed(&url).await?;
                println!("Removed {url}");
            }
        }
        Command::Enable { urls } => {
            for url in urls {
                db.set_feed_enabled(&url, true).await?;
                println!("{url} is on");
            }
        }
        Command::Disable { urls } => {
            for url in urls {
                db.set_feed_enabled(&url, false).await?;
                println!("{url} is off");
            }
        }
        Command::Output { url, file: None } => {
            let record = db.get_feed(&url).await?;
            println!("{url} is associated to {}", record.settings.output_file);
        }
        Command::Output {
            url,
            file: Some(file),
        } => {
            db.get_feed(&url).await?;
            check_document(client, &url, &poll_settings).await?;
            sink::reassociate(db, &url, &file).await?;
            println!("{url} is associated to {}", file.display());
        }
        Command::List => {
            let feeds = db.list_feeds().await?;
            if feeds.is_empty() {
                println!("No feeds. Add one with: feedpoll add <url> <file>");
            }
            for record in &feeds {
                print_record(record);
            }
        }
        Command::ChannelFields { url, fields } => {
            fields_command(db, FieldKind::Channel, url, fields).await?;
        }
        Command::ItemFields { url, fields } => {
            fields_command(db, FieldKind::Item, url, fields).await?;
        }
        Command::MaxItems { url, count: None } => {
            let record = db.get_feed(&url).await?;
            println!("{url} writes at most {} items", record.settings.max_items);
        }
        Command::MaxItems {
            url,
            count: Some(count),
        } => {
            db.set_max_items(&url, count).await?;
            println!("{url} writes at most {count} items");
        }
        Command::Interval { secs: None } => {
            let interval = db.poll_interval(poll_settings.default_interval).await?;
            println!("Polling every {} seconds", interval.as_secs());
        }
        Command::Interval { secs: Some(secs) } => {
            let interval = db.set_poll_interval(secs).await?;
            println!("Polling every {} seconds", interval.as_secs());
        }
        Command::Validate { url, allow_local } => {
            validate_url(&url, allow_local)?;
            check_document(client, &url, &poll_settings).await?;
            println!("{url} is a valid feed");
        }
        Command::Poll => {
            let report = poller::poll_once(db, client, &poll_settings).await?;
            for feed in &report.feeds {
                match &feed.outcome {
                    Ok(count) => println!("{}: {count} new", feed.url),
                    Err(e) => println!("{}: failed: {e}", feed.url),
                }
                if let Some(warning) = &feed.warning {
                    println!("{}: warning: {warning}", feed.url);
                }
            }
        }
        Command::Run => {
            tracing::info!(
                interval_secs = poll_settings.default_interval.as_secs(),
                "Starting poller"
            );
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "Cannot listen for Ctrl-C; stop the process to exit");
                    std::future::pending::<()>().await;
                }
            };
            poller::run(db.clone(), client.clone(), poll_settings, shutdown).await?;
        }
    }

    Ok(())
}

/// Fetches `url` and checks that it serves a usable feed.
async fn check_document(
    client: &reqwest::Client,
    url: &str,
    settings: &PollSettings,
) -> Result<()> {
    let bytes = fetch_feed(client, url, settings.request_timeout)
        .await
        .with_context(|| format!("Failed to fetch {url}"))?;
    validate_stream(bytes.as_slice()).with_context(|| format!("RSS Feed {url} is invalid"))?;
    Ok(())
}

async fn fields_command(
    db: &Database,
    kind: FieldKind,
    url: Option<String>,
    fields: Vec<String>,
) -> Result<()> {
    let Some(url) = url else {
        println!("Available fields: {}", kind.available().join(", "));
        return Ok(());
    };

    if fields.is_empty() {
        let record = db.get_feed(&url).await?;
        println!("{}", record.settings.fields(kind).join(", "));
        return Ok(());
    }

    let applied = db.reconfigure_fields(&url, kind, &fields).await?;
    println!("Fields set to: {}", applied.join(", "));
    Ok(())
}

fn print_record(record: &FeedRecord) {
    let s = &record.settings;
    let state = if s.enabled { "on" } else { "off" };
    println!("{} [{state}] -> {}", s.url, s.output_file);
    println!("  channel: {}", s.channel_fields.join(", "));
    println!("  item: {}", s.item_fields.join(", "));
    println!("  max items: {}", s.max_items);
    match s.last_published {
        Some(ts) => println!("  newest written: {}", ts.to_rfc2822()),
        None => println!("  newest written: never"),
    }
    if let Some(error) = &record.error {
        println!("  last error: {error}");
    }
}
