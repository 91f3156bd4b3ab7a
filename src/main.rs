use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use feedwalk::config::Config;
use feedwalk::feed::{build_http_client, FeedFetcher, FeedRequest, Item};
use feedwalk::nav::{NavigationLevel, NavigationStack, Navigator, Opened};
use feedwalk::server::{self, AppState};
use feedwalk::util::{fit_width, terminal_line, validate_feed_url};

/// Columns used for item titles in the `browse` listing.
const TITLE_WIDTH: usize = 72;

/// Get the config directory path (~/.config/feedwalk/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedwalk"))
}

#[derive(Parser, Debug)]
#[command(name = "feedwalk", about = "Browse nested RSS/Atom feeds as a folder tree")]
struct Args {
    /// Config file (default: ~/.config/feedwalk/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the feed acquisition endpoint
    Serve {
        /// Address to bind, overriding `listen` from the config
        #[arg(long, value_name = "ADDR")]
        listen: Option<String>,
    },
    /// Fetch one feed through the strategy chain and print its body
    Fetch {
        url: String,
        /// Referer hint, usually the parent feed's URL
        #[arg(long)]
        referer: Option<String>,
    },
    /// Open a feed, descend into folder items by index, list the result
    Browse {
        /// Root feed (default: `root_feed` from the config)
        url: Option<String>,
        /// Item index to open at each level, in order
        #[arg(long = "open", value_name = "INDEX")]
        open: Vec<usize>,
        /// Print JSON instead of a listing
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so `fetch` output can be piped
    let default_level = match args.command {
        Command::Serve { .. } => "feedwalk=info",
        _ => "feedwalk=warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => get_config_dir()?.join("config.toml"),
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let client = build_http_client().context("Failed to build HTTP client")?;
    let fetcher = FeedFetcher::new(client, config.fetch.clone());

    match args.command {
        Command::Serve { listen } => {
            let listen = listen.unwrap_or_else(|| config.listen.clone());
            let addr: SocketAddr = listen
                .parse()
                .with_context(|| format!("Invalid listen address: {}", listen))?;
            let state = AppState {
                fetcher,
                allow_private_hosts: config.allow_private_hosts,
            };
            server::start(addr, state).await
        }
        Command::Fetch { url, referer } => {
            let url = validate_feed_url(&url, config.allow_private_hosts)?;
            let request = FeedRequest::new(url.as_str(), referer.as_deref())?;
            let fetched = fetcher
                .fetch(&request)
                .await
                .with_context(|| format!("Failed to fetch {}", request.url))?;
            tracing::info!(source = ?fetched.source, attempts = fetched.attempts.len(), "Fetched");
            println!("{}", fetched.body);
            Ok(())
        }
        Command::Browse { url, open, json } => {
            let (root_url, root_title) = match url {
                Some(url) => (url.clone(), url),
                None => (config.root_feed.clone(), config.root_title.clone()),
            };
            validate_feed_url(&root_url, config.allow_private_hosts)?;

            let navigator = Navigator::new(fetcher, config.classifier.clone());
            let mut stack = navigator
                .open_root(&root_url, &root_title)
                .await
                .with_context(|| format!("Failed to open {}", root_url))?;

            for index in open {
                match navigator.open(&stack, index).await? {
                    Opened::Folder(level) => stack = stack.push(level),
                    Opened::Leaf(item) => {
                        print_selection(&stack, &item, json)?;
                        return Ok(());
                    }
                }
            }
            print_level(&stack, json)
        }
    }
}

fn print_level(stack: &NavigationStack, json: bool) -> Result<()> {
    let level = stack.current();
    if json {
        let out = serde_json::json!({
            "breadcrumbs": stack.breadcrumbs(),
            "sourceUrl": level.source_url(),
            "items": level.items(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{}", breadcrumb_line(stack));
    print_diagnostic(level);
    if level.items().is_empty() {
        println!("  (empty)");
    }
    for (index, item) in level.items().iter().enumerate() {
        let marker = if item.is_folder { "+" } else { ">" };
        let title = terminal_line(&item.title);
        println!("{:>4} {} {}", index, marker, fit_width(&title, TITLE_WIDTH));
    }
    Ok(())
}

fn print_selection(stack: &NavigationStack, item: &Item, json: bool) -> Result<()> {
    if json {
        let out = serde_json::json!({
            "breadcrumbs": stack.breadcrumbs(),
            "selected": item,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("{}", breadcrumb_line(stack));
    println!("Play: {}", terminal_line(&item.title));
    println!("      {}", item.url);
    Ok(())
}

fn breadcrumb_line(stack: &NavigationStack) -> String {
    stack
        .breadcrumbs()
        .iter()
        .map(|t| terminal_line(t).into_owned())
        .collect::<Vec<_>>()
        .join(" > ")
}

fn print_diagnostic(level: &NavigationLevel) {
    if let Some(diagnostic) = level.diagnostic() {
        eprintln!("Warning: {} could not be parsed ({})", level.source_url(), diagnostic);
    }
}
