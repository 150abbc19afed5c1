//! # Myth Audio CLI (`myth`)
//!
//! ## Usage
//!
//! ```bash
//! myth --config ./config/myth.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `myth generate` | Generate, store, and announce a chapter's audio script |
//! | `myth add-doc <collection> <json>` | Add a document to a collection |
//! | `myth broadcast <title> <message>` | Send an affiliate notification |
//! | `myth track <event>` | Record a custom session event |
//! | `myth progress` | Show the last session's event log |
//! | `myth list <collection>` | Print a collection's documents |
//! | `myth demo` | Generate three sample chapters and summarize the session |
//!
//! Each invocation is one session: the first event it tracks replaces the
//! previous `session_progress.json`.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use myth_audio::ai::{self, ContentRequester};
use myth_audio::config::{self, Config};
use myth_audio::generate::{self, Chapter, GenerationRequest};
use myth_audio::models::Document;
use myth_audio::session::Session;
use myth_audio::tracker::{self, SESSION_PROGRESS_FILE};

/// Myth Audio CLI: chapter audio scripts with grant logging and session tracking.
///
/// Reads `--config` (TOML) when present; otherwise runs with defaults
/// (`./data`, Gemini via `GEMINI_API_KEY`). Without a credential, scripts are
/// produced from fallback content.
#[derive(Parser)]
#[command(name = "myth", version, about)]
struct Cli {
    /// Path to configuration file (TOML). Missing file means defaults.
    #[arg(long, global = true, default_value = "./config/myth.toml")]
    config: PathBuf,

    /// Override `storage.data_dir`.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate the audio script for one chapter.
    ///
    /// Stores the script in `audio_scripts`, a grant log in `grant_logs`,
    /// broadcasts a notification, and tracks five session events.
    Generate {
        #[arg(long)]
        ebook_id: String,

        #[arg(long)]
        chapter_number: u32,

        /// Chapter title. Defaults to "Chapter N".
        #[arg(long)]
        title: Option<String>,

        /// Chapter text.
        #[arg(long, conflicts_with = "content_file")]
        content: Option<String>,

        /// Read chapter text from a file.
        #[arg(long)]
        content_file: Option<PathBuf>,

        #[arg(long)]
        theme: Option<String>,

        #[arg(long)]
        affiliate_hook: Option<String>,

        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Add a JSON object document to a collection.
    AddDoc {
        collection: String,
        /// Document as a JSON object.
        document: String,
    },

    /// Send a broadcast notification.
    Broadcast {
        title: String,
        message: String,
        /// Metadata as `key=value` pairs. Values are parsed as JSON when possible.
        #[arg(long = "meta", value_parser = parse_key_val)]
        metadata: Vec<(String, String)>,
    },

    /// Track a custom session event.
    Track {
        event: String,
        /// Event data as `key=value` pairs. Values are parsed as JSON when possible.
        #[arg(long = "data", value_parser = parse_key_val)]
        data: Vec<(String, String)>,
    },

    /// Show the event log written by the last session.
    Progress {
        #[arg(long)]
        json: bool,
    },

    /// Print all documents in a collection as JSON.
    List { collection: String },

    /// Generate three sample chapters and summarize the session.
    Demo,
}

/// Parse a `key=value` pair for `--meta` / `--data` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn pairs_to_map(pairs: Vec<(String, String)>) -> Map<String, Value> {
    pairs
        .into_iter()
        .map(|(k, v)| {
            let value = serde_json::from_str(&v).unwrap_or(Value::String(v));
            (k, value)
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut cfg = config::load_or_minimal(&cli.config)?;
    if let Some(dir) = cli.data_dir {
        cfg = cfg.with_data_dir(dir);
    }

    match cli.command {
        Commands::Generate {
            ebook_id,
            chapter_number,
            title,
            content,
            content_file,
            theme,
            affiliate_hook,
            json,
        } => {
            let content = match content_file {
                Some(path) => Some(std::fs::read_to_string(&path).with_context(|| {
                    format!("Failed to read chapter file: {}", path.display())
                })?),
                None => content,
            };
            let request = GenerationRequest {
                ebook_id,
                chapter: Chapter { title, content },
                chapter_number,
                theme,
                affiliate_hook,
            };
            let requester = ai::create_requester(&cfg.ai)?;
            let mut session = Session::init(&cfg.storage.data_dir);
            let output = generate::generate_chapter_audio_script(
                &mut session,
                requester.as_ref(),
                &cfg.ai.model,
                &request,
            )
            .await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("Audio script generated ({}).", output.source.label());
                println!("  eBook ID:     {}", request.ebook_id);
                println!("  Script ID:    {}", output.script_id);
                println!("  Grant Log ID: {}", output.grant_log_id);
                println!("  Cues:         {}", output.script.script.len());
                print_progress(&session);
            }
        }
        Commands::AddDoc {
            collection,
            document,
        } => {
            let value: Value =
                serde_json::from_str(&document).with_context(|| "document is not valid JSON")?;
            let doc = Document::from_value(&collection, value)?;
            let mut session = Session::init(&cfg.storage.data_dir);
            let id = session.add_document(&collection, &doc)?;
            println!("{}", id);
        }
        Commands::Broadcast {
            title,
            message,
            metadata,
        } => {
            let mut session = Session::init(&cfg.storage.data_dir);
            match session.broadcast(&title, &message, pairs_to_map(metadata)) {
                Some(_) => println!("Broadcast sent: {}", title),
                None => eprintln!("Warning: broadcast could not be saved"),
            }
        }
        Commands::Track { event, data } => {
            let mut session = Session::init(&cfg.storage.data_dir);
            session.track(&event, pairs_to_map(data));
            println!("Tracked: {}", event);
        }
        Commands::Progress { json } => {
            let events = tracker::load_events(&cfg.storage.data_dir.join(SESSION_PROGRESS_FILE))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&events)?);
            } else if events.is_empty() {
                println!("No session events recorded.");
            } else {
                for entry in &events {
                    println!("[{}] {}", entry.timestamp.to_rfc3339(), entry.event);
                }
            }
        }
        Commands::List { collection } => {
            let session = Session::init(&cfg.storage.data_dir);
            let records = session.store().load_collection(&collection)?;
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        Commands::Demo => {
            let requester = ai::create_requester(&cfg.ai)?;
            run_demo(&cfg, requester.as_ref()).await?;
        }
    }

    Ok(())
}

fn print_progress(session: &Session) {
    println!();
    println!("Session progress:");
    for entry in session.progress() {
        println!("  [{}] {}", entry.timestamp.to_rfc3339(), entry.event);
    }
}

async fn run_demo(cfg: &Config, requester: &dyn ContentRequester) -> Result<()> {
    let chapters = [
        ("The Awakening", "A fox demon stirs..."),
        ("The Hunt Begins", "The villagers sense danger..."),
        ("Midnight Confrontation", "Time itself bends..."),
    ];
    let ebook_id = "demo_ebook_midnight_myth";
    let mut session = Session::init(&cfg.storage.data_dir);

    println!("Generating audio scripts for {} chapters...", chapters.len());
    for (i, (title, content)) in chapters.iter().enumerate() {
        let request = GenerationRequest::new(
            ebook_id,
            Chapter {
                title: Some(title.to_string()),
                content: Some(content.to_string()),
            },
            i as u32 + 1,
        )
        .theme("time-traveling fox-demon horror")
        .affiliate_hook("Share the legend and unlock mythic badges");

        let output =
            generate::generate_chapter_audio_script(&mut session, requester, &cfg.ai.model, &request)
                .await?;
        println!("  Chapter {}: {}", i + 1, title);
        println!("    Script ID: {}", output.script_id);
        println!("    Grant Log: {}", output.grant_log_id);
    }

    let events = session.progress();
    println!();
    println!("Total events tracked: {}", events.len());

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for entry in events {
        *counts.entry(entry.event.as_str()).or_default() += 1;
    }
    for (event, count) in counts {
        println!("  {:>3}  {}", count, event);
    }
    println!();
    println!(
        "Session log: {}",
        session.data_dir().join(SESSION_PROGRESS_FILE).display()
    );
    Ok(())
}
