//! ReadAloud - read pages aloud from the command line

use anyhow::Result;
use clap::{Parser, Subcommand};
use readaloud::announcer::announcement_for;
use readaloud::config::Config;
use readaloud::dom::Document;
use readaloud::page::{PageTextExtractor, UnitKind, WordIndexer};
use readaloud::prefs::{
    LocalCache, MemoryBackend, PreferenceBackend, PreferenceStore, Preferences, SqliteBackend,
};
use readaloud::tts::{create_engine, EngineEvent, PlaybackState};
use readaloud::ReadAloud;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Do not open the preference database
    #[arg(long)]
    ephemeral: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read a page aloud
    Read {
        /// HTML or XHTML file
        file: PathBuf,

        /// Route the page is shown at
        #[arg(long, default_value = "/")]
        route: String,

        /// Word index to start from
        #[arg(long, default_value_t = 0)]
        from: usize,

        /// Load this user's preferences
        #[arg(long)]
        user: Option<String>,
    },

    /// Speak the announcement for a route
    Announce { route: String },

    /// Print the text and word units a page is read as
    Text { file: PathBuf },

    /// Show or change reader preferences
    Prefs {
        #[command(subcommand)]
        action: PrefsAction,
    },
}

#[derive(Subcommand, Debug)]
enum PrefsAction {
    Show {
        #[arg(long)]
        user: Option<String>,
    },
    Set {
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        rate: Option<f64>,
        #[arg(long)]
        voice: Option<String>,
        #[arg(long)]
        highlight: Option<bool>,
        #[arg(long)]
        announce: Option<bool>,
        #[arg(long)]
        click: Option<bool>,
    },
}

fn preference_store(config: &Config, ephemeral: bool) -> Result<PreferenceStore> {
    let cache = LocalCache::new(&config.preference_cache_path);
    let backend: Arc<dyn PreferenceBackend> = if ephemeral {
        Arc::new(MemoryBackend::new())
    } else {
        Arc::new(SqliteBackend::new(&config.preference_db_path)?)
    };
    Ok(PreferenceStore::new(cache, backend))
}

/// Pump engine events until the reader goes quiet or Ctrl-C
async fn run_until_idle(
    reader: &mut ReadAloud,
    doc: &mut Document,
    events: &mut mpsc::UnboundedReceiver<EngineEvent>,
) {
    while reader.state() == PlaybackState::Speaking {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => reader.handle_engine_event(doc, event),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("⏹️ Interrupted");
                reader.stop(doc);
                break;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::load()?;

    // Setup logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if args.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new(config.log_level.to_lowercase())
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🔊 ReadAloud v{} starting...", env!("CARGO_PKG_VERSION"));
    let store = preference_store(&config, args.ephemeral)?;

    match args.command {
        Commands::Read {
            file,
            route,
            from,
            user,
        } => {
            let markup = std::fs::read_to_string(&file)?;
            let mut doc = Document::parse(&markup)?;
            let (tx, mut rx) = mpsc::unbounded_channel();
            let engine = create_engine(&config, tx);
            let mut reader = ReadAloud::new(engine, store, &config);
            if let Some(user) = user {
                reader.sign_in(&user).await;
            }

            reader.navigate(&mut doc, &route);
            run_until_idle(&mut reader, &mut doc, &mut rx).await;

            match reader.speak_from(&mut doc, from) {
                Ok(_) => run_until_idle(&mut reader, &mut doc, &mut rx).await,
                Err(e) => warn!("⚠️ {}", e),
            }
        }
        Commands::Announce { route } => {
            let announcement = announcement_for(&route);
            println!("{}", announcement.rendered_phrase);

            let mut doc = Document::new();
            let (tx, mut rx) = mpsc::unbounded_channel();
            let engine = create_engine(&config, tx);
            let mut reader = ReadAloud::new(engine, store, &config);
            match reader.speak_text(&mut doc, &announcement.rendered_phrase) {
                Ok(_) => run_until_idle(&mut reader, &mut doc, &mut rx).await,
                Err(e) => warn!("⚠️ {}", e),
            }
        }
        Commands::Text { file } => {
            let markup = std::fs::read_to_string(&file)?;
            let doc = Document::parse(&markup)?;
            let mut indexer = WordIndexer::new(PageTextExtractor::from_config(&config));
            println!("{}", indexer.extractor().extract(&doc));
            println!();
            for unit in indexer.index(&doc).iter() {
                let kind = match unit.kind {
                    UnitKind::Word => "word",
                    UnitKind::ImageDescription => "image",
                };
                println!("{:>5}  {:<5}  {}", unit.sequence_index, kind, unit.text);
            }
        }
        Commands::Prefs { action } => match action {
            PrefsAction::Show { user } => {
                let prefs = store.load(user.as_deref()).await;
                println!("{}", serde_json::to_string_pretty(&prefs)?);
            }
            PrefsAction::Set {
                user,
                rate,
                voice,
                highlight,
                announce,
                click,
            } => {
                let mut prefs = store.load(user.as_deref()).await;
                if let Some(rate) = rate {
                    match Preferences::normalize_rate(rate) {
                        Some(rate) => prefs.rate = rate,
                        None => warn!("⚠️ Ignoring invalid speech rate {}", rate),
                    }
                }
                if let Some(voice) = voice {
                    prefs.voice_id = voice;
                }
                if let Some(highlight) = highlight {
                    prefs.highlight_enabled = highlight;
                }
                if let Some(announce) = announce {
                    prefs.announce_enabled = announce;
                }
                if let Some(click) = click {
                    prefs.click_to_speak_enabled = click;
                }
                store.save(user.as_deref(), &prefs).await?;
                println!("{}", serde_json::to_string_pretty(&prefs)?);
            }
        },
    }

    Ok(())
}
