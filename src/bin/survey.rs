#![forbid(unsafe_code)]

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use pairwise_survey::{
    generate_combinations, parse_keyword_list, score_snapshot_with_scale, ItemSet, Phase, Prompt,
    SessionSnapshot, SessionStore, Side, SqliteSessionStore, SurveyConfig, SurveySession,
};

#[derive(Parser)]
#[command(name = "survey", version, about = "Pairwise-comparison survey scoring")]
struct Cli {
    /// JSON config file (environment overrides still apply)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every pair of the given items in shuffled presentation order
    Pairs {
        #[arg(long, value_delimiter = ',', required = true)]
        items: Vec<String>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Score a session snapshot
    Score {
        /// Snapshot JSON file
        #[arg(long, conflicts_with = "session")]
        snapshot: Option<PathBuf>,
        /// Session id to load from the store
        #[arg(long)]
        session: Option<Uuid>,
        #[arg(long)]
        store: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },
    /// Drive a session from scripted answers
    Replay {
        #[arg(long)]
        script: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Persist checkpoints to this store
        #[arg(long)]
        store: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Write the latest checkpoint of a stored session as JSON
    Export {
        #[arg(long)]
        session: Uuid,
        #[arg(long)]
        store: Option<PathBuf>,
        #[arg(long)]
        out: PathBuf,
    },
    /// List stored sessions
    Sessions {
        #[arg(long)]
        store: Option<PathBuf>,
    },
}

/// Scripted answers, consumed in prompt order.
#[derive(Debug, Deserialize)]
struct ReplayScript {
    #[serde(default)]
    keywords: Vec<String>,
    /// Delimited keyword list, used when `keywords` is empty.
    #[serde(default)]
    keywords_text: Option<String>,
    images: Vec<String>,
    #[serde(default)]
    keyword_weights: Vec<i32>,
    #[serde(default)]
    image_choices: Vec<ScriptedChoice>,
}

#[derive(Debug, Deserialize)]
struct ScriptedChoice {
    side: Side,
    elapsed_secs: f64,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pairwise_survey=info,survey=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();
    let config = SurveyConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Pairs { items, seed } => {
            let mut rng = make_rng(seed.or(config.rng_seed));
            let pairs = generate_combinations(&items, &mut rng);
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            serde_json::to_writer(&mut handle, &pairs)?;
            writeln!(handle)?;
        }
        Commands::Score {
            snapshot,
            session,
            store,
            out,
        } => {
            let snap: SessionSnapshot = match (snapshot, session) {
                (Some(path), _) => read_json(&path)?,
                (None, Some(id)) => {
                    let store = open_store(store, &config)?;
                    store
                        .load_latest(id)?
                        .ok_or_else(|| format!("no checkpoint stored for session {id}"))?
                        .snapshot
                }
                (None, None) => return Err("score requires --snapshot or --session".into()),
            };
            let report = score_snapshot_with_scale(&snap, config.intensity_scale);
            write_json(&out, &report)?;
            for entry in &report.ranking {
                println!("{:>3}. {} {:.6}", entry.rank, entry.image, entry.score);
            }
            info!(out = %out.display(), "report written");
        }
        Commands::Replay {
            script,
            out,
            store,
            seed,
        } => {
            let script: ReplayScript = read_json(&script)?;
            let keywords = if script.keywords.is_empty() {
                parse_keyword_list(script.keywords_text.as_deref().unwrap_or_default())
            } else {
                script.keywords
            };
            let mut rng = make_rng(seed.or(config.rng_seed));
            let mut session = SurveySession::new(
                ItemSet::new(keywords)?,
                ItemSet::new(script.images)?,
                config.max_keyword_weight,
                &mut rng,
            )?;
            let store = match store {
                Some(path) => Some(SqliteSessionStore::new(path)?),
                None => None,
            };

            let mut saved = false;
            let mut weights = script.keyword_weights.into_iter();
            let mut choices = script.image_choices.into_iter();
            while let Some(prompt) = session.current_prompt() {
                let checkpoint = match prompt {
                    Prompt::Keyword { .. } => match weights.next() {
                        Some(w) => session.record_keyword_weight(w)?,
                        None => break,
                    },
                    Prompt::Image { .. } => match choices.next() {
                        Some(c) => session.record_image_choice(c.side, c.elapsed_secs)?,
                        None => break,
                    },
                };
                if let (Some(cp), Some(store)) = (checkpoint, store.as_ref()) {
                    store.save_checkpoint(&session.snapshot(), cp)?;
                    saved = true;
                }
            }
            // Phases without prompts never hand out a checkpoint.
            if let (false, Some(cp), Some(store)) =
                (saved, session.reached_checkpoint(), store.as_ref())
            {
                store.save_checkpoint(&session.snapshot(), cp)?;
            }

            if session.phase() != Phase::Complete {
                info!(phase = ?session.phase(), "script ended before the survey was complete");
            }
            write_json(&out, &session.snapshot())?;
            println!("{}", session.id());
        }
        Commands::Export {
            session,
            store,
            out,
        } => {
            let store = open_store(store, &config)?;
            let stored = store
                .load_latest(session)?
                .ok_or_else(|| format!("no checkpoint stored for session {session}"))?;
            write_json(&out, &stored.snapshot)?;
            info!(
                checkpoint = stored.checkpoint.as_str(),
                hash = %stored.snapshot_hash,
                "snapshot exported"
            );
        }
        Commands::Sessions { store } => {
            let store = open_store(store, &config)?;
            for row in store.list_sessions()? {
                println!(
                    "{}  {:<18} checkpoints={} updated={}",
                    row.session_id,
                    row.last_checkpoint.as_str(),
                    row.checkpoints,
                    row.updated_at.to_rfc3339()
                );
            }
        }
    }

    Ok(())
}

fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

fn open_store(
    path: Option<PathBuf>,
    config: &SurveyConfig,
) -> Result<SqliteSessionStore, Box<dyn std::error::Error>> {
    let path = path.unwrap_or_else(|| config.store_path.clone());
    Ok(SqliteSessionStore::new(path)?)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<(), io::Error> {
    let file = std::fs::File::create(path)?;
    let mut writer = io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    writer.flush()
}
