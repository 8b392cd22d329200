use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use sessionkit_core::config::{self, Backend, StoreConfig};
use sessionkit_core::{Reaper, Store};

#[derive(Parser)]
#[command(
    name = "sessionkit",
    about = "Inspect and exercise a session store",
    version = sessionkit_core::VERSION,
)]
struct Cli {
    /// Config file (default: ~/.sessionkit/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Backend: memory or file (memory does not outlive the process)
    #[arg(short, long, global = true)]
    backend: Option<Backend>,
    /// Storage directory for the file backend
    #[arg(short, long, global = true)]
    path: Option<String>,
    /// Default TTL in seconds (0 = never expires)
    #[arg(long, global = true)]
    ttl: Option<u64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a session and print its ID
    Create {
        /// Session ID (a new UUID if omitted)
        id: Option<String>,
    },
    /// Print a session as JSON
    Read { id: String },
    /// Set a data key (VALUE is parsed as JSON, else stored as a string)
    Set {
        id: String,
        key: String,
        value: String,
    },
    /// Remove a data key
    Unset { id: String, key: String },
    /// Replace the session token
    Token { id: String, token: String },
    /// Delete a session
    Delete { id: String },
    /// Remove expired sessions
    Sweep,
    /// Write the effective configuration to the config file
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },
    /// Show the effective configuration
    Status,
    /// Run concurrent create/read/update/delete sequences
    Stress {
        /// Number of concurrent sequences
        #[arg(short, long, default_value_t = 1000)]
        count: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("sessionkit=info")),
        )
        .init();

    let cli = Cli::parse();
    let cfg = effective_config(&cli);

    match cli.command {
        Commands::Init { force } => cmd_init(&cfg, cli.config.as_deref(), force),
        Commands::Status => cmd_status(&cfg),
        Commands::Create { id } => cmd_create(&cfg, id),
        Commands::Read { id } => cmd_read(&cfg, &id),
        Commands::Set { id, key, value } => {
            let value = serde_json::from_str(&value).unwrap_or(serde_json::Value::String(value));
            update(&cfg, &id, "set session data", move |s| {
                s.set(key.clone(), value.clone())
            })
        }
        Commands::Unset { id, key } => update(&cfg, &id, "delete session data", move |s| {
            s.remove(&key);
        }),
        Commands::Token { id, token } => update(&cfg, &id, "update session token", move |s| {
            s.token = token.clone()
        }),
        Commands::Delete { id } => {
            open(&cfg)?
                .delete(&id)
                .with_context(|| format!("delete session {id}"))?;
            println!("Deleted {id}");
            Ok(())
        }
        Commands::Sweep => {
            let n = open(&cfg)?.sweep().context("sweep expired sessions")?;
            println!("Removed {n} expired session(s)");
            Ok(())
        }
        Commands::Stress { count } => cmd_stress(&cfg, count),
    }
}

/// File/env config with command-line flags on top.
fn effective_config(cli: &Cli) -> StoreConfig {
    let mut cfg = match &cli.config {
        Some(path) => {
            let mut cfg = config::load_config(Some(path));
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        None => config::load_config_from_env(),
    };
    if let Some(backend) = cli.backend {
        cfg.backend = backend;
    }
    if let Some(path) = &cli.path {
        cfg.path = path.clone();
    }
    if let Some(ttl) = cli.ttl {
        cfg.default_ttl_secs = ttl;
    }
    cfg
}

fn open(cfg: &StoreConfig) -> Result<Arc<dyn Store>> {
    config::open_store(cfg).context("open session store")
}

fn update(
    cfg: &StoreConfig,
    id: &str,
    what: &str,
    mut f: impl FnMut(&mut sessionkit_core::Session),
) -> Result<()> {
    open(cfg)?
        .update(id, &mut f)
        .with_context(|| format!("{what} for {id}"))?;
    cmd_read(cfg, id)
}

fn cmd_init(cfg: &StoreConfig, path: Option<&Path>, force: bool) -> Result<()> {
    let target = path.map(Path::to_path_buf).unwrap_or_else(config::get_config_path);
    anyhow::ensure!(
        force || !target.exists(),
        "{} already exists (use --force to overwrite)",
        target.display()
    );
    config::save_config(cfg, Some(&target))
        .with_context(|| format!("write config to {}", target.display()))?;
    println!("✓ Wrote {}", target.display());
    Ok(())
}

fn cmd_status(cfg: &StoreConfig) -> Result<()> {
    let config_path = config::get_config_path();
    println!(
        "Config: {} {}",
        config_path.display(),
        if config_path.exists() { "✓" } else { "✗" }
    );
    println!("Backend: {:?}", cfg.backend);
    if cfg.backend == Backend::File {
        let dir = cfg.storage_path();
        println!(
            "Storage: {} {}",
            dir.display(),
            if dir.exists() { "✓" } else { "✗" }
        );
    }
    println!("Default TTL: {}s", cfg.default_ttl_secs);
    match cfg.sweep_interval() {
        Some(i) => println!("Sweep interval: {}s", i.as_secs()),
        None => println!("Sweep interval: disabled"),
    }
    Ok(())
}

fn cmd_create(cfg: &StoreConfig, id: Option<String>) -> Result<()> {
    let id = id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    open(cfg)?
        .create(&id, cfg.default_ttl())
        .with_context(|| format!("create session {id}"))?;
    println!("{id}");
    Ok(())
}

fn cmd_read(cfg: &StoreConfig, id: &str) -> Result<()> {
    let session = open(cfg)?
        .read(id)
        .with_context(|| format!("read session {id}"))?;
    println!("{}", serde_json::to_string_pretty(&session)?);
    Ok(())
}

/// One full sequence on a fresh ID; returns a description of the first failure.
fn lifecycle(store: &dyn Store, ttl: Duration) -> Result<()> {
    let id = uuid::Uuid::new_v4().to_string();
    let key = uuid::Uuid::new_v4().simple().to_string();
    let value = uuid::Uuid::new_v4().simple().to_string();

    store.create(&id, ttl).context("create session record")?;
    store.read(&id).context("read session record")?;
    store
        .update(&id, &mut |s| s.token = value.clone())
        .context("update session record")?;
    store
        .update(&id, &mut |s| s.set(key.clone(), value.clone()))
        .context("set session data")?;
    let session = store.read(&id).context("get session data")?;
    anyhow::ensure!(
        session.get(&key).and_then(|v| v.as_str()) == Some(value.as_str()),
        "session data does not match"
    );
    store
        .update(&id, &mut |s| {
            s.remove(&key);
        })
        .context("delete session data")?;
    store.delete(&id).context("delete session record")?;
    Ok(())
}

fn cmd_stress(cfg: &StoreConfig, count: usize) -> Result<()> {
    let store = open(cfg)?;
    let _reaper = match cfg.sweep_interval() {
        Some(interval) => Some(Reaper::spawn(store.clone(), interval).context("start reaper")?),
        None => None,
    };
    let ttl = cfg.default_ttl();

    let bar = indicatif::ProgressBar::new(count as u64);
    let started = Instant::now();
    let failures: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..count)
            .map(|_| {
                let store = store.as_ref();
                let bar = bar.clone();
                scope.spawn(move || {
                    let res = lifecycle(store, ttl);
                    bar.inc(1);
                    res
                })
            })
            .collect();
        handles
            .into_iter()
            .filter_map(|h| match h.join() {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(format!("{e:#}")),
                Err(_) => Some("worker panicked".to_string()),
            })
            .collect()
    });
    bar.finish_and_clear();

    tracing::info!(
        "{} sequences on {:?} backend in {:.2?}",
        count,
        cfg.backend,
        started.elapsed()
    );
    for f in failures.iter().take(10) {
        eprintln!("  {f}");
    }
    anyhow::ensure!(
        failures.is_empty(),
        "{} of {} sequences failed",
        failures.len(),
        count
    );
    println!("All {count} sequences passed");
    Ok(())
}
