use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use refcache::config::Config;
use refcache::views::{LanguagesView, RolesView};
use refcache::{AdminApiClient, CacheManager, Language, Role, SqliteStore};

type Cache = CacheManager<SqliteStore, AdminApiClient>;

#[derive(Parser, Debug)]
#[command(name = "refcache")]
#[command(about = "Local cache of the admin reference data (languages, roles)")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/refcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Keep the cache in memory for this run only
  #[arg(long)]
  no_persist: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show cache status as JSON
  Status,
  /// List languages
  Languages {
    /// Only languages flagged active
    #[arg(long)]
    active: bool,
    /// Refetch from the API first
    #[arg(long)]
    force: bool,
  },
  /// Look up a language by code
  Language { code: String },
  /// List roles
  Roles {
    /// Refetch from the API first
    #[arg(long)]
    force: bool,
  },
  /// Look up a role by code
  Role { code: String },
  /// Refetch every collection now
  Refresh,
  /// Empty the local cache
  Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let _log_guard = init_logging(config.log_dir.as_deref());

  // One cache for the whole process; views get clones of the handle
  let store = if args.no_persist {
    SqliteStore::in_memory()
  } else {
    SqliteStore::new(config.cache.db_path()?)
  };
  let client = AdminApiClient::new(&config)?;
  let cache = CacheManager::new(store, client, config.cache.stale_after());

  run(args.command, cache).await
}

async fn run(command: Command, cache: Cache) -> Result<()> {
  match command {
    Command::Status => {
      if let Err(e) = cache.initialize_cache().await {
        warn!(error = %e, "initialization failed, reporting current state");
      }
      print_status(&cache).await?;
    }
    Command::Languages { active, force } => {
      if force {
        cache.force_update_cache().await?;
      }
      let mut view = LanguagesView::new(cache);
      let mut languages = if active {
        view.load_active_languages(false).await
      } else {
        view.load_languages(false).await
      };
      if let Some(message) = view.error() {
        return Err(eyre!("{}", message));
      }
      languages.sort_by(|a, b| a.name.cmp(&b.name));
      for language in &languages {
        print_language(language);
      }
    }
    Command::Language { code } => {
      let mut view = LanguagesView::new(cache);
      match view.get_language_by_code(&code).await {
        Some(language) => println!("{}", serde_json::to_string_pretty(&language)?),
        None => {
          return Err(match view.error() {
            Some(message) => eyre!("{}", message),
            None => eyre!("No language with code {}", code),
          })
        }
      }
    }
    Command::Roles { force } => {
      if force {
        cache.force_update_cache().await?;
      }
      let mut view = RolesView::new(cache);
      let mut roles = view.load_roles(false).await;
      if let Some(message) = view.error() {
        return Err(eyre!("{}", message));
      }
      roles.sort_by(|a, b| a.name.cmp(&b.name));
      for role in &roles {
        print_role(role);
      }
    }
    Command::Role { code } => {
      let mut view = RolesView::new(cache);
      match view.get_role_by_code(&code).await {
        Some(role) => println!("{}", serde_json::to_string_pretty(&role)?),
        None => {
          return Err(match view.error() {
            Some(message) => eyre!("{}", message),
            None => eyre!("No role with code {}", code),
          })
        }
      }
    }
    Command::Refresh => {
      cache.force_update_cache().await?;
      print_status(&cache).await?;
    }
    Command::Clear => {
      cache.clear_cache().await?;
      println!("Reference cache cleared");
    }
  }

  Ok(())
}

async fn print_status(cache: &Cache) -> Result<()> {
  let status = cache.get_cache_status().await?;
  println!("{}", serde_json::to_string_pretty(&status)?);
  Ok(())
}

fn print_language(language: &Language) {
  let marker = if language.is_active { "" } else { " (inactive)" };
  println!("{}\t{}{}", language.code, language.name, marker);
}

fn print_role(role: &Role) {
  println!("{}\t{}", role.code, role.name);
}

/// Log to stderr, and to a daily file when a log directory is configured.
fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("refcache=info"));
  let stderr_layer = fmt::layer()
    .with_writer(std::io::stderr)
    .with_target(false)
    .compact();

  match log_dir {
    Some(dir) => {
      let appender = tracing_appender::rolling::daily(dir, "refcache.log");
      let (writer, guard) = tracing_appender::non_blocking(appender);
      tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .init();
      Some(guard)
    }
    None => {
      tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .init();
      None
    }
  }
}
