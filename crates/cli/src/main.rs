//! docsync command-line tool.
//!
//! Edits JSON documents in a data directory through the same editor the
//! library exposes, and syncs that directory through a git remote when the
//! configuration has a `[git]` section.

mod documents;
mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use docsync_core::config::AppConfig;
use docsync_core::{Editor, GitSync, LocalFileSystem, Resolution, StorageCoordinator};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// docsync command-line tool.
#[derive(Parser, Debug)]
#[command(
    name = "docsync",
    version,
    about = "Edit local JSON documents and sync them through git"
)]
struct Cli {
    /// Path to the TOML configuration file
    /// [default: <config dir>/docsync/config.toml].
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a starter configuration file.
    Init {
        /// Output path (defaults to the --config path).
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Data directory written into the generated file.
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Validate the configuration file.
    Validate,

    /// List the documents in the data directory.
    List,

    /// Show one document's fields and state.
    Show {
        name: String,

        /// Document kind.
        #[arg(long, default_value = "note")]
        kind: String,

        /// Print the snapshot as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Create a document holding the kind's defaults.
    Create {
        name: String,

        #[arg(long, default_value = "note")]
        kind: String,
    },

    /// Set one field and save the document.
    Edit {
        name: String,

        #[arg(long, default_value = "note")]
        kind: String,

        /// Field to set.
        #[arg(short, long)]
        field: String,

        /// New value; parsed as a number or boolean when the field is one.
        #[arg(short, long)]
        value: String,
    },

    /// Delete a document.
    Delete {
        name: String,

        #[arg(long, default_value = "note")]
        kind: String,
    },

    /// Resolve a conflicted document and save it.
    Resolve {
        name: String,

        #[arg(long, default_value = "note")]
        kind: String,

        /// Version to keep: incoming, current, current-on-disk.
        #[arg(long)]
        accept: Resolution,
    },

    /// Fetch, merge and publish, then refresh documents.
    Sync,

    /// Record local changes in the repository.
    Commit {
        /// Commit message.
        #[arg(short, long)]
        message: String,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    // The flag wins; otherwise use the config file's level if it parses.
    let level = cli.log_level.clone().unwrap_or_else(|| {
        AppConfig::load_from_file(&config_path)
            .map(|c| c.logging.level)
            .unwrap_or_else(|_| "warn".to_string())
    });
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_target(false)
        .without_time()
        .init();

    match run(cli, &config_path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config_path: &Path) -> Result<()> {
    match cli.command {
        Commands::Init { output, data_dir } => {
            cmd_init(output.as_deref().unwrap_or(config_path), data_dir)
        }
        Commands::Validate => cmd_validate(config_path),
        command => {
            let config = load_config(config_path)?;
            let workspace = Workspace::open(&config)?;

            match command {
                Commands::List => documents::run_list(&workspace.editor),
                Commands::Show { name, kind, json } => {
                    documents::run_show(&workspace.editor, &name, &kind, json).await
                }
                Commands::Create { name, kind } => {
                    documents::run_create(&workspace.editor, &name, &kind).await
                }
                Commands::Edit {
                    name,
                    kind,
                    field,
                    value,
                } => documents::run_edit(&workspace.editor, &name, &kind, &field, &value).await,
                Commands::Delete { name, kind } => {
                    documents::run_delete(&workspace.editor, &name, &kind).await
                }
                Commands::Resolve { name, kind, accept } => {
                    documents::run_resolve(&workspace.editor, &name, &kind, accept).await
                }
                Commands::Sync => cmd_sync(&workspace).await,
                Commands::Commit { message } => cmd_commit(&workspace, &message).await,
                Commands::Init { .. } | Commands::Validate => unreachable!(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Config helpers
// ---------------------------------------------------------------------------

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("docsync").join("config.toml"))
        .unwrap_or_else(|| PathBuf::from("docsync.toml"))
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("docsync"))
        .unwrap_or_else(|| PathBuf::from("docsync-data"))
}

fn load_config(path: &Path) -> Result<AppConfig> {
    AppConfig::load_and_resolve(path).context("failed to load configuration file")
}

/// Editor and coordinator over the configured data directory.
struct Workspace {
    editor: Editor,
    coordinator: StorageCoordinator,
}

impl Workspace {
    fn open(config: &AppConfig) -> Result<Self> {
        let data_dir = &config.storage.data_dir;

        // Clone before the editor sees the directory; a clone needs it empty.
        let provider = match &config.git {
            Some(git) => Some(
                GitSync::open_or_clone(git, data_dir)
                    .with_context(|| format!("failed to open repository at {}", data_dir.display()))?,
            ),
            None => {
                std::fs::create_dir_all(data_dir).with_context(|| {
                    format!("failed to create data directory {}", data_dir.display())
                })?;
                None
            }
        };

        let fs = LocalFileSystem::new(data_dir, config.storage.extension.as_str());
        let editor = Editor::new(Arc::new(fs));
        let coordinator = match provider {
            Some(provider) => StorageCoordinator::new(editor.clone(), Arc::new(provider)),
            None => StorageCoordinator::local(editor.clone()),
        };
        debug!(data_dir = %data_dir.display(), git = config.git.is_some(), "workspace opened");

        Ok(Self {
            editor,
            coordinator,
        })
    }
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

fn cmd_init(output: &Path, data_dir: Option<PathBuf>) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("failed to create config directory")?;
    }

    let data_dir = data_dir.unwrap_or_else(default_data_dir);
    std::fs::write(output, AppConfig::template(&data_dir))
        .context("failed to write config file")?;

    println!("{}", style::success(&format!("Configuration written to {}", output.display())));
    println!();
    println!("Next steps:");
    println!("  1. Review the data directory ({})", data_dir.display());
    println!("  2. Uncomment [git] to sync through a remote, and export the token variable");
    println!("  3. Validate with: docsync validate --config {}", output.display());

    Ok(())
}

fn cmd_validate(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {}", config_path.display());
    println!();

    let mut config =
        AppConfig::load_from_file(config_path).context("failed to parse configuration")?;
    println!("  [OK] TOML structure is valid");

    config
        .resolve_env_vars()
        .context("failed to resolve environment variables")?;
    println!("  [OK] Environment variable references processed");

    if let Err(e) = config.validate() {
        println!("  [FAIL] Validation error: {}", e);
        anyhow::bail!("configuration validation failed");
    }
    println!("  [OK] All required fields are valid");

    println!();
    println!("Configuration summary:");
    println!("  Data directory: {}", config.storage.data_dir.display());
    println!("  Extension     : .{}", config.storage.extension.trim_start_matches('.'));
    println!("  Log level     : {}", config.logging.level);
    match &config.git {
        Some(git) => {
            println!("  Remote        : {} ({})", git.remote, git.remote_url);
            println!("  Branch        : {}", git.branch);
            println!("  Author        : {} <{}>", git.author_name, git.author_email);
            println!(
                "  Token         : {}",
                match (&git.token_env, &git.token) {
                    (None, _) => "not configured",
                    (Some(_), Some(_)) => "set",
                    (Some(_), None) => "NOT SET",
                }
            );
        }
        None => println!("  Sync          : {}", style::dim("local only")),
    }
    println!();
    println!("Configuration is valid.");

    Ok(())
}

async fn cmd_sync(workspace: &Workspace) -> Result<()> {
    // Load every document so the sweep can report what the merge touched.
    for name in workspace.editor.all_file_names()? {
        let handle = workspace.editor.open_kind(&name, "note").await?;
        if let Err(e) = handle.read().await {
            println!("{}", style::warn(&format!("{}: {}", name, e)));
        }
    }

    let report = workspace
        .coordinator
        .sync()
        .await
        .context("sync failed")?;

    println!();
    println!("{}", style::header("Sync complete"));
    println!(
        "  {}",
        style::dim(&format!(
            "started {}",
            report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ))
    );
    println!("  Documents refreshed: {}", report.reread.len());
    for failure in &report.failures {
        println!("{}", style::error(&format!("{}: {}", failure.name, failure.error)));
    }
    if report.conflicts.is_empty() {
        println!("{}", style::success("No conflicts"));
    } else {
        for name in &report.conflicts {
            println!("{}", style::warn(&format!("{} is in conflict", name)));
        }
        println!();
        println!("Resolve with: docsync resolve <NAME> --accept incoming|current");
    }
    println!();

    Ok(())
}

async fn cmd_commit(workspace: &Workspace, message: &str) -> Result<()> {
    let id = workspace
        .coordinator
        .commit(message)
        .await
        .context("commit failed")?;
    let short = &id[..id.len().min(8)];
    println!("{}", style::success(&format!("Committed {}", short)));
    Ok(())
}
