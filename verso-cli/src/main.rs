//! Verso CLI - command-line host for the embedded version-control engine
//!
//! The repository state (commit graph, branches, working tree, staging area
//! and merge requests) lives in a JSON state file. `init` and `add` import
//! file content from disk; `show` prints the tracked content back.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use verso_core::diff::LineKind;
use verso_core::prelude::*;
use verso_core::versioning::Snapshot;

#[derive(Parser)]
#[command(name = "verso")]
#[command(about = "Embedded version control for small file sets", long_about = None)]
#[command(version)]
struct Cli {
    /// Repository state file (defaults to storage.path from configuration)
    #[arg(long, global = true, env = "VERSO_STATE")]
    state: Option<PathBuf>,

    /// Configuration file (defaults to verso.toml and VERSO_ environment variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the repository and its root commit from files on disk
    Init {
        /// Files to include in the initial commit
        files: Vec<PathBuf>,
    },
    /// Read files from disk into the working tree and stage them
    Add {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Remove files from the working tree and stage their deletion
    Rm {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Drop paths from the staging area
    Unstage {
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Show staged and unstaged changes
    Status,
    /// Commit the staging area
    Commit {
        /// Commit message
        #[arg(short, long)]
        message: String,

        #[arg(long, env = "VERSO_AUTHOR_NAME", default_value = "Verso User")]
        author_name: String,

        #[arg(long, env = "VERSO_AUTHOR_EMAIL", default_value = "user@verso.local")]
        author_email: String,

        /// Stable author id (the email when omitted)
        #[arg(long, env = "VERSO_AUTHOR_ID")]
        author_id: Option<String>,
    },
    /// Create a branch at the current head
    Branch {
        name: String,

        /// Mark the branch as protected
        #[arg(long)]
        protect: bool,
    },
    /// List branches
    Branches,
    /// Switch to a branch
    Checkout { name: String },
    /// Merge a branch into another (the current branch by default)
    Merge {
        source: String,
        target: Option<String>,

        /// Only report what the merge would do
        #[arg(long)]
        dry_run: bool,
    },
    /// Show commit history
    Log {
        #[arg(short, long)]
        branch: Option<String>,

        /// Maximum number of commits
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show the line diff between two commits
    Diff {
        from: String,
        to: String,

        #[arg(long)]
        path: Option<String>,
    },
    /// Print a file from the working tree
    Show { path: String },
    /// Merge request commands
    Mr {
        #[command(subcommand)]
        command: MrCommands,
    },
    /// Version information
    Version,
}

#[derive(Subcommand)]
enum MrCommands {
    /// Open a merge request
    Create {
        #[arg(long)]
        title: String,

        #[arg(long, default_value = "")]
        description: String,

        #[arg(long)]
        source: String,

        /// Target branch (the default branch when omitted)
        #[arg(long)]
        target: Option<String>,

        #[arg(long, env = "VERSO_AUTHOR_NAME", default_value = "Verso User")]
        author_name: String,

        #[arg(long, env = "VERSO_AUTHOR_EMAIL", default_value = "user@verso.local")]
        author_email: String,

        /// Stable author id (the email when omitted)
        #[arg(long, env = "VERSO_AUTHOR_ID")]
        author_id: Option<String>,
    },
    /// List merge requests
    List {
        #[arg(long, value_enum)]
        status: Option<StatusFilter>,
    },
    /// Close a merge request without merging
    Close { id: String },
    /// Merge a merge request
    Complete { id: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusFilter {
    Open,
    Merged,
    Closed,
}

impl From<StatusFilter> for MergeRequestStatus {
    fn from(filter: StatusFilter) -> Self {
        match filter {
            StatusFilter::Open => MergeRequestStatus::Open,
            StatusFilter::Merged => MergeRequestStatus::Merged,
            StatusFilter::Closed => MergeRequestStatus::Closed,
        }
    }
}

fn load_config(cli: &Cli) -> Result<VersoConfig> {
    let mut config = match &cli.config {
        Some(path) => VersoConfig::from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => VersoConfig::load().context("Failed to load configuration")?,
    };
    config.storage.mode = StorageMode::File;
    if let Some(state) = &cli.state {
        config.storage.path = state.clone();
    }
    Ok(config)
}

fn author(id: Option<&str>, name: &str, email: &str) -> Author {
    Author::new(id.unwrap_or(email), name, email)
}

fn read_disk_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn short(id: &str) -> &str {
    let end = id.len().min("commit_".len() + 8);
    &id[..end]
}

fn print_conflicts(conflicts: &[MergeConflict]) {
    for conflict in conflicts {
        eprintln!("CONFLICT ({:?}): {}", conflict.kind, conflict.path);
        for region in &conflict.regions {
            eprintln!("<<<<<<< target (line {})", region.base_start);
            for line in &region.ours {
                eprintln!("{}", line);
            }
            eprintln!("=======");
            for line in &region.theirs {
                eprintln!("{}", line);
            }
            eprintln!(">>>>>>> source");
        }
    }
}

fn print_diffs(diffs: &[FileDiff]) {
    for diff in diffs {
        let (added, removed) = diff.stats();
        println!("{:?} {} (+{} -{})", diff.change_type, diff.path, added, removed);
        for hunk in &diff.hunks {
            println!("{}", hunk.header());
            for line in &hunk.lines {
                let marker = match line.kind {
                    LineKind::Context => ' ',
                    LineKind::Added => '+',
                    LineKind::Removed => '-',
                };
                println!("{}{}", marker, line.text);
                if line.no_newline {
                    println!("\\ No newline at end of file");
                }
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Version = cli.command {
        println!("verso {}", env!("CARGO_PKG_VERSION"));
        println!("verso-core {}", verso_core::VERSION);
        return Ok(());
    }

    let config = load_config(&cli)?;
    let store = Arc::new(JsonFileStore::new(config.storage.path.clone()));
    let mut repo = Repository::open(config, store)
        .await
        .context("Failed to open repository state")?;

    if !matches!(cli.command, Commands::Init { .. }) && !repo.is_initialized() {
        bail!("Repository is not initialized, run `verso init` first");
    }

    match cli.command {
        Commands::Init { files } => {
            let mut initial = Snapshot::new();
            for file in &files {
                initial.insert(file.to_string_lossy().into_owned(), read_disk_file(file)?);
            }
            let commit_id = repo.initialize(Some(initial)).await?;
            println!(
                "Initialized {} on {} with {} file(s) at {}",
                repo.name(),
                repo.current_branch(),
                files.len(),
                short(&commit_id)
            );
        }
        Commands::Add { paths } => {
            for path in &paths {
                match std::fs::read_to_string(path) {
                    Ok(content) => repo.write_file(path.as_str(), content),
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                        repo.delete_file(path);
                    }
                    Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path)),
                }
            }
            let staged = repo.add(&paths)?;
            repo.flush().await?;
            println!("Staged {} path(s)", staged.len());
        }
        Commands::Rm { paths } => {
            let removed = repo.remove(&paths)?;
            repo.flush().await?;
            println!("Staged deletion of {} path(s)", removed.len());
        }
        Commands::Unstage { paths } => {
            let removed = repo.unstage(&paths);
            repo.flush().await?;
            println!("Unstaged {} path(s)", removed.len());
        }
        Commands::Status => {
            let status = repo.status()?;
            if cli.json {
                print_json(&status)?;
            } else {
                println!("On branch {}", status.branch);
                if status.is_clean() {
                    println!("nothing to commit, working tree clean");
                }
                if !status.staged.is_empty() {
                    println!("Changes to be committed:");
                    for (path, kind) in &status.staged {
                        println!("  {:?}: {}", kind, path);
                    }
                }
                if !status.unstaged.is_empty() {
                    println!("Changes not staged for commit:");
                    for (path, kind) in &status.unstaged {
                        println!("  {:?}: {}", kind, path);
                    }
                }
            }
        }
        Commands::Commit {
            message,
            author_name,
            author_email,
            author_id,
        } => {
            let commit_author = author(author_id.as_deref(), &author_name, &author_email);
            let commit_id = repo.commit(&message, commit_author).await?;
            println!("[{} {}] {}", repo.current_branch(), short(&commit_id), message);
        }
        Commands::Branch { name, protect } => {
            let branch = repo.create_branch(&name)?;
            if protect {
                repo.set_branch_protection(&name, true)?;
            }
            repo.flush().await?;
            println!("Created branch {}", branch.name);
        }
        Commands::Branches => {
            let branches = repo.list_branches();
            if cli.json {
                print_json(&branches)?;
            } else {
                for branch in branches {
                    let marker = if branch.name == repo.current_branch() { '*' } else { ' ' };
                    let head = branch.head_commit_id.as_deref().map(short).unwrap_or("-");
                    let protected = if branch.is_protected { " (protected)" } else { "" };
                    println!("{} {} {}{}", marker, branch.name, head, protected);
                }
            }
        }
        Commands::Checkout { name } => {
            repo.checkout(&name).await?;
            println!("Switched to branch '{}'", name);
        }
        Commands::Merge {
            source,
            target,
            dry_run,
        } => {
            let target = target.unwrap_or_else(|| repo.current_branch().to_string());
            if dry_run {
                let plan = repo.preview_merge(&source, &target)?;
                if cli.json {
                    print_json(&plan)?;
                } else if plan.up_to_date {
                    println!("Already up to date");
                } else {
                    for change in &plan.changes {
                        println!("  {:?}: {}", change.change_type, change.path);
                    }
                    print_conflicts(&plan.conflicts);
                }
                return Ok(());
            }

            match repo.merge(&source, &target).await {
                Ok(commit_id) => println!("Merged {} into {} at {}", source, target, short(&commit_id)),
                Err(VersoError::Conflict { paths, conflicts }) => {
                    print_conflicts(&conflicts);
                    bail!("Automatic merge failed in {}", paths.join(", "));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Log { branch, limit } => {
            let history = repo.get_commit_history(branch.as_deref(), limit)?;
            if cli.json {
                print_json(&history)?;
            } else {
                for commit in history {
                    println!("commit {}", commit.id);
                    if commit.is_merge() {
                        println!("Merge: {}", commit.parent_ids.iter().map(|p| short(p)).collect::<Vec<_>>().join(" "));
                    }
                    println!("Author: {} <{}>", commit.author.name, commit.author.email);
                    println!("Date:   {}", commit.timestamp.to_rfc3339());
                    println!();
                    println!("    {}", commit.message);
                    println!();
                }
            }
        }
        Commands::Diff { from, to, path } => {
            let diffs = repo.get_diff(&from, &to, path.as_deref())?;
            if cli.json {
                print_json(&diffs)?;
            } else {
                print_diffs(&diffs);
            }
        }
        Commands::Show { path } => match repo.read_file(&path) {
            Some(content) => print!("{}", content),
            None => bail!("{} is not in the working tree", path),
        },
        Commands::Mr { command } => match command {
            MrCommands::Create {
                title,
                description,
                source,
                target,
                author_name,
                author_email,
                author_id,
            } => {
                let target = target.unwrap_or_else(|| repo.default_branch().to_string());
                let request = repo.create_merge_request(
                    &title,
                    &description,
                    &source,
                    &target,
                    author(author_id.as_deref(), &author_name, &author_email),
                );
                repo.flush().await?;
                println!("Opened {} ({} -> {})", request.id, source, target);
            }
            MrCommands::List { status } => {
                let requests = repo.list_merge_requests(status.map(Into::into));
                if cli.json {
                    print_json(&requests)?;
                } else {
                    for request in requests {
                        println!(
                            "{} [{}] {} ({} -> {})",
                            request.id, request.status, request.title, request.source_branch, request.target_branch
                        );
                    }
                }
            }
            MrCommands::Close { id } => {
                repo.close_merge_request(&id)?;
                repo.flush().await?;
                println!("Closed {}", id);
            }
            MrCommands::Complete { id } => {
                let request = repo.complete_merge_request(&id).await?;
                println!(
                    "Merged {} at {}",
                    request.id,
                    request.merge_commit_id.as_deref().map(short).unwrap_or("-")
                );
            }
        },
        Commands::Version => {}
    }

    Ok(())
}
