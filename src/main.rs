//! testkit CLI
//!
//! Inspects a remote repository the way the GitOps helpers see it.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use testkit::{Base, CommitFound, HarnessConfig};

#[derive(Parser)]
#[command(name = "testkit")]
#[command(about = "Inspect repositories the way testkit's GitOps helpers see them")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List commits on a branch, newest first
    Commits {
        /// Repository as owner/name
        repo: String,
        #[arg(long, default_value = "main")]
        branch: String,
        /// Only commits after this sha
        #[arg(long, default_value = "")]
        since: String,
    },

    /// List semantic version tags
    Tags {
        /// Repository as owner/name
        repo: String,
        /// Lowest version to list. Without it only the greatest tag is shown.
        #[arg(long, default_value = "")]
        since: String,
    },

    /// List pull requests with their commits
    Pulls {
        /// Repository as owner/name
        repo: String,
        #[arg(long, default_value = "main")]
        branch: String,
        /// Lowest pull request number. Without it only the latest is shown.
        #[arg(long, default_value_t = 0)]
        since: u64,
    },

    /// Print a file as of a branch
    File {
        /// Repository as owner/name
        repo: String,
        path: String,
        #[arg(long, default_value = "main")]
        branch: String,
    },
}

fn main() -> ExitCode {
    testkit::logging::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> testkit::Result<()> {
    let mut config = match &cli.config {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };
    config.apply_env_overrides();
    let repos = config.github.repositories(None);

    match cli.command {
        Commands::Commits { repo, branch, since } => {
            let commits = repos.find_commits(&Base::parse(&repo, branch)?, &since)?;
            for commit in &commits {
                print_commit(commit, "");
            }
        }
        Commands::Tags { repo, since } => {
            for tag in repos.find_semver_tags(&Base::parse(&repo, "")?, &since)? {
                println!("{tag}");
            }
        }
        Commands::Pulls { repo, branch, since } => {
            for pr in repos.find_pull_requests(&Base::parse(&repo, branch)?, since)? {
                println!("#{} base {}", pr.number, pr.base_sha);
                for commit in &pr.commits {
                    print_commit(commit, "  ");
                }
            }
        }
        Commands::File { repo, path, branch } => {
            let content = repos.get_file_content(&Base::parse(&repo, branch)?, &path)?;
            std::io::stdout().write_all(&content)?;
        }
    }
    Ok(())
}

fn print_commit(commit: &CommitFound, indent: &str) {
    let short = commit.sha.get(..7).unwrap_or(&commit.sha);
    println!(
        "{indent}{short} {} <{}> {}",
        commit.change_set.user_name, commit.change_set.user_email, commit.message
    );
    for file in &commit.change_set.files {
        println!("{indent}    {}", file.path);
    }
}
