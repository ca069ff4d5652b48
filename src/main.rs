mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chatr")]
#[command(author, version, about = "A fast user-scope package manager for Homebrew bottles", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install packages together with their dependencies
    Install {
        /// Package names
        #[arg(required = true)]
        names: Vec<String>,

        /// Expected SHA256 checksum, overriding registry metadata
        #[arg(long)]
        sha256: Option<String>,

        /// Install casks instead of formulae
        #[arg(long)]
        cask: bool,
    },

    /// Remove installed packages
    Remove {
        /// Package names
        names: Vec<String>,

        /// Remove all installed packages
        #[arg(long)]
        all: bool,

        /// Package version
        #[arg(short = 'v', long, default_value = "latest")]
        version: String,
    },

    /// Upgrade installed packages to the latest version
    Upgrade {
        /// Package names; all roots when omitted with --all
        names: Vec<String>,

        /// Upgrade all installed packages
        #[arg(long)]
        all: bool,
    },

    /// List installed packages
    List {
        /// List installed casks
        #[arg(long)]
        cask: bool,
    },

    /// Search for formulae or casks
    Search {
        /// Query string
        query: String,

        /// Shows first n packages
        #[arg(short = 's', long = "show", default_value_t = 50)]
        show: usize,

        /// Search casks instead of formulae
        #[arg(long)]
        cask: bool,
    },

    /// Clear the packages cache
    Clear,

    /// Print the version of chatr
    Version,

    /// Update chatr to the newest version
    New,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Install { names, sha256, cask } => {
            commands::install::run(&names, sha256.as_deref(), cask).await
        }
        Commands::Remove { names, all, version } => {
            commands::remove::run(&names, all, &version).await
        }
        Commands::Upgrade { names, all } => commands::upgrade::run(&names, all).await,
        Commands::List { cask } => commands::list::run(cask).await,
        Commands::Search { query, show, cask } => {
            commands::search::run(&query, show, cask).await
        }
        Commands::Clear => commands::clear::run(),
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::New => commands::update::run(),
    }
}
