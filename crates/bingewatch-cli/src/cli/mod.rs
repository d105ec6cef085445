//! CLI entry and dispatch.

use anyhow::{Context, Result};
use bingewatch_core::{config, logging};
use clap::Parser;

mod commands;

#[derive(Parser)]
#[command(name = "bingewatch")]
#[command(version = "0.1")]
#[command(about = "Browse movies and manage your bingewatch session")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log at debug level (overridden by BINGEWATCH_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Sign in through the browser
    Login,
    /// End the current session
    Logout,
    /// Show the signed-in account
    Whoami,
    /// Browse the movie catalog
    Movies {
        #[command(subcommand)]
        command: MovieCommands,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum MovieCommands {
    /// List popular movies
    Popular {
        /// Maximum number of movies to print
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Search movies by title (reads queries from stdin when QUERY is omitted)
    Search {
        #[arg(value_name = "QUERY")]
        query: Option<String>,

        /// Maximum number of movies to print per result
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },
    /// Show one movie from the popular list
    Show {
        #[arg(value_name = "MOVIE_ID")]
        id: u64,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // Logging is best effort; commands still run without it.
    let _log_guard = match logging::init(cli.verbose) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: logging disabled: {err:#}");
            None
        }
    };

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let config = config::Config::load().context("load config")?;

    match cli.command {
        Commands::Login => commands::auth::login(&config).await,
        Commands::Logout => commands::auth::logout(&config).await,
        Commands::Whoami => commands::auth::whoami(&config).await,

        Commands::Movies { command } => match command {
            MovieCommands::Popular { limit } => commands::movies::popular(&config, limit).await,
            MovieCommands::Search {
                query: Some(query),
                limit,
            } => commands::movies::search(&config, query, limit).await,
            MovieCommands::Search { query: None, limit } => {
                commands::movies::search_stdin(&config, limit).await
            }
            MovieCommands::Show { id } => commands::movies::show(&config, id).await,
        },

        Commands::Config { command } => match command {
            ConfigCommands::Path => {
                commands::config::path();
                Ok(())
            }
            ConfigCommands::Init => commands::config::init(),
        },
    }
}
