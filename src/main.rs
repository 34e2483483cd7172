use std::sync::Arc;

use clap::{
    CommandFactory, Parser, Subcommand,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use clap_complete::{Shell, generate};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use sporlstats::{
    cli::{self, SyncScope},
    config::Settings,
    error,
};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::White.on_default() | Effects::BOLD)
        .usage(AnsiColor::White.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightGreen.on_default())
}

#[derive(Parser, Debug, Clone)]
#[clap(
  version = env!("CARGO_PKG_VERSION"),
  name=env!("CARGO_PKG_NAME"),
  bin_name=env!("CARGO_PKG_NAME"),
  author=env!("CARGO_PKG_AUTHORS"),
  about=env!("CARGO_PKG_DESCRIPTION"),
  styles=styles(),
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Authorize a Spotify account
    Auth,

    /// List authorized accounts
    Users,

    /// Pull recent plays, top items and audio features
    Sync(SyncOptions),

    /// Show listening insights
    Insights(InsightsOptions),

    /// Get shell completions
    Completions(CompletionsOption),
}

#[derive(Parser, Debug, Clone)]
pub struct SyncOptions {
    /// Spotify user id; may be omitted when only one account is authorized
    #[clap(long)]
    pub user: Option<String>,

    /// Only sync recently played tracks
    #[clap(long, conflicts_with = "top_only")]
    pub plays_only: bool,

    /// Only replace the top artists and tracks
    #[clap(long)]
    pub top_only: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct InsightsOptions {
    /// Spotify user id; may be omitted when only one account is authorized
    #[clap(long)]
    pub user: Option<String>,

    /// Include genres, monthly trend, popularity and mood
    #[clap(long)]
    pub detailed: bool,

    /// Print JSON instead of tables
    #[clap(long)]
    pub json: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct CompletionsOption {
    shell: Shell,
}

/// Diagnostics go to stderr so JSON output stays parseable. `LOG_LEVEL`
/// takes an `EnvFilter` directive such as `debug` or `sporlstats=trace`.
fn init_tracing() {
    let filter = std::env::var("LOG_LEVEL")
        .ok()
        .and_then(|level| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Command::Completions(opt) = &cli.command {
        let mut cmd = Cli::command();
        let name = cmd.get_name().to_string();
        generate(opt.shell, &mut cmd, name, &mut std::io::stdout());
        return;
    }

    let settings = match Settings::load().await {
        Ok(settings) => Arc::new(settings),
        Err(e) => error!("Cannot load environment. Err: {}", e),
    };
    init_tracing();

    match cli.command {
        Command::Auth => cli::auth(settings).await,
        Command::Users => cli::users(&settings).await,
        Command::Sync(opt) => {
            let scope = if opt.plays_only {
                SyncScope::PlaysOnly
            } else if opt.top_only {
                SyncScope::TopOnly
            } else {
                SyncScope::All
            };
            cli::sync(settings, opt.user, scope).await
        }
        Command::Insights(opt) => {
            cli::insights(&settings, opt.user, opt.detailed, opt.json).await
        }
        Command::Completions(_) => {}
    }
}
