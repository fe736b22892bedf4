use clap::builder::{styling::AnsiColor, Styles};
use clap::ColorChoice;
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use commands::{
    init_config, patch_asset, prepatch_cache, show_config, show_index, CliContext,
    PatchAssetArgs, PrepatchCacheArgs, ShowIndexArgs,
};
use miette::Result;
use tracing_subscriber::EnvFilter;

mod commands;
mod errors;
mod utils;

const DEFAULT_LOG_FILTER: &str = "kcs_patcher=info,kcs_patcher_cli=info";
const VERBOSE_LOG_FILTER: &str = "kcs_patcher=debug,kcs_patcher_cli=debug";

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (defaults to kcs-patcher.toml next to the executable)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the override index and list every target
    Index {
        /// Only list targets under this key prefix
        #[arg(short, long)]
        filter: Option<String>,
    },
    /// Patch a single cached asset
    Patch {
        /// The asset key, e.g. /kcs2/img/common/sheet.png
        #[arg(short, long)]
        key: String,

        /// Write the resulting bytes to this file
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Patch every cached image ahead of time
    Prepatch {
        /// Number of images patched concurrently
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Inspect or create the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the resolved configuration
    Show,
    /// Write a default configuration file
    Init,
}

fn parse_args() -> Args {
    // Configure colored/styled help output
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default().bold())
        .usage(AnsiColor::Green.on_default().bold())
        .literal(AnsiColor::Cyan.on_default())
        .placeholder(AnsiColor::Blue.on_default());

    let matches = Args::command()
        .styles(styles)
        .color(ColorChoice::Auto)
        .get_matches();

    Args::from_arg_matches(&matches).unwrap_or_else(|e| e.exit())
}

fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new(VERBOSE_LOG_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = parse_args();
    init_logging(args.verbose);

    let ctx = CliContext::load(args.config)?;

    match args.command {
        Commands::Index { filter } => show_index(&ctx, ShowIndexArgs { filter }),
        Commands::Patch { key, output } => patch_asset(&ctx, PatchAssetArgs { key, output }),
        Commands::Prepatch { concurrency } => {
            prepatch_cache(&ctx, PrepatchCacheArgs { concurrency })
        }
        Commands::Config { action } => match action {
            ConfigCommands::Show => show_config(&ctx),
            ConfigCommands::Init => init_config(&ctx),
        },
    }
}
