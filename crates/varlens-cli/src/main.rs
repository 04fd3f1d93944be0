mod cmd;
mod output;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use varlens_core::Config;

#[derive(Parser)]
#[command(
    name = "varlens",
    about = "Plan-vs-actuals variance analysis: pivot views and an agent that answers questions from the data",
    version,
    propagate_version = true
)]
struct Cli {
    /// Dataset CSV (default: the configured default dataset)
    #[arg(long, short = 'f', global = true)]
    file: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, short = 'j', global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the plan and actuals pivot tables with summary figures
    View,

    /// Run one query expression against the dataset (the agent's tool surface)
    Query {
        /// e.g. 'filter Account == "Revenue" | sum(Actuals) - sum(Plan)'
        expression: String,
    },

    /// Ask a natural-language question about the data
    Ask {
        question: String,

        /// Replace the built-in variance context narrative with a file's contents
        #[arg(long)]
        context_file: Option<PathBuf>,

        /// Print the tool-call trail after the answer
        #[arg(long)]
        trace: bool,
    },

    /// Show the effective variance context narrative
    Context {
        /// Preview a narrative file instead of the built-in default
        #[arg(long)]
        context_file: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_target(false)
        .init();

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(Path::new("."))?;
    let file = cli.file.as_deref();
    match cli.command {
        Commands::View => cmd::view::run(&config, file, cli.json),
        Commands::Query { expression } => cmd::query::run(&config, file, &expression, cli.json),
        Commands::Ask {
            question,
            context_file,
            trace,
        } => cmd::ask::run(
            &config,
            file,
            &question,
            context_file.as_deref(),
            trace,
            cli.json,
        ),
        Commands::Context { context_file } => cmd::context::run(context_file.as_deref()),
    }
}
