// Copyright 2026 Harvest Contributors
// SPDX-License-Identifier: Apache-2.0

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use unsplash_harvest::cli::{self, harvest_cmd::HarvestArgs, output, EXIT_FATAL, EXIT_OK};

#[derive(Parser)]
#[command(
    name = "unsplash-harvest",
    about = "Download photos from Unsplash search results",
    version,
    after_help = "Run without a command to harvest; missing query or count are prompted for."
)]
struct Cli {
    /// Search query
    #[arg(short, long)]
    query: Option<String>,

    /// Number of images to download
    #[arg(short = 'n', long)]
    num_images: Option<usize>,

    /// Output directory
    #[arg(short, long, default_value = "downloads")]
    output: PathBuf,

    /// Show the browser window
    #[arg(long)]
    no_headless: bool,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Parallel downloads
    #[arg(long)]
    concurrency: Option<usize>,

    /// Overall deadline in seconds
    #[arg(long)]
    deadline: Option<u64>,

    /// Print the result as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that a harvest run could start
    Doctor,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish)
        shell: Shell,
    },
}

fn init_tracing(level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    let result = match cli.command {
        None => {
            cli::harvest_cmd::run(HarvestArgs {
                query: cli.query,
                num_images: cli.num_images,
                output: cli.output,
                no_headless: cli.no_headless,
                config: cli.config,
                concurrency: cli.concurrency,
                deadline_secs: cli.deadline,
                json: cli.json,
            })
            .await
        }
        Some(Commands::Doctor) => {
            cli::doctor::run(cli.config.as_deref(), &cli.output, cli.json).await
        }
        Some(Commands::Completions { shell }) => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "unsplash-harvest", &mut std::io::stdout());
            Ok(EXIT_OK)
        }
    };

    // 0 = success or cancelled, 1 = fatal, 2 = nothing found
    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            if cli.json {
                output::print_json(&serde_json::json!({
                    "error": true,
                    "message": format!("{e:#}"),
                }));
            } else {
                eprintln!("Error: {e:#}");
            }
            std::process::exit(EXIT_FATAL);
        }
    }
}
