use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use flexi_logger::Logger;
use std::path::PathBuf;

use figsmith::contexts::{DEFAULT_MAX_TURNS, DEFAULT_TIMEOUT_SECS};
use figsmith::data::DiagramLanguage;

mod cli;

#[derive(Parser)]
#[command(name = "figsmith")]
#[command(about = "Generates, repairs and illustrates scientific diagrams from paper text", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Enable verbose debug output")]
    verbose: bool,

    #[arg(long, global = true, help = "Perform a dry run without executing actions")]
    dry_run: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Generate diagrams for parsed papers")]
    Generate {
        #[arg(long, default_value = "generated_diagram", help = "Directory receiving one folder per sample")]
        save_directory: PathBuf,

        #[arg(long, default_value = "samples/parsed_papers", help = "Directory of parsed paper JSON files")]
        parsed_paper_directory: PathBuf,

        #[arg(long, default_value = "input_images", help = "Directory of author images, one folder per sample")]
        input_images: PathBuf,

        #[arg(long, help = "Only process the sample with this file stem")]
        sample_id: Option<String>,

        #[arg(long, default_value = "drawio", help = "Diagram language: drawio, mermaid, tikz or svg")]
        language: DiagramLanguage,

        #[arg(long, default_value_t = DEFAULT_MAX_TURNS, help = "Turn cap for each refine and verify phase")]
        max_turns: usize,

        #[arg(long, default_value_t = 1, help = "Number of samples processed in parallel")]
        jobs: usize,

        #[arg(long, help = "Always call the generation service, ignoring cached replies")]
        no_cache: bool,

        #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, help = "Timeout for each generation service call")]
        timeout_secs: u64,
    },

    #[command(about = "Repair the structure of an mxGraph diagram file")]
    Repair {
        #[arg(help = "Diagram file to repair")]
        file: PathBuf,

        #[arg(long, short, help = "Write the repaired diagram here instead of stdout")]
        output: Option<PathBuf>,
    },

    #[command(about = "List the image placeholders of an mxGraph diagram file as JSON")]
    Placeholders {
        #[arg(help = "Diagram file to scan")]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let _logger = Logger::try_with_env_or_str(level)
        .context("Invalid log specification")?
        .log_to_stderr()
        .start()
        .context("Failed to start logger")?;

    let config = cli::Config {
        verbose: cli.verbose,
        dry_run: cli.dry_run,
    };

    match cli.command {
        Commands::Generate {
            save_directory,
            parsed_paper_directory,
            input_images,
            sample_id,
            language,
            max_turns,
            jobs,
            no_cache,
            timeout_secs,
        } => {
            let options = cli::GenerateOptions {
                save_directory,
                parsed_paper_directory,
                input_images,
                sample_id,
                language,
                max_turns,
                jobs,
                no_cache,
                timeout_secs,
            };
            cli::generate(options, &config).await?;
        }
        Commands::Repair { file, output } => {
            cli::repair(file, output, &config).await?;
        }
        Commands::Placeholders { file } => {
            cli::placeholders(file, &config).await?;
        }
    }

    Ok(())
}
