use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

mod progress;
mod samples;

use progress::ProgressIndicator;
use samples::{load_candidate_images, load_samples, write_outputs};

use figsmith::contexts::{
    CachedGenerationService, ChatCompletionClient, DiagramPipeline, GenerationService,
    PipelineOptions, ServiceSettings, find_placeholders_in, repair_diagram,
};
use figsmith::data::{DiagramLanguage, LogDiagnostics, Sample};
use figsmith::registries::{FileAgentModelRegistry, FileAgentRegistry};

#[derive(Clone, Copy)]
pub struct Config {
    pub verbose: bool,
    pub dry_run: bool,
}

/// Agents the generate command needs before any sample starts
const PIPELINE_AGENTS: [&str; 7] = [
    "describe_figure",
    "generate_layout",
    "refine_layout",
    "verify_layout",
    "plan_replacements",
    "generate_svg",
    "search_author_image",
];

pub struct GenerateOptions {
    pub save_directory: PathBuf,
    pub parsed_paper_directory: PathBuf,
    pub input_images: PathBuf,
    pub sample_id: Option<String>,
    pub language: DiagramLanguage,
    pub max_turns: usize,
    pub jobs: usize,
    pub no_cache: bool,
    pub timeout_secs: u64,
}

/// Shared, read-only state every sample task borrows
struct SampleContext {
    service: Arc<dyn GenerationService>,
    agent_registry: FileAgentRegistry,
    model_registry: FileAgentModelRegistry,
    pipeline_options: PipelineOptions,
    input_images: PathBuf,
    save_directory: PathBuf,
    verbose: bool,
}

pub async fn generate(options: GenerateOptions, config: &Config) -> Result<()> {
    let samples = load_samples(&options.parsed_paper_directory, options.sample_id.as_deref())?;

    if samples.is_empty() {
        println!("No samples found to process");
        return Ok(());
    }

    let agent_registry = FileAgentRegistry::new(None);
    agent_registry.ensure_agents(&PIPELINE_AGENTS)?;

    if config.dry_run {
        println!(
            "[DRY RUN] Would generate {} diagram(s) in {}:",
            samples.len(),
            options.language
        );
        for sample in &samples {
            let candidates = load_candidate_images(&options.input_images, &sample.name)?;
            println!("  - {} ({} candidate image(s))", sample.name, candidates.len());
        }
        return Ok(());
    }

    fs::create_dir_all(&options.save_directory).context(format!(
        "Failed to create {}",
        options.save_directory.display()
    ))?;

    let settings =
        ServiceSettings::from_env().with_timeout(Duration::from_secs(options.timeout_secs));
    if settings.api_key.is_none() {
        eprintln!("Warning: API_KEY is not set; generation calls will fail");
    }
    let client = ChatCompletionClient::new(settings);
    let service: Arc<dyn GenerationService> = if options.no_cache {
        Arc::new(client)
    } else {
        Arc::new(CachedGenerationService::new(client, None))
    };

    let context = Arc::new(SampleContext {
        service,
        agent_registry,
        model_registry: FileAgentModelRegistry::new(None, None),
        pipeline_options: PipelineOptions {
            language: options.language,
            max_turns: options.max_turns,
        },
        input_images: options.input_images,
        save_directory: options.save_directory,
        verbose: config.verbose,
    });

    println!(
        "Generating {} diagram(s) in {} with up to {} parallel job(s)",
        samples.len(),
        options.language,
        options.jobs.max(1)
    );

    let mut progress = ProgressIndicator::new(samples.len());
    let semaphore = Arc::new(Semaphore::new(options.jobs.max(1)));
    let mut tasks = Vec::new();

    for sample in samples {
        progress.start_item(&sample.name);

        let name = sample.name.clone();
        let semaphore = semaphore.clone();
        let context = context.clone();

        tasks.push((
            name,
            tokio::task::spawn(async move {
                let _permit = semaphore.acquire_owned().await?;
                tokio::task::spawn_blocking(move || process_sample(&sample, &context)).await?
            }),
        ));
    }

    for (name, task) in tasks {
        let result = task
            .await
            .map_err(anyhow::Error::from)
            .and_then(|result| result);
        match result {
            Ok(diagram_path) => {
                progress.complete_item(&name, true);
                if config.verbose {
                    println!("  Wrote {}", diagram_path.display());
                }
            }
            Err(e) => {
                progress.complete_item(&name, false);
                eprintln!("✗ Failed to generate diagram for {}: {:#}", name, e);
            }
        }
    }

    progress.finish();

    if progress.failed() > 0 {
        return Err(anyhow!("{} sample(s) failed", progress.failed()));
    }

    Ok(())
}

/// Runs the full pipeline for one sample on a blocking worker thread
fn process_sample(sample: &Sample, context: &SampleContext) -> Result<PathBuf> {
    let candidates = load_candidate_images(&context.input_images, &sample.name)?;
    if context.verbose {
        println!("  {}: {} candidate image(s)", sample.name, candidates.len());
    }

    let diagnostics = LogDiagnostics::scoped(&sample.name);
    let pipeline = DiagramPipeline::new(
        &*context.service,
        &context.agent_registry,
        &context.model_registry,
        &diagnostics,
        context.pipeline_options,
    );

    let record = pipeline.run(sample, &candidates)?;

    write_outputs(
        &context.save_directory,
        &sample.name,
        &record,
        context.pipeline_options.language,
    )
}

pub async fn repair(file: PathBuf, output: Option<PathBuf>, config: &Config) -> Result<()> {
    let text = read_diagram(&file)?;
    let diagnostics = LogDiagnostics::scoped(file.display().to_string());
    let repaired = repair_diagram(&text, &diagnostics);

    match output {
        Some(path) if !config.dry_run => {
            fs::write(&path, &repaired).context(format!("Failed to write {}", path.display()))?;
            if config.verbose {
                println!("Repaired {} -> {}", file.display(), path.display());
            }
        }
        Some(path) => {
            println!("[DRY RUN] Would write repaired diagram to {}", path.display());
        }
        None => println!("{}", repaired),
    }

    Ok(())
}

pub async fn placeholders(file: PathBuf, _config: &Config) -> Result<()> {
    let text = read_diagram(&file)?;
    let diagnostics = LogDiagnostics::scoped(file.display().to_string());
    let found = find_placeholders_in(&text, &diagnostics);

    let json = serde_json::to_string_pretty(&found).context("Failed to serialize placeholders")?;
    println!("{}", json);

    Ok(())
}

fn read_diagram(path: &Path) -> Result<String> {
    fs::read_to_string(path).context(format!("Failed to read diagram {}", path.display()))
}
