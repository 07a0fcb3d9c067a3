//! `codesmith` — plan, generate, merge and commit source files with an LLM.
//!
//! # Usage
//!
//! ```bash
//! # Full pipeline against the current project
//! codesmith run --task "add logging to Foo.cs and create Bar.cs" \
//!     --include Assets/Scripts --system-prompt prompts/unity.md
//!
//! # Dry run: print the planned work items only
//! codesmith plan --task-file task.md --include src --provider anthropic
//!
//! # Recover records from a saved raw tool-argument dump, offline
//! codesmith parse .codesmith/results/failed-args.txt
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use codesmith::config::PathsConfig;
use codesmith::{
    CodesmithConfig, HttpTransport, ObserverSet, Pipeline, PipelineInput, PromptAuditLog,
    ProviderKind, ResultsArchive, TracingObserver,
};
use coordination::salvage::{self, RecordShape, ToolPayload};
use coordination::{concat_memory_files, ParseTier, SnapshotLoader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Plan, generate, merge and write every file the task needs
    Run(InputArgs),
    /// Print the planned work items without generating anything
    Plan(InputArgs),
    /// Run the offline parse tiers over a saved raw tool-argument text
    Parse {
        file: PathBuf,
        /// Parse as a plan (FilePath + TaskId) instead of file content
        #[arg(long, default_value_t = false)]
        plan: bool,
    },
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Project root; included paths and outputs are relative to it
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Task description
    #[arg(long, conflicts_with = "task_file", required_unless_present = "task_file")]
    task: Option<String>,

    /// Read the task description from a file
    #[arg(long)]
    task_file: Option<PathBuf>,

    /// Files or directories to include in the project snapshot
    #[arg(long = "include", num_args = 1..)]
    include: Vec<PathBuf>,

    /// System prompt template, used verbatim
    #[arg(long)]
    system_prompt: Option<PathBuf>,

    /// Memory files appended to every prompt, in order
    #[arg(long = "memory", num_args = 1..)]
    memory: Vec<PathBuf>,

    /// Config file (default: <root>/codesmith.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Provider override: openai, anthropic, gemini or groq
    #[arg(long)]
    provider: Option<ProviderKind>,

    /// Model override
    #[arg(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Plan(args) => plan(args).await,
        Command::Parse { file, plan } => parse(&file, plan),
    }
}

async fn run(args: InputArgs) -> Result<()> {
    let (pipeline, input) = prepare(&args)?;
    let report = pipeline.run(&input).await;

    for receipt in &report.committed {
        let action = if receipt.created { "created" } else { "updated" };
        println!("{action:>8}  {}", receipt.path);
    }
    for failure in &report.failures {
        println!("{:>8}  {failure}", "failed");
    }
    if !report.is_success() {
        bail!(
            "{} of {} file task(s) failed{}",
            report.failures.len(),
            report.work_items.len(),
            if report.aborted { ", queue aborted" } else { "" }
        );
    }
    Ok(())
}

async fn plan(args: InputArgs) -> Result<()> {
    let (pipeline, input) = prepare(&args)?;
    let items = pipeline.plan(&input).await?;
    for item in &items {
        println!("{}  {}", item.kind(), item.file_path());
    }
    Ok(())
}

fn parse(file: &Path, plan: bool) -> Result<()> {
    let raw = fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let shape = if plan { RecordShape::Plan } else { RecordShape::FileContent };
    let resp = salvage::salvage(&ToolPayload::from_raw(raw), shape);
    for warning in &resp.warnings {
        eprintln!("warning: {warning}");
    }
    let Some(records) = resp.payload else {
        bail!("no offline tier could recover {}", file.display());
    };
    let tier = ParseTier::from_name(&resp.served_by)
        .map(ParseTier::as_str)
        .unwrap_or("unknown");
    println!("tier: {tier} (confidence {:.1})", resp.confidence);
    if plan {
        for record in &records {
            match record.to_work_item() {
                Some(item) => println!("{}  {}", item.kind(), item.file_path()),
                None => println!("invalid  {} (TaskId `{}`)", record.file_path, record.value),
            }
        }
    } else {
        let artifacts: Vec<_> = records.into_iter().map(|r| r.into_artifact()).collect();
        println!("{}", serde_json::to_string_pretty(&artifacts)?);
    }
    Ok(())
}

/// Load config, snapshot and prompts, and wire the pipeline.
fn prepare(args: &InputArgs) -> Result<(Pipeline, PipelineInput)> {
    let root = args
        .root
        .canonicalize()
        .with_context(|| format!("project root {} does not exist", args.root.display()))?;

    let mut config = CodesmithConfig::load(&root, args.config.as_deref())?;
    if let Some(kind) = args.provider {
        if kind != config.provider.kind {
            // Defaults belong to the provider they were chosen for.
            config.provider.model = None;
            config.provider.api_key_env = None;
        }
        config.provider.kind = kind;
    }
    if let Some(model) = &args.model {
        config.provider.model = Some(model.clone());
    }
    config.validate().map_err(anyhow::Error::msg)?;
    let provider = config.provider.to_provider_config()?;

    let task = match (&args.task, &args.task_file) {
        (Some(task), _) => task.clone(),
        (None, Some(path)) => fs::read_to_string(path)
            .with_context(|| format!("failed to read task file {}", path.display()))?,
        (None, None) => bail!("either --task or --task-file is required"),
    };
    let system_prompt = match &args.system_prompt {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read system prompt {}", path.display()))?,
        None => String::new(),
    };
    let memory = concat_memory_files(&args.memory).context("failed to read memory files")?;
    let snapshot = SnapshotLoader::new(&root)
        .load(&args.include)
        .context("failed to load project snapshot")?;

    info!(
        root = %root.display(),
        provider = %provider.kind,
        model = %provider.model,
        files = snapshot.len(),
        "inputs loaded"
    );

    let observers = ObserverSet::new()
        .with(Arc::new(TracingObserver))
        .with(Arc::new(PromptAuditLog::new(PathsConfig::under(
            &root,
            &config.paths.prompt_log,
        ))))
        .with(Arc::new(ResultsArchive::new(PathsConfig::under(
            &root,
            &config.paths.results_dir,
        ))));

    let pipeline = Pipeline::from_config(
        &config,
        &root,
        provider,
        Arc::new(HttpTransport::new()),
        Arc::new(observers),
    );
    let input = PipelineInput::new(task, snapshot)
        .with_system_prompt(system_prompt)
        .with_memory(memory);
    Ok((pipeline, input))
}
