//! CLI - Command Line Interface
//!
//! Available Commands:
//! - taskmind create "text"    - Create a task from natural language (or --title)
//! - taskmind parse "text"     - Parse text into a task draft without saving
//! - taskmind tags <title>     - Suggest tags
//! - taskmind breakdown <desc> - Break a task into subtasks
//! - taskmind priority <title> - Recommend a priority
//! - taskmind list             - List tasks
//! - taskmind search <query>   - Search tasks
//! - taskmind show/status/delete <id>

use chrono::{Local, NaiveDateTime};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::filter::LevelFilter;

use taskmind_core::llm::ProviderOrchestrator;
use taskmind_core::{
    ConfigLoader, NewTask, ProviderMode, StorageBackend, TaskId, TaskPriority, TaskStatus,
    TaskmindConfig,
};
use taskmind_storage::{
    JsonStorage, SharedStorage, TaskFilter, TaskService, create_memory_storage,
};

use crate::output;

/// CLI Errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Task error: {0}")]
    TaskError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Output error: {0}")]
    OutputError(String),
}

/// CLI Configuration
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Config file path
    pub config_path: PathBuf,

    /// Storage path override
    pub storage_path: Option<PathBuf>,

    /// Provider mode override
    pub provider: Option<ProviderMode>,

    /// Verbose output
    pub verbose: bool,

    /// Output format
    pub output_format: OutputFormat,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from(taskmind_core::config::DEFAULT_CONFIG_PATH),
            storage_path: None,
            provider: None,
            verbose: false,
            output_format: OutputFormat::Pretty,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Json,
    Minimal,
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
pub(crate) enum ProviderArg {
    Auto,
    Openai,
    #[value(alias = "google")]
    Gemini,
}

impl From<ProviderArg> for ProviderMode {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Auto => ProviderMode::Auto,
            ProviderArg::Openai => ProviderMode::OpenAi,
            ProviderArg::Gemini => ProviderMode::Gemini,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
pub(crate) enum StatusArg {
    Pending,
    InProgress,
    Completed,
}

impl From<StatusArg> for TaskStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Pending => TaskStatus::Pending,
            StatusArg::InProgress => TaskStatus::InProgress,
            StatusArg::Completed => TaskStatus::Completed,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, ValueEnum)]
pub(crate) enum PriorityArg {
    Low,
    Medium,
    High,
}

impl From<PriorityArg> for TaskPriority {
    fn from(arg: PriorityArg) -> Self {
        match arg {
            PriorityArg::Low => TaskPriority::Low,
            PriorityArg::Medium => TaskPriority::Medium,
            PriorityArg::High => TaskPriority::High,
        }
    }
}

/// Taskmind CLI
#[derive(Parser, Debug)]
#[command(name = "taskmind")]
#[command(author, version, about = "AI-assisted task manager", long_about = None)]
pub(crate) struct Cli {
    /// Config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Task store (JSON file)
    #[arg(short, long, global = true)]
    pub storage: Option<PathBuf>,

    /// AI provider selection
    #[arg(long, global = true, value_enum)]
    pub provider: Option<ProviderArg>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, value_enum)]
    pub output: Option<OutputFormat>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Create a task from natural language, or from explicit fields
    Create(CreateArgs),

    /// Parse natural language into a task draft without saving it
    Parse(TextArgs),

    /// Suggest tags for a task
    Tags(TitleArgs),

    /// Break a task down into subtasks
    Breakdown(TextArgs),

    /// Recommend a priority for a task
    Priority(TitleArgs),

    /// List tasks
    List(ListArgs),

    /// Search tasks by meaning
    Search(SearchArgs),

    /// Show one task
    Show(IdArgs),

    /// Change the status of a task
    Status(StatusArgs),

    /// Delete a task
    Delete(IdArgs),
}

#[derive(Args, Debug)]
pub(crate) struct CreateArgs {
    /// Natural-language description, e.g. "call mom tomorrow at 6pm"
    #[arg(required_unless_present = "title", conflicts_with = "title")]
    pub text: Option<String>,

    /// Title for a manually specified task
    #[arg(long)]
    pub title: Option<String>,

    #[arg(short, long, requires = "title")]
    pub description: Option<String>,

    #[arg(short, long, value_enum, requires = "title")]
    pub priority: Option<PriorityArg>,

    /// Tag (repeatable)
    #[arg(short, long = "tag", requires = "title")]
    pub tags: Vec<String>,
}

#[derive(Args, Debug)]
pub(crate) struct TextArgs {
    pub text: String,
}

#[derive(Args, Debug)]
pub(crate) struct TitleArgs {
    pub title: String,

    #[arg(short, long)]
    pub description: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct ListArgs {
    #[arg(long, value_enum)]
    pub status: Option<StatusArg>,

    #[arg(long, value_enum)]
    pub priority: Option<PriorityArg>,

    #[arg(long, default_value_t = 0)]
    pub skip: usize,

    #[arg(long, default_value_t = 100)]
    pub limit: usize,
}

#[derive(Args, Debug)]
pub(crate) struct SearchArgs {
    /// Search query
    pub query: String,

    /// Number of results (1-20)
    #[arg(short = 'k', long, default_value_t = 5)]
    pub top_k: usize,
}

#[derive(Args, Debug)]
pub(crate) struct IdArgs {
    pub id: String,
}

#[derive(Args, Debug)]
pub(crate) struct StatusArgs {
    pub id: String,

    #[arg(value_enum)]
    pub status: StatusArg,
}

/// Parse CLI arguments and execute commands
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    let config = CliConfig {
        config_path: cli
            .config
            .clone()
            .unwrap_or_else(|| CliConfig::default().config_path),
        storage_path: cli.storage.clone(),
        provider: cli.provider.map(ProviderMode::from),
        verbose: cli.verbose,
        output_format: cli.output.unwrap_or(OutputFormat::Pretty),
    };

    init_tracing(config.verbose);
    execute(cli.command, &config).await
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    // A second init (e.g. in tests) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Load the config file and environment, then apply CLI overrides
pub fn load_config(cli: &CliConfig) -> Result<TaskmindConfig, CliError> {
    let mut loader = ConfigLoader::with_path(&cli.config_path);
    loader
        .load()
        .map_err(|e| CliError::ConfigError(e.to_string()))?;
    let mut config = loader.into_config();

    if let Some(mode) = cli.provider {
        config.llm.mode = mode;
    }
    if let Some(path) = &cli.storage_path {
        config.storage.backend = StorageBackend::Json;
        config.storage.path = path.clone();
    }
    debug!(config = ?config, "Configuration loaded");
    Ok(config)
}

async fn open_storage(config: &TaskmindConfig) -> Result<SharedStorage, CliError> {
    match config.storage.backend {
        StorageBackend::Memory => Ok(create_memory_storage()),
        StorageBackend::Json => {
            let storage = JsonStorage::open(&config.storage.path)
                .await
                .map_err(|e| CliError::StorageError(e.to_string()))?;
            Ok(Arc::new(storage))
        }
    }
}

async fn open_service(config: &TaskmindConfig) -> Result<TaskService, CliError> {
    let storage = open_storage(config).await?;
    let orchestrator = Arc::new(ProviderOrchestrator::from_config(&config.llm));
    TaskService::open(storage, orchestrator)
        .await
        .map_err(|e| CliError::StorageError(e.to_string()))
}

fn parse_id(raw: &str) -> Result<TaskId, CliError> {
    raw.parse()
        .map_err(|_| CliError::InvalidArgument(format!("not a task id: {raw}")))
}

fn task_error(e: impl std::fmt::Display) -> CliError {
    CliError::TaskError(e.to_string())
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

pub(crate) async fn execute(command: Commands, cli: &CliConfig) -> Result<(), CliError> {
    let config = load_config(cli)?;
    let format = cli.output_format;

    let rendered = match command {
        Commands::Create(args) => cmd_create(args, &config, format).await?,
        Commands::Parse(args) => {
            let orchestrator = ProviderOrchestrator::from_config(&config.llm);
            let draft = orchestrator
                .parse_text(&args.text, local_now())
                .await
                .map_err(task_error)?;
            output::render_draft(&draft, format)?
        }
        Commands::Tags(args) => {
            let orchestrator = ProviderOrchestrator::from_config(&config.llm);
            let tags = orchestrator
                .suggest_tags(&args.title, args.description.as_deref())
                .await
                .map_err(task_error)?;
            output::render_tags(&tags, format)?
        }
        Commands::Breakdown(args) => {
            let orchestrator = ProviderOrchestrator::from_config(&config.llm);
            let steps = orchestrator
                .breakdown(&args.text)
                .await
                .map_err(task_error)?;
            output::render_subtasks(&steps, format)?
        }
        Commands::Priority(args) => {
            let orchestrator = ProviderOrchestrator::from_config(&config.llm);
            let rec = orchestrator
                .recommend_priority(&args.title, args.description.as_deref())
                .await
                .map_err(task_error)?;
            output::render_priority(&rec, format)?
        }
        Commands::List(args) => {
            let service = open_service(&config).await?;
            let filter = TaskFilter {
                status: args.status.map(TaskStatus::from),
                priority: args.priority.map(TaskPriority::from),
                skip: args.skip,
                limit: Some(args.limit),
            };
            let (tasks, total) = service.list(&filter).await.map_err(task_error)?;
            output::render_tasks(&tasks, total, format)?
        }
        Commands::Search(args) => {
            let service = open_service(&config).await?;
            info!(query = %args.query, top_k = args.top_k, "Searching tasks");
            let results = service
                .search(&args.query, args.top_k)
                .await
                .map_err(task_error)?;
            output::render_search(&results, format)?
        }
        Commands::Show(args) => {
            let service = open_service(&config).await?;
            let task = service.get(&parse_id(&args.id)?).await.map_err(task_error)?;
            output::render_task(&task, format)?
        }
        Commands::Status(args) => {
            let service = open_service(&config).await?;
            let task = service
                .set_status(&parse_id(&args.id)?, args.status.into())
                .await
                .map_err(task_error)?;
            output::render_task(&task, format)?
        }
        Commands::Delete(args) => {
            let service = open_service(&config).await?;
            let id = parse_id(&args.id)?;
            service.delete(&id).await.map_err(task_error)?;
            match format {
                OutputFormat::Json => output::render_deleted(&id)?,
                _ => format!("Deleted {id}"),
            }
        }
    };

    println!("{rendered}");
    Ok(())
}

async fn cmd_create(
    args: CreateArgs,
    config: &TaskmindConfig,
    format: OutputFormat,
) -> Result<String, CliError> {
    let service = open_service(config).await?;

    if let Some(title) = args.title {
        let input = NewTask {
            title,
            description: args.description,
            priority: args.priority.map(TaskPriority::from).unwrap_or_default(),
            tags: args.tags,
            ..Default::default()
        };
        let task = service.create(input).await.map_err(task_error)?;
        return output::render_task(&task, format);
    }

    let text = args
        .text
        .ok_or_else(|| CliError::InvalidArgument("either text or --title is required".to_string()))?;
    let created = service
        .create_from_text(&text, local_now())
        .await
        .map_err(task_error)?;
    output::render_created(&created, format)
}
