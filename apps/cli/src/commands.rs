//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use sitegen_artifacts::visible_text;
use sitegen_core::{Orchestrator, PipelineOptions, PipelineState, PipelineStatus};
use sitegen_provider::{AnthropicSource, TextSource};
use sitegen_shared::{
    AppConfig, Brief, ContextValue, PageSpec, expand_home, init_config, load_config, slugify,
    validate_api_key,
};
use sitegen_storage::Storage;
use tracing::{info, warn};

use crate::offline;
use crate::progress::CliProgress;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// SiteGen — generate a small website from a brief.
#[derive(Parser)]
#[command(
    name = "sitegen",
    version,
    about = "Generate a site theme, template parts and page sections from a short brief.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the generation pipeline for a brief.
    Generate(GenerateArgs),

    /// List stored sections of a project.
    Sections {
        /// Project id (defaults are derived from the site name).
        #[arg(long)]
        project: String,
    },

    /// List saved runs of a project.
    Runs {
        #[arg(long)]
        project: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Args)]
pub(crate) struct GenerateArgs {
    /// Kind of site: restaurant, portfolio, saas, agency, blog, ...
    #[arg(short = 't', long)]
    pub site_type: String,

    /// Display name of the site.
    #[arg(short, long)]
    pub name: String,

    /// Free-form description of the business.
    #[arg(short, long, default_value = "")]
    pub description: String,

    /// Known fact as key=value. Repeating a key builds a list.
    #[arg(short, long = "context", value_name = "KEY=VALUE")]
    pub context: Vec<String>,

    /// Page to generate as slug[:title]. Defaults to the plan for the site type.
    #[arg(short, long = "page", value_name = "SLUG[:TITLE]")]
    pub pages: Vec<String>,

    /// Maximum pages generated at once.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Project id used for storage (defaults to the slugified site name).
    #[arg(long)]
    pub project: Option<String>,

    /// Directory for the run snapshot JSON (defaults to config output_dir).
    #[arg(short, long)]
    pub out: Option<String>,

    /// Use canned replies instead of calling the API.
    #[arg(long)]
    pub offline: bool,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "sitegen=warn",
        1 => "sitegen=info",
        2 => "sitegen=debug",
        _ => "sitegen=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Generate(args) => cmd_generate(args).await,
        Command::Sections { project } => cmd_sections(&project).await,
        Command::Runs { project } => cmd_runs(&project).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Argument parsing
// ---------------------------------------------------------------------------

/// Build the brief from flags. A repeated key turns its value into a list.
fn build_brief(args: &GenerateArgs) -> Result<Brief> {
    let mut brief = Brief::new(args.site_type.as_str(), args.name.as_str())
        .with_description(args.description.as_str());

    for entry in &args.context {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| eyre!("invalid --context '{entry}': expected KEY=VALUE"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(eyre!("invalid --context '{entry}': empty key"));
        }
        let value = value.trim().to_string();
        let merged = match brief.context.remove(key) {
            None => ContextValue::Text(value),
            Some(ContextValue::Text(first)) => ContextValue::List(vec![first, value]),
            Some(ContextValue::List(mut items)) => {
                items.push(value);
                ContextValue::List(items)
            }
        };
        brief.context.insert(key.to_string(), merged);
    }
    Ok(brief)
}

fn parse_page(arg: &str) -> Result<PageSpec> {
    let (slug, title) = match arg.split_once(':') {
        Some((slug, title)) => (slugify(slug), title.trim().to_string()),
        None => (slugify(arg), arg.trim().to_string()),
    };
    if slug.is_empty() {
        return Err(eyre!("invalid --page '{arg}': empty slug"));
    }
    Ok(PageSpec::new(slug, title, ""))
}

fn pipeline_options(config: &AppConfig, args: &GenerateArgs) -> Result<PipelineOptions> {
    let mut options = PipelineOptions::from(config);
    options.project_id = match &args.project {
        Some(project) => project.clone(),
        None => slugify(&args.name),
    };
    if let Some(concurrency) = args.concurrency {
        options.page_concurrency = concurrency;
    }
    options.pages = args
        .pages
        .iter()
        .map(|p| parse_page(p))
        .collect::<Result<Vec<_>>>()?;
    Ok(options)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_generate(args: GenerateArgs) -> Result<()> {
    let config = load_config()?;
    let brief = build_brief(&args)?;
    let options = pipeline_options(&config, &args)?;

    let source: Arc<dyn TextSource> = if args.offline {
        Arc::new(offline::canned_source())
    } else {
        validate_api_key(&config)?;
        Arc::new(AnthropicSource::from_config(&config.anthropic)?)
    };

    let db_path = expand_home(&config.defaults.db_path);
    let storage = Arc::new(Storage::open(&db_path).await?);

    info!(
        site = %brief.site_name,
        site_type = %brief.site_type,
        project = %options.project_id,
        source = source.name(),
        "starting generation"
    );

    let progress = Arc::new(CliProgress::new());
    let orchestrator = Orchestrator::new(brief, source, storage, progress.clone(), options);

    let abort_handle = orchestrator.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping");
            abort_handle.abort();
        }
    });

    let state = orchestrator.start().await;
    ctrl_c.abort();
    progress.finish();

    let out_dir = args
        .out
        .as_deref()
        .map(PathBuf::from)
        .unwrap_or_else(|| expand_home(&config.defaults.output_dir));
    let snapshot_path = write_snapshot(&out_dir, &state)?;

    print_summary(&state, &orchestrator.options().project_id, &snapshot_path);

    match state.status {
        PipelineStatus::Complete => Ok(()),
        _ => Err(eyre!(
            "generation failed: {}",
            state.error.as_deref().unwrap_or("unknown error")
        )),
    }
}

fn write_snapshot(dir: &Path, state: &PipelineState) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| eyre!("cannot create '{}': {e}", dir.display()))?;
    let path = dir.join(format!("{}.json", state.run_id));
    let json = serde_json::to_string_pretty(state)?;
    std::fs::write(&path, json).map_err(|e| eyre!("cannot write '{}': {e}", path.display()))?;
    Ok(path)
}

fn print_summary(state: &PipelineState, project_id: &str, snapshot_path: &Path) {
    let notes = state
        .step("theme")
        .map(|step| visible_text(&step.artifacts))
        .unwrap_or_default();

    println!();
    match state.status {
        PipelineStatus::Complete => println!("  Site generated successfully!"),
        _ => println!("  Generation finished with errors."),
    }
    println!("  Run:      {}", state.run_id);
    println!("  Project:  {project_id}");
    for step in &state.steps {
        let suffix = match (&step.error, step.retry_count) {
            (Some(error), _) => format!(" ({error})"),
            (None, 0) => String::new(),
            (None, retries) => format!(" (after {retries} retries)"),
        };
        println!("  {:<24} {}{suffix}", step.label, step.status);
    }
    let sections: usize = state.pages.values().map(Vec::len).sum();
    println!("  Sections: {sections} on {} pages", state.pages.len());
    println!(
        "  Tokens:   {} in / {} out",
        state.usage.input_tokens, state.usage.output_tokens
    );
    if !notes.is_empty() {
        println!("  Notes:    {notes}");
    }
    println!("  Snapshot: {}", snapshot_path.display());
    println!();
}

async fn open_db_readonly() -> Result<Storage> {
    let config = load_config()?;
    let path = expand_home(&config.defaults.db_path);
    Ok(Storage::open_readonly(&path).await?)
}

async fn cmd_sections(project: &str) -> Result<()> {
    let storage = open_db_readonly().await?;
    let sections = storage.list_sections(project).await?;
    if sections.is_empty() {
        println!("No sections stored for project '{project}'.");
        return Ok(());
    }
    for section in sections {
        let section_type = section.content["type"].as_str().unwrap_or("?");
        println!(
            "{:<28} {:<22} {}",
            section.section_id,
            section_type,
            section.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

async fn cmd_runs(project: &str) -> Result<()> {
    let storage = open_db_readonly().await?;
    let runs = storage.list_runs(project).await?;
    if runs.is_empty() {
        println!("No runs saved for project '{project}'.");
        return Ok(());
    }
    for run in runs {
        let error = run.snapshot["error"].as_str().unwrap_or("");
        println!(
            "{}  {:<8}  {}  {error}",
            run.id,
            run.status,
            run.created_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
