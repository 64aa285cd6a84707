//! TaskForge - AI-assisted project task tracking.
//!
//! Thin CLI over the library: argument parsing, console rendering, and
//! process exit codes live here; orchestration and reconciliation live in
//! the library crate.

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};

use taskforge::config::{CredentialResolver, ProjectConfig, Role};
use taskforge::error::{Result, TaskForgeError};
use taskforge::llm::{CallOrchestrator, OutputMode, ProviderRegistry};
use taskforge::logging::TracingSink;
use taskforge::tasks::{
    MergeMode, Reconciler, TagData, TaskSelector, TaskStatus, TaskStore, DEFAULT_TAG,
};
use taskforge::telemetry::TelemetryRecord;

#[derive(Parser)]
#[command(name = "taskforge")]
#[command(version)]
#[command(about = "AI-assisted project task tracker", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Tag (task namespace) to operate on
    #[arg(short, long, global = true, default_value = DEFAULT_TAG)]
    tag: String,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a task batch from a requirements document
    ParsePrd {
        /// Path to the requirements document
        input: PathBuf,

        /// Append the generated batch after existing tasks
        #[arg(long)]
        append: bool,

        /// Overwrite an existing non-empty tag
        #[arg(long)]
        force: bool,

        /// Role to use for the AI call
        #[arg(long, default_value = "main")]
        role: String,
    },

    /// Update one task from a natural-language instruction
    UpdateTask {
        /// Task id, e.g. 5
        id: u32,

        /// What to change
        #[arg(short = 'm', long)]
        prompt: String,

        /// Role to use for the AI call
        #[arg(long, default_value = "main")]
        role: String,
    },

    /// Set the status of a task or subtask (direct edit, no AI)
    SetStatus {
        /// Task or subtask id, e.g. 5 or 5.2
        id: TaskSelector,

        /// New status, e.g. pending, in-progress, done
        status: String,
    },

    /// Remove a task or subtask; other tasks' dependencies are cleaned up
    RemoveTask {
        /// Task or subtask id, e.g. 5 or 5.2
        id: TaskSelector,
    },

    /// List the tasks in a tag
    List,

    /// Show the configured role-to-model bindings
    Models,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "taskforge=debug,info"
    } else {
        "taskforge=info,warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let project = cli.project.canonicalize().unwrap_or(cli.project.clone());
    if !project.exists() {
        eprintln!(
            "{} Project directory does not exist: {}",
            "Error:".red().bold(),
            project.display()
        );
        std::process::exit(1);
    }

    if let Err(e) = run(&cli, &project).await {
        eprintln!("{} {e}", "Error:".red().bold());
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: &Cli, project: &Path) -> Result<()> {
    let store = TaskStore::for_project(project);

    match &cli.command {
        Commands::ParsePrd {
            input,
            append,
            force,
            role,
        } => parse_prd(cli, project, &store, input, *append, *force, role).await,
        Commands::UpdateTask { id, prompt, role } => {
            update_task(cli, project, &store, *id, prompt, role).await
        }
        Commands::SetStatus { id, status } => {
            store.set_status(&cli.tag, *id, TaskStatus::from(status.clone()))?;
            println!(
                "{} Task {} in tag '{}' is now {}",
                "✓".green().bold(),
                id,
                cli.tag,
                status.cyan()
            );
            Ok(())
        }
        Commands::RemoveTask { id } => {
            store.remove_task(&cli.tag, *id)?;
            println!(
                "{} Removed task {} from tag '{}'",
                "✓".green().bold(),
                id,
                cli.tag
            );
            Ok(())
        }
        Commands::List => list_tasks(cli, &store),
        Commands::Models => show_models(project),
    }
}

fn build_orchestrator(project: &Path) -> Result<CallOrchestrator> {
    ProviderRegistry::verify_tools()?;
    let config = ProjectConfig::load(project)?;
    Ok(CallOrchestrator::new(
        config,
        ProviderRegistry::new(),
        CredentialResolver::new(project),
        TracingSink::shared(),
    ))
}

async fn parse_prd(
    cli: &Cli,
    project: &Path,
    store: &TaskStore,
    input: &PathBuf,
    append: bool,
    force: bool,
    role: &str,
) -> Result<()> {
    if !input.exists() {
        return Err(TaskForgeError::MissingFile {
            path: input.clone(),
        });
    }
    let prd_text = fs::read_to_string(input)?;

    let orchestrator = build_orchestrator(project)?;
    let system = "You are a technical project planner. Produce a JSON array of tasks \
                  with fields: id, title, description, details, testStrategy, priority \
                  (high/medium/low), dependencies (ids of earlier tasks).";
    let prompt = format!("Break this requirements document into tasks:\n\n{prd_text}");

    let result = orchestrator
        .call(role, "parse-prd", Some(system), &prompt, OutputMode::Text)
        .await?;

    let reconciler = Reconciler::new(TracingSink::shared());
    let raw = match result.response.as_text() {
        Some(text) => text.to_string(),
        None => result
            .response
            .as_object()
            .map(ToString::to_string)
            .unwrap_or_default(),
    };
    let batch = reconciler.parse_batch(&raw)?;

    let mode = if append {
        MergeMode::Append
    } else {
        MergeMode::Replace
    };

    let count = store.mutate(|doc| {
        let tag = doc
            .entry(cli.tag.clone())
            .or_insert_with(|| TagData::empty(None));
        let assigned = reconciler.assign_ids(tag, batch);
        let count = assigned.len();
        reconciler.merge(&cli.tag, tag, assigned, mode, force)?;
        Ok(count)
    })?;

    println!(
        "{} Generated {} task(s) into tag '{}'",
        "✓".green().bold(),
        count,
        cli.tag
    );
    print_telemetry(result.telemetry.as_ref());
    Ok(())
}

async fn update_task(
    cli: &Cli,
    project: &Path,
    store: &TaskStore,
    id: u32,
    instruction: &str,
    role: &str,
) -> Result<()> {
    let doc = store.load()?;
    let tag_data = doc.get(&cli.tag).ok_or_else(|| TaskForgeError::TaskNotFound {
        id: id.to_string(),
        tag: cli.tag.clone(),
    })?;
    let original = tag_data
        .task(id)
        .cloned()
        .ok_or_else(|| TaskForgeError::TaskNotFound {
            id: id.to_string(),
            tag: cli.tag.clone(),
        })?;

    let orchestrator = build_orchestrator(project)?;
    let system = "You are a technical project planner. Return the updated task as a \
                  single JSON object with the same shape as the input.";
    let prompt = format!(
        "Apply this instruction to the task below and return the whole updated task.\n\
         Instruction: {instruction}\n\nTask:\n{}",
        serde_json::to_string_pretty(&original)?
    );

    let result = orchestrator
        .call(role, "update-task", Some(system), &prompt, OutputMode::Text)
        .await?;

    let reconciler = Reconciler::new(TracingSink::shared());
    let raw = match result.response.as_text() {
        Some(text) => text.to_string(),
        None => result
            .response
            .as_object()
            .map(ToString::to_string)
            .unwrap_or_default(),
    };
    let updated = reconciler.parse_single(&raw)?;
    let corrected = reconciler.correct_update(tag_data, &original, updated, instruction);
    store.replace_task(&cli.tag, corrected)?;

    println!(
        "{} Updated task {} in tag '{}'",
        "✓".green().bold(),
        id,
        cli.tag
    );
    print_telemetry(result.telemetry.as_ref());
    Ok(())
}

fn list_tasks(cli: &Cli, store: &TaskStore) -> Result<()> {
    let doc = store.load()?;
    let Some(tag) = doc.get(&cli.tag) else {
        println!("Tag '{}' has no tasks yet.", cli.tag);
        return Ok(());
    };

    println!("{}", format!("Tasks in '{}':", cli.tag).bold());
    for task in &tag.tasks {
        let status = render_status(&task.status);
        println!(
            "  {:>3}. [{}] {} {}",
            task.id,
            status,
            task.title,
            format!("({})", task.priority).dimmed()
        );
        for sub in &task.subtasks {
            println!(
                "       {}.{} [{}] {}",
                task.id,
                sub.id,
                render_status(&sub.status),
                sub.title
            );
        }
    }
    Ok(())
}

fn render_status(status: &TaskStatus) -> colored::ColoredString {
    let s = status.as_str();
    if status.is_complete() {
        s.green()
    } else if *status == TaskStatus::InProgress {
        s.yellow()
    } else {
        s.normal()
    }
}

fn show_models(project: &Path) -> Result<()> {
    let config = ProjectConfig::load(project)?;

    println!("{}", "Role bindings:".bold());
    for role in Role::ALL {
        match config.binding(role) {
            Some(binding) => println!(
                "  {:>9}: {} / {} (maxTokens {}, temperature {})",
                role,
                binding.provider.cyan(),
                binding.model_id.cyan(),
                binding.max_tokens,
                binding.temperature
            ),
            None => println!("  {:>9}: {}", role, "not configured".dimmed()),
        }
    }
    println!(
        "\nValid providers: {}. Configure in {}/config.json.",
        "anthropic, openai, local".cyan(),
        taskforge::config::CONFIG_DIR
    );
    Ok(())
}

fn print_telemetry(telemetry: Option<&TelemetryRecord>) {
    if let Some(t) = telemetry {
        println!(
            "{}",
            format!(
                "  {} / {} | {} tokens in, {} out, cost {:.6} {}",
                t.provider_name,
                t.model_used,
                t.input_tokens,
                t.output_tokens,
                t.total_cost,
                t.currency
            )
            .dimmed()
        );
    }
}
