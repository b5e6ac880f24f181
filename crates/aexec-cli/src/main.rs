use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use aexec::Error;
use aexec::cancel::CancelToken;
use aexec::config::{ConfigLoader, JsonConfigLoader};
use aexec::filter;
use aexec::fs::OsFs;
use aexec::keywords::KeywordMatcher;
use aexec::paths::{self, ProjectLayout};
use aexec::pipeline::{Pipeline, RunOptions};
use aexec::runner::{DEFAULT_COMMAND_TEMPLATE, ShellRunner};
use aexec_common::config::types::FilterConfig;

#[derive(Parser)]
#[command(
    name = "aexec",
    version,
    about = "Run anonymous Apex and keep only the log lines you care about"
)]
struct Cli {
    /// Project directory (default: nearest ancestor with sfdx-project.json,
    /// .sfdx/ or anonymous/)
    #[arg(short = 'C', long, global = true, env = "AEXEC_PROJECT_DIR")]
    project_dir: Option<PathBuf>,

    /// Show debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Show how long each stage took
    #[arg(long, global = true)]
    timing: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create anonymous/anon.apex and anonymous/aexec-config.json if missing
    Setup,
    /// Execute anonymous/anon.apex and write the filtered log
    Run {
        /// Org username or alias (default: defaultusername from sfdx config)
        #[arg(long, env = "AEXEC_TARGET_ORG")]
        target_org: Option<String>,
        /// Command to run; {file} and {username} are substituted
        #[arg(long, env = "AEXEC_COMMAND_TEMPLATE", default_value = DEFAULT_COMMAND_TEMPLATE)]
        command_template: String,
        /// Also save the unfiltered output to anonymous/raw.log
        #[arg(long)]
        raw: bool,
    },
    /// Show the setup state of the project
    Status,
    /// Filter an already captured log and print the result
    Filter {
        /// Path to the captured execute-anonymous output
        log_path: PathBuf,
        /// Keyword to keep (repeatable; default: the project's filterKeys)
        #[arg(short, long = "key", alias = "keys", value_name = "KEY")]
        keys: Vec<String>,
    },
    /// Print a shell completion script
    Completions {
        shell: clap_complete::Shell,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "aexec=debug,aexec_filter=debug"
    } else {
        "warn"
    };
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("AEXEC_LOG").unwrap_or_else(|_| default.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

fn project_layout(cli: &Cli) -> anyhow::Result<ProjectLayout> {
    let root = match &cli.project_dir {
        Some(dir) => dir.clone(),
        None => {
            let cwd = std::env::current_dir().context("cannot read current directory")?;
            paths::project_root_for(&cwd)
        }
    };
    tracing::debug!(root = %root.display(), "project root");
    Ok(ProjectLayout::new(root))
}

fn pipeline_for(
    layout: ProjectLayout,
    target_org: Option<String>,
    options: RunOptions,
) -> Pipeline<OsFs, ShellRunner, JsonConfigLoader<OsFs>> {
    let config = JsonConfigLoader::new(OsFs, layout.clone(), target_org);
    Pipeline::new(OsFs, ShellRunner::new(), config, layout, options)
}

fn cmd_setup(cli: &Cli) -> anyhow::Result<i32> {
    let layout = project_layout(cli)?;
    let outcome = pipeline_for(layout.clone(), None, RunOptions::default()).setup()?;
    for path in &outcome.created {
        tracing::debug!(path = %layout.display_relative(path), "created");
    }
    println!("{}", outcome.message());
    Ok(0)
}

fn cmd_run(
    cli: &Cli,
    target_org: Option<&str>,
    command_template: &str,
    raw: bool,
) -> anyhow::Result<i32> {
    let layout = project_layout(cli)?;
    let options = RunOptions {
        command_template: command_template.to_string(),
        save_raw: raw,
    };
    let pipeline = pipeline_for(layout.clone(), target_org.map(ToString::to_string), options);

    let cancel = CancelToken::new();
    if let Err(e) = cancel.install_signal_handlers() {
        tracing::warn!(error = %e, "could not install signal handlers");
    }

    let report = pipeline.execute(&cancel)?;

    if let Some(ref raw_path) = report.raw_path {
        eprintln!("[aexec] raw output saved to {}", layout.display_relative(raw_path));
    }
    if cli.timing {
        eprintln!(
            "[aexec] run took {:.1}ms ({} of {} lines kept)",
            report.elapsed.as_secs_f64() * 1000.0,
            report.stats.kept(),
            report.stats.total
        );
    }
    println!(
        "Anonymous Apex completed. View the log in {}.",
        layout.display_relative(&report.output_path)
    );
    Ok(0)
}

fn cmd_status(cli: &Cli) -> anyhow::Result<i32> {
    let layout = project_layout(cli)?;
    let inventory = pipeline_for(layout.clone(), None, RunOptions::default()).inspect()?;
    let state = inventory.state();

    println!("project: {}", layout.root().display());
    println!("state:   {state}");
    for (path, present) in [
        (layout.anon_file(), inventory.anon),
        (layout.config_file(), inventory.config),
        (layout.log_file(), inventory.log),
    ] {
        let mark = if present { "present" } else { "missing" };
        println!("  {:<30} {mark}", layout.display_relative(&path));
    }
    if !state.is_valid() {
        eprintln!("[aexec] run `aexec setup` to create the missing files");
    }
    Ok(0)
}

/// Keywords from `--key`, else the project's config, else the built-in defaults.
fn filter_keys(layout: &ProjectLayout, keys: &[String]) -> anyhow::Result<KeywordMatcher> {
    if !keys.is_empty() {
        return Ok(KeywordMatcher::new(keys.iter().map(String::as_str)));
    }
    if !layout.config_file().is_file() {
        tracing::debug!("no project filter config, using defaults");
        return Ok(KeywordMatcher::from_config(&FilterConfig::default()));
    }
    let config = JsonConfigLoader::new(OsFs, layout.clone(), None).load_filter_config()?;
    Ok(KeywordMatcher::from_config(&config))
}

fn cmd_filter(cli: &Cli, log_path: &Path, keys: &[String]) -> anyhow::Result<i32> {
    let layout = project_layout(cli)?;
    let matcher = filter_keys(&layout, keys)?;
    let text = std::fs::read_to_string(log_path)
        .with_context(|| format!("cannot read log {}", log_path.display()))?;

    let start = Instant::now();
    let output = filter::filter_log_with_stats(&text, &matcher)?;
    let elapsed = start.elapsed();

    if !output.text.is_empty() {
        println!("{}", output.text);
    }
    if cli.timing {
        eprintln!(
            "[aexec] filter took {:.1}ms ({} of {} lines kept)",
            elapsed.as_secs_f64() * 1000.0,
            output.stats.kept(),
            output.stats.total
        );
    }
    Ok(0)
}

fn cmd_completions(shell: clap_complete::Shell) -> i32 {
    clap_complete::generate(shell, &mut Cli::command(), "aexec", &mut std::io::stdout());
    0
}

fn or_exit(r: anyhow::Result<i32>) -> i32 {
    r.unwrap_or_else(|e| {
        eprintln!("[aexec] error: {e:#}");
        e.downcast_ref::<Error>().map_or(1, Error::exit_code)
    })
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match &cli.command {
        Commands::Setup => or_exit(cmd_setup(&cli)),
        Commands::Run {
            target_org,
            command_template,
            raw,
        } => or_exit(cmd_run(&cli, target_org.as_deref(), command_template, *raw)),
        Commands::Status => or_exit(cmd_status(&cli)),
        Commands::Filter { log_path, keys } => or_exit(cmd_filter(&cli, log_path, keys)),
        Commands::Completions { shell } => cmd_completions(*shell),
    };
    std::process::exit(exit_code);
}
