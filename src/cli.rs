//! Command-line interface: argument parsing, wiring, and exit codes.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use tracing::error;

use crate::agent::AgentInvoker;
use crate::config::{CliOverrides, Config};
use crate::dry_run::DryRunExecutor;
use crate::error::FormbridgeError;
use crate::exit_codes::ExitCode;
use crate::orchestrator::Orchestrator;
use crate::report::RunReport;
use crate::runner::RunOptions;
use crate::stage::StageExecutor;
use crate::stages::PIPELINE;
use crate::store::ArtifactStore;
use crate::types::{SkipSet, StageId};

#[derive(Debug, Parser)]
#[command(
    name = "formbridge",
    version,
    about = "Convert legacy desktop forms into web admin scaffolding, one entity at a time"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose logging (also honors RUST_LOG)
    #[arg(long, global = true)]
    verbose: bool,

    /// Output root for generated artifacts
    #[arg(long, global = true, value_name = "DIR")]
    output: Option<Utf8PathBuf>,

    /// Directory holding optional per-stage task overlay files
    #[arg(long, global = true, value_name = "DIR")]
    tasks_dir: Option<Utf8PathBuf>,

    /// Agent CLI binary to invoke
    #[arg(long, global = true, value_name = "BIN")]
    agent_binary: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the full pipeline for an entity
    Run {
        /// Business entity to convert (e.g. Facility)
        #[arg(long)]
        entity: String,

        /// Comma-separated stage names or ordinals to skip
        #[arg(long, value_name = "STAGES")]
        skip_steps: Option<String>,

        /// Form type hint forwarded to the agent prompts
        #[arg(long)]
        form_type: Option<String>,

        /// Per-stage agent timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Use the deterministic placeholder executor instead of an agent
        #[arg(long)]
        dry_run: bool,

        /// Override a held or stale entity lock
        #[arg(long)]
        force: bool,

        /// Emit the run report as JSON on stdout
        #[arg(long)]
        json: bool,
    },

    /// Run a single stage standalone
    Stage {
        /// Stage name or ordinal
        name: String,

        #[arg(long)]
        entity: String,

        #[arg(long)]
        form_type: Option<String>,

        /// Per-stage agent timeout in seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Hand the terminal to the agent for a human-in-the-loop session
        #[arg(long)]
        interactive: bool,

        #[arg(long)]
        dry_run: bool,

        #[arg(long)]
        force: bool,

        #[arg(long)]
        json: bool,
    },

    /// Show per-stage artifact presence and a resume hint (read-only)
    Status {
        #[arg(long)]
        entity: String,

        #[arg(long)]
        json: bool,
    },

    /// List the pipeline stages and their dependencies
    Stages,
}

/// Parse arguments, execute, and return the process exit code.
#[must_use]
pub fn run() -> i32 {
    // clap exits with code 2 on bad arguments, matching CLI_ARGS.
    let cli = Cli::parse();

    let overrides = CliOverrides {
        output_dir: cli.output.clone(),
        tasks_dir: cli.tasks_dir.clone(),
        agent_binary: cli.agent_binary.clone(),
        stage_timeout_secs: match &cli.command {
            Commands::Run { timeout, .. } | Commands::Stage { timeout, .. } => *timeout,
            _ => None,
        },
        verbose: cli.verbose,
    };

    let config = match Config::discover(&overrides) {
        Ok(config) => config,
        Err(e) => {
            crate::logging::init_tracing(cli.verbose);
            error!("{e}");
            return ExitCode::CLI_ARGS.as_i32();
        }
    };
    crate::logging::init_tracing(config.verbose);

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to start async runtime: {e}");
            return ExitCode::INTERNAL.as_i32();
        }
    };

    match runtime.block_on(dispatch(cli.command, &config)) {
        Ok(code) => code.as_i32(),
        Err(e) => {
            error!("{e:#}");
            e.to_exit_code().as_i32()
        }
    }
}

async fn dispatch(command: Commands, config: &Config) -> Result<ExitCode, FormbridgeError> {
    let store = ArtifactStore::new(config.output_root.clone(), config.tasks_dir.clone());

    match command {
        Commands::Run {
            entity,
            skip_steps,
            form_type,
            timeout: _,
            dry_run,
            force,
            json,
        } => {
            let skip = match skip_steps {
                Some(raw) => SkipSet::parse(&raw)?,
                None => SkipSet::default(),
            };
            let opts = RunOptions {
                form_type,
                interactive: false,
            };
            let executor = build_executor(config, dry_run)?;
            let report = Orchestrator::new(&store, executor.as_ref())
                .execute(&entity, &skip, &opts, force)
                .await?;
            emit_report(&report, json)?;
            Ok(report_exit_code(&report))
        }

        Commands::Stage {
            name,
            entity,
            form_type,
            timeout: _,
            interactive,
            dry_run,
            force,
            json,
        } => {
            let stage = StageId::parse_token(&name)
                .ok_or_else(|| FormbridgeError::UnknownStage {
                    token: name.clone(),
                })?;
            let opts = RunOptions {
                form_type,
                interactive,
            };
            let executor = build_executor(config, dry_run)?;
            let report = Orchestrator::new(&store, executor.as_ref())
                .execute_stage(stage, &entity, &opts, force)
                .await?;
            emit_report(&report, json)?;
            Ok(report_exit_code(&report))
        }

        Commands::Status { entity, json } => {
            crate::entity::validate_entity_name(&entity)?;
            let status = crate::status::collect(&store, &entity)?;
            if json {
                println!(
                    "{}",
                    status
                        .to_json()
                        .map_err(|e| FormbridgeError::Internal(e.into()))?
                );
            } else {
                print!("{}", status.render_human());
            }
            Ok(ExitCode::SUCCESS)
        }

        Commands::Stages => {
            println!("Pipeline stages, in execution order:");
            for descriptor in &PIPELINE {
                let inputs = if descriptor.inputs.is_empty() {
                    "-".to_string()
                } else {
                    descriptor
                        .inputs
                        .iter()
                        .map(|s| s.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                println!(
                    "  {}  {:<22} reads: {:<50} writes: {}",
                    descriptor.id.ordinal(),
                    descriptor.id.as_str(),
                    inputs,
                    descriptor.id.artifact_filename()
                );
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Pick the executor and run preflight checks for the real one.
fn build_executor(
    config: &Config,
    dry_run: bool,
) -> Result<Box<dyn StageExecutor>, FormbridgeError> {
    crate::paths::ensure_dir_all(&config.output_root).map_err(|e| {
        FormbridgeError::Store(crate::store::StoreError::Io {
            path: config.output_root.clone(),
            source: e,
        })
    })?;

    if dry_run {
        return Ok(Box::new(DryRunExecutor));
    }

    let invoker = AgentInvoker::new(config.agent.clone(), Some(config.stage_timeout));
    invoker.preflight().map_err(|e| FormbridgeError::Preflight {
        reason: e.to_string(),
    })?;
    Ok(Box::new(invoker))
}

fn emit_report(report: &RunReport, json: bool) -> Result<(), FormbridgeError> {
    if json {
        println!(
            "{}",
            report
                .to_json()
                .map_err(|e| FormbridgeError::Internal(e.into()))?
        );
    } else {
        print!("{}", report.render_human());
    }
    Ok(())
}

fn report_exit_code(report: &RunReport) -> ExitCode {
    if report.succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::STAGE_FAILED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_accepts_skip_steps_and_flags() {
        let cli = Cli::parse_from([
            "formbridge",
            "run",
            "--entity",
            "Facility",
            "--skip-steps",
            "form-structure,1",
            "--dry-run",
            "--json",
        ]);
        match cli.command {
            Commands::Run {
                entity,
                skip_steps,
                dry_run,
                json,
                ..
            } => {
                assert_eq!(entity, "Facility");
                assert_eq!(skip_steps.as_deref(), Some("form-structure,1"));
                assert!(dry_run);
                assert!(json);
            }
            other => panic!("expected run, got {other:?}"),
        }
    }

    #[test]
    fn stage_accepts_name_and_interactive() {
        let cli = Cli::parse_from([
            "formbridge",
            "stage",
            "business-logic",
            "--entity",
            "Barge",
            "--interactive",
        ]);
        match cli.command {
            Commands::Stage {
                name,
                entity,
                interactive,
                ..
            } => {
                assert_eq!(name, "business-logic");
                assert_eq!(entity, "Barge");
                assert!(interactive);
            }
            other => panic!("expected stage, got {other:?}"),
        }
    }

    #[test]
    fn stage_accepts_a_timeout_override() {
        let cli = Cli::parse_from([
            "formbridge",
            "stage",
            "security",
            "--entity",
            "Facility",
            "--timeout",
            "120",
        ]);
        match cli.command {
            Commands::Stage { timeout, .. } => assert_eq!(timeout, Some(120)),
            other => panic!("expected stage, got {other:?}"),
        }
    }

    #[test]
    fn global_flags_apply_to_subcommands() {
        let cli = Cli::parse_from([
            "formbridge",
            "--output",
            "generated",
            "status",
            "--entity",
            "Facility",
            "--json",
        ]);
        assert_eq!(cli.output, Some(Utf8PathBuf::from("generated")));
    }
}
