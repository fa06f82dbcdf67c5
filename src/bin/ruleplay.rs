use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::{Parser, Subcommand};
use ruleplay::{
    config::RuleplayConfig,
    evaluation::{EvaluationStateMachine, EvaluationUnit},
    expression::BasicEngine,
    playground::{Direction, PlaygroundError, PlaygroundState},
    rule::{Rule, RuleAction, RuleId},
    summary::Report,
    validate, Error, RuleplayResult,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "ruleplay.json", global = true)]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a new playground file
    Init {
        #[arg(default_value = "playground.json")]
        file: PathBuf,
        /// Start from the listing example instead of an empty rule set
        #[arg(long)]
        example: bool,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Evaluate a playground file and print the results
    Check {
        file: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit the rules of a playground file
    Rule {
        #[command(subcommand)]
        command: RuleCommand,
    },
    /// Print the id-less share form of a playground file
    Export { file: PathBuf },
    /// Create a playground file from a share form, minting new rule ids
    Import {
        shared: PathBuf,
        file: PathBuf,
        #[arg(long)]
        force: bool,
    },
}

#[derive(Subcommand)]
enum RuleCommand {
    /// List rules with their ids
    List { file: PathBuf },
    /// Append a rule
    Add {
        file: PathBuf,
        #[arg(long)]
        field: String,
        #[arg(long)]
        action: RuleAction,
        #[arg(long)]
        expression: String,
        #[arg(long, default_value = "")]
        message: String,
    },
    /// Change an existing rule in place
    Edit {
        file: PathBuf,
        id: String,
        #[arg(long)]
        field: Option<String>,
        #[arg(long)]
        action: Option<RuleAction>,
        #[arg(long)]
        expression: Option<String>,
        #[arg(long)]
        message: Option<String>,
    },
    /// Move a rule one step up or down
    Move {
        file: PathBuf,
        id: String,
        direction: Direction,
    },
    /// Delete a rule
    Remove { file: PathBuf, id: String },
}

fn load(file: &Path) -> RuleplayResult<PlaygroundState> {
    let content = std::fs::read_to_string(file)?;
    Ok(PlaygroundState::from_json(&content)?)
}

fn save(file: &Path, state: &PlaygroundState) -> RuleplayResult<()> {
    std::fs::write(file, state.to_json()?)?;
    debug!("saved {}", file.display());
    Ok(())
}

fn create(file: &Path, state: &PlaygroundState, force: bool) -> RuleplayResult<()> {
    if file.exists() && !force {
        return Err(Error::internal(format!(
            "{} already exists (use --force to overwrite)",
            file.display()
        )));
    }
    save(file, state)
}

/// Evaluates `file` once. Returns whether validation passed.
async fn check(config: &RuleplayConfig, file: &Path, json: bool) -> RuleplayResult<bool> {
    let snapshot = load(file)?;

    let unit = EvaluationUnit::with_options(BasicEngine, config.evaluation.options());
    let correlator = Arc::new(unit.connect(&config.unit));
    let machine = EvaluationStateMachine::with_system_clock(correlator);

    machine.update(&snapshot)?;
    let timeout = config.evaluation.reply_timeout;
    let state = tokio::time::timeout(timeout, machine.settled())
        .await
        .map_err(|_| Error::Timeout(timeout))??;

    let report = Report::new(state.clone(), validate(&snapshot, &state));
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report.render());
    }
    Ok(report.passed())
}

fn edit_rules(command: &RuleCommand) -> RuleplayResult<()> {
    match command {
        RuleCommand::List { file } => {
            let state = load(file)?;
            for rule in &state.rules {
                println!(
                    "{}  {:<12}  {:<20}  {}",
                    rule.id,
                    rule.rule_action,
                    rule.field_name,
                    rule.rule_expression.replace('\n', " ")
                );
            }
        }
        RuleCommand::Add {
            file,
            field,
            action,
            expression,
            message,
        } => {
            let mut state = load(file)?;
            let id = state.add_rule(Rule::new(field, *action, expression, message));
            save(file, &state)?;
            println!("{}", id);
        }
        RuleCommand::Edit {
            file,
            id,
            field,
            action,
            expression,
            message,
        } => {
            let mut state = load(file)?;
            let id = RuleId::from(id.as_str());
            let existing = state
                .rule(&id)
                .ok_or_else(|| PlaygroundError::RuleNotFound(id.clone()))?;
            let rule = Rule::new(
                field.clone().unwrap_or_else(|| existing.field_name.clone()),
                action.unwrap_or(existing.rule_action),
                expression
                    .clone()
                    .unwrap_or_else(|| existing.rule_expression.clone()),
                message.clone().unwrap_or_else(|| existing.rule_message.clone()),
            );
            state.set_rule(&id, rule)?;
            save(file, &state)?;
        }
        RuleCommand::Move {
            file,
            id,
            direction,
        } => {
            let mut state = load(file)?;
            if state.move_rule(&RuleId::from(id.as_str()), *direction)? {
                save(file, &state)?;
            } else {
                println!("Rule {} is already at the {} end", id, direction);
            }
        }
        RuleCommand::Remove { file, id } => {
            let mut state = load(file)?;
            state.remove_rule(&RuleId::from(id.as_str()))?;
            save(file, &state)?;
        }
    }
    Ok(())
}

async fn run(cli: &Cli) -> RuleplayResult<bool> {
    let config = RuleplayConfig::load_or_default(&cli.config)?;
    debug!("config: {:?}", config);

    match &cli.command {
        Command::Init {
            file,
            example,
            force,
        } => {
            let state = if *example {
                PlaygroundState::example()
            } else {
                PlaygroundState::initial()
            };
            create(file, &state, *force)?;
            println!("Wrote {}", file.display());
        }
        Command::Check { file, json } => return check(&config, file, *json).await,
        Command::Rule { command } => edit_rules(command)?,
        Command::Export { file } => println!("{}", load(file)?.to_share_json()?),
        Command::Import {
            shared,
            file,
            force,
        } => {
            let content = std::fs::read_to_string(shared)?;
            let state = PlaygroundState::from_share_json(&content)?;
            create(file, &state, *force)?;
            println!("Imported {} rule(s) into {}", state.rules.len(), file.display());
        }
    }
    Ok(true)
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&cli).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
