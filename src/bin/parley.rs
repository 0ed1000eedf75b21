use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use parley::dialogs::{
    ActionSequence, BeginDialog, Dialog, DialogManager, IfCondition, NumberPrompt, SendActivity,
    SetProperty, TextPrompt,
};
use parley::functions::FunctionTable;
use parley::recognizer::RegexRecognizer;
use parley::storage::MemoryStorage;
use parley::turn::Activity;
use parley::{EngineConfig, Error, ExpressionEvaluator, InternalResult, SimpleMemory};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate one expression and print the result as JSON
    Eval {
        expression: String,

        /// JSON file used as the memory root
        #[arg(short, long)]
        memory: Option<PathBuf>,
    },
    /// Chat with the sample dialog on stdin
    Chat {
        /// Path to config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn eval(expression: &str, memory: Option<&PathBuf>) -> InternalResult<()> {
    let root = match memory {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .map_err(|e| Error::internal(format!("Failed to read memory file: {}", e)))?;
            serde_json::from_str(&content)
                .map_err(|e| Error::internal(format!("Failed to parse memory file: {}", e)))?
        }
        None => serde_json::json!({}),
    };
    let config = EngineConfig::default();
    let evaluator = ExpressionEvaluator::new(Arc::new(FunctionTable::builtin()), &config.expression);
    let value = evaluator.evaluate_text(expression, &SimpleMemory::from(root))?;
    let json: serde_json::Value = value.into();
    println!("{}", json);
    Ok(())
}

fn arc<D: Dialog + 'static>(dialog: D) -> Arc<dyn Dialog> {
    Arc::new(dialog)
}

fn sample_dialog() -> Arc<dyn Dialog> {
    arc(ActionSequence::new(
        "main",
        vec![
            arc(IfCondition::new(
                "first-visit",
                "!exists(user.name)",
                vec![
                    arc(SendActivity::new("welcome", "Welcome to ${settings.botName}!")),
                    arc(BeginDialog::new("ask-name", "name").with_result_property("user.name")),
                ],
            )),
            arc(BeginDialog::new("ask-age", "age").with_result_property("dialog.age")),
            arc(SetProperty::new(
                "count",
                "conversation.rounds",
                "coalesce(conversation.rounds, 0) + 1",
            )),
            arc(SendActivity::new(
                "summary",
                "${user.name}, you will be ${dialog.age + 1} next year. (round ${conversation.rounds})",
            )),
        ],
    ))
}

async fn chat(config_path: Option<&PathBuf>) -> InternalResult<()> {
    let mut config = match config_path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if config.settings.get("botName").is_none() {
        config.settings = serde_json::json!({"botName": "Parley"});
    }
    info!("config loaded.");
    debug!("config: {:?}", config);

    let manager = DialogManager::new(sample_dialog(), Arc::new(MemoryStorage::new()), config)?
        .with_dialog(arc(TextPrompt::new("name", "What is your name?")))?
        .with_dialog(arc(NumberPrompt::new("age", "How old are you, ${user.name}?")
            .with_retry_prompt("Please answer with a number between 0 and 150.")
            .with_validator(|value| value.as_f64().is_some_and(|n| (0.0..=150.0).contains(&n)))))?
        .with_recognizer(Arc::new(RegexRecognizer::new().add_intent("greeting", r"(?i)^(hi|hello)")?));

    println!("Say something (Ctrl+D to quit).");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| Error::internal(format!("Failed to read input: {}", e)))?
    {
        let activity = Activity::message(line).with_from("console-user");
        for reply in manager.process_turn("console", activity).await? {
            println!("> {}", reply.text());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let result = match &cli.command {
        Command::Eval { expression, memory } => eval(expression, memory.as_ref()),
        Command::Chat { config } => chat(config.as_ref()).await,
    };
    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
