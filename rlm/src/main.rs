//! Recursive language-model runner.
//!
//! `rlm query` answers a question about a context file by letting a model
//! drive a sandboxed Lua interpreter. `rlm exec` runs a single script in the
//! same sandbox without a model, which is handy for checking what scripts can
//! and cannot do.

use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use rlm::core::types::MaxIterationsReachedError;
use rlm::exit_codes;
use rlm::io::config::{CONFIG_FILE, RlmConfig, load_config, write_config};
use rlm::io::executor::execute;
use rlm::io::sandbox::Sandbox;
use rlm::{CommandCompletion, complete, logging};

#[derive(Parser)]
#[command(
    name = "rlm",
    version,
    about = "Answer questions about large contexts with model-written Lua scripts"
)]
struct Cli {
    /// Config file (missing file means defaults).
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Answer QUERY about the context file and print the answer.
    Query {
        query: String,
        /// File exposed to scripts as `context` (empty if omitted).
        #[arg(long)]
        context_file: Option<PathBuf>,
    },
    /// Run one Lua script in a fresh sandbox and print its outcome.
    Exec {
        script: PathBuf,
        #[arg(long)]
        context_file: Option<PathBuf>,
    },
    /// Write a default config file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

fn main() {
    logging::init();
    let code = match run() {
        Ok(()) => exit_codes::OK,
        Err(err) => {
            eprintln!("{err:#}");
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Query {
            query,
            context_file,
        } => cmd_query(&cli.config, &query, context_file.as_deref()),
        Command::Exec {
            script,
            context_file,
        } => cmd_exec(&cli.config, &script, context_file.as_deref()),
        Command::InitConfig { force } => cmd_init_config(&cli.config, force),
    }
}

fn cmd_query(config_path: &Path, query: &str, context_file: Option<&Path>) -> Result<()> {
    let cfg = load_config(config_path)?;
    let context = read_context(context_file)?;
    let completion = CommandCompletion::new(cfg.completion.clone())?;
    let answer = complete(query, &cfg.complete_options(context), Rc::new(completion))?;
    println!("{answer}");
    Ok(())
}

fn cmd_exec(config_path: &Path, script_path: &Path, context_file: Option<&Path>) -> Result<()> {
    let cfg = load_config(config_path)?;
    let script = fs::read_to_string(script_path)
        .with_context(|| format!("read {}", script_path.display()))?;
    let sandbox = Sandbox::new(&cfg.sandbox).context("create sandbox")?;
    sandbox
        .set_global("context", read_context(context_file)?)
        .context("expose context to sandbox")?;

    let outcome = execute(&sandbox, &script);
    println!("{}: {}", outcome.as_str(), outcome.text());
    Ok(())
}

fn cmd_init_config(config_path: &Path, force: bool) -> Result<()> {
    if !force && config_path.exists() {
        bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    write_config(config_path, &RlmConfig::default())
}

fn read_context(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("read context {}", path.display()))
        }
        None => Ok(String::new()),
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<MaxIterationsReachedError>().is_some() {
        exit_codes::MAX_ITERATIONS
    } else {
        exit_codes::INVALID
    }
}
