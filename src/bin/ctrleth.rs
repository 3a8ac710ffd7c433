//! ctrleth: inspect EVM contracts as annotated control-flow graphs
//!
//! ## Example Usage
//!
//! ```bash
//! # Analyze a contract with an external analyzer and wait for the result
//! ctrleth --rpc-url http://localhost:8545 analyze 0xC02a... --engine-cmd "ethpector --json" --wait
//!
//! # Load the enriched graph as JSON
//! ctrleth --json load 0xC02a...
//!
//! # Resolve a storage slot or an event topic
//! ctrleth lookup storage 0xC02a... 0
//! ctrleth lookup event 0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use ctrleth::config::{EngineArgs, SearchStrategy, ServiceConfig};
use ctrleth::{
    AnalysisEngine, CommandEngine, DisassemblyService, FileEngine, LoadResponse, LoadState,
    StartState, TaskError,
};
use ctrleth_types::FullResult;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "ctrleth",
    author,
    version,
    about = "Annotated control-flow graphs for EVM contracts"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Data directory (default: $CTRLETH_HOME or ~/.ctrleth)
    #[arg(long, global = true)]
    home: Option<PathBuf>,

    /// Ethereum node JSON-RPC endpoint (default: $CTRLETH_RPC)
    #[arg(long, global = true)]
    rpc_url: Option<String>,

    /// Output as JSON instead of human-readable format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (debug logging)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start (or join) the analysis of a contract
    Analyze(AnalyzeCmd),

    /// Load the enriched analysis of a contract
    Load {
        address: String,
    },

    /// Resolve storage slots, event topics and function selectors
    #[command(subcommand)]
    Lookup(LookupCmd),

    /// List contracts with a stored analysis
    Contracts,
}

#[derive(Args)]
struct AnalyzeCmd {
    address: String,

    /// Directory of dumped engine outputs (<address>.json)
    #[arg(long, conflicts_with = "engine_cmd")]
    engine_dir: Option<PathBuf>,

    /// External analyzer command; receives the address as last argument
    #[arg(long)]
    engine_cmd: Option<String>,

    /// Print the finished graph; without it only the start state is printed
    #[arg(long)]
    wait: bool,

    #[command(flatten)]
    engine: EngineFlags,
}

#[derive(Args)]
struct EngineFlags {
    /// Symbolic execution timeout in seconds
    #[arg(long)]
    execution_timeout: Option<u64>,

    /// Contract creation timeout in seconds
    #[arg(long)]
    create_timeout: Option<u64>,

    #[arg(long)]
    max_depth: Option<u32>,

    /// Solver timeout in milliseconds
    #[arg(long)]
    solver_timeout: Option<u64>,

    #[arg(long)]
    loop_bound: Option<u32>,

    #[arg(long, value_enum)]
    strategy: Option<SearchStrategy>,

    #[arg(long)]
    call_depth_limit: Option<u32>,

    #[arg(long)]
    transaction_count: Option<u32>,

    /// Enable concolic execution
    #[arg(long)]
    concolic: bool,
}

impl EngineFlags {
    fn apply(&self, mut args: EngineArgs) -> EngineArgs {
        if let Some(v) = self.execution_timeout {
            args.execution_timeout = v;
        }
        if let Some(v) = self.create_timeout {
            args.create_timeout = v;
        }
        if let Some(v) = self.max_depth {
            args.max_depth = v;
        }
        if let Some(v) = self.solver_timeout {
            args.solver_timeout = v;
        }
        if let Some(v) = self.loop_bound {
            args.loop_bound = v;
        }
        if let Some(v) = self.strategy {
            args.strategy = v;
        }
        if let Some(v) = self.call_depth_limit {
            args.call_depth_limit = v;
        }
        if let Some(v) = self.transaction_count {
            args.transaction_count = v;
        }
        args.concolic |= self.concolic;
        args
    }
}

#[derive(Subcommand)]
enum LookupCmd {
    /// Storage word of a contract at a slot (decimal or 0x hex)
    Storage { address: String, slot: String },
    /// Event signatures for a topic hash
    Event { topic: String },
    /// Function signatures for a 4-byte selector
    Function { selector: String },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn engine_for(
    home: &std::path::Path,
    dir: Option<PathBuf>,
    cmd: Option<&str>,
) -> Result<Arc<dyn AnalysisEngine>> {
    if let Some(cmd) = cmd {
        return Ok(Arc::new(CommandEngine::from_command_line(cmd)?));
    }
    Ok(Arc::new(FileEngine::new(
        dir.unwrap_or_else(|| home.join("engine")),
    )))
}

/// Service for commands that never start an analysis.
fn read_only_service(config: &ServiceConfig) -> Result<DisassemblyService> {
    DisassemblyService::from_config(config, engine_for(&config.home, None, None)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli {
        command,
        home,
        rpc_url,
        json,
        verbose,
    } = Cli::parse();
    init_logging(verbose);

    let config = ServiceConfig::from_env()
        .with_rpc_url(rpc_url)
        .with_home(home);

    let outcome = match command {
        Commands::Analyze(cmd) => {
            let engine = engine_for(
                &config.home,
                cmd.engine_dir.clone(),
                cmd.engine_cmd.as_deref(),
            )?;
            let service = DisassemblyService::from_config(&config, engine)?;
            run_analyze(&service, cmd, json, verbose).await
        }
        Commands::Load { address } => {
            let service = read_only_service(&config)?;
            service
                .load_analysis(&address)
                .map(|response| print_load(&response, json))
        }
        Commands::Lookup(lookup) => {
            let service = read_only_service(&config)?;
            let answer = match lookup {
                LookupCmd::Storage { address, slot } => service.storage_lookup(&address, &slot),
                LookupCmd::Event { topic } => service.event_lookup(&topic),
                LookupCmd::Function { selector } => service.function_lookup(&selector),
            };
            answer.map(|value| print_value(&value, json))
        }
        Commands::Contracts => {
            let service = read_only_service(&config)?;
            service.contracts().map(|contracts| {
                if json {
                    print_json(&contracts);
                } else {
                    for contract in contracts {
                        println!("{}", contract);
                    }
                }
            })
        }
    };

    if let Err(envelope) = outcome {
        eprintln!("{}", format_task_error(&envelope, json));
        std::process::exit(1);
    }
    Ok(())
}

async fn run_analyze(
    service: &DisassemblyService,
    cmd: AnalyzeCmd,
    json: bool,
    verbose: bool,
) -> Result<(), TaskError> {
    let args = cmd.engine.apply(service.engine_defaults().clone());
    let state = service.start_analysis(&cmd.address, args)?;
    if !cmd.wait {
        if json {
            print_json(&serde_json::json!({ "state": state }));
        } else {
            println!("{}", describe_start(state));
        }
        // The job lives on this process's runtime; returning now would drop it.
        if state == StartState::Queued {
            if let LoadState::Failed(envelope) = service
                .coordinator()
                .wait_for(&cmd.address)
                .await
                .map_err(TaskError::from_anyhow)?
            {
                return Err(envelope);
            }
        }
        return Ok(());
    }

    let response = service.wait_and_load(&cmd.address).await?;
    print_load(&response, json);
    if verbose {
        eprintln!(
            "{}",
            service.coordinator().metrics().snapshot().format_report()
        );
    }
    Ok(())
}

fn describe_start(state: StartState) -> &'static str {
    match state {
        StartState::Queued => "Analysis queued",
        StartState::AlreadyQueued => "Analysis already in progress",
        StartState::Completed => "Analysis already available",
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Failed to serialize output: {}", e),
    }
}

fn print_value(value: &str, json: bool) {
    if json {
        print_json(&serde_json::json!({ "result": value }));
    } else {
        println!("{}", value);
    }
}

fn print_load(response: &LoadResponse, json: bool) {
    if json {
        print_json(response);
        return;
    }
    match response {
        LoadResponse::Pending { state } => println!("State: {:?}", state),
        LoadResponse::Ready(result) => print!("{}", format_summary(result)),
    }
}

fn format_summary(result: &FullResult) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "\x1b[1mBlocks:\x1b[0m {}  \x1b[1mLinks:\x1b[0m {}  \x1b[1mFunctions:\x1b[0m {}\n",
        result.blocks.len(),
        result.links.len(),
        result.functions.len()
    ));
    out.push_str(&format!(
        "Coverage: assembly {:.1}%, symbolic {:.1}%\n\n",
        result.coverage.assembly * 100.0,
        result.coverage.symbolic * 100.0
    ));
    for block in &result.blocks {
        let types: Vec<&str> = block.types.iter().map(|t| t.as_str()).collect();
        out.push_str(&format!(
            "  [{:>4}] {:>3} instrs",
            block.i,
            block.instructions.len()
        ));
        if let Some(function) = &block.function {
            out.push_str(&format!("  \x1b[36m{}\x1b[0m", function));
        }
        if !types.is_empty() {
            out.push_str(&format!("  {}", types.join(", ")));
        }
        out.push('\n');
    }
    out
}

fn format_task_error(error: &TaskError, json_output: bool) -> String {
    if json_output {
        serde_json::to_string_pretty(error).unwrap_or_else(|_| "{}".to_string())
    } else {
        format!("\x1b[31mError:\x1b[0m {} ({})", error.message, error.status)
    }
}
