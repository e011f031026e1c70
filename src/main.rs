use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use snowplan::config::Config;
use snowplan::context::{CheckpointStore, ContextSnapshot, ContextStore};
use snowplan::core::{Region, RunId, TaskGraph};
use snowplan::inventory::InventoryLedger;
use snowplan::orchestration::{
    BatchMode, BatchSummary, ExecutorEvent, IterationController, JsonLinesSink, MemorySink,
    PipelineExecutor, ResultSink, WorkerRegistry,
};
use snowplan::region::RegionCatalog;
use snowplan::report::RunReport;
use snowplan::{Error, Result};

/// Snowplan - snow-removal operations planner
#[derive(Parser, Debug)]
#[command(name = "snowplan")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    SNOWPLAN_DEBUG=1     Enable debug logging (alternative to --debug)\n    RUST_LOG             Override the log filter")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.snowplan/snowplan.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Configuration file (default: ~/.snowplan/snowplan.toml)
    #[arg(short = 'c', long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the full pipeline once for a region
    Run {
        /// Region to plan for (default from config)
        region: Option<String>,
    },

    /// Run the pipeline repeatedly, appending one record per iteration
    Train {
        iterations: usize,

        /// JSON lines file receiving the iteration records
        output_file: PathBuf,

        #[arg(long)]
        region: Option<String>,
    },

    /// Run the pipeline repeatedly and report aggregate metrics
    Test {
        iterations: usize,

        /// Model label recorded in the summary
        model: String,

        #[arg(long)]
        region: Option<String>,
    },

    /// Resume a checkpointed run from a task
    Replay {
        /// Task to resume at; earlier results come from the checkpoint
        task_id: String,

        /// Run to resume (default: the most recent one)
        #[arg(long)]
        run: Option<String>,

        /// Region override (default: the region recorded by the run)
        #[arg(long)]
        region: Option<String>,
    },

    /// Show inventory levels and alerts
    Inventory,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_path = snowplan::log::init_with_debug(cli.debug);
    info!(command = ?cli.command, log = ?log_path, "snowplan starting");

    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    config.ensure_dirs()?;

    match cli.command {
        Command::Run { region } => run_pipeline(&config, region),
        Command::Train {
            iterations,
            output_file,
            region,
        } => {
            let mut sink = JsonLinesSink::open(&output_file)?;
            let label = output_file.display().to_string();
            run_batch(&config, BatchMode::Train, &label, region, iterations, &mut sink)
        }
        Command::Test {
            iterations,
            model,
            region,
        } => {
            let mut sink = MemorySink::new();
            run_batch(&config, BatchMode::Test, &model, region, iterations, &mut sink)
        }
        Command::Replay {
            task_id,
            run,
            region,
        } => run_replay(&config, &task_id, run, region),
        Command::Inventory => show_inventory(&config),
    }
}

/// Everything a command needs, built from the configuration.
struct Setup {
    catalog: Arc<RegionCatalog>,
    graph: TaskGraph,
    ledger: InventoryLedger,
}

impl Setup {
    fn load(config: &Config) -> Result<Self> {
        let catalog = match config.regions_path() {
            Some(path) => RegionCatalog::load(&path)?,
            None => RegionCatalog::builtin(),
        };
        let graph = match config.pipeline_path() {
            Some(path) => TaskGraph::load(&path)?,
            None => TaskGraph::snow_removal(),
        };
        graph.validate()?;
        let ledger =
            InventoryLedger::open_or_seed(&config.inventory_path()?, catalog.seed_inventory())?
                .with_policy(config.alerts);
        Ok(Self {
            catalog: Arc::new(catalog),
            graph,
            ledger,
        })
    }

    fn executor(&self, config: &Config) -> PipelineExecutor {
        PipelineExecutor::new(WorkerRegistry::snow_removal(
            self.catalog.clone(),
            config.scoring,
        ))
    }
}

fn region_or_default(config: &Config, region: Option<String>) -> Region {
    Region::new(region.unwrap_or_else(|| config.effective_region().to_string()))
}

/// Cancel the executor's current run on Ctrl+C.
fn cancel_on_ctrl_c(executor: &PipelineExecutor) {
    let token = executor.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping before the next task");
            token.cancel();
        }
    });
}

/// Echo executor events to `out` as they happen.
///
/// The returned handle finishes, handing `out` back, once every sender is
/// gone; await it after dropping the executor so no event is lost.
fn report_progress<W>(executor: PipelineExecutor, mut out: W) -> (PipelineExecutor, JoinHandle<W>)
where
    W: Write + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel(64);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let _ = writeln!(out, "{}", progress_line(&event));
        }
        out
    });
    (executor.with_events(tx), printer)
}

fn progress_line(event: &ExecutorEvent) -> String {
    match event {
        ExecutorEvent::RunStarted {
            run_id,
            resume_at: None,
        } => format!("run {} started", run_id.short()),
        ExecutorEvent::RunStarted {
            run_id,
            resume_at: Some(task),
        } => format!("run {} resuming at {}", run_id.short(), task),
        ExecutorEvent::TaskStarted { task_id, worker } => {
            format!("  {} ({})...", task_id, worker)
        }
        ExecutorEvent::TaskCommitted { task_id } => format!("  {} done", task_id),
        ExecutorEvent::TaskFailed { task_id, cause } => {
            format!("  {} FAILED: {}", task_id, cause)
        }
        ExecutorEvent::RunFinished { run_id } => format!("run {} finished", run_id.short()),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn run_pipeline(config: &Config, region: Option<String>) -> Result<()> {
    let region = region_or_default(config, region);
    info!(%region, "Run command");
    let mut setup = Setup::load(config)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let (executor, printer) = report_progress(
            setup
                .executor(config)
                .with_checkpoints(CheckpointStore::new(config.checkpoint_dir()?)),
            std::io::stderr(),
        );
        cancel_on_ctrl_c(&executor);

        let mut store = ContextStore::new();
        let outcome = executor
            .run_in(&region, &setup.graph, &mut setup.ledger, &mut store)
            .await;
        drop(executor);
        let _ = printer.await;
        let run_id = outcome.as_ref().ok().copied();
        print_json(&RunReport::build(
            run_id,
            &region,
            &store.snapshot(),
            &setup.ledger,
        ))?;
        outcome.map(|_| ())
    })
}

fn run_batch(
    config: &Config,
    mode: BatchMode,
    label: &str,
    region: Option<String>,
    iterations: usize,
    sink: &mut dyn ResultSink,
) -> Result<()> {
    let region = region_or_default(config, region);
    info!(%mode, label, %region, iterations, "Batch command");
    let setup = Setup::load(config)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let executor = setup.executor(config);
        cancel_on_ctrl_c(&executor);

        let mut controller = IterationController::new(executor, setup.ledger);
        let records = controller
            .run_many(&region, &setup.graph, iterations, sink)
            .await?;
        print_json(&BatchSummary::from_records(mode, label, &region, &records))
    })
}

/// Region a checkpointed run was planned for, read from its payloads.
fn checkpoint_region(snapshot: &ContextSnapshot) -> Option<Region> {
    snapshot
        .entries
        .iter()
        .find_map(|r| r.payload.get("region")?.as_str().map(Region::new))
}

fn run_replay(
    config: &Config,
    task_id: &str,
    run: Option<String>,
    region: Option<String>,
) -> Result<()> {
    let checkpoints = CheckpointStore::new(config.checkpoint_dir()?);
    let run_id: RunId = match run {
        Some(id) => id
            .parse()
            .map_err(|e| Error::Validation(format!("invalid run id '{}': {}", id, e)))?,
        None => checkpoints.latest_run()?,
    };
    let checkpoint = checkpoints.latest(&run_id)?;
    let region = match region {
        Some(name) => Region::new(name),
        None => checkpoint_region(&checkpoint.snapshot)
            .unwrap_or_else(|| region_or_default(config, None)),
    };
    info!(run = %run_id.short(), task_id, %region, "Replay command");
    let mut setup = Setup::load(config)?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async {
        let (executor, printer) = report_progress(
            setup.executor(config).with_checkpoints(checkpoints),
            std::io::stderr(),
        );
        cancel_on_ctrl_c(&executor);

        let mut store = ContextStore::new();
        let outcome = executor
            .replay_in(
                &region,
                &setup.graph,
                task_id,
                &checkpoint.snapshot,
                &mut setup.ledger,
                &mut store,
            )
            .await;
        drop(executor);
        let _ = printer.await;
        if let Err(e @ (Error::CheckpointGap { .. } | Error::NotFound(_))) = &outcome {
            warn!(error = %e, "Checkpoint incompatible with resume point");
        } else {
            print_json(&RunReport::build(
                outcome.as_ref().ok().copied(),
                &region,
                &store.snapshot(),
                &setup.ledger,
            ))?;
        }
        outcome.map(|_| ())
    })
}

fn show_inventory(config: &Config) -> Result<()> {
    let setup = Setup::load(config)?;
    let items: Vec<_> = setup.ledger.items().collect();
    print_json(&serde_json::json!({
        "path": setup.ledger.path(),
        "items": items,
        "alerts": setup.ledger.check_alerts(),
    }))
}
