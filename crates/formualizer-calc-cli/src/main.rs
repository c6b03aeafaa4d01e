use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use formualizer_calc::config::{DEFAULT_MAX_BODY_BYTES, DEFAULT_QUEUE_CAPACITY};
use formualizer_calc::service::{self, Reply};
use formualizer_calc::{
    CalculationRequest, DEFAULT_MAX_TOTAL_CELLS, ExecutionPool, FormualizerFactory, Limits,
    PendingOutcome, PoolConfig,
};
use std::fs;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "formualizer-calc",
    about = "Evaluate sandboxed formula requests on a worker pool"
)]
struct Cli {
    #[command(flatten)]
    pool: PoolArgs,

    /// Log level when RUST_LOG is unset.
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct PoolArgs {
    /// Worker threads. Defaults to min(available cores, 4).
    #[arg(long, env = "WORKER_THREADS", global = true)]
    workers: Option<usize>,

    /// Requests allowed to wait for a worker.
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY, global = true)]
    queue_capacity: usize,

    /// Lookup-table cells plus variables allowed per request.
    #[arg(long, default_value_t = DEFAULT_MAX_TOTAL_CELLS, global = true)]
    max_cells: u64,

    /// Largest accepted request body in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_BODY_BYTES, global = true)]
    max_body_bytes: usize,

    /// Seconds to wait for in-flight work on shutdown.
    #[arg(long, default_value_t = 30, global = true)]
    shutdown_timeout: u64,
}

impl PoolArgs {
    fn config(&self) -> PoolConfig {
        let mut config = PoolConfig::from_env();
        if let Some(workers) = self.workers.filter(|n| *n > 0) {
            config.workers = workers;
        }
        config.queue_capacity = self.queue_capacity;
        config.shutdown_timeout = Duration::from_secs(self.shutdown_timeout);
        config.limits = Limits {
            max_total_cells: self.max_cells,
            max_body_bytes: self.max_body_bytes,
        };
        config
    }
}

#[derive(Args, Debug)]
struct AuthArgs {
    /// Key callers must present. Unset means no check.
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Key presented with this invocation (the `x-api-key` value).
    #[arg(long)]
    key: Option<String>,
}

impl AuthArgs {
    fn check(&self) -> Result<(), Reply> {
        match &self.api_key {
            Some(expected) => service::authorize(Some(expected), self.key.as_deref()),
            None => Ok(()),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate one JSON request and print `{statusCode, body}`.
    Eval {
        /// Request file; stdin when omitted.
        #[arg(long)]
        request: Option<PathBuf>,

        #[command(flatten)]
        auth: AuthArgs,
    },
    /// Evaluate every line of a JSONL file concurrently, printing replies in input order.
    Batch {
        #[arg(long)]
        input: PathBuf,

        #[command(flatten)]
        auth: AuthArgs,
    },
    /// Start the pool and print its health report.
    Health,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let pool = ExecutionPool::start(cli.pool.config(), FormualizerFactory)
        .context("failed to start execution pool")?;
    let result = match &cli.command {
        Command::Eval { request, auth } => run_eval(&pool, request.as_deref(), auth),
        Command::Batch { input, auth } => run_batch(&pool, input, auth),
        Command::Health => print_json(&service::health(&pool)),
    };
    let report = pool.drain();
    tracing::debug!(
        completed = report.completed,
        timed_out = report.timed_out,
        "shutdown complete"
    );
    result
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let mut out = io::stdout().lock();
    serde_json::to_writer(&mut out, value).context("failed to encode reply")?;
    writeln!(out)?;
    Ok(())
}

fn read_body(path: Option<&Path>) -> Result<Vec<u8>> {
    match path {
        Some(path) => fs::read(path).with_context(|| format!("failed to read {}", path.display())),
        None => {
            let mut body = Vec::new();
            io::stdin()
                .read_to_end(&mut body)
                .context("failed to read request from stdin")?;
            Ok(body)
        }
    }
}

fn run_eval(pool: &ExecutionPool, path: Option<&Path>, auth: &AuthArgs) -> Result<()> {
    if let Err(reply) = auth.check() {
        return print_json(&reply);
    }
    let body = read_body(path)?;
    let reply = service::handle_calculate(pool, &body);
    print_json(&reply)
}

enum Slot {
    Ready(Reply),
    Pending(PendingOutcome),
}

fn run_batch(pool: &ExecutionPool, input: &Path, auth: &AuthArgs) -> Result<()> {
    if let Err(reply) = auth.check() {
        return print_json(&reply);
    }
    let file =
        fs::File::open(input).with_context(|| format!("failed to open {}", input.display()))?;
    let max_body_bytes = pool.config().limits.max_body_bytes;

    let mut slots = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", index + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let slot = match CalculationRequest::from_json_slice(line.as_bytes(), max_body_bytes) {
            Ok(request) => match pool.submit(request) {
                Ok(pending) => Slot::Pending(pending),
                Err(err) => Slot::Ready(service::internal_error(&err)),
            },
            Err(err) => Slot::Ready(service::bad_request(&err)),
        };
        slots.push(slot);
    }
    tracing::info!(requests = slots.len(), "batch submitted");

    for slot in slots {
        let reply = match slot {
            Slot::Ready(reply) => reply,
            Slot::Pending(pending) => match pending.wait() {
                Ok(outcome) => service::respond(outcome),
                Err(err) => service::internal_error(&err),
            },
        };
        print_json(&reply)?;
    }
    Ok(())
}
