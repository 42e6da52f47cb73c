use std::panic;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tracing_subscriber::EnvFilter;

use judge_core::config::JudgeConfig;
use judge_core::core::coordinator::SubmissionCoordinator;
use judge_core::core::domain::ExecuteRequest;
use judge_core::core::pipeline::judging::{JudgeTask, handle_judging};
use judge_core::core::pool::JudgePool;
use judge_core::native::registry::RunnerRegistry;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Parser)]
#[command(name = "judge", version, about = "Judge code submissions against JSON test cases")]
struct Cli {
    /// Configuration file; `config/judge.*` is used when present.
    #[arg(long, global = true, env = "JUDGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Judge one ExecuteRequest (JSON) and print the ExecutionResult.
    Run {
        /// Request file; stdin when omitted.
        file: Option<PathBuf>,
    },
    /// Read JudgeTask JSON lines on stdin and write submission snapshots to stdout.
    Serve,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    set_panic_hook();

    let cli = Cli::parse();
    let config = JudgeConfig::load(cli.config.as_deref())?;
    tracing::debug!(?config, "Configuration loaded");

    let registry = RunnerRegistry::native(&config);
    let pool = JudgePool::new(SubmissionCoordinator::new(
        Arc::new(registry),
        Arc::new(config),
    ));

    match cli.command {
        Command::Run { file } => run(pool, file).await,
        Command::Serve => serve(pool).await,
    }
}

async fn run(pool: JudgePool, file: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let input = match file {
        Some(path) => tokio::fs::read_to_string(path).await?,
        None => {
            let mut input = String::new();
            tokio::io::stdin().read_to_string(&mut input).await?;
            input
        }
    };
    let request: ExecuteRequest = serde_json::from_str(&input)?;

    let handle = pool.submit(request);
    let id = handle.id();
    let join = handle.join();
    tokio::pin!(join);

    let result = tokio::select! {
        result = &mut join => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted, cancelling judgment");
            pool.cancel(id);
            join.await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn serve(pool: JudgePool) -> Result<(), Box<dyn std::error::Error>> {
    let (judge_tx, judge_rx) = mpsc::channel::<JudgeTask>(CHANNEL_CAPACITY);
    let (res_tx, mut res_rx) = mpsc::channel(CHANNEL_CAPACITY);

    handle_judging(res_tx, judge_rx, pool);

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(submission) = res_rx.recv().await {
            match serde_json::to_string(&submission) {
                Ok(line) => {
                    stdout.write_all(line.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                    stdout.flush().await?;
                }
                Err(e) => tracing::error!("Failed to encode submission {}: {}", submission.id, e),
            }
        }
        Ok::<_, std::io::Error>(())
    });

    tracing::info!("Reading judge tasks from stdin");
    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    while let Some(line) = lines.next().await {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<JudgeTask>(&line) {
            Ok(task) => {
                if judge_tx.send(task).await.is_err() {
                    break;
                }
            }
            Err(e) => tracing::warn!("Skipping malformed task: {}", e),
        }
    }
    drop(judge_tx);

    writer.await??;
    Ok(())
}

fn set_panic_hook() {
    panic::set_hook(Box::new(|panic_info| {
        tracing::error!(
            message = "panic occurred",
            panic = %panic_info
        );
    }));
}
