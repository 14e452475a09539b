use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dining::{
    pipe_path, watch, ChannelObserver, ConsoleObserver, Coordinator, Observer, ObserverFrame,
    PipeSet, TableConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Dining philosophers simulation with a live view of every philosopher
#[derive(Debug, Parser)]
#[command(name = "dining")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Where states are shown
    #[arg(short, long, value_enum, default_value = "console")]
    display: Display,

    /// Number of philosophers (overrides the config file)
    #[arg(short = 'n', long)]
    actors: Option<usize>,

    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the per-philosopher pipes `phil_<id>`
    #[arg(long, default_value = "/tmp", global = true)]
    pipe_dir: PathBuf,

    /// logging level (e.g. 'info', 'debug')
    #[arg(short, long, default_value = "warn", global = true)]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print one philosopher's states from its pipe until the run ends
    Watch {
        /// Philosopher id
        id: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Display {
    /// One table row per change on stdout
    Console,
    /// One named pipe per philosopher, read by `dining watch <id>`
    PerActor,
    /// JSON frames on stdout
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // logs go to stderr so they do not interleave with the table
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_writer(std::io::stderr)
        .init();

    if let Some(Command::Watch { id }) = &cli.command {
        let id = *id;
        let path = pipe_path(&cli.pipe_dir, id);
        let mut stdout = tokio::io::stdout();
        let lines = watch(&path, &mut stdout).await?;
        info!(philosopher = id, lines, "viewer finished");
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => TableConfig::from_yaml_file(path)?,
        None => TableConfig::default(),
    };
    if let Some(actors) = cli.actors {
        config.actors = actors;
    }
    config.validate()?;

    if cli.display != Display::PerActor {
        return simulate(&cli, config, None).await;
    }

    let pipes = PipeSet::create(&cli.pipe_dir, config.actors)?;
    eprintln!(
        "Start one viewer per philosopher: dining watch <id> --pipe-dir {}",
        cli.pipe_dir.display()
    );
    let result = simulate(&cli, config, Some(&pipes)).await;
    pipes.remove().await.context("failed to remove pipes")?;
    result
}

async fn simulate(cli: &Cli, config: TableConfig, pipes: Option<&PipeSet>) -> Result<()> {
    let mut printer = None;
    let observers: Vec<Arc<dyn Observer>> = match (cli.display, pipes) {
        (Display::PerActor, Some(pipes)) => pipes.open_observers().await?,
        (Display::Json, _) => {
            let channel = ChannelObserver::new(config.snapshot_channel_capacity);
            let mut frames = channel.subscribe();
            printer = Some(tokio::spawn(async move {
                while let Ok(frame) = frames.recv().await {
                    println!("{}", frame);
                    if ObserverFrame::decode(&frame).map(|f| f.is_terminated()).unwrap_or(false) {
                        break;
                    }
                }
            }));
            let channel: Arc<dyn Observer> = Arc::new(channel);
            vec![channel]
        }
        _ => {
            let console: Arc<dyn Observer> = Arc::new(ConsoleObserver::stdout());
            vec![console]
        }
    };

    let handle = Coordinator::new(config)
        .with_observers(observers)
        .start()
        .await?;
    info!(run_id = %handle.run_id(), "simulation running");

    eprintln!("Press Enter to terminate all philosophers");
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    tokio::select! {
        line = stdin.next_line() => {
            if let Err(e) = line {
                warn!(error = %e, "could not read stdin, stopping");
            }
        }
        _ = tokio::signal::ctrl_c() => {}
    }

    handle.request_stop().await;
    eprintln!("Please wait while every philosopher finishes the current meal");

    let report = handle.await_shutdown().await?;
    if let Some(printer) = printer {
        printer.await.context("frame printer failed")?;
    }

    eprintln!(
        "All philosophers have left the table after {:.1?} ({} meals)",
        report.elapsed,
        report.total_meals()
    );
    for (id, meals) in report.meals.iter().enumerate() {
        eprintln!("  philosopher {}: {} meals", id, meals);
    }
    Ok(())
}
