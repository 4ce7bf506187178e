use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};

use trainscope::catalog::{self, ALGORITHMS};
use trainscope::client::{TrainRequest, TrainingClient};
use trainscope::config::Config;
use trainscope::logging::{log, obj, v_str, Domain, Level};
use trainscope::metrics::DerivedMetrics;
use trainscope::playback::{PlaybackState, PlaybackTimer};
use trainscope::present::{present, RunInfo, ViewModel};
use trainscope::result::{decode_payload, RawResult};

#[derive(Parser, Debug)]
#[command(name = "trainscope", version, about = "Inspect ML training results and replay algorithm workflows")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Lists the algorithms the training service accepts.
    Algorithms,
    /// Prints the explanatory workflow for one algorithm.
    Workflow { algorithm: String },
    /// Renders a saved training response.
    Show {
        file: PathBuf,
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Trains on the remote service, then renders the result.
    Train {
        #[arg(long)]
        dataset_id: String,
        /// Estimator parameters as a JSON object.
        #[arg(long, default_value = "{}")]
        params: String,
        /// Also write the raw result to this file.
        #[arg(long)]
        save: Option<PathBuf>,
        #[command(flatten)]
        view: ViewArgs,
    },
}

#[derive(clap::Args, Debug)]
struct ViewArgs {
    #[arg(long)]
    algorithm: String,
    #[arg(long)]
    dataset: Option<String>,
    #[arg(long = "target")]
    target_column: Option<String>,
    /// Open the workflow at this step (1-based) instead of the first.
    #[arg(long)]
    step: Option<usize>,
    /// Replay the workflow, one frame per step.
    #[arg(long)]
    play: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = Config::from_env();
    log(
        Level::Info,
        Domain::System,
        "startup",
        obj(&[
            ("api_base", v_str(&cfg.api_base)),
            ("step_interval_ms", json!(cfg.step_interval_ms)),
            ("retry_max", json!(cfg.retry_max)),
        ]),
    );

    match cli.command {
        Commands::Algorithms => {
            for alg in ALGORITHMS {
                println!("{} {:<26} {:<28} {}", alg.glyph, alg.name, alg.kind.technique(), alg.description);
            }
        }
        Commands::Workflow { algorithm } => {
            let workflow = catalog::lookup(&algorithm);
            if workflow.is_empty() {
                return Err(anyhow!("no workflow registered for '{}'", algorithm));
            }
            for (i, step) in workflow.iter().enumerate() {
                println!("{}. {} {}: {}", i + 1, step.icon().glyph(), step.title, step.description);
            }
        }
        Commands::Show { file, view } => {
            let bytes = fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
            let result = decode_payload(&bytes)?;
            render(&cfg, &result, view).await?;
        }
        Commands::Train { dataset_id, params, save, view } => {
            let parameters: Map<String, Value> =
                serde_json::from_str(&params).context("--params must be a JSON object")?;
            let req = TrainRequest {
                dataset_id,
                algorithm: view.algorithm.clone(),
                target_column: view.target_column.clone().unwrap_or_default(),
                parameters,
            };
            let client = TrainingClient::new(&cfg)?;
            let result = client.train(&req).await?;
            if let Some(path) = save {
                fs::write(&path, serde_json::to_vec_pretty(&result)?)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
            render(&cfg, &result, view).await?;
        }
    }
    Ok(())
}

async fn render(cfg: &Config, result: &RawResult, args: ViewArgs) -> Result<()> {
    let workflow = catalog::lookup(&args.algorithm);
    let derived = DerivedMetrics::derive(result);
    let info = RunInfo {
        algorithm: args.algorithm.clone(),
        dataset_name: args.dataset.clone(),
        target_column: args.target_column.clone(),
    };
    log(
        Level::Info,
        Domain::Present,
        "render",
        obj(&[
            ("algorithm", v_str(&args.algorithm)),
            ("type", v_str(result.kind())),
            ("steps", json!(workflow.len())),
        ]),
    );

    let mut timer = PlaybackTimer::new(cfg.step_interval());
    let mut frames = timer.subscribe();
    timer.load(workflow.len());
    if let Some(step) = args.step {
        let index = step.checked_sub(1).ok_or_else(|| anyhow!("--step is 1-based"))?;
        timer.seek(index)?;
        if args.play {
            timer.toggle();
        }
    }
    if !args.play && timer.state().is_playing {
        timer.toggle();
    }
    frames.borrow_and_update();

    if timer.state().is_playing {
        print_frame(&present(result, &derived, timer.state(), workflow, &info));
        while frames.changed().await.is_ok() {
            let state: PlaybackState = *frames.borrow_and_update();
            print_frame(&present(result, &derived, state, workflow, &info));
            if !state.is_playing {
                break;
            }
        }
    }

    let vm = present(result, &derived, timer.state(), workflow, &info);
    println!("{}", serde_json::to_string_pretty(&vm)?);
    Ok(())
}

fn print_frame(vm: &ViewModel) {
    println!(
        "[{}] {:>3}%  {} {}: {}",
        vm.progress.label(),
        vm.progress.percent,
        vm.step.glyph,
        vm.step.title,
        vm.step.description
    );
}
