use clap::{value_parser, Arg, ArgAction, Command};
use grove_build::{BuildCodec, HexJsonCodec};
use grove_engine::{EnginePool, EnginePoolConfig, ProcessLauncher};
use grove_optimizer::{Optimizer, OptimizerConfig, TerminationReason};
use grove_stats::Objective;
use grove_tree::PassiveTree;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn engine_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("engine")
            .long("engine")
            .required(true)
            .help("Engine harness command"),
    )
    .arg(
        Arg::new("engine-arg")
            .long("engine-arg")
            .action(ArgAction::Append)
            .help("Argument passed to the engine harness (repeatable)"),
    )
    .arg(
        Arg::new("workers")
            .long("workers")
            .default_value("3")
            .value_parser(value_parser!(usize))
            .help("Engine worker processes"),
    )
    .arg(
        Arg::new("timeout-secs")
            .long("timeout-secs")
            .default_value("60")
            .value_parser(value_parser!(u64))
            .help("Watchdog timeout per evaluation"),
    )
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Command::new("grove")
        .version("0.1.0")
        .about("Passive-tree build optimizer")
        .arg_required_else_help(true)
        .subcommand(engine_args(
            Command::new("optimize")
                .about("Greedily improve a build token")
                .arg(
                    Arg::new("build")
                        .long("build")
                        .required(true)
                        .help("File containing the build token"),
                )
                .arg(
                    Arg::new("tree")
                        .long("tree")
                        .required(true)
                        .help("Tree dataset JSON file"),
                )
                .arg(
                    Arg::new("objective")
                        .long("objective")
                        .default_value("damage")
                        .help("damage, survivability, balanced, or a stat field name"),
                )
                .arg(
                    Arg::new("iterations")
                        .long("iterations")
                        .default_value("20")
                        .value_parser(value_parser!(u32))
                        .help("Maximum iterations"),
                )
                .arg(
                    Arg::new("budget-delta")
                        .long("budget-delta")
                        .default_value("0")
                        .allow_hyphen_values(true)
                        .value_parser(value_parser!(i32))
                        .help("Signed adjustment to the point budget"),
                )
                .arg(
                    Arg::new("min-improvement")
                        .long("min-improvement")
                        .default_value("0.005")
                        .value_parser(value_parser!(f64))
                        .help("Minimum ratio improvement to accept a candidate"),
                )
                .arg(
                    Arg::new("out")
                        .long("out")
                        .help("Write the final build token to this file"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the full outcome as JSON"),
                ),
        ))
        .subcommand(engine_args(
            Command::new("evaluate")
                .about("Evaluate one build token through the pool")
                .arg(
                    Arg::new("build")
                        .long("build")
                        .required(true)
                        .help("File containing the build token"),
                ),
        ))
        .subcommand(engine_args(
            Command::new("ping").about("Check engine worker health"),
        ));

    let matches = cli.get_matches();
    let outcome = match matches.subcommand() {
        Some(("optimize", args)) => optimize(args).await,
        Some(("evaluate", args)) => evaluate(args).await,
        Some(("ping", args)) => ping(args).await,
        _ => Ok(0),
    };

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            tracing::error!(%error, "fatal");
            std::process::exit(1);
        }
    }
}

async fn connect_pool(
    args: &clap::ArgMatches,
    cancel: CancellationToken,
) -> anyhow::Result<Arc<EnginePool>> {
    let program = args.get_one::<String>("engine").expect("required arg");
    let harness_args: Vec<String> = args
        .get_many::<String>("engine-arg")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let workers = *args.get_one::<usize>("workers").expect("defaulted arg");
    let timeout = *args.get_one::<u64>("timeout-secs").expect("defaulted arg");

    let launcher = Arc::new(ProcessLauncher::new(program, harness_args));
    let config = EnginePoolConfig::new()
        .with_workers(workers)
        .with_request_timeout(Duration::from_secs(timeout));
    let pool = EnginePool::connect(launcher, config, cancel).await?;
    Ok(Arc::new(pool))
}

fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let handle = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            handle.cancel();
        }
    });
    cancel
}

async fn optimize(args: &clap::ArgMatches) -> anyhow::Result<i32> {
    let token = std::fs::read_to_string(
        args.get_one::<String>("build").expect("required arg"),
    )?;
    let codec = Arc::new(HexJsonCodec);
    let build = codec.decode(&token)?;

    let tree = PassiveTree::load(args.get_one::<String>("tree").expect("required arg"))?;

    let cancel = cancel_on_ctrl_c();
    let pool = connect_pool(args, cancel.clone()).await?;

    let objective = Objective::parse(args.get_one::<String>("objective").expect("defaulted arg"));
    let config = OptimizerConfig::new(objective)
        .with_max_iterations(*args.get_one::<u32>("iterations").expect("defaulted arg"))
        .with_budget_delta(*args.get_one::<i32>("budget-delta").expect("defaulted arg"))
        .with_min_improvement(*args.get_one::<f64>("min-improvement").expect("defaulted arg"));

    let optimizer = Optimizer::new(tree, Arc::clone(&pool), codec.clone(), config)
        .with_cancellation(cancel);
    let outcome = optimizer.run(build).await?;
    let stats = pool.stats().await;
    pool.shutdown().await;

    let final_token = codec.encode(&outcome.build)?;
    if let Some(path) = args.get_one::<String>("out") {
        std::fs::write(path, &final_token)?;
    }

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("Iterations: {}", outcome.iterations.len());
        println!(
            "Accepted:   {}",
            outcome.iterations.iter().filter(|r| r.accepted).count()
        );
        println!("Converged:  {}", outcome.converged);
        println!("Stopped:    {:?}", outcome.termination);
        if let Some(error) = &outcome.last_error {
            println!("Last error: {error}");
        }
        println!(
            "Evaluations: {} completed, {} failed, {} retried, {} engine restarts",
            stats.completed, stats.failed, stats.retried, stats.restarts
        );
        for (key, value) in outcome.estimate.iter() {
            println!("  {key}: {value:.1}");
        }
        println!("{final_token}");
    }

    Ok(match outcome.termination {
        TerminationReason::PoolUnavailable | TerminationReason::EngineFailure => 1,
        _ => 0,
    })
}

async fn evaluate(args: &clap::ArgMatches) -> anyhow::Result<i32> {
    let token = std::fs::read_to_string(
        args.get_one::<String>("build").expect("required arg"),
    )?;
    let build = HexJsonCodec.decode(&token)?;

    let cancel = cancel_on_ctrl_c();
    let pool = connect_pool(args, cancel).await?;
    let evaluation = pool
        .evaluate(token.trim(), build.allocation.len() as u64)
        .await;
    pool.shutdown().await;

    let evaluation = evaluation?;
    println!("allocated: {}", evaluation.allocated);
    for (key, value) in evaluation.stats.iter() {
        println!("{key}: {value}");
    }
    Ok(0)
}

async fn ping(args: &clap::ArgMatches) -> anyhow::Result<i32> {
    let cancel = cancel_on_ctrl_c();
    let pool = connect_pool(args, cancel).await?;
    let health = pool.ping().await;
    pool.shutdown().await;

    for (worker, ok) in &health {
        println!("worker {worker}: {}", if *ok { "ok" } else { "unresponsive" });
    }
    Ok(i32::from(!health.iter().all(|(_, ok)| *ok)))
}
