use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use skewjoin::cluster::{self, NodeInput, TransportKind};
use skewjoin::{
    EstimatorStrategy, HeavyHitterScope, JoinConfig, NodeConfig, Relation, Row, SkewPolicy,
    SpaceSaving,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser)]
#[command(name = "skewjoin")]
#[command(about = "Skew-aware distributed equi-join over sharded tuple files")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every node of a cluster in this process and join the shards
    Run {
        #[command(flatten)]
        shards: ShardArgs,
        #[command(flatten)]
        tuning: TuningArgs,
        #[arg(long, value_enum, default_value_t = TransportArg::Memory)]
        transport: TransportArg,
        /// `<ip> <port>` per node; without it TCP nodes bind ephemeral localhost ports
        #[arg(long)]
        node_config: Option<PathBuf>,
        /// Directory for one `<node>_result.txt` per node
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// JSON report of the run
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Redistribute and join in a single process without any transport
    Simulate {
        #[command(flatten)]
        shards: ShardArgs,
        #[command(flatten)]
        tuning: TuningArgs,
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Print the heavy hitters of one S file
    Estimate {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value_t = 128)]
        k: usize,
        #[arg(long, default_value_t = 0.01)]
        threshold: f64,
        #[arg(long, default_value_t = 1)]
        stride: usize,
        #[arg(long, default_value_t = EstimatorStrategy::LinearScan)]
        estimator: EstimatorStrategy,
    },
    /// Update rate of every estimator strategy for 2^1..2^max_exp distinct keys
    BenchEstimator {
        #[arg(long, default_value_t = 128)]
        k: usize,
        #[arg(long, default_value_t = 1_000_000)]
        stream_len: usize,
        #[arg(long, default_value_t = 15)]
        max_exp: u32,
    },
}

#[derive(Args)]
struct ShardArgs {
    /// Directory with one R shard per node, named by 1-based node id
    #[arg(long)]
    r_dir: PathBuf,
    /// Directory with one S shard per node, named by 1-based node id
    #[arg(long)]
    s_dir: PathBuf,
    #[arg(long, short = 'n')]
    nodes: usize,
}

#[derive(Args)]
struct TuningArgs {
    /// JSON join config; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    k: Option<usize>,
    #[arg(long)]
    threshold: Option<f64>,
    #[arg(long)]
    stride: Option<usize>,
    #[arg(long)]
    estimator: Option<EstimatorStrategy>,
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,
    #[arg(long, value_enum)]
    scope: Option<ScopeArg>,
    #[arg(long)]
    batch_size: Option<usize>,
}

#[derive(Clone, Copy, ValueEnum)]
enum TransportArg {
    Memory,
    Tcp,
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    SkewAware,
    HashOnly,
}

#[derive(Clone, Copy, ValueEnum)]
enum ScopeArg {
    Shared,
    NodeLocal,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            shards,
            tuning,
            transport,
            node_config,
            output_dir,
            report,
        } => {
            run(
                &shards,
                &tuning,
                transport,
                node_config.as_deref(),
                output_dir.as_deref(),
                report.as_deref(),
            )
            .await
        }
        Command::Simulate {
            shards,
            tuning,
            report,
        } => simulate(&shards, &tuning, report.as_deref()),
        Command::Estimate {
            file,
            k,
            threshold,
            stride,
            estimator,
        } => estimate(&file, k, threshold, stride, estimator),
        Command::BenchEstimator {
            k,
            stream_len,
            max_exp,
        } => bench_estimator(k, stream_len, max_exp),
    }
}

fn load(shards: &ShardArgs) -> Result<Vec<NodeInput>> {
    cluster::load_inputs(&shards.r_dir, &shards.s_dir, shards.nodes).with_context(|| {
        format!(
            "Failed to load shards from '{}' and '{}'",
            shards.r_dir.display(),
            shards.s_dir.display()
        )
    })
}

fn build_config(shards: &ShardArgs, tuning: &TuningArgs, inputs: &[NodeInput]) -> Result<JoinConfig> {
    let mut config = match &tuning.config {
        Some(path) => JoinConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        None => JoinConfig::default(),
    };
    let (max_r, max_s) = cluster::max_shard_sizes(inputs);
    config.node_count = shards.nodes;
    config = config.row_bounds(max_r, max_s);

    if let Some(k) = tuning.k {
        config = config.heavy_hitter_capacity(k);
    }
    if let Some(threshold) = tuning.threshold {
        config = config.heavy_hitter_threshold(threshold);
    }
    if let Some(stride) = tuning.stride {
        config = config.sample_stride(stride);
    }
    if let Some(estimator) = tuning.estimator {
        config = config.estimator(estimator);
    }
    if let Some(policy) = tuning.policy {
        config = config.policy(match policy {
            PolicyArg::SkewAware => SkewPolicy::SkewAware,
            PolicyArg::HashOnly => SkewPolicy::HashOnly,
        });
    }
    if let Some(scope) = tuning.scope {
        config = config.scope(match scope {
            ScopeArg::Shared => HeavyHitterScope::Shared,
            ScopeArg::NodeLocal => HeavyHitterScope::NodeLocal,
        });
    }
    if let Some(batch_size) = tuning.batch_size {
        config = config.batch_size(batch_size);
    }
    config.validate().context("Invalid join configuration")?;
    Ok(config)
}

async fn run(
    shards: &ShardArgs,
    tuning: &TuningArgs,
    transport: TransportArg,
    node_config: Option<&Path>,
    output_dir: Option<&Path>,
    report_path: Option<&Path>,
) -> Result<()> {
    let inputs = load(shards)?;
    let config = build_config(shards, tuning, &inputs)?;
    let kind = match (transport, node_config) {
        (TransportArg::Memory, None) => TransportKind::Memory,
        (TransportArg::Memory, Some(_)) => {
            return Err(anyhow!("--node-config only applies to --transport tcp"));
        }
        (TransportArg::Tcp, Some(path)) => TransportKind::Tcp(
            NodeConfig::from_file(path)
                .with_context(|| format!("Failed to load node config '{}'", path.display()))?,
        ),
        (TransportArg::Tcp, None) => TransportKind::LocalTcp,
    };

    let report = cluster::run_cluster(config, inputs, kind)
        .await
        .context("Join run failed")?;

    for node in &report.nodes {
        println!(
            "node {}: {} R + {} S in, {} heavy hitters, {} rows out ({:?} join)",
            node.node_id + 1,
            node.input_r,
            node.input_s,
            node.routing_heavy_hitters,
            node.join.row_count(),
            node.timings.join
        );
    }
    println!(
        "total: {} rows in {:?}",
        report.total_rows(),
        report.elapsed
    );

    if let Some(dir) = output_dir {
        for node in &report.nodes {
            write_result(dir, node.node_id, node.rows())?;
        }
    }
    if let Some(path) = report_path {
        write_report(path, &report)?;
    }
    Ok(())
}

fn simulate(shards: &ShardArgs, tuning: &TuningArgs, report_path: Option<&Path>) -> Result<()> {
    let inputs = load(shards)?;
    let config = build_config(shards, tuning, &inputs)?;
    let report = cluster::simulate(&config, &inputs).context("Simulation failed")?;

    println!("heavy hitters: {:?}", report.heavy_hitters);
    for partition in &report.partitions {
        println!(
            "node {}: {} x {} rows -> {} in {:?}",
            partition.node_id + 1,
            partition.join.build_rows,
            partition.join.probe_rows,
            partition.join.row_count(),
            partition.join.elapsed
        );
    }
    println!(
        "total: {} rows, slowest node {:?}",
        report.total_rows(),
        report.slowest_join()
    );

    if let Some(path) = report_path {
        write_report(path, &report)?;
    }
    Ok(())
}

fn estimate(
    file: &Path,
    k: usize,
    threshold: f64,
    stride: usize,
    strategy: EstimatorStrategy,
) -> Result<()> {
    let rows = skewjoin::io::read_tuples(file, Relation::S)
        .with_context(|| format!("Failed to read '{}'", file.display()))?;
    let keys = skewjoin::estimator::sample_keys(&rows, stride)?;
    let mut estimator = SpaceSaving::new(k, strategy)?;
    estimator.observe_all(keys);

    println!(
        "{} keys observed, {} counters in use",
        estimator.total_seen(),
        estimator.tracked()
    );
    for (key, frequency) in estimator.heavy_hitters(threshold) {
        println!("{}\t{:.4}", key, frequency);
    }
    Ok(())
}

fn bench_estimator(k: usize, stream_len: usize, max_exp: u32) -> Result<()> {
    if max_exp == 0 || max_exp > 31 {
        return Err(anyhow!("--max-exp must be in 1..=31"));
    }
    println!("distinct\t{}", EstimatorStrategy::ALL.map(|s| s.to_string()).join("\t"));
    for exp in 1..=max_exp {
        let distinct = 1u32 << exp;
        let stream: Vec<u32> = (0..stream_len as u64)
            .map(|i| (i.wrapping_mul(2_654_435_761) % distinct as u64) as u32)
            .collect();

        let mut rates = Vec::with_capacity(EstimatorStrategy::ALL.len());
        for strategy in EstimatorStrategy::ALL {
            let mut estimator = SpaceSaving::new(k, strategy)?;
            let started = Instant::now();
            estimator.observe_all(stream.iter().copied());
            let seconds = started.elapsed().as_secs_f64().max(f64::EPSILON);
            rates.push(format!("{:.0}", stream_len as f64 / seconds));
        }
        println!("{}\t{}", distinct, rates.join("\t"));
    }
    Ok(())
}

fn write_result(dir: &Path, node_id: usize, rows: &[Row]) -> Result<()> {
    let path = dir.join(format!("{}_result.txt", node_id + 1));
    skewjoin::io::write_rows(&path, rows)
        .with_context(|| format!("Failed to write results to '{}'", path.display()))
}

fn write_report<T: Serialize>(path: &Path, report: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to encode report")?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create parent directory '{}'", parent.display())
            })?;
        }
    }
    fs::write(path, json)
        .with_context(|| format!("Failed to write report to '{}'", path.display()))?;
    println!("Report written to {}", path.display());
    Ok(())
}
