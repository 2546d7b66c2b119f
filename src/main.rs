use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use reinforced_lib::agents::{AgentFromParams, Dqn, ExpectedSarsa, ParticleFilter};
use reinforced_lib::envs::{MobilityModel, WifiConfig};
use reinforced_lib::modes::{
    CheckpointMode, RaConfig, RaMode, TrainConfig, TrainFileConfig, TrainMode,
};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rlib")]
#[command(version, about = "Reinforcement learning agents for simulated environments")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a deep agent on CartPole
    Train(TrainArgs),
    /// Run the IEEE 802.11ax rate adaptation scenario
    Ra(RaArgs),
    /// Write an inference-only copy of a training checkpoint
    Checkpoint(CheckpointArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum DeepAgent {
    Dqn,
    ExpectedSarsa,
}

#[derive(Clone, Copy, ValueEnum)]
enum RaAgent {
    ParticleFilter,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mobility {
    Distance,
    Rwpm,
}

#[derive(Args)]
struct TrainArgs {
    #[arg(long, value_enum, default_value = "dqn")]
    agent: DeepAgent,

    /// Number of training episodes
    #[arg(long, default_value = "300")]
    episodes: usize,

    #[arg(long, default_value = "42")]
    seed: u64,

    /// Checkpoint directory
    #[arg(long, default_value = "checkpoints/cartpole")]
    save_path: PathBuf,

    /// Print progress every N episodes
    #[arg(long, default_value = "10")]
    log_frequency: usize,

    /// Save a checkpoint every N episodes
    #[arg(long, default_value = "100")]
    checkpoint_frequency: usize,

    /// TOML file with agent parameter and logger overrides
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write per-step reward and loss to this CSV file
    #[arg(long)]
    csv_log: Option<PathBuf>,
}

#[derive(Args)]
struct RaArgs {
    #[arg(long, value_enum, default_value = "particle-filter")]
    agent: RaAgent,

    /// Number of stations
    #[arg(long, default_value = "1")]
    n_wifi: usize,

    /// Channel width [MHz]
    #[arg(long, default_value = "20")]
    channel_width: u32,

    /// Initial distance from the AP [m]
    #[arg(long, default_value = "10")]
    distance: f64,

    /// Station velocity [m/s]
    #[arg(long, default_value = "0")]
    velocity: f64,

    #[arg(long, value_enum, default_value = "distance")]
    mobility_model: Mobility,

    /// Side of the square area for random waypoint mobility [m]
    #[arg(long, default_value = "40")]
    area: f64,

    /// Station speed for random waypoint mobility [m/s]
    #[arg(long, default_value = "1.4")]
    node_speed: f64,

    /// Simulation duration [s]
    #[arg(long, default_value = "20")]
    simulation_time: f64,

    /// Time between transmission reports [s]
    #[arg(long, default_value = "0.01")]
    interval: f64,

    /// Output file with one row per decision
    #[arg(long, default_value = "results.csv")]
    csv_path: PathBuf,

    #[arg(long, default_value = "42")]
    seed: u64,
}

#[derive(Args)]
struct CheckpointArgs {
    #[arg(long, value_enum)]
    agent: DeepAgent,

    /// Checkpoint written during training
    #[arg(long)]
    load_path: PathBuf,

    /// Where to write the inference-only checkpoint
    #[arg(long)]
    save_path: PathBuf,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Train(args) => {
            let agent = args.agent;
            let config = train_config(args)?;
            match agent {
                DeepAgent::Dqn => train::<Dqn>(config),
                DeepAgent::ExpectedSarsa => train::<ExpectedSarsa>(config),
            }
        }
        Command::Ra(args) => {
            let RaAgent::ParticleFilter = args.agent;
            tracing::info!(agent = ParticleFilter::NAME, "Starting rate adaptation");
            RaMode::new(ra_config(args)).run()?;
            Ok(())
        }
        Command::Checkpoint(args) => {
            let mode = CheckpointMode::new(args.load_path, args.save_path);
            match args.agent {
                DeepAgent::Dqn => mode.run::<Dqn>()?,
                DeepAgent::ExpectedSarsa => mode.run::<ExpectedSarsa>()?,
            };
            Ok(())
        }
    }
}

fn train<A: AgentFromParams>(config: TrainConfig) -> Result<()> {
    let mut train_mode = TrainMode::<A>::new(config)?;
    train_mode.run()
}

fn train_config(args: TrainArgs) -> Result<TrainConfig> {
    let mut config = TrainConfig::new(args.episodes, args.save_path);
    config.seed = args.seed;
    config.log_frequency = args.log_frequency;
    config.checkpoint_frequency = args.checkpoint_frequency;

    if let Some(path) = &args.config {
        config = config.with_file_config(TrainFileConfig::load(path)?);
    }
    if let Some(path) = args.csv_log {
        config.csv_log = true;
        config.logger_config.csv_path = path;
    }
    Ok(config)
}

fn ra_config(args: RaArgs) -> RaConfig {
    let mut config = RaConfig::new(args.csv_path);
    config.seed = args.seed;
    config.wifi = WifiConfig {
        n_wifi: args.n_wifi,
        channel_width: args.channel_width,
        distance: args.distance,
        velocity: args.velocity,
        mobility_model: match args.mobility_model {
            Mobility::Distance => MobilityModel::Distance,
            Mobility::Rwpm => MobilityModel::Rwpm,
        },
        area: args.area,
        node_speed: args.node_speed,
        simulation_time: args.simulation_time,
        interval: args.interval,
        ..WifiConfig::default()
    };
    config
}
