//! Runs a lane change experiment on a simulated highway.

use clap::Parser;
use ilach_sim::{
    lane_mask, Algorithm, Config, HighwayParams, HighwayTraffic, Result, Simulation,
    VehicleAttributes,
};
use itertools::Itertools;
use log::info;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ilach-sim")]
#[command(about = "Simulate cooperative lane change negotiation on a highway", long_about = None)]
struct Args {
    /// JSON configuration file; flags below override its values
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Length of a traffic step in seconds
    #[arg(long)]
    step_length: Option<f64>,

    /// Lanes whose vehicles may be selected to change lanes, e.g. `1,2,3`
    #[arg(long, value_delimiter = ',')]
    selection_lanes: Option<Vec<u32>>,

    /// Probability of selecting an eligible vehicle
    #[arg(short = 'p', long)]
    selection_probability: Option<f64>,

    /// Seconds between selections
    #[arg(long)]
    selection_interval: Option<f64>,

    /// Seed for every random number generator
    #[arg(short, long)]
    seed: Option<u64>,

    /// Speed limit of each lane in m/s, e.g. `26.82,26.82,30`
    #[arg(long, value_delimiter = ',')]
    lane_speed_limits: Option<Vec<f64>>,

    /// Use the enhanced (ILACH+) algorithm
    #[arg(short, long)]
    enhanced: bool,

    /// Number of vehicles to send down the road
    #[arg(short, long, default_value = "100")]
    vehicles: usize,

    /// Seconds between departures
    #[arg(long, default_value = "2")]
    headway: f64,

    /// Length of the road in m
    #[arg(long, default_value = "3000")]
    road_length: f64,

    /// Write every lane change recommendation to this JSON file
    #[arg(long)]
    lane_change_output: Option<PathBuf>,
}

impl Args {
    /// Builds the experiment configuration from the file, if any, and the flags.
    fn config(&self) -> Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::from_json_file(path)?,
            None => Config::default(),
        };
        if let Some(step_length) = self.step_length {
            config.step_length = step_length;
        }
        if let Some(lanes) = &self.selection_lanes {
            config.selection_lanes = lane_mask(lanes.iter().copied());
        }
        if let Some(probability) = self.selection_probability {
            config.selection_probability = probability;
        }
        if let Some(interval) = self.selection_interval {
            config.selection_interval = interval;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(limits) = &self.lane_speed_limits {
            config.lane_speed_limits = limits.clone();
        }
        if self.enhanced {
            config.algorithm = Algorithm::Enhanced;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = args.config()?;

    let mut traffic = HighwayTraffic::new(HighwayParams {
        num_lanes: config.num_lanes,
        road_length: args.road_length,
        step_length: config.step_length,
    });
    let template = VehicleAttributes {
        length: 5.0,
        max_speed: 55.55,
        acceleration: 2.6,
        deceleration: 4.5,
        ..Default::default()
    };
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed.wrapping_add(2));
    traffic.schedule_random_departures(args.vehicles, args.headway, 25.0, 3.0, &template, &mut rng)?;

    let mut sim = Simulation::new(config, traffic)?;
    let end = sim.run();

    let log = sim.lane_change_log();
    let recommended = log.iter().filter(|r| r.recommended).count();
    info!(
        "{} negotiations in {:.0}s: {} recommended, {} deferred",
        log.len(),
        end.as_secs_f64(),
        recommended,
        log.len() - recommended
    );
    let per_lane = log
        .iter()
        .filter(|r| r.recommended)
        .counts_by(|r| r.to_lane)
        .into_iter()
        .sorted()
        .map(|(lane, count)| format!("lane {lane}: {count}"))
        .join(", ");
    if !per_lane.is_empty() {
        info!("Recommended moves by target lane: {per_lane}");
    }

    if let Some(path) = &args.lane_change_output {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, log)?;
        info!("Lane changes written to {}", path.display());
    }

    Ok(())
}
