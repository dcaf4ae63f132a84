use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser, Clone)]
#[clap(
    version = "0.1.0",
    name = "racesim",
    about = "An agent-based race simulator on a track graph"
)]
pub struct SimOpts {
    // FLAGS ---------------------------------------------------------------------------------------
    /// Activate debug logging
    #[clap(short, long)]
    pub debug: bool,

    /// Live mode - race will be simulated in real-time, snapshots are written to a file and
    /// race-control commands are read from stdin
    #[clap(short, long)]
    pub live: bool,

    // OPTIONS -------------------------------------------------------------------------------------
    /// Set path to the simulation parameter file
    #[clap(short, long)]
    pub parfile_path: PathBuf,

    /// Set number of simulation runs (seeds seed..seed+n, ignored in live mode)
    #[clap(short, long, default_value = "1")]
    pub no_sim_runs: u32,

    /// Override the seed of the parameter file
    #[clap(short, long)]
    pub seed: Option<u64>,

    /// Override the simulation timestep size in seconds, should be in the range [0.001, 1.0]
    #[clap(short, long)]
    pub timestep_size: Option<f64>,

    /// Set real-time factor (only relevant in live mode)
    #[clap(short, long, default_value = "1.0")]
    pub realtime_factor: f64,

    /// Set path of the snapshot file written in live mode
    #[clap(long, default_value = "output/race_snapshot.json")]
    pub snapshot_path: PathBuf,

    /// Set directory for result and telemetry files
    #[clap(short, long, default_value = "output")]
    pub output_dir: PathBuf,
}
