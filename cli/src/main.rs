use anyhow::Context;
use clap::Parser;
use env_logger::{Builder, Env};
use log::{info, warn};
use racesim::core::handle_race::handle_race;
use racesim::interfaces::control::{parse_command, RaceCommand};
use racesim::interfaces::snapshot::RaceSnapshot;
use racesim::post::race_result::RaceResult;
use racesim::post::telemetry::write_telemetry_csv;
use racesim::pre::read_sim_pars::{read_sim_pars_flexible, SimPars};
use racesim::pre::sim_opts::SimOpts;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;
use std::thread;
use std::time::Instant;

fn main() -> anyhow::Result<()> {
    // PRE-PROCESSING ------------------------------------------------------------------------------
    // get simulation options from the command line arguments
    let sim_opts: SimOpts = SimOpts::parse();

    let default_filter = if sim_opts.debug { "debug" } else { "info" };
    Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    // get simulation parameters
    info!(
        "Reading simulation parameters from {}",
        sim_opts.parfile_path.display()
    );
    let mut sim_pars = read_sim_pars_flexible(&sim_opts.parfile_path)?;

    if let Some(seed) = sim_opts.seed {
        sim_pars.sim_params.seed = seed;
    }
    if let Some(timestep_size) = sim_opts.timestep_size {
        sim_pars.sim_params.time_step = timestep_size;
    }

    // print race details
    info!(
        "Simulating {} over {} laps with {} cars and a time step size of {:.3}s",
        sim_pars.track_pars.name,
        sim_pars.sim_params.race_laps,
        sim_pars.starting_grid.len(),
        sim_pars.sim_params.time_step
    );

    // EXECUTION -----------------------------------------------------------------------------------
    if sim_opts.live {
        run_live(&sim_opts, sim_pars)
    } else if sim_opts.no_sim_runs > 1 {
        run_monte_carlo(&sim_pars, sim_opts.no_sim_runs)
    } else {
        run_single(&sim_opts, &sim_pars)
    }
}

/// run_single simulates one race as fast as possible and writes the results.
fn run_single(sim_opts: &SimOpts, sim_pars: &SimPars) -> anyhow::Result<()> {
    let t_start = Instant::now();
    let race_result = handle_race(sim_pars, None, None, 1.0)?;
    info!("Execution time: {}ms", t_start.elapsed().as_millis());

    race_result.print_result()?;
    write_outputs(&race_result, &sim_opts.output_dir)
}

/// run_monte_carlo simulates the race once per seed in parallel and prints the win tally.
fn run_monte_carlo(sim_pars: &SimPars, no_sim_runs: u32) -> anyhow::Result<()> {
    let seed_start = sim_pars.sim_params.seed;
    info!(
        "Running {} races with seeds {}..{}",
        no_sim_runs,
        seed_start,
        seed_start.wrapping_add(no_sim_runs as u64)
    );

    let t_start = Instant::now();
    let winners: Vec<Option<String>> = (0..no_sim_runs as u64)
        .into_par_iter()
        .map(|i| {
            let mut pars = sim_pars.clone();
            pars.sim_params.seed = seed_start.wrapping_add(i);
            handle_race(&pars, None, None, 1.0).map(|result| result.winner)
        })
        .collect::<anyhow::Result<_>>()?;
    info!("Execution time: {}ms", t_start.elapsed().as_millis());

    let mut tally: HashMap<String, u32> = HashMap::new();
    for winner in winners.iter() {
        let key = winner.clone().unwrap_or_else(|| String::from("no winner"));
        *tally.entry(key).or_insert(0) += 1;
    }

    let mut tally: Vec<(String, u32)> = tally.into_iter().collect();
    tally.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    println!("RESULT: Wins after {} races", no_sim_runs);
    for (driver, wins) in tally.iter() {
        println!(
            "{:<10} {:>6} {:>6.1}%",
            driver,
            wins,
            *wins as f64 / no_sim_runs as f64 * 100.0
        );
    }

    Ok(())
}

/// run_live simulates the race in real-time. Snapshots are written to the snapshot file and
/// race-control commands are read line by line from stdin.
fn run_live(sim_opts: &SimOpts, sim_pars: SimPars) -> anyhow::Result<()> {
    let (tx_snapshot, rx_snapshot) = flume::unbounded::<RaceSnapshot>();
    let (tx_command, rx_command) = flume::unbounded::<RaceCommand>();

    // commands are read in a separate thread since reading stdin blocks
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(_) => break,
            };
            match parse_command(&line) {
                Some(command) => {
                    if tx_command.send(command).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => warn!("Unknown race control command: {}", line.trim()),
            }
        }
    });

    // run simulator in a separate thread
    let realtime_factor = sim_opts.realtime_factor;
    let race_thread = thread::spawn(move || {
        handle_race(
            &sim_pars,
            Some(&tx_snapshot),
            Some(&rx_command),
            realtime_factor,
        )
    });

    info!(
        "Writing live snapshots to {}",
        sim_opts.snapshot_path.display()
    );
    for snapshot in rx_snapshot.iter() {
        write_snapshot(&snapshot, &sim_opts.snapshot_path)?;
    }

    let race_result = race_thread
        .join()
        .map_err(|_| anyhow::anyhow!("Race thread panicked!"))??;

    race_result.print_result()?;
    write_outputs(&race_result, &sim_opts.output_dir)
}

/// write_snapshot replaces the snapshot file atomically (write to a temporary file, then rename)
/// so that readers never see a partially written snapshot.
fn write_snapshot(snapshot: &RaceSnapshot, path: &Path) -> anyhow::Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let mut fh = fs::File::create(&tmp_path).context(format!(
        "Failed to create snapshot file {}!",
        tmp_path.display()
    ))?;
    serde_json::to_writer(&mut fh, snapshot).context("Failed to serialize snapshot!")?;
    fh.flush()?;
    drop(fh);

    fs::rename(&tmp_path, path).context(format!(
        "Failed to move snapshot to {}!",
        path.display()
    ))?;
    Ok(())
}

/// write_outputs writes the result table, the result CSV and the telemetry history.
fn write_outputs(race_result: &RaceResult, output_dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(output_dir).context(format!(
        "Failed to create output directory {}!",
        output_dir.display()
    ))?;

    let txt_path = race_result.write_result_to_file(&output_dir.join("race_result.txt"))?;
    race_result.write_result_csv(&output_dir.join("race_result.csv"))?;
    write_telemetry_csv(&race_result.telemetry, &output_dir.join("telemetry.csv"))?;

    info!(
        "Results written to {} (with race_result.csv and telemetry.csv)",
        txt_path.display()
    );
    Ok(())
}
