use crate::core::race::Race;
use crate::interfaces::control::RaceCommand;
use crate::interfaces::snapshot::{RaceSnapshot, MAX_SNAPSHOT_FREQUENCY};
use crate::post::race_result::RaceResult;
use crate::pre::read_sim_pars::SimPars;
use anyhow::Context;
use flume::{Receiver, Sender};
use helpers::general::format_racetime;
use log::{debug, info, warn};
use std::thread::sleep;
use std::time::{Duration, Instant};

/// handle_race creates and simulates a race on the basis of the inserted parameters, and returns
/// the results for post-processing.
///
/// Without a sender the race runs headless as fast as possible. With a sender it runs in real
/// time (scaled by `realtime_factor`), sends snapshots at a limited rate and applies the
/// race-control commands arriving on `rx`.
pub fn handle_race(
    sim_pars: &SimPars,
    tx: Option<&Sender<RaceSnapshot>>,
    rx: Option<&Receiver<RaceCommand>>,
    realtime_factor: f64,
) -> anyhow::Result<RaceResult> {
    let mut race = Race::new(
        &sim_pars.sim_params,
        &sim_pars.race_control,
        &sim_pars.track_pars,
        &sim_pars.starting_grid,
        &sim_pars.strategies,
    )
    .context("Failed to set up the race!")?;

    let max_race_time = sim_pars.sim_params.max_race_time;

    // check if sender was inserted -> in that case use real-time simulation
    match tx {
        None => {
            let mut t_race_update_print = 0.0;

            while !is_finished(&race, max_race_time) {
                race.advance();

                if race.cur_racetime > t_race_update_print + 59.9999 {
                    debug!(
                        "Simulating... Current race time is {}, current lap is {}",
                        format_racetime(race.cur_racetime),
                        race.cur_lap()
                    );
                    t_race_update_print = race.cur_racetime;
                }
            }
        }
        Some(tx) => {
            if !(realtime_factor > 0.0) {
                anyhow::bail!("Real-time factor must be positive, got {}!", realtime_factor);
            }

            let mut t_race_update_snapshot = f64::NEG_INFINITY;
            let mut lagging = false;

            while !is_finished(&race, max_race_time) {
                let t_start = Instant::now();

                if let Some(rx) = rx {
                    for command in rx.try_iter() {
                        info!("Race control command: {:?}", command);
                        race.apply_command(&command);
                    }
                }

                race.advance();

                if !race.is_paused()
                    && race.cur_racetime
                        > t_race_update_snapshot + 1.0 / MAX_SNAPSHOT_FREQUENCY - 0.001
                {
                    tx.send(race.snapshot())
                        .context("Failed to send race snapshot!")?;
                    t_race_update_snapshot = race.cur_racetime;
                }

                // sleep until time step is finished in real-time as well (calculation in ms)
                let t_sleep = (race.timestep_size * 1000.0 / realtime_factor) as i64
                    - t_start.elapsed().as_millis() as i64;

                if t_sleep > 0 {
                    sleep(Duration::from_millis(t_sleep as u64));
                    lagging = false;
                } else if !lagging {
                    warn!("Could not keep up with real-time!");
                    lagging = true;
                }
            }

            // send the final state once
            tx.send(race.snapshot())
                .context("Failed to send final race snapshot!")?;
        }
    }

    if !race.is_race_over() {
        if race.all_stopped() {
            info!("All cars stopped before the race distance was completed");
        } else {
            warn!(
                "Race stopped at the race time limit of {}",
                format_racetime(race.cur_racetime)
            );
        }
    }

    Ok(race.get_race_result())
}

/// is_finished checks the stop conditions: race over, no car able to move, or the time limit.
fn is_finished(race: &Race, max_race_time: Option<f64>) -> bool {
    race.is_race_over()
        || race.all_stopped()
        || max_race_time.map_or(false, |t_max| race.cur_racetime >= t_max)
}
