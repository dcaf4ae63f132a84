//! External snapshot schema and its construction from the race state.

use crate::core::car::{AeroMode, Car, CarStatus};
use crate::core::race_control::{SafetyCondition, WeatherState};
use crate::core::rng::SimRng;
use crate::core::tireset::TyreCompound;
use crate::core::track::TrackGraph;
use crate::error::{SimError, SimResult};
use helpers::general::{clamp_unit, format_laptime};
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

pub const MAX_SNAPSHOT_FREQUENCY: f64 = 20.0;

/// Offset of the telemetry noise stream relative to the race seed.
const NOISE_STREAM: u64 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceStatus {
    pub timestamp: String,
    pub current_lap: u32,
    pub total_laps: u32,
    pub safety_car: SafetyCondition,
    pub weather: WeatherState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LapData {
    pub current_lap: u32,
    pub last_lap_time: String,
    pub fastest_lap_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VehicleState {
    pub battery_soc: f64,
    pub fuel_remaining_mj: f64,
    pub aero_mode: AeroMode,
    pub mom_available: bool,
    pub mom_active: bool,
    pub tyre_life: f64,
    pub tyre_compound: TyreCompound,
    pub tyre_temp: f64,
    pub on_cliff: bool,
    pub pit_stops_made: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: String,
    pub team: String,
    pub rank: u32,
    pub position: [f64; 2],
    pub status: CarStatus,
    pub lap_data: LapData,
    pub vehicle_state: VehicleState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceSnapshot {
    pub race_status: RaceStatus,
    pub agents: Vec<AgentSnapshot>,
}

/// * `battery_sd` - Standard deviation of the reported state of charge (fraction)
/// * `fuel_sd` - (MJ) Standard deviation of the reported fuel energy
/// * `tyre_sd` - Standard deviation of the reported tyre life (fraction)
/// * `temp_sd` - (°C) Standard deviation of the reported tyre temperature
#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelemetryNoisePars {
    #[serde(default)]
    pub battery_sd: f64,
    #[serde(default)]
    pub fuel_sd: f64,
    #[serde(default)]
    pub tyre_sd: f64,
    #[serde(default)]
    pub temp_sd: f64,
}

#[derive(Debug, Clone)]
struct NoiseDists {
    battery: Normal<f64>,
    fuel: Normal<f64>,
    tyre: Normal<f64>,
    temp: Normal<f64>,
}

/// TelemetryEmitter turns the race state into snapshots. Measurement noise is drawn from its
/// own random stream, so emitting snapshots never changes the course of the race.
#[derive(Debug, Clone)]
pub struct TelemetryEmitter {
    noise: Option<NoiseDists>,
    rng: SimRng,
}

impl TelemetryEmitter {
    pub fn new(noise_pars: Option<&TelemetryNoisePars>, seed: u64) -> SimResult<TelemetryEmitter> {
        let dist = |name: &str, sd: f64| {
            if !(sd.is_finite() && sd >= 0.0) {
                return Err(SimError::Parameter(format!(
                    "telemetry noise {} must be finite and not negative, got {}",
                    name, sd
                )));
            }
            Normal::new(0.0, sd).map_err(|e| {
                SimError::Parameter(format!("telemetry noise {}: {} (got {})", name, e, sd))
            })
        };

        let noise = match noise_pars {
            Some(p) => Some(NoiseDists {
                battery: dist("battery_sd", p.battery_sd)?,
                fuel: dist("fuel_sd", p.fuel_sd)?,
                tyre: dist("tyre_sd", p.tyre_sd)?,
                temp: dist("temp_sd", p.temp_sd)?,
            }),
            None => None,
        };

        Ok(TelemetryEmitter {
            noise,
            rng: SimRng::child(seed, NOISE_STREAM),
        })
    }

    /// build creates the snapshot of all cars in ranking order.
    pub fn build(
        &mut self,
        race_status: RaceStatus,
        cars: &[Car],
        ranking: &[usize],
        track: &TrackGraph,
    ) -> RaceSnapshot {
        let agents = ranking
            .iter()
            .enumerate()
            .map(|(rank, &idx)| self.agent_snapshot(&cars[idx], rank as u32 + 1, &race_status, track))
            .collect();

        RaceSnapshot {
            race_status,
            agents,
        }
    }

    fn agent_snapshot(
        &mut self,
        car: &Car,
        rank: u32,
        race_status: &RaceStatus,
        track: &TrackGraph,
    ) -> AgentSnapshot {
        let mut battery_soc = car.battery_soc;
        let mut fuel = car.fuel_remaining_mj;
        let mut tyre_life = car.tireset.life;
        let mut tyre_temp = car.tireset.temperature;

        if let Some(noise) = &self.noise {
            let rng = self.rng.inner();
            battery_soc = clamp_unit(battery_soc + noise.battery.sample(rng));
            fuel = (fuel + noise.fuel.sample(rng)).max(0.0);
            tyre_life = clamp_unit(tyre_life + noise.tyre.sample(rng));

            let band = &car.strategy.tyre_temp;
            tyre_temp = (tyre_temp + noise.temp.sample(rng)).clamp(band.min, band.max);
        }

        let laptime_str =
            |t: Option<f64>| t.map_or_else(|| String::from("-"), format_laptime);

        AgentSnapshot {
            id: car.id.to_owned(),
            team: car.team.to_owned(),
            rank,
            position: track.position(car.sh.cur_node, car.sh.cur_edge, car.sh.progress),
            status: car.status,
            lap_data: LapData {
                current_lap: (car.sh.laps_completed + 1).min(race_status.total_laps),
                last_lap_time: laptime_str(car.sh.last_laptime()),
                fastest_lap_time: laptime_str(car.sh.fastest_laptime()),
            },
            vehicle_state: VehicleState {
                battery_soc,
                fuel_remaining_mj: fuel,
                aero_mode: car.aero_mode,
                mom_available: car.boost_available,
                mom_active: car.boost_active,
                tyre_life,
                tyre_compound: car.tireset.compound,
                tyre_temp,
                on_cliff: car.tireset.on_cliff,
                pit_stops_made: car.pit_stops,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::car::GridEntry;
    use crate::core::strategy::tests::base_pars;
    use crate::core::strategy::Strategy;
    use crate::core::track::tests::oval_with_pits;
    use std::rc::Rc;

    fn status() -> RaceStatus {
        RaceStatus {
            timestamp: String::from("0:00:01.0"),
            current_lap: 1,
            total_laps: 3,
            safety_car: SafetyCondition::None,
            weather: WeatherState::Dry,
        }
    }

    fn cars(track: &TrackGraph) -> Vec<Car> {
        let strategy = Rc::new(Strategy::new("base", &base_pars()).unwrap());
        ["AAA", "BBB"]
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let entry = GridEntry {
                    driver_id: id.to_string(),
                    team: String::from("Team"),
                    grid_slot: i as u32 + 1,
                    tyre_compound: TyreCompound::Soft,
                    strategy: String::from("base"),
                };
                let offset = i as f64 * track.grid_spacing;
                Car::new(&entry, Rc::clone(&strategy), &track.grid_placement(offset))
            })
            .collect()
    }

    #[test]
    fn agents_follow_ranking() {
        let track = TrackGraph::new(&oval_with_pits()).unwrap();
        let cars = cars(&track);
        let mut emitter = TelemetryEmitter::new(None, 5).unwrap();

        let snapshot = emitter.build(status(), &cars, &[1, 0], &track);
        assert_eq!(snapshot.agents.len(), 2);
        assert_eq!(snapshot.agents[0].id, "BBB");
        assert_eq!(snapshot.agents[0].rank, 1);
        assert_eq!(snapshot.agents[1].id, "AAA");
        assert_eq!(snapshot.agents[1].lap_data.last_lap_time, "-");
        assert_eq!(snapshot.agents[1].vehicle_state.battery_soc, 1.0);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["race_status"]["safety_car"], "NONE");
        assert_eq!(json["agents"][0]["status"], "RACING");
        assert_eq!(json["agents"][0]["vehicle_state"]["aero_mode"], "Z-MODE");
        assert_eq!(json["agents"][0]["vehicle_state"]["tyre_compound"], "soft");
    }

    #[test]
    fn noise_stays_in_valid_range() {
        let track = TrackGraph::new(&oval_with_pits()).unwrap();
        let mut cars = cars(&track);
        cars[0].battery_soc = 0.999;
        cars[1].fuel_remaining_mj = 0.01;
        let noise = TelemetryNoisePars {
            battery_sd: 0.5,
            fuel_sd: 5.0,
            tyre_sd: 0.5,
            temp_sd: 50.0,
        };
        let mut emitter = TelemetryEmitter::new(Some(&noise), 5).unwrap();

        for _ in 0..200 {
            let snapshot = emitter.build(status(), &cars, &[0, 1], &track);
            for agent in snapshot.agents.iter() {
                let vs = &agent.vehicle_state;
                assert!((0.0..=1.0).contains(&vs.battery_soc));
                assert!((0.0..=1.0).contains(&vs.tyre_life));
                assert!(vs.fuel_remaining_mj >= 0.0);
                assert!((70.0..=120.0).contains(&vs.tyre_temp));
            }
        }

        // the true state is untouched
        assert_eq!(cars[0].battery_soc, 0.999);
    }

    #[test]
    fn rejects_negative_noise() {
        let noise = TelemetryNoisePars {
            battery_sd: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            TelemetryEmitter::new(Some(&noise), 5),
            Err(SimError::Parameter(_))
        ));

        let noise = TelemetryNoisePars {
            temp_sd: f64::NAN,
            ..Default::default()
        };
        assert!(TelemetryEmitter::new(Some(&noise), 5).is_err());

        let noise = TelemetryNoisePars {
            fuel_sd: 0.0,
            ..Default::default()
        };
        assert!(TelemetryEmitter::new(Some(&noise), 5).is_ok());
    }
}
