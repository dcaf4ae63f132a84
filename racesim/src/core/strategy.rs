use crate::core::tireset::{TyreCompound, TyreTempPars, TyreWearRates};
use crate::error::{SimError, SimResult};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BoostCommand {
    Deploy,
    Standard,
}

/// BoostPolicy decides whether an available boost is actually used.
///
/// * `probabilistic` - Boost is used with probability `aggressiveness` per time step
/// * `scripted` - Boost is used where the deployment map says `deploy` for the node the car is
/// leaving
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BoostPolicy {
    Probabilistic {
        aggressiveness: f64,
    },
    Scripted {
        deployment_map: HashMap<String, BoostCommand>,
    },
}

/// RegenModel determines the energy recovered per time step while cornering.
///
/// * `constant` - (MJ/s) Fixed recovery rate
/// * `velocity_squared` - (MJ s/m²) Recovery proportional to v²
#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum RegenModel {
    Constant { rate_mj_per_s: f64 },
    VelocitySquared { factor: f64 },
}

impl RegenModel {
    pub fn energy(&self, velocity: f64, timestep_size: f64) -> f64 {
        match self {
            RegenModel::Constant { rate_mj_per_s } => rate_mj_per_s * timestep_size,
            RegenModel::VelocitySquared { factor } => factor * velocity * velocity * timestep_size,
        }
    }
}

/// * `threshold_speed` - (m/s) Speed above which electric power delivery tapers off
/// * `ratio` - Share of the speed above the threshold that is still delivered
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct PowerTaper {
    pub threshold_speed: f64,
    pub ratio: f64,
}

impl PowerTaper {
    /// apply returns the achievable straight line speed. Without charge nothing above the
    /// threshold is delivered.
    pub fn apply(&self, top_speed: f64, battery_empty: bool) -> f64 {
        if top_speed <= self.threshold_speed {
            top_speed
        } else if battery_empty {
            self.threshold_speed
        } else {
            self.threshold_speed + self.ratio * (top_speed - self.threshold_speed)
        }
    }
}

/// * `top_speed` - (m/s) Maximum velocity on straights
/// * `grip_factor` - (m/s²) Lateral grip used in the corner speed formula v = sqrt(grip * r)
/// * `c_power` - (MJ s/m²) Energy cost coefficient for v²
/// * `c_drag_low_drag`, `c_drag_high_grip` - (MJ/s) Constant drag cost per aero mode
/// * `battery_capacity_mj` - (MJ) Usable battery energy
/// * `fuel_tank_mj` - (MJ) Fuel energy at the start
/// * `battery_power_limit_mj_per_step` - (MJ) Max. battery draw per time step
/// * `ice_power_limit_mj_per_step` - (MJ) Max. fuel draw per time step
/// * `tyre_wear_rates` - (1/s) Base wear per compound
/// * `tyre_cliff_threshold` - Tyre life at which grip falls off the cliff
/// * `tyre_cliff_grip_modifier` - Grip multiplier once on the cliff
/// * `pit_tyre_threshold` - Tyre life below which a pit stop is requested (default: cliff)
/// * `min_pit_lap` - Completed laps required before worn tyres trigger a stop
/// * `pit_stop_duration` - (s) Standstill time in the pit stall
/// * `dry_pit_compound` - Compound fitted at a stop on a dry track
/// * `vsc_speed` - (m/s) Velocity under virtual safety car
/// * `boost_policy` - Boost deployment rule
/// * `boost_detection_gap` - (m) Max. gap to the car ahead that enables boost
/// * `boost_detection_bonus_mj` - (MJ) Optional energy credited when boost becomes available
/// * `boost_speed_delta` - (m/s) Speed added while boosting
/// * `boost_top_speed` - (m/s) Optional fixed speed while boosting (replaces the delta)
/// * `boost_energy_cost` - (MJ) Surcharge per boosted time step
/// * `regen` - Recovery model while cornering
/// * `max_regen_per_lap_mj` - (MJ) Optional recovery ceiling per lap
/// * `power_taper` - Optional electric power taper on straights
/// * `tyre_temp` - Tyre temperature model
#[derive(Debug, Deserialize, Clone)]
pub struct StrategyPars {
    pub top_speed: f64,
    pub grip_factor: f64,
    #[serde(alias = "c_1_power")]
    pub c_power: f64,
    #[serde(alias = "c_2_x_mode_drag")]
    pub c_drag_low_drag: f64,
    #[serde(alias = "c_2_z_mode_drag")]
    pub c_drag_high_grip: f64,
    pub battery_capacity_mj: f64,
    pub fuel_tank_mj: f64,
    pub battery_power_limit_mj_per_step: f64,
    pub ice_power_limit_mj_per_step: f64,
    pub tyre_wear_rates: TyreWearRates,
    #[serde(alias = "tyre_grip_cliff_percent")]
    pub tyre_cliff_threshold: f64,
    pub tyre_cliff_grip_modifier: f64,
    #[serde(default)]
    pub pit_tyre_threshold: Option<f64>,
    #[serde(default = "default_min_pit_lap")]
    pub min_pit_lap: u32,
    pub pit_stop_duration: f64,
    #[serde(default = "default_dry_pit_compound")]
    pub dry_pit_compound: TyreCompound,
    pub vsc_speed: f64,
    #[serde(alias = "mom_policy")]
    pub boost_policy: BoostPolicy,
    #[serde(alias = "mom_detection_gap")]
    pub boost_detection_gap: f64,
    #[serde(default, alias = "mom_detection_bonus_mj")]
    pub boost_detection_bonus_mj: Option<f64>,
    #[serde(alias = "mom_boost")]
    pub boost_speed_delta: f64,
    #[serde(default, alias = "mom_top_speed")]
    pub boost_top_speed: Option<f64>,
    #[serde(alias = "mom_energy_cost")]
    pub boost_energy_cost: f64,
    pub regen: RegenModel,
    #[serde(default)]
    pub max_regen_per_lap_mj: Option<f64>,
    #[serde(default)]
    pub power_taper: Option<PowerTaper>,
    #[serde(default)]
    pub tyre_temp: TyreTempPars,
}

fn default_min_pit_lap() -> u32 {
    1
}

fn default_dry_pit_compound() -> TyreCompound {
    TyreCompound::Hard
}

/// Strategy is the validated, immutable parameter bundle shared by all cars referencing it.
#[derive(Debug)]
pub struct Strategy {
    pub name: String,
    pub top_speed: f64,
    pub grip_factor: f64,
    pub c_power: f64,
    pub c_drag_low_drag: f64,
    pub c_drag_high_grip: f64,
    pub battery_capacity_mj: f64,
    pub fuel_tank_mj: f64,
    pub battery_power_limit_mj_per_step: f64,
    pub ice_power_limit_mj_per_step: f64,
    pub tyre_wear_rates: TyreWearRates,
    pub tyre_cliff_threshold: f64,
    pub tyre_cliff_grip_modifier: f64,
    pub pit_tyre_threshold: f64,
    pub min_pit_lap: u32,
    pub pit_stop_duration: f64,
    pub dry_pit_compound: TyreCompound,
    pub vsc_speed: f64,
    pub boost_policy: BoostPolicy,
    pub boost_detection_gap: f64,
    pub boost_detection_bonus_mj: Option<f64>,
    pub boost_speed_delta: f64,
    pub boost_top_speed: Option<f64>,
    pub boost_energy_cost: f64,
    pub regen: RegenModel,
    pub max_regen_per_lap_mj: Option<f64>,
    pub power_taper: Option<PowerTaper>,
    pub tyre_temp: TyreTempPars,
}

impl Strategy {
    pub fn new(name: &str, pars: &StrategyPars) -> SimResult<Strategy> {
        let fail = |reason: String| SimError::Strategy {
            name: name.to_owned(),
            reason,
        };
        let positive = |field: &str, x: f64| -> SimResult<()> {
            if x.is_finite() && x > 0.0 {
                Ok(())
            } else {
                Err(fail(format!("{} must be positive, got {}", field, x)))
            }
        };
        let non_negative = |field: &str, x: f64| -> SimResult<()> {
            if x.is_finite() && x >= 0.0 {
                Ok(())
            } else {
                Err(fail(format!("{} must not be negative, got {}", field, x)))
            }
        };
        let fraction = |field: &str, x: f64| -> SimResult<()> {
            if (0.0..=1.0).contains(&x) {
                Ok(())
            } else {
                Err(fail(format!("{} must be in [0, 1], got {}", field, x)))
            }
        };

        positive("top_speed", pars.top_speed)?;
        positive("grip_factor", pars.grip_factor)?;
        non_negative("c_power", pars.c_power)?;
        non_negative("c_drag_low_drag", pars.c_drag_low_drag)?;
        non_negative("c_drag_high_grip", pars.c_drag_high_grip)?;
        positive("battery_capacity_mj", pars.battery_capacity_mj)?;
        non_negative("fuel_tank_mj", pars.fuel_tank_mj)?;
        non_negative(
            "battery_power_limit_mj_per_step",
            pars.battery_power_limit_mj_per_step,
        )?;
        non_negative("ice_power_limit_mj_per_step", pars.ice_power_limit_mj_per_step)?;
        non_negative("tyre_wear_rates.soft", pars.tyre_wear_rates.soft)?;
        non_negative("tyre_wear_rates.medium", pars.tyre_wear_rates.medium)?;
        non_negative("tyre_wear_rates.hard", pars.tyre_wear_rates.hard)?;
        non_negative(
            "tyre_wear_rates.intermediate",
            pars.tyre_wear_rates.intermediate,
        )?;
        fraction("tyre_cliff_threshold", pars.tyre_cliff_threshold)?;
        fraction("tyre_cliff_grip_modifier", pars.tyre_cliff_grip_modifier)?;
        non_negative("pit_stop_duration", pars.pit_stop_duration)?;
        positive("vsc_speed", pars.vsc_speed)?;
        non_negative("boost_detection_gap", pars.boost_detection_gap)?;
        non_negative("boost_speed_delta", pars.boost_speed_delta)?;
        non_negative("boost_energy_cost", pars.boost_energy_cost)?;

        let pit_tyre_threshold = pars
            .pit_tyre_threshold
            .unwrap_or(pars.tyre_cliff_threshold);
        fraction("pit_tyre_threshold", pit_tyre_threshold)?;

        if pars.dry_pit_compound.is_wet_compound() {
            return Err(fail(String::from(
                "dry_pit_compound must be a dry weather compound",
            )));
        }

        if let BoostPolicy::Probabilistic { aggressiveness } = pars.boost_policy {
            fraction("boost_policy.aggressiveness", aggressiveness)?;
        }
        if let Some(bonus) = pars.boost_detection_bonus_mj {
            non_negative("boost_detection_bonus_mj", bonus)?;
        }
        if let Some(v) = pars.boost_top_speed {
            positive("boost_top_speed", v)?;
        }

        match pars.regen {
            RegenModel::Constant { rate_mj_per_s } => {
                non_negative("regen.rate_mj_per_s", rate_mj_per_s)?
            }
            RegenModel::VelocitySquared { factor } => non_negative("regen.factor", factor)?,
        }
        if let Some(cap) = pars.max_regen_per_lap_mj {
            non_negative("max_regen_per_lap_mj", cap)?;
        }

        if let Some(taper) = pars.power_taper {
            positive("power_taper.threshold_speed", taper.threshold_speed)?;
            fraction("power_taper.ratio", taper.ratio)?;
        }

        let temp = &pars.tyre_temp;
        if !(temp.min <= temp.max) {
            return Err(fail(format!(
                "tyre_temp band is empty: min {} > max {}",
                temp.min, temp.max
            )));
        }
        non_negative("tyre_temp.heat_corner", temp.heat_corner)?;
        non_negative("tyre_temp.heat_boost", temp.heat_boost)?;
        non_negative("tyre_temp.cool_straight", temp.cool_straight)?;

        Ok(Strategy {
            name: name.to_owned(),
            top_speed: pars.top_speed,
            grip_factor: pars.grip_factor,
            c_power: pars.c_power,
            c_drag_low_drag: pars.c_drag_low_drag,
            c_drag_high_grip: pars.c_drag_high_grip,
            battery_capacity_mj: pars.battery_capacity_mj,
            fuel_tank_mj: pars.fuel_tank_mj,
            battery_power_limit_mj_per_step: pars.battery_power_limit_mj_per_step,
            ice_power_limit_mj_per_step: pars.ice_power_limit_mj_per_step,
            tyre_wear_rates: pars.tyre_wear_rates.to_owned(),
            tyre_cliff_threshold: pars.tyre_cliff_threshold,
            tyre_cliff_grip_modifier: pars.tyre_cliff_grip_modifier,
            pit_tyre_threshold,
            min_pit_lap: pars.min_pit_lap,
            pit_stop_duration: pars.pit_stop_duration,
            dry_pit_compound: pars.dry_pit_compound,
            vsc_speed: pars.vsc_speed,
            boost_policy: pars.boost_policy.to_owned(),
            boost_detection_gap: pars.boost_detection_gap,
            boost_detection_bonus_mj: pars.boost_detection_bonus_mj,
            boost_speed_delta: pars.boost_speed_delta,
            boost_top_speed: pars.boost_top_speed,
            boost_energy_cost: pars.boost_energy_cost,
            regen: pars.regen,
            max_regen_per_lap_mj: pars.max_regen_per_lap_mj,
            power_taper: pars.power_taper,
            tyre_temp: pars.tyre_temp.to_owned(),
        })
    }

    /// Node ids named in a scripted deployment map; checked against the track by the race.
    pub fn scripted_nodes(&self) -> Vec<&str> {
        match &self.boost_policy {
            BoostPolicy::Scripted { deployment_map } => {
                deployment_map.keys().map(|k| k.as_str()).collect()
            }
            BoostPolicy::Probabilistic { .. } => Vec::new(),
        }
    }
}
