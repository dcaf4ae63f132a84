//! Race-wide control processes polled once per time step before the cars move: the virtual
//! safety car and the weather cycle. Both are explicit timers sharing the race clock.

use crate::core::rng::SimRng;
use crate::error::{SimError, SimResult};
use log::info;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SafetyCondition {
    None,
    Vsc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WeatherState {
    Dry,
    Wet,
}

/// * `deploy_chance_per_s` - (1/s) Probability per second of a random VSC deployment
/// * `duration` - (s) Duration of a VSC period
#[derive(Debug, Deserialize, Clone)]
pub struct VscPars {
    pub deploy_chance_per_s: f64,
    pub duration: f64,
}

/// * `dry_min`, `dry_max` - (s) Band the duration of a dry phase is drawn from
/// * `wet_duration` - (s) Duration of a wet phase
/// * `wet_chance` - Probability that a dry phase is followed by a wet one
#[derive(Debug, Deserialize, Clone)]
pub struct WeatherPars {
    pub dry_min: f64,
    pub dry_max: f64,
    pub wet_duration: f64,
    pub wet_chance: f64,
}

/// A change of a race control state during `poll`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlTransition {
    VscDeployed,
    VscEnded,
    WeatherChanged(WeatherState),
}

#[derive(Debug, Clone)]
pub struct VscTimer {
    pars: Option<VscPars>,
    active: bool,
    t_remaining: Option<f64>,
}

impl VscTimer {
    pub fn new(pars: Option<&VscPars>) -> SimResult<VscTimer> {
        if let Some(p) = pars {
            if !(0.0..=1.0).contains(&p.deploy_chance_per_s) || !(p.duration > 0.0) {
                return Err(SimError::Parameter(format!(
                    "vsc needs deploy_chance_per_s in [0, 1] and a positive duration, got {} and {}",
                    p.deploy_chance_per_s, p.duration
                )));
            }
        }

        Ok(VscTimer {
            pars: pars.cloned(),
            active: false,
            t_remaining: None,
        })
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// poll counts down an active timed period, or draws a random deployment if none is active.
    pub fn poll(&mut self, timestep_size: f64, rng: &mut SimRng) -> Option<ControlTransition> {
        if self.active {
            if let Some(t) = self.t_remaining.as_mut() {
                *t -= timestep_size;
                if *t <= 0.0 {
                    return self.recall();
                }
            }
            return None;
        }

        let (chance, duration) = match &self.pars {
            Some(p) => (p.deploy_chance_per_s, p.duration),
            None => return None,
        };

        if rng.gen_bool(chance * timestep_size) {
            self.deploy(Some(duration))
        } else {
            None
        }
    }

    /// deploy activates the VSC, either until recalled (`None`) or for a fixed duration.
    pub fn deploy(&mut self, duration: Option<f64>) -> Option<ControlTransition> {
        if self.active {
            return None;
        }
        self.active = true;
        self.t_remaining = duration;
        info!("Virtual safety car deployed");
        Some(ControlTransition::VscDeployed)
    }

    pub fn recall(&mut self) -> Option<ControlTransition> {
        if !self.active {
            return None;
        }
        self.active = false;
        self.t_remaining = None;
        info!("Virtual safety car ending, racing resumes");
        Some(ControlTransition::VscEnded)
    }
}

#[derive(Debug, Clone)]
pub struct WeatherCycle {
    pars: Option<WeatherPars>,
    state: WeatherState,
    t_next_transition: f64,
}

impl WeatherCycle {
    /// new draws the duration of the first dry phase from `rng` if a cycle is configured.
    pub fn new(pars: Option<&WeatherPars>, rng: &mut SimRng) -> SimResult<WeatherCycle> {
        let t_next_transition = match pars {
            Some(p) => {
                if !(p.dry_min > 0.0 && p.dry_min <= p.dry_max)
                    || !(p.wet_duration > 0.0)
                    || !(0.0..=1.0).contains(&p.wet_chance)
                {
                    return Err(SimError::Parameter(String::from(
                        "weather needs 0 < dry_min <= dry_max, a positive wet_duration and \
                         wet_chance in [0, 1]",
                    )));
                }
                rng.gen_range(p.dry_min, p.dry_max)
            }
            None => f64::INFINITY,
        };

        Ok(WeatherCycle {
            pars: pars.cloned(),
            state: WeatherState::Dry,
            t_next_transition,
        })
    }

    pub fn state(&self) -> WeatherState {
        self.state
    }

    pub fn is_wet(&self) -> bool {
        self.state == WeatherState::Wet
    }

    /// poll switches the weather once the current phase has expired. At the end of a dry phase
    /// the next phase is wet with probability `wet_chance`, otherwise another dry phase follows.
    pub fn poll(&mut self, race_time: f64, rng: &mut SimRng) -> Option<ControlTransition> {
        if race_time < self.t_next_transition {
            return None;
        }

        let p = self.pars.as_ref()?;

        match self.state {
            WeatherState::Dry => {
                if rng.gen_bool(p.wet_chance) {
                    self.state = WeatherState::Wet;
                    self.t_next_transition = race_time + p.wet_duration;
                    info!("Rain starts at {:.1}s", race_time);
                    Some(ControlTransition::WeatherChanged(WeatherState::Wet))
                } else {
                    self.t_next_transition = race_time + rng.gen_range(p.dry_min, p.dry_max);
                    None
                }
            }
            WeatherState::Wet => {
                self.state = WeatherState::Dry;
                self.t_next_transition = race_time + rng.gen_range(p.dry_min, p.dry_max);
                info!("Track dries up at {:.1}s", race_time);
                Some(ControlTransition::WeatherChanged(WeatherState::Dry))
            }
        }
    }
}
