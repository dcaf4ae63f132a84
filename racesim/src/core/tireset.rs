use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TyreCompound {
    Soft,
    Medium,
    Hard,
    Intermediate,
}

impl TyreCompound {
    /// Intermediates are the only wet weather compound.
    pub fn is_wet_compound(&self) -> bool {
        matches!(self, TyreCompound::Intermediate)
    }

    /// A dry compound in the wet or a wet compound in the dry.
    pub fn is_mismatched(&self, wet_track: bool) -> bool {
        self.is_wet_compound() != wet_track
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TyreCompound::Soft => "soft",
            TyreCompound::Medium => "medium",
            TyreCompound::Hard => "hard",
            TyreCompound::Intermediate => "intermediate",
        }
    }
}

impl fmt::Display for TyreCompound {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// * `soft`, `medium`, `hard`, `intermediate` - (1/s) Tyre life lost per second at base load
#[derive(Debug, Deserialize, Clone)]
pub struct TyreWearRates {
    pub soft: f64,
    pub medium: f64,
    pub hard: f64,
    pub intermediate: f64,
}

impl TyreWearRates {
    pub fn for_compound(&self, compound: TyreCompound) -> f64 {
        match compound {
            TyreCompound::Soft => self.soft,
            TyreCompound::Medium => self.medium,
            TyreCompound::Hard => self.hard,
            TyreCompound::Intermediate => self.intermediate,
        }
    }
}

/// * `initial` - (°C) Temperature of a fresh set
/// * `min`, `max` - (°C) Operating band the temperature is clamped to
/// * `heat_corner` - (°C/s) Heating while cornering
/// * `heat_boost` - (°C/s) Additional heating while boosting
/// * `cool_straight` - (°C/s) Cooling on straights
#[derive(Debug, Deserialize, Clone)]
pub struct TyreTempPars {
    pub initial: f64,
    pub min: f64,
    pub max: f64,
    pub heat_corner: f64,
    pub heat_boost: f64,
    pub cool_straight: f64,
}

impl Default for TyreTempPars {
    fn default() -> Self {
        TyreTempPars {
            initial: 90.0,
            min: 70.0,
            max: 120.0,
            heat_corner: 2.0,
            heat_boost: 1.5,
            cool_straight: 1.0,
        }
    }
}

/// Load the tyres see during one time step.
#[derive(Debug, Clone, Copy)]
pub struct TyreLoad {
    pub cornering: bool,
    pub boosting: bool,
    pub wet_track: bool,
}

/// Outcome of a wear step that the owning car has to react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WearEvent {
    None,
    FellOffCliff,
    WornOut,
}

#[derive(Debug, Clone)]
pub struct Tireset {
    pub compound: TyreCompound,
    pub life: f64,
    pub grip_modifier: f64,
    pub temperature: f64,
    pub on_cliff: bool,
}

impl Tireset {
    pub fn new(compound: TyreCompound, temp_pars: &TyreTempPars) -> Tireset {
        Tireset {
            compound,
            life: 1.0,
            grip_modifier: 1.0,
            temperature: temp_pars.initial.clamp(temp_pars.min, temp_pars.max),
            on_cliff: false,
        }
    }

    /// wear removes tyre life for one time step. The base rate of the compound is multiplied by
    /// 1.5 while cornering, by 2.0 while boosting and by `mismatch_factor` on the wrong compound
    /// for the weather. Crossing `cliff_threshold` latches the cliff and reduces grip until the
    /// set is replaced.
    #[allow(clippy::too_many_arguments)]
    pub fn wear(
        &mut self,
        base_rate: f64,
        load: TyreLoad,
        mismatch_factor: f64,
        cliff_threshold: f64,
        cliff_grip_modifier: f64,
        timestep_size: f64,
    ) -> WearEvent {
        let mut wear = base_rate * timestep_size;

        if load.cornering {
            wear *= 1.5;
        }
        if load.boosting {
            wear *= 2.0;
        }
        if self.compound.is_mismatched(load.wet_track) {
            wear *= mismatch_factor;
        }

        self.life = (self.life - wear.max(0.0)).max(0.0);

        if self.life <= 0.0 {
            return WearEvent::WornOut;
        }

        if !self.on_cliff && self.life <= cliff_threshold {
            self.on_cliff = true;
            self.grip_modifier = cliff_grip_modifier;
            return WearEvent::FellOffCliff;
        }

        WearEvent::None
    }

    /// update_temperature heats the tyres in corners (more when boosting), cools them on
    /// straights and clamps the result to the operating band.
    pub fn update_temperature(&mut self, load: TyreLoad, temp_pars: &TyreTempPars, timestep_size: f64) {
        let mut delta = if load.cornering {
            temp_pars.heat_corner
        } else {
            -temp_pars.cool_straight
        };

        if load.boosting {
            delta += temp_pars.heat_boost;
        }

        self.temperature =
            (self.temperature + delta * timestep_size).clamp(temp_pars.min, temp_pars.max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const DRY: TyreLoad = TyreLoad {
        cornering: false,
        boosting: false,
        wet_track: false,
    };

    #[test]
    fn wear_multipliers_stack() {
        let mut t = Tireset::new(TyreCompound::Medium, &TyreTempPars::default());
        t.wear(0.01, DRY, 5.0, 0.1, 0.7, 1.0);
        assert_relative_eq!(t.life, 0.99);

        let mut t = Tireset::new(TyreCompound::Medium, &TyreTempPars::default());
        let load = TyreLoad {
            cornering: true,
            boosting: true,
            wet_track: true,
        };
        t.wear(0.01, load, 5.0, 0.1, 0.7, 1.0);
        assert_relative_eq!(t.life, 1.0 - 0.01 * 1.5 * 2.0 * 5.0, epsilon = 1e-12);
    }

    #[test]
    fn cliff_latches_once() {
        let mut t = Tireset::new(TyreCompound::Soft, &TyreTempPars::default());
        t.life = 0.12;

        let mut cliff_events = 0;
        for _ in 0..10 {
            if t.wear(0.005, DRY, 5.0, 0.1, 0.7, 1.0) == WearEvent::FellOffCliff {
                cliff_events += 1;
            }
        }

        assert_eq!(cliff_events, 1);
        assert!(t.on_cliff);
        assert_relative_eq!(t.grip_modifier, 0.7);
    }

    #[test]
    fn worn_out_clamps_to_zero() {
        let mut t = Tireset::new(TyreCompound::Hard, &TyreTempPars::default());
        t.life = 0.001;
        assert_eq!(t.wear(0.01, DRY, 5.0, 0.1, 0.7, 1.0), WearEvent::WornOut);
        assert_eq!(t.life, 0.0);
    }

    #[test]
    fn temperature_stays_in_band() {
        let pars = TyreTempPars::default();
        let mut t = Tireset::new(TyreCompound::Medium, &pars);
        let corner = TyreLoad {
            cornering: true,
            boosting: true,
            wet_track: false,
        };

        for _ in 0..1000 {
            t.update_temperature(corner, &pars, 0.1);
        }
        assert_relative_eq!(t.temperature, pars.max);

        for _ in 0..1000 {
            t.update_temperature(DRY, &pars, 0.1);
        }
        assert_relative_eq!(t.temperature, pars.min);
    }

    #[test]
    fn compound_weather_mismatch() {
        assert!(TyreCompound::Soft.is_mismatched(true));
        assert!(!TyreCompound::Soft.is_mismatched(false));
        assert!(TyreCompound::Intermediate.is_mismatched(false));
        assert!(!TyreCompound::Intermediate.is_mismatched(true));
    }
}
