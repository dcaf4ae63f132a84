use crate::core::rng::SimRng;
use crate::core::state_handler::StateHandler;
use crate::core::strategy::{BoostCommand, BoostPolicy, Strategy};
use crate::core::tireset::{Tireset, TyreCompound, TyreLoad, WearEvent};
use crate::core::track::{GridPlacement, TrackGraph};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Tolerance for comparing accumulated standstill time against the pit stop duration.
const STANDSTILL_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CarStatus {
    Racing,
    Pitting,
    OutOfEnergy,
    Crashed,
    Finished,
}

impl CarStatus {
    /// Terminal cars are never moved again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CarStatus::OutOfEnergy | CarStatus::Crashed | CarStatus::Finished
        )
    }

    /// Did-not-finish statuses are ranked behind running and finished cars.
    pub fn is_dnf(&self) -> bool {
        matches!(self, CarStatus::OutOfEnergy | CarStatus::Crashed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AeroMode {
    #[serde(rename = "X-MODE")]
    LowDrag,
    #[serde(rename = "Z-MODE")]
    HighGrip,
}

/// RaceContext is the read-only view of race-wide state handed to every car during its update.
#[derive(Debug, Clone, Copy)]
pub struct RaceContext<'a> {
    pub track: &'a TrackGraph,
    pub timestep_size: f64,
    pub race_laps: u32,
    pub vsc_active: bool,
    pub wet: bool,
    pub weather_grip_modifier: f64,
    pub mismatch_wear_factor: f64,
    pub race_over: bool,
}

/// Noteworthy changes of a car during one update, reported to the race.
#[derive(Debug, Clone, PartialEq)]
pub enum CarEvent {
    LapCompleted { lap: u32, laptime: f64 },
    Won,
    PitStopCompleted { compound: TyreCompound },
    TyreCliff,
    Crashed,
    OutOfEnergy,
    RouteExhausted,
}

/// * `driver_id` - Unique driver id, e.g. VER
/// * `team` - Team name
/// * `grid_slot` - Starting position (1-based)
/// * `tyre_compound` - Compound fitted at the start
/// * `strategy` - Name of the strategy bundle driving this car
#[derive(Debug, Deserialize, Clone)]
pub struct GridEntry {
    #[serde(alias = "id")]
    pub driver_id: String,
    pub team: String,
    pub grid_slot: u32,
    #[serde(default = "default_start_compound")]
    pub tyre_compound: TyreCompound,
    pub strategy: String,
}

fn default_start_compound() -> TyreCompound {
    TyreCompound::Medium
}

#[derive(Debug)]
pub struct Car {
    pub id: String,
    pub team: String,
    pub grid_slot: u32,
    pub status: CarStatus,
    pub velocity: f64,
    pub aero_mode: AeroMode,
    pub battery_soc: f64,
    pub fuel_remaining_mj: f64,
    pub regen_this_lap_mj: f64,
    pub boost_available: bool,
    pub boost_active: bool,
    pub boost_uses: u32,
    pub tireset: Tireset,
    pub wants_to_pit: bool,
    pub pit_stops: u32,
    pub sh: StateHandler,
    pub strategy: Rc<Strategy>,
}

impl Car {
    pub fn new(entry: &GridEntry, strategy: Rc<Strategy>, placement: &GridPlacement) -> Car {
        Car {
            id: entry.driver_id.to_owned(),
            team: entry.team.to_owned(),
            grid_slot: entry.grid_slot,
            status: CarStatus::Racing,
            velocity: 0.0,
            aero_mode: AeroMode::HighGrip,
            battery_soc: 1.0,
            fuel_remaining_mj: strategy.fuel_tank_mj,
            regen_this_lap_mj: 0.0,
            boost_available: false,
            boost_active: false,
            boost_uses: 0,
            tireset: Tireset::new(entry.tyre_compound, &strategy.tyre_temp),
            wants_to_pit: false,
            pit_stops: 0,
            sh: StateHandler::new(placement),
            strategy,
        }
    }

    /// resolve_route determines the segment this car drives on during the current time step. It
    /// is evaluated once per update and threaded through all three phases.
    pub fn resolve_route(&self, track: &TrackGraph) -> Option<usize> {
        self.sh.resolve_route(track, self.wants_to_pit)
    }

    fn is_in_pit_stall(&self, track: &TrackGraph) -> bool {
        self.status == CarStatus::Pitting
            && track
                .pit_stall_node()
                .map_or(false, |stall| self.sh.is_at_node(stall))
    }

    // ---------------------------------------------------------------------------------------------
    // PERCEIVE ------------------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    /// perceive latches boost availability when the car ahead is within the detection gap on a
    /// detection segment and raises a pit request on a pit entry decision segment.
    pub fn perceive(&mut self, gap_ahead: Option<f64>, route: Option<usize>, ctx: &RaceContext) {
        if self.status.is_terminal() {
            return;
        }

        let edge = match route {
            Some(e) => ctx.track.edge(e),
            None => return,
        };

        // boost detection
        if edge.boost_zone && !self.boost_available {
            if let Some(gap) = gap_ahead {
                if gap < self.strategy.boost_detection_gap {
                    self.boost_available = true;

                    if let Some(bonus) = self.strategy.boost_detection_bonus_mj {
                        self.battery_soc = (self.battery_soc
                            + bonus / self.strategy.battery_capacity_mj)
                            .min(1.0);
                    }
                }
            }
        }

        // pit request
        if edge.is_pit_entry_decision
            && self.status == CarStatus::Racing
            && !self.wants_to_pit
            && ctx.track.has_pit_lane()
        {
            let worn = self.tireset.life < self.strategy.pit_tyre_threshold
                && self.sh.laps_completed >= self.strategy.min_pit_lap;
            let wrong_compound = self.tireset.compound.is_mismatched(ctx.wet);

            if worn || wrong_compound {
                self.wants_to_pit = true;
                info!(
                    "Car {} requests a pit stop (tyre life {:.2}, {} on a {} track)",
                    self.id,
                    self.tireset.life,
                    self.tireset.compound,
                    if ctx.wet { "wet" } else { "dry" }
                );
            }
        }
    }

    // ---------------------------------------------------------------------------------------------
    // DECIDE --------------------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    /// decide sets target velocity, aero mode and boost usage for this time step.
    pub fn decide(&mut self, route: Option<usize>, ctx: &RaceContext, rng: &mut SimRng) {
        self.boost_active = false;

        if self.status.is_terminal() {
            self.velocity = 0.0;
            self.aero_mode = AeroMode::HighGrip;
            return;
        }

        if self.is_in_pit_stall(ctx.track) {
            self.velocity = 0.0;
            self.aero_mode = AeroMode::HighGrip;
            return;
        }

        let edge_idx = match route {
            Some(e) => e,
            None => {
                self.exhaust_route(ctx.track);
                return;
            }
        };
        let edge = ctx.track.edge(edge_idx);

        if ctx.vsc_active {
            self.aero_mode = AeroMode::HighGrip;
            self.velocity = if edge.is_pit_lane {
                self.strategy.vsc_speed.min(ctx.track.pit_speed_limit)
            } else {
                self.strategy.vsc_speed
            };
            return;
        }

        if edge.is_pit_lane {
            self.aero_mode = AeroMode::HighGrip;
            self.velocity = ctx.track.pit_speed_limit;
            return;
        }

        let base_velocity = match edge.radius {
            None => {
                self.aero_mode = AeroMode::LowDrag;
                match &self.strategy.power_taper {
                    Some(taper) => taper.apply(self.strategy.top_speed, self.battery_soc <= 0.0),
                    None => self.strategy.top_speed,
                }
            }
            Some(radius) => {
                self.aero_mode = AeroMode::HighGrip;
                self.corner_velocity(radius, ctx.weather_grip_modifier)
            }
        };

        self.velocity = base_velocity;

        if self.boost_available && edge.boost_allowed && self.boost_policy_fires(rng, ctx) {
            self.velocity = match self.strategy.boost_top_speed {
                Some(v_boost) => v_boost,
                None => base_velocity + self.strategy.boost_speed_delta,
            };
            self.boost_active = true;
            self.boost_uses += 1;
        }
    }

    /// corner_velocity returns sqrt(grip * tyre grip * weather grip * radius) capped at top
    /// speed. Invalid radii or grip values yield 0.
    fn corner_velocity(&self, radius: f64, weather_grip_modifier: f64) -> f64 {
        let lateral = self.strategy.grip_factor
            * self.tireset.grip_modifier
            * weather_grip_modifier
            * radius;

        if radius.is_nan() || radius <= 0.0 || !(lateral > 0.0) {
            return 0.0;
        }

        lateral.sqrt().min(self.strategy.top_speed)
    }

    fn boost_policy_fires(&self, rng: &mut SimRng, ctx: &RaceContext) -> bool {
        match &self.strategy.boost_policy {
            BoostPolicy::Probabilistic { aggressiveness } => rng.unit() < *aggressiveness,
            BoostPolicy::Scripted { deployment_map } => matches!(
                deployment_map.get(ctx.track.node_id(self.sh.cur_node)),
                Some(BoostCommand::Deploy)
            ),
        }
    }

    fn exhaust_route(&mut self, track: &TrackGraph) {
        warn!(
            "Car {} reached node {} without an outgoing segment and is taken out of the race",
            self.id,
            track.node_id(self.sh.cur_node)
        );
        self.status = CarStatus::Finished;
        self.velocity = 0.0;
        self.boost_active = false;
    }

    // ---------------------------------------------------------------------------------------------
    // UPDATE PHYSICS ------------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    /// update_physics integrates position, energy and tyres over one time step and returns the
    /// events the race has to know about.
    pub fn update_physics(&mut self, route: Option<usize>, ctx: &RaceContext) -> Vec<CarEvent> {
        let mut events = Vec::new();

        if self.status.is_terminal() {
            return events;
        }

        let dt = ctx.timestep_size;
        self.sh.race_time += dt;

        // pit stop standstill
        if self.is_in_pit_stall(ctx.track) {
            self.velocity = 0.0;
            self.sh.increment_t_standstill(dt);

            if self
                .sh
                .check_leaves_standstill(self.strategy.pit_stop_duration - STANDSTILL_EPS)
            {
                events.push(self.perform_pitstop(ctx));
            }
            return events;
        }

        if self.velocity <= 0.0 {
            return events;
        }

        let edge = match route {
            Some(e) => e,
            None => {
                self.exhaust_route(ctx.track);
                events.push(CarEvent::RouteExhausted);
                return events;
            }
        };

        // movement
        let stop_at = if self.status == CarStatus::Pitting || self.wants_to_pit {
            ctx.track.pit_stall_node()
        } else {
            None
        };
        let traversal = self.sh.advance(
            ctx.track,
            edge,
            self.velocity * dt,
            self.wants_to_pit,
            stop_at,
        );

        if traversal.entered_pit_lane && self.wants_to_pit && self.status == CarStatus::Racing {
            self.status = CarStatus::Pitting;
            info!("Car {} enters the pit lane", self.id);
        }

        for _ in 0..traversal.finish_line_crossings {
            events.extend(self.complete_lap(ctx));
        }

        if traversal.arrived_at_stop && self.status == CarStatus::Pitting {
            self.sh.reset_t_standstill();
        }

        if traversal.dead_end {
            self.exhaust_route(ctx.track);
            events.push(CarEvent::RouteExhausted);
            return events;
        }

        if self.status.is_terminal() {
            return events;
        }

        // energy
        if let Some(event) = self.update_energy(dt) {
            events.push(event);
            return events;
        }
        self.recover_energy(dt);

        // tyres
        let load = TyreLoad {
            cornering: self.aero_mode == AeroMode::HighGrip,
            boosting: self.boost_active,
            wet_track: ctx.wet,
        };
        let wear_event = self.tireset.wear(
            self.strategy
                .tyre_wear_rates
                .for_compound(self.tireset.compound),
            load,
            ctx.mismatch_wear_factor,
            self.strategy.tyre_cliff_threshold,
            self.strategy.tyre_cliff_grip_modifier,
            dt,
        );
        self.tireset
            .update_temperature(load, &self.strategy.tyre_temp, dt);

        match wear_event {
            WearEvent::None => {}
            WearEvent::FellOffCliff => {
                info!("Car {} tyres fell off the cliff, grip reduced", self.id);
                events.push(CarEvent::TyreCliff);
            }
            WearEvent::WornOut => {
                info!("Car {} crashed on worn out tyres", self.id);
                self.status = CarStatus::Crashed;
                self.velocity = 0.0;
                events.push(CarEvent::Crashed);
            }
        }

        events
    }

    fn complete_lap(&mut self, ctx: &RaceContext) -> Vec<CarEvent> {
        let mut events = Vec::with_capacity(2);
        let laptime = self.sh.record_lap();

        self.boost_available = false;
        self.regen_this_lap_mj = 0.0;

        events.push(CarEvent::LapCompleted {
            lap: self.sh.laps_completed,
            laptime,
        });

        if self.sh.laps_completed >= ctx.race_laps
            && !ctx.race_over
            && !self.status.is_terminal()
        {
            info!(
                "Car {} wins after {} laps in {:.3}s",
                self.id, self.sh.laps_completed, self.sh.race_time
            );
            self.status = CarStatus::Finished;
            self.velocity = 0.0;
            events.push(CarEvent::Won);
        }

        events
    }

    /// update_energy pays the energy cost of this time step, battery first and fuel for the
    /// rest. Returns an event if the car ran out of energy.
    fn update_energy(&mut self, dt: f64) -> Option<CarEvent> {
        let c_drag = match self.aero_mode {
            AeroMode::LowDrag => self.strategy.c_drag_low_drag,
            AeroMode::HighGrip => self.strategy.c_drag_high_grip,
        };

        let mut cost =
            (self.strategy.c_power * self.velocity * self.velocity + c_drag) * dt;
        if self.boost_active {
            cost += self.strategy.boost_energy_cost;
        }

        let capacity = self.strategy.battery_capacity_mj;
        let battery_drain = cost
            .min(self.strategy.battery_power_limit_mj_per_step)
            .min(self.battery_soc * capacity)
            .max(0.0);

        self.battery_soc = (self.battery_soc - battery_drain / capacity).clamp(0.0, 1.0);

        let residual = cost - battery_drain;
        let fuel_drain = residual
            .min(self.strategy.ice_power_limit_mj_per_step)
            .max(0.0);

        if self.fuel_remaining_mj > fuel_drain {
            self.fuel_remaining_mj -= fuel_drain;
            None
        } else if fuel_drain <= 0.0 {
            None
        } else {
            info!("Car {} ran out of energy", self.id);
            self.fuel_remaining_mj = 0.0;
            self.status = CarStatus::OutOfEnergy;
            self.velocity = 0.0;
            self.boost_active = false;
            Some(CarEvent::OutOfEnergy)
        }
    }

    /// recover_energy credits regeneration while cornering, respecting an optional per-lap cap.
    fn recover_energy(&mut self, dt: f64) {
        if self.aero_mode != AeroMode::HighGrip {
            return;
        }

        let mut gained = self.strategy.regen.energy(self.velocity, dt);

        if let Some(cap) = self.strategy.max_regen_per_lap_mj {
            gained = gained.min(cap - self.regen_this_lap_mj);
        }

        if gained <= 0.0 || self.battery_soc >= 1.0 {
            return;
        }

        self.battery_soc =
            (self.battery_soc + gained / self.strategy.battery_capacity_mj).min(1.0);
        self.regen_this_lap_mj += gained;
    }

    /// perform_pitstop fits a fresh set of tyres matching the weather and releases the car at
    /// the pit exit.
    fn perform_pitstop(&mut self, ctx: &RaceContext) -> CarEvent {
        let compound = if ctx.wet {
            TyreCompound::Intermediate
        } else {
            self.strategy.dry_pit_compound
        };

        self.tireset = Tireset::new(compound, &self.strategy.tyre_temp);
        self.pit_stops += 1;
        self.wants_to_pit = false;
        self.status = CarStatus::Racing;
        self.velocity = 0.0;
        self.sh.reset_t_standstill();

        if let Some(exit) = ctx.track.pit_exit_node() {
            self.sh.relocate(exit);
        }

        info!(
            "Car {} completed pit stop {} and leaves on {} tyres",
            self.id, self.pit_stops, compound
        );

        CarEvent::PitStopCompleted { compound }
    }
}
