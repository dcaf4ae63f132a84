use crate::core::car::{Car, CarEvent, GridEntry, RaceContext};
use crate::core::race_control::{
    ControlTransition, SafetyCondition, VscPars, VscTimer, WeatherCycle, WeatherPars,
    WeatherState,
};
use crate::core::rng::SimRng;
use crate::core::strategy::{Strategy, StrategyPars};
use crate::core::track::{TrackGraph, TrackPars};
use crate::error::{SimError, SimResult};
use crate::interfaces::control::RaceCommand;
use crate::interfaces::snapshot::{RaceSnapshot, RaceStatus, TelemetryEmitter, TelemetryNoisePars};
use crate::post::race_result::{sort_entries, RaceEvent, RaceEventKind, RaceResult, ResultEntry};
use crate::post::telemetry::{TelemetryHistory, TelemetryRow};
use helpers::general::format_racetime;
use log::{debug, info};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// * `time_step` - (s) Duration of a simulation tick
/// * `race_laps` - Number of laps to win the race
/// * `seed` - Seed of the random stream
/// * `max_race_time` - (s) Optional race time after which a headless run is stopped
/// * `telemetry_interval` - (s) Race time between two telemetry history samples
#[derive(Debug, Deserialize, Clone)]
pub struct SimParams {
    #[serde(alias = "timestep_size")]
    pub time_step: f64,
    pub race_laps: u32,
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub max_race_time: Option<f64>,
    #[serde(default = "default_telemetry_interval")]
    pub telemetry_interval: f64,
}

fn default_telemetry_interval() -> f64 {
    1.0
}

/// * `wet_grip_modifier` - Grip multiplier in corners on a wet track
/// * `weather_mismatch_wear_factor` - Wear multiplier for a compound not suited to the weather
/// * `vsc` - Optional random virtual safety car deployments
/// * `weather` - Optional dry/wet weather cycle
/// * `telemetry_noise` - Optional measurement noise of reported snapshot values
#[derive(Debug, Deserialize, Clone)]
pub struct RaceControlPars {
    #[serde(default = "default_wet_grip_modifier")]
    pub wet_grip_modifier: f64,
    #[serde(default = "default_mismatch_wear_factor")]
    pub weather_mismatch_wear_factor: f64,
    #[serde(default)]
    pub vsc: Option<VscPars>,
    #[serde(default)]
    pub weather: Option<WeatherPars>,
    #[serde(default)]
    pub telemetry_noise: Option<TelemetryNoisePars>,
}

fn default_wet_grip_modifier() -> f64 {
    0.8
}

fn default_mismatch_wear_factor() -> f64 {
    5.0
}

impl Default for RaceControlPars {
    fn default() -> Self {
        RaceControlPars {
            wet_grip_modifier: default_wet_grip_modifier(),
            weather_mismatch_wear_factor: default_mismatch_wear_factor(),
            vsc: None,
            weather: None,
            telemetry_noise: None,
        }
    }
}

/// Result of a call to `Race::advance`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Running,
    Paused,
    RaceOver,
}

#[derive(Debug)]
pub struct Race {
    pub timestep_size: f64,
    pub cur_racetime: f64,
    pub tick: u64,
    pub race_laps: u32,
    pub seed: u64,
    pub track: TrackGraph,
    pub cars_list: Vec<Car>,
    activation_order: Vec<usize>,
    ranking: Vec<usize>,
    rng: SimRng,
    vsc: VscTimer,
    weather: WeatherCycle,
    wet_grip_modifier: f64,
    mismatch_wear_factor: f64,
    leader_laps: u32,
    race_over: bool,
    paused: bool,
    winner: Option<usize>,
    events: Vec<RaceEvent>,
    emitter: TelemetryEmitter,
    history: TelemetryHistory,
}

impl Race {
    pub fn new(
        sim_params: &SimParams,
        race_control: &RaceControlPars,
        track_pars: &TrackPars,
        starting_grid: &[GridEntry],
        strategy_pars_all: &HashMap<String, StrategyPars>,
    ) -> SimResult<Race> {
        check_sim_params(sim_params, race_control)?;
        let track = TrackGraph::new(track_pars)?;

        // create strategies (sorted by name to report errors deterministically)
        let mut names: Vec<&String> = strategy_pars_all.keys().collect();
        names.sort();

        let mut strategies: HashMap<&str, Rc<Strategy>> = HashMap::with_capacity(names.len());
        for name in names {
            let strategy = Strategy::new(name, &strategy_pars_all[name])?;

            if let Some(node) = strategy
                .scripted_nodes()
                .into_iter()
                .find(|n| track.node_idx(n).is_none())
            {
                return Err(SimError::Strategy {
                    name: name.to_owned(),
                    reason: format!("deployment map refers to unknown node '{}'", node),
                });
            }

            strategies.insert(name.as_str(), Rc::new(strategy));
        }

        // create cars
        check_grid(starting_grid)?;

        let mut entries: Vec<&GridEntry> = starting_grid.iter().collect();
        entries.sort_by_key(|e| e.grid_slot);

        let mut cars_list: Vec<Car> = Vec::with_capacity(entries.len());
        for entry in entries {
            let strategy = strategies.get(entry.strategy.as_str()).ok_or_else(|| {
                SimError::Grid(format!(
                    "driver {} refers to unknown strategy '{}'",
                    entry.driver_id, entry.strategy
                ))
            })?;

            let offset = (entry.grid_slot - 1) as f64 * track.grid_spacing;
            let placement = track.grid_placement(offset);
            cars_list.push(Car::new(entry, Rc::clone(strategy), &placement));
        }

        // race control, the weather draws its first dry phase from the race stream
        let mut rng = SimRng::new(sim_params.seed);
        let vsc = VscTimer::new(race_control.vsc.as_ref())?;
        let weather = WeatherCycle::new(race_control.weather.as_ref(), &mut rng)?;
        let emitter = TelemetryEmitter::new(race_control.telemetry_noise.as_ref(), sim_params.seed)?;

        let no_cars = cars_list.len();
        let mut race = Race {
            timestep_size: sim_params.time_step,
            cur_racetime: 0.0,
            tick: 0,
            race_laps: sim_params.race_laps,
            seed: sim_params.seed,
            track,
            cars_list,
            activation_order: (0..no_cars).collect(),
            ranking: (0..no_cars).collect(),
            rng,
            vsc,
            weather,
            wet_grip_modifier: race_control.wet_grip_modifier,
            mismatch_wear_factor: race_control.weather_mismatch_wear_factor,
            leader_laps: 0,
            race_over: false,
            paused: false,
            winner: None,
            events: Vec::new(),
            emitter,
            history: TelemetryHistory::new(sim_params.telemetry_interval),
        };

        race.update_ranking();
        race.sample_telemetry();

        info!(
            "Race set up on {} with {} cars over {} laps (seed {})",
            race.track.name, no_cars, race.race_laps, race.seed
        );

        Ok(race)
    }

    // ---------------------------------------------------------------------------------------------
    // MAIN METHOD ---------------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    /// advance simulates one time step: race control is polled, the activation order is
    /// shuffled and every car runs perceive, decide and physics in that order.
    pub fn advance(&mut self) -> TickOutcome {
        if self.race_over {
            return TickOutcome::RaceOver;
        }
        if self.paused {
            return TickOutcome::Paused;
        }

        self.poll_race_control();
        self.rng.shuffle(&mut self.activation_order);

        for pos in 0..self.activation_order.len() {
            let idx = self.activation_order[pos];
            self.update_car(idx);
        }

        self.cur_racetime += self.timestep_size;
        self.tick += 1;

        self.update_ranking();
        self.sample_telemetry();

        if self.tick % 1000 == 0 {
            debug!(
                "Tick {}: race time {}, leader on lap {}",
                self.tick,
                format_racetime(self.cur_racetime),
                self.cur_lap()
            );
        }

        if self.race_over {
            TickOutcome::RaceOver
        } else {
            TickOutcome::Running
        }
    }

    // ---------------------------------------------------------------------------------------------
    // RACE SIMULATOR PARTS ------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    fn poll_race_control(&mut self) {
        let mut transitions = Vec::with_capacity(2);

        if let Some(tr) = self.vsc.poll(self.timestep_size, &mut self.rng) {
            transitions.push(tr);
        }
        if let Some(tr) = self.weather.poll(self.cur_racetime, &mut self.rng) {
            transitions.push(tr);
        }

        for tr in transitions {
            self.log_control_transition(tr);
        }
    }

    fn update_car(&mut self, idx: usize) {
        let gap_ahead = self.gap_ahead(idx);
        let wet = self.weather.is_wet();

        let ctx = RaceContext {
            track: &self.track,
            timestep_size: self.timestep_size,
            race_laps: self.race_laps,
            vsc_active: self.vsc.is_active(),
            wet,
            weather_grip_modifier: if wet { self.wet_grip_modifier } else { 1.0 },
            mismatch_wear_factor: self.mismatch_wear_factor,
            race_over: self.race_over,
        };

        let car = &mut self.cars_list[idx];
        let route = car.resolve_route(ctx.track);
        car.perceive(gap_ahead, route, &ctx);
        car.decide(route, &ctx, &mut self.rng);
        let car_events = car.update_physics(route, &ctx);

        for event in car_events {
            self.handle_car_event(idx, event);
        }
    }

    /// gap_ahead returns the distance to the closest car strictly ahead, measured around the
    /// circuit.
    fn gap_ahead(&self, idx: usize) -> Option<f64> {
        let d_self = self.cars_list[idx].sh.total_distance;

        self.cars_list
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != idx)
            .map(|(_, other)| self.track.gap(d_self, other.sh.total_distance))
            .filter(|&gap| gap > 0.0)
            .min_by(|a, b| a.total_cmp(b))
    }

    fn handle_car_event(&mut self, idx: usize, event: CarEvent) {
        let car = &self.cars_list[idx];
        let (lap, time_s, id) = (car.sh.laps_completed, car.sh.race_time, car.id.to_owned());

        let kind = match event {
            CarEvent::LapCompleted { lap: completed, .. } => {
                if completed <= self.leader_laps {
                    return;
                }
                self.leader_laps = completed;
                RaceEventKind::LeaderLap
            }
            CarEvent::Won => {
                self.race_over = true;
                self.winner = Some(idx);
                RaceEventKind::RaceWon
            }
            CarEvent::PitStopCompleted { .. } => RaceEventKind::PitStop,
            CarEvent::TyreCliff => RaceEventKind::TyreCliff,
            CarEvent::Crashed => RaceEventKind::Crash,
            CarEvent::OutOfEnergy => RaceEventKind::OutOfEnergy,
            CarEvent::RouteExhausted => RaceEventKind::RouteExhausted,
        };

        self.events.push(RaceEvent {
            kind,
            lap,
            time_s,
            cars: vec![id],
        });
    }

    fn log_control_transition(&mut self, transition: ControlTransition) {
        let kind = match transition {
            ControlTransition::VscDeployed => RaceEventKind::VscDeployed,
            ControlTransition::VscEnded => RaceEventKind::VscEnded,
            ControlTransition::WeatherChanged(WeatherState::Wet) => RaceEventKind::WeatherWet,
            ControlTransition::WeatherChanged(WeatherState::Dry) => RaceEventKind::WeatherDry,
        };

        self.events.push(RaceEvent {
            kind,
            lap: self.cur_lap(),
            time_s: self.cur_racetime,
            cars: Vec::new(),
        });
    }

    /// update_ranking orders the cars by distance driven (descending), ties by driver id.
    fn update_ranking(&mut self) {
        let cars = &self.cars_list;
        self.ranking.sort_by(|&a, &b| {
            cars[b]
                .sh
                .total_distance
                .total_cmp(&cars[a].sh.total_distance)
                .then_with(|| cars[a].id.cmp(&cars[b].id))
        });
    }

    /// sample_telemetry records the field on the sampling interval and once more at the end of
    /// the race.
    fn sample_telemetry(&mut self) {
        let due = self.history.due(self.cur_racetime);
        if !due && !self.race_over {
            return;
        }

        let (sc, weather) = (self.safety_condition(), self.weather_state());
        for &idx in self.ranking.iter() {
            self.history.push(TelemetryRow::from_car(
                &self.cars_list[idx],
                self.cur_racetime,
                sc,
                weather,
            ));
        }
    }

    // ---------------------------------------------------------------------------------------------
    // RACE CONTROL --------------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    pub fn apply_command(&mut self, command: &RaceCommand) {
        match command {
            RaceCommand::Pause => self.set_paused(true),
            RaceCommand::Resume => self.set_paused(false),
            RaceCommand::DeployVsc { duration } => {
                if let Some(tr) = self.vsc.deploy(*duration) {
                    self.log_control_transition(tr);
                }
            }
            RaceCommand::RecallVsc => {
                if let Some(tr) = self.vsc.recall() {
                    self.log_control_transition(tr);
                }
            }
        }
    }

    pub fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            info!("Race {}", if paused { "paused" } else { "resumed" });
        }
        self.paused = paused;
    }

    /// set_vsc deploys (until recalled) or recalls the virtual safety car.
    pub fn set_vsc(&mut self, active: bool) {
        let command = if active {
            RaceCommand::DeployVsc { duration: None }
        } else {
            RaceCommand::RecallVsc
        };
        self.apply_command(&command);
    }

    // ---------------------------------------------------------------------------------------------
    // METHODS (HELPERS) ---------------------------------------------------------------------------
    // ---------------------------------------------------------------------------------------------

    pub fn is_race_over(&self) -> bool {
        self.race_over
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// all_stopped is true once no car can move anymore.
    pub fn all_stopped(&self) -> bool {
        self.cars_list.iter().all(|car| car.status.is_terminal())
    }

    pub fn winner(&self) -> Option<&str> {
        self.winner.map(|idx| self.cars_list[idx].id.as_str())
    }

    pub fn events(&self) -> &[RaceEvent] {
        &self.events
    }

    /// Car indices in ranking order.
    pub fn ranking(&self) -> &[usize] {
        &self.ranking
    }

    pub fn telemetry_history(&self) -> &[TelemetryRow] {
        self.history.rows()
    }

    pub fn safety_condition(&self) -> SafetyCondition {
        if self.vsc.is_active() {
            SafetyCondition::Vsc
        } else {
            SafetyCondition::None
        }
    }

    pub fn weather_state(&self) -> WeatherState {
        self.weather.state()
    }

    /// cur_lap returns the lap the leader is on, capped at the race distance.
    pub fn cur_lap(&self) -> u32 {
        let leader_laps = self
            .cars_list
            .iter()
            .map(|car| car.sh.laps_completed)
            .max()
            .unwrap_or(0);
        (leader_laps + 1).min(self.race_laps)
    }

    pub fn race_status(&self) -> RaceStatus {
        RaceStatus {
            timestamp: format_racetime(self.cur_racetime),
            current_lap: self.cur_lap(),
            total_laps: self.race_laps,
            safety_car: self.safety_condition(),
            weather: self.weather_state(),
        }
    }

    pub fn snapshot(&mut self) -> RaceSnapshot {
        let race_status = self.race_status();
        self.emitter
            .build(race_status, &self.cars_list, &self.ranking, &self.track)
    }

    pub fn get_race_result(&self) -> RaceResult {
        let mut entries: Vec<ResultEntry> = self
            .cars_list
            .iter()
            .map(|car| ResultEntry {
                rank: 0,
                driver_id: car.id.to_owned(),
                team: car.team.to_owned(),
                status: car.status,
                laps_completed: car.sh.laps_completed,
                race_time: car.sh.race_time,
                total_distance: car.sh.total_distance,
                fastest_lap: car.sh.fastest_laptime(),
                average_lap: car.sh.average_laptime(),
                battery_soc: car.battery_soc,
                fuel_remaining_mj: car.fuel_remaining_mj,
                tyre_compound: car.tireset.compound,
                tyre_life: car.tireset.life,
                pit_stops: car.pit_stops,
                boost_uses: car.boost_uses,
                laptimes: car.sh.laptimes.to_owned(),
            })
            .collect();
        sort_entries(&mut entries);

        RaceResult {
            track_name: self.track.name.to_owned(),
            race_laps: self.race_laps,
            seed: self.seed,
            race_time: self.cur_racetime,
            winner: self.winner().map(String::from),
            entries,
            events: self.events.to_owned(),
            telemetry: self.history.rows().to_vec(),
        }
    }
}

fn check_sim_params(sim_params: &SimParams, race_control: &RaceControlPars) -> SimResult<()> {
    if !(sim_params.time_step.is_finite() && sim_params.time_step > 0.0) {
        return Err(SimError::Parameter(format!(
            "time_step must be positive, got {}",
            sim_params.time_step
        )));
    }
    if sim_params.race_laps == 0 {
        return Err(SimError::Parameter(String::from(
            "race_laps must be at least 1",
        )));
    }
    if !(sim_params.telemetry_interval > 0.0) {
        return Err(SimError::Parameter(format!(
            "telemetry_interval must be positive, got {}",
            sim_params.telemetry_interval
        )));
    }
    if let Some(t) = sim_params.max_race_time {
        if !(t > 0.0) {
            return Err(SimError::Parameter(format!(
                "max_race_time must be positive, got {}",
                t
            )));
        }
    }
    if !(race_control.wet_grip_modifier > 0.0 && race_control.wet_grip_modifier <= 1.0) {
        return Err(SimError::Parameter(format!(
            "wet_grip_modifier must be in ]0, 1], got {}",
            race_control.wet_grip_modifier
        )));
    }
    if !(race_control.weather_mismatch_wear_factor >= 1.0) {
        return Err(SimError::Parameter(format!(
            "weather_mismatch_wear_factor must be at least 1, got {}",
            race_control.weather_mismatch_wear_factor
        )));
    }
    Ok(())
}

fn check_grid(starting_grid: &[GridEntry]) -> SimResult<()> {
    if starting_grid.is_empty() {
        return Err(SimError::Grid(String::from("starting grid is empty")));
    }

    let mut ids = HashSet::with_capacity(starting_grid.len());
    let mut slots = HashSet::with_capacity(starting_grid.len());

    for entry in starting_grid.iter() {
        if !ids.insert(entry.driver_id.as_str()) {
            return Err(SimError::Grid(format!(
                "driver id {} appears twice",
                entry.driver_id
            )));
        }
        if entry.grid_slot == 0 {
            return Err(SimError::Grid(format!(
                "grid slots start at 1, driver {} has slot 0",
                entry.driver_id
            )));
        }
        if !slots.insert(entry.grid_slot) {
            return Err(SimError::Grid(format!(
                "grid slot {} is taken twice",
                entry.grid_slot
            )));
        }
    }
    Ok(())
}
