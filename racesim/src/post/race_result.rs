use crate::core::car::CarStatus;
use crate::core::tireset::TyreCompound;
use crate::post::telemetry::TelemetryRow;
use helpers::general::{format_laptime, format_racetime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::Write;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RaceEventKind {
    LeaderLap,
    PitStop,
    TyreCliff,
    Crash,
    OutOfEnergy,
    VscDeployed,
    VscEnded,
    WeatherWet,
    WeatherDry,
    RouteExhausted,
    RaceWon,
}

/// RaceEvent is an entry of the race log.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RaceEvent {
    pub kind: RaceEventKind,
    pub lap: u32,
    pub time_s: f64,
    pub cars: Vec<String>,
}

/// ResultEntry is the final state of a single car.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ResultEntry {
    pub rank: u32,
    pub driver_id: String,
    pub team: String,
    pub status: CarStatus,
    pub laps_completed: u32,
    pub race_time: f64,
    pub total_distance: f64,
    pub fastest_lap: Option<f64>,
    pub average_lap: Option<f64>,
    pub battery_soc: f64,
    pub fuel_remaining_mj: f64,
    pub tyre_compound: TyreCompound,
    pub tyre_life: f64,
    pub pit_stops: u32,
    pub boost_uses: u32,
    pub laptimes: Vec<f64>,
}

/// Flat CSV representation of a `ResultEntry`.
#[derive(Debug, Serialize)]
struct ResultRow<'a> {
    rank: u32,
    driver_id: &'a str,
    team: &'a str,
    status: CarStatus,
    laps_completed: u32,
    race_time_s: f64,
    total_distance_m: f64,
    fastest_lap_s: Option<f64>,
    average_lap_s: Option<f64>,
    battery_soc: f64,
    fuel_remaining_mj: f64,
    tyre_compound: TyreCompound,
    tyre_life: f64,
    pit_stops: u32,
    boost_uses: u32,
}

/// RaceResult contains all race information that is required for post-processing the results.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RaceResult {
    pub track_name: String,
    pub race_laps: u32,
    pub seed: u64,
    pub race_time: f64,
    pub winner: Option<String>,
    pub entries: Vec<ResultEntry>,
    pub events: Vec<RaceEvent>,
    #[serde(default)]
    pub telemetry: Vec<TelemetryRow>,
}

/// classification_order ranks running and finished cars ahead of retirements, then by laps
/// (descending), race time (ascending), distance (descending) and driver id.
pub fn classification_order(a: &ResultEntry, b: &ResultEntry) -> Ordering {
    a.status
        .is_dnf()
        .cmp(&b.status.is_dnf())
        .then_with(|| b.laps_completed.cmp(&a.laps_completed))
        .then_with(|| a.race_time.total_cmp(&b.race_time))
        .then_with(|| b.total_distance.total_cmp(&a.total_distance))
        .then_with(|| a.driver_id.cmp(&b.driver_id))
}

/// sort_entries sorts the entries into classification order and assigns the ranks.
pub fn sort_entries(entries: &mut [ResultEntry]) {
    entries.sort_by(classification_order);
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.rank = i as u32 + 1;
    }
}

impl RaceResult {
    fn format_classification(&self) -> Result<String, std::fmt::Error> {
        let mut s = String::new();

        writeln!(
            &mut s,
            "RESULT: {} ({} laps, seed {}), race time {}",
            self.track_name,
            self.race_laps,
            self.seed,
            format_racetime(self.race_time)
        )?;
        writeln!(
            &mut s,
            "{:>3}  {:<5} {:<16} {:<14} {:>4} {:>11} {:>9} {:>9} {:>5} {:>5} {:>5} {:>7} {:<12} {:>5}",
            "pos",
            "id",
            "team",
            "status",
            "laps",
            "race time",
            "fastest",
            "average",
            "pits",
            "boost",
            "soc",
            "fuel",
            "tyre",
            "life"
        )?;

        for e in self.entries.iter() {
            writeln!(
                &mut s,
                "{:>3}  {:<5} {:<16} {:<14} {:>4} {:>11} {:>9} {:>9} {:>5} {:>5} {:>4.0}% {:>7.2} {:<12} {:>5.2}",
                e.rank,
                e.driver_id,
                e.team,
                format!("{:?}", e.status),
                e.laps_completed,
                format_racetime(e.race_time),
                e.fastest_lap.map_or_else(|| String::from("-"), format_laptime),
                e.average_lap.map_or_else(|| String::from("-"), format_laptime),
                e.pit_stops,
                e.boost_uses,
                e.battery_soc * 100.0,
                e.fuel_remaining_mj,
                e.tyre_compound.as_str(),
                e.tyre_life
            )?;
        }

        Ok(s)
    }

    fn format_laptimes(&self) -> Result<String, std::fmt::Error> {
        let mut s = String::from("RESULT: Lap times\nlap");
        for e in self.entries.iter() {
            write!(&mut s, ", {:>9}", e.driver_id)?;
        }
        writeln!(&mut s)?;

        let max_laps = self
            .entries
            .iter()
            .map(|e| e.laptimes.len())
            .max()
            .unwrap_or(0);

        for lap in 0..max_laps {
            write!(&mut s, "{:3}", lap + 1)?;
            for e in self.entries.iter() {
                match e.laptimes.get(lap) {
                    Some(&t) => write!(&mut s, ", {:>9}", format_laptime(t))?,
                    None => write!(&mut s, ", {:>9}", "-")?,
                }
            }
            writeln!(&mut s)?;
        }

        Ok(s)
    }

    fn format_events(&self) -> Result<String, std::fmt::Error> {
        let mut s = String::from("RESULT: Race events\n");
        for ev in self.events.iter() {
            writeln!(
                &mut s,
                "{} lap {:3} {:?} {}",
                format_racetime(ev.time_s),
                ev.lap,
                ev.kind,
                ev.cars.join(", ")
            )?;
        }
        Ok(s)
    }

    /// print_result prints the classification and the lap times to the console output.
    pub fn print_result(&self) -> anyhow::Result<()> {
        println!("{}", self.format_classification()?);
        println!("{}", self.format_laptimes()?);
        Ok(())
    }

    /// write_result_to_file writes classification, lap times and race events to a text file.
    /// Returns the path to the written file.
    pub fn write_result_to_file(&self, path: &Path) -> anyhow::Result<PathBuf> {
        let mut content = self.format_classification()?;
        content.push('\n');
        content.push_str(&self.format_laptimes()?);
        content.push('\n');
        content.push_str(&self.format_events()?);

        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(path)?;
        file.write_all(content.as_bytes())?;
        file.flush()?;

        Ok(path.to_path_buf())
    }

    /// write_result_csv writes one row per car in classification order.
    pub fn write_result_csv(&self, path: &Path) -> anyhow::Result<()> {
        let mut wtr = csv::Writer::from_path(path)?;

        for e in self.entries.iter() {
            wtr.serialize(ResultRow {
                rank: e.rank,
                driver_id: &e.driver_id,
                team: &e.team,
                status: e.status,
                laps_completed: e.laps_completed,
                race_time_s: e.race_time,
                total_distance_m: e.total_distance,
                fastest_lap_s: e.fastest_lap,
                average_lap_s: e.average_lap,
                battery_soc: e.battery_soc,
                fuel_remaining_mj: e.fuel_remaining_mj,
                tyre_compound: e.tyre_compound,
                tyre_life: e.tyre_life,
                pit_stops: e.pit_stops,
                boost_uses: e.boost_uses,
            })?;
        }

        wtr.flush()?;
        Ok(())
    }
}
