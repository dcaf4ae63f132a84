use crate::core::car::GridEntry;
use crate::core::race::{RaceControlPars, SimParams};
use crate::core::strategy::StrategyPars;
use crate::core::track::TrackPars;
use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// SimPars is used to store all other parameter structs.
#[derive(Debug, Deserialize, Clone)]
pub struct SimPars {
    pub sim_params: SimParams,
    #[serde(default)]
    pub race_control: RaceControlPars,
    pub track_pars: TrackPars,
    pub starting_grid: Vec<GridEntry>,
    pub strategies: HashMap<String, StrategyPars>,
}

/// RaceScenarioFile is a parameter file that refers to a track file by name instead of
/// containing the track.
#[derive(Debug, Deserialize, Clone)]
pub struct RaceScenarioFile {
    pub sim_params: SimParams,
    #[serde(default)]
    pub race_control: RaceControlPars,
    pub track_name: String,
    pub starting_grid: Vec<GridEntry>,
    pub strategies: HashMap<String, StrategyPars>,
}

fn read_json<T: DeserializeOwned>(filepath: &Path, what: &str) -> anyhow::Result<T> {
    let fh = OpenOptions::new()
        .read(true)
        .open(filepath)
        .context(format!(
            "Failed to open {} file {}!",
            what,
            filepath.display()
        ))?;
    let pars = serde_json::from_reader(&fh).context(format!(
        "Failed to parse {} file {}!",
        what,
        filepath.display()
    ))?;
    Ok(pars)
}

pub fn read_track_pars(filepath: &Path) -> anyhow::Result<TrackPars> {
    read_json(filepath, "track config")
}

/// track_file_candidates lists where a track named in a scenario is looked for: a `tracks`
/// directory next to the scenario file, then `input/parameters/tracks` below the working
/// directory.
fn track_file_candidates(scenario_path: &Path, track_name: &str) -> Vec<PathBuf> {
    let filename = format!("{}.json", track_name);
    let mut candidates = Vec::with_capacity(2);

    if let Some(dir) = scenario_path.parent() {
        candidates.push(dir.join("tracks").join(&filename));
    }
    candidates.push(
        ["input", "parameters", "tracks", filename.as_str()]
            .iter()
            .collect(),
    );
    candidates
}

/// Flexible reader: reads a full SimPars file if it contains `track_pars`, otherwise reads a
/// scenario file and loads the track from `tracks/{track_name}.json`.
pub fn read_sim_pars_flexible(filepath: &Path) -> anyhow::Result<SimPars> {
    let doc: serde_json::Value = read_json(filepath, "parameter")?;

    if doc.get("track_pars").is_some() {
        return serde_json::from_value(doc).context(format!(
            "Failed to parse parameter file {}!",
            filepath.display()
        ));
    }

    let scen: RaceScenarioFile = serde_json::from_value(doc).context(format!(
        "Failed to parse race scenario file {} (neither track_pars nor a valid track_name)!",
        filepath.display()
    ))?;

    let candidates = track_file_candidates(filepath, &scen.track_name);
    let track_path = candidates
        .iter()
        .find(|p| p.is_file())
        .ok_or_else(|| {
            anyhow::anyhow!(
                "Track file for track {} not found, looked at {:?}!",
                scen.track_name,
                candidates
            )
        })?;
    let track_pars = read_track_pars(track_path)?;

    Ok(SimPars {
        sim_params: scen.sim_params,
        race_control: scen.race_control,
        track_pars,
        starting_grid: scen.starting_grid,
        strategies: scen.strategies,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const TRACK: &str = r#"{
        "name": "Mini",
        "nodes": [{"id": "a", "pos": [0.0, 0.0]}, {"id": "b", "pos": [100.0, 0.0]}],
        "edges": [
            {"from": "a", "to": "b", "length": 500.0},
            {"from": "b", "to": "a", "length": 500.0, "radius": 100.0, "is_finish_line": true}
        ],
        "pit_speed_limit": 22.0,
        "grid_spacing": 8.0
    }"#;

    fn scenario(track_field: &str) -> String {
        format!(
            r#"{{
                "sim_params": {{"time_step": 0.1, "race_laps": 3, "seed": 7}},
                {},
                "starting_grid": [
                    {{"driver_id": "AAA", "team": "Team", "grid_slot": 1, "strategy": "base"}}
                ],
                "strategies": {{}}
            }}"#,
            track_field
        )
    }

    #[test]
    fn reads_inline_track() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.json");
        fs::write(&path, scenario(&format!(r#""track_pars": {}"#, TRACK))).unwrap();

        let pars = read_sim_pars_flexible(&path).unwrap();
        assert_eq!(pars.track_pars.name, "Mini");
        assert_eq!(pars.sim_params.seed, 7);
        assert_eq!(pars.starting_grid[0].driver_id, "AAA");
        assert_eq!(pars.race_control.wet_grip_modifier, 0.8);
    }

    #[test]
    fn resolves_track_by_name() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("tracks")).unwrap();
        fs::write(dir.path().join("tracks").join("mini.json"), TRACK).unwrap();
        let path = dir.path().join("race.json");
        fs::write(&path, scenario(r#""track_name": "mini""#)).unwrap();

        let pars = read_sim_pars_flexible(&path).unwrap();
        assert_eq!(pars.track_pars.edges.len(), 2);
    }

    #[test]
    fn missing_track_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("race.json");
        fs::write(&path, scenario(r#""track_name": "nowhere_to_be_found""#)).unwrap();

        let err = read_sim_pars_flexible(&path).unwrap_err();
        assert!(err.to_string().contains("nowhere_to_be_found"));
    }
}
