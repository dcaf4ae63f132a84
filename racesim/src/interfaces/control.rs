use helpers::general::parse_laptime;
use serde::{Deserialize, Serialize};

/// RaceCommand is an external instruction to a running race. Commands are read as JSON, e.g.
/// `{"command": "deploy_vsc", "duration": 30.0}`, or as bare words such as `pause`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum RaceCommand {
    Pause,
    Resume,
    DeployVsc {
        #[serde(default)]
        duration: Option<f64>,
    },
    RecallVsc,
}

/// parse_command parses a single command line. Returns `None` for empty or unknown input. A VSC
/// duration may be given in seconds or as `m:ss`.
pub fn parse_command(line: &str) -> Option<RaceCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    if line.starts_with('{') {
        return serde_json::from_str(line).ok();
    }

    let mut words = line.split_whitespace();
    let cmd = words.next()?.to_lowercase().replace('-', "_");

    match cmd.as_str() {
        "pause" => Some(RaceCommand::Pause),
        "resume" => Some(RaceCommand::Resume),
        "vsc" | "deploy_vsc" => {
            let duration = match words.next() {
                Some(w) => Some(parse_laptime(w).filter(|d| *d > 0.0)?),
                None => None,
            };
            Some(RaceCommand::DeployVsc { duration })
        }
        "recall_vsc" | "end_vsc" => Some(RaceCommand::RecallVsc),
        _ => None,
    }
}
