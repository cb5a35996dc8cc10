use crate::network::{Network, NetworkError};
use crate::route::SwitchSetting;
use serde::Deserialize;
use std::path::Path;

/// Restricts the candidate paths of an elementary route (named "start -> target") when
/// several paths lead to the same target signal.
pub trait ConditionFilter {
    fn applies_to(&self, name: &str) -> bool;
    fn allows(&self, name: &str, net: &Network, switches: &[SwitchSetting]) -> bool;
}

pub struct NoConditions;

impl ConditionFilter for NoConditions {
    fn applies_to(&self, _name: &str) -> bool {
        false
    }

    fn allows(&self, _name: &str, _net: &Network, _switches: &[SwitchSetting]) -> bool {
        true
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwitchCondition {
    pub module: String,
    #[serde(rename = "ref")]
    pub refpoint: u32,
    pub position: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Condition {
    pub route: String,
    #[serde(default)]
    pub switches: Vec<SwitchCondition>,
}

/// Condition list: a path is kept only if it sets every listed switch to the listed position.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Conditions {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Conditions {
    pub fn load(path: &Path) -> Result<Conditions, NetworkError> {
        let contents = std::fs::read_to_string(path).map_err(|source| NetworkError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(NetworkError::Conditions)
    }
}

impl ConditionFilter for Conditions {
    fn applies_to(&self, name: &str) -> bool {
        self.conditions.iter().any(|c| c.route == name)
    }

    fn allows(&self, name: &str, net: &Network, switches: &[SwitchSetting]) -> bool {
        self.conditions
            .iter()
            .filter(|c| c.route == name)
            .flat_map(|c| c.switches.iter())
            .all(|cond| {
                switches.iter().any(|s| {
                    let r = net.refpoint(s.refpoint);
                    r.nr == cond.refpoint
                        && s.position == cond.position
                        && net.modules[r.module].name.eq_ignore_ascii_case(&cond.module)
                })
            })
    }
}
