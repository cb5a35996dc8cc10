use crate::graph::{NodeDir, NodeKind, TrackGraph};
use crate::network::{Dir, ElementDir, ElementId, Event, Network, RefKind};
use crate::route::SwitchSetting;
use crate::signal::Speed;
use log::*;
use std::collections::HashMap;

/// Flank protection is searched up to this distance from the protected switch.
pub const MAX_FLANK_DISTANCE: f64 = 200.0;

/// Flank graph nodes besides switches: main signals of any class and derailers. A route
/// may be set towards either of them, so nothing beyond them is turned for flank protection.
/// Derailers count in both directions.
pub struct FlankNodes;

impl NodeKind for FlankNodes {
    fn is_node(&self, net: &Network, element: ElementId) -> bool {
        Dir::both().iter().any(|&dir| {
            let at = ElementDir::new(element, dir);
            net.events(at).contains(&Event::Derail)
                || net.signal(at).map_or(false, |s| {
                    s.derailer || s.rows.iter().any(|r| r.speed == Speed::Stop && r.classes != 0)
                })
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlankSetting {
    pub switch: SwitchSetting,
    /// Distance from the protected switch to the flank switch. Closer switches take priority.
    pub distance: f64,
}

pub struct FlankGraph {
    graph: TrackGraph<FlankNodes>,
    settings: HashMap<(NodeDir, usize), Vec<FlankSetting>>,
}

impl FlankGraph {
    pub fn new() -> Self {
        FlankGraph {
            graph: TrackGraph::new(FlankNodes),
            settings: HashMap::new(),
        }
    }

    /// Switch settings protecting a movement over `element` in direction `dir` towards
    /// successor `branch` (0-based).
    pub fn settings(&mut self, net: &Network, element: ElementId, dir: Dir, branch: usize) -> Vec<FlankSetting> {
        let Some(node) = self.graph.get_node(net, element) else {
            return Vec::new();
        };
        let key = (NodeDir { node, dir }, branch);
        if let Some(settings) = self.settings.get(&key) {
            return settings.clone();
        }
        let at = ElementDir::new(element, dir);
        debug!("Searching flank protection from {}, successor {}", net.describe(at), branch + 1);
        let settings = self.search(net, at, branch);
        self.settings.insert(key, settings.clone());
        settings
    }

    fn search(&mut self, net: &Network, start: ElementDir, branch: usize) -> Vec<FlankSetting> {
        let mut result = Vec::new();
        for (idx, next) in net.successors(start).iter().enumerate() {
            if idx == branch {
                continue;
            }
            let mut prev = start;
            let mut cur = *next;
            let mut distance = 0.0;
            while let Some(at) = cur {
                if self.graph.get_node(net, at.element).is_some() {
                    break;
                }
                distance += net.length(at.element);
                if distance >= MAX_FLANK_DISTANCE {
                    cur = None;
                    break;
                }
                prev = at;
                cur = net.successors(at).first().copied().flatten();
            }

            let Some(at) = cur else {
                continue;
            };
            let predecessors = net.predecessors(at);
            if predecessors.len() <= 1 {
                continue;
            }
            match predecessors.iter().position(|p| *p == Some(prev)) {
                // The trailing switch lies towards the protected branch: turn it away.
                Some(0) => match net.reference_point(at.opposite(), RefKind::Switch) {
                    Some(refpoint) => result.push(FlankSetting {
                        switch: SwitchSetting {
                            refpoint,
                            position: predecessors.len() as u32,
                        },
                        distance,
                    }),
                    None => warn!(
                        "Element {} has more than one predecessor but no switch reference point. The switch is not set for flank protection.",
                        net.describe(at)
                    ),
                },
                Some(_) => {}
                None => warn!(
                    "Position of trailing switch {} coming from {} could not be determined. The switch is not set for flank protection.",
                    net.describe(at),
                    net.describe(prev)
                ),
            }
        }
        result
    }
}

/// Merges `new` into `settings`. Per switch, the setting found at the smaller distance wins.
pub fn merge_flank_settings(settings: &mut Vec<FlankSetting>, new: &[FlankSetting]) {
    settings.retain(|s| {
        !new
            .iter()
            .any(|n| n.switch.refpoint == s.switch.refpoint && s.distance > n.distance)
    });
    let existing = settings.clone();
    settings.extend(new.iter().copied().filter(|n| {
        !existing
            .iter()
            .any(|s| s.switch.refpoint == n.switch.refpoint && n.distance > s.distance)
    }));
}
