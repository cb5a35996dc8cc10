use crate::graph::NodeDir;
use crate::network::{Network, RefId};
use crate::route_graph::{EdgeId, RouteEdge};
use crate::signal::{RouteClass, Speed, TrackType};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchSetting {
    pub refpoint: RefId,
    /// 1-based successor index.
    pub position: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRow {
    Fixed(usize),
    /// Row chosen from the route speed when the route is assembled.
    ForRouteSpeed,
    /// Standalone speed indicator: row chosen from the speed of the segment it starts.
    Repeater,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalLink {
    pub refpoint: RefId,
    pub row: LinkRow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DistantLink {
    pub refpoint: RefId,
    pub column: usize,
}

/// Path between two consecutive route nodes of a class with no qualifying signal in between.
#[derive(Debug, Clone)]
pub struct ElementaryRoute {
    pub start: NodeDir,
    pub target: NodeDir,
    pub edges: Vec<EdgeId>,
    pub length: f64,
    pub length_legacy: f64,
    /// Minimum speed per segment. A new segment starts after each standalone speed indicator.
    pub speeds: Vec<Speed>,
    switch_area_ended: bool,
}

impl ElementaryRoute {
    pub fn new(id: EdgeId, edge: &RouteEdge) -> Option<Self> {
        let target = edge.target?;
        let mut route = ElementaryRoute {
            start: edge.start,
            target,
            edges: Vec::new(),
            length: 0.0,
            length_legacy: 0.0,
            speeds: vec![Speed::Unlimited],
            switch_area_ended: false,
        };
        route.extend(id, edge);
        Some(route)
    }

    /// Appends an edge that starts at the current target. Edges without target are ignored.
    pub fn extend(&mut self, id: EdgeId, edge: &RouteEdge) {
        let Some(target) = edge.target else {
            return;
        };
        self.target = target;
        self.edges.push(id);
        self.length += edge.length;
        self.length_legacy += edge.length_legacy;
        if !self.switch_area_ended {
            if let Some(last) = self.speeds.last_mut() {
                *last = last.restrict(edge.speed);
            }
        }
        if edge.opens_speed_segment {
            self.speeds.push(Speed::Unlimited);
        }
        self.switch_area_ended |= edge.ends_switch_area;
    }

    pub fn extended_copy(&self, id: EdgeId, edge: &RouteEdge) -> Self {
        let mut route = self.clone();
        route.extend(id, edge);
        route
    }
}

/// Reference point as written to the output: module name and number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RefKey {
    pub module: String,
    pub nr: u32,
}

impl RefKey {
    pub fn of(net: &Network, id: RefId) -> RefKey {
        let r = net.refpoint(id);
        RefKey {
            module: net.modules[r.module].name.clone(),
            nr: r.nr,
        }
    }
}

impl std::fmt::Display for RefKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.nr, self.module)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSwitch {
    #[serde(rename = "ref")]
    pub refpoint: RefKey,
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteSignal {
    #[serde(rename = "ref")]
    pub refpoint: RefKey,
    pub row: usize,
    #[serde(default)]
    pub helper: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDistantSignal {
    #[serde(rename = "ref")]
    pub refpoint: RefKey,
    pub column: usize,
}

/// A finished route. Field order is the output format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub name: String,
    pub class: RouteClass,
    #[serde(default)]
    pub track_type: TrackType,
    #[serde(default)]
    pub line_name: String,
    #[serde(default)]
    pub random_value: f64,
    pub length: f64,
    #[serde(default)]
    pub length_legacy: f64,
    #[serde(default)]
    pub length_legacy_inclusive: f64,
    pub start: RefKey,
    pub end: RefKey,
    #[serde(default)]
    pub switches: Vec<RouteSwitch>,
    #[serde(default)]
    pub signals: Vec<RouteSignal>,
    #[serde(default)]
    pub distant_signals: Vec<RouteDistantSignal>,
    #[serde(default)]
    pub registers: Vec<RefKey>,
    #[serde(default)]
    pub release_points: Vec<RefKey>,
    #[serde(default)]
    pub partial_release_points: Vec<RefKey>,
    #[serde(default)]
    pub fallback_points: Vec<RefKey>,

    #[serde(skip)]
    pub start_descriptor: String,
    #[serde(skip)]
    pub end_descriptor: String,
    #[serde(skip)]
    pub starts_at_signal: bool,
}
