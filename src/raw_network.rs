use serde::{Deserialize, Serialize};

use crate::route::Route;

#[derive(Deserialize, Serialize, Debug, Default)]
pub struct Network {
    pub modules: Vec<Module>,
}

#[derive(Deserialize, Serialize, Debug, Default)]
pub struct Module {
    pub name: String,
    pub elements: Vec<Element>,
    #[serde(default)]
    pub reference_points: Vec<ReferencePoint>,

    /// Names of routes that must not be generated for this module.
    #[serde(default)]
    pub deleted_routes: Vec<String>,

    /// Routes stored with the module by a previous run (or by the editor).
    /// Only used for comparison.
    #[serde(default)]
    pub routes: Vec<Route>,
}

#[derive(Deserialize, Serialize, Debug, Default)]
pub struct Element {
    pub nr: u32,
    pub length: f64,
    #[serde(default)]
    pub forward: ElementDirection,
    #[serde(default)]
    pub backward: ElementDirection,
}

#[derive(Deserialize, Serialize, Debug, Default)]
pub struct ElementDirection {
    /// Successors in this direction. More than one successor makes the element a switch.
    #[serde(default)]
    pub next: Vec<Link>,
    #[serde(default)]
    pub signal: Option<Signal>,
    #[serde(default)]
    pub events: Vec<Event>,
    /// Register number, 0 if there is none.
    #[serde(default)]
    pub register: u32,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(untagged)]
pub enum Link {
    /// Element in the same module. `reversed` means the successor is entered against its
    /// own forward direction.
    Local {
        element: u32,
        #[serde(default)]
        reversed: bool,
    },
    /// Module boundary: the reference point in the other module points towards the boundary.
    Module { module: String, refpoint: u32 },
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    EntryPoint,
    ModuleBoundary,
    Register,
    Switch,
    Signal,
    ReleasePoint,
    FallbackPoint,
}

#[derive(Deserialize, Serialize, Debug)]
pub struct ReferencePoint {
    pub nr: u32,
    pub element: u32,
    pub direction: Direction,
    pub kind: RefKind,
}

/// Events are stored the way the editor stores them: a kind code with a numeric
/// and a text parameter whose meaning depends on the kind.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Event {
    pub kind: u32,
    #[serde(default)]
    pub value: f64,
    #[serde(default)]
    pub text: String,
}

#[derive(Deserialize, Serialize, Debug, Default)]
pub struct Signal {
    #[serde(default)]
    pub station: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub flags: u32,
    #[serde(default)]
    pub random_value: f64,
    #[serde(default)]
    pub rows: Vec<SignalRow>,
    /// Distant signal speeds, one per matrix column.
    #[serde(default)]
    pub columns: Vec<f64>,
    /// Row-major matrix cells. Missing cells are filled in from the row speed.
    #[serde(default)]
    pub cells: Vec<MatrixCell>,
    #[serde(default)]
    pub replacement_rows: Vec<ReplacementRow>,
    /// "Signal speed" event in the signal: applies to all routes ending here.
    #[serde(default)]
    pub target_speed: Option<f64>,
    #[serde(default)]
    pub helper: bool,
    #[serde(default)]
    pub derailer: bool,
    #[serde(default)]
    pub opposing_track_frames: u64,
    #[serde(default)]
    pub direction_indicators: Vec<Indicator>,
    #[serde(default)]
    pub direction_pre_indicators: Vec<Indicator>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy)]
pub struct SignalRow {
    pub speed: f64,
    pub classes: u8,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default)]
pub struct MatrixCell {
    #[serde(default)]
    pub frames: u64,
    #[serde(default)]
    pub speed: Option<f64>,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default)]
pub struct ReplacementRow {
    /// 0 station, 1 single track, 2 regular track, 3 opposing track. None matches any.
    #[serde(default)]
    pub track_type: Option<u8>,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct Indicator {
    pub target: String,
    pub frames: u64,
}
