use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Speed of a signal aspect, speed event or matrix column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Speed {
    Stop,
    Kmh(f64),
    /// No restriction ("-1").
    Unlimited,
    /// Dark aspect used by afterglow signals ("-2").
    Dark,
    /// Row that is only shown when the signal is the target of a route ("-999").
    TargetOnly,
}

impl Speed {
    pub fn from_raw(value: f64) -> Speed {
        if value == 0.0 {
            Speed::Stop
        } else if value > 0.0 {
            Speed::Kmh(value)
        } else if value == -2.0 {
            Speed::Dark
        } else if value == -999.0 {
            Speed::TargetOnly
        } else {
            Speed::Unlimited
        }
    }

    /// Ordering key of speeds a train can actually run at.
    pub fn rank(self) -> Option<f64> {
        match self {
            Speed::Stop => Some(0.0),
            Speed::Kmh(v) => Some(v),
            Speed::Unlimited => Some(f64::INFINITY),
            Speed::Dark | Speed::TargetOnly => None,
        }
    }

    pub fn is_proceed(self) -> bool {
        matches!(self, Speed::Kmh(_) | Speed::Unlimited)
    }

    /// The more restrictive of two speeds. Only `Stop` and `Kmh` restrict anything.
    pub fn restrict(self, other: Speed) -> Speed {
        match (self, other) {
            (Speed::Kmh(a), Speed::Kmh(b)) => Speed::Kmh(a.min(b)),
            (Speed::Stop, _) | (_, Speed::Stop) => Speed::Stop,
            (Speed::Kmh(a), _) => Speed::Kmh(a),
            (_, Speed::Kmh(b)) => Speed::Kmh(b),
            _ => Speed::Unlimited,
        }
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speed::Stop => write!(f, "0 km/h"),
            Speed::Kmh(v) => write!(f, "{} km/h", v),
            Speed::Unlimited => write!(f, "unlimited"),
            Speed::Dark => write!(f, "dark"),
            Speed::TargetOnly => write!(f, "target only"),
        }
    }
}

/// Row class bit of path signals (switch indicators and the like). They are never route
/// targets, but they are switched along with routes.
pub const PATH_CLASS: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteClass {
    Shunting,
    Train,
    Display,
    AdvanceControl,
}

impl RouteClass {
    /// Bit of this class in the row class masks of signal matrices.
    pub fn mask(self) -> u8 {
        match self {
            RouteClass::Shunting => 2,
            RouteClass::Train => 4,
            RouteClass::Display => 8,
            RouteClass::AdvanceControl => 16,
        }
    }

    pub fn starts_at_entry_points(self) -> bool {
        matches!(self, RouteClass::Shunting | RouteClass::Train)
    }

    /// Whether routes of this class are protected by distant signals and flank protection.
    pub fn is_train_like(self) -> bool {
        !matches!(self, RouteClass::Shunting)
    }

    pub fn name_prefix(self) -> &'static str {
        match self {
            RouteClass::AdvanceControl => "LZB: ",
            _ => "",
        }
    }
}

impl FromStr for RouteClass {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s.starts_with('s') {
            Ok(RouteClass::Shunting)
        } else if s.starts_with('t') {
            Ok(RouteClass::Train)
        } else if s.starts_with('d') {
            Ok(RouteClass::Display)
        } else if s.starts_with('a') || s.starts_with('l') {
            Ok(RouteClass::AdvanceControl)
        } else {
            Err("Could not parse route class.")
        }
    }
}

impl fmt::Display for RouteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RouteClass::Shunting => "shunting",
            RouteClass::Train => "train",
            RouteClass::Display => "display",
            RouteClass::AdvanceControl => "advance control",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TrackType {
    #[default]
    Station,
    SingleTrack,
    Regular,
    Opposing,
}

impl TrackType {
    pub fn from_code(code: u8) -> Option<TrackType> {
        match code {
            0 => Some(TrackType::Station),
            1 => Some(TrackType::SingleTrack),
            2 => Some(TrackType::Regular),
            3 => Some(TrackType::Opposing),
            _ => None,
        }
    }
}

pub const FLAG_PATH_BOTH_DIRECTIONS: u32 = 1 << 0;
pub const FLAG_PATH_SWITCH_ANIMATION: u32 = 1 << 1;
pub const FLAG_SHUNTING_WITH_TRAIN_ROUTE: u32 = 1 << 2;
/// Routes ending here are continued to the next signal.
pub const FLAG_AFTERGLOW_SUCCESSOR: u32 = 1 << 4;
/// Routes may only end here if they already passed another signal.
pub const FLAG_AFTERGLOW_PREDECESSOR: u32 = 1 << 5;
pub const FLAG_HIGH_SIGNALING: u32 = 1 << 7;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Row {
    pub speed: Speed,
    pub classes: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cell {
    /// Sign frames shown by this cell.
    pub frames: u64,
    pub speed: Speed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Indicator {
    pub target: String,
    pub frames: u64,
}

#[derive(Debug, Clone)]
pub struct Signal {
    pub station: String,
    pub name: String,
    pub flags: u32,
    pub random_value: f64,
    pub rows: Vec<Row>,
    pub columns: Vec<Speed>,
    /// Row-major, `width()` cells per row.
    pub cells: Vec<Cell>,
    /// Track type of each replacement ("helper") row. `None` matches every track type.
    pub replacement_rows: Vec<Option<TrackType>>,
    pub target_speed: Option<Speed>,
    pub helper: bool,
    pub derailer: bool,
    pub opposing_track_frames: u64,
    pub direction_indicators: Vec<Indicator>,
    pub direction_pre_indicators: Vec<Indicator>,
}

impl Signal {
    pub fn width(&self) -> usize {
        self.columns.len().max(1)
    }

    pub fn cell(&self, row: usize, column: usize) -> Cell {
        self.cells
            .get(row * self.width() + column)
            .copied()
            .unwrap_or_else(|| Cell {
                frames: 0,
                speed: self.rows.get(row).map(|r| r.speed).unwrap_or(Speed::Stop),
            })
    }

    pub fn descriptor(&self) -> String {
        format!("{} {}", self.station, self.name)
    }

    pub fn has_flag(&self, flag: u32) -> bool {
        self.flags & flag != 0
    }

    /// A signal that terminates routes of the given classes: it has a stop row for one of them.
    pub fn is_main_for(&self, classes: u8) -> bool {
        self.rows
            .iter()
            .any(|r| r.speed == Speed::Stop && r.classes & classes != 0)
    }

    /// Routes of the given classes may start here. This includes signals that show stop
    /// only for other classes but have proceed aspects for these.
    pub fn is_route_start_for(&self, classes: u8) -> bool {
        self.is_main_for(classes)
            || (self
                .rows
                .iter()
                .any(|r| r.speed.is_proceed() && r.classes & classes != 0)
                && self.is_any_main())
    }

    pub fn is_any_main(&self) -> bool {
        self.rows
            .iter()
            .any(|r| r.speed == Speed::Stop && r.classes != 0)
    }

    pub fn is_distant(&self) -> bool {
        !self.columns.is_empty()
    }

    /// A standalone speed indicator: several proceed rows and no stop aspect at all.
    pub fn is_repeater_for(&self, classes: u8) -> bool {
        !self.rows.iter().any(|r| r.speed == Speed::Stop)
            && self
                .rows
                .iter()
                .filter(|r| r.speed.is_proceed() && r.classes & classes != 0)
                .count()
                >= 2
    }

    pub fn has_rows_for(&self, classes: u8) -> bool {
        self.rows.iter().any(|r| r.classes & classes != 0)
    }

    pub fn has_indicators(&self) -> bool {
        self.opposing_track_frames != 0 || !self.direction_indicators.is_empty()
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "signal {}", self.descriptor().trim())
    }
}
