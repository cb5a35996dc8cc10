use crate::raw_network;
use crate::route::Route;
use crate::signal::{Cell, Indicator, Row, RouteClass, Signal, Speed, TrackType};
use log::*;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

pub use crate::raw_network::RefKind;

#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("could not read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed network description: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed condition list: {0}")]
    Conditions(#[source] serde_json::Error),
    #[error("network contains no modules")]
    Empty,
    #[error("duplicate module name {0:?}")]
    DuplicateModule(String),
    #[error("module {0:?} not found")]
    ModuleNotFound(String),
    #[error("module {module:?}: duplicate element number {nr}")]
    DuplicateElement { module: String, nr: u32 },
    #[error("module {module:?}: duplicate reference point number {nr}")]
    DuplicateRefPoint { module: String, nr: u32 },
    #[error("module {module:?}: reference point {nr} names missing element {element}")]
    MissingElement { module: String, nr: u32, element: u32 },
}

pub type ModuleId = usize;
pub type SignalId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dir {
    Forward,
    Backward,
}

impl Dir {
    pub fn opposite(self) -> Dir {
        match self {
            Dir::Forward => Dir::Backward,
            Dir::Backward => Dir::Forward,
        }
    }

    pub fn both() -> [Dir; 2] {
        [Dir::Forward, Dir::Backward]
    }

    fn index(self) -> usize {
        match self {
            Dir::Forward => 0,
            Dir::Backward => 1,
        }
    }
}

impl From<raw_network::Direction> for Dir {
    fn from(d: raw_network::Direction) -> Dir {
        match d {
            raw_network::Direction::Forward => Dir::Forward,
            raw_network::Direction::Backward => Dir::Backward,
        }
    }
}

/// An element traversed in one direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementDir {
    pub element: ElementId,
    pub dir: Dir,
}

impl ElementDir {
    pub fn new(element: ElementId, dir: Dir) -> Self {
        ElementDir { element, dir }
    }

    pub fn opposite(self) -> ElementDir {
        ElementDir {
            element: self.element,
            dir: self.dir.opposite(),
        }
    }
}

/// Events relevant for route generation, validated when the network is loaded.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    SignalSpeed(Speed),
    SignalHalt,
    ReleaseRoute,
    NoDistantLinkBefore,
    NoTrainRoute,
    NoShuntingRoute,
    NoDisplayRoute,
    AdvanceControlEnd,
    TrackType { kind: TrackType, line: String },
    DirectionTarget(String),
    LinkRegister(RefId),
    LinkConditionalRegister(RefId),
    LinkSwitch { refpoint: RefId, position: u32 },
    /// `row: None` means the row is chosen from the route speed.
    LinkSignal { refpoint: RefId, row: Option<usize> },
    LinkDistantSignal { refpoint: RefId, column: usize },
    Derail,
    EndOfSwitchArea,
}

impl Event {
    /// "No route" markers: routes of the class are not set up across this element.
    pub fn blocks(&self, class: RouteClass) -> bool {
        match self {
            Event::NoTrainRoute => !matches!(class, RouteClass::Shunting),
            Event::NoShuntingRoute => class == RouteClass::Shunting,
            Event::NoDisplayRoute | Event::AdvanceControlEnd => {
                matches!(class, RouteClass::Display | RouteClass::AdvanceControl)
            }
            _ => false,
        }
    }
}

#[derive(Debug, Default)]
pub struct DirInfo {
    pub successors: Vec<Option<ElementDir>>,
    pub signal: Option<SignalId>,
    pub events: Vec<Event>,
    pub register: u32,
}

#[derive(Debug)]
pub struct Element {
    pub module: ModuleId,
    pub nr: u32,
    pub length: f64,
    dirs: [DirInfo; 2],
}

#[derive(Debug)]
pub struct RefPoint {
    pub module: ModuleId,
    pub nr: u32,
    pub at: ElementDir,
    pub kind: RefKind,
}

#[derive(Debug)]
pub struct Module {
    pub name: String,
    /// Sorted by element number.
    pub elements: Vec<ElementId>,
    pub deleted_routes: HashSet<String>,
    pub stored_routes: Vec<Route>,
}

/// All loaded modules with their elements, reference points and signals in flat arenas.
#[derive(Debug)]
pub struct Network {
    pub modules: Vec<Module>,
    elements: Vec<Element>,
    refpoints: Vec<RefPoint>,
    signals: Vec<Signal>,
    signal_at: Vec<ElementDir>,
    element_by_nr: HashMap<(ModuleId, u32), ElementId>,
    ref_by_nr: HashMap<(ModuleId, u32), RefId>,
    refs_at: HashMap<ElementDir, Vec<RefId>>,
}

static NO_REFS: [RefId; 0] = [];

impl Network {
    pub fn element(&self, id: ElementId) -> &Element {
        &self.elements[id.0]
    }

    pub fn num_elements(&self) -> usize {
        self.elements.len()
    }

    pub fn num_refpoints(&self) -> usize {
        self.refpoints.len()
    }

    fn dir_info(&self, at: ElementDir) -> &DirInfo {
        &self.elements[at.element.0].dirs[at.dir.index()]
    }

    pub fn length(&self, element: ElementId) -> f64 {
        self.elements[element.0].length
    }

    pub fn module_of(&self, element: ElementId) -> ModuleId {
        self.elements[element.0].module
    }

    pub fn module_by_name(&self, name: &str) -> Option<ModuleId> {
        self.modules.iter().position(|m| m.name == name)
    }

    pub fn signal(&self, at: ElementDir) -> Option<&Signal> {
        self.dir_info(at).signal.map(|id| &self.signals[id])
    }

    pub fn signal_id(&self, at: ElementDir) -> Option<SignalId> {
        self.dir_info(at).signal
    }

    pub fn signal_by_id(&self, id: SignalId) -> &Signal {
        &self.signals[id]
    }

    pub fn signal_location(&self, id: SignalId) -> ElementDir {
        self.signal_at[id]
    }

    pub fn events(&self, at: ElementDir) -> &[Event] {
        &self.dir_info(at).events
    }

    pub fn register(&self, at: ElementDir) -> u32 {
        self.dir_info(at).register
    }

    /// Successors in travel direction. `None` entries are links that could not be resolved.
    pub fn successors(&self, at: ElementDir) -> &[Option<ElementDir>] {
        &self.dir_info(at).successors
    }

    /// Elements from which `at` is entered, in the order of the switch positions of `at`'s
    /// trailing switch.
    pub fn predecessors(&self, at: ElementDir) -> Vec<Option<ElementDir>> {
        self.successors(at.opposite())
            .iter()
            .map(|s| s.map(ElementDir::opposite))
            .collect()
    }

    pub fn is_branching(&self, element: ElementId) -> bool {
        Dir::both()
            .iter()
            .any(|&dir| self.successors(ElementDir::new(element, dir)).len() > 1)
    }

    pub fn refpoint(&self, id: RefId) -> &RefPoint {
        &self.refpoints[id.0]
    }

    pub fn refs_at(&self, at: ElementDir) -> &[RefId] {
        self.refs_at.get(&at).map(|v| v.as_slice()).unwrap_or(&NO_REFS)
    }

    /// First reference point of the given kind at the element and direction.
    pub fn reference_point(&self, at: ElementDir, kind: RefKind) -> Option<RefId> {
        self.refs_at(at)
            .iter()
            .copied()
            .find(|r| self.refpoints[r.0].kind == kind)
    }

    pub fn refpoint_by_nr(&self, module: ModuleId, nr: u32) -> Option<RefId> {
        self.ref_by_nr.get(&(module, nr)).copied()
    }

    pub fn describe(&self, at: ElementDir) -> String {
        let e = &self.elements[at.element.0];
        format!(
            "{}:{}{}",
            self.modules[e.module].name,
            e.nr,
            match at.dir {
                Dir::Forward => "+",
                Dir::Backward => "-",
            }
        )
    }

    pub fn describe_ref(&self, id: RefId) -> String {
        let r = &self.refpoints[id.0];
        format!("{}@{}", r.nr, self.modules[r.module].name)
    }
}

impl fmt::Display for ElementDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{}{}",
            self.element.0,
            if self.dir == Dir::Forward { "+" } else { "-" }
        )
    }
}

pub fn load(path: &Path) -> Result<Network, NetworkError> {
    let json_contents = std::fs::read_to_string(path).map_err(|source| NetworkError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: raw_network::Network = serde_json::from_str(&json_contents)?;
    trace!("Converting network with {} modules", raw.modules.len());
    convert(raw)
}

pub fn convert(raw: raw_network::Network) -> Result<Network, NetworkError> {
    if raw.modules.is_empty() {
        return Err(NetworkError::Empty);
    }

    let mut net = Network {
        modules: Vec::new(),
        elements: Vec::new(),
        refpoints: Vec::new(),
        signals: Vec::new(),
        signal_at: Vec::new(),
        element_by_nr: HashMap::new(),
        ref_by_nr: HashMap::new(),
        refs_at: HashMap::new(),
    };

    let mut module_ids: HashMap<String, ModuleId> = HashMap::new();
    for (module_id, module) in raw.modules.iter().enumerate() {
        if module_ids.insert(module.name.clone(), module_id).is_some() {
            return Err(NetworkError::DuplicateModule(module.name.clone()));
        }

        let mut elements = Vec::new();
        for element in module.elements.iter() {
            let id = ElementId(net.elements.len());
            if net
                .element_by_nr
                .insert((module_id, element.nr), id)
                .is_some()
            {
                return Err(NetworkError::DuplicateElement {
                    module: module.name.clone(),
                    nr: element.nr,
                });
            }
            net.elements.push(Element {
                module: module_id,
                nr: element.nr,
                length: element.length,
                dirs: Default::default(),
            });
            elements.push(id);
        }
        elements.sort_by_key(|id| net.elements[id.0].nr);

        for refpoint in module.reference_points.iter() {
            let element = *net
                .element_by_nr
                .get(&(module_id, refpoint.element))
                .ok_or_else(|| NetworkError::MissingElement {
                    module: module.name.clone(),
                    nr: refpoint.nr,
                    element: refpoint.element,
                })?;
            let id = RefId(net.refpoints.len());
            if net.ref_by_nr.insert((module_id, refpoint.nr), id).is_some() {
                return Err(NetworkError::DuplicateRefPoint {
                    module: module.name.clone(),
                    nr: refpoint.nr,
                });
            }
            let at = ElementDir::new(element, refpoint.direction.into());
            net.refpoints.push(RefPoint {
                module: module_id,
                nr: refpoint.nr,
                at,
                kind: refpoint.kind,
            });
            net.refs_at.entry(at).or_default().push(id);
        }

        net.modules.push(Module {
            name: module.name.clone(),
            elements,
            deleted_routes: module.deleted_routes.iter().cloned().collect(),
            stored_routes: Vec::new(),
        });
    }

    // Links and events may point into other modules, so they are resolved once all
    // elements and reference points exist.
    for (module_id, module) in raw.modules.iter().enumerate() {
        for element in module.elements.iter() {
            let id = net.element_by_nr[&(module_id, element.nr)];
            for (dir, raw_dir) in [(Dir::Forward, &element.forward), (Dir::Backward, &element.backward)] {
                let at = ElementDir::new(id, dir);
                let successors = raw_dir
                    .next
                    .iter()
                    .map(|link| resolve_link(&net, &module_ids, module_id, at, link))
                    .collect::<Vec<_>>();
                let events = raw_dir
                    .events
                    .iter()
                    .filter_map(|ev| convert_event(&net, &module_ids, module_id, at, ev))
                    .collect::<Vec<_>>();
                let signal = raw_dir.signal.as_ref().map(|raw_signal| {
                    let signal_id = net.signals.len();
                    net.signals.push(convert_signal(raw_signal));
                    net.signal_at.push(at);
                    signal_id
                });
                net.elements[id.0].dirs[dir.index()] = DirInfo {
                    successors,
                    signal,
                    events,
                    register: raw_dir.register,
                };
            }
        }
    }

    for (module, raw_module) in net.modules.iter_mut().zip(raw.modules.into_iter()) {
        module.stored_routes = raw_module.routes;
    }

    debug!(
        "Loaded {} modules, {} elements, {} reference points, {} signals",
        net.modules.len(),
        net.elements.len(),
        net.refpoints.len(),
        net.signals.len()
    );

    Ok(net)
}

fn resolve_link(
    net: &Network,
    module_ids: &HashMap<String, ModuleId>,
    module_id: ModuleId,
    from: ElementDir,
    link: &raw_network::Link,
) -> Option<ElementDir> {
    match link {
        raw_network::Link::Local { element, reversed } => {
            let target = net.element_by_nr.get(&(module_id, *element)).copied();
            if target.is_none() {
                warn!(
                    "Element {} links to missing element {}",
                    net.describe(from),
                    element
                );
            }
            target.map(|e| ElementDir::new(e, if *reversed { Dir::Backward } else { Dir::Forward }))
        }
        raw_network::Link::Module { module, refpoint } => {
            let other = module_ids
                .get(module)
                .and_then(|m| net.refpoint_by_nr(*m, *refpoint));
            match other {
                // The reference point points towards the module boundary.
                Some(r) => Some(net.refpoint(r).at.opposite()),
                None => {
                    warn!(
                        "Element {}: cannot resolve link to reference point {} in module {:?}",
                        net.describe(from),
                        refpoint,
                        module
                    );
                    None
                }
            }
        }
    }
}

fn event_refpoint(net: &Network, module_id: ModuleId, at: ElementDir, ev: &raw_network::Event, what: &str) -> Option<RefId> {
    let r = if ev.value >= 0.0 && ev.value.fract() == 0.0 {
        net.refpoint_by_nr(module_id, ev.value as u32)
    } else {
        None
    };
    if r.is_none() {
        warn!(
            "Event \"{}\" at element {} names invalid reference point {}. The link is not set up.",
            what,
            net.describe(at),
            ev.value
        );
    }
    r
}

fn convert_event(
    net: &Network,
    module_ids: &HashMap<String, ModuleId>,
    module_id: ModuleId,
    at: ElementDir,
    ev: &raw_network::Event,
) -> Option<Event> {
    let event = match ev.kind {
        1 => {
            if ev.value <= 0.0 {
                warn!(
                    "Element {}: ignoring signal speed event with value {}",
                    net.describe(at),
                    ev.value
                );
                return None;
            }
            Event::SignalSpeed(Speed::Kmh(ev.value))
        }
        3 => Event::SignalHalt,
        4 => Event::ReleaseRoute,
        20 => Event::NoDistantLinkBefore,
        21 => Event::NoTrainRoute,
        22 => Event::NoShuntingRoute,
        45 => Event::NoDisplayRoute,
        3002 => Event::AdvanceControlEnd,
        28 | 39 | 40 => Event::TrackType {
            kind: match ev.kind {
                28 => TrackType::Opposing,
                39 => TrackType::Regular,
                _ => TrackType::SingleTrack,
            },
            line: ev.text.clone(),
        },
        29 => Event::DirectionTarget(ev.text.clone()),
        34 | 35 => {
            let module = if ev.text.is_empty() {
                Some(module_id)
            } else {
                module_ids.get(&ev.text).copied()
            };
            let refpoint = module.and_then(|m| {
                if ev.value >= 0.0 && ev.value.fract() == 0.0 {
                    net.refpoint_by_nr(m, ev.value as u32)
                } else {
                    None
                }
            });
            let Some(refpoint) = refpoint else {
                warn!(
                    "Event \"link register\" at element {} names invalid reference point {} in module {:?}. The register link is not set up.",
                    net.describe(at),
                    ev.value,
                    ev.text
                );
                return None;
            };
            if ev.kind == 35 {
                Event::LinkConditionalRegister(refpoint)
            } else {
                Event::LinkRegister(refpoint)
            }
        }
        36 => {
            let refpoint = event_refpoint(net, module_id, at, ev, "link switch")?;
            match ev.text.trim().parse::<i64>() {
                Ok(position) if position > 0 => Event::LinkSwitch {
                    refpoint,
                    position: position as u32,
                },
                _ => {
                    warn!(
                        "Event \"link switch\" at element {} has invalid switch position {:?}. The switch link is not set up.",
                        net.describe(at),
                        ev.text
                    );
                    return None;
                }
            }
        }
        37 => {
            let refpoint = event_refpoint(net, module_id, at, ev, "link signal")?;
            match ev.text.trim().parse::<i64>() {
                Ok(-1) => Event::LinkSignal { refpoint, row: None },
                Ok(row) if row >= 0 => Event::LinkSignal {
                    refpoint,
                    row: Some(row as usize),
                },
                _ => {
                    warn!(
                        "Event \"link signal\" at element {} has invalid row {:?}. The signal link is not set up.",
                        net.describe(at),
                        ev.text
                    );
                    return None;
                }
            }
        }
        50 => {
            let refpoint = event_refpoint(net, module_id, at, ev, "link distant signal")?;
            match ev.text.trim().parse::<usize>() {
                Ok(column) => Event::LinkDistantSignal { refpoint, column },
                Err(_) => {
                    warn!(
                        "Event \"link distant signal\" at element {} has invalid column {:?}. The distant signal link is not set up.",
                        net.describe(at),
                        ev.text
                    );
                    return None;
                }
            }
        }
        52 => Event::Derail,
        1000002 => Event::EndOfSwitchArea,
        _ => {
            trace!("Element {}: skipping event {}", net.describe(at), ev.kind);
            return None;
        }
    };
    Some(event)
}

fn convert_signal(raw: &raw_network::Signal) -> Signal {
    let rows = raw
        .rows
        .iter()
        .map(|r| Row {
            speed: Speed::from_raw(r.speed),
            classes: r.classes,
        })
        .collect::<Vec<_>>();
    let columns = raw.columns.iter().map(|c| Speed::from_raw(*c)).collect::<Vec<_>>();
    let width = columns.len().max(1);
    let cells = (0..rows.len() * width)
        .map(|i| {
            let raw_cell = raw.cells.get(i).copied().unwrap_or_default();
            Cell {
                frames: raw_cell.frames,
                speed: raw_cell
                    .speed
                    .map(Speed::from_raw)
                    .unwrap_or(rows[i / width].speed),
            }
        })
        .collect();
    let indicators = |v: &Vec<raw_network::Indicator>| {
        v.iter()
            .map(|i| Indicator {
                target: i.target.clone(),
                frames: i.frames,
            })
            .collect::<Vec<_>>()
    };

    Signal {
        station: raw.station.clone(),
        name: raw.name.clone(),
        flags: raw.flags,
        random_value: raw.random_value,
        rows,
        columns,
        cells,
        replacement_rows: raw
            .replacement_rows
            .iter()
            .map(|r| r.track_type.and_then(TrackType::from_code))
            .collect(),
        target_speed: raw.target_speed.map(Speed::from_raw),
        helper: raw.helper,
        derailer: raw.derailer,
        opposing_track_frames: raw.opposing_track_frames,
        direction_indicators: indicators(&raw.direction_indicators),
        direction_pre_indicators: indicators(&raw.direction_pre_indicators),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testnet::*;

    #[test]
    fn resolves_links_across_modules() {
        let mut a = ModuleBuilder::new("A");
        a.element(1, 100.0).next_module(Dir::Forward, "B", 10);
        a.refpoint(5, 1, Dir::Forward, RefKind::ModuleBoundary);
        let mut b = ModuleBuilder::new("B");
        b.element(7, 50.0).next_module(Dir::Backward, "A", 5);
        b.refpoint(10, 7, Dir::Backward, RefKind::ModuleBoundary);
        let net = build(vec![a, b]);

        let e1 = element(&net, "A", 1);
        let e7 = element(&net, "B", 7);
        assert_eq!(
            net.successors(ElementDir::new(e1, Dir::Forward)),
            &[Some(ElementDir::new(e7, Dir::Forward))]
        );
        assert_eq!(
            net.predecessors(ElementDir::new(e7, Dir::Forward)),
            vec![Some(ElementDir::new(e1, Dir::Forward))]
        );
    }

    #[test]
    fn unresolved_link_is_none() {
        let mut a = ModuleBuilder::new("A");
        a.element(1, 100.0).next_module(Dir::Forward, "Missing", 1);
        let net = build(vec![a]);
        let e1 = element(&net, "A", 1);
        assert_eq!(net.successors(ElementDir::new(e1, Dir::Forward)), &[None]);
    }

    #[test]
    fn malformed_events_are_dropped() {
        let mut a = ModuleBuilder::new("A");
        a.element(1, 100.0)
            .event(Dir::Forward, 36, 99.0, "1")
            .event(Dir::Forward, 36, 3.0, "zero")
            .event(Dir::Forward, 36, 3.0, "2")
            .event(Dir::Forward, 1, -5.0, "")
            .event(Dir::Forward, 1000002, 0.0, "");
        a.refpoint(3, 1, Dir::Forward, RefKind::Switch);
        let net = build(vec![a]);
        let e1 = element(&net, "A", 1);
        let r3 = net.refpoint_by_nr(0, 3).unwrap();
        assert_eq!(
            net.events(ElementDir::new(e1, Dir::Forward)),
            &[
                Event::LinkSwitch {
                    refpoint: r3,
                    position: 2
                },
                Event::EndOfSwitchArea
            ]
        );
    }

    #[test]
    fn duplicate_elements_are_fatal() {
        let mut a = ModuleBuilder::new("A");
        a.element(1, 10.0);
        a.element(1, 20.0);
        assert!(matches!(
            convert(raw(vec![a])),
            Err(NetworkError::DuplicateElement { nr: 1, .. })
        ));
    }

    #[test]
    fn refpoint_on_missing_element_is_fatal() {
        let mut a = ModuleBuilder::new("A");
        a.element(1, 10.0);
        a.refpoint(1, 2, Dir::Forward, RefKind::Signal);
        assert!(matches!(
            convert(raw(vec![a])),
            Err(NetworkError::MissingElement { element: 2, .. })
        ));
    }

    #[test]
    fn empty_network_is_fatal() {
        assert!(matches!(
            convert(raw_network::Network::default()),
            Err(NetworkError::Empty)
        ));
    }

    #[test]
    fn keeps_module_route_lists() {
        let stored: Route = serde_json::from_str(
            r#"{ "name": "S 1 -> S 2", "class": "train", "length": 120.0,
                 "start": { "module": "A", "nr": 1 }, "end": { "module": "A", "nr": 2 },
                 "switches": [ { "ref": { "module": "A", "nr": 20 }, "position": 2 } ] }"#,
        )
        .unwrap();
        let mut a = ModuleBuilder::new("A");
        a.element(1, 10.0);
        a.deleted_route("S 1 -> S 3").stored_route(stored.clone());
        let net = build(vec![a]);

        let m = &net.modules[0];
        assert!(m.deleted_routes.contains("S 1 -> S 3"));
        assert_eq!(m.stored_routes, vec![stored]);
        assert_eq!(m.stored_routes[0].switches[0].position, 2);
        assert!(m.stored_routes[0].signals.is_empty());
    }

    #[test]
    fn no_route_markers_by_class() {
        assert!(Event::NoTrainRoute.blocks(RouteClass::Train));
        assert!(Event::NoTrainRoute.blocks(RouteClass::Display));
        assert!(!Event::NoTrainRoute.blocks(RouteClass::Shunting));
        assert!(Event::NoShuntingRoute.blocks(RouteClass::Shunting));
        assert!(Event::AdvanceControlEnd.blocks(RouteClass::AdvanceControl));
        assert!(!Event::AdvanceControlEnd.blocks(RouteClass::Train));
    }
}
