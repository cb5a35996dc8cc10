use crate::aiming::select_row;
use crate::graph::{NodeDir, NodeId, NodeKind, TrackGraph};
use crate::network::{Dir, ElementDir, ElementId, Event, Network, RefId, RefKind};
use crate::route::{DistantLink, LinkRow, SignalLink, SwitchSetting};
use crate::signal::*;
use log::*;
use std::collections::HashMap;

/// Route graph nodes: signals where routes of the class end or start, and entry points.
pub struct RouteNodes {
    pub class: RouteClass,
}

impl NodeKind for RouteNodes {
    fn is_node(&self, net: &Network, element: ElementId) -> bool {
        let mask = self.class.mask();
        Dir::both().iter().any(|&dir| {
            let at = ElementDir::new(element, dir);
            net.signal(at)
                .map_or(false, |s| s.is_main_for(mask) || s.is_route_start_for(mask))
                || (self.class.starts_at_entry_points()
                    && net.reference_point(at, RefKind::EntryPoint).is_some())
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub usize);

/// Contracted run of elements from a node (exclusive) to the next node (inclusive),
/// including the switch setting of the start node's branch.
#[derive(Debug, Clone)]
pub struct RouteEdge {
    pub start: NodeDir,
    /// `None` if the run dead-ends, hits a "no route" marker or crosses an unusable switch.
    pub target: Option<NodeDir>,
    /// Successor index taken at the start node if it is a switch.
    pub start_branch: Option<usize>,
    /// Predecessor index at the target if it is entered through a trailing switch.
    pub target_branch: Option<usize>,
    pub elements: Vec<ElementDir>,
    pub length: f64,
    pub length_legacy: f64,
    pub speed: Speed,
    pub ends_switch_area: bool,
    pub opens_speed_segment: bool,
    pub registers: Vec<RefId>,
    pub conditional_registers: Vec<RefId>,
    pub switches: Vec<SwitchSetting>,
    pub signals: Vec<SignalLink>,
    pub distant_signals: Vec<DistantLink>,
    /// Release and fallback points in the order they were passed.
    pub release_points: Vec<RefId>,
    pub track_type: TrackType,
    pub line_name: String,
    pub direction_target: String,
    pub no_route_at: Option<ElementDir>,
}

impl RouteEdge {
    fn new(start: NodeDir) -> Self {
        RouteEdge {
            start,
            target: None,
            start_branch: None,
            target_branch: None,
            elements: Vec::new(),
            length: 0.0,
            length_legacy: 0.0,
            speed: Speed::Unlimited,
            ends_switch_area: false,
            opens_speed_segment: false,
            registers: Vec::new(),
            conditional_registers: Vec::new(),
            switches: Vec::new(),
            signals: Vec::new(),
            distant_signals: Vec::new(),
            release_points: Vec::new(),
            track_type: TrackType::Station,
            line_name: String::new(),
            direction_target: String::new(),
            no_route_at: None,
        }
    }
}

pub struct RouteGraph {
    pub class: RouteClass,
    graph: TrackGraph<RouteNodes>,
    edges: Vec<RouteEdge>,
    successors: HashMap<NodeDir, Vec<EdgeId>>,
    release_points: HashMap<NodeDir, Vec<RefId>>,
}

impl RouteGraph {
    pub fn new(class: RouteClass) -> Self {
        RouteGraph {
            class,
            graph: TrackGraph::new(RouteNodes { class }),
            edges: Vec::new(),
            successors: HashMap::new(),
            release_points: HashMap::new(),
        }
    }

    pub fn get_node(&mut self, net: &Network, element: ElementId) -> Option<NodeId> {
        self.graph.get_node(net, element)
    }

    pub fn element_dir(&self, at: NodeDir) -> ElementDir {
        self.graph.element_dir(at)
    }

    pub fn edge(&self, id: EdgeId) -> &RouteEdge {
        &self.edges[id.0]
    }

    /// Signal at the node terminates routes of this graph's class.
    pub fn is_target(&self, net: &Network, at: NodeDir) -> bool {
        net.signal(self.element_dir(at))
            .map_or(false, |s| s.is_main_for(self.class.mask()))
    }

    /// One edge per successor of the node in the given direction.
    pub fn successor_edges(&mut self, net: &Network, at: NodeDir) -> Vec<EdgeId> {
        if let Some(edges) = self.successors.get(&at) {
            return edges.clone();
        }

        let start = self.element_dir(at);
        debug!("Searching successor edges from {}", net.describe(start));
        let successors = net.successors(start).to_vec();
        let switch = if successors.len() > 1 {
            let refpoint = net.reference_point(start, RefKind::Switch);
            if refpoint.is_none() {
                warn!(
                    "Element {} has more than one successor but no switch reference point. No routes are generated across it.",
                    net.describe(start)
                );
            }
            Some(refpoint)
        } else {
            None
        };

        let mut ids = Vec::new();
        for (idx, next) in successors.iter().enumerate() {
            let mut edge = RouteEdge::new(at);
            // "End of switch area" already applies in the start element.
            edge.ends_switch_area = net.events(start).contains(&Event::EndOfSwitchArea);
            let mut usable = true;
            match switch {
                Some(Some(refpoint)) => {
                    edge.start_branch = Some(idx);
                    if next.map_or(false, |n| net.module_of(n.element) == net.module_of(start.element)) {
                        edge.switches.push(SwitchSetting {
                            refpoint,
                            position: idx as u32 + 1,
                        });
                    } else {
                        // Only one version of the neighbouring module is loaded at a time.
                        debug!(
                            "Successor {} of element {} is in another module, no switch link",
                            idx + 1,
                            net.describe(start)
                        );
                    }
                }
                Some(None) => usable = false,
                None => {}
            }
            self.walk(net, &mut edge, start, *next);
            if !usable {
                edge.target = None;
            }
            ids.push(EdgeId(self.edges.len()));
            self.edges.push(edge);
        }

        self.successors.insert(at, ids.clone());
        ids
    }

    fn walk(&mut self, net: &Network, edge: &mut RouteEdge, start: ElementDir, first: Option<ElementDir>) {
        let class = self.class;
        let mut prev = start;
        let mut cur = first;
        let mut reached = None;

        while let Some(at) = cur {
            if net.module_of(prev.element) != net.module_of(at.element) {
                edge.length_legacy -= net.length(prev.element);
                edge.length_legacy += net.length(at.element);
            }

            if let Some(ev) = net.events(at).iter().find(|e| e.blocks(class)) {
                debug!("{}: no {} route ({:?})", net.describe(at), class, ev);
                edge.no_route_at = Some(at);
                break;
            }

            link_signals(net, class, edge, at);

            let register = net.register(at);
            if register != 0 {
                match net.reference_point(at, RefKind::Register) {
                    Some(r) => edge.registers.push(r),
                    None => warn!(
                        "Element {} has register {} but no register reference point. The register link is not set up.",
                        net.describe(at),
                        register
                    ),
                }
            }

            let mut ends_switch_area = false;
            let mut has_release = false;
            for ev in net.events(at) {
                match ev {
                    Event::SignalSpeed(s) => {
                        if !edge.ends_switch_area {
                            edge.speed = edge.speed.restrict(*s);
                        }
                    }
                    // Takes effect at the next element.
                    Event::EndOfSwitchArea => ends_switch_area = true,
                    Event::TrackType { kind, line } => {
                        edge.track_type = *kind;
                        edge.line_name = line.clone();
                    }
                    Event::DirectionTarget(target) => edge.direction_target = target.clone(),
                    Event::ReleaseRoute => match net.reference_point(at, RefKind::ReleasePoint) {
                        Some(r) => {
                            has_release = true;
                            edge.release_points.push(r);
                        }
                        None => warn!(
                            "Element {} has a release event but no release reference point. The release link is not set up.",
                            net.describe(at)
                        ),
                    },
                    Event::SignalHalt => match net.reference_point(at, RefKind::FallbackPoint) {
                        Some(r) => edge.release_points.push(r),
                        None => warn!(
                            "Element {} has a signal halt event but no fallback reference point. The fallback link is not set up.",
                            net.describe(at)
                        ),
                    },
                    Event::LinkRegister(r) => edge.registers.push(*r),
                    Event::LinkConditionalRegister(r) => edge.conditional_registers.push(*r),
                    Event::LinkSwitch { refpoint, position } => edge.switches.push(SwitchSetting {
                        refpoint: *refpoint,
                        position: *position,
                    }),
                    Event::LinkSignal { refpoint, row } => {
                        trace!("{}: signal link at {}", net.describe_ref(*refpoint), net.describe(at));
                        edge.signals.push(SignalLink {
                            refpoint: *refpoint,
                            row: row.map_or(LinkRow::ForRouteSpeed, LinkRow::Fixed),
                        })
                    }
                    Event::LinkDistantSignal { refpoint, column } => edge.distant_signals.push(DistantLink {
                        refpoint: *refpoint,
                        column: *column,
                    }),
                    _ => {}
                }
            }
            edge.ends_switch_area |= ends_switch_area;

            edge.elements.push(at);
            let length = net.length(at.element);
            edge.length += length;
            edge.length_legacy += length;

            if self.graph.get_node(net, at.element).is_some() {
                if has_release && net.successors(at).len() > 1 {
                    warn!("Element {} has a release event in a switch", net.describe(at));
                }
                reached = Some(at);
                break;
            }

            // Not a node, so there is at most one successor.
            match net.successors(at).first() {
                Some(Some(next)) => {
                    prev = at;
                    cur = Some(*next);
                }
                Some(None) => {
                    debug!("Element {}: successor could not be resolved", net.describe(at));
                    break;
                }
                None => break,
            }
        }

        let Some(at) = reached else {
            return;
        };
        let Some(node) = self.graph.get_node(net, at.element) else {
            return;
        };
        edge.target = Some(NodeDir { node, dir: at.dir });

        let predecessors = net.predecessors(at);
        if predecessors.len() > 1 {
            let Some(refpoint) = net.reference_point(at.opposite(), RefKind::Switch) else {
                warn!(
                    "Element {} has more than one predecessor but no switch reference point. No routes are generated across it.",
                    net.describe(at)
                );
                edge.target = None;
                return;
            };
            match predecessors.iter().position(|p| *p == Some(prev)) {
                Some(idx) => {
                    edge.target_branch = Some(idx);
                    if net.module_of(prev.element) == net.module_of(at.element) {
                        edge.switches.push(SwitchSetting {
                            refpoint,
                            position: idx as u32 + 1,
                        });
                    } else {
                        debug!(
                            "Predecessor {} of element {} is in another module, no switch link",
                            idx + 1,
                            net.describe(at)
                        );
                    }
                }
                None => {
                    warn!(
                        "Position of trailing switch {} coming from {} could not be determined. No routes are generated across it.",
                        net.describe(at),
                        net.describe(prev)
                    );
                    edge.target = None;
                }
            }
        }
    }

    /// Release and fallback points reachable from the node up to the next train main signal.
    /// Each path stops at its first release point.
    pub fn release_points(&mut self, net: &Network, at: NodeDir) -> Vec<RefId> {
        if let Some(points) = self.release_points.get(&at) {
            return points.clone();
        }
        debug!("Searching release points from {}", net.describe(self.element_dir(at)));
        self.graph.reset_visited();
        let mut result = Vec::new();
        for edge in self.successor_edges(net, at) {
            self.release_points_rec(net, at, edge, &mut result);
        }
        self.release_points.insert(at, result.clone());
        result
    }

    fn release_points_rec(&mut self, net: &Network, from: NodeDir, edge: EdgeId, result: &mut Vec<RefId>) {
        let (target, points, no_route_at) = {
            let e = &self.edges[edge.0];
            (e.target, e.release_points.clone(), e.no_route_at)
        };

        let mut found = false;
        for r in points {
            // Points in an already visited target were added by the other path.
            let in_visited_target = target.map_or(false, |t| {
                net.refpoint(r).at.element == self.graph.element(t.node) && self.graph.is_visited(t.node)
            });
            if !in_visited_target {
                trace!("Release point {}", net.describe_ref(r));
                result.push(r);
            }
            if net.refpoint(r).kind == RefKind::ReleasePoint {
                found = true;
                break;
            }
        }
        if found {
            return;
        }

        let from_signal = net
            .signal(self.element_dir(from))
            .map(|s| s.to_string())
            .unwrap_or_else(|| net.describe(self.element_dir(from)));
        match target {
            None => {
                if let Some(marker) = no_route_at {
                    warn!(
                        "There is a path between {} and the \"no route\" marker at {} without a release point (for {} routes ending at the former).",
                        from_signal,
                        net.describe(marker),
                        self.class
                    );
                }
            }
            Some(t) if !self.graph.is_visited(t.node) => {
                self.graph.mark_visited(t.node);
                let target_signal = net.signal(self.element_dir(t));
                if let Some(s) = target_signal.filter(|s| s.is_main_for(RouteClass::Train.mask())) {
                    warn!(
                        "There is a path between {} and {} without a release point (for routes ending at the former).",
                        from_signal, s
                    );
                } else {
                    for next in self.successor_edges(net, t) {
                        self.release_points_rec(net, from, next, result);
                    }
                }
            }
            Some(_) => {}
        }
    }
}

fn fixed_row(signal: &Signal, classes: u8, kind: &str) -> Option<LinkRow> {
    match select_row(signal, classes, Speed::Unlimited) {
        Some(row) => {
            debug!("{}: {} switched along with the route (row {})", signal, kind, row);
            Some(LinkRow::Fixed(row))
        }
        None => {
            warn!(
                "{} has no row for {} signals and unrestricted speed. The signal link is not set up.",
                signal, kind
            );
            None
        }
    }
}

/// How a signal passed by a route (but not ending it) is linked into the route, if at all.
fn intermediate_row(signal: &Signal, class: RouteClass) -> Option<LinkRow> {
    let display = RouteClass::Display.mask();
    let shunting = RouteClass::Shunting.mask();
    if class == RouteClass::Train && (signal.is_main_for(display) || signal.is_route_start_for(display)) {
        fixed_row(signal, display, "display")
    } else if signal.is_main_for(shunting) || signal.is_route_start_for(shunting) {
        if class == RouteClass::Shunting || signal.has_flag(FLAG_SHUNTING_WITH_TRAIN_ROUTE) {
            fixed_row(signal, shunting, "shunting")
        } else {
            None
        }
    } else if signal.is_main_for(PATH_CLASS) || signal.is_route_start_for(PATH_CLASS) {
        if signal.has_flag(FLAG_PATH_SWITCH_ANIMATION) {
            None
        } else {
            fixed_row(signal, PATH_CLASS, "path")
        }
    } else if signal.rows.len() >= 2 && signal.has_rows_for(class.mask()) {
        // May have been left on another row by a different route.
        if signal.is_repeater_for(class.mask()) {
            Some(LinkRow::Repeater)
        } else {
            Some(LinkRow::ForRouteSpeed)
        }
    } else if signal.has_indicators() {
        Some(LinkRow::ForRouteSpeed)
    } else {
        trace!("{}: not linked", signal);
        None
    }
}

fn link_signals(net: &Network, class: RouteClass, edge: &mut RouteEdge, at: ElementDir) {
    if let Some(signal) = net.signal(at) {
        if !signal.is_main_for(class.mask()) {
            if let Some(row) = intermediate_row(signal, class) {
                match net.reference_point(at, RefKind::Signal) {
                    Some(refpoint) => {
                        if row == LinkRow::Repeater {
                            edge.opens_speed_segment = true;
                        }
                        edge.signals.push(SignalLink { refpoint, row });
                    }
                    None => warn!(
                        "Element {} has a signal but no signal reference point. The signal link is not set up.",
                        net.describe(at)
                    ),
                }
            }
        }
    }

    // Path signals facing the other way that are switched for both directions.
    let opposite = at.opposite();
    if let Some(signal) = net.signal(opposite) {
        if signal.has_flag(FLAG_PATH_BOTH_DIRECTIONS)
            && !signal.has_flag(FLAG_PATH_SWITCH_ANIMATION)
            && signal.is_main_for(PATH_CLASS)
        {
            match net.reference_point(opposite, RefKind::Signal) {
                Some(refpoint) => {
                    if let Some(row) = fixed_row(signal, PATH_CLASS, "path") {
                        edge.signals.push(SignalLink { refpoint, row });
                    }
                }
                None => warn!(
                    "Element {} has a signal but no signal reference point. The signal link is not set up.",
                    net.describe(opposite)
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testnet::*;

    const TRAIN: u8 = 4;

    fn node_dir(g: &mut RouteGraph, net: &Network, module: &str, nr: u32, dir: Dir) -> NodeDir {
        let node = g.get_node(net, element(net, module, nr)).unwrap();
        NodeDir { node, dir }
    }

    #[test]
    fn edge_accumulates_run() {
        let mut m = ModuleBuilder::new("A");
        m.line(&[1, 2, 3, 4], 100.0);
        m.at(1).signal(Dir::Forward, main_signal("1", TRAIN, &[80.0]));
        m.at(2)
            .event(Dir::Forward, 1, 60.0, "")
            .event(Dir::Forward, 39, 0.0, "Line")
            .register(Dir::Forward, 7);
        m.at(3).event(Dir::Forward, 34, 11.0, "");
        m.at(4).signal(Dir::Forward, main_signal("4", TRAIN, &[80.0]));
        m.refpoint(1, 1, Dir::Forward, RefKind::Signal)
            .refpoint(2, 2, Dir::Forward, RefKind::Register)
            .refpoint(11, 3, Dir::Forward, RefKind::Register)
            .refpoint(4, 4, Dir::Forward, RefKind::Signal);
        let net = build(vec![m]);

        let mut g = RouteGraph::new(RouteClass::Train);
        let start = node_dir(&mut g, &net, "A", 1, Dir::Forward);
        let edges = g.successor_edges(&net, start);
        assert_eq!(edges.len(), 1);
        let e = g.edge(edges[0]);
        assert_eq!(e.length, 300.0);
        assert_eq!(e.speed, Speed::Kmh(60.0));
        assert_eq!(e.track_type, TrackType::Regular);
        assert_eq!(e.line_name, "Line");
        assert_eq!(e.registers, vec![refpoint(&net, "A", 2), refpoint(&net, "A", 11)]);
        assert_eq!(
            e.elements,
            [2, 3, 4]
                .iter()
                .map(|nr| ElementDir::new(element(&net, "A", *nr), Dir::Forward))
                .collect::<Vec<_>>()
        );
        let target = e.target.unwrap();
        assert_eq!(g.element_dir(target).element, element(&net, "A", 4));
        assert!(g.is_target(&net, target));
    }

    /// Switch at 2 (branches to 3 and 5), trailing switch at 4 joining 3 and 6.
    fn diamond() -> ModuleBuilder {
        let mut m = ModuleBuilder::new("A");
        for nr in 1..=7 {
            m.element(nr, 10.0);
        }
        m.link(1, 2).link(2, 3).link(2, 5).link(3, 4).link(6, 4).link(4, 7);
        m.link(5, 6);
        m.at(1).signal(Dir::Forward, main_signal("1", TRAIN, &[]));
        m.at(7).signal(Dir::Forward, main_signal("7", TRAIN, &[]));
        m.refpoint(1, 1, Dir::Forward, RefKind::Signal)
            .refpoint(7, 7, Dir::Forward, RefKind::Signal)
            .refpoint(20, 2, Dir::Forward, RefKind::Switch)
            .refpoint(40, 4, Dir::Backward, RefKind::Switch);
        m
    }

    #[test]
    fn switch_positions() {
        let net = build(vec![diamond()]);
        let mut g = RouteGraph::new(RouteClass::Train);
        let n2 = node_dir(&mut g, &net, "A", 2, Dir::Forward);
        let edges = g.successor_edges(&net, n2);
        assert_eq!(edges.len(), 2);

        let straight = g.edge(edges[0]).clone();
        assert_eq!(straight.start_branch, Some(0));
        assert_eq!(straight.target_branch, Some(0));
        assert_eq!(
            straight.switches,
            vec![
                SwitchSetting { refpoint: refpoint(&net, "A", 20), position: 1 },
                SwitchSetting { refpoint: refpoint(&net, "A", 40), position: 1 },
            ]
        );

        let diverging = g.edge(edges[1]).clone();
        assert_eq!(diverging.length, 30.0);
        assert_eq!(
            diverging.switches,
            vec![
                SwitchSetting { refpoint: refpoint(&net, "A", 20), position: 2 },
                SwitchSetting { refpoint: refpoint(&net, "A", 40), position: 2 },
            ]
        );
    }

    #[test]
    fn missing_switch_refpoint_suppresses_targets() {
        let mut m = ModuleBuilder::new("A");
        m.line(&[1, 2, 3], 10.0);
        m.element(4, 10.0);
        m.link(2, 4);
        let net = build(vec![m]);
        let mut g = RouteGraph::new(RouteClass::Train);
        let n2 = node_dir(&mut g, &net, "A", 2, Dir::Forward);
        let edges = g.successor_edges(&net, n2);
        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|e| g.edge(*e).target.is_none()));
        assert_eq!(g.edge(edges[0]).length, 10.0);
    }

    #[test]
    fn no_route_marker_truncates() {
        let mut m = ModuleBuilder::new("A");
        m.line(&[1, 2, 3], 10.0);
        m.at(1).signal(Dir::Forward, main_signal("1", TRAIN | 2, &[]));
        m.at(2).event(Dir::Forward, 21, 0.0, "");
        m.at(3).signal(Dir::Forward, main_signal("3", TRAIN | 2, &[]));
        m.refpoint(1, 1, Dir::Forward, RefKind::Signal);
        let net = build(vec![m]);

        let mut g = RouteGraph::new(RouteClass::Train);
        let n1 = node_dir(&mut g, &net, "A", 1, Dir::Forward);
        let succ = g.successor_edges(&net, n1)[0];
        let e = g.edge(succ).clone();
        assert!(e.target.is_none());
        assert_eq!(e.no_route_at, Some(ElementDir::new(element(&net, "A", 2), Dir::Forward)));

        let mut g = RouteGraph::new(RouteClass::Shunting);
        let n1 = node_dir(&mut g, &net, "A", 1, Dir::Forward);
        let succ = g.successor_edges(&net, n1)[0];
        let e = g.edge(succ).clone();
        assert!(e.target.is_some());
    }

    #[test]
    fn speed_frozen_after_end_of_switch_area() {
        let mut m = ModuleBuilder::new("A");
        m.line(&[1, 2, 3, 4], 10.0);
        m.at(1).signal(Dir::Forward, main_signal("1", TRAIN, &[]));
        m.at(2)
            .event(Dir::Forward, 1, 60.0, "")
            .event(Dir::Forward, 1000002, 0.0, "");
        m.at(3).event(Dir::Forward, 1, 40.0, "");
        m.at(4).signal(Dir::Forward, main_signal("4", TRAIN, &[]));
        let net = build(vec![m]);
        let mut g = RouteGraph::new(RouteClass::Train);
        let n1 = node_dir(&mut g, &net, "A", 1, Dir::Forward);
        let succ = g.successor_edges(&net, n1)[0];
        let e = g.edge(succ).clone();
        assert_eq!(e.speed, Speed::Kmh(60.0));
        assert!(e.ends_switch_area);
    }

    #[test]
    fn legacy_length_across_modules() {
        let mut a = ModuleBuilder::new("A");
        a.line(&[1, 2], 100.0);
        a.at(2).next_module(Dir::Forward, "B", 1);
        a.at(1).signal(Dir::Forward, main_signal("1", TRAIN, &[]));
        a.refpoint(1, 2, Dir::Forward, RefKind::ModuleBoundary);
        let mut b = ModuleBuilder::new("B");
        b.line(&[5, 6], 30.0);
        b.at(5).next_module(Dir::Backward, "A", 1);
        b.at(6).signal(Dir::Forward, main_signal("6", TRAIN, &[]));
        b.refpoint(1, 5, Dir::Backward, RefKind::ModuleBoundary);
        let net = build(vec![a, b]);

        let mut g = RouteGraph::new(RouteClass::Train);
        let n1 = node_dir(&mut g, &net, "A", 1, Dir::Forward);
        let succ = g.successor_edges(&net, n1)[0];
        let e = g.edge(succ).clone();
        assert_eq!(e.length, 160.0);
        // Crossing into B replaces the length of element 2 by that of element 5.
        assert_eq!(e.length_legacy, 90.0);
    }

    #[test]
    fn intermediate_signals() {
        let mut m = ModuleBuilder::new("A");
        m.line(&[1, 2, 3, 4], 10.0);
        m.at(1).signal(Dir::Forward, main_signal("1", TRAIN, &[]));
        // Shunting signal, linked on train routes because of its flag.
        let mut sh = main_signal("2", 2, &[25.0]);
        sh.flags = FLAG_SHUNTING_WITH_TRAIN_ROUTE;
        m.at(2).signal(Dir::Forward, sh);
        // Standalone speed indicator.
        let mut rep = main_signal("3", TRAIN, &[40.0, 60.0]);
        rep.rows.remove(0);
        m.at(3).signal(Dir::Forward, rep);
        m.at(4).signal(Dir::Forward, main_signal("4", TRAIN, &[]));
        m.refpoint(2, 2, Dir::Forward, RefKind::Signal)
            .refpoint(3, 3, Dir::Forward, RefKind::Signal);
        let net = build(vec![m]);

        let mut g = RouteGraph::new(RouteClass::Train);
        let n1 = node_dir(&mut g, &net, "A", 1, Dir::Forward);
        let succ = g.successor_edges(&net, n1)[0];
        let e = g.edge(succ).clone();
        assert_eq!(
            e.signals,
            vec![
                SignalLink { refpoint: refpoint(&net, "A", 2), row: LinkRow::Fixed(1) },
                SignalLink { refpoint: refpoint(&net, "A", 3), row: LinkRow::Repeater },
            ]
        );
        assert!(e.opens_speed_segment);
    }

    #[test]
    fn release_search_stops_at_first_release_point() {
        let mut m = ModuleBuilder::new("A");
        m.line(&[1, 2, 3, 4, 5, 6], 10.0);
        m.at(1).signal(Dir::Forward, main_signal("1", TRAIN, &[]));
        m.at(3).event(Dir::Forward, 3, 0.0, "");
        m.at(4).event(Dir::Forward, 4, 0.0, "");
        m.at(5).event(Dir::Forward, 4, 0.0, "");
        m.at(6).signal(Dir::Forward, main_signal("6", TRAIN, &[]));
        m.refpoint(30, 3, Dir::Forward, RefKind::FallbackPoint)
            .refpoint(40, 4, Dir::Forward, RefKind::ReleasePoint)
            .refpoint(50, 5, Dir::Forward, RefKind::ReleasePoint);
        let net = build(vec![m]);

        let mut g = RouteGraph::new(RouteClass::Train);
        let n1 = node_dir(&mut g, &net, "A", 1, Dir::Forward);
        assert_eq!(
            g.release_points(&net, n1),
            vec![refpoint(&net, "A", 30), refpoint(&net, "A", 40)]
        );
    }

    #[test]
    fn release_search_covers_all_branches() {
        let mut m = diamond();
        m.at(3).event(Dir::Forward, 4, 0.0, "");
        m.at(5).event(Dir::Forward, 4, 0.0, "");
        m.refpoint(30, 3, Dir::Forward, RefKind::ReleasePoint)
            .refpoint(50, 5, Dir::Forward, RefKind::ReleasePoint);
        let net = build(vec![m]);

        let mut g = RouteGraph::new(RouteClass::Train);
        let n1 = node_dir(&mut g, &net, "A", 1, Dir::Forward);
        assert_eq!(
            g.release_points(&net, n1),
            vec![refpoint(&net, "A", 30), refpoint(&net, "A", 50)]
        );
    }
}
