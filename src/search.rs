use crate::aiming::{select_column, select_replacement_row, select_row, SignalCatalog};
use crate::conditions::ConditionFilter;
use crate::distant::DistantGraph;
use crate::flank::{merge_flank_settings, FlankGraph, FlankSetting};
use crate::generate::GeneratorConfig;
use crate::graph::NodeDir;
use crate::network::{ElementDir, Network, RefId, RefKind};
use crate::route::*;
use crate::route_graph::RouteGraph;
use crate::signal::*;
use log::*;
use std::collections::HashMap;

/// Start descriptor of routes that begin at an entry point instead of a signal.
pub const ENTRY_POINT_NAME: &str = "Aufgleispunkt";
const CONDITIONAL_REGISTER_NAME: &str = "platform crossing";

/// Graphs and matrix extensions shared by the searches of all route classes.
pub struct SearchContext {
    pub distant: DistantGraph,
    pub flank: Option<FlankGraph>,
    pub catalog: SignalCatalog,
}

impl SearchContext {
    pub fn new(flank_protection: bool) -> Self {
        SearchContext {
            distant: DistantGraph::new(),
            flank: if flank_protection { Some(FlankGraph::new()) } else { None },
            catalog: SignalCatalog::new(),
        }
    }
}

/// Route being aimed. The name prefixes log messages.
struct Aim<'r> {
    name: &'r str,
    track_type: TrackType,
    direction: &'r str,
}

/// Route search for one route class.
pub struct RouteSearch<'a> {
    net: &'a Network,
    class: RouteClass,
    alternative_paths: bool,
    conditions: &'a dyn ConditionFilter,
    graph: RouteGraph,
    elementary: HashMap<NodeDir, Vec<ElementaryRoute>>,
}

/// Links collected while assembling one route.
#[derive(Default)]
struct Links {
    registers: Vec<RefId>,
    switches: Vec<SwitchSetting>,
    signals: Vec<(RefId, usize, bool)>,
    distant_signals: Vec<(RefId, usize)>,
    release_points: Vec<RefId>,
    partial_release_points: Vec<RefId>,
    fallback_points: Vec<RefId>,
}

impl<'a> RouteSearch<'a> {
    pub fn new(
        net: &'a Network,
        class: RouteClass,
        config: &GeneratorConfig,
        conditions: &'a dyn ConditionFilter,
    ) -> Self {
        RouteSearch {
            net,
            class,
            alternative_paths: config.alternative_paths,
            conditions,
            graph: RouteGraph::new(class),
            elementary: HashMap::new(),
        }
    }

    pub fn class(&self) -> RouteClass {
        self.class
    }

    fn descriptor(&self, at: NodeDir) -> String {
        self.net
            .signal(self.graph.element_dir(at))
            .map(|s| s.descriptor())
            .unwrap_or_default()
    }

    fn start_descriptor(&self, at: NodeDir) -> String {
        match self
            .net
            .signal(self.graph.element_dir(at))
            .filter(|s| s.is_route_start_for(self.class.mask()))
        {
            Some(s) => s.descriptor(),
            None => ENTRY_POINT_NAME.to_string(),
        }
    }

    fn switches_of(&self, route: &ElementaryRoute) -> Vec<SwitchSetting> {
        route
            .edges
            .iter()
            .flat_map(|e| self.graph.edge(*e).switches.iter().copied())
            .collect()
    }

    /// All routes of this class starting at the given element and direction.
    pub fn routes_from(&mut self, ctx: &mut SearchContext, at: ElementDir) -> Vec<Route> {
        let Some(node) = self.graph.get_node(self.net, at.element) else {
            return Vec::new();
        };
        debug!("Searching {} routes from {}", self.class, self.net.describe(at));
        let mut result = Vec::new();
        for route in self.elementary_routes(NodeDir { node, dir: at.dir }) {
            self.chain(ctx, vec![route], &mut result);
        }
        result
    }

    /// Elementary routes from the node to the next target signals, one per target unless
    /// alternative paths are requested. Targets are in the order they were found.
    fn elementary_routes(&mut self, at: NodeDir) -> Vec<ElementaryRoute> {
        if let Some(routes) = self.elementary.get(&at) {
            return routes.clone();
        }
        debug!(
            "Searching elementary routes from {}",
            self.net.describe(self.graph.element_dir(at))
        );

        let mut by_target: Vec<(NodeDir, Vec<ElementaryRoute>)> = Vec::new();
        for id in self.graph.successor_edges(self.net, at) {
            if let Some(route) = ElementaryRoute::new(id, self.graph.edge(id)) {
                self.elementary_rec(route, &mut by_target);
            }
        }

        let start_name = self.start_descriptor(at);
        let mut result = Vec::new();
        for (target, mut candidates) in by_target {
            let name = format!("{} -> {}", start_name, self.descriptor(target));
            if self.conditions.applies_to(&name) {
                debug!("Filtering by condition '{}'", name);
                let filtered = candidates
                    .iter()
                    .filter(|r| self.conditions.allows(&name, self.net, &self.switches_of(r)))
                    .cloned()
                    .collect::<Vec<_>>();
                if filtered.is_empty() {
                    warn!("No path satisfies the condition for '{}'", name);
                } else {
                    candidates = filtered;
                }
            }

            if candidates.len() > 1 {
                debug!(
                    "{} paths to {}: {}",
                    candidates.len(),
                    self.descriptor(target),
                    candidates
                        .iter()
                        .map(|r| format!("{}, {:.2} m", r.speeds[0], r.length))
                        .collect::<Vec<_>>()
                        .join(" / ")
                );
            }
            if self.alternative_paths {
                result.extend(candidates);
            } else {
                result.extend(candidates.into_iter().next());
            }
        }

        self.elementary.insert(at, result.clone());
        result
    }

    fn elementary_rec(&mut self, mut route: ElementaryRoute, by_target: &mut Vec<(NodeDir, Vec<ElementaryRoute>)>) {
        if self.graph.is_target(self.net, route.target) {
            debug!("Target signal found: {}", self.descriptor(route.target));
            match by_target.iter_mut().find(|(t, _)| *t == route.target) {
                Some((_, routes)) => routes.push(route),
                None => by_target.push((route.target, vec![route])),
            }
            return;
        }

        let edges = self
            .graph
            .successor_edges(self.net, route.target)
            .into_iter()
            .filter(|e| self.graph.edge(*e).target.is_some())
            .collect::<Vec<_>>();
        let Some((&last, rest)) = edges.split_last() else {
            return;
        };
        for id in rest {
            let copy = route.extended_copy(*id, self.graph.edge(*id));
            self.elementary_rec(copy, by_target);
        }
        route.extend(last, self.graph.edge(last));
        self.elementary_rec(route, by_target);
    }

    /// Closes and/or continues the chain at its last target, depending on the target's
    /// afterglow flags.
    fn chain(&mut self, ctx: &mut SearchContext, chain: Vec<ElementaryRoute>, result: &mut Vec<Route>) {
        let Some(target) = chain.last().map(|r| r.target) else {
            return;
        };
        let flags = self
            .net
            .signal(self.graph.element_dir(target))
            .map_or(0, |s| s.flags);

        let mut close = true;
        let mut proceed = false;
        if flags & FLAG_AFTERGLOW_PREDECESSOR != 0 && chain.len() == 1 {
            close = false;
            proceed = true;
        }
        if flags & FLAG_AFTERGLOW_SUCCESSOR != 0 {
            proceed = true;
        }
        debug!(
            "Route search at {}: close={}, continue={}",
            self.descriptor(target),
            close,
            proceed
        );

        if close {
            result.extend(self.expand(ctx, &chain));
        }
        if proceed {
            for next in self.elementary_routes(target) {
                let longer = velcro::vec![..chain.iter().cloned(), next];
                self.chain(ctx, longer, result);
            }
        }
    }

    /// One route per combination of activated conditional register sets.
    fn expand(&mut self, ctx: &mut SearchContext, chain: &[ElementaryRoute]) -> Vec<Route> {
        let conditional = chain
            .iter()
            .enumerate()
            .filter(|(_, r)| {
                r.edges
                    .iter()
                    .any(|e| !self.graph.edge(*e).conditional_registers.is_empty())
            })
            .map(|(i, _)| i)
            .collect::<Vec<_>>();

        let mut result = Vec::new();
        for combination in 0..(1usize << conditional.len()) {
            let mut active = vec![false; chain.len()];
            let mut names = Vec::new();
            for (bit, idx) in conditional.iter().enumerate() {
                if combination & (1 << bit) != 0 {
                    active[*idx] = true;
                    names.push(if conditional.len() > 1 {
                        format!("{} {}", CONDITIONAL_REGISTER_NAME, bit + 1)
                    } else {
                        CONDITIONAL_REGISTER_NAME.to_string()
                    });
                }
            }
            let suffix = if names.is_empty() {
                String::new()
            } else {
                format!(" ({})", names.join(", "))
            };
            result.extend(self.build_route(ctx, chain, &active, &suffix));
        }
        result
    }

    fn build_route(
        &mut self,
        ctx: &mut SearchContext,
        chain: &[ElementaryRoute],
        active: &[bool],
        suffix: &str,
    ) -> Option<Route> {
        let net = self.net;
        let mask = self.class.mask();
        let first = chain.first()?;
        let last = chain.last()?;
        let start_at = self.graph.element_dir(first.start);
        let end_at = self.graph.element_dir(last.target);

        let start_ref = net
            .signal(start_at)
            .filter(|s| s.is_route_start_for(mask))
            .and_then(|_| net.reference_point(start_at, RefKind::Signal))
            .or_else(|| net.reference_point(start_at, RefKind::EntryPoint));
        let Some(start_ref) = start_ref else {
            warn!(
                "Element {} starts a {} route but has no signal or entry point reference point. The route is not generated.",
                net.describe(start_at),
                self.class
            );
            return None;
        };
        let end_signal = net.signal(end_at)?;
        let Some(end_ref) = net.reference_point(end_at, RefKind::Signal) else {
            warn!(
                "Element {} has a signal but no signal reference point. Routes ending at {} are not generated.",
                net.describe(end_at),
                end_signal
            );
            return None;
        };
        let start_signal = Some(net.refpoint(start_ref))
            .filter(|r| r.kind == RefKind::Signal)
            .and_then(|r| net.signal(r.at));

        let start_descriptor = match start_signal {
            Some(s) => s.descriptor(),
            None => ENTRY_POINT_NAME.to_string(),
        };
        let mut name = format!("{}{}", self.class.name_prefix(), start_descriptor);

        let mut length = 0.0;
        let mut length_legacy = 0.0;
        let mut track_type = TrackType::Station;
        let mut line_name = String::new();
        let mut direction = String::new();
        for route in chain {
            name.push_str(" -> ");
            name.push_str(&self.descriptor(route.target));
            length += route.length;
            length_legacy += route.length_legacy;
            for id in route.edges.iter() {
                let edge = self.graph.edge(*id);
                if edge.track_type != TrackType::Station {
                    track_type = edge.track_type;
                    line_name = edge.line_name.clone();
                }
                if !edge.direction_target.is_empty() {
                    direction = edge.direction_target.clone();
                }
            }
        }
        name.push_str(suffix);

        // Segment speeds of the whole chain. The first segment of a chained route continues
        // the last segment of its predecessor.
        let mut speeds: Vec<Speed> = Vec::new();
        for route in chain {
            let mut segments = route.speeds.iter().copied();
            match (speeds.last_mut(), segments.next()) {
                (Some(last), Some(s)) => *last = last.restrict(s),
                (None, Some(s)) => speeds.push(s),
                _ => {}
            }
            speeds.extend(segments);
        }
        if let Some(target_speed) = end_signal.target_speed {
            speeds.iter_mut().for_each(|s| *s = target_speed);
        }
        let route_speed = speeds.first().copied().unwrap_or(Speed::Unlimited);
        debug!("{}: signal speeds {:?}, direction \"{}\"", name, speeds, direction);

        let aim = Aim {
            name: &name,
            track_type,
            direction: &direction,
        };
        let mut links = Links::default();
        let mut start_link = None;
        let mut flank: Vec<FlankSetting> = Vec::new();
        let mut segment = 0;

        for (idx, route) in chain.iter().enumerate() {
            if idx == 0 {
                if let Some(signal) = start_signal {
                    let link = self.aim_start_signal(ctx, &aim, start_at, signal, end_signal, route_speed)?;
                    start_link = Some((start_ref, link.0, link.1));
                }
            } else {
                self.aim_afterglow_signal(ctx, &aim, route.start, &mut links);
            }

            if idx + 1 == chain.len() {
                if let Some(row) = end_signal.rows.iter().position(|r| r.speed == Speed::TargetOnly) {
                    links.signals.push((end_ref, row, false));
                }
            }

            for id in route.edges.iter() {
                let edge = self.graph.edge(*id);
                links.registers.extend(edge.registers.iter().copied());
                if active[idx] {
                    links.registers.extend(edge.conditional_registers.iter().copied());
                }
                links.switches.extend(edge.switches.iter().copied());
                for r in edge.release_points.iter().copied() {
                    let refpoint = net.refpoint(r);
                    match refpoint.kind {
                        // Release points in the end element release the whole route.
                        RefKind::ReleasePoint if refpoint.at == end_at => links.release_points.push(r),
                        RefKind::ReleasePoint => links.partial_release_points.push(r),
                        _ => links.fallback_points.push(r),
                    }
                }

                for link in edge.signals.iter() {
                    let row = match link.row {
                        LinkRow::Fixed(row) => Some(row),
                        LinkRow::ForRouteSpeed => {
                            let speed = speeds.get(segment).copied().unwrap_or(route_speed);
                            self.aim_linked_signal(ctx, &aim, link.refpoint, speed)
                        }
                        LinkRow::Repeater => {
                            let speed = speeds
                                .get(segment + 1)
                                .or_else(|| speeds.get(segment))
                                .copied()
                                .unwrap_or(route_speed);
                            self.aim_linked_signal(ctx, &aim, link.refpoint, speed)
                        }
                    };
                    if let Some(row) = row {
                        links.signals.push((link.refpoint, row, false));
                    }
                }
                links
                    .distant_signals
                    .extend(edge.distant_signals.iter().map(|d| (d.refpoint, d.column)));

                if let Some(flank_graph) = ctx.flank.as_mut().filter(|_| self.class.is_train_like()) {
                    let start = self.graph.element_dir(edge.start);
                    if let Some(branch) = edge.start_branch {
                        let new = flank_graph.settings(net, start.element, start.dir, branch);
                        merge_flank_settings(&mut flank, &new);
                    }
                    if let (Some(target), Some(branch)) = (edge.target, edge.target_branch) {
                        let target = self.graph.element_dir(target);
                        let new = flank_graph.settings(net, target.element, target.dir.opposite(), branch);
                        merge_flank_settings(&mut flank, &new);
                    }
                }

                if edge.opens_speed_segment {
                    segment += 1;
                }
            }
        }

        for setting in flank {
            if setting.switch.position != 1
                && !links.switches.iter().any(|s| s.refpoint == setting.switch.refpoint)
            {
                trace!(
                    "{}: flank protection {} position {}",
                    name,
                    net.describe_ref(setting.switch.refpoint),
                    setting.switch.position
                );
                links.switches.push(setting.switch);
            }
        }

        // A release point found so far lies in the end element; otherwise search beyond it.
        if links.release_points.is_empty() {
            for r in self.graph.release_points(net, last.target) {
                if net.refpoint(r).kind == RefKind::FallbackPoint {
                    links.fallback_points.push(r);
                } else {
                    links.release_points.push(r);
                }
            }
        }

        // After all edges: explicitly linked distant signals take precedence.
        let start_is_helper = start_link.map_or(false, |(_, _, helper)| helper);
        if self.class.is_train_like() && start_link.is_some() && !start_is_helper {
            self.aim_distant_signals(ctx, &aim, start_at, route_speed, &mut links);
        }

        links.signals.extend(start_link);

        let start_length = net.length(start_at.element);
        let end_length = net.length(end_at.element);
        Some(Route {
            name,
            class: self.class,
            track_type,
            line_name,
            random_value: end_signal.random_value,
            length,
            length_legacy,
            length_legacy_inclusive: length_legacy + start_length - end_length,
            start: RefKey::of(net, start_ref),
            end: RefKey::of(net, end_ref),
            switches: links
                .switches
                .iter()
                .map(|s| RouteSwitch {
                    refpoint: RefKey::of(net, s.refpoint),
                    position: s.position,
                })
                .collect(),
            signals: links
                .signals
                .iter()
                .map(|(r, row, helper)| RouteSignal {
                    refpoint: RefKey::of(net, *r),
                    row: *row,
                    helper: *helper,
                })
                .collect(),
            distant_signals: links
                .distant_signals
                .iter()
                .map(|(r, column)| RouteDistantSignal {
                    refpoint: RefKey::of(net, *r),
                    column: *column,
                })
                .collect(),
            registers: links.registers.iter().map(|r| RefKey::of(net, *r)).collect(),
            release_points: links.release_points.iter().map(|r| RefKey::of(net, *r)).collect(),
            partial_release_points: links
                .partial_release_points
                .iter()
                .map(|r| RefKey::of(net, *r))
                .collect(),
            fallback_points: links.fallback_points.iter().map(|r| RefKey::of(net, *r)).collect(),
            start_descriptor,
            end_descriptor: end_signal.descriptor(),
            starts_at_signal: start_signal.is_some(),
        })
    }

    /// Row of the start signal and whether it is a replacement row. Routes to a helper main
    /// signal use the replacement matrix.
    fn aim_start_signal(
        &self,
        ctx: &mut SearchContext,
        aim: &Aim,
        at: ElementDir,
        signal: &Signal,
        end_signal: &Signal,
        speed: Speed,
    ) -> Option<(usize, bool)> {
        let replacement = select_replacement_row(signal, aim.track_type);
        let regular = select_row(signal, self.class.mask(), speed);
        let mut use_replacement = end_signal.helper;
        if use_replacement && replacement.is_none() {
            warn!(
                "{}: start signal has no replacement row for track type {:?}, using the regular matrix",
                aim.name, aim.track_type
            );
            use_replacement = false;
        } else if !use_replacement && regular.is_none() {
            warn!(
                "{}: start signal has no row for speed {}, using the replacement matrix",
                aim.name, speed
            );
            use_replacement = true;
        }

        if use_replacement {
            match replacement {
                Some(row) => Some((row, true)),
                None => {
                    warn!(
                        "{}: start signal has no replacement row for track type {:?}. The route is not generated.",
                        aim.name, aim.track_type
                    );
                    None
                }
            }
        } else {
            match (regular, self.net.signal_id(at)) {
                (Some(row), Some(id)) => Some((
                    ctx.catalog.indicator_row(id, signal, row, aim.track_type, aim.direction),
                    false,
                )),
                _ => {
                    warn!(
                        "{}: start signal has no row for speed {}. The route is not generated.",
                        aim.name, speed
                    );
                    None
                }
            }
        }
    }

    /// Afterglow signals inside a chain are switched dark.
    fn aim_afterglow_signal(
        &self,
        ctx: &mut SearchContext,
        aim: &Aim,
        at: NodeDir,
        links: &mut Links,
    ) {
        let net = self.net;
        let at = self.graph.element_dir(at);
        let (Some(signal), Some(id)) = (net.signal(at), net.signal_id(at)) else {
            return;
        };
        let Some(row) = signal.rows.iter().position(|r| r.speed == Speed::Dark) else {
            warn!("{}: {} has no dark row", aim.name, signal);
            return;
        };
        let Some(refpoint) = net.reference_point(at, RefKind::Signal) else {
            warn!(
                "Element {} has a signal but no signal reference point. The signal link is not set up.",
                net.describe(at)
            );
            return;
        };
        let extended = ctx.catalog.indicator_row(id, signal, row, aim.track_type, aim.direction);
        if extended != row {
            info!(
                "{}: afterglow {} at {} is aimed with direction or opposing track indicator",
                aim.name,
                signal,
                net.describe(at)
            );
        }
        links.signals.push((refpoint, extended, false));
    }

    /// Row for a signal linked with the route speed.
    fn aim_linked_signal(
        &self,
        ctx: &mut SearchContext,
        aim: &Aim,
        refpoint: RefId,
        speed: Speed,
    ) -> Option<usize> {
        let at = self.net.refpoint(refpoint).at;
        let (Some(signal), Some(id)) = (self.net.signal(at), self.net.signal_id(at)) else {
            warn!(
                "{}: reference point {} has no signal. The signal link is not set up.",
                aim.name,
                self.net.describe_ref(refpoint)
            );
            return None;
        };
        match select_row(signal, self.class.mask(), speed) {
            Some(row) => Some(ctx.catalog.indicator_row(id, signal, row, aim.track_type, aim.direction)),
            None => {
                warn!(
                    "{}: {} ({}) has no row for speed {}",
                    aim.name,
                    signal,
                    self.net.describe_ref(refpoint),
                    speed
                );
                None
            }
        }
    }

    fn aim_distant_signals(
        &self,
        ctx: &mut SearchContext,
        aim: &Aim,
        start: ElementDir,
        speed: Speed,
        links: &mut Links,
    ) {
        let net = self.net;
        let candidates = ctx.distant.distant_signals(net, &ctx.catalog, start, speed);
        for candidate in candidates {
            if links.distant_signals.iter().any(|(r, _)| *r == candidate.refpoint) {
                continue;
            }
            let at = net.refpoint(candidate.refpoint).at;
            let (Some(signal), Some(id)) = (net.signal(at), net.signal_id(at)) else {
                continue;
            };

            let mut column = None;
            if self.class == RouteClass::AdvanceControl {
                column = signal.columns.iter().position(|c| *c == Speed::Dark);
                if column.is_none() {
                    debug!(
                        "{}: {} has no dark column, choosing by speed {}",
                        aim.name, signal, candidate.speed
                    );
                }
            }
            let mut column = column.or_else(|| select_column(signal, candidate.speed));
            if !signal.direction_pre_indicators.is_empty() {
                column = Some(ctx.catalog.pre_indicator_column(
                    id,
                    signal,
                    column.unwrap_or(0),
                    aim.direction,
                ));
            }
            match column {
                Some(column) => links.distant_signals.push((candidate.refpoint, column)),
                None => warn!(
                    "{}: {} ({}) has no distant signal column for speed {}",
                    aim.name,
                    signal,
                    net.describe(at),
                    candidate.speed
                ),
            }
        }
    }
}
