use crate::aiming::{select_column, select_row, SignalCatalog};
use crate::graph::{NodeDir, NodeKind, TrackGraph};
use crate::network::{Dir, ElementDir, ElementId, Event, Network, RefId, RefKind};
use crate::signal::*;
use log::*;
use std::collections::HashMap;

/// Column a combined main and distant signal shows when the next main signal shows `speed`.
fn aimed_column(signal: &Signal, speed: Speed) -> usize {
    if signal.is_distant() {
        select_column(signal, speed).unwrap_or(0)
    } else {
        0
    }
}

fn is_train_signal(signal: &Signal) -> bool {
    let train = RouteClass::Train.mask();
    signal.is_main_for(train) || signal.is_route_start_for(train)
}

/// Distant graph nodes besides switches: main and start signals of train routes.
pub struct DistantNodes;

impl NodeKind for DistantNodes {
    fn is_node(&self, net: &Network, element: ElementId) -> bool {
        Dir::both()
            .iter()
            .any(|&dir| net.signal(ElementDir::new(element, dir)).map_or(false, is_train_signal))
    }
}

/// Run of elements leading up to a node, walked backwards from the node.
#[derive(Debug, Clone)]
struct DistantEdge {
    /// The node this run starts at in travel direction.
    target: Option<NodeDir>,
    distant_signals: Vec<RefId>,
    /// Distant signals further back are not linked.
    blocked: bool,
    /// Minimum signal speed since the last end of a switch area.
    speed: Speed,
    ends_switch_area: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistantCandidate {
    pub refpoint: RefId,
    /// Speed announced at the next main signal.
    pub speed: Speed,
}

pub struct DistantGraph {
    graph: TrackGraph<DistantNodes>,
    edges: Vec<DistantEdge>,
    edges_before: HashMap<NodeDir, Vec<usize>>,
}

impl DistantGraph {
    pub fn new() -> Self {
        DistantGraph {
            graph: TrackGraph::new(DistantNodes),
            edges: Vec::new(),
            edges_before: HashMap::new(),
        }
    }

    fn edges_before(&mut self, net: &Network, at: NodeDir) -> Vec<usize> {
        if let Some(edges) = self.edges_before.get(&at) {
            return edges.clone();
        }
        let start = self.graph.element_dir(at);
        debug!("Searching distant signal edges before {}", net.describe(start));
        // "No distant link before" in the node element itself has no effect.
        let mut ids = Vec::new();
        for prev in net.predecessors(start).into_iter().flatten() {
            let edge = self.walk(net, prev);
            ids.push(self.edges.len());
            self.edges.push(edge);
        }
        self.edges_before.insert(at, ids.clone());
        ids
    }

    fn walk(&mut self, net: &Network, first: ElementDir) -> DistantEdge {
        let mut edge = DistantEdge {
            target: None,
            distant_signals: Vec::new(),
            blocked: false,
            speed: Speed::Unlimited,
            ends_switch_area: false,
        };
        let mut cur = Some(first);
        while let Some(at) = cur {
            if let Some(signal) = net.signal(at) {
                if signal.is_distant() || !signal.direction_pre_indicators.is_empty() {
                    match net.reference_point(at, RefKind::Signal) {
                        Some(r) => edge.distant_signals.push(r),
                        None => warn!(
                            "Element {} has a distant signal but no signal reference point. The distant signal link is not set up.",
                            net.describe(at)
                        ),
                    }
                }
            }

            let events = net.events(at);
            if events.contains(&Event::EndOfSwitchArea) {
                edge.ends_switch_area = true;
                edge.speed = Speed::Unlimited;
            }
            for ev in events {
                match ev {
                    Event::NoDistantLinkBefore | Event::NoTrainRoute => {
                        edge.blocked = true;
                        break;
                    }
                    Event::SignalSpeed(s) => edge.speed = edge.speed.restrict(*s),
                    _ => {}
                }
            }

            if let Some(node) = self.graph.get_node(net, at.element) {
                edge.target = Some(NodeDir { node, dir: at.dir });
                // Distant signals before a regular main signal announce that signal.
                if net.signal(at).map_or(false, |s| {
                    is_train_signal(s)
                        && !s.has_flag(FLAG_AFTERGLOW_SUCCESSOR | FLAG_AFTERGLOW_PREDECESSOR | FLAG_HIGH_SIGNALING)
                }) {
                    edge.blocked = true;
                }
                break;
            }
            if edge.blocked {
                break;
            }
            cur = net.predecessors(at).first().copied().flatten();
        }
        edge
    }

    /// Distant signals announcing the signal at `start` when it shows `speed`, in the order
    /// they were found walking backwards. Each distant signal appears once.
    pub fn distant_signals(
        &mut self,
        net: &Network,
        catalog: &SignalCatalog,
        start: ElementDir,
        speed: Speed,
    ) -> Vec<DistantCandidate> {
        let Some(node) = self.graph.get_node(net, start.element) else {
            return Vec::new();
        };
        debug!("Searching distant signals for {} at {}", net.describe(start), speed);
        self.graph.reset_visited();
        self.graph.mark_visited(node);
        let mut result = Vec::new();
        self.collect(
            net,
            catalog,
            NodeDir { node, dir: start.dir },
            speed,
            Speed::Unlimited,
            &mut result,
        );
        result
    }

    fn collect(
        &mut self,
        net: &Network,
        catalog: &SignalCatalog,
        at: NodeDir,
        speed: Speed,
        approach: Speed,
        result: &mut Vec<DistantCandidate>,
    ) {
        for id in self.edges_before(net, at) {
            let edge = self.edges[id].clone();
            for refpoint in edge.distant_signals.iter().copied() {
                if !result.iter().any(|c| c.refpoint == refpoint) {
                    trace!("Distant signal {} announces {}", net.describe_ref(refpoint), speed);
                    result.push(DistantCandidate { refpoint, speed });
                }
            }
            if edge.blocked {
                continue;
            }
            let Some(target) = edge.target else {
                continue;
            };
            if self.graph.is_visited(target.node) {
                continue;
            }
            self.graph.mark_visited(target.node);

            let approach = if edge.ends_switch_area {
                edge.speed
            } else {
                approach.restrict(edge.speed)
            };
            let target_at = self.graph.element_dir(target);
            let high_signaling = net
                .signal(target_at)
                .filter(|s| is_train_signal(s) && s.has_flag(FLAG_HIGH_SIGNALING));
            match (high_signaling, net.signal_id(target_at)) {
                (Some(signal), Some(signal_id)) => {
                    // The signal shows `go` while the route is set and `stop` while the start
                    // signal of the route is at stop.
                    let train = RouteClass::Train.mask();
                    let Some(go) = select_row(signal, train, approach.restrict(speed)) else {
                        debug!("{}: no row for approach speed {}", signal, approach);
                        continue;
                    };
                    let stop = select_row(signal, train, approach.restrict(Speed::Stop));
                    let go_cell = catalog.cell(signal_id, signal, go, aimed_column(signal, speed));
                    let stop_cell = stop
                        .map(|row| catalog.cell(signal_id, signal, row, aimed_column(signal, Speed::Stop)));
                    if stop_cell == Some(go_cell) {
                        debug!(
                            "{} shows the same aspect regardless of the route, not searching further",
                            signal
                        );
                        continue;
                    }
                    self.collect(net, catalog, target, go_cell.speed, approach, result);
                }
                _ => self.collect(net, catalog, target, speed, approach, result),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testnet::*;

    const TRAIN: u8 = 4;

    fn start(net: &Network, nr: u32) -> ElementDir {
        ElementDir::new(element(net, "A", nr), Dir::Forward)
    }

    #[test]
    fn collects_up_to_previous_main_signal() {
        let mut m = ModuleBuilder::new("A");
        m.line(&[1, 2, 3, 4, 5, 6], 100.0);
        m.at(1).signal(Dir::Forward, distant_signal("V1", &[0.0, 40.0, -1.0]));
        m.at(2).signal(Dir::Forward, main_signal("2", TRAIN, &[80.0]));
        m.at(4).signal(Dir::Forward, distant_signal("V6", &[0.0, 40.0, -1.0]));
        m.at(6).signal(Dir::Forward, main_signal("6", TRAIN, &[40.0, 80.0]));
        m.refpoint(1, 1, Dir::Forward, RefKind::Signal)
            .refpoint(4, 4, Dir::Forward, RefKind::Signal);
        let net = build(vec![m]);

        let mut g = DistantGraph::new();
        let catalog = SignalCatalog::new();
        assert_eq!(
            g.distant_signals(&net, &catalog, start(&net, 6), Speed::Kmh(40.0)),
            vec![DistantCandidate {
                refpoint: refpoint(&net, "A", 4),
                speed: Speed::Kmh(40.0)
            }]
        );
    }

    #[test]
    fn no_distant_link_before_marker() {
        let mut m = ModuleBuilder::new("A");
        m.line(&[1, 2, 3, 4], 100.0);
        m.at(1).signal(Dir::Forward, distant_signal("V4", &[0.0, -1.0]));
        m.at(2).event(Dir::Forward, 20, 0.0, "");
        m.at(4).signal(Dir::Forward, main_signal("4", TRAIN, &[]));
        m.refpoint(1, 1, Dir::Forward, RefKind::Signal);
        let net = build(vec![m]);

        let mut g = DistantGraph::new();
        assert!(g
            .distant_signals(&net, &SignalCatalog::new(), start(&net, 4), Speed::Unlimited)
            .is_empty());
    }

    fn high_signaling_net() -> Network {
        let mut high = main_signal("2", TRAIN, &[40.0, 80.0]);
        high.flags = FLAG_HIGH_SIGNALING;
        high_signaling_net_with(high)
    }

    fn high_signaling_net_with(high: crate::raw_network::Signal) -> Network {
        let mut m = ModuleBuilder::new("A");
        m.line(&[1, 2, 3, 4], 100.0);
        m.at(1).signal(Dir::Forward, distant_signal("V2", &[0.0, 40.0, 80.0]));
        m.at(2).signal(Dir::Forward, high);
        m.at(4).signal(Dir::Forward, main_signal("4", TRAIN, &[40.0, 80.0]));
        m.refpoint(1, 1, Dir::Forward, RefKind::Signal);
        build(vec![m])
    }

    #[test]
    fn high_signaling_propagates_speed() {
        let net = high_signaling_net();
        let mut g = DistantGraph::new();
        assert_eq!(
            g.distant_signals(&net, &SignalCatalog::new(), start(&net, 4), Speed::Kmh(40.0)),
            vec![DistantCandidate {
                refpoint: refpoint(&net, "A", 1),
                speed: Speed::Kmh(40.0)
            }]
        );
    }

    #[test]
    fn high_signaling_unlimited_route_links_upstream() {
        let net = high_signaling_net();
        let mut g = DistantGraph::new();
        assert_eq!(
            g.distant_signals(&net, &SignalCatalog::new(), start(&net, 4), Speed::Unlimited),
            vec![DistantCandidate {
                refpoint: refpoint(&net, "A", 1),
                speed: Speed::Kmh(80.0)
            }]
        );
    }

    #[test]
    fn high_signaling_same_aspect_is_pruned() {
        // Every row shows the same frames at stop: the start signal has no influence.
        let mut high = main_signal("2", TRAIN, &[40.0, 80.0]);
        high.flags = FLAG_HIGH_SIGNALING;
        high.cells = vec![
            crate::raw_network::MatrixCell {
                frames: 1,
                speed: Some(0.0),
            };
            3
        ];
        let net = high_signaling_net_with(high);
        let mut g = DistantGraph::new();
        assert!(g
            .distant_signals(&net, &SignalCatalog::new(), start(&net, 4), Speed::Unlimited)
            .is_empty());
        assert!(g
            .distant_signals(&net, &SignalCatalog::new(), start(&net, 4), Speed::Kmh(40.0))
            .is_empty());
    }
}
