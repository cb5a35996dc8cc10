use crate::aiming::SignalCatalog;
use crate::network::{ModuleId, Network, RefKind};
use crate::route::{RefKey, Route};
use crate::signal::RouteClass;
use serde_json::json;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Chunk {
    Number(u64),
    Text(String),
}

/// Sort key comparing digit runs by value, so that "S 9" sorts before "S 10".
fn natural_key(s: &str) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut rest = s;
    while let Some(c) = rest.chars().next() {
        let is_digit = c.is_ascii_digit();
        let end = rest
            .find(|ch: char| ch.is_ascii_digit() != is_digit)
            .unwrap_or(rest.len());
        let (chunk, tail) = rest.split_at(end);
        chunks.push(match chunk.parse() {
            Ok(n) if is_digit => Chunk::Number(n),
            _ => Chunk::Text(chunk.to_lowercase()),
        });
        rest = tail;
    }
    chunks
}

fn compare_routes(a: &Route, b: &Route) -> Ordering {
    let key = |r: &Route| {
        let descriptor = if r.starts_at_signal {
            &r.start_descriptor
        } else {
            &r.end_descriptor
        };
        (r.class, r.starts_at_signal, natural_key(descriptor))
    };
    key(a).cmp(&key(b))
}

/// Output order per class: entry-point routes by end signal, then the others by start
/// signal. Routes with equal keys keep their discovery order.
pub fn sort_routes(routes: &mut [Route]) {
    routes.sort_by(compare_routes);
}

fn signal_ref(net: &Network, id: usize) -> serde_json::Value {
    let at = net.signal_location(id);
    match net.reference_point(at, RefKind::Signal) {
        Some(r) => json!(RefKey::of(net, r)),
        None => json!(net.signal_by_id(id).descriptor()),
    }
}

fn routes_json(net: &Network, module: ModuleId, routes: &[Route], catalog: &SignalCatalog) -> serde_json::Value {
    let signals = catalog
        .extensions()
        .iter()
        .map(|(id, ext)| {
            json!({
                "signal": signal_ref(net, *id),
                "rows": ext.rows,
                "columns": ext.columns,
            })
        })
        .collect::<Vec<_>>();
    json!({
        "module": net.modules[module].name,
        "routes": routes,
        "signal_extensions": signals,
    })
}

pub fn write_routes_json(
    filename: &Path,
    net: &Network,
    module: ModuleId,
    routes: &[Route],
    catalog: &SignalCatalog,
) -> std::io::Result<()> {
    std::fs::write(
        filename,
        serde_json::to_string_pretty(&routes_json(net, module, routes, catalog))?,
    )?;
    Ok(())
}

/// One line per route.
pub fn print_routes(routes: &[Route]) -> String {
    let mut summary = String::new();
    for r in routes {
        summary.push_str(&format!(
            "{} [{}] {:.1} m, {} switches, {} signals, {} distant signals\n",
            r.name,
            r.class,
            r.length,
            r.switches.len(),
            r.signals.len(),
            r.distant_signals.len()
        ));
    }
    summary
}

#[derive(Debug, PartialEq)]
pub struct Stats {
    pub modules: usize,
    pub elements: usize,
    pub refpoints: usize,
    pub routes: BTreeMap<RouteClass, usize>,
}

pub fn stats(net: &Network, routes: &[Route]) -> Stats {
    let mut per_class = BTreeMap::new();
    for r in routes {
        *per_class.entry(r.class).or_insert(0) += 1;
    }
    Stats {
        modules: net.modules.len(),
        elements: net.num_elements(),
        refpoints: net.num_refpoints(),
        routes: per_class,
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Modules: {}", self.modules)?;
        writeln!(f, "Elements: {}", self.elements)?;
        writeln!(f, "Reference points: {}", self.refpoints)?;
        for (class, n) in self.routes.iter() {
            writeln!(f, "{} routes: {}", class, n)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(class: RouteClass, start: &str, end: &str) -> Route {
        let key = |nr| RefKey {
            module: "A".to_string(),
            nr,
        };
        Route {
            name: format!("{} -> {}", start, end),
            class,
            track_type: Default::default(),
            line_name: String::new(),
            random_value: 0.0,
            length: 100.0,
            length_legacy: 100.0,
            length_legacy_inclusive: 100.0,
            start: key(1),
            end: key(2),
            switches: vec![],
            signals: vec![],
            distant_signals: vec![],
            registers: vec![],
            release_points: vec![],
            partial_release_points: vec![],
            fallback_points: vec![],
            start_descriptor: start.to_string(),
            end_descriptor: end.to_string(),
            starts_at_signal: start != "Aufgleispunkt",
        }
    }

    #[test]
    fn natural_order() {
        assert!(natural_key("S 9") < natural_key("S 10"));
        assert!(natural_key("A 10") < natural_key("b 2"));
        assert_eq!(natural_key("N12a"), natural_key("n12A"));
    }

    #[test]
    fn entry_point_routes_first() {
        let mut routes = vec![
            route(RouteClass::Train, "S 10", "S 12"),
            route(RouteClass::Train, "S 9", "S 10"),
            route(RouteClass::Train, "Aufgleispunkt", "S 9"),
            route(RouteClass::Shunting, "S 10", "S 11"),
            route(RouteClass::Train, "S 9", "S 11"),
            route(RouteClass::Train, "Aufgleispunkt", "S 1"),
        ];
        sort_routes(&mut routes);
        let names = routes.iter().map(|r| r.name.as_str()).collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![
                "S 10 -> S 11",
                "Aufgleispunkt -> S 1",
                "Aufgleispunkt -> S 9",
                "S 9 -> S 10",
                "S 9 -> S 11",
                "S 10 -> S 12",
            ]
        );
    }

    #[test]
    fn json_contains_routes_and_extensions() {
        use crate::network::Dir;
        use crate::testnet::*;

        let mut m = ModuleBuilder::new("A");
        let mut signal = main_signal("1", 4, &[60.0]);
        signal.opposing_track_frames = 1 << 8;
        m.element(1, 10.0).signal(Dir::Forward, signal);
        m.refpoint(1, 1, Dir::Forward, RefKind::Signal);
        let net = build(vec![m]);

        let at = crate::network::ElementDir::new(element(&net, "A", 1), Dir::Forward);
        let id = net.signal_id(at).unwrap();
        let mut catalog = SignalCatalog::new();
        catalog.indicator_row(id, net.signal_by_id(id), 1, crate::signal::TrackType::Opposing, "");

        let value = routes_json(&net, 0, &[route(RouteClass::Train, "S 1", "S 2")], &catalog);
        assert_eq!(value["module"], "A");
        assert_eq!(value["routes"][0]["name"], "S 1 -> S 2");
        assert_eq!(value["routes"][0]["class"], "train");
        assert_eq!(value["routes"][0]["start"]["nr"], 1);
        assert!(value["routes"][0].get("start_descriptor").is_none());
        assert_eq!(value["signal_extensions"][0]["signal"]["nr"], 1);
        assert_eq!(value["signal_extensions"][0]["rows"][0]["source"], 1);
        assert_eq!(value["signal_extensions"][0]["rows"][0]["frames"], 1 << 8);
    }
}
