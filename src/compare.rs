use crate::route::{RefKey, Route};
use log::*;
use std::collections::HashMap;

/// Stored lengths within this distance of any generated length variant are not reported.
const LENGTH_TOLERANCE: f64 = 1.0;

fn refs(list: &[RefKey]) -> Vec<String> {
    list.iter().map(|r| r.to_string()).collect()
}

/// Reports a differing list and returns whether it differs. Order is not significant.
fn diff_list(route: &str, what: &str, stored: Vec<String>, generated: Vec<String>) -> bool {
    let sorted = |mut v: Vec<String>| {
        v.sort();
        v
    };
    let (stored, generated) = (sorted(stored), sorted(generated));
    if stored == generated {
        return false;
    }
    info!(
        "{}: {} differ: stored [{}], generated [{}]",
        route,
        what,
        stored.join(", "),
        generated.join(", ")
    );
    true
}

fn diff_value<T: PartialEq + std::fmt::Display>(route: &str, what: &str, stored: T, generated: T) -> bool {
    if stored == generated {
        return false;
    }
    info!("{}: {} differs: stored {}, generated {}", route, what, stored, generated);
    true
}

/// Number of differences between a stored route and the generated route of the same name.
pub fn compare_route(stored: &Route, generated: &Route) -> usize {
    let name = stored.name.as_str();
    let mut differences = 0;

    let lengths = [
        generated.length,
        generated.length_legacy,
        generated.length_legacy_inclusive,
    ];
    if !lengths
        .iter()
        .any(|l| (l - stored.length).abs() <= LENGTH_TOLERANCE)
    {
        info!(
            "{}: length differs: stored {:.1} m, generated {}",
            name,
            stored.length,
            lengths.iter().map(|l| format!("{:.1} m", l)).collect::<Vec<_>>().join(" / ")
        );
        differences += 1;
    }

    differences += diff_value(
        name,
        "track type",
        format!("{:?}", stored.track_type),
        format!("{:?}", generated.track_type),
    ) as usize;
    differences += diff_value(name, "line name", &stored.line_name, &generated.line_name) as usize;
    differences += diff_value(name, "random value", stored.random_value, generated.random_value) as usize;
    differences += diff_value(name, "start", &stored.start, &generated.start) as usize;
    differences += diff_value(name, "end", &stored.end, &generated.end) as usize;

    let lists = [
        ("registers", refs(&stored.registers), refs(&generated.registers)),
        ("release points", refs(&stored.release_points), refs(&generated.release_points)),
        ("fallback points", refs(&stored.fallback_points), refs(&generated.fallback_points)),
        (
            "partial release points",
            refs(&stored.partial_release_points),
            refs(&generated.partial_release_points),
        ),
    ];
    for (what, s, g) in lists {
        differences += diff_list(name, what, s, g) as usize;
    }

    let switches = |r: &Route| {
        r.switches
            .iter()
            .map(|s| format!("{} position {}", s.refpoint, s.position))
            .collect::<Vec<_>>()
    };
    differences += diff_list(name, "switches", switches(stored), switches(generated)) as usize;

    let signals = |r: &Route| {
        r.signals
            .iter()
            .map(|s| format!("{} row {}{}", s.refpoint, s.row, if s.helper { " (helper)" } else { "" }))
            .collect::<Vec<_>>()
    };
    differences += diff_list(name, "signals", signals(stored), signals(generated)) as usize;

    let distant = |r: &Route| {
        r.distant_signals
            .iter()
            .map(|s| format!("{} column {}", s.refpoint, s.column))
            .collect::<Vec<_>>()
    };
    differences += diff_list(name, "distant signals", distant(stored), distant(generated)) as usize;

    differences
}

/// Compares generated routes with the routes stored in the module. Routes are matched by
/// class and name. Returns the number of differences found.
pub fn compare(stored: &[Route], generated: &[Route]) -> usize {
    let mut differences = 0;
    let by_key = stored
        .iter()
        .map(|r| ((r.class, r.name.as_str()), r))
        .collect::<HashMap<_, _>>();

    for g in generated {
        match by_key.get(&(g.class, g.name.as_str())) {
            Some(s) => differences += compare_route(s, g),
            None => {
                info!("{}: new {} route", g.name, g.class);
                differences += 1;
            }
        }
    }
    for s in stored {
        if !generated.iter().any(|g| g.class == s.class && g.name == s.name) {
            info!("{}: stored {} route is no longer generated", s.name, s.class);
            differences += 1;
        }
    }

    if differences == 0 {
        info!("No differences to the {} stored routes", stored.len());
    }
    differences
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{RouteSignal, RouteSwitch};
    use crate::signal::{RouteClass, TrackType};

    fn key(nr: u32) -> RefKey {
        RefKey {
            module: "A".to_string(),
            nr,
        }
    }

    fn route(name: &str) -> Route {
        Route {
            name: name.to_string(),
            class: RouteClass::Train,
            track_type: TrackType::Station,
            line_name: String::new(),
            random_value: 0.0,
            length: 120.0,
            length_legacy: 110.0,
            length_legacy_inclusive: 150.0,
            start: key(1),
            end: key(2),
            switches: vec![
                RouteSwitch {
                    refpoint: key(20),
                    position: 1,
                },
                RouteSwitch {
                    refpoint: key(21),
                    position: 2,
                },
            ],
            signals: vec![RouteSignal {
                refpoint: key(1),
                row: 2,
                helper: false,
            }],
            distant_signals: vec![],
            registers: vec![key(30)],
            release_points: vec![key(40)],
            partial_release_points: vec![],
            fallback_points: vec![],
            start_descriptor: String::new(),
            end_descriptor: String::new(),
            starts_at_signal: true,
        }
    }

    #[test]
    fn identical_routes() {
        let routes = vec![route("S 1 -> S 2")];
        assert_eq!(compare(&routes, &routes), 0);
    }

    #[test]
    fn length_tolerance_covers_all_variants() {
        let generated = route("S 1 -> S 2");
        let mut stored = route("S 1 -> S 2");
        stored.length = 150.6;
        assert_eq!(compare_route(&stored, &generated), 0);
        stored.length = 130.0;
        assert_eq!(compare_route(&stored, &generated), 1);
    }

    #[test]
    fn list_order_is_not_significant() {
        let generated = route("S 1 -> S 2");
        let mut stored = route("S 1 -> S 2");
        stored.switches.reverse();
        assert_eq!(compare_route(&stored, &generated), 0);

        stored.switches[0].position = 1;
        stored.signals[0].helper = true;
        stored.registers.clear();
        assert_eq!(compare_route(&stored, &generated), 3);
    }

    #[test]
    fn unmatched_routes() {
        let stored = vec![route("S 1 -> S 2"), route("S 1 -> S 3")];
        let mut shunting = route("S 1 -> S 2");
        shunting.class = RouteClass::Shunting;
        let generated = vec![route("S 1 -> S 2"), shunting];
        assert_eq!(compare(&stored, &generated), 2);
    }
}
