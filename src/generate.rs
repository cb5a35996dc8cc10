use crate::aiming::SignalCatalog;
use crate::conditions::ConditionFilter;
use crate::network::{Dir, ElementDir, ModuleId, Network, RefKind};
use crate::route::Route;
use crate::search::{RouteSearch, SearchContext};
use crate::signal::RouteClass;
use log::*;
use std::collections::HashMap;

/// Options of one generation run.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub classes: Vec<RouteClass>,
    /// Keep every path to a target signal instead of the first one found.
    pub alternative_paths: bool,
    pub flank_protection: bool,
    /// Number routes that share start and end signal.
    pub numbering: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            classes: vec![RouteClass::Train],
            alternative_paths: false,
            flank_protection: false,
            numbering: false,
        }
    }
}

pub struct Generated {
    pub routes: Vec<Route>,
    /// Matrix rows and columns that have to be added to signals for the routes.
    pub catalog: SignalCatalog,
}

fn is_start(net: &Network, class: RouteClass, at: ElementDir) -> bool {
    if class.starts_at_entry_points() && net.reference_point(at, RefKind::EntryPoint).is_some() {
        return true;
    }
    match net.signal(at) {
        Some(signal) if signal.is_route_start_for(class.mask()) => {
            if net.reference_point(at, RefKind::Signal).is_some() {
                true
            } else {
                warn!(
                    "Element {} has a signal but no signal reference point. No {} routes are generated from {}.",
                    net.describe(at),
                    class,
                    signal
                );
                false
            }
        }
        _ => false,
    }
}

/// Routes of the requested classes starting in the given module, in discovery order.
pub fn generate(
    net: &Network,
    module: ModuleId,
    config: &GeneratorConfig,
    conditions: &dyn ConditionFilter,
) -> Generated {
    let _h = hprof::enter("generate");
    let mut ctx = SearchContext::new(config.flank_protection);
    let mut routes = Vec::new();

    for class in config.classes.iter().copied() {
        let _h = hprof::enter("search");
        let mut search = RouteSearch::new(net, class, config, conditions);
        let before = routes.len();
        for element in net.modules[module].elements.iter().copied() {
            for dir in Dir::both() {
                let at = ElementDir::new(element, dir);
                if is_start(net, class, at) {
                    routes.extend(search.routes_from(&mut ctx, at));
                }
            }
        }
        info!(
            "{} {} routes in module {}",
            routes.len() - before,
            search.class(),
            net.modules[module].name
        );
    }

    if config.numbering {
        number_routes(&mut routes);
    }

    let deleted = &net.modules[module].deleted_routes;
    routes.retain(|r| {
        if deleted.contains(&r.name) {
            info!("Route {} is on the deletion list", r.name);
            false
        } else {
            true
        }
    });

    Generated {
        routes,
        catalog: ctx.catalog,
    }
}

/// Appends " (1)", " (2)", ... to the names of signal-started routes of a class that share
/// start and end.
pub fn number_routes(routes: &mut [Route]) {
    let mut counts = HashMap::new();
    for r in routes.iter().filter(|r| r.starts_at_signal) {
        *counts.entry((r.class, r.start.clone(), r.end.clone())).or_insert(0) += 1;
    }
    let mut next = HashMap::new();
    for r in routes.iter_mut().filter(|r| r.starts_at_signal) {
        let key = (r.class, r.start.clone(), r.end.clone());
        if counts.get(&key).copied().unwrap_or(0) > 1 {
            let n = next.entry(key).or_insert(0);
            *n += 1;
            r.name = format!("{} ({})", r.name, n);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::NoConditions;
    use crate::testnet::*;

    const TRAIN: u8 = 4;
    const SHUNTING: u8 = 2;

    /// Signals in both directions on a short line with an entry point at each end.
    fn line() -> Network {
        let mut m = ModuleBuilder::new("A");
        m.line(&[1, 2, 3, 4], 50.0);
        m.at(2)
            .signal(Dir::Forward, main_signal("2", TRAIN | SHUNTING, &[60.0]))
            .signal(Dir::Backward, main_signal("2R", TRAIN, &[60.0]));
        m.at(3)
            .signal(Dir::Forward, main_signal("3", TRAIN | SHUNTING, &[60.0]))
            .signal(Dir::Backward, main_signal("3R", TRAIN, &[60.0]));
        m.refpoint(1, 1, Dir::Forward, RefKind::EntryPoint)
            .refpoint(2, 2, Dir::Forward, RefKind::Signal)
            .refpoint(3, 3, Dir::Forward, RefKind::Signal)
            .refpoint(12, 2, Dir::Backward, RefKind::Signal)
            .refpoint(13, 3, Dir::Backward, RefKind::Signal)
            .refpoint(4, 4, Dir::Backward, RefKind::EntryPoint);
        m.deleted_route("S 3R -> S 2R");
        build(vec![m])
    }

    fn names(generated: &Generated) -> Vec<&str> {
        generated.routes.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn both_directions_with_deletion_list() {
        let net = line();
        let generated = generate(&net, 0, &GeneratorConfig::default(), &NoConditions);
        assert_eq!(
            names(&generated),
            vec!["Aufgleispunkt -> S 2", "S 2 -> S 3", "Aufgleispunkt -> S 3R"]
        );
    }

    #[test]
    fn classes_in_requested_order() {
        let net = line();
        let config = GeneratorConfig {
            classes: vec![RouteClass::Shunting, RouteClass::Train],
            ..Default::default()
        };
        let generated = generate(&net, 0, &config, &NoConditions);
        let classes = generated.routes.iter().map(|r| r.class).collect::<Vec<_>>();
        assert_eq!(
            classes,
            vec![
                RouteClass::Shunting,
                RouteClass::Shunting,
                RouteClass::Train,
                RouteClass::Train,
                RouteClass::Train
            ]
        );
        assert_eq!(names(&generated)[..2], ["Aufgleispunkt -> S 2", "S 2 -> S 3"]);
    }

    #[test]
    fn numbering_of_parallel_routes() {
        let mut m = ModuleBuilder::new("A");
        for nr in 1..=7 {
            m.element(nr, 10.0);
        }
        m.link(1, 2).link(2, 3).link(2, 5).link(3, 4).link(5, 6).link(6, 4).link(4, 7);
        m.at(1).signal(Dir::Forward, main_signal("1", TRAIN, &[80.0]));
        m.at(7).signal(Dir::Forward, main_signal("7", TRAIN, &[80.0]));
        m.refpoint(1, 1, Dir::Forward, RefKind::Signal)
            .refpoint(7, 7, Dir::Forward, RefKind::Signal)
            .refpoint(20, 2, Dir::Forward, RefKind::Switch)
            .refpoint(40, 4, Dir::Backward, RefKind::Switch);
        m.deleted_route("S 1 -> S 7 (2)");
        let net = build(vec![m]);

        let config = GeneratorConfig {
            alternative_paths: true,
            numbering: true,
            ..Default::default()
        };
        let generated = generate(&net, 0, &config, &NoConditions);
        assert_eq!(names(&generated), vec!["S 1 -> S 7 (1)"]);

        let config = GeneratorConfig {
            alternative_paths: true,
            ..Default::default()
        };
        let generated = generate(&net, 0, &config, &NoConditions);
        assert_eq!(names(&generated), vec!["S 1 -> S 7", "S 1 -> S 7"]);
    }
}
