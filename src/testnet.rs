//! Small networks assembled in code for unit tests.

use crate::network::{self, Dir, ElementId, Network, RefId};
use crate::raw_network::{self, Direction, Link, RefKind};
use crate::route::Route;

pub struct ModuleBuilder {
    module: raw_network::Module,
}

pub struct ElementBuilder<'a> {
    element: &'a mut raw_network::Element,
}

fn raw_dir(dir: Dir) -> Direction {
    match dir {
        Dir::Forward => Direction::Forward,
        Dir::Backward => Direction::Backward,
    }
}

impl ModuleBuilder {
    pub fn new(name: &str) -> Self {
        ModuleBuilder {
            module: raw_network::Module {
                name: name.to_string(),
                ..Default::default()
            },
        }
    }

    pub fn element(&mut self, nr: u32, length: f64) -> ElementBuilder<'_> {
        self.module.elements.push(raw_network::Element {
            nr,
            length,
            ..Default::default()
        });
        ElementBuilder {
            element: self.module.elements.last_mut().unwrap(),
        }
    }

    /// Access to an element that was added before.
    pub fn at(&mut self, nr: u32) -> ElementBuilder<'_> {
        ElementBuilder {
            element: self
                .module
                .elements
                .iter_mut()
                .find(|e| e.nr == nr)
                .unwrap(),
        }
    }

    /// Connects `from` forward to `to` forward (and `to` backward to `from` backward).
    pub fn link(&mut self, from: u32, to: u32) -> &mut Self {
        self.at(from).next(Dir::Forward, to, false);
        self.at(to).next(Dir::Backward, from, false);
        self
    }

    /// Elements `nrs` connected one after the other in forward direction.
    pub fn line(&mut self, nrs: &[u32], length: f64) -> &mut Self {
        for nr in nrs {
            self.element(*nr, length);
        }
        for pair in nrs.windows(2) {
            self.link(pair[0], pair[1]);
        }
        self
    }

    pub fn refpoint(&mut self, nr: u32, element: u32, dir: Dir, kind: RefKind) -> &mut Self {
        self.module.reference_points.push(raw_network::ReferencePoint {
            nr,
            element,
            direction: raw_dir(dir),
            kind,
        });
        self
    }

    pub fn deleted_route(&mut self, name: &str) -> &mut Self {
        self.module.deleted_routes.push(name.to_string());
        self
    }

    pub fn stored_route(&mut self, route: Route) -> &mut Self {
        self.module.routes.push(route);
        self
    }
}

impl<'a> ElementBuilder<'a> {
    fn dir(&mut self, dir: Dir) -> &mut raw_network::ElementDirection {
        match dir {
            Dir::Forward => &mut self.element.forward,
            Dir::Backward => &mut self.element.backward,
        }
    }

    pub fn next(mut self, dir: Dir, element: u32, reversed: bool) -> Self {
        self.dir(dir).next.push(Link::Local { element, reversed });
        self
    }

    pub fn next_module(mut self, dir: Dir, module: &str, refpoint: u32) -> Self {
        self.dir(dir).next.push(Link::Module {
            module: module.to_string(),
            refpoint,
        });
        self
    }

    pub fn event(mut self, dir: Dir, kind: u32, value: f64, text: &str) -> Self {
        self.dir(dir).events.push(raw_network::Event {
            kind,
            value,
            text: text.to_string(),
        });
        self
    }

    pub fn signal(mut self, dir: Dir, signal: raw_network::Signal) -> Self {
        self.dir(dir).signal = Some(signal);
        self
    }

    pub fn register(mut self, dir: Dir, nr: u32) -> Self {
        self.dir(dir).register = nr;
        self
    }
}

/// A main signal with a stop row and one proceed row per speed, all for `classes`.
pub fn main_signal(name: &str, classes: u8, speeds: &[f64]) -> raw_network::Signal {
    let mut rows = vec![raw_network::SignalRow { speed: 0.0, classes }];
    rows.extend(
        speeds
            .iter()
            .map(|s| raw_network::SignalRow { speed: *s, classes }),
    );
    raw_network::Signal {
        station: "S".to_string(),
        name: name.to_string(),
        rows,
        ..Default::default()
    }
}

/// A distant signal with the given column speeds. Column cells carry one frame bit each.
pub fn distant_signal(name: &str, columns: &[f64]) -> raw_network::Signal {
    raw_network::Signal {
        station: "S".to_string(),
        name: name.to_string(),
        rows: vec![raw_network::SignalRow {
            speed: -1.0,
            classes: 0,
        }],
        columns: columns.to_vec(),
        cells: (0..columns.len())
            .map(|c| raw_network::MatrixCell {
                frames: 1 << c,
                speed: Some(columns[c]),
            })
            .collect(),
        ..Default::default()
    }
}

pub fn raw(modules: Vec<ModuleBuilder>) -> raw_network::Network {
    raw_network::Network {
        modules: modules.into_iter().map(|m| m.module).collect(),
    }
}

pub fn build(modules: Vec<ModuleBuilder>) -> Network {
    network::convert(raw(modules)).unwrap()
}

pub fn element(net: &Network, module: &str, nr: u32) -> ElementId {
    let m = net.module_by_name(module).unwrap();
    *net.modules[m]
        .elements
        .iter()
        .find(|e| net.element(**e).nr == nr)
        .unwrap()
}

pub fn refpoint(net: &Network, module: &str, nr: u32) -> RefId {
    net.refpoint_by_nr(net.module_by_name(module).unwrap(), nr)
        .unwrap()
}
