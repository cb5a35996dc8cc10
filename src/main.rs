use log::*;

mod aiming;
mod compare;
mod conditions;
mod distant;
mod flank;
mod generate;
mod graph;
mod network;
mod output;
mod raw_network;
mod route;
mod route_graph;
mod search;
mod signal;
#[cfg(test)]
mod testnet;

use conditions::{ConditionFilter, Conditions, NoConditions};
use generate::GeneratorConfig;
use network::NetworkError;
use signal::RouteClass;
use std::path::PathBuf;
use std::str::FromStr;
use structopt::StructOpt;

#[derive(Debug)]
pub enum Mode {
    Write,
    Compare,
    Stats,
}

impl FromStr for Mode {
    type Err = &'static str;
    fn from_str(mode: &str) -> Result<Self, Self::Err> {
        match mode {
            "write" => Ok(Mode::Write),
            "compare" => Ok(Mode::Compare),
            "stats" => Ok(Mode::Stats),
            _ => Err("Could not parse mode."),
        }
    }
}

#[derive(Debug, StructOpt)]
#[structopt(name = "routegen", about = "Interlocking route generator.")]
struct Opt {
    /// Network description (JSON)
    #[structopt(name = "FILE")]
    #[structopt(parse(from_os_str))]
    file: PathBuf,

    /// Module to generate routes for. Defaults to the first module in the file.
    #[structopt(long)]
    module: Option<String>,

    /// Comma-separated route classes: shunting, train, display, advance
    #[structopt(long, default_value = "train", use_delimiter = true)]
    classes: Vec<RouteClass>,

    /// Keep every path to a target signal, not only the first one found.
    #[structopt(long)]
    alternative_paths: bool,

    /// Add flank protection switch settings to train routes.
    #[structopt(long)]
    flank_protection: bool,

    /// Number routes with the same start and end signal.
    #[structopt(long)]
    numbering: bool,

    /// Switch conditions for routes with several possible paths (JSON)
    #[structopt(long)]
    #[structopt(parse(from_os_str))]
    conditions: Option<PathBuf>,

    /// "write" outputs the generated routes, "compare" reports differences to the routes
    /// stored in the module, "stats" prints network and route counts.
    #[structopt(long, default_value = "write")]
    mode: Mode,

    /// Write routes JSON to this file.
    #[structopt(short)]
    #[structopt(parse(from_os_str))]
    output: Option<PathBuf>,

    /// Activate debug mode
    #[structopt(short, long)]
    verbose: bool,

    /// Debug log output also in release builds.
    #[structopt(long)]
    debug: bool,

    /// Print timing of the phases.
    #[structopt(long)]
    profile: bool,
}

fn run(opt: &Opt) -> Result<i32, NetworkError> {
    let net = {
        let _h = hprof::enter("load");
        trace!("Loading file {}", opt.file.display());
        network::load(&opt.file)?
    };

    let module = match &opt.module {
        Some(name) => net
            .module_by_name(name)
            .ok_or_else(|| NetworkError::ModuleNotFound(name.clone()))?,
        None => 0,
    };

    let conditions: Box<dyn ConditionFilter> = match &opt.conditions {
        Some(path) => Box::new(Conditions::load(path)?),
        None => Box::new(NoConditions),
    };

    let config = GeneratorConfig {
        classes: opt.classes.clone(),
        alternative_paths: opt.alternative_paths,
        flank_protection: opt.flank_protection,
        numbering: opt.numbering,
    };
    info!("{:#?}", config);

    let mut generated = generate::generate(&net, module, &config, conditions.as_ref());
    output::sort_routes(&mut generated.routes);

    let _h = hprof::enter("output");
    match opt.mode {
        Mode::Write => {
            print!("{}", output::print_routes(&generated.routes));
            if let Some(f) = &opt.output {
                output::write_routes_json(f, &net, module, &generated.routes, &generated.catalog).map_err(
                    |source| NetworkError::Io {
                        path: f.clone(),
                        source,
                    },
                )?;
                info!("Wrote {} routes to file {}", generated.routes.len(), f.display());
            }
            Ok(0)
        }
        Mode::Compare => {
            let differences = compare::compare(&net.modules[module].stored_routes, &generated.routes);
            println!("{} differences", differences);
            Ok(if differences > 0 { 2 } else { 0 })
        }
        Mode::Stats => {
            print!("{}", output::stats(&net, &generated.routes));
            Ok(0)
        }
    }
}

fn main() {
    let _h1 = hprof::enter("init");

    let opt = Opt::from_args();
    let level = if opt.debug {
        LevelFilter::Debug
    } else if opt.verbose {
        if cfg!(debug_assertions) {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    } else {
        LevelFilter::Error
    };
    if let Err(e) = simple_logger::SimpleLogger::new().with_level(level).init() {
        eprintln!("Could not initialize logging: {}", e);
    }
    info!("{:#?}", opt);
    drop(_h1);

    let status = match run(&opt) {
        Ok(status) => status,
        Err(e) => {
            error!("{}", e);
            1
        }
    };

    hprof::end_frame();
    if opt.profile {
        hprof::profiler().print_timing();
    }
    std::process::exit(status);
}
