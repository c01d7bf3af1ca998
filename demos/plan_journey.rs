//! End-to-end demonstration: load one or more mode bundles from disk, build
//! the merged catalogue, and plan a single journey through the dispatcher.
//!
//! ```text
//! plan_journey <origin> <destination> <mode>=<gtfs-dir> [<mode>=<gtfs-dir> ...] \
//!     [--time HH:MM:SS] [--date YYYY-MM-DD] [--realtime] [--json]
//! ```
//!
//! Every `mode=dir` pair becomes one bundle in the Multi-Mode Catalogue
//! (spec §4.2); the dispatcher then runs one planner per mode (spec §4.8)
//! and prints whatever each one found.

use std::env;
use std::process::ExitCode;

use transit_planner::api::JourneyRequest;
use transit_planner::config::{Config, ModeBundleConfig};
use transit_planner::dispatcher::Dispatcher;

fn usage() -> ! {
    eprintln!(
        "usage: plan_journey <origin> <destination> <mode>=<gtfs-dir> [<mode>=<gtfs-dir> ...] \
         [--time HH:MM:SS] [--date YYYY-MM-DD] [--realtime] [--json]"
    );
    std::process::exit(2);
}

fn main() -> ExitCode {
    env_logger::init();

    let args: Vec<String> = env::args().skip(1).collect();
    if args.len() < 3 {
        usage();
    }
    let origin_query = args[0].clone();
    let destination_query = args[1].clone();

    let mut bundles = Vec::new();
    let mut departure_time = "now".to_string();
    let mut date = "today".to_string();
    let mut realtime = false;
    let mut json = false;

    let mut rest = args[2..].iter().peekable();
    while let Some(arg) = rest.next() {
        match arg.as_str() {
            "--time" => departure_time = rest.next().unwrap_or_else(|| usage()).clone(),
            "--date" => date = rest.next().unwrap_or_else(|| usage()).clone(),
            "--realtime" => realtime = true,
            "--json" => json = true,
            spec => match spec.split_once('=') {
                Some((mode_tag, feed_path)) => bundles.push(ModeBundleConfig {
                    mode_tag: mode_tag.to_string(),
                    feed_path: feed_path.into(),
                    realtime_url: None,
                }),
                None => usage(),
            },
        }
    }
    if bundles.is_empty() {
        usage();
    }

    let config = Config::from_env(bundles);
    let dispatcher = match Dispatcher::build(config) {
        Ok(dispatcher) => dispatcher,
        Err(err) => {
            eprintln!("failed to load schedule data: {err}");
            return ExitCode::FAILURE;
        }
    };

    let request = JourneyRequest {
        origin_query,
        destination_query,
        departure_time,
        date,
        realtime,
        modes: None,
    };

    match dispatcher.plan(&request) {
        Ok(results) if json => {
            // The shape a real HTTP façade would serve is exactly what
            // `ModeResults` already derives `Serialize` for (spec §6); this
            // flag exists so the demo can show that wire shape directly
            // rather than reimplementing a transport layer.
            match serde_json::to_string_pretty(&results) {
                Ok(rendered) => {
                    println!("{rendered}");
                    ExitCode::SUCCESS
                }
                Err(err) => {
                    eprintln!("failed to render results as JSON: {err}");
                    ExitCode::FAILURE
                }
            }
        }
        Ok(results) => {
            for (mode, outcome) in results {
                match outcome.journey {
                    Some(journey) => {
                        println!(
                            "{mode}: {} -> {} departs {} arrives {} ({} transfer(s))",
                            journey.origin.name,
                            journey.destination.name,
                            journey.departure_time,
                            journey.arrival_time,
                            journey.num_transfers
                        );
                        for leg in &journey.legs {
                            if leg.is_transfer {
                                println!("    transfer at {}", leg.from_stop);
                            } else {
                                println!(
                                    "    {} {} -> {} ({} stop(s))",
                                    leg.route_short_name.as_deref().unwrap_or("?"),
                                    leg.departure_time,
                                    leg.arrival_time,
                                    leg.num_stops
                                );
                            }
                        }
                    }
                    None => println!("{mode}: no journey ({})", outcome.note.unwrap_or_default()),
                }
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
