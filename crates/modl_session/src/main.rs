//! modl-check
//!
//! Loads a `game_config.json`, validates every space and prints the
//! flattened dimension listing the Brain will see.
//!
//! Run with: cargo run --bin modl-check -- [path] [--ranges]

use std::path::PathBuf;
use std::process::ExitCode;

use modl_core::{GameConfig, DEFAULT_CONFIG_PATH, LOG_PREFIX};

struct Args {
    path: PathBuf,
    show_ranges: bool,
}

fn parse_args() -> Args {
    let mut args = Args {
        path: PathBuf::from(DEFAULT_CONFIG_PATH),
        show_ranges: false,
    };
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--ranges" | "-r" => args.show_ranges = true,
            other => args.path = PathBuf::from(other),
        }
    }
    args
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = parse_args();
    log::info!("{} Checking {}", LOG_PREFIX, args.path.display());

    let config = match GameConfig::load(&args.path, false) {
        Ok(config) => config,
        Err(e) => {
            log::error!("{} Could not load {}: {}", LOG_PREFIX, args.path.display(), e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = config.validate() {
        log::error!("{} {}", LOG_PREFIX, e);
        return ExitCode::FAILURE;
    }

    println!();
    println!("=== {} (brain {}) ===", args.path.display(), config.brain_version);
    println!("  min fps:             {}", config.min_fps);
    println!("  feature granularity: {:?}", config.feature_granularity);

    for (name, space) in config.spaces() {
        println!();
        println!("{} ({} values)", name, space.size());
        for index in 0..space.size() {
            if let Some(line) = space.to_display_string(index, args.show_ranges) {
                println!("  [{:>3}] {}", index, line);
            }
        }
    }
    println!();

    ExitCode::SUCCESS
}
