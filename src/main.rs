mod app;
mod args;

use clap::Parser;
use snafu::ErrorCompat;

fn main() {
    let parsed = args::Args::parse();

    let mut builder = env_logger::Builder::from_default_env();
    if parsed.verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();

    let res = if let Some(num_sessions) = parsed.simulate {
        app::run_simulations(num_sessions, parsed.seed.unwrap_or(0), parsed.top)
    } else if let Some(config_path) = parsed.config.clone() {
        app::run_session(
            config_path,
            parsed.out.clone(),
            parsed.reference.clone(),
            parsed.top,
            parsed.seed,
        )
    } else {
        eprintln!("No --config file and no --simulate count provided. See --help for usage.");
        std::process::exit(2);
    };

    if let Err(e) = res {
        eprintln!("An error occured {}", e);
        if let Some(bt) = ErrorCompat::backtrace(&e) {
            eprintln!("trace: {}", bt);
        }
        std::process::exit(1);
    }
}
