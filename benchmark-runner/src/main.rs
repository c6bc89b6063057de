#[macro_use]
extern crate clap;

use std::path::Path;
use std::process;

use scalbench::{Config, ErrorClass};
use tracing_subscriber::EnvFilter;

mod commands;
use commands::Failure;

pub fn app() -> clap::App<'static, 'static> {
    clap_app!(benchmark_runner =>
        (version: "1.0")
        (author: "Martin Hafskjold Thoresen <martinhath@gmail.com")
        (about: "Runs queue benchmark sweeps and post-processes their results")
        (@arg config: -c --config +takes_value "A TOML file layered over the built-in tables")
        (@subcommand sweep =>
            (about: "Run one benchmark binary per (queue, work, threads) cell")
            (@arg kind: +takes_value "The benchmark kind, e.g. prodcon or seqalt. Optional with --preset")
            (@arg output_dir: +takes_value "Where the result files go (default tmp/)")
            (@arg preset: -p --preset +takes_value "Start from a named experiment")
            (@arg profile: --profile +takes_value "Machine profile for threads and partitions")
            (@arg queues: -q --queues +takes_value "Comma separated queues")
            (@arg works: -w --works +takes_value "Comma separated work values")
            (@arg threads: -t --threads +takes_value "Comma separated thread counts")
            (@arg partitions: --partitions +takes_value "Value for the partition/slot tunable")
            (@arg prefill: --prefill +takes_value "Elements to prefill")
            (@arg timeout: --timeout +takes_value "Kill a benchmark after this many seconds")
            (@arg log: --log "Log every operation instead of printing a summary")
            (@arg dry: -n --dry "Print the commands instead of running them")
            (@arg clean: --clean "Remove the output directory first")
        )
        (@subcommand merge =>
            (about: "Concatenate result files into one file per series")
            (@arg directory: +required +takes_value "Directory with the result files")
            (@arg threads: --threads "Merge along the thread axis (-t<n>) instead of work (-c<n>)")
        )
        (@subcommand average =>
            (about: "Average result files with the same name across directories")
            (@arg output_dir: +required +takes_value "Where the averaged files go; recreated")
            (@arg directories: +required +takes_value +multiple "Directories holding repeated runs")
            (@arg zeros: --zeros "Count non-numeric values in numeric columns as 0")
        )
        (@subcommand fairness =>
            (about: "Run the fairness analyzer over every operation log")
            (@arg log_dir: +required +takes_value "Directory with operation logs")
            (@arg output_dir: +required +takes_value "Where the analyzer output goes")
            (@arg analyzer: --analyzer +takes_value "The analyzer binary")
            (@arg jobs: -j --jobs +takes_value "Number of workers (default: one per cpu)")
        )
        (@subcommand list =>
            (about: "Show kinds, presets, profiles and queues")
        )
    )
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logging();
    let matches = app().get_matches();

    let config = match matches.value_of("config") {
        Some(path) => Config::load(Path::new(path)),
        None => Ok(Config::default()),
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(2);
        }
    };

    let result = match matches.subcommand() {
        ("sweep", Some(m)) => commands::sweep(&config, m),
        ("merge", Some(m)) => commands::merge(m),
        ("average", Some(m)) => commands::average(m),
        ("fairness", Some(m)) => commands::fairness(&config, m),
        ("list", Some(_)) => {
            commands::list(&config);
            Ok(())
        }
        _ => {
            println!("{}", matches.usage());
            Ok(())
        }
    };

    match result {
        Ok(()) => {}
        Err(Failure::Usage(msg)) => {
            println!("{}", msg);
        }
        Err(Failure::Failed(e)) => {
            eprintln!("error: {}", e);
            let code = match e.class() {
                ErrorClass::Configuration => 2,
                _ => 1,
            };
            process::exit(code);
        }
    }
}
