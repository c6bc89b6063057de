use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use clap::ArgMatches;
use tracing::{info, warn};

use scalbench::average::{self, MixedColumnPolicy};
use scalbench::fairness;
use scalbench::registry::{self, Preset};
use scalbench::{
    merge_series, run_sweep, BenchmarkKind, CancelToken, Config, Error, OutputMode, ProcessLauncher,
    RunOptions, SeriesAxis, SweepSpec,
};

const DEFAULT_OUTPUT: &str = "tmp/";

pub enum Failure {
    /// Bad command line; printed as a usage hint.
    Usage(String),
    Failed(Error),
}

impl From<Error> for Failure {
    fn from(e: Error) -> Self {
        Failure::Failed(e)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Failure::Usage(ref s) => write!(f, "usage: {}", s),
            Failure::Failed(ref e) => write!(f, "{:?}", e),
        }
    }
}

fn parse<T: FromStr>(m: &ArgMatches, name: &str) -> Result<Option<T>, Failure> {
    match m.value_of(name) {
        None => Ok(None),
        Some(s) => s
            .parse()
            .map(Some)
            .map_err(|_| Failure::Usage(format!("invalid value `{}` for --{}", s, name))),
    }
}

fn csv_values<T: FromStr>(m: &ArgMatches, name: &str) -> Result<Option<Vec<T>>, Failure> {
    match m.value_of(name) {
        None => Ok(None),
        Some(s) => s
            .split(',')
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
            .map(|v| {
                v.parse()
                    .map_err(|_| Failure::Usage(format!("invalid value `{}` for --{}", v, name)))
            })
            .collect::<Result<Vec<T>, Failure>>()
            .map(Some),
    }
}

/// Work out the sweep from the flags. Explicit flags beat `--profile`,
/// which beats the preset, which beats the default profile.
pub fn sweep_spec(config: &Config, m: &ArgMatches) -> Result<(BenchmarkKind, SweepSpec, bool), Failure> {
    let tables = &config.registry;
    let preset: Option<&Preset> = m.value_of("preset").map(registry::preset).transpose()?;
    // A preset names its kind, so a lone positional is the output directory.
    let (kind_arg, dir_arg) = match (preset, m.value_of("kind"), m.value_of("output_dir")) {
        (Some(_), Some(dir), None) => (None, Some(dir)),
        (_, kind, dir) => (kind, dir),
    };
    let kind = match kind_arg.or_else(|| preset.map(|p| p.kind)) {
        Some(kind) => BenchmarkKind::builtin(kind)?,
        None => {
            return Err(Failure::Usage(format!(
                "benchmark-runner sweep <kind> [output_dir], where kind is one of {}",
                BenchmarkKind::builtin_names().join(", ")
            )))
        }
    };
    let profile = m.value_of("profile").map(|p| tables.profile(p)).transpose()?;
    let default_profile = tables.profile("default")?;

    let queues = match csv_values(m, "queues")? {
        Some(q) => q,
        None => preset
            .map(|p| p.queues.clone())
            .unwrap_or_else(|| tables.queues().to_vec()),
    };
    let works = match csv_values(m, "works")? {
        Some(w) => w,
        None => preset
            .map(|p| p.works.clone())
            .unwrap_or_else(|| tables.works().to_vec()),
    };
    let threads = match csv_values(m, "threads")? {
        Some(t) => t,
        None => profile
            .map(|p| p.threads.clone())
            .or_else(|| preset.map(|p| p.threads.clone()))
            .unwrap_or_else(|| default_profile.threads.clone()),
    };
    let max_partitions = match parse(m, "partitions")? {
        Some(p) => p,
        None => profile
            .map(|p| p.max_partitions)
            .or_else(|| preset.map(|p| p.max_partitions))
            .unwrap_or(default_profile.max_partitions),
    };
    let mode = if m.is_present("log") {
        OutputMode::Detailed
    } else {
        preset.map(|p| p.mode).unwrap_or(OutputMode::Performance)
    };
    let dir = dir_arg.unwrap_or(DEFAULT_OUTPUT);

    let spec = SweepSpec {
        queues,
        works,
        threads,
        max_partitions,
        prefill: parse(m, "prefill")?.unwrap_or(0),
        output_directory: config.resolve_output(Path::new(dir)),
        mode,
    };
    let clean = m.is_present("clean") || preset.map(|p| p.clean).unwrap_or(false);
    Ok((kind, spec, clean))
}

pub fn sweep(config: &Config, m: &ArgMatches) -> Result<(), Failure> {
    let (kind, spec, clean) = sweep_spec(config, m)?;
    let timeout = parse::<u64>(m, "timeout")?
        .map(Duration::from_secs)
        .or(config.timeout);
    let launcher = ProcessLauncher::with_timeout(timeout);
    let options = RunOptions {
        dry_run: m.is_present("dry"),
        clean,
        cancel: CancelToken::new(),
    };
    run_sweep(&spec, &kind, config, &launcher, &options)?;
    Ok(())
}

pub fn merge(m: &ArgMatches) -> Result<(), Failure> {
    let dir = m.value_of("directory").unwrap_or(".");
    let axis = if m.is_present("threads") {
        SeriesAxis::Threads
    } else {
        SeriesAxis::Work
    };
    let report = merge_series(Path::new(dir), axis)?;
    for path in &report.written {
        println!("{}", path.display());
    }
    Ok(())
}

pub fn average(m: &ArgMatches) -> Result<(), Failure> {
    let output_dir = PathBuf::from(m.value_of("output_dir").unwrap_or_default());
    let mut directories = vec![];
    for dir in m.values_of("directories").into_iter().flatten() {
        let path = PathBuf::from(dir);
        if path.is_dir() {
            info!(path = %dir, "added");
            directories.push(path);
        } else {
            warn!(path = %dir, "not a valid directory");
        }
    }
    if directories.is_empty() {
        return Err(Failure::Usage(
            "benchmark-runner average <output_dir> <directory>...".to_string(),
        ));
    }
    let policy = if m.is_present("zeros") {
        MixedColumnPolicy::Zero
    } else {
        MixedColumnPolicy::Reject
    };
    average::prepare_output(&output_dir, &directories)?;
    average::average_all(&directories, &output_dir, policy)?;
    Ok(())
}

pub fn fairness(config: &Config, m: &ArgMatches) -> Result<(), Failure> {
    let log_dir = config.resolve_output(Path::new(m.value_of("log_dir").unwrap_or(".")));
    let output_dir = config.resolve_output(Path::new(m.value_of("output_dir").unwrap_or(".")));
    let analyzer = m.value_of("analyzer").unwrap_or(&config.analyzer);
    let workers = parse(m, "jobs")?.unwrap_or_else(fairness::default_workers);
    let launcher = ProcessLauncher::with_timeout(config.timeout);
    fairness::analyze_logs(&log_dir, &output_dir, analyzer, workers, &launcher, &CancelToken::new())?;
    Ok(())
}

pub fn list(config: &Config) {
    let tables = &config.registry;
    println!("kinds:   {}", BenchmarkKind::builtin_names().join(" "));
    println!("presets: {}", registry::preset_names().join(" "));
    println!("profiles:");
    for name in tables.profile_names() {
        if let Ok(p) = tables.profile(name) {
            println!("  {:<10} threads {:?}, partitions {}", name, p.threads, p.max_partitions);
        }
    }
    println!("queues:");
    for q in tables.queues() {
        println!(
            "  {:<16} {:<48} {}",
            q,
            tables.executable_for(q),
            tables.tunable_flag_for(q)
        );
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn spec_for(args: &[&str]) -> Result<(BenchmarkKind, SweepSpec, bool), Failure> {
        spec_with(&Config::default(), args)
    }

    fn spec_with(config: &Config, args: &[&str]) -> Result<(BenchmarkKind, SweepSpec, bool), Failure> {
        let mut argv = vec!["benchmark-runner", "sweep"];
        argv.extend_from_slice(args);
        let matches = crate::app().get_matches_from(argv);
        let m = matches.subcommand_matches("sweep").unwrap();
        sweep_spec(config, m)
    }

    #[test]
    fn explicit_flags() {
        let (kind, spec, clean) =
            spec_for(&["seqalt", "out", "-q", "ms,lb", "-w", "0,250", "-t", "1,2", "--partitions", "8"]).unwrap();
        assert_eq!(kind.name, "seqalt");
        assert_eq!(spec.queues, vec!["ms".to_string(), "lb".to_string()]);
        assert_eq!(spec.works, vec![0, 250]);
        assert_eq!(spec.threads, vec![1, 2]);
        assert_eq!(spec.max_partitions, 8);
        assert_eq!(spec.output_directory, PathBuf::from("out"));
        assert_eq!(spec.mode, OutputMode::Performance);
        assert!(!clean);
    }

    #[test]
    fn defaults_come_from_the_registry() {
        let (_, spec, _) = spec_for(&["prodcon"]).unwrap();
        assert_eq!(spec.queues.len(), Config::default().registry.queues().len());
        assert_eq!(spec.works, registry::DEFAULT_WORKS.to_vec());
        assert_eq!(spec.threads, vec![1, 2, 12, 24]);
        assert_eq!(spec.max_partitions, 24);
        assert_eq!(spec.output_directory, PathBuf::from(DEFAULT_OUTPUT));
    }

    #[test]
    fn presets_and_overrides() {
        let (kind, spec, clean) = spec_for(&["--preset", "b8-shortest-path"]).unwrap();
        assert_eq!(kind.name, "shortest-path");
        assert_eq!(spec.max_partitions, 80);
        assert!(clean);

        let (_, spec, _) = spec_for(&["--preset", "b8-seqalt", "--profile", "b6", "--log"]).unwrap();
        assert_eq!(spec.threads, vec![1, 2, 4, 8]);
        assert_eq!(spec.max_partitions, 8);
        assert_eq!(spec.mode, OutputMode::Detailed);
        assert_eq!(spec.queues, vec!["ah".to_string(), "ahstack".to_string()]);
    }

    #[test]
    fn preset_with_only_an_output_directory() {
        let (kind, spec, _) = spec_for(&["--preset", "b8-seqalt", "results"]).unwrap();
        assert_eq!(kind.name, "seqalt");
        assert_eq!(spec.output_directory, PathBuf::from("results"));

        let (kind, spec, _) = spec_for(&["--preset", "b8-seqalt", "enq", "results"]).unwrap();
        assert_eq!(kind.name, "enq");
        assert_eq!(spec.output_directory, PathBuf::from("results"));
    }

    #[test]
    fn relative_output_goes_under_the_root() {
        let mut config = Config::default();
        config.output_root = Some(PathBuf::from("/mnt/results"));
        let (_, spec, _) = spec_with(&config, &["enq", "pldi13"]).unwrap();
        assert_eq!(spec.output_directory, PathBuf::from("/mnt/results/pldi13"));
    }

    #[test]
    fn bad_input() {
        assert!(matches!(spec_for(&[]), Err(Failure::Usage(_))));
        assert!(matches!(spec_for(&["prodcon", "-t", "1,x"]), Err(Failure::Usage(_))));
        assert!(matches!(spec_for(&["bogus"]), Err(Failure::Failed(Error::UnknownKind(_)))));
        assert!(matches!(
            spec_for(&["prodcon", "--profile", "b9"]),
            Err(Failure::Failed(Error::UnknownProfile(_)))
        ));
    }
}
