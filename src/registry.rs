//! Static tables describing the queue implementations we know how to run.
//!
//! A logical queue name maps to the executable spec that realizes it
//! (binary suffix plus fixed flags) and, for relaxed queues, to the name of
//! its partition/slot tunable. The built-in tables live in a `lazy_static`
//! and are cloned into a [`Config`](crate::config::Config), which is what
//! actually gets passed around.
use std::collections::BTreeMap;

use crate::command::OutputMode;
use crate::error::{Error, Result};

/// The work sweep used by every experiment unless told otherwise.
pub const DEFAULT_WORKS: &[u64] = &[0, 1000, 2000, 4000, 8000, 16000, 32000, 64000];

/// Everything we know about one queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlgorithmDescriptor {
    pub name: String,
    pub executable_spec: String,
    pub tunable_flag: Option<String>,
}

/// Thread counts and partition ceiling for one machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineProfile {
    pub threads: Vec<u32>,
    pub max_partitions: u32,
}

/// A canned experiment: which kind to run over which queues.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub name: &'static str,
    pub kind: &'static str,
    pub queues: Vec<String>,
    pub works: Vec<u64>,
    pub threads: Vec<u32>,
    pub max_partitions: u32,
    pub mode: OutputMode,
    /// Wipe the output directory before running.
    pub clean: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Registry {
    pub(crate) queues: Vec<String>,
    pub(crate) executables: BTreeMap<String, String>,
    pub(crate) tunables: BTreeMap<String, String>,
    pub(crate) profiles: BTreeMap<String, MachineProfile>,
    pub(crate) works: Vec<u64>,
}

lazy_static! {
    static ref BUILTIN: Registry = Registry::scal();
    static ref PRESETS: Vec<Preset> = presets();
}

fn strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

impl Registry {
    /// The tables shipped with the suite.
    pub fn builtin() -> &'static Registry {
        &BUILTIN
    }

    /// An empty registry: every name runs as itself, nothing is tunable.
    pub fn empty() -> Self {
        Registry {
            queues: vec![],
            executables: BTreeMap::new(),
            tunables: BTreeMap::new(),
            profiles: BTreeMap::new(),
            works: DEFAULT_WORKS.to_vec(),
        }
    }

    fn scal() -> Self {
        let mut r = Registry::empty();
        r.queues = strings(&[
            "bskfifo", "ebstack", "fc", "kstack", "lb", "ms", "rd", "scal1random",
            "scal2random", "scal1rr", "scal2rr", "scal120rr", "sq", "tsstack", "tstack",
            "uskfifo", "wf", "tsstutterlist", "tsstutterarray", "tsatomiclist",
            "tsatomicarray", "tshwlist", "tshwarray", "tshw2ts", "tsqueuestutter",
            "tsqueueatomic", "tsqueuehw", "tsqueue2ts", "tsdequestutter", "tsdequeatomic",
            "tsdequehw", "tsdequehw2ts", "tsdequeshw", "tsdequeshw2ts", "tsdequeqhw",
            "tsdequeqhw2ts",
        ]);

        let executables = [
            ("scal1rr", "dq-partrr -partitions 1"),
            ("scal2rr", "dq-partrr -partitions 2"),
            ("scal4rr", "dq-partrr -partitions 4"),
            ("scal8rr", "dq-partrr -partitions 8"),
            ("scal20rr", "dq-partrr -partitions 20"),
            ("scal40rr", "dq-partrr -partitions 40"),
            ("scal80rr", "dq-partrr -partitions 80"),
            ("scal120rr", "dq-partrr -partitions 120"),
            ("scal1random", "dq-1random -nohw_random"),
            ("scal2random", "dq-2random -nohw_random"),
            ("wf", "wf-ppopp11"),
            ("ebstack", "ebstack -delay 2000"),
            ("tsstutterlist", "tsstack -stutter_clock -list -noinit_threshold"),
            ("tsstutterarray", "tsstack -stutter_clock -array -noinit_threshold"),
            ("tsatomiclist", "tsstack -atomic_clock -list -init_threshold"),
            ("tsatomicarray", "tsstack -atomic_clock -array -init_threshold"),
            ("tshwlist", "tsstack -hw_clock -list -init_threshold"),
            ("tshwarray", "tsstack -hw_clock -array -init_threshold"),
            ("tshw2ts", "tsstack -hw_clock -2ts -init_threshold -delay 3000"),
            ("tsqueuestutter", "tsqueue -stutter_clock -list"),
            ("tsqueueatomic", "tsqueue -atomic_clock -list"),
            ("tsqueuehw", "tsqueue -hw_clock -list"),
            ("tsqueue2ts", "tsqueue -hw_clock -2ts -delay 3000"),
            ("tsdequestutter", "tsdeque -list -stutter_clock -init_threshold"),
            ("tsdequeatomic", "tsdeque -list -atomic_clock -init_threshold"),
            ("tsdequehw", "tsdeque -list -hw_clock -init_threshold"),
            ("tsdequehw2ts", "tsdeque -2ts -hw_clock -init_threshold"),
            ("tsdequeshw", "tsdeque -list -hw_clock -init_threshold"),
            ("tsdequeshw2ts", "tsdeque -2ts -hw_clock -init_threshold"),
            ("tsdequeqhw", "tsdeque -list -hw_clock -init_threshold"),
            ("tsdequeqhw2ts", "tsdeque -2ts -hw_clock -init_threshold"),
        ];
        for &(name, exe) in executables.iter() {
            r.executables.insert(name.to_string(), exe.to_string());
        }

        let tunables = [
            ("scal2random", "p"),
            ("scal1random", "p"),
            ("scalrr", "p"),
            ("scalid", "p"),
            ("scaltlrr", "p"),
            ("uskfifo", "k"),
            ("bskfifo", "k"),
            ("kstack", "k"),
            ("sq", "k"),
            ("rd", "quasi_factor"),
            ("dq1random", "p"),
            ("dq2random", "p"),
            ("dqid", "p"),
            ("dqrr", "p"),
            ("dqtlrr", "p"),
            ("dqh1random", "p"),
            ("dqh2random", "p"),
            ("scalperm", "p"),
            ("scal1rr", "p"),
            ("scal2rr", "p"),
            ("scal4rr", "p"),
            ("scal8rr", "p"),
            ("scal20rr", "p"),
            ("scal40rr", "p"),
            ("scal80rr", "p"),
            ("scal120rr", "p"),
        ];
        for &(name, flag) in tunables.iter() {
            r.tunables.insert(name.to_string(), flag.to_string());
        }

        let profiles: [(&str, &[u32], u32); 4] = [
            ("default", &[1, 2, 12, 24], 24),
            ("b6", &[1, 2, 4, 8], 8),
            ("b7", &[1, 2, 12, 24], 24),
            ("b8", &[1, 2, 10, 20, 40, 80], 80),
        ];
        for &(name, threads, max_partitions) in profiles.iter() {
            r.profiles.insert(
                name.to_string(),
                MachineProfile {
                    threads: threads.to_vec(),
                    max_partitions,
                },
            );
        }
        r
    }

    /// The executable spec for `name`, or `name` itself if it has none.
    pub fn executable_for<'a>(&'a self, name: &'a str) -> &'a str {
        self.executables.get(name).map(|s| s.as_str()).unwrap_or(name)
    }

    /// The tunable flag of `name`, if it has one.
    pub fn tunable_flag(&self, name: &str) -> Option<&str> {
        self.tunables.get(name).map(|s| s.as_str())
    }

    /// Like [`tunable_flag`](Registry::tunable_flag), but spelled `"none"`
    /// when there is no tunable. Used when listing the tables.
    pub fn tunable_flag_for(&self, name: &str) -> &str {
        self.tunable_flag(name).unwrap_or("none")
    }

    pub fn descriptor(&self, name: &str) -> AlgorithmDescriptor {
        AlgorithmDescriptor {
            name: name.to_string(),
            executable_spec: self.executable_for(name).to_string(),
            tunable_flag: self.tunable_flag(name).map(|s| s.to_string()),
        }
    }

    /// Every queue in the suite, in the order experiments list them.
    pub fn queues(&self) -> &[String] {
        &self.queues
    }

    pub fn works(&self) -> &[u64] {
        &self.works
    }

    pub fn profile(&self, name: &str) -> Result<&MachineProfile> {
        self.profiles
            .get(name)
            .ok_or_else(|| Error::UnknownProfile(name.to_string()))
    }

    pub fn profile_names(&self) -> Vec<&str> {
        self.profiles.keys().map(|s| s.as_str()).collect()
    }

    pub fn set_executable(&mut self, name: &str, spec: &str) {
        self.executables.insert(name.to_string(), spec.to_string());
    }

    pub fn set_tunable(&mut self, name: &str, flag: &str) {
        self.tunables.insert(name.to_string(), flag.to_string());
    }

    pub fn set_profile(&mut self, name: &str, profile: MachineProfile) {
        self.profiles.insert(name.to_string(), profile);
    }
}

fn presets() -> Vec<Preset> {
    let b7 = [1, 2, 4, 6, 8, 10, 12];
    let b8 = [1, 10, 20, 30, 40, 50, 60, 70, 80];
    let b8_prodcon = [1, 5, 10, 15, 20, 25, 30, 35, 40];
    let relaxed = strings(&["lb", "ms", "fc", "wf", "uskfifo", "scal1rr"]);
    vec![
        Preset {
            name: "b7-prodcon",
            kind: "prodcon",
            queues: strings(&["ahstack"]),
            works: vec![250, 2000],
            threads: b7.to_vec(),
            max_partitions: 24,
            mode: OutputMode::Performance,
            clean: false,
        },
        Preset {
            name: "b8-prodcon",
            kind: "prodcon",
            queues: strings(&["ah", "ahstack"]),
            works: vec![250, 2000],
            threads: b8_prodcon.to_vec(),
            max_partitions: 80,
            mode: OutputMode::Performance,
            clean: false,
        },
        Preset {
            name: "b8-seqalt",
            kind: "seqalt",
            queues: strings(&["ah", "ahstack"]),
            works: vec![250, 2000],
            threads: b8.to_vec(),
            max_partitions: 80,
            mode: OutputMode::Performance,
            clean: false,
        },
        Preset {
            name: "b8-shortest-path",
            kind: "shortest-path",
            queues: relaxed.clone(),
            works: vec![0],
            threads: b8.to_vec(),
            max_partitions: 80,
            mode: OutputMode::Performance,
            clean: true,
        },
        Preset {
            name: "b8-seq-enq-par-deq",
            kind: "seq-enq-par-deq",
            queues: relaxed,
            works: vec![0],
            threads: vec![80],
            max_partitions: 80,
            mode: OutputMode::Detailed,
            clean: true,
        },
        Preset {
            name: "b8-ebstack",
            kind: "prodcon",
            queues: strings(&["ebstack"]),
            works: vec![250, 2000],
            threads: b8_prodcon.to_vec(),
            max_partitions: 80,
            mode: OutputMode::Performance,
            clean: false,
        },
    ]
}

pub fn preset(name: &str) -> Result<&'static Preset> {
    PRESETS
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| Error::UnknownPreset(name.to_string()))
}

pub fn preset_names() -> Vec<&'static str> {
    PRESETS.iter().map(|p| p.name).collect()
}
