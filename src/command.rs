//! Turning one sweep cell into a command line and an output file name.
//!
//! Templates are parsed once, up front, into argument lists. A cell's values
//! are substituted per argument, so a value containing spaces stays a single
//! argument and nothing ever goes through a shell.
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::registry::Registry;

/// What the benchmark binary should print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Only the summary line.
    Performance,
    /// The full per-operation log, no summary.
    Detailed,
}

impl OutputMode {
    pub fn flags(self) -> [&'static str; 2] {
        match self {
            OutputMode::Performance => ["-nolog_operations", "-print_summary"],
            OutputMode::Detailed => ["-log_operations", "-noprint_summary"],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Queue,
    Exe,
    Thread,
    Work,
    Ops,
    Prefill,
    Directory,
    BinDir,
    Tunable,
    Perf,
}

impl Field {
    fn from_name(name: &str) -> Option<Field> {
        Some(match name {
            "queue" => Field::Queue,
            "exe" => Field::Exe,
            "thread" => Field::Thread,
            "work" => Field::Work,
            "ops" => Field::Ops,
            "prefill" => Field::Prefill,
            "directory" => Field::Directory,
            "bin_dir" => Field::BinDir,
            "tunable" => Field::Tunable,
            "perf" => Field::Perf,
            _ => return None,
        })
    }
}

const COMMAND_FIELDS: &[Field] = &[
    Field::Queue,
    Field::Exe,
    Field::Thread,
    Field::Work,
    Field::Ops,
    Field::Prefill,
    Field::Directory,
    Field::BinDir,
    Field::Tunable,
    Field::Perf,
];

const FILE_FIELDS: &[Field] = &[Field::Queue, Field::Thread, Field::Tunable, Field::Work];

#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Text(String),
    Field(Field),
}

fn parse_pieces(template: &str, allowed: &[Field]) -> Result<Vec<Piece>> {
    let mut pieces = vec![];
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        if open > 0 {
            pieces.push(Piece::Text(rest[..open].to_string()));
        }
        let close = rest[open..]
            .find('}')
            .ok_or_else(|| Error::UnterminatedPlaceholder(template.to_string()))?;
        let name = &rest[open + 1..open + close];
        match Field::from_name(name) {
            Some(f) if allowed.contains(&f) => pieces.push(Piece::Field(f)),
            _ => {
                return Err(Error::UnknownPlaceholder {
                    template: template.to_string(),
                    name: name.to_string(),
                })
            }
        }
        rest = &rest[open + close + 1..];
    }
    if !rest.is_empty() {
        pieces.push(Piece::Text(rest.to_string()));
    }
    Ok(pieces)
}

fn allowed_fields(all: &[Field], work_axis: bool) -> Vec<Field> {
    all.iter()
        .cloned()
        .filter(|&f| work_axis || f != Field::Work)
        .collect()
}

/// An argument that may expand to zero or more arguments.
#[derive(Debug, Clone, PartialEq)]
enum Arg {
    Pieces(Vec<Piece>),
    /// `-<flag> <ceiling>`, or nothing.
    Tunable,
    /// The two output-mode flags.
    Perf,
}

/// A program pattern plus an argument list, both with placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandTemplate {
    program: Vec<Piece>,
    args: Vec<Arg>,
}

impl CommandTemplate {
    /// Parse a template. `args` is split on whitespace before any values are
    /// substituted. `{tunable}` and `{perf}` must stand alone as arguments.
    pub fn parse(program: &str, args: &str, work_axis: bool) -> Result<Self> {
        let allowed = allowed_fields(COMMAND_FIELDS, work_axis);
        let program_pieces = parse_pieces(program, &allowed)?;
        if let Some(name) = program_pieces.iter().find_map(|p| match *p {
            Piece::Field(Field::Tunable) => Some("tunable"),
            Piece::Field(Field::Perf) => Some("perf"),
            _ => None,
        }) {
            return Err(Error::SplicedPlaceholder {
                template: program.to_string(),
                name: name.to_string(),
            });
        }

        let mut parsed = vec![];
        for word in args.split_whitespace() {
            let pieces = parse_pieces(word, &allowed)?;
            let arg = match pieces.as_slice() {
                [Piece::Field(Field::Tunable)] => Arg::Tunable,
                [Piece::Field(Field::Perf)] => Arg::Perf,
                _ => {
                    for p in &pieces {
                        let name = match *p {
                            Piece::Field(Field::Tunable) => "tunable",
                            Piece::Field(Field::Perf) => "perf",
                            _ => continue,
                        };
                        return Err(Error::SplicedPlaceholder {
                            template: word.to_string(),
                            name: name.to_string(),
                        });
                    }
                    Arg::Pieces(pieces)
                }
            };
            parsed.push(arg);
        }
        Ok(CommandTemplate {
            program: program_pieces,
            args: parsed,
        })
    }
}

/// The file name pattern, relative to the output directory.
#[derive(Debug, Clone, PartialEq)]
pub struct FileNameTemplate {
    pieces: Vec<Piece>,
}

impl FileNameTemplate {
    /// Only `{queue}`, `{thread}`, `{tunable}` and `{work}` are allowed.
    /// Here `{tunable}` renders as `-<flag><ceiling>` with no space.
    pub fn parse(template: &str, work_axis: bool) -> Result<Self> {
        let allowed = allowed_fields(FILE_FIELDS, work_axis);
        Ok(FileNameTemplate {
            pieces: parse_pieces(template, &allowed)?,
        })
    }
}

/// One benchmark binary family and how to drive it.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkKind {
    pub name: String,
    pub command: CommandTemplate,
    pub file_name: FileNameTemplate,
    /// Whether cells vary the synthetic work. Kinds without a work axis run
    /// once per (queue, thread) pair.
    pub work_axis: bool,
    /// Overrides the sweep's output mode.
    pub forced_mode: Option<OutputMode>,
    /// `{ops}` renders as this times the thread count.
    pub ops_per_thread: u64,
}

const WORK_FILE: &str = "{queue}-t{thread}{tunable}-c{work}.txt";
const PLAIN_FILE: &str = "{queue}-t{thread}{tunable}.txt";

const KINDS: &[(&str, &str, &str, bool)] = &[
    (
        "prodcon",
        "{bin_dir}/prodcon-{exe}",
        "-producers {thread} -consumers {thread} -operations 10000 -c {work} \
         -prealloc_size 500m {tunable} {perf} -noset_rt_priority",
        true,
    ),
    (
        "enq",
        "{bin_dir}/prodcon-{exe}",
        "-producers {thread} -consumers 0 -operations 10000 -c {work} {tunable} \
         {perf} -noset_rt_priority -prealloc_size 250m",
        true,
    ),
    (
        "infprod",
        "{bin_dir}/prodcon-{exe}",
        "-producers {thread} -consumers {thread} -operations 150000 -measure_at 10000 \
         -c {work} {tunable} {perf} -noset_rt_priority -prealloc_size 1g",
        true,
    ),
    (
        "deq",
        "{bin_dir}/prodcon-{exe}",
        "-producers {thread} -consumers {thread} -operations 10000 -c {work} {tunable} \
         -barrier {perf} -noset_rt_priority -prealloc_size 500m",
        true,
    ),
    (
        "seqalt",
        "{bin_dir}/seqalt-{exe}",
        "-allow_empty_returns -threads {thread} -elements 10000 -c {work} {tunable} \
         {perf} -noset_rt_priority -prealloc_size 500m",
        true,
    ),
    (
        "seq-enq-par-deq",
        "{bin_dir}/prodcon-{exe}",
        "-producers 1 -consumers {thread} -barrier -operations {ops} -c {work} \
         {tunable} {perf} -noset_rt_priority",
        true,
    ),
    (
        "shortest-path",
        "{bin_dir}/shortest-path-{exe}",
        "-threads {thread} -height 100 -width 10000 {tunable} -noset_rt_priority \
         -prealloc_size 1g",
        false,
    ),
];

impl BenchmarkKind {
    pub fn new(name: &str, program: &str, args: &str, file_name: &str, work_axis: bool) -> Result<Self> {
        Ok(BenchmarkKind {
            name: name.to_string(),
            command: CommandTemplate::parse(program, args, work_axis)?,
            file_name: FileNameTemplate::parse(file_name, work_axis)?,
            work_axis,
            forced_mode: None,
            ops_per_thread: 10000,
        })
    }

    /// Look up one of the kinds the suite ships with.
    pub fn builtin(name: &str) -> Result<Self> {
        let &(name, program, args, work_axis) = KINDS
            .iter()
            .find(|k| k.0 == name)
            .ok_or_else(|| Error::UnknownKind(name.to_string()))?;
        let file_name = if work_axis { WORK_FILE } else { PLAIN_FILE };
        let mut kind = BenchmarkKind::new(name, program, args, file_name, work_axis)?;
        if name == "seq-enq-par-deq" {
            kind.forced_mode = Some(OutputMode::Detailed);
        }
        Ok(kind)
    }

    pub fn builtin_names() -> Vec<&'static str> {
        KINDS.iter().map(|k| k.0).collect()
    }
}

/// One cell of the sweep, as it will be run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRecord {
    pub algorithm: String,
    pub work: Option<u64>,
    pub threads: u32,
    pub output_path: PathBuf,
}

/// A fully substituted command with its stdout target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub output: PathBuf,
}

fn shell_word(f: &mut fmt::Formatter, word: &str) -> fmt::Result {
    if !word.is_empty() && !word.contains(|c: char| c.is_whitespace() || "'\"\\$`".contains(c)) {
        write!(f, "{}", word)
    } else {
        write!(f, "'{}'", word.replace('\'', "'\\''"))
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        shell_word(f, &self.program)?;
        for arg in &self.args {
            write!(f, " ")?;
            shell_word(f, arg)?;
        }
        write!(f, " > ")?;
        shell_word(f, &self.output.to_string_lossy())
    }
}

/// Everything about the sweep that stays fixed from cell to cell.
#[derive(Debug, Clone, Copy)]
pub struct CommandBuilder<'a> {
    pub kind: &'a BenchmarkKind,
    pub registry: &'a Registry,
    pub directory: &'a Path,
    pub bin_dir: &'a str,
    pub max_partitions: u32,
    pub prefill: u64,
    pub mode: OutputMode,
}

impl<'a> CommandBuilder<'a> {
    /// The output file for one cell. Depends only on the directory, the
    /// queue, the thread count, the tunable and the work.
    pub fn file_name(&self, queue: &str, work: Option<u64>, threads: u32) -> PathBuf {
        let mut name = String::new();
        for piece in &self.kind.file_name.pieces {
            match *piece {
                Piece::Text(ref s) => name.push_str(s),
                Piece::Field(Field::Queue) => name.push_str(queue),
                Piece::Field(Field::Thread) => name.push_str(&threads.to_string()),
                Piece::Field(Field::Work) => name.push_str(&work.unwrap_or(0).to_string()),
                Piece::Field(Field::Tunable) => {
                    if let Some(flag) = self.registry.tunable_flag(queue) {
                        name.push_str(&format!("-{}{}", flag, self.max_partitions));
                    }
                }
                // `FileNameTemplate::parse` rejects everything else.
                Piece::Field(_) => {}
            }
        }
        self.directory.join(name)
    }

    pub fn build(&self, queue: &str, work: Option<u64>, threads: u32) -> Result<(RunRecord, Invocation)> {
        let mut exe = self.registry.executable_for(queue).split_whitespace();
        let binary = exe
            .next()
            .ok_or_else(|| Error::EmptyExecutable(queue.to_string()))?;
        let output = self.file_name(queue, work, threads);

        let render = |pieces: &[Piece]| -> String {
            let mut out = String::new();
            for piece in pieces {
                match *piece {
                    Piece::Text(ref s) => out.push_str(s),
                    Piece::Field(Field::Queue) => out.push_str(queue),
                    Piece::Field(Field::Exe) => out.push_str(binary),
                    Piece::Field(Field::Thread) => out.push_str(&threads.to_string()),
                    Piece::Field(Field::Work) => out.push_str(&work.unwrap_or(0).to_string()),
                    Piece::Field(Field::Ops) => out.push_str(
                        &(self.kind.ops_per_thread * u64::from(threads)).to_string(),
                    ),
                    Piece::Field(Field::Prefill) => out.push_str(&self.prefill.to_string()),
                    Piece::Field(Field::Directory) => {
                        out.push_str(&self.directory.to_string_lossy())
                    }
                    Piece::Field(Field::BinDir) => out.push_str(self.bin_dir),
                    Piece::Field(Field::Tunable) | Piece::Field(Field::Perf) => {}
                }
            }
            out
        };

        let program = render(&self.kind.command.program);
        let mut args: Vec<String> = exe.map(|s| s.to_string()).collect();
        let mode = self.kind.forced_mode.unwrap_or(self.mode);
        for arg in &self.kind.command.args {
            match *arg {
                Arg::Pieces(ref pieces) => args.push(render(pieces)),
                Arg::Tunable => {
                    if let Some(flag) = self.registry.tunable_flag(queue) {
                        args.push(format!("-{}", flag));
                        args.push(self.max_partitions.to_string());
                    }
                }
                Arg::Perf => args.extend(mode.flags().iter().map(|s| s.to_string())),
            }
        }

        let record = RunRecord {
            algorithm: queue.to_string(),
            work,
            threads,
            output_path: output.clone(),
        };
        Ok((record, Invocation { program, args, output }))
    }
}
