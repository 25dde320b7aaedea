// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.
// SPDX-License-Identifier: MPL-2.0

#[macro_use]
extern crate log;

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::Context;
use structopt::StructOpt;

use ojbox::compiler::Gcc;
use ojbox::configuration::JudgeConfiguration;
use ojbox::error::JudgeError;
use ojbox::pipeline::JudgePipeline;
use ojbox::queue::{Job, MemoryQueue, SpoolQueue};
use ojbox::syscall_filter::SyscallPolicy;
use ojbox::workspace::Workspace;
use ojbox::{ensure_secure, Result, SandboxImplementation};

/// Exit status of a judge that cannot work on this machine (`EX_UNAVAILABLE`)
const EX_UNAVAILABLE: i32 = 69;

/// Command line arguments of the program
#[derive(Debug, StructOpt)]
#[structopt(
    name = "ojbox",
    about = "Judge C submissions in a ptrace sandbox",
    setting = structopt::clap::AppSettings::ColoredHelp)
]
enum Args {
    /// Judge the jobs of a spool directory until SIGTERM or SIGINT
    Serve {
        /// Spool directory of the job queue
        #[structopt(long)]
        spool: PathBuf,

        #[structopt(flatten)]
        settings: Settings,

        /// Pause between two polls of an empty queue, in milliseconds
        #[structopt(long)]
        interval: Option<u64>,
    },

    /// Judge a single source file and print the report
    Judge {
        /// C source file
        source: PathBuf,

        #[structopt(flatten)]
        settings: Settings,

        #[structopt(flatten)]
        limits: Limits,

        /// output in JSON format
        #[structopt(long, short)]
        json: bool,
    },

    /// Add a pending job to a spool directory
    Submit {
        /// Spool directory of the job queue
        #[structopt(long)]
        spool: PathBuf,

        /// C source file
        source: PathBuf,

        /// Id of the job, after the last one submitted if missing
        #[structopt(long)]
        id: Option<u64>,

        #[structopt(flatten)]
        limits: Limits,
    },
}

#[derive(Debug, StructOpt)]
struct Settings {
    /// JSON configuration file
    #[structopt(long)]
    config: Option<PathBuf>,

    /// Directory for the transient files of the jobs
    #[structopt(long)]
    workspace: Option<PathBuf>,

    /// C compiler executable
    #[structopt(long)]
    compiler: Option<PathBuf>,
}

#[derive(Debug, StructOpt)]
struct Limits {
    /// Cpu time limit, in milliseconds
    #[structopt(long, short)]
    time_limit: Option<u64>,

    /// Memory limit, in bytes
    #[structopt(long, short)]
    memory_limit: Option<u64>,

    /// Feed this file to the standard input
    #[structopt(long, short = "i")]
    input: Option<PathBuf>,

    /// Capture the standard output in this workspace file
    #[structopt(long, short = "o")]
    output: Option<PathBuf>,
}

impl Settings {
    fn load(&self) -> Result<JudgeConfiguration> {
        let mut config = match &self.config {
            Some(path) => JudgeConfiguration::from_file(path)?,
            None => JudgeConfiguration::default(),
        };
        if let Some(workspace) = &self.workspace {
            config.workspace = workspace.clone();
        }
        if let Some(compiler) = &self.compiler {
            config.compiler = compiler.clone();
        }
        Ok(config)
    }
}

impl Limits {
    fn job(self, id: u64, source: &Path) -> Result<Job> {
        let mut job = Job::new(id, read_source(source)?);
        job.time_limit = self.time_limit;
        job.memory_limit = self.memory_limit;
        job.input = match self.input {
            Some(input) => Some(
                fs::canonicalize(&input)
                    .with_context(|| format!("Input file {} not found", input.display()))?,
            ),
            None => None,
        };
        job.output = self.output;
        Ok(job)
    }
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Check that this machine can judge, before touching any job
fn judge_setup(config: &JudgeConfiguration) -> Result<(SyscallPolicy, Gcc, Workspace)> {
    ensure_secure::<SandboxImplementation>()?;
    let policy = SyscallPolicy::for_host()?;
    let compiler = Gcc::locate(&config.compiler)?;
    debug!("Using compiler {}", compiler.path().display());
    let workspace = Workspace::new(&config.workspace)?;
    trace!("Judge config {:#?}", config);
    Ok((policy, compiler, workspace))
}

fn run(args: Args) -> Result<()> {
    match args {
        Args::Serve {
            spool,
            settings,
            interval,
        } => {
            let mut config = settings.load()?;
            if let Some(interval) = interval {
                config.poll_interval_ms = interval;
            }
            let (policy, compiler, workspace) = judge_setup(&config)?;
            let queue = SpoolQueue::open(spool)?;
            let mut pipeline: JudgePipeline<_, _> =
                JudgePipeline::new(queue, compiler, policy, workspace)
                    .poll_interval(config.poll_interval());
            pipeline.run()
        }
        Args::Judge {
            source,
            settings,
            limits,
            json,
        } => {
            let config = settings.load()?;
            let (policy, compiler, workspace) = judge_setup(&config)?;
            let job = limits.job(1, &source)?;
            let mut pipeline: JudgePipeline<_, _> =
                JudgePipeline::new(MemoryQueue::new(), compiler, policy, workspace);
            let report = pipeline.judge(&job)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.verdict);
                if let Some(usage) = &report.usage {
                    println!(
                        "cpu {} ms, wall {} ms, memory {} bytes, output {} bytes",
                        usage.cpu_time, usage.wall_time, usage.memory_usage, usage.output_bytes
                    );
                }
                print!("{}", report.detail);
            }
            Ok(())
        }
        Args::Submit {
            spool,
            source,
            id,
            limits,
        } => {
            let queue = SpoolQueue::open(spool)?;
            let id = match id {
                Some(id) => id,
                None => queue.next_id()?,
            };
            queue.submit(&limits.job(id, &source)?)?;
            println!("{}", id);
            Ok(())
        }
    }
}

fn main() {
    let args = Args::from_args();

    let default_level = match args {
        Args::Serve { .. } => "info",
        _ => "warn",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    if let Err(e) = run(args) {
        eprintln!("Error: {:#}", e);
        let code = match e.downcast_ref::<JudgeError>() {
            Some(e) if e.is_configuration() => EX_UNAVAILABLE,
            _ => 1,
        };
        process::exit(code);
    }
}
