//! Toolchain boundary and the measuring evaluator.

use crate::evaluator::{median_ms, Cost, Evaluator, ExecutionFailure};
use looptune_ir::IrState;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// How often a running child process is checked against its budget.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Grace added to the channel backstop: a conforming runner kills its
/// child and reports the timeout itself within this window.
const BACKSTOP_GRACE: Duration = Duration::from_millis(250);

/// Wall-clock budget for one candidate's whole compile-and-run cycle.
#[derive(Debug, Clone, Copy)]
pub struct TimeBudget {
    started: Instant,
    limit: Duration,
}

impl TimeBudget {
    pub fn starting_now(limit: Duration) -> Self {
        Self {
            started: Instant::now(),
            limit,
        }
    }

    pub fn expired(&self) -> bool {
        self.started.elapsed() >= self.limit
    }

    pub fn limit_ms(&self) -> u64 {
        self.limit.as_millis() as u64
    }

    pub fn exceeded(&self) -> ExecutionFailure {
        ExecutionFailure::Timeout {
            limit_ms: self.limit_ms(),
        }
    }
}

/// Compiles a state to a runnable artifact and executes it once. This is
/// the only interface the engine requires from the surrounding toolchain.
///
/// Both calls receive the candidate's remaining budget and must return
/// [`ExecutionFailure::Timeout`] once it expires, reaping any subprocess
/// they started: a timed-out candidate leaves nothing running behind it.
pub trait KernelRunner: Send + Sync {
    type Kernel: Send;

    fn compile(
        &self,
        state: &IrState,
        budget: TimeBudget,
    ) -> Result<Self::Kernel, ExecutionFailure>;

    fn execute(
        &self,
        kernel: &Self::Kernel,
        budget: TimeBudget,
    ) -> Result<Duration, ExecutionFailure>;
}

/// Execution-based evaluator: compile once, warm up, time `runs`
/// repetitions, reduce to the median.
///
/// The whole cycle shares one [`TimeBudget`]; the runner enforces it
/// against its own subprocesses. The worker thread plus channel backstop
/// bounds runners that ignore the budget, so exceeding the timeout never
/// blocks sibling candidates either way.
pub struct ExecutionEvaluator<R: KernelRunner + 'static> {
    runner: Arc<R>,
    warmup_runs: usize,
    runs: usize,
    timeout: Duration,
}

impl<R: KernelRunner + 'static> ExecutionEvaluator<R> {
    pub fn new(runner: R, timeout: Duration) -> Self {
        Self {
            runner: Arc::new(runner),
            warmup_runs: 1,
            runs: 5,
            timeout,
        }
    }

    pub fn with_runs(mut self, warmup_runs: usize, runs: usize) -> Self {
        self.warmup_runs = warmup_runs;
        self.runs = runs.max(1);
        self
    }
}

impl<R: KernelRunner + 'static> Evaluator for ExecutionEvaluator<R> {
    fn evaluate(&self, state: &IrState) -> Result<Cost, ExecutionFailure> {
        let runner = Arc::clone(&self.runner);
        let candidate = state.clone();
        let warmup_runs = self.warmup_runs;
        let runs = self.runs;
        let budget = TimeBudget::starting_now(self.timeout);

        let (sender, receiver) = mpsc::channel();
        thread::spawn(move || {
            let outcome = (|| {
                let kernel = runner.compile(&candidate, budget)?;
                for _ in 0..warmup_runs {
                    runner.execute(&kernel, budget)?;
                }
                let mut samples = Vec::with_capacity(runs);
                for _ in 0..runs {
                    samples.push(runner.execute(&kernel, budget)?.as_secs_f64() * 1000.0);
                }
                Ok(median_ms(&mut samples))
            })();
            // The receiver may have given up already; nothing to do then.
            let _ = sender.send(outcome);
        });

        match receiver.recv_timeout(self.timeout + BACKSTOP_GRACE) {
            Ok(outcome) => {
                if let Ok(cost) = &outcome {
                    debug!(function = state.function(), cost_ms = *cost, "measured candidate");
                }
                outcome
            }
            Err(_) => {
                warn!(
                    function = state.function(),
                    limit_ms = budget.limit_ms(),
                    "runner ignored its budget; abandoning the worker"
                );
                Err(budget.exceeded())
            }
        }
    }
}

/// Artifact produced by [`CommandRunner`]: the scratch directory stays
/// alive for as long as the artifact is referenced.
pub struct CommandKernel {
    pub function: String,
    pub artifact: PathBuf,
    _scratch: tempfile::TempDir,
}

enum CommandFailure {
    Spawn(std::io::Error),
    Expired,
}

/// Run a child process to completion or kill it at the budget deadline.
/// Output is collected after exit, so measured times carry at most one
/// poll interval of slack.
fn run_with_budget(command: &mut Command, budget: TimeBudget) -> Result<Output, CommandFailure> {
    let mut child = command
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(CommandFailure::Spawn)?;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) => {
                if budget.expired() {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(CommandFailure::Expired);
                }
                thread::sleep(POLL_INTERVAL);
            }
            Err(err) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(CommandFailure::Spawn(err));
            }
        }
    }
    child.wait_with_output().map_err(CommandFailure::Spawn)
}

/// Runner that shells out to an external toolchain.
///
/// The compile template runs once per candidate with `{input}` replaced by
/// the path of the written IR module and `{artifact}` by the output path;
/// the run template executes the artifact with `{artifact}` substituted.
/// Children that outlive the candidate's budget are killed.
pub struct CommandRunner {
    compile_template: Vec<String>,
    run_template: Vec<String>,
}

impl CommandRunner {
    pub fn new(compile_template: Vec<String>, run_template: Vec<String>) -> Self {
        Self {
            compile_template,
            run_template,
        }
    }

    fn substituted(template: &[String], input: &str, artifact: &str) -> Vec<String> {
        template
            .iter()
            .map(|arg| arg.replace("{input}", input).replace("{artifact}", artifact))
            .collect()
    }
}

impl KernelRunner for CommandRunner {
    type Kernel = CommandKernel;

    fn compile(
        &self,
        state: &IrState,
        budget: TimeBudget,
    ) -> Result<Self::Kernel, ExecutionFailure> {
        let scratch = tempfile::tempdir().map_err(|err| ExecutionFailure::Compile {
            detail: format!("failed to create scratch dir: {}", err),
        })?;
        let input = scratch.path().join("kernel.mlir");
        std::fs::write(&input, state.module_text()).map_err(|err| {
            ExecutionFailure::Compile {
                detail: format!("failed to write module: {}", err),
            }
        })?;
        let artifact = scratch.path().join("kernel.bin");

        let args = Self::substituted(
            &self.compile_template,
            &input.to_string_lossy(),
            &artifact.to_string_lossy(),
        );
        let (program, rest) = args.split_first().ok_or_else(|| ExecutionFailure::Compile {
            detail: "empty compile template".into(),
        })?;
        let output = run_with_budget(Command::new(program).args(rest), budget).map_err(
            |failure| match failure {
                CommandFailure::Spawn(err) => ExecutionFailure::Compile {
                    detail: format!("failed to run {}: {}", program, err),
                },
                CommandFailure::Expired => budget.exceeded(),
            },
        )?;
        if !output.status.success() {
            return Err(ExecutionFailure::Compile {
                detail: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(CommandKernel {
            function: state.function().to_string(),
            artifact,
            _scratch: scratch,
        })
    }

    fn execute(
        &self,
        kernel: &Self::Kernel,
        budget: TimeBudget,
    ) -> Result<Duration, ExecutionFailure> {
        let args = Self::substituted(&self.run_template, "", &kernel.artifact.to_string_lossy());
        let (program, rest) = args.split_first().ok_or_else(|| ExecutionFailure::Crash {
            exit_code: None,
            detail: "empty run template".into(),
        })?;

        let start = Instant::now();
        let output = run_with_budget(Command::new(program).args(rest), budget).map_err(
            |failure| match failure {
                CommandFailure::Spawn(err) => ExecutionFailure::Crash {
                    exit_code: None,
                    detail: format!("failed to run {}: {}", program, err),
                },
                CommandFailure::Expired => budget.exceeded(),
            },
        )?;
        let elapsed = start.elapsed();

        if !output.status.success() {
            return Err(ExecutionFailure::Crash {
                exit_code: output.status.code(),
                detail: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        debug!(
            function = %kernel.function,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "ran artifact"
        );
        Ok(elapsed)
    }
}
