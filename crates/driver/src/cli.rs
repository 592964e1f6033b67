//! CLI wiring for the LoopTune toolkit.

use crate::report::{kernel_signature, ScheduleCache};
use crate::session::TuningSession;
use anyhow::Result;
use clap::{Parser, Subcommand};
use looptune_eval::{CommandRunner, CostModelEvaluator, Evaluator, ExecutionEvaluator};
use looptune_ir::three_loop_matmul;
use looptune_search::SearchConfig;
use looptune_transforms::TargetInfo;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "looptune", about = "LoopTune kernel autotuner")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the MLIR for a reference loop-nest kernel.
    EmitMlir {
        #[arg(long, default_value = "matmul_kernel")]
        function: String,
        #[arg(long, default_value_t = 64)]
        m: u64,
        #[arg(long, default_value_t = 64)]
        n: u64,
        #[arg(long, default_value_t = 128)]
        k: u64,
    },
    /// Tune a reference loop-nest kernel and emit a JSON report.
    Tune {
        #[arg(long, default_value = "matmul_kernel")]
        function: String,
        #[arg(long, default_value_t = 64)]
        m: u64,
        #[arg(long, default_value_t = 64)]
        n: u64,
        #[arg(long, default_value_t = 128)]
        k: u64,
        #[arg(long, default_value_t = 4)]
        beam_size: usize,
        #[arg(long, default_value_t = 4)]
        max_depth: usize,
        #[arg(long, default_value_t = 256)]
        eval_budget: usize,
        #[arg(long, default_value_t = 30_000)]
        timeout_ms: u64,
        /// Compile command template; `{input}` and `{artifact}` are
        /// substituted. Without it, candidates are scored by the
        /// deterministic cost model (dry run).
        #[arg(long)]
        compile_cmd: Option<String>,
        /// Run command template; `{artifact}` is substituted.
        #[arg(long)]
        run_cmd: Option<String>,
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        schedule_cache: Option<PathBuf>,
    },
}

pub fn run_cli(cli: Cli) -> Result<()> {
    tracing_subscriber::fmt::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .init();

    match cli.command {
        Command::EmitMlir { function, m, n, k } => {
            let spec = three_loop_matmul(&function, m, n, k)?;
            let session = TuningSession::new(SearchConfig::default(), TargetInfo::default())?;
            let root = session.context().root_state(spec)?;
            println!("{}", root.module_text());
        }
        Command::Tune {
            function,
            m,
            n,
            k,
            beam_size,
            max_depth,
            eval_budget,
            timeout_ms,
            compile_cmd,
            run_cmd,
            output,
            schedule_cache,
        } => {
            let config = SearchConfig {
                beam_size,
                max_depth,
                eval_budget,
                per_candidate_timeout: Duration::from_millis(timeout_ms),
            };
            let evaluator = build_evaluator(compile_cmd, run_cmd, config.per_candidate_timeout);
            let session = TuningSession::new(config, TargetInfo::default())?;

            let spec = three_loop_matmul(&function, m, n, k)?;
            let root = session.context().root_state(spec.clone())?;
            let signature = kernel_signature(&root);

            let report = session.tune(spec, evaluator)?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            if let Some(path) = output {
                report.save(&path)?;
                info!(path = %path.display(), "wrote tuning report");
            }
            if let Some(path) = schedule_cache {
                let mut cache = ScheduleCache::load_or_create(&path);
                if cache.insert_if_better(&signature, &report) {
                    cache.save(&path)?;
                    info!(path = %path.display(), signature = %signature, "updated schedule cache");
                }
            }
        }
    }
    Ok(())
}

fn build_evaluator(
    compile_cmd: Option<String>,
    run_cmd: Option<String>,
    timeout: Duration,
) -> Arc<dyn Evaluator> {
    match (compile_cmd, run_cmd) {
        (Some(compile), Some(run)) => {
            let runner = CommandRunner::new(
                compile.split_whitespace().map(str::to_string).collect(),
                run.split_whitespace().map(str::to_string).collect(),
            );
            Arc::new(ExecutionEvaluator::new(runner, timeout))
        }
        _ => {
            info!("no toolchain commands given; scoring with the analytic cost model");
            Arc::new(CostModelEvaluator::default())
        }
    }
}
