//! Run 命令处理

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use poke_executor::{FailureStrategy, FsLoader, Loader, RunnerConfig, SequenceRunner};
use poke_protocol::{ExecutorRegistry, HttpExecutor};

use super::output::{print_report, OutputFormat};

pub async fn handle(
    path: &Path,
    fail_fast: bool,
    format: OutputFormat,
    config: &RunnerConfig,
) -> Result<()> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .context("进度条模板无效")?,
    );
    spinner.set_message(format!("加载序列: {}", path.display()));
    spinner.enable_steady_tick(Duration::from_millis(100));

    let loader = FsLoader::new();
    let sequences = loader
        .parse_all(path)
        .with_context(|| format!("加载序列失败: {}", path.display()));
    spinner.finish_and_clear();
    let sequences = sequences?;

    let http = HttpExecutor::new(config.http.clone()).context("创建 HTTP 执行器失败")?;
    let mut registry = ExecutorRegistry::new();
    registry
        .register(Arc::new(http))
        .context("注册 HTTP 执行器失败")?;

    let strategy = if fail_fast {
        FailureStrategy::FailFast
    } else {
        config.run.failure_strategy()
    };

    let mut runner =
        SequenceRunner::new(Box::new(loader), registry).with_failure_strategy(strategy);

    // 结构化报告独占 stdout，打印的响应体改写到 stderr
    if format.is_structured() {
        runner = runner.with_output(Box::new(std::io::stderr()));
    }

    let report = runner.run_map(sequences).await;

    print_report(&report, format)?;

    report.into_result().context("运行失败")?;

    Ok(())
}
