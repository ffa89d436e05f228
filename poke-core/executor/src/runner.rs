//! 序列执行器

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use poke_common::Call;
use poke_protocol::ExecutorRegistry;

use crate::{
    apply_exports, check_asserts, CallReport, ExecutorError, ImportTable, Loader, Result,
    RunReport, Sequence, SequenceMap, SequenceReport, TemplateResolver, VariableContext,
};

/// 失败策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailureStrategy {
    /// 继续执行其他序列 (默认)
    #[default]
    Continue,
    /// 快速失败 - 第一个序列失败后不再执行后续序列
    FailFast,
}

/// 序列执行器
///
/// 依次执行每个序列，序列内的调用按声明顺序逐个执行。
/// 变量上下文在每个序列结束后清空。
pub struct SequenceRunner {
    /// 序列加载器
    loader: Box<dyn Loader>,

    /// 执行器注册表
    registry: ExecutorRegistry,

    /// 当前序列的变量上下文
    variables: VariableContext,

    /// 响应体打印输出
    output: Box<dyn Write + Send>,

    /// 失败策略
    failure_strategy: FailureStrategy,
}

impl SequenceRunner {
    /// 创建新的序列执行器，打印输出默认为标准输出
    pub fn new(loader: Box<dyn Loader>, registry: ExecutorRegistry) -> Self {
        Self {
            loader,
            registry,
            variables: VariableContext::new(),
            output: Box::new(std::io::stdout()),
            failure_strategy: FailureStrategy::default(),
        }
    }

    /// 设置失败策略
    pub fn with_failure_strategy(mut self, strategy: FailureStrategy) -> Self {
        self.failure_strategy = strategy;
        self
    }

    /// 设置响应体打印输出
    pub fn with_output(mut self, output: Box<dyn Write + Send>) -> Self {
        self.output = output;
        self
    }

    /// 当前变量上下文
    pub fn variables(&self) -> &VariableContext {
        &self.variables
    }

    /// 加载并执行指定位置的全部序列
    ///
    /// 加载失败直接返回错误；序列失败记录在报告中。
    pub async fn execute(&mut self, location: &Path) -> Result<RunReport> {
        info!("加载序列: {}", location.display());
        let sequences = self.loader.parse_all(location)?;
        Ok(self.run_map(sequences).await)
    }

    /// 加载并执行，存在失败时返回聚合错误
    pub async fn run(&mut self, location: &Path) -> Result<()> {
        self.execute(location).await?.into_result()
    }

    /// 执行内存中的序列集合
    pub async fn run_map(&mut self, sequences: SequenceMap) -> RunReport {
        let started = Instant::now();
        let mut report = RunReport::new();
        let total = sequences.len();

        info!(
            "开始执行 {} 个序列 (失败策略: {:?})",
            total, self.failure_strategy
        );

        for (position, (id, sequence)) in sequences.iter().enumerate() {
            let (sequence_report, failure) = self.execute_sequence(id, sequence).await;
            let failed = failure.is_some();
            report.record(sequence_report, failure);

            if failed && self.failure_strategy == FailureStrategy::FailFast {
                let remaining = total - position - 1;
                if remaining > 0 {
                    warn!("快速失败: 跳过剩余 {} 个序列", remaining);
                    report.stopped_early = true;
                }
                break;
            }
        }

        report.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            "执行完成: {} 通过, {} 失败, 耗时 {}ms",
            report.passed_count(),
            report.failed_count(),
            report.duration_ms
        );
        if report.failed_count() > 0 {
            warn!("失败的序列: {}", report.failed_sequences().join(", "));
        }

        report
    }

    /// 执行单个序列
    pub async fn run_sequence(&mut self, id: &str, sequence: &Sequence) -> Result<SequenceReport> {
        match self.execute_sequence(id, sequence).await {
            (report, None) => Ok(report),
            (_, Some(err)) => Err(err),
        }
    }

    /// 执行序列并在任何情况下清空变量上下文
    async fn execute_sequence(
        &mut self,
        id: &str,
        sequence: &Sequence,
    ) -> (SequenceReport, Option<ExecutorError>) {
        info!("开始执行序列: {}", id);
        let started = Instant::now();
        let mut report = SequenceReport::new(id);

        let result = self.run_calls(sequence, &mut report).await;
        self.variables.clear();

        report.duration_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                info!("序列 {} 执行成功 ({}ms)", id, report.duration_ms);
                (report, None)
            }
            Err(err) => {
                error!("序列 {} 执行失败: {}", id, err);
                report.fail(&err);
                (report, Some(err))
            }
        }
    }

    async fn run_calls(&mut self, sequence: &Sequence, report: &mut SequenceReport) -> Result<()> {
        self.variables.seed(&sequence.vars);

        // 导入表每次执行重新构建
        let imports = ImportTable::resolve(sequence, self.loader.as_ref())?;
        let resolver = TemplateResolver::new(&sequence.origin_dir);

        for (index, call) in sequence.calls.iter().enumerate() {
            let name = match &call.from_import {
                Some(reference) => format!("{}.{}", reference.name, reference.call),
                None => call.display_name(index),
            };

            debug!("执行调用 {}: {}", index, name);
            let started = Instant::now();

            match self.run_call(call, &imports, &resolver).await {
                Ok(status_code) => {
                    report.add_call(
                        CallReport::success(index, &name)
                            .with_status_code(Some(status_code))
                            .with_duration(started.elapsed().as_millis() as u64),
                    );
                }
                Err(err) => {
                    let status_code = match &err {
                        ExecutorError::StatusMismatch { got, .. } => Some(*got),
                        _ => None,
                    };
                    report.add_call(
                        CallReport::failed(index, &name, &err.to_string())
                            .with_status_code(status_code)
                            .with_duration(started.elapsed().as_millis() as u64),
                    );
                    return Err(err);
                }
            }
        }

        Ok(())
    }

    /// 执行单个调用，返回响应状态码
    async fn run_call(
        &mut self,
        call: &Call,
        imports: &ImportTable,
        resolver: &TemplateResolver,
    ) -> Result<u16> {
        // 导入引用整体替换调用的其他字段
        let call = match &call.from_import {
            Some(reference) => imports.lookup(reference)?,
            None => call,
        };

        let rendered = resolver.render(call, &self.variables)?;

        let executor = self
            .registry
            .select(&rendered.call_type)
            .map_err(ExecutorError::Dispatch)?;

        debug!(
            "调度到执行器 {}: {} {}",
            executor.name(),
            rendered.method.as_deref().unwrap_or_default(),
            rendered.url
        );

        let result = executor
            .execute(&rendered)
            .await
            .map_err(ExecutorError::Execution)?;

        let want = rendered.want_status();
        if result.status_code != want {
            return Err(ExecutorError::StatusMismatch {
                want,
                got: result.status_code,
                body: pretty(result.body.as_ref()),
            });
        }

        if rendered.print {
            if let Some(body) = &result.body {
                self.print_body(body)?;
            }
        }

        let body = result.body_or_null();
        apply_exports(&rendered.exports, &body, &mut self.variables)?;
        check_asserts(&rendered.asserts, &body)?;

        Ok(result.status_code)
    }

    fn print_body(&mut self, body: &Value) -> Result<()> {
        let text =
            serde_json::to_string_pretty(body).map_err(|e| ExecutorError::Output(e.to_string()))?;
        writeln!(self.output, "{}", text).map_err(|e| ExecutorError::Output(e.to_string()))?;
        self.output
            .flush()
            .map_err(|e| ExecutorError::Output(e.to_string()))
    }
}

fn pretty(body: Option<&Value>) -> String {
    match body {
        Some(value) => serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
        None => "<empty body>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_strategy_default() {
        assert_eq!(FailureStrategy::default(), FailureStrategy::Continue);
    }

    #[test]
    fn test_failure_strategy_serde() {
        let strategy: FailureStrategy = serde_yaml::from_str("fail_fast").unwrap();
        assert_eq!(strategy, FailureStrategy::FailFast);
    }

    #[test]
    fn test_pretty_body() {
        assert_eq!(pretty(None), "<empty body>");
        assert!(pretty(Some(&serde_json::json!({"a": 1}))).contains("\"a\": 1"));
    }
}
