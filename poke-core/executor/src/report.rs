//! 执行报告

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CombinedError, ExecutorError, Result, SequenceFailure};

/// 一次运行的汇总报告
#[derive(Debug, Serialize, Deserialize)]
pub struct RunReport {
    /// 开始时间
    pub started_at: DateTime<Utc>,

    /// 总耗时（毫秒）
    pub duration_ms: u64,

    /// 是否因快速失败提前停止
    pub stopped_early: bool,

    /// 各序列报告 (按执行顺序)
    pub sequences: Vec<SequenceReport>,

    /// 失败原因，用于生成聚合错误
    #[serde(skip)]
    pub failures: Vec<SequenceFailure>,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            duration_ms: 0,
            stopped_early: false,
            sequences: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// 记录一个序列的结果
    pub fn record(&mut self, report: SequenceReport, error: Option<ExecutorError>) {
        if let Some(error) = error {
            self.failures.push(SequenceFailure {
                sequence: report.sequence.clone(),
                error,
            });
        }
        self.sequences.push(report);
    }

    /// 是否全部通过 (空运行不算通过)
    pub fn all_passed(&self) -> bool {
        !self.sequences.is_empty() && self.sequences.iter().all(|s| s.passed)
    }

    pub fn passed_count(&self) -> usize {
        self.sequences.iter().filter(|s| s.passed).count()
    }

    pub fn failed_count(&self) -> usize {
        self.sequences.len() - self.passed_count()
    }

    /// 失败的序列标识
    pub fn failed_sequences(&self) -> Vec<&str> {
        self.sequences
            .iter()
            .filter(|s| !s.passed)
            .map(|s| s.sequence.as_str())
            .collect()
    }

    /// 转换为运行结果
    ///
    /// 没有任何序列时返回 `NoSequences`；存在失败时返回聚合错误。
    pub fn into_result(self) -> Result<()> {
        if self.sequences.is_empty() {
            return Err(ExecutorError::NoSequences);
        }

        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(ExecutorError::SequencesFailed(CombinedError::new(
                self.failures,
            )))
        }
    }

    /// 导出为 JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// 导出为 YAML
    pub fn to_yaml(&self) -> serde_yaml::Result<String> {
        serde_yaml::to_string(self)
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

/// 序列报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceReport {
    /// 序列标识
    pub sequence: String,

    /// 是否通过
    pub passed: bool,

    /// 调用报告列表
    pub calls: Vec<CallReport>,

    /// 错误信息
    pub error: Option<String>,

    /// 总耗时（毫秒）
    pub duration_ms: u64,
}

impl SequenceReport {
    pub fn new(sequence: &str) -> Self {
        Self {
            sequence: sequence.to_string(),
            passed: true,
            calls: Vec::new(),
            error: None,
            duration_ms: 0,
        }
    }

    pub fn add_call(&mut self, call: CallReport) {
        if call.status == CallStatus::Failed {
            self.passed = false;
        }
        self.calls.push(call);
    }

    /// 标记序列失败
    pub fn fail(&mut self, error: &ExecutorError) {
        self.passed = false;
        self.error = Some(error.to_string());
    }

    pub fn passed_count(&self) -> usize {
        self.calls
            .iter()
            .filter(|c| c.status == CallStatus::Success)
            .count()
    }
}

/// 调用报告
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallReport {
    /// 调用索引
    pub index: usize,

    /// 调用名称
    pub name: String,

    /// 调用状态
    pub status: CallStatus,

    /// 响应状态码
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    /// 错误信息
    pub error: Option<String>,

    /// 耗时（毫秒）
    pub duration_ms: u64,
}

impl CallReport {
    pub fn success(index: usize, name: &str) -> Self {
        Self {
            index,
            name: name.to_string(),
            status: CallStatus::Success,
            status_code: None,
            error: None,
            duration_ms: 0,
        }
    }

    pub fn failed(index: usize, name: &str, error: &str) -> Self {
        Self {
            index,
            name: name.to_string(),
            status: CallStatus::Failed,
            status_code: None,
            error: Some(error.to_string()),
            duration_ms: 0,
        }
    }

    pub fn with_status_code(mut self, status_code: Option<u16>) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}

/// 调用状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallStatus {
    Success,
    Failed,
}
