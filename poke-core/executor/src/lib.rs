//! Poke 执行器
//!
//! 调用序列执行引擎：加载序列、渲染模板、调度执行器、处理导出与断言。

pub mod assertions;
pub mod config;
pub mod imports;
pub mod query;
pub mod report;
pub mod runner;
pub mod sequence;
pub mod template;
pub mod variables;

pub use assertions::{apply_exports, check_asserts};
pub use config::{LogConfig, RunConfig, RunnerConfig};
pub use imports::ImportTable;
pub use query::{values_equal, Query};
pub use report::{CallReport, CallStatus, RunReport, SequenceReport};
pub use runner::{FailureStrategy, SequenceRunner};
pub use sequence::{FsLoader, Loader, Sequence, SequenceMap};
pub use template::TemplateResolver;
pub use variables::VariableContext;

use poke_protocol::ProtocolError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("序列加载失败 {}: {reason}", .path.display())]
    Load { path: PathBuf, reason: String },

    #[error("导入 {alias} 加载失败: {reason}")]
    ImportLoad { alias: String, reason: String },

    #[error("导入 {alias} ({}) 包含导入声明或导入引用，不支持嵌套导入", .path.display())]
    NestedImports { alias: String, path: PathBuf },

    #[error("未知导入别名: {0}")]
    UnknownImportAlias(String),

    #[error("导入 {alias} 中不存在调用 {call}")]
    UnknownImportCall { alias: String, call: String },

    #[error("模板渲染失败: {0}")]
    Render(String),

    #[error("调度失败: {0}")]
    Dispatch(#[source] ProtocolError),

    #[error("调用执行失败: {0}")]
    Execution(#[source] ProtocolError),

    #[error("状态码不符: want {want} got {got}\n{body}")]
    StatusMismatch { want: u16, got: u16, body: String },

    #[error("查询 {query} 执行失败: {reason}")]
    Query { query: String, reason: String },

    #[error("导出变量 {name} 失败: {reason}")]
    Export { name: String, reason: String },

    #[error("断言失败 {query} (-want +got):\n{diff}")]
    Assertion { query: String, diff: String },

    #[error("输出失败: {0}")]
    Output(String),

    #[error("没有可执行的序列")]
    NoSequences,

    #[error("{0}")]
    SequencesFailed(CombinedError),

    #[error("序列化错误: {0}")]
    SerdeError(String),
}

pub type Result<T> = std::result::Result<T, ExecutorError>;

/// 单个序列的失败记录
#[derive(Debug)]
pub struct SequenceFailure {
    /// 序列标识
    pub sequence: String,

    /// 失败原因
    pub error: ExecutorError,
}

/// 多个序列失败的聚合错误
#[derive(Debug, Default)]
pub struct CombinedError {
    pub failures: Vec<SequenceFailure>,
}

impl CombinedError {
    pub fn new(failures: Vec<SequenceFailure>) -> Self {
        Self { failures }
    }

    /// 失败的序列标识
    pub fn failed_sequences(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.sequence.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for CombinedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} 个序列执行失败:", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "\n- {}: {}", failure.sequence, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for CombinedError {}
