//! Poke 协议层
//!
//! 提供统一的调用执行接口：每种协议实现 [`Executor`]，
//! 由 [`ExecutorRegistry`] 按调用类型选择。

pub mod http;
pub mod registry;
pub mod traits;

pub use http::{HttpConfig, HttpExecutor};
pub use registry::ExecutorRegistry;
pub use traits::Executor;

pub use poke_common::{Call, CallType, ExecuteResult};

use thiserror::Error;

/// 协议层错误
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("unhandled client type: {0}")]
    UnhandledClientType(String),

    #[error("执行器 {0} 已注册")]
    ExecutorAlreadyRegistered(String),

    #[error("客户端构建失败: {0}")]
    ClientBuildFailed(String),

    #[error("请求构建失败: {0}")]
    InvalidRequest(String),

    #[error("请求执行失败: {0}")]
    RequestFailed(String),

    #[error("响应解析失败: {0}")]
    DecodeError(String),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
