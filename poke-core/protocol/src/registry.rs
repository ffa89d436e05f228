//! 执行器注册表 (调用调度)

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use poke_common::CallType;

use crate::{Executor, ProtocolError, Result};

/// 执行器注册表
///
/// 按调用类型管理所有已注册的执行器
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<CallType, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    /// 创建新的执行器注册表
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// 注册执行器，同一调用类型只能注册一次
    pub fn register(&mut self, executor: Arc<dyn Executor>) -> Result<()> {
        let call_type = executor.call_type();
        info!("注册执行器: {} ({})", call_type, executor.name());

        if self.executors.contains_key(&call_type) {
            return Err(ProtocolError::ExecutorAlreadyRegistered(
                call_type.to_string(),
            ));
        }

        self.executors.insert(call_type, executor);
        Ok(())
    }

    pub fn with_executor(mut self, executor: Arc<dyn Executor>) -> Self {
        let call_type = executor.call_type();
        self.executors.entry(call_type).or_insert(executor);
        self
    }

    /// 选择调用类型对应的执行器
    pub fn select(&self, call_type: &CallType) -> Result<Arc<dyn Executor>> {
        debug!("选择执行器: {}", call_type);

        if let CallType::Other(name) = call_type {
            return Err(ProtocolError::UnhandledClientType(name.clone()));
        }

        self.executors
            .get(call_type)
            .cloned()
            .ok_or_else(|| ProtocolError::UnhandledClientType(call_type.to_string()))
    }
}
