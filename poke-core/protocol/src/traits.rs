//! 执行器抽象接口

use async_trait::async_trait;
use poke_common::{Call, CallType, ExecuteResult};

use crate::Result;

/// 执行器 trait
///
/// 每种协议一个实例。实现不得修改调用本身；成功时必须填写状态码，
/// 响应体可以为空。只有传输或协议层面的失败才返回错误，
/// 状态码是否符合预期由执行引擎判断。
#[async_trait]
pub trait Executor: Send + Sync {
    /// 执行一次调用
    async fn execute(&self, call: &Call) -> Result<ExecuteResult>;

    /// 该执行器处理的调用类型
    fn call_type(&self) -> CallType;

    /// 执行器名称
    fn name(&self) -> String {
        self.call_type().to_string()
    }
}
