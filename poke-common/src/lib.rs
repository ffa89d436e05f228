//! Poke 通用类型定义
//!
//! 此 crate 包含协议层 (poke-protocol) 与执行引擎 (poke-executor) 之间共享的类型：
//! 调用定义 [`Call`] 及其后处理指令，以及执行器返回的 [`ExecuteResult`]。

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// 调用类型
///
/// 以小写字符串形式序列化。未识别的类型在加载阶段保留为 [`CallType::Other`]，
/// 由调度器在执行前拒绝。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum CallType {
    /// HTTP 调用 (默认)
    #[default]
    Http,

    /// gRPC 调用
    Grpc,

    /// 未知类型
    Other(String),
}

impl CallType {
    /// 类型名称
    pub fn as_str(&self) -> &str {
        match self {
            CallType::Http => "http",
            CallType::Grpc => "grpc",
            CallType::Other(name) => name,
        }
    }

    /// 该协议未声明 want-status 时的期望状态码
    ///
    /// HTTP 为 200，gRPC 为 0 (OK)。
    pub fn default_want_status(&self) -> u16 {
        match self {
            CallType::Grpc => 0,
            _ => 200,
        }
    }

    fn is_default(&self) -> bool {
        *self == CallType::Http
    }
}

impl From<String> for CallType {
    fn from(value: String) -> Self {
        match value.to_lowercase().as_str() {
            "" | "http" => CallType::Http,
            "grpc" => CallType::Grpc,
            _ => CallType::Other(value),
        }
    }
}

impl From<&str> for CallType {
    fn from(value: &str) -> Self {
        CallType::from(value.to_string())
    }
}

impl From<CallType> for String {
    fn from(value: CallType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 导出指令：将查询结果写入变量上下文
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Export {
    /// 查询表达式
    pub jq: String,

    /// 目标变量名
    #[serde(rename = "as")]
    pub name: String,
}

/// 断言指令：查询结果必须与期望值结构相等
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Assert {
    /// 查询表达式
    pub jq: String,

    /// 期望值
    #[serde(default)]
    pub expected: Value,
}

/// 导入引用：使用其他序列文件中定义的调用
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FromImport {
    /// 导入别名
    pub name: String,

    /// 被引用的调用名称
    pub call: String,
}

/// 单次网络调用
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Call {
    /// 调用名称 (未设置时使用位置标签 `call_<index>`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// 协议类型
    #[serde(
        rename = "type",
        default,
        skip_serializing_if = "CallType::is_default"
    )]
    pub call_type: CallType,

    /// 请求体
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    /// 请求头
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    /// 目标服务 (gRPC 使用)
    #[serde(
        rename = "service-host",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub service_host: Option<String>,

    /// 目标 URL
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,

    /// 方法 (HTTP 方法或 gRPC 方法)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// 期望状态码
    #[serde(
        rename = "want-status",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub want_status: Option<u16>,

    /// 导出指令
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exports: Vec<Export>,

    /// 断言指令
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub asserts: Vec<Assert>,

    /// 是否打印响应体
    #[serde(default, skip_serializing_if = "is_false")]
    pub print: bool,

    /// 是否跳过 TLS 证书校验
    #[serde(rename = "skip-verify", default, skip_serializing_if = "is_false")]
    pub skip_verify: bool,

    /// 导入引用 (存在时忽略其他字段)
    #[serde(
        rename = "from-import",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub from_import: Option<FromImport>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl Call {
    /// 创建指向指定 URL 的 HTTP 调用
    pub fn http(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }

    /// 设置调用名称
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// 设置方法
    pub fn with_method(mut self, method: &str) -> Self {
        self.method = Some(method.to_string());
        self
    }

    /// 设置请求体
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// 生效的期望状态码
    pub fn want_status(&self) -> u16 {
        self.want_status
            .unwrap_or_else(|| self.call_type.default_want_status())
    }

    /// 显示名称，未命名时使用 `call_<index>`
    pub fn display_name(&self, index: usize) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("call_{}", index),
        }
    }
}

/// 执行结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteResult {
    /// 状态码 (HTTP 状态码或 gRPC 状态码)
    pub status_code: u16,

    /// 响应体 (可能为空)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl ExecuteResult {
    pub fn new(status_code: u16, body: Option<Value>) -> Self {
        Self { status_code, body }
    }

    /// 响应体，缺失时为 null
    pub fn body_or_null(&self) -> Value {
        self.body.clone().unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_type_parsing() {
        assert_eq!(CallType::from(""), CallType::Http);
        assert_eq!(CallType::from("http"), CallType::Http);
        assert_eq!(CallType::from("HTTP"), CallType::Http);
        assert_eq!(CallType::from("grpc"), CallType::Grpc);
        assert_eq!(
            CallType::from("soap"),
            CallType::Other("soap".to_string())
        );
    }

    #[test]
    fn test_want_status_defaults() {
        let call = Call::http("http://example.com");
        assert_eq!(call.want_status(), 200);

        let grpc = Call {
            call_type: CallType::Grpc,
            ..Default::default()
        };
        assert_eq!(grpc.want_status(), 0);

        let explicit = Call {
            want_status: Some(201),
            ..Default::default()
        };
        assert_eq!(explicit.want_status(), 201);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(Call::default().display_name(3), "call_3");
        assert_eq!(Call::default().with_name("login").display_name(3), "login");
    }

    #[test]
    fn test_call_from_yaml() {
        let yaml = r#"
name: login
type: http
url: https://api.example.com/login
method: POST
headers:
  Content-Type: application/json
body:
  user: admin
want-status: 201
exports:
  - jq: .token
    as: token
asserts:
  - jq: .status
    expected: active
print: true
skip-verify: true
"#;
        let call: Call = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(call.name.as_deref(), Some("login"));
        assert_eq!(call.call_type, CallType::Http);
        assert_eq!(call.want_status(), 201);
        assert_eq!(call.body, Some(json!({"user": "admin"})));
        assert_eq!(call.exports[0].name, "token");
        assert_eq!(call.asserts[0].expected, json!("active"));
        assert!(call.print);
        assert!(call.skip_verify);
        assert!(call.from_import.is_none());
    }

    #[test]
    fn test_call_unknown_type_survives_loading() {
        let call: Call = serde_yaml::from_str("type: carrier-pigeon\nurl: x").unwrap();
        assert_eq!(
            call.call_type,
            CallType::Other("carrier-pigeon".to_string())
        );
    }

    #[test]
    fn test_call_rejects_unknown_fields() {
        let result: Result<Call, _> = serde_yaml::from_str("url: x\nbogus: 1");
        assert!(result.is_err());
    }

    #[test]
    fn test_call_from_import() {
        let call: Call =
            serde_yaml::from_str("from-import:\n  name: auth\n  call: login").unwrap();
        let import = call.from_import.unwrap();
        assert_eq!(import.name, "auth");
        assert_eq!(import.call, "login");
    }

    #[test]
    fn test_execute_result_body_or_null() {
        assert_eq!(ExecuteResult::new(204, None).body_or_null(), Value::Null);
        assert_eq!(
            ExecuteResult::new(200, Some(json!({"a": 1}))).body_or_null(),
            json!({"a": 1})
        );
    }
}
