//! HTTP 执行器

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use poke_common::{Call, CallType, ExecuteResult};

use crate::{Executor, ProtocolError, Result};

/// HTTP 执行器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// 请求超时（秒）
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// 连接超时（秒）
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

fn default_timeout() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            connect_timeout: default_connect_timeout(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }
}

/// HTTP 执行器
///
/// 持有两个客户端：常规客户端，以及供 `skip-verify` 调用使用的不校验证书的客户端。
pub struct HttpExecutor {
    /// 常规 HTTP 客户端
    client: Client,

    /// 跳过证书校验的 HTTP 客户端
    insecure_client: Client,
}

impl HttpExecutor {
    /// 创建新的 HTTP 执行器
    pub fn new(config: HttpConfig) -> Result<Self> {
        let client = Self::build_client(&config, false)?;
        let insecure_client = Self::build_client(&config, true)?;

        Ok(Self {
            client,
            insecure_client,
        })
    }

    fn build_client(config: &HttpConfig, skip_verify: bool) -> Result<Client> {
        Client::builder()
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .danger_accept_invalid_certs(skip_verify)
            .build()
            .map_err(|e| ProtocolError::ClientBuildFailed(e.to_string()))
    }

    fn client_for(&self, call: &Call) -> &Client {
        if call.skip_verify {
            &self.insecure_client
        } else {
            &self.client
        }
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(&self, call: &Call) -> Result<ExecuteResult> {
        let method = match call.method.as_deref() {
            None | Some("") => Method::GET,
            Some(m) => Method::from_bytes(m.to_uppercase().as_bytes())
                .map_err(|e| ProtocolError::InvalidRequest(format!("非法 HTTP 方法 {}: {}", m, e)))?,
        };

        debug!("执行 HTTP 调用: {} {}", method, call.url);

        let mut request = self.client_for(call).request(method, &call.url);

        // 先设置请求头，json() 不会覆盖已存在的 Content-Type
        for (key, value) in &call.headers {
            request = request.header(key, value);
        }

        if let Some(body) = &call.body {
            debug!("添加请求体: {}", body);
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProtocolError::RequestFailed(e.to_string()))?;

        let status_code = response.status().as_u16();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProtocolError::RequestFailed(format!("读取响应体失败: {}", e)))?;

        let body = if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            None
        } else {
            Some(
                serde_json::from_slice(&bytes)
                    .map_err(|e| ProtocolError::DecodeError(format!("响应体不是合法 JSON: {}", e)))?,
            )
        };

        debug!("HTTP 调用完成: status={}", status_code);

        Ok(ExecuteResult { status_code, body })
    }

    fn call_type(&self) -> CallType {
        CallType::Http
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_config_default() {
        let config = HttpConfig::default();
        assert_eq!(config.timeout, 10);
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_http_executor_creation() {
        let executor = HttpExecutor::new(HttpConfig::default()).unwrap();
        assert_eq!(executor.call_type(), CallType::Http);
        assert_eq!(executor.name(), "http");
    }

    #[tokio::test]
    async fn test_invalid_method() {
        let executor = HttpExecutor::new(HttpConfig::default()).unwrap();
        let call = Call::http("http://127.0.0.1:1/").with_method("NOT A METHOD");
        let err = executor.execute(&call).await.unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidRequest(_)));
    }
}
