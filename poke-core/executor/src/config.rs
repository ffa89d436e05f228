//! 运行配置管理
//!
//! 支持从多个源加载运行配置:
//! - 环境变量 (优先级最高)
//! - 配置文件 (TOML/YAML/JSON)
//! - 默认值 (优先级最低)
//!
//! 配置文件搜索路径 (按优先级):
//! 1. `POKE_CONFIG` 环境变量指定的路径
//! 2. `./poke.toml` / `./poke.yaml` / `./poke.json` (当前目录)
//! 3. `~/.config/poke/config.toml` (用户配置目录)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use poke_protocol::HttpConfig;

use crate::FailureStrategy;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// 运行配置 (顶层)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,

    /// HTTP 执行器配置
    #[serde(default)]
    pub http: HttpConfig,

    /// 执行行为配置
    #[serde(default)]
    pub run: RunConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// 执行行为配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    /// 第一个序列失败后停止
    #[serde(default)]
    pub fail_fast: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl RunConfig {
    pub fn failure_strategy(&self) -> FailureStrategy {
        if self.fail_fast {
            FailureStrategy::FailFast
        } else {
            FailureStrategy::Continue
        }
    }
}

impl RunnerConfig {
    /// 加载配置 (优先级: 环境变量 > 配置文件 > 默认值)
    ///
    /// 显式指定的配置文件优先于搜索路径。
    pub fn load_with(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit
            .map(Path::to_path_buf)
            .or_else(Self::find_config_file)
        {
            Some(path) => {
                tracing::debug!("加载配置文件: {:?}", path);
                Self::load_from_file(&path)?
            }
            None => {
                tracing::debug!("未找到配置文件，使用默认配置");
                Self::default()
            }
        };

        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// 从指定文件加载配置
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {:?}", path))?;

        // 根据文件扩展名选择解析器
        let config = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => toml::from_str(&content)
                .with_context(|| format!("解析 TOML 配置失败: {:?}", path))?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
                .with_context(|| format!("解析 YAML 配置失败: {:?}", path))?,
            Some("json") => serde_json::from_str(&content)
                .with_context(|| format!("解析 JSON 配置失败: {:?}", path))?,
            _ => anyhow::bail!("不支持的配置文件格式: {:?}", path),
        };

        Ok(config)
    }

    /// 查找配置文件 (按优先级搜索)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(path) = env::var("POKE_CONFIG") {
            let p = PathBuf::from(path);
            if p.exists() {
                return Some(p);
            }
        }

        let local = ["./poke.toml", "./poke.yaml", "./poke.json"];
        if let Some(path) = local.iter().map(PathBuf::from).find(|p| p.exists()) {
            return Some(path);
        }

        dirs::home_dir()
            .map(|home| home.join(".config/poke/config.toml"))
            .filter(|p| p.exists())
    }

    /// 从环境变量覆盖配置
    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("POKE_LOG_LEVEL") {
            self.log.level = level;
        }
        if let Some(timeout) = lookup("POKE_HTTP_TIMEOUT") {
            self.http.timeout = timeout
                .parse()
                .context("POKE_HTTP_TIMEOUT 取值无效")?;
        }
        if let Some(timeout) = lookup("POKE_HTTP_CONNECT_TIMEOUT") {
            self.http.connect_timeout = timeout
                .parse()
                .context("POKE_HTTP_CONNECT_TIMEOUT 取值无效")?;
        }
        if let Some(fail_fast) = lookup("POKE_FAIL_FAST") {
            self.run.fail_fast = parse_flag(&fail_fast).context("POKE_FAIL_FAST 取值无效")?;
        }

        Ok(())
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        if self.http.timeout == 0 {
            anyhow::bail!("http.timeout 不能为 0");
        }
        if self.http.connect_timeout == 0 {
            anyhow::bail!("http.connect_timeout 不能为 0");
        }
        if !LOG_LEVELS.contains(&self.log.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "未知的日志级别: {} (可选: {})",
                self.log.level,
                LOG_LEVELS.join(", ")
            );
        }

        Ok(())
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => anyhow::bail!("无法解析为布尔值: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = RunnerConfig::default();
        assert_eq!(config.log.level, "info");
        assert_eq!(config.http.timeout, 10);
        assert_eq!(config.http.connect_timeout, 10);
        assert!(!config.run.fail_fast);
        assert_eq!(config.run.failure_strategy(), FailureStrategy::Continue);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml() {
        let config: RunnerConfig = toml::from_str("[http]\ntimeout = 30\n").unwrap();
        assert_eq!(config.http.timeout, 30);
        assert_eq!(config.http.connect_timeout, 10);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("POKE_LOG_LEVEL", "debug"),
            ("POKE_HTTP_TIMEOUT", "3"),
            ("POKE_FAIL_FAST", "true"),
        ]
        .into_iter()
        .collect();

        let mut config = RunnerConfig::default();
        config
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.log.level, "debug");
        assert_eq!(config.http.timeout, 3);
        assert_eq!(config.http.connect_timeout, 10);
        assert_eq!(config.run.failure_strategy(), FailureStrategy::FailFast);
    }

    #[test]
    fn test_invalid_env_value() {
        let mut config = RunnerConfig::default();
        let err = config
            .apply_env(|key| (key == "POKE_HTTP_TIMEOUT").then(|| "soon".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("POKE_HTTP_TIMEOUT"));
    }

    #[test]
    fn test_validation() {
        let mut config = RunnerConfig::default();
        config.http.timeout = 0;
        assert!(config.validate().is_err());

        let mut config = RunnerConfig::default();
        config.log.level = "loud".to_string();
        assert!(config.validate().is_err());

        let mut config = RunnerConfig::default();
        config.log.level = "WARN".to_string();
        config.validate().unwrap();
    }

    #[test]
    fn test_fail_fast_flag_values() {
        for (raw, expected) in [("1", true), ("YES", true), ("off", false), ("false", false)] {
            let mut config = RunnerConfig::default();
            config
                .apply_env(|key| (key == "POKE_FAIL_FAST").then(|| raw.to_string()))
                .unwrap();
            assert_eq!(config.run.fail_fast, expected, "{}", raw);
        }

        let mut config = RunnerConfig::default();
        let err = config
            .apply_env(|key| (key == "POKE_FAIL_FAST").then(|| "maybe".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("POKE_FAIL_FAST"));
    }

    #[test]
    fn test_load_each_format() {
        let dir = tempfile::tempdir().unwrap();
        let files = [
            ("poke.toml", "[http]\ntimeout = 42\n[run]\nfail_fast = true\n"),
            ("poke.yaml", "http:\n  timeout: 42\nrun:\n  fail_fast: true\n"),
            ("poke.json", r#"{"http": {"timeout": 42}, "run": {"fail_fast": true}}"#),
        ];

        for (name, content) in files {
            let path = dir.path().join(name);
            fs::write(&path, content).unwrap();

            let loaded = RunnerConfig::load_from_file(&path).unwrap();
            assert_eq!(loaded.http.timeout, 42, "{}", name);
            assert_eq!(loaded.run.failure_strategy(), FailureStrategy::FailFast, "{}", name);
        }
    }

    #[test]
    fn test_load_with_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.yaml");
        fs::write(&path, "log:\n  level: warn\n").unwrap();

        let config = RunnerConfig::load_with(Some(&path)).unwrap();
        assert_eq!(config.http.timeout, 10);
    }

    #[test]
    fn test_unsupported_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("poke.ini");
        fs::write(&path, "timeout=1").unwrap();
        assert!(RunnerConfig::load_from_file(&path).is_err());
    }
}
