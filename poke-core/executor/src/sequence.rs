//! 序列定义与加载

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use poke_common::Call;

use crate::{ExecutorError, Result};

/// 调用序列
///
/// 一个序列文件对应一个序列，按声明顺序执行其中的调用。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Sequence {
    /// 初始变量
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub vars: BTreeMap<String, Value>,

    /// 导入别名 -> 序列文件路径
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub imports: BTreeMap<String, String>,

    /// 调用列表
    #[serde(default)]
    pub calls: Vec<Call>,

    /// 序列文件所在目录，用于解析相对路径
    #[serde(skip)]
    pub origin_dir: PathBuf,
}

impl Sequence {
    /// 从 YAML 字符串加载序列
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| ExecutorError::SerdeError(e.to_string()))
    }

    /// 从 YAML 文件加载序列，origin_dir 设为文件所在目录
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| ExecutorError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut sequence = Self::from_yaml_str(&content).map_err(|e| ExecutorError::Load {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        sequence.origin_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Ok(sequence)
    }
}

/// 序列标识 -> 序列
pub type SequenceMap = BTreeMap<String, Sequence>;

/// 序列加载器
pub trait Loader: Send + Sync {
    /// 加载指定位置下的所有序列
    fn parse_all(&self, location: &Path) -> Result<SequenceMap>;

    /// 加载单个序列文件
    fn parse_one(&self, path: &Path) -> Result<Sequence>;
}

/// 文件系统加载器
///
/// 文件直接加载为单个序列；目录递归查找 `.yaml` / `.yml` 文件，
/// 以相对于目录的路径作为序列标识。
#[derive(Debug, Clone, Default)]
pub struct FsLoader;

impl FsLoader {
    pub fn new() -> Self {
        Self
    }

    fn is_sequence_file(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        )
    }
}

impl Loader for FsLoader {
    fn parse_all(&self, location: &Path) -> Result<SequenceMap> {
        let metadata = std::fs::metadata(location).map_err(|e| ExecutorError::Load {
            path: location.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut sequences = SequenceMap::new();

        if metadata.is_file() {
            let sequence = self.parse_one(location)?;
            sequences.insert(location.display().to_string(), sequence);
            return Ok(sequences);
        }

        info!("扫描序列目录: {}", location.display());

        for entry in WalkDir::new(location).sort_by_file_name() {
            let entry = entry.map_err(|e| ExecutorError::Load {
                path: location.to_path_buf(),
                reason: e.to_string(),
            })?;

            let path = entry.path();
            if !entry.file_type().is_file() || !Self::is_sequence_file(path) {
                continue;
            }

            let relative = path.strip_prefix(location).unwrap_or(path);
            let id = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            debug!("加载序列文件: {}", id);
            sequences.insert(id, self.parse_one(path)?);
        }

        info!("共加载 {} 个序列", sequences.len());
        Ok(sequences)
    }

    fn parse_one(&self, path: &Path) -> Result<Sequence> {
        Sequence::from_yaml_file(path)
    }
}
