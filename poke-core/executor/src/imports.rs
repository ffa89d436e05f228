//! 导入解析

use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info};

use poke_common::{Call, FromImport};

use crate::{ExecutorError, Loader, Result, Sequence};

/// 导入表：别名 -> 调用名称 -> 调用
///
/// 每次执行序列时重新构建，归该次执行所有。
#[derive(Debug, Clone, Default)]
pub struct ImportTable {
    calls: HashMap<String, HashMap<String, Call>>,
}

impl ImportTable {
    /// 加载序列声明的全部导入
    ///
    /// 相对路径基于序列所在目录解析。任一导入失败则整体失败；
    /// 被导入的序列不能再声明导入。
    pub fn resolve(sequence: &Sequence, loader: &dyn Loader) -> Result<Self> {
        let mut table = Self::default();

        for (alias, path) in &sequence.imports {
            let path = Path::new(path);
            let full = if path.is_absolute() {
                path.to_path_buf()
            } else {
                sequence.origin_dir.join(path)
            };

            info!("加载导入 {}: {}", alias, full.display());

            let imported = loader
                .parse_one(&full)
                .map_err(|e| ExecutorError::ImportLoad {
                    alias: alias.clone(),
                    reason: e.to_string(),
                })?;

            // 被导入的序列不能声明导入，也不能包含导入引用
            let nested = !imported.imports.is_empty()
                || imported.calls.iter().any(|c| c.from_import.is_some());
            if nested {
                return Err(ExecutorError::NestedImports {
                    alias: alias.clone(),
                    path: full,
                });
            }

            let calls = imported
                .calls
                .into_iter()
                .enumerate()
                .map(|(index, call)| (call.display_name(index), call))
                .collect::<HashMap<_, _>>();

            debug!("导入 {} 包含 {} 个调用", alias, calls.len());
            table.calls.insert(alias.clone(), calls);
        }

        Ok(table)
    }

    /// 查找导入的调用
    pub fn lookup(&self, reference: &FromImport) -> Result<&Call> {
        let calls = self
            .calls
            .get(&reference.name)
            .ok_or_else(|| ExecutorError::UnknownImportAlias(reference.name.clone()))?;

        calls
            .get(&reference.call)
            .ok_or_else(|| ExecutorError::UnknownImportCall {
                alias: reference.name.clone(),
                call: reference.call.clone(),
            })
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SequenceMap;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// 按路径返回预置序列，并记录请求的路径
    #[derive(Default)]
    struct MapLoader {
        files: BTreeMap<PathBuf, Sequence>,
        requested: Mutex<Vec<PathBuf>>,
    }

    impl Loader for MapLoader {
        fn parse_all(&self, _location: &Path) -> Result<SequenceMap> {
            Ok(SequenceMap::new())
        }

        fn parse_one(&self, path: &Path) -> Result<Sequence> {
            self.requested.lock().unwrap().push(path.to_path_buf());
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| ExecutorError::Load {
                    path: path.to_path_buf(),
                    reason: "not found".to_string(),
                })
        }
    }

    fn auth_sequence() -> Sequence {
        Sequence {
            calls: vec![
                Call::http("http://auth/login").with_name("login"),
                Call::http("http://auth/anonymous"),
            ],
            ..Default::default()
        }
    }

    fn importing(imports: &[(&str, &str)]) -> Sequence {
        Sequence {
            imports: imports
                .iter()
                .map(|(a, p)| (a.to_string(), p.to_string()))
                .collect(),
            origin_dir: PathBuf::from("/defs/flows"),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_relative_to_origin() {
        let mut loader = MapLoader::default();
        loader
            .files
            .insert(PathBuf::from("/defs/flows/../common/auth.yaml"), auth_sequence());

        let table = ImportTable::resolve(&importing(&[("auth", "../common/auth.yaml")]), &loader)
            .unwrap();

        let reference = FromImport {
            name: "auth".to_string(),
            call: "login".to_string(),
        };
        assert_eq!(table.lookup(&reference).unwrap().url, "http://auth/login");

        // 未命名的调用以位置标签索引
        let positional = FromImport {
            name: "auth".to_string(),
            call: "call_1".to_string(),
        };
        assert_eq!(
            table.lookup(&positional).unwrap().url,
            "http://auth/anonymous"
        );
    }

    #[test]
    fn test_resolve_absolute_path() {
        let mut loader = MapLoader::default();
        loader
            .files
            .insert(PathBuf::from("/shared/auth.yaml"), auth_sequence());

        let table =
            ImportTable::resolve(&importing(&[("auth", "/shared/auth.yaml")]), &loader).unwrap();
        let reference = FromImport {
            name: "auth".to_string(),
            call: "login".to_string(),
        };
        assert!(table.lookup(&reference).is_ok());
        assert_eq!(
            loader.requested.lock().unwrap().as_slice(),
            &[PathBuf::from("/shared/auth.yaml")]
        );
    }

    #[test]
    fn test_nested_imports_rejected() {
        let mut nested = auth_sequence();
        nested
            .imports
            .insert("deeper".to_string(), "x.yaml".to_string());

        let mut loader = MapLoader::default();
        loader.files.insert(PathBuf::from("/shared/auth.yaml"), nested);

        let err = ImportTable::resolve(&importing(&[("auth", "/shared/auth.yaml")]), &loader)
            .unwrap_err();
        assert!(matches!(err, ExecutorError::NestedImports { ref alias, .. } if alias == "auth"));
    }

    #[test]
    fn test_imported_from_import_rejected() {
        let mut nested = auth_sequence();
        nested.calls.push(Call {
            from_import: Some(FromImport {
                name: "other".to_string(),
                call: "login".to_string(),
            }),
            ..Default::default()
        });

        let mut loader = MapLoader::default();
        loader.files.insert(PathBuf::from("/shared/auth.yaml"), nested);

        let err = ImportTable::resolve(&importing(&[("auth", "/shared/auth.yaml")]), &loader)
            .unwrap_err();
        assert!(matches!(
            err,
            ExecutorError::NestedImports { ref alias, ref path }
                if alias == "auth" && path == Path::new("/shared/auth.yaml")
        ));
    }

    #[test]
    fn test_any_failure_aborts() {
        let mut loader = MapLoader::default();
        loader
            .files
            .insert(PathBuf::from("/shared/auth.yaml"), auth_sequence());

        let err = ImportTable::resolve(
            &importing(&[("auth", "/shared/auth.yaml"), ("billing", "/missing.yaml")]),
            &loader,
        )
        .unwrap_err();
        assert!(matches!(err, ExecutorError::ImportLoad { ref alias, .. } if alias == "billing"));
    }

    #[test]
    fn test_lookup_errors() {
        let table = ImportTable::default();
        let err = table
            .lookup(&FromImport {
                name: "nope".to_string(),
                call: "login".to_string(),
            })
            .unwrap_err();
        assert!(matches!(err, ExecutorError::UnknownImportAlias(ref a) if a == "nope"));

        let mut loader = MapLoader::default();
        loader
            .files
            .insert(PathBuf::from("/shared/auth.yaml"), auth_sequence());
        let table =
            ImportTable::resolve(&importing(&[("auth", "/shared/auth.yaml")]), &loader).unwrap();
        let err = table
            .lookup(&FromImport {
                name: "auth".to_string(),
                call: "logout".to_string(),
            })
            .unwrap_err();
        assert!(
            matches!(err, ExecutorError::UnknownImportCall { ref call, .. } if call == "logout")
        );
    }

    #[test]
    fn test_no_imports() {
        let table = ImportTable::resolve(&Sequence::default(), &MapLoader::default()).unwrap();
        assert!(table.is_empty());
    }
}
