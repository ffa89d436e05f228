//! 导出与断言处理

use serde_json::Value;
use tracing::{debug, info};

use poke_common::{Assert, Export};

use crate::query::{type_name, values_equal};
use crate::{ExecutorError, Query, Result, VariableContext};

/// 执行导出指令，将结果写入变量上下文
///
/// 查询必须恰好产生一个字符串结果。
pub fn apply_exports(
    exports: &[Export],
    body: &Value,
    vars: &mut VariableContext,
) -> Result<()> {
    for export in exports {
        let query = Query::parse(&export.jq)?;
        let results = query.run(body)?;

        let value = match results.as_slice() {
            [Value::String(s)] => s.clone(),
            [other] => {
                return Err(ExecutorError::Export {
                    name: export.name.clone(),
                    reason: format!(
                        "查询 {} 的结果类型为 {}，需要 string",
                        query.source(),
                        type_name(other)
                    ),
                })
            }
            _ => {
                return Err(ExecutorError::Export {
                    name: export.name.clone(),
                    reason: format!(
                        "查询 {} 产生了 {} 个结果，需要恰好 1 个",
                        query.source(),
                        results.len()
                    ),
                })
            }
        };

        debug!("导出变量 {} = {}", export.name, value);
        vars.set(export.name.clone(), Value::String(value));
    }

    Ok(())
}

/// 执行断言指令
///
/// 查询无结果时按 null 比较；多个结果视为错误。
pub fn check_asserts(asserts: &[Assert], body: &Value) -> Result<()> {
    for assert in asserts {
        let query = Query::parse(&assert.jq)?;
        let mut results = query.run(body)?;

        let got = match results.len() {
            0 => Value::Null,
            1 => results.remove(0),
            n => {
                return Err(ExecutorError::Query {
                    query: query.source().to_string(),
                    reason: format!("断言查询产生了 {} 个结果", n),
                })
            }
        };

        if !values_equal(&assert.expected, &got) {
            let mut lines = Vec::new();
            diff(".", &assert.expected, &got, &mut lines);
            return Err(ExecutorError::Assertion {
                query: query.source().to_string(),
                diff: lines.join("\n"),
            });
        }

        info!("断言通过: {}", query.source());
    }

    Ok(())
}

/// 按路径列出期望值与实际值的差异
fn diff(path: &str, want: &Value, got: &Value, out: &mut Vec<String>) {
    match (want, got) {
        (Value::Object(w), Value::Object(g)) => {
            for (key, wv) in w {
                let child = join_path(path, key);
                match g.get(key) {
                    Some(gv) => diff(&child, wv, gv, out),
                    None => out.push(format!("  {}:\n  - {}", child, render(wv))),
                }
            }
            for (key, gv) in g {
                if !w.contains_key(key) {
                    out.push(format!("  {}:\n  + {}", join_path(path, key), render(gv)));
                }
            }
        }
        (Value::Array(w), Value::Array(g)) if w.len() == g.len() => {
            for (i, (wv, gv)) in w.iter().zip(g.iter()).enumerate() {
                diff(&format!("{}[{}]", path.trim_end_matches('.'), i), wv, gv, out);
            }
        }
        _ if values_equal(want, got) => {}
        _ => out.push(format!(
            "  {}:\n  - {}\n  + {}",
            path,
            render(want),
            render(got)
        )),
    }
}

fn join_path(path: &str, key: &str) -> String {
    if path == "." {
        format!(".{}", key)
    } else {
        format!("{}.{}", path, key)
    }
}

fn render(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| value.to_string())
}
