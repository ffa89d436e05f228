//! 变量上下文

use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// 序列执行期间的变量表
///
/// 由序列的 `vars` 初始化，导出指令写入，模板渲染读取。
/// 每个序列执行结束后清空，变量不会泄漏到下一个序列。
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    values: HashMap<String, Value>,
}

impl VariableContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// 合并初始变量，同名覆盖
    pub fn seed(&mut self, vars: &BTreeMap<String, Value>) {
        for (name, value) in vars {
            self.values.insert(name.clone(), value.clone());
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// 转换为模板上下文
    pub fn to_template_value(&self) -> minijinja::Value {
        minijinja::Value::from_serialize(&self.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_seed_overwrites() {
        let mut ctx = VariableContext::new();
        ctx.set("host", json!("old"));

        let mut vars = BTreeMap::new();
        vars.insert("host".to_string(), json!("new"));
        vars.insert("port".to_string(), json!(8080));
        ctx.seed(&vars);

        assert_eq!(ctx.get("host"), Some(&json!("new")));
        assert_eq!(ctx.get("port"), Some(&json!(8080)));
        assert_eq!(ctx.len(), 2);
    }

    #[test]
    fn test_clear() {
        let mut ctx = VariableContext::new();
        ctx.set("token", json!("abc"));
        assert_eq!(ctx.get("token"), Some(&json!("abc")));

        ctx.clear();
        assert!(ctx.is_empty());
        assert!(ctx.get("token").is_none());
    }
}
