//! 调用模板渲染
//!
//! 调用先序列化为 YAML 文本，作为模板整体渲染后再解析回 [`Call`]。
//! 模板中可以使用变量上下文中的所有变量 (支持嵌套字段访问)，
//! 以及以下辅助函数：
//!
//! - `env(name)`: 读取环境变量，未设置时报错
//! - `readFile(path)`: 读取文件文本
//! - `readFileBase64(path)`: 读取文件并进行 base64 编码
//!
//! 相对路径基于序列文件所在目录解析。`{{ .user.name }}` 与
//! `{{ user.name }}` 等价。只识别 `{{ }}` 占位符，
//! 其余文本中的 `{%` 与 `{#` 原样保留。

use base64::{engine::general_purpose, Engine as _};
use minijinja::{Environment, Error as TemplateError, ErrorKind, UndefinedBehavior};
use regex::Regex;
use std::error::Error as _;
use std::path::{Path, PathBuf};
use tracing::debug;

use poke_common::Call;

use crate::{ExecutorError, Result, VariableContext};

/// 模板解析器，绑定序列所在目录
#[derive(Debug, Clone, Default)]
pub struct TemplateResolver {
    base_dir: PathBuf,
}

impl TemplateResolver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// 渲染调用
    pub fn render(&self, call: &Call, vars: &VariableContext) -> Result<Call> {
        let source = serde_yaml::to_string(call)
            .map_err(|e| ExecutorError::Render(format!("调用序列化失败: {}", e)))?;

        let rendered = self.render_str(&source, vars)?;

        serde_yaml::from_str(&rendered)
            .map_err(|e| ExecutorError::Render(format!("渲染结果无法解析为调用: {}", e)))
    }

    /// 渲染模板文本
    pub fn render_str(&self, source: &str, vars: &VariableContext) -> Result<String> {
        let source = prepare_source(source)?;
        let env = self.environment();

        let rendered = env
            .render_str(&source, vars.to_template_value())
            .map_err(|e| ExecutorError::Render(describe(&e)))?;

        debug!("模板渲染完成 ({} 字节)", rendered.len());
        Ok(rendered)
    }

    fn environment(&self) -> Environment<'static> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        // 保留 YAML 文本末尾换行
        env.set_keep_trailing_newline(true);

        env.add_function("env", |name: String| -> std::result::Result<String, TemplateError> {
            std::env::var(&name).map_err(|_| {
                TemplateError::new(
                    ErrorKind::InvalidOperation,
                    format!("环境变量 {} 未设置", name),
                )
            })
        });

        let base_dir = self.base_dir.clone();
        env.add_function(
            "readFile",
            move |path: String| -> std::result::Result<String, TemplateError> {
                let full = resolve_path(&base_dir, &path);
                std::fs::read_to_string(&full).map_err(|e| read_error(&full, e))
            },
        );

        let base_dir = self.base_dir.clone();
        env.add_function(
            "readFileBase64",
            move |path: String| -> std::result::Result<String, TemplateError> {
                let full = resolve_path(&base_dir, &path);
                let bytes = std::fs::read(&full).map_err(|e| read_error(&full, e))?;
                Ok(general_purpose::STANDARD.encode(bytes))
            },
        );

        env
    }
}

fn resolve_path(base_dir: &Path, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn read_error(path: &Path, err: std::io::Error) -> TemplateError {
    TemplateError::new(
        ErrorKind::InvalidOperation,
        format!("读取文件 {} 失败: {}", path.display(), err),
    )
}

/// 展开 minijinja 错误链
fn describe(err: &TemplateError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(&format!(": {}", cause));
        source = cause.source();
    }
    message
}

/// 渲染前预处理模板文本
///
/// `{{ }}` 标签内去掉以点开头的变量引用前缀 (`.name` -> `name`)，
/// 字符串字面量保持不变；标签外的 `{%` 与 `{#` 转义为字面输出。
fn prepare_source(source: &str) -> Result<String> {
    let tag = Regex::new(r"(?s)\{\{.*?\}\}|\{%|\{#")
        .map_err(|e| ExecutorError::Render(e.to_string()))?;
    let dot_ref = Regex::new(
        r#""(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|(^|[^\w\])"'.])\.([A-Za-z_])"#,
    )
    .map_err(|e| ExecutorError::Render(e.to_string()))?;

    Ok(tag
        .replace_all(source, |caps: &regex::Captures| match &caps[0] {
            "{%" => r#"{{ "{%" }}"#.to_string(),
            "{#" => r#"{{ "{#" }}"#.to_string(),
            tag => dot_ref
                .replace_all(tag, |refs: &regex::Captures| match refs.get(2) {
                    Some(ident) => format!("{}{}", &refs[1], ident.as_str()),
                    // 字符串字面量
                    None => refs[0].to_string(),
                })
                .into_owned(),
        })
        .into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(pairs: &[(&str, serde_json::Value)]) -> VariableContext {
        let mut ctx = VariableContext::new();
        for (k, v) in pairs {
            ctx.set(*k, v.clone());
        }
        ctx
    }

    #[test]
    fn test_prepare_source() {
        let prepare = |s: &str| prepare_source(s).unwrap();
        assert_eq!(prepare("{{.fooVar}}"), "{{fooVar}}");
        assert_eq!(prepare("{{ .user.name }}"), "{{ user.name }}");
        assert_eq!(prepare(".a {{ 1.5 }}"), ".a {{ 1.5 }}");
        assert_eq!(prepare("{{ user.name }}"), "{{ user.name }}");
        assert_eq!(prepare("{{ items[0].id }}"), "{{ items[0].id }}");
        assert_eq!(prepare("{{ \"a\".upper() }}"), "{{ \"a\".upper() }}");
        assert_eq!(prepare("{{ (.a) }}"), "{{ (a) }}");
    }

    #[test]
    fn test_string_literals_are_untouched() {
        let prepare = |s: &str| prepare_source(s).unwrap();
        assert_eq!(
            prepare("{{ readFile(\"secrets/.token\") }}"),
            "{{ readFile(\"secrets/.token\") }}"
        );
        assert_eq!(prepare("{{ 'v1 .beta' ~ .x }}"), "{{ 'v1 .beta' ~ x }}");

        let rendered = render_str_in(".", "{{ \"v1 .beta\" }}").unwrap();
        assert_eq!(rendered, "v1 .beta");
    }

    #[test]
    fn test_read_file_with_dot_prefixed_component() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".secrets")).unwrap();
        std::fs::write(dir.path().join(".secrets/.token"), "hidden").unwrap();

        let rendered = render_str_in(
            dir.path().to_str().unwrap(),
            "{{ readFile(\".secrets/.token\") }}",
        );
        assert_eq!(rendered.unwrap(), "hidden");
    }

    #[test]
    fn test_block_and_comment_markers_are_literal() {
        let call = Call::http("http://localhost/{{ path }}")
            .with_method("POST")
            .with_body(json!({ "css": "a{#fff}", "fmt": "{%d}", "mixed": "{% if x %}{{ .path }}" }));

        let rendered = TemplateResolver::default()
            .render(&call, &vars(&[("path", json!("p"))]))
            .unwrap();

        assert_eq!(rendered.url, "http://localhost/p");
        assert_eq!(
            rendered.body,
            Some(json!({ "css": "a{#fff}", "fmt": "{%d}", "mixed": "{% if x %}p" }))
        );
    }

    #[test]
    fn test_render_body_from_export() {
        let call = Call::http("http://localhost/use")
            .with_method("POST")
            .with_body(json!({ "name": "{{.fooVar}}" }));

        let rendered = TemplateResolver::default()
            .render(&call, &vars(&[("fooVar", json!("acme"))]))
            .unwrap();

        assert_eq!(rendered.body, Some(json!({ "name": "acme" })));
        assert_eq!(rendered.method.as_deref(), Some("POST"));
    }

    #[test]
    fn test_render_nested_fields() {
        let mut call = Call::http("{{ .server.host }}/users/{{ user.id }}");
        call.headers
            .insert("X-Tenant".to_string(), "{{ tenant }}".to_string());

        let ctx = vars(&[
            ("server", json!({ "host": "http://api.local" })),
            ("user", json!({ "id": 42 })),
            ("tenant", json!("acme")),
        ]);

        let rendered = TemplateResolver::default().render(&call, &ctx).unwrap();
        assert_eq!(rendered.url, "http://api.local/users/42");
        assert_eq!(rendered.headers["X-Tenant"], "acme");
    }

    #[test]
    fn test_undefined_variable_is_error() {
        let call = Call::http("{{ missing }}/x");
        let err = TemplateResolver::default()
            .render(&call, &VariableContext::new())
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Render(_)));
    }

    #[test]
    fn test_env_helper() {
        std::env::set_var("POKE_TEMPLATE_TEST_HOST", "http://from-env");
        let call = Call::http("{{ env(\"POKE_TEMPLATE_TEST_HOST\") }}/ping");
        let rendered = TemplateResolver::default()
            .render(&call, &VariableContext::new())
            .unwrap();
        assert_eq!(rendered.url, "http://from-env/ping");
    }

    #[test]
    fn test_env_helper_unset() {
        let call = Call::http("{{ env(\"POKE_TEMPLATE_TEST_DEFINITELY_UNSET\") }}");
        let err = TemplateResolver::default()
            .render(&call, &VariableContext::new())
            .unwrap_err();
        assert!(err.to_string().contains("POKE_TEMPLATE_TEST_DEFINITELY_UNSET"));
    }

    #[test]
    fn test_read_file_helpers() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("token.txt"), "secret").unwrap();

        let mut call = Call::http("http://localhost");
        call.headers.insert(
            "Authorization".to_string(),
            "Bearer {{ readFile(\"token.txt\") }}".to_string(),
        );
        call.headers.insert(
            "X-Encoded".to_string(),
            "{{ readFileBase64(\"token.txt\") }}".to_string(),
        );

        let rendered = TemplateResolver::new(dir.path())
            .render(&call, &VariableContext::new())
            .unwrap();
        assert_eq!(rendered.headers["Authorization"], "Bearer secret");
        assert_eq!(rendered.headers["X-Encoded"], "c2VjcmV0");
    }

    #[test]
    fn test_read_file_absolute_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("abs.txt");
        std::fs::write(&file, "absolute").unwrap();

        let source = format!("{{{{ readFile(\"{}\") }}}}", file.display());
        let rendered = render_str_in("/nonexistent", &source);
        assert_eq!(rendered.unwrap(), "absolute");
    }

    #[test]
    fn test_read_missing_file() {
        let err = render_str_in("/nonexistent", "{{ readFile(\"nope.txt\") }}").unwrap_err();
        assert!(matches!(err, ExecutorError::Render(_)));
    }

    #[test]
    fn test_malformed_template() {
        let err = render_str_in(".", "{{ unclosed").unwrap_err();
        assert!(matches!(err, ExecutorError::Render(_)));
    }

    #[test]
    fn test_unparsable_output() {
        let call = Call::http("{{ broken }}");
        let ctx = vars(&[("broken", json!("x'\nbogus-field: 1"))]);
        let err = TemplateResolver::default().render(&call, &ctx).unwrap_err();
        assert!(matches!(err, ExecutorError::Render(_)));
    }

    fn render_str_in(dir: &str, source: &str) -> Result<String> {
        TemplateResolver::new(dir).render_str(source, &VariableContext::new())
    }
}
