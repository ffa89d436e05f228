//! List 命令处理

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

use poke_common::{Call, CallType};
use poke_executor::{FsLoader, Loader};

pub fn handle(path: &Path) -> Result<()> {
    let sequences = FsLoader::new()
        .parse_all(path)
        .with_context(|| format!("加载序列失败: {}", path.display()))?;

    if sequences.is_empty() {
        println!("{}", "没有找到任何序列文件".yellow());
        return Ok(());
    }

    println!("找到 {} 个序列:\n", sequences.len().to_string().green());

    for (id, sequence) in &sequences {
        println!("{}", id.cyan().bold());

        if !sequence.vars.is_empty() {
            let names: Vec<&str> = sequence.vars.keys().map(String::as_str).collect();
            println!("  变量: {}", names.join(", ").bright_black());
        }

        for (alias, import) in &sequence.imports {
            println!("  导入: {} -> {}", alias.yellow(), import);
        }

        println!("  调用: {}", sequence.calls.len().to_string().yellow());
        for (index, call) in sequence.calls.iter().enumerate() {
            println!("    {}", describe(index, call));
        }

        println!();
    }

    Ok(())
}

fn describe(index: usize, call: &Call) -> String {
    if let Some(reference) = &call.from_import {
        return format!(
            "{}. {} {}.{}",
            index,
            "import".magenta(),
            reference.name,
            reference.call
        );
    }

    let target = match &call.service_host {
        Some(host) if call.url.is_empty() => host.as_str(),
        _ => call.url.as_str(),
    };

    let method = match call.method.as_deref() {
        Some(m) if !m.is_empty() => m.to_uppercase(),
        _ if call.call_type == CallType::Http => "GET".to_string(),
        _ => "-".to_string(),
    };

    format!(
        "{}. {} [{}] {} {}",
        index,
        call.display_name(index),
        call.call_type,
        method,
        target.bright_black()
    )
}
