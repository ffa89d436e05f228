//! 报告输出格式化
//!
//! 提供 text/json/yaml 三种报告格式

use anyhow::{Context, Result};
use clap::ValueEnum;
use colored::Colorize;

use poke_executor::{CallStatus, RunReport};

/// 报告格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

impl OutputFormat {
    /// 是否为机器可读的结构化格式
    pub fn is_structured(self) -> bool {
        !matches!(self, OutputFormat::Text)
    }
}

/// 根据格式输出运行报告
pub fn print_report(report: &RunReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => print_text(report),
        OutputFormat::Json => {
            println!("{}", report.to_json().context("序列化 JSON 报告失败")?);
        }
        OutputFormat::Yaml => {
            print!("{}", report.to_yaml().context("序列化 YAML 报告失败")?);
        }
    }
    Ok(())
}

fn print_text(report: &RunReport) {
    println!("\n{}", "=".repeat(60));
    println!("{}", "执行报告".bold());
    println!("{}", "=".repeat(60));
    println!();

    for sequence in &report.sequences {
        let icon = if sequence.passed {
            "✓".green()
        } else {
            "✗".red()
        };
        println!(
            "{} {} ({} ms)",
            icon.bold(),
            sequence.sequence.cyan().bold(),
            sequence.duration_ms.to_string().bright_black()
        );

        for call in &sequence.calls {
            let icon = match call.status {
                CallStatus::Success => "✓".green(),
                CallStatus::Failed => "✗".red(),
            };
            let status = call
                .status_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string());

            println!(
                "   {} {} {} [{}] {} ms",
                icon,
                call.index.to_string().bright_black(),
                call.name,
                status.yellow(),
                call.duration_ms.to_string().bright_black()
            );
        }

        if let Some(error) = &sequence.error {
            for line in error.lines() {
                println!("   {}", line.red());
            }
        }
        println!();
    }

    println!("序列统计:");
    println!("  总数: {}", report.sequences.len().to_string().bright_blue());
    println!("  成功: {}", report.passed_count().to_string().green());
    println!("  失败: {}", report.failed_count().to_string().red());
    if report.stopped_early {
        println!("  {}", "快速失败: 剩余序列未执行".yellow());
    }
    println!("  耗时: {} ms", report.duration_ms.to_string().yellow());

    println!("{}", "=".repeat(60));
    let status = if report.all_passed() {
        format!("{} 全部序列执行成功", "✓".green().bold())
    } else {
        format!("{} 存在失败的序列", "✗".red().bold())
    };
    println!("{}", status);
    println!("{}", "=".repeat(60));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structured_formats() {
        assert!(!OutputFormat::Text.is_structured());
        assert!(OutputFormat::Json.is_structured());
        assert!(OutputFormat::Yaml.is_structured());
    }
}
