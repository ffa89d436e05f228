//! Poke CLI 应用

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use poke_executor::RunnerConfig;

mod commands;

use commands::output::OutputFormat;

#[derive(Parser)]
#[command(name = "poke")]
#[command(about = "Poke - 声明式 API 测试运行器", long_about = None)]
#[command(version)]
struct Cli {
    /// 日志级别 (覆盖配置文件与 POKE_LOG_LEVEL)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// 调试模式，等同于 --log-level debug
    #[arg(short, long, global = true)]
    debug: bool,

    /// 配置文件路径
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 执行序列文件或目录
    Run {
        /// 序列文件或目录
        path: PathBuf,

        /// 第一个序列失败后停止
        #[arg(long)]
        fail_fast: bool,

        /// 报告格式
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// 列出序列及其调用
    List {
        /// 序列文件或目录
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = RunnerConfig::load_with(cli.config.as_deref()).context("加载配置失败")?;

    // 初始化日志 (优先级: --debug > --log-level > 配置)
    let log_level = if cli.debug {
        "debug".to_string()
    } else {
        cli.log_level.clone().unwrap_or_else(|| config.log.level.clone())
    };

    let filter = EnvFilter::try_new(&log_level)
        .with_context(|| format!("无效的日志级别: {}", log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Poke CLI 启动");

    match cli.command {
        Commands::Run {
            path,
            fail_fast,
            format,
        } => commands::run::handle(&path, fail_fast, format, &config).await?,
        Commands::List { path } => commands::list::handle(&path)?,
    }

    Ok(())
}
