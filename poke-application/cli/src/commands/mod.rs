//! CLI 命令处理模块

pub mod list;
pub mod output;
pub mod run;
