//! Taskmind Interface - 交互层
//!
//! 职责：
//! - CLI 命令行工具
//! - 结果渲染 (pretty / json / minimal)

pub mod cli;
pub mod output;


pub use cli::{CliConfig, CliError, OutputFormat, load_config, run_cli};
