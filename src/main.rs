//! Session Relay CLI
//!
//! 远程控制运行在 tmux 中的 Claude Code 会话

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};

use session_relay::cli::{format_status, handle_run, App};
use session_relay::Config;

#[derive(Parser)]
#[command(name = "srelay")]
#[command(about = "Session Relay - 远程控制 tmux 中的 Claude Code 会话")]
#[command(version)]
struct Cli {
    /// 配置文件路径（默认 ~/.config/session-relay/config.json）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 常驻运行：context 监控 + 健康检查/自动重启
    Run,
    /// 向会话提问并等待回应
    Ask {
        /// 问题内容
        #[arg(required = true)]
        prompt: Vec<String>,
        /// 最长等待时间（秒）
        #[arg(long, default_value = "600")]
        timeout_secs: u64,
    },
    /// 查看会话状态
    Status {
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
    /// 手动执行 /compact
    Compact,
    /// 清空会话上下文 (/clear)
    Reset,
    /// 显示 tmux session 信息
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 通过 RUST_LOG 环境变量控制日志级别，默认为 info
    // 例如: RUST_LOG=debug srelay run
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("session_relay=info,srelay=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;
    let app = App::from_config(config)?;

    match cli.command {
        Commands::Run => {
            handle_run(app).await?;
        }
        Commands::Ask {
            prompt,
            timeout_secs,
        } => {
            let relay = app.relay();
            let reply = relay
                .ask_and_wait(&prompt.join(" "), Duration::from_secs(timeout_secs))
                .await?;
            println!("{}", reply.trim_end());
        }
        Commands::Status { json } => {
            let status = app.relay().status().await?;
            println!("{}", format_status(&status, json));
        }
        Commands::Compact => {
            app.relay().compact().await?;
            println!("已发送 {}", app.config.compact_command);
        }
        Commands::Reset => {
            app.relay().reset().await?;
            println!("✅ Claude Code session 已重置");
        }
        Commands::Info => {
            println!("{}", app.driver.info().await?);
        }
    }

    Ok(())
}
