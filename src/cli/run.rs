// src/cli/run.rs
//! Run 命令 - 常驻运行 context 监控和自动重启
//!
//! 启动顺序：接管或创建 session → 启动 context 监控 → 启动健康检查/自动重启，
//! 然后一直运行到 Ctrl-C。

use anyhow::Result;
use tracing::{error, info};

use super::app::App;

/// 处理 run 命令
pub async fn handle_run(app: App) -> Result<()> {
    info!(session = %app.config.session_name, "Session relay starting");

    // 1. 接管现有 session 或新建
    if app.driver.exists().await? {
        match app.driver.info().await {
            Ok(session_info) => info!(info = %session_info, "Attached to existing tmux session"),
            Err(e) => error!(error = %e, "Failed to read session info"),
        }
    } else {
        info!("Creating tmux session");
        app.driver.ensure().await?;
    }

    // 2. context 监控
    let context_monitor = app.context_monitor();
    context_monitor.start();

    // 3. 健康检查 + 自动重启
    let supervisor = app.supervisor();
    supervisor.start();

    info!("All services started");
    eprintln!(
        "Session relay 运行中 (session: {})，按 Ctrl+C 停止",
        app.config.session_name
    );

    tokio::signal::ctrl_c().await?;

    // 等待进行中的 tick 跑完，避免 kill 之后还没来得及重建 session 就退出
    info!("Shutting down");
    tokio::join!(context_monitor.shutdown(), supervisor.shutdown());
    info!("All services stopped");
    Ok(())
}
