//! Service Watchdog 主程序入口

use anyhow::{Context, Result};
use service_watchdog::cli::{command_for, Args};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    let command = command_for(&args);
    command
        .execute(&args)
        .await
        .context("命令执行失败")?;

    Ok(())
}
