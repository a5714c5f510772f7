//! 命令处理逻辑
//!
//! 实现各种CLI命令的处理逻辑

use crate::cli::args::{Args, Commands, OutputFormat};
use crate::config::{Config, ConfigLoader, TomlConfigLoader};
use crate::error::Result;
use crate::health::{CheckDefinition, ProbeResult};
use crate::logging::{LogConfig, LoggingSystem};
use crate::service::{probe_configured_checks, WatchdogService};
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::broadcast;
use tracing::{error, info};

/// 命令处理器trait
#[async_trait]
pub trait Command: Send + Sync {
    /// 执行命令
    async fn execute(&self, args: &Args) -> Result<()>;
}

/// 按命令行参数选择命令处理器
pub fn command_for(args: &Args) -> Box<dyn Command> {
    match &args.command {
        Commands::Run => Box::new(RunCommand),
        Commands::Validate { .. } => Box::new(ValidateCommand),
        Commands::Probe { .. } => Box::new(ProbeCommand),
    }
}

/// 初始化日志，命令行级别优先于配置文件级别
pub fn init_logging(args: &Args, config_level: Option<&str>) -> Result<LoggingSystem> {
    let log_config = match (args.log_level, config_level) {
        (Some(level), _) => LogConfig {
            level: level.into(),
            ..Default::default()
        },
        (None, Some(level)) => LogConfig::with_level_str(level),
        (None, None) => LogConfig::default(),
    };
    Ok(LoggingSystem::setup_logging(log_config)?)
}

async fn load_config(args: &Args) -> Result<Config> {
    TomlConfigLoader::new(true)
        .load_from_file(args.get_config_path())
        .await
}

/// 运行命令
pub struct RunCommand;

#[async_trait]
impl Command for RunCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        let config = load_config(args).await?;
        init_logging(args, Some(&config.global.log_level))?;

        info!(
            "Service Watchdog v{} 启动，配置文件: {}",
            crate::VERSION,
            args.get_config_path().display()
        );

        let service = WatchdogService::new(config)?;
        let (shutdown_tx, _) = broadcast::channel(16);

        let signal_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("收到Ctrl+C信号，开始关闭"),
                Err(e) => error!("监听Ctrl+C信号失败: {}", e),
            }
            let _ = signal_tx.send(());
        });

        service.run(shutdown_tx).await
    }
}

/// 验证命令
pub struct ValidateCommand;

#[async_trait]
impl Command for ValidateCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Validate {
            config_path,
            verbose,
        } = &args.command
        {
            init_logging(args, None)?;
            let config_file = config_path
                .clone()
                .unwrap_or_else(|| args.get_config_path());

            self.validate_config_file(&config_file, *verbose).await
        } else {
            Ok(())
        }
    }
}

impl ValidateCommand {
    /// 验证配置文件
    async fn validate_config_file(&self, config_path: &Path, verbose: bool) -> Result<()> {
        println!("验证配置文件: {}", config_path.display());

        let loader = TomlConfigLoader::new(true);
        let config = loader.load_from_file(config_path).await?;

        if verbose {
            println!("配置验证通过！");
            println!("全局配置:");
            println!("  日志级别: {}", config.global.log_level);
            println!("  最大并发探测: {}", config.global.max_concurrent_probes);
            println!("  默认探测间隔: {}秒", config.global.default_frequency_seconds);
            println!(
                "  健康报告间隔: {}秒",
                config.global.health_report_interval_seconds
            );
            println!("存储后端: {:?}", config.store.backend);
            println!(
                "Web API: {}",
                if config.web.enabled {
                    format!("{}:{}", config.web.bind_address, config.web.port)
                } else {
                    "禁用".to_string()
                }
            );

            println!("健康检查:");
            for (i, check) in config.checks.iter().enumerate() {
                println!("  {}. {} ({})", i + 1, check.name, check.service_uri);
                println!("     后缀路径: {}", check.suffix_path);
                if !check.warning_status_codes.is_empty() {
                    println!("     警告状态码: {:?}", check.warning_status_codes);
                }
                if !check.error_status_codes.is_empty() {
                    println!("     错误状态码: {:?}", check.error_status_codes);
                }
            }
        } else {
            println!("✓ 配置文件验证通过");
            println!("✓ 找到 {} 个健康检查配置", config.checks.len());
        }

        Ok(())
    }
}

/// 一次性探测命令
pub struct ProbeCommand;

#[async_trait]
impl Command for ProbeCommand {
    async fn execute(&self, args: &Args) -> Result<()> {
        if let Commands::Probe { name, format } = &args.command {
            let config = load_config(args).await?;
            init_logging(args, Some(&config.global.log_level))?;
            self.probe(&config, name.as_deref(), format).await
        } else {
            Ok(())
        }
    }
}

impl ProbeCommand {
    async fn probe(&self, config: &Config, name: Option<&str>, format: &OutputFormat) -> Result<()> {
        let results = probe_configured_checks(config, name).await?;

        if results.is_empty() {
            match name {
                Some(name) => eprintln!("未找到名为 '{name}' 的健康检查"),
                None => eprintln!("配置中没有任何健康检查"),
            }
            return Ok(());
        }

        match format {
            OutputFormat::Json => {
                let json_results: Vec<_> = results.iter().map(|(_, result)| result).collect();
                println!("{}", serde_json::to_string_pretty(&json_results)?);
            }
            OutputFormat::Table => print_table_results(&results),
            OutputFormat::Text => print_text_results(&results),
        }

        Ok(())
    }
}

fn print_text_results(results: &[(CheckDefinition, ProbeResult)]) {
    for (definition, result) in results {
        let status_icon = if result.classification.is_healthy() {
            "✓"
        } else {
            "✗"
        };
        println!(
            "{} {} ({}) - {} - {} - {}ms",
            status_icon,
            definition.name,
            definition.key(),
            result.classification,
            result.status,
            result.duration_ms()
        );

        if let Some(error) = &result.error_message {
            println!("  错误: {error}");
        }
    }
}

fn print_table_results(results: &[(CheckDefinition, ProbeResult)]) {
    println!(
        "{:<24} {:<10} {:<12} {:<10} {:<30}",
        "名称", "状态", "结果", "耗时", "错误信息"
    );
    println!("{}", "-".repeat(90));

    for (definition, result) in results {
        println!(
            "{:<24} {:<10} {:<12} {:<10} {:<30}",
            truncate_string(&definition.name, 24),
            result.classification.to_string(),
            result.status.to_string(),
            format!("{}ms", result.duration_ms()),
            result.error_message.as_deref().unwrap_or("")
        );
    }
}

fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
