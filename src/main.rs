use std::time::Duration;

use anyhow::{Context, Result};
use cadet_core::config::AppConfig;
use cadet_portal::{
    app::Application,
    shutdown::{wait_for_shutdown_signal, ShutdownManager},
};
use clap::{Arg, ArgMatches, Command};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let config = AppConfig::load(config_path).with_context(|| {
        format!("加载配置失败: {}", config_path.unwrap_or("默认路径"))
    })?;

    // 命令行参数优先于配置文件
    let log_level = matches
        .get_one::<String>("log-level")
        .unwrap_or(&config.observability.log_level);
    let log_format = matches
        .get_one::<String>("log-format")
        .unwrap_or(&config.observability.log_format);
    init_logging(log_level, log_format)?;

    match matches.subcommand() {
        Some(("migrate", _)) => migrate(config).await,
        Some(("enroll", sub)) => enroll(config, sub).await,
        _ => serve(config).await,
    }
}

fn cli() -> Command {
    Command::new("cadet-portal")
        .version(env!("CARGO_PKG_VERSION"))
        .about("学员管理门户：任务生命周期与积分引擎")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径，缺省时依次查找 config/portal.toml、portal.toml")
                .global(true),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .global(true),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式")
                .value_parser(["json", "pretty"])
                .global(true),
        )
        .subcommand(Command::new("serve").about("启动API服务器（默认）"))
        .subcommand(Command::new("migrate").about("创建或升级数据库表结构"))
        .subcommand(
            Command::new("enroll").about("登记新学员").arg(
                Arg::new("name")
                    .short('n')
                    .long("name")
                    .value_name("FULL_NAME")
                    .help("学员姓名")
                    .required(true),
            ),
        )
}

async fn serve(config: AppConfig) -> Result<()> {
    info!("启动学员门户");
    let app = Application::new(config).await?;

    let shutdown_manager = ShutdownManager::new();
    let shutdown_rx = shutdown_manager.subscribe().await;
    let app_handle = tokio::spawn(async move {
        if let Err(e) = app.run(shutdown_rx).await {
            error!("应用运行失败: {e:#}");
        }
    });

    if let Err(e) = wait_for_shutdown_signal().await {
        error!("监听关闭信号失败: {e}");
    }
    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown().await;

    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(Ok(())) => info!("应用已优雅关闭"),
        Ok(Err(e)) => error!("应用关闭时发生错误: {e}"),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    info!("学员门户已退出");
    Ok(())
}

async fn migrate(config: AppConfig) -> Result<()> {
    // 连接时即完成迁移
    Application::new(config).await?;
    info!("数据库迁移完成");
    Ok(())
}

async fn enroll(config: AppConfig, matches: &ArgMatches) -> Result<()> {
    let name = matches
        .get_one::<String>("name")
        .context("缺少学员姓名")?;
    let app = Application::new(config).await?;
    let cadet = app.enroll(name).await?;
    println!("{}", cadet.id);
    Ok(())
}

/// 初始化日志系统
fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}
