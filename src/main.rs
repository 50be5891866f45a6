use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vless_generator::config::{AppConfig, LogFormat, Validator, SERVICE_NAME, SERVICE_VERSION};
use vless_generator::{AppState, Server};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML 配置文件路径
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 监听地址
    #[arg(long)]
    listen: Option<String>,

    /// HTTP 端口
    #[arg(short, long)]
    port: Option<u16>,

    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// 日志格式
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// 配置模板目录 (默认使用内置模板)
    #[arg(long)]
    template_dir: Option<PathBuf>,

    /// 配置模板类型，逗号分隔
    #[arg(long, value_delimiter = ',')]
    template_types: Option<Vec<String>>,
}

impl Args {
    /// 合并配置：命令行参数 > 配置文件 > 默认值
    fn into_config(self) -> Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::default(),
        };

        if let Some(listen) = self.listen {
            config.server.listen = listen;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(log_level) = self.log_level {
            config.service.log_level = log_level;
        }
        if let Some(log_format) = self.log_format {
            config.service.log_format = log_format;
        }
        if let Some(dir) = self.template_dir {
            config.templates.directory = Some(dir);
        }
        if let Some(types) = self.template_types {
            config.templates.types = types;
        }

        Validator::validate(&config)?;
        Ok(config)
    }
}

fn init_logging(config: &AppConfig) {
    // 优先使用环境变量 RUST_LOG，否则使用配置的日志级别
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.service.log_level.to_lowercase()));

    match config.service.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Args::parse().into_config()?;

    init_logging(&config);

    info!("🚀 Starting {} v{}", SERVICE_NAME, SERVICE_VERSION);

    // 加载模板、文本与页面 (失败即退出)
    let state = AppState::load(&config)?;
    info!("✅ 资源加载完成，模板类型: {:?}", state.templates.template_types());

    let server = Server::bind(&config.listen_addr(), state).await?;

    let port = config.server.port;
    info!("服务端点:");
    info!("  首页: http://localhost:{}/", port);
    info!(
        "  配置页: http://localhost:{}/<type>/<uuid>?server=example.com&port=443&ws-path=/websocket&lang=ru",
        port
    );
    info!(
        "  配置下载: http://localhost:{}/config/<type>/<uuid>.json?server=example.com",
        port
    );
    info!("  健康检查: http://localhost:{}/health", port);

    server.run().await?;

    Ok(())
}
