use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use uuid::Uuid;

use vless_generator::config::{DynamicConfig, QueryParams, TemplatesConfig};
use vless_generator::{generate_vless_url, TemplateStore};

/// 离线生成客户端配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// 配置模板类型
    #[arg(short = 't', long = "type", default_value = "vless")]
    config_type: String,

    /// 客户端 UUID (默认随机生成)
    #[arg(short, long)]
    uuid: Option<String>,

    /// 查询参数，格式同 HTTP 接口，例如 "server=example.com&port=443&ws-path=/ws"
    #[arg(short, long, default_value = "")]
    query: String,

    /// 配置模板目录 (默认使用内置模板)
    #[arg(long)]
    template_dir: Option<PathBuf>,

    /// 只输出 VLESS URL
    #[arg(long)]
    url_only: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let store = TemplateStore::load(&TemplatesConfig {
        directory: args.template_dir,
        types: vec![args.config_type.clone()],
    })?;

    let uuid = args.uuid.unwrap_or_else(|| Uuid::new_v4().to_string());
    let dynamic = DynamicConfig::from_query(&QueryParams::parse(&args.query));

    let config = store.generate_config(&args.config_type, &uuid, &dynamic)?;
    let url = generate_vless_url(&config, &uuid)?;

    if args.url_only {
        println!("{}", url);
        return Ok(());
    }

    eprintln!("========================================");
    eprintln!("配置文件生成工具");
    eprintln!("========================================");
    eprintln!("UUID: {}", uuid);
    eprintln!("VLESS URL: {}", url);
    eprintln!();

    println!("{}", serde_json::to_string_pretty(&config)?);

    Ok(())
}
