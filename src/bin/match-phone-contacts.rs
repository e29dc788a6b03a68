//! `match-phone-contacts` 服务端
//!
//! 在本地 SQLite 用户目录上提供通讯录匹配端点，调用者凭证交给认证服务校验。

use anyhow::{Context, Result};
use clap::Parser;
use moments_sdk_core::functions::db::create_sqlite_pool_with_migration;
use moments_sdk_core::functions::{router, MatchState, RemoteTokenVerifier, SqliteContactDirectory};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "match-phone-contacts")]
#[command(about = "通讯录匹配服务", long_about = None)]
struct Args {
    /// 监听地址
    #[arg(long, default_value = "127.0.0.1:8787")]
    bind: SocketAddr,

    /// 用户目录数据库
    #[arg(long, default_value = "sqlite://directory.db")]
    database_url: String,

    /// 认证服务基础地址（默认读取 MOMENTS_API_URL）
    #[arg(long)]
    api_url: Option<String>,

    /// 匿名 key（默认读取 MOMENTS_ANON_KEY）
    #[arg(long)]
    anon_key: Option<String>,

    /// 日志级别（RUST_LOG 优先）
    #[arg(long, default_value = "info,moments_sdk_core=debug,tower_http=debug")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_target(false)
        .init();

    let api_url = match args.api_url {
        Some(url) => url,
        None => std::env::var("MOMENTS_API_URL").context("缺少 --api-url 或 MOMENTS_API_URL")?,
    };
    let anon_key = match args.anon_key {
        Some(key) => key,
        None => {
            std::env::var("MOMENTS_ANON_KEY").context("缺少 --anon-key 或 MOMENTS_ANON_KEY")?
        }
    };

    let pool = create_sqlite_pool_with_migration(&args.database_url).await?;
    let state = MatchState {
        directory: Arc::new(SqliteContactDirectory::new(pool)),
        verifier: Arc::new(RemoteTokenVerifier::new(api_url, anon_key)),
    };

    info!("[ContactMatch] 🚀 监听 http://{}", args.bind);
    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("无法监听 {}", args.bind))?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}
