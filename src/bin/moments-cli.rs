//! Moments CLI 客户端（测试版）
//!
//! 非交互式 CLI：用已有凭证恢复会话，打印资料、动态与未读通知，
//! 然后持续轮询未读数直到超时或 Ctrl+C。

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use moments_sdk_core::app::nearby::GeoPoint;
use moments_sdk_core::{ClientConfig, FeedbackListener, MomentsClient};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

/// Moments CLI 客户端
#[derive(Parser, Debug)]
#[command(name = "moments-cli")]
#[command(about = "Moments CLI 客户端 - 用于测试和展示数据层功能", long_about = None)]
struct Args {
    /// 用户 access token（默认读取环境变量 MOMENTS_ACCESS_TOKEN）
    #[arg(short, long)]
    token: Option<String>,

    /// 运行时长（秒），0 表示持续运行
    #[arg(short, long, default_value = "0")]
    duration: u64,

    /// 查询附近的人使用的纬度
    #[arg(long, requires = "lng")]
    lat: Option<f64>,

    /// 查询附近的人使用的经度
    #[arg(long, requires = "lat")]
    lng: Option<f64>,

    /// 日志级别（默认: info,moments_sdk_core=debug）
    #[arg(long, default_value = "info,moments_sdk_core=debug")]
    log_level: String,

    /// 日志文件
    #[arg(long, default_value = "moments-cli.log")]
    log_file: String,
}

/// 初始化日志（同时输出到 stdout 和文件）
fn init_logger(log_level: &str, log_file: &str) -> Result<()> {
    use std::fs::OpenOptions;
    use std::io;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    // 优先使用环境变量 RUST_LOG（如果设置了），否则使用命令行参数
    let filter_layer =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("无法创建日志文件 {}", log_file))?;

    let stdout_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(true);

    // 文件不需要颜色
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file)
        .with_file(true)
        .with_line_number(true)
        .with_target(false)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    info!("[CLI] 📝 日志已同时输出到控制台和文件: {}", log_file);
    Ok(())
}

/// 把写操作反馈打印到日志
struct CliFeedback;

#[async_trait]
impl FeedbackListener for CliFeedback {
    async fn on_success(&self, message: String) {
        info!("[CLI/Feedback] ✅ {}", message);
    }

    async fn on_error(&self, message: String, detail: String) {
        error!("[CLI/Feedback] ❌ {}: {}", message, detail);
    }
}

async fn print_overview(client: &MomentsClient, location: Option<GeoPoint>) {
    let profile = client.profiles().get_current_profile().await;
    match (&profile.data, &profile.error) {
        (_, Some(err)) => warn!("[CLI] 加载资料失败: {:#}", err),
        (Some(Some(p)), None) => {
            let completeness = moments_sdk_core::app::profile::profile_completeness(p);
            info!(
                "[CLI] 👤 {} | 资料完整度 {}%",
                p.display_name(),
                completeness.percent
            );
        }
        _ => info!("[CLI] 👤 还没有资料"),
    }

    let moments = client.moments().active_moments().await;
    if let Some(list) = &moments.data {
        info!("[CLI] 📋 进行中/即将开始的动态（共 {} 个）:", list.len());
        let now = chrono::Utc::now();
        for m in list.iter().take(5) {
            info!(
                "[CLI]   - {} | {} | {}",
                m.title,
                m.status_at(now).as_str(),
                m.place.as_deref().unwrap_or("-")
            );
        }
    } else if let Some(err) = &moments.error {
        warn!("[CLI] 加载动态失败: {:#}", err);
    }

    if let Some(invites) = client.moments().my_invites().await.data {
        info!("[CLI] 📨 待处理邀请: {}", invites.len());
    }

    if let Some(point) = location {
        let nearby = client.nearby().nearby_users(Some(point), None).await;
        if let Some(users) = nearby.data {
            info!("[CLI] 📍 附近的人（共 {} 个）", users.len());
            for u in users.iter().take(5) {
                info!(
                    "[CLI]   - {} | {:.1}km",
                    u.name.as_deref().unwrap_or(&u.id),
                    u.distance_km
                );
            }
        }
        match client.geocoding().reverse_geocode(point).await {
            Ok(Some(city)) => info!("[CLI] 🏙️ 当前城市: {}", city),
            Ok(None) => info!("[CLI] 🏙️ 未识别到城市"),
            Err(e) => warn!("[CLI] 反向地理编码失败: {:#}", e),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(&args.log_level, &args.log_file)?;

    info!("[CLI] 🚀 Moments CLI 客户端（测试模式）");
    info!("[CLI] ⏱️  运行时长: {} 秒（0=持续运行）", args.duration);

    let config = ClientConfig::from_env()?;
    let token = args
        .token
        .clone()
        .or_else(|| config.access_token.clone())
        .context("缺少 access token：使用 --token 或设置 MOMENTS_ACCESS_TOKEN")?;

    let client = MomentsClient::new(config)?;
    client.set_feedback_listener(Arc::new(CliFeedback));

    info!("[CLI] 🔐 正在恢复会话...");
    let session = client
        .restore_session(&token)
        .await
        .map_err(|e| anyhow::anyhow!("恢复会话失败: {:#}", e))?;
    info!("[CLI] ✅ 会话已恢复！用户ID: {}", session.id);

    let location = match (args.lat, args.lng) {
        (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
        _ => None,
    };
    print_overview(&client, location).await;

    info!("[CLI] 📬 开始轮询未读通知...");
    let mut unread = client.notifications().watch_unread_count()?;
    let watch = async {
        loop {
            match unread.changed().await {
                Ok(result) => match (result.data, result.error) {
                    (_, Some(err)) => warn!("[CLI] 未读数刷新失败: {:#}", err),
                    (Some(count), None) => info!("[CLI] 📬 未读通知: {}", count),
                    _ => {}
                },
                Err(e) => {
                    error!("[CLI] 轮询结束: {:#}", e);
                    break;
                }
            }
        }
    };

    if args.duration > 0 {
        info!("[CLI] ⏰ {} 秒后自动退出", args.duration);
        tokio::select! {
            _ = watch => {}
            _ = sleep(Duration::from_secs(args.duration)) => {}
        }
    } else {
        info!("[CLI] ⏰ 持续运行中，按 Ctrl+C 退出");
        tokio::select! {
            _ = watch => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    }

    client.sign_out();
    info!("[CLI] 👋 程序退出");
    Ok(())
}
