/// 帧接收端 (Frame Viewer)
///
/// 连接帧转发服务, 统计接收帧率, 可选保存最新一帧。
/// 断开后退出, 不自动重连。
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use log::{debug, info, warn, LevelFilter};

use crowd_sentinel::logging;
use crowd_sentinel::transport::{ClientEvent, ClientThread, FrameClient};

#[derive(Parser, Debug)]
#[command(author, version, about = "人群哨兵 - 帧接收端", long_about = None)]
struct Args {
    /// 帧服务地址
    #[arg(short, long, default_value = "127.0.0.1:8485")]
    server: String,

    /// 保存最新一帧到该路径
    #[arg(long)]
    save_latest: Option<PathBuf>,

    /// 单帧最大字节数
    #[arg(long, default_value_t = 32 * 1024 * 1024)]
    max_frame_bytes: u32,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    logging::init(level, None).context("日志初始化失败")?;

    let client = FrameClient::connect(&args.server, args.max_frame_bytes)
        .with_context(|| format!("无法连接 {}", args.server))?;
    let ClientThread {
        events,
        thread,
        shutdown,
    } = client.spawn().context("接收线程启动失败")?;

    let mut total = 0u64;
    let mut window_frames = 0u64;
    let mut window_bytes = 0usize;
    let mut window_start = Instant::now();

    for event in events.iter() {
        match event {
            ClientEvent::Frame(payload) => {
                total += 1;
                window_frames += 1;
                window_bytes += payload.len();

                match image::load_from_memory(&payload) {
                    Ok(image) => debug!("🖼️ 帧 #{} {}x{}", total, image.width(), image.height()),
                    Err(e) => warn!("⚠️ 帧 #{} 无法解码: {}", total, e),
                }
                if let Some(path) = &args.save_latest {
                    if let Err(e) = std::fs::write(path, &payload) {
                        warn!("⚠️ 保存失败 {}: {}", path.display(), e);
                    }
                }

                let elapsed = window_start.elapsed();
                if elapsed >= Duration::from_secs(1) {
                    info!(
                        "📊 FPS: {:.1} | {:.1} KB/帧 | 累计 {} 帧",
                        window_frames as f64 / elapsed.as_secs_f64(),
                        window_bytes as f64 / window_frames as f64 / 1024.0,
                        total
                    );
                    window_frames = 0;
                    window_bytes = 0;
                    window_start = Instant::now();
                }
            }
            ClientEvent::Disconnected(e) => {
                info!("🔌 连接已断开: {} (共接收 {} 帧)", e, total);
                break;
            }
        }
    }

    shutdown.shutdown();
    let _ = thread.join();
    Ok(())
}
