/// 人群哨兵 (Crowd Sentinel)
///
/// 智能视频监控: 人群聚集与危险物品告警
///
/// 系统架构:
/// 1. 流水线线程: 采集 → 检测 → 跟踪 → 告警 → 发布
/// 2. 转发线程:   帧服务 (每个客户端独立写线程)
/// 3. 主线程:     操作员控制台 (标准输入)
use std::io::BufRead;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use log::{error, info, warn, LevelFilter};
use mimalloc::MiMalloc;

use crowd_sentinel::detection::{Detector, NullDetector, ReplayDetector};
use crowd_sentinel::pipeline::{Command, Controller, USAGE};
use crowd_sentinel::{logging, InputSource, LogAlarm, SentinelConfig};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// 人群哨兵参数
#[derive(Parser, Debug)]
#[command(author, version, about = "人群哨兵 - 人群聚集与危险物品告警", long_about = None)]
struct Args {
    /// 配置文件 (不存在时自动创建)
    #[arg(short, long, default_value = "sentinel.json")]
    config: PathBuf,

    /// 输入源: camera:0 | tcp://host:port | 图片或图片目录
    #[arg(short, long)]
    source: Option<String>,

    /// 预先计算的检测结果 (JSON Lines)
    #[arg(short, long)]
    detections: Option<PathBuf>,

    /// 启动帧转发服务
    #[arg(long)]
    serve: bool,

    /// 日志文件
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// 输出调试日志
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
    logging::init(level, args.log_file.as_deref()).context("日志初始化失败")?;

    info!("🚀 人群哨兵启动");
    let settings = SentinelConfig::load(&args.config);
    settings.print_summary();

    let detector: Box<dyn Detector> = match &args.detections {
        Some(path) => Box::new(
            ReplayDetector::from_path(path)
                .with_context(|| format!("无法读取检测结果 {}", path.display()))?,
        ),
        None => {
            warn!("⚠️ 未配置检测器, 所有帧按无检测处理");
            Box::new(NullDetector)
        }
    };

    let mut controller = Controller::new(settings, detector, Box::new(LogAlarm))?;
    if args.serve {
        let addr = controller.serve().context("帧转发服务启动失败")?;
        info!("📡 客户端可连接 tcp://{}", addr);
    }

    if let Some(source) = &args.source {
        let source: InputSource = source.parse()?;
        if let Err(e) = controller.start(&source) {
            error!("❌ 启动失败: {}", e);
        }
    }

    info!("⌨️ {}", USAGE);
    run_console(&mut controller)?;

    controller.shutdown();
    info!("👋 已退出");
    Ok(())
}

/// 读取标准输入的操作员指令, 直到 quit 或输入结束
fn run_console(controller: &mut Controller) -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("读取控制台输入失败")?;
        if line.trim().is_empty() {
            continue;
        }
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                warn!("⚠️ {} ({})", e, USAGE);
                continue;
            }
        };
        let quit = command == Command::Quit;
        match controller.execute(command) {
            Ok(reply) => info!("💬 {}", reply),
            Err(e) => warn!("⚠️ {}", e),
        }
        if quit {
            return Ok(());
        }
    }

    // 输入结束 (例如重定向): 等待当前回放完成
    if let Some(exit) = controller.wait() {
        info!("⏹️ 回放结束: {:?}", exit);
    }
    Ok(())
}
