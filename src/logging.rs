//! 日志初始化 (fern + chrono)

use std::io::stdout;
use std::path::Path;

use fern::Dispatch;
use log::LevelFilter;

/// 输出到标准输出, 可选同时写入日志文件
///
/// 格式: `[时间 级别 目标] 消息`; 逐帧记录的目标为 `sentinel::record`
pub fn init(level: LevelFilter, log_file: Option<&Path>) -> anyhow::Result<()> {
    let mut dispatch = Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, false),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .chain(stdout());
    if let Some(path) = log_file {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }
    dispatch.apply()?;
    Ok(())
}
