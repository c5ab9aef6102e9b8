//! 远程帧输入 (局域网帧服务)
//!
//! 每个负载是一帧编码图像, 时间戳取到达时刻; 断开后不重连

use std::time::Instant;

use log::warn;

use super::FrameSource;
use crate::detection::Frame;
use crate::error::{Result, SentinelError};
use crate::transport::{FrameClient, ShutdownHandle};

pub struct RemoteSource {
    addr: String,
    client: FrameClient,
    started: Instant,
    next_index: u64,
}

impl RemoteSource {
    pub fn connect(addr: &str, max_frame_bytes: u32) -> Result<Self> {
        let client = FrameClient::connect(addr, max_frame_bytes)
            .map_err(|e| SentinelError::SourceUnavailable(format!("{}: {}", addr, e)))?;
        Ok(Self::from_client(addr, client))
    }

    pub fn from_client(addr: &str, client: FrameClient) -> Self {
        Self {
            addr: addr.to_string(),
            client,
            started: Instant::now(),
            next_index: 0,
        }
    }
}

impl FrameSource for RemoteSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            let payload = self.client.recv_frame()?;
            let timestamp = self.started.elapsed();
            match Frame::from_encoded(self.next_index, timestamp, payload) {
                Ok(frame) => {
                    self.next_index += 1;
                    return Ok(Some(frame));
                }
                Err(e) => warn!("⚠️ 远程帧解码失败, 已跳过: {}", e),
            }
        }
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.addr)
    }

    fn interrupt_handle(&self) -> Option<ShutdownHandle> {
        self.client.shutdown_handle().ok()
    }
}
