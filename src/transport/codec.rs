//! 帧编解码: `[4字节长度, 大端][负载]`
//!
//! 长度不含前缀本身; 长度为0或超过上限视为前缀损坏

use crate::error::{Result, SentinelError};

pub const HEADER_LEN: usize = 4;

/// 负载 → 带长度前缀的消息
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.is_empty() {
        return Err(SentinelError::MalformedFrame("empty payload".to_string()));
    }
    let len = u32::try_from(payload.len()).map_err(|_| {
        SentinelError::MalformedFrame(format!("payload too large: {} bytes", payload.len()))
    })?;

    let mut message = Vec::with_capacity(HEADER_LEN + payload.len());
    message.extend_from_slice(&len.to_be_bytes());
    message.extend_from_slice(payload);
    Ok(message)
}

/// 流式解码器: 任意切分的字节流 → 完整帧
#[derive(Debug)]
pub struct FrameDecoder {
    buf: Vec<u8>,
    max_frame_bytes: u32,
}

impl FrameDecoder {
    pub fn new(max_frame_bytes: u32) -> Self {
        Self {
            buf: Vec::new(),
            max_frame_bytes,
        }
    }

    /// 追加收到的字节
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// 取出一帧; 数据不足时返回 `Ok(None)`
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }
        let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
        if len == 0 || len > self.max_frame_bytes {
            return Err(SentinelError::MalformedFrame(format!(
                "invalid length prefix {} (max {})",
                len, self.max_frame_bytes
            )));
        }

        let end = HEADER_LEN + len as usize;
        if self.buf.len() < end {
            return Ok(None);
        }
        let payload = self.buf[HEADER_LEN..end].to_vec();
        self.buf.drain(..end);
        Ok(Some(payload))
    }

    /// 缓冲区中尚未组成完整帧的字节数
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let message = encode_frame(b"abc").unwrap();
        assert_eq!(message, vec![0, 0, 0, 3, b'a', b'b', b'c']);
        assert!(encode_frame(b"").is_err());
    }

    #[test]
    fn test_one_byte_chunks() {
        let payloads: Vec<Vec<u8>> = vec![
            (0..=255u8).collect(),
            vec![7u8; 1],
            (0..5000u32).map(|i| (i * 31 % 251) as u8).collect(),
        ];
        let stream: Vec<u8> = payloads
            .iter()
            .flat_map(|p| encode_frame(p).unwrap())
            .collect();

        let mut decoder = FrameDecoder::new(1 << 20);
        let mut out = Vec::new();
        for byte in stream {
            decoder.push(&[byte]);
            while let Some(frame) = decoder.next_frame().unwrap() {
                out.push(frame);
            }
        }
        assert_eq!(out, payloads);
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_split_header_and_batched_frames() {
        let mut stream = encode_frame(b"first").unwrap();
        stream.extend(encode_frame(b"second").unwrap());

        let mut decoder = FrameDecoder::new(1024);
        decoder.push(&stream[..2]);
        assert_eq!(decoder.next_frame().unwrap(), None);
        decoder.push(&stream[2..]);
        assert_eq!(decoder.next_frame().unwrap(), Some(b"first".to_vec()));
        assert_eq!(decoder.next_frame().unwrap(), Some(b"second".to_vec()));
        assert_eq!(decoder.next_frame().unwrap(), None);
    }

    #[test]
    fn test_malformed_prefix() {
        let mut decoder = FrameDecoder::new(1024);
        decoder.push(&[0, 0, 0, 0]);
        assert!(matches!(
            decoder.next_frame(),
            Err(SentinelError::MalformedFrame(_))
        ));

        let mut decoder = FrameDecoder::new(1024);
        decoder.push(&2048u32.to_be_bytes());
        assert!(decoder.next_frame().is_err());
    }
}
