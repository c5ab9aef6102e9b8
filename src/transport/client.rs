//! 帧接收端 (Frame Client)
//!
//! 连接断开或数据损坏时上报断开事件并停止, 不自动重连;
//! 重连由操作员决定。

use std::io::{ErrorKind, Read};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Receiver;
use log::{info, warn};

use super::codec::FrameDecoder;
use crate::error::{Result, SentinelError};

const READ_CHUNK: usize = 4096;

/// 接收线程事件
#[derive(Debug)]
pub enum ClientEvent {
    Frame(Vec<u8>),
    Disconnected(SentinelError),
}

/// 从其他线程关闭连接, 使阻塞中的读取立即返回
#[derive(Debug)]
pub struct ShutdownHandle(TcpStream);

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.0.shutdown(Shutdown::Both);
    }
}

/// 后台接收线程: 事件通道 + 线程句柄 + 关闭句柄
pub struct ClientThread {
    pub events: Receiver<ClientEvent>,
    pub thread: JoinHandle<()>,
    pub shutdown: ShutdownHandle,
}

pub struct FrameClient {
    stream: TcpStream,
    peer: SocketAddr,
    decoder: FrameDecoder,
}

impl FrameClient {
    pub fn connect(addr: impl ToSocketAddrs, max_frame_bytes: u32) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .map_err(|e| SentinelError::TransportDisconnect(format!("connect failed: {}", e)))?;
        Self::from_stream(stream, max_frame_bytes)
    }

    pub fn from_stream(stream: TcpStream, max_frame_bytes: u32) -> Result<Self> {
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        info!("🔗 已连接到 {}", peer);
        Ok(Self {
            stream,
            peer,
            decoder: FrameDecoder::new(max_frame_bytes),
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn shutdown_handle(&self) -> Result<ShutdownHandle> {
        Ok(ShutdownHandle(self.stream.try_clone()?))
    }

    /// 读取超时; 超时按断开处理
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        Ok(self.stream.set_read_timeout(timeout)?)
    }

    /// 阻塞读取下一帧
    pub fn recv_frame(&mut self) -> Result<Vec<u8>> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            match self.decoder.next_frame() {
                Ok(Some(frame)) => return Ok(frame),
                Ok(None) => {}
                Err(e) => {
                    // 前缀损坏: 不尝试恢复, 直接断开
                    let _ = self.stream.shutdown(Shutdown::Both);
                    return Err(e);
                }
            }

            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    return Err(SentinelError::TransportDisconnect(format!(
                        "connection closed by {}",
                        self.peer
                    )))
                }
                Ok(n) => self.decoder.push(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(SentinelError::TransportDisconnect(format!(
                        "read from {} failed: {}",
                        self.peer, e
                    )))
                }
            }
        }
    }

    /// 启动接收线程, 通过通道输出帧与断开事件
    ///
    /// 丢弃事件通道前调用 `shutdown.shutdown()`, 否则线程会阻塞到对端发送或关闭
    pub fn spawn(mut self) -> Result<ClientThread> {
        let shutdown = self.shutdown_handle()?;
        let (tx, rx) = crossbeam_channel::bounded(8);
        let thread = std::thread::spawn(move || loop {
            match self.recv_frame() {
                Ok(frame) => {
                    if tx.send(ClientEvent::Frame(frame)).is_err() {
                        // 接收方已退出
                        let _ = self.stream.shutdown(Shutdown::Both);
                        break;
                    }
                }
                Err(e) => {
                    warn!("❌ 接收中断: {}", e);
                    let _ = tx.send(ClientEvent::Disconnected(e));
                    break;
                }
            }
        });
        Ok(ClientThread {
            events: rx,
            thread,
            shutdown,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::codec::encode_frame;
    use std::io::Write;
    use std::net::TcpListener;

    fn pair() -> (TcpStream, FrameClient) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = FrameClient::connect(addr, 1 << 20).unwrap();
        let (server_side, _) = listener.accept().unwrap();
        server_side.set_nodelay(true).unwrap();
        (server_side, client)
    }

    #[test]
    fn test_byte_by_byte_over_socket() {
        let (mut server_side, mut client) = pair();
        let payloads: Vec<Vec<u8>> = vec![
            b"hello".to_vec(),
            (0..3000u32).map(|i| (i % 256) as u8).collect(),
        ];
        let stream: Vec<u8> = payloads
            .iter()
            .flat_map(|p| encode_frame(p).unwrap())
            .collect();

        let writer = std::thread::spawn(move || {
            for byte in stream {
                server_side.write_all(&[byte]).unwrap();
            }
            server_side
        });

        assert_eq!(client.recv_frame().unwrap(), payloads[0]);
        assert_eq!(client.recv_frame().unwrap(), payloads[1]);

        // 服务端关闭 → 断开事件
        drop(writer.join().unwrap());
        assert!(matches!(
            client.recv_frame(),
            Err(SentinelError::TransportDisconnect(_))
        ));
    }

    #[test]
    fn test_malformed_prefix_closes() {
        let (mut server_side, mut client) = pair();
        server_side.write_all(&[0, 0, 0, 0, 1, 2, 3]).unwrap();
        assert!(matches!(
            client.recv_frame(),
            Err(SentinelError::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_spawned_events() {
        let (mut server_side, client) = pair();
        let ClientThread { events: rx, thread: handle, .. } = client.spawn().unwrap();

        server_side.write_all(&encode_frame(b"one").unwrap()).unwrap();
        server_side.write_all(&encode_frame(b"two").unwrap()).unwrap();
        drop(server_side);

        let mut frames = Vec::new();
        let mut disconnected = false;
        for event in rx.iter() {
            match event {
                ClientEvent::Frame(f) => frames.push(f),
                ClientEvent::Disconnected(_) => disconnected = true,
            }
        }
        handle.join().unwrap();
        assert_eq!(frames, vec![b"one".to_vec(), b"two".to_vec()]);
        assert!(disconnected);
    }

    #[test]
    fn test_shutdown_unblocks_idle_receiver() {
        // 对端已连接但从不发送
        let (_server_side, client) = pair();
        let receiver = client.spawn().unwrap();
        std::thread::sleep(Duration::from_millis(50));

        drop(receiver.events);
        receiver.shutdown.shutdown();
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        std::thread::spawn(move || {
            receiver.thread.join().unwrap();
            let _ = done_tx.send(());
        });
        assert!(done_rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_shutdown_handle_interrupts_recv() {
        let (_server_side, mut client) = pair();
        let handle = client.shutdown_handle().unwrap();
        let reader = std::thread::spawn(move || client.recv_frame());
        std::thread::sleep(Duration::from_millis(50));
        handle.shutdown();
        assert!(matches!(
            reader.join().unwrap(),
            Err(SentinelError::TransportDisconnect(_))
        ));
    }
}
