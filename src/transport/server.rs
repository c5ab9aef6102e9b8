//! 帧广播服务端 (Frame Server)
//!
//! 线程模型:
//! - 接入线程: 接受连接, 为每个客户端建立私有有界队列
//! - 写线程:   每个客户端一个, 从队列取帧写入 socket (带写超时)
//! - 生产者:   `broadcast` 只做 `try_send`, 永不阻塞
//!
//! 队列满 → 该客户端跳过本帧; 写失败或超时 → 移除该客户端并关闭 socket

use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Sender, TrySendError};
use log::{debug, error, info, warn};

use super::codec::encode_frame;
use crate::config::TransportConfig;
use crate::error::{Result, SentinelError};

type Message = Arc<Vec<u8>>;

struct Consumer {
    id: u64,
    peer: SocketAddr,
    tx: Sender<Message>,
    alive: Arc<AtomicBool>,
    stream: TcpStream,
    handle: Option<JoinHandle<()>>,
}

impl Consumer {
    /// 关闭 socket, 写线程随之退出
    fn close(mut self, join: bool) {
        let _ = self.stream.shutdown(Shutdown::Both);
        drop(self.tx);
        if let Some(handle) = self.handle.take() {
            if join {
                let _ = handle.join();
            }
        }
    }
}

pub struct FrameServer {
    local_addr: SocketAddr,
    running: Arc<AtomicBool>,
    consumers: Arc<Mutex<Vec<Consumer>>>,
    accept_handle: Mutex<Option<JoinHandle<()>>>,
}

impl FrameServer {
    /// 绑定监听地址并启动接入线程
    pub fn bind(config: &TransportConfig) -> Result<Self> {
        let listener = TcpListener::bind(&config.bind).map_err(|e| {
            SentinelError::TransportDisconnect(format!("bind {} failed: {}", config.bind, e))
        })?;
        let local_addr = listener.local_addr()?;
        info!("📡 帧服务已启动: {}", local_addr);

        let running = Arc::new(AtomicBool::new(true));
        let consumers = Arc::new(Mutex::new(Vec::new()));

        let accept_handle = {
            let running = running.clone();
            let consumers = consumers.clone();
            let queue_capacity = config.queue_capacity.max(1);
            let write_timeout = config.write_timeout();
            std::thread::spawn(move || {
                accept_loop(listener, running, consumers, queue_capacity, write_timeout)
            })
        };

        Ok(Self {
            local_addr,
            running,
            consumers,
            accept_handle: Mutex::new(Some(accept_handle)),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 当前存活的客户端数量
    pub fn consumer_count(&self) -> usize {
        let mut consumers = lock(&self.consumers);
        reap(&mut consumers);
        consumers.len()
    }

    /// 向所有客户端投递一帧, 返回成功入队的客户端数量
    pub fn broadcast(&self, payload: &[u8]) -> Result<usize> {
        let message: Message = Arc::new(encode_frame(payload)?);
        let mut consumers = lock(&self.consumers);
        reap(&mut consumers);

        let mut delivered = 0;
        let mut gone = Vec::new();
        for (i, consumer) in consumers.iter().enumerate() {
            match consumer.tx.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    debug!("⏭️ 客户端 #{} 队列已满, 跳过本帧", consumer.id);
                }
                Err(TrySendError::Disconnected(_)) => gone.push(i),
            }
        }
        for i in gone.into_iter().rev() {
            let consumer = consumers.remove(i);
            warn!("🔌 客户端 #{} ({}) 已断开", consumer.id, consumer.peer);
            consumer.close(false);
        }
        Ok(delivered)
    }

    /// 停止接入, 关闭所有连接; 未写出的帧被丢弃
    pub fn shutdown(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        // 唤醒阻塞在 accept 上的接入线程
        let wake = SocketAddr::new(
            if self.local_addr.ip().is_unspecified() {
                [127, 0, 0, 1].into()
            } else {
                self.local_addr.ip()
            },
            self.local_addr.port(),
        );
        let _ = TcpStream::connect_timeout(&wake, Duration::from_millis(500));
        let accept = self
            .accept_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = accept {
            let _ = handle.join();
        }

        let drained: Vec<Consumer> = lock(&self.consumers).drain(..).collect();
        let count = drained.len();
        for consumer in drained {
            consumer.close(true);
        }
        info!("🛑 帧服务已关闭, 断开 {} 个客户端", count);
    }
}

impl Drop for FrameServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ========== 内部实现 ==========

fn lock(consumers: &Mutex<Vec<Consumer>>) -> MutexGuard<'_, Vec<Consumer>> {
    consumers.lock().unwrap_or_else(|e| e.into_inner())
}

/// 移除写线程已退出的客户端
fn reap(consumers: &mut Vec<Consumer>) {
    let mut i = 0;
    while i < consumers.len() {
        if consumers[i].alive.load(Ordering::Acquire) {
            i += 1;
        } else {
            let consumer = consumers.remove(i);
            warn!("🔌 移除客户端 #{} ({})", consumer.id, consumer.peer);
            consumer.close(false);
        }
    }
}

fn accept_loop(
    listener: TcpListener,
    running: Arc<AtomicBool>,
    consumers: Arc<Mutex<Vec<Consumer>>>,
    queue_capacity: usize,
    write_timeout: Duration,
) {
    let mut next_id = 1u64;
    for incoming in listener.incoming() {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let stream = match incoming {
            Ok(stream) => stream,
            Err(e) => {
                error!("❌ 接受连接失败: {}", e);
                continue;
            }
        };
        match spawn_consumer(next_id, stream, queue_capacity, write_timeout) {
            Ok(consumer) => {
                info!("✅ 客户端 #{} 已连接: {}", consumer.id, consumer.peer);
                next_id += 1;
                lock(&consumers).push(consumer);
            }
            Err(e) => warn!("⚠️ 客户端初始化失败: {}", e),
        }
    }
    debug!("接入线程退出");
}

fn spawn_consumer(
    id: u64,
    stream: TcpStream,
    queue_capacity: usize,
    write_timeout: Duration,
) -> Result<Consumer> {
    let peer = stream.peer_addr()?;
    stream.set_nodelay(true)?;
    stream.set_write_timeout(Some(write_timeout))?;

    let (tx, rx) = crossbeam_channel::bounded::<Message>(queue_capacity);
    let alive = Arc::new(AtomicBool::new(true));
    let control = stream.try_clone()?;

    let handle = {
        let alive = alive.clone();
        let mut stream = stream;
        std::thread::spawn(move || {
            for message in rx.iter() {
                if let Err(e) = stream.write_all(&message) {
                    warn!("⏱️ 客户端 #{} 写入失败: {}", id, e);
                    let _ = stream.shutdown(Shutdown::Both);
                    break;
                }
            }
            alive.store(false, Ordering::Release);
        })
    };

    Ok(Consumer {
        id,
        peer,
        tx,
        alive,
        stream: control,
        handle: Some(handle),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::client::FrameClient;
    use std::time::Instant;

    fn test_config(queue_capacity: usize, write_timeout_ms: u64) -> TransportConfig {
        TransportConfig {
            bind: "127.0.0.1:0".to_string(),
            queue_capacity,
            write_timeout_ms,
            ..TransportConfig::default()
        }
    }

    fn wait_for_consumers(server: &FrameServer, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while server.consumer_count() < n {
            assert!(Instant::now() < deadline, "consumers did not connect");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_broadcast_to_two_clients() {
        let server = FrameServer::bind(&test_config(8, 1000)).unwrap();
        let addr = server.local_addr();
        let mut a = FrameClient::connect(addr, 1 << 20).unwrap();
        let mut b = FrameClient::connect(addr, 1 << 20).unwrap();
        wait_for_consumers(&server, 2);

        assert_eq!(server.broadcast(b"frame-1").unwrap(), 2);
        assert_eq!(server.broadcast(b"frame-2").unwrap(), 2);

        for client in [&mut a, &mut b] {
            assert_eq!(client.recv_frame().unwrap(), b"frame-1".to_vec());
            assert_eq!(client.recv_frame().unwrap(), b"frame-2".to_vec());
        }

        server.shutdown();
        assert!(a.recv_frame().is_err());
    }

    #[test]
    fn test_empty_payload_rejected() {
        let server = FrameServer::bind(&test_config(4, 1000)).unwrap();
        assert!(server.broadcast(&[]).is_err());
        assert_eq!(server.broadcast(b"nobody").unwrap(), 0);
    }

    #[test]
    fn test_stalled_consumer_does_not_block_others() {
        const FRAMES: u32 = 200;
        const FRAME_BYTES: usize = 256 * 1024;

        let server = FrameServer::bind(&test_config(64, 200)).unwrap();
        let addr = server.local_addr();

        // 从不读取的客户端
        let _stalled = TcpStream::connect(addr).unwrap();
        let active = FrameClient::connect(addr, 1 << 20).unwrap();
        active
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        wait_for_consumers(&server, 2);

        let reader = std::thread::spawn(move || {
            let mut active = active;
            let mut last = None;
            while let Ok(frame) = active.recv_frame() {
                let index = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]);
                last = Some(index);
                if index == FRAMES - 1 {
                    break;
                }
            }
            last
        });

        let mut slowest = Duration::ZERO;
        for i in 0..FRAMES {
            let mut payload = vec![0u8; FRAME_BYTES];
            payload[..4].copy_from_slice(&i.to_be_bytes());
            let started = Instant::now();
            server.broadcast(&payload).unwrap();
            slowest = slowest.max(started.elapsed());
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(slowest < Duration::from_millis(250), "broadcast blocked: {:?}", slowest);

        assert_eq!(reader.join().unwrap(), Some(FRAMES - 1));

        // 停滞客户端在写超时后被移除
        let deadline = Instant::now() + Duration::from_secs(10);
        while server.consumer_count() > 1 {
            assert!(Instant::now() < deadline, "stalled consumer was never dropped");
            std::thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(server.consumer_count(), 1);

        server.shutdown();
    }
}
