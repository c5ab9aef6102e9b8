/// 帧传输 (Frame Transport)
///
/// 长度前缀协议, 一个生产者对少量局域网客户端
/// - codec:  `[u32 长度][负载]` 编解码
/// - server: 广播服务端, 每客户端独立队列与写线程
/// - client: 接收端, 断开即上报, 不重试
pub mod client;
pub mod codec;
pub mod server;

pub use client::{ClientEvent, ClientThread, FrameClient, ShutdownHandle};
pub use codec::{encode_frame, FrameDecoder, HEADER_LEN};
pub use server::FrameServer;
