//! 桥接层错误类型
//!
//! 传输层失败（NotConnected / Disconnected / Timeout）在调用层面是致命的；
//! 循环层面是否重试由 Planning Loop 的策略决定（见 agent::loop_）。

use thiserror::Error;

/// 命令桥接可能出现的错误（无可用连接、等待超时等）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// 调用发起时没有已注册的扩展连接
    #[error("No extension connected. Load extension and keep service worker active.")]
    NotConnected,

    /// 等待回包期间扩展连接被清除或替换
    #[error("Extension disconnected while waiting for command result")]
    Disconnected,

    /// 重试耗尽仍未收到对应 request_id 的回包
    #[error("RPC timeout request_id={request_id} after {attempts} attempts")]
    Timeout { request_id: String, attempts: u32 },

    /// 出站消息序列化失败
    #[error("Message encode error: {0}")]
    Encode(String),
}
