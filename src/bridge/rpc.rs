//! RPC 关联引擎：把无连接的异步消息流变成带超时与重试的同步调用
//!
//! call 为每次调用生成唯一 request_id 并登记单次赋值的结果槽（oneshot）；
//! 扩展的 `command_result` 经 resolve 按 request_id 送达。超时重发沿用同一
//! request_id（扩展侧按 id 幂等），迟到/重复的回包静默丢弃。
//! 关联表是唯一同时被调用方与分发方修改的共享状态；锁内不做任何网络等待。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

use crate::bridge::message::{BridgeMessage, CommandRequest, CommandResult, StatusEvent};
use crate::bridge::registry::ConnectionRegistry;
use crate::core::BridgeError;

/// 执行端桥接口：关联调用 + 尽力而为通知
///
/// Planning Loop 只依赖此 trait，测试可用内存假执行端替换真实 WebSocket 桥。
#[async_trait]
pub trait ExecutorBridge: Send + Sync {
    /// 发起关联调用；至多 `max_retries + 1` 次发送尝试，每次等待 `timeout`
    async fn call(
        &self,
        request: CommandRequest,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<CommandResult, BridgeError>;

    /// 推送进度事件；无连接或发送失败一律吞掉，绝不影响控制流
    async fn notify(&self, status: StatusEvent);
}

/// 命令桥：持有连接注册表与关联表
pub struct CommandBridge {
    registry: Arc<ConnectionRegistry>,
    pending: Mutex<HashMap<String, oneshot::Sender<CommandResult>>>,
}

impl CommandBridge {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// 分发入站 `command_result`：命中则完成对应调用；未知或已完成的
    /// request_id（迟到/重复回包、已放弃的调用）为静默 no-op。
    pub async fn resolve(&self, request_id: &str, result: CommandResult) {
        let sender = self.pending.lock().await.remove(request_id);
        match sender {
            Some(tx) => {
                if tx.send(result).is_err() {
                    tracing::debug!("Late command_result for abandoned call {}", request_id);
                }
            }
            None => {
                tracing::debug!("command_result for unknown request_id {}", request_id);
            }
        }
    }

    /// 重试循环本体；关联表清理由 call 统一兜底
    async fn drive(
        &self,
        request_id: &str,
        frame: &str,
        timeout: Duration,
        attempts: u32,
        rx: &mut oneshot::Receiver<CommandResult>,
    ) -> Result<CommandResult, BridgeError> {
        for attempt in 1..=attempts {
            let conn = match self.registry.current().await {
                Some(c) => c,
                None => return Err(BridgeError::Disconnected),
            };
            if conn.tx.send(frame.to_string()).is_err() {
                return Err(BridgeError::Disconnected);
            }

            tokio::select! {
                reply = &mut *rx => {
                    return reply.map_err(|_| BridgeError::Disconnected);
                }
                _ = conn.closed.cancelled() => {
                    return Err(BridgeError::Disconnected);
                }
                _ = tokio::time::sleep(timeout) => {
                    if attempt < attempts {
                        tracing::warn!(
                            "RPC retry request_id={} attempt={}",
                            request_id,
                            attempt + 1
                        );
                    }
                }
            }
        }

        Err(BridgeError::Timeout {
            request_id: request_id.to_string(),
            attempts,
        })
    }

    #[cfg(test)]
    pub(crate) async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[async_trait]
impl ExecutorBridge for CommandBridge {
    async fn call(
        &self,
        request: CommandRequest,
        timeout: Duration,
        max_retries: u32,
    ) -> Result<CommandResult, BridgeError> {
        if self.registry.current().await.is_none() {
            return Err(BridgeError::NotConnected);
        }

        let request_id = Uuid::new_v4().to_string();
        let message = request.into_message(request_id.clone());
        let frame =
            serde_json::to_string(&message).map_err(|e| BridgeError::Encode(e.to_string()))?;

        let (tx, mut rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id.clone(), tx);

        let result = self
            .drive(&request_id, &frame, timeout, max_retries + 1, &mut rx)
            .await;

        // 所有退出路径（成功 / 超时 / 断连）都移除关联表项
        self.pending.lock().await.remove(&request_id);
        result
    }

    async fn notify(&self, status: StatusEvent) {
        let Some(conn) = self.registry.current().await else {
            return;
        };
        let Ok(frame) = serde_json::to_string(&BridgeMessage::AgentStatus { status }) else {
            return;
        };
        let _ = conn.tx.send(frame);
    }
}
