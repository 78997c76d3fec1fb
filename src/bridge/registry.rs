//! 连接注册表：唯一活跃的扩展连接槽位
//!
//! 扩展刷新/重连会带来新连接，set_active 采用后注册者胜出；clear_if_active
//! 先比对身份再清除，避免旧连接的断开回调误清掉更新的注册（check-then-act 竞态）。
//! 被替换或清除的连接会取消其 CancellationToken，令绑定在其上的在途调用
//! 以 Disconnected 确定性失败而不是挂起。

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// 活跃连接句柄：出站通道 + 身份标识 + 关闭信号
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    /// 连接身份（clear_if_active 按此比对）
    pub id: Uuid,
    /// 出站文本帧通道（由连接的 writer 任务消费）
    pub tx: mpsc::UnboundedSender<String>,
    /// 连接被替换/清除时取消
    pub closed: CancellationToken,
}

impl ConnectionHandle {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tx,
            closed: CancellationToken::new(),
        }
    }
}

/// 连接注册表：至多一个活跃扩展连接
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    active: RwLock<Option<ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 无条件替换活跃连接（后注册者胜出）；被替换的旧连接取消其关闭信号。
    /// 同一连接重复注册（扩展重发 register）不触发取消。
    pub async fn set_active(&self, handle: ConnectionHandle) {
        let mut slot = self.active.write().await;
        let new_id = handle.id;
        if let Some(old) = slot.replace(handle) {
            if old.id != new_id {
                old.closed.cancel();
            }
        }
    }

    /// 仅当 id 仍是当前活跃连接时清除槽位并取消其关闭信号
    pub async fn clear_if_active(&self, id: Uuid) {
        let mut slot = self.active.write().await;
        if slot.as_ref().map(|h| h.id) == Some(id) {
            if let Some(old) = slot.take() {
                old.closed.cancel();
            }
        }
    }

    /// 当前活跃连接（克隆句柄）
    pub async fn current(&self) -> Option<ConnectionHandle> {
        self.active.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle() -> (ConnectionHandle, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(tx), rx)
    }

    #[tokio::test]
    async fn test_last_registration_wins_and_cancels_old() {
        let registry = ConnectionRegistry::new();
        let (first, _rx1) = handle();
        let (second, _rx2) = handle();

        registry.set_active(first.clone()).await;
        registry.set_active(second.clone()).await;

        assert!(first.closed.is_cancelled());
        assert!(!second.closed.is_cancelled());
        assert_eq!(registry.current().await.unwrap().id, second.id);
    }

    #[tokio::test]
    async fn test_reregister_same_connection_keeps_token() {
        let registry = ConnectionRegistry::new();
        let (conn, _rx) = handle();

        registry.set_active(conn.clone()).await;
        registry.set_active(conn.clone()).await;

        assert!(!conn.closed.is_cancelled());
        assert_eq!(registry.current().await.unwrap().id, conn.id);
    }

    #[tokio::test]
    async fn test_stale_clear_does_not_evict_newer_registration() {
        let registry = ConnectionRegistry::new();
        let (old, _rx1) = handle();
        let (new, _rx2) = handle();

        registry.set_active(old.clone()).await;
        registry.set_active(new.clone()).await;

        // 旧连接的断开回调晚到
        registry.clear_if_active(old.id).await;
        assert_eq!(registry.current().await.unwrap().id, new.id);

        registry.clear_if_active(new.id).await;
        assert!(registry.current().await.is_none());
        assert!(new.closed.is_cancelled());
    }
}
