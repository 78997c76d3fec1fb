//! 桥接 WebSocket 服务端
//!
//! 接收扩展连接并处理入站消息：register 注册为活跃执行端、ping 回 pong、
//! command_result 交给关联引擎分发。每个连接一个 writer 任务消费出站通道。
//! 入站分发与在途 call 并发安全（关联表互斥见 rpc.rs）。

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::bridge::message::{now_millis, BridgeMessage};
use crate::bridge::registry::{ConnectionHandle, ConnectionRegistry};
use crate::bridge::rpc::CommandBridge;

/// 桥接服务端：监听扩展连接，分发入站消息
pub struct BridgeServer {
    registry: Arc<ConnectionRegistry>,
    bridge: Arc<CommandBridge>,
    shutdown: tokio::sync::watch::Sender<bool>,
}

impl BridgeServer {
    pub fn new(registry: Arc<ConnectionRegistry>, bridge: Arc<CommandBridge>) -> Self {
        let (shutdown_tx, _) = tokio::sync::watch::channel(false);
        Self {
            registry,
            bridge,
            shutdown: shutdown_tx,
        }
    }

    /// 绑定监听地址并在后台接受连接
    pub async fn start(&self, bind_addr: &str) -> Result<(), String> {
        let addr: SocketAddr = bind_addr
            .parse()
            .map_err(|e| format!("Invalid bind address: {}", e))?;

        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| format!("Failed to bind: {}", e))?;

        tracing::info!("Bridge listening on ws://{}", addr);

        let mut shutdown_rx = self.shutdown.subscribe();
        let registry = Arc::clone(&self.registry);
        let bridge = Arc::clone(&self.bridge);

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            break;
                        }
                    }
                    result = listener.accept() => {
                        match result {
                            Ok((stream, addr)) => {
                                let registry = Arc::clone(&registry);
                                let bridge = Arc::clone(&bridge);
                                tokio::spawn(async move {
                                    if let Err(e) =
                                        handle_connection(stream, addr, registry, bridge).await
                                    {
                                        tracing::warn!("Connection error from {}: {}", addr, e);
                                    }
                                });
                            }
                            Err(e) => {
                                tracing::error!("Accept error: {}", e);
                            }
                        }
                    }
                }
            }
        });

        Ok(())
    }

    /// 停止接受新连接
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    bridge: Arc<CommandBridge>,
) -> Result<(), String> {
    let ws_stream = tokio_tungstenite::accept_async(stream)
        .await
        .map_err(|e| format!("WebSocket handshake failed: {}", e))?;

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let handle = ConnectionHandle::new(tx);

    tracing::info!("New client connection from {}", addr);

    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(WsMessage::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    let mut registered = false;

    while let Some(msg) = ws_rx.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("WebSocket receive error from {}: {}", addr, e);
                break;
            }
        };

        match msg {
            WsMessage::Text(text) => {
                let parsed: BridgeMessage = match serde_json::from_str(&text) {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::debug!("Unparsable frame from {}: {}", addr, e);
                        continue;
                    }
                };

                match parsed {
                    BridgeMessage::Register { role } if role == "extension" => {
                        registry.set_active(handle.clone()).await;
                        if registered {
                            tracing::debug!("Extension re-registered from {}", addr);
                        } else {
                            tracing::info!("Extension registered from {}", addr);
                            registered = true;
                        }
                        if let Ok(ack) =
                            serde_json::to_string(&BridgeMessage::RegisterAck { ts: now_millis() })
                        {
                            let _ = handle.tx.send(ack);
                        }
                    }

                    BridgeMessage::Ping { ts } => {
                        if let Ok(pong) = serde_json::to_string(&BridgeMessage::Pong { ts }) {
                            let _ = handle.tx.send(pong);
                        }
                    }

                    BridgeMessage::CommandResult { request_id, body } => {
                        bridge.resolve(&request_id, body).await;
                    }

                    other => {
                        tracing::debug!("Unexpected message from {}: {:?}", addr, other);
                    }
                }
            }

            WsMessage::Close(_) => {
                break;
            }

            _ => {}
        }
    }

    // 客户端刷新/重连会正常关闭 socket；身份比对防止清掉更新的注册
    registry.clear_if_active(handle.id).await;
    tracing::info!("Client connection closed: {}", addr);
    Ok(())
}
