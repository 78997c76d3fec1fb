//! 命令桥接：连接注册表 + RPC 关联引擎 + WebSocket 服务端
//!
//! 假设同一时刻至多一个活跃执行端连接、每个 request_id 至多一个在途调用。
//! 消息类型固定（register / ping / get_dom_snapshot / execute_action /
//! command_result / agent_status），不是通用 RPC 框架。

pub mod message;
pub mod registry;
pub mod rpc;
pub mod server;

pub use message::{BridgeMessage, CommandRequest, CommandResult, StatusEvent};
pub use registry::{ConnectionHandle, ConnectionRegistry};
pub use rpc::{CommandBridge, ExecutorBridge};
pub use server::BridgeServer;
