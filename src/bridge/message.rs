//! 桥接消息协议定义
//!
//! 统一的消息格式，用于服务端与浏览器扩展之间的 WebSocket 通信。
//! 所有消息带 `type` 字段；字段名与扩展侧约定保持一致（maxText / maxElements 为 camelCase）。

use serde::{Deserialize, Serialize};

/// 命令执行结果（`command_result` 的载荷部分）
///
/// `ok` 为传输/处理层是否成功；`result` 内可能再带一层浏览器动作级的
/// `ok`/`error`（如 click 目标不存在时 `ok:true` 但 `result.ok:false`）。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub ok: bool,
    #[serde(default)]
    pub result: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResult {
    /// 处理层错误文案；缺省为 unknown_error（与扩展侧 safeError 对齐）
    pub fn error_text(&self) -> String {
        self.error.clone().unwrap_or_else(|| "unknown_error".to_string())
    }

    /// 浏览器动作级是否成功；result 中无 ok 字段时视为成功
    pub fn browser_ok(&self) -> bool {
        self.result
            .get("ok")
            .and_then(|v| v.as_bool())
            .unwrap_or(true)
    }

    /// 浏览器动作级错误文案
    pub fn browser_error(&self) -> String {
        self.result
            .get("error")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown_error")
            .to_string()
    }
}

/// Agent 状态事件（尽力而为推送，不要求确认）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StatusEvent {
    /// 新目标开始
    Goal { goal: String },

    /// 某一步选择的动作（含重试通告）
    Step {
        step: u32,
        action: String,
        reason: String,
    },

    /// 目标终止（成功带 answer，失败带 error）
    Done {
        ok: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        answer: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl StatusEvent {
    pub fn done_ok(answer: impl Into<String>) -> Self {
        StatusEvent::Done {
            ok: true,
            answer: Some(answer.into()),
            error: None,
        }
    }

    pub fn done_err(error: impl Into<String>) -> Self {
        StatusEvent::Done {
            ok: false,
            answer: None,
            error: Some(error.into()),
        }
    }
}

/// 桥接消息（双向，`type` 字段区分）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeMessage {
    /// 扩展注册为执行端（role = "extension"）
    Register { role: String },

    /// 注册确认（毫秒时间戳）
    RegisterAck { ts: u64 },

    /// 心跳 ping（扩展 → 服务端）
    Ping {
        #[serde(default)]
        ts: Option<u64>,
    },

    /// 心跳 pong（原样回显 ts）
    Pong {
        #[serde(default)]
        ts: Option<u64>,
    },

    /// 请求页面状态快照
    GetDomSnapshot {
        request_id: String,
        #[serde(rename = "maxText")]
        max_text: u32,
        #[serde(rename = "maxElements")]
        max_elements: u32,
    },

    /// 请求执行一个浏览器动作
    ExecuteAction {
        request_id: String,
        action: serde_json::Value,
    },

    /// 命令执行结果（扩展 → 服务端，按 request_id 关联）
    CommandResult {
        request_id: String,
        #[serde(flatten)]
        body: CommandResult,
    },

    /// Agent 进度通知（服务端 → 扩展，尽力而为）
    AgentStatus {
        #[serde(flatten)]
        status: StatusEvent,
    },
}

/// 待发起的关联调用（request_id 由关联引擎生成后再组装为 BridgeMessage）
#[derive(Debug, Clone)]
pub enum CommandRequest {
    /// `get_dom_snapshot`
    DomSnapshot { max_text: u32, max_elements: u32 },
    /// `execute_action`
    Action { action: serde_json::Value },
}

impl CommandRequest {
    pub fn into_message(self, request_id: String) -> BridgeMessage {
        match self {
            CommandRequest::DomSnapshot {
                max_text,
                max_elements,
            } => BridgeMessage::GetDomSnapshot {
                request_id,
                max_text,
                max_elements,
            },
            CommandRequest::Action { action } => BridgeMessage::ExecuteAction { request_id, action },
        }
    }
}

/// 当前 Unix 毫秒时间戳（register_ack 使用）
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
