//! 决策服务客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 Planner：decide 返回原始 JSON 文本，
//! 解析与非法输出降级在 agent::action 内完成。

use async_trait::async_trait;
use serde_json::Value;

/// 决策服务客户端 trait：给定目标与页面快照，返回下一动作的原始输出
#[async_trait]
pub trait Planner: Send + Sync {
    /// 请求下一动作；Err 表示决策服务本身不可达（与输出非法是两回事）
    async fn decide(&self, goal: &str, snapshot: &Value) -> Result<String, String>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
