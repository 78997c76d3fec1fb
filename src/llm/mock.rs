//! Mock 决策客户端（用于测试，无需 API）
//!
//! 按脚本顺序返回预置输出；脚本耗尽后返回 done，便于循环测试收敛。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::Planner;

/// 脚本化决策客户端：依次弹出预置输出
#[derive(Debug, Default)]
pub struct MockPlanner {
    script: Mutex<VecDeque<String>>,
}

impl MockPlanner {
    pub fn new(script: Vec<&str>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().map(String::from).collect()),
        }
    }
}

#[async_trait]
impl Planner for MockPlanner {
    async fn decide(&self, _goal: &str, _snapshot: &Value) -> Result<String, String> {
        let next = self
            .script
            .lock()
            .map_err(|e| e.to_string())?
            .pop_front()
            .unwrap_or_else(|| {
                r#"{"action":"done","answer":"script exhausted"}"#.to_string()
            });
        Ok(next)
    }
}
