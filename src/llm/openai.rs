//! OpenAI 兼容决策客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；
//! 要求 json_object 响应格式，输出交由 agent::action::parse_decision 解析。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs, ResponseFormat,
};
use async_openai::Client;
use async_trait::async_trait;
use serde_json::Value;

use crate::llm::Planner;

/// 决策服务的系统提示词：动作词表、安全规则与平台发帖指引
const SYSTEM_PROMPT: &str = r#"You are the decision engine for a browser automation assistant.
Given a user goal and current DOM snapshot, return ONE next action in strict JSON.
Allowed actions:
- navigate: requires url
- back: no extra fields
- forward: no extra fields
- click: selector or text
- fill: selector and value
- scroll: top integer
- done: provide answer to user
Rules:
1. Prefer safe, minimal actions.
2. If needed target cannot be found, prefer navigate/click to make the target visible first; use done only when truly blocked.
3. Return only JSON with keys: action, selector, text, url, value, top, answer, reason.
4. For posting on X/Twitter, prefer sequence: navigate to x.com -> open composer -> fill -> click post.
5. Do not emit fill/click before composer/input is visible in DOM interactiveElements.
6. For X/Twitter posts, keep text within 200 characters.
7. fill action must replace existing text in the target input/editor, not append.
"#;

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：持有 Client 与 model 名
pub struct OpenAiPlanner {
    client: Client<OpenAIConfig>,
    model: String,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiPlanner {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            usage: TokenUsage::new(),
        }
    }

    fn build_prompt(goal: &str, snapshot: &Value) -> String {
        format!(
            "User goal:\n{}\n\nCurrent DOM snapshot (JSON):\n{}\n",
            goal, snapshot
        )
    }
}

#[async_trait]
impl Planner for OpenAiPlanner {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn decide(&self, goal: &str, snapshot: &Value) -> Result<String, String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(SYSTEM_PROMPT)
                    .build()
                    .map_err(|e| e.to_string())?,
            ),
            ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(Self::build_prompt(goal, snapshot))
                    .build()
                    .map_err(|e| e.to_string())?,
            ),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .response_format(ResponseFormat::JsonObject)
            .messages(messages)
            .build()
            .map_err(|e| e.to_string())?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| e.to_string())?;

        // 提取 token 使用统计
        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(content)
    }
}
