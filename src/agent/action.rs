//! 动作描述与签名
//!
//! 决策服务输出固定键集合 {action, selector, text, url, value, top, answer,
//! reason}。解析失败降级为携带诊断信息的 done 决策（视为一次决策而非传输
//! 错误，不重试）。派发前规范化为动作载荷（丢弃空字段），并计算截断后按
//! 键序稳定序列化的签名，用于重复检测。

use serde::Deserialize;
use serde_json::{json, Map, Value};

/// 可派发的动作种类（done 在循环内单独处理，不派发）
pub const EXECUTABLE_ACTIONS: [&str; 6] = ["navigate", "back", "forward", "click", "fill", "scroll"];

/// 签名中各字段的截断长度
const SIG_SELECTOR_CHARS: usize = 120;
const SIG_TEXT_CHARS: usize = 120;
const SIG_URL_CHARS: usize = 180;
const SIG_VALUE_CHARS: usize = 80;

/// 决策服务的一次结构化输出
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlanDecision {
    pub action: Option<String>,
    pub selector: Option<Value>,
    pub text: Option<Value>,
    pub url: Option<Value>,
    pub value: Option<Value>,
    pub top: Option<Value>,
    pub answer: Option<String>,
    pub reason: Option<String>,
}

impl PlanDecision {
    /// 动作种类：缺省 done，去空白并小写
    pub fn kind(&self) -> String {
        self.action
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("done")
            .trim()
            .to_lowercase()
    }

    pub fn answer_text(&self) -> String {
        self.answer
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Task finished.".to_string())
    }

    pub fn reason_text(&self) -> String {
        self.reason.clone().unwrap_or_default()
    }

    /// 规范化为动作载荷：name + 非空的动作字段
    pub fn to_action_payload(&self, kind: &str) -> Map<String, Value> {
        let mut payload = Map::new();
        payload.insert("name".to_string(), Value::String(kind.to_string()));
        for (key, value) in [
            ("selector", &self.selector),
            ("text", &self.text),
            ("url", &self.url),
            ("value", &self.value),
            ("top", &self.top),
        ] {
            if let Some(v) = value {
                if !is_empty_value(v) {
                    payload.insert(key.to_string(), v.clone());
                }
            }
        }
        payload
    }
}

fn is_empty_value(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// 解析决策服务输出；非法 JSON 降级为 done 决策并附诊断信息
pub fn parse_decision(raw: &str) -> PlanDecision {
    match serde_json::from_str::<PlanDecision>(raw) {
        Ok(decision) => decision,
        Err(_) => PlanDecision {
            action: Some("done".to_string()),
            answer: Some(format!("LLM output is not valid JSON: {}", raw)),
            reason: Some("invalid_json".to_string()),
            ..Default::default()
        },
    }
}

fn truncated_field(payload: &Map<String, Value>, key: &str, max_chars: usize) -> String {
    let text = match payload.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
        None => String::new(),
    };
    text.chars().take(max_chars).collect()
}

/// 动作签名：name + 截断后的 selector/text/url/value/top。
/// serde_json 的 Map 按键序序列化，签名与字段出现顺序无关。
pub fn action_signature(payload: &Map<String, Value>) -> String {
    json!({
        "name": payload.get("name").and_then(|v| v.as_str()).unwrap_or(""),
        "selector": truncated_field(payload, "selector", SIG_SELECTOR_CHARS),
        "text": truncated_field(payload, "text", SIG_TEXT_CHARS),
        "url": truncated_field(payload, "url", SIG_URL_CHARS),
        "value": truncated_field(payload, "value", SIG_VALUE_CHARS),
        "top": payload.get("top").cloned().unwrap_or(Value::String(String::new())),
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_malformed_output_becomes_done_decision() {
        let decision = parse_decision("sure, I'll click the button");
        assert_eq!(decision.kind(), "done");
        assert!(decision.answer_text().contains("not valid JSON"));
        assert_eq!(decision.reason_text(), "invalid_json");
    }

    #[test]
    fn test_parse_valid_decision() {
        let decision =
            parse_decision(r##"{"action":" Click ","selector":"#post","reason":"open composer"}"##);
        assert_eq!(decision.kind(), "click");
        assert_eq!(decision.reason_text(), "open composer");
    }

    #[test]
    fn test_payload_drops_empty_fields() {
        let decision = parse_decision(
            r##"{"action":"fill","selector":"#editor","value":"hello","text":"","url":null}"##,
        );
        let payload = decision.to_action_payload(&decision.kind());
        assert_eq!(payload.get("name").unwrap(), "fill");
        assert_eq!(payload.get("selector").unwrap(), "#editor");
        assert_eq!(payload.get("value").unwrap(), "hello");
        assert!(!payload.contains_key("text"));
        assert!(!payload.contains_key("url"));
    }

    #[test]
    fn test_signature_is_order_independent_and_truncated() {
        let a = parse_decision(&format!(
            r#"{{"action":"click","selector":"{}","text":"Post"}}"#,
            "s".repeat(200)
        ));
        let b = parse_decision(&format!(
            r#"{{"text":"Post","selector":"{}","action":"click"}}"#,
            "s".repeat(200)
        ));
        let sig_a = action_signature(&a.to_action_payload("click"));
        let sig_b = action_signature(&b.to_action_payload("click"));
        assert_eq!(sig_a, sig_b);
        assert!(sig_a.contains(&"s".repeat(120)));
        assert!(!sig_a.contains(&"s".repeat(121)));
    }

    #[test]
    fn test_signature_differs_per_target() {
        let a = parse_decision(r##"{"action":"click","selector":"#one"}"##);
        let b = parse_decision(r##"{"action":"click","selector":"#two"}"##);
        assert_ne!(
            action_signature(&a.to_action_payload("click")),
            action_signature(&b.to_action_payload("click"))
        );
    }
}
