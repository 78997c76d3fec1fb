//! 页面快照视图
//!
//! 扩展返回的快照是半结构化 JSON（url / title / textSnippet /
//! interactiveElements / 可选 twitterCompose）。这里提供只读访问与指纹计算，
//! 不做 schema 校验：缺失字段按空值处理。

use serde_json::Value;

/// 指纹中截取的正文字符数
const FINGERPRINT_TEXT_CHARS: usize = 240;

/// 页面状态快照（只读视图）
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    raw: Value,
}

impl PageSnapshot {
    pub fn new(raw: Value) -> Self {
        Self { raw }
    }

    /// 原始 JSON（交给决策服务）
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn url(&self) -> &str {
        self.raw.get("url").and_then(|v| v.as_str()).unwrap_or("")
    }

    pub fn title(&self) -> &str {
        self.raw.get("title").and_then(|v| v.as_str()).unwrap_or("")
    }

    pub fn text_snippet(&self) -> &str {
        self.raw
            .get("textSnippet")
            .and_then(|v| v.as_str())
            .unwrap_or("")
    }

    /// 状态指纹：location 标识 + 标题 + 截断正文；用于无进展检测
    pub fn fingerprint(&self) -> String {
        let text: String = self
            .text_snippet()
            .chars()
            .take(FINGERPRINT_TEXT_CHARS)
            .collect();
        format!("{}|{}|{}", self.url(), self.title(), text)
    }

    fn compose(&self) -> Option<&Value> {
        self.raw.get("twitterCompose")
    }

    /// 页面上是否存在发帖编辑器
    pub fn has_composer(&self) -> bool {
        self.compose()
            .and_then(|c| c.get("hasComposer"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// 编辑器草稿长度
    pub fn draft_length(&self) -> u64 {
        self.compose()
            .and_then(|c| c.get("draftLength"))
            .and_then(|v| v.as_u64())
            .unwrap_or(0)
    }

    /// 发布按钮是否可用
    pub fn post_button_enabled(&self) -> bool {
        self.compose()
            .and_then(|c| c.get("postButtonEnabled"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_truncates_text() {
        let snap = PageSnapshot::new(json!({
            "url": "https://x.com/home",
            "title": "Home",
            "textSnippet": "a".repeat(500),
        }));
        let fp = snap.fingerprint();
        assert!(fp.starts_with("https://x.com/home|Home|"));
        assert_eq!(fp.len(), "https://x.com/home|Home|".len() + 240);
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let snap = PageSnapshot::new(json!({}));
        assert_eq!(snap.url(), "");
        assert_eq!(snap.fingerprint(), "||");
        assert!(!snap.has_composer());
        assert_eq!(snap.draft_length(), 0);
        assert!(!snap.post_button_enabled());
    }

    #[test]
    fn test_compose_state_view() {
        let snap = PageSnapshot::new(json!({
            "url": "https://x.com/compose/post",
            "twitterCompose": {
                "hasComposer": true,
                "draftLength": 42,
                "postButtonEnabled": true,
            }
        }));
        assert!(snap.has_composer());
        assert_eq!(snap.draft_length(), 42);
        assert!(snap.post_button_enabled());
    }
}
