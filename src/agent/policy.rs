//! 平台策略：阻塞判定与不可逆动作确认
//!
//! 把「done 是否因找不到目标而放弃」「哪个 click 是发布」「发布/填入是否已
//! 生效」等启发式收敛为一张可替换的策略表，循环控制流不感知具体平台。
//! 默认实现覆盖 X/Twitter（与扩展侧快照的 twitterCompose 字段配套）。

use serde_json::{Map, Value};

use crate::agent::snapshot::PageSnapshot;

/// 平台相关的启发式配置
#[derive(Debug, Clone)]
pub struct PlatformPolicy {
    /// done 的 answer/reason 中出现即判定为「被阻塞而放弃」的关键词
    pub blocked_keywords: Vec<&'static str>,
    /// URL 中出现即判定为目标平台的标记
    pub host_markers: Vec<&'static str>,
    /// 发布按钮 selector 的子串标记
    pub publish_selector_markers: Vec<&'static str>,
    /// 发布按钮的文案集合（小写）
    pub publish_button_labels: Vec<&'static str>,
    /// 发布成功后的页面文案标记（小写）
    pub posted_markers: Vec<&'static str>,
    /// click 失败可触发回退导航的错误子串（小写）
    pub click_not_found_marker: &'static str,
    /// 回退导航目标（直接打开发帖页）
    pub compose_fallback_url: &'static str,
}

impl Default for PlatformPolicy {
    fn default() -> Self {
        Self {
            blocked_keywords: vec![
                "unable",
                "cannot",
                "can't",
                "could not",
                "couldn't",
                "not found",
                "not locate",
                "cannot identify",
                "selector",
                "input element",
            ],
            host_markers: vec!["://x.com", "://twitter.com"],
            publish_selector_markers: vec!["tweetbutton"],
            publish_button_labels: vec!["post", "tweet", "发布", "發佈"],
            posted_markers: vec!["your post was sent", "posted", "已发布", "已發佈"],
            click_not_found_marker: "click target not found",
            compose_fallback_url: "https://x.com/compose/post",
        }
    }
}

impl PlatformPolicy {
    /// done 是否属于「目标找不到/被阻塞」的放弃（answer + reason 关键词匹配）
    pub fn is_blocked_done(&self, answer: &str, reason: &str) -> bool {
        let text = format!("{} {}", answer, reason).to_lowercase();
        self.blocked_keywords.iter().any(|k| text.contains(k))
    }

    pub fn is_platform_url(&self, url: &str) -> bool {
        let url = url.to_lowercase();
        self.host_markers.iter().any(|m| url.contains(m))
    }

    /// click 是否命中平台的发布按钮（selector 子串或按钮文案）
    pub fn is_publish_click(
        &self,
        payload: &Map<String, Value>,
        action_result: &Value,
        snapshot: &PageSnapshot,
    ) -> bool {
        if payload.get("name").and_then(|v| v.as_str()) != Some("click") {
            return false;
        }
        if !self.is_platform_url(snapshot.url()) {
            return false;
        }

        let field = |src: &Value, key: &str| -> String {
            src.get(key)
                .and_then(|v| v.as_str())
                .unwrap_or("")
                .to_string()
        };
        let payload_value = Value::Object(payload.clone());

        let selector_text = format!(
            "{} {}",
            field(&payload_value, "selector"),
            field(action_result, "selector")
        )
        .to_lowercase();
        if self
            .publish_selector_markers
            .iter()
            .any(|m| selector_text.contains(m))
        {
            return true;
        }

        let button_text = format!(
            "{} {}",
            field(&payload_value, "text"),
            field(action_result, "text")
        )
        .trim()
        .to_lowercase();
        self.publish_button_labels.contains(&button_text.as_str())
    }

    /// fill 后的就绪信号：草稿非空且发布按钮可用。离开平台页面视为就绪。
    pub fn fill_confirmed(&self, snapshot: &PageSnapshot) -> bool {
        if !self.is_platform_url(snapshot.url()) {
            return true;
        }
        snapshot.draft_length() > 0 && snapshot.post_button_enabled()
    }

    /// 发布后的完成信号：编辑器消失 / 草稿清空 / 出现成功文案。
    /// 返回 false 表示本次快照未确认（调用方可继续轮询）。
    pub fn post_confirmed(&self, snapshot: &PageSnapshot) -> bool {
        if !self.is_platform_url(snapshot.url()) {
            return false;
        }
        if !snapshot.has_composer() || snapshot.draft_length() == 0 {
            return true;
        }
        let text = snapshot.text_snippet().to_lowercase();
        self.posted_markers.iter().any(|m| text.contains(m))
    }

    /// click 失败是否属于「目标不存在」，可尝试回退导航
    pub fn is_recoverable_click_failure(&self, error: &str) -> bool {
        error.to_lowercase().contains(self.click_not_found_marker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::action::parse_decision;
    use serde_json::json;

    fn snapshot(value: Value) -> PageSnapshot {
        PageSnapshot::new(value)
    }

    #[test]
    fn test_blocked_done_keyword_match() {
        let policy = PlatformPolicy::default();
        assert!(policy.is_blocked_done("I could not locate the compose box", ""));
        assert!(policy.is_blocked_done("", "selector missing"));
        assert!(!policy.is_blocked_done("Posted the update for you", "finished"));
    }

    #[test]
    fn test_platform_url_match() {
        let policy = PlatformPolicy::default();
        assert!(policy.is_platform_url("https://x.com/home"));
        assert!(policy.is_platform_url("HTTPS://TWITTER.COM/compose"));
        assert!(!policy.is_platform_url("https://example.com/x.com"));
    }

    #[test]
    fn test_publish_click_by_selector_marker() {
        let policy = PlatformPolicy::default();
        let decision =
            parse_decision(r#"{"action":"click","selector":"[data-testid='tweetButton']"}"#);
        let payload = decision.to_action_payload("click");
        let snap = snapshot(json!({"url": "https://x.com/compose/post"}));
        assert!(policy.is_publish_click(&payload, &json!({}), &snap));
    }

    #[test]
    fn test_publish_click_by_button_label() {
        let policy = PlatformPolicy::default();
        let decision = parse_decision(r#"{"action":"click","text":"Post"}"#);
        let payload = decision.to_action_payload("click");
        let snap = snapshot(json!({"url": "https://x.com/home"}));
        assert!(policy.is_publish_click(&payload, &json!({}), &snap));
    }

    #[test]
    fn test_ordinary_click_is_not_publish() {
        let policy = PlatformPolicy::default();
        let decision = parse_decision(r##"{"action":"click","selector":"#menu","text":"More"}"##);
        let payload = decision.to_action_payload("click");
        let snap = snapshot(json!({"url": "https://x.com/home"}));
        assert!(!policy.is_publish_click(&payload, &json!({}), &snap));

        // 平台之外的 Post 按钮不算发布
        let decision = parse_decision(r#"{"action":"click","text":"Post"}"#);
        let payload = decision.to_action_payload("click");
        let snap = snapshot(json!({"url": "https://example.com"}));
        assert!(!policy.is_publish_click(&payload, &json!({}), &snap));
    }

    #[test]
    fn test_fill_confirmed_requires_draft_and_enabled_button() {
        let policy = PlatformPolicy::default();
        let ready = snapshot(json!({
            "url": "https://x.com/compose/post",
            "twitterCompose": {"hasComposer": true, "draftLength": 12, "postButtonEnabled": true}
        }));
        let not_ready = snapshot(json!({
            "url": "https://x.com/compose/post",
            "twitterCompose": {"hasComposer": true, "draftLength": 12, "postButtonEnabled": false}
        }));
        assert!(policy.fill_confirmed(&ready));
        assert!(!policy.fill_confirmed(&not_ready));
        // 已离开平台页面视为就绪
        assert!(policy.fill_confirmed(&snapshot(json!({"url": "https://example.com"}))));
    }

    #[test]
    fn test_post_confirmed_signals() {
        let policy = PlatformPolicy::default();
        let composer_closed = snapshot(json!({
            "url": "https://x.com/home",
            "twitterCompose": {"hasComposer": false, "draftLength": 0}
        }));
        let draft_cleared = snapshot(json!({
            "url": "https://x.com/home",
            "twitterCompose": {"hasComposer": true, "draftLength": 0}
        }));
        let confirmation_text = snapshot(json!({
            "url": "https://x.com/home",
            "textSnippet": "Your post was sent.",
            "twitterCompose": {"hasComposer": true, "draftLength": 30}
        }));
        let still_open = snapshot(json!({
            "url": "https://x.com/home",
            "textSnippet": "compose",
            "twitterCompose": {"hasComposer": true, "draftLength": 30}
        }));
        assert!(policy.post_confirmed(&composer_closed));
        assert!(policy.post_confirmed(&draft_cleared));
        assert!(policy.post_confirmed(&confirmation_text));
        assert!(!policy.post_confirmed(&still_open));
        assert!(!policy.post_confirmed(&snapshot(json!({"url": "https://example.com"}))));
    }

    #[test]
    fn test_recoverable_click_failure() {
        let policy = PlatformPolicy::default();
        assert!(policy.is_recoverable_click_failure("Browser action error: click target not found"));
        assert!(!policy.is_recoverable_click_failure("Browser action error: tab crashed"));
    }
}
