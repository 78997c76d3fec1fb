//! 规划主循环（Agent 状态机）
//!
//! 感知（快照）-> 决策（LLM）-> 派发（execute_action）-> 安全检查，每个目标
//! 独立一份运行状态，直到 done / 失败 / 步数耗尽。安全检查包括：连续同一
//! 动作、同一动作累计出现、页面状态无变化三类循环守卫（命中即终止，不重
//! 试），以及平台相关的 fill 生效确认与发布确认（发布 click 成功后无论确认
//! 与否都立即收尾，避免重复发帖）。
//! 每个用户可见的转移（目标开始、每步决策、重试、终止）都尽力推送
//! agent_status；推送失败不影响结果。

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{json, Map, Value};

use crate::agent::action::{action_signature, parse_decision, EXECUTABLE_ACTIONS};
use crate::agent::policy::PlatformPolicy;
use crate::agent::snapshot::PageSnapshot;
use crate::bridge::{CommandRequest, ExecutorBridge, StatusEvent};
use crate::llm::Planner;

/// 单目标默认最大步数
pub const DEFAULT_MAX_STEPS: u32 = 14;

/// 主快照的采集规模
const SNAPSHOT_MAX_TEXT: u32 = 3500;
const SNAPSHOT_MAX_ELEMENTS: u32 = 80;
/// 确认轮询用的小快照规模
const CONFIRM_MAX_TEXT: u32 = 2400;
const CONFIRM_MAX_ELEMENTS: u32 = 60;

/// RPC 超时与重试（主快照 / 动作 / 确认轮询）
const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(25);
const ACTION_TIMEOUT: Duration = Duration::from_secs(30);
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(20);
const RPC_RETRIES: u32 = 2;
const CONFIRM_RPC_RETRIES: u32 = 1;

/// 感知阶段的外层重试（与动作派发的失败分开计数）
const SNAPSHOT_ATTEMPTS: u32 = 3;
const SNAPSHOT_RETRY_DELAY: Duration = Duration::from_millis(600);

/// 动作派发的尝试上限与间隔
const MAX_ACTION_ATTEMPTS: u32 = 5;
const ACTION_RETRY_DELAY: Duration = Duration::from_millis(800);
/// 每步完成后的固定沉降时间
const SETTLE_DELAY: Duration = Duration::from_secs(1);
/// 回退导航成功后的沉降时间
const RECOVERY_SETTLE_DELAY: Duration = Duration::from_millis(800);

/// fill 生效确认与发布确认的轮询参数
const FILL_CONFIRM_POLLS: u32 = 2;
const FILL_CONFIRM_DELAY: Duration = Duration::from_millis(500);
const POST_CONFIRM_POLLS: u32 = 2;
const POST_CONFIRM_DELAY: Duration = Duration::from_millis(800);

/// done 因被阻塞而放弃时的自动回退预算
const MAX_DONE_BACKTRACKS: u32 = 2;

/// 循环守卫阈值
const SAME_ACTION_LIMIT: u32 = 3;
const ACTION_PATTERN_LIMIT: u32 = 5;
const STAGNANT_LIMIT: u32 = 3;

/// 目标的终止结果：Done 携带给用户的回答，Failed 携带失败原因
#[derive(Debug, Clone, PartialEq)]
pub enum GoalOutcome {
    Done(String),
    Failed(String),
}

/// 单目标运行状态；目标开始时创建，终止时销毁
#[derive(Debug, Default)]
struct RunState {
    last_fingerprint: String,
    stagnant_rounds: u32,
    last_action_sig: String,
    same_action_rounds: u32,
    action_seen: HashMap<String, u32>,
    done_backtracks: u32,
}

/// 执行一个目标直至终止
pub async fn run_goal(
    bridge: &dyn ExecutorBridge,
    planner: &dyn Planner,
    policy: &PlatformPolicy,
    max_steps: u32,
    goal: &str,
) -> GoalOutcome {
    tracing::info!("New goal: {}", goal);
    bridge
        .notify(StatusEvent::Goal {
            goal: goal.to_string(),
        })
        .await;

    let mut state = RunState::default();

    for step in 1..=max_steps {
        // 1. 感知
        let snapshot = match capture_snapshot(bridge, step).await {
            Ok(snap) => snap,
            Err(last_error) => {
                let err = format!("DOM capture failed: {}", last_error);
                return finish_failed(bridge, err).await;
            }
        };

        // 2. 指纹与停滞检测
        let fingerprint = snapshot.fingerprint();
        if fingerprint == state.last_fingerprint {
            state.stagnant_rounds += 1;
        } else {
            state.stagnant_rounds = 0;
        }
        state.last_fingerprint = fingerprint;

        // 3. 决策（非法输出已在 parse_decision 内降级为 done，不属于传输错误）
        let raw = match planner.decide(goal, snapshot.raw()).await {
            Ok(raw) => raw,
            Err(e) => {
                return finish_failed(bridge, format!("Decision service error: {}", e)).await;
            }
        };
        let decision = parse_decision(&raw);
        let kind = decision.kind();

        tracing::info!(
            "step={} action={} reason={}",
            step,
            kind,
            decision.reason_text()
        );
        bridge
            .notify(StatusEvent::Step {
                step,
                action: kind.clone(),
                reason: decision.reason_text(),
            })
            .await;

        // 4. done：被阻塞的放弃先尝试回退一步
        if kind == "done" {
            let answer = decision.answer_text();
            let reason = decision.reason_text();

            if policy.is_blocked_done(&answer, &reason)
                && state.done_backtracks < MAX_DONE_BACKTRACKS
                && step > 1
            {
                state.done_backtracks += 1;
                let back_reason = format!(
                    "LLM done due to element-missing; auto backtrack {}/{}",
                    state.done_backtracks, MAX_DONE_BACKTRACKS
                );
                tracing::info!("{}", back_reason);
                bridge
                    .notify(StatusEvent::Step {
                        step,
                        action: "backtrack".to_string(),
                        reason: back_reason,
                    })
                    .await;

                if let Err(err) = dispatch_back(bridge).await {
                    return finish_failed(bridge, err).await;
                }
                tokio::time::sleep(SETTLE_DELAY).await;
                continue;
            }

            return finish_done(bridge, answer).await;
        }

        // 5. 动作种类校验
        if !EXECUTABLE_ACTIONS.contains(&kind.as_str()) {
            return finish_failed(bridge, format!("Unsupported action from LLM: {}", kind)).await;
        }

        // 6. 规范化与签名
        let payload = decision.to_action_payload(&kind);
        let sig = action_signature(&payload);

        if sig == state.last_action_sig {
            state.same_action_rounds += 1;
        } else {
            state.same_action_rounds = 1;
        }
        state.last_action_sig = sig.clone();
        let seen = state.action_seen.entry(sig).or_insert(0);
        *seen += 1;
        let seen = *seen;

        // 7. 循环守卫（派发前检查，命中即终止）
        if state.same_action_rounds >= SAME_ACTION_LIMIT {
            let err = format!(
                "Stopped to avoid loop: same action repeated {} times.",
                state.same_action_rounds
            );
            return finish_failed(bridge, err).await;
        }
        if seen >= ACTION_PATTERN_LIMIT {
            let err =
                "Stopped to avoid loop: same action pattern occurred too many times.".to_string();
            return finish_failed(bridge, err).await;
        }
        if state.stagnant_rounds >= STAGNANT_LIMIT
            && matches!(kind.as_str(), "navigate" | "back" | "forward" | "click")
        {
            let err = "Stopped to avoid loop: page state unchanged across multiple steps.".to_string();
            return finish_failed(bridge, err).await;
        }

        // 8. 派发（含平台相关的生效确认 / 发布确认 / 回退恢复）
        match dispatch_action(bridge, policy, step, &kind, &payload, &snapshot).await {
            DispatchOutcome::Executed => {
                tokio::time::sleep(SETTLE_DELAY).await;
            }
            DispatchOutcome::Recovered => {
                tokio::time::sleep(RECOVERY_SETTLE_DELAY).await;
            }
            DispatchOutcome::Published(answer) => {
                return finish_done(bridge, answer).await;
            }
            DispatchOutcome::Exhausted(err) => {
                return finish_failed(bridge, err).await;
            }
        }
    }

    finish_failed(
        bridge,
        "Stopped after max steps without done action.".to_string(),
    )
    .await
}

/// 派发阶段的四种去向
enum DispatchOutcome {
    /// 动作成功，进入下一轮
    Executed,
    /// 动作失败但回退导航成功，下一轮重新感知
    Recovered,
    /// 命中发布动作并已收尾（无论确认与否都立即结束目标）
    Published(String),
    /// 尝试耗尽
    Exhausted(String),
}

async fn capture_snapshot(bridge: &dyn ExecutorBridge, step: u32) -> Result<PageSnapshot, String> {
    let mut last_error = String::from("unknown_error");

    for attempt in 1..=SNAPSHOT_ATTEMPTS {
        let request = CommandRequest::DomSnapshot {
            max_text: SNAPSHOT_MAX_TEXT,
            max_elements: SNAPSHOT_MAX_ELEMENTS,
        };
        match bridge.call(request, SNAPSHOT_TIMEOUT, RPC_RETRIES).await {
            Ok(reply) if reply.ok => {
                return Ok(PageSnapshot::new(reply.result));
            }
            Ok(reply) => {
                last_error = reply.error_text();
            }
            Err(e) => {
                last_error = e.to_string();
            }
        }
        tracing::warn!(
            "dom_retry step={} attempt={} error={}",
            step,
            attempt,
            last_error
        );
        if attempt < SNAPSHOT_ATTEMPTS {
            tokio::time::sleep(SNAPSHOT_RETRY_DELAY).await;
        }
    }

    Err(last_error)
}

/// 回退一步；传输失败与浏览器级失败都终止目标
async fn dispatch_back(bridge: &dyn ExecutorBridge) -> Result<(), String> {
    let request = CommandRequest::Action {
        action: json!({"name": "back"}),
    };
    match bridge.call(request, ACTION_TIMEOUT, RPC_RETRIES).await {
        Ok(reply) if !reply.ok => Err(format!("Backtrack failed: {}", reply.error_text())),
        Ok(reply) if !reply.browser_ok() => Err(format!(
            "Backtrack browser action error: {}",
            reply.browser_error()
        )),
        Ok(_) => Ok(()),
        Err(e) => Err(format!("Backtrack failed: {}", e)),
    }
}

async fn dispatch_action(
    bridge: &dyn ExecutorBridge,
    policy: &PlatformPolicy,
    step: u32,
    kind: &str,
    payload: &Map<String, Value>,
    snapshot: &PageSnapshot,
) -> DispatchOutcome {
    let mut last_error = String::new();
    let mut action_ok = false;

    for attempt in 1..=MAX_ACTION_ATTEMPTS {
        let request = CommandRequest::Action {
            action: Value::Object(payload.clone()),
        };
        match bridge.call(request, ACTION_TIMEOUT, RPC_RETRIES).await {
            Err(e) => {
                last_error = format!("Action execution failed: {}", e);
            }
            Ok(reply) if !reply.ok => {
                last_error = format!("Action execution failed: {}", reply.error_text());
            }
            Ok(reply) if !reply.browser_ok() => {
                last_error = format!("Browser action error: {}", reply.browser_error());
            }
            Ok(reply) => {
                action_ok = true;

                if kind == "fill" && policy.is_platform_url(snapshot.url()) {
                    if !poll_fill_ready(bridge, policy).await {
                        action_ok = false;
                        last_error =
                            "Fill not applied to editor state (post button still disabled)."
                                .to_string();
                        if attempt < MAX_ACTION_ATTEMPTS {
                            notify_retry(bridge, step, kind, attempt, &last_error).await;
                            tokio::time::sleep(ACTION_RETRY_DELAY).await;
                            continue;
                        }
                    }
                }

                if policy.is_publish_click(payload, &reply.result, snapshot) {
                    // 提交可能已经生效：无论确认与否都立即结束，避免重复发帖
                    let answer = if poll_posted(bridge, policy).await {
                        "Post published on X successfully.".to_string()
                    } else {
                        "Post button clicked on X. Submission sent; ending task to avoid duplicate posting."
                            .to_string()
                    };
                    return DispatchOutcome::Published(answer);
                }

                break;
            }
        }

        if attempt < MAX_ACTION_ATTEMPTS {
            notify_retry(bridge, step, kind, attempt, &last_error).await;
            tokio::time::sleep(ACTION_RETRY_DELAY).await;
        }
    }

    if action_ok {
        return DispatchOutcome::Executed;
    }

    // 平台上的 click 因目标不存在而失败时，直接导航到发帖页再让下一轮重新感知
    if kind == "click"
        && policy.is_recoverable_click_failure(&last_error)
        && policy.is_platform_url(snapshot.url())
    {
        let request = CommandRequest::Action {
            action: json!({"name": "navigate", "url": policy.compose_fallback_url}),
        };
        if let Ok(reply) = bridge.call(request, ACTION_TIMEOUT, RPC_RETRIES).await {
            if reply.ok && reply.browser_ok() {
                tracing::info!("Recovered failed click via fallback navigation");
                return DispatchOutcome::Recovered;
            }
        }
    }

    DispatchOutcome::Exhausted(last_error)
}

async fn notify_retry(
    bridge: &dyn ExecutorBridge,
    step: u32,
    kind: &str,
    attempt: u32,
    error: &str,
) {
    tracing::warn!(
        "action_retry step={} action={} attempt={} reason={}",
        step,
        kind,
        attempt + 1,
        error
    );
    bridge
        .notify(StatusEvent::Step {
            step,
            action: kind.to_string(),
            reason: format!("Retry {}/{}: {}", attempt + 1, MAX_ACTION_ATTEMPTS, error),
        })
        .await;
}

/// 小快照确认轮询；调用失败视为本轮未确认，继续下一轮
async fn confirm_snapshot(bridge: &dyn ExecutorBridge) -> Option<PageSnapshot> {
    let request = CommandRequest::DomSnapshot {
        max_text: CONFIRM_MAX_TEXT,
        max_elements: CONFIRM_MAX_ELEMENTS,
    };
    match bridge
        .call(request, CONFIRM_TIMEOUT, CONFIRM_RPC_RETRIES)
        .await
    {
        Ok(reply) if reply.ok => Some(PageSnapshot::new(reply.result)),
        _ => None,
    }
}

async fn poll_fill_ready(bridge: &dyn ExecutorBridge, policy: &PlatformPolicy) -> bool {
    for _ in 0..FILL_CONFIRM_POLLS {
        tokio::time::sleep(FILL_CONFIRM_DELAY).await;
        if let Some(snap) = confirm_snapshot(bridge).await {
            if policy.fill_confirmed(&snap) {
                return true;
            }
        }
    }
    false
}

async fn poll_posted(bridge: &dyn ExecutorBridge, policy: &PlatformPolicy) -> bool {
    for _ in 0..POST_CONFIRM_POLLS {
        tokio::time::sleep(POST_CONFIRM_DELAY).await;
        if let Some(snap) = confirm_snapshot(bridge).await {
            if policy.post_confirmed(&snap) {
                return true;
            }
        }
    }
    false
}

async fn finish_done(bridge: &dyn ExecutorBridge, answer: String) -> GoalOutcome {
    bridge.notify(StatusEvent::done_ok(answer.clone())).await;
    GoalOutcome::Done(answer)
}

async fn finish_failed(bridge: &dyn ExecutorBridge, error: String) -> GoalOutcome {
    tracing::warn!("Goal failed: {}", error);
    bridge.notify(StatusEvent::done_err(error.clone())).await;
    GoalOutcome::Failed(error)
}
