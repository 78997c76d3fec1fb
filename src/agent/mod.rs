//! 规划循环：感知 -> 决策 -> 派发 -> 安全检查

pub mod action;
pub mod loop_;
pub mod policy;
pub mod snapshot;

pub use action::{action_signature, parse_decision, PlanDecision};
pub use loop_::{run_goal, GoalOutcome, DEFAULT_MAX_STEPS};
pub use policy::PlatformPolicy;
pub use snapshot::PageSnapshot;
