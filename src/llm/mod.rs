//! 决策服务客户端（OpenAI 兼容 / Mock）

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::MockPlanner;
pub use openai::OpenAiPlanner;
pub use traits::Planner;
