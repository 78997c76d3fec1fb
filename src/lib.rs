//! Wasp - Rust 浏览器自动化智能体
//!
//! 模块划分：
//! - **agent**: 规划主循环（感知 / 决策 / 派发 / 循环守卫）与平台策略
//! - **bridge**: 扩展桥接（连接注册表、RPC 关联引擎、WebSocket 服务端）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类
//! - **llm**: 决策服务客户端（OpenAI 兼容 / Mock）
//! - **observability**: 日志初始化

pub mod agent;
pub mod bridge;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
