//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `WASP__*` 覆盖（双下划线表示嵌套，如 `WASP__LLM__MODEL=gpt-5-nano`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub bridge: BridgeSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub agent: AgentSection,
}

/// [bridge] 段：扩展桥接 WebSocket 监听地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeSection {
    pub bind_addr: String,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8765".to_string(),
        }
    }
}

/// [llm] 段：决策服务端点与模型
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: "gpt-5-nano".to_string(),
            base_url: None,
        }
    }
}

/// [agent] 段：规划循环参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// 单个目标的最大规划步数
    pub max_steps: u32,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self { max_steps: 14 }
    }
}

/// 从 config 目录加载配置，环境变量 WASP__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 WASP__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("WASP")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
