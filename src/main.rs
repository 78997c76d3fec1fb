//! Wasp - Rust 浏览器自动化智能体
//!
//! 入口：初始化日志与配置，启动扩展桥接服务端，从标准输入读取目标并运行
//! 规划循环，打印最终结果。输入 exit / quit 退出。

use std::io::Write;
use std::sync::Arc;

use tokio::io::AsyncBufReadExt;

use wasp::agent::{run_goal, GoalOutcome, PlatformPolicy};
use wasp::bridge::{BridgeServer, CommandBridge, ConnectionRegistry};
use wasp::config::load_config;
use wasp::llm::{OpenAiPlanner, Planner};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wasp::observability::init();

    let cfg = load_config(None).unwrap_or_default();

    let registry = Arc::new(ConnectionRegistry::new());
    let bridge = Arc::new(CommandBridge::new(Arc::clone(&registry)));
    let server = BridgeServer::new(Arc::clone(&registry), Arc::clone(&bridge));
    server
        .start(&cfg.bridge.bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!(e))?;

    let planner = OpenAiPlanner::new(cfg.llm.base_url.as_deref(), &cfg.llm.model, None);
    let policy = PlatformPolicy::default();

    println!("\n=== Wasp Bridge Ready ===");
    println!("Type a goal and press Enter. Type 'exit' to quit.\n");

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("user> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let goal = line.trim();
        if goal.is_empty() {
            continue;
        }
        if matches!(goal.to_lowercase().as_str(), "exit" | "quit") {
            break;
        }

        match run_goal(
            bridge.as_ref(),
            &planner,
            &policy,
            cfg.agent.max_steps,
            goal,
        )
        .await
        {
            GoalOutcome::Done(answer) => println!("assistant> {}\n", answer),
            GoalOutcome::Failed(error) => println!("assistant> Error: {}\n", error),
        }

        let (prompt, completion, total) = planner.token_usage();
        tracing::info!(
            "Token usage so far: prompt={} completion={} total={}",
            prompt,
            completion,
            total
        );
    }

    tracing::info!("Shutting down bridge...");
    server.stop();

    Ok(())
}
