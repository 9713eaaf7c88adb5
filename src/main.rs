//! Planloom - 可恢复的计划执行引擎
//!
//! 入口：初始化日志、加载配置、构建引擎；从 stdin 读取请求并在每个闸门处读取人工输入。
//! 用法：`planloom` 新建会话；`planloom <thread_id>` 从该会话的最新检查点继续。

use std::io::Write;

use anyhow::Context;
use planloom::{config::load_config, core::EngineBuilder, observability, EngineResult, Gate};
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};

async fn prompt(lines: &mut Lines<BufReader<Stdin>>, label: &str) -> anyhow::Result<Option<String>> {
    print!("{label}> ");
    std::io::stdout().flush().context("Failed to flush stdout")?;
    lines.next_line().await.context("Failed to read stdin")
}

fn show(result: &EngineResult) {
    if let Some(message) = &result.message {
        println!("\n{message}");
    }
    if let Some(answer) = &result.final_answer {
        println!("\n{answer}");
    }
}

fn gate_label(gate: Gate) -> &'static str {
    match gate {
        Gate::Approval => "approve (enter/yes) or give feedback",
        Gate::Help => "guidance (enter to retry as is)",
        Gate::Negotiation => "choice (1/2)",
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).context("Failed to load config")?;
    let engine = EngineBuilder::new(cfg)
        .build()
        .await
        .context("Failed to build engine")?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let mut result = match std::env::args().nth(1) {
        Some(thread_id) => {
            println!("Resuming thread {thread_id}");
            engine
                .reattach(&thread_id)
                .await
                .with_context(|| format!("Failed to resume thread {thread_id}"))?
        }
        None => {
            let Some(request) = prompt(&mut lines, "request").await? else {
                return Ok(());
            };
            let thread_id = uuid::Uuid::new_v4().to_string();
            println!("Thread {thread_id}");
            engine
                .start(&thread_id, request.trim())
                .await
                .context("Failed to start thread")?
        }
    };

    loop {
        show(&result);
        let Some(gate) = result.gate else {
            break;
        };
        let Some(input) = prompt(&mut lines, gate_label(gate)).await? else {
            break;
        };
        let input = input.trim();
        if matches!(input, "exit" | "quit") {
            println!("Paused. Resume later with: planloom {}", result.thread_id);
            break;
        }
        let input = (!input.is_empty()).then_some(input);
        result = engine
            .resume(&result.thread_id, input)
            .await
            .context("Failed to resume thread")?;
    }

    Ok(())
}
