//! Migrator - 交互式依赖迁移助手
//!
//! 入口：初始化日志、加载配置、构建编排器，然后进入 `Prompt: ` 循环。
//! 模型文本流式写到 stdout；`--verbose` 时工具调用与结果写到 stderr。
//! EOF 或 exit / quit 结束会话；对话进行中按 Ctrl-C 取消当前轮。

use std::io::Write;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use tokio_util::sync::CancellationToken;

use migrator::config::{load_config, CliArgs};
use migrator::core::{AgentBuilder, AgentError};
use migrator::memory::arguments_display;
use migrator::react::ReactEvent;

/// 消费一轮的过程事件：文本到 stdout，详细模式下调用 / 结果到 stderr
async fn print_events(mut rx: UnboundedReceiver<ReactEvent>, verbose: bool) {
    let mut stdout = std::io::stdout();
    while let Some(event) = rx.recv().await {
        match event {
            ReactEvent::TextChunk { text } => {
                print!("{}", text);
                let _ = stdout.flush();
            }
            ReactEvent::ToolCall {
                call_id,
                name,
                arguments,
            } if verbose => {
                eprintln!(
                    "call {}: {} with arguments {}",
                    call_id,
                    name,
                    arguments_display(&arguments)
                );
            }
            ReactEvent::ToolResult {
                call_id, rendered, ..
            } if verbose => {
                eprintln!("result {}: {}", call_id, rendered);
            }
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    migrator::observability::init();

    let args = CliArgs::parse();
    let mut cfg = load_config(args.config.clone()).context("Failed to load config")?;
    args.apply(&mut cfg);
    let verbose = cfg.app.verbose;

    let mut orchestrator = AgentBuilder::new(cfg)
        .build()
        .context("Failed to create agent")?;

    println!("Available tools:");
    for tool in orchestrator.executor().descriptors() {
        println!("  {}: {}", tool.name, tool.description);
    }
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("Prompt: ");
        std::io::stdout().flush().context("Failed to flush stdout")?;

        let line = tokio::select! {
            line = lines.next_line() => line.context("Failed to read stdin")?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            break;
        }

        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };
        let (tx, rx) = unbounded_channel();
        let printer = tokio::spawn(print_events(rx, verbose));

        let result = orchestrator.submit(input, Some(&tx), &cancel).await;
        watcher.abort();
        drop(tx);
        let _ = printer.await;

        match result {
            Ok(_) => println!(),
            Err(AgentError::Cancelled) => eprintln!("\n(turn cancelled)"),
            Err(e) => eprintln!("\nError: {}", e),
        }
    }

    tracing::info!(messages = orchestrator.log().len(), "session ended");
    Ok(())
}
