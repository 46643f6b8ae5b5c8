//! minagent 命令行入口
//!
//! 用法：`minagent [--config <path>] [--session <id>] [--show-reasoning] [--history] <query...>`
//!
//! 初始化日志、按配置构建 Agent（内置 calculate / echo / word_count / current_time 工具），执行一次查询并打印回答。

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use minagent::config::load_config;
use minagent::react::AgentEvent;
use minagent::reasoning::ReasoningTrace;
use minagent::tools::{CalculateTool, EchoTool, FunctionTool, ParamType, TypedTool};
use minagent::{observability, AgentBuilder};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// 轻量 Agent：多步工具调用，可选会话持久化
#[derive(Debug, Parser)]
#[command(name = "minagent", version, about)]
struct CliArgs {
    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 会话 ID；需在配置中启用 [session]
    #[arg(long)]
    session: Option<String>,

    /// 在终端展示思考与工具调用过程
    #[arg(long)]
    show_reasoning: bool,

    /// 打印会话内已完成的推理轨迹，而不是执行查询
    #[arg(long, requires = "session")]
    history: bool,

    /// 查询内容
    #[arg(trailing_var_arg = true, required_unless_present = "history")]
    query: Vec<String>,
}

#[derive(Deserialize, JsonSchema)]
struct WordCountArgs {
    /// Text whose words should be counted
    text: String,
}

#[derive(Debug, Serialize)]
struct WordCount {
    words: usize,
    characters: usize,
}

/// 整点时区偏移；超出 ±24 小时或乘法溢出时报错
fn utc_offset(hours: i64) -> Result<chrono::FixedOffset, String> {
    hours
        .checked_mul(3600)
        .and_then(|secs| i32::try_from(secs).ok())
        .and_then(chrono::FixedOffset::east_opt)
        .ok_or_else(|| format!("Invalid UTC offset: {} hours", hours))
}

fn print_trace(trace: &ReasoningTrace) {
    let status = match (trace.is_complete(), trace.step_limit_reached) {
        (false, _) => "in progress",
        (true, true) => "step limit reached",
        (true, false) => "done",
    };
    println!("── {} ({} steps, {})", trace.query, trace.total_steps, status);
    for step in &trace.steps {
        if !step.thinking.is_empty() {
            println!("  [{}] {}", step.step_number, step.thinking);
        }
        for tool in &step.tools {
            println!(
                "  [{}] {}({}) -> {}",
                step.step_number,
                tool.name,
                serde_json::Value::Object(tool.inputs.clone()),
                minagent::reasoning::summarize_result(&tool.result)
            );
        }
    }
    if trace.exceeded_size_limit {
        println!("  (trace truncated to fit the size limit)");
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliArgs::parse();
    let cfg = load_config(cli.config.clone()).unwrap_or_else(|e| {
        eprintln!("Config load failed ({}), using defaults", e);
        Default::default()
    });
    observability::init(&cfg.agent.log_level);

    let show_reasoning = cli.show_reasoning || cfg.agent.show_reasoning;
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<AgentEvent>();
    let printer = tokio::spawn(async move {
        while let Some(ev) = event_rx.recv().await {
            if show_reasoning {
                eprintln!("{}", ev);
            }
        }
    });

    let word_count = TypedTool::new(
        "word_count",
        "Count words and characters in a piece of text",
        |args: WordCountArgs| {
            Ok::<_, String>(WordCount {
                words: args.text.split_whitespace().count(),
                characters: args.text.chars().count(),
            })
        },
    );
    let current_time = FunctionTool::new(
        "current_time",
        "Current date and time, in UTC unless a fixed offset in hours is given",
        |args: &serde_json::Map<String, serde_json::Value>| {
            let offset_hours = args.get("utc_offset_hours").and_then(|v| v.as_i64()).unwrap_or(0);
            let offset = utc_offset(offset_hours)?;
            Ok::<_, String>(chrono::Utc::now().with_timezone(&offset).to_rfc3339())
        },
    )
    .optional_param("utc_offset_hours", ParamType::Integer, "Offset from UTC in hours, e.g. 8");

    let agent = AgentBuilder::from_config(&cfg)
        .context("Invalid configuration")?
        .with_tool(CalculateTool)
        .with_tool(EchoTool)
        .with_tool(word_count)
        .with_tool(current_time)
        .with_event_tx(event_tx)
        .build()
        .await
        .context("Failed to build agent")?;

    if cli.history {
        let session = cli.session.as_deref().unwrap_or_default();
        let history = agent
            .get_reasoning_history(session)
            .await
            .context("Failed to load reasoning history")?;
        if history.is_empty() {
            println!("No completed runs for session '{}'", session);
        }
        for trace in &history {
            print_trace(trace);
        }
        return Ok(());
    }

    let query = cli.query.join(" ");
    let (response, trace) = agent
        .run(&query, cli.session.as_deref())
        .await
        .context("Run failed")?;
    drop(agent);
    let _ = printer.await;

    if show_reasoning {
        print_trace(&trace);
    }
    println!("{}", response);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_query_and_flags() {
        let cli = CliArgs::try_parse_from([
            "minagent",
            "--session",
            "s1",
            "--show-reasoning",
            "What",
            "is",
            "2+2?",
        ])
        .unwrap();
        assert_eq!(cli.session.as_deref(), Some("s1"));
        assert!(cli.show_reasoning);
        assert!(!cli.history);
        assert_eq!(cli.query.join(" "), "What is 2+2?");
    }

    #[test]
    fn test_cli_history_requires_session() {
        assert!(CliArgs::try_parse_from(["minagent", "--history"]).is_err());
        let cli = CliArgs::try_parse_from(["minagent", "--history", "--session", "s1"]).unwrap();
        assert!(cli.history);
        assert!(cli.query.is_empty());
        assert!(CliArgs::try_parse_from(["minagent"]).is_err());
    }

    #[test]
    fn test_utc_offset_rejects_overflow() {
        assert_eq!(utc_offset(8).unwrap().local_minus_utc(), 8 * 3600);
        assert_eq!(utc_offset(-5).unwrap().local_minus_utc(), -5 * 3600);
        assert!(utc_offset(25).is_err());
        // 1193047 * 3600 超出 i32，不能回绕成一个看似合法的偏移
        assert!(utc_offset(1_193_047).is_err());
        assert!(utc_offset(i64::MAX).is_err());
    }
}
