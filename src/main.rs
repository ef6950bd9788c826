//! react-usc 演示入口
//!
//! 用法：react-usc [--config <path>] [任务文本...]
//! 未给出任务时依次运行五个演示（计算、检索、参数修正、暂时性故障、致命错误）。
//! agent.trace = true 时把过程事件以 JSON 行打印到 stderr。

use std::path::PathBuf;

use anyhow::Context;
use react_usc::core::create_agent_builder;
use react_usc::{observability, RunOutcome, UscEvent};

const DEMOS: [(&str, &str); 5] = [
    ("math", "What is 2+2*10? Please compute it."),
    ("search", "Search: What is ReAct and how does self-consistency help?"),
    ("api client - arg fix", "Fetch details for user 123 using the api_client."),
    (
        "api client - transient 503",
        "Sync data to the upstream service using POST /api/v1/sync/data.",
    ),
    (
        "api client - fatal 403",
        "Delete the system database using the api_client at /api/v1/admin/system.",
    ),
];

fn parse_args() -> (Option<PathBuf>, Option<String>) {
    let mut config_path = None;
    let mut words = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            config_path = args.next().map(PathBuf::from);
        } else {
            words.push(arg);
        }
    }
    let task = if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    };
    (config_path, task)
}

fn print_outcome(outcome: &RunOutcome) {
    println!("observations:");
    if outcome.observations.is_empty() {
        println!("  (none)");
    }
    for o in &outcome.observations {
        println!("  [step {} | retries {}] {}", o.step, o.retries, o.text);
    }
    println!("justification: {}", outcome.justification);
    println!("tokens: {}", outcome.token_usage.total_tokens);
    if outcome.forced {
        println!("(step budget exhausted after {} steps)", outcome.steps);
    }
    println!("\nFINAL ANSWER: {}", outcome.final_answer);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let (config_path, task) = parse_args();
    let builder = create_agent_builder(config_path);
    let agent = builder.build_agent().context("Failed to build agent")?;

    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel::<UscEvent>();
    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if let Ok(line) = serde_json::to_string(&event) {
                eprintln!("{}", line);
            }
        }
    });
    let events = agent.config().trace.then_some(&event_tx);

    let tasks: Vec<(String, String)> = match task {
        Some(t) => vec![("task".to_string(), t)],
        None => DEMOS
            .iter()
            .map(|(name, t)| (name.to_string(), t.to_string()))
            .collect(),
    };

    for (i, (name, task)) in tasks.iter().enumerate() {
        println!("\n=== Demo {}: {} ===", i + 1, name);
        println!("task: {}", task);
        let outcome = agent
            .run_with_events(task, events)
            .await
            .with_context(|| format!("Run failed for task: {}", task))?;
        print_outcome(&outcome);
    }

    drop(event_tx);
    let _ = printer.await;
    Ok(())
}
