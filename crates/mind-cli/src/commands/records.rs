use chrono::{DateTime, Utc};
use mind_config::MindConfig;
use mind_core::{MemoryEntry, Result, RuntimeToolSpec, Trace};
use mind_runtime::FeedbackInput;
use std::sync::Arc;

use super::{DroneAction, MemoryAction, TaskAction, ToolAction, resolve_mind, runner, truncate_output};

fn timestamp(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub(super) fn cmd_feedback(
    config: Arc<MindConfig>,
    mind: &str,
    content: String,
    task_id: Option<String>,
    rating: Option<i64>,
    tags: Vec<String>,
) -> Result<()> {
    let service = runner::service(config)?;
    let mind = resolve_mind(&service, mind)?;
    let entry = service.submit_feedback(
        &mind.id,
        FeedbackInput {
            content,
            task_id,
            rating,
            tags,
        },
    )?;
    println!("✅ Feedback saved as memory {}", entry.id);
    println!("   keywords: {}", entry.relevance_keywords.join(", "));
    Ok(())
}

pub(super) fn cmd_tasks(config: Arc<MindConfig>, action: TaskAction) -> Result<()> {
    let service = runner::service(config)?;
    match action {
        TaskAction::List { mind } => {
            let mind = resolve_mind(&service, &mind)?;
            let tasks = service.list_tasks(&mind.id)?;
            if tasks.is_empty() {
                println!("No tasks for '{}'.", mind.name);
            }
            for task in &tasks {
                println!(
                    "{}  {}  {:<9}  {}",
                    task.id,
                    timestamp(&task.created_at),
                    task.status.as_str(),
                    truncate_output(&task.description, 60)
                );
            }
        }
        TaskAction::Show { mind, task } => {
            let mind = resolve_mind(&service, &mind)?;
            let task = service.get_task(&mind.id, &task)?;
            println!("\x1b[1mTask {}\x1b[0m ({})", task.id, task.status);
            println!("  description: {}", task.description);
            println!("  created: {}", timestamp(&task.created_at));
            if let Some(done) = &task.completed_at {
                println!("  completed: {}", timestamp(done));
            }
            if let Some(result) = &task.result {
                println!("  result:\n{result}");
            }
        }
        TaskAction::Trace { mind, task, json } => {
            let mind = resolve_mind(&service, &mind)?;
            print_trace(&service.get_task_trace(&mind.id, &task)?, json)?;
        }
    }
    Ok(())
}

pub(super) fn cmd_drones(config: Arc<MindConfig>, action: DroneAction) -> Result<()> {
    let service = runner::service(config)?;
    match action {
        DroneAction::List { mind, task } => {
            let mind = resolve_mind(&service, &mind)?;
            let drones = service.list_drones(&mind.id, task.as_deref())?;
            if drones.is_empty() {
                println!("No drones.");
            }
            for drone in &drones {
                println!(
                    "{}  task {}  {:<9}  {}",
                    drone.id,
                    drone.task_id,
                    drone.status.as_str(),
                    truncate_output(&drone.objective, 50)
                );
            }
        }
        DroneAction::Trace { mind, drone, json } => {
            let mind = resolve_mind(&service, &mind)?;
            print_trace(&service.get_drone_trace(&mind.id, &drone)?, json)?;
        }
    }
    Ok(())
}

pub(super) fn cmd_memory(config: Arc<MindConfig>, action: MemoryAction) -> Result<()> {
    let service = runner::service(config)?;
    let entries = match action {
        MemoryAction::List { mind, category } => {
            let mind = resolve_mind(&service, &mind)?;
            service.list_memory(&mind.id, category.as_deref())?
        }
        MemoryAction::Search { mind, query, top_k } => {
            let mind = resolve_mind(&service, &mind)?;
            service.search_memory(&mind.id, &query, top_k)?
        }
    };
    if entries.is_empty() {
        println!("No memories found.");
    }
    for entry in &entries {
        print_memory(entry);
    }
    Ok(())
}

fn print_memory(entry: &MemoryEntry) {
    println!(
        "\x1b[90m{}\x1b[0m  [{}]  {}",
        timestamp(&entry.created_at),
        entry.category.as_deref().unwrap_or("general"),
        entry.id
    );
    println!("   {}", truncate_output(&entry.content, 160));
    if !entry.relevance_keywords.is_empty() {
        println!("   keywords: {}", entry.relevance_keywords.join(", "));
    }
}

pub(super) fn cmd_tools(config: Arc<MindConfig>, action: ToolAction) -> Result<()> {
    let service = runner::service(config)?;
    match action {
        ToolAction::Add {
            mind,
            name,
            description,
            response,
        } => {
            let mind = resolve_mind(&service, &mind)?;
            let spec = service.register_runtime_tool(
                &mind.id,
                RuntimeToolSpec {
                    name,
                    description,
                    response,
                },
            )?;
            println!("✅ Registered tool '{}' for '{}'", spec.name, mind.name);
        }
        ToolAction::List { mind } => {
            let mind = resolve_mind(&service, &mind)?;
            let tools = service.list_runtime_tools(&mind.id)?;
            if tools.is_empty() {
                println!("No runtime tools for '{}'.", mind.name);
            }
            for tool in &tools {
                println!("{:<24}  {}", tool.name, truncate_output(&tool.description, 60));
            }
        }
    }
    Ok(())
}

pub(super) fn cmd_manifest(config: Arc<MindConfig>, mind: &str) -> Result<()> {
    let service = runner::service(config)?;
    let mind = resolve_mind(&service, mind)?;
    println!("{}", serde_json::to_string_pretty(&service.self_knowledge(&mind.id)?)?);
    Ok(())
}

fn print_trace(trace: &Trace, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(trace)?);
        return Ok(());
    }
    println!(
        "\x1b[1mTrace {}\x1b[0m ({} events)",
        trace.run_id,
        trace.events.len()
    );
    for event in &trace.events {
        let content = match event.content.as_str() {
            Some(text) => text.to_string(),
            None => event.content.to_string(),
        };
        println!(
            "\x1b[90m{}\x1b[0m  {:<26}  {}",
            event.timestamp,
            event.kind.as_str(),
            truncate_output(&content, 100)
        );
    }
    Ok(())
}
