use chrono::{DateTime, Utc};
use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;

use crate::error::Result;
use crate::model::RecordedEvent;
use crate::upgrade::cursor::BatchCursor;
use crate::upgrade::driver::RunOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Format {
    Json,
    Pretty,
    Minimal,
}

/// One registered task with its durable state.
#[derive(Debug, Clone, Serialize)]
pub struct TaskStatus {
    pub id: String,
    pub target_version: String,
    pub description: String,
    pub page_size: u64,
    pub complete: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub cursor: Option<BatchCursor>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub git_sha: Option<String>,
    pub pending: usize,
    pub tasks: Vec<TaskStatus>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub donors: usize,
    pub donations: usize,
    pub legacy_meta: usize,
    pub postmeta: usize,
}

fn progress_label(status: &TaskStatus) -> String {
    if status.complete {
        return "done".to_string();
    }
    match &status.cursor {
        Some(c) => format!("{}% (step {})", c.percentage, c.step),
        None => "pending".to_string(),
    }
}

pub fn print_outcomes(outcomes: &[RunOutcome], format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(outcomes)?),
        Format::Pretty => {
            for outcome in outcomes {
                match outcome {
                    RunOutcome::Idle => println!("{}", "all upgrade tasks complete".green()),
                    RunOutcome::AlreadyComplete { task_id } => {
                        println!("{} already complete", task_id.bold())
                    }
                    RunOutcome::Progressed {
                        task_id,
                        result,
                        cursor,
                    } => {
                        println!(
                            "{} page {} processed: {} item(s), {}%",
                            task_id.bold(),
                            cursor.step - 1,
                            result.items_seen,
                            cursor.percentage
                        );
                        if result.failures > 0 {
                            println!("  {}", format!("{} failure(s)", result.failures).yellow());
                        }
                    }
                    RunOutcome::Completed {
                        task_id,
                        result,
                        cursor,
                    } => {
                        println!(
                            "{} {} after {} page(s), {} item(s)",
                            task_id.bold(),
                            "complete".green(),
                            cursor.step,
                            cursor.processed_so_far
                        );
                        if result.failures > 0 {
                            println!("  {}", format!("{} failure(s)", result.failures).yellow());
                        }
                    }
                }
            }
        }
        Format::Minimal => {
            for outcome in outcomes {
                let (label, task) = match outcome {
                    RunOutcome::Idle => ("idle", "-"),
                    RunOutcome::AlreadyComplete { task_id } => ("already", task_id.as_str()),
                    RunOutcome::Progressed { task_id, .. } => ("progress", task_id.as_str()),
                    RunOutcome::Completed { task_id, .. } => ("complete", task_id.as_str()),
                };
                println!("{label:9} {task}");
            }
        }
    }
    Ok(())
}

pub fn print_status(report: &StatusReport, format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(report)?),
        Format::Pretty => {
            if let Some(sha) = &report.git_sha {
                println!("build: {}", sha.dimmed());
            }
            println!("pending: {}", report.pending);
            for status in &report.tasks {
                let label = progress_label(status);
                let label = if status.complete {
                    label.green()
                } else {
                    label.yellow()
                };
                println!("[{}] {} ({})", status.target_version, status.id.bold(), label);
                if !status.description.is_empty() {
                    println!("  {}", status.description);
                }
                if let Some(at) = status.completed_at {
                    println!("  completed: {}", at.format("%Y-%m-%d %H:%M:%S"));
                }
            }
        }
        Format::Minimal => {
            for status in &report.tasks {
                println!("{:18} {}", progress_label(status), status.id);
            }
        }
    }
    Ok(())
}

pub fn print_tasks(tasks: &[TaskStatus], format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(tasks)?),
        Format::Pretty => {
            for task in tasks {
                println!("{} {}", task.id.bold(), format!("v{}", task.target_version).dimmed());
                if !task.description.is_empty() {
                    println!("  {}", task.description);
                }
                println!("  page size: {}", task.page_size);
            }
        }
        Format::Minimal => {
            println!("{:8} {:6} ID", "VERSION", "PAGE");
            println!("{}", "-".repeat(50));
            for task in tasks {
                println!("{:8} {:6} {}", task.target_version, task.page_size, task.id);
            }
        }
    }
    Ok(())
}

pub fn print_events(events: &[RecordedEvent], format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(events)?),
        Format::Pretty => {
            for event in events {
                println!(
                    "{} {} {}",
                    event.recorded_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
                    format!("[{}]", event.category).cyan(),
                    event.message
                );
            }
        }
        Format::Minimal => {
            for event in events {
                println!("{:>5} {:15} {}", event.id, event.category, event.message);
            }
        }
    }
    Ok(())
}

pub fn print_import(summary: &ImportSummary, format: Format) -> Result<()> {
    match format {
        Format::Json => println!("{}", serde_json::to_string(summary)?),
        Format::Pretty => println!(
            "imported {} donor(s), {} donation(s), {} legacy meta row(s), {} post meta row(s)",
            summary.donors, summary.donations, summary.legacy_meta, summary.postmeta
        ),
        Format::Minimal => println!(
            "{} {} {} {}",
            summary.donors, summary.donations, summary.legacy_meta, summary.postmeta
        ),
    }
    Ok(())
}

/// Acknowledge a single-task admin action.
pub fn print_ack(action: &str, task_id: &str, format: Format) -> Result<()> {
    match format {
        Format::Json => println!(
            "{}",
            serde_json::json!({ "action": action, "task_id": task_id })
        ),
        Format::Pretty => println!("{} {}", action.green(), task_id.bold()),
        Format::Minimal => println!("{action} {task_id}"),
    }
    Ok(())
}
