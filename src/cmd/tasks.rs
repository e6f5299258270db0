//! Task commands: listing, detail, creation, status moves, branch
//! assignment, statistics, uploads.

use std::path::Path;

use anyhow::{Context, Result};
use console::style;
use taskdeck::Engine;
use taskdeck::models::{TaskDraft, TaskStatus};

pub async fn cmd_tasks(engine: &Engine) -> Result<()> {
    let tasks = engine.tasks().await.context("Failed to load tasks")?;
    if tasks.is_empty() {
        println!("No tasks yet.");
        return Ok(());
    }

    println!(
        "{:<6} {:<12} {:<16} {:<7} Title",
        "ID", "Status", "Assignee", "Points"
    );
    for task in &tasks {
        println!(
            "{:<6} {:<12} {:<16} {:<7} {}",
            task.id,
            task.status,
            task.assignee.as_deref().unwrap_or("-"),
            task.points,
            task.title,
        );
    }
    Ok(())
}

pub async fn cmd_task(engine: &Engine, id: i64) -> Result<()> {
    let task = engine
        .task(id)
        .await
        .with_context(|| format!("Failed to load task {id}"))?;

    println!("{} {}", style(format!("#{}", task.id)).bold(), task.title);
    println!("  status:   {}", task.status);
    println!("  assignee: {}", task.assignee.as_deref().unwrap_or("-"));
    println!("  points:   {}", task.points);
    if let Some(description) = &task.description {
        println!("  {description}");
    }
    if let Some(branch) = &task.branch_name {
        println!(
            "  branch:   {} (responsible: {})",
            branch,
            task.branch_assignee_login.as_deref().unwrap_or("unassigned")
        );
    }
    if !task.watchers.is_empty() {
        println!("  watchers:  {}", task.watchers.join(", "));
    }
    if !task.reviewers.is_empty() {
        println!("  reviewers: {}", task.reviewers.join(", "));
    }
    for url in &task.image_urls {
        println!("  attachment: {url}");
    }
    if let Some(next) = task.status.successor() {
        println!("  next: taskdeck move {} {}", task.id, next);
    }
    Ok(())
}

pub async fn cmd_create(
    engine: &Engine,
    title: String,
    assignee: String,
    description: Option<String>,
    watchers: Vec<String>,
    reviewers: Vec<String>,
) -> Result<()> {
    let draft = TaskDraft {
        description,
        watchers,
        reviewers,
        ..TaskDraft::new(title, assignee)
    };
    let task = engine
        .workflow()
        .create_task(draft)
        .await
        .context("Failed to create task")?;
    println!(
        "{} Created task {}: {}",
        style("✓").green(),
        style(format!("#{}", task.id)).bold(),
        task.title
    );
    Ok(())
}

pub async fn cmd_move(engine: &Engine, id: i64, status: &str) -> Result<()> {
    let task = engine
        .task(id)
        .await
        .with_context(|| format!("Failed to load task {id}"))?;
    let from = task.status.clone();

    let updated = engine
        .workflow()
        .propose_transition(&task, TaskStatus::parse(status))
        .await
        .context("Transition rejected")?;
    println!(
        "{} #{}: {} -> {}",
        style("✓").green(),
        updated.id,
        from,
        updated.status
    );
    Ok(())
}

pub async fn cmd_assign_branch(engine: &Engine, id: i64, login: &str) -> Result<()> {
    let task = engine
        .task(id)
        .await
        .with_context(|| format!("Failed to load task {id}"))?;

    let updated = engine
        .workflow()
        .assign_branch_responsible(&task, login)
        .await
        .context("Branch assignment rejected")?;
    println!(
        "{} #{}: branch responsibility -> {}",
        style("✓").green(),
        updated.id,
        updated.branch_assignee_login.as_deref().unwrap_or(login)
    );
    Ok(())
}

pub async fn cmd_stats(engine: &Engine) -> Result<()> {
    let stats = engine.stats().await.context("Failed to load statistics")?;

    println!("{}", style("Tasks by status").bold());
    for (status, count) in &stats.statuses {
        println!("  {status:<14} {count}");
    }
    println!();
    println!("{}", style("Points leaders").bold());
    if stats.points_leaders.is_empty() {
        println!("  (no points awarded yet)");
    }
    for (rank, leader) in stats.points_leaders.iter().enumerate() {
        println!("  {}. {:<16} {}", rank + 1, leader.assignee, leader.points);
    }
    Ok(())
}

pub async fn cmd_upload(engine: &Engine, file: &Path) -> Result<()> {
    let bytes = std::fs::read(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let filename = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("attachment");

    let attachment = engine
        .upload(filename, bytes)
        .await
        .context("Upload failed")?;
    println!("{} {}", style("✓").green(), attachment.url);
    Ok(())
}
