use crate::board::TaskBoard;
use crate::model::{ActionLogEntry, Category, Guide, Task};

pub fn format_task_list(tasks: &[Task]) -> String {
    let mut out = String::new();
    for task in tasks {
        out.push_str(&format!(
            "{:>6}  {:>3}  {} ({}x{}, {}min)\n",
            task.id, task.score, task.title, task.impact, task.ease, task.estimated_minutes
        ));
        if !task.reason.is_empty() {
            out.push_str(&format!("             {}\n", task.reason));
        }
    }
    out
}

pub fn format_board(board: &TaskBoard) -> String {
    let mut out = String::new();
    for category in [Category::Aspirational, Category::Obligatory] {
        let tasks = board.collection(category);
        out.push_str(&format!("{} ({})\n", category.as_str().to_uppercase(), tasks.len()));
        if tasks.is_empty() {
            out.push_str("  (empty)\n");
        } else {
            out.push_str(&format_task_list(tasks));
        }
        out.push('\n');
    }
    out
}

pub fn format_log_list(entries: &[&ActionLogEntry]) -> String {
    let mut out = String::new();
    for (i, entry) in entries.iter().enumerate() {
        out.push_str(&format!(
            "{:>3}. [{}] {} ({}, {}min actual / {}min planned)\n",
            i,
            entry.completed_at,
            entry.title,
            entry.category,
            entry.actual_duration,
            entry.planned_duration
        ));
    }
    out
}

pub fn format_log_detail(entry: &ActionLogEntry) -> String {
    let mut out = String::new();
    out.push_str(&format!("Title:     {}\n", entry.title));
    out.push_str(&format!("Category:  {}\n", entry.category));
    out.push_str(&format!("Score:     {} ({}x{})\n", entry.score, entry.impact, entry.ease));
    out.push_str(&format!("Completed: {}\n", entry.completed_at));
    out.push_str(&format!(
        "Duration:  {}min actual / {}min planned\n",
        entry.actual_duration, entry.planned_duration
    ));
    if !entry.reason.is_empty() {
        out.push_str(&format!("Reason:    {}\n", entry.reason));
    }
    if !entry.pre_action_note.is_empty() {
        out.push_str(&format!("Before:    {}\n", entry.pre_action_note));
    }
    if !entry.post_action_note.is_empty() {
        out.push_str(&format!("After:     {}\n", entry.post_action_note));
    }
    out
}

pub fn format_guide(guide: &Guide) -> String {
    let mut out = String::new();
    out.push_str(&format!("Approach: {}\n", guide.approach));
    out.push_str("Steps:\n");
    for (i, step) in guide.steps.iter().enumerate() {
        out.push_str(&format!("  {}. {}\n", i + 1, step));
    }
    out.push_str(&format!("Done when: {}\n", guide.completion));
    out
}
