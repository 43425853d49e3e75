use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Valid timer/estimate durations, in minutes.
pub const DURATION_CHOICES: [u32; 4] = [15, 30, 45, 60];

pub const IMPACT_MIN: u32 = 7;
pub const IMPACT_MAX: u32 = 10;
pub const EASE_MIN: u32 = 6;
pub const EASE_MAX: u32 = 10;

// Upper bounds on stored text, applied to everything the AI returns.
pub const MAX_TITLE: usize = 200;
pub const MAX_REASON: usize = 100;
pub const MAX_APPROACH: usize = 150;
pub const MAX_STEP: usize = 150;
pub const MAX_COMPLETION: usize = 100;
pub const MAX_CHAT_REPLY: usize = 300;
pub const MAX_SUMMARY: usize = 200;

/// Document text embedded in prompts is cut to this many chars.
pub const DOC_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Aspirational,
    Obligatory,
}

impl Category {
    pub fn parse(s: &str) -> anyhow::Result<Self> {
        match s {
            "aspirational" | "asp" => Ok(Self::Aspirational),
            "obligatory" | "ob" => Ok(Self::Obligatory),
            _ => anyhow::bail!("invalid category '{s}': must be aspirational or obligatory"),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aspirational => "aspirational",
            Self::Obligatory => "obligatory",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn score(impact: u32, ease: u32) -> u32 {
    impact * ease
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub category: Category,
    pub impact: u32,
    pub ease: u32,
    pub estimated_minutes: u32,
    pub score: u32,
    pub reason: String,
    #[serde(default)]
    pub pre_action_note: String,
    #[serde(default)]
    pub post_action_note: String,
    pub created_at: String,
}

impl Task {
    /// Keep `score` in lockstep with impact/ease.
    pub fn rescore(&mut self) {
        self.score = score(self.impact, self.ease);
    }
}

/// Result of a single-task AI evaluation.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub impact: u32,
    pub ease: u32,
    pub estimated_minutes: u32,
    pub reason: String,
}

/// One line of a bulk evaluation: a title, a category call, and scores.
#[derive(Debug, Clone)]
pub struct BulkItem {
    pub title: String,
    pub category: Category,
    pub evaluation: Evaluation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guide {
    pub approach: String,
    pub steps: Vec<String>,
    pub completion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Addresses a log entry for asynchronous patching. Task ids alone may repeat
/// across operations, so the completion timestamp is part of the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogKey {
    pub id: i64,
    pub completed_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub id: i64,
    pub title: String,
    pub category: Category,
    pub impact: u32,
    pub ease: u32,
    pub estimated_minutes: u32,
    pub score: u32,
    pub reason: String,
    #[serde(default)]
    pub pre_action_note: String,
    #[serde(default)]
    pub post_action_note: String,
    pub created_at: String,
    pub completed_at: String,
    pub actual_duration: u32,
    pub planned_duration: u32,
    pub status: String,
}

impl ActionLogEntry {
    pub fn from_task(
        task: &Task,
        completed_at: String,
        actual_duration: u32,
        planned_duration: u32,
        post_action_note: String,
    ) -> Self {
        Self {
            id: task.id,
            title: task.title.clone(),
            category: task.category,
            impact: task.impact,
            ease: task.ease,
            estimated_minutes: task.estimated_minutes,
            score: task.score,
            reason: task.reason.clone(),
            pre_action_note: task.pre_action_note.clone(),
            post_action_note,
            created_at: task.created_at.clone(),
            completed_at,
            actual_duration,
            planned_duration,
            status: "completed".to_string(),
        }
    }

    pub fn key(&self) -> LogKey {
        LogKey {
            id: self.id,
            completed_at: self.completed_at.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub name: String,
    pub content: String,
    pub uploaded_at: String,
}

/// User profile bundle passed into every AI call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalContext {
    pub version: u32,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub profile: String,
    #[serde(default)]
    pub custom_instructions: String,
    #[serde(default)]
    pub documents: Vec<Document>,
}

impl Default for PersonalContext {
    fn default() -> Self {
        Self {
            version: 1,
            user_name: String::new(),
            profile: String::new(),
            custom_instructions: String::new(),
            documents: Vec::new(),
        }
    }
}

impl PersonalContext {
    /// Render the profile for embedding in a prompt. Document contents are
    /// cut to a bounded preview.
    pub fn render(&self) -> String {
        let mut parts = Vec::new();
        if !self.user_name.is_empty() {
            parts.push(format!("- Name: {}", self.user_name));
        }
        if !self.profile.is_empty() {
            parts.push(format!("- Profile: {}", self.profile));
        }
        if !self.custom_instructions.is_empty() {
            parts.push(format!("- Custom instructions: {}", self.custom_instructions));
        }
        if !self.documents.is_empty() {
            parts.push(format!("- Reference documents ({}):", self.documents.len()));
            for doc in &self.documents {
                parts.push(format!(
                    "  - {}: {}",
                    doc.name,
                    truncate_chars(&doc.content, DOC_PREVIEW_CHARS)
                ));
            }
        }
        if parts.is_empty() {
            "- No user profile configured".to_string()
        } else {
            parts.join("\n")
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "gemini-2.5-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Settings {
    pub fn has_credential(&self) -> bool {
        !self.api_key.is_empty()
    }
}

pub fn clamp(value: u32, min: u32, max: u32) -> u32 {
    value.max(min).min(max)
}

/// Snap a minute count to the nearest valid duration choice.
pub fn snap_minutes(minutes: u32) -> u32 {
    DURATION_CHOICES
        .iter()
        .copied()
        .min_by_key(|d| d.abs_diff(minutes))
        .unwrap_or(30)
}

/// Truncate to at most `max` chars without splitting a code point.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}
