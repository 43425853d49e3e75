use anyhow::{bail, Context, Result};

use crate::board::{IdGen, NoteField, TaskBoard};
use crate::coach::Coach;
use crate::debug_log;
use crate::fallback;
use crate::gateway::GeminiClient;
use crate::logstore::ActionLog;
use crate::model::{
    now_millis, now_rfc3339, ActionLogEntry, Category, Document, Guide, LogKey, PersonalContext,
    Settings, Task,
};
use crate::session::{Finalization, Outcome, Session};
use crate::store::{keys, Store};

/// A guide the runner should fetch in the background for a session.
#[derive(Debug, Clone)]
pub struct GuideRequest {
    pub seq: u64,
    pub task: Task,
}

/// A background completion summary to fetch and patch in by composite key.
#[derive(Debug, Clone)]
pub struct SummaryRequest {
    pub key: LogKey,
    pub task: Task,
    pub actual_duration: u32,
}

/// Single owner of all live state. Every mutation goes through a named
/// operation here and is persisted before it returns; asynchronous results
/// re-enter through the guarded `apply_*` operations.
pub struct App {
    store: Store,
    pub settings: Settings,
    pub context: PersonalContext,
    pub board: TaskBoard,
    pub logs: ActionLog,
    pub session: Option<Session>,
    coach: Coach,
    ids: IdGen,
    next_seq: u64,
}

impl App {
    pub fn load(store: Store) -> Result<Self> {
        let settings: Settings = store.load(keys::SETTINGS)?.unwrap_or_default();
        let mut context: PersonalContext = store.load(keys::PROFILE)?.unwrap_or_default();
        context.documents = store.load(keys::DOCUMENTS)?.unwrap_or_default();
        let board: TaskBoard = store.load(keys::TASKS)?.unwrap_or_default();
        let logs: ActionLog = store.load(keys::ACTION_LOGS)?.unwrap_or_default();
        let coach = Coach::new(GeminiClient::new(settings.clone()));
        Ok(Self {
            store,
            settings,
            context,
            board,
            logs,
            session: None,
            coach,
            ids: IdGen::new(),
            next_seq: 0,
        })
    }

    pub fn coach(&self) -> &Coach {
        &self.coach
    }

    fn save_board(&self) -> Result<()> {
        self.store.save(keys::TASKS, &self.board)
    }

    fn save_logs(&self) -> Result<()> {
        self.store.save(keys::ACTION_LOGS, &self.logs)
    }

    fn save_settings(&self) -> Result<()> {
        self.store.save(keys::SETTINGS, &self.settings)
    }

    fn save_profile(&self) -> Result<()> {
        // Documents live under their own key; don't duplicate them.
        let mut profile = self.context.clone();
        profile.documents = Vec::new();
        self.store.save(keys::PROFILE, &profile)?;
        self.store.save(keys::DOCUMENTS, &self.context.documents)
    }

    // ---- Task Board operations ----

    pub fn add_task(&mut self, title: &str, category: Category) -> Result<Task> {
        let title = title.trim();
        if title.is_empty() {
            bail!("task title must not be empty");
        }
        let eval = self.coach.evaluate(title, category, &self.context)?;
        let mut task = Task {
            id: self.ids.next(),
            title: title.to_string(),
            category,
            impact: eval.impact,
            ease: eval.ease,
            estimated_minutes: eval.estimated_minutes,
            score: 0,
            reason: eval.reason,
            pre_action_note: String::new(),
            post_action_note: String::new(),
            created_at: now_rfc3339(),
        };
        task.rescore();
        self.board.insert(task.clone());
        self.save_board()?;
        Ok(task)
    }

    pub fn bulk_add(&mut self, raw_text: &str) -> Result<Vec<Task>> {
        if raw_text.trim().is_empty() {
            bail!("no tasks to evaluate");
        }
        let items = self.coach.bulk_evaluate(raw_text, &self.context)?;
        let ids = self.ids.batch(items.len());
        let created_at = now_rfc3339();
        let mut tasks = Vec::with_capacity(items.len());
        for (item, id) in items.into_iter().zip(ids) {
            let mut task = Task {
                id,
                title: item.title,
                category: item.category,
                impact: item.evaluation.impact,
                ease: item.evaluation.ease,
                estimated_minutes: item.evaluation.estimated_minutes,
                score: 0,
                reason: item.evaluation.reason,
                pre_action_note: String::new(),
                post_action_note: String::new(),
                created_at: created_at.clone(),
            };
            task.rescore();
            self.board.insert(task.clone());
            tasks.push(task);
        }
        self.save_board()?;
        Ok(tasks)
    }

    pub fn delete_task(&mut self, id: i64) -> Result<()> {
        self.board.delete(id)?;
        self.save_board()
    }

    pub fn clear_category(&mut self, category: Category) -> Result<usize> {
        let count = self.board.clear_category(category);
        self.save_board()?;
        Ok(count)
    }

    /// Update a note on the stored task, and keep an open session's cached
    /// copy of the same task in sync.
    pub fn update_note(&mut self, id: i64, field: NoteField, value: &str) -> Result<()> {
        self.board.update_note(id, field, value)?;
        if let Some(session) = &mut self.session {
            if session.task.id == id {
                match field {
                    NoteField::Pre => session.task.pre_action_note = value.to_string(),
                    NoteField::Post => session.task.post_action_note = value.to_string(),
                }
            }
        }
        self.save_board()
    }

    // ---- Execution session lifecycle ----

    /// Begin a session for a board task. Starting a new session invalidates
    /// any previous session's pending guide or chat results.
    pub fn select_task(&mut self, id: i64) -> Result<GuideRequest> {
        let task = self
            .board
            .find(id)
            .cloned()
            .with_context(|| format!("task {id} not found"))?;
        self.next_seq += 1;
        let seq = self.next_seq;
        self.session = Some(Session::new(task.clone(), seq));
        Ok(GuideRequest { seq, task })
    }

    /// Guarded apply: a guide for a session that no longer exists is
    /// discarded.
    pub fn apply_guide(&mut self, seq: u64, guide: Guide) -> bool {
        if let Some(session) = &mut self.session {
            if session.apply_guide(seq, guide) {
                return true;
            }
        }
        debug_log::log(&format!("discarded guide for stale session {seq}"));
        false
    }

    pub fn apply_chat_reply(&mut self, seq: u64, content: &str) -> bool {
        if let Some(session) = &mut self.session {
            if session.apply_chat_reply(seq, content) {
                return true;
            }
        }
        debug_log::log(&format!("discarded chat reply for stale session {seq}"));
        false
    }

    /// End the current session. On completion the task moves from the board
    /// into the action log; the returned request, if any, asks the caller to
    /// fetch a summary in the background and patch it in by composite key.
    pub fn finalize_session(&mut self, outcome: Outcome) -> Result<Option<SummaryRequest>> {
        let Some(session) = self.session.take() else {
            bail!("no active session");
        };
        let task = session.task.clone();
        match session.finalize(outcome, now_millis(), now_rfc3339()) {
            Finalization::Completed {
                entry,
                needs_summary,
            } => {
                let key = entry.key();
                let actual_duration = entry.actual_duration;
                self.board.take(entry.id);
                self.logs.append(entry);
                self.save_board()?;
                self.save_logs()?;
                let wants_ai = needs_summary && self.settings.has_credential();
                Ok(wants_ai.then_some(SummaryRequest {
                    key,
                    task,
                    actual_duration,
                }))
            }
            Finalization::Dropped { task_id } => {
                self.board.take(task_id);
                self.save_board()?;
                Ok(None)
            }
            Finalization::Deferred { .. } => Ok(None),
        }
    }

    /// Complete a task directly from the board, skipping guide and timer.
    /// The log entry is visible immediately with a provisional note; the
    /// returned request, if any, patches it once the summary resolves.
    pub fn quick_complete(&mut self, id: i64) -> Result<Option<SummaryRequest>> {
        let Some(task) = self.board.take(id) else {
            bail!("task {id} not found");
        };
        let actual_duration = task.estimated_minutes;
        let entry = ActionLogEntry::from_task(
            &task,
            now_rfc3339(),
            actual_duration,
            task.estimated_minutes,
            fallback::summary(&task.title, actual_duration),
        );
        let key = entry.key();
        self.logs.append(entry);
        self.save_board()?;
        self.save_logs()?;
        Ok(self.settings.has_credential().then_some(SummaryRequest {
            key,
            task,
            actual_duration,
        }))
    }

    /// Guarded apply for background summaries. A key that no longer matches
    /// any entry (deleted since the request was issued) is dropped silently.
    pub fn apply_summary(&mut self, key: &LogKey, text: &str) -> Result<bool> {
        if self.logs.patch_note(key, text) {
            self.save_logs()?;
            Ok(true)
        } else {
            debug_log::log(&format!(
                "discarded summary for missing log entry {}@{}",
                key.id, key.completed_at
            ));
            Ok(false)
        }
    }

    // ---- Action log operations ----

    pub fn edit_log(&mut self, index: usize, entry: ActionLogEntry) -> Result<()> {
        self.logs.edit(index, entry)?;
        self.save_logs()
    }

    pub fn delete_log(&mut self, index: usize) -> Result<ActionLogEntry> {
        let removed = self.logs.remove(index)?;
        self.save_logs()?;
        Ok(removed)
    }

    // ---- Settings & personalization ----

    pub fn update_settings(&mut self, settings: Settings) -> Result<()> {
        self.settings = settings.clone();
        self.coach = Coach::new(GeminiClient::new(settings));
        self.save_settings()
    }

    pub fn update_profile(
        &mut self,
        user_name: Option<String>,
        profile: Option<String>,
        instructions: Option<String>,
    ) -> Result<()> {
        if let Some(name) = user_name {
            self.context.user_name = name;
        }
        if let Some(p) = profile {
            self.context.profile = p;
        }
        if let Some(i) = instructions {
            self.context.custom_instructions = i;
        }
        self.save_profile()
    }

    pub fn add_document(&mut self, name: &str, content: String) -> Result<()> {
        if !name.ends_with(".md") && !name.ends_with(".txt") {
            bail!("only .md and .txt documents are supported");
        }
        if self.context.documents.iter().any(|d| d.name == name) {
            bail!("document '{name}' already uploaded");
        }
        self.context.documents.push(Document {
            name: name.to_string(),
            content,
            uploaded_at: now_rfc3339(),
        });
        self.save_profile()
    }

    pub fn remove_document(&mut self, name: &str) -> Result<()> {
        let before = self.context.documents.len();
        self.context.documents.retain(|d| d.name != name);
        if self.context.documents.len() == before {
            bail!("document '{name}' not found");
        }
        self.save_profile()
    }
}
