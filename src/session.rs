use anyhow::{bail, Result};

use crate::fallback;
use crate::gateway::SessionSnapshot;
use crate::model::{ActionLogEntry, ChatMessage, ChatRole, Guide, Task};

/// Where a session stands. `list` is represented by the absence of a
/// `Session`, not by a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Guide,
    Timer,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Complete,
    Drop,
    Defer,
}

/// Result of one timer tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Tick ignored (not in timer mode, paused, or already at zero).
    Idle,
    /// One second consumed.
    Counted,
    /// Countdown reached zero; the session moved to `Complete`.
    AutoCompleted,
}

/// What finalizing a session asks the controller to do.
#[derive(Debug)]
pub enum Finalization {
    /// Remove the task from the board, append the entry; if `needs_summary`
    /// the provisional note should be patched by a background summary.
    Completed {
        entry: ActionLogEntry,
        needs_summary: bool,
    },
    /// Remove the task from the board. No log entry.
    Dropped { task_id: i64 },
    /// Leave the board unchanged.
    Deferred { task_id: i64 },
}

/// Ephemeral state for one selected task's guided execution.
///
/// The machine is pure data: the ticker, stdin and AI workers feed it
/// events, and asynchronous results are applied only when their sequence
/// number still matches (`apply_guide`, `apply_chat_reply`). A stale result
/// from an abandoned session is ignored rather than cancelled.
#[derive(Debug, Clone)]
pub struct Session {
    pub task: Task,
    /// Identity for guarded apply; assigned by the controller, strictly
    /// increasing across sessions.
    pub seq: u64,
    pub mode: Mode,
    pub guide: Option<Guide>,
    pub chat: Vec<ChatMessage>,
    /// Minutes chosen at timer start.
    pub selected_duration: u32,
    /// Seconds left on the countdown.
    pub time_remaining: u32,
    pub started_at_ms: Option<i64>,
    pub paused: bool,
    pub post_action_note: String,
    running: bool,
}

impl Session {
    pub fn new(task: Task, seq: u64) -> Self {
        let selected_duration = task.estimated_minutes;
        Self {
            task,
            seq,
            mode: Mode::Guide,
            guide: None,
            chat: Vec::new(),
            selected_duration,
            time_remaining: selected_duration * 60,
            started_at_ms: None,
            paused: false,
            post_action_note: String::new(),
            running: false,
        }
    }

    /// Apply an asynchronously generated guide iff it was requested by this
    /// session. Returns whether it landed.
    pub fn apply_guide(&mut self, seq: u64, guide: Guide) -> bool {
        if seq != self.seq {
            return false;
        }
        self.guide = Some(guide);
        true
    }

    pub fn push_user_message(&mut self, content: &str) {
        self.chat.push(ChatMessage {
            role: ChatRole::User,
            content: content.to_string(),
        });
    }

    /// Guarded apply for chat replies, same contract as `apply_guide`.
    pub fn apply_chat_reply(&mut self, seq: u64, content: &str) -> bool {
        if seq != self.seq {
            return false;
        }
        self.chat.push(ChatMessage {
            role: ChatRole::Assistant,
            content: content.to_string(),
        });
        true
    }

    pub fn start_timer(&mut self, minutes: u32, now_ms: i64) -> Result<()> {
        if self.mode != Mode::Guide {
            bail!("timer can only be started from the guide stage");
        }
        self.mode = Mode::Timer;
        self.selected_duration = minutes;
        self.time_remaining = minutes * 60;
        self.started_at_ms = Some(now_ms);
        self.running = true;
        self.paused = false;
        Ok(())
    }

    /// Consume one second of countdown. At zero the session auto-transitions
    /// to `Complete`.
    pub fn tick(&mut self) -> TickOutcome {
        if self.mode != Mode::Timer || !self.running || self.paused || self.time_remaining == 0 {
            return TickOutcome::Idle;
        }
        self.time_remaining -= 1;
        if self.time_remaining == 0 {
            self.mode = Mode::Complete;
            self.running = false;
            TickOutcome::AutoCompleted
        } else {
            TickOutcome::Counted
        }
    }

    pub fn toggle_pause(&mut self) -> Result<bool> {
        if self.mode != Mode::Timer {
            bail!("nothing to pause: timer is not running");
        }
        self.paused = !self.paused;
        Ok(self.paused)
    }

    /// User-triggered early completion.
    pub fn manual_complete(&mut self) -> Result<()> {
        if self.mode != Mode::Timer {
            bail!("cannot complete: timer is not running");
        }
        self.mode = Mode::Complete;
        self.running = false;
        Ok(())
    }

    /// Timer snapshot for chat prompts.
    pub fn snapshot(&self) -> SessionSnapshot {
        let total = self.selected_duration * 60;
        SessionSnapshot {
            title: self.task.title.clone(),
            elapsed_minutes: total.saturating_sub(self.time_remaining) / 60,
            remaining_minutes: self.time_remaining / 60,
        }
    }

    /// Minutes elapsed since the timer started, by wall clock. Pausing stops
    /// the visual countdown only; it does not stop this clock.
    pub fn actual_duration(&self, now_ms: i64) -> u32 {
        match self.started_at_ms {
            Some(start) => ((now_ms - start).max(0) / 60_000) as u32,
            None => self.selected_duration,
        }
    }

    /// End the session. Consumes it; all ephemeral state goes with it.
    pub fn finalize(self, outcome: Outcome, now_ms: i64, completed_at: String) -> Finalization {
        match outcome {
            Outcome::Complete => {
                let actual = self.actual_duration(now_ms);
                let needs_summary = self.post_action_note.trim().is_empty();
                let note = if needs_summary {
                    fallback::summary(&self.task.title, actual)
                } else {
                    self.post_action_note.clone()
                };
                let entry = ActionLogEntry::from_task(
                    &self.task,
                    completed_at,
                    actual,
                    self.selected_duration,
                    note,
                );
                Finalization::Completed {
                    entry,
                    needs_summary,
                }
            }
            Outcome::Drop => Finalization::Dropped {
                task_id: self.task.id,
            },
            Outcome::Defer => Finalization::Deferred {
                task_id: self.task.id,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Category;

    fn sample_task(id: i64) -> Task {
        Task {
            id,
            title: format!("task-{id}"),
            category: Category::Aspirational,
            impact: 8,
            ease: 7,
            estimated_minutes: 30,
            score: 56,
            reason: String::new(),
            pre_action_note: "prep".to_string(),
            post_action_note: String::new(),
            created_at: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    fn canned_guide() -> Guide {
        Guide {
            approach: "a".to_string(),
            steps: vec!["s1".to_string()],
            completion: "c".to_string(),
        }
    }

    #[test]
    fn new_session_starts_in_guide_mode() {
        let session = Session::new(sample_task(1), 1);
        assert_eq!(session.mode, Mode::Guide);
        assert!(session.guide.is_none());
        assert!(session.chat.is_empty());
        assert_eq!(session.selected_duration, 30);
    }

    #[test]
    fn stale_guide_is_not_applied() {
        // Guide requested for session 1, but the user has moved on to
        // session 2 before it resolved.
        let mut session = Session::new(sample_task(2), 2);
        assert!(!session.apply_guide(1, canned_guide()));
        assert!(session.guide.is_none());

        assert!(session.apply_guide(2, canned_guide()));
        assert!(session.guide.is_some());
    }

    #[test]
    fn stale_chat_reply_is_not_applied() {
        let mut session = Session::new(sample_task(1), 3);
        session.push_user_message("hello");
        assert!(!session.apply_chat_reply(2, "late reply"));
        assert_eq!(session.chat.len(), 1);
        assert!(session.apply_chat_reply(3, "reply"));
        assert_eq!(session.chat.len(), 2);
        assert_eq!(session.chat[1].role, ChatRole::Assistant);
    }

    #[test]
    fn timer_counts_down_and_auto_completes() {
        let mut session = Session::new(sample_task(1), 1);
        session.start_timer(1, 0).unwrap();
        assert_eq!(session.mode, Mode::Timer);
        assert_eq!(session.time_remaining, 60);

        for _ in 0..59 {
            assert_eq!(session.tick(), TickOutcome::Counted);
        }
        assert_eq!(session.tick(), TickOutcome::AutoCompleted);
        assert_eq!(session.mode, Mode::Complete);
        assert_eq!(session.tick(), TickOutcome::Idle);
    }

    #[test]
    fn timer_cannot_start_twice() {
        let mut session = Session::new(sample_task(1), 1);
        session.start_timer(15, 0).unwrap();
        assert!(session.start_timer(15, 0).is_err());
    }

    #[test]
    fn pause_stops_countdown_and_resume_continues() {
        let mut session = Session::new(sample_task(1), 1);
        session.start_timer(1, 0).unwrap();
        session.tick();
        assert_eq!(session.time_remaining, 59);

        assert!(session.toggle_pause().unwrap());
        assert_eq!(session.tick(), TickOutcome::Idle);
        assert_eq!(session.time_remaining, 59);

        assert!(!session.toggle_pause().unwrap());
        assert_eq!(session.tick(), TickOutcome::Counted);
        assert_eq!(session.time_remaining, 58);
    }

    #[test]
    fn pause_does_not_stop_the_duration_clock() {
        // Wall-clock duration accounting: 10 minutes elapse, all of them
        // counted even though the timer spent most of it paused.
        let mut session = Session::new(sample_task(1), 1);
        session.start_timer(30, 0).unwrap();
        session.toggle_pause().unwrap();
        let ten_minutes_later = 10 * 60_000;
        assert_eq!(session.actual_duration(ten_minutes_later), 10);
    }

    #[test]
    fn actual_duration_without_start_falls_back_to_selection() {
        let session = Session::new(sample_task(1), 1);
        assert_eq!(session.actual_duration(99_999_999), 30);
    }

    #[test]
    fn manual_complete_from_timer() {
        let mut session = Session::new(sample_task(1), 1);
        assert!(session.manual_complete().is_err());
        session.start_timer(15, 0).unwrap();
        session.manual_complete().unwrap();
        assert_eq!(session.mode, Mode::Complete);
    }

    #[test]
    fn finalize_complete_builds_entry_with_wall_clock_duration() {
        let mut session = Session::new(sample_task(7), 1);
        session.start_timer(15, 0).unwrap();
        session.manual_complete().unwrap();

        let fin = session.finalize(
            Outcome::Complete,
            7 * 60_000,
            "2025-06-01T12:00:00Z".to_string(),
        );
        match fin {
            Finalization::Completed {
                entry,
                needs_summary,
            } => {
                assert_eq!(entry.id, 7);
                assert_eq!(entry.actual_duration, 7);
                assert_eq!(entry.planned_duration, 15);
                assert_eq!(entry.completed_at, "2025-06-01T12:00:00Z");
                assert_eq!(entry.status, "completed");
                assert_eq!(entry.pre_action_note, "prep");
                // Blank user note: provisional template goes in, and a
                // background summary is wanted.
                assert!(needs_summary);
                assert!(entry.post_action_note.contains("task-7"));
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[test]
    fn finalize_complete_keeps_user_note() {
        let mut session = Session::new(sample_task(1), 1);
        session.start_timer(15, 0).unwrap();
        session.manual_complete().unwrap();
        session.post_action_note = "shipped the draft".to_string();

        match session.finalize(Outcome::Complete, 60_000, "t".to_string()) {
            Finalization::Completed {
                entry,
                needs_summary,
            } => {
                assert!(!needs_summary);
                assert_eq!(entry.post_action_note, "shipped the draft");
            }
            other => panic!("expected Completed, got {other:?}"),
        }
    }

    #[test]
    fn finalize_drop_and_defer() {
        let session = Session::new(sample_task(3), 1);
        match session.finalize(Outcome::Drop, 0, "t".to_string()) {
            Finalization::Dropped { task_id } => assert_eq!(task_id, 3),
            other => panic!("expected Dropped, got {other:?}"),
        }
        let session = Session::new(sample_task(4), 2);
        match session.finalize(Outcome::Defer, 0, "t".to_string()) {
            Finalization::Deferred { task_id } => assert_eq!(task_id, 4),
            other => panic!("expected Deferred, got {other:?}"),
        }
    }

    #[test]
    fn snapshot_tracks_timer() {
        let mut session = Session::new(sample_task(1), 1);
        session.start_timer(2, 0).unwrap();
        for _ in 0..60 {
            session.tick();
        }
        let snap = session.snapshot();
        assert_eq!(snap.elapsed_minutes, 1);
        assert_eq!(snap.remaining_minutes, 1);
        assert_eq!(snap.title, "task-1");
    }
}
