use anyhow::{bail, Result};

use crate::debug_log;
use crate::fallback;
use crate::gateway::{GeminiClient, SessionSnapshot};
use crate::model::{BulkItem, Category, ChatMessage, Evaluation, Guide, PersonalContext, Task};

/// Policy layer over the gateway.
///
/// Evaluation calls surface live failures to the caller (a configured key
/// that stops working should not silently produce heuristic scores), while
/// guide, chat and summary always degrade to a fallback: an AI failure must
/// never prevent a task from being guided or completed.
#[derive(Debug, Clone)]
pub struct Coach {
    client: GeminiClient,
}

impl Coach {
    pub fn new(client: GeminiClient) -> Self {
        Self { client }
    }

    pub fn evaluate(
        &self,
        title: &str,
        category: Category,
        context: &PersonalContext,
    ) -> Result<Evaluation> {
        if !self.client.has_credential() {
            return Ok(fallback::evaluation());
        }
        match self.client.evaluate(title, category, context) {
            Ok(eval) => Ok(eval),
            Err(e) => {
                debug_log::log(&format!("evaluate failed: {e}"));
                bail!("task evaluation failed: {e}");
            }
        }
    }

    pub fn bulk_evaluate(&self, raw_text: &str, context: &PersonalContext) -> Result<Vec<BulkItem>> {
        if !self.client.has_credential() {
            let items = fallback::bulk(raw_text);
            if items.is_empty() {
                bail!("no tasks to evaluate");
            }
            return Ok(items);
        }
        match self.client.bulk_evaluate(raw_text, context) {
            Ok(items) => Ok(items),
            Err(e) => {
                debug_log::log(&format!("bulk evaluate failed: {e}"));
                bail!("bulk evaluation failed: {e}");
            }
        }
    }

    pub fn guide(&self, task: &Task, context: &PersonalContext) -> Guide {
        match self.client.generate_guide(task, context) {
            Ok(guide) => guide,
            Err(e) => {
                debug_log::log(&format!("guide generation failed: {e}"));
                fallback::guide()
            }
        }
    }

    pub fn chat(
        &self,
        message: &str,
        snapshot: &SessionSnapshot,
        history: &[ChatMessage],
        context: &PersonalContext,
    ) -> String {
        match self.client.chat_turn(message, snapshot, history, context) {
            Ok(reply) => reply,
            Err(e) => {
                debug_log::log(&format!("chat turn failed: {e}"));
                fallback::CHAT_REPLY.to_string()
            }
        }
    }

    pub fn summary(&self, task: &Task, actual_duration: u32, context: &PersonalContext) -> String {
        match self.client.completion_summary(task, actual_duration, context) {
            Ok(summary) => summary,
            Err(e) => {
                debug_log::log(&format!("summary generation failed: {e}"));
                fallback::summary(&task.title, actual_duration)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Settings, DURATION_CHOICES, EASE_MAX, EASE_MIN, IMPACT_MAX, IMPACT_MIN};

    fn offline_coach() -> Coach {
        Coach::new(GeminiClient::new(Settings::default()))
    }

    fn sample_task() -> Task {
        Task {
            id: 1,
            title: "Write report".to_string(),
            category: Category::Obligatory,
            impact: 8,
            ease: 7,
            estimated_minutes: 30,
            score: 56,
            reason: String::new(),
            pre_action_note: String::new(),
            post_action_note: String::new(),
            created_at: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn evaluate_without_credential_always_succeeds() {
        let coach = offline_coach();
        let ctx = PersonalContext::default();
        for _ in 0..50 {
            let eval = coach.evaluate("anything", Category::Aspirational, &ctx).unwrap();
            assert!((IMPACT_MIN..=IMPACT_MAX).contains(&eval.impact));
            assert!((EASE_MIN..=EASE_MAX).contains(&eval.ease));
            assert!(DURATION_CHOICES.contains(&eval.estimated_minutes));
            assert_eq!(eval.reason, fallback::OFFLINE_REASON);
        }
    }

    #[test]
    fn bulk_without_credential_is_all_aspirational() {
        let coach = offline_coach();
        let items = coach
            .bulk_evaluate("one\ntwo\nthree", &PersonalContext::default())
            .unwrap();
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|i| i.category == Category::Aspirational));
    }

    #[test]
    fn bulk_of_empty_text_is_rejected() {
        let coach = offline_coach();
        assert!(coach.bulk_evaluate("  \n", &PersonalContext::default()).is_err());
    }

    #[test]
    fn guide_without_credential_is_the_canned_guide() {
        let coach = offline_coach();
        let guide = coach.guide(&sample_task(), &PersonalContext::default());
        assert_eq!(guide, fallback::guide());
    }

    #[test]
    fn chat_without_credential_is_static_encouragement() {
        let coach = offline_coach();
        let snapshot = SessionSnapshot {
            title: "Write report".to_string(),
            elapsed_minutes: 2,
            remaining_minutes: 28,
        };
        let reply = coach.chat("how do I start?", &snapshot, &[], &PersonalContext::default());
        assert_eq!(reply, fallback::CHAT_REPLY);
    }

    #[test]
    fn summary_without_credential_uses_template() {
        let coach = offline_coach();
        let s = coach.summary(&sample_task(), 17, &PersonalContext::default());
        assert!(s.contains("Write report"));
        assert!(s.contains("17"));
    }
}
