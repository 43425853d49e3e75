//! Deterministic degraded behavior for when no API key is configured or a
//! live call fails. None of these can themselves fail.

use rand::Rng;

use crate::gateway::MAX_BULK_LINES;
use crate::model::{
    truncate_chars, BulkItem, Category, Evaluation, Guide, DURATION_CHOICES, EASE_MAX, EASE_MIN,
    IMPACT_MAX, IMPACT_MIN, MAX_TITLE,
};

pub const OFFLINE_REASON: &str = "Set an API key to enable AI evaluation";

pub const CHAT_REPLY: &str =
    "Set an API key for detailed guidance and support. For now: pick the smallest next step and start it.";

/// Heuristic evaluation: scores drawn from the valid ranges, fixed reason.
pub fn evaluation() -> Evaluation {
    let mut rng = rand::thread_rng();
    Evaluation {
        impact: rng.gen_range(IMPACT_MIN..=IMPACT_MAX),
        ease: rng.gen_range(EASE_MIN..=EASE_MAX),
        estimated_minutes: DURATION_CHOICES[rng.gen_range(0..DURATION_CHOICES.len())],
        reason: OFFLINE_REASON.to_string(),
    }
}

/// Per-line heuristic. With no classification signal available offline,
/// every line lands in the aspirational collection.
pub fn bulk(raw_text: &str) -> Vec<BulkItem> {
    raw_text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(MAX_BULK_LINES)
        .map(|line| BulkItem {
            title: truncate_chars(line, MAX_TITLE),
            category: Category::Aspirational,
            evaluation: evaluation(),
        })
        .collect()
}

/// Canned guide, the same for every task.
pub fn guide() -> Guide {
    Guide {
        approach: "Work MVP-style: aim for the smallest version that works, not the polished one."
            .to_string(),
        steps: vec![
            "Write down what done looks like for this task (1-2 minutes).".to_string(),
            "Gather what you need to start; gaps are fine, note them and move on.".to_string(),
            "Break the work into small steps and do the first one now; working beats perfect."
                .to_string(),
        ],
        completion: "A working first version exists and you know the next step.".to_string(),
    }
}

/// Templated completion note interpolating title and time spent.
pub fn summary(title: &str, actual_duration: u32) -> String {
    format!("Done: completed \"{title}\" in about {actual_duration} minutes.")
}
