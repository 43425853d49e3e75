use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use crate::model::{
    clamp, snap_minutes, truncate_chars, BulkItem, Category, ChatMessage, Evaluation, Guide,
    PersonalContext, Settings, Task, EASE_MAX, EASE_MIN, IMPACT_MAX, IMPACT_MIN, MAX_APPROACH,
    MAX_CHAT_REPLY, MAX_COMPLETION, MAX_REASON, MAX_STEP, MAX_SUMMARY, MAX_TITLE,
};

/// Bulk evaluation is capped to bound cost and latency.
pub const MAX_BULK_LINES: usize = 20;

/// Chat prompts carry only the tail of the conversation.
const CHAT_HISTORY_WINDOW: usize = 4;

/// Errors from the generative-text boundary. Every one of these is
/// recoverable; callers substitute a fallback rather than propagate.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("no API key configured")]
    NoCredential,
    #[error("request failed: {0}")]
    Request(String),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("content blocked by the service (finish reason {0})")]
    Blocked(String),
}

/// Timer snapshot handed to chat turns so the coach knows where the
/// session stands.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub title: String,
    pub elapsed_minutes: u32,
    pub remaining_minutes: u32,
}

/// Client for the Gemini `generateContent` API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    settings: Settings,
}

impl GeminiClient {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    pub fn has_credential(&self) -> bool {
        self.settings.has_credential()
    }

    /// Send one prompt and return the generated text.
    fn generate(
        &self,
        prompt: &str,
        temperature: f64,
        max_output_tokens: u32,
    ) -> Result<String, GatewayError> {
        if !self.has_credential() {
            return Err(GatewayError::NoCredential);
        }

        let url = format!(
            "{}/{}:generateContent?key={}",
            self.settings.base_url, self.settings.model, self.settings.api_key
        );
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(self.settings.timeout_secs))
            .build();

        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "temperature": temperature,
                "maxOutputTokens": max_output_tokens,
            },
        });
        let body_str = serde_json::to_string(&body)
            .map_err(|e| GatewayError::Request(format!("JSON serialize error: {e}")))?;

        let resp = agent
            .post(&url)
            .set("Content-Type", "application/json")
            .send_string(&body_str)
            .map_err(|e: ureq::Error| GatewayError::Request(e.to_string()))?;

        let resp_str = resp
            .into_string()
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;
        parse_generate_response(&resp_str)
    }

    pub fn evaluate(
        &self,
        title: &str,
        category: Category,
        context: &PersonalContext,
    ) -> Result<Evaluation, GatewayError> {
        let prompt = format!(
            "You are a personal AI coach. Evaluate the following task.\n\n\
             Task: \"{title}\"\n\
             Category: {}\n\n\
             User profile:\n{}\n\n\
             Rate impact (contribution to the user's goals) as an integer {IMPACT_MIN}-{IMPACT_MAX}, \
             ease (how readily the user can start right now) as an integer {EASE_MIN}-{EASE_MAX}, \
             estimatedMinutes as one of 15, 30, 45, 60, \
             and give a short reason (under {MAX_REASON} characters) for the recommendation.\n\n\
             Respond with ONLY a JSON object:\n\
             {{\"impact\": N, \"ease\": N, \"estimatedMinutes\": N, \"reason\": \"...\"}}",
            describe_category(category),
            context.render(),
        );

        let text = self.generate(&prompt, 0.7, 1000)?;
        let fragment = extract_object(&text)?;
        let value: Value = serde_json::from_str(fragment)
            .map_err(|e| GatewayError::Malformed(format!("JSON parse error: {e}")))?;
        evaluation_from_value(&value)
    }

    pub fn bulk_evaluate(
        &self,
        raw_text: &str,
        context: &PersonalContext,
    ) -> Result<Vec<BulkItem>, GatewayError> {
        let lines: Vec<&str> = raw_text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .take(MAX_BULK_LINES)
            .collect();
        if lines.is_empty() {
            return Err(GatewayError::Malformed("no tasks to evaluate".into()));
        }

        let numbered: Vec<String> = lines
            .iter()
            .enumerate()
            .map(|(i, l)| format!("{}. {}", i + 1, l))
            .collect();
        let prompt = format!(
            "You are a personal AI coach. Evaluate each task in this list.\n\n\
             Tasks:\n{}\n\n\
             User profile:\n{}\n\n\
             For every task decide the category: \"aspirational\" (curiosity, creativity, \
             learning, self-driven growth) or \"obligatory\" (responsibility, maintenance, \
             other people's expectations). Rate impact ({IMPACT_MIN}-{IMPACT_MAX}), ease \
             ({EASE_MIN}-{EASE_MAX}), estimatedMinutes (15, 30, 45 or 60) and give a short reason.\n\n\
             Respond with ONLY a JSON array:\n\
             [{{\"title\": \"...\", \"category\": \"aspirational\", \"impact\": N, \"ease\": N, \
             \"estimatedMinutes\": N, \"reason\": \"...\"}}, ...]",
            numbered.join("\n"),
            context.render(),
        );

        let text = self.generate(&prompt, 0.7, 4000)?;
        let fragment = extract_array(&text)?;
        let values: Vec<Value> = serde_json::from_str(fragment)
            .map_err(|e| GatewayError::Malformed(format!("JSON parse error: {e}")))?;

        let items: Vec<BulkItem> = values.iter().filter_map(bulk_item_from_value).collect();
        if items.is_empty() {
            return Err(GatewayError::Malformed("no parsable tasks in response".into()));
        }
        Ok(items)
    }

    pub fn generate_guide(
        &self,
        task: &Task,
        context: &PersonalContext,
    ) -> Result<Guide, GatewayError> {
        let prompt = format!(
            "You are a personal AI coach. Produce an execution guide for this task.\n\n\
             Task: \"{}\"\n\
             Impact: {}/10, Ease: {}/10, Estimated: {} minutes, Category: {}\n\n\
             User profile:\n{}\n\n\
             Give: an approach (why it suits this user, avoid perfectionism, under \
             {MAX_APPROACH} characters), 3-4 concrete steps (the first immediately actionable, \
             each under {MAX_STEP} characters), and a completion criterion (\"good enough\", \
             measurable, under {MAX_COMPLETION} characters).\n\n\
             Respond with ONLY a JSON object:\n\
             {{\"approach\": \"...\", \"steps\": [\"...\", \"...\", \"...\"], \"completion\": \"...\"}}",
            task.title,
            task.impact,
            task.ease,
            task.estimated_minutes,
            describe_category(task.category),
            context.render(),
        );

        let text = self.generate(&prompt, 0.8, 1500)?;
        let fragment = extract_object(&text)?;
        let value: Value = serde_json::from_str(fragment)
            .map_err(|e| GatewayError::Malformed(format!("JSON parse error: {e}")))?;
        guide_from_value(&value)
    }

    pub fn chat_turn(
        &self,
        message: &str,
        snapshot: &SessionSnapshot,
        history: &[ChatMessage],
        context: &PersonalContext,
    ) -> Result<String, GatewayError> {
        let tail = history
            .iter()
            .rev()
            .take(CHAT_HISTORY_WINDOW)
            .rev()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            "You are a personal AI coach answering a question mid-task.\n\n\
             Task: \"{}\"\n\
             Elapsed: {} minutes, remaining: {} minutes\n\n\
             User profile:\n{}\n\n\
             Conversation so far:\n{}\n\n\
             User: \"{}\"\n\n\
             Answer in an action-oriented tone, concretely, in under {MAX_CHAT_REPLY} characters.",
            snapshot.title,
            snapshot.elapsed_minutes,
            snapshot.remaining_minutes,
            context.render(),
            if tail.is_empty() { "(none)" } else { &tail },
            message,
        );

        let text = self.generate(&prompt, 0.9, 500)?;
        Ok(truncate_chars(text.trim(), MAX_CHAT_REPLY))
    }

    pub fn completion_summary(
        &self,
        task: &Task,
        actual_duration: u32,
        context: &PersonalContext,
    ) -> Result<String, GatewayError> {
        let pre_note = if task.pre_action_note.is_empty() {
            String::new()
        } else {
            format!("Pre-action note: {}\n", task.pre_action_note)
        };
        let prompt = format!(
            "The following task was just completed. Summarize what was done.\n\n\
             Task: \"{}\"\n\
             Category: {}, estimated {} minutes, actually spent {} minutes\n\
             {pre_note}\n\
             User profile:\n{}\n\n\
             Output only the summary of what was accomplished, under {MAX_SUMMARY} characters.",
            task.title,
            describe_category(task.category),
            task.estimated_minutes,
            actual_duration,
            context.render(),
        );

        let text = self.generate(&prompt, 0.7, 500)?;
        Ok(truncate_chars(text.trim(), MAX_SUMMARY))
    }
}

fn describe_category(category: Category) -> &'static str {
    match category {
        Category::Aspirational => "aspirational (intrinsically motivated)",
        Category::Obligatory => "obligatory (externally motivated)",
    }
}

/// Pull the generated text out of a `generateContent` response body.
fn parse_generate_response(body: &str) -> Result<String, GatewayError> {
    let json: Value =
        serde_json::from_str(body).map_err(|e| GatewayError::Malformed(e.to_string()))?;

    let candidate = json["candidates"]
        .get(0)
        .ok_or_else(|| GatewayError::Malformed("no candidates in response".into()))?;

    if let Some(reason) = candidate["finishReason"].as_str() {
        if matches!(reason, "SAFETY" | "RECITATION" | "MAX_TOKENS") {
            return Err(GatewayError::Blocked(reason.to_string()));
        }
    }

    candidate["content"]["parts"]
        .get(0)
        .and_then(|p| p["text"].as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| GatewayError::Malformed("no text in candidate".into()))
}

/// Find the outermost `{..}` span in free text.
fn extract_object(text: &str) -> Result<&str, GatewayError> {
    extract_span(text, '{', '}')
}

/// Find the outermost `[..]` span in free text.
fn extract_array(text: &str) -> Result<&str, GatewayError> {
    extract_span(text, '[', ']')
}

fn extract_span(text: &str, open: char, close: char) -> Result<&str, GatewayError> {
    let start = text.find(open);
    let end = text.rfind(close);
    match (start, end) {
        (Some(s), Some(e)) if e > s => Ok(&text[s..=e]),
        _ => Err(GatewayError::Malformed(format!(
            "no {open}{close} fragment found in response"
        ))),
    }
}

/// Validate and clamp a single evaluation record.
fn evaluation_from_value(value: &Value) -> Result<Evaluation, GatewayError> {
    let impact = value["impact"]
        .as_u64()
        .ok_or_else(|| GatewayError::Malformed("missing 'impact'".into()))?;
    let ease = value["ease"]
        .as_u64()
        .ok_or_else(|| GatewayError::Malformed("missing 'ease'".into()))?;
    let minutes = value["estimatedMinutes"]
        .as_u64()
        .ok_or_else(|| GatewayError::Malformed("missing 'estimatedMinutes'".into()))?;
    let reason = value["reason"]
        .as_str()
        .ok_or_else(|| GatewayError::Malformed("missing 'reason'".into()))?;

    Ok(Evaluation {
        impact: clamp(impact as u32, IMPACT_MIN, IMPACT_MAX),
        ease: clamp(ease as u32, EASE_MIN, EASE_MAX),
        estimated_minutes: snap_minutes(minutes as u32),
        reason: truncate_chars(reason, MAX_REASON),
    })
}

/// Lenient per-item parse for bulk results; a bad item is skipped rather
/// than failing the whole batch.
fn bulk_item_from_value(value: &Value) -> Option<BulkItem> {
    let title = value["title"].as_str()?.trim();
    if title.is_empty() {
        return None;
    }
    // Anything that is not explicitly obligatory counts as aspirational.
    let category = match value["category"].as_str() {
        Some("obligatory") => Category::Obligatory,
        _ => Category::Aspirational,
    };
    Some(BulkItem {
        title: truncate_chars(title, MAX_TITLE),
        category,
        evaluation: Evaluation {
            impact: clamp(value["impact"].as_u64().unwrap_or(7) as u32, IMPACT_MIN, IMPACT_MAX),
            ease: clamp(value["ease"].as_u64().unwrap_or(7) as u32, EASE_MIN, EASE_MAX),
            estimated_minutes: snap_minutes(
                value["estimatedMinutes"].as_u64().unwrap_or(30) as u32
            ),
            reason: truncate_chars(value["reason"].as_str().unwrap_or("AI evaluation"), MAX_REASON),
        },
    })
}

fn guide_from_value(value: &Value) -> Result<Guide, GatewayError> {
    let approach = value["approach"]
        .as_str()
        .ok_or_else(|| GatewayError::Malformed("missing 'approach'".into()))?;
    let steps = value["steps"]
        .as_array()
        .ok_or_else(|| GatewayError::Malformed("missing 'steps'".into()))?;
    let completion = value["completion"]
        .as_str()
        .ok_or_else(|| GatewayError::Malformed("missing 'completion'".into()))?;

    let steps: Vec<String> = steps
        .iter()
        .filter_map(|s| s.as_str())
        .map(|s| truncate_chars(s, MAX_STEP))
        .collect();
    if steps.is_empty() {
        return Err(GatewayError::Malformed("empty 'steps'".into()));
    }

    Ok(Guide {
        approach: truncate_chars(approach, MAX_APPROACH),
        steps,
        completion: truncate_chars(completion, MAX_COMPLETION),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_without_key() -> GeminiClient {
        GeminiClient::new(Settings::default())
    }

    #[test]
    fn no_credential_is_reported() {
        let client = client_without_key();
        let ctx = PersonalContext::default();
        let result = client.evaluate("write tests", Category::Obligatory, &ctx);
        assert!(matches!(result, Err(GatewayError::NoCredential)));
    }

    #[test]
    fn extract_object_from_prose() {
        let text = "Sure, here is the result:\n{\"impact\": 8}\nHope that helps!";
        assert_eq!(extract_object(text).unwrap(), "{\"impact\": 8}");
        assert!(extract_object("no json here").is_err());
    }

    #[test]
    fn extract_array_from_prose() {
        let text = "```json\n[{\"title\": \"a\"}]\n```";
        assert_eq!(extract_array(text).unwrap(), "[{\"title\": \"a\"}]");
    }

    #[test]
    fn parse_generate_response_happy_path() {
        let body = serde_json::json!({
            "candidates": [{
                "content": { "parts": [{ "text": "hello" }] },
                "finishReason": "STOP",
            }]
        })
        .to_string();
        assert_eq!(parse_generate_response(&body).unwrap(), "hello");
    }

    #[test]
    fn parse_generate_response_blocked() {
        let body = serde_json::json!({
            "candidates": [{ "finishReason": "SAFETY" }]
        })
        .to_string();
        assert!(matches!(
            parse_generate_response(&body),
            Err(GatewayError::Blocked(_))
        ));
    }

    #[test]
    fn parse_generate_response_missing_text() {
        let body = serde_json::json!({ "candidates": [{}] }).to_string();
        assert!(matches!(
            parse_generate_response(&body),
            Err(GatewayError::Malformed(_))
        ));
    }

    #[test]
    fn evaluation_is_clamped_and_snapped() {
        let value = serde_json::json!({
            "impact": 99,
            "ease": 1,
            "estimatedMinutes": 50,
            "reason": "r".repeat(500),
        });
        let eval = evaluation_from_value(&value).unwrap();
        assert_eq!(eval.impact, IMPACT_MAX);
        assert_eq!(eval.ease, EASE_MIN);
        assert_eq!(eval.estimated_minutes, 45);
        assert_eq!(eval.reason.chars().count(), MAX_REASON);
    }

    #[test]
    fn evaluation_missing_field_is_malformed() {
        let value = serde_json::json!({ "impact": 8, "ease": 7 });
        assert!(matches!(
            evaluation_from_value(&value),
            Err(GatewayError::Malformed(_))
        ));
    }

    #[test]
    fn bulk_item_defaults_unknown_category_to_aspirational() {
        let value = serde_json::json!({
            "title": "learn sketching",
            "category": "weird",
            "impact": 8,
            "ease": 7,
            "estimatedMinutes": 30,
            "reason": "fun",
        });
        let item = bulk_item_from_value(&value).unwrap();
        assert_eq!(item.category, Category::Aspirational);

        let value = serde_json::json!({
            "title": "file taxes",
            "category": "obligatory",
            "impact": 9,
            "ease": 6,
            "estimatedMinutes": 60,
            "reason": "deadline",
        });
        assert_eq!(bulk_item_from_value(&value).unwrap().category, Category::Obligatory);
    }

    #[test]
    fn bulk_item_without_title_is_skipped() {
        assert!(bulk_item_from_value(&serde_json::json!({ "impact": 8 })).is_none());
        assert!(bulk_item_from_value(&serde_json::json!({ "title": "  " })).is_none());
    }

    #[test]
    fn guide_requires_all_fields() {
        let value = serde_json::json!({
            "approach": "small steps",
            "steps": ["open the doc", "write one paragraph", "stop at good enough"],
            "completion": "one page drafted",
        });
        let guide = guide_from_value(&value).unwrap();
        assert_eq!(guide.steps.len(), 3);

        let missing = serde_json::json!({ "approach": "x", "steps": [] });
        assert!(guide_from_value(&missing).is_err());
    }
}
