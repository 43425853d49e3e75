use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::model::{ActionLogEntry, Category, LogKey};

/// History of completed tasks, most recent first. Receives synchronous
/// completion records and asynchronous background note patches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionLog {
    pub entries: Vec<ActionLogEntry>,
}

impl ActionLog {
    /// Insert at the head so the newest completion lists first.
    pub fn append(&mut self, entry: ActionLogEntry) {
        self.entries.insert(0, entry);
    }

    /// Apply a background summary to the entry matching the composite key.
    /// Returns whether a patch landed; a missing entry (deleted since the
    /// request was issued) is not an error and never creates a new entry.
    pub fn patch_note(&mut self, key: &LogKey, note: &str) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|e| e.id == key.id && e.completed_at == key.completed_at)
        {
            Some(entry) => {
                entry.post_action_note = note.to_string();
                true
            }
            None => false,
        }
    }

    pub fn edit(&mut self, index: usize, entry: ActionLogEntry) -> Result<()> {
        let Some(slot) = self.entries.get_mut(index) else {
            bail!("no log entry at index {index}");
        };
        *slot = entry;
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<ActionLogEntry> {
        if index >= self.entries.len() {
            bail!("no log entry at index {index}");
        }
        Ok(self.entries.remove(index))
    }

    pub fn get(&self, index: usize) -> Option<&ActionLogEntry> {
        self.entries.get(index)
    }

    /// Read-side projection for display.
    pub fn filter(&self, category: Option<Category>) -> Vec<&ActionLogEntry> {
        self.entries
            .iter()
            .filter(|e| category.map_or(true, |c| e.category == c))
            .collect()
    }

    pub fn count_for(&self, category: Category) -> usize {
        self.entries.iter().filter(|e| e.category == category).count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Task;

    fn entry(id: i64, completed_at: &str, category: Category) -> ActionLogEntry {
        let task = Task {
            id,
            title: format!("task-{id}"),
            category,
            impact: 8,
            ease: 7,
            estimated_minutes: 30,
            score: 56,
            reason: String::new(),
            pre_action_note: String::new(),
            post_action_note: String::new(),
            created_at: "2025-01-01T00:00:00Z".to_string(),
        };
        ActionLogEntry::from_task(&task, completed_at.to_string(), 30, 30, "provisional".to_string())
    }

    #[test]
    fn append_inserts_at_head() {
        let mut log = ActionLog::default();
        log.append(entry(1, "2025-01-01T10:00:00Z", Category::Aspirational));
        log.append(entry(2, "2025-01-01T11:00:00Z", Category::Aspirational));
        assert_eq!(log.entries[0].id, 2);
        assert_eq!(log.entries[1].id, 1);
    }

    #[test]
    fn patch_matches_composite_key_only() {
        let mut log = ActionLog::default();
        // Same id completed twice: only the exact timestamp match is patched.
        log.append(entry(1, "2025-01-01T10:00:00Z", Category::Aspirational));
        log.append(entry(1, "2025-01-01T11:00:00Z", Category::Aspirational));

        let key = LogKey {
            id: 1,
            completed_at: "2025-01-01T10:00:00Z".to_string(),
        };
        assert!(log.patch_note(&key, "summary"));
        assert_eq!(log.entries[1].post_action_note, "summary");
        assert_eq!(log.entries[0].post_action_note, "provisional");
    }

    #[test]
    fn patch_is_idempotent() {
        let mut log = ActionLog::default();
        log.append(entry(1, "2025-01-01T10:00:00Z", Category::Aspirational));
        let key = log.entries[0].key();
        assert!(log.patch_note(&key, "summary"));
        assert!(log.patch_note(&key, "summary"));
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries[0].post_action_note, "summary");
    }

    #[test]
    fn patch_miss_never_creates_an_entry() {
        let mut log = ActionLog::default();
        log.append(entry(1, "2025-01-01T10:00:00Z", Category::Aspirational));
        let key = log.entries[0].key();
        log.remove(0).unwrap();
        assert!(!log.patch_note(&key, "late summary"));
        assert!(log.is_empty());
    }

    #[test]
    fn edit_and_remove_by_index() {
        let mut log = ActionLog::default();
        log.append(entry(1, "2025-01-01T10:00:00Z", Category::Aspirational));
        let mut updated = log.entries[0].clone();
        updated.post_action_note = "edited".to_string();
        log.edit(0, updated).unwrap();
        assert_eq!(log.entries[0].post_action_note, "edited");

        assert!(log.edit(5, log.entries[0].clone()).is_err());
        assert!(log.remove(5).is_err());
        log.remove(0).unwrap();
        assert!(log.is_empty());
    }

    #[test]
    fn filter_by_category() {
        let mut log = ActionLog::default();
        log.append(entry(1, "2025-01-01T10:00:00Z", Category::Aspirational));
        log.append(entry(2, "2025-01-01T11:00:00Z", Category::Obligatory));
        assert_eq!(log.filter(None).len(), 2);
        let obligatory = log.filter(Some(Category::Obligatory));
        assert_eq!(obligatory.len(), 1);
        assert_eq!(obligatory[0].id, 2);
        assert_eq!(log.count_for(Category::Aspirational), 1);
    }
}
