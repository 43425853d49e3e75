use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::model::{now_millis, Category, Task};

/// Which free-text note field to update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteField {
    Pre,
    Post,
}

impl NoteField {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pre" => Ok(Self::Pre),
            "post" => Ok(Self::Post),
            _ => bail!("invalid note field '{s}': must be pre or post"),
        }
    }
}

/// The live task collections, one per category. Each collection is kept
/// sorted descending by score; ties keep insertion order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskBoard {
    pub aspirational: Vec<Task>,
    pub obligatory: Vec<Task>,
}

impl TaskBoard {
    pub fn collection(&self, category: Category) -> &[Task] {
        match category {
            Category::Aspirational => &self.aspirational,
            Category::Obligatory => &self.obligatory,
        }
    }

    fn collection_mut(&mut self, category: Category) -> &mut Vec<Task> {
        match category {
            Category::Aspirational => &mut self.aspirational,
            Category::Obligatory => &mut self.obligatory,
        }
    }

    /// Insert into the task's category collection and restore sort order.
    pub fn insert(&mut self, task: Task) {
        let coll = self.collection_mut(task.category);
        coll.push(task);
        coll.sort_by(|a, b| b.score.cmp(&a.score));
    }

    pub fn find(&self, id: i64) -> Option<&Task> {
        self.aspirational
            .iter()
            .chain(self.obligatory.iter())
            .find(|t| t.id == id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.find(id).is_some()
    }

    /// Remove a task from whichever collection holds it and return it.
    pub fn take(&mut self, id: i64) -> Option<Task> {
        for coll in [&mut self.aspirational, &mut self.obligatory] {
            if let Some(pos) = coll.iter().position(|t| t.id == id) {
                return Some(coll.remove(pos));
            }
        }
        None
    }

    pub fn delete(&mut self, id: i64) -> Result<()> {
        if self.take(id).is_none() {
            bail!("task {id} not found");
        }
        Ok(())
    }

    /// Empty a category collection, returning how many tasks were removed.
    pub fn clear_category(&mut self, category: Category) -> usize {
        let coll = self.collection_mut(category);
        let count = coll.len();
        coll.clear();
        count
    }

    /// Update a note field on the stored task. The caller is responsible for
    /// propagating the change into an active session's cached copy.
    pub fn update_note(&mut self, id: i64, field: NoteField, value: &str) -> Result<()> {
        for coll in [&mut self.aspirational, &mut self.obligatory] {
            if let Some(task) = coll.iter_mut().find(|t| t.id == id) {
                match field {
                    NoteField::Pre => task.pre_action_note = value.to_string(),
                    NoteField::Post => task.post_action_note = value.to_string(),
                }
                return Ok(());
            }
        }
        bail!("task {id} not found");
    }

    pub fn len(&self) -> usize {
        self.aspirational.len() + self.obligatory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Id source for task creation. A bulk batch shares one millisecond base
/// with per-item offsets, and the base is bumped past the previous batch so
/// two operations in the same millisecond cannot collide.
#[derive(Debug, Default)]
pub struct IdGen {
    last: i64,
}

impl IdGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self) -> i64 {
        self.batch(1)[0]
    }

    pub fn batch(&mut self, count: usize) -> Vec<i64> {
        let mut base = now_millis();
        if base <= self.last {
            base = self.last + 1;
        }
        self.last = base + count as i64 - 1;
        (0..count as i64).map(|offset| base + offset).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: i64, category: Category, impact: u32, ease: u32) -> Task {
        let mut t = Task {
            id,
            title: format!("task-{id}"),
            category,
            impact,
            ease,
            estimated_minutes: 30,
            score: 0,
            reason: String::new(),
            pre_action_note: String::new(),
            post_action_note: String::new(),
            created_at: "2025-01-01T00:00:00Z".to_string(),
        };
        t.rescore();
        t
    }

    fn assert_sorted(coll: &[Task]) {
        for pair in coll.windows(2) {
            assert!(pair[0].score >= pair[1].score, "collection not sorted by score");
        }
    }

    #[test]
    fn insert_keeps_collection_sorted() {
        let mut board = TaskBoard::default();
        board.insert(task(1, Category::Aspirational, 7, 6));
        board.insert(task(2, Category::Aspirational, 10, 10));
        board.insert(task(3, Category::Aspirational, 8, 8));
        assert_sorted(&board.aspirational);
        assert_eq!(board.aspirational[0].id, 2);
        for t in &board.aspirational {
            assert_eq!(t.score, t.impact * t.ease);
        }
    }

    #[test]
    fn equal_scores_keep_insertion_order() {
        let mut board = TaskBoard::default();
        board.insert(task(1, Category::Obligatory, 8, 7));
        board.insert(task(2, Category::Obligatory, 7, 8));
        board.insert(task(3, Category::Obligatory, 8, 7));
        let ids: Vec<i64> = board.obligatory.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn insert_targets_task_category() {
        let mut board = TaskBoard::default();
        board.insert(task(1, Category::Aspirational, 7, 6));
        board.insert(task(2, Category::Obligatory, 7, 6));
        assert_eq!(board.aspirational.len(), 1);
        assert_eq!(board.obligatory.len(), 1);
    }

    #[test]
    fn take_removes_from_either_collection() {
        let mut board = TaskBoard::default();
        board.insert(task(1, Category::Aspirational, 7, 6));
        board.insert(task(2, Category::Obligatory, 7, 6));
        let taken = board.take(2).unwrap();
        assert_eq!(taken.id, 2);
        assert!(!board.contains(2));
        assert!(board.take(2).is_none());
    }

    #[test]
    fn delete_missing_fails() {
        let mut board = TaskBoard::default();
        assert!(board.delete(99).is_err());
    }

    #[test]
    fn clear_category_reports_count() {
        let mut board = TaskBoard::default();
        board.insert(task(1, Category::Aspirational, 7, 6));
        board.insert(task(2, Category::Aspirational, 7, 6));
        board.insert(task(3, Category::Obligatory, 7, 6));
        assert_eq!(board.clear_category(Category::Aspirational), 2);
        assert!(board.aspirational.is_empty());
        assert_eq!(board.obligatory.len(), 1);
    }

    #[test]
    fn update_note_fields() {
        let mut board = TaskBoard::default();
        board.insert(task(1, Category::Aspirational, 7, 6));
        board.update_note(1, NoteField::Pre, "before").unwrap();
        board.update_note(1, NoteField::Post, "after").unwrap();
        let t = board.find(1).unwrap();
        assert_eq!(t.pre_action_note, "before");
        assert_eq!(t.post_action_note, "after");
        assert!(board.update_note(99, NoteField::Pre, "x").is_err());
    }

    #[test]
    fn batch_ids_are_distinct_and_offset() {
        let mut ids = IdGen::new();
        let batch = ids.batch(20);
        assert_eq!(batch.len(), 20);
        for pair in batch.windows(2) {
            assert_eq!(pair[1], pair[0] + 1);
        }
    }

    #[test]
    fn consecutive_batches_never_collide() {
        let mut ids = IdGen::new();
        let a = ids.batch(5);
        let b = ids.batch(5);
        let c = ids.next();
        let mut all: Vec<i64> = a.into_iter().chain(b).chain([c]).collect();
        let before = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), before);
    }
}
