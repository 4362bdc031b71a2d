use anyhow::{Context, Result};

use crate::state::StateStore;

/// Row-level resume point kept under an integer key of the state document.
///
/// The stored value is the index of the next unit to process. It is written
/// after every unit, so an interrupted run redoes at most one unit.
pub struct ResumableCursor<'a> {
    state: &'a StateStore,
    key: String,
}

impl<'a> ResumableCursor<'a> {
    pub fn new(state: &'a StateStore, key: impl Into<String>) -> Self {
        Self {
            state,
            key: key.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Index of the first unit not yet done.
    pub fn start(&self) -> usize {
        usize::try_from(self.state.cursor(&self.key)).unwrap_or(usize::MAX)
    }

    /// Record unit `index` as durable.
    pub fn advance(&self, index: usize) -> Result<()> {
        self.state.set(&self.key, index + 1)
    }

    pub fn reset(&self) -> Result<()> {
        self.state.set(&self.key, 0usize)
    }

    /// Process `items` from the stored position on, advancing after each
    /// success. Stops at the first failing unit without advancing past it.
    /// Returns the number of units processed in this call.
    pub fn run<T, F>(&self, items: &[T], mut f: F) -> Result<usize>
    where
        F: FnMut(usize, &T) -> Result<()>,
    {
        let start = self.start();
        if start >= items.len() {
            tracing::debug!(key = %self.key, start, total = items.len(), "Cursor already past end");
            return Ok(0);
        }
        if start > 0 {
            tracing::info!(key = %self.key, start, total = items.len(), "Resuming from cursor");
        }

        let mut processed = 0;
        for (index, item) in items.iter().enumerate().skip(start) {
            f(index, item).with_context(|| format!("Unit {} failed ({})", index, self.key))?;
            self.advance(index)?;
            processed += 1;
        }

        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_cursor_starts_at_zero_and_advances() {
        let dir = tempdir().unwrap();
        let state = StateStore::new(dir.path().join("state.json"));
        let cursor = ResumableCursor::new(&state, "ocr_index");

        assert_eq!(cursor.start(), 0);
        cursor.advance(4).unwrap();
        assert_eq!(cursor.start(), 5);
        assert_eq!(state.cursor("ocr_index"), 5);
    }

    #[test]
    fn test_run_stops_at_failure_and_resumes() {
        let dir = tempdir().unwrap();
        let state = StateStore::new(dir.path().join("state.json"));
        let cursor = ResumableCursor::new(&state, "social_index");
        let items = ["a", "b", "c", "d"];

        let mut seen = Vec::new();
        let result = cursor.run(&items, |_, item| {
            if *item == "c" {
                anyhow::bail!("rate limited");
            }
            seen.push(item.to_string());
            Ok(())
        });
        assert!(result.is_err());
        assert_eq!(seen, vec!["a", "b"]);
        assert_eq!(cursor.start(), 2);

        let mut resumed = Vec::new();
        let processed = cursor
            .run(&items, |index, item| {
                resumed.push((index, item.to_string()));
                Ok(())
            })
            .unwrap();
        assert_eq!(processed, 2);
        assert_eq!(resumed, vec![(2, "c".to_string()), (3, "d".to_string())]);
        assert_eq!(cursor.start(), 4);

        assert_eq!(cursor.run(&items, |_, _| Ok(())).unwrap(), 0);
    }

    #[test]
    fn test_reset() {
        let dir = tempdir().unwrap();
        let state = StateStore::new(dir.path().join("state.json"));
        let cursor = ResumableCursor::new(&state, "ocr_index");
        cursor.advance(9).unwrap();
        cursor.reset().unwrap();
        assert_eq!(cursor.start(), 0);
    }
}
