//! Command history
//!
//! Append-only list of shell commands with stable display indices and a
//! navigation cursor. Recall hands out copies, so editing a recalled line
//! never touches the stored entry.

/// A single history entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    /// Display index, monotonically increasing until the history is cleared
    pub index: u32,
    /// The command text
    pub command: String,
}

/// Command history storage
#[derive(Clone, Debug)]
pub struct CommandHistory {
    /// All history entries (newest last)
    entries: Vec<HistoryEntry>,
    next_index: u32,
    max_entries: usize,
    /// Navigation cursor; `entries.len()` means "past the end"
    cursor: usize,
}

impl CommandHistory {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            next_index: 1,
            max_entries: max_entries.max(1),
            cursor: 0,
        }
    }

    /// Add a command to history
    pub fn add(&mut self, command: &str) {
        // Skip empty or whitespace-only commands
        let trimmed = command.trim();
        if trimmed.is_empty() {
            return;
        }

        self.entries.push(HistoryEntry {
            index: self.next_index,
            command: trimmed.to_string(),
        });
        self.next_index += 1;

        // Trim if exceeding limit
        if self.entries.len() > self.max_entries {
            let excess = self.entries.len() - self.max_entries;
            self.entries.drain(..excess);
        }
        self.cursor = self.entries.len();
    }

    /// Step back; stays on the oldest entry once reached
    pub fn previous(&mut self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        self.cursor = self.cursor.saturating_sub(1).min(self.entries.len() - 1);
        Some(self.entries[self.cursor].command.clone())
    }

    /// Step forward; past the newest entry yields an empty line
    pub fn next(&mut self) -> Option<String> {
        if self.entries.is_empty() {
            return None;
        }
        if self.cursor + 1 < self.entries.len() {
            self.cursor += 1;
            Some(self.entries[self.cursor].command.clone())
        } else {
            self.cursor = self.entries.len();
            Some(String::new())
        }
    }

    pub fn reset_cursor(&mut self) {
        self.cursor = self.entries.len();
    }

    /// Entry with display index `index`
    pub fn get(&self, index: u32) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.index == index)
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    /// Newest `count` entries, oldest first
    pub fn recent(&self, count: usize) -> &[HistoryEntry] {
        let start = self.entries.len().saturating_sub(count);
        &self.entries[start..]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry and restart numbering
    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_index = 1;
        self.cursor = 0;
    }

    /// `index  command` listing lines
    pub fn format_lines(&self, limit: Option<usize>) -> Vec<String> {
        let entries = match limit {
            Some(count) => self.recent(count),
            None => &self.entries,
        };
        entries
            .iter()
            .map(|e| format!("{:4}  {}", e.index, e.command))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_of(commands: &[&str]) -> CommandHistory {
        let mut history = CommandHistory::new(100);
        for cmd in commands {
            history.add(cmd);
        }
        history
    }

    #[test]
    fn test_previous_walks_back() {
        let mut history = history_of(&["ls", "pwd", "echo hi"]);
        assert_eq!(history.previous().as_deref(), Some("echo hi"));
        assert_eq!(history.previous().as_deref(), Some("pwd"));
        assert_eq!(history.previous().as_deref(), Some("ls"));
        assert_eq!(history.previous().as_deref(), Some("ls"));
        assert_eq!(history.next().as_deref(), Some("pwd"));
        assert_eq!(history.next().as_deref(), Some("echo hi"));
        assert_eq!(history.next().as_deref(), Some(""));
        assert_eq!(history.previous().as_deref(), Some("echo hi"));
    }

    #[test]
    fn test_recall_is_a_copy() {
        let mut history = history_of(&["ls", "pwd"]);
        let mut line = history.previous().unwrap_or_default();
        line.push_str(" -la");
        assert_eq!(history.entries()[1].command, "pwd");
    }

    #[test]
    fn test_limit_keeps_indices() {
        let mut history = CommandHistory::new(2);
        for cmd in ["a", "b", "", "  ", "c"] {
            history.add(cmd);
        }
        assert_eq!(history.len(), 2);
        assert_eq!(history.format_lines(None), vec!["   2  b", "   3  c"]);
        assert_eq!(history.get(3).map(|e| e.command.as_str()), Some("c"));
        assert!(history.get(1).is_none());
    }

    #[test]
    fn test_add_resets_cursor_and_clear_restarts() {
        let mut history = history_of(&["one", "two"]);
        history.previous();
        history.previous();
        history.add("three");
        assert_eq!(history.previous().as_deref(), Some("three"));

        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.previous(), None);
        history.add("again");
        assert_eq!(history.entries()[0].index, 1);
    }
}
