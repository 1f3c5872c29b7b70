use serde::{Deserialize, Serialize};

/// `source` value marking a knowledge record as a journal entry.
pub const JOURNAL_SOURCE: &str = "journal";

/// Audit kinds emitted by the journal.
pub const ACTION_JOURNAL_CREATE: &str = "journal:create";
pub const ACTION_JOURNAL_UPDATE: &str = "journal:update";
pub const ACTION_JOURNAL_DELETE: &str = "journal:delete";
pub const ACTION_JOURNAL_TOGGLE_STAR: &str = "journal:toggle_star";

const PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewJournalEntry {
    /// Markdown body; must not be blank.
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_starred: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JournalEntryUpdate {
    pub content: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_starred: Option<bool>,
}

/// First characters of an entry, for audit details.
pub fn content_preview(content: &str) -> String {
    let mut chars = content.chars();
    let preview: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", preview)
    } else {
        preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(content_preview("short"), "short");

        let long = "日".repeat(60);
        let preview = content_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), PREVIEW_CHARS + 3);
    }
}
