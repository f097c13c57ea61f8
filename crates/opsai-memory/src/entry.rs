use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    Fact,
    Preference,
    Note,
}

impl MemoryCategory {
    pub fn label(self) -> &'static str {
        match self {
            MemoryCategory::Fact => "Fact",
            MemoryCategory::Preference => "Pref",
            MemoryCategory::Note => "Note",
        }
    }
}

/// One durable key/value fact. `hit_count` counts successful recalls only;
/// `updated_at` advances only on value change or re-insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub key: String,
    pub value: String,
    pub category: MemoryCategory,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub hit_count: u64,
}

impl MemoryEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>, category: MemoryCategory) -> Self {
        let now = Utc::now();
        Self {
            key: key.into(),
            value: value.into(),
            category,
            created_at: now,
            updated_at: now,
            hit_count: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entry_starts_at_zero_hits() {
        let entry = MemoryEntry::new("env.db", "postgres", MemoryCategory::Fact);
        assert_eq!(entry.hit_count, 0);
        assert_eq!(entry.created_at, entry.updated_at);
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(MemoryCategory::Fact.label(), "Fact");
        assert_eq!(MemoryCategory::Preference.label(), "Pref");
        assert_eq!(MemoryCategory::Note.label(), "Note");
    }
}
