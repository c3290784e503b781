//! Token usage accounting.

use serde::{Deserialize, Serialize};

/// Usage reported for one model call, or an aggregate of several.
///
/// `cached_prompt_tokens` is zero when the provider does not report prompt
/// caching. `model_id` is empty on aggregates spanning multiple models.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub prompt_tokens: u64,
    pub cached_prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub wallclock_ms: u64,
    #[serde(default)]
    pub model_id: String,
}

impl UsageRecord {
    pub fn new(model_id: impl Into<String>) -> Self {
        UsageRecord {
            model_id: model_id.into(),
            ..UsageRecord::default()
        }
    }

    /// Fold another record into this one. Keeps `model_id` only when every
    /// folded record agrees on it.
    pub fn absorb(&mut self, other: &UsageRecord) {
        self.prompt_tokens += other.prompt_tokens;
        self.cached_prompt_tokens += other.cached_prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
        self.wallclock_ms += other.wallclock_ms;
        if self.model_id != other.model_id {
            self.model_id.clear();
        }
    }

    /// Sum a sequence of records into one aggregate.
    pub fn total_of<'a>(records: impl IntoIterator<Item = &'a UsageRecord>) -> UsageRecord {
        let mut iter = records.into_iter();
        let mut total = match iter.next() {
            Some(first) => first.clone(),
            None => return UsageRecord::default(),
        };
        for record in iter {
            total.absorb(record);
        }
        total
    }
}
