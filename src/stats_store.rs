use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::llm::LlmUsage;

/// One persisted generation snapshot, consumed by an external reporting
/// layer. Written after a successful run; never read back by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStat {
    pub user_identifier: String,
    pub prompt: String,
    pub track_count: usize,
    pub total_duration_ms: u64,
    pub top_genre: String,
    pub avg_novelty: Option<f64>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Serialized genre_top rows for dashboard breakdowns.
    pub genre_breakdown: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl GenerationStat {
    pub fn with_usage(mut self, usage: LlmUsage) -> Self {
        self.prompt_tokens = usage.prompt_tokens;
        self.completion_tokens = usage.completion_tokens;
        self.total_tokens = usage.total_tokens;
        self
    }
}

/// Destination for generation stats. The real store lives outside this
/// crate; failures are logged by the caller and never fail a generation.
#[cfg_attr(test, mockall::automock)]
pub trait StatSink {
    fn record(&self, stat: GenerationStat) -> Result<()>;
}

/// In-memory sink for the CLI and tests.
#[derive(Default)]
pub struct MemoryStatSink {
    records: Mutex<Vec<GenerationStat>>,
}

impl MemoryStatSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<GenerationStat> {
        self.records.lock().expect("stat sink lock poisoned").clone()
    }
}

impl StatSink for MemoryStatSink {
    fn record(&self, stat: GenerationStat) -> Result<()> {
        self.records
            .lock()
            .expect("stat sink lock poisoned")
            .push(stat);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_sink_accumulates_records() {
        let sink = MemoryStatSink::new();
        let stat = GenerationStat {
            user_identifier: "u".to_string(),
            prompt: "p".to_string(),
            track_count: 3,
            total_duration_ms: 1_000,
            top_genre: "pop".to_string(),
            avg_novelty: Some(80.0),
            prompt_tokens: 0,
            completion_tokens: 0,
            total_tokens: 0,
            genre_breakdown: serde_json::json!([]),
            created_at: Utc::now(),
        }
        .with_usage(LlmUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        });
        sink.record(stat).unwrap();

        let records = sink.snapshot();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].total_tokens, 15);
    }
}
