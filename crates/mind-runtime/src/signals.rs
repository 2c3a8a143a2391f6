//! Derived memory: implicit feedback, memory-context merging, and run insights.

use chrono::{DateTime, Utc};
use mind_config::FeedbackConfig;
use mind_core::{MemoryEntry, Mind, Task, TaskStatus, category};
use std::collections::{BTreeMap, HashSet};

use crate::prompt::truncate_chars;

/// Characters of the latest output kept in an insight.
const INSIGHT_OUTPUT_CHARS: usize = 200;

/// Lowercase alphanumeric runs of at least `min_len` characters.
pub fn feedback_tokens(text: &str, min_len: usize) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= min_len)
        .map(|t| t.to_lowercase())
        .collect()
}

/// Jaccard similarity of two token sets. Two empty sets score 0.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

/// What a behavioral signal says about the user's intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// The previous task failed; the user expects this one to work.
    Reliability,
    /// A quick, similar follow-up to a completed task.
    Refinement,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Reliability => "reliability",
            SignalKind::Refinement => "refinement",
        }
    }
}

/// An implicit-feedback memory plus the facts it was inferred from.
#[derive(Debug, Clone)]
pub struct ImplicitSignal {
    pub kind: SignalKind,
    pub previous_task_id: String,
    pub similarity: f64,
    pub entry: MemoryEntry,
}

/// Compare a new task description against the Mind's previous task.
pub fn infer_implicit_feedback(
    mind: &Mind,
    previous: &Task,
    description: &str,
    now: DateTime<Utc>,
    config: &FeedbackConfig,
) -> Option<ImplicitSignal> {
    let similarity = jaccard(
        &feedback_tokens(&previous.description, config.min_token_len),
        &feedback_tokens(description, config.min_token_len),
    );
    let header = format!(
        "Inferred implicit feedback from task history:\nMind: {} ({})",
        mind.name, mind.id
    );
    let previous_preview = truncate_chars(previous.description.trim(), 160);

    let (kind, body, keywords) = match previous.status {
        TaskStatus::Failed => (
            SignalKind::Reliability,
            format!(
                "- Previous task '{previous_preview}' failed before this request arrived.\n\
                 - Inference: the user expects reliable completion; verify results before reporting success."
            ),
            vec!["implicit_feedback", "reliability", "retry_signal"],
        ),
        TaskStatus::Completed => {
            let finished = previous.completed_at.unwrap_or(previous.created_at);
            let elapsed = now.signed_duration_since(finished).num_minutes();
            if elapsed < 0
                || elapsed > config.refinement_window_minutes
                || similarity < config.similarity_threshold
            {
                return None;
            }
            (
                SignalKind::Refinement,
                format!(
                    "- Follow-up to completed task '{previous_preview}' (similarity {similarity:.2}).\n\
                     - Inference: the previous result likely missed part of the intent; treat this as a refinement."
                ),
                vec!["implicit_feedback", "refinement", "follow_up"],
            )
        }
        TaskStatus::Pending | TaskStatus::Running => return None,
    };

    let entry = MemoryEntry::new(&mind.id, format!("{header}\n{body}"))
        .with_category(category::IMPLICIT_FEEDBACK)
        .with_keywords(keywords);
    Some(ImplicitSignal {
        kind,
        previous_task_id: previous.id.clone(),
        similarity,
        entry,
    })
}

/// Merge priority-ordered groups, keeping the first occurrence of each id.
pub fn merge_memory_context(groups: Vec<Vec<MemoryEntry>>, limit: usize) -> Vec<MemoryEntry> {
    let labeled = groups.into_iter().map(|g| ("", g)).collect();
    merge_labeled(labeled, limit)
        .into_iter()
        .map(|(_, entry)| entry)
        .collect()
}

/// [`merge_memory_context`] that remembers which group each entry came from.
pub fn merge_labeled(
    groups: Vec<(&'static str, Vec<MemoryEntry>)>,
    limit: usize,
) -> Vec<(&'static str, MemoryEntry)> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for (label, group) in groups {
        for entry in group {
            if merged.len() >= limit {
                return merged;
            }
            if seen.insert(entry.id.clone()) {
                merged.push((label, entry));
            }
        }
    }
    merged
}

/// What the pipeline knows about a run when it writes the insight.
#[derive(Debug)]
pub struct RunSummary<'a> {
    pub description: &'a str,
    pub status: TaskStatus,
    pub failure_reason: Option<&'a str>,
    pub latest_text: Option<&'a str>,
    pub event_counts: &'a BTreeMap<&'static str, usize>,
    pub feedback_considered: usize,
    pub implicit_considered: usize,
}

/// The `mind_insight` memory written after every run.
pub fn build_insight(mind_id: &str, summary: &RunSummary<'_>) -> MemoryEntry {
    let mut lines = vec![
        "Autonomous insight from task execution:".to_string(),
        format!("Task: {}", summary.description),
        format!("Outcome: {}", summary.status),
    ];
    if let Some(reason) = summary.failure_reason {
        lines.push(format!("Failure reason: {reason}"));
    }
    if let Some(text) = summary.latest_text {
        lines.push(format!(
            "Latest output: {}",
            truncate_chars(text, INSIGHT_OUTPUT_CHARS)
        ));
    }
    if !summary.event_counts.is_empty() {
        let counts: Vec<String> = summary
            .event_counts
            .iter()
            .map(|(kind, n)| format!("{kind}={n}"))
            .collect();
        lines.push(format!("Event counts: {}", counts.join(", ")));
    }
    if summary.feedback_considered > 0 {
        lines.push(format!(
            "Feedback memories considered: {}",
            summary.feedback_considered
        ));
    }
    if summary.implicit_considered > 0 {
        lines.push(format!(
            "Implicit signals considered: {}",
            summary.implicit_considered
        ));
    }

    let mut keywords = vec![
        "insight".to_string(),
        "learning".to_string(),
        summary.status.to_string(),
    ];
    if summary.status == TaskStatus::Failed {
        keywords.push("failure".into());
    }
    if summary.event_counts.get("tool_use").copied().unwrap_or(0) > 0 {
        keywords.push("tool_usage".into());
    }

    MemoryEntry::new(mind_id, lines.join("\n"))
        .with_category(category::MIND_INSIGHT)
        .with_keywords(keywords)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_skip_short_words() {
        let tokens = feedback_tokens("Fix the CSV-export bug, ok?", 3);
        let mut sorted: Vec<_> = tokens.into_iter().collect();
        sorted.sort();
        assert_eq!(sorted, vec!["bug", "csv", "export", "fix", "the"]);
    }

    #[test]
    fn test_jaccard() {
        let a = feedback_tokens("build the report", 3);
        let b = feedback_tokens("build the summary", 3);
        assert!((jaccard(&a, &b) - 0.5).abs() < f64::EPSILON);
        assert_eq!(jaccard(&HashSet::new(), &HashSet::new()), 0.0);
    }

    #[test]
    fn test_insight_keywords() {
        let mut counts = BTreeMap::new();
        counts.insert("tool_use", 2);
        counts.insert("text", 1);
        let long = "x".repeat(300);
        let summary = RunSummary {
            description: "do it",
            status: TaskStatus::Failed,
            failure_reason: Some("boom"),
            latest_text: Some(long.as_str()),
            event_counts: &counts,
            feedback_considered: 0,
            implicit_considered: 2,
        };
        let entry = build_insight("m1", &summary);
        assert!(entry.content.contains("Failure reason: boom"));
        assert!(entry.content.contains("Event counts: text=1, tool_use=2"));
        assert!(entry.content.contains("Implicit signals considered: 2"));
        assert!(!entry.content.contains("Feedback memories considered"));
        assert!(entry.content.contains(&format!("{}...", "x".repeat(200))));
        assert_eq!(
            entry.relevance_keywords,
            vec!["insight", "learning", "failed", "failure", "tool_usage"]
        );
    }
}
