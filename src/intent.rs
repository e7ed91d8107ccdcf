//! Intent classification.
//!
//! Maps raw utterance text to a routing category using an ordered rule
//! list: the first matching rule wins, and an unmatched utterance falls
//! through to casual chat. Pure and deterministic so it can be tested in
//! isolation — no ambiguity resolution beyond rule order.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Routing category for a user utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    /// Requests to produce code (websites, apps, scripts).
    CodeGeneration,
    /// Requests to create or modify files/documents.
    FileOperation,
    /// Introspective commands (memory, history, file listings).
    SystemCommand,
    /// Everything else: conversation, questions, small talk.
    CasualChat,
}

impl IntentCategory {
    /// Get the category name as carried in response metadata.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CodeGeneration => "code_generation",
            Self::FileOperation => "file_operation",
            Self::SystemCommand => "system_command",
            Self::CasualChat => "casual_chat",
        }
    }
}

static FILE_OPERATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(save|write|create|generate)\b.*\b(file|document)\b").expect("valid pattern")
});

static SYSTEM_COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(show|list|display)\b.*\b(memory|history|files)\b").expect("valid pattern")
});

/// Classify an utterance into a routing category.
///
/// Rules are evaluated strictly in priority order; ties are impossible
/// because the first match returns immediately. Matching is
/// case-insensitive.
pub fn classify(text: &str) -> IntentCategory {
    let lower = text.to_lowercase();

    // 1. Code generation: "create" plus a buildable artifact
    if lower.contains("create")
        && (lower.contains("website") || lower.contains("app") || lower.contains("script"))
    {
        return IntentCategory::CodeGeneration;
    }

    // 2. File operations
    if FILE_OPERATION_RE.is_match(&lower) {
        return IntentCategory::FileOperation;
    }

    // 3. System commands
    if SYSTEM_COMMAND_RE.is_match(&lower) {
        return IntentCategory::SystemCommand;
    }

    // 4. Default
    IntentCategory::CasualChat
}

// ── Tests ────────────────────────────────────────────────────────
