//! Conversation memory: a bounded, durable log of turns.
//!
//! Memory holds the most recent `max_turns` turns (oldest evicted first)
//! and persists the whole log as one JSON document
//! `{"messages": [...], "lastUpdated": "<RFC3339>"}` — replaced wholesale
//! on every save. Persistence is fire-and-forget relative to the turn
//! pipeline: a failed write is logged, never escalated to the caller.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::util::now_epoch_ms;

/// Default retained turn count.
pub const DEFAULT_MAX_TURNS: usize = 100;

/// Default context window size for [`ConversationMemory::context`].
pub const DEFAULT_CONTEXT_TURNS: usize = 10;

// ── Turn ─────────────────────────────────────────────────────────

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    /// Get the role name used in prompts and summaries.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One utterance or reply. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    /// Unique identifier, `msg_<epoch-ms>_<short-uuid>`.
    pub id: String,
    pub role: TurnRole,
    /// Turn text. Stored as `content` in the persisted document.
    #[serde(rename = "content")]
    pub text: String,
    /// Creation time, epoch milliseconds.
    pub timestamp: u64,
}

impl Turn {
    fn new(role: TurnRole, text: &str) -> Self {
        let timestamp = now_epoch_ms();
        let short = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: format!("msg_{}_{}", timestamp, &short[..9]),
            role,
            text: text.to_string(),
            timestamp,
        }
    }
}

// ── Context window ───────────────────────────────────────────────

/// Read-only projection of recent memory, computed fresh per request.
#[derive(Debug, Clone)]
pub struct ContextWindow {
    /// The last K turns, oldest first.
    pub recent: Vec<Turn>,
    /// Total turns currently retained.
    pub total_turns: usize,
    /// Timestamp of the oldest retained turn (now, when memory is empty).
    pub conversation_start: u64,
}

/// Aggregate memory statistics.
#[derive(Debug, Clone, Serialize)]
pub struct MemoryStats {
    pub total_turns: usize,
    pub user_turns: usize,
    pub assistant_turns: usize,
    pub oldest: Option<u64>,
    pub newest: Option<u64>,
}

// ── Persisted document ───────────────────────────────────────────

/// On-disk document shape. The file is replaced wholesale on every save.
#[derive(Debug, Serialize, Deserialize)]
struct MemoryDocument {
    messages: Vec<Turn>,
    #[serde(rename = "lastUpdated")]
    last_updated: String,
}

// ── Conversation memory ──────────────────────────────────────────

/// Bounded ordered log of turns with optional JSON-file persistence.
///
/// Mutated only by the turn orchestrator; wrap in `Arc<tokio::sync::Mutex>`
/// to share across connection tasks.
pub struct ConversationMemory {
    turns: Vec<Turn>,
    max_turns: usize,
    store_path: Option<PathBuf>,
}

impl ConversationMemory {
    /// Create an in-memory-only log (no persistence). Used in tests and
    /// when no store path is configured.
    pub fn new(max_turns: usize) -> Self {
        Self {
            turns: Vec::new(),
            max_turns,
            store_path: None,
        }
    }

    /// Load memory from `path`, starting empty if the file is missing or
    /// unreadable. Subsequent mutations persist back to the same path.
    pub async fn load(path: impl Into<PathBuf>, max_turns: usize) -> Self {
        let path = path.into();
        let mut turns = match tokio::fs::read_to_string(&path).await {
            Ok(data) => match serde_json::from_str::<MemoryDocument>(&data) {
                Ok(doc) => doc.messages,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "memory file unreadable, starting empty");
                    Vec::new()
                }
            },
            Err(_) => Vec::new(),
        };

        if turns.len() > max_turns {
            turns.drain(..turns.len() - max_turns);
        }

        tracing::info!(path = %path.display(), turns = turns.len(), "conversation memory loaded");

        Self {
            turns,
            max_turns,
            store_path: Some(path),
        }
    }

    /// Append a turn, evicting the oldest if over capacity, then persist.
    /// A failed write is logged and swallowed; the pipeline never fails on
    /// persistence.
    pub async fn append(&mut self, role: TurnRole, text: &str) -> Turn {
        let turn = Turn::new(role, text);
        self.turns.push(turn.clone());

        if self.turns.len() > self.max_turns {
            let excess = self.turns.len() - self.max_turns;
            self.turns.drain(..excess);
        }

        if let Err(e) = self.save().await {
            tracing::error!(error = %e, "memory save failed");
        }
        turn
    }

    /// Build the context window: the last `recent_count` turns plus
    /// aggregate counts. Never cached.
    pub fn context(&self, recent_count: usize) -> ContextWindow {
        let skip = self.turns.len().saturating_sub(recent_count);
        ContextWindow {
            recent: self.turns[skip..].to_vec(),
            total_turns: self.turns.len(),
            conversation_start: self.turns.first().map_or_else(now_epoch_ms, |t| t.timestamp),
        }
    }

    /// Full retained history, oldest first.
    pub fn history(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Drop all turns and persist the empty document.
    pub async fn clear(&mut self) {
        self.turns.clear();
        if let Err(e) = self.save().await {
            tracing::error!(error = %e, "memory save failed");
        }
    }

    /// Case-insensitive substring search over turn text.
    pub fn search(&self, query: &str) -> Vec<&Turn> {
        let query = query.to_lowercase();
        self.turns
            .iter()
            .filter(|t| t.text.to_lowercase().contains(&query))
            .collect()
    }

    /// Aggregate statistics over retained turns.
    pub fn stats(&self) -> MemoryStats {
        let user_turns = self
            .turns
            .iter()
            .filter(|t| t.role == TurnRole::User)
            .count();
        MemoryStats {
            total_turns: self.turns.len(),
            user_turns,
            assistant_turns: self.turns.len() - user_turns,
            oldest: self.turns.first().map(|t| t.timestamp),
            newest: self.turns.last().map(|t| t.timestamp),
        }
    }

    /// Write the current log to disk, replacing the file wholesale. A
    /// no-op for in-memory-only logs.
    pub async fn save(&self) -> anyhow::Result<()> {
        let Some(path) = &self.store_path else {
            return Ok(());
        };
        let doc = MemoryDocument {
            messages: self.turns.clone(),
            last_updated: Utc::now().to_rfc3339(),
        };
        write_document(path, &doc).await
    }
}

async fn write_document(path: &Path, doc: &MemoryDocument) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let data = serde_json::to_vec_pretty(doc)?;
    tokio::fs::write(path, data).await?;
    Ok(())
}

// ── Tests ────────────────────────────────────────────────────────
