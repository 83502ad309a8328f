//! Card Control Audit - audit trail and domain events
//!
//! Every workflow outcome produces an audit record once its response is
//! determined. The in-memory log chains entries by hash so tampering with
//! any stored entry breaks verification. Publishing is best-effort from the
//! engine's point of view: sink failures are logged there and never change
//! what the caller sees.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use uuid::Uuid;

use cardctl_types::{CardControlError, DownstreamStatus, PersonaId, Result, TokenizedCardNumber};

pub mod events;

pub use events::*;

/// Hash the first entry chains from
pub const GENESIS_HASH: &str = "genesis";

/// Types of auditable actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    QueryControls,
    SetControls,
    RemoveControls,
    ListControls,
    BlockCard,
    UnblockCard,
}

/// How a workflow ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure { code: String, message: String },
}

impl AuditOutcome {
    /// Outcome of a workflow result
    pub fn of<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(err) => Self::Failure {
                code: err.error_code().to_string(),
                message: err.to_string(),
            },
        }
    }
}

/// What a workflow hands to the audit sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Action performed
    pub action: AuditAction,
    /// Persona that asked
    pub actor: PersonaId,
    /// Card acted on, absent for list calls
    pub card: Option<TokenizedCardNumber>,
    /// Result classification
    pub outcome: AuditOutcome,
    /// Serialized response, `Null` on failure
    pub response: serde_json::Value,
    /// Request-scoped extras (request id, requested types, ...)
    pub service_data: serde_json::Value,
}

/// An audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Entry ID
    pub id: Uuid,
    /// Previous entry hash (for chain)
    pub previous_hash: String,
    /// Entry hash
    pub hash: String,
    /// When recorded
    pub recorded_at: DateTime<Utc>,
    /// What was recorded
    pub record: AuditRecord,
}

impl AuditEntry {
    /// Seal `record` onto the chain after `previous_hash`
    pub fn seal(record: AuditRecord, previous_hash: impl Into<String>) -> Self {
        let mut entry = Self {
            id: Uuid::new_v4(),
            previous_hash: previous_hash.into(),
            hash: String::new(),
            recorded_at: Utc::now(),
            record,
        };
        entry.hash = entry.compute_hash();
        entry
    }

    /// Compute hash of this entry
    pub fn compute_hash(&self) -> String {
        let content = format!(
            "{}:{}:{}:{}:{}:{}",
            self.previous_hash,
            self.id,
            self.recorded_at.timestamp_micros(),
            self.record.actor,
            serde_json::to_string(&self.record.action).unwrap_or_default(),
            serde_json::to_string(&self.record.outcome).unwrap_or_default(),
        );
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hasher.update(self.record.response.to_string().as_bytes());
        hasher.update(self.record.service_data.to_string().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Verify the entry hash
    pub fn verify(&self) -> bool {
        self.hash == self.compute_hash()
    }
}

/// Destination for audit records
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    /// Record a workflow outcome
    async fn publish(&self, record: AuditRecord) -> Result<()>;
}

/// Append-only, hash-chained audit log held in memory
#[derive(Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
    fail_publishes: std::sync::atomic::AtomicBool,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail, as an unreachable sink would
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publishes
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Snapshot of every entry, oldest first
    pub async fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().await.clone()
    }

    /// Check every hash and every link
    pub async fn verify_chain(&self) -> bool {
        let entries = self.entries.read().await;
        let mut previous = GENESIS_HASH;
        for entry in entries.iter() {
            if entry.previous_hash != previous || !entry.verify() {
                return false;
            }
            previous = entry.hash.as_str();
        }
        true
    }
}

#[async_trait::async_trait]
impl AuditSink for InMemoryAuditLog {
    async fn publish(&self, record: AuditRecord) -> Result<()> {
        if self.fail_publishes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(CardControlError::downstream(
                "audit",
                DownstreamStatus::Unavailable,
                "audit sink unavailable",
            ));
        }
        let mut entries = self.entries.write().await;
        let previous = entries
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        entries.push(AuditEntry::seal(record, previous));
        Ok(())
    }
}
