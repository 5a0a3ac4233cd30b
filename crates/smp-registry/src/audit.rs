//! # Audit Trail: immutable hash chain
//!
//! Every registry mutation and every remote-sync outcome appends an
//! [`AuditEntry`]. Each entry carries a SHA-256 hash chaining to the previous
//! entry, forming a tamper-evident log:
//!
//! ```text
//! entry_hash = SHA-256(previous_hash | seq | action | target | outcome)
//! ```
//!
//! The first entry chains to a zero hash.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::store::{Record, Storage, Store};

/// Previous hash of the first entry.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

// ---------------------------------------------------------------------------
// AuditAction
// ---------------------------------------------------------------------------

/// What was done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditAction {
    /// A service group was created.
    #[serde(rename = "service-group.create")]
    ServiceGroupCreate,
    /// Owner or extension of a service group changed.
    #[serde(rename = "service-group.update")]
    ServiceGroupUpdate,
    /// A service group and its children were deleted.
    #[serde(rename = "service-group.delete")]
    ServiceGroupDelete,
    /// A service information was merged.
    #[serde(rename = "service-information.merge")]
    ServiceInformationMerge,
    /// An endpoint was deleted.
    #[serde(rename = "endpoint.delete")]
    EndpointDelete,
    /// An empty process was deleted.
    #[serde(rename = "process.delete")]
    ProcessDelete,
    /// An empty service information was deleted.
    #[serde(rename = "document-type.delete")]
    DocumentTypeDelete,
    /// A redirect was created.
    #[serde(rename = "redirect.create")]
    RedirectCreate,
    /// A redirect was edited.
    #[serde(rename = "redirect.update")]
    RedirectUpdate,
    /// A redirect was deleted.
    #[serde(rename = "redirect.delete")]
    RedirectDelete,
    /// A business card was created or replaced.
    #[serde(rename = "business-card.save")]
    BusinessCardSave,
    /// A business card was deleted.
    #[serde(rename = "business-card.delete")]
    BusinessCardDelete,
    /// A business card was manually published to the Directory.
    #[serde(rename = "business-card.publish")]
    BusinessCardPublish,
    /// Automatic Directory push of a business card.
    #[serde(rename = "directory.add")]
    DirectoryAdd,
    /// Automatic Directory retraction of a business card.
    #[serde(rename = "directory.delete")]
    DirectoryDelete,
    /// SMP registration at the SML.
    #[serde(rename = "smp-sml-create")]
    SmpSmlCreate,
    /// SMP address update at the SML.
    #[serde(rename = "smp-sml-update")]
    SmpSmlUpdate,
    /// SMP removal from the SML.
    #[serde(rename = "smp-sml-delete")]
    SmpSmlDelete,
    /// Participant registration at the SML.
    #[serde(rename = "sml-participant-create")]
    SmlParticipantCreate,
    /// Participant removal from the SML.
    #[serde(rename = "sml-participant-delete")]
    SmlParticipantDelete,
    /// Bulk certificate replacement.
    #[serde(rename = "bulk.change-certificate")]
    BulkChangeCertificate,
    /// Bulk endpoint URL replacement.
    #[serde(rename = "bulk.change-url")]
    BulkChangeUrl,
    /// Global settings changed.
    #[serde(rename = "settings.update")]
    SettingsUpdate,
    /// SML configuration created.
    #[serde(rename = "sml-info.create")]
    SmlInfoCreate,
    /// SML configuration edited.
    #[serde(rename = "sml-info.update")]
    SmlInfoUpdate,
    /// SML configuration deleted.
    #[serde(rename = "sml-info.delete")]
    SmlInfoDelete,
    /// Transport profile created.
    #[serde(rename = "transport-profile.create")]
    TransportProfileCreate,
    /// Transport profile edited.
    #[serde(rename = "transport-profile.update")]
    TransportProfileUpdate,
    /// Transport profile deleted.
    #[serde(rename = "transport-profile.delete")]
    TransportProfileDelete,
    /// Exchange file imported.
    #[serde(rename = "import")]
    Import,
    /// Migration key announced at the SML for a participant leaving.
    #[serde(rename = "sml-participant-prepare-migration")]
    SmlParticipantPrepareMigration,
    /// Participant moved to this SMP at the SML.
    #[serde(rename = "sml-participant-migrate")]
    SmlParticipantMigrate,
    /// Outbound participant migration started.
    #[serde(rename = "participant-migration.outbound-start")]
    MigrationOutboundStart,
    /// Outbound participant migration cancelled.
    #[serde(rename = "participant-migration.outbound-cancel")]
    MigrationOutboundCancel,
    /// Outbound participant migration finalized.
    #[serde(rename = "participant-migration.outbound-finalize")]
    MigrationOutboundFinalize,
    /// Inbound participant migration performed.
    #[serde(rename = "participant-migration.inbound")]
    MigrationInbound,
    /// Participant migration record deleted.
    #[serde(rename = "participant-migration.delete")]
    MigrationDelete,
}

impl AuditAction {
    /// Stable string form, identical to the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServiceGroupCreate => "service-group.create",
            Self::ServiceGroupUpdate => "service-group.update",
            Self::ServiceGroupDelete => "service-group.delete",
            Self::ServiceInformationMerge => "service-information.merge",
            Self::EndpointDelete => "endpoint.delete",
            Self::ProcessDelete => "process.delete",
            Self::DocumentTypeDelete => "document-type.delete",
            Self::RedirectCreate => "redirect.create",
            Self::RedirectUpdate => "redirect.update",
            Self::RedirectDelete => "redirect.delete",
            Self::BusinessCardSave => "business-card.save",
            Self::BusinessCardDelete => "business-card.delete",
            Self::BusinessCardPublish => "business-card.publish",
            Self::DirectoryAdd => "directory.add",
            Self::DirectoryDelete => "directory.delete",
            Self::SmpSmlCreate => "smp-sml-create",
            Self::SmpSmlUpdate => "smp-sml-update",
            Self::SmpSmlDelete => "smp-sml-delete",
            Self::SmlParticipantCreate => "sml-participant-create",
            Self::SmlParticipantDelete => "sml-participant-delete",
            Self::BulkChangeCertificate => "bulk.change-certificate",
            Self::BulkChangeUrl => "bulk.change-url",
            Self::SettingsUpdate => "settings.update",
            Self::SmlInfoCreate => "sml-info.create",
            Self::SmlInfoUpdate => "sml-info.update",
            Self::SmlInfoDelete => "sml-info.delete",
            Self::TransportProfileCreate => "transport-profile.create",
            Self::TransportProfileUpdate => "transport-profile.update",
            Self::TransportProfileDelete => "transport-profile.delete",
            Self::Import => "import",
            Self::SmlParticipantPrepareMigration => "sml-participant-prepare-migration",
            Self::SmlParticipantMigrate => "sml-participant-migrate",
            Self::MigrationOutboundStart => "participant-migration.outbound-start",
            Self::MigrationOutboundCancel => "participant-migration.outbound-cancel",
            Self::MigrationOutboundFinalize => "participant-migration.outbound-finalize",
            Self::MigrationInbound => "participant-migration.inbound",
            Self::MigrationDelete => "participant-migration.delete",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the audited action succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    /// The action took effect.
    Success,
    /// The action failed.
    Failure,
}

impl AuditOutcome {
    /// Return the string value for serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

// ---------------------------------------------------------------------------
// AuditEntry
// ---------------------------------------------------------------------------

/// One immutable audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the chain, starting at 1.
    pub seq: u64,
    /// When the entry was appended.
    pub timestamp: DateTime<Utc>,
    /// User or system component that acted.
    pub actor: String,
    /// What was done.
    pub action: AuditAction,
    /// Participant, SMP ID or record key the action applies to.
    pub target: String,
    /// Success or failure.
    pub outcome: AuditOutcome,
    /// Addresses, URLs, error kind and message.
    pub details: serde_json::Value,
    /// Hash of the preceding entry.
    pub previous_hash: String,
    /// Hash of this entry.
    pub entry_hash: String,
}

impl Record for AuditEntry {
    type Key = u64;

    fn key(&self) -> u64 {
        self.seq
    }
}

impl AuditEntry {
    fn compute_hash(
        previous_hash: &str,
        seq: u64,
        action: AuditAction,
        target: &str,
        outcome: AuditOutcome,
    ) -> String {
        let input = format!(
            "{previous_hash}|{seq}|{}|{target}|{}",
            action.as_str(),
            outcome.as_str()
        );
        sha256_hex(&input)
    }

    /// Recompute the hash from the entry's own fields.
    pub fn recompute_hash(&self) -> String {
        Self::compute_hash(
            &self.previous_hash,
            self.seq,
            self.action,
            &self.target,
            self.outcome,
        )
    }
}

/// An entry to append.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Acting user or component.
    pub actor: String,
    /// What was done.
    pub action: AuditAction,
    /// What it was done to.
    pub target: String,
    /// Success or failure.
    pub outcome: AuditOutcome,
    /// Free-form detail.
    pub details: serde_json::Value,
}

impl AuditEvent {
    /// Successful event without details.
    pub fn success(actor: &str, action: AuditAction, target: impl Into<String>) -> Self {
        Self {
            actor: actor.to_string(),
            action,
            target: target.into(),
            outcome: AuditOutcome::Success,
            details: serde_json::Value::Null,
        }
    }

    /// Failed event without details.
    pub fn failure(actor: &str, action: AuditAction, target: impl Into<String>) -> Self {
        Self {
            outcome: AuditOutcome::Failure,
            ..Self::success(actor, action, target)
        }
    }

    /// Attach details.
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Result of chain integrity verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainIntegrity {
    /// Number of entries checked.
    pub total: usize,
    /// Entries whose link or hash does not match.
    pub broken_links: usize,
    /// `broken_links == 0`.
    pub valid: bool,
}

// ---------------------------------------------------------------------------
// AuditTrail
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct Head {
    next_seq: u64,
    last_hash: String,
}

/// Append-only, hash-chained audit log.
#[derive(Debug, Clone)]
pub struct AuditTrail {
    store: Store<AuditEntry>,
    head: Arc<Mutex<Head>>,
}

impl AuditTrail {
    /// Open the trail from `storage`, continuing any existing chain.
    pub fn open(storage: &dyn Storage) -> Result<Self, StoreError> {
        Ok(Self::over(Store::open(storage, "audit")?))
    }

    /// Empty in-memory trail.
    pub fn in_memory() -> Self {
        Self::over(Store::in_memory("audit"))
    }

    fn over(store: Store<AuditEntry>) -> Self {
        let head = match store.list().last() {
            Some(last) => Head {
                next_seq: last.seq + 1,
                last_hash: last.entry_hash.clone(),
            },
            None => Head {
                next_seq: 1,
                last_hash: GENESIS_HASH.to_string(),
            },
        };
        Self {
            store,
            head: Arc::new(Mutex::new(head)),
        }
    }

    /// Append an event, returning the stored entry.
    pub fn record(&self, event: AuditEvent) -> Result<AuditEntry, StoreError> {
        let mut head = self.head.lock();
        let seq = head.next_seq;
        let entry_hash =
            AuditEntry::compute_hash(&head.last_hash, seq, event.action, &event.target, event.outcome);
        let entry = AuditEntry {
            seq,
            timestamp: Utc::now(),
            actor: event.actor,
            action: event.action,
            target: event.target,
            outcome: event.outcome,
            details: event.details,
            previous_hash: head.last_hash.clone(),
            entry_hash,
        };
        self.store.insert(entry.clone())?;
        head.next_seq = seq + 1;
        head.last_hash = entry.entry_hash.clone();
        Ok(entry)
    }

    /// Append an event; a persistence failure is logged, not returned.
    ///
    /// Used after the audited mutation already happened, where failing the
    /// caller would misreport the mutation itself.
    pub fn record_or_log(&self, event: AuditEvent) {
        let action = event.action;
        let target = event.target.clone();
        if let Err(e) = self.record(event) {
            tracing::error!(%action, %target, error = %e, "failed to append audit entry");
        }
    }

    /// All entries in sequence order.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.store.list()
    }

    /// Entries for one target, in sequence order.
    pub fn entries_for_target(&self, target: &str) -> Vec<AuditEntry> {
        self.store.values_where(|e| e.target == target)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the trail is empty.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Check every link and hash in the chain.
    pub fn verify_chain(&self) -> ChainIntegrity {
        verify_entries(&self.store.list())
    }
}

/// Verify a sequence of entries ordered by `seq`.
pub fn verify_entries(entries: &[AuditEntry]) -> ChainIntegrity {
    let mut expected_previous = GENESIS_HASH.to_string();
    let mut broken_links = 0;
    for entry in entries {
        if entry.previous_hash != expected_previous || entry.entry_hash != entry.recompute_hash() {
            broken_links += 1;
        }
        expected_previous = entry.entry_hash.clone();
    }
    ChainIntegrity {
        total: entries.len(),
        broken_links,
        valid: broken_links == 0,
    }
}

fn sha256_hex(input: &str) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(input.as_bytes()))
}
