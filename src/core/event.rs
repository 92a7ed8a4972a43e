use serde::{Deserialize, Serialize};
use serde_json::Value;

const EVENT_URI_PREFIX: &str = "https://schemas.openid.net/secevent/risc/event-type/";

/// Kind of security event carried by a SET.
///
/// Variant order is the order used by `eventTypeSplit` distributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventType {
    AccountPurged,
    AccountCredentialChangeRequired,
    AccountDisabled,
    AccountEnabled,
    CredentialCompromise,
    OptIn,
    OptOutInitiated,
    OptOutCancelled,
    OptOutEffective,
    RecoveryActivated,
    RecoveryInformationChanged,
    SessionsRevoked,
}

impl EventType {
    pub const ALL: [EventType; 12] = [
        EventType::AccountPurged,
        EventType::AccountCredentialChangeRequired,
        EventType::AccountDisabled,
        EventType::AccountEnabled,
        EventType::CredentialCompromise,
        EventType::OptIn,
        EventType::OptOutInitiated,
        EventType::OptOutCancelled,
        EventType::OptOutEffective,
        EventType::RecoveryActivated,
        EventType::RecoveryInformationChanged,
        EventType::SessionsRevoked,
    ];

    /// Name used as the key in `eventTypeSplit` overrides.
    pub fn key(self) -> &'static str {
        match self {
            EventType::AccountPurged => "accountPurged",
            EventType::AccountCredentialChangeRequired => "accountCredentialChangeRequired",
            EventType::AccountDisabled => "accountDisabled",
            EventType::AccountEnabled => "accountEnabled",
            EventType::CredentialCompromise => "credentialCompromise",
            EventType::OptIn => "optIn",
            EventType::OptOutInitiated => "optOutInitiated",
            EventType::OptOutCancelled => "optOutCancelled",
            EventType::OptOutEffective => "optOutEffective",
            EventType::RecoveryActivated => "recoveryActivated",
            EventType::RecoveryInformationChanged => "recoveryInformationChanged",
            EventType::SessionsRevoked => "sessionsRevoked",
        }
    }

    /// Canonical event-type URI used as the key inside `events`.
    pub fn uri(self) -> String {
        let suffix = match self {
            EventType::AccountPurged => "account-purged",
            EventType::AccountCredentialChangeRequired => "account-credential-change-required",
            EventType::AccountDisabled => "account-disabled",
            EventType::AccountEnabled => "account-enabled",
            EventType::CredentialCompromise => "credential-compromise",
            // Receivers register opt-in under the identifier-changed URI.
            EventType::OptIn => "identifier-changed",
            EventType::OptOutInitiated => "opt-out-initiated",
            EventType::OptOutCancelled => "opt-out-cancelled",
            EventType::OptOutEffective => "opt-out-effective",
            EventType::RecoveryActivated => "recovery-activated",
            EventType::RecoveryInformationChanged => "recovery-information-changed",
            EventType::SessionsRevoked => "sessions-revoked",
        };
        format!("{EVENT_URI_PREFIX}{suffix}")
    }
}

/// A synthesized Security Event Token.
///
/// Every claim is optional so a corrupted token can drop one of them; absent
/// claims are left out of the serialized JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEventToken {
    /// Issuer, the relying party of origin.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Unique token identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
    /// Issued-at time in epoch milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Audience, the inbound SSF receiver.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    /// Pairwise subject identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Transaction identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub txn: Option<String>,
    /// Time of event in epoch milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toe: Option<i64>,
    /// Event payloads keyed by event-type URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<Value>,
}

/// Top-level claim of a [`SecurityEventToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetField {
    Iss,
    Jti,
    Iat,
    Aud,
    Sub,
    Txn,
    Toe,
    Events,
}

impl SetField {
    pub const ALL: [SetField; 8] = [
        SetField::Iss,
        SetField::Jti,
        SetField::Iat,
        SetField::Aud,
        SetField::Sub,
        SetField::Txn,
        SetField::Toe,
        SetField::Events,
    ];
}

impl SecurityEventToken {
    /// Returns the token with `field` removed.
    pub fn without(mut self, field: SetField) -> Self {
        match field {
            SetField::Iss => self.iss = None,
            SetField::Jti => self.jti = None,
            SetField::Iat => self.iat = None,
            SetField::Aud => self.aud = None,
            SetField::Sub => self.sub = None,
            SetField::Txn => self.txn = None,
            SetField::Toe => self.toe = None,
            SetField::Events => self.events = None,
        }
        self
    }

    /// Claims that are currently absent.
    pub fn missing_fields(&self) -> Vec<SetField> {
        SetField::ALL
            .into_iter()
            .filter(|field| match field {
                SetField::Iss => self.iss.is_none(),
                SetField::Jti => self.jti.is_none(),
                SetField::Iat => self.iat.is_none(),
                SetField::Aud => self.aud.is_none(),
                SetField::Sub => self.sub.is_none(),
                SetField::Txn => self.txn.is_none(),
                SetField::Toe => self.toe.is_none(),
                SetField::Events => self.events.is_none(),
            })
            .collect()
    }
}

/// Message body placed on the transmitter queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedSet {
    #[serde(rename = "SET")]
    pub set: SecurityEventToken,
    /// Inbound endpoint the token should be delivered to.
    pub destination: String,
}

/// A message as stored by a queue and later handed to the transmitter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedRecord {
    pub message_id: String,
    /// Serialized [`QueuedSet`], possibly malformed.
    pub body: String,
}
