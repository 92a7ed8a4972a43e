use crate::core::event::EventType;
use rand::Rng;
use serde_json::{json, Map, Value};

/// Credential kinds reported by credential-compromise events.
pub const CREDENTIAL_TYPES: [&str; 10] = [
    "password",
    "pin",
    "x509",
    "fido2-platform",
    "fido2-roaming",
    "fido-u2f",
    "verifiable-credential",
    "phone-voice",
    "phone-sms",
    "app",
];

/// Subject and timing fields shared by every event payload.
#[derive(Debug, Clone)]
pub struct SubjectContext<'a> {
    pub iss: &'a str,
    pub sub: &'a str,
    /// Time of event in epoch milliseconds.
    pub toe: i64,
}

/// Builds the `events` claim for one event type.
pub fn build_event_payload(
    event_type: EventType,
    ctx: &SubjectContext<'_>,
    rng: &mut impl Rng,
) -> Value {
    let body = match event_type {
        EventType::AccountDisabled => account_disabled(ctx),
        EventType::CredentialCompromise => credential_compromise(ctx, rng),
        EventType::AccountPurged
        | EventType::AccountCredentialChangeRequired
        | EventType::AccountEnabled
        | EventType::OptIn
        | EventType::OptOutInitiated
        | EventType::OptOutCancelled
        | EventType::OptOutEffective
        | EventType::RecoveryActivated
        | EventType::RecoveryInformationChanged
        | EventType::SessionsRevoked => subject_only(ctx),
    };

    let mut events = Map::new();
    events.insert(event_type.uri(), body);
    Value::Object(events)
}

fn subject(ctx: &SubjectContext<'_>) -> Value {
    json!({
        "subject_type": "iss_sub",
        "iss": ctx.iss,
        "sub": ctx.sub,
    })
}

fn subject_only(ctx: &SubjectContext<'_>) -> Value {
    json!({ "subject": subject(ctx) })
}

fn account_disabled(ctx: &SubjectContext<'_>) -> Value {
    json!({
        "subject": subject(ctx),
        "reason": "Insert reason here",
    })
}

fn credential_compromise(ctx: &SubjectContext<'_>, rng: &mut impl Rng) -> Value {
    let credential_type = CREDENTIAL_TYPES[rng.gen_range(0..CREDENTIAL_TYPES.len())];
    json!({
        "subject": subject(ctx),
        "credential_type": credential_type,
        "event_timestamp": ctx.toe,
        "reason_admin": "Admin reason",
        "reason_user": "User reason",
    })
}
