use super::registry::{RelyingParty, RELYING_PARTIES};
use super::templates::{build_event_payload, SubjectContext};
use crate::core::config::RunConfig;
use crate::core::event::{EventType, SecurityEventToken, SetField};
use crate::core::probability::{weighted_choice, ChoiceError};
use chrono::{DateTime, Utc};
use rand::Rng;

/// Audience of every synthesized token, the inbound SSF receiver.
pub const AUDIENCE: &str = "https://inbound.ssf.account.gov.uk/";

const ID_CHARACTERS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const ID_RANDOM_CHARS: usize = 8;
const TOE_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;

/// Error while synthesizing a token.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SynthesisError {
    #[error("relying party selection failed: {0}")]
    RelyingParty(ChoiceError),
    #[error("event type selection failed: {0}")]
    EventType(ChoiceError),
    #[error("corruption draw failed: {0}")]
    Corruption(ChoiceError),
}

/// Builds one synthetic SET from the run config.
///
/// The relying party and event type follow `rp_split` and
/// `event_type_split`; the user within the party is uniform. With
/// probability `error_rate` one top-level claim is removed.
pub fn synthesize(
    config: &RunConfig,
    rng: &mut impl Rng,
    now: DateTime<Utc>,
) -> Result<SecurityEventToken, SynthesisError> {
    let party: &RelyingParty = weighted_choice(&RELYING_PARTIES, &config.rp_split, rng)
        .map_err(SynthesisError::RelyingParty)?;
    let sub = party.pairwise_ids[rng.gen_range(0..party.pairwise_ids.len())];

    let now_ms = now.timestamp_millis();
    let jti = unique_id(rng, now_ms);
    let txn = unique_id(rng, now_ms);
    let toe = now_ms - rng.gen_range(0..TOE_WINDOW_MS);

    let event_type = *weighted_choice(&EventType::ALL, &config.event_type_split, rng)
        .map_err(SynthesisError::EventType)?;
    let ctx = SubjectContext {
        iss: party.issuer,
        sub,
        toe,
    };
    let events = build_event_payload(event_type, &ctx, rng);

    let token = SecurityEventToken {
        iss: Some(party.issuer.to_string()),
        jti: Some(jti),
        iat: Some(now_ms),
        aud: Some(AUDIENCE.to_string()),
        sub: Some(sub.to_string()),
        txn: Some(txn),
        toe: Some(toe),
        events: Some(events),
    };

    corrupt(token, config.error_rate, rng)
}

/// Identifier made from the epoch-millisecond string with random letters
/// spliced in. Two ids minted in the same millisecond can collide, though
/// with 52^8 letter combinations it is unlikely.
pub fn unique_id(rng: &mut impl Rng, now_ms: i64) -> String {
    let mut id = now_ms.to_string();
    for _ in 0..ID_RANDOM_CHARS {
        let position = rng.gen_range(0..id.len());
        let letter = ID_CHARACTERS[rng.gen_range(0..ID_CHARACTERS.len())] as char;
        id.insert(position, letter);
    }
    id
}

fn corrupt(
    token: SecurityEventToken,
    error_rate: f64,
    rng: &mut impl Rng,
) -> Result<SecurityEventToken, SynthesisError> {
    let should_corrupt = *weighted_choice(&[true, false], &[error_rate, 1.0 - error_rate], rng)
        .map_err(SynthesisError::Corruption)?;
    if !should_corrupt {
        return Ok(token);
    }
    let field = SetField::ALL[rng.gen_range(0..SetField::ALL.len())];
    Ok(token.without(field))
}
