//! Mock relying parties that originate synthetic SETs.

/// A relying party and the pairwise identifiers of its test users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelyingParty {
    /// Public key URL, written into `iss` and the event subject.
    pub issuer: &'static str,
    /// Pairwise subject identifiers, one per user.
    pub pairwise_ids: &'static [&'static str],
}

/// Every relying party, in `rpSplit` order.
pub static RELYING_PARTIES: [RelyingParty; 3] = [
    RelyingParty {
        issuer: "https://MockRP1.account.gov.uk/publicKey/",
        pairwise_ids: &["RP1USER1", "RP1USER2", "RP1USER3"],
    },
    RelyingParty {
        issuer: "https://MockRP2.account.gov.uk/publicKey/",
        pairwise_ids: &["RP2USER1", "RP2USER2", "RP2USER3"],
    },
    RelyingParty {
        issuer: "https://MockRP3.account.gov.uk/publicKey/",
        pairwise_ids: &["RP3USER1", "RP3USER2", "RP3USER3"],
    },
];
