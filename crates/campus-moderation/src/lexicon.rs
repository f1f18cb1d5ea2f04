//! Tiered keyword lexicon for content risk scoring.
//!
//! Tier placement decides the risk floor: any critical match outranks any
//! sentiment signal. Multi-word entries are matched as phrases, single
//! words on word boundaries.

/// Self-harm and threat indicators. Over-flagging here is deliberate:
/// false negatives are the expensive failure mode for this tier.
pub const CRITICAL: &[&str] = &[
    "kill yourself",
    "kill myself",
    "hurt myself",
    "hurt yourself",
    "cut myself",
    "want to die",
    "end it all",
    "suicide",
    "self harm",
    "gun",
    "knife",
    "bomb",
    "weapon",
];

/// Hostile, insulting, or violent language.
pub const HIGH: &[&str] = &[
    "hate you",
    "nobody likes you",
    "worthless",
    "kill",
    "murder",
    "beat up",
    "punch",
    "threat",
    "violence",
];

/// Mild-negative put-downs.
pub const MEDIUM: &[&str] = &[
    "stupid",
    "idiot",
    "loser",
    "ugly",
    "dumb",
    "freak",
    "weird",
    "shut up",
    "hate",
    "fight",
];

/// Words counted toward the negative-sentiment ratio.
pub const NEGATIVE_INDICATORS: &[&str] = &[
    "hate", "never", "terrible", "awful", "worst", "angry", "annoying", "unfair", "bad", "stupid",
    "dumb", "useless", "hopeless", "horrible",
];

/// Words counted toward positive sentiment.
pub const POSITIVE_INDICATORS: &[&str] = &[
    "thanks",
    "thank",
    "please",
    "great",
    "good",
    "awesome",
    "wonderful",
    "amazing",
    "excellent",
    "help",
    "appreciate",
    "learn",
    "understand",
];
