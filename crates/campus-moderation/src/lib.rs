//! Deterministic content-risk classification for outgoing messages.
//!
//! `analyze_content` is pure and CPU-cheap: the composer calls it on every
//! keystroke debounce for live feedback, and the send path calls it once
//! more to decide whether a stored message starts out flagged. It never
//! errors; inputs it cannot score degrade to a neutral low-confidence
//! verdict so analysis can never block the send path.

pub mod lexicon;

use serde::{Deserialize, Serialize};

/// Total order: low < medium < high < critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentAnalysisResult {
    pub risk_level: RiskLevel,
    pub sentiment: Sentiment,
    pub suggestions: Vec<String>,
    pub flagged_keywords: Vec<String>,
    pub confidence_score: f32,
}

impl ContentAnalysisResult {
    /// Neutral verdict for input we cannot score (empty/whitespace).
    fn neutral() -> Self {
        Self {
            risk_level: RiskLevel::Low,
            sentiment: Sentiment::Neutral,
            suggestions: Vec::new(),
            flagged_keywords: Vec::new(),
            confidence_score: 0.0,
        }
    }
}

// Per-match confidence weights by tier.
const WEIGHT_CRITICAL: f32 = 0.5;
const WEIGHT_HIGH: f32 = 0.35;
const WEIGHT_MEDIUM: f32 = 0.2;

/// Negative-word ratio at which sentiment alone lifts risk to medium.
/// Sentiment-only signals never exceed medium; a matched keyword always wins.
const NEGATIVE_RATIO_FLOOR: f32 = 0.3;

/// Analyze a message for safety and tone. Same input always yields the
/// same output.
pub fn analyze_content(content: &str) -> ContentAnalysisResult {
    let normalized = content.to_lowercase();
    let words: Vec<&str> = normalized
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| !w.is_empty())
        .collect();

    if words.is_empty() {
        return ContentAnalysisResult::neutral();
    }

    let mut flagged_keywords: Vec<String> = Vec::new();
    let mut highest_tier: Option<RiskLevel> = None;
    let mut confidence = 0.0f32;

    let tiers: [(&[&str], RiskLevel, f32); 3] = [
        (lexicon::CRITICAL, RiskLevel::Critical, WEIGHT_CRITICAL),
        (lexicon::HIGH, RiskLevel::High, WEIGHT_HIGH),
        (lexicon::MEDIUM, RiskLevel::Medium, WEIGHT_MEDIUM),
    ];

    for (terms, tier, weight) in tiers {
        for term in terms {
            let matched = if term.contains(' ') {
                normalized.contains(term)
            } else {
                words.contains(term)
            };
            if matched && !flagged_keywords.iter().any(|k| k == term) {
                flagged_keywords.push((*term).to_string());
                confidence += weight;
                if highest_tier.is_none_or(|t| tier > t) {
                    highest_tier = Some(tier);
                }
            }
        }
    }

    let negative_hits = words
        .iter()
        .filter(|w| lexicon::NEGATIVE_INDICATORS.contains(w))
        .count();
    let positive_hits = words
        .iter()
        .filter(|w| lexicon::POSITIVE_INDICATORS.contains(w))
        .count();
    let negative_ratio = negative_hits as f32 / words.len() as f32;

    let risk_level = match highest_tier {
        // Highest matched tier wins over any sentiment signal.
        Some(tier) => tier,
        // Pure negative sentiment caps at medium.
        None if negative_ratio >= NEGATIVE_RATIO_FLOOR => RiskLevel::Medium,
        None => RiskLevel::Low,
    };

    let sentiment = if negative_hits + flagged_keywords.len() > positive_hits {
        Sentiment::Negative
    } else if positive_hits > negative_hits {
        Sentiment::Positive
    } else {
        Sentiment::Neutral
    };

    // Corroborating signals raise confidence: keyword matches carry tier
    // weight, sentiment adds a smaller term. Clean text scores a modest
    // baseline so the result is never presented as certain.
    confidence += 0.1 * negative_ratio.min(1.0);
    if flagged_keywords.is_empty() {
        confidence += 0.2 + 0.05 * (positive_hits.min(4) as f32);
    }
    let confidence_score = confidence.clamp(0.0, 1.0);

    let suggestions = suggestions_for(risk_level, &flagged_keywords, negative_ratio);

    ContentAnalysisResult {
        risk_level,
        sentiment,
        suggestions,
        flagged_keywords,
        confidence_score,
    }
}

/// Deterministic rephrasing hints tied to the matched tier.
fn suggestions_for(risk: RiskLevel, flagged: &[String], negative_ratio: f32) -> Vec<String> {
    let mut suggestions = Vec::new();

    match risk {
        RiskLevel::Low => {
            if negative_ratio > 0.0 {
                suggestions.push("Consider softening the negative wording".to_string());
            }
        }
        RiskLevel::Medium => {
            suggestions.push("Consider using more positive language".to_string());
            suggestions
                .push("Try expressing your feelings in a constructive way".to_string());
        }
        RiskLevel::High => {
            suggestions.push(
                "Take a moment to think about how your message might make others feel"
                    .to_string(),
            );
            suggestions.push("This wording may be hurtful; consider rephrasing".to_string());
        }
        RiskLevel::Critical => {
            suggestions
                .push("This message appears to violate the community safety policy".to_string());
            suggestions.push(
                "If you're having thoughts of self-harm, please talk to a counselor or trusted adult immediately"
                    .to_string(),
            );
        }
    }

    if !flagged.is_empty() && risk < RiskLevel::Critical {
        suggestions.push("Rephrase or remove the highlighted words before sending".to_string());
    }

    suggestions
}
