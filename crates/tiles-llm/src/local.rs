//! Offline rule-based classifier.
//!
//! Scans the lowercased title and snippet for keyword patterns. Patterns are
//! checked in priority order; the first match wins. With no match, the
//! duration decides: long videos read as explainers, very short ones as
//! entertainment, everything else as `Custom`.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tiles_types::config::ProviderSettings;
use tiles_types::{ClassificationResult, Descriptor, Label};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::provider::Provider;

/// Durations at or above this many seconds fall back to explainers.
const LONG_FORM_SECS: u64 = 900;
/// Durations at or below this many seconds fall back to entertainment.
const SHORT_FORM_SECS: u64 = 60;

/// A keyword pattern entry: an alternation and the label it maps to.
struct KeywordPattern {
    pattern: &'static str,
    label: Label,
    confidence: f64,
}

/// Checked in priority order (first match wins). Every alternation starts at
/// a word boundary; tokens of two or three letters are closed on both sides.
///
/// The anchors make matching narrower than plain substring search. A keyword
/// glued to a prefix does not count: "mysql" misses `sql`, "mlops" misses
/// `ml`, "nodejs" still hits `node` since only the start is anchored.
const PATTERNS: &[KeywordPattern] = &[
    KeywordPattern {
        pattern: r"\b(?:pomodoro|lecture|exam|syllabus|semester|assignment|course(?:work)?)",
        label: Label::AcademicStudy,
        confidence: 0.8,
    },
    KeywordPattern {
        pattern: r"\b(?:interview|resume|cv\b|ats\b|mock|case\s*study|guesstimate|pm interview|system design|career)",
        label: Label::CareerPrep,
        confidence: 0.8,
    },
    KeywordPattern {
        pattern: r"\b(?:python|javascript|typescript|react|node|sql|leetcode|dsa\b|ml\b|ai\b|prompt|product management|walkthrough|tutorial)",
        label: Label::SkillLearning,
        confidence: 0.8,
    },
    KeywordPattern {
        pattern: r"\b(?:news|breaking|headlines|budget|election|geopolitics|markets?|finance)",
        label: Label::NewsCurrentAffairs,
        confidence: 0.75,
    },
    KeywordPattern {
        pattern: r"\b(?:explained|explainer|documentary|how\s*it\s*works|inside|history of)",
        label: Label::ExplainersDocs,
        confidence: 0.75,
    },
    KeywordPattern {
        pattern: r"\b(?:review|unboxing|vs\b|comparison|analysis|deep dive)",
        label: Label::ReviewsAnalysis,
        confidence: 0.75,
    },
    KeywordPattern {
        pattern: r"\b(?:meme|gaming|funny|comedy|vlog|shorts|music|song|prank)",
        label: Label::Entertainment,
        confidence: 0.75,
    },
    KeywordPattern {
        pattern: r"\b(?:motivation(?:al)?|slay|routine|discipline|productivity|habits?|mindset|wellness|fitness|gym|study with me)",
        label: Label::MotivationSelf,
        confidence: 0.72,
    },
];

static RULES: LazyLock<Vec<(Regex, Label, f64)>> = LazyLock::new(|| {
    PATTERNS
        .iter()
        .map(|p| (Regex::new(p.pattern).unwrap(), p.label, p.confidence))
        .collect()
});

/// Deterministic keyword classifier. Pure, no I/O.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalClassifier;

impl LocalClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Label and confidence for one descriptor.
    pub fn classify_one(&self, descriptor: &Descriptor) -> (Label, f64) {
        let text = format!(
            "{} {}",
            descriptor.title,
            descriptor.snippet.as_deref().unwrap_or_default()
        )
        .to_lowercase();

        if let Some((_, label, confidence)) = RULES.iter().find(|(re, _, _)| re.is_match(&text)) {
            return (*label, *confidence);
        }

        match descriptor.duration_sec {
            d if d >= LONG_FORM_SECS => (Label::ExplainersDocs, 0.6),
            d if d <= SHORT_FORM_SECS => (Label::Entertainment, 0.6),
            _ => (Label::Custom, 0.55),
        }
    }

    /// One result per descriptor, indexed by position.
    pub fn classify_batch(&self, batch: &[Descriptor]) -> Vec<ClassificationResult> {
        batch
            .iter()
            .enumerate()
            .map(|(index, d)| {
                let (label, confidence) = self.classify_one(d);
                ClassificationResult::new(index, label, confidence)
            })
            .collect()
    }
}

#[async_trait]
impl Provider for LocalClassifier {
    fn name(&self) -> &str {
        "local"
    }

    async fn classify(
        &self,
        _settings: &ProviderSettings,
        batch: &[Descriptor],
        _cancel: &CancellationToken,
    ) -> Result<Vec<ClassificationResult>> {
        Ok(self.classify_batch(batch))
    }
}
