//! The closed label set.
//!
//! Every classification produced by the engine carries exactly one of these
//! nine labels. Providers see them as their display strings (the enum in the
//! response schema). A provider reply that names a label outside the set
//! fails validation as a whole, and every item in that batch falls back to
//! [`Label::Custom`] with zero confidence.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A classification label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Label {
    #[serde(rename = "Learning - Academic Study")]
    AcademicStudy,
    #[serde(rename = "Learning - Career Prep")]
    CareerPrep,
    #[serde(rename = "Learning - Skill Learning")]
    SkillLearning,
    #[serde(rename = "Learning - News & Current Affairs")]
    NewsCurrentAffairs,
    #[serde(rename = "Learning - Explainers & Docs")]
    ExplainersDocs,
    #[serde(rename = "Learning - Reviews & Analysis")]
    ReviewsAnalysis,
    #[serde(rename = "Entertainment")]
    Entertainment,
    #[serde(rename = "Motivation & Self")]
    MotivationSelf,
    /// Catch-all for anything that does not fit, and for fallback results.
    #[serde(rename = "Custom")]
    Custom,
}

impl Label {
    /// All labels, in the order they are presented to providers.
    pub const ALL: [Label; 9] = [
        Label::AcademicStudy,
        Label::CareerPrep,
        Label::SkillLearning,
        Label::NewsCurrentAffairs,
        Label::ExplainersDocs,
        Label::ReviewsAnalysis,
        Label::Entertainment,
        Label::MotivationSelf,
        Label::Custom,
    ];

    /// The wire string for this label.
    pub fn as_str(self) -> &'static str {
        match self {
            Label::AcademicStudy => "Learning - Academic Study",
            Label::CareerPrep => "Learning - Career Prep",
            Label::SkillLearning => "Learning - Skill Learning",
            Label::NewsCurrentAffairs => "Learning - News & Current Affairs",
            Label::ExplainersDocs => "Learning - Explainers & Docs",
            Label::ReviewsAnalysis => "Learning - Reviews & Analysis",
            Label::Entertainment => "Entertainment",
            Label::MotivationSelf => "Motivation & Self",
            Label::Custom => "Custom",
        }
    }

    /// Look up a label by its exact wire string.
    pub fn parse(s: &str) -> Option<Label> {
        Label::ALL.into_iter().find(|l| l.as_str() == s)
    }

    /// Wire strings of every label, for embedding in prompts and schemas.
    pub fn wire_names() -> Vec<&'static str> {
        Label::ALL.iter().map(|l| l.as_str()).collect()
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not one of the nine labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownLabel(pub String);

impl fmt::Display for UnknownLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown label: {}", self.0)
    }
}

impl std::error::Error for UnknownLabel {}

impl FromStr for Label {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Label::parse(s).ok_or_else(|| UnknownLabel(s.to_string()))
    }
}
