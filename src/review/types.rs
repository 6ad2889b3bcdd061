//! Canonical, provider-agnostic review data model.
//!
//! Every provider's raw output is normalized into [`ReviewResult`] so the
//! rest of the engine (consensus, persistence, the HTTP surface) never
//! branches on vendor identity.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Canonical rating scale: every stored rating is in `1..=5`.
pub const RATING_MIN: u8 = 1;
pub const RATING_MAX: u8 = 5;

// ── Request enums ────────────────────────────────────────────────

/// Analytical focus of a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ReviewType {
    Security,
    Performance,
    BestPractices,
    Style,
    Architecture,
    General,
}

impl ReviewType {
    pub const ALL: [ReviewType; 6] = [
        Self::Security,
        Self::Performance,
        Self::BestPractices,
        Self::Style,
        Self::Architecture,
        Self::General,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Security => "security",
            Self::Performance => "performance",
            Self::BestPractices => "best-practices",
            Self::Style => "style",
            Self::Architecture => "architecture",
            Self::General => "general",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "security" => Self::Security,
            "performance" => Self::Performance,
            "best-practices" => Self::BestPractices,
            "style" => Self::Style,
            "architecture" => Self::Architecture,
            _ => Self::General,
        }
    }

    /// Specialized kinds get a narrower single-focus prompt template
    /// sampled at lower temperature.
    pub fn is_specialized(self) -> bool {
        matches!(self, Self::Security | Self::Performance | Self::Architecture)
    }
}

impl std::fmt::Display for ReviewType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named tone/style profile applied to prompt construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Personality {
    Mentor,
    Roaster,
    Guardian,
    Optimizer,
    Professor,
}

impl Personality {
    pub const ALL: [Personality; 5] = [
        Self::Mentor,
        Self::Roaster,
        Self::Guardian,
        Self::Optimizer,
        Self::Professor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mentor => "mentor",
            Self::Roaster => "roaster",
            Self::Guardian => "guardian",
            Self::Optimizer => "optimizer",
            Self::Professor => "professor",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "roaster" => Self::Roaster,
            "guardian" => Self::Guardian,
            "optimizer" => Self::Optimizer,
            "professor" => Self::Professor,
            _ => Self::Mentor,
        }
    }
}

impl std::fmt::Display for Personality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Self-reported skill level of the submitting developer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum UserLevel {
    Beginner,
    Intermediate,
    Advanced,
}

impl UserLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        }
    }
}

// ── Review request ───────────────────────────────────────────────

/// A request to generate one review. Immutable once dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRequest {
    /// Submission being reviewed.
    pub submission_id: Uuid,
    /// Analytical focus.
    pub review_type: ReviewType,
    /// Reviewer persona.
    pub personality: Personality,
    /// Model selector; resolved against the injected gateway registry.
    pub model: String,
    /// Optional extra focus areas folded into the prompt.
    #[serde(default)]
    pub focus_areas: Vec<String>,
    /// Optional skill level; tunes prompt register.
    #[serde(default)]
    pub user_level: Option<UserLevel>,
}

// ── Prompt ───────────────────────────────────────────────────────

/// A fully-specified provider prompt. Derived deterministically from a
/// [`ReviewRequest`] plus static lookup tables; no I/O.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompt {
    pub system: String,
    pub user: String,
    /// Sampling temperature in `[0, 1]`.
    pub temperature: f32,
    pub max_tokens: u32,
}

// ── Suggestions ──────────────────────────────────────────────────

/// Category of a code-change suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionCategory {
    Performance,
    Security,
    Style,
    Bug,
    Optimization,
}

impl SuggestionCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Performance => "performance",
            Self::Security => "security",
            Self::Style => "style",
            Self::Bug => "bug",
            Self::Optimization => "optimization",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "performance" => Self::Performance,
            "security" => Self::Security,
            "bug" => Self::Bug,
            "optimization" => Self::Optimization,
            _ => Self::Style,
        }
    }
}

/// Severity level for a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational, not a blocker.
    Low,
    /// Should be addressed but not urgent.
    Medium,
    /// Important issue that should be fixed soon.
    High,
    /// Must-fix: correctness or security.
    Critical,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "critical" => Self::Critical,
            "high" => Self::High,
            "medium" => Self::Medium,
            _ => Self::Low,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// A single before/after improvement suggestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub before_code: String,
    pub after_code: String,
    pub explanation: String,
    pub category: SuggestionCategory,
    pub severity: Severity,
}

// ── Metrics ──────────────────────────────────────────────────────

/// Fixed six-key quality metrics, each in `[0, 100]`.
///
/// Always structurally complete: missing or out-of-range provider values
/// are clamped/defaulted, never left absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    pub complexity: u8,
    pub maintainability: u8,
    pub performance: u8,
    pub security: u8,
    pub testability: u8,
    pub documentation: u8,
}

impl Metrics {
    /// Neutral default used when a provider reports nothing usable.
    pub const NEUTRAL: Metrics = Metrics {
        complexity: 50,
        maintainability: 50,
        performance: 50,
        security: 50,
        testability: 50,
        documentation: 50,
    };

    /// All six values, keyed for iteration in a stable order.
    pub fn entries(&self) -> [(&'static str, u8); 6] {
        [
            ("complexity", self.complexity),
            ("maintainability", self.maintainability),
            ("performance", self.performance),
            ("security", self.security),
            ("testability", self.testability),
            ("documentation", self.documentation),
        ]
    }

    pub fn in_range(&self) -> bool {
        // u8 already bounds below 0; only the upper bound can be violated.
        self.entries().iter().all(|(_, v)| *v <= 100)
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

// ── Review result ────────────────────────────────────────────────

/// Which provider/model/persona produced a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderIdentity {
    pub provider: String,
    pub model: String,
    pub personality: Personality,
}

/// Lifecycle status of a persisted review row.
///
/// `pending` transitions only to `completed` or `failed`; both are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Completed,
    Failed,
}

impl ReviewStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Canonical structured review. Created by the normalizer; immutable
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResult {
    /// Overall rating on the canonical `1..=5` scale.
    pub rating: u8,
    /// Ordered list of headline observations.
    pub key_points: Vec<String>,
    /// Criterion name → sub-score in `1..=10`.
    pub detailed_analysis: BTreeMap<String, u8>,
    /// Ordered improvement suggestions.
    pub suggestions: Vec<Suggestion>,
    /// Six fixed quality metrics.
    pub metrics: Metrics,
    /// Deduplicated tag set, first-appearance order.
    pub tags: Vec<String>,
    /// Conservative estimate of total fix effort.
    pub estimated_fix_minutes: u32,
    /// Personality-voiced summary.
    pub summary: String,
    /// Detected smells and anti-patterns.
    pub code_smells: Vec<String>,
    /// Who produced this.
    pub provider: ProviderIdentity,
}

impl ReviewResult {
    /// Render the review as markdown for CLI output and share pages.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "### Review by {} ({}, {})\n\n",
            self.provider.provider, self.provider.model, self.provider.personality
        ));
        md.push_str(&format!("**Rating**: {}/{}\n\n", self.rating, RATING_MAX));
        md.push_str(&format!("{}\n\n", self.summary));

        if !self.key_points.is_empty() {
            md.push_str("**Key points**\n\n");
            for point in &self.key_points {
                md.push_str(&format!("- {point}\n"));
            }
            md.push('\n');
        }

        md.push_str("| Metric | Score |\n|--------|-------|\n");
        for (name, value) in self.metrics.entries() {
            md.push_str(&format!("| {name} | {value} |\n"));
        }
        md.push('\n');

        if !self.suggestions.is_empty() {
            md.push_str("**Suggestions**\n\n");
            for s in &self.suggestions {
                md.push_str(&format!(
                    "- [{}] ({}) {}\n",
                    s.severity,
                    s.category.as_str(),
                    s.explanation
                ));
            }
            md.push('\n');
        }

        if !self.code_smells.is_empty() {
            md.push_str("**Code smells**\n\n");
            for smell in &self.code_smells {
                md.push_str(&format!("- {smell}\n"));
            }
            md.push('\n');
        }

        md.push_str(&format!(
            "*Estimated fix time: {} minute(s)*\n",
            self.estimated_fix_minutes
        ));
        md
    }

    /// Count suggestions at or above a severity.
    pub fn count_at_least(&self, severity: Severity) -> usize {
        self.suggestions.iter().filter(|s| s.severity >= severity).count()
    }
}

// ── Consensus result ─────────────────────────────────────────────

/// Reduced aggregate of multiple independent providers' reviews.
/// Derived, never independently edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusResult {
    /// ReviewResult-shaped merge of all members.
    pub merged: ReviewResult,
    /// Human-readable agreement notes.
    pub agreements: Vec<String>,
    /// Human-readable disagreement notes.
    pub disagreements: Vec<String>,
    /// `0..=100`; drops 20 points per disagreement.
    pub confidence: u8,
    /// Member results in arrival order.
    pub members: Vec<ReviewResult>,
}

impl ConsensusResult {
    pub fn to_markdown(&self) -> String {
        let mut md = String::from("## Multi-Provider Review Consensus\n\n");
        md.push_str(&format!("**Confidence**: {}%\n\n", self.confidence));

        if !self.agreements.is_empty() {
            md.push_str("**Agreements**\n\n");
            for a in &self.agreements {
                md.push_str(&format!("- {a}\n"));
            }
            md.push('\n');
        }
        if !self.disagreements.is_empty() {
            md.push_str("**Disagreements**\n\n");
            for d in &self.disagreements {
                md.push_str(&format!("- {d}\n"));
            }
            md.push('\n');
        }

        md.push_str("---\n\n");
        md.push_str(&self.merged.to_markdown());

        for member in &self.members {
            md.push_str("\n---\n\n");
            md.push_str(&member.to_markdown());
        }
        md
    }
}

// ── Tests ────────────────────────────────────────────────────────
