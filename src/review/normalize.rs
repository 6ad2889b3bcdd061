//! Response normalization: raw provider output → [`ReviewResult`].
//!
//! Providers do not reliably honor the JSON shape the prompt demands, so
//! normalization is an explicit fallback chain, each stage independently
//! testable:
//!
//! 1. **Strict parse** — strip markdown code fences, deserialize the
//!    JSON payload leniently (every field optional).
//! 2. **Section heuristic** — line-oriented scan driven by the markers
//!    the prompt's plain-text renderings use ("Overall Rating",
//!    "Specific Suggestions", "'s Take:", "Code Smells:").
//! 3. **Default fill** — every field has a hard-coded default, so the
//!    result is structurally complete even from garbled input.
//!
//! The only failure mode is empty input. All numeric fields are clamped
//! into their valid ranges post-parse, and ratings that look like the
//! 1-10 prompt scale are folded onto the canonical 1-5 scale.

use super::types::{
    Metrics, ProviderIdentity, ReviewResult, Severity, Suggestion, SuggestionCategory,
};
use crate::error::NormalizationError;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Fallback summary length when the output is unstructured prose.
const RAW_SUMMARY_MAX_CHARS: usize = 200;

/// Default tags applied when a provider reports none.
const DEFAULT_TAGS: [&str; 2] = ["code-review", "ai-generated"];

// ── Entry point ──────────────────────────────────────────────────

/// Normalize raw provider output into a structurally complete result.
///
/// Never fails on malformed content; fails only on empty input.
pub fn normalize(
    raw: &str,
    identity: ProviderIdentity,
) -> Result<ReviewResult, NormalizationError> {
    if raw.trim().is_empty() {
        return Err(NormalizationError::EmptyOutput);
    }

    let payload = parse_strict(raw).unwrap_or_else(|| parse_sections(raw));
    Ok(payload.into_result(raw, identity))
}

// ── Stage 1: strict JSON ─────────────────────────────────────────

/// Lenient deserialization target: every field optional, aliases cover
/// the camelCase variants some providers emit.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawPayload {
    rating: Option<f64>,
    #[serde(alias = "keyPoints")]
    key_points: Vec<String>,
    #[serde(alias = "detailedAnalysis")]
    detailed_analysis: BTreeMap<String, f64>,
    suggestions: Vec<RawSuggestion>,
    metrics: Option<RawMetrics>,
    tags: Vec<String>,
    #[serde(alias = "estimatedFixTime", alias = "estimatedFixMinutes")]
    estimated_fix_minutes: Option<f64>,
    #[serde(alias = "content")]
    summary: Option<String>,
    #[serde(alias = "codeSmells")]
    code_smells: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSuggestion {
    #[serde(alias = "before")]
    before_code: String,
    #[serde(alias = "after")]
    after_code: String,
    explanation: String,
    category: Option<String>,
    severity: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawMetrics {
    complexity: Option<f64>,
    maintainability: Option<f64>,
    performance: Option<f64>,
    security: Option<f64>,
    testability: Option<f64>,
    documentation: Option<f64>,
}

/// Attempt a strict JSON parse, unwrapping markdown code fences first.
fn parse_strict(raw: &str) -> Option<RawPayload> {
    serde_json::from_str(strip_code_fences(raw)).ok()
}

/// Extract JSON content from a response that may wrap it in ``` blocks.
fn strip_code_fences(text: &str) -> &str {
    if let Some(start) = text.find("```json") {
        let body = start + 7;
        if let Some(end) = text[body..].find("```") {
            return text[body..body + end].trim();
        }
    }
    if let Some(start) = text.find("```") {
        let body = start + 3;
        if let Some(end) = text[body..].find("```") {
            let candidate = text[body..body + end].trim();
            // Skip a language identifier line if present
            if let Some(nl) = candidate.find('\n') {
                if !candidate[..nl].trim_start().starts_with('{') {
                    return candidate[nl + 1..].trim();
                }
            }
            return candidate;
        }
    }
    text.trim()
}

// ── Stage 2: section heuristic ───────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    KeyPoints,
    Analysis,
    Suggestions,
    Summary,
    Smells,
}

/// Line-oriented scan for the plain-text review structure the prompts
/// describe. Tolerates partial output; anything unmatched is ignored.
fn parse_sections(raw: &str) -> RawPayload {
    let mut payload = RawPayload::default();
    let mut summary_lines: Vec<String> = Vec::new();
    let mut section = Section::Preamble;

    for line in raw.lines() {
        let trimmed = line.trim();

        // Scan after the marker so list numbering ("1. Overall Rating: 8")
        // doesn't shadow the value.
        if let Some(pos) = trimmed.find("Overall Rating") {
            payload.rating = first_number(&trimmed[pos + "Overall Rating".len()..]);
            continue;
        }
        if let Some(pos) = trimmed.find("Estimated Fix") {
            payload.estimated_fix_minutes = first_number(&trimmed[pos + "Estimated Fix".len()..]);
            continue;
        }
        if let Some(next) = section_for_heading(trimmed) {
            section = next;
            continue;
        }

        match section {
            Section::Preamble | Section::KeyPoints => {
                if let Some(text) = bullet_text(trimmed) {
                    payload.key_points.push(text.to_string());
                }
            }
            Section::Analysis => {
                // "- Input validation (7/10)" → criterion 7
                if let Some(open) = trimmed.find('(') {
                    let criterion = bullet_text(&trimmed[..open])
                        .unwrap_or_else(|| trimmed[..open].trim())
                        .to_string();
                    if let Some(score) = first_number(&trimmed[open..]) {
                        if !criterion.is_empty() {
                            payload.detailed_analysis.insert(criterion, score);
                        }
                    }
                } else if let Some(metric) = metric_from_line(trimmed) {
                    apply_metric(payload.metrics.get_or_insert_with(RawMetrics::default), metric);
                }
            }
            Section::Suggestions => {
                if let Some(text) = bullet_text(trimmed) {
                    payload.suggestions.push(RawSuggestion {
                        explanation: text.to_string(),
                        ..RawSuggestion::default()
                    });
                }
            }
            Section::Summary => {
                if !trimmed.is_empty() {
                    summary_lines.push(trimmed.to_string());
                }
            }
            Section::Smells => {
                if let Some(text) = bullet_text(trimmed) {
                    payload.code_smells.push(text.to_string());
                }
            }
        }
    }

    if !summary_lines.is_empty() {
        payload.summary = Some(summary_lines.join("\n"));
    }
    payload
}

fn section_for_heading(line: &str) -> Option<Section> {
    if line.contains("Detailed Analysis") {
        Some(Section::Analysis)
    } else if line.contains("Specific Suggestions") || line.contains("Areas for Improvement") {
        Some(Section::Suggestions)
    } else if line.contains("'s Take") {
        Some(Section::Summary)
    } else if line.contains("Code Smells") {
        Some(Section::Smells)
    } else if line.contains("Key Strengths") || line.contains("Key Points") {
        Some(Section::KeyPoints)
    } else {
        None
    }
}

fn bullet_text(line: &str) -> Option<&str> {
    let trimmed = line.trim();
    trimmed
        .strip_prefix("- ")
        .or_else(|| trimmed.strip_prefix("* "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// First integer appearing in a line, if any.
fn first_number(line: &str) -> Option<f64> {
    let digits: String = line
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// "Complexity: 75" style metric lines inside the analysis section.
fn metric_from_line(line: &str) -> Option<(&'static str, f64)> {
    let lower = line.to_ascii_lowercase();
    for name in [
        "complexity",
        "maintainability",
        "performance",
        "security",
        "testability",
        "documentation",
    ] {
        if lower.starts_with(name) || lower.starts_with(&format!("- {name}")) {
            if let Some(value) = first_number(&lower) {
                return Some((name, value));
            }
        }
    }
    None
}

fn apply_metric(metrics: &mut RawMetrics, (name, value): (&str, f64)) {
    let slot = match name {
        "complexity" => &mut metrics.complexity,
        "maintainability" => &mut metrics.maintainability,
        "performance" => &mut metrics.performance,
        "security" => &mut metrics.security,
        "testability" => &mut metrics.testability,
        _ => &mut metrics.documentation,
    };
    *slot = Some(value);
}

// ── Stage 3: defaults and clamping ───────────────────────────────

impl RawPayload {
    fn into_result(self, raw: &str, identity: ProviderIdentity) -> ReviewResult {
        let summary = match self.summary {
            Some(s) if !s.trim().is_empty() => s.trim().to_string(),
            _ => truncate_chars(raw.trim(), RAW_SUMMARY_MAX_CHARS),
        };

        let tags = if self.tags.is_empty() {
            DEFAULT_TAGS.iter().map(|t| (*t).to_string()).collect()
        } else {
            dedup_preserving_order(self.tags)
        };

        ReviewResult {
            rating: canonical_rating(self.rating),
            key_points: dedup_preserving_order(self.key_points),
            detailed_analysis: self
                .detailed_analysis
                .into_iter()
                .map(|(k, v)| (k, clamp_to(v, 1, 10)))
                .collect(),
            suggestions: self.suggestions.into_iter().map(RawSuggestion::into_suggestion).collect(),
            metrics: self.metrics.map(RawMetrics::into_metrics).unwrap_or(Metrics::NEUTRAL),
            tags,
            estimated_fix_minutes: self
                .estimated_fix_minutes
                .filter(|m| m.is_finite() && *m >= 0.0)
                .map(|m| m.round() as u32)
                .unwrap_or(0),
            summary,
            code_smells: dedup_preserving_order(self.code_smells),
            provider: identity,
        }
    }
}

impl RawSuggestion {
    fn into_suggestion(self) -> Suggestion {
        Suggestion {
            before_code: self.before_code,
            after_code: self.after_code,
            explanation: self.explanation,
            category: self
                .category
                .map(|c| SuggestionCategory::from_str_lossy(&c.to_ascii_lowercase()))
                .unwrap_or(SuggestionCategory::Style),
            severity: self
                .severity
                .map(|s| Severity::from_str_lossy(&s.to_ascii_lowercase()))
                .unwrap_or(Severity::Low),
        }
    }
}

impl RawMetrics {
    fn into_metrics(self) -> Metrics {
        let clamp = |v: Option<f64>| v.map(|v| clamp_to(v, 0, 100)).unwrap_or(50);
        Metrics {
            complexity: clamp(self.complexity),
            maintainability: clamp(self.maintainability),
            performance: clamp(self.performance),
            security: clamp(self.security),
            testability: clamp(self.testability),
            documentation: clamp(self.documentation),
        }
    }
}

/// Fold onto the canonical 1-5 scale. Values in 6..=10 are treated as
/// the 1-10 prompt scale; everything else is clamped.
fn canonical_rating(rating: Option<f64>) -> u8 {
    let Some(r) = rating.filter(|r| r.is_finite()) else {
        return 3;
    };
    let r = r.round() as i64;
    let folded = if (6..=10).contains(&r) { (r + 1) / 2 } else { r };
    folded.clamp(1, 5) as u8
}

fn clamp_to(value: f64, min: u8, max: u8) -> u8 {
    if !value.is_finite() {
        return min;
    }
    (value.round() as i64).clamp(i64::from(min), i64::from(max)) as u8
}

fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        text.chars().take(max).collect()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::types::Personality;

    fn identity() -> ProviderIdentity {
        ProviderIdentity {
            provider: "test".into(),
            model: "test-model".into(),
            personality: Personality::Mentor,
        }
    }

    #[test]
    fn empty_input_is_the_only_error() {
        assert_eq!(
            normalize("", identity()).unwrap_err(),
            NormalizationError::EmptyOutput
        );
        assert_eq!(
            normalize("   \n\t ", identity()).unwrap_err(),
            NormalizationError::EmptyOutput
        );
        // Pure noise still yields a complete result
        assert!(normalize("@@@@ ???", identity()).is_ok());
    }

    #[test]
    fn strict_json_parse() {
        let raw = r#"{
            "rating": 4,
            "key_points": ["Clean structure"],
            "detailed_analysis": {"Error handling": 8},
            "suggestions": [{
                "before_code": "x.unwrap()",
                "after_code": "x?",
                "explanation": "Propagate errors",
                "category": "bug",
                "severity": "high"
            }],
            "metrics": {"complexity": 70, "maintainability": 85, "performance": 90,
                        "security": 60, "testability": 75, "documentation": 50},
            "tags": ["rust"],
            "estimated_fix_minutes": 20,
            "summary": "Good work overall.",
            "code_smells": ["long function"]
        }"#;
        let result = normalize(raw, identity()).unwrap();
        assert_eq!(result.rating, 4);
        assert_eq!(result.key_points, vec!["Clean structure"]);
        assert_eq!(result.detailed_analysis["Error handling"], 8);
        assert_eq!(result.suggestions.len(), 1);
        assert_eq!(result.suggestions[0].severity, Severity::High);
        assert_eq!(result.metrics.maintainability, 85);
        assert_eq!(result.estimated_fix_minutes, 20);
        assert_eq!(result.summary, "Good work overall.");
        assert_eq!(result.code_smells, vec!["long function"]);
    }

    #[test]
    fn strict_json_inside_markdown_fence() {
        let raw = "Here's my review:\n```json\n{\"rating\": 5, \"summary\": \"Ship it.\"}\n```";
        let result = normalize(raw, identity()).unwrap();
        assert_eq!(result.rating, 5);
        assert_eq!(result.summary, "Ship it.");
    }

    #[test]
    fn strict_json_camel_case_aliases() {
        let raw = r#"{"rating": 3, "keyPoints": ["a"], "estimatedFixTime": 12, "content": "ok"}"#;
        let result = normalize(raw, identity()).unwrap();
        assert_eq!(result.key_points, vec!["a"]);
        assert_eq!(result.estimated_fix_minutes, 12);
        assert_eq!(result.summary, "ok");
    }

    #[test]
    fn heuristic_parses_sections() {
        let raw = "\
1. Overall Rating: 8/10

2. Key Strengths
- Clear naming
- Good test coverage

4. Detailed Analysis:
- Input validation (7/10)
- Error handling (5/10)

5. Specific Suggestions
- Validate the email field
- Add a timeout to the fetch call

6. The Mentor's Take:
Keep going, this is close to great.

Code Smells:
- Magic numbers in the loop
";
        let result = normalize(raw, identity()).unwrap();
        // 8 on the 1-10 scale folds to 4
        assert_eq!(result.rating, 4);
        assert_eq!(result.key_points, vec!["Clear naming", "Good test coverage"]);
        assert_eq!(result.detailed_analysis["Input validation"], 7);
        assert_eq!(result.detailed_analysis["Error handling"], 5);
        assert_eq!(result.suggestions.len(), 2);
        assert_eq!(result.suggestions[0].explanation, "Validate the email field");
        assert!(result.summary.contains("close to great"));
        assert_eq!(result.code_smells, vec!["Magic numbers in the loop"]);
    }

    #[test]
    fn heuristic_metric_lines() {
        let raw = "Detailed Analysis:\nComplexity: 72\nSecurity: 140\n";
        let result = normalize(raw, identity()).unwrap();
        assert_eq!(result.metrics.complexity, 72);
        // Out of range clamps to 100
        assert_eq!(result.metrics.security, 100);
        // Unmentioned keys default to neutral
        assert_eq!(result.metrics.testability, 50);
    }

    #[test]
    fn garbled_input_gets_defaults() {
        let result = normalize("lorem ipsum dolor sit amet", identity()).unwrap();
        assert_eq!(result.rating, 3);
        assert!(result.key_points.is_empty());
        assert_eq!(result.metrics, Metrics::NEUTRAL);
        assert_eq!(result.tags, vec!["code-review", "ai-generated"]);
        assert_eq!(result.estimated_fix_minutes, 0);
        // Summary falls back to the raw text
        assert!(result.summary.contains("lorem ipsum"));
        assert!(result.metrics.in_range());
    }

    #[test]
    fn ratings_are_canonicalized() {
        assert_eq!(canonical_rating(None), 3);
        assert_eq!(canonical_rating(Some(0.0)), 1);
        assert_eq!(canonical_rating(Some(3.0)), 3);
        assert_eq!(canonical_rating(Some(5.0)), 5);
        // 1-10 scale folds down
        assert_eq!(canonical_rating(Some(6.0)), 3);
        assert_eq!(canonical_rating(Some(9.0)), 5);
        assert_eq!(canonical_rating(Some(10.0)), 5);
        // Nonsense clamps
        assert_eq!(canonical_rating(Some(999.0)), 5);
        assert_eq!(canonical_rating(Some(-3.0)), 1);
        assert_eq!(canonical_rating(Some(f64::NAN)), 3);
    }

    #[test]
    fn out_of_range_json_values_are_clamped() {
        let raw = r#"{"rating": 42, "detailed_analysis": {"Depth": 99},
                      "metrics": {"complexity": -5, "performance": 400}}"#;
        let result = normalize(raw, identity()).unwrap();
        assert_eq!(result.rating, 5);
        assert_eq!(result.detailed_analysis["Depth"], 10);
        assert_eq!(result.metrics.complexity, 0);
        assert_eq!(result.metrics.performance, 100);
    }

    #[test]
    fn strip_fences_variants() {
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("x\n```js\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn tags_and_lists_deduplicate() {
        let raw = r#"{"rating": 3, "tags": ["rust", "rust", "cli"],
                      "code_smells": ["dup", "dup"]}"#;
        let result = normalize(raw, identity()).unwrap();
        assert_eq!(result.tags, vec!["rust", "cli"]);
        assert_eq!(result.code_smells, vec!["dup"]);
    }
}
