//! Pure consensus reduction over independent review results.
//!
//! An explicit, auditable merge: arithmetic averages, exact-match
//! deduplication, and a spread-based agreement report. Deliberately not
//! a weighted or learned aggregation; determinism and explainability
//! win over sophistication here.

use super::types::{ConsensusResult, ProviderIdentity, ReviewResult, Suggestion};
use crate::error::ReviewError;
use std::collections::{BTreeMap, HashSet};

/// Rating spread (max - min, 1-5 scale) at or below which the models
/// count as agreeing.
const RATING_AGREEMENT_SPREAD: u8 = 1;
/// Suggestion-count spread at or below which the models agree.
const SUGGESTION_AGREEMENT_SPREAD: usize = 2;
/// Confidence penalty per disagreement note.
const DISAGREEMENT_PENALTY: u8 = 20;

/// Merge N results into one consensus. Requires at least one input.
///
/// A single input degenerates to that result with an empty
/// agreement/disagreement report and confidence 100.
pub fn reduce(results: &[ReviewResult]) -> Result<ConsensusResult, ReviewError> {
    let first = results.first().ok_or(ReviewError::EmptyResultSet)?;

    if results.len() == 1 {
        return Ok(ConsensusResult {
            merged: first.clone(),
            agreements: Vec::new(),
            disagreements: Vec::new(),
            confidence: 100,
            members: results.to_vec(),
        });
    }

    let merged = merge_results(results, first.provider.personality);
    let (agreements, disagreements) = compare(results);
    let confidence = 100u8.saturating_sub(
        DISAGREEMENT_PENALTY.saturating_mul(disagreements.len().min(5) as u8),
    );

    Ok(ConsensusResult {
        merged,
        agreements,
        disagreements,
        confidence,
        members: results.to_vec(),
    })
}

// ── Merge ────────────────────────────────────────────────────────

fn merge_results(results: &[ReviewResult], personality: crate::review::types::Personality) -> ReviewResult {
    let n = results.len() as f64;

    let avg = |pick: fn(&ReviewResult) -> u8| -> u8 {
        let sum: f64 = results.iter().map(|r| f64::from(pick(r))).sum();
        (sum / n).round() as u8
    };

    let metrics = crate::review::types::Metrics {
        complexity: avg(|r| r.metrics.complexity),
        maintainability: avg(|r| r.metrics.maintainability),
        performance: avg(|r| r.metrics.performance),
        security: avg(|r| r.metrics.security),
        testability: avg(|r| r.metrics.testability),
        documentation: avg(|r| r.metrics.documentation),
    };

    // Criterion sub-scores: average over the members that scored them.
    let mut analysis_sums: BTreeMap<String, (f64, u32)> = BTreeMap::new();
    for result in results {
        for (criterion, score) in &result.detailed_analysis {
            let entry = analysis_sums.entry(criterion.clone()).or_insert((0.0, 0));
            entry.0 += f64::from(*score);
            entry.1 += 1;
        }
    }
    let detailed_analysis = analysis_sums
        .into_iter()
        .map(|(k, (sum, count))| (k, (sum / f64::from(count)).round() as u8))
        .collect();

    let summary = std::iter::once(format!(
        "Consensus review based on {} AI reviewers:",
        results.len()
    ))
    .chain(results.iter().map(|r| r.summary.clone()))
    .collect::<Vec<_>>()
    .join("\n\n---\n\n");

    ReviewResult {
        rating: avg(|r| r.rating),
        key_points: union_strings(results.iter().flat_map(|r| r.key_points.iter())),
        detailed_analysis,
        suggestions: union_suggestions(results),
        metrics,
        tags: union_strings(results.iter().flat_map(|r| r.tags.iter())),
        // Conservative: assume issues are not trivially overlapping.
        estimated_fix_minutes: results.iter().map(|r| r.estimated_fix_minutes).max().unwrap_or(0),
        summary,
        code_smells: union_strings(results.iter().flat_map(|r| r.code_smells.iter())),
        provider: ProviderIdentity {
            provider: "consensus".into(),
            model: "multi-model".into(),
            personality,
        },
    }
}

/// Union suggestions across members, deduplicated on exact explanation
/// text, arrival order preserved.
fn union_suggestions(results: &[ReviewResult]) -> Vec<Suggestion> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for result in results {
        for suggestion in &result.suggestions {
            if seen.insert(suggestion.explanation.clone()) {
                merged.push(suggestion.clone());
            }
        }
    }
    merged
}

fn union_strings<'a>(items: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .filter(|item| seen.insert((*item).clone()))
        .cloned()
        .collect()
}

// ── Agreement report ─────────────────────────────────────────────

fn compare(results: &[ReviewResult]) -> (Vec<String>, Vec<String>) {
    let mut agreements = Vec::new();
    let mut disagreements = Vec::new();

    let ratings: Vec<u8> = results.iter().map(|r| r.rating).collect();
    let min_rating = *ratings.iter().min().unwrap_or(&0);
    let max_rating = *ratings.iter().max().unwrap_or(&0);
    if max_rating - min_rating <= RATING_AGREEMENT_SPREAD {
        let avg: f64 =
            ratings.iter().map(|r| f64::from(*r)).sum::<f64>() / ratings.len() as f64;
        agreements.push(format!(
            "All models agree on a similar rating ({}/5)",
            avg.round() as u8
        ));
    } else {
        disagreements.push(format!(
            "Models disagree on rating (range: {min_rating}-{max_rating})"
        ));
    }

    let counts: Vec<usize> = results.iter().map(|r| r.suggestions.len()).collect();
    let min_count = *counts.iter().min().unwrap_or(&0);
    let max_count = *counts.iter().max().unwrap_or(&0);
    if max_count - min_count <= SUGGESTION_AGREEMENT_SPREAD {
        agreements.push("Models agree on the number of suggestions needed".into());
    } else {
        disagreements.push(format!(
            "Models disagree on the number of suggestions ({min_count}-{max_count})"
        ));
    }

    (agreements, disagreements)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::types::{
        Metrics, Personality, Severity, SuggestionCategory,
    };

    fn result(provider: &str, rating: u8, suggestions: usize) -> ReviewResult {
        ReviewResult {
            rating,
            key_points: vec![format!("{provider} point")],
            detailed_analysis: std::collections::BTreeMap::from([("Error handling".to_string(), 6u8)]),
            suggestions: (0..suggestions)
                .map(|i| Suggestion {
                    before_code: String::new(),
                    after_code: String::new(),
                    explanation: format!("{provider} suggestion {i}"),
                    category: SuggestionCategory::Style,
                    severity: Severity::Low,
                })
                .collect(),
            metrics: Metrics::NEUTRAL,
            tags: vec!["shared".into(), provider.to_string()],
            estimated_fix_minutes: 10,
            summary: format!("{provider} summary"),
            code_smells: vec![],
            provider: ProviderIdentity {
                provider: provider.into(),
                model: format!("{provider}-model"),
                personality: Personality::Mentor,
            },
        }
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(reduce(&[]), Err(ReviewError::EmptyResultSet)));
    }

    #[test]
    fn single_result_degenerates() {
        let consensus = reduce(&[result("openai", 4, 1)]).unwrap();
        assert_eq!(consensus.confidence, 100);
        assert!(consensus.agreements.is_empty());
        assert!(consensus.disagreements.is_empty());
        assert_eq!(consensus.merged.rating, 4);
        assert_eq!(consensus.members.len(), 1);
    }

    #[test]
    fn identical_metrics_average_to_themselves() {
        let a = result("openai", 4, 1);
        let b = result("anthropic", 4, 1);
        let consensus = reduce(&[a, b]).unwrap();
        assert_eq!(consensus.merged.metrics, Metrics::NEUTRAL);
        assert_eq!(consensus.merged.rating, 4);
        assert_eq!(consensus.confidence, 100);
        assert!(consensus.disagreements.is_empty());
        assert_eq!(consensus.agreements.len(), 2);
    }

    #[test]
    fn rating_spread_triggers_disagreement() {
        let consensus = reduce(&[result("a", 5, 1), result("b", 1, 1)]).unwrap();
        assert!(consensus
            .disagreements
            .iter()
            .any(|d| d.contains("rating") && d.contains("1-5")));
        assert!(consensus.confidence <= 80);
        // rating average: (5 + 1) / 2 = 3
        assert_eq!(consensus.merged.rating, 3);
    }

    #[test]
    fn suggestion_count_spread_triggers_disagreement() {
        let consensus = reduce(&[result("a", 4, 0), result("b", 4, 5)]).unwrap();
        assert!(consensus
            .disagreements
            .iter()
            .any(|d| d.contains("number of suggestions")));
        assert_eq!(consensus.confidence, 80);
    }

    #[test]
    fn each_disagreement_costs_twenty_confidence() {
        // Both axes disagree: 100 - 2*20 = 60
        let consensus = reduce(&[result("a", 5, 0), result("b", 1, 6)]).unwrap();
        assert_eq!(consensus.confidence, 60);
    }

    #[test]
    fn suggestions_deduplicate_on_explanation() {
        let a = result("a", 4, 2);
        let mut b = result("b", 4, 2);
        // Make b's first suggestion an exact duplicate of a's first
        b.suggestions[0].explanation = a.suggestions[0].explanation.clone();
        let consensus = reduce(&[a.clone(), b]).unwrap();
        assert_eq!(consensus.merged.suggestions.len(), 3);
        // First appearance wins the slot
        assert_eq!(
            consensus.merged.suggestions[0].explanation,
            a.suggestions[0].explanation
        );
    }

    #[test]
    fn tags_union_as_set() {
        let consensus = reduce(&[result("a", 4, 1), result("b", 4, 1)]).unwrap();
        assert_eq!(consensus.merged.tags, vec!["shared", "a", "b"]);
    }

    #[test]
    fn fix_time_takes_maximum() {
        let mut a = result("a", 4, 1);
        let mut b = result("b", 4, 1);
        a.estimated_fix_minutes = 10;
        b.estimated_fix_minutes = 45;
        let consensus = reduce(&[a, b]).unwrap();
        assert_eq!(consensus.merged.estimated_fix_minutes, 45);
    }

    #[test]
    fn merged_identity_is_consensus() {
        let consensus = reduce(&[result("a", 4, 1), result("b", 4, 1)]).unwrap();
        assert_eq!(consensus.merged.provider.provider, "consensus");
        assert_eq!(consensus.merged.provider.model, "multi-model");
        assert_eq!(consensus.merged.summary.lines().next().unwrap(),
                   "Consensus review based on 2 AI reviewers:");
    }

    #[test]
    fn criterion_scores_average_over_scorers() {
        let mut a = result("a", 4, 1);
        let mut b = result("b", 4, 1);
        a.detailed_analysis.insert("Error handling".into(), 4);
        b.detailed_analysis.insert("Error handling".into(), 8);
        b.detailed_analysis.insert("Naming".into(), 10);
        let consensus = reduce(&[a, b]).unwrap();
        assert_eq!(consensus.merged.detailed_analysis["Error handling"], 6);
        // Scored by one member only: carried as-is
        assert_eq!(consensus.merged.detailed_analysis["Naming"], 10);
    }
}
