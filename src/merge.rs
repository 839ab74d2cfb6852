//! Merge AI and rule-based suggestions
//!
//! AI suggestions form the base list. A rule-based suggestion for the same
//! column pair (in either direction) is folded into the AI one as a
//! confirmation; any other rule-based suggestion is appended as is. The
//! result is deduplicated on the direction-free key and ranked by score.
//!
//! An AI suggestion always shadows the rule-based one for the same pair,
//! even when the rule scored higher. A confirmed suggestion ends at
//! `min(score + 0.05, 0.98)`, so a confirmed 0.99 drops to 0.98.

use crate::suggestion::{patterns, InferredJoin};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Score added to an AI suggestion confirmed by a rule
pub const CONFIRMATION_BOOST: f64 = 0.05;

/// Confirmation never pushes a score above this
pub const CONFIRMED_SCORE_CAP: f64 = 0.98;

pub const CONFIRMATION_SUFFIX: &str = " (Confirmed by pattern analysis)";

#[derive(Debug, Default)]
pub struct SuggestionMerger;

impl SuggestionMerger {
    pub fn new() -> Self {
        Self
    }

    pub fn merge(
        &self,
        ai_suggestions: Vec<InferredJoin>,
        rule_suggestions: Vec<InferredJoin>,
    ) -> Vec<InferredJoin> {
        let mut merged = ai_suggestions;

        // Both directions point at the first AI suggestion with that key
        let mut ai_positions: HashMap<String, usize> = HashMap::new();
        for (idx, join) in merged.iter().enumerate() {
            ai_positions.entry(join.key()).or_insert(idx);
            ai_positions.entry(join.reversed_key()).or_insert(idx);
        }
        let mut confirmed: HashSet<usize> = HashSet::new();

        for rule_join in rule_suggestions {
            let matching = ai_positions
                .get(&rule_join.key())
                .or_else(|| ai_positions.get(&rule_join.reversed_key()))
                .copied();

            match matching {
                Some(idx) => {
                    // One boost per AI suggestion, however many rules agree
                    if confirmed.insert(idx) {
                        let ai_join = &mut merged[idx];
                        // Scores already above the cap are pulled down to it
                        ai_join.set_confidence(
                            (ai_join.confidence_score + CONFIRMATION_BOOST).min(CONFIRMED_SCORE_CAP),
                        );
                        ai_join.add_pattern(patterns::CONFIRMED_BY_RULES);
                        ai_join.reasoning.push_str(CONFIRMATION_SUFFIX);
                        debug!("Rules confirmed AI join {}", ai_join.join_condition());
                    }
                }
                None => merged.push(rule_join),
            }
        }

        let mut seen: HashSet<String> = HashSet::new();
        merged.retain(|join| seen.insert(join.unordered_key()));

        // Stable: equal scores keep AI-first, then rule order
        merged.sort_by(|a, b| {
            b.confidence_score
                .partial_cmp(&a.confidence_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        merged
    }
}
