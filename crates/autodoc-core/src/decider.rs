//! Generate / skip / defer policy.
//!
//! | requires update | summary usable | action   |
//! |-----------------|----------------|----------|
//! | no              | any            | SKIP     |
//! | yes             | no             | DEFER    |
//! | yes             | yes            | GENERATE |

use crate::domain::{ChangeSignal, Decision, DecisionAction};

/// Stateless decision policy. The threshold is only quoted in rationales.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DocumentDecider {
    threshold: f64,
}

impl DocumentDecider {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn decide(&self, signal: &ChangeSignal) -> Decision {
        if !signal.requires_doc_update {
            return Decision {
                action: DecisionAction::Skip,
                rationale: format!(
                    "no documentation update required: relevance {:.2} is below threshold {:.2} \
                     and no always-document path was touched",
                    signal.relevance, self.threshold
                ),
            };
        }

        let trigger = self.trigger(signal);
        if !signal.has_usable_summary() {
            return Decision {
                action: DecisionAction::Defer,
                rationale: format!(
                    "documentation update required ({trigger}) but the change summary is \
                     empty or unusable; more change data is needed"
                ),
            };
        }

        Decision {
            action: DecisionAction::Generate,
            rationale: format!("documentation update required: {trigger}"),
        }
    }

    fn trigger(&self, signal: &ChangeSignal) -> String {
        let mut reasons = Vec::new();
        if !signal.always_document_hits.is_empty() {
            reasons.push(format!(
                "always-document path touched: {}",
                signal.always_document_hits.join(", ")
            ));
        }
        if signal.relevance >= self.threshold {
            reasons.push(format!(
                "relevance {:.2} meets threshold {:.2}",
                signal.relevance, self.threshold
            ));
        }
        if reasons.is_empty() {
            reasons.push(format!(
                "analyzer flagged the change at relevance {:.2}",
                signal.relevance
            ));
        }
        reasons.join("; ")
    }
}
