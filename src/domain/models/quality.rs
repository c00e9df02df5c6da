//! Quality scoring for plans, per spec §3/§4.5 (Validation Pipeline, C5).
//!
//! A [`QualityScore`] is the composite of five dimensions, each scored
//! 0-20, summing to a total out of 100. The total gates which environments
//! a plan may be approved for and whether HITL/dual-signer is required —
//! but that policy decision lives in the application layer (C5/C6), since
//! it also depends on task risk level and configuration; this model only
//! holds the score and the pure function from score to allowed environments.

use serde::{Deserialize, Serialize};

/// A single scoring dimension, each clamped to 0-20 on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension(u8);

impl Dimension {
    pub const MAX: u8 = 20;

    pub fn new(value: u8) -> Self {
        Self(value.min(Self::MAX))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

/// The five quality dimensions spec §4.5 scores a validated plan on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityScore {
    /// Schema/shape correctness of the plan (phases well-formed, selectors
    /// resolve, tool arguments validate against the tool's JSON Schema).
    pub structural: Dimension,
    /// Conformance with org policy (no destructive action outside an
    /// approved change window, no escalation beyond the requester's scope).
    pub policy: Dimension,
    /// Whether the plan's tools/assets have test or staging coverage.
    pub test_coverage: Dimension,
    /// Track record of this plan shape (or a close match) succeeding
    /// historically for this org.
    pub operational_history: Dimension,
    /// Whether a human has already reviewed an equivalent plan recently.
    pub human_review: Dimension,
}

/// The execution tier a quality score clears.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvironmentTier {
    Dev,
    Staging,
    Prod,
    ProdBulk,
}

impl QualityScore {
    pub fn new(
        structural: u8,
        policy: u8,
        test_coverage: u8,
        operational_history: u8,
        human_review: u8,
    ) -> Self {
        Self {
            structural: Dimension::new(structural),
            policy: Dimension::new(policy),
            test_coverage: Dimension::new(test_coverage),
            operational_history: Dimension::new(operational_history),
            human_review: Dimension::new(human_review),
        }
    }

    /// Sum of all five dimensions, 0-100.
    pub fn total(&self) -> u16 {
        u16::from(self.structural.value())
            + u16::from(self.policy.value())
            + u16::from(self.test_coverage.value())
            + u16::from(self.operational_history.value())
            + u16::from(self.human_review.value())
    }

    /// The highest environment tier this score alone clears, independent of
    /// task risk level or HITL policy (which the application layer folds in
    /// separately). Thresholds: dev >= 40, staging >= 60, prod >= 80,
    /// prod_bulk >= 90.
    pub fn highest_clearable_tier(&self) -> Option<EnvironmentTier> {
        let total = self.total();
        if total >= 90 {
            Some(EnvironmentTier::ProdBulk)
        } else if total >= 80 {
            Some(EnvironmentTier::Prod)
        } else if total >= 60 {
            Some(EnvironmentTier::Staging)
        } else if total >= 40 {
            Some(EnvironmentTier::Dev)
        } else {
            None
        }
    }

    pub fn clears(&self, tier: EnvironmentTier) -> bool {
        self.highest_clearable_tier().is_some_and(|t| t >= tier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_clamps_to_max() {
        assert_eq!(Dimension::new(255).value(), Dimension::MAX);
        assert_eq!(Dimension::new(10).value(), 10);
    }

    #[test]
    fn total_sums_all_dimensions() {
        let q = QualityScore::new(20, 20, 20, 20, 20);
        assert_eq!(q.total(), 100);
    }

    #[test]
    fn tier_thresholds_match_spec_bands() {
        assert_eq!(
            QualityScore::new(10, 10, 10, 10, 5).highest_clearable_tier(),
            Some(EnvironmentTier::Dev)
        );
        assert_eq!(
            QualityScore::new(15, 15, 10, 10, 10).highest_clearable_tier(),
            Some(EnvironmentTier::Staging)
        );
        assert_eq!(
            QualityScore::new(20, 20, 16, 12, 12).highest_clearable_tier(),
            Some(EnvironmentTier::Prod)
        );
        assert_eq!(
            QualityScore::new(20, 20, 20, 19, 16).highest_clearable_tier(),
            Some(EnvironmentTier::ProdBulk)
        );
        assert_eq!(QualityScore::new(5, 5, 5, 5, 5).highest_clearable_tier(), None);
    }

    #[test]
    fn clears_is_monotonic_with_tier_ordering() {
        let q = QualityScore::new(20, 20, 16, 12, 12); // prod tier
        assert!(q.clears(EnvironmentTier::Dev));
        assert!(q.clears(EnvironmentTier::Staging));
        assert!(q.clears(EnvironmentTier::Prod));
        assert!(!q.clears(EnvironmentTier::ProdBulk));
    }
}
