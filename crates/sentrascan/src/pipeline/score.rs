//! Risk scoring.
//!
//! Pure and stateless; the formula is shared with previously persisted scan
//! results, so the arithmetic (including integer truncation) must not change.

use serde::{Deserialize, Serialize};

use crate::agent::ExposureLevel;

/// Computed sensitivity tier of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskTier {
    Critical,
    High,
    Medium,
    Low,
    Minimal,
}

impl RiskTier {
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 80 => RiskTier::Critical,
            s if s >= 60 => RiskTier::High,
            s if s >= 40 => RiskTier::Medium,
            s if s >= 10 => RiskTier::Low,
            _ => RiskTier::Minimal,
        }
    }

    /// Ordering used for folder highest-risk rollups.
    pub fn priority(&self) -> u8 {
        match self {
            RiskTier::Critical => 5,
            RiskTier::High => 4,
            RiskTier::Medium => 3,
            RiskTier::Low => 2,
            RiskTier::Minimal => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Critical => "CRITICAL",
            RiskTier::High => "HIGH",
            RiskTier::Medium => "MEDIUM",
            RiskTier::Low => "LOW",
            RiskTier::Minimal => "MINIMAL",
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of [`assess_risk`], persisted alongside each scan result.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RiskAssessment {
    pub risk_score: u32,
    pub risk_tier: RiskTier,
    pub content_score: u32,
    pub exposure_multiplier: f64,
}

fn exposure_multiplier(exposure: Option<ExposureLevel>) -> f64 {
    match exposure {
        Some(ExposureLevel::Private) | None => 1.0,
        Some(ExposureLevel::Internal) => 1.2,
        Some(ExposureLevel::OrgWide) => 1.5,
        Some(ExposureLevel::Public) => 2.0,
    }
}

/// Scores a file from its entity total and exposure level.
///
/// `content_score = min(total_entities * 10, 100)`, scaled by the exposure
/// multiplier and truncated, capped at 100.
pub fn assess_risk(total_entities: usize, exposure: Option<ExposureLevel>) -> RiskAssessment {
    let content_score = (total_entities as u32).saturating_mul(10).min(100);
    let multiplier = exposure_multiplier(exposure);
    let risk_score = ((f64::from(content_score) * multiplier) as u32).min(100);

    RiskAssessment {
        risk_score,
        risk_tier: RiskTier::from_score(risk_score),
        content_score,
        exposure_multiplier: multiplier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_entities_is_minimal_for_any_exposure() {
        for exposure in [
            None,
            Some(ExposureLevel::Private),
            Some(ExposureLevel::Internal),
            Some(ExposureLevel::OrgWide),
            Some(ExposureLevel::Public),
        ] {
            let risk = assess_risk(0, exposure);
            assert_eq!(risk.risk_score, 0);
            assert_eq!(risk.risk_tier, RiskTier::Minimal);
        }
    }

    #[test]
    fn test_public_exposure_caps_at_100() {
        let risk = assess_risk(10, Some(ExposureLevel::Public));
        assert_eq!(risk.content_score, 100);
        assert_eq!(risk.exposure_multiplier, 2.0);
        assert_eq!(risk.risk_score, 100);
        assert_eq!(risk.risk_tier, RiskTier::Critical);
    }

    #[test]
    fn test_internal_boundary_is_high() {
        let risk = assess_risk(5, Some(ExposureLevel::Internal));
        assert_eq!(risk.content_score, 50);
        assert_eq!(risk.risk_score, 60);
        assert_eq!(risk.risk_tier, RiskTier::High);
    }

    #[test]
    fn test_single_entity_private_is_low() {
        let risk = assess_risk(1, Some(ExposureLevel::Private));
        assert_eq!(risk.risk_score, 10);
        assert_eq!(risk.risk_tier, RiskTier::Low);
    }

    #[test]
    fn test_org_wide_multiplier() {
        let risk = assess_risk(3, Some(ExposureLevel::OrgWide));
        assert_eq!(risk.content_score, 30);
        assert_eq!(risk.risk_score, 45);
        assert_eq!(risk.risk_tier, RiskTier::Medium);
    }

    #[test]
    fn test_unknown_exposure_defaults_to_private() {
        assert_eq!(
            assess_risk(4, None).risk_score,
            assess_risk(4, Some(ExposureLevel::Private)).risk_score
        );
    }

    #[test]
    fn test_tier_thresholds_inclusive() {
        assert_eq!(RiskTier::from_score(80), RiskTier::Critical);
        assert_eq!(RiskTier::from_score(79), RiskTier::High);
        assert_eq!(RiskTier::from_score(60), RiskTier::High);
        assert_eq!(RiskTier::from_score(59), RiskTier::Medium);
        assert_eq!(RiskTier::from_score(40), RiskTier::Medium);
        assert_eq!(RiskTier::from_score(39), RiskTier::Low);
        assert_eq!(RiskTier::from_score(10), RiskTier::Low);
        assert_eq!(RiskTier::from_score(9), RiskTier::Minimal);
    }

    #[test]
    fn test_tier_priority_ordering() {
        assert!(RiskTier::Critical.priority() > RiskTier::High.priority());
        assert!(RiskTier::High.priority() > RiskTier::Medium.priority());
        assert!(RiskTier::Medium.priority() > RiskTier::Low.priority());
        assert!(RiskTier::Low.priority() > RiskTier::Minimal.priority());
    }
}
