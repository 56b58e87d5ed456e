//! Unified violations and the severity → outcome mapping

use crate::domain::Domain;
use crate::tag::Tag;
use censor_core::{Decision, FinalOutcome, Reason, ReplacePolicy, RiskLevel};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ops::Deref;

/// A platform-agnostic violation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedViolation {
    /// High-level category
    pub domain: Domain,

    /// Specific tags
    #[serde(default)]
    pub tags: Vec<Tag>,

    pub severity: RiskLevel,

    /// Confidence in [0, 1]
    pub confidence: f64,

    /// Providers that detected this
    #[serde(default)]
    pub source_providers: Vec<String>,

    /// Labels as reported by those providers
    #[serde(default)]
    pub original_labels: Vec<String>,
}

impl UnifiedViolation {
    pub fn new(domain: Domain, severity: RiskLevel, confidence: f64) -> Self {
        Self {
            domain,
            tags: Vec::new(),
            severity,
            confidence,
            source_providers: Vec::new(),
            original_labels: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }
}

/// A collection of unified violations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnifiedList(Vec<UnifiedViolation>);

impl UnifiedList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, violation: UnifiedViolation) {
        self.0.push(violation);
    }

    pub fn into_vec(self) -> Vec<UnifiedViolation> {
        self.0
    }

    /// Highest severity, `Low` for an empty list
    pub fn highest_severity(&self) -> RiskLevel {
        self.0
            .iter()
            .map(|v| v.severity)
            .max()
            .unwrap_or(RiskLevel::Low)
    }

    /// Distinct domains in first-seen order
    pub fn domains(&self) -> Vec<Domain> {
        let mut seen = HashSet::new();
        self.0
            .iter()
            .filter(|v| seen.insert(v.domain))
            .map(|v| v.domain)
            .collect()
    }

    /// Distinct tags in first-seen order
    pub fn all_tags(&self) -> Vec<Tag> {
        let mut seen = HashSet::new();
        self.0
            .iter()
            .flat_map(|v| v.tags.iter())
            .filter(|t| seen.insert((*t).clone()))
            .cloned()
            .collect()
    }

    pub fn has_domain(&self, domain: Domain) -> bool {
        self.0.iter().any(|v| v.domain == domain)
    }

    pub fn has_severity_at_least(&self, level: RiskLevel) -> bool {
        self.0.iter().any(|v| v.severity >= level)
    }

    pub fn filter(&self, predicate: impl Fn(&UnifiedViolation) -> bool) -> UnifiedList {
        self.0.iter().filter(|v| predicate(v)).cloned().collect()
    }

    /// Reduce the list to an outcome.
    ///
    /// Severe → block/none, high → block/default, medium → review/mask,
    /// low → review/none. An empty list passes.
    pub fn decide_outcome(&self) -> FinalOutcome {
        if self.0.is_empty() {
            return FinalOutcome {
                decision: Decision::Pass,
                replace_policy: ReplacePolicy::None,
                risk_level: RiskLevel::Low,
                ..Default::default()
            };
        }

        let highest = self.highest_severity();
        let (decision, replace_policy) = match highest {
            RiskLevel::Severe => (Decision::Block, ReplacePolicy::None),
            RiskLevel::High => (Decision::Block, ReplacePolicy::Default),
            RiskLevel::Medium => (Decision::Review, ReplacePolicy::Mask),
            RiskLevel::Low => (Decision::Review, ReplacePolicy::None),
        };

        let reasons = self
            .0
            .iter()
            .map(|v| Reason {
                code: v.domain.as_str().to_string(),
                message: v.domain.info().description.to_string(),
                hit_tags: v.tags.iter().map(|t| t.as_str().to_string()).collect(),
                ..Default::default()
            })
            .collect();

        FinalOutcome {
            decision,
            replace_policy,
            replace_value: String::new(),
            reasons,
            risk_level: highest,
        }
    }
}

impl Deref for UnifiedList {
    type Target = [UnifiedViolation];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<UnifiedViolation>> for UnifiedList {
    fn from(v: Vec<UnifiedViolation>) -> Self {
        Self(v)
    }
}

impl FromIterator<UnifiedViolation> for UnifiedList {
    fn from_iter<I: IntoIterator<Item = UnifiedViolation>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for UnifiedList {
    type Item = UnifiedViolation;
    type IntoIter = std::vec::IntoIter<UnifiedViolation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a UnifiedList {
    type Item = &'a UnifiedViolation;
    type IntoIter = std::slice::Iter<'a, UnifiedViolation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(levels: &[(Domain, RiskLevel)]) -> UnifiedList {
        levels
            .iter()
            .map(|(d, s)| UnifiedViolation::new(*d, *s, 0.9))
            .collect()
    }

    #[test]
    fn test_empty_list_passes() {
        let outcome = UnifiedList::new().decide_outcome();
        assert_eq!(outcome.decision, Decision::Pass);
        assert_eq!(outcome.replace_policy, ReplacePolicy::None);
        assert_eq!(outcome.risk_level, RiskLevel::Low);
        assert!(outcome.reasons.is_empty());
    }

    #[test]
    fn test_severity_mapping() {
        let cases = [
            (RiskLevel::Severe, Decision::Block, ReplacePolicy::None),
            (RiskLevel::High, Decision::Block, ReplacePolicy::Default),
            (RiskLevel::Medium, Decision::Review, ReplacePolicy::Mask),
            (RiskLevel::Low, Decision::Review, ReplacePolicy::None),
        ];
        for (level, decision, policy) in cases {
            let outcome = list(&[(Domain::Spam, RiskLevel::Low), (Domain::Fraud, level)])
                .decide_outcome();
            assert_eq!(outcome.decision, decision, "level {level}");
            assert_eq!(outcome.replace_policy, policy, "level {level}");
            assert_eq!(outcome.risk_level, level.max(RiskLevel::Low));
        }
    }

    #[test]
    fn test_reasons_carry_domain_and_tags() {
        let violations: UnifiedList = vec![UnifiedViolation::new(
            Domain::Pornography,
            RiskLevel::Severe,
            0.95,
        )
        .with_tags([Tag::NUDITY])]
        .into();
        let outcome = violations.decide_outcome();
        assert_eq!(outcome.reasons.len(), 1);
        assert_eq!(outcome.reasons[0].code, "pornography");
        assert_eq!(outcome.reasons[0].message, "Sexually explicit content");
        assert_eq!(outcome.reasons[0].hit_tags, vec!["nudity"]);
    }

    #[test]
    fn test_list_helpers() {
        let mut violations = list(&[
            (Domain::Ads, RiskLevel::Low),
            (Domain::Politics, RiskLevel::High),
            (Domain::Ads, RiskLevel::Medium),
        ]);
        violations.push(
            UnifiedViolation::new(Domain::Spam, RiskLevel::Low, 0.5)
                .with_tags([Tag::SPAM_ADS, Tag::SPAM_LINK]),
        );

        assert_eq!(violations.highest_severity(), RiskLevel::High);
        assert_eq!(
            violations.domains(),
            vec![Domain::Ads, Domain::Politics, Domain::Spam]
        );
        assert_eq!(violations.all_tags(), vec![Tag::SPAM_ADS, Tag::SPAM_LINK]);
        assert!(violations.has_domain(Domain::Politics));
        assert!(!violations.has_domain(Domain::Drugs));
        assert!(violations.has_severity_at_least(RiskLevel::High));
        assert!(!violations.has_severity_at_least(RiskLevel::Severe));
        assert_eq!(violations.filter(|v| v.domain == Domain::Ads).len(), 2);
    }
}
