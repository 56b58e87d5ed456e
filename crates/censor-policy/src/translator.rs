//! Provider label translation
//!
//! Every provider speaks its own label vocabulary. A [`Translator`] maps
//! those labels onto [`UnifiedViolation`]s, adjusting severity for the
//! business context the content came from.

use crate::domain::Domain;
use crate::tag::Tag;
use crate::violation::{UnifiedList, UnifiedViolation};
use censor_core::{BizType, Error, ResourceType, Result, RiskLevel};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Context for translating provider results
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranslationContext {
    pub resource_type: Option<ResourceType>,
    pub biz_type: Option<BizType>,
}

impl TranslationContext {
    pub fn new(resource_type: ResourceType, biz_type: BizType) -> Self {
        Self {
            resource_type: Some(resource_type),
            biz_type: Some(biz_type),
        }
    }
}

/// Translates provider-specific labels into unified violations
pub trait Translator: Send + Sync {
    /// Provider this translator handles
    fn provider(&self) -> &str;

    /// Convert labels (with optional per-label scores) to violations
    fn translate(
        &self,
        ctx: &TranslationContext,
        labels: &[String],
        scores: &HashMap<String, f64>,
    ) -> UnifiedList;
}

/// How one provider label maps onto the unified model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelMapping {
    pub domain: Domain,

    #[serde(default)]
    pub tags: Vec<Tag>,

    pub severity: RiskLevel,

    /// Used when the provider reports no score
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    0.9
}

impl LabelMapping {
    pub fn new(domain: Domain, severity: RiskLevel) -> Self {
        Self {
            domain,
            tags: Vec::new(),
            severity,
            confidence: default_confidence(),
        }
    }

    pub fn with_tags(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }
}

/// Label-map driven translator
#[derive(Debug, Clone)]
pub struct BaseTranslator {
    provider: String,
    label_map: HashMap<String, LabelMapping>,
}

impl BaseTranslator {
    pub fn new(provider: impl Into<String>, label_map: HashMap<String, LabelMapping>) -> Self {
        Self {
            provider: provider.into(),
            label_map,
        }
    }

    /// Add or replace one mapping
    pub fn with_mapping(mut self, label: impl Into<String>, mapping: LabelMapping) -> Self {
        self.label_map.insert(label.into(), mapping);
        self
    }

    /// Load a label map from YAML (`label: {domain, tags, severity, confidence}`)
    pub fn from_yaml(provider: impl Into<String>, yaml: &str) -> Result<Self> {
        let label_map: HashMap<String, LabelMapping> = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Failed to parse label map: {}", e)))?;
        Ok(Self::new(provider, label_map))
    }

    /// Load a label map from a YAML file
    pub fn from_file(provider: impl Into<String>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read label map {}: {}", path.display(), e))
        })?;
        Self::from_yaml(provider, &content)
    }

    pub fn mapping(&self, label: &str) -> Option<&LabelMapping> {
        self.label_map.get(label)
    }

    pub fn label_map(&self) -> &HashMap<String, LabelMapping> {
        &self.label_map
    }

    fn adjust_severity(base: RiskLevel, ctx: &TranslationContext) -> RiskLevel {
        let Some(biz_type) = &ctx.biz_type else {
            return base;
        };
        // Profile fields are stricter, real-time messages more lenient
        if (*biz_type == BizType::USER_NICKNAME
            || *biz_type == BizType::USER_AVATAR
            || *biz_type == BizType::USER_BIO)
            && base == RiskLevel::Medium
        {
            return RiskLevel::High;
        }
        if (*biz_type == BizType::CHAT_MESSAGE || *biz_type == BizType::DANMAKU)
            && base == RiskLevel::High
        {
            return RiskLevel::Medium;
        }
        base
    }
}

impl Translator for BaseTranslator {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn translate(
        &self,
        ctx: &TranslationContext,
        labels: &[String],
        scores: &HashMap<String, f64>,
    ) -> UnifiedList {
        labels
            .iter()
            .map(|label| match self.label_map.get(label) {
                None => UnifiedViolation {
                    domain: Domain::Other,
                    tags: vec![Tag::CUSTOM],
                    severity: RiskLevel::Low,
                    confidence: 0.5,
                    source_providers: vec![self.provider.clone()],
                    original_labels: vec![label.clone()],
                },
                Some(mapping) => UnifiedViolation {
                    domain: mapping.domain,
                    tags: mapping.tags.clone(),
                    severity: Self::adjust_severity(mapping.severity, ctx),
                    confidence: scores.get(label).copied().unwrap_or(mapping.confidence),
                    source_providers: vec![self.provider.clone()],
                    original_labels: vec![label.clone()],
                },
            })
            .collect()
    }
}

/// Merge violation lists from several providers by domain.
///
/// Per domain: highest severity and confidence win; tags, providers, and
/// labels are unioned. Domains keep first-seen order.
pub fn merge_violations<'a>(lists: impl IntoIterator<Item = &'a UnifiedList>) -> UnifiedList {
    let mut merged: Vec<UnifiedViolation> = Vec::new();

    for violation in lists.into_iter().flatten() {
        match merged.iter_mut().find(|m| m.domain == violation.domain) {
            Some(existing) => {
                existing.severity = existing.severity.max(violation.severity);
                if violation.confidence > existing.confidence {
                    existing.confidence = violation.confidence;
                }
                union_into(&mut existing.tags, &violation.tags);
                union_into(&mut existing.source_providers, &violation.source_providers);
                union_into(&mut existing.original_labels, &violation.original_labels);
            }
            None => merged.push(violation.clone()),
        }
    }

    merged.into()
}

fn union_into<T: PartialEq + Clone>(into: &mut Vec<T>, from: &[T]) {
    for item in from {
        if !into.contains(item) {
            into.push(item.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn translator() -> BaseTranslator {
        BaseTranslator::new("aliyun", HashMap::new())
            .with_mapping(
                "porn",
                LabelMapping::new(Domain::Pornography, RiskLevel::Severe)
                    .with_tags([Tag::NUDITY]),
            )
            .with_mapping(
                "abuse",
                LabelMapping::new(Domain::Abuse, RiskLevel::High),
            )
            .with_mapping(
                "ad",
                LabelMapping::new(Domain::Ads, RiskLevel::Medium).with_tags([Tag::SPAM_ADS]),
            )
    }

    fn labels(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_translate_known_and_unknown() {
        let t = translator();
        let out = t.translate(
            &TranslationContext::default(),
            &labels(&["porn", "mystery"]),
            &HashMap::new(),
        );
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].domain, Domain::Pornography);
        assert_eq!(out[0].confidence, 0.9);
        assert_eq!(out[0].source_providers, vec!["aliyun"]);

        assert_eq!(out[1].domain, Domain::Other);
        assert_eq!(out[1].tags, vec![Tag::CUSTOM]);
        assert_eq!(out[1].severity, RiskLevel::Low);
        assert_eq!(out[1].confidence, 0.5);
        assert_eq!(out[1].original_labels, vec!["mystery"]);
    }

    #[test]
    fn test_score_overrides_confidence() {
        let scores = HashMap::from([("porn".to_string(), 0.42)]);
        let out = translator().translate(&TranslationContext::default(), &labels(&["porn"]), &scores);
        assert_eq!(out[0].confidence, 0.42);
    }

    #[test]
    fn test_context_adjustment() {
        let t = translator();
        let none = HashMap::new();

        let profile = TranslationContext::new(ResourceType::Text, BizType::USER_NICKNAME);
        assert_eq!(t.translate(&profile, &labels(&["ad"]), &none)[0].severity, RiskLevel::High);

        let chat = TranslationContext::new(ResourceType::Text, BizType::DANMAKU);
        assert_eq!(t.translate(&chat, &labels(&["abuse"]), &none)[0].severity, RiskLevel::Medium);
        assert_eq!(t.translate(&chat, &labels(&["porn"]), &none)[0].severity, RiskLevel::Severe);

        let body = TranslationContext::new(ResourceType::Text, BizType::NOTE_BODY);
        assert_eq!(t.translate(&body, &labels(&["abuse"]), &none)[0].severity, RiskLevel::High);
    }

    #[test]
    fn test_merge_violations_by_domain() {
        let a: UnifiedList = vec![UnifiedViolation {
            domain: Domain::Ads,
            tags: vec![Tag::SPAM_ADS],
            severity: RiskLevel::Low,
            confidence: 0.7,
            source_providers: vec!["aliyun".into()],
            original_labels: vec!["ad".into()],
        }]
        .into();
        let b: UnifiedList = vec![
            UnifiedViolation {
                domain: Domain::Ads,
                tags: vec![Tag::SPAM_LINK, Tag::SPAM_ADS],
                severity: RiskLevel::Medium,
                confidence: 0.6,
                source_providers: vec!["huawei".into()],
                original_labels: vec!["ad".into()],
            },
            UnifiedViolation::new(Domain::Politics, RiskLevel::High, 0.8),
        ]
        .into();

        let merged = merge_violations([&a, &b]);
        assert_eq!(merged.len(), 2);
        let ads = &merged[0];
        assert_eq!(ads.severity, RiskLevel::Medium);
        assert_eq!(ads.confidence, 0.7);
        assert_eq!(ads.tags, vec![Tag::SPAM_ADS, Tag::SPAM_LINK]);
        assert_eq!(ads.source_providers, vec!["aliyun", "huawei"]);
        assert_eq!(ads.original_labels, vec!["ad"]);
        assert_eq!(merged[1].domain, Domain::Politics);
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
porn:
  domain: pornography
  tags: [nudity]
  severity: severe
terror:
  domain: terrorism
  severity: severe
  confidence: 0.99
"#;
        let t = BaseTranslator::from_yaml("huawei", yaml).unwrap();
        assert_eq!(t.provider(), "huawei");
        assert_eq!(t.mapping("porn").unwrap().tags, vec![Tag::NUDITY]);
        assert_eq!(t.mapping("porn").unwrap().confidence, 0.9);
        assert_eq!(t.mapping("terror").unwrap().confidence, 0.99);

        assert!(BaseTranslator::from_yaml("huawei", "porn: 42").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.yaml");
        std::fs::write(&path, "spam:\n  domain: spam\n  severity: low\n").unwrap();
        let t = BaseTranslator::from_file("local", &path).unwrap();
        assert_eq!(t.mapping("spam").unwrap().domain, Domain::Spam);

        assert!(BaseTranslator::from_file("local", dir.path().join("missing.yaml")).is_err());
    }
}
