//! Local keyword provider
//!
//! Matches text against configured keywords with an Aho-Corasick automaton
//! and answers synchronously. Each hit is reported with its byte span so
//! merged submissions can be traced back to the originating fragment.

use crate::provider::{
    CallbackData, Capability, Provider, QueryResponse, SubmitRequest, SubmitResponse,
};
use aho_corasick::{AhoCorasick, MatchKind};
use async_trait::async_trait;
use censor_core::{Decision, Error, Mode, Reason, ResourceType, Result, ReviewResult, RiskLevel};
use censor_policy::{
    BaseTranslator, LabelMapping, SceneCapability, TranslationContext, Translator, UnifiedScene,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// One keyword and the label reported when it matches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub keyword: String,
    pub label: String,
}

impl KeywordRule {
    pub fn new(keyword: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            keyword: keyword.into(),
            label: label.into(),
        }
    }
}

/// Keyword provider configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordConfig {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default)]
    pub rules: Vec<KeywordRule>,

    /// Label → violation mapping; unmapped labels are low-risk "other"
    #[serde(default)]
    pub labels: HashMap<String, LabelMapping>,

    /// Scenes the keyword list is meant to cover
    #[serde(default = "default_scenes")]
    pub scenes: Vec<UnifiedScene>,
}

fn default_name() -> String {
    "keyword".to_string()
}

fn default_scenes() -> Vec<UnifiedScene> {
    UnifiedScene::ALL.to_vec()
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            rules: Vec::new(),
            labels: HashMap::new(),
            scenes: default_scenes(),
        }
    }
}

impl KeywordConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Failed to parse keyword config: {}", e)))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Failed to read keyword config {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn with_rule(mut self, keyword: impl Into<String>, label: impl Into<String>) -> Self {
        self.rules.push(KeywordRule::new(keyword, label));
        self
    }

    pub fn with_label(mut self, label: impl Into<String>, mapping: LabelMapping) -> Self {
        self.labels.insert(label.into(), mapping);
        self
    }
}

/// Synchronous keyword matcher
pub struct KeywordProvider {
    name: String,
    matcher: AhoCorasick,
    rules: Vec<KeywordRule>,
    scenes: Vec<UnifiedScene>,
    translator: Arc<BaseTranslator>,
}

impl KeywordProvider {
    pub fn new(config: KeywordConfig) -> Result<Self> {
        let patterns: Vec<&str> = config.rules.iter().map(|r| r.keyword.as_str()).collect();
        let matcher = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::LeftmostLongest)
            .build(&patterns)
            .map_err(|e| Error::config(format!("Failed to build keyword matcher: {}", e)))?;

        let translator = BaseTranslator::new(config.name.clone(), config.labels);

        Ok(Self {
            name: config.name,
            matcher,
            rules: config.rules,
            scenes: config.scenes,
            translator: Arc::new(translator),
        })
    }

    /// Provider with `(keyword, label)` rules and no label mappings
    pub fn from_rules(rules: Vec<(String, String)>) -> Result<Self> {
        Self::new(KeywordConfig {
            rules: rules
                .into_iter()
                .map(|(keyword, label)| KeywordRule { keyword, label })
                .collect(),
            ..KeywordConfig::default()
        })
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Reasons for every keyword hit, in text order
    pub fn scan(&self, text: &str) -> Vec<Reason> {
        self.matcher
            .find_iter(text)
            .map(|m| {
                let rule = &self.rules[m.pattern().as_usize()];
                let matched = &text[m.start()..m.end()];
                Reason::new(rule.label.clone(), format!("matched keyword \"{}\"", rule.keyword))
                    .with_provider(self.name.clone())
                    .with_hit_tags([matched])
                    .with_raw("start_position", json!(m.start()))
                    .with_raw("end_position", json!(m.end()))
                    .with_raw("keywords", json!([matched]))
            })
            .collect()
    }

    fn decide(&self, ctx: &TranslationContext, reasons: &[Reason]) -> Decision {
        if reasons.is_empty() {
            return Decision::Pass;
        }
        let labels: Vec<String> = reasons.iter().map(|r| r.code.clone()).collect();
        let violations = self.translator.translate(ctx, &labels, &HashMap::new());
        if violations.highest_severity() >= RiskLevel::High {
            Decision::Block
        } else {
            Decision::Review
        }
    }
}

#[async_trait]
impl Provider for KeywordProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![Capability::new(ResourceType::Text, [Mode::Sync])]
    }

    fn scene_capability(&self) -> SceneCapability {
        SceneCapability::new(self.name.clone())
            .with_scenes(ResourceType::Text, self.scenes.iter().copied())
            .with_sync(true)
    }

    fn translate_scenes(&self, scenes: &[UnifiedScene], _resource_type: ResourceType) -> Vec<String> {
        scenes.iter().map(|s| s.as_str().to_string()).collect()
    }

    async fn submit(&self, req: SubmitRequest) -> Result<SubmitResponse> {
        if req.resource.resource_type != ResourceType::Text {
            return Err(Error::UnsupportedType(req.resource.resource_type.to_string()));
        }

        let reasons = self.scan(&req.resource.content_text);
        let ctx = TranslationContext::new(req.resource.resource_type, req.biz.biz_type.clone());
        let decision = self.decide(&ctx, &reasons);
        debug!(
            provider = %self.name,
            resource_id = %req.resource.resource_id,
            hits = reasons.len(),
            decision = %decision,
            "Keyword scan complete"
        );

        let result = ReviewResult::new(self.name.clone(), decision, 1.0).with_reasons(reasons);
        Ok(SubmitResponse::sync(censor_core::id::generate("kw"), result))
    }

    async fn query(&self, task_id: &str) -> Result<QueryResponse> {
        Err(Error::task_not_found(task_id))
    }

    async fn verify_callback(&self, _headers: &HashMap<String, String>, _body: &[u8]) -> Result<()> {
        Err(Error::callback_invalid(format!("{} does not send callbacks", self.name)))
    }

    async fn parse_callback(&self, _body: &[u8]) -> Result<CallbackData> {
        Err(Error::callback_invalid(format!("{} does not send callbacks", self.name)))
    }

    fn translator(&self) -> Option<Arc<dyn Translator>> {
        Some(self.translator.clone())
    }
}
