//! Per business type review requirements

use crate::scene::UnifiedScene;
use censor_core::{BizType, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Scenes a business type requires
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewRequirement {
    pub scenes: Vec<UnifiedScene>,

    /// When set, the provider must support every scene
    #[serde(default)]
    pub strict: bool,

    /// Higher is more urgent
    #[serde(default)]
    pub priority: i32,
}

impl ReviewRequirement {
    pub fn new(scenes: impl IntoIterator<Item = UnifiedScene>) -> Self {
        Self {
            scenes: scenes.into_iter().collect(),
            strict: false,
            priority: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn strict(mut self) -> Self {
        self.strict = true;
        self
    }
}

/// Immutable registry of review requirements.
///
/// Built once at startup from the built-in table plus optional overrides.
#[derive(Debug, Clone)]
pub struct ReviewRequirements {
    by_biz: HashMap<BizType, ReviewRequirement>,
    fallback: ReviewRequirement,
}

impl ReviewRequirements {
    /// Built-in requirements
    pub fn new() -> Self {
        use UnifiedScene::*;

        let table = [
            (BizType::USER_NICKNAME, ReviewRequirement::new([Pornography, Politics, Abuse, Ads])),
            (BizType::USER_AVATAR, ReviewRequirement::new([Pornography, Politics, Terrorism])),
            (
                BizType::USER_BIO,
                ReviewRequirement::new([Pornography, Politics, Abuse, Ads, Privacy]),
            ),
            (
                BizType::NOTE_TITLE,
                ReviewRequirement::new([Pornography, Politics, Abuse, Ads, Ban]),
            ),
            (
                BizType::NOTE_BODY,
                ReviewRequirement::new([
                    Pornography,
                    Politics,
                    Violence,
                    Terrorism,
                    Abuse,
                    Ads,
                    Fraud,
                    Ban,
                ]),
            ),
            (
                BizType::NOTE_IMAGES,
                ReviewRequirement::new([
                    Pornography,
                    Politics,
                    Terrorism,
                    Violence,
                    Ads,
                    QrCode,
                    ImageText,
                ]),
            ),
            (
                BizType::NOTE_VIDEOS,
                ReviewRequirement::new([Pornography, Politics, Terrorism, Violence, Moan]),
            ),
            (BizType::TEAM_NAME, ReviewRequirement::new([Pornography, Politics, Abuse])),
            (BizType::TEAM_INTRO, ReviewRequirement::new([Pornography, Politics, Abuse, Ads])),
            (BizType::TEAM_BG_IMAGE, ReviewRequirement::new([Pornography, Politics, Terrorism])),
            (
                BizType::CHAT_MESSAGE,
                ReviewRequirement::new([Pornography, Politics, Terrorism, Fraud]).with_priority(10),
            ),
            (
                BizType::DANMAKU,
                ReviewRequirement::new([Pornography, Politics, Abuse]).with_priority(10),
            ),
            (BizType::COMMENT, ReviewRequirement::new([Pornography, Politics, Abuse, Spam])),
        ];

        Self {
            by_biz: table.into_iter().collect(),
            fallback: ReviewRequirement::new([Pornography, Politics]),
        }
    }

    /// Add or replace the requirement for a business type
    pub fn with_requirement(mut self, biz_type: BizType, requirement: ReviewRequirement) -> Self {
        self.by_biz.insert(biz_type, requirement);
        self
    }

    /// Built-in requirements overridden by a YAML map of `biz_type: requirement`
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let overrides: HashMap<String, ReviewRequirement> = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("Failed to parse review requirements: {}", e)))?;
        Ok(Self::new().with_overrides(overrides))
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "Failed to read review requirements {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Apply overrides keyed by business type name
    pub fn with_overrides(mut self, overrides: HashMap<String, ReviewRequirement>) -> Self {
        for (biz_type, requirement) in overrides {
            tracing::debug!(biz_type = %biz_type, scenes = requirement.scenes.len(), "Overriding review requirement");
            self.by_biz.insert(BizType::from(biz_type), requirement);
        }
        self
    }

    /// Requirement for a business type, falling back to pornography + politics
    pub fn get(&self, biz_type: &BizType) -> &ReviewRequirement {
        self.by_biz.get(biz_type).unwrap_or(&self.fallback)
    }

    /// Required scenes for a business type
    pub fn scenes_for(&self, biz_type: &BizType) -> Vec<UnifiedScene> {
        self.get(biz_type).scenes.clone()
    }
}

impl Default for ReviewRequirements {
    fn default() -> Self {
        Self::new()
    }
}
