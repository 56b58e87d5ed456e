//! Detection scenes and provider scene capabilities

use crate::domain::Domain;
use censor_core::ResourceType;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// What a business type wants detected, independent of provider vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnifiedScene {
    // Basic compliance
    Pornography,
    Terrorism,
    Politics,
    Violence,
    Ban,

    // Community governance
    Abuse,
    HateSpeech,
    Harassment,

    // Platform security
    Ads,
    Spam,
    Fraud,
    Privacy,

    // Content quality
    Meaningless,
    Flood,

    // Special
    Minor,
    Moan,
    #[serde(rename = "qrcode")]
    QrCode,
    ImageText,
    Custom,
    AdLaw,
    PublicFigure,
}

/// Metadata about a scene
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneInfo {
    pub scene: UnifiedScene,
    /// Chinese display name
    pub name: &'static str,
    pub name_en: &'static str,
    pub description: &'static str,
    /// Related violation domains
    pub domains: &'static [Domain],
}

impl UnifiedScene {
    pub const ALL: [UnifiedScene; 21] = [
        UnifiedScene::Pornography,
        UnifiedScene::Terrorism,
        UnifiedScene::Politics,
        UnifiedScene::Violence,
        UnifiedScene::Ban,
        UnifiedScene::Abuse,
        UnifiedScene::HateSpeech,
        UnifiedScene::Harassment,
        UnifiedScene::Ads,
        UnifiedScene::Spam,
        UnifiedScene::Fraud,
        UnifiedScene::Privacy,
        UnifiedScene::Meaningless,
        UnifiedScene::Flood,
        UnifiedScene::Minor,
        UnifiedScene::Moan,
        UnifiedScene::QrCode,
        UnifiedScene::ImageText,
        UnifiedScene::Custom,
        UnifiedScene::AdLaw,
        UnifiedScene::PublicFigure,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pornography => "pornography",
            Self::Terrorism => "terrorism",
            Self::Politics => "politics",
            Self::Violence => "violence",
            Self::Ban => "ban",
            Self::Abuse => "abuse",
            Self::HateSpeech => "hate_speech",
            Self::Harassment => "harassment",
            Self::Ads => "ads",
            Self::Spam => "spam",
            Self::Fraud => "fraud",
            Self::Privacy => "privacy",
            Self::Meaningless => "meaningless",
            Self::Flood => "flood",
            Self::Minor => "minor",
            Self::Moan => "moan",
            Self::QrCode => "qrcode",
            Self::ImageText => "image_text",
            Self::Custom => "custom",
            Self::AdLaw => "ad_law",
            Self::PublicFigure => "public_figure",
        }
    }

    pub fn parse(name: &str) -> Option<UnifiedScene> {
        Self::ALL.iter().copied().find(|s| s.as_str() == name)
    }

    /// Registry entry; scenes without a domain mapping have none
    pub fn info(&self) -> Option<SceneInfo> {
        use Domain as D;
        let (name, name_en, description, domains): (_, _, _, &'static [Domain]) = match self {
            Self::Pornography => (
                "色情检测",
                "Pornography Detection",
                "检测色情、性感违规内容",
                &[D::Pornography, D::SexualHint],
            ),
            Self::Terrorism => ("暴恐检测", "Terrorism Detection", "检测暴力恐怖相关内容", &[D::Terrorism]),
            Self::Politics => ("涉政检测", "Politics Detection", "检测政治敏感内容", &[D::Politics]),
            Self::Violence => ("暴力检测", "Violence Detection", "检测暴力血腥内容", &[D::Violence]),
            Self::Ban => ("违禁检测", "Contraband Detection", "检测违禁物品和内容", &[D::Illegal]),
            Self::Abuse => (
                "辱骂检测",
                "Abuse Detection",
                "检测辱骂、攻击性内容",
                &[D::Abuse, D::Harassment],
            ),
            Self::Ads => ("广告检测", "Ads Detection", "检测广告推广内容", &[D::Ads, D::Spam]),
            Self::Spam => ("垃圾检测", "Spam Detection", "检测垃圾信息和刷屏内容", &[D::Spam]),
            Self::Fraud => ("诈骗检测", "Fraud Detection", "检测诈骗、钓鱼内容", &[D::Fraud, D::Scam]),
            Self::Privacy => ("隐私检测", "Privacy Detection", "检测隐私信息泄露", &[D::AccountRisk]),
            Self::Meaningless => (
                "无意义检测",
                "Meaningless Detection",
                "检测无意义、乱码内容",
                &[D::Spam],
            ),
            Self::Minor => (
                "未成年人检测",
                "Minor Safety Detection",
                "检测涉及未成年人的不当内容",
                &[D::MinorSafety],
            ),
            Self::Moan => ("娇喘检测", "Moan Detection", "检测娇喘等音频内容", &[D::SexualHint]),
            Self::QrCode => ("二维码检测", "QR Code Detection", "检测二维码内容", &[D::Spam, D::Ads]),
            Self::ImageText => (
                "图文检测",
                "Image Text Detection",
                "检测图片中的文字违规内容",
                &[D::Other],
            ),
            Self::HateSpeech
            | Self::Harassment
            | Self::Flood
            | Self::Custom
            | Self::AdLaw
            | Self::PublicFigure => return None,
        };
        Some(SceneInfo {
            scene: *self,
            name,
            name_en,
            description,
            domains,
        })
    }

    /// Related domains; empty for scenes without a registry entry
    pub fn domains(&self) -> &'static [Domain] {
        self.info().map(|i| i.domains).unwrap_or(&[])
    }
}

impl fmt::Display for UnifiedScene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a provider can detect, per resource type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneCapability {
    pub provider: String,

    #[serde(default)]
    pub supported_scenes: HashMap<ResourceType, Vec<UnifiedScene>>,

    /// Max text length per request, 0 for unlimited
    #[serde(default)]
    pub max_text_length: usize,

    #[serde(default)]
    pub sync_supported: bool,

    #[serde(default)]
    pub async_supported: bool,
}

impl SceneCapability {
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            ..Default::default()
        }
    }

    pub fn with_scenes(
        mut self,
        resource_type: ResourceType,
        scenes: impl IntoIterator<Item = UnifiedScene>,
    ) -> Self {
        self.supported_scenes
            .entry(resource_type)
            .or_default()
            .extend(scenes);
        self
    }

    pub fn with_max_text_length(mut self, len: usize) -> Self {
        self.max_text_length = len;
        self
    }

    pub fn with_sync(mut self, supported: bool) -> Self {
        self.sync_supported = supported;
        self
    }

    pub fn with_async(mut self, supported: bool) -> Self {
        self.async_supported = supported;
        self
    }

    fn supported_set(&self, resource_type: ResourceType) -> HashSet<UnifiedScene> {
        self.supported_scenes
            .get(&resource_type)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Whether every requested scene is supported for the resource type
    pub fn can_handle(&self, scenes: &[UnifiedScene], resource_type: ResourceType) -> bool {
        let supported = self.supported_set(resource_type);
        scenes.iter().all(|s| supported.contains(s))
    }

    /// Requested scenes that are not supported, in request order
    pub fn missing_scenes(
        &self,
        scenes: &[UnifiedScene],
        resource_type: ResourceType,
    ) -> Vec<UnifiedScene> {
        let supported = self.supported_set(resource_type);
        scenes
            .iter()
            .copied()
            .filter(|s| !supported.contains(s))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_domains() {
        assert_eq!(
            UnifiedScene::Pornography.domains(),
            &[Domain::Pornography, Domain::SexualHint]
        );
        assert_eq!(UnifiedScene::QrCode.domains(), &[Domain::Spam, Domain::Ads]);
        assert!(UnifiedScene::Flood.domains().is_empty());
        assert_eq!(UnifiedScene::Ban.info().unwrap().name, "违禁检测");
    }

    #[test]
    fn test_scene_serde_names() {
        assert_eq!(serde_json::to_string(&UnifiedScene::QrCode).unwrap(), "\"qrcode\"");
        assert_eq!(
            serde_json::to_string(&UnifiedScene::PublicFigure).unwrap(),
            "\"public_figure\""
        );
        for scene in UnifiedScene::ALL {
            let json = serde_json::to_string(&scene).unwrap();
            assert_eq!(json, format!("\"{}\"", scene.as_str()));
        }
    }

    #[test]
    fn test_missing_scenes() {
        let cap = SceneCapability::new("local")
            .with_scenes(
                ResourceType::Text,
                [UnifiedScene::Pornography, UnifiedScene::Politics],
            )
            .with_sync(true);

        let wanted = [
            UnifiedScene::Pornography,
            UnifiedScene::Abuse,
            UnifiedScene::Politics,
            UnifiedScene::Ads,
        ];
        assert!(!cap.can_handle(&wanted, ResourceType::Text));
        assert_eq!(
            cap.missing_scenes(&wanted, ResourceType::Text),
            vec![UnifiedScene::Abuse, UnifiedScene::Ads]
        );
        assert!(cap.can_handle(&wanted[..1], ResourceType::Text));
        assert_eq!(cap.missing_scenes(&wanted[..1], ResourceType::Image).len(), 1);
    }
}
