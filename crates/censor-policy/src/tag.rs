//! Fine-grained violation tags

use crate::domain::Domain;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// A fine-grained violation label. Providers may introduce their own.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(Cow<'static, str>);

/// Metadata about a registered tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagInfo {
    pub tag: Tag,
    pub name: &'static str,
    pub description: &'static str,
    /// Primary domain
    pub domain: Domain,
}

macro_rules! tags {
    ($($name:ident => $value:literal),* $(,)?) => {
        impl Tag {
            $(pub const $name: Tag = Tag(Cow::Borrowed($value));)*
        }
    };
}

tags! {
    NUDITY => "nudity",
    PORNOGRAPHIC_ACT => "pornographic_act",
    MINOR_SEXUAL => "minor_sexual",
    SEXUAL_TEXT => "sexual_text",

    GORE => "gore",
    WEAPON => "weapon",
    BLOOD_CONTENT => "blood_content",
    SELF_HARM => "self_harm",

    POLITICAL_SENSITIVE => "political_sensitive",
    POLITICAL_RUMOR => "political_rumor",
    POLITICAL_LEADER => "political_leader",
    POLITICAL_SYMBOL => "political_symbol",

    SCAM_IMPERSONATION => "scam_impersonation",
    FRAUD_PAYMENT => "fraud_payment",
    PHISHING => "phishing",
    FAKE_INFO => "fake_info",

    HATE_RACE => "hate_race",
    HATE_GENDER => "hate_gender",
    HATE_RELIGION => "hate_religion",
    HATE_DISABLED => "hate_disabled",

    SPAM_ADS => "spam_ads",
    SPAM_CONTACT => "spam_contact",
    SPAM_LINK => "spam_link",
    SPAM_REPEAT => "spam_repeat",

    MINOR_ABUSE => "minor_abuse",
    MINOR_EXPLOITATION => "minor_exploitation",

    DRUG_SALE => "drug_sale",
    DRUG_USE => "drug_use",
    DRUG_PROMO => "drug_promo",

    CUSTOM => "custom",
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self(Cow::Owned(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Registry entry, for tags with one
    pub fn info(&self) -> Option<TagInfo> {
        let (name, description, domain) = match self.as_str() {
            "nudity" => ("Nudity", "Nude or partially nude content", Domain::Pornography),
            "pornographic_act" => ("Pornographic Act", "Explicit sexual acts", Domain::Pornography),
            "minor_sexual" => (
                "Minor Sexual",
                "Sexual content involving minors",
                Domain::MinorSafety,
            ),
            "political_sensitive" => (
                "Political Sensitive",
                "Politically sensitive content",
                Domain::Politics,
            ),
            "hate_race" => ("Racial Hate", "Racially discriminatory content", Domain::HateSpeech),
            "spam_ads" => ("Spam Ads", "Spam advertising content", Domain::Spam),
            _ => return None,
        };
        Some(TagInfo {
            tag: self.clone(),
            name,
            description,
            domain,
        })
    }

    /// Primary domain of the tag; `Other` when unregistered
    pub fn domain(&self) -> Domain {
        self.info().map(|i| i.domain).unwrap_or(Domain::Other)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Tag {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
