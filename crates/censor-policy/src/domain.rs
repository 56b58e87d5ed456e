//! Violation domains

use censor_core::RiskLevel;
use serde::{Deserialize, Serialize};
use std::fmt;

/// High-level, platform-agnostic violation category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    // Basic compliance
    Pornography,
    SexualHint,
    Violence,
    Terrorism,
    Politics,
    Illegal,
    Fraud,
    Gambling,
    Drugs,

    // Community governance
    HateSpeech,
    Harassment,
    Abuse,
    MinorSafety,

    // Platform security
    Spam,
    Ads,
    Scam,
    AccountRisk,

    /// Fallback for anything unmapped
    #[serde(other)]
    Other,
}

/// Metadata about a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainInfo {
    pub domain: Domain,
    pub name: &'static str,
    pub description: &'static str,
    pub default_risk: RiskLevel,
}

impl Domain {
    /// Every domain, `Other` last
    pub const ALL: [Domain; 18] = [
        Domain::Pornography,
        Domain::SexualHint,
        Domain::Violence,
        Domain::Terrorism,
        Domain::Politics,
        Domain::Illegal,
        Domain::Fraud,
        Domain::Gambling,
        Domain::Drugs,
        Domain::HateSpeech,
        Domain::Harassment,
        Domain::Abuse,
        Domain::MinorSafety,
        Domain::Spam,
        Domain::Ads,
        Domain::Scam,
        Domain::AccountRisk,
        Domain::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pornography => "pornography",
            Self::SexualHint => "sexual_hint",
            Self::Violence => "violence",
            Self::Terrorism => "terrorism",
            Self::Politics => "politics",
            Self::Illegal => "illegal",
            Self::Fraud => "fraud",
            Self::Gambling => "gambling",
            Self::Drugs => "drugs",
            Self::HateSpeech => "hate_speech",
            Self::Harassment => "harassment",
            Self::Abuse => "abuse",
            Self::MinorSafety => "minor_safety",
            Self::Spam => "spam",
            Self::Ads => "ads",
            Self::Scam => "scam",
            Self::AccountRisk => "account_risk",
            Self::Other => "other",
        }
    }

    /// Parse a domain name; unknown names map to `Other`
    pub fn parse(name: &str) -> Domain {
        Self::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == name)
            .unwrap_or(Domain::Other)
    }

    pub fn info(&self) -> DomainInfo {
        let (name, description, default_risk) = match self {
            Self::Pornography => ("Pornography", "Sexually explicit content", RiskLevel::Severe),
            Self::SexualHint => (
                "Sexual Hint",
                "Suggestive or sexually implicit content",
                RiskLevel::Medium,
            ),
            Self::Violence => ("Violence", "Violent or graphic content", RiskLevel::High),
            Self::Terrorism => ("Terrorism", "Terrorist-related content", RiskLevel::Severe),
            Self::Politics => ("Politics", "Politically sensitive content", RiskLevel::High),
            Self::Illegal => (
                "Illegal",
                "Content promoting illegal activities",
                RiskLevel::Severe,
            ),
            Self::Fraud => ("Fraud", "Fraudulent or deceptive content", RiskLevel::High),
            Self::Gambling => ("Gambling", "Gambling-related content", RiskLevel::Medium),
            Self::Drugs => ("Drugs", "Drug-related content", RiskLevel::High),
            Self::HateSpeech => ("Hate Speech", "Hateful or discriminatory content", RiskLevel::High),
            Self::Harassment => ("Harassment", "Harassing or bullying content", RiskLevel::Medium),
            Self::Abuse => ("Abuse", "Abusive content", RiskLevel::High),
            Self::MinorSafety => ("Minor Safety", "Content endangering minors", RiskLevel::Severe),
            Self::Spam => ("Spam", "Spam or unsolicited content", RiskLevel::Low),
            Self::Ads => ("Ads", "Unauthorized advertising", RiskLevel::Low),
            Self::Scam => ("Scam", "Scam or phishing content", RiskLevel::High),
            Self::AccountRisk => (
                "Account Risk",
                "Account-level risk indicators",
                RiskLevel::Medium,
            ),
            Self::Other => ("Other", "Other violations", RiskLevel::Low),
        };
        DomainInfo {
            domain: *self,
            name,
            description,
            default_risk,
        }
    }

    pub fn default_risk(&self) -> RiskLevel {
        self.info().default_risk
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
