//! Censor Policy
//!
//! Provider-agnostic vocabulary for moderation results.
//!
//! Providers report their own labels; this crate maps them onto a shared
//! model so decisions can be made independently of any vendor:
//! - Domains: high-level violation categories with a default risk
//! - Tags: fine-grained labels belonging to a domain
//! - Scenes: what a business type wants detected
//! - Translators: provider label → unified violation mapping
//! - Review requirements: per business type scene lists, loadable from YAML

pub mod domain;
pub mod requirements;
pub mod scene;
pub mod tag;
pub mod translator;
pub mod violation;

pub use domain::{Domain, DomainInfo};
pub use requirements::{ReviewRequirement, ReviewRequirements};
pub use scene::{SceneCapability, SceneInfo, UnifiedScene};
pub use tag::{Tag, TagInfo};
pub use translator::{
    merge_violations, BaseTranslator, LabelMapping, TranslationContext, Translator,
};
pub use violation::{UnifiedList, UnifiedViolation};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::domain::Domain;
    pub use crate::requirements::{ReviewRequirement, ReviewRequirements};
    pub use crate::scene::{SceneCapability, UnifiedScene};
    pub use crate::tag::Tag;
    pub use crate::translator::{BaseTranslator, LabelMapping, TranslationContext, Translator};
    pub use crate::violation::{UnifiedList, UnifiedViolation};
}
