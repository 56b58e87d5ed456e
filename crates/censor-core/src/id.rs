//! Prefixed entity identifiers

/// Generate a unique ID of the form `{prefix}_{uuid}`
pub fn generate(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}

/// Prefixes used for persisted entities
pub mod prefix {
    pub const BIZ_REVIEW: &str = "br";
    pub const RESOURCE_REVIEW: &str = "rr";
    pub const PROVIDER_TASK: &str = "pt";
    pub const BINDING: &str = "bd";
    pub const BINDING_HISTORY: &str = "bh";
    pub const SNAPSHOT: &str = "vs";
}
