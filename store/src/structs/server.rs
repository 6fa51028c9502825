use serde::{Deserialize, Serialize};

/// Cached guild metadata plus the operator-configured moderator roles.
/// Metadata is refreshed from gateway events; `mod_roles` only changes
/// through the modrole commands and survives refreshes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerInfo {
    pub name: String,
    pub member_count: u64,
    pub icon_url: Option<String>,
    pub banner_url: Option<String>,
    pub description: Option<String>,
    pub owner_id: u64,
    pub mod_roles: Vec<u64>,
}
