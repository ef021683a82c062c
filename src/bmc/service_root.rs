//! Typed view of the Redfish service root

use serde::{Deserialize, Serialize};

/// Reference to another resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    /// Resource path
    #[serde(rename = "@odata.id")]
    pub odata_id: String,
}

/// `Links` member of the service root
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRootLinks {
    /// Session collection, needed for session login
    #[serde(rename = "Sessions", default)]
    pub sessions: Option<Link>,
}

/// The subset of `/redfish/v1/` this client uses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRoot {
    #[serde(rename = "@odata.id", default)]
    pub odata_id: String,

    #[serde(rename = "Name", default)]
    pub name: String,

    /// Protocol version implemented by the BMC
    #[serde(rename = "RedfishVersion", default)]
    pub redfish_version: String,

    #[serde(rename = "UUID", default)]
    pub uuid: Option<String>,

    #[serde(rename = "SessionService", default)]
    pub session_service: Option<Link>,

    #[serde(rename = "Systems", default)]
    pub systems: Option<Link>,

    #[serde(rename = "Managers", default)]
    pub managers: Option<Link>,

    #[serde(rename = "Links", default)]
    pub links: ServiceRootLinks,
}

impl ServiceRoot {
    /// Path of the session collection, if advertised
    pub fn sessions_path(&self) -> Option<&str> {
        self.links.sessions.as_ref().map(|link| link.odata_id.as_str())
    }
}
