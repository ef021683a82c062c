//! Service root patching
//!
//! Some BMC firmware omits `Links.Sessions` from the Redfish service root even
//! though it exposes a `SessionService`. Session-based login needs that link,
//! so we derive it from the session service's `@odata.id`.
//!
//! Only the fields involved are typed; everything else is carried through
//! the flattened remainders untouched.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Cow;

/// Path of the Redfish service root
pub const SERVICE_ROOT_PATH: &str = "/redfish/v1/";

/// Property holding a resource link
const ODATA_ID: &str = "@odata.id";

#[derive(Debug, Deserialize, Serialize)]
struct ServiceRootDocument {
    #[serde(
        rename = "SessionService",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    session_service: Option<Resource>,

    #[serde(rename = "Links", default, skip_serializing_if = "Option::is_none")]
    links: Option<Links>,

    #[serde(flatten)]
    rest: Map<String, Value>,
}

#[derive(Debug, Deserialize, Serialize)]
struct Resource {
    #[serde(rename = "@odata.id", default, skip_serializing_if = "Option::is_none")]
    odata_id: Option<String>,

    #[serde(flatten)]
    rest: Map<String, Value>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct Links {
    /// An explicit `null` reads as `None` and is treated as missing
    #[serde(rename = "Sessions", default, skip_serializing_if = "Option::is_none")]
    sessions: Option<Value>,

    #[serde(flatten)]
    rest: Map<String, Value>,
}

/// Add `Links.Sessions` to a service root that lacks it
///
/// Returns the input unchanged (borrowed) when there is nothing to patch:
/// no `SessionService`, no `@odata.id` on it, or `Links.Sessions` already
/// present. A `Links.Sessions` of `null` is not a usable link and gets
/// replaced. Returns re-serialized JSON when the link was added. Any other
/// member of the document, including other members of `Links`, is kept.
///
/// Fails if `body` is not a JSON object of the expected shape; the caller
/// still owns the original bytes in that case.
pub fn patch_missing_sessions_link(body: &[u8]) -> Result<Cow<'_, [u8]>> {
    let mut root: ServiceRootDocument = serde_json::from_slice(body)?;

    let Some(session_service_id) = root
        .session_service
        .as_ref()
        .and_then(|service| service.odata_id.as_deref())
    else {
        return Ok(Cow::Borrowed(body));
    };

    let links = root.links.get_or_insert_with(Links::default);
    if links.sessions.is_some() {
        return Ok(Cow::Borrowed(body));
    }

    let sessions_id = format!("{}/Sessions", session_service_id.trim_end_matches('/'));
    let mut sessions = Map::new();
    sessions.insert(ODATA_ID.to_string(), Value::String(sessions_id));
    links.sessions = Some(Value::Object(sessions));

    Ok(Cow::Owned(serde_json::to_vec(&root)?))
}
