use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::{RecordId, UserProfile};
use crate::storage::LocalStorage;

/// Local-storage key holding the signed-in profile as JSON.
pub const IDENTITY_KEY: &str = "alumniUser";

/// The signed-in user, as cached locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: RecordId,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

impl Identity {
    pub fn label(&self) -> String {
        match (&self.full_name, &self.username) {
            (Some(name), _) => name.clone(),
            (None, Some(username)) => format!("@{username}"),
            (None, None) => format!("user {}", self.id),
        }
    }
}

impl From<&UserProfile> for Identity {
    fn from(profile: &UserProfile) -> Self {
        Self {
            id: profile.id.clone(),
            full_name: Some(profile.full_name.clone()),
            username: profile.username.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IdentityContext {
    SignedIn(Identity),
    SignedOut,
}

impl IdentityContext {
    /// Reads the cached identity. Missing, unreadable or id-less entries all
    /// mean signed out.
    pub fn load(storage: &LocalStorage) -> Self {
        let raw = match storage.get_item(IDENTITY_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                log::warn!("[identity] No user found in local storage");
                return IdentityContext::SignedOut;
            }
            Err(err) => {
                log::error!("[identity] Failed to read local storage: {err}");
                return IdentityContext::SignedOut;
            }
        };
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Self {
        let value: Value = match serde_json::from_str(raw) {
            Ok(value) => value,
            Err(err) => {
                log::error!("[identity] Failed to parse {IDENTITY_KEY}: {err}");
                return IdentityContext::SignedOut;
            }
        };
        if value.get("id").and_then(RecordId::from_value).is_none() {
            log::warn!("[identity] User id is missing");
            return IdentityContext::SignedOut;
        }
        match serde_json::from_value::<Identity>(value) {
            Ok(identity) => IdentityContext::SignedIn(identity),
            Err(err) => {
                log::error!("[identity] Malformed {IDENTITY_KEY}: {err}");
                IdentityContext::SignedOut
            }
        }
    }

    pub fn identity(&self) -> Option<&Identity> {
        match self {
            IdentityContext::SignedIn(identity) => Some(identity),
            IdentityContext::SignedOut => None,
        }
    }

    pub fn user_id(&self) -> Option<&RecordId> {
        self.identity().map(|identity| &identity.id)
    }
}

/// Caches `profile` as the signed-in user.
pub fn sign_in(storage: &LocalStorage, profile: &UserProfile) -> Result<Identity, Box<dyn std::error::Error>> {
    let identity = Identity::from(profile);
    let json = serde_json::to_string(profile)?;
    storage.set_item(IDENTITY_KEY, &json)?;
    log::info!("[identity] Signed in as {} ({})", identity.label(), identity.id);
    Ok(identity)
}

pub fn sign_out(storage: &LocalStorage) -> rusqlite::Result<()> {
    storage.remove_item(IDENTITY_KEY)
}
