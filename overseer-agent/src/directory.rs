//! Username → display name lookup
//!
//! On Unix the display name comes from the gecos field of the passwd entry.

use std::collections::HashMap;

/// Gecos padding left behind by `adduser` for empty room/phone fields.
const GECOS_SEPARATOR: &str = ",,,";

pub trait UserDirectory: Send + Sync {
    /// Raw display name for `username`, `None` if the user is unknown.
    fn lookup(&self, username: &str) -> Option<String>;

    /// Display name with separator padding removed, `None` if there is nothing to show.
    fn display_name(&self, username: &str) -> Option<String> {
        self.lookup(username)
            .map(|raw| clean_display_name(&raw))
            .filter(|name| !name.is_empty())
    }
}

pub fn clean_display_name(raw: &str) -> String {
    raw.replace(GECOS_SEPARATOR, "").trim().to_string()
}

/// System account database
#[derive(Debug, Default, Clone, Copy)]
pub struct PasswdDirectory;

#[cfg(unix)]
impl UserDirectory for PasswdDirectory {
    fn lookup(&self, username: &str) -> Option<String> {
        match nix::unistd::User::from_name(username) {
            Ok(Some(user)) => Some(user.gecos.to_string_lossy().into_owned()),
            Ok(None) => None,
            Err(e) => {
                tracing::debug!("passwd lookup for {} failed: {}", username, e);
                None
            }
        }
    }
}

#[cfg(not(unix))]
impl UserDirectory for PasswdDirectory {
    fn lookup(&self, _username: &str) -> Option<String> {
        None
    }
}

/// Fixed in-memory directory
#[derive(Debug, Default, Clone)]
pub struct StaticDirectory {
    names: HashMap<String, String>,
}

impl StaticDirectory {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            names: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl UserDirectory for StaticDirectory {
    fn lookup(&self, username: &str) -> Option<String> {
        self.names.get(username).cloned()
    }
}
