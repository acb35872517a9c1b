//! Who is customizing.
//!
//! The stage only opens for a signed-in user. Sessions come from the
//! environment here; a hosting shell would inject its own.

/// A signed-in user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserSession {
    pub display_name: String,
}

impl UserSession {
    /// Read the session from `CUSTOMIZER_USER`. Unset or blank means
    /// nobody is signed in.
    pub fn from_env() -> Option<Self> {
        Self::from_name(std::env::var("CUSTOMIZER_USER").ok()?)
    }

    /// Build a session from a raw name, rejecting blank input.
    pub fn from_name(name: impl AsRef<str>) -> Option<Self> {
        let name = name.as_ref().trim();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            display_name: name.to_string(),
        })
    }
}
