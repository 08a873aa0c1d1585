//! Newtype wrappers for natural keys, so a realm name can't be passed where a
//! client name is expected.
//!
//! All newtypes serialize/deserialize as plain strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new instance from a string.
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Return the inner string as a slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }

        impl PartialEq<String> for $name {
            fn eq(&self, other: &String) -> bool {
                self.0 == *other
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

string_newtype!(
    /// Identifier of the workspace being provisioned.
    WorkspaceId
);

string_newtype!(
    /// Name of a realm in the identity service.
    RealmName
);

string_newtype!(
    /// Client registration name (`clientId` on the wire).
    ClientName
);

string_newtype!(
    /// Username of an account inside a realm.
    Username
);

string_newtype!(
    /// Name of a realm-level access role.
    RoleName
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn realm_name_display_and_as_ref() {
        let realm = RealmName::new("codewind");
        assert_eq!(realm.to_string(), "codewind");
        assert_eq!(realm.as_str(), "codewind");
        assert_eq!(AsRef::<str>::as_ref(&realm), "codewind");
    }

    #[test]
    fn workspace_id_serializes_as_plain_string() {
        let ws = WorkspaceId::new("ws1");
        let json = serde_json::to_string(&ws).unwrap();
        assert_eq!(json, "\"ws1\"");
        let back: WorkspaceId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ws);
    }

    #[test]
    fn role_name_compares_with_str() {
        let role = RoleName::from("codewind-ws1");
        assert_eq!(role, "codewind-ws1");
        assert_eq!(role.into_inner(), "codewind-ws1");
    }
}
