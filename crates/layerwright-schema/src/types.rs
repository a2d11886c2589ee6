//! Newtype wrappers for string identifiers, providing compile-time type safety.
//!
//! All newtypes serialize/deserialize as plain strings so catalog and record
//! files stay readable by other tooling.

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

        impl PartialEq<String> for $name {
            fn eq(&self, other: &String) -> bool {
                self.0 == *other
            }
        }

        impl PartialEq<$name> for String {
            fn eq(&self, other: &$name) -> bool {
                *self == other.0
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
    /// Catalog identifier of a dependency, also used as its layer name (e.g. `pnpm`).
    DependencyId
);

string_newtype!(
    /// Build stack identifier (e.g. `io.buildpacks.stacks.jammy`). `*` matches any stack.
    StackId
);

string_newtype!(
    /// Artifact checksum in `<algorithm>:<hex>` form, e.g. `sha256:abc`.
    ///
    /// This is the cache fingerprint. Equality is exact string equality;
    /// the algorithm prefix is never stripped or case-folded.
    Checksum
);

impl StackId {
    pub const ANY: &'static str = "*";

    /// True if a catalog entry listing `self` is installable on `stack`.
    pub fn matches(&self, stack: &str) -> bool {
        self.0 == Self::ANY || self.0 == stack
    }
}

impl Checksum {
    /// Algorithm prefix, or `sha256` for a bare digest.
    pub fn algorithm(&self) -> &str {
        match self.0.split_once(':') {
            Some((algo, _)) => algo,
            None => "sha256",
        }
    }

    /// Hex digest without the algorithm prefix.
    pub fn hash(&self) -> &str {
        match self.0.split_once(':') {
            Some((_, hash)) => hash,
            None => &self.0,
        }
    }
}
