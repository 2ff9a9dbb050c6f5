//! Branded ID newtypes.
//!
//! Session tokens, observer IDs, and the rest of the identifier vocabulary
//! are plain strings on the wire but distinct types in code, so a session
//! token can never be passed where an observer ID is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! branded_id {
    ($(#[doc = $doc:literal])* $name:ident, $prefix:literal) => {
        $(#[doc = $doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier string.
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Generate a fresh identifier (UUID v7, time-ordered).
            #[must_use]
            pub fn generate() -> Self {
                Self(format!("{}_{}", $prefix, uuid::Uuid::now_v7()))
            }

            /// The raw string form.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_string())
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }
    };
}

branded_id!(
    /// Opaque unique identifier for one monitored assessment attempt.
    SessionToken,
    "sess"
);

branded_id!(
    /// A client consuming a session's live feed and violations.
    ObserverId,
    "obs"
);

branded_id!(
    /// The assessment a session is attached to.
    AssessmentId,
    "assess"
);

branded_id!(
    /// The monitored party taking the assessment.
    CandidateId,
    "cand"
);
