//! Value objects carried inside message bodies.
//!
//! Each value wraps an opaque payload and travels as its canonical text
//! form. Values are immutable once constructed and compare by content.

use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::error::FieldParseError;

/// A value that can travel as a named field of a message body.
pub trait FieldValue: Clone + Eq + Hash + fmt::Debug + Send + Sync + Sized {
    /// Reconstruct the value from its canonical text form.
    fn parse(input: &str) -> Result<Self, FieldParseError>;

    /// Render the canonical text form. `parse(v.serialize())` must
    /// reproduce `v` exactly.
    fn serialize(&self) -> String;
}

macro_rules! payload_value {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(payload: impl Into<String>) -> Self {
                Self(payload.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl FieldValue for $name {
            fn parse(input: &str) -> Result<Self, FieldParseError> {
                Ok(Self(input.to_owned()))
            }

            fn serialize(&self) -> String {
                self.0.clone()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(payload: &str) -> Self {
                Self::new(payload)
            }
        }
    };
}

payload_value! {
    /// The question the explainee opens a conversation with.
    Query
}

payload_value! {
    /// A proposal computed by the recommender, or an alternative the
    /// explainee puts forward against it.
    Recommendation
}

payload_value! {
    /// The reasoning attached to a proposal or a comparison.
    Explanation
}

payload_value! {
    /// The explainee's reason for disapproving a proposal.
    Motivation
}

payload_value! {
    /// A constraint the proposal collides with on the explainee's side.
    Feature
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_serialize_round_trip() {
        let source = "turn left at the junction";
        let query = Query::parse(source).unwrap();
        assert_eq!(FieldValue::serialize(&query), source);
        assert_eq!(query, Query::new(source));
    }

    #[test]
    fn values_compare_by_content() {
        assert_eq!(Recommendation::new("answer!"), Recommendation::from("answer!"));
        assert_ne!(Explanation::new("a"), Explanation::new("b"));
    }

    #[test]
    fn empty_payload_survives() {
        let feature = Feature::parse("").unwrap();
        assert_eq!(FieldValue::serialize(&feature), "");
    }
}
