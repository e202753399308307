//! Encoder identities.
//!
//! Two encoders are considered the same transform when their identifiers are
//! *equivalent*: the names match, or either name appears among the other's
//! aliases. Object identity plays no part, so an HTML encoder configured in
//! one place and an `html` codec looked up by name in another are treated as
//! one and the same.

use alloc::{string::String, sync::Arc, vec::Vec};
use core::fmt;

#[derive(Debug, PartialEq, Eq, Hash)]
struct CodecName {
    name: String,
    aliases: Vec<String>,
}

/// Name plus aliases of a single encoder. Cheap to clone.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CodecIdentifier(Arc<CodecName>);

impl CodecIdentifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_aliases(name, core::iter::empty::<String>())
    }

    pub fn with_aliases<I, S>(name: impl Into<String>, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(Arc::new(CodecName {
            name: name.into(),
            aliases: aliases.into_iter().map(Into::into).collect(),
        }))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[must_use]
    pub fn aliases(&self) -> &[String] {
        &self.0.aliases
    }

    /// Whether `name` is this codec's name or one of its aliases.
    #[must_use]
    pub fn answers_to(&self, name: &str) -> bool {
        self.0.name == name || self.0.aliases.iter().any(|a| a == name)
    }

    #[must_use]
    pub fn is_equivalent(&self, other: &CodecIdentifier) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || self.answers_to(other.name())
            || other.answers_to(self.name())
    }
}

impl fmt::Debug for CodecIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for CodecIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered identities of the members of a chained encoder.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CombinedCodecIdentifier {
    members: Arc<[CodecIdentifier]>,
}

impl CombinedCodecIdentifier {
    pub fn new(members: impl IntoIterator<Item = CodecIdentifier>) -> Self {
        Self {
            members: members.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn members(&self) -> &[CodecIdentifier] {
        &self.members
    }

    /// Combined name in application order, e.g. `html->js`.
    #[must_use]
    pub fn name(&self) -> String {
        let mut name = String::new();
        for (i, member) in self.members.iter().enumerate() {
            if i > 0 {
                name.push_str("->");
            }
            name.push_str(member.name());
        }
        name
    }

    /// Same length, pairwise equivalent members.
    #[must_use]
    pub fn is_equivalent(&self, other: &CombinedCodecIdentifier) -> bool {
        self.members.len() == other.members.len()
            && self
                .members
                .iter()
                .zip(other.members.iter())
                .all(|(a, b)| a.is_equivalent(b))
    }
}

impl fmt::Debug for CombinedCodecIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}
