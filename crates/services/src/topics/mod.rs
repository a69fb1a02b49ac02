//! Built-in problem sources.

mod arithmetic;
mod distributive;
mod fractions;

use std::fmt;
use std::str::FromStr;

use drill_core::model::TopicId;
use thiserror::Error;

pub use arithmetic::{ArithmeticProblem, ArithmeticSource, Operation};
pub use distributive::{DistributiveProblem, DistributiveSource};
pub use fractions::{Fraction, FractionProblem, FractionSource};

/// Placeholder shown in plain-text prompts for an answer slot.
pub const BLANK: &str = "☐";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown topic: {0}")]
pub struct UnknownTopic(pub String);

/// Topics shipped with the crate, selectable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Arithmetic,
    Fractions,
    Distributive,
}

impl Topic {
    pub const ALL: [Topic; 3] = [Topic::Arithmetic, Topic::Fractions, Topic::Distributive];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Arithmetic => "arithmetic",
            Topic::Fractions => "fractions",
            Topic::Distributive => "distributive",
        }
    }

    #[must_use]
    pub fn title(self) -> &'static str {
        match self {
            Topic::Arithmetic => "Arithmetic",
            Topic::Fractions => "Adding fractions",
            Topic::Distributive => "Distributive property",
        }
    }

    /// Storage key for this topic.
    ///
    /// # Panics
    ///
    /// Never in practice: every built-in name is a valid topic id.
    #[must_use]
    pub fn topic_id(self) -> TopicId {
        TopicId::new(self.as_str()).expect("built-in topic names are valid ids")
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Topic::ALL
            .into_iter()
            .find(|topic| topic.as_str() == wanted)
            .ok_or_else(|| UnknownTopic(s.to_string()))
    }
}
