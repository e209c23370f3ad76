//! World dimensions served by a provider.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which dimension of a world a provider instance serves.
///
/// Purely descriptive: storage addressing does not depend on it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dimension {
    /// The surface world.
    #[default]
    Overworld,
    /// The underworld.
    Nether,
    /// The end.
    End,
}

impl Dimension {
    /// Stable numeric id.
    pub fn id(self) -> i32 {
        match self {
            Self::Overworld => 0,
            Self::Nether => 1,
            Self::End => 2,
        }
    }

    /// Dimension for a numeric id, if known.
    pub fn from_id(id: i32) -> Option<Self> {
        match id {
            0 => Some(Self::Overworld),
            1 => Some(Self::Nether),
            2 => Some(Self::End),
            _ => None,
        }
    }

    /// Lowercase name used for directories and configuration.
    pub fn name(self) -> &'static str {
        match self {
            Self::Overworld => "overworld",
            Self::Nether => "nether",
            Self::End => "end",
        }
    }

    /// Parses a lowercase name as produced by [`name`](Self::name).
    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Overworld, Self::Nether, Self::End]
            .into_iter()
            .find(|d| d.name() == name)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
