//! Channel selection: which radio channels the relay answers on.
//!
//! Mesh radios multiplex several logical channels over one link. The relay is
//! configured with a single target channel index, or `-1` to answer on every
//! channel.

use serde::{Deserialize, Serialize};

/// Configured target channel, or the wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum ChannelSelector {
    /// Every channel (configured as `-1`)
    All,
    /// A single channel index
    Index(u32),
}

impl ChannelSelector {
    /// The configuration value that selects every channel.
    pub const WILDCARD: i64 = -1;

    /// Whether an event that arrived on `incoming` should be processed.
    pub fn accepts(&self, incoming: u32) -> bool {
        match self {
            ChannelSelector::All => true,
            ChannelSelector::Index(target) => *target == incoming,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, ChannelSelector::All)
    }
}

impl Default for ChannelSelector {
    fn default() -> Self {
        ChannelSelector::Index(0)
    }
}

impl TryFrom<i64> for ChannelSelector {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            Self::WILDCARD => Ok(ChannelSelector::All),
            v if v >= 0 => u32::try_from(v)
                .map(ChannelSelector::Index)
                .map_err(|_| format!("channel index {v} out of range")),
            v => Err(format!(
                "channel must be a non-negative index or {} for all channels, got {v}",
                Self::WILDCARD
            )),
        }
    }
}

impl From<ChannelSelector> for i64 {
    fn from(selector: ChannelSelector) -> Self {
        match selector {
            ChannelSelector::All => ChannelSelector::WILDCARD,
            ChannelSelector::Index(i) => i64::from(i),
        }
    }
}

impl std::fmt::Display for ChannelSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelSelector::All => write!(f, "all channels"),
            ChannelSelector::Index(i) => write!(f, "channel {i}"),
        }
    }
}

/// Free-function form of [`ChannelSelector::accepts`].
pub fn accepts(target: ChannelSelector, incoming: u32) -> bool {
    target.accepts(incoming)
}
