use core::fmt;
use core::num::NonZeroU32;

use crate::{SdError, SdResult, parse_uint};

/// Identifier of a simulated channel.
///
/// Stores the 1-based number used on the wire, so `Display` prints exactly what
/// a client sends in `READ? <chan>`.
/// - `u32` keeps memory small
/// - `NonZero` enables `Option<ChannelId>` to be pointer-optimized
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(NonZeroU32);

impl ChannelId {
    /// Create an id from a 0-based index by storing index+1.
    pub fn from_index(index: u32) -> Self {
        Self(NonZeroU32::MIN.saturating_add(index))
    }

    /// Create an id from the 1-based protocol number.
    pub fn from_number(number: u32) -> Option<Self> {
        NonZeroU32::new(number).map(Self)
    }

    /// Parse a protocol token and check it addresses one of `count` channels.
    pub fn parse(token: &str, count: usize) -> SdResult<Self> {
        let number = parse_uint(token, "channel number")?;
        match Self::from_number(number) {
            Some(id) if id.index() < count => Ok(id),
            _ => Err(SdError::IndexOob {
                what: "channel number",
                index: number as usize,
                len: count,
            }),
        }
    }

    /// Recover the 0-based index.
    pub fn index(self) -> usize {
        (self.0.get() - 1) as usize
    }

    /// The 1-based protocol number.
    pub fn number(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Debug for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChannelId({})", self.number())
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}
