//! Runtime log verbosity for the `DEBUG` command.
//!
//! The device never touches a global subscriber. Whoever installs the
//! subscriber passes a [`VerbosityControl`] in at construction time.

use tracing::level_filters::LevelFilter;

use crate::error::DeviceResult;

/// Adjusts how much the process logs.
pub trait VerbosityControl: Send + Sync {
    fn set_level(&self, level: LevelFilter) -> DeviceResult<()>;
}

/// Map a `DEBUG` level (0-5) onto a tracing level.
///
/// The scale follows the classic 0/10/20/30/40/50 logging levels: 0 lets
/// everything through, 5 is "critical", which tracing folds into `ERROR`.
pub fn level_from_debug(level: u32) -> Option<LevelFilter> {
    match level {
        0 => Some(LevelFilter::TRACE),
        1 => Some(LevelFilter::DEBUG),
        2 => Some(LevelFilter::INFO),
        3 => Some(LevelFilter::WARN),
        4 | 5 => Some(LevelFilter::ERROR),
        _ => None,
    }
}

/// Verbosity that cannot change; used when no subscriber handle is available.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedVerbosity;

impl VerbosityControl for FixedVerbosity {
    fn set_level(&self, level: LevelFilter) -> DeviceResult<()> {
        tracing::warn!(%level, "log level is fixed for this device; ignoring");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_levels_map_onto_tracing() {
        assert_eq!(level_from_debug(0), Some(LevelFilter::TRACE));
        assert_eq!(level_from_debug(1), Some(LevelFilter::DEBUG));
        assert_eq!(level_from_debug(2), Some(LevelFilter::INFO));
        assert_eq!(level_from_debug(3), Some(LevelFilter::WARN));
        assert_eq!(level_from_debug(4), Some(LevelFilter::ERROR));
        assert_eq!(level_from_debug(5), Some(LevelFilter::ERROR));
        assert_eq!(level_from_debug(6), None);
    }
}
