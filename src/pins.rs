//! GPIO assignments for the pinpad board.
//!
//! Single source of truth: every driver references this module rather than
//! hard-coding pin numbers.

// ---------------------------------------------------------------------------
// Status indicator
// ---------------------------------------------------------------------------

/// Digital output driving the status LED / relay (HIGH = on).
pub const STATUS_INDICATOR_GPIO: i32 = 2;
/// Set when the indicator is wired between 3V3 and the pin.
pub const STATUS_INDICATOR_ACTIVE_LOW: bool = false;
