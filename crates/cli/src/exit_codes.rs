//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Scripts rely on these values.
//!
//! | Code | Meaning                                          |
//! |------|--------------------------------------------------|
//! | 0    | Success                                          |
//! | 1    | General error (unspecified)                      |
//! | 2    | Usage error (bad args, malformed edit op)        |
//! | 3    | Formula failed validation                        |
//! | 4    | Formula references a metric not in the catalog   |
//! | 5    | I/O or configuration error                       |

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, malformed input records.
pub const EXIT_USAGE: u8 = 2;

/// The formula is empty, unbalanced, unparsable, has no metric or uses an
/// unsupported function. Also used for an invalid indicator draft.
pub const EXIT_INVALID_FORMULA: u8 = 3;

/// The formula is valid but names a metric the catalog does not offer.
pub const EXIT_UNKNOWN_METRIC: u8 = 4;

/// Reading input, catalog or settings failed, or writing output failed.
pub const EXIT_IO: u8 = 5;
