//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Shell scripts that drive `subauto` rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 1       | Universal        | General error (unspecified)              |
//! | 2       | Universal        | CLI usage error (bad args, missing file) |
//! | 3-4     | files            | Subtitle file I/O and parsing            |
//! | 30-39   | automation       | Script loading and invocation            |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into `automation_exit_code` or the command's error handling

use subauto_automation::AutomationError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Also used when a script raised an error while processing.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unknown macro or filter name.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Files (3-4)
// =============================================================================

/// Subtitle file could not be read or written.
pub const EXIT_IO: u8 = 3;

/// Subtitle file is malformed.
pub const EXIT_PARSE: u8 = 4;

// =============================================================================
// Automation (30-39)
// =============================================================================

/// A script failed to load (syntax error, top-level error, Automation 3).
pub const EXIT_SCRIPT_LOAD: u8 = 30;

/// The macro's validation function rejected the document and selection.
pub const EXIT_MACRO_NOT_APPLICABLE: u8 = 31;

/// The invocation was cancelled, e.g. by `--timeout`.
pub const EXIT_CANCELLED: u8 = 32;

/// Map an AutomationError to its exit code.
pub fn automation_exit_code(err: &AutomationError) -> u8 {
    match err {
        AutomationError::ScriptLoad(_) | AutomationError::Registration(_) => EXIT_SCRIPT_LOAD,
        AutomationError::NotReady => EXIT_SCRIPT_LOAD,
        AutomationError::InvalidIndex { .. } | AutomationError::WrongKind { .. } => EXIT_USAGE,
        AutomationError::StaleHandle
        | AutomationError::ReadOnly
        | AutomationError::Busy
        | AutomationError::Runtime(_) => EXIT_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subauto_automation::FeatureKind;

    #[test]
    fn test_codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_ERROR,
            EXIT_USAGE,
            EXIT_IO,
            EXIT_PARSE,
            EXIT_SCRIPT_LOAD,
            EXIT_MACRO_NOT_APPLICABLE,
            EXIT_CANCELLED,
        ];
        let mut sorted = codes.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
    }

    #[test]
    fn test_automation_mapping() {
        assert_eq!(
            automation_exit_code(&AutomationError::ScriptLoad("x".into())),
            EXIT_SCRIPT_LOAD
        );
        assert_eq!(
            automation_exit_code(&AutomationError::WrongKind { index: 0, expected: FeatureKind::Macro }),
            EXIT_USAGE
        );
        assert_eq!(automation_exit_code(&AutomationError::Busy), EXIT_ERROR);
    }
}
