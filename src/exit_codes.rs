//! Exit code constants for the agentrig CLI.
//!
//! - 0: Success (an execution record was produced and the agent exited 0)
//! - 1: User error (bad args, unknown agent, unreadable config)
//! - 2: Missing input (template parameter or required credential)
//! - 3: Install failure
//! - 4: Agent failure (non-zero exit or killed by signal)
//! - 5: Cancelled (timeout or user abort)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, unknown agent, invalid configuration.
pub const USER_ERROR: i32 = 1;

/// A template parameter or required credential was not supplied.
pub const MISSING_INPUT: i32 = 2;

/// The agent could not be installed.
pub const INSTALL_FAILURE: i32 = 3;

/// The agent ran but exited non-zero or was killed by a signal.
pub const AGENT_FAILURE: i32 = 4;

/// The attempt was cancelled before the agent finished.
pub const CANCELLED: i32 = 5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            SUCCESS,
            USER_ERROR,
            MISSING_INPUT,
            INSTALL_FAILURE,
            AGENT_FAILURE,
            CANCELLED,
        ];
        for (i, &a) in codes.iter().enumerate() {
            for (j, &b) in codes.iter().enumerate() {
                if i != j {
                    assert_ne!(a, b, "Exit codes must be distinct");
                }
            }
        }
    }
}
