#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    /// The run completed. Failed assertions are reported, not signalled.
    Success = 0,

    /// Invalid CLI flags, scenario file or configuration.
    InvalidInput = 30,

    /// Internal/runtime error (client setup, report output).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}
