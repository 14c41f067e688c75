use std::time::Duration;

/// Exit status a POSIX shell reports when it cannot find the command.
pub const COMMAND_NOT_FOUND_EXIT_CODE: i32 = 127;

/// Exit status `cmd.exe` reports when it cannot find the command.
pub const WINDOWS_COMMAND_NOT_FOUND_EXIT_CODE: i32 = 9009;

fn is_not_found_exit(exit_code: i32) -> bool {
    exit_code == COMMAND_NOT_FOUND_EXIT_CODE
        || (cfg!(windows) && exit_code == WINDOWS_COMMAND_NOT_FOUND_EXIT_CODE)
}

/// Why a command line did not produce output.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The shell itself could not be started.
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran and exited non-zero (or was killed by a signal, -1).
    #[error("`{command}` exited with code {exit_code}")]
    Exit {
        command: String,
        exit_code: i32,
        /// Whatever the command wrote to stdout before exiting.
        output: String,
    },

    #[error("`{command}` timed out after {}s", .timeout.as_secs())]
    Timeout { command: String, timeout: Duration },

    #[error("failed waiting for `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

impl RunError {
    /// Whether the failure means the executable is not installed, so the
    /// caller should show install instructions instead of retrying.
    pub fn is_command_not_found(&self) -> bool {
        match self {
            Self::Exit { exit_code, .. } => is_not_found_exit(*exit_code),
            Self::Spawn { source, .. } => source.kind() == std::io::ErrorKind::NotFound,
            Self::Timeout { .. } | Self::Wait { .. } => false,
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Exit { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}
