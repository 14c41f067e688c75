//! Running the cloud CLI as a child process.

pub mod error;
pub mod runner;

pub use {
    error::{COMMAND_NOT_FOUND_EXIT_CODE, RunError, WINDOWS_COMMAND_NOT_FOUND_EXIT_CODE},
    runner::{CommandRunner, ShellRunner},
};
