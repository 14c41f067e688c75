/// Why a registry request could not be given an auth header.
///
/// `Clone` so one refresh outcome can be handed to every caller that joined
/// the same in-flight acquisition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// The CLI is not installed or not on `PATH`.
    #[error("Azure CLI is required, make sure the `{cli}` command is part of your PATH")]
    CliMissing { cli: String },

    /// The CLI ran but could not produce a token, even after logging in.
    #[error("can not get access token for Azure DevOps: {message}")]
    AcquisitionFailed { message: String },

    /// The CLI succeeded but its output was not a usable token.
    #[error("unexpected output from the Azure CLI: {message}")]
    Parse { message: String },
}

/// Writing the token cache failed. The fresh token is still usable.
#[derive(Debug, thiserror::Error)]
#[error("failed to persist token cache: {0:#}")]
pub struct PersistError(pub anyhow::Error);
