use std::sync::Arc;

use {
    azfeed_config::FeedSettings,
    azfeed_exec::{CommandRunner, RunError},
    tracing::{info, warn},
};

use crate::{
    cli_output::{OutputError, parse_access_token},
    error::AuthError,
    install::print_install_instructions,
    types::TokenResult,
};

/// Where an acquisition currently is. Terminal outcomes are returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Fetching { after_login: bool },
    LoggingIn,
}

#[derive(Debug, thiserror::Error)]
enum FetchError {
    #[error(transparent)]
    Run(#[from] RunError),
    #[error(transparent)]
    Output(#[from] OutputError),
}

impl FetchError {
    fn is_command_not_found(&self) -> bool {
        matches!(self, Self::Run(e) if e.is_command_not_found())
    }

    fn into_auth_error(self) -> AuthError {
        match self {
            Self::Run(e) => AuthError::AcquisitionFailed {
                message: e.to_string(),
            },
            Self::Output(e) => AuthError::Parse {
                message: e.to_string(),
            },
        }
    }
}

/// Gets tokens from the CLI, logging in once if the session has expired.
pub struct TokenAcquirer {
    runner: Arc<dyn CommandRunner>,
    cli: String,
    resource_id: String,
}

impl TokenAcquirer {
    pub fn new(runner: Arc<dyn CommandRunner>, settings: &FeedSettings) -> Self {
        Self {
            runner,
            cli: settings.cli_command.clone(),
            resource_id: settings.resource_id.clone(),
        }
    }

    pub fn fetch_command(&self) -> String {
        format!(
            "{} account get-access-token --resource \"{}\" --output json",
            self.cli, self.resource_id
        )
    }

    pub fn login_command(&self) -> String {
        format!("{} login", self.cli)
    }

    pub fn account_list_command(&self) -> String {
        format!("{} account list --output none", self.cli)
    }

    /// Fetch a token; on failure log in and fetch exactly once more.
    ///
    /// A missing CLI fails immediately with [`AuthError::CliMissing`]
    /// without attempting to log in.
    pub async fn acquire(&self) -> Result<TokenResult, AuthError> {
        let mut state = State::Fetching { after_login: false };
        loop {
            state = match state {
                State::Fetching { after_login } => match self.fetch().await {
                    Ok(token) => {
                        info!(expires_on = %token.expires_on, after_login, "acquired access token");
                        return Ok(token);
                    },
                    Err(e) if e.is_command_not_found() => return Err(self.cli_missing()),
                    Err(e) if after_login => {
                        warn!(error = %e, "access token fetch failed after login");
                        return Err(e.into_auth_error());
                    },
                    Err(e) => {
                        warn!(error = %e, "access token fetch failed, trying to log in");
                        eprintln!("Can not get access token for Azure DevOps, trying to log in.");
                        State::LoggingIn
                    },
                },
                State::LoggingIn => match self.runner.run(&self.login_command()).await {
                    Ok(_) => State::Fetching { after_login: true },
                    Err(e) if e.is_command_not_found() => return Err(self.cli_missing()),
                    Err(e) => {
                        warn!(error = %e, "login failed");
                        return Err(AuthError::AcquisitionFailed {
                            message: format!("login failed: {e}"),
                        });
                    },
                },
            };
        }
    }

    /// Check that the CLI is installed and has a logged-in account.
    pub async fn check_logged_in(&self) -> Result<(), AuthError> {
        match self.runner.run(&self.account_list_command()).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_command_not_found() => Err(self.cli_missing()),
            Err(e) => Err(AuthError::AcquisitionFailed {
                message: e.to_string(),
            }),
        }
    }

    async fn fetch(&self) -> Result<TokenResult, FetchError> {
        let stdout = self.runner.run(&self.fetch_command()).await?;
        Ok(parse_access_token(&stdout)?)
    }

    fn cli_missing(&self) -> AuthError {
        warn!(cli = %self.cli, "Azure CLI not found");
        print_install_instructions(&self.cli);
        AuthError::CliMissing {
            cli: self.cli.clone(),
        }
    }
}
