//! Scripted stand-in for the Azure CLI.

use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
    time::Duration,
};

use {
    async_trait::async_trait,
    azfeed_exec::{CommandRunner, RunError},
    chrono::{DateTime, Utc},
};

#[derive(Debug, Clone)]
pub enum Step {
    Output(String),
    Exit(i32),
    SpawnNotFound,
}

#[derive(Default)]
struct Script {
    fetch: VecDeque<Step>,
    login: VecDeque<Step>,
    account: VecDeque<Step>,
    calls: Vec<String>,
}

/// Replays queued steps per command kind. An exhausted queue exits 1.
#[derive(Default)]
pub struct ScriptedRunner {
    script: Mutex<Script>,
    delay: Duration,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fetch(self, step: Step) -> Self {
        self.push(|s| &mut s.fetch, step)
    }

    pub fn login(self, step: Step) -> Self {
        self.push(|s| &mut s.login, step)
    }

    pub fn account(self, step: Step) -> Self {
        self.push(|s| &mut s.account, step)
    }

    /// Delay every command, so concurrent callers overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn push(self, queue: impl FnOnce(&mut Script) -> &mut VecDeque<Step>, step: Step) -> Self {
        {
            let mut script = self.script();
            queue(&mut *script).push_back(step);
        }
        self
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn calls(&self) -> Vec<String> {
        self.script().calls.clone()
    }

    pub fn fetch_calls(&self) -> usize {
        self.count("get-access-token")
    }

    pub fn login_calls(&self) -> usize {
        self.calls().iter().filter(|c| c.ends_with(" login")).count()
    }

    fn count(&self, needle: &str) -> usize {
        self.calls().iter().filter(|c| c.contains(needle)).count()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, command_line: &str) -> Result<String, RunError> {
        let step = {
            let mut script = self.script();
            script.calls.push(command_line.to_string());
            let queue = if command_line.contains("get-access-token") {
                &mut script.fetch
            } else if command_line.ends_with(" login") {
                &mut script.login
            } else {
                &mut script.account
            };
            queue.pop_front().unwrap_or(Step::Exit(1))
        };

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        match step {
            Step::Output(out) => Ok(out),
            Step::Exit(exit_code) => Err(RunError::Exit {
                command: command_line.to_string(),
                exit_code,
                output: String::new(),
            }),
            Step::SpawnNotFound => Err(RunError::Spawn {
                command: command_line.to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
        }
    }
}

/// `get-access-token` output as recent CLI versions print it.
pub fn token_json(token: &str, expires_on: DateTime<Utc>) -> String {
    serde_json::json!({
        "accessToken": token,
        "expiresOn": expires_on.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        "expires_on": expires_on.timestamp(),
        "tokenType": "Bearer",
    })
    .to_string()
}
