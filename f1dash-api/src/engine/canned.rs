//! Scripted analysis engine
//!
//! Stands in for the analysis process in tests and offline demos: returns
//! canned JSON (or a canned error) per command and records every invocation.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;

use super::{AnalysisEngine, EngineCommand, EngineError};

/// One recorded call to [`CannedEngine::invoke`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: EngineCommand,
    pub args: Vec<String>,
}

impl Invocation {
    /// Full positional argument list as the script would see it
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.command.as_str().to_string())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

/// Engine double returning scripted responses
#[derive(Debug, Default)]
pub struct CannedEngine {
    responses: Mutex<HashMap<EngineCommand, Result<Value, EngineError>>>,
    calls: Mutex<Vec<Invocation>>,
    delay: Option<Duration>,
}

impl CannedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `command` with `value`
    pub fn with_response(self, command: EngineCommand, value: Value) -> Self {
        self.set_response(command, Ok(value));
        self
    }

    /// Fail `command` with `error`
    pub fn with_error(self, command: EngineCommand, error: EngineError) -> Self {
        self.set_response(command, Err(error));
        self
    }

    /// Sleep before answering, so concurrent callers overlap
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Replace the scripted response for `command`
    pub fn set_response(&self, command: EngineCommand, response: Result<Value, EngineError>) {
        lock(&self.responses).insert(command, response);
    }

    /// All invocations so far, in call order
    pub fn calls(&self) -> Vec<Invocation> {
        lock(&self.calls).clone()
    }

    /// Number of invocations of `command`
    pub fn call_count(&self, command: EngineCommand) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.command == command)
            .count()
    }
}

// A panicking test thread must not hide the recorded calls from the others
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait::async_trait]
impl AnalysisEngine for CannedEngine {
    async fn invoke(&self, command: EngineCommand, args: &[String]) -> Result<Value, EngineError> {
        lock(&self.calls).push(Invocation {
            command,
            args: args.to_vec(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = lock(&self.responses).get(&command).cloned();
        scripted.unwrap_or_else(|| {
            Err(EngineError::NonZeroExit {
                code: Some(1),
                stderr: format!("Error: Unknown command: {}", command),
            })
        })
    }
}
