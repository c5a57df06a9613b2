//! Scripted shell for testing.
//!
//! Records every command it is asked to run and answers from responses
//! registered against command substrings, so host, transfer and job logic can
//! be exercised deterministically without a network.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::remote::shell::{ExecutionResult, Shell};

struct Rule {
    pattern: String,
    once: VecDeque<ExecutionResult>,
    always: Option<ExecutionResult>,
}

#[derive(Default)]
struct State {
    rules: Vec<Rule>,
    commands: Vec<String>,
}

/// A test double that records commands and serves pre-configured results.
///
/// Rules match by substring. Queued one-shot responses are consumed first,
/// oldest rule first; after that the most recently registered matching sticky
/// response answers. Commands matching no rule succeed with empty output.
#[derive(Clone, Default)]
pub struct ScriptedShell {
    state: Arc<Mutex<State>>,
}

impl ScriptedShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a one-shot response for commands containing `pattern`.
    pub fn respond(&self, pattern: &str, result: ExecutionResult) -> &Self {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match state.rules.iter_mut().find(|r| r.pattern == pattern) {
            Some(rule) => rule.once.push_back(result),
            None => state.rules.push(Rule {
                pattern: pattern.to_string(),
                once: VecDeque::from([result]),
                always: None,
            }),
        }
        self
    }

    /// Answers every command containing `pattern` with `result` once any
    /// queued one-shot responses are used up.
    pub fn respond_always(&self, pattern: &str, result: ExecutionResult) -> &Self {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match state.rules.iter_mut().find(|r| r.pattern == pattern) {
            Some(rule) => rule.always = Some(result),
            None => state.rules.push(Rule {
                pattern: pattern.to_string(),
                once: VecDeque::new(),
                always: Some(result),
            }),
        }
        self
    }

    /// All commands executed so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.state
            .lock()
            .map(|s| s.commands.clone())
            .unwrap_or_default()
    }

    /// Number of executed commands containing `pattern`.
    pub fn count(&self, pattern: &str) -> usize {
        self.commands()
            .iter()
            .filter(|c| c.contains(pattern))
            .count()
    }

    pub fn clear_commands(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.commands.clear();
        }
    }
}

impl Shell for ScriptedShell {
    fn exec(&self, command: &str) -> Result<ExecutionResult> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::TransientIo("scripted shell poisoned".to_string()))?;
        state.commands.push(command.to_string());

        for rule in state.rules.iter_mut() {
            if command.contains(&rule.pattern) {
                if let Some(result) = rule.once.pop_front() {
                    return Ok(result);
                }
            }
        }
        let sticky = state
            .rules
            .iter()
            .rev()
            .filter(|r| command.contains(&r.pattern))
            .find_map(|r| r.always.clone());
        Ok(sticky.unwrap_or_else(|| ExecutionResult::ok("")))
    }
}
