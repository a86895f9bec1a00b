use std::collections::VecDeque;
use std::sync::Mutex;

use futures::future::BoxFuture;

use pipewright_core::error::Result;
use pipewright_core::traits::CommandRunner;
use pipewright_core::types::CommandOutput;

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerCall {
    pub command: String,
    pub target: String,
}

/// Command runner that replays scripted outputs.
///
/// Each rule pairs a substring with a queue of outputs. The first rule whose
/// substring occurs in the command and still has outputs queued answers the
/// call; otherwise the command succeeds with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: Mutex<Vec<(String, VecDeque<CommandOutput>)>>,
    calls: Mutex<Vec<RunnerCall>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `output` for the next command containing `needle`.
    pub fn on(self, needle: impl Into<String>, output: CommandOutput) -> Self {
        let needle = needle.into();
        {
            let mut rules = self.rules.lock().unwrap();
            match rules.iter_mut().find(|(n, _)| *n == needle) {
                Some((_, queue)) => queue.push_back(output),
                None => rules.push((needle, VecDeque::from([output]))),
            }
        }
        self
    }

    /// Make the next command containing `needle` exit with status 1.
    pub fn fail_once(self, needle: impl Into<String>, output: impl Into<String>) -> Self {
        self.on(needle, CommandOutput::new(1, output))
    }

    pub fn calls(&self) -> Vec<RunnerCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded commands containing `needle`.
    pub fn count(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.command.contains(needle))
            .count()
    }
}

impl CommandRunner for ScriptedRunner {
    fn name(&self) -> &str {
        "scripted"
    }

    fn run<'a>(&'a self, command: &'a str, target: &'a str) -> BoxFuture<'a, Result<CommandOutput>> {
        Box::pin(async move {
            self.calls.lock().unwrap().push(RunnerCall {
                command: command.to_string(),
                target: target.to_string(),
            });

            let mut rules = self.rules.lock().unwrap();
            let scripted = rules
                .iter_mut()
                .find(|(needle, queue)| command.contains(needle.as_str()) && !queue.is_empty())
                .and_then(|(_, queue)| queue.pop_front());

            Ok(scripted.unwrap_or_else(|| CommandOutput::new(0, "")))
        })
    }
}
