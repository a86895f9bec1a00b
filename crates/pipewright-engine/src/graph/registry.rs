use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use pipewright_core::error::{PipewrightError, Result};
use pipewright_core::traits::Stage;

use super::edge::{edge_for, Target};
use super::stage::StageName;

/// Maps each stage name to its implementation.
#[derive(Default)]
pub struct StageRegistry {
    stages: HashMap<StageName, Arc<dyn Stage>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the implementation of a stage.
    pub fn register(&mut self, name: StageName, stage: Arc<dyn Stage>) -> &mut Self {
        self.stages.insert(name, stage);
        self
    }

    pub fn get(&self, name: StageName) -> Option<Arc<dyn Stage>> {
        self.stages.get(&name).cloned()
    }

    pub fn contains(&self, name: StageName) -> bool {
        self.stages.contains_key(&name)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Every stage reachable from the entry must be registered.
    pub fn validate(&self) -> Result<()> {
        let mut missing: Vec<StageName> = reachable_stages()
            .into_iter()
            .filter(|s| !self.contains(*s))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        missing.sort();
        Err(PipewrightError::StageNotRegistered(
            missing
                .iter()
                .map(StageName::as_str)
                .collect::<Vec<_>>()
                .join(", "),
        ))
    }
}

fn reachable_stages() -> HashSet<StageName> {
    let mut seen = HashSet::new();
    let mut queue = vec![StageName::ENTRY];
    while let Some(stage) = queue.pop() {
        if !seen.insert(stage) {
            continue;
        }
        for target in edge_for(stage).targets() {
            if let Target::Stage(next) = target {
                queue.push(*next);
            }
        }
    }
    seen
}
