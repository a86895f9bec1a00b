use std::sync::Arc;

use pipewright_core::config::AppConfig;
use pipewright_core::traits::CommandRunner;
use pipewright_engine::{Reconciler, StageName, StageRegistry};

use crate::stages::{
    CicdStage, CoderStage, DocAgentStage, LogAnalystStage, PlannerStage, TaskSelectorStage,
    TesterStage,
};

/// Register the built-in implementation of every stage.
pub fn builtin_registry(config: &AppConfig, runner: Arc<dyn CommandRunner>) -> StageRegistry {
    let target = config.executor.target();
    let artifacts = Reconciler::new(config.artifacts_dir());

    let mut registry = StageRegistry::new();
    registry
        .register(
            StageName::DocAgent,
            Arc::new(DocAgentStage::new(config.document_path())),
        )
        .register(
            StageName::Planner,
            Arc::new(PlannerStage::new(
                runner.clone(),
                target.clone(),
                config.planner.command.clone(),
                config.document_path(),
            )),
        )
        .register(StageName::TaskSelector, Arc::new(TaskSelectorStage))
        .register(
            StageName::Coder,
            Arc::new(CoderStage::new(
                runner.clone(),
                target.clone(),
                config.coder.command.clone(),
                artifacts.clone(),
            )),
        )
        .register(
            StageName::Tester,
            Arc::new(TesterStage::new(
                runner.clone(),
                target.clone(),
                config.tester.command.clone(),
            )),
        )
        .register(
            StageName::Cicd,
            Arc::new(CicdStage::new(runner, target, config.release.command.clone())),
        )
        .register(
            StageName::LogAnalyst,
            Arc::new(LogAnalystStage::new(
                artifacts,
                config.engine.max_task_attempts,
            )),
        );
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipewright_test_utils::ScriptedRunner;

    #[test]
    fn test_builtin_registry_is_complete() {
        let registry = builtin_registry(&AppConfig::default(), Arc::new(ScriptedRunner::new()));
        assert_eq!(registry.len(), StageName::ALL.len());
        registry.validate().unwrap();
    }
}
