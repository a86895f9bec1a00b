use serde::{Deserialize, Serialize};

/// Every stage the pipeline knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StageName {
    /// Document ingestion.
    DocAgent,
    /// Roadmap generation.
    Planner,
    /// Picks the next `todo` task.
    TaskSelector,
    /// Executes the current task.
    Coder,
    /// Verifies the executed task.
    Tester,
    /// Releases verified changes.
    Cicd,
    /// Failure analysis and retry bookkeeping.
    LogAnalyst,
}

impl StageName {
    pub const ALL: [StageName; 7] = [
        StageName::DocAgent,
        StageName::Planner,
        StageName::TaskSelector,
        StageName::Coder,
        StageName::Tester,
        StageName::Cicd,
        StageName::LogAnalyst,
    ];

    /// Where every run starts.
    pub const ENTRY: StageName = StageName::DocAgent;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocAgent => "DocAgent",
            Self::Planner => "Planner",
            Self::TaskSelector => "TaskSelector",
            Self::Coder => "Coder",
            Self::Tester => "Tester",
            Self::Cicd => "Cicd",
            Self::LogAnalyst => "LogAnalyst",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for stage in StageName::ALL {
            assert_eq!(StageName::parse(stage.as_str()), Some(stage));
        }
        assert_eq!(StageName::parse("Architect"), None);
    }
}
