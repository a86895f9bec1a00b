//! Built-in stages.
//!
//! Every stage follows the same contract: a missing precondition is a no-op,
//! a failed external command is written to `last_error`, and only
//! infrastructure problems (I/O, a runner that cannot spawn) are returned as
//! `Err` for the engine to record.

mod analyst;
mod coder;
mod document;
mod planner;
mod release;
mod selector;
mod tester;

pub use analyst::LogAnalystStage;
pub use coder::CoderStage;
pub use document::DocAgentStage;
pub use planner::PlannerStage;
pub use release::CicdStage;
pub use selector::TaskSelectorStage;
pub use tester::TesterStage;

use pipewright_core::types::Task;

/// Lines of command output kept in `last_error` and the audit log.
const ERROR_TAIL_LINES: usize = 20;

/// Quote `value` for interpolation into a `bash -c` command line.
pub(crate) fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Fill `{id}`, `{title}` and `{kind}` with shell-quoted task fields.
pub(crate) fn render_task_command(template: &str, task: &Task) -> String {
    template
        .replace("{id}", &shell_quote(&task.id))
        .replace("{title}", &shell_quote(&task.title))
        .replace("{kind}", &shell_quote(task.kind.as_str()))
}

/// Last few lines of command output.
pub(crate) fn output_tail(output: &str) -> String {
    let lines: Vec<&str> = output.trim_end().lines().collect();
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    lines[start..].join("\n")
}
