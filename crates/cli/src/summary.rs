//! Human-readable rendering of an execution result.

use std::fmt::Write;

use stepsim_eval::ExecutionResult;

pub(crate) fn render(result: &ExecutionResult) -> String {
    let mut out = String::new();
    let status = if result.success { "SUCCEEDED" } else { "FAILED" };
    let _ = writeln!(out, "status: {}", status);
    let _ = writeln!(out, "path:   {}", result.execution_path.join(" -> "));
    if let Some(error) = &result.error {
        let _ = writeln!(out, "error:  {}", error.error);
        if !error.cause.is_empty() {
            let _ = writeln!(out, "cause:  {}", error.cause);
        }
    } else {
        let output = serde_json::to_string_pretty(&result.output)
            .unwrap_or_else(|e| format!("serialization error: {}", e));
        let _ = writeln!(out, "output: {}", output);
    }
    for map in &result.map_executions {
        let _ = writeln!(
            out,
            "map {} ({}): {} iterations, {} failed",
            map.state_name, map.mode, map.iteration_count, map.failed_count
        );
    }
    for parallel in &result.parallel_executions {
        let _ = writeln!(out, "parallel {}: {} branches", parallel.state_name, parallel.branch_count);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use stepsim_eval::ErrorInfo;

    fn result(success: bool) -> ExecutionResult {
        ExecutionResult {
            success,
            output: json!({"ok": true}),
            execution_path: vec!["A".to_string(), "B".to_string()],
            state_executions: None,
            map_executions: Vec::new(),
            parallel_executions: Vec::new(),
            error: None,
            variables: Default::default(),
        }
    }

    #[test]
    fn success_shows_path_and_output() {
        let text = render(&result(true));
        assert!(text.contains("status: SUCCEEDED"));
        assert!(text.contains("A -> B"));
        assert!(text.contains("\"ok\": true"));
    }

    #[test]
    fn failure_shows_error_instead_of_output() {
        let mut failed = result(false);
        failed.error = Some(ErrorInfo {
            error: "States.TaskFailed".to_string(),
            cause: "no mock".to_string(),
        });
        let text = render(&failed);
        assert!(text.contains("status: FAILED"));
        assert!(text.contains("error:  States.TaskFailed"));
        assert!(!text.contains("output:"));
    }
}
