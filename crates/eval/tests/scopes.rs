//! Variable scoping and distributed Map behavior.
//!
//! 1. Inline Map iterations read the parent's variables; their writes stay
//!    local to the iteration
//! 2. Distributed Map iterations start from an empty scope
//! 3. Parallel branches copy the parent scope; their writes stay local
//! 4. Tolerated failure thresholds
//! 5. ItemReader and ResultWriter summaries

use std::sync::Arc;

use serde_json::{json, Value};
use stepsim_eval::{ConfigMockEngine, ExecuteOptions, ExecutionResult, StateMachineExecutor};

// ──────────────────────────────────────────────
// Test fixtures
// ──────────────────────────────────────────────

async fn run(definition: Value, input: Value, mock: Value) -> ExecutionResult {
    let mock = Arc::new(ConfigMockEngine::from_value(mock).unwrap());
    StateMachineExecutor::from_definition(&definition, mock)
        .unwrap()
        .execute(input, ExecuteOptions::default())
        .await
}

/// Sets `$limit`, then maps over the input with a processor that reads it
/// and overwrites it.
fn scoped_map(mode: &str) -> Value {
    json!({
        "StartAt": "Init",
        "States": {
            "Init": {"Type": "Pass", "Assign": {"limit": 10}, "Next": "Each"},
            "Each": {
                "Type": "Map",
                "ItemsPath": "$.items",
                "ItemProcessor": {
                    "ProcessorConfig": {"Mode": mode, "ExecutionType": "STANDARD"},
                    "StartAt": "Read",
                    "States": {
                        "Read": {
                            "Type": "Pass",
                            "Parameters": {"item.$": "$", "limit.$": "$limit"},
                            "Assign": {"limit.$": "$.item"},
                            "End": true
                        }
                    }
                },
                "End": true
            }
        }
    })
}

// ──────────────────────────────────────────────
// Isolation
// ──────────────────────────────────────────────

#[tokio::test]
async fn inline_iterations_see_parent_variables() {
    let result = run(scoped_map("INLINE"), json!({"items": [1, 2]}), json!({})).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(
        result.output,
        json!([{"item": 1, "limit": 10}, {"item": 2, "limit": 10}])
    );
    // Writes inside the iterations never reach the parent.
    assert_eq!(result.variables.get("limit"), Some(&json!(10)));
}

#[tokio::test]
async fn inline_iterations_do_not_see_sibling_writes() {
    let definition = json!({
        "StartAt": "Each",
        "States": {
            "Each": {
                "Type": "Map",
                "ItemsPath": "$.items",
                "MaxConcurrency": 1,
                "ItemProcessor": {
                    "StartAt": "Mark",
                    "States": {
                        "Mark": {
                            "Type": "Pass",
                            "Parameters": {"seen.$": "$mark"},
                            "Assign": {"mark": "taken"},
                            "End": true
                        }
                    }
                },
                "End": true
            }
        }
    });
    let result = run(definition, json!({"items": [1, 2, 3]}), json!({})).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(
        result.output,
        json!([{"seen": null}, {"seen": null}, {"seen": null}])
    );
    assert!(result.variables.get("mark").is_none());
    assert_eq!(result.map_executions[0].max_concurrency, 1);
}

#[tokio::test]
async fn distributed_iterations_start_empty() {
    let result = run(scoped_map("DISTRIBUTED"), json!({"items": [1, 2]}), json!({})).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(
        result.output,
        json!([{"item": 1, "limit": null}, {"item": 2, "limit": null}])
    );
    assert_eq!(result.variables.get("limit"), Some(&json!(10)));
    assert_eq!(result.map_executions[0].mode, "DISTRIBUTED");
}

#[tokio::test]
async fn parallel_branches_copy_the_parent_scope() {
    let definition = json!({
        "QueryLanguage": "JSONata",
        "StartAt": "Init",
        "States": {
            "Init": {"Type": "Pass", "Assign": {"owner": "parent"}, "Next": "Both"},
            "Both": {
                "Type": "Parallel",
                "Branches": [
                    {"StartAt": "Rename", "States": {
                        "Rename": {"Type": "Pass", "Assign": {"owner": "left"}, "Next": "Show"},
                        "Show": {"Type": "Pass", "Output": "{% $owner %}", "End": true}
                    }},
                    {"StartAt": "Peek", "States": {
                        "Peek": {"Type": "Pass", "Output": "{% $owner %}", "End": true}
                    }}
                ],
                "Next": "After"
            },
            "After": {
                "Type": "Pass",
                "Output": {"branches": "{% $states.input %}", "owner": "{% $owner %}"},
                "End": true
            }
        }
    });
    let result = run(definition, json!({}), json!({})).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(
        result.output,
        json!({"branches": ["left", "parent"], "owner": "parent"})
    );
}

// ──────────────────────────────────────────────
// Tolerated failures
// ──────────────────────────────────────────────

fn tolerant_map(tolerance: Value) -> Value {
    let mut map = json!({
        "Type": "Map",
        "ItemProcessor": {
            "ProcessorConfig": {"Mode": "DISTRIBUTED", "ExecutionType": "STANDARD"},
            "StartAt": "Work",
            "States": {"Work": {"Type": "Task", "Resource": "arn:aws:lambda:work", "End": true}}
        },
        "End": true
    });
    if let (Some(obj), Value::Object(extra)) = (map.as_object_mut(), tolerance) {
        obj.extend(extra);
    }
    json!({"StartAt": "Batch", "States": {"Batch": map}})
}

fn flaky_worker() -> Value {
    json!({
        "mocks": [{
            "state": "Work",
            "type": "conditional",
            "conditions": [
                {"when": {"input": {"n": 2}}, "error": {"type": "Work.Failed", "cause": "bad item"}}
            ],
            "default": {"done": true}
        }]
    })
}

fn three_items() -> Value {
    json!([{"n": 1}, {"n": 2}, {"n": 3}])
}

#[tokio::test]
async fn failures_within_tolerance_are_reported_in_place() {
    let definition = tolerant_map(json!({"ToleratedFailureCount": 1}));
    let result = run(definition, three_items(), flaky_worker()).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(
        result.output,
        json!([
            {"done": true},
            {"Error": "Work.Failed", "Cause": "bad item"},
            {"done": true}
        ])
    );
    assert_eq!(result.map_executions[0].failed_count, 1);
}

#[tokio::test]
async fn failures_past_the_count_fail_the_map() {
    let definition = tolerant_map(json!({"ToleratedFailureCount": 0}));
    let result = run(definition, three_items(), flaky_worker()).await;
    assert!(!result.success);
    assert_eq!(
        result.error.unwrap().error,
        "States.ExceedToleratedFailureThreshold"
    );
}

#[tokio::test]
async fn failures_past_the_percentage_fail_the_map() {
    // One of three is 33%.
    let definition = tolerant_map(json!({"ToleratedFailurePercentage": 30}));
    let result = run(definition, three_items(), flaky_worker()).await;
    assert!(!result.success);

    let definition = tolerant_map(json!({"ToleratedFailurePercentage": 50}));
    let result = run(definition, three_items(), flaky_worker()).await;
    assert!(result.success, "{:?}", result.error);
}

#[tokio::test]
async fn untolerated_failure_surfaces_the_iteration_error() {
    let definition = tolerant_map(json!({}));
    let result = run(definition, three_items(), flaky_worker()).await;
    assert!(!result.success);
    let error = result.error.unwrap();
    assert_eq!(error.error, "Work.Failed");
    assert_eq!(error.cause, "bad item");
}

// ──────────────────────────────────────────────
// ItemReader / ResultWriter
// ──────────────────────────────────────────────

#[tokio::test]
async fn item_reader_respects_max_items() {
    let definition = tolerant_map(json!({
        "ItemReader": {
            "Resource": "arn:aws:states:::s3:getObject",
            "ReaderConfig": {"MaxItems": 2}
        }
    }));
    let mock = json!({
        "mocks": [
            {"state": "Batch", "type": "itemReader", "data": [{"n": 1}, {"n": 3}, {"n": 5}]},
            {"state": "Work", "type": "fixed", "response": "ok"}
        ]
    });
    let result = run(definition, json!({}), mock).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.output, json!(["ok", "ok"]));
}

#[tokio::test]
async fn result_writer_replaces_output_with_a_summary() {
    let definition = tolerant_map(json!({
        "ToleratedFailureCount": 1,
        "ResultWriter": {
            "Resource": "arn:aws:states:::s3:putObject",
            "Parameters": {"Bucket": "results", "Prefix": "run"}
        }
    }));
    let result = run(definition, three_items(), flaky_worker()).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(
        result.output,
        json!({
            "processedCount": 2,
            "failedCount": 1,
            "pendingCount": 0,
            "totalCount": 3,
            "resultWriterDetails": {"Bucket": "results", "Prefix": "run"}
        })
    );
}
