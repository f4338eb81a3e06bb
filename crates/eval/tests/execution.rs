//! End-to-end execution tests.
//!
//! Each test builds a definition as JSON, runs it through
//! `StateMachineExecutor` against a `ConfigMockEngine`, and checks the
//! output together with the visited path. Covers:
//!
//! 1. Choice routing on a numeric comparison
//! 2. Map fan-out with ordered reassembly
//! 3. Parallel fan-out with ordered reassembly
//! 4. Catch merging the error output under a ResultPath
//! 5. Wait clamping
//! 6. Retry, Catch and the step guard
//! 7. JSONata Assign/Output and Choice overrides from the mock

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use stepsim_eval::{
    ConfigMockEngine, EngineConfig, ExecuteOptions, ExecutionResult, StateMachineExecutor,
};

// ──────────────────────────────────────────────
// Test fixtures
// ──────────────────────────────────────────────

fn mocks(config: Value) -> Arc<ConfigMockEngine> {
    Arc::new(ConfigMockEngine::from_value(config).unwrap())
}

fn executor(definition: Value, mock: Arc<ConfigMockEngine>) -> StateMachineExecutor {
    StateMachineExecutor::from_definition(&definition, mock).unwrap()
}

async fn run(definition: Value, input: Value, mock: Value) -> ExecutionResult {
    executor(definition, mocks(mock))
        .execute(input, ExecuteOptions::default())
        .await
}

fn no_mocks() -> Value {
    json!({"mocks": []})
}

fn routing_machine() -> Value {
    json!({
        "StartAt": "Route",
        "States": {
            "Route": {
                "Type": "Choice",
                "Choices": [
                    {"Variable": "$.amount", "NumericGreaterThan": 100, "Next": "High"}
                ],
                "Default": "Low"
            },
            "High": {"Type": "Pass", "Result": "high", "ResultPath": "$.tier", "End": true},
            "Low": {"Type": "Pass", "Result": "low", "ResultPath": "$.tier", "End": true}
        }
    })
}

// ──────────────────────────────────────────────
// Choice
// ──────────────────────────────────────────────

#[tokio::test]
async fn choice_routes_large_amounts_high() {
    let result = run(routing_machine(), json!({"amount": 150}), no_mocks()).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.execution_path, vec!["Route", "High"]);
    assert_eq!(result.output, json!({"amount": 150, "tier": "high"}));
}

#[tokio::test]
async fn choice_falls_back_to_default() {
    let result = run(routing_machine(), json!({"amount": 50}), no_mocks()).await;
    assert!(result.success);
    assert_eq!(result.execution_path, vec!["Route", "Low"]);
    assert_eq!(result.output["tier"], json!("low"));
}

#[tokio::test]
async fn choice_without_match_or_default_fails() {
    let definition = json!({
        "StartAt": "Route",
        "States": {
            "Route": {
                "Type": "Choice",
                "Choices": [{"Variable": "$.kind", "StringEquals": "a", "Next": "A"}]
            },
            "A": {"Type": "Succeed"}
        }
    });
    let result = run(definition, json!({"kind": "b"}), no_mocks()).await;
    assert!(!result.success);
    assert_eq!(result.output, Value::Null);
    assert_eq!(result.error.unwrap().error, "States.NoChoiceMatched");
}

#[tokio::test]
async fn mock_can_force_a_choice_branch() {
    let mock = json!({
        "mocks": [{"state": "Route", "type": "fixed", "response": {"Next": "Low"}}]
    });
    let result = run(routing_machine(), json!({"amount": 500}), mock).await;
    assert!(result.success);
    assert_eq!(result.execution_path, vec!["Route", "Low"]);
}

// ──────────────────────────────────────────────
// Map and Parallel
// ──────────────────────────────────────────────

#[tokio::test]
async fn map_doubles_every_item_in_order() {
    let definition = json!({
        "QueryLanguage": "JSONata",
        "StartAt": "Double",
        "States": {
            "Double": {
                "Type": "Map",
                "Items": "{% $states.input.values %}",
                "ItemProcessor": {
                    "StartAt": "Times2",
                    "States": {
                        "Times2": {
                            "Type": "Pass",
                            "Output": {"doubled": "{% $states.input * 2 %}"},
                            "End": true
                        }
                    }
                },
                "End": true
            }
        }
    });
    let result = run(definition, json!({"values": [1, 2, 3]}), no_mocks()).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(
        result.output,
        json!([{"doubled": 2}, {"doubled": 4}, {"doubled": 6}])
    );
    assert_eq!(result.map_executions.len(), 1);
    assert_eq!(result.map_executions[0].iteration_count, 3);
    assert_eq!(result.map_executions[0].mode, "INLINE");
}

#[tokio::test]
async fn map_output_keeps_item_order() {
    let definition = json!({
        "StartAt": "Fetch",
        "States": {
            "Fetch": {
                "Type": "Map",
                "ItemProcessor": {
                    "StartAt": "Lookup",
                    "States": {
                        "Lookup": {"Type": "Task", "Resource": "arn:aws:lambda:lookup", "End": true}
                    }
                },
                "End": true
            }
        }
    });
    let mock = json!({
        "mocks": [{
            "state": "Lookup",
            "type": "conditional",
            "conditions": [
                {"when": {"input": {"id": 1}}, "response": {"name": "one"}},
                {"when": {"input": {"id": 2}}, "response": {"name": "two"}}
            ],
            "default": {"name": "other"}
        }]
    });
    let result = run(definition, json!([{"id": 1}, {"id": 2}, {"id": 3}]), mock).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(
        result.output,
        json!([{"name": "one"}, {"name": "two"}, {"name": "other"}])
    );
}

#[tokio::test]
async fn parallel_outputs_follow_branch_order() {
    let definition = json!({
        "StartAt": "Both",
        "States": {
            "Both": {
                "Type": "Parallel",
                "Branches": [
                    {"StartAt": "One", "States": {
                        "One": {"Type": "Task", "Resource": "arn:aws:lambda:one", "End": true}
                    }},
                    {"StartAt": "Two", "States": {
                        "Two": {"Type": "Pass", "Result": {"branch": 2}, "End": true}
                    }}
                ],
                "End": true
            }
        }
    });
    let mock = json!({
        "mocks": [{"state": "One", "type": "fixed", "response": {"branch": 1}, "delayMs": 20}]
    });
    for _ in 0..3 {
        let result = run(definition.clone(), json!({}), mock.clone()).await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.output, json!([{"branch": 1}, {"branch": 2}]));
        assert_eq!(result.parallel_executions[0].branch_count, 2);
    }
}

#[tokio::test]
async fn fail_inside_parallel_is_caught_as_branch_failure() {
    let definition = json!({
        "StartAt": "Both",
        "States": {
            "Both": {
                "Type": "Parallel",
                "Branches": [
                    {"StartAt": "Ok", "States": {"Ok": {"Type": "Pass", "End": true}}},
                    {"StartAt": "Boom", "States": {
                        "Boom": {"Type": "Fail", "Error": "Custom.Error", "Cause": "branch two"}
                    }}
                ],
                "Catch": [
                    {"ErrorEquals": ["States.BranchFailed"], "ResultPath": "$.failure", "Next": "Recovered"}
                ],
                "End": true
            },
            "Recovered": {"Type": "Succeed"}
        }
    });
    let result = run(definition, json!({"order": 9}), no_mocks()).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.execution_path.last().unwrap(), "Recovered");
    assert_eq!(
        result.output,
        json!({"order": 9, "failure": {"Error": "Custom.Error", "Cause": "branch two"}})
    );
}

// ──────────────────────────────────────────────
// Catch, Retry and the step guard
// ──────────────────────────────────────────────

fn charge_machine(retry: Value) -> Value {
    json!({
        "StartAt": "Charge",
        "States": {
            "Charge": {
                "Type": "Task",
                "Resource": "arn:aws:lambda:charge",
                "ResultPath": "$.receipt",
                "Retry": retry,
                "Catch": [{"ErrorEquals": ["States.ALL"], "ResultPath": "$.error", "Next": "Refund"}],
                "Next": "Done"
            },
            "Refund": {"Type": "Pass", "End": true},
            "Done": {"Type": "Succeed"}
        }
    })
}

#[tokio::test]
async fn catch_merges_error_output_and_keeps_input() {
    let mock = json!({
        "mocks": [{
            "state": "Charge",
            "type": "error",
            "error": {"type": "Payment.Declined", "cause": "card expired"}
        }]
    });
    let result = run(charge_machine(json!([])), json!({"orderId": "A-1"}), mock).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.execution_path, vec!["Charge", "Refund"]);
    assert_eq!(
        result.output,
        json!({
            "orderId": "A-1",
            "error": {"Error": "Payment.Declined", "Cause": "card expired"}
        })
    );
}

#[tokio::test]
async fn retry_recovers_from_transient_failures() {
    let mock = mocks(json!({
        "mocks": [{
            "state": "Charge",
            "type": "stateful",
            "responses": [
                {"error": {"type": "Service.Busy", "cause": "try later"}},
                {"error": {"type": "Service.Busy", "cause": "try later"}},
                {"id": "r-1"}
            ]
        }]
    }));
    let retry = json!([{"ErrorEquals": ["Service.Busy"], "MaxAttempts": 3, "IntervalSeconds": 1}]);
    let result = executor(charge_machine(retry), Arc::clone(&mock))
        .execute(json!({"orderId": "A-2"}), ExecuteOptions { verbose: true, ..Default::default() })
        .await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.execution_path, vec!["Charge", "Done"]);
    assert_eq!(result.output, json!({"orderId": "A-2", "receipt": {"id": "r-1"}}));
    assert_eq!(mock.call_count("Charge"), 3);

    let traces = result.state_executions.unwrap();
    assert_eq!(traces[0].state_name, "Charge");
    assert_eq!(traces[0].retry_count, 2);
}

#[tokio::test]
async fn exhausted_retries_fall_through_to_catch() {
    let mock = mocks(json!({
        "mocks": [{"state": "Charge", "type": "error", "error": {"type": "Service.Busy", "cause": "down"}}]
    }));
    let retry = json!([{"ErrorEquals": ["States.TaskFailed"], "MaxAttempts": 2}]);
    let result = executor(charge_machine(retry), Arc::clone(&mock))
        .execute(json!({}), ExecuteOptions::default())
        .await;
    assert!(result.success);
    assert_eq!(result.execution_path, vec!["Charge", "Refund"]);
    assert_eq!(result.output["error"]["Error"], json!("Service.Busy"));
    // One initial attempt plus two retries.
    assert_eq!(mock.call_count("Charge"), 3);
}

#[tokio::test]
async fn long_backoff_chains_run_to_catch() {
    let mock = mocks(json!({
        "mocks": [{"state": "Charge", "type": "error", "error": {"type": "Service.Busy", "cause": "down"}}]
    }));
    let retry = json!([{"ErrorEquals": ["States.ALL"], "MaxAttempts": 80, "BackoffRate": 2.0}]);
    let result = executor(charge_machine(retry), Arc::clone(&mock))
        .execute(json!({}), ExecuteOptions::default())
        .await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.execution_path, vec!["Charge", "Refund"]);
    assert_eq!(mock.call_count("Charge"), 81);
}

#[tokio::test]
async fn missing_mock_is_a_task_failure() {
    let definition = json!({
        "StartAt": "Call",
        "States": {"Call": {"Type": "Task", "Resource": "arn:aws:lambda:x", "End": true}}
    });
    let result = run(definition, json!({}), no_mocks()).await;
    assert!(!result.success);
    assert_eq!(result.error.unwrap().error, "States.TaskFailed");
}

#[tokio::test]
async fn endless_loop_stops_at_the_step_guard() {
    let definition = json!({
        "StartAt": "Ping",
        "States": {
            "Ping": {"Type": "Pass", "Next": "Pong"},
            "Pong": {"Type": "Pass", "Next": "Ping"}
        }
    });
    let result = executor(definition, mocks(no_mocks()))
        .execute(json!({}), ExecuteOptions { max_steps: Some(7), verbose: false })
        .await;
    assert!(!result.success);
    assert_eq!(result.execution_path.len(), 7);
    let error = result.error.unwrap();
    assert_eq!(error.error, "States.Runtime");
    assert!(error.cause.contains("7"), "{}", error.cause);
}

#[tokio::test]
async fn step_guard_applies_inside_map_iterations() {
    let definition = json!({
        "StartAt": "Spin",
        "States": {
            "Spin": {
                "Type": "Map",
                "ItemProcessor": {
                    "StartAt": "Loop",
                    "States": {"Loop": {"Type": "Pass", "Next": "Loop"}}
                },
                "Catch": [{"ErrorEquals": ["States.ALL"], "Next": "Never"}],
                "End": true
            },
            "Never": {"Type": "Succeed"}
        }
    });
    let config = EngineConfig {
        max_steps: 20,
        ..EngineConfig::default()
    };
    let result = executor(definition, mocks(no_mocks()))
        .with_config(config)
        .execute(json!([1, 2]), ExecuteOptions::default())
        .await;
    assert!(!result.success);
    assert!(!result.execution_path.contains(&"Never".to_string()));
}

// ──────────────────────────────────────────────
// Wait
// ──────────────────────────────────────────────

#[tokio::test]
async fn wait_is_clamped_and_passes_input_through() {
    let definition = json!({
        "StartAt": "Pause",
        "States": {"Pause": {"Type": "Wait", "Seconds": 5, "End": true}}
    });
    let started = Instant::now();
    let result = run(definition, json!({"keep": [1, 2]}), no_mocks()).await;
    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(result.success);
    assert_eq!(result.output, json!({"keep": [1, 2]}));
}

#[tokio::test]
async fn oversized_wait_from_input_is_clamped() {
    let definition = json!({
        "StartAt": "Pause",
        "States": {"Pause": {"Type": "Wait", "SecondsPath": "$.s", "End": true}}
    });
    let started = Instant::now();
    let result = run(definition, json!({"s": 1e20}), no_mocks()).await;
    assert!(started.elapsed() < Duration::from_millis(100));
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.output, json!({"s": 1e20}));
}

// ──────────────────────────────────────────────
// JSONata
// ──────────────────────────────────────────────

#[tokio::test]
async fn jsonata_assign_is_visible_to_later_states() {
    let definition = json!({
        "QueryLanguage": "JSONata",
        "StartAt": "Sum",
        "States": {
            "Sum": {
                "Type": "Pass",
                "Assign": {"total": "{% $states.input.a + $states.input.b %}"},
                "Next": "Report"
            },
            "Report": {
                "Type": "Pass",
                "Output": {"sum": "{% $total %}", "label": "{% 'n=' & $string($total) %}"},
                "End": true
            }
        }
    });
    let result = run(definition, json!({"a": 2, "b": 3}), no_mocks()).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.output, json!({"sum": 5, "label": "n=5"}));
    assert_eq!(result.variables.get("total"), Some(&json!(5)));
}

#[tokio::test]
async fn jsonata_task_sees_arguments_and_shapes_result() {
    let definition = json!({
        "QueryLanguage": "JSONata",
        "StartAt": "Lookup",
        "States": {
            "Lookup": {
                "Type": "Task",
                "Resource": "arn:aws:lambda:lookup",
                "Arguments": {"id": "{% $states.input.userId %}"},
                "Output": "{% $merge([$states.input, {'user': $states.result}]) %}",
                "End": true
            }
        }
    });
    let mock = json!({
        "mocks": [{
            "state": "Lookup",
            "type": "conditional",
            "conditions": [{"when": {"input": {"id": 7}}, "response": {"name": "Ada"}}]
        }]
    });
    let result = run(definition, json!({"userId": 7}), mock).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.output, json!({"userId": 7, "user": {"name": "Ada"}}));
}

// ──────────────────────────────────────────────
// Determinism
// ──────────────────────────────────────────────

#[tokio::test]
async fn identical_runs_give_identical_results() {
    let definition = json!({
        "StartAt": "Stamp",
        "States": {
            "Stamp": {
                "Type": "Pass",
                "Parameters": {
                    "items.$": "$.items",
                    "id.$": "States.UUID()",
                    "roll.$": "States.MathRandom(1, 100)",
                    "name.$": "$$.Execution.Name"
                },
                "Next": "Fan"
            },
            "Fan": {
                "Type": "Map",
                "ItemsPath": "$.items",
                "ItemProcessor": {
                    "StartAt": "Echo",
                    "States": {"Echo": {"Type": "Task", "Resource": "arn:aws:lambda:echo", "End": true}}
                },
                "ResultPath": "$.results",
                "End": true
            }
        }
    });
    let mock = mocks(json!({
        "mocks": [{"state": "Echo", "type": "fixed", "response": {"ok": true}}]
    }));
    let exec = executor(definition, mock);
    let input = json!({"items": [1, 2, 3]});

    let first = exec.execute(input.clone(), ExecuteOptions::default()).await;
    let second = exec.execute(input, ExecuteOptions::default()).await;
    assert!(first.success, "{:?}", first.error);
    assert_eq!(first.output, second.output);
    assert_eq!(first.execution_path, second.execution_path);
}
