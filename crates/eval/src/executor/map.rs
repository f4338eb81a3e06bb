//! Inline and distributed Map states.
//!
//! Both modes share the same fan-out: items are resolved and selected in
//! order, each iteration runs the processor in its own child context, and
//! results are reassembled by index once every iteration has finished.
//! They differ in variable visibility (inline iterations copy the parent
//! scope, distributed ones start empty) and in failure handling (only
//! distributed maps honor tolerated-failure thresholds and `ResultWriter`).

use async_trait::async_trait;
use futures::future::{join_all, BoxFuture, FutureExt};
use serde_json::{json, Value};
use stepsim_core::definition::MapState;
use stepsim_core::{PathSetting, State, StateKind};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::{
    evaluate_field_with_context, numeric_setting, resolve_path, Runtime, StateExecutionResult,
    StateExecutor,
};
use crate::context::ExecutionContext;
use crate::driver::run_machine;
use crate::error::ExecError;
use crate::resolve::PathScope;
use crate::strategy::strategy_for;
use crate::trace::MapExecution;

#[derive(Debug, Clone, Copy, Default)]
pub struct InlineMapExecutor;

#[derive(Debug, Clone, Copy, Default)]
pub struct DistributedMapExecutor;

#[async_trait]
impl StateExecutor for InlineMapExecutor {
    async fn execute(
        &self,
        state: &State,
        input: &Value,
        ctx: &mut ExecutionContext,
        rt: &Runtime,
    ) -> Result<StateExecutionResult, ExecError> {
        run_map(state, input, ctx, rt, false).await
    }
}

#[async_trait]
impl StateExecutor for DistributedMapExecutor {
    async fn execute(
        &self,
        state: &State,
        input: &Value,
        ctx: &mut ExecutionContext,
        rt: &Runtime,
    ) -> Result<StateExecutionResult, ExecError> {
        run_map(state, input, ctx, rt, true).await
    }
}

fn map_state(state: &State) -> Result<&MapState, ExecError> {
    match &state.kind {
        StateKind::Map(map) => Ok(&**map),
        _ => Err(ExecError::Configuration(format!("'{}' is not a Map state", state.name))),
    }
}

/// Context object seen by `ItemSelector`: the parent's, plus `Map.Item`.
fn item_context(state: &State, ctx: &ExecutionContext, index: usize, item: &Value) -> Value {
    let mut context = ctx.context_object(&state.name);
    context["Map"] = json!({"Item": {"Index": index, "Value": item}});
    context
}

async fn resolve_items(
    state: &State,
    map: &MapState,
    effective: &Value,
    ctx: &ExecutionContext,
    rt: &Runtime,
) -> Result<Vec<Value>, ExecError> {
    if let Some(reader) = &map.item_reader {
        let data = rt
            .mock
            .item_reader_data(&state.name, effective)
            .await
            .map_err(|e| ExecError::TaskFailed {
                state: state.name.clone(),
                error: e.error,
                cause: e.cause,
            })?
            .ok_or_else(|| ExecError::MockResolution {
                state: state.name.clone(),
            })?;
        let mut items = data;
        if let Some(max) = reader.max_items().filter(|m| *m > 0) {
            items.truncate(max);
        }
        return Ok(items);
    }

    let source = if state.is_jsonata() {
        match &map.items {
            Some(items) => evaluate_field_with_context(
                items,
                state,
                effective,
                ctx.context_object(&state.name),
                ctx,
                "items",
            )?,
            None => effective.clone(),
        }
    } else {
        match &map.items_path {
            PathSetting::Path(p) => resolve_path(p, state, effective, ctx)?,
            PathSetting::Default | PathSetting::Null => effective.clone(),
        }
    };
    match source {
        Value::Array(items) => Ok(items),
        other => Err(ExecError::runtime(
            &state.name,
            format!("Map items must resolve to an array, got {}", other),
        )),
    }
}

/// Group items into `{"Items": [...], "BatchInput": ...}` objects.
fn batch_items(
    state: &State,
    map: &MapState,
    items: Vec<Value>,
    effective: &Value,
    ctx: &ExecutionContext,
) -> Result<Vec<Value>, ExecError> {
    let Some(batcher) = &map.item_batcher else {
        return Ok(items);
    };
    let size = numeric_setting(
        batcher.max_items_per_batch.as_ref(),
        batcher.max_items_per_batch_path.as_ref(),
        "MaxItemsPerBatch",
        state,
        effective,
        ctx,
    )?
    .map(|n| n as usize)
    .filter(|n| *n > 0)
    .unwrap_or(items.len().max(1));
    let batch_input = match &batcher.batch_input {
        Some(template) => Some(select(template, state, effective, ctx.context_object(&state.name), ctx)?),
        None => None,
    };
    Ok(items
        .chunks(size)
        .map(|chunk| {
            let mut batch = json!({"Items": chunk});
            if let Some(extra) = &batch_input {
                batch["BatchInput"] = extra.clone();
            }
            batch
        })
        .collect())
}

/// Evaluate an `ItemSelector`-style template in the state's dialect.
fn select(
    template: &Value,
    state: &State,
    effective: &Value,
    context: Value,
    ctx: &ExecutionContext,
) -> Result<Value, ExecError> {
    if state.is_jsonata() {
        return evaluate_field_with_context(template, state, effective, context, ctx, "selector");
    }
    let seed = ctx.seed_for(&state.name, "selector");
    PathScope {
        state: &state.name,
        input: effective,
        context: &context,
        variables: &ctx.variables,
        seed: &seed,
    }
    .expand_template(template)
}

/// Whether `failed` of `total` iterations is past the configured threshold.
/// `None` when no tolerance is configured at all.
fn tolerance_exceeded(
    state: &State,
    map: &MapState,
    effective: &Value,
    ctx: &ExecutionContext,
    failed: usize,
    total: usize,
) -> Result<Option<bool>, ExecError> {
    let count = numeric_setting(
        map.tolerated_failure_count.as_ref(),
        map.tolerated_failure_count_path.as_ref(),
        "ToleratedFailureCount",
        state,
        effective,
        ctx,
    )?;
    let percentage = numeric_setting(
        map.tolerated_failure_percentage.as_ref(),
        map.tolerated_failure_percentage_path.as_ref(),
        "ToleratedFailurePercentage",
        state,
        effective,
        ctx,
    )?;
    if count.is_none() && percentage.is_none() {
        return Ok(None);
    }
    let over_count = count.is_some_and(|c| failed as f64 > c);
    let over_pct = percentage.is_some_and(|p| total > 0 && (failed as f64 * 100.0 / total as f64) > p);
    Ok(Some(over_count || over_pct))
}

async fn run_map(
    state: &State,
    input: &Value,
    ctx: &mut ExecutionContext,
    rt: &Runtime,
    distributed: bool,
) -> Result<StateExecutionResult, ExecError> {
    let map = map_state(state)?;
    let strategy = strategy_for(state);
    let effective = strategy.preprocess(input, state, ctx)?;

    let items = resolve_items(state, map, &effective, ctx, rt).await?;
    let items = batch_items(state, map, items, &effective, ctx)?;
    let total = items.len();

    let limit = numeric_setting(
        map.max_concurrency.as_ref(),
        map.max_concurrency_path.as_ref(),
        "MaxConcurrency",
        state,
        &effective,
        ctx,
    )?
    .map(|n| n as usize)
    .filter(|n| *n > 0)
    .unwrap_or(rt.config.map_concurrency)
    .max(1);

    let mut children = Vec::with_capacity(total);
    for (index, item) in items.into_iter().enumerate() {
        let selected = match &map.item_selector {
            Some(template) => select(
                template,
                state,
                &effective,
                item_context(state, ctx, index, &item),
                ctx,
            )?,
            None => item.clone(),
        };
        children.push(ctx.child_for_map_item(&state.name, index, selected, item, distributed));
    }
    debug!(state = %state.name, mode = map.mode.as_str(), items = total, limit, "map fan-out");

    let semaphore = Semaphore::new(limit);
    let processor = &map.processor;
    let runs: Vec<BoxFuture<'_, (ExecutionContext, Result<Value, ExecError>)>> = children
        .into_iter()
        .map(|mut child| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore.acquire().await.ok();
                let result = run_machine(processor, &mut child, rt).await;
                (child, result)
            }
            .boxed()
        })
        .collect();
    let finished = join_all(runs).await;

    let mut outputs = Vec::with_capacity(total);
    let mut iteration_paths = Vec::with_capacity(total);
    let mut failures: Vec<(usize, ExecError)> = Vec::new();
    for (index, (child, result)) in finished.into_iter().enumerate() {
        iteration_paths.push(child.execution_path.clone());
        ctx.absorb(child);
        match result {
            Ok(value) => outputs.push(value),
            Err(err) => {
                outputs.push(err.error_output());
                failures.push((index, err));
            }
        }
    }
    ctx.map_executions.push(MapExecution {
        state_name: state.name.clone(),
        mode: map.mode.as_str().to_owned(),
        iteration_count: total,
        max_concurrency: limit,
        iteration_paths,
        failed_count: failures.len(),
    });

    if let Some(pos) = failures.iter().position(|(_, e)| !e.is_catchable()) {
        return Err(failures.swap_remove(pos).1);
    }
    if !failures.is_empty() {
        let tolerance = if distributed {
            tolerance_exceeded(state, map, &effective, ctx, failures.len(), total)?
        } else {
            None
        };
        match tolerance {
            Some(false) => {
                warn!(state = %state.name, failed = failures.len(), total, "tolerated map failures");
            }
            Some(true) => {
                return Err(ExecError::ToleratedFailureExceeded {
                    state: state.name.clone(),
                    failed: failures.len(),
                    total,
                })
            }
            None => {
                let (index, inner) = failures.remove(0);
                return Err(ExecError::BranchFailed {
                    state: state.name.clone(),
                    index,
                    inner: Box::new(inner),
                });
            }
        }
    }

    let result = match (&map.result_writer, distributed) {
        (Some(writer), true) => {
            let details = writer
                .get("Parameters")
                .or_else(|| writer.get("Arguments"))
                .cloned()
                .unwrap_or_else(|| json!({}));
            json!({
                "processedCount": total - failures.len(),
                "failedCount": failures.len(),
                "pendingCount": 0,
                "totalCount": total,
                "resultWriterDetails": details,
            })
        }
        _ => Value::Array(outputs),
    };
    let post = strategy.postprocess(result, input, state, ctx)?;
    Ok(StateExecutionResult::new(state, effective, post))
}
