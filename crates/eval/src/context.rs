//! Per-execution mutable state and the `$$` context object.

use std::sync::Arc;

use serde_json::{json, Map, Value};

use crate::config::EngineConfig;
use crate::trace::{MapExecution, ParallelExecution, StateExecution};

const ACCOUNT: &str = "000000000000";
const REGION: &str = "local";

/// Fixed identifiers shared by a top-level run and all of its children.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionMetadata {
    pub execution_id: String,
    pub execution_name: String,
    pub state_machine_id: String,
    pub state_machine_name: String,
    pub start_time: String,
    pub role_arn: String,
    pub execution_input: Value,
    pub random_seed: u64,
}

impl ExecutionMetadata {
    pub fn new(config: &EngineConfig, execution_input: Value) -> Self {
        let sm = &config.state_machine_name;
        ExecutionMetadata {
            execution_id: format!(
                "arn:aws:states:{}:{}:execution:{}:{}",
                REGION, ACCOUNT, sm, config.execution_name
            ),
            execution_name: config.execution_name.clone(),
            state_machine_id: format!("arn:aws:states:{}:{}:stateMachine:{}", REGION, ACCOUNT, sm),
            state_machine_name: sm.clone(),
            start_time: config.start_time.clone(),
            role_arn: format!("arn:aws:iam::{}:role/StepsimLocalRole", ACCOUNT),
            execution_input,
            random_seed: config.random_seed,
        }
    }
}

/// Where a context sits in the fan-out tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Scope {
    Root,
    MapIteration { parent: String, index: usize },
    DistributedIteration { parent: String, index: usize },
    Branch { parent: String, index: usize },
}

impl Scope {
    pub fn parent(&self) -> Option<(&str, usize)> {
        match self {
            Scope::Root => None,
            Scope::MapIteration { parent, index }
            | Scope::DistributedIteration { parent, index }
            | Scope::Branch { parent, index } => Some((parent, *index)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapItem {
    pub index: usize,
    pub value: Value,
}

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub input: Value,
    pub original_input: Value,
    pub variables: Map<String, Value>,
    pub current_state: String,
    pub execution_path: Vec<String>,
    pub state_executions: Vec<StateExecution>,
    pub map_executions: Vec<MapExecution>,
    pub parallel_executions: Vec<ParallelExecution>,
    pub metadata: Arc<ExecutionMetadata>,
    pub map_item: Option<MapItem>,
    pub retry_count: u32,
    pub scope: Scope,
    /// Unique position in the fan-out tree, e.g. `Fan[1]/Items[3]`.
    pub lineage: String,
}

impl ExecutionContext {
    pub fn new(input: Value, metadata: Arc<ExecutionMetadata>) -> Self {
        ExecutionContext {
            original_input: input.clone(),
            input,
            variables: Map::new(),
            current_state: String::new(),
            execution_path: Vec::new(),
            state_executions: Vec::new(),
            map_executions: Vec::new(),
            parallel_executions: Vec::new(),
            metadata,
            map_item: None,
            retry_count: 0,
            scope: Scope::Root,
            lineage: String::new(),
        }
    }

    fn child(&self, input: Value, variables: Map<String, Value>, scope: Scope) -> Self {
        let (parent, index) = scope.parent().unwrap_or(("", 0));
        let lineage = if self.lineage.is_empty() {
            format!("{}[{}]", parent, index)
        } else {
            format!("{}/{}[{}]", self.lineage, parent, index)
        };
        let mut ctx = ExecutionContext::new(input, Arc::clone(&self.metadata));
        ctx.variables = variables;
        ctx.scope = scope;
        ctx.lineage = lineage;
        ctx
    }

    /// Context for one Map iteration. Inline iterations see a copy of the
    /// parent's variables; distributed iterations start from an empty scope.
    pub fn child_for_map_item(
        &self,
        parent_state: &str,
        index: usize,
        input: Value,
        item: Value,
        distributed: bool,
    ) -> Self {
        let (variables, scope) = if distributed {
            (
                Map::new(),
                Scope::DistributedIteration {
                    parent: parent_state.to_owned(),
                    index,
                },
            )
        } else {
            (
                self.variables.clone(),
                Scope::MapIteration {
                    parent: parent_state.to_owned(),
                    index,
                },
            )
        };
        let mut ctx = self.child(input, variables, scope);
        ctx.map_item = Some(MapItem { index, value: item });
        ctx
    }

    /// Context for one Parallel branch, with its own copy of the variables.
    pub fn child_for_branch(&self, parent_state: &str, index: usize, input: Value) -> Self {
        self.child(
            input,
            self.variables.clone(),
            Scope::Branch {
                parent: parent_state.to_owned(),
                index,
            },
        )
    }

    /// The `$$` object as seen from `state_name`.
    pub fn context_object(&self, state_name: &str) -> Value {
        let meta = &self.metadata;
        let mut obj = json!({
            "Execution": {
                "Id": meta.execution_id,
                "Input": meta.execution_input,
                "Name": meta.execution_name,
                "RoleArn": meta.role_arn,
                "StartTime": meta.start_time,
                "RedriveCount": 0,
            },
            "State": {
                "EnteredTime": meta.start_time,
                "Name": state_name,
                "RetryCount": self.retry_count,
            },
            "StateMachine": {
                "Id": meta.state_machine_id,
                "Name": meta.state_machine_name,
            },
            "Task": {
                "Token": crate::entropy::uuid(&self.seed_for(state_name, "task-token")),
            },
        });
        if let Some(item) = &self.map_item {
            obj["Map"] = json!({"Item": {"Index": item.index, "Value": item.value}});
        }
        obj
    }

    /// Stable seed for deterministic ids and random numbers generated at a
    /// given call site.
    pub fn seed_for(&self, state_name: &str, site: &str) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.metadata.execution_id, self.lineage, state_name, site, self.metadata.random_seed
        )
    }

    /// Record a state visit, tagging it with this context's fan-out parent.
    pub fn record(&mut self, mut execution: StateExecution) {
        if let Some((parent, index)) = self.scope.parent() {
            execution.parent_state = Some(parent.to_owned());
            execution.iteration_index = Some(index);
        }
        self.state_executions.push(execution);
    }

    /// Fold a finished child's telemetry into this context.
    pub fn absorb(&mut self, child: ExecutionContext) {
        self.state_executions.extend(child.state_executions);
        self.map_executions.extend(child.map_executions);
        self.parallel_executions.extend(child.parallel_executions);
    }

    pub fn apply_assignments(&mut self, assignments: Map<String, Value>) {
        for (name, value) in assignments {
            self.variables.insert(name, value);
        }
    }
}
