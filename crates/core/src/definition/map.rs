//! Map and Parallel state shapes.

use serde_json::Value;

use super::reader::{self, Fields};
use super::{PathSetting, StateMachine};
use crate::error::{DefinitionError, QueryLanguage};
use crate::path::JsonPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorMode {
    Inline,
    Distributed,
}

impl ProcessorMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessorMode::Inline => "INLINE",
            ProcessorMode::Distributed => "DISTRIBUTED",
        }
    }
}

/// Data source for a distributed Map; the data itself comes from the mock.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemReader {
    pub resource: String,
    pub reader_config: Option<Value>,
    pub parameters: Option<Value>,
}

impl ItemReader {
    /// `ReaderConfig.MaxItems`, when given as a literal.
    pub fn max_items(&self) -> Option<usize> {
        self.reader_config
            .as_ref()
            .and_then(|c| c.get("MaxItems"))
            .and_then(Value::as_u64)
            .map(|n| n as usize)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemBatcher {
    pub max_items_per_batch: Option<Value>,
    pub max_items_per_batch_path: Option<JsonPath>,
    pub batch_input: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapState {
    pub processor: StateMachine,
    pub mode: ProcessorMode,
    pub execution_type: Option<String>,
    /// JSONPath only; default `$`.
    pub items_path: PathSetting,
    /// JSONata only: an array or an expression string.
    pub items: Option<Value>,
    /// `ItemSelector`, or its legacy spelling `Parameters`.
    pub item_selector: Option<Value>,
    pub item_reader: Option<ItemReader>,
    pub item_batcher: Option<ItemBatcher>,
    pub result_writer: Option<Value>,
    pub max_concurrency: Option<Value>,
    pub max_concurrency_path: Option<JsonPath>,
    pub tolerated_failure_count: Option<Value>,
    pub tolerated_failure_count_path: Option<JsonPath>,
    pub tolerated_failure_percentage: Option<Value>,
    pub tolerated_failure_percentage_path: Option<JsonPath>,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParallelState {
    pub branches: Vec<StateMachine>,
}

const PROCESSOR_KEYS: &[&str] = &["Comment", "StartAt", "States", "ProcessorConfig", "QueryLanguage"];
const READER_KEYS: &[&str] = &["Resource", "ReaderConfig", "Parameters", "Arguments"];
const BATCHER_KEYS: &[&str] = &[
    "MaxItemsPerBatch",
    "MaxItemsPerBatchPath",
    "MaxInputBytesPerBatch",
    "MaxInputBytesPerBatchPath",
    "BatchInput",
];

fn exclusive(state: &str, obj: &Fields, a: &str, b: &str) -> Result<(), DefinitionError> {
    if obj.contains_key(a) && obj.contains_key(b) {
        return Err(DefinitionError::invalid(
            state,
            b,
            format!("'{}' and '{}' are mutually exclusive", a, b),
        ));
    }
    Ok(())
}

pub(crate) fn parse_map(
    state: &str,
    obj: &Fields,
    dialect: QueryLanguage,
) -> Result<MapState, DefinitionError> {
    exclusive(state, obj, "ItemProcessor", "Iterator")?;
    exclusive(state, obj, "ItemSelector", "Parameters")?;
    exclusive(state, obj, "MaxConcurrency", "MaxConcurrencyPath")?;
    exclusive(state, obj, "ToleratedFailureCount", "ToleratedFailureCountPath")?;
    exclusive(
        state,
        obj,
        "ToleratedFailurePercentage",
        "ToleratedFailurePercentagePath",
    )?;

    let (processor_field, processor_value) = match (obj.get("ItemProcessor"), obj.get("Iterator")) {
        (Some(v), _) => ("ItemProcessor", v),
        (None, Some(v)) => ("Iterator", v),
        (None, None) => return Err(DefinitionError::missing(state, "ItemProcessor")),
    };
    let processor_obj = reader::object(state, processor_field, processor_value)?;
    reader::reject_unknown(state, processor_field, processor_obj, PROCESSOR_KEYS)?;

    let (mode, execution_type) = match processor_obj.get("ProcessorConfig") {
        None => (ProcessorMode::Inline, None),
        Some(config) => {
            let config = reader::object(state, "ProcessorConfig", config)?;
            let mode = match reader::optional_str(state, "Mode", config)?.as_deref() {
                None | Some("INLINE") => ProcessorMode::Inline,
                Some("DISTRIBUTED") => ProcessorMode::Distributed,
                Some(other) => {
                    return Err(DefinitionError::invalid(
                        state,
                        "ProcessorConfig",
                        format!("unknown Mode '{}'", other),
                    ))
                }
            };
            (mode, reader::optional_str(state, "ExecutionType", config)?)
        }
    };
    let processor = StateMachine::parse_nested(processor_value, dialect, state)?;

    if mode == ProcessorMode::Inline {
        for field in [
            "ItemReader",
            "ItemBatcher",
            "ResultWriter",
            "ToleratedFailureCount",
            "ToleratedFailureCountPath",
            "ToleratedFailurePercentage",
            "ToleratedFailurePercentagePath",
        ] {
            if obj.contains_key(field) {
                return Err(DefinitionError::invalid(
                    state,
                    field,
                    "only supported when ProcessorConfig.Mode is DISTRIBUTED",
                ));
            }
        }
    }

    let item_reader = match obj.get("ItemReader") {
        None => None,
        Some(v) => {
            let r = reader::object(state, "ItemReader", v)?;
            reader::reject_unknown(state, "ItemReader", r, READER_KEYS)?;
            Some(ItemReader {
                resource: reader::required_str(state, "Resource", r)?,
                reader_config: r.get("ReaderConfig").cloned(),
                parameters: r.get("Parameters").or_else(|| r.get("Arguments")).cloned(),
            })
        }
    };

    let item_batcher = match obj.get("ItemBatcher") {
        None => None,
        Some(v) => {
            let b = reader::object(state, "ItemBatcher", v)?;
            reader::reject_unknown(state, "ItemBatcher", b, BATCHER_KEYS)?;
            Some(ItemBatcher {
                max_items_per_batch: b.get("MaxItemsPerBatch").cloned(),
                max_items_per_batch_path: reader::optional_path(state, "MaxItemsPerBatchPath", b)?,
                batch_input: b.get("BatchInput").cloned(),
            })
        }
    };

    let item_selector = obj
        .get("ItemSelector")
        .or_else(|| obj.get("Parameters"))
        .cloned();
    let items = obj.get("Items").cloned();
    match dialect {
        QueryLanguage::JsonPath => {
            reader::check_payload_template(state, "ItemSelector", item_selector.as_ref())?;
        }
        QueryLanguage::JsonAta => {
            reader::check_expressions(state, "ItemSelector", item_selector.as_ref())?;
            reader::check_expressions(state, "Items", items.as_ref())?;
            if let Some(v) = &items {
                if !v.is_array() && !v.is_string() {
                    return Err(DefinitionError::invalid(
                        state,
                        "Items",
                        "expected an array or an expression",
                    ));
                }
            }
        }
    }

    Ok(MapState {
        processor,
        mode,
        execution_type,
        items_path: PathSetting::from_field(state, "ItemsPath", obj)?,
        items,
        item_selector,
        item_reader,
        item_batcher,
        result_writer: obj.get("ResultWriter").cloned(),
        max_concurrency: obj.get("MaxConcurrency").cloned(),
        max_concurrency_path: reader::optional_path(state, "MaxConcurrencyPath", obj)?,
        tolerated_failure_count: obj.get("ToleratedFailureCount").cloned(),
        tolerated_failure_count_path: reader::optional_path(
            state,
            "ToleratedFailureCountPath",
            obj,
        )?,
        tolerated_failure_percentage: obj.get("ToleratedFailurePercentage").cloned(),
        tolerated_failure_percentage_path: reader::optional_path(
            state,
            "ToleratedFailurePercentagePath",
            obj,
        )?,
        label: reader::optional_str(state, "Label", obj)?,
    })
}

pub(crate) fn parse_parallel(
    state: &str,
    obj: &Fields,
    dialect: QueryLanguage,
) -> Result<ParallelState, DefinitionError> {
    let items = obj
        .get("Branches")
        .ok_or_else(|| DefinitionError::missing(state, "Branches"))?
        .as_array()
        .ok_or_else(|| DefinitionError::invalid(state, "Branches", "expected an array"))?;
    if items.is_empty() {
        return Err(DefinitionError::invalid(state, "Branches", "must not be empty"));
    }
    let branches = items
        .iter()
        .map(|b| StateMachine::parse_nested(b, dialect, state))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ParallelState { branches })
}
