//! Per-variant field whitelists and replacement suggestions.

use std::fmt;

use crate::error::QueryLanguage;

/// ASL state types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateType {
    Task,
    Pass,
    Wait,
    Choice,
    Succeed,
    Fail,
    Map,
    Parallel,
}

impl StateType {
    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "Task" => StateType::Task,
            "Pass" => StateType::Pass,
            "Wait" => StateType::Wait,
            "Choice" => StateType::Choice,
            "Succeed" => StateType::Succeed,
            "Fail" => StateType::Fail,
            "Map" => StateType::Map,
            "Parallel" => StateType::Parallel,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StateType::Task => "Task",
            StateType::Pass => "Pass",
            StateType::Wait => "Wait",
            StateType::Choice => "Choice",
            StateType::Succeed => "Succeed",
            StateType::Fail => "Fail",
            StateType::Map => "Map",
            StateType::Parallel => "Parallel",
        }
    }

    /// Choice, Succeed and Fail carry no `Next`/`End`.
    pub fn has_transition(&self) -> bool {
        !matches!(self, StateType::Choice | StateType::Succeed | StateType::Fail)
    }
}

impl fmt::Display for StateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The (type × dialect) tag of a state. Each variant owns a static list of
/// the fields it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateVariant {
    TaskJsonPath,
    TaskJsonata,
    PassJsonPath,
    PassJsonata,
    WaitJsonPath,
    WaitJsonata,
    ChoiceJsonPath,
    ChoiceJsonata,
    SucceedJsonPath,
    SucceedJsonata,
    FailJsonPath,
    FailJsonata,
    MapJsonPath,
    MapJsonata,
    ParallelJsonPath,
    ParallelJsonata,
}

/// Accepted by every state regardless of type or dialect.
pub const COMMON_FIELDS: &[&str] = &["Type", "Comment", "QueryLanguage"];

const TASK_JSONPATH: &[&str] = &[
    "Next",
    "End",
    "InputPath",
    "OutputPath",
    "Parameters",
    "ResultSelector",
    "ResultPath",
    "Retry",
    "Catch",
    "Assign",
    "Resource",
    "TimeoutSeconds",
    "TimeoutSecondsPath",
    "HeartbeatSeconds",
    "HeartbeatSecondsPath",
    "Credentials",
];

const TASK_JSONATA: &[&str] = &[
    "Next",
    "End",
    "Arguments",
    "Output",
    "Assign",
    "Retry",
    "Catch",
    "Resource",
    "TimeoutSeconds",
    "HeartbeatSeconds",
    "Credentials",
];

const PASS_JSONPATH: &[&str] = &[
    "Next",
    "End",
    "InputPath",
    "OutputPath",
    "Parameters",
    "ResultPath",
    "Result",
    "Assign",
];

const PASS_JSONATA: &[&str] = &["Next", "End", "Output", "Assign"];

const WAIT_JSONPATH: &[&str] = &[
    "Next",
    "End",
    "InputPath",
    "OutputPath",
    "Seconds",
    "SecondsPath",
    "Timestamp",
    "TimestampPath",
    "Assign",
];

const WAIT_JSONATA: &[&str] = &["Next", "End", "Output", "Assign", "Seconds", "Timestamp"];

const CHOICE_JSONPATH: &[&str] = &["InputPath", "OutputPath", "Choices", "Default", "Assign"];

const CHOICE_JSONATA: &[&str] = &["Choices", "Default", "Output", "Assign"];

const SUCCEED_JSONPATH: &[&str] = &["InputPath", "OutputPath"];

const SUCCEED_JSONATA: &[&str] = &["Output"];

const FAIL_JSONPATH: &[&str] = &["Error", "ErrorPath", "Cause", "CausePath"];

const FAIL_JSONATA: &[&str] = &["Error", "Cause"];

const MAP_JSONPATH: &[&str] = &[
    "Next",
    "End",
    "InputPath",
    "OutputPath",
    "Parameters",
    "ItemSelector",
    "ResultSelector",
    "ResultPath",
    "Retry",
    "Catch",
    "Assign",
    "ItemsPath",
    "ItemProcessor",
    "Iterator",
    "ItemReader",
    "ItemBatcher",
    "ResultWriter",
    "MaxConcurrency",
    "MaxConcurrencyPath",
    "ToleratedFailureCount",
    "ToleratedFailureCountPath",
    "ToleratedFailurePercentage",
    "ToleratedFailurePercentagePath",
    "Label",
];

const MAP_JSONATA: &[&str] = &[
    "Next",
    "End",
    "Output",
    "Assign",
    "Retry",
    "Catch",
    "Items",
    "ItemSelector",
    "ItemProcessor",
    "ItemReader",
    "ItemBatcher",
    "ResultWriter",
    "MaxConcurrency",
    "ToleratedFailureCount",
    "ToleratedFailurePercentage",
    "Label",
];

const PARALLEL_JSONPATH: &[&str] = &[
    "Next",
    "End",
    "InputPath",
    "OutputPath",
    "Parameters",
    "ResultSelector",
    "ResultPath",
    "Retry",
    "Catch",
    "Assign",
    "Branches",
];

const PARALLEL_JSONATA: &[&str] = &[
    "Next",
    "End",
    "Arguments",
    "Output",
    "Assign",
    "Retry",
    "Catch",
    "Branches",
];

impl StateVariant {
    pub fn new(state_type: StateType, dialect: QueryLanguage) -> Self {
        use QueryLanguage::{JsonAta, JsonPath};
        match (state_type, dialect) {
            (StateType::Task, JsonPath) => StateVariant::TaskJsonPath,
            (StateType::Task, JsonAta) => StateVariant::TaskJsonata,
            (StateType::Pass, JsonPath) => StateVariant::PassJsonPath,
            (StateType::Pass, JsonAta) => StateVariant::PassJsonata,
            (StateType::Wait, JsonPath) => StateVariant::WaitJsonPath,
            (StateType::Wait, JsonAta) => StateVariant::WaitJsonata,
            (StateType::Choice, JsonPath) => StateVariant::ChoiceJsonPath,
            (StateType::Choice, JsonAta) => StateVariant::ChoiceJsonata,
            (StateType::Succeed, JsonPath) => StateVariant::SucceedJsonPath,
            (StateType::Succeed, JsonAta) => StateVariant::SucceedJsonata,
            (StateType::Fail, JsonPath) => StateVariant::FailJsonPath,
            (StateType::Fail, JsonAta) => StateVariant::FailJsonata,
            (StateType::Map, JsonPath) => StateVariant::MapJsonPath,
            (StateType::Map, JsonAta) => StateVariant::MapJsonata,
            (StateType::Parallel, JsonPath) => StateVariant::ParallelJsonPath,
            (StateType::Parallel, JsonAta) => StateVariant::ParallelJsonata,
        }
    }

    pub fn state_type(&self) -> StateType {
        match self {
            StateVariant::TaskJsonPath | StateVariant::TaskJsonata => StateType::Task,
            StateVariant::PassJsonPath | StateVariant::PassJsonata => StateType::Pass,
            StateVariant::WaitJsonPath | StateVariant::WaitJsonata => StateType::Wait,
            StateVariant::ChoiceJsonPath | StateVariant::ChoiceJsonata => StateType::Choice,
            StateVariant::SucceedJsonPath | StateVariant::SucceedJsonata => StateType::Succeed,
            StateVariant::FailJsonPath | StateVariant::FailJsonata => StateType::Fail,
            StateVariant::MapJsonPath | StateVariant::MapJsonata => StateType::Map,
            StateVariant::ParallelJsonPath | StateVariant::ParallelJsonata => StateType::Parallel,
        }
    }

    pub fn dialect(&self) -> QueryLanguage {
        match self {
            StateVariant::TaskJsonata
            | StateVariant::PassJsonata
            | StateVariant::WaitJsonata
            | StateVariant::ChoiceJsonata
            | StateVariant::SucceedJsonata
            | StateVariant::FailJsonata
            | StateVariant::MapJsonata
            | StateVariant::ParallelJsonata => QueryLanguage::JsonAta,
            _ => QueryLanguage::JsonPath,
        }
    }

    /// Type-specific fields accepted by this variant (excluding
    /// [`COMMON_FIELDS`]).
    pub fn supported_fields(&self) -> &'static [&'static str] {
        match self {
            StateVariant::TaskJsonPath => TASK_JSONPATH,
            StateVariant::TaskJsonata => TASK_JSONATA,
            StateVariant::PassJsonPath => PASS_JSONPATH,
            StateVariant::PassJsonata => PASS_JSONATA,
            StateVariant::WaitJsonPath => WAIT_JSONPATH,
            StateVariant::WaitJsonata => WAIT_JSONATA,
            StateVariant::ChoiceJsonPath => CHOICE_JSONPATH,
            StateVariant::ChoiceJsonata => CHOICE_JSONATA,
            StateVariant::SucceedJsonPath => SUCCEED_JSONPATH,
            StateVariant::SucceedJsonata => SUCCEED_JSONATA,
            StateVariant::FailJsonPath => FAIL_JSONPATH,
            StateVariant::FailJsonata => FAIL_JSONATA,
            StateVariant::MapJsonPath => MAP_JSONPATH,
            StateVariant::MapJsonata => MAP_JSONATA,
            StateVariant::ParallelJsonPath => PARALLEL_JSONPATH,
            StateVariant::ParallelJsonata => PARALLEL_JSONATA,
        }
    }

    pub fn supports(&self, field: &str) -> bool {
        COMMON_FIELDS.contains(&field) || self.supported_fields().contains(&field)
    }
}

/// Replacement to suggest when `field` is rejected by a state in `dialect`.
pub fn suggestion(field: &str, dialect: QueryLanguage) -> Option<String> {
    match dialect {
        QueryLanguage::JsonAta => {
            let replacement = match field {
                "Parameters" | "InputPath" => "Arguments",
                "ResultSelector" | "OutputPath" => "Output",
                "ResultPath" => "Output or Assign",
                "ItemsPath" => "Items",
                "SecondsPath" => "Seconds",
                "TimestampPath" => "Timestamp",
                "ErrorPath" => "Error",
                "CausePath" => "Cause",
                "MaxConcurrencyPath" => "MaxConcurrency",
                "TimeoutSecondsPath" => "TimeoutSeconds",
                "HeartbeatSecondsPath" => "HeartbeatSeconds",
                "ToleratedFailureCountPath" => "ToleratedFailureCount",
                "ToleratedFailurePercentagePath" => "ToleratedFailurePercentage",
                "Iterator" => "ItemProcessor",
                "Result" => "Output",
                _ => return None,
            };
            Some(replacement.to_owned())
        }
        QueryLanguage::JsonPath => match field {
            "Arguments" | "Output" | "Items" | "Condition" => {
                Some("QueryLanguage: JSONata".to_owned())
            }
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_round_trips_type_and_dialect() {
        for ty in [
            StateType::Task,
            StateType::Pass,
            StateType::Wait,
            StateType::Choice,
            StateType::Succeed,
            StateType::Fail,
            StateType::Map,
            StateType::Parallel,
        ] {
            for dialect in [QueryLanguage::JsonPath, QueryLanguage::JsonAta] {
                let variant = StateVariant::new(ty, dialect);
                assert_eq!(variant.state_type(), ty);
                assert_eq!(variant.dialect(), dialect);
            }
        }
    }

    #[test]
    fn jsonata_variants_reject_path_fields() {
        let task = StateVariant::TaskJsonata;
        for field in ["InputPath", "Parameters", "ResultSelector", "ResultPath", "OutputPath"] {
            assert!(!task.supports(field), "{} should be rejected", field);
        }
        assert!(task.supports("Arguments"));
        assert!(task.supports("Comment"));
    }

    #[test]
    fn jsonpath_variants_reject_expression_fields() {
        assert!(!StateVariant::PassJsonPath.supports("Output"));
        assert!(!StateVariant::MapJsonPath.supports("Items"));
        assert!(StateVariant::MapJsonPath.supports("ItemsPath"));
    }

    #[test]
    fn terminal_variants_have_no_transition_fields() {
        for v in [
            StateVariant::SucceedJsonPath,
            StateVariant::FailJsonata,
            StateVariant::ChoiceJsonPath,
        ] {
            assert!(!v.supports("Next"));
            assert!(!v.supports("End"));
        }
    }

    #[test]
    fn suggestions_name_the_replacement() {
        assert_eq!(
            suggestion("Parameters", QueryLanguage::JsonAta).as_deref(),
            Some("Arguments")
        );
        assert_eq!(
            suggestion("ResultPath", QueryLanguage::JsonAta).as_deref(),
            Some("Output or Assign")
        );
        assert_eq!(
            suggestion("Output", QueryLanguage::JsonPath).as_deref(),
            Some("QueryLanguage: JSONata")
        );
        assert_eq!(suggestion("Bogus", QueryLanguage::JsonAta), None);
    }
}
