use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// ISA-95 job order state. Numeric codes follow the JobOrderControl state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum JobState {
    NotAllowedToStart,
    AllowedToStart,
    Running,
    Interrupted,
    Ended,
    Aborted,
}

impl JobState {
    pub const ALL: [JobState; 6] = [
        JobState::NotAllowedToStart,
        JobState::AllowedToStart,
        JobState::Running,
        JobState::Interrupted,
        JobState::Ended,
        JobState::Aborted,
    ];

    pub fn number(self) -> u32 {
        match self {
            JobState::NotAllowedToStart => 1,
            JobState::AllowedToStart => 2,
            JobState::Running => 3,
            JobState::Interrupted => 4,
            JobState::Ended => 5,
            JobState::Aborted => 6,
        }
    }

    pub fn from_number(number: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.number() == number)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::NotAllowedToStart => "NotAllowedToStart",
            JobState::AllowedToStart => "AllowedToStart",
            JobState::Running => "Running",
            JobState::Interrupted => "Interrupted",
            JobState::Ended => "Ended",
            JobState::Aborted => "Aborted",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Ended | JobState::Aborted)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result code of a job order control method (ISA-95 ReturnStatus).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnCode {
    NoError = 0,
    UnknownJobOrderId = 1,
    InvalidJobOrderStatus = 3,
    UnableToAcceptJobOrder = 4,
    InvalidRequest = 32,
}

impl ReturnCode {
    pub fn code(self) -> u64 {
        self as u64
    }

    pub fn is_ok(self) -> bool {
        self == ReturnCode::NoError
    }

    pub(crate) fn from_transition(accepted: bool) -> Self {
        if accepted {
            ReturnCode::NoError
        } else {
            ReturnCode::InvalidRequest
        }
    }
}

/// Outcome of a finished job as reported in job responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum JobResult {
    Unknown = 0,
    Successful = 1,
    Unsuccessful = 2,
}

impl From<JobState> for JobResult {
    fn from(state: JobState) -> Self {
        match state {
            JobState::Ended => JobResult::Successful,
            JobState::Aborted => JobResult::Unsuccessful,
            _ => JobResult::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    #[serde(default)]
    pub locale: String,
    pub text: String,
}

impl LocalizedText {
    pub fn new(locale: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            text: text.into(),
        }
    }
}

/// Free-form payload value carried through job orders untouched.
///
/// Decoded through `serde_json::Value` so numbers keep their JSON form even
/// when serde_json runs with `arbitrary_precision`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    List(Vec<ParameterValue>),
    Record(BTreeMap<String, ParameterValue>),
}

impl From<serde_json::Value> for ParameterValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => ParameterValue::Null,
            serde_json::Value::Bool(b) => ParameterValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => ParameterValue::Int(i),
                None => n.as_f64().map_or(ParameterValue::Null, ParameterValue::Double),
            },
            serde_json::Value::String(s) => ParameterValue::String(s),
            serde_json::Value::Array(items) => {
                ParameterValue::List(items.into_iter().map(ParameterValue::from).collect())
            }
            serde_json::Value::Object(fields) => ParameterValue::Record(
                fields
                    .into_iter()
                    .map(|(key, value)| (key, ParameterValue::from(value)))
                    .collect(),
            ),
        }
    }
}

impl<'de> Deserialize<'de> for ParameterValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(ParameterValue::from)
    }
}

impl Default for ParameterValue {
    fn default() -> Self {
        ParameterValue::Null
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub description: Vec<LocalizedText>,
    #[serde(default)]
    pub value: ParameterValue,
    #[serde(default)]
    pub engineering_units: Option<String>,
    #[serde(default)]
    pub subparameters: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkMaster {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(default)]
    pub description: Option<LocalizedText>,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
}

/// ISA-95 job order. Only `job_order_id` is interpreted by the job control logic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobOrder {
    #[serde(rename = "jobOrderID")]
    pub job_order_id: String,
    #[serde(default)]
    pub description: Vec<LocalizedText>,
    #[serde(default, rename = "workMasterID")]
    pub work_master_id: Vec<WorkMaster>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub priority: i16,
    #[serde(default)]
    pub job_order_parameters: Vec<Parameter>,
    #[serde(default)]
    pub personnel_requirements: Vec<ParameterValue>,
    #[serde(default)]
    pub equipment_requirements: Vec<ParameterValue>,
    #[serde(default)]
    pub physical_asset_requirements: Vec<ParameterValue>,
    #[serde(default)]
    pub material_requirements: Vec<ParameterValue>,
}

impl JobOrder {
    /// Job order with the given ID and every descriptive field left empty.
    pub fn new(job_order_id: impl Into<String>) -> Self {
        Self {
            job_order_id: job_order_id.into(),
            description: Vec::new(),
            work_master_id: Vec::new(),
            start_time: None,
            end_time: None,
            priority: 0,
            job_order_parameters: Vec::new(),
            personnel_requirements: Vec::new(),
            equipment_requirements: Vec::new(),
            physical_asset_requirements: Vec::new(),
            material_requirements: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StateRecord {
    pub state_text: LocalizedText,
    pub state_number: u32,
}

impl From<JobState> for StateRecord {
    fn from(state: JobState) -> Self {
        Self {
            state_text: LocalizedText::new("en-En", state.as_str()),
            state_number: state.number(),
        }
    }
}

/// Published job list element: the order plus its current state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobOrderAndState {
    pub job_order: JobOrder,
    pub state: Vec<StateRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "jobOrderID")]
    pub job_order_id: String,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub job_state: Vec<StateRecord>,
    pub job_result: JobResult,
    #[serde(default)]
    pub job_response_data: Vec<Parameter>,
}

/// Status event emitted for every job change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobStatusEvent {
    pub job_order: JobOrder,
    pub job_response: JobResponse,
    pub job_state: Vec<StateRecord>,
    pub time: DateTime<Utc>,
}

impl JobStatusEvent {
    pub fn job_order_id(&self) -> &str {
        &self.job_order.job_order_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_numbers() {
        let numbers: Vec<u32> = JobState::ALL.iter().map(|s| s.number()).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(JobState::from_number(3), Some(JobState::Running));
        assert_eq!(JobState::from_number(0), None);
        assert_eq!(JobState::from_number(7), None);
    }

    #[test]
    fn test_return_codes() {
        assert_eq!(ReturnCode::NoError.code(), 0);
        assert_eq!(ReturnCode::UnknownJobOrderId.code(), 1);
        assert_eq!(ReturnCode::InvalidJobOrderStatus.code(), 3);
        assert_eq!(ReturnCode::UnableToAcceptJobOrder.code(), 4);
        assert_eq!(ReturnCode::InvalidRequest.code(), 32);
    }

    #[test]
    fn test_job_order_from_json() {
        let json = r#"{
            "jobOrderID": "J1",
            "description": [{"locale": "en-US", "text": "Coat 20 panels"}],
            "priority": 3,
            "jobOrderParameters": [
                {"ID": "P1", "value": 23.5, "engineeringUnits": "degC"},
                {"ID": "P2", "value": [1, "two", {"three": true}]}
            ],
            "materialRequirements": ["steel", 4]
        }"#;

        let order: JobOrder = serde_json::from_str(json).unwrap();
        assert_eq!(order.job_order_id, "J1");
        assert_eq!(order.priority, 3);
        assert_eq!(order.job_order_parameters[0].value, ParameterValue::Double(23.5));
        assert!(matches!(
            &order.job_order_parameters[1].value,
            ParameterValue::List(items) if items.len() == 3
        ));
        assert_eq!(
            order.material_requirements,
            vec![ParameterValue::String("steel".into()), ParameterValue::Int(4)]
        );
        assert!(order.start_time.is_none());
    }

    #[test]
    fn test_parameter_value_keeps_numbers() {
        let value: ParameterValue =
            serde_json::from_str(r#"{"setpoint": 23.5, "count": -3, "big": 1e300}"#).unwrap();
        let ParameterValue::Record(fields) = &value else {
            panic!("expected a record, got {:?}", value);
        };
        assert_eq!(fields["setpoint"], ParameterValue::Double(23.5));
        assert_eq!(fields["count"], ParameterValue::Int(-3));
        assert_eq!(fields["big"], ParameterValue::Double(1e300));
        assert_eq!(fields.len(), 3);

        let json = serde_json::to_string(&ParameterValue::Double(23.5)).unwrap();
        assert_eq!(json, "23.5");
    }

    #[test]
    fn test_state_record_text() {
        let record = StateRecord::from(JobState::Interrupted);
        assert_eq!(record.state_text.text, "Interrupted");
        assert_eq!(record.state_number, 4);
    }

    #[test]
    fn test_job_result_from_state() {
        assert_eq!(JobResult::from(JobState::Ended), JobResult::Successful);
        assert_eq!(JobResult::from(JobState::Aborted), JobResult::Unsuccessful);
        assert_eq!(JobResult::from(JobState::Running), JobResult::Unknown);
    }
}
