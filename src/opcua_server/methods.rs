use opcua::server::prelude::*;
use opcua::server::{callbacks, session::SessionManager};
use opcua::sync::RwLock;
use opcua::types::service_types::Argument;
use std::sync::Arc;
use thiserror::Error;

use crate::job_control::{JobOrder, JobOrderController, JobStore, LocalizedText, ReturnCode};

/// Failure to turn method arguments into a controller call, or its result into outputs.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("missing input argument {0}")]
    MissingArgument(&'static str),
    #[error("input argument {name} must be {expected}")]
    WrongType {
        name: &'static str,
        expected: &'static str,
    },
    #[error("invalid job order: {0}")]
    InvalidJobOrder(#[source] serde_json::Error),
    #[error("failed to encode method output: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ControlError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ControlError::Encode(_) => StatusCode::BadInternalError,
            _ => StatusCode::BadInvalidArgument,
        }
    }
}

/// Methods of the JobOrderControl object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOrderMethod {
    Store,
    StoreAndStart,
    Update,
    Start,
    RevokeStart,
    Pause,
    Resume,
    Stop,
    Abort,
    Cancel,
    Clear,
    ListJobOrders,
    RequestJobResponseByJobOrderID,
    RequestJobResponseByJobOrderState,
}

impl JobOrderMethod {
    pub const ALL: [JobOrderMethod; 14] = [
        JobOrderMethod::Store,
        JobOrderMethod::StoreAndStart,
        JobOrderMethod::Update,
        JobOrderMethod::Start,
        JobOrderMethod::RevokeStart,
        JobOrderMethod::Pause,
        JobOrderMethod::Resume,
        JobOrderMethod::Stop,
        JobOrderMethod::Abort,
        JobOrderMethod::Cancel,
        JobOrderMethod::Clear,
        JobOrderMethod::ListJobOrders,
        JobOrderMethod::RequestJobResponseByJobOrderID,
        JobOrderMethod::RequestJobResponseByJobOrderState,
    ];

    pub fn browse_name(self) -> &'static str {
        match self {
            JobOrderMethod::Store => "Store",
            JobOrderMethod::StoreAndStart => "StoreAndStart",
            JobOrderMethod::Update => "Update",
            JobOrderMethod::Start => "Start",
            JobOrderMethod::RevokeStart => "RevokeStart",
            JobOrderMethod::Pause => "Pause",
            JobOrderMethod::Resume => "Resume",
            JobOrderMethod::Stop => "Stop",
            JobOrderMethod::Abort => "Abort",
            JobOrderMethod::Cancel => "Cancel",
            JobOrderMethod::Clear => "Clear",
            JobOrderMethod::ListJobOrders => "ListJobOrders",
            JobOrderMethod::RequestJobResponseByJobOrderID => "RequestJobResponseByJobOrderID",
            JobOrderMethod::RequestJobResponseByJobOrderState => "RequestJobResponseByJobOrderState",
        }
    }

    pub fn input_arguments(self) -> Vec<Argument> {
        match self {
            JobOrderMethod::Store | JobOrderMethod::StoreAndStart | JobOrderMethod::Update => vec![
                ("JobOrder", DataTypeId::String).into(),
                ("Comment", DataTypeId::LocalizedText).into(),
            ],
            JobOrderMethod::ListJobOrders => vec![],
            JobOrderMethod::RequestJobResponseByJobOrderID => {
                vec![("JobOrderID", DataTypeId::String).into()]
            }
            JobOrderMethod::RequestJobResponseByJobOrderState => {
                vec![("JobOrderState", DataTypeId::UInt32).into()]
            }
            _ => vec![
                ("JobOrderID", DataTypeId::String).into(),
                ("Comment", DataTypeId::LocalizedText).into(),
            ],
        }
    }

    pub fn output_arguments(self) -> Vec<Argument> {
        match self {
            JobOrderMethod::ListJobOrders => vec![
                ("JobOrderList", DataTypeId::String).into(),
                ("ReturnStatus", DataTypeId::UInt64).into(),
            ],
            JobOrderMethod::RequestJobResponseByJobOrderID => vec![
                ("JobResponse", DataTypeId::String).into(),
                ("ReturnStatus", DataTypeId::UInt64).into(),
            ],
            JobOrderMethod::RequestJobResponseByJobOrderState => vec![
                ("JobResponses", DataTypeId::String).into(),
                ("ReturnStatus", DataTypeId::UInt64).into(),
            ],
            _ => vec![("ReturnStatus", DataTypeId::UInt64).into()],
        }
    }
}

/// Decodes positional arguments, runs the controller operation and encodes its outputs.
///
/// Domain failures come back as a `ReturnStatus` output; only malformed
/// arguments or encoding failures produce an error.
pub fn invoke<S: JobStore>(
    controller: &JobOrderController<S>,
    method: JobOrderMethod,
    args: &[Variant],
) -> Result<Vec<Variant>, ControlError> {
    let outputs = match method {
        JobOrderMethod::Store
        | JobOrderMethod::StoreAndStart
        | JobOrderMethod::Update => {
            let job_order = job_order_arg(args, 0)?;
            let comment = comment_arg(args, 1)?;
            let code = match method {
                JobOrderMethod::Store => controller.store(job_order, &comment),
                JobOrderMethod::StoreAndStart => controller.store_and_start(job_order, &comment),
                _ => controller.update(job_order, &comment),
            };
            vec![return_status(code)]
        }
        JobOrderMethod::ListJobOrders => {
            let json = serde_json::to_string(&controller.list_job_orders())?;
            vec![json_output(json), return_status(ReturnCode::NoError)]
        }
        JobOrderMethod::RequestJobResponseByJobOrderID => {
            let id = string_arg(args, 0, "JobOrderID")?;
            let (response, code) = controller.request_job_response_by_job_order_id(&id);
            let json = match response {
                Some(response) => serde_json::to_string(&response)?,
                None => String::new(),
            };
            vec![json_output(json), return_status(code)]
        }
        JobOrderMethod::RequestJobResponseByJobOrderState => {
            let state_number = state_number_arg(args, 0)?;
            let (responses, code) = controller.request_job_response_by_job_order_state(state_number);
            let json = serde_json::to_string(&responses)?;
            vec![json_output(json), return_status(code)]
        }
        _ => {
            let id = string_arg(args, 0, "JobOrderID")?;
            let comment = comment_arg(args, 1)?;
            let code = match method {
                JobOrderMethod::Start => controller.start(&id, &comment),
                JobOrderMethod::RevokeStart => controller.revoke_start(&id, &comment),
                JobOrderMethod::Pause => controller.pause(&id, &comment),
                JobOrderMethod::Resume => controller.resume(&id, &comment),
                JobOrderMethod::Stop => controller.stop(&id, &comment),
                JobOrderMethod::Abort => controller.abort(&id, &comment),
                JobOrderMethod::Cancel => controller.cancel(&id, &comment),
                _ => controller.clear(&id, &comment),
            };
            vec![return_status(code)]
        }
    };
    Ok(outputs)
}

fn return_status(code: ReturnCode) -> Variant {
    Variant::UInt64(code.code())
}

fn json_output(json: String) -> Variant {
    Variant::String(UAString::from(json))
}

fn string_arg(args: &[Variant], index: usize, name: &'static str) -> Result<String, ControlError> {
    match args.get(index) {
        Some(Variant::String(value)) if !value.is_null() => Ok(value.as_ref().to_string()),
        Some(Variant::String(_)) | None | Some(Variant::Empty) => Err(ControlError::MissingArgument(name)),
        Some(_) => Err(ControlError::WrongType {
            name,
            expected: "a String",
        }),
    }
}

fn job_order_arg(args: &[Variant], index: usize) -> Result<JobOrder, ControlError> {
    let json = string_arg(args, index, "JobOrder")?;
    serde_json::from_str(&json).map_err(ControlError::InvalidJobOrder)
}

fn state_number_arg(args: &[Variant], index: usize) -> Result<u32, ControlError> {
    let wrong_type = ControlError::WrongType {
        name: "JobOrderState",
        expected: "an unsigned integer",
    };
    let number = match args.get(index) {
        None | Some(Variant::Empty) => return Err(ControlError::MissingArgument("JobOrderState")),
        Some(Variant::Byte(v)) => Some(u32::from(*v)),
        Some(Variant::UInt16(v)) => Some(u32::from(*v)),
        Some(Variant::UInt32(v)) => Some(*v),
        Some(Variant::UInt64(v)) => u32::try_from(*v).ok(),
        Some(Variant::Int16(v)) => u32::try_from(*v).ok(),
        Some(Variant::Int32(v)) => u32::try_from(*v).ok(),
        Some(Variant::Int64(v)) => u32::try_from(*v).ok(),
        Some(_) => None,
    };
    number.ok_or(wrong_type)
}

/// Comments are optional and accepted as LocalizedText, String, or arrays of either.
fn comment_arg(args: &[Variant], index: usize) -> Result<Vec<LocalizedText>, ControlError> {
    let mut comment = Vec::new();
    if let Some(value) = args.get(index) {
        collect_comment(value, &mut comment)?;
    }
    Ok(comment)
}

fn collect_comment(value: &Variant, comment: &mut Vec<LocalizedText>) -> Result<(), ControlError> {
    match value {
        Variant::Empty => {}
        Variant::String(text) => comment.push(LocalizedText::new("", text.as_ref())),
        Variant::LocalizedText(text) => {
            comment.push(LocalizedText::new(text.locale.as_ref(), text.text.as_ref()))
        }
        Variant::Array(array) => {
            for value in &array.values {
                collect_comment(value, comment)?;
            }
        }
        _ => {
            return Err(ControlError::WrongType {
                name: "Comment",
                expected: "LocalizedText or String",
            })
        }
    }
    Ok(())
}

/// Method callback bound to one JobOrderControl method.
pub struct JobOrderMethodHandler<S: JobStore> {
    method: JobOrderMethod,
    controller: Arc<JobOrderController<S>>,
}

impl<S: JobStore> JobOrderMethodHandler<S> {
    pub fn new(method: JobOrderMethod, controller: Arc<JobOrderController<S>>) -> Self {
        Self { method, controller }
    }
}

impl<S: JobStore> callbacks::Method for JobOrderMethodHandler<S> {
    fn call(
        &mut self,
        _session_id: &NodeId,
        _session_manager: Arc<RwLock<SessionManager>>,
        request: &CallMethodRequest,
    ) -> Result<CallMethodResult, StatusCode> {
        let args = request.input_arguments.as_deref().unwrap_or(&[]);

        match invoke(&self.controller, self.method, args) {
            Ok(outputs) => Ok(CallMethodResult {
                status_code: StatusCode::Good,
                input_argument_results: Some(vec![StatusCode::Good; args.len()]),
                input_argument_diagnostic_infos: None,
                output_arguments: Some(outputs),
            }),
            Err(e) => {
                tracing::warn!("{} call failed: {}", self.method.browse_name(), e);
                Err(e.status_code())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_control::{ChangeReceiver, JobState};

    fn controller() -> (JobOrderController, ChangeReceiver) {
        JobOrderController::in_memory()
    }

    fn order_json(id: &str) -> Variant {
        Variant::String(UAString::from(format!(r#"{{"jobOrderID": "{}", "priority": 2}}"#, id)))
    }

    fn id(id: &str) -> Variant {
        Variant::String(UAString::from(id))
    }

    fn code(outputs: &[Variant]) -> u64 {
        match outputs.last() {
            Some(Variant::UInt64(code)) => *code,
            other => panic!("expected a ReturnStatus, got {:?}", other),
        }
    }

    fn text(output: &Variant) -> String {
        match output {
            Variant::String(s) => s.as_ref().to_string(),
            other => panic!("expected a String, got {:?}", other),
        }
    }

    #[test]
    fn test_store_and_start_through_arguments() {
        let (controller, _rx) = controller();

        let outputs = invoke(&controller, JobOrderMethod::Store, &[order_json("J1")]).unwrap();
        assert_eq!(code(&outputs), 0);

        let outputs = invoke(&controller, JobOrderMethod::Start, &[id("J1"), Variant::Empty]).unwrap();
        assert_eq!(code(&outputs), 0);
        assert_eq!(controller.job("J1").unwrap().state, JobState::AllowedToStart);
        assert_eq!(controller.job("J1").unwrap().job_order.priority, 2);
    }

    #[test]
    fn test_domain_errors_are_return_codes() {
        let (controller, _rx) = controller();
        invoke(&controller, JobOrderMethod::Store, &[order_json("J1")]).unwrap();

        let duplicate = invoke(&controller, JobOrderMethod::StoreAndStart, &[order_json("J1")]).unwrap();
        assert_eq!(code(&duplicate), 4);

        let unknown = invoke(&controller, JobOrderMethod::Stop, &[id("J9")]).unwrap();
        assert_eq!(code(&unknown), 1);

        let invalid = invoke(&controller, JobOrderMethod::Pause, &[id("J1")]).unwrap();
        assert_eq!(code(&invalid), 32);
    }

    #[test]
    fn test_comment_forms() {
        let (controller, _rx) = controller();
        invoke(&controller, JobOrderMethod::Store, &[order_json("J1")]).unwrap();

        let localized = Variant::LocalizedText(Box::new(opcua::types::LocalizedText::new("en", "go")));
        let outputs = invoke(&controller, JobOrderMethod::Start, &[id("J1"), localized]).unwrap();
        assert_eq!(code(&outputs), 0);

        let plain = Variant::String(UAString::from("again"));
        let outputs = invoke(&controller, JobOrderMethod::Start, &[id("J1"), plain]).unwrap();
        assert_eq!(code(&outputs), 0);
        assert_eq!(controller.job("J1").unwrap().state, JobState::Running);
    }

    #[test]
    fn test_bad_arguments() {
        let (controller, _rx) = controller();

        let missing = invoke(&controller, JobOrderMethod::Start, &[]).unwrap_err();
        assert!(matches!(missing, ControlError::MissingArgument("JobOrderID")));
        assert_eq!(missing.status_code(), StatusCode::BadInvalidArgument);

        let wrong = invoke(&controller, JobOrderMethod::Start, &[Variant::Int32(5)]).unwrap_err();
        assert!(matches!(wrong, ControlError::WrongType { .. }));

        let malformed = Variant::String(UAString::from("{not json"));
        let invalid = invoke(&controller, JobOrderMethod::Store, &[malformed]).unwrap_err();
        assert!(matches!(invalid, ControlError::InvalidJobOrder(_)));

        let comment = invoke(&controller, JobOrderMethod::Abort, &[id("J1"), Variant::Double(1.0)]);
        assert!(matches!(comment, Err(ControlError::WrongType { name: "Comment", .. })));

        assert!(controller.jobs().is_empty());
    }

    #[test]
    fn test_query_outputs() {
        let (controller, _rx) = controller();
        invoke(&controller, JobOrderMethod::Store, &[order_json("J1")]).unwrap();

        let outputs = invoke(&controller, JobOrderMethod::ListJobOrders, &[]).unwrap();
        let list: serde_json::Value = serde_json::from_str(&text(&outputs[0])).unwrap();
        assert_eq!(list[0]["JobOrder"]["jobOrderID"], "J1");
        assert_eq!(list[0]["State"][0]["StateNumber"], 1);

        let outputs =
            invoke(&controller, JobOrderMethod::RequestJobResponseByJobOrderID, &[id("J1")]).unwrap();
        let response: serde_json::Value = serde_json::from_str(&text(&outputs[0])).unwrap();
        assert_eq!(response["jobOrderID"], "J1");
        assert_eq!(code(&outputs), 0);

        let outputs =
            invoke(&controller, JobOrderMethod::RequestJobResponseByJobOrderID, &[id("J2")]).unwrap();
        assert_eq!(text(&outputs[0]), "");
        assert_eq!(code(&outputs), 1);

        let outputs = invoke(
            &controller,
            JobOrderMethod::RequestJobResponseByJobOrderState,
            &[Variant::UInt32(1)],
        )
        .unwrap();
        let responses: serde_json::Value = serde_json::from_str(&text(&outputs[0])).unwrap();
        assert_eq!(responses.as_array().unwrap().len(), 1);

        let outputs = invoke(
            &controller,
            JobOrderMethod::RequestJobResponseByJobOrderState,
            &[Variant::Int32(-1)],
        );
        assert!(matches!(outputs, Err(ControlError::WrongType { .. })));
    }

    #[test]
    fn test_method_arguments_declared() {
        for method in JobOrderMethod::ALL {
            assert!(!method.output_arguments().is_empty(), "{}", method.browse_name());
        }
        assert_eq!(JobOrderMethod::Store.input_arguments().len(), 2);
        assert_eq!(JobOrderMethod::ListJobOrders.input_arguments().len(), 0);

        let start = JobOrderMethod::Start.input_arguments();
        assert_eq!(start[0].name.as_ref(), "JobOrderID");
        assert_eq!(start[0].data_type, NodeId::from(&DataTypeId::String));
        let status = JobOrderMethod::Start.output_arguments();
        assert_eq!(status[0].name.as_ref(), "ReturnStatus");
        assert_eq!(status[0].data_type, NodeId::from(&DataTypeId::UInt64));
    }
}
