use opcua::server::prelude::*;
use opcua::sync::Mutex;
use std::sync::Arc;

use super::methods::{JobOrderMethod, JobOrderMethodHandler};
use crate::job_control::{JobOrderController, JobStore};

pub const NAMESPACE_URI: &str = "http://MyControledMachine-Namespace/UA";

/// Adds `MyControledMachine/JobManager/JobOrderControl` with its methods and the
/// `JobOrderList` variable. Returns the node ID of the JobOrderControl object.
pub fn add_job_manager<S: JobStore + 'static>(
    address_space: &mut AddressSpace,
    controller: Arc<JobOrderController<S>>,
) -> Result<NodeId, Box<dyn std::error::Error>> {
    let ns = address_space
        .register_namespace(NAMESPACE_URI)
        .map_err(|_| "failed to register machine namespace")?;

    let machine_folder = address_space
        .add_folder("MyControledMachine", "MyControledMachine", &NodeId::objects_folder_id())
        .map_err(|_| "failed to add MyControledMachine folder")?;
    let job_manager_folder = address_space
        .add_folder("JobManager", "JobManager", &machine_folder)
        .map_err(|_| "failed to add JobManager folder")?;

    let control_id = NodeId::new(ns, "JobManager.JobOrderControl");
    ObjectBuilder::new(&control_id, "JobOrderControl", "JobOrderControl")
        .organized_by(job_manager_folder)
        .insert(address_space);

    // Read through a getter so every read sees the list of the last accepted call
    let job_list = controller.subscribe_job_list();
    let getter = AttrFnGetter::new(
        move |_, _, _, _, _, _| -> Result<Option<DataValue>, StatusCode> {
            let json = serde_json::to_string(&*job_list.borrow())
                .map_err(|_| StatusCode::BadInternalError)?;
            Ok(Some(DataValue::new_now(UAString::from(json))))
        },
    );
    let mut job_list_variable = Variable::new(
        &NodeId::new(ns, "JobManager.JobOrderControl.JobOrderList"),
        "JobOrderList",
        "JobOrderList",
        UAString::from("[]"),
    );
    job_list_variable.set_value_getter(Arc::new(Mutex::new(getter)));
    address_space.add_variables(vec![job_list_variable], &control_id);

    for method in JobOrderMethod::ALL {
        let name = method.browse_name();
        let method_id = NodeId::new(ns, format!("JobManager.JobOrderControl.{}", name));
        MethodBuilder::new(&method_id, name, name)
            .component_of(control_id.clone())
            .input_args(address_space, &method.input_arguments())
            .output_args(address_space, &method.output_arguments())
            .callback(Box::new(JobOrderMethodHandler::new(method, controller.clone())))
            .insert(address_space);
    }

    tracing::info!(
        "JobOrderControl registered with {} methods in namespace {}",
        JobOrderMethod::ALL.len(),
        ns
    );

    Ok(control_id)
}
