use opcua::server::prelude::*;
use opcua::sync::RwLock;
use std::sync::Arc;

use super::job_manager::add_job_manager;
use crate::config::Config;
use crate::job_control::{JobOrderController, JobStore};

pub async fn start_job_server<S: JobStore + 'static>(
    config: Config,
    controller: Arc<JobOrderController<S>>,
) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        "Starting {} OPC UA Server on port {}",
        config.application_name,
        config.opcua_port
    );

    let server = ServerBuilder::new_anonymous(config.application_name.clone())
        .application_uri(config.application_uri.clone())
        .discovery_urls(vec!["/".into()])
        .create_sample_keypair(true)
        .pki_dir(config.pki_dir.clone())
        .discovery_server_url(None)
        .host_and_port(config.opcua_host.clone(), config.opcua_port)
        .server()
        .ok_or("invalid OPC UA server configuration")?;

    {
        let address_space = server.address_space();
        let mut address_space = address_space.write();
        add_job_manager(&mut address_space, controller)?;
    }

    Server::new_server_task(Arc::new(RwLock::new(server))).await;
    Ok(())
}
