//! OPC UA demo machine exposing ISA-95 job order control.
//!
//! - `job_control`: job lifecycle, store, controller, notifier and ticker
//! - `opcua_server`: JobOrderControl object, methods and the published job list
//! - `ws_bridge`: job list and status events over HTTP/WebSocket
//! - `config`: command line and environment settings

pub mod config;
pub mod job_control;
pub mod opcua_server;
pub mod ws_bridge;
