pub mod bridge;

pub use bridge::{router, start_ws_server, AppState, EventFilter};
