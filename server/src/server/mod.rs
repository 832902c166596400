pub mod websocket;

pub use websocket::{AppState, ws_handler};
