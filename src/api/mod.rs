pub mod admin;
pub mod debug;
pub mod debug_gate;
pub mod health;
pub mod metrics;
pub mod public;
pub mod request_id;
