//! HTTP API for driving one coaching session from a browser front end
//!
//! - GET /session - Current state, timeline and gate
//! - POST /session/configure - Set language, scenario and topic
//! - POST /session/chat/start, /session/chat/stop - Text mode
//! - POST /session/message - Send a text turn
//! - POST /session/assessment - Request the report (gated)
//! - GET /session/report, /session/report/export - Fetch or download the report
//! - POST /session/reset - Start over
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
