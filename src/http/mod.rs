//! HTTP API for driving practice sessions from a client
//!
//! - POST /sessions - Create and begin a session
//! - POST /sessions/:id/listen/start - Start capturing the learner's turn
//! - POST /sessions/:id/listen/stop - Finish the turn, returns the outcome
//! - POST /sessions/:id/cancel - Interrupt the pending reply or playback
//! - POST /sessions/:id/end - End the session, returns feedback
//! - GET /sessions/:id/status - Query session state
//! - GET /sessions/:id/transcript - Turns so far
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{CreateSessionRequest, ErrorResponse, DEFAULT_TOPIC};
pub use routes::create_router;
pub use state::{AppState, SessionEntry, SessionTemplate};
