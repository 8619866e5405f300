pub mod auth;
pub mod profile;
pub mod responses;
pub mod router;
pub mod state;

pub use responses::{ApiMessage, JobSubmission, json_error};
pub use state::AppState;
