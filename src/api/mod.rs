pub mod client_ip;
pub mod handlers;
pub mod routes;

pub use handlers::{AppState, OpenQuery, OpenResponse};
pub use routes::create_router;
