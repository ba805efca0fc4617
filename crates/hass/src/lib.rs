//! Wire types for the Home Assistant REST API.
//!
//! Only the slice of the API that growlink talks to is modelled here:
//! `GET /api/states`, `POST /api/services/{domain}/{service}` and `GET /api/`.

pub mod service;
pub mod state;

pub use service::ServiceCall;
pub use state::{ApiInfo, State};
