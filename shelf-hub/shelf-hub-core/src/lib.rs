pub mod access;
pub mod auth;
pub mod block;
pub mod clock;
pub mod context;
pub mod error;
pub mod ingest;
pub mod limits;
pub mod planner;
pub mod search;
pub mod service;
pub mod store;
pub mod trash;
pub mod tree;
pub mod validation;

pub use context::RequestContext;
pub use error::{ErrorKind, HubError, Result};
pub use limits::Limits;
pub use service::ShelfService;
