//! ApiRpc Action Model
//!
//! Resolution of action names to handlers, the built-in `Api` controller and
//! the request handler that turns request messages into replies.
//!
//! # Components
//!
//! - [`ActionRegistry`]: lookup table keyed by action name
//! - [`Controller`]: an action bound to the host that runs it
//! - [`ApiHandler`]: [`RequestHandler`] dispatching through a registry

pub mod action;
pub mod builtin;
pub mod handler;

pub use action::{ActionContext, ActionFuture, ActionRegistry, ApiAction, Controller};
pub use builtin::{register_api_controller, API_ALL, API_INFO};
pub use handler::{ApiHandler, RequestHandler};
