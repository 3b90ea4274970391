//! HTTP surface: a single gate applied to every request, and the server that hosts it.

mod handler;
mod server;

pub use handler::{build_router, ADMITTED_BODY, REJECTED_BODY};
pub use server::HttpServer;
