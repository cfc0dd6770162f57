//! HTTP surface: the status page and the search endpoint.

mod api;
mod server;
mod status_page;

pub use server::{build_router, WebServer};
