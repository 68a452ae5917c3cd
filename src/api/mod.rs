mod artifacts;
mod documents;
mod error;
mod internal;
mod jobs;
pub mod middleware;
mod server;
pub mod state;
mod webhooks;

pub use server::{build_router, run};
