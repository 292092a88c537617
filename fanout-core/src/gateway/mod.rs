//! # HTTP Gateway
//!
//! axum front end for the pipeline: a JSON API (`POST /fanout`), a
//! server-rendered form page (`GET /`, `POST /`) and a health probe.

mod page;
mod server;

pub use page::{PageContext, render_page};
pub use server::{AppState, SharedState, router, run};
