//! nginxui-engine: request/response adapter for the nginx add-on on
//! ASUSWRT-Merlin routers.
//!
//! Actions are posted to the firmware's `/start_apply.htm` handler as the
//! same multipart form the router's own pages submit, and the reply is
//! normalized into an [`EngineResponse`].

pub mod client;
pub mod engine;
pub mod form;
pub mod scrape;
pub mod types;

pub use client::RouterClient;
pub use engine::{Engine, EngineConfig, DEFAULT_WAIT_SECS};
pub use form::FormTemplate;
pub use scrape::{parse_html_response, resolve_body, FallbackPolicy};
pub use types::*;
