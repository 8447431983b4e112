//! HTTP side of skopeo: fetches third-party pages, rewrites them so they
//! render through the proxy with the inspection agent installed, and serves
//! the agent script.

pub mod api;
pub mod app;
pub mod config;
pub mod proxy;
pub mod util;
