//! Pooled HTTP clients with concurrent, deadline-bounded batch execution.
//!
//! ```no_run
//! use http_fanout::{ClientConfig, Context, HttpClientPool, HttpRequest};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = HttpClientPool::new(&ClientConfig::from_env()?)?;
//! let (ctx, _cancel) = Context::background().with_timeout(Duration::from_millis(200));
//!
//! let mut batch = pool.batch();
//! batch.add(HttpRequest::get(&ctx, "http://localhost:8080/a")?);
//! batch.add(HttpRequest::post(&ctx, "http://localhost:8080/b", "payload")?);
//!
//! for request in batch.execute(&ctx).await {
//!     match request.error() {
//!         None => println!("{} -> {:?}", request.url(), request.status()),
//!         Some(error) => println!("{} failed: {error}", request.url()),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod models;
pub mod services;
pub mod utils;

pub use app::config::{ClientConfig, ConfigError};
pub use models::{BuildError, HttpRequest, HttpResponse, RequestError};
pub use services::{
    BatchContext, CancelHandle, ClientHandle, Context, HttpClientPool, Transport, TransportError,
};
