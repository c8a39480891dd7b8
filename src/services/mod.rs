pub mod atomic_metrics;
pub mod batch_executor;
pub mod context;
pub mod http_client_pool;
pub mod transport;

pub use atomic_metrics::{AtomicMetrics, MetricsSnapshot};
pub use batch_executor::BatchContext;
pub use context::{CancelHandle, Context};
pub use http_client_pool::{ClientHandle, HttpClientPool};
pub use transport::{ReqwestTransport, Transport, TransportError};
