use crate::app::config::{ClientConfig, ConfigError};
use crate::services::atomic_metrics::AtomicMetrics;
use crate::services::batch_executor::BatchContext;
use crate::services::transport::{ReqwestTransport, Transport};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::info;

/// One pooled client. Cheap to clone; clones share the same transport.
#[derive(Clone)]
pub struct ClientHandle {
    index: usize,
    transport: Arc<dyn Transport>,
    metrics: Arc<AtomicMetrics>,
}

impl ClientHandle {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn metrics(&self) -> &Arc<AtomicMetrics> {
        &self.metrics
    }

    /// True when both handles drive the same underlying client.
    pub fn same_client(&self, other: &ClientHandle) -> bool {
        Arc::ptr_eq(&self.transport, &other.transport)
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct HttpClientPool {
    clients: Vec<ClientHandle>,
    current_index: AtomicUsize,
    metrics: Arc<AtomicMetrics>,
}

impl HttpClientPool {
    pub fn new(config: &ClientConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut transports: Vec<Arc<dyn Transport>> = Vec::with_capacity(config.pool_size);
        for index in 0..config.pool_size {
            transports.push(Arc::new(ReqwestTransport::from_config(config, index)?));
        }

        info!(
            pool_size = config.pool_size,
            max_idle_per_client = config.per_client_max_idle_conns_per_host(),
            max_conns_per_client = config.per_client_max_conns_per_host(),
            "http client pool ready"
        );
        Self::from_transports(transports)
    }

    pub fn from_transports(transports: Vec<Arc<dyn Transport>>) -> Result<Self, ConfigError> {
        if transports.is_empty() {
            return Err(ConfigError::ZeroPoolSize);
        }

        let metrics = Arc::new(AtomicMetrics::new());
        let clients = transports
            .into_iter()
            .enumerate()
            .map(|(index, transport)| ClientHandle {
                index,
                transport,
                metrics: Arc::clone(&metrics),
            })
            .collect();

        Ok(Self {
            clients,
            current_index: AtomicUsize::new(0),
            metrics,
        })
    }

    /// Round-robin over the pooled clients. Lock-free; under contention the
    /// rotation is only approximately uniform.
    pub fn next_client(&self) -> ClientHandle {
        let index = self.current_index.fetch_add(1, Ordering::Relaxed) % self.clients.len();
        self.clients[index].clone()
    }

    /// A new batch bound to the next client in rotation.
    pub fn batch(&self) -> BatchContext {
        BatchContext::new(self)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }

    pub fn metrics(&self) -> &Arc<AtomicMetrics> {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::response::HttpResponse;
    use crate::services::transport::TransportError;
    use async_trait::async_trait;
    use proptest::prelude::*;

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn execute(&self, _request: reqwest::Request) -> Result<HttpResponse, TransportError> {
            Err(TransportError::Other("null transport".to_string()))
        }
    }

    fn null_pool(size: usize) -> HttpClientPool {
        let transports = (0..size)
            .map(|_| Arc::new(NullTransport) as Arc<dyn Transport>)
            .collect();
        HttpClientPool::from_transports(transports).unwrap()
    }

    #[test]
    fn test_empty_pool_is_a_config_error() {
        let err = HttpClientPool::from_transports(Vec::new()).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroPoolSize));

        let config = ClientConfig {
            pool_size: 0,
            ..ClientConfig::default()
        };
        assert!(matches!(
            HttpClientPool::new(&config),
            Err(ConfigError::ZeroPoolSize)
        ));
    }

    #[test]
    fn test_new_builds_one_client_per_slot() {
        let config = ClientConfig {
            pool_size: 3,
            ..ClientConfig::default()
        };
        let pool = HttpClientPool::new(&config).unwrap();
        assert_eq!(pool.len(), 3);
        assert!(!pool.is_empty());
    }

    #[test]
    fn test_first_client_is_index_zero() {
        let pool = null_pool(3);
        assert_eq!(pool.next_client().index(), 0);
        assert_eq!(pool.next_client().index(), 1);
    }

    #[test]
    fn test_handles_share_pool_metrics() {
        let pool = null_pool(2);
        pool.next_client().metrics().increment_timed_out();
        pool.next_client().metrics().increment_timed_out();
        assert_eq!(pool.metrics().get_timed_out(), 2);
    }

    #[test]
    fn test_concurrent_rotation_visits_every_client() {
        let pool = Arc::new(null_pool(4));
        let seen: Vec<usize> = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..8)
                .map(|_| {
                    let pool = Arc::clone(&pool);
                    scope.spawn(move || (0..50).map(|_| pool.next_client().index()).collect::<Vec<_>>())
                })
                .collect();
            workers
                .into_iter()
                .flat_map(|worker| worker.join().unwrap())
                .collect()
        });

        assert_eq!(seen.len(), 400);
        for index in 0..4 {
            assert_eq!(seen.iter().filter(|&&i| i == index).count(), 100);
        }
    }

    proptest! {
        #[test]
        fn prop_k_calls_give_k_distinct_clients_then_wrap(k in 1usize..32) {
            let pool = null_pool(k);
            let handles: Vec<ClientHandle> = (0..k).map(|_| pool.next_client()).collect();

            for (i, a) in handles.iter().enumerate() {
                for b in &handles[i + 1..] {
                    prop_assert!(!a.same_client(b));
                }
            }

            let wrapped = pool.next_client();
            prop_assert!(wrapped.same_client(&handles[0]));
            prop_assert_eq!(wrapped.index(), 0);
        }
    }
}
