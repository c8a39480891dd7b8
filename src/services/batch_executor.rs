//! Concurrent, deadline-bounded execution of a batch of requests.
//!
//! Every request in a batch gets its own race: the network call runs on a
//! spawned task and reports through a oneshot channel, while the batch waits
//! on either that channel or the request's context. The network task runs
//! under the same context, so a call that loses the race is aborted and
//! releases its connection slot; a background drain task collects whatever
//! it reports.

use crate::models::request::{HttpRequest, RequestError};
use crate::models::response::HttpResponse;
use crate::services::context::Context;
use crate::services::http_client_pool::{ClientHandle, HttpClientPool};
use crate::services::transport::TransportError;
use futures::future::join_all;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

type CallResult = Result<HttpResponse, TransportError>;

/// A group of requests bound to one pooled client.
#[derive(Debug)]
pub struct BatchContext {
    client: ClientHandle,
    requests: Vec<HttpRequest>,
}

impl BatchContext {
    pub fn new(pool: &HttpClientPool) -> Self {
        Self::with_client(pool.next_client())
    }

    pub fn with_client(client: ClientHandle) -> Self {
        Self {
            client,
            requests: Vec::new(),
        }
    }

    pub fn add(&mut self, request: HttpRequest) {
        self.requests.push(request);
    }

    pub fn client(&self) -> &ClientHandle {
        &self.client
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Runs every request concurrently and returns them, in insertion order,
    /// once each one has either produced a result or been abandoned because
    /// `ctx` (or its own context) finished first.
    ///
    /// Per-request failures are recorded on the request; they never fail the
    /// batch.
    pub async fn execute(self, ctx: &Context) -> Vec<HttpRequest> {
        let BatchContext {
            client,
            mut requests,
        } = self;
        if requests.is_empty() {
            return requests;
        }

        let started_at = Instant::now();
        debug!(
            client = client.index(),
            requests = requests.len(),
            "executing batch"
        );

        join_all(
            requests
                .iter_mut()
                .map(|request| race(request, &client, started_at, ctx)),
        )
        .await;

        let metrics = client.metrics();
        let mut timed_out = 0;
        for request in &requests {
            metrics.increment_executed();
            match request.error() {
                None => metrics.increment_succeeded(),
                Some(RequestError::Timeout) => {
                    timed_out += 1;
                    metrics.increment_timed_out();
                }
                Some(_) => metrics.increment_failed(),
            }
        }

        info!(
            client = client.index(),
            requests = requests.len(),
            timed_out,
            elapsed_ms = elapsed_ms(started_at),
            "batch finished"
        );
        requests
    }
}

async fn race(
    request: &mut HttpRequest,
    client: &ClientHandle,
    started_at: Instant,
    batch_ctx: &Context,
) {
    let (ctx, cancel) = batch_ctx.merge(request.context()).with_cancel();

    let Some(call) = request.dispatch() else {
        warn!(request_id = %request.id(), "request dispatched twice, skipping");
        request.reject(RequestError::AlreadyExecuted);
        return;
    };

    let (sender, mut receiver) = oneshot::channel::<CallResult>();
    let transport = client.transport().clone();
    let call_ctx = ctx.clone();
    tokio::spawn(async move {
        let result = tokio::select! {
            result = transport.execute(call) => result,
            _ = call_ctx.done() => Err(TransportError::Cancelled),
        };
        // The receiver is gone only if the drain task itself was dropped.
        let _ = sender.send(result);
    });

    // The context arm goes first so an aborted call always reads as a timeout.
    tokio::select! {
        biased;
        _ = ctx.done() => {
            debug!(request_id = %request.id(), url = %request.url(), "request timed out");
            request.time_out(elapsed_ms(started_at));
            tokio::spawn(drain_abandoned(request.id(), receiver));
        }
        result = &mut receiver => {
            let outcome = match result {
                Ok(outcome) => outcome.map_err(RequestError::from),
                Err(_) => Err(RequestError::Transport(TransportError::Other(
                    "network task ended without a result".to_string(),
                ))),
            };
            if let Err(error) = &outcome {
                debug!(request_id = %request.id(), %error, "request failed");
            }
            request.complete(outcome, elapsed_ms(started_at));
        }
    }

    cancel.cancel();
}

/// Waits for the late result of a timed-out request and discards it.
async fn drain_abandoned(request_id: Uuid, receiver: oneshot::Receiver<CallResult>) {
    match receiver.await {
        Ok(Ok(response)) => debug!(
            %request_id,
            status = %response.status(),
            bytes = response.body().len(),
            "discarded late response"
        ),
        Ok(Err(error)) => debug!(%request_id, %error, "abandoned request failed"),
        Err(_) => {}
    }
}

fn elapsed_ms(started_at: Instant) -> u64 {
    u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX)
}
