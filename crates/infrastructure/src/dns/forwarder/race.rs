use fanout_dns_application::ports::{ExchangeOutcome, Upstream};
use fanout_dns_domain::{AttemptFailure, DomainError};
use futures::stream::{FuturesUnordered, StreamExt};
use hickory_proto::op::Message;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Sends `query` to every upstream at once and returns the first success.
/// The remaining attempts are aborted as soon as a winner is known. When
/// all of them fail the error lists one entry per upstream, ordered by index.
pub(crate) async fn race(
    upstreams: &[Arc<dyn Upstream>],
    query: Message,
) -> Result<ExchangeOutcome, DomainError> {
    let start = Instant::now();
    let mut abort_handles = Vec::with_capacity(upstreams.len());
    let mut attempts = FuturesUnordered::new();

    for (index, upstream) in upstreams.iter().enumerate() {
        let upstream = Arc::clone(upstream);
        let query = query.clone();
        let handle = tokio::spawn(async move { upstream.exchange(query).await });
        abort_handles.push(handle.abort_handle());
        attempts.push(async move { (index, handle.await) });
    }

    let mut failures = Vec::new();
    let outcome = loop {
        let Some((index, joined)) = attempts.next().await else {
            failures.sort_by_key(|f: &AttemptFailure| f.index);
            break Err(DomainError::AllUpstreamsFailed(failures));
        };

        let upstream = &upstreams[index];
        match joined {
            Ok(Ok(response)) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                debug!(
                    upstream = upstream.address(),
                    tag = upstream.tag().unwrap_or(""),
                    latency_ms,
                    "Fastest response"
                );
                break Ok(ExchangeOutcome {
                    response,
                    upstream: Arc::clone(upstream),
                    latency_ms,
                });
            }
            Ok(Err(e)) => {
                debug!(upstream = upstream.address(), error = %e, "Upstream failed");
                failures.push(AttemptFailure::new(index, upstream.address(), e));
            }
            Err(e) => {
                warn!(upstream = upstream.address(), error = %e, "Upstream task panicked");
                failures.push(AttemptFailure::new(
                    index,
                    upstream.address(),
                    DomainError::Internal(format!("exchange task failed: {}", e)),
                ));
            }
        }
    };

    for handle in &abort_handles {
        handle.abort();
    }

    outcome
}
