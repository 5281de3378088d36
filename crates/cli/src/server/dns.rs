use fanout_dns_application::ports::ExchangeSignal;
use fanout_dns_application::use_cases::{ForwardQueryUseCase, QueryContext};
use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const MAX_DATAGRAM_SIZE: usize = 4096;

/// Serves DNS over UDP until `shutdown` is cancelled. Each query runs on its
/// own task with a signal derived from `shutdown` and bounded by `query_timeout`.
pub async fn start_dns_server(
    bind_addr: SocketAddr,
    use_case: Arc<ForwardQueryUseCase>,
    query_timeout: Duration,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
    info!(bind_address = %socket.local_addr()?, "DNS server ready");

    let root_signal = ExchangeSignal::from_token(shutdown.clone());
    let mut recv_buf = vec![0u8; MAX_DATAGRAM_SIZE];

    loop {
        let (len, peer) = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = socket.recv_from(&mut recv_buf) => match received {
                Ok(received) => received,
                Err(e) => {
                    warn!(error = %e, "UDP recv error");
                    continue;
                }
            },
        };

        let query = match Message::from_vec(&recv_buf[..len]) {
            Ok(query) => query,
            Err(e) => {
                debug!(client = %peer, error = %e, "Dropping malformed query");
                continue;
            }
        };

        let socket = Arc::clone(&socket);
        let use_case = Arc::clone(&use_case);
        let signal = root_signal.child_with_timeout(query_timeout);
        tokio::spawn(async move {
            let reply = answer(&use_case, query, signal, peer).await;
            match reply.to_vec() {
                Ok(bytes) => {
                    if let Err(e) = socket.send_to(&bytes, peer).await {
                        debug!(client = %peer, error = %e, "Failed to send reply");
                    }
                }
                Err(e) => error!(client = %peer, error = %e, "Failed to encode reply"),
            }
        });
    }

    info!("DNS server stopped");
    Ok(())
}

async fn answer(
    use_case: &ForwardQueryUseCase,
    query: Message,
    signal: ExchangeSignal,
    peer: SocketAddr,
) -> Message {
    let mut ctx = QueryContext::new(query, signal);

    match use_case.execute(&mut ctx).await {
        Ok(()) => match ctx.take_response() {
            Some(response) => response,
            None => servfail(ctx.query()),
        },
        Err(e) => {
            warn!(client = %peer, error = %e, "Query failed, answering SERVFAIL");
            servfail(ctx.query())
        }
    }
}

pub fn servfail(query: &Message) -> Message {
    let mut response = Message::new(query.id(), MessageType::Response, OpCode::Query);
    response.set_recursion_desired(query.recursion_desired());
    response.set_recursion_available(true);
    response.set_response_code(ResponseCode::ServFail);
    for q in query.queries() {
        response.add_query(q.clone());
    }
    response
}
