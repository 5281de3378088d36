use hickory_proto::op::{Message, MessageType, OpCode, ResponseCode};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{RData, Record, RecordType};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy)]
pub enum ServerBehavior {
    /// A queries get one A record, everything else an empty NOERROR.
    Answer(Ipv4Addr),
    /// UDP answers carry only the TC bit; TCP answers in full.
    TruncateUdp(Ipv4Addr),
    /// Sends a datagram with the wrong ID before the real answer.
    WrongIdFirst(Ipv4Addr),
    /// Answers with this many distinct A records, enough to exceed 4 KiB.
    ManyAnswers(u16),
    /// Every query gets an empty answer with this response code.
    Rcode(ResponseCode),
    /// Never replies.
    Silent,
}

/// UDP and TCP DNS server on the same loopback port.
pub struct MockDnsServer {
    addr: SocketAddr,
    udp_queries: Arc<AtomicUsize>,
    tcp_queries: Arc<AtomicUsize>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockDnsServer {
    pub async fn start(behavior: ServerBehavior) -> Result<Self, std::io::Error> {
        let socket = UdpSocket::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = socket.local_addr()?;
        let listener = TcpListener::bind(addr).await?;

        let udp_queries = Arc::new(AtomicUsize::new(0));
        let tcp_queries = Arc::new(AtomicUsize::new(0));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let udp_count = Arc::clone(&udp_queries);
        let tcp_count = Arc::clone(&tcp_queries);
        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    result = socket.recv_from(&mut buf) => {
                        let Ok((len, peer)) = result else { continue };
                        udp_count.fetch_add(1, Ordering::SeqCst);
                        for reply in Self::udp_replies(&buf[..len], behavior) {
                            let _ = socket.send_to(&reply, peer).await;
                        }
                    }
                    accepted = listener.accept() => {
                        let Ok((stream, _)) = accepted else { continue };
                        let tcp_count = Arc::clone(&tcp_count);
                        tokio::spawn(Self::serve_tcp(stream, behavior, tcp_count));
                    }
                }
            }
        });

        Ok(Self {
            addr,
            udp_queries,
            tcp_queries,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn udp_queries(&self) -> usize {
        self.udp_queries.load(Ordering::SeqCst)
    }

    pub fn tcp_queries(&self) -> usize {
        self.tcp_queries.load(Ordering::SeqCst)
    }

    async fn serve_tcp(
        mut stream: tokio::net::TcpStream,
        behavior: ServerBehavior,
        count: Arc<AtomicUsize>,
    ) {
        loop {
            let mut len_buf = [0u8; 2];
            if stream.read_exact(&mut len_buf).await.is_err() {
                return;
            }
            let mut query = vec![0u8; u16::from_be_bytes(len_buf) as usize];
            if stream.read_exact(&mut query).await.is_err() {
                return;
            }
            count.fetch_add(1, Ordering::SeqCst);

            let reply = match behavior {
                ServerBehavior::Answer(ip)
                | ServerBehavior::TruncateUdp(ip)
                | ServerBehavior::WrongIdFirst(ip) => build_response(&query, ip, false, 0),
                ServerBehavior::Rcode(rcode) => build_rcode_response(&query, rcode),
                ServerBehavior::ManyAnswers(count) => build_many_answers(&query, count),
                ServerBehavior::Silent => continue,
            };
            let Some(reply) = reply else {
                return;
            };
            let mut framed = (reply.len() as u16).to_be_bytes().to_vec();
            framed.extend_from_slice(&reply);
            if stream.write_all(&framed).await.is_err() {
                return;
            }
        }
    }

    fn udp_replies(query: &[u8], behavior: ServerBehavior) -> Vec<Vec<u8>> {
        match behavior {
            ServerBehavior::Answer(ip) => build_response(query, ip, false, 0).into_iter().collect(),
            ServerBehavior::TruncateUdp(ip) => {
                build_response(query, ip, true, 0).into_iter().collect()
            }
            ServerBehavior::WrongIdFirst(ip) => [
                build_response(query, Ipv4Addr::new(203, 0, 113, 99), false, 1),
                build_response(query, ip, false, 0),
            ]
            .into_iter()
            .flatten()
            .collect(),
            ServerBehavior::Rcode(rcode) => {
                build_rcode_response(query, rcode).into_iter().collect()
            }
            ServerBehavior::ManyAnswers(count) => {
                build_many_answers(query, count).into_iter().collect()
            }
            ServerBehavior::Silent => Vec::new(),
        }
    }

    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockDnsServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn response_skeleton(query: &Message, id_offset: u16) -> Message {
    let mut response = Message::new(
        query.id().wrapping_add(id_offset),
        MessageType::Response,
        OpCode::Query,
    );
    response.set_recursion_desired(query.recursion_desired());
    response.set_recursion_available(true);
    for q in query.queries() {
        response.add_query(q.clone());
    }
    response
}

fn build_rcode_response(query: &[u8], rcode: ResponseCode) -> Option<Vec<u8>> {
    let query = Message::from_vec(query).ok()?;
    let mut response = response_skeleton(&query, 0);
    response.set_response_code(rcode);
    response.to_vec().ok()
}

fn build_many_answers(query: &[u8], count: u16) -> Option<Vec<u8>> {
    let query = Message::from_vec(query).ok()?;
    let mut response = response_skeleton(&query, 0);
    let name = query.queries().first()?.name().clone();
    for i in 0..count {
        let [hi, lo] = i.to_be_bytes();
        let ip = Ipv4Addr::new(10, 0, hi, lo);
        response.add_answer(Record::from_rdata(name.clone(), 60, RData::A(A(ip))));
    }
    response.to_vec().ok()
}

fn build_response(
    query: &[u8],
    ip: Ipv4Addr,
    truncated: bool,
    id_offset: u16,
) -> Option<Vec<u8>> {
    let query = Message::from_vec(query).ok()?;
    let mut response = response_skeleton(&query, id_offset);

    if truncated {
        response.set_truncated(true);
    } else if let Some(q) = query.queries().first() {
        if q.query_type() == RecordType::A {
            response.add_answer(Record::from_rdata(q.name().clone(), 60, RData::A(A(ip))));
        }
    }

    response.to_vec().ok()
}
