//! DNS over UDP (RFC 1035 §4.2.1). Queries are built and parsed with
//! `hickory-proto`; each attempt gets its own socket and timeout, and
//! attempts rotate through the configured nameservers.

use super::{DnsTransport, QueryReply};
use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RData};
use hickory_proto::serialize::binary::{BinEncodable, BinEncoder};
use rudder_domain::{DiscoveryError, RData as DomainRData, Record, RecordType, SrvData};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

/// Maximum UDP DNS response size with EDNS(0)
const MAX_UDP_RESPONSE_SIZE: usize = 4096;

pub struct UdpTransport {
    servers: Vec<SocketAddr>,
    timeout: Duration,
    retrans: u32,
}

impl UdpTransport {
    pub fn new(servers: Vec<SocketAddr>, timeout: Duration, retrans: u32) -> Self {
        Self {
            servers,
            timeout,
            retrans: retrans.max(1),
        }
    }

    fn build_query(qname: &str, qtype: RecordType) -> Result<(u16, Vec<u8>), DiscoveryError> {
        let name = Name::from_str(qname)
            .map_err(|e| DiscoveryError::InvalidName(format!("{}: {}", qname, e)))?;

        let mut query = Query::new();
        query.set_name(name);
        query.set_query_type(to_hickory(qtype));
        query.set_query_class(DNSClass::IN);

        let id = fastrand::u16(..);
        let mut message = Message::new(id, MessageType::Query, OpCode::Query);
        message.set_recursion_desired(true);
        message.add_query(query);

        let mut buf = Vec::with_capacity(512);
        let mut encoder = BinEncoder::new(&mut buf);
        message
            .emit(&mut encoder)
            .map_err(|e| DiscoveryError::Transport(format!("failed to serialize query: {}", e)))?;
        Ok((id, buf))
    }

    async fn attempt(
        &self,
        server: SocketAddr,
        id: u16,
        request: &[u8],
    ) -> Result<QueryReply, DiscoveryError> {
        let bind_addr: &str = if server.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind_addr)
            .await
            .map_err(|e| DiscoveryError::Transport(format!("failed to bind UDP socket: {}", e)))?;

        tokio::time::timeout(self.timeout, socket.send_to(request, server))
            .await
            .map_err(|_| DiscoveryError::QueryTimeout)?
            .map_err(|e| {
                DiscoveryError::Transport(format!("failed to send query to {}: {}", server, e))
            })?;

        let mut recv_buf = vec![0u8; MAX_UDP_RESPONSE_SIZE];
        let (received, from_addr) =
            tokio::time::timeout(self.timeout, socket.recv_from(&mut recv_buf))
                .await
                .map_err(|_| DiscoveryError::QueryTimeout)?
                .map_err(|e| {
                    DiscoveryError::Transport(format!(
                        "failed to receive response from {}: {}",
                        server, e
                    ))
                })?;
        if from_addr.ip() != server.ip() {
            warn!(expected = %server, received_from = %from_addr, "UDP response from unexpected source");
        }
        recv_buf.truncate(received);

        let message = Message::from_vec(&recv_buf)
            .map_err(|e| DiscoveryError::Transport(format!("failed to parse response: {}", e)))?;
        if message.id() != id {
            return Err(DiscoveryError::Transport(format!(
                "response id mismatch from {}",
                server
            )));
        }

        Ok(QueryReply {
            rcode: rcode_to_u16(message.response_code()),
            answers: convert_records(message.answers()),
            additionals: convert_records(message.additionals()),
        })
    }
}

#[async_trait]
impl DnsTransport for UdpTransport {
    async fn query(
        &self,
        qname: &str,
        qtype: RecordType,
    ) -> Result<QueryReply, DiscoveryError> {
        if self.servers.is_empty() {
            return Err(DiscoveryError::Transport("no nameservers configured".into()));
        }
        let (id, request) = Self::build_query(qname, qtype)?;

        let mut last_err = DiscoveryError::QueryTimeout;
        for attempt in 0..self.retrans {
            let server = self.servers[attempt as usize % self.servers.len()];
            match self.attempt(server, id, &request).await {
                Ok(reply) => {
                    debug!(
                        qname,
                        qtype = %qtype,
                        server = %server,
                        rcode = reply.rcode,
                        answers = reply.answers.len(),
                        "UDP query answered"
                    );
                    return Ok(reply);
                }
                Err(e) => {
                    debug!(qname, qtype = %qtype, server = %server, error = %e, "UDP attempt failed");
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }
}

fn to_hickory(qtype: RecordType) -> hickory_proto::rr::RecordType {
    use hickory_proto::rr::RecordType as H;
    match qtype {
        RecordType::A => H::A,
        RecordType::AAAA => H::AAAA,
        RecordType::CNAME => H::CNAME,
        RecordType::TXT => H::TXT,
        RecordType::SRV => H::SRV,
    }
}

fn rcode_to_u16(rcode: ResponseCode) -> u16 {
    match rcode {
        ResponseCode::NoError => 0,
        ResponseCode::FormErr => 1,
        ResponseCode::ServFail => 2,
        ResponseCode::NXDomain => 3,
        ResponseCode::NotImp => 4,
        ResponseCode::Refused => 5,
        _ => 2,
    }
}

fn normalize_name(name: &Name) -> String {
    let mut s = name.to_utf8().to_ascii_lowercase();
    if s.ends_with('.') {
        s.pop();
    }
    s
}

fn convert_records(records: &[hickory_proto::rr::Record]) -> Vec<Record> {
    let mut out = Vec::with_capacity(records.len());
    for record in records {
        let name = normalize_name(record.name());
        let ttl = record.ttl();
        let data = match record.data() {
            RData::A(a) => DomainRData::A(a.0),
            RData::AAAA(aaaa) => DomainRData::Aaaa(aaaa.0),
            RData::CNAME(cname) => DomainRData::Cname(normalize_name(cname)),
            RData::SRV(srv) => DomainRData::Srv(SrvData {
                target: normalize_name(srv.target()),
                port: srv.port(),
                weight: srv.weight(),
                priority: srv.priority(),
            }),
            RData::TXT(txt) => DomainRData::Txt(
                txt.txt_data()
                    .iter()
                    .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
                    .collect(),
            ),
            _ => continue,
        };
        out.push(Record {
            name,
            class: 1,
            ttl,
            data,
        });
    }
    out
}
