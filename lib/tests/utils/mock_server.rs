// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::{SinkExt, StreamExt};
use opcua_multihomed::{
    core::{
        comms::{
            chunker::Chunker,
            message_chunk::MessageIsFinalType,
            secure_channel::{Role, SecureChannel},
            tcp_codec::{Message, TcpCodec},
            tcp_types::{AcknowledgeMessage, ErrorMessage},
        },
        supported_message::SupportedMessage,
    },
    sync::Mutex,
    types::{
        ActivateSessionResponse, AnonymousIdentityToken, ByteString, ChannelSecurityToken,
        CloseSessionResponse, CreateSessionResponse, DataValue, DateTime, DecodingOptions,
        EndpointDescription, ExtensionObject, MessageSecurityMode, NodeId, ObjectId,
        OpenSecureChannelResponse, ReadResponse, ResponseHeader, ServerState, ServiceFault,
        StatusCode, UAString, UserNameIdentityToken, UserTokenPolicy, VariableId,
    },
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
};
use tokio_util::{
    codec::Framed,
    sync::{CancellationToken, DropGuard},
};

pub const USER_NAME: &str = "sample1";
pub const PASSWORD: &str = "sample1_password";

/// How the mock server answers. Changed by tests while the server runs.
#[derive(Debug, Clone)]
pub struct Behaviour {
    /// Reported by Server_ServerStatus_State
    pub server_state: ServerState,
    /// Status of every read of Server_ServerStatus
    pub server_status: StatusCode,
    /// Answer HEL with this ERR instead of ACK
    pub reject_hello: Option<StatusCode>,
    /// Policy id used for anonymous logins, as advertised in CreateSession
    pub anonymous_policy_id: &'static str,
    /// Read responses are held back this long, other requests are still answered meanwhile
    pub read_delay: Duration,
}

impl Default for Behaviour {
    fn default() -> Self {
        Behaviour {
            server_state: ServerState::Running,
            server_status: StatusCode::Good,
            reject_hello: None,
            anonymous_policy_id: "open",
            read_delay: Duration::ZERO,
        }
    }
}

/// What the mock server saw.
#[derive(Debug, Default)]
pub struct Observed {
    pub peers: Vec<SocketAddr>,
    pub sessions_created: u32,
    pub sessions_activated: u32,
    pub sessions_closed: u32,
    pub reads: u32,
    pub identities: Vec<String>,
}

/// A minimal OPC UA server speaking policy `None`, enough for the client to create, activate,
/// read from and close a session.
pub struct MockServer {
    pub addr: SocketAddr,
    pub behaviour: Arc<Mutex<Behaviour>>,
    pub observed: Arc<Mutex<Observed>>,
    /// Cancelling drops every open connection and stops accepting new ones
    pub token: CancellationToken,
    connections: Arc<Mutex<CancellationToken>>,
    _guard: DropGuard,
}

impl MockServer {
    pub async fn start() -> MockServer {
        Self::start_with(Behaviour::default()).await
    }

    pub async fn start_with(behaviour: Behaviour) -> MockServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token = CancellationToken::new();
        let behaviour = Arc::new(Mutex::new(behaviour));
        let observed = Arc::new(Mutex::new(Observed::default()));
        let connections = Arc::new(Mutex::new(token.child_token()));

        let server = MockServer {
            addr,
            behaviour: behaviour.clone(),
            observed: observed.clone(),
            token: token.clone(),
            connections: connections.clone(),
            _guard: token.clone().drop_guard(),
        };

        let session_counter = Arc::new(AtomicU32::new(1));
        tokio::spawn(async move {
            loop {
                let (stream, peer) = tokio::select! {
                    _ = token.cancelled() => break,
                    r = listener.accept() => match r {
                        Ok(r) => r,
                        Err(_) => break,
                    },
                };
                observed.lock().peers.push(peer);
                let conn = Connection {
                    behaviour: behaviour.clone(),
                    observed: observed.clone(),
                    session_counter: session_counter.clone(),
                    channel: SecureChannel::new(Role::Server, DecodingOptions::default()),
                    sequence_number: 1,
                };
                let conn_token = connections.lock().clone();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = conn_token.cancelled() => {}
                        _ = conn.run(stream) => {}
                    }
                });
            }
        });

        server
    }

    pub fn url(&self) -> String {
        format!("opc.tcp://{}/", self.addr)
    }

    /// Drop every open connection, the listener keeps accepting.
    pub fn drop_connections(&self) {
        let mut connections = self.connections.lock();
        connections.cancel();
        *connections = self.token.child_token();
    }

    pub fn set_behaviour(&self, f: impl FnOnce(&mut Behaviour)) {
        f(&mut self.behaviour.lock());
    }

    pub fn observed<T>(&self, f: impl FnOnce(&Observed) -> T) -> T {
        f(&self.observed.lock())
    }
}

struct Connection {
    behaviour: Arc<Mutex<Behaviour>>,
    observed: Arc<Mutex<Observed>>,
    session_counter: Arc<AtomicU32>,
    channel: SecureChannel,
    sequence_number: u32,
}

impl Connection {
    async fn run(mut self, stream: TcpStream) {
        let mut framed = Framed::new(stream, TcpCodec::new(DecodingOptions::default()));
        let mut chunks = Vec::new();
        let (delayed_tx, mut delayed_rx) = mpsc::unbounded_channel();
        loop {
            let message = tokio::select! {
                m = framed.next() => match m {
                    Some(Ok(m)) => m,
                    _ => return,
                },
                Some((request_id, response)) = delayed_rx.recv() => {
                    if self.send_response(&mut framed, request_id, &response).await.is_err() {
                        return;
                    }
                    continue;
                }
            };
            match message {
                Message::Hello(hello) => {
                    let reject = self.behaviour.lock().reject_hello;
                    if let Some(status) = reject {
                        let _ = framed
                            .send(Message::Error(ErrorMessage::from_status_code(status)))
                            .await;
                        return;
                    }
                    let ack = AcknowledgeMessage::from_hello(&hello, 65535, 65535);
                    if framed.send(Message::Acknowledge(ack)).await.is_err() {
                        return;
                    }
                }
                Message::Chunk(chunk) => {
                    let info = chunk.chunk_info(&DecodingOptions::default()).unwrap();
                    let request_id = info.sequence_header.request_id;
                    let is_final = info.message_header.is_final;
                    chunks.push(chunk);
                    if is_final == MessageIsFinalType::Intermediate {
                        continue;
                    }
                    let request = Chunker::decode(&chunks, &self.channel, None).unwrap();
                    chunks.clear();

                    let Some(response) = self.respond(request) else {
                        return;
                    };
                    let delay = self.behaviour.lock().read_delay;
                    if !delay.is_zero() && matches!(response, SupportedMessage::ReadResponse(_)) {
                        let tx = delayed_tx.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            let _ = tx.send((request_id, response));
                        });
                        continue;
                    }
                    if self.send_response(&mut framed, request_id, &response).await.is_err() {
                        return;
                    }
                }
                _ => return,
            }
        }
    }

    async fn send_response(
        &mut self,
        framed: &mut Framed<TcpStream, TcpCodec>,
        request_id: u32,
        response: &SupportedMessage,
    ) -> Result<(), std::io::Error> {
        let out = Chunker::encode(
            self.sequence_number,
            request_id,
            0,
            65535,
            &self.channel,
            response,
        )
        .unwrap();
        self.sequence_number += out.len() as u32;
        for c in out {
            framed.send(Message::Chunk(c)).await?;
        }
        Ok(())
    }

    /// The response to `request`, or `None` to close the connection.
    fn respond(&mut self, request: SupportedMessage) -> Option<SupportedMessage> {
        let behaviour = self.behaviour.lock().clone();
        let response: SupportedMessage = match request {
            SupportedMessage::OpenSecureChannelRequest(r) => {
                let token = ChannelSecurityToken {
                    channel_id: 1,
                    token_id: self.channel.token_id() + 1,
                    created_at: DateTime::now(),
                    revised_lifetime: r.requested_lifetime,
                };
                self.channel.set_security_token(token.clone());
                OpenSecureChannelResponse {
                    response_header: ResponseHeader::new_good(&r.request_header),
                    server_protocol_version: 0,
                    security_token: token,
                    server_nonce: ByteString::null(),
                }
                .into()
            }
            SupportedMessage::CloseSecureChannelRequest(_) => return None,
            SupportedMessage::CreateSessionRequest(r) => {
                let id = self.session_counter.fetch_add(1, Ordering::Relaxed);
                self.observed.lock().sessions_created += 1;
                let anonymous = UserTokenPolicy {
                    policy_id: behaviour.anonymous_policy_id.into(),
                    ..UserTokenPolicy::anonymous()
                };
                CreateSessionResponse {
                    response_header: ResponseHeader::new_good(&r.request_header),
                    session_id: NodeId::new(1, id),
                    authentication_token: NodeId::new(1, format!("token-{}", id)),
                    revised_session_timeout: r.requested_session_timeout,
                    server_nonce: ByteString::null(),
                    server_endpoints: Some(vec![EndpointDescription {
                        security_mode: MessageSecurityMode::None,
                        user_identity_tokens: Some(vec![anonymous, UserTokenPolicy::user_name()]),
                        ..EndpointDescription::from(r.endpoint_url.as_ref())
                    }]),
                    max_request_message_size: 0,
                    ..Default::default()
                }
                .into()
            }
            SupportedMessage::ActivateSessionRequest(r) => {
                let identity = identity(&r.user_identity_token);
                let accepted = identity == format!("anonymous:{}", behaviour.anonymous_policy_id)
                    || identity == format!("username:{}", USER_NAME);
                self.observed.lock().identities.push(identity);
                if accepted {
                    self.observed.lock().sessions_activated += 1;
                    ActivateSessionResponse {
                        response_header: ResponseHeader::new_good(&r.request_header),
                        ..Default::default()
                    }
                    .into()
                } else {
                    ServiceFault::new(&r.request_header, StatusCode::BadIdentityTokenRejected)
                        .into()
                }
            }
            SupportedMessage::ReadRequest(r) => {
                self.observed.lock().reads += 1;
                let results = r
                    .nodes_to_read
                    .iter()
                    .flatten()
                    .map(|n| read_value(&n.node_id, &behaviour))
                    .collect();
                ReadResponse {
                    response_header: ResponseHeader::new_good(&r.request_header),
                    results: Some(results),
                    diagnostic_infos: None,
                }
                .into()
            }
            SupportedMessage::CloseSessionRequest(r) => {
                self.observed.lock().sessions_closed += 1;
                CloseSessionResponse {
                    response_header: ResponseHeader::new_good(&r.request_header),
                }
                .into()
            }
            other => {
                panic!("Mock server cannot answer {:?}", other);
            }
        };
        Some(response)
    }
}

fn identity(token: &ExtensionObject) -> String {
    let anonymous: NodeId = ObjectId::AnonymousIdentityToken_Encoding_DefaultBinary.into();
    let user_name: NodeId = ObjectId::UserNameIdentityToken_Encoding_DefaultBinary.into();
    if token.node_id == anonymous {
        let t = token
            .decode_inner::<AnonymousIdentityToken>(&DecodingOptions::default())
            .unwrap();
        format!("anonymous:{}", t.policy_id)
    } else if token.node_id == user_name {
        let t = token
            .decode_inner::<UserNameIdentityToken>(&DecodingOptions::default())
            .unwrap();
        if t.password.as_ref() == PASSWORD.as_bytes() {
            format!("username:{}", t.user_name)
        } else {
            format!("bad password:{}", t.user_name)
        }
    } else {
        "unknown".to_string()
    }
}

fn read_value(node_id: &NodeId, behaviour: &Behaviour) -> DataValue {
    let state: NodeId = VariableId::Server_ServerStatus_State.into();
    let status: NodeId = VariableId::Server_ServerStatus.into();
    let current_time: NodeId = VariableId::Server_ServerStatus_CurrentTime.into();
    if *node_id == state {
        DataValue::new_now(behaviour.server_state as i32)
    } else if *node_id == status {
        DataValue {
            status: Some(behaviour.server_status),
            ..DataValue::new_now(UAString::from("ServerStatus"))
        }
    } else if *node_id == current_time {
        DataValue::new_now(DateTime::now())
    } else {
        DataValue::from_status(StatusCode::BadNodeIdUnknown)
    }
}

/// A port on 127.0.0.1 that was free a moment ago.
pub fn free_local_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
