//! Core server: accepts connections and dispatches signaling events.
//!
//! Owns the session store, connection registry, lifecycle manager,
//! signaling router, and command gateway. Each accepted WebSocket gets a
//! server-assigned connection id, an outbound event queue, and a message
//! loop; transport teardown funnels into the lifecycle manager's
//! disconnect handling.

use crate::config::ServerConfig;
use crate::credentials;
use crate::gateway::CommandGateway;
use crate::http;
use crate::notifier::{ChannelNotifier, Notifier};
use crate::session::{ConnectionRegistry, LifecycleManager, SessionStore};
use crate::signaling::SignalingRouter;
use crate::transport::websocket::{self, WebSocketConnection};
use screenlink_proto::{codec, ClientEvent, LinkResult, ServerEvent};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

/// The screenlink coordination server.
pub struct LinkServer {
    config: ServerConfig,
    store: SessionStore,
    notifier: Arc<ChannelNotifier>,
    lifecycle: Arc<LifecycleManager>,
    signaling: SignalingRouter,
    gateway: CommandGateway,
    started: Instant,
}

impl LinkServer {
    /// Wire up a server instance from resolved configuration.
    pub fn new(config: ServerConfig) -> Self {
        let store = SessionStore::new();
        let registry = ConnectionRegistry::new();
        let notifier = Arc::new(ChannelNotifier::new());
        let notifier_dyn: Arc<dyn Notifier> = notifier.clone();

        let lifecycle = Arc::new(LifecycleManager::new(
            store.clone(),
            registry.clone(),
            notifier_dyn.clone(),
            config.max_clients_per_session,
            Duration::from_secs(config.session_timeout_secs),
        ));
        let signaling = SignalingRouter::new(registry.clone(), notifier_dyn.clone());
        let gateway = CommandGateway::new(store.clone(), registry, notifier_dyn);

        Self {
            config,
            store,
            notifier,
            lifecycle,
            signaling,
            gateway,
            started: Instant::now(),
        }
    }

    /// Run the signaling listener, HTTP surface, and expiry sweep until the
    /// listeners close.
    pub async fn run(self, tls: Option<Arc<rustls::ServerConfig>>) -> LinkResult<()> {
        let server = Arc::new(self);

        let http_port = server.config.http_port()?;
        let ws_addr: SocketAddr = ([0, 0, 0, 0], server.config.port).into();
        let http_addr: SocketAddr = ([0, 0, 0, 0], http_port).into();

        let acceptor = tls.map(TlsAcceptor::from);
        let mut ws_rx = websocket::start_listener(ws_addr, acceptor).await?;

        // HTTP status surface.
        let http_store = server.store.clone();
        let http_started = server.started;
        tokio::spawn(async move {
            if let Err(e) = http::serve(http_addr, http_store, http_started).await {
                warn!(error = %e, "HTTP surface stopped");
            }
        });

        // Periodic expiry sweep, same teardown discipline as explicit
        // disconnects.
        let sweep_lifecycle = server.lifecycle.clone();
        let sweep_interval = Duration::from_secs(server.config.sweep_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(sweep_interval);
            interval.tick().await; // first tick fires immediately
            loop {
                interval.tick().await;
                let removed = sweep_lifecycle.sweep(Instant::now()).await;
                if !removed.is_empty() {
                    info!(count = removed.len(), "expiry sweep removed sessions");
                }
            }
        });

        info!(
            ws_port = server.config.port,
            http_port,
            max_clients = server.config.max_clients_per_session,
            "screenlink-server ready"
        );

        while let Some(conn) = ws_rx.recv().await {
            let srv = server.clone();
            tokio::spawn(async move {
                if let Err(e) = srv.handle_connection(conn).await {
                    debug!(error = %e, "connection ended with error");
                }
            });
        }

        info!("listener closed, shutting down");
        Ok(())
    }

    /// Per-connection loop: pump outbound events and dispatch inbound ones
    /// until the transport closes, then run disconnect teardown.
    async fn handle_connection(&self, mut conn: WebSocketConnection) -> LinkResult<()> {
        let conn_id = credentials::generate_connection_id();
        info!(remote = %conn.remote_addr, conn_id = %conn_id, "connection accepted");

        let (peer_tx, mut peer_rx) = mpsc::channel::<ServerEvent>(64);
        self.notifier.attach(&conn_id, peer_tx);

        let result = loop {
            tokio::select! {
                Some(event) = peer_rx.recv() => {
                    let text = match codec::encode_event(&event) {
                        Ok(text) => text,
                        Err(e) => break Err(e),
                    };
                    if let Err(e) = websocket::ws_send_text(&mut conn.ws_stream, text).await {
                        break Err(e);
                    }
                }

                frame = websocket::ws_recv_text(&mut conn.ws_stream) => {
                    match frame {
                        Ok(Some(text)) => {
                            let response = match codec::decode_client_event(&text) {
                                Ok(event) => self.dispatch(&conn_id, event).await,
                                Err(e) => {
                                    debug!(conn_id = %conn_id, error = %e, "malformed event");
                                    Some(ServerEvent::Error {
                                        message: "Malformed event".into(),
                                    })
                                }
                            };
                            if let Some(event) = response {
                                let text = match codec::encode_event(&event) {
                                    Ok(text) => text,
                                    Err(e) => break Err(e),
                                };
                                if let Err(e) =
                                    websocket::ws_send_text(&mut conn.ws_stream, text).await
                                {
                                    break Err(e);
                                }
                            }
                        }
                        Ok(None) => {
                            debug!(conn_id = %conn_id, "connection closed by peer");
                            break Ok(());
                        }
                        Err(e) => break Err(e),
                    }
                }
            }
        };

        // Teardown is idempotent and must run on every exit path.
        self.notifier.detach(&conn_id);
        self.lifecycle.handle_disconnect(&conn_id).await;
        info!(conn_id = %conn_id, "connection closed");
        result
    }

    /// Dispatch one decoded event; the returned event, if any, is the
    /// direct response to the caller. Errors in one connection's handling
    /// never touch another session's state.
    async fn dispatch(&self, conn_id: &str, event: ClientEvent) -> Option<ServerEvent> {
        match event {
            ClientEvent::CreateSession => match self.lifecycle.create_session(conn_id).await {
                Ok(creds) => Some(ServerEvent::SessionCreated {
                    success: true,
                    session_id: creds.session_id,
                    password: creds.password,
                }),
                Err(e) => {
                    warn!(conn_id, error = %e, "session creation failed");
                    Some(ServerEvent::Error {
                        message: "Could not create session".into(),
                    })
                }
            },

            ClientEvent::JoinSession {
                session_id,
                password,
            } => match self
                .lifecycle
                .join_session(&session_id, &password, conn_id)
                .await
            {
                Ok(permissions) => Some(ServerEvent::JoinResult {
                    success: true,
                    permissions: Some(permissions),
                    error: None,
                }),
                Err(e) => Some(ServerEvent::JoinResult {
                    success: false,
                    permissions: None,
                    error: Some(e.client_message()),
                }),
            },

            ClientEvent::JoinRoom { room_id } => {
                match self.lifecycle.join_room(&room_id, conn_id).await {
                    Ok(role) => {
                        debug!(conn_id, room_id = %room_id, ?role, "room joined");
                        None
                    }
                    Err(e) => Some(ServerEvent::Error {
                        message: e.client_message(),
                    }),
                }
            }

            ClientEvent::WebrtcOffer { target_id, offer } => {
                match self.signaling.relay_offer(conn_id, &target_id, offer).await {
                    Ok(()) => None,
                    Err(e) => Some(ServerEvent::Error {
                        message: e.client_message(),
                    }),
                }
            }

            ClientEvent::WebrtcAnswer { target_id, answer } => {
                match self
                    .signaling
                    .relay_answer(conn_id, &target_id, answer)
                    .await
                {
                    Ok(()) => None,
                    Err(e) => Some(ServerEvent::Error {
                        message: e.client_message(),
                    }),
                }
            }

            ClientEvent::IceCandidate {
                target_id,
                candidate,
            } => {
                match self
                    .signaling
                    .relay_ice_candidate(conn_id, &target_id, candidate)
                    .await
                {
                    Ok(()) => None,
                    Err(e) => Some(ServerEvent::Error {
                        message: e.client_message(),
                    }),
                }
            }

            ClientEvent::Signal { to, signal } => {
                self.signaling.relay_signal(conn_id, &to, signal);
                None
            }

            ClientEvent::UpdatePermissions { permissions } => {
                match self.gateway.update_permissions(conn_id, &permissions).await {
                    Ok(()) => None,
                    Err(e) => Some(ServerEvent::Error {
                        message: e.client_message(),
                    }),
                }
            }

            ClientEvent::RemoteControl { command } => {
                match self.gateway.forward_command(conn_id, command).await {
                    Ok(()) => None,
                    Err(e) => Some(ServerEvent::Error {
                        message: e.client_message(),
                    }),
                }
            }

            ClientEvent::LeaveRoom { room_id } => {
                debug!(conn_id, room_id = %room_id, "explicit leave");
                self.lifecycle.leave(conn_id).await;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use screenlink_proto::{CommandKind, ControlCommand, PermissionUpdate, Permissions};
    use serde_json::json;

    fn test_server() -> LinkServer {
        LinkServer::new(ServerConfig {
            port: 0,
            cert_path: None,
            key_path: None,
            max_clients_per_session: 5,
            session_timeout_secs: 86_400,
            sweep_interval_secs: 300,
        })
    }

    /// Attach an mpsc-backed connection to the server's notifier.
    fn attach(server: &LinkServer, conn_id: &str) -> mpsc::Receiver<ServerEvent> {
        let (tx, rx) = mpsc::channel(16);
        server.notifier.attach(conn_id, tx);
        rx
    }

    async fn create_session(server: &LinkServer, host: &str) -> (String, String) {
        match server.dispatch(host, ClientEvent::CreateSession).await {
            Some(ServerEvent::SessionCreated {
                success: true,
                session_id,
                password,
            }) => (session_id, password),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_join_and_signal_flow() {
        let server = test_server();
        let mut host_rx = attach(&server, "host-1");
        let mut viewer_rx = attach(&server, "viewer-1");

        let (session_id, password) = create_session(&server, "host-1").await;

        let response = server
            .dispatch(
                "viewer-1",
                ClientEvent::JoinSession {
                    session_id: session_id.clone(),
                    password,
                },
            )
            .await;
        assert_eq!(
            response,
            Some(ServerEvent::JoinResult {
                success: true,
                permissions: Some(Permissions::default()),
                error: None,
            })
        );
        assert_eq!(
            host_rx.recv().await,
            Some(ServerEvent::ClientJoined {
                client_id: "viewer-1".into(),
                total_clients: 1,
            })
        );

        // Host offer reaches the viewer; viewer answer reaches the host.
        let response = server
            .dispatch(
                "host-1",
                ClientEvent::WebrtcOffer {
                    target_id: "viewer-1".into(),
                    offer: json!({"sdp": "v=0"}),
                },
            )
            .await;
        assert_eq!(response, None);
        assert_eq!(
            viewer_rx.recv().await,
            Some(ServerEvent::WebrtcOffer {
                from_id: "host-1".into(),
                offer: json!({"sdp": "v=0"}),
            })
        );

        let response = server
            .dispatch(
                "viewer-1",
                ClientEvent::WebrtcAnswer {
                    target_id: "host-1".into(),
                    answer: json!({"sdp": "v=0"}),
                },
            )
            .await;
        assert_eq!(response, None);
        assert!(matches!(
            host_rx.recv().await,
            Some(ServerEvent::WebrtcAnswer { .. })
        ));
    }

    #[tokio::test]
    async fn wrong_password_join_reports_failure() {
        let server = test_server();
        let _host_rx = attach(&server, "host-1");
        let (session_id, _) = create_session(&server, "host-1").await;

        let response = server
            .dispatch(
                "viewer-1",
                ClientEvent::JoinSession {
                    session_id,
                    password: "WRONG".into(),
                },
            )
            .await;
        assert_eq!(
            response,
            Some(ServerEvent::JoinResult {
                success: false,
                permissions: None,
                error: Some("Invalid password".into()),
            })
        );
    }

    #[tokio::test]
    async fn permission_gate_round_trip_through_dispatch() {
        let server = test_server();
        let mut host_rx = attach(&server, "host-1");
        let _viewer_rx = attach(&server, "viewer-1");
        let (session_id, password) = create_session(&server, "host-1").await;
        server
            .dispatch(
                "viewer-1",
                ClientEvent::JoinSession {
                    session_id,
                    password,
                },
            )
            .await;
        host_rx.recv().await; // client-joined

        server
            .dispatch(
                "host-1",
                ClientEvent::UpdatePermissions {
                    permissions: PermissionUpdate {
                        control_mouse: Some(false),
                        ..Default::default()
                    },
                },
            )
            .await;

        let command = ControlCommand {
            kind: CommandKind::Mouse,
            payload: json!({"x": 1, "y": 2}),
        };
        let response = server
            .dispatch(
                "viewer-1",
                ClientEvent::RemoteControl {
                    command: command.clone(),
                },
            )
            .await;
        assert!(matches!(response, Some(ServerEvent::Error { .. })));
        assert!(host_rx.try_recv().is_err());

        server
            .dispatch(
                "host-1",
                ClientEvent::UpdatePermissions {
                    permissions: PermissionUpdate {
                        control_mouse: Some(true),
                        ..Default::default()
                    },
                },
            )
            .await;
        let response = server
            .dispatch("viewer-1", ClientEvent::RemoteControl { command })
            .await;
        assert_eq!(response, None);
        assert!(matches!(
            host_rx.recv().await,
            Some(ServerEvent::RemoteControl { .. })
        ));
    }

    #[tokio::test]
    async fn legacy_room_flow_with_unrestricted_signal() {
        let server = test_server();
        let mut a_rx = attach(&server, "a");
        let _b_rx = attach(&server, "b");

        assert_eq!(
            server
                .dispatch("a", ClientEvent::JoinRoom { room_id: "r1".into() })
                .await,
            None
        );
        assert_eq!(
            server
                .dispatch("b", ClientEvent::JoinRoom { room_id: "r1".into() })
                .await,
            None
        );
        assert_eq!(
            a_rx.recv().await,
            Some(ServerEvent::UserConnected { user_id: "b".into() })
        );

        server
            .dispatch(
                "b",
                ClientEvent::Signal {
                    to: "a".into(),
                    signal: json!({"blob": true}),
                },
            )
            .await;
        // Skip the client-joined the host also received.
        let mut saw_signal = false;
        while let Ok(event) = a_rx.try_recv() {
            if matches!(event, ServerEvent::Signal { .. }) {
                saw_signal = true;
            }
        }
        assert!(saw_signal);
    }
}
