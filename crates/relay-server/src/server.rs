//! Relay server lifecycle.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::rooms::RoomRegistry;
use crate::{DEFAULT_PORT, ServerError};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind: IpAddr,
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
        }
    }
}

/// A bound relay, ready to serve.
pub struct RelayServer {
    listener: TcpListener,
    rooms: RoomRegistry,
}

impl RelayServer {
    /// Binds the listening socket.
    pub async fn bind(config: &ServerConfig) -> Result<Self, ServerError> {
        let addr = SocketAddr::new(config.bind, config.port);
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            rooms: RoomRegistry::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// The server's rooms; shared with the running server.
    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Serves until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ServerError> {
        let local_addr = self.listener.local_addr()?;
        info!("relay listening on {local_addr}");

        let app = crate::router(self.rooms);
        axum::serve(self.listener, app)
            .with_graceful_shutdown(async move { cancel.cancelled().await })
            .await?;

        info!("relay shut down");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sendit_protocol::{CreateRoomResponse, IceCandidate, SignalingMessage};
    use sendit_relay_client::{RelayClient, RelayError, RelayEvent, create_room_url};
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite;

    use super::*;

    struct Running {
        endpoint: String,
        rooms: RoomRegistry,
        cancel: CancellationToken,
    }

    impl Drop for Running {
        fn drop(&mut self) {
            self.cancel.cancel();
        }
    }

    async fn start() -> Running {
        let config = ServerConfig {
            bind: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
        };
        let server = RelayServer::bind(&config).await.unwrap();
        let addr = server.local_addr().unwrap();
        let rooms = server.rooms().clone();
        let cancel = CancellationToken::new();
        tokio::spawn(server.run(cancel.clone()));
        Running {
            endpoint: format!("http://{addr}"),
            rooms,
            cancel,
        }
    }

    async fn next(rx: &mut mpsc::Receiver<RelayEvent>) -> RelayEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for relay event")
            .expect("relay event stream ended")
    }

    /// Joins finish on the server after the client handshake returns.
    async fn wait_for_participants(rooms: &RoomRegistry, room: &str, count: usize) {
        for _ in 0..100 {
            if rooms.participants(room).await == Some(count) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("room {room} never reached {count} participants");
    }

    fn http_status(err: RelayError) -> u16 {
        match err {
            RelayError::Ws(tungstenite::Error::Http(resp)) => resp.status().as_u16(),
            other => panic!("expected HTTP rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_room_returns_fresh_id() {
        let relay = start().await;
        let url = create_room_url(&relay.endpoint).unwrap();
        let resp: CreateRoomResponse = reqwest::Client::new()
            .post(url)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert!(uuid::Uuid::parse_str(&resp.room_id).is_ok());
        assert!(relay.rooms.contains(&resp.room_id).await);
    }

    #[tokio::test]
    async fn relays_handshake_between_participants() {
        let relay = start().await;
        relay.rooms.open("abc123").await;

        let (a, mut a_rx) = RelayClient::connect(&relay.endpoint, "abc123").await.unwrap();
        let (b, mut b_rx) = RelayClient::connect(&relay.endpoint, "abc123").await.unwrap();
        assert_eq!(next(&mut a_rx).await, RelayEvent::Opened);
        assert_eq!(next(&mut b_rx).await, RelayEvent::Opened);
        wait_for_participants(&relay.rooms, "abc123", 2).await;

        let offer = SignalingMessage::Offer {
            sdp: "v=0 offer".into(),
            peer_id: Some("peer-a".into()),
        };
        a.send(&offer).await.unwrap();
        assert_eq!(next(&mut b_rx).await, RelayEvent::Message(offer));

        let answer = SignalingMessage::Answer {
            sdp: "v=0 answer".into(),
        };
        b.send(&answer).await.unwrap();
        assert_eq!(next(&mut a_rx).await, RelayEvent::Message(answer));

        let candidate = SignalingMessage::IceCandidate {
            candidate: IceCandidate {
                candidate: "candidate:1 1 udp 1 127.0.0.1 9 typ host".into(),
                sdp_mid: Some("0".into()),
                sdp_mline_index: Some(0),
                username_fragment: None,
            },
        };
        b.send(&candidate).await.unwrap();
        assert_eq!(next(&mut a_rx).await, RelayEvent::Message(candidate));
    }

    #[tokio::test]
    async fn rejects_bad_joins() {
        let relay = start().await;

        let err = RelayClient::connect(&relay.endpoint, "missing")
            .await
            .err()
            .unwrap();
        assert_eq!(http_status(err), 404);

        relay.rooms.open("abc123").await;
        let _a = RelayClient::connect(&relay.endpoint, "abc123").await.unwrap();
        let _b = RelayClient::connect(&relay.endpoint, "abc123").await.unwrap();
        wait_for_participants(&relay.rooms, "abc123", 2).await;
        let err = RelayClient::connect(&relay.endpoint, "abc123")
            .await
            .err()
            .unwrap();
        assert_eq!(http_status(err), 409);

        let url = format!("{}/ws", relay.endpoint.replace("http", "ws"));
        let err = tokio_tungstenite::connect_async(url.as_str()).await.err().unwrap();
        assert!(matches!(err, tungstenite::Error::Http(ref r) if r.status().as_u16() == 400));
    }

    #[tokio::test]
    async fn drops_payloads_that_are_not_signaling() {
        use futures_util::SinkExt;

        let relay = start().await;
        relay.rooms.open("abc123").await;
        let (_b, mut b_rx) = RelayClient::connect(&relay.endpoint, "abc123").await.unwrap();
        assert_eq!(next(&mut b_rx).await, RelayEvent::Opened);

        let url = format!(
            "{}/ws?room=abc123",
            relay.endpoint.replace("http", "ws")
        );
        let (mut raw, _) = tokio_tungstenite::connect_async(url.as_str()).await.unwrap();
        wait_for_participants(&relay.rooms, "abc123", 2).await;
        for text in ["garbage", r#"{"type":"hello"}"#, r#"{"type":"answer","sdp":"ok"}"#] {
            raw.send(tungstenite::Message::Text(text.into())).await.unwrap();
        }

        assert_eq!(
            next(&mut b_rx).await,
            RelayEvent::Message(SignalingMessage::Answer { sdp: "ok".into() })
        );
    }

    #[tokio::test]
    async fn room_closes_when_everyone_leaves() {
        let relay = start().await;
        relay.rooms.open("abc123").await;

        let (a, mut a_rx) = RelayClient::connect(&relay.endpoint, "abc123").await.unwrap();
        assert_eq!(next(&mut a_rx).await, RelayEvent::Opened);
        wait_for_participants(&relay.rooms, "abc123", 1).await;
        a.close().await;
        assert_eq!(next(&mut a_rx).await, RelayEvent::Closed);

        for _ in 0..50 {
            if !relay.rooms.contains("abc123").await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("room still open after its only participant left");
    }
}
