//! End-to-end relay through a real listener and WebSocket clients.

use futures_util::{SinkExt, StreamExt};
use huddle_hub::{Hub, HubConfig, Room};
use huddle_node::api::{create_router, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_node(config: HubConfig) -> (SocketAddr, Arc<Hub>) {
    let hub = Arc::new(Hub::new(config));
    let app = create_router(AppState::new(hub.clone(), 1024));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, hub)
}

async fn join(addr: SocketAddr, room: &Room) -> Socket {
    let expected = room.member_count() + 1;
    let (socket, response) = connect_async(format!("ws://{addr}/ws/{}", room.id))
        .await
        .unwrap();
    assert_eq!(response.status(), 101);

    for _ in 0..200 {
        if room.member_count() >= expected {
            return socket;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("client never joined");
}

async fn next_data(socket: &mut Socket) -> Message {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .expect("read failed");
        if message.is_text() || message.is_binary() {
            return message;
        }
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never became true");
}

#[tokio::test]
async fn test_relay_between_two_sockets() {
    let (addr, hub) = start_node(HubConfig::default()).await;
    let room = hub.create_room();
    let id = room.id.clone();

    let mut x = join(addr, &room).await;
    let mut y = join(addr, &room).await;

    x.send(Message::text("hello")).await.unwrap();
    assert_eq!(next_data(&mut y).await, Message::text("hello"));

    y.send(Message::binary(vec![1u8, 2, 3])).await.unwrap();
    assert_eq!(next_data(&mut x).await, Message::binary(vec![1u8, 2, 3]));

    // The sender never hears its own message.
    let echo = tokio::time::timeout(Duration::from_millis(100), x.next()).await;
    assert!(echo.is_err());

    y.close(None).await.unwrap();
    wait_until(|| room.member_count() == 1).await;
    assert!(hub.get_room(&id).is_some());

    x.close(None).await.unwrap();
    wait_until(|| hub.get_room(&id).is_none()).await;
}

#[tokio::test]
async fn test_upgrade_to_unknown_room_is_404() {
    let (addr, _hub) = start_node(HubConfig::default()).await;

    let result = connect_async(format!("ws://{addr}/ws/nonexistent")).await;
    match result {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 404),
        other => panic!("expected HTTP 404, got {other:?}"),
    }
}

#[tokio::test]
async fn test_dropped_socket_is_cleaned_up() {
    let (addr, hub) = start_node(HubConfig::default()).await;
    let room = hub.create_room();

    let x = join(addr, &room).await;
    let _y = join(addr, &room).await;

    drop(x);
    wait_until(|| room.member_count() == 1).await;
    assert_eq!(hub.client_count(), 1);
}

#[tokio::test]
async fn test_shutdown_closes_sockets() {
    let (addr, hub) = start_node(HubConfig::default()).await;
    let room = hub.create_room();

    let mut x = join(addr, &room).await;

    assert!(hub.shutdown(Duration::from_secs(5)).await);

    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        while let Some(message) = x.next().await {
            match message {
                Ok(Message::Close(_)) | Err(_) => return,
                Ok(_) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok());
    assert_eq!(hub.client_count(), 0);
}
