//! Integration tests for the observer WebSocket transport.

#[cfg(feature = "websocket")]
mod websocket {
    use beatlobby_transport::{Connection, Transport, WebSocketTransport};
    use bytes::Bytes;
    use futures_util::{SinkExt, StreamExt};
    use tokio_tungstenite::tungstenite::Message;

    #[tokio::test]
    async fn test_websocket_text_payload_arrives_as_text() {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let addr = transport.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            transport.accept().await.expect("should accept")
        });
        let (mut client, _) =
            tokio_tungstenite::connect_async(format!("ws://{addr}"))
                .await
                .expect("client should connect");
        let conn = server.await.unwrap();

        conn.send(Bytes::from_static(br#"{"type":"SetLobbyCountdown"}"#))
            .await
            .expect("send");

        let msg = client.next().await.unwrap().unwrap();
        match msg {
            Message::Text(text) => {
                assert_eq!(text.as_str(), r#"{"type":"SetLobbyCountdown"}"#);
            }
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_websocket_recv_reports_close() {
        let mut transport =
            WebSocketTransport::bind("127.0.0.1:0").await.unwrap();
        let addr = transport.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move { transport.accept().await });
        let (mut client, _) =
            tokio_tungstenite::connect_async(format!("ws://{addr}"))
                .await
                .unwrap();
        let conn = server.await.unwrap().unwrap();

        client.send(Message::Text("ignored".into())).await.unwrap();
        let first = conn.recv().await.unwrap().unwrap();
        assert_eq!(&first[..], b"ignored");

        client.close(None).await.unwrap();
        assert!(conn.recv().await.unwrap().is_none());
    }
}
