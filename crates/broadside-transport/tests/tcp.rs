//! Integration tests for the TCP transport.
//!
//! These tests spin up a real listener on loopback and connect a real
//! client to it, so bytes actually cross the socket.

#[cfg(feature = "tcp")]
mod tcp {
    use broadside_transport::{Connection, TcpConnection, TcpTransport, Transport};

    /// Binds on an OS-assigned port and returns the transport plus its address.
    async fn bind_any() -> (TcpTransport, String) {
        let transport = TcpTransport::bind("127.0.0.1:0").await.expect("should bind");
        let addr = transport.local_addr().expect("should have addr").to_string();
        (transport, addr)
    }

    /// Reads until exactly `len` bytes have arrived. TCP may split writes.
    async fn recv_exact(conn: &TcpConnection, len: usize) -> Vec<u8> {
        let mut out = Vec::new();
        while out.len() < len {
            let chunk = conn
                .recv()
                .await
                .expect("recv should succeed")
                .expect("stream should stay open");
            out.extend_from_slice(&chunk);
        }
        out
    }

    #[tokio::test]
    async fn test_tcp_accept_and_send_receive() {
        let (mut transport, addr) = bind_any().await;

        let server_handle =
            tokio::spawn(async move { transport.accept().await.expect("should accept") });

        let client = TcpConnection::connect(&addr).await.expect("should connect");
        let server_conn = server_handle.await.expect("task should complete");

        assert!(server_conn.id().into_inner() > 0);
        assert_ne!(server_conn.id(), client.id());

        // --- Server sends, client receives ---
        server_conn
            .send(b"hello from server")
            .await
            .expect("send should succeed");
        assert_eq!(recv_exact(&client, 17).await, b"hello from server");

        // --- Client sends, server receives ---
        client.send(b"hello from client").await.expect("send should succeed");
        assert_eq!(recv_exact(&server_conn, 17).await, b"hello from client");

        server_conn.close().await.expect("close should succeed");
    }

    #[tokio::test]
    async fn test_tcp_recv_returns_none_on_peer_close() {
        let (mut transport, addr) = bind_any().await;

        let server_handle =
            tokio::spawn(async move { transport.accept().await.expect("should accept") });

        let client = TcpConnection::connect(&addr).await.expect("should connect");
        let server_conn = server_handle.await.unwrap();

        client.close().await.expect("close should succeed");

        let result = server_conn.recv().await.expect("recv should not error");
        assert!(result.is_none(), "should return None on peer close");
    }

    #[tokio::test]
    async fn test_tcp_connect_to_closed_port_fails() {
        // Bind then drop to obtain a port nobody listens on.
        let (transport, addr) = bind_any().await;
        drop(transport);

        let result = TcpConnection::connect(&addr).await;
        assert!(result.is_err(), "connecting to a closed port should fail");
    }
}
