//! Throwaway registry servers for tests

use axum::Router;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;

pub const TOKEN: &str = "test-token";

/// Serve `router` on an ephemeral local port and return its API base URL
pub async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    format!("http://{}/api/v3", addr)
}

/// Serve a single raw HTTP response, then hang up
///
/// Used to simulate connections that die part way through a body.
pub async fn serve_raw_once(head: String, body: Vec<u8>, hold_open: Option<std::time::Duration>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 4096];
        let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut request).await;
        socket.write_all(head.as_bytes()).await.unwrap();
        socket.write_all(&body).await.unwrap();
        socket.flush().await.unwrap();
        if let Some(delay) = hold_open {
            tokio::time::sleep(delay).await;
        }
    });

    format!("http://{}/api/v3", addr)
}

/// Accept connections and never answer
pub async fn serve_silent() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    format!("http://{}/api/v3", addr)
}
