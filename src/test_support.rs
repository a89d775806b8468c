//! Local upstream servers for exercising outbound fetches in tests.

use axum::Router;

/// Serves `router` on an ephemeral loopback port and returns its base URL.
pub async fn spawn_upstream(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind upstream listener");
    let addr = listener.local_addr().expect("upstream local addr");

    tokio::spawn(async move {
        axum::serve(listener, router)
            .await
            .expect("upstream server");
    });

    format!("http://{addr}")
}
