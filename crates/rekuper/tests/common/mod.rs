use rekuper_store::{http, Store};
use std::sync::Arc;

/// Serves an in-memory record store on an ephemeral port and returns its
/// base URL. The server task lives for the rest of the test process.
pub async fn spawn_store() -> String {
    let store = Arc::new(Store::in_memory().unwrap());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, http::app(store)).await.unwrap();
    });
    format!("http://{addr}")
}
