mod routes;
mod services;
mod state;

use std::sync::Arc;

use services::checkpoint::{BlobStore, MemoryStore, SnapshotStore};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let port: u16 = std::env::var("PORT")
        .unwrap_or_else(|_| "4600".into())
        .parse()
        .expect("invalid PORT");

    let checkpoints: Arc<dyn SnapshotStore> = match std::env::var("CHECKPOINT_DIR") {
        Ok(dir) => {
            let store = BlobStore::open(&dir).expect("checkpoint dir init failed");
            tracing::info!(%dir, count = store.count(), "checkpoint blobs on disk");
            Arc::new(store)
        }
        Err(_) => {
            tracing::info!("CHECKPOINT_DIR not set — checkpoints kept in memory");
            Arc::new(MemoryStore::new())
        }
    };

    let state = state::AppState::new(checkpoints);

    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "whiteboard server listening");
    axum::serve(listener, app).await.expect("server failed");
}
