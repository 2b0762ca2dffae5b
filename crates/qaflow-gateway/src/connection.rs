use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A connected dashboard client.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: Uuid,
    pub connected_at: Instant,
}

impl Connection {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            connected_at: Instant::now(),
        }
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks active WebSocket dashboard connections.
#[derive(Default)]
pub struct ConnectionManager {
    connections: RwLock<HashMap<Uuid, Connection>>,
}

impl ConnectionManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn add(&self, conn: Connection) {
        let id = conn.id;
        self.connections.write().await.insert(id, conn);
        tracing::info!(connection_id = %id, "Connection added");
    }

    pub async fn remove(&self, id: Uuid) {
        if let Some(conn) = self.connections.write().await.remove(&id) {
            tracing::info!(
                connection_id = %id,
                connected_ms = u64::try_from(conn.connected_at.elapsed().as_millis()).unwrap_or(u64::MAX),
                "Connection removed"
            );
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}
