use super::protocol::GatewayEvent;
use dashmap::DashMap;
use tokio::sync::mpsc;

/// Fans gateway events out to every connected client
#[derive(Default)]
pub struct EventBroadcaster {
    clients: DashMap<String, mpsc::UnboundedSender<GatewayEvent>>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client; returns its id and the receiving end of its queue
    pub fn subscribe(&self) -> (String, mpsc::UnboundedReceiver<GatewayEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client_id = uuid::Uuid::new_v4().to_string();
        self.clients.insert(client_id.clone(), tx);
        log::debug!("[WS] Client {} subscribed ({} total)", client_id, self.clients.len());
        (client_id, rx)
    }

    pub fn unsubscribe(&self, client_id: &str) {
        if self.clients.remove(client_id).is_some() {
            log::debug!("[WS] Client {} unsubscribed", client_id);
        }
    }

    /// Send to every client, dropping those whose receiver is gone
    pub fn broadcast(&self, event: GatewayEvent) {
        self.clients.retain(|client_id, tx| {
            let alive = tx.send(event.clone()).is_ok();
            if !alive {
                log::debug!("[WS] Dropping disconnected client {}", client_id);
            }
            alive
        });
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }
}
