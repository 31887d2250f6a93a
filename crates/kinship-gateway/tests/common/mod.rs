#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use kinship_db::Database;
use kinship_gateway::{Gateway, GatewayConfig};
use kinship_types::events::GatewayEvent;
use kinship_types::models::UserSummary;

pub const SECRET: &str = "test-secret";

pub struct World {
    pub db: Arc<Database>,
    pub gateway: Gateway,
}

impl World {
    pub fn new(debounce: Duration) -> Self {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let mut config = GatewayConfig::new(SECRET);
        config.offline_debounce = debounce;
        let gateway = Gateway::with_database(config, db.clone());
        Self { db, gateway }
    }

    pub fn user(&self, name: &str) -> UserSummary {
        let id = Uuid::new_v4();
        self.db.create_user(id, name, "hash").unwrap();
        UserSummary {
            id,
            username: name.to_string(),
        }
    }

    pub fn befriend(&self, a: &UserSummary, b: &UserSummary) {
        self.db.add_friendship(a.id, b.id).unwrap();
    }

    pub fn chat_count(&self) -> i64 {
        self.db
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM chats", [], |r| r.get(0))?))
            .unwrap()
    }
}

/// Everything queued for a connection so far.
pub fn drain(events: &mut UnboundedReceiver<GatewayEvent>) -> Vec<GatewayEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
