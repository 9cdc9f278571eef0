use sqlx::SqlitePool;

use crate::hub::Hub;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub hub: Hub,
}

impl AppState {
    pub fn new(db: SqlitePool, hub: Hub) -> Self {
        Self { db, hub }
    }
}
