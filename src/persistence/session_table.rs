use crate::domain::session::SessionRecord;
use crate::domain::session::driven_ports::SessionStore;
use anyhow::anyhow;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Process-local session store. Sessions don't survive a restart.
#[derive(Clone, Default)]
pub struct SessionTable {
    sessions: Arc<RwLock<HashMap<String, SessionRecord>>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for SessionTable {
    async fn load(&self, token: &str) -> Result<Option<SessionRecord>, anyhow::Error> {
        let now = Utc::now();
        {
            let sessions = self
                .sessions
                .read()
                .map_err(|_| anyhow!("session table lock poisoned"))?;
            match sessions.get(token) {
                None => return Ok(None),
                Some(record) if !record.is_expired_at(now) => return Ok(Some(record.clone())),
                Some(_) => {}
            }
        }

        debug!("Dropping expired session");
        self.sessions
            .write()
            .map_err(|_| anyhow!("session table lock poisoned"))?
            .remove(token);

        Ok(None)
    }

    async fn save(&self, token: &str, record: &SessionRecord) -> Result<(), anyhow::Error> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| anyhow!("session table lock poisoned"))?;

        if !sessions.contains_key(token) {
            let now = Utc::now();
            let before = sessions.len();
            sessions.retain(|_, existing| !existing.is_expired_at(now));
            if sessions.len() < before {
                debug!(purged = before - sessions.len(), "Purged expired sessions");
            }
        }
        sessions.insert(token.to_owned(), record.clone());

        Ok(())
    }

    async fn destroy(&self, token: &str) -> Result<(), anyhow::Error> {
        self.sessions
            .write()
            .map_err(|_| anyhow!("session table lock poisoned"))?
            .remove(token);

        Ok(())
    }
}
