//! Request identity and VDB coordinates, passed explicitly down the call chain.

use serde::{Deserialize, Serialize};

/// Who is asking, and against which VDB version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkContext {
    pub session_id: String,
    pub user_name: String,
    pub vdb_name: String,
    pub vdb_version: u32,
    pub connection_id: String,
}

impl WorkContext {
    pub fn new(vdb_name: impl Into<String>, vdb_version: u32) -> Self {
        let session_id = uuid::Uuid::new_v4().simple().to_string();
        Self {
            connection_id: session_id.clone(),
            session_id,
            user_name: "anonymous".to_string(),
            vdb_name: vdb_name.into(),
            vdb_version,
        }
    }

    pub fn with_user(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = user_name.into();
        self
    }

    pub fn with_connection(mut self, connection_id: impl Into<String>) -> Self {
        self.connection_id = connection_id.into();
        self
    }
}
