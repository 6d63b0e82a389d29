//! Client directory kept per signed-in user
//!
//! Rows live in the clients table; wire names are `nombre`, `telefono` and `userId`.

use crate::error::{required, DataError};
use crate::rest::{read_json, RestBackend};
use crate::wire::{self, SINGLE_OBJECT};
use probecare_session::{AccountId, ProviderError};
use reqwest::header;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Row identifier assigned by the database
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Number(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// A stored client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: RecordId,
    #[serde(rename = "nombre")]
    pub name: String,
    #[serde(rename = "telefono")]
    pub phone: String,
    #[serde(rename = "userId")]
    pub owner: AccountId,
}

/// Validated input for a new client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewClient {
    name: String,
    phone: String,
}

impl NewClient {
    /// Trim both fields; either being blank is an error
    pub fn new(name: &str, phone: &str) -> Result<Self, DataError> {
        Ok(Self {
            name: required("name", name)?,
            phone: required("phone", phone)?,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn phone(&self) -> &str {
        &self.phone
    }
}

#[derive(Serialize)]
struct ClientRow<'a> {
    nombre: &'a str,
    telefono: &'a str,
    #[serde(rename = "userId")]
    user_id: AccountId,
}

impl RestBackend {
    /// Clients owned by `owner`
    pub async fn list_clients(&self, owner: AccountId) -> Result<Vec<ClientRecord>, DataError> {
        let url = self.endpoint(&["rest", "v1", self.config().clients_table.as_str()])?;
        let response = self
            .authorized(self.http().get(url))?
            .query(&[("userId", format!("eq.{owner}")), ("select", "*".to_string())])
            .send()
            .await
            .map_err(|e| wire::transport(&e))?;
        let clients: Vec<ClientRecord> = read_json(response).await?;
        tracing::debug!(%owner, count = clients.len(), "clients listed");
        Ok(clients)
    }

    /// Store a client owned by the signed-in user
    pub async fn add_client(&self, client: &NewClient) -> Result<ClientRecord, DataError> {
        let owner = self
            .current_session()
            .map(|s| s.account_id())
            .ok_or(ProviderError::NotSignedIn)?;

        let url = self.endpoint(&["rest", "v1", self.config().clients_table.as_str()])?;
        let row = ClientRow {
            nombre: &client.name,
            telefono: &client.phone,
            user_id: owner,
        };
        let response = self
            .authorized(self.http().post(url))?
            .header("Prefer", "return=representation")
            .header(header::ACCEPT, SINGLE_OBJECT)
            .json(&row)
            .send()
            .await
            .map_err(|e| wire::transport(&e))?;
        let record: ClientRecord = read_json(response).await?;
        tracing::info!(%owner, client = %record.id, "client added");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_client_trims_fields() {
        let client = NewClient::new("  Acme Labs ", " 555-0101 ").unwrap();
        assert_eq!(client.name(), "Acme Labs");
        assert_eq!(client.phone(), "555-0101");
    }

    #[test]
    fn blank_phone_is_rejected() {
        assert_eq!(
            NewClient::new("Acme", "   ").unwrap_err(),
            DataError::Empty("phone")
        );
    }

    #[test]
    fn record_reads_wire_names() {
        let owner = AccountId::new();
        let record: ClientRecord = serde_json::from_value(json!({
            "id": 7,
            "nombre": "Acme",
            "telefono": "555",
            "userId": owner.to_string(),
            "created_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();

        assert_eq!(record.id, RecordId::Number(7));
        assert_eq!(record.name, "Acme");
        assert_eq!(record.owner, owner);
    }

    #[test]
    fn text_ids_are_accepted() {
        let record: ClientRecord = serde_json::from_value(json!({
            "id": "c-1",
            "nombre": "Acme",
            "telefono": "555",
            "userId": AccountId::new().to_string()
        }))
        .unwrap();
        assert_eq!(record.id.to_string(), "c-1");
    }
}
