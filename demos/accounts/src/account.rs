use chrono::{DateTime, Utc};
use docstore::{DocumentType, SchemaDescriptor};
use serde::{Deserialize, Serialize};

/// A customer account. `join_date` is stored as unix seconds so that it can be
/// range-queried; see [`join_date_converter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: u32,
    #[serde(rename = "name")]
    pub customer_name: String,
    #[serde(rename = "department")]
    pub customer_department: String,
    pub iban: String,
    pub balance: f64,
    #[serde(rename = "joinDate")]
    pub join_date: DateTime<Utc>,
}

impl Account {
    /// Copy of this account with a different balance.
    pub fn with_balance(&self, balance: f64) -> Self {
        Account {
            balance,
            ..self.clone()
        }
    }
}

impl DocumentType for Account {
    const TYPE_NAME: &'static str = "Account";

    fn schema() -> SchemaDescriptor {
        SchemaDescriptor::new()
            .numeric("$.id", "id", false)
            .text("$.name", "name", true)
            .text("$.department", "department", true)
            .text("$.iban", "iban", true)
            .numeric("$.balance", "balance", true)
            .numeric("$.joinDate", "joinDate", true)
    }
}

pub fn join_date_converter() -> docstore::UnixTime {
    docstore::UnixTime::seconds(["$.joinDate"])
}
