//! Saved SQL query templates and their parameter engine.
//!
//! A saved query stores raw template text; its parameters are never stored,
//! they are derived on demand by parsing the SQL.
pub mod params;
pub mod slash;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use self::params::CompiledQuery;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedQuery {
    pub id: String,
    pub sql: String,
    pub connection_id: String,
}

impl SavedQuery {
    pub fn new<I, S, C>(id: I, sql: S, connection_id: C) -> Self
    where
        I: Into<String>,
        S: Into<String>,
        C: Into<String>,
    {
        Self {
            id: id.into(),
            sql: sql.into(),
            connection_id: connection_id.into(),
        }
    }

    /// The distinct parameter names this query's SQL declares.
    pub fn params(&self) -> Vec<String> {
        params::extract_params(&self.sql)
    }

    /// Substitute values into the template.
    pub fn compile(&self, values: &Map<String, Value>) -> CompiledQuery {
        params::compile(&self.sql, values)
    }
}
