//! Almacén de incidencias: colección sólo de inserción.
//!
//! API pública:
//!   - `IssueStore::append(NewIssue) -> IssueRecord`
//!   - `IssueStore::list_all()` (más reciente primero).
//!
//! No hay actualización, borrado ni filtrado en esta capa: el panel lee la
//! colección completa en cada carga y filtra en memoria.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Timelike, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{IssueRecord, NewIssue};

#[async_trait]
pub trait IssueStore: Send + Sync {
    /// Persiste la incidencia asignando `id` y `created_at`.
    async fn append(&self, issue: NewIssue) -> Result<IssueRecord, StoreError>;

    /// Todas las incidencias ordenadas por `created_at` descendente.
    async fn list_all(&self) -> Result<Vec<IssueRecord>, StoreError>;

    fn backend_name(&self) -> &'static str;
}

/// Identificador opaco y único para un registro nuevo.
pub fn new_issue_id() -> String {
    Uuid::new_v4().to_string()
}

/// Marca de tiempo de persistencia con resolución de milisegundos,
/// estrictamente posterior a la última asignada.
pub fn next_timestamp(last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = truncate_to_millis(Utc::now());
    match last {
        Some(prev) if prev >= now => prev + Duration::milliseconds(1),
        _ => now,
    }
}

// Neo4j ordena por `created_at_ms`: dos marcas en el mismo milisegundo
// quedarían sin orden definido.
fn truncate_to_millis(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_nanosecond(ts.nanosecond() / 1_000_000 * 1_000_000)
        .unwrap_or(ts)
}

/// Almacén en memoria del proceso, para la demo y los tests.
#[derive(Debug, Default)]
pub struct MemoryIssueStore {
    issues: RwLock<Vec<IssueRecord>>,
}

impl MemoryIssueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IssueStore for MemoryIssueStore {
    async fn append(&self, issue: NewIssue) -> Result<IssueRecord, StoreError> {
        let mut issues = self.issues.write().await;
        let created_at = next_timestamp(issues.last().map(|r| r.created_at));
        let record = IssueRecord::from_new(new_issue_id(), created_at, issue);
        issues.push(record.clone());
        Ok(record)
    }

    async fn list_all(&self) -> Result<Vec<IssueRecord>, StoreError> {
        let issues = self.issues.read().await;
        // Se guardan en orden de inserción (= orden de created_at).
        Ok(issues.iter().rev().cloned().collect())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
