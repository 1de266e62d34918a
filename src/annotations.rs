//! Anotaciones de gestión por incidencia (estado, funcionario asignado, notas).
//!
//! Es un agregado mutable separado del registro de triaje, que sigue siendo
//! sólo de inserción. Vive en memoria del proceso y se pierde al reiniciar.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseStatus {
    #[default]
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    Resolved,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseAnnotation {
    pub status: CaseStatus,
    pub assigned_to: Option<String>,
    pub notes: Vec<String>,
}

#[derive(Debug, Default)]
pub struct AnnotationBook {
    entries: RwLock<HashMap<String, CaseAnnotation>>,
}

impl AnnotationBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anotación actual; una incidencia sin tocar está `Pending` y sin notas.
    pub async fn get(&self, issue_id: &str) -> CaseAnnotation {
        self.entries
            .read()
            .await
            .get(issue_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn assign(&self, issue_id: &str, officer: &str) -> CaseAnnotation {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(issue_id.to_string()).or_default();
        entry.assigned_to = Some(officer.to_string());
        entry.notes.push(format!("Assigned to {officer}"));
        entry.clone()
    }

    pub async fn add_note(&self, issue_id: &str, note: &str) -> CaseAnnotation {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(issue_id.to_string()).or_default();
        entry.notes.push(note.to_string());
        entry.clone()
    }

    pub async fn set_status(&self, issue_id: &str, status: CaseStatus) -> CaseAnnotation {
        let mut entries = self.entries.write().await;
        let entry = entries.entry(issue_id.to_string()).or_default();
        entry.status = status;
        entry.clone()
    }
}
