//! Modelos de dominio (petición de triaje, resultado extraído y registro persistido).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// Valores de respaldo cuando el modelo omite un campo.
pub const FALLBACK_DEPARTMENT: &str = "Not identified";
pub const FALLBACK_CATEGORY: &str = "General";
pub const FALLBACK_URGENCY: &str = "Medium";

pub const URGENCY_HIGH: &str = "High";
pub const URGENCY_MEDIUM: &str = "Medium";
pub const URGENCY_LOW: &str = "Low";

/// Cuerpo de `POST /api/triage`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriageRequest {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    #[serde(default)]
    pub pincode: Option<String>,
}

/// Los cuatro campos extraídos de la respuesta del LLM, más la descripción.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TriageResult {
    pub description: String,
    pub department: String,
    pub category: String,
    pub urgency: String,
    pub draft: String,
}

/// Resultado enriquecido con ubicación, listo para guardarse.
#[derive(Debug, Clone, PartialEq)]
pub struct NewIssue {
    pub triage: TriageResult,
    pub location: GeoPoint,
    pub pincode: Option<String>,
}

/// Representa un nodo (:Issue) persistido. Nunca se modifica ni se borra.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRecord {
    pub id: String,
    pub description: String,
    pub department: String,
    pub category: String,
    pub urgency: String,
    pub draft: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pincode: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl IssueRecord {
    pub fn from_new(id: String, created_at: DateTime<Utc>, issue: NewIssue) -> Self {
        let NewIssue {
            triage,
            location,
            pincode,
        } = issue;
        Self {
            id,
            description: triage.description,
            department: triage.department,
            category: triage.category,
            urgency: triage.urgency,
            draft: triage.draft,
            lat: location.lat,
            lng: location.lng,
            pincode,
            created_at,
        }
    }

    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }

    pub fn is_high_urgency(&self) -> bool {
        self.urgency == URGENCY_HIGH
    }
}

/// Horas objetivo por nivel de urgencia. Sólo informativo, no se hace cumplir.
pub fn sla_hours(urgency: &str) -> u32 {
    match urgency {
        URGENCY_HIGH => 24,
        URGENCY_MEDIUM => 72,
        _ => 120,
    }
}
