//! Extracción tolerante de los campos etiquetados de la respuesta del LLM.
//!
//! Cada campo se busca de forma independiente en todo el texto, así que el
//! orden de las líneas no importa. Un campo ausente (o vacío) toma su valor de
//! respaldo; la extracción en sí nunca falla.

use std::sync::LazyLock;

use regex::Regex;

use crate::models::{TriageResult, FALLBACK_CATEGORY, FALLBACK_DEPARTMENT, FALLBACK_URGENCY};

static DEPARTMENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Department:(.*)").expect("regex de Department válida"));
static CATEGORY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Category:(.*)").expect("regex de Category válida"));
static URGENCY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)Urgency:(.*)").expect("regex de Urgency válida"));
// `s`: el borrador absorbe todo lo que sigue a la etiqueta, saltos de línea incluidos.
static DRAFT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)Draft:(.*)").expect("regex de Draft válida"));

/// Campos crudos extraídos de una respuesta; `None` si la etiqueta falta.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    pub department: Option<String>,
    pub category: Option<String>,
    pub urgency: Option<String>,
    pub draft: Option<String>,
}

impl ExtractedFields {
    pub fn parse(completion: &str) -> Self {
        Self {
            department: capture(&DEPARTMENT_RE, completion),
            category: capture(&CATEGORY_RE, completion),
            urgency: capture(&URGENCY_RE, completion),
            draft: capture(&DRAFT_RE, completion),
        }
    }
}

fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Construye el resultado de triaje aplicando los valores de respaldo.
/// Sin etiqueta `Draft:`, el borrador es la respuesta completa.
pub fn extract_triage(description: &str, completion: &str) -> TriageResult {
    let fields = ExtractedFields::parse(completion);
    TriageResult {
        description: description.to_string(),
        department: fields
            .department
            .unwrap_or_else(|| FALLBACK_DEPARTMENT.to_string()),
        category: fields.category.unwrap_or_else(|| FALLBACK_CATEGORY.to_string()),
        urgency: fields.urgency.unwrap_or_else(|| FALLBACK_URGENCY.to_string()),
        draft: fields.draft.unwrap_or_else(|| completion.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WELL_FORMED: &str =
        "Department: Electrical\nCategory: Lighting\nUrgency: High\nDraft: Please repair...";

    #[test]
    fn extracts_all_four_fields() {
        let r = extract_triage("Streetlight broken on 5th Ave", WELL_FORMED);
        assert_eq!(r.description, "Streetlight broken on 5th Ave");
        assert_eq!(r.department, "Electrical");
        assert_eq!(r.category, "Lighting");
        assert_eq!(r.urgency, "High");
        assert_eq!(r.draft, "Please repair...");
    }

    #[test]
    fn field_order_does_not_matter() {
        let text = "Urgency: Low\nDraft: Kindly clear the drain.\nCategory: Drainage\nDepartment: Storm Water";
        let f = ExtractedFields::parse(text);
        assert_eq!(f.department.as_deref(), Some("Storm Water"));
        assert_eq!(f.category.as_deref(), Some("Drainage"));
        assert_eq!(f.urgency.as_deref(), Some("Low"));
        // El borrador absorbe todo lo posterior, incluidas otras etiquetas.
        assert_eq!(
            f.draft.as_deref(),
            Some("Kindly clear the drain.\nCategory: Drainage\nDepartment: Storm Water")
        );
    }

    #[test]
    fn missing_urgency_falls_back_to_medium() {
        let text = "Department: Roads\nCategory: Pothole\nDraft: Fix it.";
        let r = extract_triage("Pothole", text);
        assert_eq!(r.urgency, "Medium");
        assert_eq!(r.department, "Roads");
        assert_eq!(r.category, "Pothole");
        assert_eq!(r.draft, "Fix it.");
    }

    #[test]
    fn missing_everything_uses_all_fallbacks_and_whole_text_as_draft() {
        let text = "I am sorry, I cannot help with that.";
        let r = extract_triage("x", text);
        assert_eq!(r.department, "Not identified");
        assert_eq!(r.category, "General");
        assert_eq!(r.urgency, "Medium");
        assert_eq!(r.draft, text);
    }

    #[test]
    fn labels_are_case_insensitive_and_values_trimmed() {
        let text = "DEPARTMENT:   Water Supply  \ncategory:\tLeakage\nurgency: high\ndraft:\n\n  Respected Sir,\n  water is leaking.\n";
        let f = ExtractedFields::parse(text);
        assert_eq!(f.department.as_deref(), Some("Water Supply"));
        assert_eq!(f.category.as_deref(), Some("Leakage"));
        assert_eq!(f.urgency.as_deref(), Some("high"));
        assert_eq!(f.draft.as_deref(), Some("Respected Sir,\n  water is leaking."));
    }

    #[test]
    fn empty_value_counts_as_missing() {
        let r = extract_triage("x", "Department:   \nCategory: Garbage\nDraft: ok");
        assert_eq!(r.department, "Not identified");
        assert_eq!(r.category, "Garbage");
    }

    #[test]
    fn crlf_line_endings_are_trimmed() {
        let f = ExtractedFields::parse("Department: Health\r\nUrgency: Low\r\n");
        assert_eq!(f.department.as_deref(), Some("Health"));
        assert_eq!(f.urgency.as_deref(), Some("Low"));
    }

    #[test]
    fn first_occurrence_wins_for_single_line_fields() {
        let f = ExtractedFields::parse("Category: Water\nCategory: Road");
        assert_eq!(f.category.as_deref(), Some("Water"));
    }
}
