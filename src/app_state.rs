use std::sync::Arc;

use crate::{
    annotations::AnnotationBook, config::AppConfig, hotspot::WardPolygon, store::IssueStore,
    triage::TriageService,
};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub store: Arc<dyn IssueStore>,
    pub triage: TriageService,
    pub annotations: Arc<AnnotationBook>,
    pub wards: Arc<Vec<WardPolygon>>,
}
