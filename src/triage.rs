//! Flujo de triaje:
//!   1. Validación de la petición (antes de cualquier llamada externa).
//!   2. Enriquecimiento geográfico (coordenadas sintéticas si no llegan).
//!   3. Una llamada de clasificación al LLM, acotada por timeout.
//!   4. Extracción tolerante de los cuatro campos.
//!   5. Una escritura en el almacén.
//!
//! Si la escritura falla tras clasificar, el resultado se pierde (como mucho
//! una vez, sin reintento ni compensación).

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{error, info};

use crate::error::TriageError;
use crate::extract::extract_triage;
use crate::geo::{BoundingBox, GeoPoint};
use crate::llm::{self, TextCompletion};
use crate::models::{IssueRecord, NewIssue, TriageRequest};
use crate::store::IssueStore;

/// Petición ya validada y con ubicación resuelta.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedTriage {
    pub description: String,
    pub location: GeoPoint,
    pub pincode: Option<String>,
}

/// Resuelve la ubicación: la del ciudadano si llega completa, o un punto
/// uniforme dentro de la caja de la ciudad.
pub fn resolve_location<R: Rng + ?Sized>(
    lat: Option<f64>,
    lng: Option<f64>,
    bounds: &BoundingBox,
    rng: &mut R,
) -> Result<GeoPoint, TriageError> {
    match (lat, lng) {
        (Some(lat), Some(lng)) => {
            let point = GeoPoint::new(lat, lng);
            if point.is_valid() {
                Ok(point)
            } else {
                Err(TriageError::InvalidLocation(format!(
                    "coordinates out of range ({lat}, {lng})"
                )))
            }
        }
        (None, None) => Ok(bounds.random_point(rng)),
        _ => Err(TriageError::InvalidLocation(
            "lat and lng must be supplied together".to_string(),
        )),
    }
}

pub fn prepare<R: Rng + ?Sized>(
    request: TriageRequest,
    bounds: &BoundingBox,
    rng: &mut R,
) -> Result<PreparedTriage, TriageError> {
    // Se valida sin espacios pero se guarda tal cual llegó.
    let description = request
        .description
        .filter(|d| !d.trim().is_empty())
        .ok_or(TriageError::EmptyDescription)?;
    let location = resolve_location(request.lat, request.lng, bounds, rng)?;
    let pincode = request
        .pincode
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty());

    Ok(PreparedTriage {
        description,
        location,
        pincode,
    })
}

/// Orquesta clasificación, extracción y persistencia.
#[derive(Clone)]
pub struct TriageService {
    pub store: Arc<dyn IssueStore>,
    pub completion: Arc<dyn TextCompletion>,
    pub city_bounds: BoundingBox,
    pub timeout: Duration,
}

impl TriageService {
    /// Valida, clasifica y guarda una queja.
    pub async fn triage(&self, request: TriageRequest) -> Result<IssueRecord, TriageError> {
        let prepared = prepare(request, &self.city_bounds, &mut rand::thread_rng())?;
        self.run(prepared).await
    }

    pub async fn run(&self, prepared: PreparedTriage) -> Result<IssueRecord, TriageError> {
        let completion =
            llm::classify(self.completion.as_ref(), &prepared.description, self.timeout)
                .await
                .map_err(|e| {
                    error!("Error de clasificación ({}): {}", e.kind(), e);
                    e
                })?;

        let triage = extract_triage(&prepared.description, &completion);
        let issue = NewIssue {
            triage,
            location: prepared.location,
            pincode: prepared.pincode,
        };

        let record = self.store.append(issue).await.map_err(|e| {
            error!("Error guardando la incidencia clasificada: {}", e);
            e
        })?;

        info!(
            "Incidencia {} triada: {} / {} / {}",
            record.id, record.department, record.category, record.urgency
        );
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ClassificationError, StoreError};
    use crate::llm::tests::FakeCompletion;
    use crate::store::MemoryIssueStore;
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const COMPLETION: &str =
        "Department: Electrical\nCategory: Lighting\nUrgency: High\nDraft: Please repair...";

    fn service(fake: Arc<FakeCompletion>, store: Arc<dyn IssueStore>) -> TriageService {
        TriageService {
            store,
            completion: fake,
            city_bounds: BoundingBox::default(),
            timeout: Duration::from_secs(5),
        }
    }

    fn request(description: &str) -> TriageRequest {
        TriageRequest {
            description: Some(description.to_string()),
            ..Default::default()
        }
    }

    struct FailingStore;

    #[async_trait]
    impl IssueStore for FailingStore {
        async fn append(&self, _issue: NewIssue) -> Result<IssueRecord, StoreError> {
            Err(StoreError::Malformed("disk full".to_string()))
        }

        async fn list_all(&self) -> Result<Vec<IssueRecord>, StoreError> {
            Ok(Vec::new())
        }

        fn backend_name(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn streetlight_example_is_classified_and_stored() {
        let fake = Arc::new(FakeCompletion::replying(COMPLETION));
        let store = Arc::new(MemoryIssueStore::new());
        let svc = service(fake.clone(), store.clone());

        let record = svc.triage(request("Streetlight broken on 5th Ave")).await.unwrap();
        assert_eq!(record.description, "Streetlight broken on 5th Ave");
        assert_eq!(record.department, "Electrical");
        assert_eq!(record.category, "Lighting");
        assert_eq!(record.urgency, "High");
        assert_eq!(record.draft, "Please repair...");
        assert!(BoundingBox::default().contains(&record.location()));

        let stored = store.list_all().await.unwrap();
        assert_eq!(stored, vec![record]);
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test]
    async fn empty_description_is_rejected_before_any_call() {
        let fake = Arc::new(FakeCompletion::replying(COMPLETION));
        let store = Arc::new(MemoryIssueStore::new());
        let svc = service(fake.clone(), store.clone());

        for req in [request("   "), TriageRequest::default()] {
            let err = svc.triage(req).await.unwrap_err();
            assert!(matches!(err, TriageError::EmptyDescription));
        }
        assert_eq!(fake.calls(), 0);
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upstream_failure_stores_nothing() {
        let fake = Arc::new(FakeCompletion::failing("502 Bad Gateway"));
        let store = Arc::new(MemoryIssueStore::new());
        let svc = service(fake, store.clone());

        let err = svc.triage(request("Water leakage")).await.unwrap_err();
        assert!(matches!(
            err,
            TriageError::Classification(ClassificationError::Upstream(_))
        ));
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn store_failure_after_classification_is_reported() {
        let fake = Arc::new(FakeCompletion::replying(COMPLETION));
        let svc = service(fake.clone(), Arc::new(FailingStore));

        let err = svc.triage(request("Water leakage")).await.unwrap_err();
        assert!(matches!(err, TriageError::Store(_)));
        assert_eq!(err.kind(), "store");
        assert_eq!(fake.calls(), 1);
    }

    #[tokio::test]
    async fn supplied_location_and_pincode_are_kept() {
        let fake = Arc::new(FakeCompletion::replying("Category: Water"));
        let store = Arc::new(MemoryIssueStore::new());
        let svc = service(fake, store);

        let req = TriageRequest {
            description: Some("Leak".to_string()),
            lat: Some(18.95),
            lng: Some(72.83),
            pincode: Some(" 400001 ".to_string()),
        };
        let record = svc.triage(req).await.unwrap();
        assert_eq!((record.lat, record.lng), (18.95, 72.83));
        assert_eq!(record.pincode.as_deref(), Some("400001"));
        assert_eq!(record.department, "Not identified");
        assert_eq!(record.urgency, "Medium");
        assert_eq!(record.draft, "Category: Water");
    }

    #[test]
    fn location_must_be_complete_and_valid() {
        let bounds = BoundingBox::default();
        let mut rng = StdRng::seed_from_u64(11);
        assert!(matches!(
            resolve_location(Some(19.1), None, &bounds, &mut rng),
            Err(TriageError::InvalidLocation(_))
        ));
        assert!(matches!(
            resolve_location(Some(120.0), Some(72.9), &bounds, &mut rng),
            Err(TriageError::InvalidLocation(_))
        ));
        let p = resolve_location(None, None, &bounds, &mut rng).unwrap();
        assert!(bounds.contains(&p));
    }

    #[test]
    fn prepare_keeps_description_verbatim() {
        let mut rng = StdRng::seed_from_u64(2);
        let prepared = prepare(request("  Pothole near school \n"), &BoundingBox::default(), &mut rng).unwrap();
        assert_eq!(prepared.description, "  Pothole near school \n");
        assert!(prepared.pincode.is_none());
    }

    #[tokio::test]
    async fn stored_description_matches_request() {
        let fake = Arc::new(FakeCompletion::replying(COMPLETION));
        let store = Arc::new(MemoryIssueStore::new());
        let svc = service(fake, store.clone());

        let record = svc.triage(request("\tGarbage not collected  ")).await.unwrap();
        assert_eq!(record.description, "\tGarbage not collected  ");
        assert_eq!(store.list_all().await.unwrap()[0].description, record.description);
    }
}
