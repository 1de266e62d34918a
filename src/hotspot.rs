//! Resumen geoespacial de focos: muestras de calor ponderadas por urgencia,
//! estadísticas por distrito (ward) y causa probable por proximidad.
//!
//! La capa se construye como valor en cada petición; no hay estado global
//! de capas. Los puntos de demo sólo se añaden con `use_demo_fallback` y van
//! marcados como sintéticos.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::analytics::Tally;
use crate::geo::{haversine_km, point_in_polygon, BoundingBox, GeoPoint};
use crate::models::{IssueRecord, URGENCY_HIGH, URGENCY_LOW, URGENCY_MEDIUM};

/// Radio del cluster para la causa probable (~350 m).
pub const ROOT_CAUSE_RADIUS_KM: f64 = 0.35;

/// Fracción mínima de puntos dentro de la región conocida para no inyectar demo.
pub const MIN_IN_REGION_RATIO: f64 = 0.4;

pub const DEMO_POINTS_WHEN_EMPTY: usize = 40;
pub const DEMO_POINTS_WHEN_SPARSE: usize = 25;

/// Región "conocida" (Mumbai ampliado) para decidir si hay datos útiles.
pub fn known_region() -> BoundingBox {
    BoundingBox {
        lat_min: 18.90,
        lat_max: 19.30,
        lng_min: 72.75,
        lng_max: 73.10,
    }
}

/// Intensidad de calor por urgencia.
pub fn urgency_weight(urgency: &str) -> u32 {
    match urgency {
        URGENCY_HIGH => 4,
        URGENCY_MEDIUM => 2,
        _ => 1,
    }
}

/// Punto del mapa. `synthetic` distingue los puntos de demo de los reales.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MapPoint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub urgency: String,
    pub category: String,
    pub description: String,
    pub synthetic: bool,
}

impl MapPoint {
    pub fn location(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

impl From<&IssueRecord> for MapPoint {
    fn from(issue: &IssueRecord) -> Self {
        Self {
            id: Some(issue.id.clone()),
            lat: issue.lat,
            lng: issue.lng,
            urgency: issue.urgency.clone(),
            category: issue.category.clone(),
            description: issue.description.clone(),
            synthetic: false,
        }
    }
}

/// Muestra para la capa de calor, serializada como `[lat, lng, peso]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HeatSample(pub f64, pub f64, pub u32);

impl From<&MapPoint> for HeatSample {
    fn from(p: &MapPoint) -> Self {
        HeatSample(p.lat, p.lng, urgency_weight(&p.urgency))
    }
}

/// Polígono de distrito; configuración estática, nunca se persiste por incidencia.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WardPolygon {
    pub name: String,
    pub ring: Vec<GeoPoint>,
    pub risk: f64,
}

impl WardPolygon {
    pub fn contains(&self, point: &GeoPoint) -> bool {
        point_in_polygon(point, &self.ring)
    }

    fn validate(&self) -> Result<()> {
        if self.ring.len() < 3 {
            return Err(anyhow!("El ward '{}' necesita al menos 3 vértices", self.name));
        }
        if !(0.0..=1.0).contains(&self.risk) {
            return Err(anyhow!("El riesgo del ward '{}' debe estar en [0, 1]", self.name));
        }
        if self.ring.iter().any(|p| !p.is_valid()) {
            return Err(anyhow!("El ward '{}' tiene vértices inválidos", self.name));
        }
        Ok(())
    }
}

fn ring(vertices: &[(f64, f64)]) -> Vec<GeoPoint> {
    vertices.iter().map(|&(lat, lng)| GeoPoint::new(lat, lng)).collect()
}

/// Distritos de la demo.
pub fn default_wards() -> Vec<WardPolygon> {
    vec![
        WardPolygon {
            name: "Ward A".to_string(),
            ring: ring(&[(19.08, 72.87), (19.095, 72.895), (19.07, 72.905), (19.055, 72.885)]),
            risk: 0.6,
        },
        WardPolygon {
            name: "Ward B".to_string(),
            ring: ring(&[(19.04, 72.86), (19.06, 72.88), (19.05, 72.9), (19.03, 72.89)]),
            risk: 0.3,
        },
    ]
}

/// Carga los distritos desde un fichero JSON (lista de `WardPolygon`).
pub fn load_wards(path: &Path) -> Result<Vec<WardPolygon>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("No se pudo leer {}", path.display()))?;
    let wards: Vec<WardPolygon> = serde_json::from_str(&raw)
        .with_context(|| format!("JSON de wards inválido en {}", path.display()))?;
    for ward in &wards {
        ward.validate()?;
    }
    info!("{} wards cargados desde {}", wards.len(), path.display());
    Ok(wards)
}

/// Primer distrito (en orden de configuración) que contiene el punto.
pub fn locate_ward<'a>(point: &GeoPoint, wards: &'a [WardPolygon]) -> Option<&'a WardPolygon> {
    wards.iter().find(|w| w.contains(point))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WardStat {
    pub name: String,
    pub count: usize,
    pub risk: f64,
}

/// Conteo por distrito. Cada distrito cuenta sus puntos de forma independiente,
/// así que un punto en dos anillos solapados suma en ambos.
pub fn ward_stats(points: &[MapPoint], wards: &[WardPolygon]) -> Vec<WardStat> {
    wards
        .iter()
        .map(|w| WardStat {
            name: w.name.clone(),
            count: points.iter().filter(|p| w.contains(&p.location())).count(),
            risk: w.risk,
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RootCause {
    pub category: String,
    pub cluster_size: usize,
}

impl RootCause {
    pub fn describe(cause: Option<&RootCause>) -> String {
        match cause {
            Some(c) => format!("Likely cause: {} issues (cluster size {})", c.category, c.cluster_size),
            None => "No pattern detected".to_string(),
        }
    }
}

/// Categoría mayoritaria entre los puntos a menos de `radius_km` del objetivo.
/// Empates por nombre de categoría.
pub fn root_cause(points: &[MapPoint], target: &GeoPoint, radius_km: f64) -> Option<RootCause> {
    let cluster: Vec<&MapPoint> = points
        .iter()
        .filter(|p| haversine_km(&p.location(), target) < radius_km)
        .collect();
    let tally = Tally::from_labels(cluster.iter().map(|p| p.category.as_str()));
    tally.most_frequent().map(|category| RootCause {
        category: category.to_string(),
        cluster_size: cluster.len(),
    })
}

const DEMO_DESCRIPTIONS: [&str; 4] = [
    "Garbage not collected",
    "Water leakage",
    "Pothole cluster",
    "Streetlight outage",
];
const DEMO_CATEGORIES: [&str; 4] = ["Garbage", "Water", "Road", "Electricity"];
const DEMO_URGENCIES: [&str; 3] = [URGENCY_LOW, URGENCY_MEDIUM, URGENCY_HIGH];

/// Puntos sintéticos alrededor del centro de la ciudad (19.07, 72.87).
pub fn demo_points<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<MapPoint> {
    let pick = |rng: &mut R, options: &[&str]| -> String {
        options.choose(rng).copied().unwrap_or_default().to_string()
    };
    (0..n)
        .map(|_| MapPoint {
            id: None,
            lat: 19.07 + (rng.gen::<f64>() - 0.5) * 0.12,
            lng: 72.87 + (rng.gen::<f64>() - 0.5) * 0.12,
            urgency: pick(&mut *rng, &DEMO_URGENCIES),
            description: pick(&mut *rng, &DEMO_DESCRIPTIONS),
            category: pick(&mut *rng, &DEMO_CATEGORIES),
            synthetic: true,
        })
        .collect()
}

/// Puntos válidos para el mapa. Con `use_demo_fallback`, si no hay puntos o
/// menos del 40 % cae en la región conocida, se concatenan puntos de demo.
/// Devuelve también cuántos puntos sintéticos se añadieron.
pub fn map_points<R: Rng + ?Sized>(
    issues: &[IssueRecord],
    use_demo_fallback: bool,
    rng: &mut R,
) -> (Vec<MapPoint>, usize) {
    let mut points: Vec<MapPoint> = issues
        .iter()
        .filter(|i| i.location().is_finite())
        .map(MapPoint::from)
        .collect();

    if !use_demo_fallback {
        return (points, 0);
    }

    let region = known_region();
    let in_region = points.iter().filter(|p| region.contains(&p.location())).count();
    let extra = if points.is_empty() {
        DEMO_POINTS_WHEN_EMPTY
    } else if (in_region as f64) / (points.len() as f64) < MIN_IN_REGION_RATIO {
        DEMO_POINTS_WHEN_SPARSE
    } else {
        0
    };
    points.extend(demo_points(extra, rng));
    (points, extra)
}

/// Capa del mapa de calor para una vista concreta.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HotspotLayer {
    pub heat: Vec<HeatSample>,
    /// Marcadores pulsantes: incidencias de urgencia alta.
    pub pulses: Vec<MapPoint>,
    pub wards: Vec<WardStat>,
    pub shown: usize,
    pub demo_points_added: usize,
}

impl HotspotLayer {
    /// `urgency` filtra las muestras (`None`/`all` = todas). Las estadísticas
    /// por distrito usan todos los puntos, sin filtrar.
    pub fn build<R: Rng + ?Sized>(
        issues: &[IssueRecord],
        wards: &[WardPolygon],
        urgency: Option<&str>,
        use_demo_fallback: bool,
        rng: &mut R,
    ) -> Self {
        let (points, demo_points_added) = map_points(issues, use_demo_fallback, rng);
        let wards = ward_stats(&points, wards);

        let urgency = urgency
            .map(str::trim)
            .filter(|u| !u.is_empty() && !u.eq_ignore_ascii_case("all"));
        let filtered: Vec<MapPoint> = points
            .into_iter()
            .filter(|p| urgency.map_or(true, |u| p.urgency == u))
            .collect();

        Self {
            heat: filtered.iter().map(HeatSample::from).collect(),
            pulses: filtered
                .iter()
                .filter(|p| p.urgency == URGENCY_HIGH)
                .cloned()
                .collect(),
            shown: filtered.len(),
            wards,
            demo_points_added,
        }
    }
}
