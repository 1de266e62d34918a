//! Utilidades geoespaciales: caja de la ciudad, coordenadas sintéticas,
//! distancia haversine y pertenencia punto-en-polígono.

use anyhow::{anyhow, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Radio terrestre medio en km.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    /// Latitud en [-90, 90] y longitud en [-180, 180].
    pub fn is_valid(&self) -> bool {
        self.is_finite() && self.lat.abs() <= 90.0 && self.lng.abs() <= 180.0
    }
}

/// Región rectangular (lat/lng) usada para sintetizar coordenadas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lng_min: f64,
    pub lng_max: f64,
}

impl Default for BoundingBox {
    /// Mumbai, zona de despliegue de la demo.
    fn default() -> Self {
        Self {
            lat_min: 19.07,
            lat_max: 19.15,
            lng_min: 72.85,
            lng_max: 72.93,
        }
    }
}

impl BoundingBox {
    pub fn new(lat_min: f64, lat_max: f64, lng_min: f64, lng_max: f64) -> Result<Self> {
        let bbox = Self {
            lat_min,
            lat_max,
            lng_min,
            lng_max,
        };
        let corners = [
            GeoPoint::new(lat_min, lng_min),
            GeoPoint::new(lat_max, lng_max),
        ];
        if corners.iter().any(|p| !p.is_valid()) {
            return Err(anyhow!("Coordenadas fuera de rango en la caja: {bbox:?}"));
        }
        if lat_min > lat_max || lng_min > lng_max {
            return Err(anyhow!("Caja con mínimos mayores que máximos: {bbox:?}"));
        }
        Ok(bbox)
    }

    /// Parsea `lat_min,lat_max,lng_min,lng_max`.
    pub fn parse(raw: &str) -> Result<Self> {
        let parts = raw
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| anyhow!("Número inválido en '{raw}': {e}"))?;
        match parts.as_slice() {
            [lat_min, lat_max, lng_min, lng_max] => {
                Self::new(*lat_min, *lat_max, *lng_min, *lng_max)
            }
            _ => Err(anyhow!(
                "Se esperaban 4 valores (lat_min,lat_max,lng_min,lng_max), recibidos {}",
                parts.len()
            )),
        }
    }

    pub fn contains(&self, point: &GeoPoint) -> bool {
        point.lat >= self.lat_min
            && point.lat <= self.lat_max
            && point.lng >= self.lng_min
            && point.lng <= self.lng_max
    }

    /// Punto uniforme dentro de la caja.
    pub fn random_point<R: Rng + ?Sized>(&self, rng: &mut R) -> GeoPoint {
        GeoPoint {
            lat: sample(rng, self.lat_min, self.lat_max),
            lng: sample(rng, self.lng_min, self.lng_max),
        }
    }
}

fn sample<R: Rng + ?Sized>(rng: &mut R, min: f64, max: f64) -> f64 {
    if max > min {
        rng.gen_range(min..=max)
    } else {
        min
    }
}

/// Distancia de círculo máximo en km.
pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Ray casting sobre un anillo de vértices (lat, lng). El anillo se cierra
/// implícitamente entre el último y el primer vértice.
pub fn point_in_polygon(point: &GeoPoint, ring: &[GeoPoint]) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let (x, y) = (point.lat, point.lng);
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (xi, yi) = (ring[i].lat, ring[i].lng);
        let (xj, yj) = (ring[j].lat, ring[j].lng);
        let crosses = (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi;
        if crosses {
            inside = !inside;
        }
        j = i;
    }
    inside
}
