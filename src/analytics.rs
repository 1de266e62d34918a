//! Motor de agregación del panel.
//!
//! Reduce la colección completa de incidencias a: total, conteos por
//! categoría / departamento / pincode, histograma semanal ponderado por
//! urgencia y una predicción ingenua de la semana siguiente.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::config::PredictionConfig;
use crate::models::{sla_hours, IssueRecord, URGENCY_HIGH, URGENCY_LOW, URGENCY_MEDIUM};

pub const HISTOGRAM_DAYS: usize = 7;
pub const TOP_PINCODES: usize = 5;
pub const UNKNOWN_PINCODE: &str = "Unknown";

/// Forma de onda de demo para un histograma sin datos.
pub const DEMO_WAVEFORM: [u32; HISTOGRAM_DAYS] = [3, 4, 6, 8, 6, 9, 10];

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Conteo por etiqueta que conserva el orden de primera aparición.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tally {
    entries: Vec<(String, usize)>,
    index: HashMap<String, usize>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_labels<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut tally = Self::new();
        for label in labels {
            tally.add(label);
        }
        tally
    }

    pub fn add(&mut self, label: &str) {
        match self.index.get(label) {
            Some(&pos) => self.entries[pos].1 += 1,
            None => {
                self.index.insert(label.to_string(), self.entries.len());
                self.entries.push((label.to_string(), 1));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Pares (etiqueta, conteo) en orden de primera aparición.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries.iter().map(|(label, n)| (label.as_str(), *n))
    }

    /// Conteo descendente; empates por etiqueta lexicográfica.
    pub fn ranked(&self) -> Vec<(&str, usize)> {
        let mut ranked: Vec<_> = self.iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }

    pub fn top(&self, n: usize) -> Vec<(&str, usize)> {
        let mut ranked = self.ranked();
        ranked.truncate(n);
        ranked
    }

    pub fn most_frequent(&self) -> Option<&str> {
        self.ranked().first().map(|(label, _)| *label)
    }
}

#[cfg(test)]
impl Tally {
    pub fn get(&self, label: &str) -> usize {
        self.index
            .get(label)
            .map(|&pos| self.entries[pos].1)
            .unwrap_or(0)
    }

    /// Suma de todos los conteos.
    pub fn total(&self) -> usize {
        self.entries.iter().map(|(_, n)| n).sum()
    }
}

impl Serialize for Tally {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (label, n) in &self.entries {
            map.serialize_entry(label, n)?;
        }
        map.end()
    }
}

pub fn category_count(issues: &[IssueRecord]) -> Tally {
    Tally::from_labels(issues.iter().map(|i| i.category.as_str()))
}

pub fn department_count(issues: &[IssueRecord]) -> Tally {
    Tally::from_labels(issues.iter().map(|i| i.department.as_str()))
}

pub fn pincode_count(issues: &[IssueRecord]) -> Tally {
    Tally::from_labels(
        issues
            .iter()
            .map(|i| i.pincode.as_deref().unwrap_or(UNKNOWN_PINCODE)),
    )
}

/// Peso de una incidencia en el histograma semanal.
pub fn histogram_weight(urgency: &str) -> u32 {
    if urgency == URGENCY_HIGH {
        2
    } else {
        1
    }
}

/// Cubo del histograma: 6 = hoy, 0 = hace seis días o más. Las fechas
/// futuras caen en el cubo de hoy.
pub fn histogram_bucket(created_at: DateTime<Utc>, now: DateTime<Utc>) -> usize {
    let age_ms = (now - created_at).num_milliseconds().max(0);
    let age_days = (age_ms / MILLIS_PER_DAY).min(HISTOGRAM_DAYS as i64 - 1) as usize;
    HISTOGRAM_DAYS - 1 - age_days
}

/// Histograma real, sin sustitución de datos de demo.
pub fn raw_weekly_histogram(issues: &[IssueRecord], now: DateTime<Utc>) -> [u32; HISTOGRAM_DAYS] {
    let mut buckets = [0u32; HISTOGRAM_DAYS];
    for issue in issues {
        buckets[histogram_bucket(issue.created_at, now)] += histogram_weight(&issue.urgency);
    }
    buckets
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyHistogram {
    pub buckets: [u32; HISTOGRAM_DAYS],
    /// `true` si los cubos son la forma de onda de demo y no datos reales.
    pub synthetic: bool,
}

/// Histograma semanal. Sólo con `use_demo_fallback` un histograma a cero se
/// sustituye por [`DEMO_WAVEFORM`], y queda marcado como sintético.
pub fn weekly_histogram(
    issues: &[IssueRecord],
    now: DateTime<Utc>,
    use_demo_fallback: bool,
) -> WeeklyHistogram {
    let buckets = raw_weekly_histogram(issues, now);
    if use_demo_fallback && buckets.iter().all(|&b| b == 0) {
        WeeklyHistogram {
            buckets: DEMO_WAVEFORM,
            synthetic: true,
        }
    } else {
        WeeklyHistogram {
            buckets,
            synthetic: false,
        }
    }
}

/// `max(0, round(round(media) + peso·(último − primero) + ruido))`, con ruido
/// uniforme en `[0, noise_bound)`. No es determinista salvo que se inyecte el RNG.
pub fn predict_next_week<R: Rng + ?Sized>(
    buckets: &[u32],
    cfg: &PredictionConfig,
    rng: &mut R,
) -> u32 {
    let (Some(&first), Some(&last)) = (buckets.first(), buckets.last()) else {
        return 0;
    };
    let sum: u32 = buckets.iter().sum();
    let avg = (f64::from(sum) / buckets.len() as f64).round();
    let trend = f64::from(last) - f64::from(first);
    let noise = if cfg.noise_bound.is_finite() && cfg.noise_bound > 0.0 {
        rng.gen_range(0.0..cfg.noise_bound)
    } else {
        0.0
    };
    let weight = if cfg.trend_weight.is_finite() {
        cfg.trend_weight
    } else {
        0.0
    };
    let predicted = (avg + trend * weight + noise).round();
    if predicted.is_finite() && predicted > 0.0 {
        predicted as u32
    } else {
        0
    }
}

/// Filtros del listado del panel. `All` o ausente = sin restricción.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueFilter {
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub urgency: Option<String>,
    #[serde(default)]
    pub only_hotspots: bool,
}

fn active(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "All")
}

impl IssueFilter {
    pub fn matches(&self, issue: &IssueRecord) -> bool {
        if let Some(needle) = active(&self.search) {
            let haystack = format!(
                "{} {} {} {}",
                issue.description,
                issue.category,
                issue.department,
                issue.pincode.as_deref().unwrap_or("")
            )
            .to_lowercase();
            if !haystack.contains(&needle.to_lowercase()) {
                return false;
            }
        }
        if active(&self.department).is_some_and(|d| issue.department != d) {
            return false;
        }
        if active(&self.category).is_some_and(|c| issue.category != c) {
            return false;
        }
        if active(&self.urgency).is_some_and(|u| issue.urgency != u) {
            return false;
        }
        !self.only_hotspots || issue.is_high_urgency()
    }

    pub fn apply<'a>(&self, issues: &'a [IssueRecord]) -> Vec<&'a IssueRecord> {
        issues.iter().filter(|i| self.matches(i)).collect()
    }
}

/// Opciones de una agregación concreta.
#[derive(Debug, Clone, Default)]
pub struct AnalyticsOptions {
    pub use_demo_fallback: bool,
    pub prediction: PredictionConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PincodeCount {
    pub pincode: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total: usize,
    pub critical_count: usize,
    pub category_count: Tally,
    pub dept_count: Tally,
    pub top_category: Option<String>,
    pub top_department: Option<String>,
    pub top_pincode: Option<String>,
    pub pincode_top: Vec<PincodeCount>,
    pub weekly_histogram: WeeklyHistogram,
    pub predicted_next_week: u32,
    pub sla_hours: HashMap<&'static str, u32>,
}

impl DashboardSummary {
    /// Agrega la colección completa. Lectura pura, sin estado entre llamadas.
    pub fn build<R: Rng + ?Sized>(
        issues: &[IssueRecord],
        now: DateTime<Utc>,
        options: &AnalyticsOptions,
        rng: &mut R,
    ) -> Self {
        let category_count = category_count(issues);
        let dept_count = department_count(issues);
        let pincodes = pincode_count(issues);
        let weekly_histogram = weekly_histogram(issues, now, options.use_demo_fallback);
        let predicted_next_week =
            predict_next_week(&weekly_histogram.buckets, &options.prediction, rng);

        let sla_hours = [URGENCY_HIGH, URGENCY_MEDIUM, URGENCY_LOW]
            .into_iter()
            .map(|u| (u, sla_hours(u)))
            .collect();

        Self {
            total: issues.len(),
            critical_count: issues.iter().filter(|i| i.is_high_urgency()).count(),
            top_category: category_count.most_frequent().map(str::to_string),
            top_department: dept_count.most_frequent().map(str::to_string),
            top_pincode: pincodes.most_frequent().map(str::to_string),
            pincode_top: pincodes
                .top(TOP_PINCODES)
                .into_iter()
                .map(|(pincode, count)| PincodeCount {
                    pincode: pincode.to_string(),
                    count,
                })
                .collect(),
            category_count,
            dept_count,
            weekly_histogram,
            predicted_next_week,
            sla_hours,
        }
    }
}
