//! Carga y gestión de configuración de la aplicación (almacén + LLM + analítica).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::geo::BoundingBox;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    Groq,
    OpenAI,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "openai" => Ok(Self::OpenAI),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }

    /// Modelo de chat por defecto para cada proveedor.
    pub fn default_chat_model(&self) -> &'static str {
        match self {
            Self::Groq => "llama-3.1-8b-instant",
            Self::OpenAI => "gpt-4o-mini",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreBackend {
    Memory,
    Neo4j,
}

impl StoreBackend {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "neo4j" => Ok(Self::Neo4j),
            other => Err(anyhow!("Backend de almacenamiento no soportado: {other}")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Neo4j => "neo4j",
        }
    }
}

/// Credenciales de Neo4j; sólo obligatorias con `STORE_BACKEND=neo4j`.
#[derive(Clone, Debug)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
}

/// Constantes de la predicción semanal. Son ajuste de demo, no un modelo.
#[derive(Clone, Debug, PartialEq)]
pub struct PredictionConfig {
    pub trend_weight: f64,
    pub noise_bound: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            trend_weight: 0.3,
            noise_bound: 3.0,
        }
    }
}

impl PredictionConfig {
    /// Ambos valores deben ser finitos; la cota de ruido además no negativa.
    pub fn validate(&self) -> Result<()> {
        if !self.trend_weight.is_finite() {
            return Err(anyhow!(
                "PREDICTION_TREND_WEIGHT debe ser finito ({})",
                self.trend_weight
            ));
        }
        if !self.noise_bound.is_finite() || self.noise_bound < 0.0 {
            return Err(anyhow!(
                "PREDICTION_NOISE_BOUND debe ser finito y no negativo ({})",
                self.noise_bound
            ));
        }
        Ok(())
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub cors_origin: Option<String>,

    pub store_backend: StoreBackend,
    pub neo4j: Option<Neo4jConfig>,

    pub llm_provider: LlmProvider,
    pub llm_chat_model: String,
    pub llm_temperature: f64,
    pub llm_timeout: Duration,

    pub use_demo_fallback: bool,
    pub prediction: PredictionConfig,
    pub city_bounds: BoundingBox,
    pub wards_file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:3001".to_string(),
            cors_origin: None,
            store_backend: StoreBackend::Memory,
            neo4j: None,
            llm_provider: LlmProvider::Groq,
            llm_chat_model: LlmProvider::Groq.default_chat_model().to_string(),
            llm_temperature: 0.2,
            llm_timeout: Duration::from_secs(30),
            use_demo_fallback: false,
            prediction: PredictionConfig::default(),
            city_bounds: BoundingBox::default(),
            wards_file: None,
        }
    }
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        let server_addr =
            env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:3001".to_string());
        let cors_origin = env::var("CORS_ORIGIN").ok().filter(|s| !s.trim().is_empty());

        let store_backend_str = env::var("STORE_BACKEND").unwrap_or_else(|_| "memory".to_string());
        let store_backend = StoreBackend::from_str(&store_backend_str)?;

        let neo4j = if store_backend == StoreBackend::Neo4j {
            Some(Neo4jConfig {
                uri: env::var("NEO4J_URI")
                    .map_err(|_| anyhow!("Falta NEO4J_URI en el entorno"))?,
                user: env::var("NEO4J_USER")
                    .map_err(|_| anyhow!("Falta NEO4J_USER en el entorno"))?,
                password: env::var("NEO4J_PASSWORD")
                    .map_err(|_| anyhow!("Falta NEO4J_PASSWORD en el entorno"))?,
            })
        } else {
            None
        };

        let llm_provider_str = env::var("LLM_PROVIDER").unwrap_or_else(|_| "groq".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;
        let llm_chat_model = env::var("LLM_CHAT_MODEL")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| llm_provider.default_chat_model().to_string());
        let llm_temperature = parse_var("LLM_TEMPERATURE", 0.2_f64)?;
        let llm_timeout = Duration::from_secs(parse_var("LLM_TIMEOUT_SECS", 30_u64)?);

        let use_demo_fallback = parse_bool_var("USE_DEMO_FALLBACK", false)?;
        let prediction = PredictionConfig {
            trend_weight: parse_var("PREDICTION_TREND_WEIGHT", 0.3_f64)?,
            noise_bound: parse_var("PREDICTION_NOISE_BOUND", 3.0_f64)?,
        };
        prediction.validate()?;

        let city_bounds = match env::var("CITY_BOUNDS") {
            Ok(raw) => BoundingBox::parse(&raw).context("CITY_BOUNDS inválido")?,
            Err(_) => BoundingBox::default(),
        };
        let wards_file = env::var("WARDS_FILE").ok().map(PathBuf::from);

        Ok(Self {
            server_addr,
            cors_origin,
            store_backend,
            neo4j,
            llm_provider,
            llm_chat_model,
            llm_temperature,
            llm_timeout,
            use_demo_fallback,
            prediction,
            city_bounds,
            wards_file,
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("Valor inválido para {name} ('{raw}'): {e}")),
        Err(_) => Ok(default),
    }
}

fn parse_bool_var(name: &str, default: bool) -> Result<bool> {
    match env::var(name) {
        Ok(raw) => parse_bool(&raw).ok_or_else(|| anyhow!("Valor inválido para {name}: '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
