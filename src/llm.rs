//! Adaptador de clasificación sobre Rig: construye el prompt fijo de triaje,
//! llama una sola vez al proveedor y devuelve el texto crudo.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::{AppConfig, LlmProvider};
use crate::error::ClassificationError;

pub const SYSTEM_PROMPT: &str =
    "You classify Indian civic issues and generate official complaint drafts for government departments.";

/// Prompt de usuario con el formato de salida estricto de cuatro líneas.
pub fn build_triage_prompt(description: &str) -> String {
    format!(
        r#"
You are an AI civic governance assistant.
Given a citizen's issue, return output in EXACT this format:

Department: <department name>
Category: <issue category>
Urgency: <Low/Medium/High>
Draft: <formal government complaint draft>

Problem: "{description}"
"#
    )
}

/// Capacidad externa de completado de texto (instrucción de sistema + prompt).
#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ClassificationError>;
}

/// Gestor de LLMs de chat.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    pub chat_model: String,
    pub temperature: f64,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            provider: cfg.llm_provider.clone(),
            chat_model: cfg.llm_chat_model.clone(),
            temperature: cfg.llm_temperature,
        }
    }

    fn model_name(&self) -> &str {
        if self.chat_model.is_empty() {
            self.provider.default_chat_model()
        } else {
            self.chat_model.as_str()
        }
    }

    async fn complete_with_groq(&self, system: &str, prompt: &str) -> Result<String, String> {
        use rig::client::{CompletionClient as _, ProviderClient as _};
        use rig::completion::Prompt;
        use rig::providers::groq;

        let client = groq::Client::from_env();
        let agent = client
            .agent(self.model_name())
            .preamble(system)
            .temperature(self.temperature)
            .build();

        agent.prompt(prompt).await.map_err(|e| e.to_string())
    }

    async fn complete_with_openai(&self, system: &str, prompt: &str) -> Result<String, String> {
        use rig::client::{CompletionClient as _, ProviderClient as _};
        use rig::completion::Prompt;
        use rig::providers::openai;

        let client = openai::Client::from_env();
        let agent = client
            .agent(self.model_name())
            .preamble(system)
            .temperature(self.temperature)
            .build();

        agent.prompt(prompt).await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl TextCompletion for LlmManager {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ClassificationError> {
        let result = match self.provider {
            LlmProvider::Groq => self.complete_with_groq(system, prompt).await,
            LlmProvider::OpenAI => self.complete_with_openai(system, prompt).await,
        };
        result.map_err(ClassificationError::from_provider_message)
    }
}

/// Clasifica una descripción: una única llamada, sin reintentos, acotada por
/// `timeout`. Devuelve el texto crudo del modelo.
pub async fn classify(
    completion: &dyn TextCompletion,
    description: &str,
    timeout: Duration,
) -> Result<String, ClassificationError> {
    let prompt = build_triage_prompt(description);
    let started = Instant::now();

    let text = match tokio::time::timeout(timeout, completion.complete(SYSTEM_PROMPT, &prompt)).await
    {
        Ok(result) => result?,
        Err(_) => {
            warn!("La clasificación superó el límite de {:?}", timeout);
            return Err(ClassificationError::Timeout(timeout));
        }
    };

    debug!(
        "Respuesta del LLM recibida en {} ms ({} caracteres)",
        started.elapsed().as_millis(),
        text.len()
    );

    if text.trim().is_empty() {
        return Err(ClassificationError::EmptyCompletion);
    }
    Ok(text)
}
