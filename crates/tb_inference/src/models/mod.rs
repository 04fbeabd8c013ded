use std::str::FromStr;
use std::sync::Arc;

use tb_core::{EnrichmentModel, Error, Result};

use crate::InferenceConfig;

pub mod dummy;
pub mod openrouter;

pub use dummy::DummyModel;
pub use openrouter::OpenRouterModel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelKind {
    #[default]
    OpenRouter,
    Dummy,
}

impl FromStr for ModelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openrouter" | "openai" => Ok(ModelKind::OpenRouter),
            "dummy" | "offline" => Ok(ModelKind::Dummy),
            other => Err(Error::Config(format!("unknown model: {}", other))),
        }
    }
}

pub fn create_model(kind: ModelKind, config: &InferenceConfig) -> Result<Arc<dyn EnrichmentModel>> {
    match kind {
        ModelKind::OpenRouter => Ok(Arc::new(OpenRouterModel::new(
            config.api_key.clone(),
            config.base_url.clone(),
            config.model_name.clone(),
        )?)),
        ModelKind::Dummy => Ok(Arc::new(DummyModel::new())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_kind_from_str() {
        assert_eq!("OpenRouter".parse::<ModelKind>().unwrap(), ModelKind::OpenRouter);
        assert_eq!("dummy".parse::<ModelKind>().unwrap(), ModelKind::Dummy);
        assert!("gpt".parse::<ModelKind>().is_err());
    }

    #[test]
    fn test_create_model() {
        let config = InferenceConfig::default();
        assert!(create_model(ModelKind::OpenRouter, &config).is_err());
        assert_eq!(create_model(ModelKind::Dummy, &config).unwrap().name(), "Dummy");

        let config = InferenceConfig {
            api_key: Some("key".to_string()),
            ..Default::default()
        };
        assert_eq!(create_model(ModelKind::OpenRouter, &config).unwrap().name(), "OpenRouter");
    }
}
