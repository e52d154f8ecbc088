use crate::config::AppConfig;
use crate::vision::{GeminiVision, VisionClient};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub vision: Arc<dyn VisionClient>,
}

impl AppState {
    pub fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let vision = Arc::new(GeminiVision::new(&config.vision)?) as Arc<dyn VisionClient>;
        if !vision.is_configured() {
            tracing::warn!("GEMINI_API_KEY is not set; meal analysis requests will fail");
        }

        Ok(Self::from_parts(config, vision))
    }

    pub fn from_parts(config: Arc<AppConfig>, vision: Arc<dyn VisionClient>) -> Self {
        Self { config, vision }
    }

    #[cfg(test)]
    pub fn fake(vision: Arc<dyn VisionClient>) -> Self {
        use crate::config::{VisionConfig, DEFAULT_VISION_BASE_URL, DEFAULT_VISION_MODEL};

        let config = Arc::new(AppConfig {
            host: "127.0.0.1".into(),
            port: 0,
            cors_origins: vec!["*".into()],
            vision: VisionConfig {
                api_key: Some("test".into()),
                model: DEFAULT_VISION_MODEL.into(),
                base_url: DEFAULT_VISION_BASE_URL.into(),
                timeout_secs: 5,
            },
        });
        Self::from_parts(config, vision)
    }
}

#[cfg(test)]
pub(crate) use fake::FakeVision;
