use async_trait::async_trait;
use mind_config::MindConfig;
use mind_core::{MindError, RawEvent, Result};
use mind_llm::{AnthropicProvider, LlmProvider, MockProvider};
use mind_runtime::{AgentRunner, MindService, ReasoningLoop, RunRequest};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Reasoning loop over the configured model provider.
pub(super) fn build_runner(config: &MindConfig) -> Result<Arc<dyn AgentRunner>> {
    let llm = &config.llm;
    let provider: Arc<dyn LlmProvider> = match llm.provider.as_str() {
        "anthropic" => {
            let api_key = llm.api_key.clone().ok_or_else(|| {
                MindError::Config(
                    "llm.api_key is not set. Add it to [llm] in mind.toml or export ANTHROPIC_API_KEY"
                        .into(),
                )
            })?;
            let mut provider = AnthropicProvider::new(api_key, llm.request_timeout_secs)?;
            if let Some(url) = &llm.base_url {
                provider = provider.with_base_url(url.clone());
            }
            Arc::new(provider)
        }
        "mock" => Arc::new(MockProvider::new("mock")),
        other => {
            return Err(MindError::Config(format!(
                "unknown llm.provider '{other}' (expected \"anthropic\" or \"mock\")"
            )));
        }
    };
    debug!(provider = provider.name(), model = %llm.model, "model provider ready");
    Ok(Arc::new(ReasoningLoop::new(
        provider,
        llm.model.clone(),
        llm.max_tokens,
        llm.temperature,
    )))
}

/// Runner for commands that only read or edit records.
struct Offline;

#[async_trait]
impl AgentRunner for Offline {
    async fn run(&self, _request: RunRequest, _events: mpsc::UnboundedSender<RawEvent>) -> Result<()> {
        Err(MindError::Config(
            "this command does not run tasks; use `mind delegate`".into(),
        ))
    }
}

/// Service for record commands. Works without model credentials.
pub(super) fn service(config: Arc<MindConfig>) -> Result<MindService> {
    MindService::open(config, Arc::new(Offline))
}

/// Service that can delegate. Fails early when the provider is misconfigured.
pub(super) fn delegating_service(config: Arc<MindConfig>) -> Result<MindService> {
    let runner = build_runner(&config)?;
    MindService::open(config, runner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_selection() {
        let mut config = MindConfig::default();
        config.llm.provider = "mock".into();
        assert!(build_runner(&config).is_ok());

        config.llm.provider = "anthropic".into();
        config.llm.api_key = None;
        assert!(matches!(build_runner(&config), Err(MindError::Config(_))));

        config.llm.api_key = Some("sk-test".into());
        assert!(build_runner(&config).is_ok());

        config.llm.provider = "carrier-pigeon".into();
        let err = build_runner(&config).err().unwrap();
        assert!(err.to_string().contains("carrier-pigeon"));
    }
}
