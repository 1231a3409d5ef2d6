//! Model router: per-purpose fallback chains with cooldowns.
//!
//! Each purpose resolves to an ordered chain: the purpose's override
//! descriptor (if configured) followed by the shared default chain, with
//! duplicate names removed. `invoke` walks the chain, skipping descriptors
//! that are cooling down, and advances past failures that
//! [`ProviderError::fallback_kind`] classifies as failover signals. Anything
//! else propagates immediately.
//!
//! The cooldown table is shared by every conversation using the router.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use wayfinder_config::ModelsConfig;
use wayfinder_core::error::{Error, ProviderError};
use wayfinder_core::event::{DomainEvent, EventBus};
use wayfinder_core::provider::{Provider, ProviderRequest, ProviderResponse, Purpose};

use crate::descriptor::ModelDescriptor;

/// Per-purpose model chain with automatic failover.
pub struct ModelRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_chain: Vec<ModelDescriptor>,
    overrides: HashMap<Purpose, ModelDescriptor>,
    reasoning_prefixes: Vec<String>,
    temperature: f32,
    timeout: Duration,
    state: Mutex<CooldownTable>,
    event_bus: Option<Arc<EventBus>>,
}

#[derive(Default)]
struct CooldownTable {
    /// Descriptor name → instant the cooldown ends
    cooling: HashMap<String, Instant>,
    /// Name of the descriptor that answered last
    current: Option<String>,
}

impl CooldownTable {
    fn is_available(&mut self, name: &str, now: Instant) -> bool {
        match self.cooling.get(name) {
            Some(until) if *until > now => false,
            Some(_) => {
                self.cooling.remove(name);
                true
            }
            None => true,
        }
    }
}

/// Availability of one descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct DescriptorStatus {
    pub name: String,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<Purpose>,
    pub available: bool,
    /// Seconds until the descriptor is retried, when cooling down
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_remaining_secs: Option<u64>,
}

/// Snapshot of the router's state.
#[derive(Debug, Clone, Serialize)]
pub struct RouterStatus {
    pub current_model: Option<String>,
    pub failed_models: Vec<String>,
    pub available_models: Vec<String>,
    pub total_models: usize,
    pub descriptors: Vec<DescriptorStatus>,
}

impl ModelRouter {
    /// Create a router over a shared default chain.
    pub fn new(default_chain: Vec<ModelDescriptor>) -> Self {
        Self {
            providers: HashMap::new(),
            default_chain,
            overrides: HashMap::new(),
            reasoning_prefixes: Vec::new(),
            temperature: 0.3,
            timeout: Duration::from_secs(120),
            state: Mutex::new(CooldownTable::default()),
            event_bus: None,
        }
    }

    /// Build the chains, temperature, timeout and reasoning prefixes from config.
    ///
    /// Backends still have to be registered with [`ModelRouter::register`].
    pub fn from_config(config: &ModelsConfig) -> Self {
        let (chain, overrides) = ModelDescriptor::chains_from_config(config);
        let mut router = Self::new(chain)
            .with_temperature(config.default_temperature)
            .with_timeout(Duration::from_secs(config.request_timeout_secs))
            .with_reasoning_prefixes(config.reasoning_prefixes.clone());
        for descriptor in overrides {
            router = router.with_override(descriptor);
        }
        router
    }

    /// Place `descriptor` ahead of the shared chain for its purpose.
    ///
    /// Descriptors without a purpose are ignored.
    pub fn with_override(mut self, descriptor: ModelDescriptor) -> Self {
        if let Some(purpose) = descriptor.purpose {
            self.overrides.insert(purpose, descriptor);
        }
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the per-descriptor request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Model name prefixes that must not receive a temperature.
    pub fn with_reasoning_prefixes(mut self, prefixes: Vec<String>) -> Self {
        self.reasoning_prefixes = prefixes;
        self
    }

    /// Publish [`DomainEvent::ModelFallback`] on this bus.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Register a backend under the key descriptors refer to.
    pub fn register(&mut self, backend: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(backend.into(), provider);
    }

    /// List all registered backend keys.
    pub fn backends(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }

    /// The ordered chain for `purpose`.
    pub fn chain(&self, purpose: Purpose) -> Vec<ModelDescriptor> {
        let mut chain: Vec<ModelDescriptor> = Vec::with_capacity(self.default_chain.len() + 1);
        let candidates = self.overrides.get(&purpose).into_iter().chain(self.default_chain.iter());
        for descriptor in candidates {
            if !chain.iter().any(|d| d.name == descriptor.name) {
                chain.push(descriptor.clone());
            }
        }
        chain
    }

    /// Whether `name` matches a reasoning-model prefix.
    pub fn is_reasoning_model(&self, name: &str) -> bool {
        self.reasoning_prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }

    fn lock(&self) -> MutexGuard<'_, CooldownTable> {
        // Poisoning only means another caller panicked mid-update; the table is still usable
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn mark_failed(&self, descriptor: &ModelDescriptor) {
        let until = Instant::now() + descriptor.cooldown;
        self.lock().cooling.insert(descriptor.name.clone(), until);
    }

    /// Send `request` to the first available model for `purpose`.
    ///
    /// The request's `model` is overwritten per descriptor. Temperature is
    /// the request's own value, else the router default, and is dropped for
    /// reasoning models.
    pub async fn invoke(
        &self,
        purpose: Purpose,
        request: ProviderRequest,
    ) -> wayfinder_core::Result<ProviderResponse> {
        let chain = self.chain(purpose);
        let mut attempts = 0usize;
        let mut last_error: Option<String> = None;

        for descriptor in &chain {
            if !self.lock().is_available(&descriptor.name, Instant::now()) {
                debug!(model = %descriptor.name, %purpose, "Router: skipping model in cooldown");
                continue;
            }

            let Some(provider) = self.providers.get(&descriptor.backend) else {
                warn!(
                    model = %descriptor.name,
                    backend = %descriptor.backend,
                    "Router: backend not registered, skipping"
                );
                last_error = Some(format!("backend '{}' is not registered", descriptor.backend));
                continue;
            };

            attempts += 1;
            info!(
                model = %descriptor.name,
                backend = %descriptor.backend,
                %purpose,
                attempt = attempts,
                total = chain.len(),
                "Router: trying model"
            );

            let mut req = request.clone();
            req.model = descriptor.name.clone();
            req.temperature = if self.is_reasoning_model(&descriptor.name) {
                None
            } else {
                request.temperature.or(Some(self.temperature))
            };

            let outcome = match tokio::time::timeout(self.timeout, provider.complete(req)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(format!(
                    "Model '{}' timed out after {}s",
                    descriptor.name,
                    self.timeout.as_secs()
                ))),
            };

            match outcome {
                Ok(response) => {
                    self.lock().current = Some(descriptor.name.clone());
                    return Ok(response);
                }
                Err(e) => match e.fallback_kind() {
                    Some(kind) => {
                        warn!(
                            model = %descriptor.name,
                            error = %e,
                            ?kind,
                            cooldown_secs = descriptor.cooldown.as_secs(),
                            "Router: model failed, trying next"
                        );
                        self.mark_failed(descriptor);
                        if let Some(bus) = &self.event_bus {
                            bus.publish(DomainEvent::ModelFallback {
                                purpose: purpose.to_string(),
                                from_model: descriptor.name.clone(),
                                reason: e.to_string(),
                                timestamp: chrono::Utc::now(),
                            });
                        }
                        last_error = Some(e.to_string());
                    }
                    None => {
                        warn!(model = %descriptor.name, error = %e, "Router: non-recoverable error");
                        return Err(Error::Provider(e));
                    }
                },
            }
        }

        Err(Error::ModelUnavailable {
            purpose: purpose.to_string(),
            attempts,
            last_error: last_error.unwrap_or_else(|| "every model is cooling down".into()),
        })
    }

    /// Availability of every descriptor across all chains.
    pub fn status(&self) -> RouterStatus {
        let now = Instant::now();
        let mut table = self.lock();

        let mut purposes: Vec<_> = self.overrides.values().collect();
        purposes.sort_by_key(|d| d.purpose.map(|p| p.as_str()));
        let mut all: Vec<&ModelDescriptor> = Vec::new();
        for d in purposes.into_iter().chain(self.default_chain.iter()) {
            if !all.iter().any(|seen| seen.name == d.name) {
                all.push(d);
            }
        }

        let descriptors: Vec<DescriptorStatus> = all
            .iter()
            .map(|d| {
                let available = table.is_available(&d.name, now);
                let remaining = table
                    .cooling
                    .get(&d.name)
                    .map(|until| until.saturating_duration_since(now).as_secs());
                DescriptorStatus {
                    name: d.name.clone(),
                    backend: d.backend.clone(),
                    purpose: d.purpose,
                    available,
                    cooldown_remaining_secs: remaining,
                }
            })
            .collect();

        RouterStatus {
            current_model: table.current.clone(),
            failed_models: descriptors.iter().filter(|d| !d.available).map(|d| d.name.clone()).collect(),
            available_models: descriptors.iter().filter(|d| d.available).map(|d| d.name.clone()).collect(),
            total_models: descriptors.len(),
            descriptors,
        }
    }

    /// Clear every cooldown and the current-model marker.
    pub fn reset(&self) {
        let mut table = self.lock();
        table.cooling.clear();
        table.current = None;
        info!("Router: failure state reset");
    }
}
