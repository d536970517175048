use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::error::TransformationError;
use super::traits::{Transformer, TransformerDeps, TransformerInitializer};

/// Runs a fixed, ordered list of transformers.
pub struct Watcher {
    deps: TransformerDeps,
    transformers: Vec<Arc<dyn Transformer>>,
}

impl Watcher {
    pub fn new(deps: TransformerDeps) -> Self {
        Self {
            deps,
            transformers: Vec::new(),
        }
    }

    /// Binds each initializer to the shared handles, in order.
    pub fn add_transformers(&mut self, initializers: Vec<TransformerInitializer>) {
        for initializer in initializers {
            self.transformers.push(initializer(&self.deps));
        }
    }

    pub fn transformer_names(&self) -> Vec<&str> {
        self.transformers.iter().map(|t| t.name()).collect()
    }

    /// Runs every transformer once in registration order. A failure does not
    /// stop the remaining transformers; the last failure is returned.
    pub async fn execute(&self) -> Result<(), TransformationError> {
        if self.transformers.is_empty() {
            return Err(TransformationError::NoTransformers);
        }

        let mut last_error = None;
        for transformer in &self.transformers {
            if let Err(e) = transformer.execute().await {
                tracing::error!("Transformer {} failed: {}", transformer.name(), e);
                last_error = Some(e);
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Calls [`Watcher::execute`] every `interval` until cancelled. Only
    /// [`TransformationError::NoTransformers`] ends the loop early.
    pub async fn run(
        &self,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Result<(), TransformationError> {
        tracing::info!(
            "Watching with transformers [{}] every {:?}",
            self.transformer_names().join(", "),
            interval
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    match self.execute().await {
                        Ok(()) => {}
                        Err(TransformationError::NoTransformers) => {
                            return Err(TransformationError::NoTransformers);
                        }
                        Err(e) => tracing::warn!("Watcher pass finished with errors: {}", e),
                    }
                }
            }
        }

        Ok(())
    }
}
