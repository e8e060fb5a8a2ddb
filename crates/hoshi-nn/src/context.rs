//! Process-scoped compute context binding the two engines.

use crate::error::{Error, Result};
use hoshi_core::{BoardExtent, ComputeEngine, ContextConfig, EngineKind};
use std::sync::Arc;

/// Shared, read-only binding of a [`ContextConfig`] to the available engines.
///
/// Cloning is cheap. Every [`ComputeHandle`](crate::ComputeHandle) keeps a
/// clone, so engine contexts are torn down only after the last handle drops.
#[derive(Clone)]
pub struct ComputeContext {
    inner: Arc<ContextInner>,
}

struct ContextInner {
    config: ContextConfig,
    accelerated: Option<Arc<dyn ComputeEngine>>,
    secondary: Option<Arc<dyn ComputeEngine>>,
}

impl ComputeContext {
    pub fn builder() -> ComputeContextBuilder {
        ComputeContextBuilder::default()
    }

    pub fn config(&self) -> &ContextConfig {
        &self.inner.config
    }

    /// Board extent requested by callers of this context.
    pub fn extent(&self) -> BoardExtent {
        self.inner.config.extent
    }

    pub fn has_engine(&self, kind: EngineKind) -> bool {
        self.engine_slot(kind).is_some()
    }

    pub fn engine(&self, kind: EngineKind) -> Result<&Arc<dyn ComputeEngine>> {
        self.engine_slot(kind).ok_or(Error::EngineMissing(kind))
    }

    fn engine_slot(&self, kind: EngineKind) -> Option<&Arc<dyn ComputeEngine>> {
        match kind {
            EngineKind::Accelerated => self.inner.accelerated.as_ref(),
            EngineKind::Secondary => self.inner.secondary.as_ref(),
        }
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        for engine in self.accelerated.iter().chain(self.secondary.iter()) {
            engine.destroy_context();
        }
        tracing::debug!("Compute context for {} destroyed", self.config.extent);
    }
}

#[derive(Default)]
pub struct ComputeContextBuilder {
    config: ContextConfig,
    accelerated: Option<Arc<dyn ComputeEngine>>,
    secondary: Option<Arc<dyn ComputeEngine>>,
}

impl ComputeContextBuilder {
    pub fn config(mut self, config: ContextConfig) -> Self {
        self.config = config;
        self
    }

    pub fn extent(mut self, extent: BoardExtent) -> Self {
        self.config.extent = extent;
        self
    }

    pub fn accelerated(mut self, engine: Arc<dyn ComputeEngine>) -> Self {
        self.accelerated = Some(engine);
        self
    }

    pub fn secondary(mut self, engine: Arc<dyn ComputeEngine>) -> Self {
        self.secondary = Some(engine);
        self
    }

    /// Creates the engine contexts. A failing engine fails the whole build.
    pub fn build(self) -> Result<ComputeContext> {
        self.config.validate()?;
        if self.accelerated.is_none() && self.secondary.is_none() {
            return Err(Error::InvalidConfig(
                "No compute engine configured. Use .accelerated() or .secondary() to set one."
                    .to_string(),
            ));
        }
        for (expected, engine) in [
            (EngineKind::Accelerated, &self.accelerated),
            (EngineKind::Secondary, &self.secondary),
        ] {
            if let Some(engine) = engine {
                let caps = engine.capabilities();
                if caps.kind != expected {
                    return Err(Error::InvalidConfig(format!(
                        "{} engine registered as {}",
                        caps.name, expected
                    )));
                }
            }
        }

        let mut created: Vec<&Arc<dyn ComputeEngine>> = Vec::with_capacity(2);
        for engine in self.accelerated.iter().chain(self.secondary.iter()) {
            if let Err(e) = engine.create_context(&self.config) {
                for done in created {
                    done.destroy_context();
                }
                return Err(e.into());
            }
            created.push(engine);
        }

        tracing::debug!(
            "Compute context created: extent={} fp16={:?} nhwc={:?} devices={:?}",
            self.config.extent,
            self.config.fp16_mode,
            self.config.nhwc_mode,
            self.config.device_indices
        );

        Ok(ComputeContext {
            inner: Arc::new(ContextInner {
                config: self.config,
                accelerated: self.accelerated,
                secondary: self.secondary,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoshi_core::{EngineError, HostEngine};

    fn host(kind: EngineKind) -> Arc<dyn ComputeEngine> {
        Arc::new(HostEngine::from_fn(kind, |_, _, _| Ok(())))
    }

    #[test]
    fn test_build_requires_engine() {
        assert!(matches!(
            ComputeContext::builder().build(),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_engine_lookup() {
        let ctx = ComputeContext::builder()
            .extent(BoardExtent::square(9))
            .accelerated(host(EngineKind::Accelerated))
            .build()
            .unwrap();
        assert_eq!(ctx.extent(), BoardExtent::square(9));
        assert!(ctx.engine(EngineKind::Accelerated).is_ok());
        assert!(matches!(
            ctx.engine(EngineKind::Secondary),
            Err(Error::EngineMissing(EngineKind::Secondary))
        ));
    }

    #[test]
    fn test_rejects_wrong_kind() {
        let result = ComputeContext::builder()
            .accelerated(host(EngineKind::Secondary))
            .build();
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_context_lifecycle() {
        let engine = Arc::new(HostEngine::from_fn(EngineKind::Secondary, |_, _, _| Ok(())));
        let ctx = ComputeContext::builder()
            .secondary(engine.clone())
            .build()
            .unwrap();
        assert!(engine.has_context());
        let clone = ctx.clone();
        drop(ctx);
        assert!(engine.has_context());
        drop(clone);
        assert!(!engine.has_context());
    }

    struct FailingEngine;

    impl ComputeEngine for FailingEngine {
        fn capabilities(&self) -> hoshi_core::EngineCapabilities {
            hoshi_core::EngineCapabilities {
                name: "Failing".into(),
                kind: EngineKind::Secondary,
                supports_reduced_precision: false,
                has_gpu: false,
            }
        }

        fn create_context(&self, _config: &ContextConfig) -> std::result::Result<(), EngineError> {
            Err(EngineError::DeviceUnavailable("no device".into()))
        }

        fn destroy_context(&self) {}

        fn load_model(
            &self,
            _desc: &hoshi_core::ModelDescriptor,
            _config: &hoshi_core::EngineModelConfig,
        ) -> std::result::Result<hoshi_core::EngineModel, EngineError> {
            Err(EngineError::ContextMissing)
        }

        fn execute_batch(
            &self,
            _model: &hoshi_core::EngineModel,
            _inputs: &hoshi_core::BatchInputs<'_>,
            _outputs: &mut hoshi_core::BatchOutputs<'_>,
            _batch_size: usize,
        ) -> std::result::Result<(), EngineError> {
            Err(EngineError::ContextMissing)
        }

        fn release_model(&self, _model: &hoshi_core::EngineModel) {}
    }

    #[test]
    fn test_failed_engine_rolls_back() {
        let accelerated = Arc::new(HostEngine::from_fn(EngineKind::Accelerated, |_, _, _| Ok(())));
        let result = ComputeContext::builder()
            .accelerated(accelerated.clone())
            .secondary(Arc::new(FailingEngine))
            .build();
        assert!(matches!(
            result,
            Err(Error::Engine(EngineError::DeviceUnavailable(_)))
        ));
        assert!(!accelerated.has_context());
    }
}
