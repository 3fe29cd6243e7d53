//! Utterance to behavior dispatch

use std::sync::Arc;

use rand::SeedableRng;
use rand::rngs::StdRng;

use super::registry::BehaviorRegistry;
use super::{Behavior, BehaviorContext, RobotActions};
use crate::Error;
use crate::events::{ErrorKind, EventBus};
use crate::intent::{Entity, IntentClassifier};

/// Route taken by one dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Shutdown prefix matched; the classifier was not consulted
    Shutdown,
    /// A behavior registered under the classified token ran
    Matched {
        /// Classified intent token
        token: String,
        /// Index of the behavior within its group
        index: usize,
    },
    /// No behavior for the classified token; the default slot ran
    Default {
        /// Classified intent token
        token: String,
    },
    /// Nothing was recognized; the error slot ran
    Unrecognized,
    /// The classifier failed; the error slot ran
    ClassificationFailed,
}

/// Selects and runs exactly one behavior per utterance
pub struct BehaviorDispatcher {
    registry: BehaviorRegistry,
    classifier: Arc<dyn IntentClassifier>,
    actions: Arc<dyn RobotActions>,
    events: EventBus,
    rng: StdRng,
}

impl std::fmt::Debug for BehaviorDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BehaviorDispatcher")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl BehaviorDispatcher {
    /// Create a dispatcher with an entropy-seeded RNG
    #[must_use]
    pub fn new(
        registry: BehaviorRegistry,
        classifier: Arc<dyn IntentClassifier>,
        actions: Arc<dyn RobotActions>,
        events: EventBus,
    ) -> Self {
        Self {
            registry,
            classifier,
            actions,
            events,
            rng: StdRng::from_entropy(),
        }
    }

    /// Replace the selection RNG
    #[must_use]
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Registered behaviors
    #[must_use]
    pub const fn registry(&self) -> &BehaviorRegistry {
        &self.registry
    }

    /// Dispatch one recognized utterance
    ///
    /// `None` or blank text means nothing was recognized. Behavior failures
    /// are published as dispatch errors and never returned.
    pub async fn dispatch(&mut self, utterance: Option<&str>) -> DispatchOutcome {
        let Some(text) = utterance.map(str::trim).filter(|t| !t.is_empty()) else {
            self.events.report(&Error::Recognition(
                "nothing recognized in utterance".to_string(),
            ));
            let behavior = self.registry.error_behavior();
            self.run("error", None, behavior, Vec::new()).await;
            return DispatchOutcome::Unrecognized;
        };

        if let Some(behavior) = self.registry.shutdown_for(text) {
            tracing::info!(utterance = text, "shutdown phrase recognized");
            self.run("shutdown", None, Some(behavior), Vec::new()).await;
            return DispatchOutcome::Shutdown;
        }

        let intent = match self.classifier.classify(text).await {
            Ok(intent) => intent,
            Err(e) => {
                tracing::warn!(utterance = text, error = %e, "classification failed");
                self.events.error(ErrorKind::Classification, e.to_string());
                let behavior = self.registry.error_behavior();
                self.run("error", None, behavior, Vec::new()).await;
                return DispatchOutcome::ClassificationFailed;
            }
        };

        tracing::info!(
            utterance = text,
            intent = %intent.token,
            score = intent.score,
            "dispatching intent"
        );

        if let Some((index, behavior)) = self.registry.select(&intent.token, &mut self.rng) {
            let token = intent.token;
            self.run(&token, Some(token.clone()), Some(behavior), intent.entities)
                .await;
            DispatchOutcome::Matched { token, index }
        } else {
            let behavior = self.registry.default_behavior();
            self.run("default", Some(intent.token.clone()), behavior, intent.entities)
                .await;
            DispatchOutcome::Default {
                token: intent.token,
            }
        }
    }

    /// Run a behavior to completion on its own task
    ///
    /// The task boundary turns a panicking behavior into a join error.
    async fn run(
        &self,
        label: &str,
        token: Option<String>,
        behavior: Option<Arc<dyn Behavior>>,
        entities: Vec<Entity>,
    ) {
        let Some(behavior) = behavior else {
            tracing::warn!(slot = label, "no behavior registered, staying silent");
            return;
        };

        let description = behavior.describe();
        tracing::debug!(slot = label, behavior = %description, "running behavior");

        let ctx = BehaviorContext::new(Arc::clone(&self.actions), token);
        let task = tokio::spawn(async move { behavior.run(ctx, entities).await });

        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(slot = label, behavior = %description, error = %e, "behavior failed");
                self.events
                    .report(&Error::Dispatch(format!("{description}: {e}")));
            }
            Err(e) => {
                tracing::error!(slot = label, behavior = %description, error = %e, "behavior panicked");
                self.events
                    .report(&Error::Dispatch(format!("{description} panicked: {e}")));
            }
        }
    }
}
