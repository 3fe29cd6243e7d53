//! Token-indexed behavior table with default, error and shutdown slots

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use rand::Rng;

use super::group::BehaviorGroup;
use super::phrases::PhraseFile;
use super::{Behavior, BehaviorContext, CustomBehavior, ReplyBehavior};
use crate::Result;
use crate::intent::Entity;

/// Registered behaviors
///
/// Default and error behaviors live in their own slots and are never
/// reachable through a token lookup.
#[derive(Default)]
pub struct BehaviorRegistry {
    groups: HashMap<String, BehaviorGroup>,
    default: Option<Arc<dyn Behavior>>,
    error: Option<Arc<dyn Behavior>>,
    shutdown: Option<(String, Arc<dyn Behavior>)>,
}

impl std::fmt::Debug for BehaviorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BehaviorRegistry")
            .field("groups", &self.groups.len())
            .field("default", &self.default.is_some())
            .field("error", &self.error.is_some())
            .field("shutdown", &self.shutdown.as_ref().map(|(p, _)| p))
            .finish()
    }
}

impl BehaviorRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a behavior under `token`
    ///
    /// Blank tokens are rejected with a warning; use the default and error
    /// slots for untokened behaviors.
    pub fn register(&mut self, token: impl Into<String>, behavior: Arc<dyn Behavior>) {
        let token = token.into().trim().to_string();
        if token.is_empty() {
            tracing::warn!(behavior = %behavior.describe(), "ignoring behavior with blank token");
            return;
        }

        tracing::debug!(%token, behavior = %behavior.describe(), "registered behavior");
        self.groups
            .entry(token.clone())
            .or_insert_with(|| BehaviorGroup::new(token))
            .push(behavior);
    }

    /// Add a spoken reply under `token`
    pub fn add_reply(&mut self, token: impl Into<String>, text: impl Into<String>) {
        self.register(token, Arc::new(ReplyBehavior::new(text)));
    }

    /// Add an async handler under `token`
    pub fn add_custom<F, Fut>(&mut self, token: impl Into<String>, handler: F)
    where
        F: Fn(BehaviorContext, Vec<Entity>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let token = token.into();
        let behavior = CustomBehavior::new(token.clone(), handler);
        self.register(token, Arc::new(behavior));
    }

    /// Set the behavior for unmatched intents
    pub fn register_default(&mut self, behavior: Arc<dyn Behavior>) {
        self.default = Some(behavior);
    }

    /// Set the behavior for empty utterances and classification failures
    pub fn register_error(&mut self, behavior: Arc<dyn Behavior>) {
        self.error = Some(behavior);
    }

    /// Speak `text` for unmatched intents
    pub fn add_default_reply(&mut self, text: impl Into<String>) {
        self.register_default(Arc::new(ReplyBehavior::new(text)));
    }

    /// Speak `text` for empty utterances and classification failures
    pub fn add_error_reply(&mut self, text: impl Into<String>) {
        self.register_error(Arc::new(ReplyBehavior::new(text)));
    }

    /// Run `behavior` for any utterance starting with `prefix`
    ///
    /// Matching ignores ASCII case and surrounding whitespace.
    pub fn register_shutdown(&mut self, prefix: impl Into<String>, behavior: Arc<dyn Behavior>) {
        let prefix = prefix.into().trim().to_string();
        if prefix.is_empty() {
            tracing::warn!("ignoring shutdown behavior with blank prefix");
            return;
        }
        self.shutdown = Some((prefix, behavior));
    }

    /// Register every phrase in a phrase file as a reply
    pub fn register_phrases(&mut self, phrases: &PhraseFile) -> usize {
        let mut count = 0;
        for (token, replies) in phrases.iter() {
            for reply in replies {
                self.add_reply(token, reply.clone());
                count += 1;
            }
        }
        count
    }

    /// Load a phrase file and register its replies
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn load_phrases(&mut self, path: &Path) -> Result<usize> {
        let phrases = PhraseFile::load(path)?;
        let count = self.register_phrases(&phrases);
        tracing::info!(path = %path.display(), phrases = count, "registered phrase file");
        Ok(count)
    }

    /// Shutdown behavior if `utterance` starts with its prefix
    #[must_use]
    pub fn shutdown_for(&self, utterance: &str) -> Option<Arc<dyn Behavior>> {
        let (prefix, behavior) = self.shutdown.as_ref()?;
        let utterance = utterance.trim_start();
        let matches = utterance
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
        matches.then(|| Arc::clone(behavior))
    }

    /// Select the next behavior for `token`
    pub fn select<R: Rng + ?Sized>(
        &mut self,
        token: &str,
        rng: &mut R,
    ) -> Option<(usize, Arc<dyn Behavior>)> {
        self.groups.get_mut(token)?.select(rng)
    }

    /// Group registered under `token`
    #[must_use]
    pub fn group(&self, token: &str) -> Option<&BehaviorGroup> {
        self.groups.get(token)
    }

    /// Default slot
    #[must_use]
    pub fn default_behavior(&self) -> Option<Arc<dyn Behavior>> {
        self.default.clone()
    }

    /// Error slot
    #[must_use]
    pub fn error_behavior(&self) -> Option<Arc<dyn Behavior>> {
        self.error.clone()
    }

    /// Registered tokens, sorted
    #[must_use]
    pub fn tokens(&self) -> Vec<&str> {
        let mut tokens: Vec<&str> = self.groups.keys().map(String::as_str).collect();
        tokens.sort_unstable();
        tokens
    }
}
