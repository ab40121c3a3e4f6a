//! Handler registry.
//!
//! Handlers are registered on a [`RegistryBuilder`] at startup. Building it
//! yields a read-only [`HandlerRegistry`] that is shared by every in-flight
//! dispatch without locking; nothing can be registered afterwards.
//!
//! A command whose adapter or configuration failed to build is registered as
//! unavailable, so invoking it reports "unavailable" instead of "unknown".
//!
//! ```rust,ignore
//! let mut builder = RegistryBuilder::new();
//! builder.register("fortune", FortuneHandler::new(store, scores))?;
//! match MemeHandler::from_config(&config) {
//!     Ok(meme) => builder.register("dongzhuo", meme)?,
//!     Err(e) => builder.register_unavailable("dongzhuo", "董卓表情包", e)?,
//! }
//! let registry = builder.build();
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use memebot_core::ConfigError;

use crate::command::parser::is_token;
use crate::error::{RegistryError, ResolveError};
use crate::handler::{BoxedHandler, Handler};

/// A registered token.
enum Entry {
    Ready(BoxedHandler),
    Unavailable {
        description: String,
        reason: ConfigError,
    },
}

/// A registered command as listed by `/help`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInfo {
    pub token: String,
    pub description: String,
    pub available: bool,
}

/// Startup-time registry population.
#[derive(Default)]
pub struct RegistryBuilder {
    entries: HashMap<String, Entry>,
    order: Vec<String>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `handler` to `token`.
    ///
    /// Fails with [`RegistryError::DuplicateToken`] if the token is taken; the
    /// existing registration is left untouched.
    pub fn register<H>(&mut self, token: &str, handler: H) -> Result<(), RegistryError>
    where
        H: Handler + 'static,
    {
        self.register_arc(token, Arc::new(handler))
    }

    /// Binds an already shared handler to `token`.
    pub fn register_arc(&mut self, token: &str, handler: BoxedHandler) -> Result<(), RegistryError> {
        let token = self.claim(token)?;
        info!(token = %token, "Registered command");
        self.entries.insert(token, Entry::Ready(handler));
        Ok(())
    }

    /// Marks `token` as a known command that could not be built.
    pub fn register_unavailable(
        &mut self,
        token: &str,
        description: impl Into<String>,
        reason: ConfigError,
    ) -> Result<(), RegistryError> {
        let token = self.claim(token)?;
        warn!(token = %token, reason = %reason, "Command unavailable");
        self.entries.insert(
            token,
            Entry::Unavailable {
                description: description.into(),
                reason,
            },
        );
        Ok(())
    }

    pub fn contains(&self, token: &str) -> bool {
        self.entries.contains_key(&normalize(token))
    }

    /// Commands registered so far, in registration order.
    pub fn commands(&self) -> Vec<CommandInfo> {
        list_commands(&self.order, &self.entries)
    }

    /// Freezes the registry.
    pub fn build(self) -> HandlerRegistry {
        HandlerRegistry {
            inner: Arc::new(Inner {
                entries: self.entries,
                order: self.order,
            }),
        }
    }

    fn claim(&mut self, token: &str) -> Result<String, RegistryError> {
        let normalized = normalize(token);
        if !is_token(&normalized) {
            return Err(RegistryError::InvalidToken(token.to_string()));
        }
        if self.entries.contains_key(&normalized) {
            return Err(RegistryError::DuplicateToken(normalized));
        }
        self.order.push(normalized.clone());
        Ok(normalized)
    }
}

struct Inner {
    entries: HashMap<String, Entry>,
    order: Vec<String>,
}

/// Read-only mapping from command token to handler.
#[derive(Clone)]
pub struct HandlerRegistry {
    inner: Arc<Inner>,
}

impl HandlerRegistry {
    /// Looks up the handler for `token` (case-insensitive, leading `/` ignored).
    pub fn resolve(&self, token: &str) -> Result<&BoxedHandler, ResolveError> {
        let normalized = normalize(token);
        match self.inner.entries.get(&normalized) {
            Some(Entry::Ready(handler)) => Ok(handler),
            Some(Entry::Unavailable { reason, .. }) => Err(ResolveError::Unavailable {
                token: normalized,
                reason: reason.clone(),
            }),
            None => Err(ResolveError::NotFound { token: normalized }),
        }
    }

    /// Registered commands, in registration order.
    pub fn commands(&self) -> Vec<CommandInfo> {
        list_commands(&self.inner.order, &self.inner.entries)
    }

    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("tokens", &self.inner.order)
            .finish()
    }
}

fn normalize(token: &str) -> String {
    token.trim().trim_start_matches('/').to_ascii_lowercase()
}

fn list_commands(order: &[String], entries: &HashMap<String, Entry>) -> Vec<CommandInfo> {
    order
        .iter()
        .filter_map(|token| {
            let (description, available) = match entries.get(token)? {
                Entry::Ready(handler) => (handler.description().to_string(), true),
                Entry::Unavailable { description, .. } => (description.clone(), false),
            };
            Some(CommandInfo {
                token: token.clone(),
                description,
                available,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use memebot_core::Response;

    fn echo(text: &'static str) -> impl Handler {
        handler_fn(text, move |_, _| async move { Ok(Response::text(text)) })
    }

    #[test]
    fn test_resolve_returns_registered_handler() {
        let handler: BoxedHandler = Arc::new(echo("fortune"));
        let mut builder = RegistryBuilder::new();
        builder
            .register_arc("fortune", Arc::clone(&handler))
            .unwrap();
        let registry = builder.build();

        let resolved = registry.resolve("fortune").unwrap();
        assert!(Arc::ptr_eq(resolved, &handler));
        assert!(Arc::ptr_eq(registry.resolve("/FORTUNE").unwrap(), &handler));
    }

    #[test]
    fn test_duplicate_keeps_first() {
        let first: BoxedHandler = Arc::new(echo("first"));
        let mut builder = RegistryBuilder::new();
        builder.register_arc("start", Arc::clone(&first)).unwrap();

        let err = builder.register("Start", echo("second")).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateToken("start".into()));

        let registry = builder.build();
        assert!(Arc::ptr_eq(registry.resolve("start").unwrap(), &first));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_not_found_and_unavailable() {
        let mut builder = RegistryBuilder::new();
        builder
            .register_unavailable(
                "dongzhuo",
                "meme",
                ConfigError::missing("storage", "bucket"),
            )
            .unwrap();
        let registry = builder.build();

        assert!(matches!(
            registry.resolve("nope"),
            Err(ResolveError::NotFound { token }) if token == "nope"
        ));
        assert!(matches!(
            registry.resolve("dongzhuo"),
            Err(ResolveError::Unavailable { .. })
        ));
    }

    #[test]
    fn test_invalid_token() {
        let mut builder = RegistryBuilder::new();
        assert!(matches!(
            builder.register("two words", echo("x")),
            Err(RegistryError::InvalidToken(_))
        ));
        assert!(!builder.contains("two words"));
    }

    #[test]
    fn test_commands_in_order() {
        let mut builder = RegistryBuilder::new();
        builder.register("start", echo("greeting")).unwrap();
        builder
            .register_unavailable("dokaku", "three panels", ConfigError::missing("image_api", "api_key"))
            .unwrap();

        let commands = builder.build().commands();
        assert_eq!(commands.len(), 2);
        assert_eq!(commands[0].token, "start");
        assert_eq!(commands[0].description, "greeting");
        assert!(!commands[1].available);
    }
}
