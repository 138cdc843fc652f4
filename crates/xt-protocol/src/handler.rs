/// Message handlers and their ordered registry.
///
/// A handler declares the message types it accepts; on delivery the
/// first registered handler accepting the envelope's type wins.
use std::sync::{Arc, PoisonError, RwLock};

use crate::envelope::Envelope;

/// Consumer of delivered envelopes.
pub trait MessageHandler: Send + Sync {
    /// Message types this handler accepts. Queried at delivery time,
    /// so the answer may change over the handler's life.
    fn types(&self) -> Vec<String>;

    /// Consume a delivered envelope.
    fn process(&self, envelope: &Envelope);
}

/// Handler built from a type list and a closure.
pub struct FnHandler<F> {
    types: Vec<String>,
    process: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Envelope) + Send + Sync,
{
    pub fn new<I, S>(types: I, process: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            types: types.into_iter().map(Into::into).collect(),
            process,
        }
    }
}

impl<F> MessageHandler for FnHandler<F>
where
    F: Fn(&Envelope) + Send + Sync,
{
    fn types(&self) -> Vec<String> {
        self.types.clone()
    }

    fn process(&self, envelope: &Envelope) {
        (self.process)(envelope)
    }
}

/// Ordered handler collection. Registration order is delivery priority.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<Vec<Arc<dyn MessageHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, handler: Arc<dyn MessageHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
    }

    /// First handler accepting `msg_type`.
    ///
    /// Returned by clone so the caller can run it without holding the lock.
    pub fn find(&self, msg_type: &str) -> Option<Arc<dyn MessageHandler>> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|h| h.types().iter().any(|t| t == msg_type))
            .cloned()
    }

    /// Union of all accepted types, in registration order, without duplicates.
    pub fn types(&self) -> Vec<String> {
        let mut all: Vec<String> = Vec::new();
        for handler in self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
        {
            for t in handler.types() {
                if !all.contains(&t) {
                    all.push(t);
                }
            }
        }
        all
    }

    pub fn len(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
