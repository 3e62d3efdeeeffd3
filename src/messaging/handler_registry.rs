use std::sync::Arc;

use arc_swap::ArcSwap;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::trace;

use crate::messaging::codes::MessageCode;

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum HandlerError {
    /// A second handler for a code is a configuration defect: one of the two would be silently
    ///  shadowed, so registration fails instead.
    #[error("a {registry} handler is already registered for {code}")]
    DuplicateHandler {
        registry: &'static str,
        code: String,
    },
}

/// Maps message codes to exactly one handler each.
///
/// Registration happens during startup, lookup on every inbound message. The map is therefore
///  copy-on-write: a registration publishes a new version of the map atomically, and lookups
///  never block. Instances are shared by reference (`Arc`) between the node and all links that
///  dispatch through it.
pub struct HandlerRegistry<C: MessageCode, H: ?Sized + Send + Sync> {
    name: &'static str,
    handlers: ArcSwap<FxHashMap<C, Arc<H>>>,
}

impl<C: MessageCode, H: ?Sized + Send + Sync> HandlerRegistry<C, H> {
    pub fn new(name: &'static str) -> HandlerRegistry<C, H> {
        HandlerRegistry {
            name,
            handlers: ArcSwap::from_pointee(FxHashMap::default()),
        }
    }

    pub fn register(&self, code: C, handler: Arc<H>) -> Result<(), HandlerError> {
        let mut is_duplicate = false;
        self.handlers.rcu(|current| {
            is_duplicate = current.contains_key(&code);
            if is_duplicate {
                return current.clone();
            }
            let mut updated = (**current).clone();
            updated.insert(code, handler.clone());
            Arc::new(updated)
        });

        if is_duplicate {
            return Err(HandlerError::DuplicateHandler {
                registry: self.name,
                code: format!("{:?}", code),
            });
        }
        trace!("registered {} handler for {:?}", self.name, code);
        Ok(())
    }

    pub fn lookup(&self, code: C) -> Option<Arc<H>> {
        self.handlers.load()
            .get(&code)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.load().is_empty()
    }
}
