//! Per-script feature registry.
//!
//! Features are appended while the script's top-level chunk runs. The
//! position a feature lands at is its identity for the lifetime of the
//! loaded script.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::AutomationError;
use crate::feature::{Feature, FeatureKind};

#[derive(Default)]
pub struct FeatureRegistry {
    features: Vec<Feature>,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a feature. The closure receives the index it will live at.
    pub fn register(&mut self, make: impl FnOnce(usize) -> Feature) -> usize {
        let index = self.features.len();
        self.features.push(make(index));
        index
    }

    pub fn lookup(&self, index: usize) -> Result<&Feature, AutomationError> {
        self.features.get(index).ok_or(AutomationError::InvalidIndex {
            index,
            len: self.features.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    pub fn of_kind(&self, kind: FeatureKind) -> impl Iterator<Item = &Feature> {
        self.features.iter().filter(move |f| f.kind() == kind)
    }
}

/// Registration window shared with the `aegisub.register_*` callbacks.
///
/// Open while the script's top-level code runs; [`close`](Self::close) hands
/// the registry to the session and makes any later registration fail.
#[derive(Clone)]
pub(crate) struct RegistrationPass {
    registry: Arc<Mutex<Option<FeatureRegistry>>>,
}

pub(crate) const REGISTRATION_CLOSED: &str =
    "features can only be registered while the script is loading";

impl RegistrationPass {
    pub(crate) fn open() -> Self {
        Self {
            registry: Arc::new(Mutex::new(Some(FeatureRegistry::new()))),
        }
    }

    pub(crate) fn register(&self, make: impl FnOnce(usize) -> Feature) -> Result<usize, AutomationError> {
        let mut guard = self.registry.lock();
        match guard.as_mut() {
            Some(registry) => Ok(registry.register(make)),
            None => Err(AutomationError::Registration(REGISTRATION_CLOSED.to_string())),
        }
    }

    /// Close the window. Returns the features registered so far.
    pub(crate) fn close(&self) -> FeatureRegistry {
        self.registry.lock().take().unwrap_or_default()
    }
}
