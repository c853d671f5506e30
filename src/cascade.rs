use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::StageError;

/// Success predicate shared by every fallback chain: a result counts only
/// when it carries something.
pub trait Usable {
    fn is_usable(&self) -> bool;
}

impl Usable for String {
    fn is_usable(&self) -> bool {
        !self.trim().is_empty()
    }
}

impl<T> Usable for Vec<T> {
    fn is_usable(&self) -> bool {
        !self.is_empty()
    }
}

impl<K, V> Usable for BTreeMap<K, V> {
    fn is_usable(&self) -> bool {
        !self.is_empty()
    }
}

/// One named strategy in a fallback chain.
pub struct Attempt<'a, T> {
    name: &'static str,
    run: Box<dyn FnOnce() -> Result<T, StageError> + 'a>,
}

impl<'a, T> Attempt<'a, T> {
    pub fn new(name: &'static str, run: impl FnOnce() -> Result<T, StageError> + 'a) -> Self {
        Attempt {
            name,
            run: Box::new(run),
        }
    }
}

/// Run strategies left to right and return the first usable result along
/// with the name of the strategy that produced it. Later strategies are
/// never invoked once one succeeds.
pub fn try_in_order<T: Usable>(attempts: Vec<Attempt<'_, T>>) -> Option<(&'static str, T)> {
    for attempt in attempts {
        match (attempt.run)() {
            Ok(value) if value.is_usable() => return Some((attempt.name, value)),
            Ok(_) => debug!(strategy = attempt.name, "strategy produced nothing"),
            Err(e) => warn!(strategy = attempt.name, "strategy failed: {e}"),
        }
    }
    None
}
