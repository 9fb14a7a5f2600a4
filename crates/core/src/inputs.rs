//! Collections of inputs with a memoised aggregate digest

use crate::input::Input;
use crate::{Error, Result};
use cairn_digest::{Digest, aggregate};
use cairn_store::InputRecord;
use std::collections::HashSet;
use std::sync::Mutex;

/// The inputs of one task, deduplicated by identity.
///
/// The aggregate digest does not depend on the order inputs were added in.
#[derive(Debug, Default)]
pub struct Inputs {
    items: Vec<Input>,
    identities: HashSet<String>,
    digest: Mutex<Option<Digest>>,
}

impl Inputs {
    /// Empty collection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `input` unless an input with the same identity is present.
    ///
    /// Returns whether the input was added.
    pub fn add(&mut self, input: Input) -> bool {
        if !self.identities.insert(input.identity()) {
            return false;
        }
        self.items.push(input);
        self.invalidate();
        true
    }

    /// Add every input of `inputs`
    pub fn extend(&mut self, inputs: impl IntoIterator<Item = Input>) {
        for input in inputs {
            self.add(input);
        }
    }

    fn invalidate(&mut self) {
        match self.digest.get_mut() {
            Ok(memo) => *memo = None,
            Err(poisoned) => *poisoned.into_inner() = None,
        }
    }

    /// Aggregate digest over every input, recomputed after a mutation.
    ///
    /// # Errors
    ///
    /// Returns the first error from digesting a child input.
    pub fn digest(&self) -> Result<Digest> {
        let mut memo = self
            .digest
            .lock()
            .map_err(|_| Error::internal("inputs digest lock poisoned"))?;
        if let Some(digest) = memo.as_ref() {
            return Ok(digest.clone());
        }
        let children = self
            .items
            .iter()
            .map(Input::digest)
            .collect::<Result<Vec<_>>>()?;
        let digest = aggregate(&children);
        *memo = Some(digest.clone());
        Ok(digest)
    }

    /// Whether an input with `identity` is present
    #[must_use]
    pub fn contains(&self, identity: &str) -> bool {
        self.identities.contains(identity)
    }

    /// Identities in insertion order
    pub fn identities(&self) -> impl Iterator<Item = String> + '_ {
        self.items.iter().map(Input::identity)
    }

    /// Inputs in insertion order
    pub fn iter(&self) -> std::slice::Iter<'_, Input> {
        self.items.iter()
    }

    /// Number of inputs
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether there are no inputs
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Copy without any literal string inputs
    #[must_use]
    pub fn without_strings(&self) -> Self {
        let mut out = Self::new();
        out.extend(
            self.items
                .iter()
                .filter(|i| !matches!(i, Input::String(_)))
                .cloned(),
        );
        out
    }

    /// Stored projections of every input
    ///
    /// # Errors
    ///
    /// Returns the first error from digesting a child input.
    pub fn records(&self) -> Result<Vec<InputRecord>> {
        self.items.iter().map(Input::record).collect()
    }
}

impl Clone for Inputs {
    fn clone(&self) -> Self {
        let digest = self.digest.lock().ok().and_then(|memo| memo.clone());
        Self {
            items: self.items.clone(),
            identities: self.identities.clone(),
            digest: Mutex::new(digest),
        }
    }
}

impl FromIterator<Input> for Inputs {
    fn from_iter<T: IntoIterator<Item = Input>>(iter: T) -> Self {
        let mut inputs = Self::new();
        inputs.extend(iter);
        inputs
    }
}

impl<'a> IntoIterator for &'a Inputs {
    type Item = &'a Input;
    type IntoIter = std::slice::Iter<'a, Input>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
