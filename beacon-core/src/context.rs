//! Layered evaluation context.
//!
//! Four layers, lowest to highest precedence: `global` < `default` <
//! `current` < `explicit`. For any category name the effective category is
//! taken whole from the highest layer defining it; fields are never merged
//! across layers. [`ContextStack::with_merged`] is the one operation that
//! merges fields, and only into the `current` layer it is scoped to.
//!
//! `global` and `default` are process-wide and live in [`SharedContext`].
//! `current` is an explicit stack of frames owned by each [`ContextStack`],
//! which is `Clone` so it can be handed to spawned tasks.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::types::ConfigValue;

/// Field name -> value within one category.
pub type Category = IndexMap<String, ConfigValue>;

/// Category name -> category. Insertion order is preserved.
pub type Categories = IndexMap<String, Category>;

/// Build a [`Category`] from `(field, value)` pairs.
pub fn category<K, V>(fields: impl IntoIterator<Item = (K, V)>) -> Category
where
    K: Into<String>,
    V: Into<ConfigValue>,
{
    fields
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Build [`Categories`] from `(name, category)` pairs.
pub fn categories<K: Into<String>>(named: impl IntoIterator<Item = (K, Category)>) -> Categories {
    named.into_iter().map(|(k, c)| (k.into(), c)).collect()
}

/// Context layer, ordered by precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Layer {
    Global,
    Default,
    Current,
    Explicit,
}

// ---------------------------------------------------------------------------
// Process-wide layers
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct BaseLayers {
    global: Categories,
    default: Categories,
}

/// Handle to the process-wide `global` and `default` layers.
#[derive(Debug, Clone, Default)]
pub struct SharedContext {
    inner: Arc<RwLock<BaseLayers>>,
}

impl SharedContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_global(&self, categories: Categories) {
        self.inner.write().global = categories;
    }

    pub fn set_default(&self, categories: Categories) {
        self.inner.write().default = categories;
    }

    pub fn global(&self) -> Categories {
        self.inner.read().global.clone()
    }

    pub fn default_layer(&self) -> Categories {
        self.inner.read().default.clone()
    }

    pub fn clear(&self) {
        let mut layers = self.inner.write();
        layers.global.clear();
        layers.default.clear();
    }

    /// A fresh stack with an empty `current` layer.
    pub fn stack(&self) -> ContextStack {
        ContextStack::new(self.clone())
    }
}

// ---------------------------------------------------------------------------
// Stack
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ContextStack {
    shared: SharedContext,
    frames: Vec<Categories>,
}

impl ContextStack {
    pub fn new(shared: SharedContext) -> Self {
        Self {
            shared,
            frames: Vec::new(),
        }
    }

    pub fn shared(&self) -> &SharedContext {
        &self.shared
    }

    /// The active `current` layer, if any frame is pushed.
    pub fn current(&self) -> Option<&Categories> {
        self.frames.last()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Replace the `current` layer wholesale until the matching pop.
    pub fn push_current(&mut self, categories: Categories) {
        self.frames.push(categories);
    }

    /// Restore the `current` layer that was active before the last push.
    pub fn pop_current(&mut self) -> Option<Categories> {
        self.frames.pop()
    }

    /// Push `categories` and pop them again when the guard drops, including
    /// on early return or unwind.
    pub fn scope(&mut self, categories: Categories) -> CurrentScope<'_> {
        let restore_to = self.frames.len();
        self.frames.push(categories);
        CurrentScope {
            stack: self,
            restore_to,
        }
    }

    /// Like [`scope`](Self::scope), but the new frame is the existing
    /// `current` layer with `categories` merged in field by field.
    pub fn merged_scope(&mut self, categories: Categories) -> CurrentScope<'_> {
        let mut frame = self.frames.last().cloned().unwrap_or_default();
        for (name, fields) in categories {
            frame.entry(name).or_default().extend(fields);
        }
        self.scope(frame)
    }

    pub fn with_current<R>(
        &mut self,
        categories: Categories,
        block: impl FnOnce(&mut ContextStack) -> R,
    ) -> R {
        let mut scope = self.scope(categories);
        block(&mut *scope)
    }

    pub fn with_merged<R>(
        &mut self,
        categories: Categories,
        block: impl FnOnce(&mut ContextStack) -> R,
    ) -> R {
        let mut scope = self.merged_scope(categories);
        block(&mut *scope)
    }

    /// Look up `"category.field"`, first layer defining the category wins.
    pub fn get(&self, path: &str) -> Option<ConfigValue> {
        let (name, field) = path.split_once('.')?;
        if let Some(found) = self.frames.last().and_then(|frame| frame.get(name)) {
            return found.get(field).cloned();
        }
        let layers = self.shared.inner.read();
        layers
            .default
            .get(name)
            .or_else(|| layers.global.get(name))
            .and_then(|found| found.get(field).cloned())
    }

    /// Resolve all layers plus a per-call `explicit` layer.
    pub fn join(&self, explicit: Categories) -> ResolvedContext {
        let (global, default) = {
            let layers = self.shared.inner.read();
            (layers.global.clone(), layers.default.clone())
        };
        let current = self.frames.last().cloned().unwrap_or_default();
        ResolvedContext::from_layers([
            (Layer::Global, global),
            (Layer::Default, default),
            (Layer::Current, current),
            (Layer::Explicit, explicit),
        ])
    }

    pub fn to_serializable(&self, namespace: &str) -> ContextSet {
        self.join(Categories::new()).to_serializable(namespace)
    }
}

/// Guard returned by [`ContextStack::scope`]; derefs to the stack.
pub struct CurrentScope<'a> {
    stack: &'a mut ContextStack,
    restore_to: usize,
}

impl Deref for CurrentScope<'_> {
    type Target = ContextStack;

    fn deref(&self) -> &ContextStack {
        self.stack
    }
}

impl DerefMut for CurrentScope<'_> {
    fn deref_mut(&mut self) -> &mut ContextStack {
        self.stack
    }
}

impl Drop for CurrentScope<'_> {
    fn drop(&mut self) {
        self.stack.frames.truncate(self.restore_to);
    }
}

// ---------------------------------------------------------------------------
// Resolved view
// ---------------------------------------------------------------------------

/// Effective categories after applying layer precedence.
#[derive(Debug, Clone, Default)]
pub struct ResolvedContext {
    effective: IndexMap<String, (Layer, Category)>,
}

impl ResolvedContext {
    /// Categories are ordered by where they first appear walking layers from
    /// lowest to highest; contents come from the highest defining layer.
    pub fn from_layers(layers: impl IntoIterator<Item = (Layer, Categories)>) -> Self {
        let mut effective: IndexMap<String, (Layer, Category)> = IndexMap::new();
        for (layer, categories) in layers {
            for (name, fields) in categories {
                effective.insert(name, (layer, fields));
            }
        }
        Self { effective }
    }

    pub fn get(&self, path: &str) -> Option<ConfigValue> {
        let (name, field) = path.split_once('.')?;
        self.category(name)?.get(field).cloned()
    }

    pub fn category(&self, name: &str) -> Option<&Category> {
        self.effective.get(name).map(|(_, fields)| fields)
    }

    /// Layer the named category was taken from.
    pub fn origin(&self, name: &str) -> Option<Layer> {
        self.effective.get(name).map(|(layer, _)| *layer)
    }

    pub fn is_empty(&self) -> bool {
        self.effective.is_empty()
    }

    pub fn to_serializable(&self, namespace: &str) -> ContextSet {
        ContextSet {
            namespace: (!namespace.is_empty()).then(|| namespace.to_string()),
            contexts: self
                .effective
                .iter()
                .map(|(name, (_, values))| NamedContext {
                    name: name.clone(),
                    values: values.clone(),
                })
                .collect(),
        }
    }
}

/// Flattened, serializable context: one block per distinct category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub contexts: Vec<NamedContext>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedContext {
    pub name: String,
    pub values: Category,
}
