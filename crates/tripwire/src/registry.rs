// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, LazyLock, Weak};

use parking_lot::RwLock;

use crate::{Circuit, CircuitState, CircuitStatus};

static GLOBAL: LazyLock<Registry> = LazyLock::new(Registry::new);

/// A collection of named circuits for enumeration and aggregate health queries.
///
/// Every circuit registers itself on construction, in the process-wide
/// [`global`][Registry::global] registry unless [`CircuitOptions::registry`][crate::CircuitOptions::registry]
/// selects another one.
///
/// The registry only tracks circuits. It holds weak references and never keeps a circuit alive:
/// once the last [`Circuit`] clone is dropped the circuit disappears from every query.
///
/// Names are keys. Registering a circuit under a name that is already taken replaces the previous
/// entry, so the last registration wins.
///
/// `Registry` is cheap to clone. Clones share the same membership.
///
/// # Examples
///
/// ```rust
/// use tick::Clock;
/// use tripwire::{CircuitOptions, Registry};
///
/// let registry = Registry::new();
/// let clock = Clock::new_frozen();
///
/// let a = CircuitOptions::<std::io::Error>::new("a", &clock).registry(&registry).build()?;
/// let b = CircuitOptions::<std::io::Error>::new("b", &clock).registry(&registry).build()?;
/// b.trip();
///
/// assert!(!registry.all_closed());
/// assert_eq!(registry.open().map(|c| c.name().to_string()).collect::<Vec<_>>(), ["b"]);
/// assert_eq!(registry.closed().map(|c| c.name().to_string()).collect::<Vec<_>>(), ["a"]);
/// # drop(a);
/// # Ok::<(), tripwire::ConfigError>(())
/// ```
#[derive(Clone, Default)]
pub struct Registry {
    circuits: Arc<RwLock<HashMap<Cow<'static, str>, Weak<CircuitState>>>>,
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide registry, created empty on first use.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Adds `circuit` under its name, replacing any circuit registered under the same name.
    ///
    /// Registering the same circuit again has no effect.
    pub fn register<E>(&self, circuit: &Circuit<E>) {
        self.register_state(circuit.state_arc());
    }

    pub(crate) fn register_state(&self, state: &Arc<CircuitState>) {
        let mut circuits = self.circuits.write();

        circuits.retain(|_, circuit| circuit.strong_count() > 0);
        circuits.insert(state.name_cow().clone(), Arc::downgrade(state));
    }

    /// Returns the live circuit registered under `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<CircuitState>> {
        self.circuits.read().get(name).and_then(Weak::upgrade)
    }

    /// Returns all live circuits, ordered by name.
    ///
    /// Membership is captured when this is called. Statuses are read as the iterator advances.
    #[must_use]
    pub fn circuits(&self) -> Circuits {
        self.select(|_| true)
    }

    /// Returns `true` if every live circuit is closed. An empty registry is all closed.
    #[must_use]
    pub fn all_closed(&self) -> bool {
        self.circuits().all(|circuit| circuit.status().is_closed())
    }

    /// Returns the live circuits that restrict traffic, ordered by name.
    ///
    /// Half-open circuits are included, since they admit at most one probe.
    #[must_use]
    pub fn open(&self) -> Circuits {
        self.select(CircuitStatus::is_open)
    }

    /// Returns the live closed circuits, ordered by name.
    #[must_use]
    pub fn closed(&self) -> Circuits {
        self.select(CircuitStatus::is_closed)
    }

    /// Returns the number of live circuits.
    #[must_use]
    pub fn len(&self) -> usize {
        self.circuits.read().values().filter(|circuit| circuit.strong_count() > 0).count()
    }

    /// Returns `true` if no live circuit is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn select(&self, filter: fn(CircuitStatus) -> bool) -> Circuits {
        let mut members: Vec<_> = self.circuits.read().values().filter_map(Weak::upgrade).collect();
        members.sort_by(|a, b| a.name().cmp(b.name()));

        Circuits {
            members: members.into_iter(),
            filter,
        }
    }
}

impl Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.circuits().map(|circuit| circuit.name().to_string())).finish()
    }
}

/// Iterator over the circuits of a [`Registry`].
///
/// Clone it to iterate the same membership again.
#[derive(Clone)]
pub struct Circuits {
    members: std::vec::IntoIter<Arc<CircuitState>>,
    filter: fn(CircuitStatus) -> bool,
}

impl Iterator for Circuits {
    type Item = Arc<CircuitState>;

    fn next(&mut self) -> Option<Self::Item> {
        let filter = self.filter;
        self.members.find(|circuit| filter(circuit.status()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.members.size_hint().1)
    }
}

impl Debug for Circuits {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Circuits").field("remaining", &self.members.len()).finish_non_exhaustive()
    }
}
