//! Rule based validation of named properties.
//!
//! [PropertyValidator] keeps rules per property name and the errors produced by the last pass
//! for each property. It never fails: empty property names and properties without rules fall back
//! to "valid" and leave stored errors untouched.
//!
//! The validator is meant to be owned by a single editor on a single thread, so rules and
//! listeners are neither `Send` nor `Sync`.

pub mod rule;

use std::{
    collections::{BTreeMap, BTreeSet},
    rc::Rc,
};

use rule::PropertyRule;
use tracing::trace;

/// Whether an error change should reach the listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Notification {
    #[default]
    Raise,
    Suppress,
}

type Listener<E> = Box<dyn Fn(&str, &[E])>;

pub struct PropertyValidator<T, E = String> {
    /// Kept in registration order so errors come out in a stable order.
    rules: BTreeMap<String, Vec<Rc<PropertyRule<T, E>>>>,
    errors: BTreeMap<String, Vec<E>>,
    listeners: Vec<Listener<E>>,
}

impl<T, E> Default for PropertyValidator<T, E> {
    fn default() -> Self {
        Self {
            rules: BTreeMap::new(),
            errors: BTreeMap::new(),
            listeners: Vec::new(),
        }
    }
}

impl<T, E> PropertyValidator<T, E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `rule` under `property`. Returns false when the property name is empty.
    pub fn add_rule(&mut self, property: &str, rule: PropertyRule<T, E>) -> bool {
        self.add_shared_rule(property, Rc::new(rule))
    }

    /// Registers a rule that may be shared between properties. Returns false when the property
    /// name is empty or the same rule instance is already registered for it.
    pub fn add_shared_rule(&mut self, property: &str, rule: Rc<PropertyRule<T, E>>) -> bool {
        if property.is_empty() {
            return false;
        }
        let rules = self.rules.entry(property.to_owned()).or_default();
        if rules.iter().any(|existing| Rc::ptr_eq(existing, &rule)) {
            return false;
        }
        rules.push(rule);
        true
    }

    /// Drops every rule of `property`. Errors computed earlier stay in place.
    pub fn remove_rules_for_property(&mut self, property: &str) {
        if let Some(rules) = self.rules.get_mut(property) {
            rules.clear();
        }
    }

    pub fn rule_count(&self, property: &str) -> usize {
        self.rules.get(property).map_or(0, Vec::len)
    }

    /// Subscribes to error changes. The listener receives the property name and its new errors.
    pub fn on_errors_changed(&mut self, listener: impl Fn(&str, &[E]) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Runs every rule of `property` against `owner` and replaces its stored errors with the
    /// result. Returns true when no rule failed.
    ///
    /// A property without rules is always valid and its stored errors are not touched.
    pub fn validate_property(&mut self, owner: &T, property: &str) -> bool {
        let Some(rules) = self.rules.get(property).filter(|rules| !rules.is_empty()) else {
            return true;
        };
        let errors = rules
            .iter()
            .filter_map(|rule| rule.check(owner))
            .collect::<Vec<_>>();
        let valid = errors.is_empty();
        trace!(property, valid, "Validated property");
        self.store(property, errors, Notification::Raise);
        valid
    }

    /// Validates every property that has at least one rule. Returns true when all of them pass.
    pub fn validate_all(&mut self, owner: &T) -> bool {
        let properties = self
            .rules
            .iter()
            .filter(|(_, rules)| !rules.is_empty())
            .map(|(property, _)| property.clone())
            .collect::<Vec<_>>();

        let mut valid = true;
        for property in properties {
            valid &= self.validate_property(owner, &property);
        }
        valid
    }

    pub fn errors(&self, property: &str) -> &[E] {
        self.errors
            .get(property)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn set_errors(&mut self, property: &str, errors: Vec<E>, notification: Notification) {
        if property.is_empty() {
            return;
        }
        self.store(property, errors, notification);
    }

    pub fn clear_errors(&mut self, property: &str, notification: Notification) {
        if property.is_empty() {
            return;
        }
        self.store(property, Vec::new(), notification);
    }

    /// Clears errors of every property that has rules or stored errors.
    pub fn clear_all_errors(&mut self, notification: Notification) {
        let properties = self
            .rules
            .keys()
            .chain(self.errors.keys())
            .cloned()
            .collect::<BTreeSet<_>>();
        for property in properties {
            self.store(&property, Vec::new(), notification);
        }
    }

    pub fn has_errors(&self) -> bool {
        self.errors.values().any(|errors| !errors.is_empty())
    }

    /// Properties that currently hold at least one error.
    pub fn invalid_properties(&self) -> impl Iterator<Item = &str> {
        self.errors
            .iter()
            .filter(|(_, errors)| !errors.is_empty())
            .map(|(property, _)| property.as_str())
    }

    fn store(&mut self, property: &str, errors: Vec<E>, notification: Notification) {
        self.errors.insert(property.to_owned(), errors);
        if notification == Notification::Suppress {
            return;
        }
        let stored = self.errors(property);
        for listener in &self.listeners {
            listener(property, stored);
        }
    }
}
