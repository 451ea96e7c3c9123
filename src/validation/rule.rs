use std::fmt::Debug;

/// A predicate over the owning object paired with the error it produces when the predicate fails.
pub struct PropertyRule<T, E = String> {
    predicate: Box<dyn Fn(&T) -> bool>,
    error: Box<dyn Fn(&T) -> E>,
}

impl<T, E> PropertyRule<T, E> {
    pub fn new(
        predicate: impl Fn(&T) -> bool + 'static,
        error: impl Fn(&T) -> E + 'static,
    ) -> Self {
        Self {
            predicate: Box::new(predicate),
            error: Box::new(error),
        }
    }

    pub fn is_satisfied_by(&self, owner: &T) -> bool {
        (self.predicate)(owner)
    }

    pub fn error_for(&self, owner: &T) -> E {
        (self.error)(owner)
    }

    /// Returns the error when `owner` breaks the rule.
    pub fn check(&self, owner: &T) -> Option<E> {
        if self.is_satisfied_by(owner) {
            None
        } else {
            Some(self.error_for(owner))
        }
    }
}

impl<T, E: Clone + 'static> PropertyRule<T, E> {
    /// Rule that always reports the same error.
    pub fn with_message(predicate: impl Fn(&T) -> bool + 'static, message: impl Into<E>) -> Self {
        let message = message.into();
        Self::new(predicate, move |_| message.clone())
    }
}

impl<T, E> Debug for PropertyRule<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyRule").finish_non_exhaustive()
    }
}
