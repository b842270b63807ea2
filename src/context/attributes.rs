//! Named attribute scope with change notifications.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

use crate::context::listener::AttributeListener;

/// Outcome of a write to the scope.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeChange {
    Added,
    /// Holds the previous value.
    Replaced(Value),
    /// Holds the removed value.
    Removed(Value),
    Unchanged,
}

/// Named attribute storage with change listeners.
///
/// Listeners are invoked after the write lock is released, so a listener may
/// read or write the scope itself.
#[derive(Default)]
pub struct AttributeScope {
    values: RwLock<HashMap<String, Value>>,
    listeners: RwLock<Vec<Arc<dyn AttributeListener>>>,
}

impl AttributeScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.values.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.read().contains_key(name)
    }

    /// Sorted attribute names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.values.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Store `value` under `name`. Storing `Value::Null` removes the attribute.
    pub fn set(&self, name: &str, value: Value) -> AttributeChange {
        if value.is_null() {
            return self.remove(name);
        }

        let previous = self.values.write().insert(name.to_string(), value.clone());
        let listeners = self.listeners.read().clone();
        match previous {
            Some(old) => {
                for listener in &listeners {
                    listener.attribute_replaced(name, &old, &value);
                }
                AttributeChange::Replaced(old)
            }
            None => {
                for listener in &listeners {
                    listener.attribute_added(name, &value);
                }
                AttributeChange::Added
            }
        }
    }

    pub fn remove(&self, name: &str) -> AttributeChange {
        let Some(old) = self.values.write().remove(name) else {
            return AttributeChange::Unchanged;
        };
        for listener in self.listeners.read().clone().iter() {
            listener.attribute_removed(name, &old);
        }
        AttributeChange::Removed(old)
    }

    pub fn add_listener(&self, listener: Arc<dyn AttributeListener>) {
        self.listeners.write().push(listener);
    }

    pub fn clear_listeners(&self) {
        self.listeners.write().clear();
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

impl std::fmt::Debug for AttributeScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeScope")
            .field("values", &*self.values.read())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Events(Mutex<Vec<String>>);

    impl AttributeListener for Events {
        fn attribute_added(&self, name: &str, value: &Value) {
            self.0.lock().push(format!("added {name}={value}"));
        }

        fn attribute_replaced(&self, name: &str, old: &Value, new: &Value) {
            self.0.lock().push(format!("replaced {name} {old}->{new}"));
        }

        fn attribute_removed(&self, name: &str, value: &Value) {
            self.0.lock().push(format!("removed {name}={value}"));
        }
    }

    #[test]
    fn notifies_add_replace_remove() {
        let scope = AttributeScope::new();
        let events = Arc::new(Events::default());
        scope.add_listener(events.clone());

        assert_eq!(scope.set("hits", json!(1)), AttributeChange::Added);
        assert_eq!(scope.set("hits", json!(2)), AttributeChange::Replaced(json!(1)));
        assert_eq!(scope.remove("hits"), AttributeChange::Removed(json!(2)));
        assert_eq!(scope.remove("hits"), AttributeChange::Unchanged);

        assert_eq!(
            *events.0.lock(),
            vec!["added hits=1", "replaced hits 1->2", "removed hits=2"]
        );
    }

    #[test]
    fn null_removes() {
        let scope = AttributeScope::new();
        scope.set("user", json!("ada"));
        assert_eq!(scope.set("user", Value::Null), AttributeChange::Removed(json!("ada")));
        assert!(scope.is_empty());
        assert_eq!(scope.set("ghost", Value::Null), AttributeChange::Unchanged);
    }

    #[test]
    fn names_are_sorted() {
        let scope = AttributeScope::new();
        scope.set("b", json!(true));
        scope.set("a", json!(false));
        assert_eq!(scope.names(), vec!["a", "b"]);
        assert_eq!(scope.get("a"), Some(json!(false)));
    }
}
