use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

/// Metadata page code can observe about a callable: what `name`, `toString()` and the
/// prototype chain report.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CapabilityIdentity {
    pub name: String,
    pub prototype: String,
    pub native_source: String,
}

impl CapabilityIdentity {
    pub fn native(name: &str, prototype: &str) -> Self {
        Self {
            name: name.to_string(),
            prototype: prototype.to_string(),
            native_source: format!("function {name}() {{ [native code] }}"),
        }
    }
}

/// A callable paired with its identity.
///
/// Wrappers are built with [`Capability::masquerade`], which shares the original's identity
/// record, so every identity observation made by page code yields the same answer for the
/// wrapper as for the native it replaced.
pub struct Capability<F: ?Sized> {
    identity: Arc<CapabilityIdentity>,
    func: Arc<F>,
}

impl<F: ?Sized> Clone for Capability<F> {
    fn clone(&self) -> Self {
        Self {
            identity: Arc::clone(&self.identity),
            func: Arc::clone(&self.func),
        }
    }
}

impl<F: ?Sized> fmt::Debug for Capability<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capability")
            .field("name", &self.identity.name)
            .field("prototype", &self.identity.prototype)
            .finish()
    }
}

impl<F: ?Sized> Capability<F> {
    pub fn native(name: &str, prototype: &str, func: Arc<F>) -> Self {
        Self {
            identity: Arc::new(CapabilityIdentity::native(name, prototype)),
            func,
        }
    }

    pub fn masquerade(original: &Capability<F>, func: Arc<F>) -> Self {
        Self {
            identity: Arc::clone(&original.identity),
            func,
        }
    }

    pub fn func(&self) -> &F {
        &self.func
    }

    pub fn identity(&self) -> &CapabilityIdentity {
        &self.identity
    }

    pub fn name(&self) -> &str {
        &self.identity.name
    }

    pub fn prototype(&self) -> &str {
        &self.identity.prototype
    }

    pub fn to_native_string(&self) -> &str {
        &self.identity.native_source
    }

    /// Identity comparison as page code sees it (`a === b` on the function objects' metadata).
    pub fn same_identity(&self, other: &Capability<F>) -> bool {
        Arc::ptr_eq(&self.identity, &other.identity)
    }

    /// Whether both handles invoke the same underlying callable.
    pub fn same_callable(&self, other: &Capability<F>) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.func) as *const (),
            Arc::as_ptr(&other.func) as *const (),
        )
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BindingError {
    #[error("binding `{0}` is not writable")]
    Frozen(String),
}

/// One globally reachable, replaceable slot (`window.eval`, `Storage.prototype.setItem`, ...).
pub struct Binding<T> {
    name: &'static str,
    slot: RwLock<T>,
    frozen: AtomicBool,
}

impl<T: Clone> Binding<T> {
    pub fn new(name: &'static str, value: T) -> Self {
        Self {
            name,
            slot: RwLock::new(value),
            frozen: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn get(&self) -> T {
        self.slot.read().clone()
    }

    /// Swaps in `value`, returning the previous occupant.
    pub fn replace(&self, value: T) -> Result<T, BindingError> {
        if self.is_frozen() {
            return Err(BindingError::Frozen(self.name.to_string()));
        }
        Ok(std::mem::replace(&mut *self.slot.write(), value))
    }

    /// Replaces the slot with the result of `wrap(current)` under a single write lock.
    pub fn wrap(&self, wrap: impl FnOnce(&T) -> T) -> Result<(), BindingError> {
        if self.is_frozen() {
            return Err(BindingError::Frozen(self.name.to_string()));
        }
        let mut slot = self.slot.write();
        let next = wrap(&slot);
        *slot = next;
        Ok(())
    }

    pub fn freeze(&self) {
        self.frozen.store(true, Ordering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::SeqCst)
    }
}

impl<T> fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binding")
            .field("name", &self.name)
            .field("frozen", &self.frozen.load(Ordering::Relaxed))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Greeter = dyn Fn(&str) -> String + Send + Sync;

    #[test]
    fn masquerade_keeps_identity_but_swaps_behaviour() {
        let native: Capability<Greeter> = Capability::native(
            "greet",
            "Function",
            Arc::new(|who: &str| format!("hi {who}")) as Arc<Greeter>,
        );
        let wrapper = Capability::masquerade(
            &native,
            Arc::new(|who: &str| format!("hello {who}")) as Arc<Greeter>,
        );

        assert!(wrapper.same_identity(&native));
        assert!(!wrapper.same_callable(&native));
        assert_eq!(wrapper.to_native_string(), "function greet() { [native code] }");
        assert_eq!((wrapper.func())("bob"), "hello bob");
    }

    #[test]
    fn frozen_binding_rejects_replacement() {
        let binding = Binding::new("console.clear", 1u8);
        assert_eq!(binding.replace(2), Ok(1));
        binding.freeze();
        assert_eq!(
            binding.replace(3),
            Err(BindingError::Frozen("console.clear".into()))
        );
        assert_eq!(binding.wrap(|v| v + 1), Err(BindingError::Frozen("console.clear".into())));
        assert_eq!(binding.get(), 2);
    }
}
