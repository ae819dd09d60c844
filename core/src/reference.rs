use std::cell::RefCell;
use std::rc::Rc;

/// Shared handle to a subsystem owned by the engine and borrowed by the VM.
///
/// Borrows must stay short: the VM never holds one across a call into another
/// subsystem that may borrow the same value.
#[derive(Debug, Default)]
pub struct Ref<T: ?Sized>(Rc<RefCell<T>>);

impl<T> Ref<T> {
    pub fn new(r: T) -> Self {
        Self(Rc::new(RefCell::new(r)))
    }
}

impl<T: ?Sized> Ref<T> {
    pub fn get(&self) -> std::cell::Ref<T> {
        self.0.borrow()
    }

    pub fn get_mut(&self) -> std::cell::RefMut<T> {
        self.0.borrow_mut()
    }
}

impl<T: ?Sized> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_value() {
        let a = Ref::new(vec![1u8]);
        let b = a.clone();
        b.get_mut().push(2);
        assert_eq!(*a.get(), vec![1, 2]);
    }
}
