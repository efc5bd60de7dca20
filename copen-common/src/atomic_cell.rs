//! A small cell type giving atomic load/store of `Copy` values
//!
//! Node metrics are written by a worker thread and read at any time by telemetry consumers. Each
//! value lives in its own cell, so a reader always sees a whole value, although two cells read one
//! after the other may come from different updates.

use core::{cell::Cell, ops::Add};
use critical_section::Mutex;

/// A `Copy` value which can be shared between threads and updated atomically
#[derive(Debug)]
pub struct AtomicCell<T: Copy> {
    inner: Mutex<Cell<T>>,
}

impl<T: Send + Copy> AtomicCell<T> {
    /// Create a new cell holding `value`
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(Cell::new(value)),
        }
    }

    /// Read the current value
    pub fn load(&self) -> T {
        critical_section::with(|cs| self.inner.borrow(cs).get())
    }

    /// Overwrite the current value
    pub fn store(&self, value: T) {
        critical_section::with(|cs| self.inner.borrow(cs).set(value));
    }

    /// Apply `f` to the current value, storing the result if it returns `Some`
    ///
    /// Returns `Ok(previous)` when a new value was stored, and `Err(current)` otherwise.
    pub fn fetch_update(&self, mut f: impl FnMut(T) -> Option<T>) -> Result<T, T> {
        critical_section::with(|cs| {
            let cell = self.inner.borrow(cs);
            let old_value = cell.get();
            match f(old_value) {
                Some(new_value) => {
                    cell.set(new_value);
                    Ok(old_value)
                }
                None => Err(old_value),
            }
        })
    }
}

impl<T: Send + Copy + Add<Output = T>> AtomicCell<T> {
    /// Add `value` to the cell, returning the previous value
    pub fn fetch_add(&self, value: T) -> T {
        critical_section::with(|cs| {
            let cell = self.inner.borrow(cs);
            let old_value = cell.get();
            cell.set(old_value + value);
            old_value
        })
    }
}

impl<T: Default + Copy + Send> Default for AtomicCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
