//! Mutation tracking and debug-only reentrancy detection.
//!
//! `Version` counts structural mutations of a container. Enumerators hold a
//! `Stamp` taken at creation and refuse to step once the live version moves
//! on. This only detects misuse after the fact; it is not a lock.
//!
//! `DebugReentrancy` catches user code (`Hash`/`Eq`) re-entering a container
//! while its chains are being walked. In release builds it is a no-op.

use crate::error::{Error, Result};
#[cfg(debug_assertions)]
use core::cell::Cell;
use core::marker::PhantomData;

/// Snapshot of a [`Version`] taken by an enumerator.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Stamp(u64);

/// Per-container structural mutation counter.
#[derive(Debug, Default)]
pub struct Version(u64);

impl Version {
    pub const fn new() -> Self {
        Self(0)
    }

    #[inline]
    pub fn bump(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }

    #[inline]
    pub fn stamp(&self) -> Stamp {
        Stamp(self.0)
    }

    #[inline]
    pub fn validate(&self, stamp: Stamp) -> Result<()> {
        if self.0 == stamp.0 {
            Ok(())
        } else {
            Err(Error::EnumerationInvalidated)
        }
    }
}

/// Version check and dispose flag shared by every cursor type.
#[derive(Debug, Clone)]
pub struct EnumeratorGuard {
    stamp: Stamp,
    disposed: bool,
}

impl EnumeratorGuard {
    pub fn new(version: &Version) -> Self {
        Self {
            stamp: version.stamp(),
            disposed: false,
        }
    }

    /// Fails if disposed or if `version` changed since creation. The
    /// snapshot is never refreshed, so a reset cursor stays invalid.
    #[inline]
    pub fn check(&self, version: &Version) -> Result<()> {
        if self.disposed {
            return Err(Error::EnumerationInvalidated);
        }
        version.validate(self.stamp)
    }

    pub fn dispose(&mut self) {
        self.disposed = true;
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }
}

/// Per-instance reentrancy tracker. Containers guard their probing entry
/// points with `let _g = self.reentrancy.enter();`.
#[derive(Debug)]
pub struct DebugReentrancy {
    #[cfg(debug_assertions)]
    depth: Cell<u32>,
    // Keeps containers !Send + !Sync: there is no synchronization anywhere.
    _nosend: PhantomData<*mut ()>,
}

impl DebugReentrancy {
    pub const fn new() -> Self {
        Self {
            #[cfg(debug_assertions)]
            depth: Cell::new(0),
            _nosend: PhantomData,
        }
    }

    /// Enter a guarded section. In debug builds, panics if already entered.
    #[inline]
    pub fn enter(&self) -> ReentrancyGuard<'_> {
        #[cfg(debug_assertions)]
        {
            let d = self.depth.get();
            assert!(d == 0, "reentrancy detected: nested entry into container");
            self.depth.set(d + 1);
            return ReentrancyGuard { owner: self };
        }

        #[cfg(not(debug_assertions))]
        {
            return ReentrancyGuard { _z: PhantomData };
        }
    }
}

impl Default for DebugReentrancy {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard returned by `DebugReentrancy::enter`.
pub struct ReentrancyGuard<'a> {
    #[cfg(debug_assertions)]
    owner: &'a DebugReentrancy,
    #[cfg(not(debug_assertions))]
    _z: PhantomData<&'a ()>,
}

impl Drop for ReentrancyGuard<'_> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        {
            let d = self.owner.depth.get();
            debug_assert!(d > 0);
            self.owner.depth.set(d - 1);
        }
    }
}
