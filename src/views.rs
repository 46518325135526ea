//! Read-only `Keys` / `Values` projections.
//!
//! A view borrows its owner and stores nothing else: `len` is the owner's,
//! and iteration is the owner's own iterator with one half of each pair
//! dropped, so views see exactly what the owner's enumerator sees.

use core::fmt;
use core::iter::FusedIterator;

/// A container that can be projected into [`Keys`] and [`Values`].
pub trait Source {
    type Key: ?Sized;
    type Value;
    type Pairs<'a>: Iterator<Item = (&'a Self::Key, &'a Self::Value)>
    where
        Self: 'a;

    fn len(&self) -> usize;

    fn pairs(&self) -> Self::Pairs<'_>;
}

/// Live view over the keys of a container.
pub struct Keys<'a, M: ?Sized> {
    pub(crate) owner: &'a M,
}

/// Live view over the values of a container.
pub struct Values<'a, M: ?Sized> {
    pub(crate) owner: &'a M,
}

impl<'a, M: Source + ?Sized> Keys<'a, M> {
    pub(crate) fn new(owner: &'a M) -> Self {
        Self { owner }
    }

    pub fn len(&self) -> usize {
        self.owner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owner.len() == 0
    }

    pub fn iter(&self) -> KeysIter<'a, M> {
        KeysIter {
            inner: self.owner.pairs(),
        }
    }
}

impl<'a, M: Source + ?Sized> Values<'a, M> {
    pub(crate) fn new(owner: &'a M) -> Self {
        Self { owner }
    }

    pub fn len(&self) -> usize {
        self.owner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owner.len() == 0
    }

    pub fn iter(&self) -> ValuesIter<'a, M> {
        ValuesIter {
            inner: self.owner.pairs(),
        }
    }

    /// Whether any value equals `value`.
    ///
    /// There is no index over values, so this is a linear scan, O(len).
    pub fn contains(&self, value: &M::Value) -> bool
    where
        M::Value: PartialEq,
    {
        self.iter().any(|v| v == value)
    }
}

impl<M: ?Sized> Clone for Keys<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<M: ?Sized> Copy for Keys<'_, M> {}

impl<M: ?Sized> Clone for Values<'_, M> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<M: ?Sized> Copy for Values<'_, M> {}

pub struct KeysIter<'a, M: Source + ?Sized + 'a> {
    inner: M::Pairs<'a>,
}

impl<'a, M: Source + ?Sized + 'a> Iterator for KeysIter<'a, M> {
    type Item = &'a M::Key;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a, M: Source + ?Sized + 'a> FusedIterator for KeysIter<'a, M> where
    M::Pairs<'a>: FusedIterator
{
}

pub struct ValuesIter<'a, M: Source + ?Sized + 'a> {
    inner: M::Pairs<'a>,
}

impl<'a, M: Source + ?Sized + 'a> Iterator for ValuesIter<'a, M> {
    type Item = &'a M::Value;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a, M: Source + ?Sized + 'a> FusedIterator for ValuesIter<'a, M> where
    M::Pairs<'a>: FusedIterator
{
}

impl<'a, M: Source + ?Sized> IntoIterator for Keys<'a, M> {
    type Item = &'a M::Key;
    type IntoIter = KeysIter<'a, M>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, M: Source + ?Sized> IntoIterator for Values<'a, M> {
    type Item = &'a M::Value;
    type IntoIter = ValuesIter<'a, M>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<M> fmt::Debug for Keys<'_, M>
where
    M: Source + ?Sized,
    M::Key: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<M> fmt::Debug for Values<'_, M>
where
    M: Source + ?Sized,
    M::Value: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}
