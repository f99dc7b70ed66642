//! Growable typed buffer charged to a [`Context`], plus borrowed slices of it.

use std::cmp::Ordering;
use std::fmt;
use std::mem;
use std::ops::{Deref, DerefMut};

use crate::context::Context;
use crate::error::{Error, Result};

/// Capacity used when neither a count nor a capacity is asked for.
pub const DEFAULT_CAPACITY: usize = 4;

/// Next capacity for a full vector: ×1.5, rounded.
fn grown(capacity: usize) -> usize {
    ((capacity * 3 + 1) / 2).max(capacity + 1)
}

pub struct Vector<'c, T> {
    ctx: &'c Context<'c>,
    items: Vec<T>,
    capacity: usize,
}

impl<'c, T> Vector<'c, T> {
    pub fn new(ctx: &'c Context<'c>) -> Result<Self> {
        Self::with_capacity(ctx, 0)
    }

    /// A zero capacity falls back to [`DEFAULT_CAPACITY`].
    pub fn with_capacity(ctx: &'c Context<'c>, capacity: usize) -> Result<Self> {
        let capacity = if capacity == 0 { DEFAULT_CAPACITY } else { capacity };
        let mut items = Vec::new();
        reserve(ctx, &mut items, capacity)?;
        Ok(Self { ctx, items, capacity })
    }

    /// Adopts an existing buffer; capacity is at least its length.
    pub fn from_vec(ctx: &'c Context<'c>, mut items: Vec<T>) -> Result<Self> {
        let capacity = if items.is_empty() { DEFAULT_CAPACITY } else { items.len() };
        reserve(ctx, &mut items, capacity)?;
        Ok(Self { ctx, items, capacity })
    }

    pub fn from_slice(ctx: &'c Context<'c>, items: &[T]) -> Result<Self>
    where
        T: Clone,
    {
        let mut v = Self::with_capacity(ctx, items.len())?;
        v.items.extend_from_slice(items);
        Ok(v)
    }

    pub fn context(&self) -> &'c Context<'c> {
        self.ctx
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Amortized O(1); a full vector grows by ×1.5 first.
    pub fn append(&mut self, item: T) -> Result<()> {
        if self.items.len() == self.capacity {
            self.expand(grown(self.capacity))?;
        }
        self.items.push(item);
        Ok(())
    }

    /// Raises capacity to `capacity` with a single reallocation; no-op if
    /// there is already room.
    pub fn expand(&mut self, capacity: usize) -> Result<()> {
        if capacity <= self.capacity {
            return Ok(());
        }
        reserve(self.ctx, &mut self.items, capacity).map_err(|err| {
            let _ = self.ctx.push_error(format_args!("expanding vector"));
            err
        })?;
        self.release_bytes(self.capacity);
        self.capacity = capacity;
        Ok(())
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn truncate(&mut self, len: usize) {
        self.items.truncate(len);
    }

    pub fn sort_by<F>(&mut self, compare: F)
    where
        F: FnMut(&T, &T) -> Ordering,
    {
        self.items.sort_unstable_by(compare);
    }

    pub fn sort(&mut self)
    where
        T: Ord,
    {
        self.items.sort_unstable();
    }

    pub fn dedup(&mut self)
    where
        T: PartialEq,
    {
        self.items.dedup();
    }

    /// Borrows `[begin, end)`. Requires `begin <= end < len()`.
    pub fn slice(&self, begin: usize, end: usize) -> Result<Slice<'_, T>> {
        Slice::of(&self.items, self.capacity, begin, end)
    }

    pub fn as_full_slice(&self) -> Slice<'_, T> {
        Slice {
            items: &self.items,
            capacity: self.capacity,
        }
    }

    /// Releases the buffer now rather than at drop.
    pub fn release(self) {
        drop(self);
    }

    pub fn into_vec(mut self) -> Vec<T> {
        self.release_bytes(self.capacity);
        self.capacity = 0;
        mem::take(&mut self.items)
    }

    fn release_bytes(&self, capacity: usize) {
        self.ctx.free(capacity * mem::size_of::<T>());
    }
}

impl<'c, T: Clone> Vector<'c, T> {
    /// Sets the count to `len`, growing capacity to exactly `len` if needed.
    /// New slots hold `T::default()`.
    pub fn resize(&mut self, len: usize) -> Result<()>
    where
        T: Default,
    {
        self.expand(len)?;
        self.items.resize(len, T::default());
        Ok(())
    }

    /// A new vector with the same items, charged to the same context.
    pub fn try_clone(&self) -> Result<Self> {
        Self::from_slice(self.ctx, &self.items)
            .map_err(|err| {
                let _ = self.ctx.push_error(format_args!("creating vector for clone"));
                err
            })
    }

    /// Replaces the contents with `src`, expanding if needed.
    pub fn copy_from(&mut self, src: &[T]) -> Result<()> {
        self.expand(src.len())?;
        self.items.clear();
        self.items.extend_from_slice(src);
        Ok(())
    }
}

impl<T> Drop for Vector<'_, T> {
    fn drop(&mut self) {
        if self.capacity > 0 {
            self.release_bytes(self.capacity);
        }
    }
}

impl<T> Deref for Vector<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<T> DerefMut for Vector<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.items
    }
}

impl<'a, T> IntoIterator for &'a Vector<'_, T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: fmt::Debug> fmt::Debug for Vector<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vector")
            .field("count", &self.items.len())
            .field("capacity", &self.capacity)
            .field("items", &self.items)
            .finish()
    }
}

/// Non-owning view into a [`Vector`]; `capacity` is what remains of the
/// source's capacity from `begin`.
pub struct Slice<'v, T> {
    items: &'v [T],
    capacity: usize,
}

impl<T> Clone for Slice<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Slice<'_, T> {}

impl<'v, T> Slice<'v, T> {
    fn of(items: &'v [T], capacity: usize, begin: usize, end: usize) -> Result<Self> {
        if begin > end || end >= items.len() {
            return Err(Error::SliceOutOfBounds {
                begin,
                end,
                count: items.len(),
            });
        }
        Ok(Self {
            items: &items[begin..end],
            capacity: capacity - begin,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slices this view the same way [`Vector::slice`] does. The bound check
    /// is against the source items this view can still see.
    pub fn slice(&self, begin: usize, end: usize) -> Result<Slice<'v, T>> {
        Slice::of(self.items, self.capacity, begin, end)
    }
}

impl<T> Deref for Slice<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.items
    }
}

impl<T: fmt::Debug> fmt::Debug for Slice<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Slice")
            .field("count", &self.items.len())
            .field("capacity", &self.capacity)
            .field("items", &self.items)
            .finish()
    }
}

/// Charges `capacity` elements to `ctx` and makes sure `items` can hold them.
fn reserve<T>(ctx: &Context<'_>, items: &mut Vec<T>, capacity: usize) -> Result<()> {
    let bytes = capacity * mem::size_of::<T>();
    ctx.alloc(bytes)?;
    let additional = capacity.saturating_sub(items.len());
    if items.try_reserve_exact(additional).is_err() {
        ctx.free(bytes);
        return Err(ctx.fail(Error::AllocationFailure { bytes }));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::LimitedAllocator;
    use crate::logging::Logger;
    use std::rc::Rc;

    #[test]
    fn empty_vector_gets_default_capacity() {
        let ctx = Context::create(None).unwrap();
        let v: Vector<u32> = Vector::new(&ctx).unwrap();
        assert_eq!(v.len(), 0);
        assert_eq!(v.capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn appends_grow_by_half_with_logarithmic_reallocations() {
        let ctx = Context::create(None).unwrap();
        let mut v = Vector::new(&ctx).unwrap();
        let mut capacities = vec![v.capacity()];

        for i in 0..100u32 {
            v.append(i).unwrap();
            assert!(v.capacity() >= v.len());
            if *capacities.last().unwrap() != v.capacity() {
                capacities.push(v.capacity());
            }
        }

        assert_eq!(v.len(), 100);
        assert_eq!(capacities, vec![4, 6, 9, 14, 21, 32, 48, 72, 108]);
        for pair in capacities.windows(2) {
            assert_eq!(pair[1], (pair[0] * 3 + 1) / 2);
        }
        assert_eq!(v.as_slice(), (0..100).collect::<Vec<_>>().as_slice());
    }

    #[test]
    fn every_growth_is_one_allocation_and_one_free() {
        let ctx = Context::create(None).unwrap();
        let base = ctx.stats();
        {
            let mut v = Vector::new(&ctx).unwrap();
            for i in 0..100u64 {
                v.append(i).unwrap();
            }
            let s = ctx.stats();
            assert_eq!(s.allocations - base.allocations, 9);
            assert_eq!(s.frees - base.frees, 8);
            assert_eq!(s.bytes_in_use - base.bytes_in_use, 108 * 8);
        }
        assert_eq!(ctx.stats().bytes_in_use, base.bytes_in_use);
    }

    #[test]
    fn expand_is_a_no_op_when_room_exists() {
        let ctx = Context::create(None).unwrap();
        let mut v: Vector<u8> = Vector::with_capacity(&ctx, 10).unwrap();
        let before = ctx.stats().allocations;
        v.expand(8).unwrap();
        assert_eq!(v.capacity(), 10);
        assert_eq!(ctx.stats().allocations, before);
    }

    #[test]
    fn resize_grows_to_exact_size_and_zero_fills() {
        let ctx = Context::create(None).unwrap();
        let mut v = Vector::from_slice(&ctx, &[7u32, 8]).unwrap();
        v.resize(5).unwrap();
        assert_eq!(v.capacity(), 5);
        assert_eq!(v.as_slice(), &[7, 8, 0, 0, 0]);
        v.resize(1).unwrap();
        assert_eq!(v.as_slice(), &[7]);
        assert_eq!(v.capacity(), 5);
    }

    #[test]
    fn slice_counts_and_bounds() {
        let ctx = Context::create(None).unwrap();
        let v = Vector::from_slice(&ctx, &[0u32, 1, 2, 3, 4, 5, 6]).unwrap();

        let s = v.slice(2, 5).unwrap();
        assert_eq!(s.len(), 3);
        assert_eq!(&*s, &[2, 3, 4]);
        assert_eq!(s.capacity(), v.capacity() - 2);

        assert!(matches!(v.slice(2, 7), Err(Error::SliceOutOfBounds { end: 7, count: 7, .. })));
        assert!(v.slice(4, 3).is_err());

        let inner = v.slice(1, 6).unwrap().slice(1, 3).unwrap();
        assert_eq!(&*inner, &[2, 3]);
    }

    #[test]
    fn truncate_keeps_capacity_and_full_slice_sees_it() {
        let ctx = Context::create(None).unwrap();
        let mut v = Vector::from_slice(&ctx, &[1u32, 2, 3, 4, 5]).unwrap();
        let capacity = v.capacity();
        let in_use = ctx.stats().bytes_in_use;

        v.truncate(2);
        assert_eq!(v.as_slice(), &[1, 2]);
        assert_eq!(v.capacity(), capacity);
        assert_eq!(ctx.stats().bytes_in_use, in_use);

        v.truncate(10);
        assert_eq!(v.len(), 2);

        let full = v.as_full_slice();
        assert_eq!(&*full, &[1, 2]);
        assert_eq!(full.capacity(), capacity);
    }

    #[test]
    fn clone_and_copy_are_independent() {
        let ctx = Context::create(None).unwrap();
        let mut a = Vector::from_slice(&ctx, &[1u32, 2, 3]).unwrap();
        let b = a.try_clone().unwrap();
        a[0] = 10;
        assert_eq!(b.as_slice(), &[1, 2, 3]);

        let mut c: Vector<u32> = Vector::new(&ctx).unwrap();
        c.copy_from(&a).unwrap();
        assert_eq!(c.as_slice(), &[10, 2, 3]);
    }

    #[test]
    fn sort_uses_the_comparator() {
        let ctx = Context::create(None).unwrap();
        let mut v = Vector::from_slice(&ctx, &[3u32, 1, 2]).unwrap();
        v.sort_by(|a, b| b.cmp(a));
        assert_eq!(v.as_slice(), &[3, 2, 1]);
    }

    #[test]
    fn growth_failure_keeps_vector_intact() {
        let limit = Context::footprint() + 4 * 8;
        let ctx =
            Context::with_allocator(Rc::new(LimitedAllocator::new(limit)), Logger::default())
                .unwrap();
        let mut v = Vector::new(&ctx).unwrap();
        for i in 0..4u64 {
            v.append(i).unwrap();
        }

        let err = v.append(4).unwrap_err();

        assert!(matches!(err, Error::AllocationFailure { bytes: 48 }));
        assert_eq!(v.as_slice(), &[0, 1, 2, 3]);
        assert_eq!(v.capacity(), 4);
        assert_eq!(ctx.error().head(), Some("expanding vector"));
    }

    #[test]
    fn into_vec_returns_items_and_releases_budget() {
        let ctx = Context::create(None).unwrap();
        let base = ctx.stats().bytes_in_use;
        let v = Vector::from_slice(&ctx, &[1u16, 2]).unwrap();
        assert_eq!(v.into_vec(), vec![1, 2]);
        assert_eq!(ctx.stats().bytes_in_use, base);
    }
}
