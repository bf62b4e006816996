//! Lockstep traversal of aligned raster views.
//!
//! All functions take windowed views of identical shape, as produced by
//! [`common_grid`](crate::grid::common_grid), and visit every
//! `(lat_index, lon_index)` pair exactly once in row-major order. The
//! callback returns a continuation flag: `false` aborts the whole
//! traversal, which is how fatal cell conditions short-circuit without
//! raising in the hot loop. The traversal functions return whether the
//! run completed.
//!
//! [`par_fill2`] is the parallel variant for write-only passes where
//! each cell writes only its own output slot, so no synchronization is
//! needed.

use ndarray::{ArrayView2, ArrayViewMut2, FoldWhile, Zip};

/// Visit two aligned views in lockstep.
///
/// # Panics
///
/// Panics if the view shapes differ; callers must window all views
/// through the same common grid.
pub fn traverse2<A, B, F>(a: ArrayView2<A>, b: ArrayView2<B>, mut visit: F) -> bool
where
    F: FnMut(usize, usize, &A, &B) -> bool,
{
    assert_eq!(a.dim(), b.dim(), "lockstep views must have equal shape");
    !Zip::indexed(a)
        .and(b)
        .fold_while((), |(), (lat, lon), a, b| {
            if visit(lat, lon, a, b) {
                FoldWhile::Continue(())
            } else {
                FoldWhile::Done(())
            }
        })
        .is_done()
}

/// Visit three aligned views in lockstep.
///
/// # Panics
///
/// Panics if the view shapes differ.
pub fn traverse3<A, B, C, F>(
    a: ArrayView2<A>,
    b: ArrayView2<B>,
    c: ArrayView2<C>,
    mut visit: F,
) -> bool
where
    F: FnMut(usize, usize, &A, &B, &C) -> bool,
{
    assert_eq!(a.dim(), b.dim(), "lockstep views must have equal shape");
    assert_eq!(a.dim(), c.dim(), "lockstep views must have equal shape");
    !Zip::indexed(a)
        .and(b)
        .and(c)
        .fold_while((), |(), (lat, lon), a, b, c| {
            if visit(lat, lon, a, b, c) {
                FoldWhile::Continue(())
            } else {
                FoldWhile::Done(())
            }
        })
        .is_done()
}

/// Visit three aligned views, the last one mutably.
///
/// # Panics
///
/// Panics if the view shapes differ.
pub fn traverse3_mut<A, B, C, F>(
    a: ArrayView2<A>,
    b: ArrayView2<B>,
    c: ArrayViewMut2<C>,
    mut visit: F,
) -> bool
where
    F: FnMut(usize, usize, &A, &B, &mut C) -> bool,
{
    assert_eq!(a.dim(), b.dim(), "lockstep views must have equal shape");
    assert_eq!(a.dim(), c.dim(), "lockstep views must have equal shape");
    !Zip::indexed(a)
        .and(b)
        .and(c)
        .fold_while((), |(), (lat, lon), a, b, c| {
            if visit(lat, lon, a, b, c) {
                FoldWhile::Continue(())
            } else {
                FoldWhile::Done(())
            }
        })
        .is_done()
}

/// Visit four aligned views, the last one mutably.
///
/// # Panics
///
/// Panics if the view shapes differ.
pub fn traverse4_mut<A, B, C, D, F>(
    a: ArrayView2<A>,
    b: ArrayView2<B>,
    c: ArrayView2<C>,
    d: ArrayViewMut2<D>,
    mut visit: F,
) -> bool
where
    F: FnMut(usize, usize, &A, &B, &C, &mut D) -> bool,
{
    assert_eq!(a.dim(), b.dim(), "lockstep views must have equal shape");
    assert_eq!(a.dim(), c.dim(), "lockstep views must have equal shape");
    assert_eq!(a.dim(), d.dim(), "lockstep views must have equal shape");
    !Zip::indexed(a)
        .and(b)
        .and(c)
        .and(d)
        .fold_while((), |(), (lat, lon), a, b, c, d| {
            if visit(lat, lon, a, b, c, d) {
                FoldWhile::Continue(())
            } else {
                FoldWhile::Done(())
            }
        })
        .is_done()
}

/// Parallel write-only pass over two aligned views.
///
/// Each cell writes only its own output slot; partitioning across
/// threads is handled by the array layer.
///
/// # Panics
///
/// Panics if the view shapes differ.
pub fn par_fill2<A, B, F>(src: ArrayView2<A>, dst: ArrayViewMut2<B>, fill: F)
where
    A: Sync,
    B: Send,
    F: Fn(usize, usize, &A, &mut B) + Send + Sync,
{
    assert_eq!(src.dim(), dst.dim(), "lockstep views must have equal shape");
    Zip::indexed(src)
        .and(dst)
        .par_for_each(|(lat, lon), a, b| fill(lat, lon, a, b));
}
