//! Deferred population of named types from external sources.
//!
//! A [`Loader`] is the capability handed to [`crate::named::Named`] when a
//! type's details live elsewhere (an imported compilation unit, typically)
//! and should only be computed on first demand.

use std::sync::Arc;

use crate::named::Named;
use crate::ty::{Method, Type, TypeParam};

/// A zero-argument callback returned by a loader, run once its type has been
/// marked loaded and the type's lock has been released. Callbacks may
/// re-enter the type they were produced for.
pub type Deferred = Box<dyn FnOnce() + Send>;

/// Everything a loader produces for one type.
pub struct Loaded {
    pub type_params: Vec<Arc<TypeParam>>,
    /// The declaration RHS. May reference other named types; resolution to a
    /// structural underlying type happens separately.
    pub rhs: Type,
    pub methods: Vec<Arc<Method>>,
    pub deferred: Vec<Deferred>,
}

/// Lazily populates a named type. `populate` is invoked at most once per
/// type, inside that type's exclusive section; it must not call back into
/// accessors of the type it is populating. Failures are reported to the
/// surrounding session as diagnostics, with degraded (`Type::Invalid`) data
/// returned in place of the missing details -- a loader must not panic
/// across this boundary.
pub trait Loader: Send + Sync {
    fn populate(&self, ty: &Arc<Named>) -> Loaded;
}

impl<F> Loader for F
where
    F: Fn(&Arc<Named>) -> Loaded + Send + Sync,
{
    fn populate(&self, ty: &Arc<Named>) -> Loaded {
        self(ty)
    }
}
