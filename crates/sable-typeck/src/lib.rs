//! Named-type resolution for the Sable compiler.
//!
//! This crate owns the representation of declared types and the machinery
//! that populates them lazily and concurrency-safely:
//! - [`ty`]: the [`Type`](ty::Type) enum, packages, type parameters,
//!   signatures, and structural identity
//! - [`named`]: the central [`Named`](named::Named) entity and its
//!   population protocol (unpack, underlying resolution, method expansion)
//! - [`context`]: the per-expansion memo table that keeps recursive generic
//!   instantiation finite
//! - [`loader`]: the capability interface for deferred population from
//!   external sources
//! - [`session`]: the boundary to the surrounding checker (diagnostics,
//!   configuration, end-of-check sweeping)
//!
//! A named type's identity exists from the moment it is constructed, so
//! mutually recursive declarations can reference each other freely; its
//! details (type parameters, RHS, underlying type, methods) materialize on
//! first demand, exactly once, no matter how many threads ask.

pub mod context;
pub mod error;
pub mod loader;
pub mod named;
pub mod session;
pub mod ty;

mod state;
mod subst;

pub use context::Context;
pub use error::TypeError;
pub use loader::{Deferred, Loaded, Loader};
pub use named::Named;
pub use session::{Config, Session};
pub use ty::{
    identical, identical_named, is_exported, same_package, unalias, AliasType, BasicType, Field,
    InterfaceType, Method, Package, PointerType, Signature, StructType, Type, TypeName, TypeParam,
};
