//! Scoped memo table for generic instantiation.
//!
//! A [`Context`] canonicalizes instances per `(origin, type arguments)` key
//! within one root expansion. Substitution is structural, so the set of
//! distinct keys reachable while expanding a single instance is finite;
//! any repeated key therefore marks a reference cycle, and the table lets
//! expansion short-circuit onto the already-registered (possibly still
//! incomplete) instance instead of recursing forever.
//!
//! Contexts are created lazily when an expansion first needs one, shared by
//! the instances created during that expansion, and dropped by the last
//! holder once every method has been expanded. They are never global.

use std::hash::Hasher;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHasher};

use crate::named::Named;
use crate::ty::{hash_type, identical, Type};

pub struct Context {
    // Buckets keyed by structural hash; entries within a bucket are
    // disambiguated with `identical`, so hash collisions are harmless.
    map: Mutex<FxHashMap<u64, Vec<Arc<Named>>>>,
}

impl Context {
    pub fn new() -> Arc<Self> {
        Arc::new(Context {
            map: Mutex::new(FxHashMap::default()),
        })
    }

    /// The structural hash of an `(origin, type arguments)` pair. Identical
    /// pairs hash identically regardless of how their arguments were built.
    pub(crate) fn instance_hash(orig: &Arc<Named>, targs: &[Type]) -> u64 {
        let mut h = FxHasher::default();
        h.write_usize(Arc::as_ptr(orig) as usize);
        h.write_usize(targs.len());
        for t in targs {
            hash_type(t, &mut h);
        }
        h.finish()
    }

    /// The instance registered for `(orig, targs)`, if any.
    pub(crate) fn lookup(&self, key: u64, orig: &Arc<Named>, targs: &[Type]) -> Option<Arc<Named>> {
        let map = self.map.lock();
        map.get(&key)?
            .iter()
            .find(|entry| matches(entry, orig, targs))
            .cloned()
    }

    /// Register `n` for its key unless an equivalent instance is already
    /// present, and return the canonical instance. The first registrant wins;
    /// racing creators receive the earlier registration.
    pub(crate) fn update(&self, key: u64, n: &Arc<Named>) -> Arc<Named> {
        let inst = n.instance_info().expect("only instances are registered");
        let mut map = self.map.lock();
        let bucket = map.entry(key).or_default();
        if let Some(existing) = bucket
            .iter()
            .find(|entry| matches(entry, &inst.orig, &inst.targs))
        {
            return existing.clone();
        }
        bucket.push(n.clone());
        n.clone()
    }
}

fn matches(entry: &Arc<Named>, orig: &Arc<Named>, targs: &[Type]) -> bool {
    let Some(inst) = entry.instance_info() else {
        return false;
    };
    Arc::ptr_eq(&inst.orig, orig)
        && inst.targs.len() == targs.len()
        && inst.targs.iter().zip(targs).all(|(a, b)| identical(a, b))
}
