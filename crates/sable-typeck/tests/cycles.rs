//! Integration tests for cycle detection during underlying resolution.
//!
//! These tests exercise:
//! - Mutual and self cycles terminating with one diagnostic
//! - Declaration-order rotation of the reported path
//! - Degradation of every cycle member to the invalid sentinel
//! - Chains with a non-cyclic prefix, and aliases inside chains

use std::sync::{Arc, OnceLock};

use insta::assert_snapshot;
use sable_common::Span;
use sable_typeck::{
    identical, AliasType, Config, Field, Loaded, Named, Package, Session, StructType, Type,
    TypeError, TypeName,
};

// ── Helpers ────────────────────────────────────────────────────────────

fn pkg(name: &str, path: &str) -> Arc<Package> {
    Package::new(name, path)
}

fn tn(pkg: &Arc<Package>, name: &str, at: u32) -> TypeName {
    TypeName::new(name, pkg.clone(), Span::new(at, at + name.len() as u32))
}

/// A loader whose RHS is resolved from `slot` at load time, so mutually
/// recursive declarations can be wired up after construction.
fn forward_loader(slot: &Arc<OnceLock<Arc<Named>>>) -> Box<dyn sable_typeck::Loader> {
    let slot = slot.clone();
    Box::new(move |_: &Arc<Named>| Loaded {
        type_params: Vec::new(),
        rhs: Type::Named(slot.get().expect("declaration wired up").clone()),
        methods: Vec::new(),
        deferred: Vec::new(),
    })
}

fn payload_struct() -> Type {
    Type::Struct(StructType::new(vec![Field::new("n", Type::int())]))
}

// ── Cycles ─────────────────────────────────────────────────────────────

/// Test 1: A -> B -> A reports exactly one cycle and degrades both members
/// to the invalid sentinel; resolution terminates.
#[test]
fn test_mutual_cycle() {
    let session = Session::new(Config::default());
    let p = pkg("m", "corp/m");

    let b_slot: Arc<OnceLock<Arc<Named>>> = Arc::new(OnceLock::new());
    let a = session.loader_bound(tn(&p, "A", 0), forward_loader(&b_slot));
    let b = {
        let a = a.clone();
        session.loader_bound(
            tn(&p, "B", 20),
            Box::new(move |_: &Arc<Named>| Loaded {
                type_params: Vec::new(),
                rhs: Type::Named(a.clone()),
                methods: Vec::new(),
                deferred: Vec::new(),
            }),
        )
    };
    let _ = b_slot.set(b.clone());

    assert!(a.underlying().is_invalid());
    assert!(b.underlying().is_invalid());

    let errs = session.diagnostics();
    assert_eq!(errs.len(), 1, "one diagnostic per cycle: {:?}", errs);
    assert_snapshot!(errs[0].to_string(), @"invalid recursive type: A -> B -> A");
}

/// Test 2: the reported path starts at the declaration appearing first in
/// the source, regardless of which member was resolved first.
#[test]
fn test_cycle_path_rotates_to_first_declaration() {
    let session = Session::new(Config::default());
    let p = pkg("m", "corp/m");

    let b_slot: Arc<OnceLock<Arc<Named>>> = Arc::new(OnceLock::new());
    let a = session.loader_bound(tn(&p, "A", 0), forward_loader(&b_slot));
    let b = {
        let a = a.clone();
        session.loader_bound(
            tn(&p, "B", 20),
            Box::new(move |_: &Arc<Named>| Loaded {
                type_params: Vec::new(),
                rhs: Type::Named(a.clone()),
                methods: Vec::new(),
                deferred: Vec::new(),
            }),
        )
    };
    let _ = b_slot.set(b.clone());

    // Resolve from B: the walk encounters B first, but A declares earlier.
    assert!(b.underlying().is_invalid());

    let errs = session.diagnostics();
    assert_eq!(errs.len(), 1);
    match &errs[0] {
        TypeError::Cycle { path, span } => {
            assert_eq!(path, &vec!["A".to_owned(), "B".to_owned()]);
            assert_eq!(*span, Span::new(0, 1));
        }
        other => panic!("expected cycle diagnostic, got {:?}", other),
    }
}

/// Test 3: a type whose RHS is itself.
#[test]
fn test_self_cycle() {
    let session = Session::new(Config::default());
    let p = pkg("m", "corp/m");

    let slot: Arc<OnceLock<Arc<Named>>> = Arc::new(OnceLock::new());
    let a = session.loader_bound(tn(&p, "Loop", 0), forward_loader(&slot));
    let _ = slot.set(a.clone());

    assert!(a.underlying().is_invalid());
    let errs = session.diagnostics();
    assert_eq!(errs.len(), 1);
    assert_snapshot!(errs[0].to_string(), @"invalid recursive type: Loop -> Loop");
}

/// Test 4: a non-cyclic prefix pointing into a cycle degrades along with
/// the cycle, under the cycle's single diagnostic.
#[test]
fn test_chain_into_cycle_degrades_prefix() {
    let session = Session::new(Config::default());
    let p = pkg("m", "corp/m");

    let b_slot: Arc<OnceLock<Arc<Named>>> = Arc::new(OnceLock::new());
    let a = session.loader_bound(tn(&p, "A", 10), forward_loader(&b_slot));
    let b = {
        let a = a.clone();
        session.loader_bound(
            tn(&p, "B", 20),
            Box::new(move |_: &Arc<Named>| Loaded {
                type_params: Vec::new(),
                rhs: Type::Named(a.clone()),
                methods: Vec::new(),
                deferred: Vec::new(),
            }),
        )
    };
    let _ = b_slot.set(b);
    let c = {
        let a = a.clone();
        session.loader_bound(
            tn(&p, "C", 0),
            Box::new(move |_: &Arc<Named>| Loaded {
                type_params: Vec::new(),
                rhs: Type::Named(a.clone()),
                methods: Vec::new(),
                deferred: Vec::new(),
            }),
        )
    };

    assert!(c.underlying().is_invalid());
    assert!(a.underlying().is_invalid());

    let errs = session.diagnostics();
    assert_eq!(errs.len(), 1);
    match &errs[0] {
        // C is not part of the cycle even though it resolves to invalid.
        TypeError::Cycle { path, .. } => {
            assert_eq!(path, &vec!["A".to_owned(), "B".to_owned()])
        }
        other => panic!("expected cycle diagnostic, got {:?}", other),
    }
}

/// Test 5: aliases are followed transparently inside a resolution chain.
#[test]
fn test_alias_in_chain() {
    let session = Session::new(Config::default());
    let p = pkg("m", "corp/m");

    let base = session.declared(tn(&p, "Base", 0), Some(payload_struct()), Vec::new());
    let alias = AliasType::new(tn(&p, "Shortcut", 20), Type::Named(base.clone()));
    let t = {
        let alias = alias.clone();
        session.loader_bound(
            tn(&p, "Top", 40),
            Box::new(move |_: &Arc<Named>| Loaded {
                type_params: Vec::new(),
                rhs: Type::Alias(alias.clone()),
                methods: Vec::new(),
                deferred: Vec::new(),
            }),
        )
    };

    let u = t.underlying();
    assert!(identical(&u, &base.underlying()));
    assert!(session.diagnostics().is_empty());

    // Resolution adopted the memoized value instead of recomputing it.
    match (&u, &base.underlying()) {
        (Type::Struct(x), Type::Struct(y)) => assert!(Arc::ptr_eq(x, y)),
        other => panic!("expected struct underlying, got {:?}", other),
    }
}
