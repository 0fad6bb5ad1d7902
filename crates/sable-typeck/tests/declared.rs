//! Integration tests for declared (non-instantiated) named types.
//!
//! These tests exercise:
//! - Underlying stability: repeated reads return the same resolved value
//! - The method table: ordering, duplicate suppression, the blank identifier
//! - Visibility rules for cross-package method lookup
//! - Type parameter mutation on generic declarations

use std::sync::Arc;

use sable_common::Span;
use sable_typeck::{
    identical, Field, Method, Named, Package, Signature, StructType, Type, TypeName, TypeParam,
};

// ── Helpers ────────────────────────────────────────────────────────────

fn pkg(name: &str, path: &str) -> Arc<Package> {
    Package::new(name, path)
}

fn tn(pkg: &Arc<Package>, name: &str, at: u32) -> TypeName {
    TypeName::new(name, pkg.clone(), Span::new(at, at + name.len() as u32))
}

fn point_struct() -> Type {
    Type::Struct(StructType::new(vec![
        Field::new("x", Type::int()),
        Field::new("y", Type::int()),
    ]))
}

fn method(pkg: &Arc<Package>, recv: &Arc<Named>, name: &str, result: Type) -> Arc<Method> {
    Method::new(
        name,
        pkg.clone(),
        Span::new(0, name.len() as u32),
        Signature::method(Type::Named(recv.clone()), Vec::new(), Vec::new(), result),
    )
}

// ── Underlying ─────────────────────────────────────────────────────────

/// Test 1: the underlying of a declared type is the structural type it was
/// declared with, and repeated reads share one allocation.
#[test]
fn test_underlying_is_stable() {
    let pkg = pkg("geo", "corp/geo");
    let t = Named::new(tn(&pkg, "Point", 0), Some(point_struct()), Vec::new());

    let u1 = t.underlying();
    let u2 = t.underlying();
    assert!(identical(&u1, &point_struct()));
    match (&u1, &u2) {
        (Type::Struct(a), Type::Struct(b)) => assert!(Arc::ptr_eq(a, b)),
        other => panic!("expected struct underlying, got {:?}", other),
    }
}

/// Test 2: an underlying type is never named, alias, or a type parameter.
#[test]
fn test_underlying_is_structural() {
    let pkg = pkg("geo", "corp/geo");
    let t = Named::new(tn(&pkg, "Point", 0), Some(point_struct()), Vec::new());
    assert!(!matches!(
        t.underlying(),
        Type::Named(_) | Type::Alias(_) | Type::Param(_)
    ));
}

// ── Method table ───────────────────────────────────────────────────────

/// Test 3: adding a method with an existing name is a no-op.
#[test]
fn test_add_method_suppresses_duplicates() {
    let pkg = pkg("geo", "corp/geo");
    let t = Named::new(tn(&pkg, "Point", 0), Some(point_struct()), Vec::new());

    t.add_method(method(&pkg, &t, "Norm", Type::int()));
    t.add_method(method(&pkg, &t, "Norm", Type::bool()));
    assert_eq!(t.method_count(), 1);
    assert!(identical(&t.method(0).sig().result, &Type::int()));
}

/// Test 4: the blank identifier never matches a method lookup, even when a
/// method carries that name.
#[test]
fn test_blank_identifier_never_matches() {
    let pkg = pkg("geo", "corp/geo");
    let t = Named::new(tn(&pkg, "Point", 0), Some(point_struct()), Vec::new());
    t.add_method(method(&pkg, &t, "_", Type::int()));

    assert_eq!(t.method_index("_", false), None);
    assert_eq!(t.method_index("_", true), None);
    assert!(t.lookup_method(&pkg, "_", false).is_none());
}

/// Test 5: method indices follow construction order.
#[test]
fn test_method_order_is_deterministic() {
    let pkg = pkg("geo", "corp/geo");
    let t = Named::new(tn(&pkg, "Point", 0), Some(point_struct()), Vec::new());
    t.add_method(method(&pkg, &t, "Norm", Type::int()));
    t.add_method(method(&pkg, &t, "Scale", Type::bool()));

    assert_eq!(t.method_index("Norm", false), Some(0));
    assert_eq!(t.method_index("Scale", false), Some(1));
    assert_eq!(t.method(1).name(), "Scale");
}

// ── Visibility ─────────────────────────────────────────────────────────

/// Test 6: unexported methods are invisible from other packages, exported
/// ones are visible everywhere, and fold-case lookup ignores visibility
/// (it exists to power "did you mean" suggestions).
#[test]
fn test_lookup_visibility_rules() {
    let home = pkg("geo", "corp/geo");
    let away = pkg("app", "corp/app");
    let t = Named::new(tn(&home, "Point", 0), Some(point_struct()), Vec::new());
    t.add_method(method(&home, &t, "Norm", Type::int()));
    t.add_method(method(&home, &t, "reset", Type::bool()));

    // Exported: visible from both packages.
    assert!(t.lookup_method(&home, "Norm", false).is_some());
    assert!(t.lookup_method(&away, "Norm", false).is_some());

    // Unexported: only visible from the declaring package.
    assert!(t.lookup_method(&home, "reset", false).is_some());
    assert!(t.lookup_method(&away, "reset", false).is_none());

    // Fold-case lookup sees everything, with any capitalization.
    let (i, m) = t.lookup_method(&away, "RESET", true).expect("fold-case hit");
    assert_eq!(i, 1);
    assert_eq!(m.name(), "reset");
}

// ── Type parameters ────────────────────────────────────────────────────

/// Test 7: set_type_params/type_params round-trip on a generic declaration.
#[test]
fn test_type_params_roundtrip() {
    let pkg = pkg("geo", "corp/geo");
    let t = Named::new(tn(&pkg, "Box", 0), None, Vec::new());
    let p = TypeParam::new("P", Span::new(4, 5));
    let q = TypeParam::new("Q", Span::new(6, 7));
    t.set_type_params(vec![p.clone(), q.clone()]);

    let tps = t.type_params();
    assert_eq!(tps.len(), 2);
    assert!(Arc::ptr_eq(&tps[0], &p));
    assert!(Arc::ptr_eq(&tps[1], &q));
}
