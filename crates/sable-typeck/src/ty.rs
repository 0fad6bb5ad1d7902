//! Type representation for the Sable type system.
//!
//! Defines the core [`Type`] enum and the entities hanging off it: packages,
//! type names, type parameters, method signatures, and the structural types
//! (structs, interfaces, pointers). Named types themselves live in
//! [`crate::named`]; everything here is the immutable material they are built
//! from.
//!
//! All composite types are shared through `Arc`, so a `Type` is cheap to
//! clone and reference cycles between named types are representable without
//! any lifetime bookkeeping.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use sable_common::Span;

use crate::named::Named;

// ── Packages and identities ────────────────────────────────────────────

/// A package -- the declaration scope of types and methods.
///
/// Packages are compared by import path, not by allocation, so separately
/// constructed handles to the same package behave identically.
#[derive(Debug)]
pub struct Package {
    name: String,
    path: String,
}

impl Package {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Arc<Self> {
        Arc::new(Package {
            name: name.into(),
            path: path.into(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Whether two package handles denote the same package.
pub fn same_package(a: &Arc<Package>, b: &Arc<Package>) -> bool {
    Arc::ptr_eq(a, b) || a.path == b.path
}

/// Whether a name is exported outside its declaring package.
/// Exported names begin with an uppercase letter.
pub fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// The identity record of a type declaration: its name, the package it was
/// declared in, and the source position of the declaration.
///
/// Instantiated named types carry a synthetic `TypeName` whose span records
/// the position of the instantiation rather than of any declaration.
#[derive(Clone, Debug)]
pub struct TypeName {
    name: String,
    pkg: Arc<Package>,
    span: Span,
}

impl TypeName {
    pub fn new(name: impl Into<String>, pkg: Arc<Package>, span: Span) -> Self {
        TypeName {
            name: name.into(),
            pkg,
            span,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pkg(&self) -> &Arc<Package> {
        &self.pkg
    }

    pub fn span(&self) -> Span {
        self.span
    }
}

// ── Type parameters ────────────────────────────────────────────────────

static NEXT_TYPE_PARAM_ID: AtomicU32 = AtomicU32::new(0);

/// A type parameter of a generic declaration, identified by a process-unique
/// `u32` id.
///
/// Substitution maps key on the id, so two parameters with the same name in
/// different declarations never collide.
#[derive(Debug)]
pub struct TypeParam {
    id: u32,
    name: String,
    span: Span,
}

impl TypeParam {
    pub fn new(name: impl Into<String>, span: Span) -> Arc<Self> {
        Arc::new(TypeParam {
            id: NEXT_TYPE_PARAM_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            span,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn span(&self) -> Span {
        self.span
    }
}

// ── Structural types ───────────────────────────────────────────────────

/// A predeclared basic type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BasicType {
    Int,
    Float,
    Bool,
    Str,
    Unit,
}

impl BasicType {
    pub fn name(self) -> &'static str {
        match self {
            BasicType::Int => "Int",
            BasicType::Float => "Float",
            BasicType::Bool => "Bool",
            BasicType::Str => "Str",
            BasicType::Unit => "Unit",
        }
    }
}

/// A named field of a struct type.
#[derive(Clone, Debug)]
pub struct Field {
    pub name: String,
    pub ty: Type,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Field {
            name: name.into(),
            ty,
        }
    }
}

/// A struct type: an ordered list of named fields.
#[derive(Debug)]
pub struct StructType {
    fields: Vec<Field>,
}

impl StructType {
    pub fn new(fields: Vec<Field>) -> Arc<Self> {
        Arc::new(StructType { fields })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }
}

/// An interface type: an ordered list of methods.
///
/// Method receivers point back at the named type the interface was declared
/// on; instantiation rebinds them to the instance (see
/// [`crate::named::Named`]).
#[derive(Debug)]
pub struct InterfaceType {
    methods: Vec<Arc<Method>>,
}

impl InterfaceType {
    pub fn new(methods: Vec<Arc<Method>>) -> Arc<Self> {
        Arc::new(InterfaceType { methods })
    }

    pub fn methods(&self) -> &[Arc<Method>] {
        &self.methods
    }
}

/// A pointer type.
#[derive(Debug)]
pub struct PointerType {
    base: Type,
}

impl PointerType {
    pub fn new(base: Type) -> Arc<Self> {
        Arc::new(PointerType { base })
    }

    pub fn base(&self) -> &Type {
        &self.base
    }
}

/// A declared type alias. Aliases are transparent: they forward to their
/// target everywhere except in display output.
///
/// An `AliasType` is immutable and its target must exist before the alias is
/// constructed, so cycles consisting purely of aliases cannot be built.
#[derive(Debug)]
pub struct AliasType {
    obj: TypeName,
    aliased: Type,
}

impl AliasType {
    pub fn new(obj: TypeName, aliased: Type) -> Arc<Self> {
        Arc::new(AliasType { obj, aliased })
    }

    pub fn obj(&self) -> &TypeName {
        &self.obj
    }

    pub fn aliased(&self) -> &Type {
        &self.aliased
    }
}

// ── Signatures and methods ─────────────────────────────────────────────

/// A function signature.
///
/// `recv` is set for methods; `recv_type_params` carries the receiver's type
/// parameters for methods declared on generic types. Method signatures are
/// complete at construction; checking signature bodies is a frontend concern.
#[derive(Clone, Debug)]
pub struct Signature {
    pub recv: Option<Type>,
    pub recv_type_params: Vec<Arc<TypeParam>>,
    pub params: Vec<Type>,
    pub result: Type,
}

impl Signature {
    /// A plain function signature with no receiver.
    pub fn new(params: Vec<Type>, result: Type) -> Self {
        Signature {
            recv: None,
            recv_type_params: Vec::new(),
            params,
            result,
        }
    }

    /// A method signature with the given receiver.
    pub fn method(
        recv: Type,
        recv_type_params: Vec<Arc<TypeParam>>,
        params: Vec<Type>,
        result: Type,
    ) -> Self {
        Signature {
            recv: Some(recv),
            recv_type_params,
            params,
            result,
        }
    }

    /// The receiver with any pointer indirection stripped, or `None` for a
    /// plain function.
    pub fn receiver_base(&self) -> Option<&Type> {
        match self.recv.as_ref()? {
            Type::Pointer(p) => Some(p.base()),
            t => Some(t),
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", p)?;
        }
        write!(f, ") -> {}", self.result)
    }
}

/// A declared method: a name, its declaring package, and a signature.
///
/// Methods are immutable and shared through `Arc`; instantiation produces a
/// new `Method` with a substituted signature rather than mutating the
/// original.
#[derive(Debug)]
pub struct Method {
    name: String,
    pkg: Arc<Package>,
    span: Span,
    sig: Signature,
}

impl Method {
    pub fn new(name: impl Into<String>, pkg: Arc<Package>, span: Span, sig: Signature) -> Arc<Self> {
        Arc::new(Method {
            name: name.into(),
            pkg,
            span,
            sig,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pkg(&self) -> &Arc<Package> {
        &self.pkg
    }

    pub fn span(&self) -> Span {
        self.span
    }

    pub fn sig(&self) -> &Signature {
        &self.sig
    }

    /// Whether the method was declared with a pointer receiver.
    pub fn has_ptr_recv(&self) -> bool {
        matches!(self.sig.recv, Some(Type::Pointer(_)))
    }

    /// A copy of this method carrying `sig` instead of the original
    /// signature.
    pub(crate) fn with_signature(&self, sig: Signature) -> Arc<Method> {
        Arc::new(Method {
            name: self.name.clone(),
            pkg: self.pkg.clone(),
            span: self.span,
            sig,
        })
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name, self.sig)
    }
}

// ── The Type enum ──────────────────────────────────────────────────────

/// A Sable type.
///
/// - `Basic`: a predeclared type (Int, Bool, ...)
/// - `Named`: an identity-bearing declared type or an instantiation of one
/// - `Alias`: a transparent declared alias
/// - `Param`: a type parameter of a generic declaration
/// - `Pointer`, `Struct`, `Interface`: structural types
/// - `Invalid`: the sentinel that broken declarations resolve to
#[derive(Clone, Debug)]
pub enum Type {
    Basic(BasicType),
    Named(Arc<Named>),
    Alias(Arc<AliasType>),
    Param(Arc<TypeParam>),
    Pointer(Arc<PointerType>),
    Struct(Arc<StructType>),
    Interface(Arc<InterfaceType>),
    Invalid,
}

impl Type {
    /// Create an `Int` type.
    pub fn int() -> Type {
        Type::Basic(BasicType::Int)
    }

    /// Create a `Bool` type.
    pub fn bool() -> Type {
        Type::Basic(BasicType::Bool)
    }

    /// Create a `Str` type.
    pub fn str() -> Type {
        Type::Basic(BasicType::Str)
    }

    /// Create a pointer to `base`.
    pub fn pointer(base: Type) -> Type {
        Type::Pointer(PointerType::new(base))
    }

    /// The named type behind `self`, if `self` is one.
    pub fn as_named(&self) -> Option<&Arc<Named>> {
        match self {
            Type::Named(n) => Some(n),
            _ => None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Type::Invalid)
    }
}

/// Follow alias indirection until a non-alias type is reached.
pub fn unalias(t: &Type) -> Type {
    let mut t = t.clone();
    while let Type::Alias(a) = &t {
        let next = a.aliased().clone();
        t = next;
    }
    t
}

// ── Identity ───────────────────────────────────────────────────────────

/// Structural type identity.
///
/// Declared named types are identical only to themselves. Instantiated named
/// types are identical when their origins are the same declaration and their
/// type arguments are pairwise identical; they need not share an allocation.
/// Aliases are transparent.
pub fn identical(a: &Type, b: &Type) -> bool {
    let a = unalias(a);
    let b = unalias(b);
    match (&a, &b) {
        (Type::Basic(x), Type::Basic(y)) => x == y,
        (Type::Invalid, Type::Invalid) => true,
        (Type::Param(x), Type::Param(y)) => x.id == y.id,
        (Type::Pointer(x), Type::Pointer(y)) => identical(x.base(), y.base()),
        (Type::Struct(x), Type::Struct(y)) => {
            x.fields().len() == y.fields().len()
                && x.fields()
                    .iter()
                    .zip(y.fields())
                    .all(|(f, g)| f.name == g.name && identical(&f.ty, &g.ty))
        }
        (Type::Interface(x), Type::Interface(y)) => {
            x.methods().len() == y.methods().len()
                && x.methods()
                    .iter()
                    .zip(y.methods())
                    .all(|(m, n)| m.name() == n.name() && identical_signature(m.sig(), n.sig()))
        }
        (Type::Named(x), Type::Named(y)) => identical_named(x, y),
        _ => false,
    }
}

/// Identity for named types; see [`identical`].
pub fn identical_named(a: &Arc<Named>, b: &Arc<Named>) -> bool {
    if Arc::ptr_eq(a, b) {
        return true;
    }
    match (a.instance_info(), b.instance_info()) {
        (Some(x), Some(y)) => {
            Arc::ptr_eq(&x.orig, &y.orig)
                && x.targs.len() == y.targs.len()
                && x.targs.iter().zip(&y.targs).all(|(s, t)| identical(s, t))
        }
        _ => false,
    }
}

fn identical_signature(a: &Signature, b: &Signature) -> bool {
    // Receivers are deliberately excluded: two interfaces declaring the same
    // method set are identical regardless of which named type they hang off.
    a.params.len() == b.params.len()
        && a.params.iter().zip(&b.params).all(|(s, t)| identical(s, t))
        && identical(&a.result, &b.result)
}

/// Feed a structural digest of `t` into `state`, consistent with
/// [`identical`]: identical types produce identical digests.
pub(crate) fn hash_type(t: &Type, state: &mut impl Hasher) {
    match unalias(t) {
        Type::Basic(b) => {
            0u8.hash(state);
            b.hash(state);
        }
        Type::Invalid => 1u8.hash(state),
        Type::Param(p) => {
            2u8.hash(state);
            p.id.hash(state);
        }
        Type::Pointer(p) => {
            3u8.hash(state);
            hash_type(p.base(), state);
        }
        Type::Struct(s) => {
            4u8.hash(state);
            s.fields().len().hash(state);
            for f in s.fields() {
                f.name.hash(state);
                hash_type(&f.ty, state);
            }
        }
        Type::Interface(i) => {
            5u8.hash(state);
            i.methods().len().hash(state);
            for m in i.methods() {
                m.name().hash(state);
                for p in &m.sig().params {
                    hash_type(p, state);
                }
                hash_type(&m.sig().result, state);
            }
        }
        Type::Named(n) => {
            6u8.hash(state);
            match n.instance_info() {
                Some(inst) => {
                    (Arc::as_ptr(&inst.orig) as usize).hash(state);
                    inst.targs.len().hash(state);
                    for a in &inst.targs {
                        hash_type(a, state);
                    }
                }
                None => (Arc::as_ptr(&n) as usize).hash(state),
            }
        }
        Type::Alias(_) => unreachable!("unalias returns a non-alias type"),
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Basic(b) => write!(f, "{}", b.name()),
            Type::Named(n) => write!(f, "{}", n),
            Type::Alias(a) => write!(f, "{}", a.obj().name()),
            Type::Param(p) => write!(f, "{}", p.name()),
            Type::Pointer(p) => write!(f, "*{}", p.base()),
            Type::Struct(s) => {
                write!(f, "struct {{")?;
                for (i, field) in s.fields().iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {}: {}", field.name, field.ty)?;
                }
                write!(f, " }}")
            }
            Type::Interface(iface) => {
                write!(f, "interface {{")?;
                for (i, m) in iface.methods().iter().enumerate() {
                    if i > 0 {
                        write!(f, ";")?;
                    }
                    write!(f, " {}", m)?;
                }
                write!(f, " }}")
            }
            Type::Invalid => write!(f, "<invalid>"),
        }
    }
}
