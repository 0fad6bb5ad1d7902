//! Type-parameter substitution over the structural type graph.
//!
//! Substitution is copy-on-write: subtrees that mention no mapped type
//! parameter are returned as-is (shared), and a new node is allocated only
//! on the path from a changed leaf up to the root. Encountering an
//! instantiated named type whose arguments change routes through the
//! expansion [`Context`], which is what keeps recursive instantiation
//! finite.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use sable_common::Span;

use crate::context::Context;
use crate::named::Named;
use crate::ty::{
    AliasType, Field, InterfaceType, Method, Signature, StructType, Type, TypeParam,
};

/// A mapping from type parameters to replacement types, keyed by parameter
/// id.
pub(crate) struct SubstMap {
    map: FxHashMap<u32, Type>,
}

impl SubstMap {
    pub(crate) fn new(tparams: &[Arc<TypeParam>], targs: &[Type]) -> Self {
        debug_assert_eq!(tparams.len(), targs.len());
        let map = tparams
            .iter()
            .zip(targs)
            .map(|(p, a)| (p.id(), a.clone()))
            .collect();
        SubstMap { map }
    }

    fn lookup(&self, p: &TypeParam) -> Option<&Type> {
        self.map.get(&p.id())
    }
}

/// One substitution pass: the map, the instance currently being expanded
/// (if any), and the expansion context instances are canonicalized in.
pub(crate) struct Subster<'a> {
    pos: Span,
    map: &'a SubstMap,
    expanding: Option<&'a Arc<Named>>,
    ctxt: &'a Arc<Context>,
}

impl<'a> Subster<'a> {
    pub(crate) fn new(
        pos: Span,
        map: &'a SubstMap,
        expanding: Option<&'a Arc<Named>>,
        ctxt: &'a Arc<Context>,
    ) -> Self {
        Subster {
            pos,
            map,
            expanding,
            ctxt,
        }
    }

    /// Substitute into `t`, sharing it unchanged when nothing applies.
    pub(crate) fn ty(&self, t: &Type) -> Type {
        self.ty_opt(t).unwrap_or_else(|| t.clone())
    }

    /// Substitute into `sig`, sharing its components when nothing applies.
    /// The receiver is carried over untouched; callers that need a rebound
    /// receiver install it afterwards.
    pub(crate) fn signature(&self, sig: &Signature) -> Signature {
        self.signature_opt(sig).unwrap_or_else(|| sig.clone())
    }

    // `None` means "unchanged" so parents can preserve sharing.
    fn ty_opt(&self, t: &Type) -> Option<Type> {
        match t {
            Type::Basic(_) | Type::Invalid => None,

            Type::Param(p) => self.map.lookup(p).cloned(),

            Type::Pointer(p) => self.ty_opt(p.base()).map(Type::pointer),

            Type::Alias(a) => self
                .ty_opt(a.aliased())
                .map(|target| Type::Alias(AliasType::new(a.obj().clone(), target))),

            Type::Struct(s) => {
                let mut changed = false;
                let fields: Vec<Field> = s
                    .fields()
                    .iter()
                    .map(|f| match self.ty_opt(&f.ty) {
                        Some(ty) => {
                            changed = true;
                            Field::new(f.name.clone(), ty)
                        }
                        None => f.clone(),
                    })
                    .collect();
                changed.then(|| Type::Struct(StructType::new(fields)))
            }

            Type::Interface(iface) => {
                let mut changed = false;
                let methods: Vec<Arc<Method>> = iface
                    .methods()
                    .iter()
                    .map(|m| match self.signature_opt(m.sig()) {
                        Some(sig) => {
                            changed = true;
                            m.with_signature(sig)
                        }
                        None => m.clone(),
                    })
                    .collect();
                changed.then(|| Type::Interface(InterfaceType::new(methods)))
            }

            Type::Named(n) => {
                // Only instantiations can mention mapped parameters through
                // their arguments; a declared type is its own identity and is
                // shared as-is.
                let inst = n.instance_info()?;
                let mut changed = false;
                let targs: Vec<Type> = inst
                    .targs
                    .iter()
                    .map(|a| match self.ty_opt(a) {
                        Some(t) => {
                            changed = true;
                            t
                        }
                        None => a.clone(),
                    })
                    .collect();
                changed.then(|| self.instantiate(&inst.orig, targs))
            }
        }
    }

    fn signature_opt(&self, sig: &Signature) -> Option<Signature> {
        let mut changed = false;
        let params: Vec<Type> = sig
            .params
            .iter()
            .map(|p| match self.ty_opt(p) {
                Some(t) => {
                    changed = true;
                    t
                }
                None => p.clone(),
            })
            .collect();
        let result = match self.ty_opt(&sig.result) {
            Some(t) => {
                changed = true;
                t
            }
            None => sig.result.clone(),
        };
        changed.then(|| Signature {
            recv: sig.recv.clone(),
            recv_type_params: sig.recv_type_params.clone(),
            params,
            result,
        })
    }

    /// Produce the instance of `orig` with `targs`, canonicalized through
    /// the expansion context. A hit may be an instance still mid-expansion;
    /// returning it unexpanded is exactly the short-circuit that terminates
    /// recursive instantiation.
    fn instantiate(&self, orig: &Arc<Named>, targs: Vec<Type>) -> Type {
        let key = Context::instance_hash(orig, &targs);
        if let Some(existing) = self.ctxt.lookup(key, orig, &targs) {
            return Type::Named(existing);
        }
        let fresh = Named::instance(orig, targs, self.pos, self.expanding);
        Type::Named(self.ctxt.update(key, &fresh))
    }
}
