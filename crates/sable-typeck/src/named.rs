//! Lazy, concurrency-safe resolution of named (declared) types.
//!
//! Named types are subtle to populate: they may be mutually recursive, their
//! details may arrive from an external loader long after their identity was
//! created, and instantiations of generic types are produced on demand --
//! possibly while the origin declaration is itself still being checked. A
//! [`Named`] therefore splits its information in two:
//!
//! - identity, available immediately: the declaring [`TypeName`] and, for
//!   instances, the type arguments;
//! - details, populated lazily: type parameters, the declaration RHS, the
//!   resolved underlying type, and the method table.
//!
//! Details come from exactly one of three origins, normalized by
//! [`Named::unpack`]: a direct declaration (everything supplied up front),
//! a [`Loader`] (computed once on first demand), or expansion of a generic
//! origin (a synthetic RHS built by substituting type arguments, methods
//! expanded one index at a time). After checking finishes, types may be
//! queried from multiple threads; a per-type lock plus an atomic state bit
//! set (see [`crate::state`]) guarantee each population step runs exactly
//! once, with lock-free fast paths once the work is done.
//!
//! Instances created while expanding an instance share a [`Context`], so a
//! recursive instantiation encountered mid-substitution finds the
//! in-progress entry and short-circuits instead of recursing forever. Once
//! an instance is fully expanded its context reference is dropped to unpin
//! the table, though the context may live on in other incomplete instances
//! of the same expansion.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use sable_common::Span;

use crate::context::Context;
use crate::loader::{Loaded, Loader};
use crate::session::Session;
use crate::state::{TypeState, HAS_METHODS, HAS_UNDER, LOADED, UNPACKED};
use crate::subst::{SubstMap, Subster};
use crate::ty::{is_exported, same_package, InterfaceType, Method, Package, Type, TypeName, TypeParam};

/// An identity-bearing declared type, or an instantiation of one.
pub struct Named {
    /// The declaring type name. For instances this is a synthetic
    /// placeholder recording the instantiation position; [`Named::ident`]
    /// resolves to the origin's name.
    obj: TypeName,
    /// Instantiation details; `None` for declared and loader-bound types.
    inst: Option<InstanceInfo>,
    state: TypeState,
    session: Weak<Session>,
    data: Mutex<NamedData>,
}

/// The immutable half of an instantiation, plus the expansion context it
/// shares with the other instances of its lineage.
pub(crate) struct InstanceInfo {
    pub(crate) orig: Arc<Named>,
    pub(crate) targs: Vec<Type>,
    ctxt: Mutex<Option<Arc<Context>>>,
}

impl InstanceInfo {
    fn context(&self) -> Option<Arc<Context>> {
        self.ctxt.lock().clone()
    }

    fn ensure_context(&self) -> Arc<Context> {
        self.ctxt.lock().get_or_insert_with(Context::new).clone()
    }

    fn release_context(&self) {
        *self.ctxt.lock() = None;
    }
}

/// The lazily populated fields, guarded by the type's exclusive lock.
#[derive(Default)]
struct NamedData {
    /// The declaration RHS, kept raw for cycle detection. Set exactly once.
    from_rhs: Option<Type>,
    type_params: Vec<Arc<TypeParam>>,
    /// The resolved underlying type; never `Named`, `Alias`, or `Param`.
    underlying: Option<Type>,
    /// Method slots. Declared types fill every slot up front; instances fill
    /// them one at a time as methods are first accessed.
    methods: Vec<Option<Arc<Method>>>,
    loader: Option<Box<dyn Loader>>,
    expanded_methods: usize,
    /// True until `set_underlying` runs; guards against double-setting.
    allow_missing_underlying: bool,
}

impl Named {
    // ── Construction ───────────────────────────────────────────────────

    /// A declared type. With `underlying` present the type is complete
    /// immediately; with `None` the type's identity exists for recursive
    /// references, but reading its underlying before [`Named::set_underlying`]
    /// is a contract violation.
    pub fn new(obj: TypeName, underlying: Option<Type>, methods: Vec<Arc<Method>>) -> Arc<Named> {
        Self::declared(obj, underlying, methods, Weak::new())
    }

    pub(crate) fn declared(
        obj: TypeName,
        underlying: Option<Type>,
        methods: Vec<Arc<Method>>,
        session: Weak<Session>,
    ) -> Arc<Named> {
        let n = Arc::new(Named {
            obj,
            inst: None,
            state: TypeState::new(),
            session,
            data: Mutex::new(NamedData {
                methods: methods.into_iter().map(Some).collect(),
                allow_missing_underlying: true,
                ..NamedData::default()
            }),
        });
        if let Some(u) = underlying {
            n.set_underlying(u);
        }
        n
    }

    /// A type whose details are computed by `loader` on first demand.
    pub fn loader_bound(obj: TypeName, loader: Box<dyn Loader>) -> Arc<Named> {
        Self::with_loader(obj, loader, Weak::new())
    }

    pub(crate) fn with_loader(
        obj: TypeName,
        loader: Box<dyn Loader>,
        session: Weak<Session>,
    ) -> Arc<Named> {
        Arc::new(Named {
            obj,
            inst: None,
            state: TypeState::new(),
            session,
            data: Mutex::new(NamedData {
                loader: Some(loader),
                allow_missing_underlying: true,
                ..NamedData::default()
            }),
        })
    }

    /// An instantiation of the generic type `origin` with `targs`, recording
    /// `pos` as the position of the instantiation. `expanding`, when given,
    /// is the instance whose expansion triggered this creation; its context
    /// is adopted so cycle protection extends through the whole lineage.
    pub fn instance(
        origin: &Arc<Named>,
        targs: Vec<Type>,
        pos: Span,
        expanding: Option<&Arc<Named>>,
    ) -> Arc<Named> {
        let session = origin.session.clone();
        Self::instantiated(origin, targs, pos, expanding, session)
    }

    pub(crate) fn instantiated(
        origin: &Arc<Named>,
        targs: Vec<Type>,
        pos: Span,
        expanding: Option<&Arc<Named>>,
        session: Weak<Session>,
    ) -> Arc<Named> {
        assert!(
            origin.inst.is_none(),
            "the origin of an instance must be a declared type"
        );
        assert!(!targs.is_empty(), "an instantiation requires type arguments");

        let obj = TypeName::new(origin.obj.name().to_owned(), origin.obj.pkg().clone(), pos);

        // Reference cycles are only possible within one package; adopting
        // the expanding instance's context across packages would couple
        // unrelated expansions.
        let ctxt = match expanding {
            Some(e) if same_package(e.obj.pkg(), obj.pkg()) => {
                let e_inst = e
                    .instance_info()
                    .expect("the expanding type must be an instance");
                e_inst.context()
            }
            _ => None,
        };

        Arc::new(Named {
            obj,
            inst: Some(InstanceInfo {
                orig: origin.clone(),
                targs,
                ctxt: Mutex::new(ctxt),
            }),
            state: TypeState::new(),
            session,
            data: Mutex::new(NamedData {
                allow_missing_underlying: true,
                ..NamedData::default()
            }),
        })
    }

    // ── Identity accessors (no population required) ────────────────────

    /// The type name of the declaration defining this type. For instances
    /// this is the origin's type name; the synthetic placeholder only
    /// records the instantiation position.
    pub fn ident(&self) -> &TypeName {
        match &self.inst {
            Some(inst) => &inst.orig.obj,
            None => &self.obj,
        }
    }

    /// The position this type was declared or instantiated at.
    pub fn pos(&self) -> Span {
        self.obj.span()
    }

    /// The generic type this instance was derived from, or `self` for
    /// non-instantiated types.
    pub fn origin(self: &Arc<Self>) -> Arc<Named> {
        match &self.inst {
            Some(inst) => inst.orig.clone(),
            None => self.clone(),
        }
    }

    pub fn is_instance(&self) -> bool {
        self.inst.is_some()
    }

    /// The type arguments this instance was created with; empty for
    /// non-instantiated types.
    pub fn type_args(&self) -> Vec<Type> {
        match &self.inst {
            Some(inst) => inst.targs.clone(),
            None => Vec::new(),
        }
    }

    pub(crate) fn instance_info(&self) -> Option<&InstanceInfo> {
        self.inst.as_ref()
    }

    // ── Population ─────────────────────────────────────────────────────

    /// Populate type parameters, RHS, and the method list.
    ///
    /// Exactly one of three things happens, depending on how the type was
    /// created: an instance expands a synthetic RHS from its origin (methods
    /// stay individually lazy); a loader-bound type invokes its loader; and
    /// a plain declared type records the no-op transition. The population
    /// logic runs at most once system-wide no matter how many threads race
    /// here; losers observe the state bits and return on the fast path.
    pub(crate) fn unpack(self: &Arc<Self>) {
        if self.state.has(LOADED | UNPACKED) {
            return;
        }

        let mut data = self.data.lock();
        // Another thread may have finished while we waited on the lock.
        if self.state.has(LOADED | UNPACKED) {
            return;
        }

        if let Some(inst) = &self.inst {
            debug_assert!(data.from_rhs.is_none(), "instances are not declared types");
            debug_assert!(data.loader.is_none(), "instances cannot be loader-bound");

            inst.orig.unpack();

            data.from_rhs = Some(self.expand_rhs());
            data.type_params = inst.orig.type_params();

            if inst.orig.method_count() == 0 {
                // Nothing to expand lazily.
                self.state.advance(LOADED | UNPACKED | HAS_METHODS);
                inst.release_context();
            } else {
                self.state.advance(LOADED | UNPACKED);
            }
            return;
        }

        if let Some(loader) = data.loader.take() {
            debug_assert!(data.from_rhs.is_none(), "loader-bound type populated twice");
            debug!(ty = self.obj.name(), "populating type from loader");

            let Loaded {
                type_params,
                rhs,
                methods,
                deferred,
            } = loader.populate(self);

            data.type_params = type_params;
            data.from_rhs = Some(rhs);
            data.methods = methods.into_iter().map(Some).collect();

            // Mark loaded, then run the deferred work with the lock
            // released: a callback that re-enters this type hits the fast
            // path instead of deadlocking on our own lock.
            self.state.advance(LOADED);
            drop(data);
            for f in deferred {
                f();
            }
            let _data = self.data.lock();
            self.state.advance(UNPACKED | HAS_METHODS);
            return;
        }

        // Fully supplied at construction; formalize the no-op transition.
        self.state.advance(LOADED | UNPACKED | HAS_METHODS);
    }

    /// The raw declaration RHS. Only meaningful once unpacked; a type whose
    /// RHS was never supplied reads as invalid.
    pub(crate) fn rhs(&self) -> Type {
        debug_assert!(self.state.has(LOADED | UNPACKED));
        self.data.lock().from_rhs.clone().unwrap_or(Type::Invalid)
    }

    /// Build the synthetic RHS of an instance from its origin's RHS.
    ///
    /// The instance is registered in the expansion context *before*
    /// substitution runs, so a self-referential instantiation reached during
    /// substitution finds the in-progress entry and short-circuits.
    fn expand_rhs(self: &Arc<Self>) -> Type {
        let inst = self
            .inst
            .as_ref()
            .expect("expand_rhs on a non-instantiated type");

        debug_assert!(!self.state.has(UNPACKED));
        debug_assert!(inst.orig.state.has(UNPACKED));

        if self.trace_on() {
            trace!(ty = %self, "expanding synthetic rhs");
        }

        let ctxt = inst.ensure_context();

        let targs = &inst.targs;
        let tparams = inst.orig.type_params();
        if targs.len() != tparams.len() {
            // Malformed instantiation; the arity error was already
            // diagnosed upstream.
            return Type::Invalid;
        }

        let key = Context::instance_hash(&inst.orig, targs);
        let canonical = ctxt.update(key, self);
        debug_assert!(Arc::ptr_eq(&canonical, self));

        let map = SubstMap::new(&tparams, targs);
        let subster = Subster::new(self.obj.span(), &map, Some(self), &ctxt);
        let rhs = subster.ty(&inst.orig.rhs());

        self.rebind_interface_receivers(rhs, &inst.orig)
    }

    /// Interface methods carry the origin as receiver; point them at this
    /// instance instead. When substitution left the origin's own interface
    /// value untouched, a fresh interface is built so the shared origin is
    /// never mutated.
    fn rebind_interface_receivers(self: &Arc<Self>, rhs: Type, orig: &Arc<Named>) -> Type {
        let Type::Interface(iface) = &rhs else {
            return rhs;
        };
        let mut changed = false;
        let methods: Vec<Arc<Method>> = iface
            .methods()
            .iter()
            .map(|m| {
                let points_at_origin = matches!(
                    m.sig().receiver_base(),
                    Some(Type::Named(base)) if Arc::ptr_eq(base, orig)
                );
                if !points_at_origin {
                    return m.clone();
                }
                changed = true;
                let mut sig = m.sig().clone();
                sig.recv = Some(if m.has_ptr_recv() {
                    Type::pointer(Type::Named(self.clone()))
                } else {
                    Type::Named(self.clone())
                });
                m.with_signature(sig)
            })
            .collect();
        if changed {
            Type::Interface(InterfaceType::new(methods))
        } else {
            rhs
        }
    }

    // ── Type parameters ────────────────────────────────────────────────

    /// The type parameters of the declaration. Present on an instance too:
    /// instances share their origin's parameter list.
    pub fn type_params(self: &Arc<Self>) -> Vec<Arc<TypeParam>> {
        self.unpack();
        self.data.lock().type_params.clone()
    }

    /// Set the type parameters. Not legal on instances.
    pub fn set_type_params(self: &Arc<Self>, tparams: Vec<Arc<TypeParam>>) {
        assert!(
            self.inst.is_none(),
            "cannot set type parameters of an instantiated type"
        );
        self.unpack();
        self.data.lock().type_params = tparams;
    }

    // ── Methods ────────────────────────────────────────────────────────

    /// The number of methods declared for this type (shared with every
    /// instance of the same origin).
    pub fn method_count(self: &Arc<Self>) -> usize {
        let origin = self.origin();
        origin.unpack();
        let count = origin.data.lock().methods.len();
        count
    }

    /// The `i`-th declared method. For instances the method is expanded --
    /// its signature substituted and its receiver rebound -- on first
    /// access, then cached at that index.
    ///
    /// Indices are deterministic for a given construction sequence but the
    /// specific ordering carries no further contract.
    pub fn method(self: &Arc<Self>, i: usize) -> Arc<Method> {
        self.unpack();

        if self.state.has(HAS_METHODS) {
            return self.data.lock().methods[i]
                .clone()
                .expect("complete method table");
        }

        let inst = self
            .inst
            .as_ref()
            .expect("only instances have unexpanded methods");
        let orig_count = inst.orig.method_count();

        let mut data = self.data.lock();
        if data.methods.len() != orig_count {
            debug_assert!(data.methods.is_empty());
            data.methods = vec![None; orig_count];
        }

        if data.methods[i].is_none() {
            let expanded = self.expand_method(i);
            data.methods[i] = Some(expanded);
            data.expanded_methods += 1;

            if data.expanded_methods == orig_count {
                self.state.advance(HAS_METHODS);
                inst.release_context();
            }
        }

        data.methods[i].clone().expect("just expanded")
    }

    /// Substitute type arguments into the `i`-th origin method for this
    /// instance's receiver.
    fn expand_method(self: &Arc<Self>, i: usize) -> Arc<Method> {
        let inst = self
            .inst
            .as_ref()
            .expect("expand_method on a non-instantiated type");
        let origm = inst.orig.method(i);

        if self.trace_on() {
            trace!(ty = %self, method = origm.name(), "expanding method");
        }

        // Identity instantiation: the origin method's receiver base is
        // already this instance (a generic type's own methods mention the
        // receiver with its own type parameters as arguments). Returning
        // the origin method keeps method -> receiver type -> method
        // round-trips on one object.
        let identity = matches!(
            origm.sig().receiver_base(),
            Some(Type::Named(rbase)) if Arc::ptr_eq(rbase, self)
        );
        if identity {
            return origm;
        }

        let orig_sig = origm.sig();
        let mut sig = orig_sig.clone();
        if orig_sig.recv_type_params.len() == inst.targs.len() {
            let ctxt = inst
                .context()
                .expect("context held until every method is expanded");
            let map = SubstMap::new(&orig_sig.recv_type_params, &inst.targs);
            let subster = Subster::new(origm.span(), &map, Some(self), &ctxt);
            sig = subster.signature(orig_sig);
        }
        // A count mismatch means invalid source; the original signature is
        // reused verbatim.

        sig.recv = Some(if origm.has_ptr_recv() {
            Type::pointer(Type::Named(self.clone()))
        } else {
            Type::Named(self.clone())
        });
        origm.with_signature(sig)
    }

    /// Add a method unless one with the same name exists. The method must be
    /// declared in the same package; not legal on instances.
    pub fn add_method(self: &Arc<Self>, m: Arc<Method>) {
        assert!(
            same_package(self.obj.pkg(), m.pkg()),
            "method package must match its receiver's package"
        );
        assert!(
            self.inst.is_none(),
            "cannot add a method to an instantiated type"
        );
        self.unpack();
        let mut data = self.data.lock();
        if method_index_in(&data.methods, m.name(), false).is_none() {
            data.methods.push(Some(m));
        }
    }

    /// The index of the method named `name`, or `None`. The blank identifier
    /// `_` never matches. With `fold_case`, capitalization is ignored.
    pub fn method_index(&self, name: &str, fold_case: bool) -> Option<usize> {
        method_index_in(&self.data.lock().methods, name, fold_case)
    }

    /// Look up a method by name on behalf of code in package `from`.
    ///
    /// A match is only permitted when `from` is the declaring package, the
    /// name is exported, or `fold_case` was requested (fold-case lookup
    /// exists to power "did you mean" suggestions and ignores visibility).
    /// The index is resolved against the origin -- it is stable across all
    /// instances -- and the returned method is this type's expansion of that
    /// index.
    pub fn lookup_method(
        self: &Arc<Self>,
        from: &Arc<Package>,
        name: &str,
        fold_case: bool,
    ) -> Option<(usize, Arc<Method>)> {
        self.unpack();
        if !(same_package(self.obj.pkg(), from) || is_exported(name) || fold_case) {
            return None;
        }
        let i = self.origin().method_index(name, fold_case)?;
        Some((i, self.method(i)))
    }

    // ── Underlying resolution ──────────────────────────────────────────

    /// Set the underlying type. Legal exactly once, only on
    /// non-instantiated types; `u` must already be structural.
    pub fn set_underlying(&self, u: Type) {
        assert!(
            self.inst.is_none(),
            "cannot set the underlying of an instantiated type"
        );
        assert!(
            u.as_named().is_none(),
            "underlying type must not be a named type"
        );
        assert!(
            !matches!(u, Type::Alias(_)),
            "underlying type must not be an alias"
        );
        assert!(
            !matches!(u, Type::Param(_)),
            "underlying type must not be a type parameter"
        );

        let mut data = self.data.lock();
        assert!(data.allow_missing_underlying, "underlying type already set");

        data.from_rhs = Some(u.clone());
        self.state.advance(LOADED | UNPACKED | HAS_METHODS);

        data.underlying = Some(u);
        data.allow_missing_underlying = false;
        self.state.advance(HAS_UNDER);
    }

    /// The underlying type, with all named and alias indirection resolved.
    /// Never `Named`, `Alias`, or `Param`; broken declarations resolve to
    /// [`Type::Invalid`].
    pub fn underlying(self: &Arc<Self>) -> Type {
        self.unpack();

        if !self.state.has(HAS_UNDER) {
            {
                let data = self.data.lock();
                if data.from_rhs.is_none() {
                    panic!(
                        "underlying of `{}` requested before set_underlying",
                        self.obj.name()
                    );
                }
            }
            self.resolve_underlying();
        }

        self.data
            .lock()
            .underlying
            .clone()
            .expect("underlying resolved")
    }

    /// Compute and memoize the underlying type by walking the RHS chain
    /// through aliases and named types.
    ///
    /// The walk holds no lock. Afterwards every named type visited is locked
    /// individually and the result stored only if a concurrent resolver did
    /// not get there first -- overlapping chains converge to the same value,
    /// so the first write wins and later writes are no-ops.
    fn resolve_underlying(self: &Arc<Self>) {
        debug_assert!(self.state.has(UNPACKED));

        let mut seen: Vec<Arc<Named>> = Vec::new();
        let mut cursor = Type::Named(self.clone());
        let resolved = loop {
            match cursor {
                Type::Alias(a) => {
                    cursor = a.aliased().clone();
                }
                Type::Named(t) => {
                    if let Some(i) = seen.iter().position(|s| Arc::ptr_eq(s, &t)) {
                        // Every declaration from the first repeated one
                        // onwards is part of the cycle.
                        self.report_cycle(&seen[i..]);
                        break Type::Invalid;
                    }
                    if t.state.has(HAS_UNDER) {
                        break t
                            .data
                            .lock()
                            .underlying
                            .clone()
                            .expect("memoized underlying");
                    }
                    seen.push(t.clone());
                    t.unpack();
                    cursor = t.rhs();
                }
                // A type parameter cannot be an underlying type; reaching
                // one here means the declaration was already diagnosed
                // upstream.
                Type::Param(_) => break Type::Invalid,
                u => break u,
            }
        };

        for t in &seen {
            let mut data = t.data.lock();
            // A concurrent resolver may have memoized first; the value is
            // the same, and overwriting would race lock-free readers.
            if !t.state.has(HAS_UNDER) {
                data.underlying = Some(resolved.clone());
                t.state.advance(HAS_UNDER);
            }
        }
    }

    fn report_cycle(&self, cycle: &[Arc<Named>]) {
        let path: Vec<TypeName> = cycle.iter().map(|t| t.obj.clone()).collect();
        match self.session.upgrade() {
            Some(session) => session.cycle_error(path),
            // Cycles can only be introduced while a checker is alive; with
            // no session the diagnostic has nowhere to go.
            None => warn!(
                ty = self.obj.name(),
                "type cycle detected with no live session"
            ),
        }
    }

    fn trace_on(&self) -> bool {
        self.session
            .upgrade()
            .map_or(false, |s| s.config().trace)
    }
}

fn method_index_in(methods: &[Option<Arc<Method>>], name: &str, fold_case: bool) -> Option<usize> {
    if name == "_" {
        // The blank identifier never matches.
        return None;
    }
    methods.iter().position(|slot| match slot {
        Some(m) if fold_case => m.name().eq_ignore_ascii_case(name),
        Some(m) => m.name() == name,
        None => false,
    })
}

impl fmt::Display for Named {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ident().name())?;
        if let Some(inst) = &self.inst {
            write!(f, "<")?;
            for (i, a) in inst.targs.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", a)?;
            }
            write!(f, ">")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Named {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Named({})", self)
    }
}
