//! The type-check session: diagnostics sink, configuration, and end-of-check
//! cleanup.
//!
//! A [`Session`] is the boundary between the resolution engine and the rest
//! of the checker. Types constructed through a session report cycle and
//! loader diagnostics back to it, and are swept by [`Session::finish`] so
//! nothing leaves the checking phase with an unresolved underlying type.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use sable_common::Span;

use crate::error::TypeError;
use crate::loader::Loader;
use crate::named::Named;
use crate::ty::{Method, Type, TypeName};

/// Session configuration.
#[derive(Clone, Debug, Default)]
pub struct Config {
    /// Emit `tracing` events for RHS expansion and method expansion. Off by
    /// default; the events are verbose on generic-heavy programs.
    pub trace: bool,
}

pub struct Session {
    config: Config,
    diags: Mutex<Vec<TypeError>>,
    /// Types to sweep when checking finishes.
    cleanup: Mutex<Vec<Arc<Named>>>,
}

impl Session {
    pub fn new(config: Config) -> Arc<Self> {
        Arc::new(Session {
            config,
            diags: Mutex::new(Vec::new()),
            cleanup: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Record a diagnostic.
    pub fn report(&self, err: TypeError) {
        self.diags.lock().push(err);
    }

    /// The diagnostics recorded so far, in report order.
    pub fn diagnostics(&self) -> Vec<TypeError> {
        self.diags.lock().clone()
    }

    pub(crate) fn needs_cleanup(&self, n: &Arc<Named>) {
        self.cleanup.lock().push(n.clone());
    }

    /// Report a cycle of named declarations.
    ///
    /// The path is rotated so it starts at the declaration appearing first in
    /// the source, which keeps the diagnostic stable no matter which member
    /// of the cycle was resolved first.
    pub(crate) fn cycle_error(&self, mut path: Vec<TypeName>) {
        debug_assert!(!path.is_empty());
        let first = path
            .iter()
            .enumerate()
            .min_by_key(|(_, obj)| obj.span().start)
            .map(|(i, _)| i)
            .unwrap_or(0);
        path.rotate_left(first);
        let span = path[0].span();
        let names = path.into_iter().map(|obj| obj.name().to_owned()).collect();
        self.report(TypeError::Cycle { path: names, span });
    }

    /// Finish the checking phase: force underlying resolution for every
    /// declared and loader-bound type constructed through this session.
    /// Instances are skipped -- they may legally keep expanding lazily after
    /// checking completes.
    pub fn finish(&self) {
        let types = std::mem::take(&mut *self.cleanup.lock());
        for n in types {
            if !n.is_instance() {
                n.underlying();
            }
        }
    }

    // ── Type construction ──────────────────────────────────────────────

    /// A declared type, reporting through this session. See [`Named::new`].
    pub fn declared(
        self: &Arc<Self>,
        obj: TypeName,
        underlying: Option<Type>,
        methods: Vec<Arc<Method>>,
    ) -> Arc<Named> {
        let n = Named::declared(obj, underlying, methods, Arc::downgrade(self));
        self.needs_cleanup(&n);
        n
    }

    /// A loader-bound type, reporting through this session. See
    /// [`Named::loader_bound`].
    pub fn loader_bound(self: &Arc<Self>, obj: TypeName, loader: Box<dyn Loader>) -> Arc<Named> {
        let n = Named::with_loader(obj, loader, Arc::downgrade(self));
        self.needs_cleanup(&n);
        n
    }

    /// An instantiated type, reporting through this session. See
    /// [`Named::instance`].
    pub fn instance(
        self: &Arc<Self>,
        origin: &Arc<Named>,
        targs: Vec<Type>,
        pos: Span,
        expanding: Option<&Arc<Named>>,
    ) -> Arc<Named> {
        let n = Named::instantiated(origin, targs, pos, expanding, Arc::downgrade(self));
        self.needs_cleanup(&n);
        n
    }
}
