//! Parameter analysis for debugger fragments.
//!
//! A fragment is compiled as a static method of its own class. Every value
//! it reads from the suspended frame (locals, parameters, local functions
//! and implicit receivers) becomes a parameter of that method, in order of
//! first reference. The evaluator later reads the arguments out of the
//! frame by name.
//!
//! The analysis walks the fragment in pre-order and trusts the resolver
//! about what each reference denotes. It skips:
//!
//! - member selectors (`b` in `a.b`), which are not references;
//! - top-level functions, which the fragment calls directly;
//! - declarations made inside the fragment itself.

mod parameter;

use peek_ir::stack::ensure_sufficient_stack;
use peek_ir::visitor::{walk_expr, Visitor};
use peek_ir::{
    CancellationFlag, Cancelled, ExprArena, ExprId, ExprKind, Name, StringInterner, Type,
};
use peek_parse::FragmentAst;
use peek_resolve::{
    receiver_slot_name, DeclId, DeclKind, FragmentResolution, Origin, Reference, ScopeId,
    Visibility,
};
use rustc_hash::FxHashMap;
use tracing::debug;

pub use parameter::{Parameter, ParameterInfo, ParameterKind};

/// Identity of a captured value; receivers and plain values of the same
/// declaration are distinct.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
enum ParameterKey {
    Value(DeclId),
    Receiver(DeclId),
}

/// Single-use analyzer.
///
/// [`analyze`](ParameterAnalyzer::analyze) consumes the analyzer, so a
/// second run on the same instance does not compile:
///
/// ```compile_fail
/// # use peek_capture::ParameterAnalyzer;
/// fn twice(analyzer: ParameterAnalyzer<'_>) {
///     let first = analyzer.analyze();
///     let second = analyzer.analyze();
/// }
/// ```
pub struct ParameterAnalyzer<'a> {
    fragment: &'a FragmentAst,
    resolution: &'a FragmentResolution,
    interner: &'a StringInterner,
    cancellation: Option<&'a CancellationFlag>,
    info: ParameterInfo,
    indices: FxHashMap<ParameterKey, usize>,
    stopped: bool,
}

impl<'a> ParameterAnalyzer<'a> {
    pub fn new(
        fragment: &'a FragmentAst,
        resolution: &'a FragmentResolution,
        interner: &'a StringInterner,
    ) -> Self {
        ParameterAnalyzer {
            fragment,
            resolution,
            interner,
            cancellation: None,
            info: ParameterInfo::default(),
            indices: FxHashMap::default(),
            stopped: false,
        }
    }

    /// Poll `flag` before every reference; a raised flag stops the walk.
    #[must_use]
    pub fn cancellable(mut self, flag: &'a CancellationFlag) -> Self {
        self.cancellation = Some(flag);
        self
    }

    #[tracing::instrument(level = "debug", skip_all, fields(fragment = %self.fragment.text))]
    pub fn analyze(mut self) -> ParameterInfo {
        let fragment = self.fragment;
        for &stmt in fragment.statements() {
            self.visit_expr_id(stmt, &fragment.arena);
        }
        debug!(
            parameters = self.info.parameters.len(),
            references = self.info.mappings.len(),
            crossing = self.info.crossing_bounds.len(),
            "fragment parameters analyzed"
        );
        self.info
    }

    fn should_stop(&mut self) -> bool {
        if !self.stopped && self.cancellation.is_some_and(CancellationFlag::is_cancelled) {
            self.stopped = true;
        }
        self.stopped
    }

    fn on_identifier(&mut self, id: ExprId) {
        let Some(Reference::Decl(decl)) = self.resolution.bindings.reference(id) else {
            return;
        };
        let target = self.resolution.decls.get(decl);
        if target.visibility != Visibility::Local || target.origin == Origin::Fragment {
            return;
        }
        let kind = match target.kind {
            DeclKind::LocalFunction { .. } => ParameterKind::LocalFunction { name: target.name },
            _ => ParameterKind::Ordinary { name: target.name },
        };
        let raw = self.interner.lookup(target.name).to_owned();
        let (ty, scope) = (target.ty.clone(), target.scope);
        self.map(id, ParameterKey::Value(decl), decl, raw, ty, kind, scope);
    }

    fn on_this(&mut self, id: ExprId, explicit: Option<Name>) {
        let Some(Reference::Receiver(owner)) = self.resolution.bindings.reference(id) else {
            return;
        };
        let target = self.resolution.decls.get(owner);
        if target.origin == Origin::Fragment {
            return;
        }
        let (Some(ty), Some(scope)) = (target.receiver_type().cloned(), target.body_scope) else {
            return;
        };
        let lambda_label = match target.kind {
            DeclKind::Lambda { label, .. } => label,
            _ => None,
        };
        let label = explicit.or(lambda_label).unwrap_or(target.name);
        let raw = receiver_slot_name(self.interner.lookup(label));
        let kind = ParameterKind::ExtensionReceiver { label };
        self.map(id, ParameterKey::Receiver(owner), owner, raw, ty, kind, scope);
    }

    #[expect(clippy::too_many_arguments, reason = "parameter header fields")]
    fn map(
        &mut self,
        id: ExprId,
        key: ParameterKey,
        decl: DeclId,
        raw: String,
        ty: Type,
        kind: ParameterKind,
        target_scope: ScopeId,
    ) {
        let parameters = &mut self.info.parameters;
        let index = *self.indices.entry(key).or_insert_with(|| {
            let index = parameters.len();
            parameters.push(Parameter {
                index,
                raw,
                ty,
                decl,
                kind,
            });
            index
        });
        self.info.mappings.insert(id, index);

        let crosses = self
            .resolution
            .bindings
            .reference_scope(id)
            .is_some_and(|from| {
                self.resolution
                    .scopes
                    .crosses_closure_boundary(from, target_scope)
            });
        if crosses {
            self.info.crossing_bounds.insert(index);
        }
    }
}

impl<'a> Visitor<'a> for ParameterAnalyzer<'a> {
    fn visit_expr_id(&mut self, id: ExprId, arena: &'a ExprArena) {
        if self.should_stop() {
            return;
        }
        match arena.kind(id) {
            ExprKind::Ident(_) => self.on_identifier(id),
            ExprKind::This { label } => self.on_this(id, *label),
            _ => {}
        }
        ensure_sufficient_stack(|| walk_expr(self, id, arena));
    }

    fn visit_selector(&mut self, _id: ExprId, _arena: &'a ExprArena) {}
}

/// Collect the parameters of `fragment`.
pub fn analyze(
    fragment: &FragmentAst,
    resolution: &FragmentResolution,
    interner: &StringInterner,
) -> ParameterInfo {
    ParameterAnalyzer::new(fragment, resolution, interner).analyze()
}

/// Like [`analyze`], giving up once `flag` is raised.
pub fn analyze_cancellable(
    fragment: &FragmentAst,
    resolution: &FragmentResolution,
    interner: &StringInterner,
    flag: &CancellationFlag,
) -> Result<ParameterInfo, Cancelled> {
    flag.check()?;
    let info = ParameterAnalyzer::new(fragment, resolution, interner)
        .cancellable(flag)
        .analyze();
    flag.check()?;
    Ok(info)
}

#[cfg(test)]
mod tests;
