//! Callback registry
//!
//! Each operation kind owns a list of named stages. Stages declare
//! `before`/`after` constraints against other stage names (`"*"` meaning
//! every other stage); the list is ordered with Kahn's algorithm the first
//! time the kind runs and re-ordered after every registration change. Ties
//! keep registration order.

use crate::errors::OrmError;
use crate::statement::Statement;
use futures::future::BoxFuture;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CallbackKind {
    Create,
    Query,
    Update,
    Delete,
    Row,
    Raw,
}

impl CallbackKind {
    pub const ALL: [CallbackKind; 6] = [
        CallbackKind::Create,
        CallbackKind::Query,
        CallbackKind::Update,
        CallbackKind::Delete,
        CallbackKind::Row,
        CallbackKind::Raw,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CallbackKind::Create => "create",
            CallbackKind::Query => "query",
            CallbackKind::Update => "update",
            CallbackKind::Delete => "delete",
            CallbackKind::Row => "row",
            CallbackKind::Raw => "raw",
        }
    }
}

/// A stage: mutates the statement, records failures on `stmt.error`
pub type StageFn = Arc<dyn for<'a> Fn(&'a mut Statement) -> BoxFuture<'a, ()> + Send + Sync>;

/// Run-time guard; a false result skips the stage for that invocation
pub type Predicate = Arc<dyn Fn(&Statement) -> bool + Send + Sync>;

/// Pin the higher-ranked signature onto a closure
pub fn stage<F>(f: F) -> F
where
    F: for<'a> Fn(&'a mut Statement) -> BoxFuture<'a, ()> + Send + Sync + 'static,
{
    f
}

/// Wrap a synchronous function as a stage
pub fn sync_stage<F>(f: F) -> StageFn
where
    F: Fn(&mut Statement) + Send + Sync + 'static,
{
    Arc::new(stage(move |stmt: &mut Statement| -> BoxFuture<'_, ()> {
        f(stmt);
        Box::pin(std::future::ready(()))
    }))
}

#[derive(Clone)]
struct Registration {
    name: String,
    before: Option<String>,
    after: Option<String>,
    when: Option<Predicate>,
    handler: StageFn,
}

#[derive(Clone)]
pub(crate) struct CompiledStage {
    pub name: String,
    when: Option<Predicate>,
    handler: StageFn,
}

#[derive(Default)]
struct KindState {
    registrations: Vec<Registration>,
    compiled: Option<Arc<Vec<CompiledStage>>>,
}

#[derive(Default)]
pub struct Callbacks {
    kinds: RwLock<HashMap<CallbackKind, KindState>>,
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kinds = self.kinds.read().unwrap_or_else(|e| e.into_inner());
        let mut map = f.debug_map();
        for kind in CallbackKind::ALL {
            if let Some(state) = kinds.get(&kind) {
                let names: Vec<&str> = state.registrations.iter().map(|r| r.name.as_str()).collect();
                map.entry(&kind.name(), &names);
            }
        }
        map.finish()
    }
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn processor(&self, kind: CallbackKind) -> Processor<'_> {
        Processor {
            callbacks: self,
            kind,
        }
    }

    pub fn create(&self) -> Processor<'_> {
        self.processor(CallbackKind::Create)
    }

    pub fn query(&self) -> Processor<'_> {
        self.processor(CallbackKind::Query)
    }

    pub fn update(&self) -> Processor<'_> {
        self.processor(CallbackKind::Update)
    }

    pub fn delete(&self) -> Processor<'_> {
        self.processor(CallbackKind::Delete)
    }

    pub fn row(&self) -> Processor<'_> {
        self.processor(CallbackKind::Row)
    }

    pub fn raw(&self) -> Processor<'_> {
        self.processor(CallbackKind::Raw)
    }

    fn modify<T>(
        &self,
        kind: CallbackKind,
        f: impl FnOnce(&mut Vec<Registration>) -> Result<T, OrmError>,
    ) -> Result<T, OrmError> {
        let mut kinds = self.kinds.write().unwrap_or_else(|e| e.into_inner());
        let state = kinds.entry(kind).or_default();
        let out = f(&mut state.registrations)?;
        state.compiled = None;
        Ok(out)
    }

    /// Ordered stages of `kind`, resolved on first use
    pub(crate) fn chain(&self, kind: CallbackKind) -> Result<Arc<Vec<CompiledStage>>, OrmError> {
        {
            let kinds = self.kinds.read().unwrap_or_else(|e| e.into_inner());
            match kinds.get(&kind) {
                None => return Ok(Arc::new(Vec::new())),
                Some(state) => {
                    if let Some(compiled) = &state.compiled {
                        return Ok(Arc::clone(compiled));
                    }
                }
            }
        }
        let mut kinds = self.kinds.write().unwrap_or_else(|e| e.into_inner());
        let state = kinds.entry(kind).or_default();
        if let Some(compiled) = &state.compiled {
            return Ok(Arc::clone(compiled));
        }
        let order = sort(kind, &state.registrations)?;
        let compiled = Arc::new(
            order
                .into_iter()
                .map(|idx| {
                    let r = &state.registrations[idx];
                    CompiledStage {
                        name: r.name.clone(),
                        when: r.when.clone(),
                        handler: Arc::clone(&r.handler),
                    }
                })
                .collect::<Vec<_>>(),
        );
        crate::debug_log!(
            "resolved {} callbacks: {:?}",
            kind.name(),
            compiled.iter().map(|s| s.name.as_str()).collect::<Vec<_>>()
        );
        state.compiled = Some(Arc::clone(&compiled));
        Ok(compiled)
    }

    /// Run every stage of `kind` against `stmt`.
    ///
    /// Stages after a failure still run so the transaction bracket can roll
    /// back; each stage returns early when `stmt.error` is set.
    pub(crate) async fn execute(&self, kind: CallbackKind, stmt: &mut Statement) {
        let chain = match self.chain(kind) {
            Ok(chain) => chain,
            Err(e) => {
                stmt.add_error(e);
                return;
            }
        };
        let started = Instant::now();
        for stage in chain.iter() {
            if stmt.cancel.is_cancelled() && !stmt.error.as_ref().is_some_and(OrmError::is_cancelled) {
                stmt.add_error(OrmError::Cancelled);
            }
            if let Some(when) = &stage.when {
                if !when(stmt) {
                    continue;
                }
            }
            crate::trace_log!("{} callback {}", kind.name(), stage.name);
            (stage.handler)(stmt).await;
        }
        crate::logger::log_statement(stmt, kind, started.elapsed());
    }
}

/// Stage list of one operation kind
#[derive(Clone, Copy)]
pub struct Processor<'a> {
    callbacks: &'a Callbacks,
    kind: CallbackKind,
}

impl<'a> Processor<'a> {
    pub fn before(self, name: &str) -> Callback<'a> {
        Callback::new(self).before(name)
    }

    pub fn after(self, name: &str) -> Callback<'a> {
        Callback::new(self).after(name)
    }

    pub fn when<P>(self, predicate: P) -> Callback<'a>
    where
        P: Fn(&Statement) -> bool + Send + Sync + 'static,
    {
        Callback::new(self).when(predicate)
    }

    pub fn register<F>(self, name: &str, handler: F) -> Result<(), OrmError>
    where
        F: for<'s> Fn(&'s mut Statement) -> BoxFuture<'s, ()> + Send + Sync + 'static,
    {
        Callback::new(self).register(name, handler)
    }

    pub fn register_stage(self, name: &str, handler: StageFn) -> Result<(), OrmError> {
        Callback::new(self).register_stage(name, handler)
    }

    /// Swap the handler of an existing stage, keeping its constraints
    pub fn replace(self, name: &str, handler: StageFn) -> Result<(), OrmError> {
        let kind = self.kind;
        self.callbacks.modify(kind, |registrations| {
            match registrations.iter_mut().find(|r| r.name == name) {
                Some(existing) => existing.handler = handler,
                None => registrations.push(Registration {
                    name: name.to_string(),
                    before: None,
                    after: None,
                    when: None,
                    handler,
                }),
            }
            Ok(())
        })
    }

    pub fn remove(self, name: &str) -> Result<(), OrmError> {
        let kind = self.kind;
        self.callbacks.modify(kind, |registrations| {
            let before = registrations.len();
            registrations.retain(|r| r.name != name);
            if registrations.len() == before {
                return Err(OrmError::Callback(format!(
                    "{} callback {name} is not registered",
                    kind.name()
                )));
            }
            Ok(())
        })
    }

    /// Stage names in execution order
    pub fn names(self) -> Result<Vec<String>, OrmError> {
        Ok(self
            .callbacks
            .chain(self.kind)?
            .iter()
            .map(|s| s.name.clone())
            .collect())
    }
}

/// Registration under construction
pub struct Callback<'a> {
    processor: Processor<'a>,
    before: Option<String>,
    after: Option<String>,
    when: Option<Predicate>,
}

impl<'a> Callback<'a> {
    fn new(processor: Processor<'a>) -> Self {
        Self {
            processor,
            before: None,
            after: None,
            when: None,
        }
    }

    pub fn before(mut self, name: &str) -> Self {
        self.before = Some(name.to_string());
        self
    }

    pub fn after(mut self, name: &str) -> Self {
        self.after = Some(name.to_string());
        self
    }

    pub fn when<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&Statement) -> bool + Send + Sync + 'static,
    {
        self.when = Some(Arc::new(predicate));
        self
    }

    pub fn register<F>(self, name: &str, handler: F) -> Result<(), OrmError>
    where
        F: for<'s> Fn(&'s mut Statement) -> BoxFuture<'s, ()> + Send + Sync + 'static,
    {
        self.register_stage(name, Arc::new(handler))
    }

    pub fn register_stage(self, name: &str, handler: StageFn) -> Result<(), OrmError> {
        let kind = self.processor.kind;
        let registration = Registration {
            name: name.to_string(),
            before: self.before,
            after: self.after,
            when: self.when,
            handler,
        };
        self.processor.callbacks.modify(kind, |registrations| {
            if registrations.iter().any(|r| r.name == registration.name) {
                return Err(OrmError::Callback(format!(
                    "{} callback {} is already registered",
                    kind.name(),
                    registration.name
                )));
            }
            registrations.push(registration);
            Ok(())
        })
    }
}

/// Order registrations so every before/after constraint holds
fn sort(kind: CallbackKind, registrations: &[Registration]) -> Result<Vec<usize>, OrmError> {
    let n = registrations.len();
    let index: HashMap<&str, usize> = registrations
        .iter()
        .enumerate()
        .map(|(i, r)| (r.name.as_str(), i))
        .collect();
    let mut edges: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];

    for (i, r) in registrations.iter().enumerate() {
        match r.before.as_deref() {
            Some("*") => {
                for (j, other) in registrations.iter().enumerate() {
                    if j != i && other.before.as_deref() != Some("*") {
                        edges[i].insert(j);
                    }
                }
            }
            Some(name) => {
                if let Some(&j) = index.get(name) {
                    edges[i].insert(j);
                }
            }
            None => {}
        }
        match r.after.as_deref() {
            Some("*") => {
                for (j, other) in registrations.iter().enumerate() {
                    if j != i && other.after.as_deref() != Some("*") {
                        edges[j].insert(i);
                    }
                }
            }
            Some(name) => {
                if let Some(&j) = index.get(name) {
                    edges[j].insert(i);
                }
            }
            None => {}
        }
    }

    // unconstrained stages keep their registration order among themselves
    let mut previous: Option<usize> = None;
    for (i, r) in registrations.iter().enumerate() {
        if r.before.is_none() && r.after.is_none() {
            if let Some(p) = previous {
                edges[p].insert(i);
            }
            previous = Some(i);
        }
    }

    let mut in_degree = vec![0usize; n];
    for targets in &edges {
        for &t in targets {
            in_degree[t] += 1;
        }
    }
    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(next) = ready.pop_first() {
        order.push(next);
        for &t in &edges[next] {
            in_degree[t] -= 1;
            if in_degree[t] == 0 {
                ready.insert(t);
            }
        }
    }

    if order.len() < n {
        let stuck: Vec<&str> = (0..n)
            .filter(|i| !order.contains(i))
            .map(|i| registrations[i].name.as_str())
            .collect();
        return Err(OrmError::Callback(format!(
            "cyclic {} callbacks: {}",
            kind.name(),
            stuck.join(", ")
        )));
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> StageFn {
        sync_stage(|_stmt| {})
    }

    fn names(callbacks: &Callbacks) -> Vec<String> {
        callbacks.create().names().unwrap()
    }

    #[test]
    fn registration_order_is_kept_without_constraints() {
        let callbacks = Callbacks::new();
        for name in ["a", "b", "c"] {
            callbacks.create().register_stage(name, noop()).unwrap();
        }
        assert_eq!(names(&callbacks), vec!["a", "b", "c"]);
    }

    #[test]
    fn before_and_after_constraints_hold() {
        let callbacks = Callbacks::new();
        callbacks.create().register_stage("create", noop()).unwrap();
        callbacks.create().register_stage("commit", noop()).unwrap();
        callbacks
            .create()
            .before("create")
            .register_stage("validate", noop())
            .unwrap();
        callbacks
            .create()
            .after("create")
            .before("commit")
            .register_stage("audit", noop())
            .unwrap();
        assert_eq!(names(&callbacks), vec!["validate", "create", "audit", "commit"]);
    }

    #[test]
    fn late_registrations_slot_between_existing_stages() {
        let callbacks = Callbacks::new();
        for name in ["begin", "save", "insert", "link", "commit"] {
            callbacks.create().register_stage(name, noop()).unwrap();
        }
        callbacks
            .create()
            .after("save")
            .before("insert")
            .register_stage("stamp", noop())
            .unwrap();
        assert_eq!(
            names(&callbacks),
            vec!["begin", "save", "stamp", "insert", "link", "commit"]
        );
    }

    #[test]
    fn star_places_first_and_last() {
        let callbacks = Callbacks::new();
        callbacks.create().after("*").register_stage("last", noop()).unwrap();
        callbacks.create().register_stage("middle", noop()).unwrap();
        callbacks.create().before("*").register_stage("first", noop()).unwrap();
        assert_eq!(names(&callbacks), vec!["first", "middle", "last"]);
    }

    #[test]
    fn cycles_fail_at_resolve_time() {
        let callbacks = Callbacks::new();
        callbacks.create().before("b").register_stage("a", noop()).unwrap();
        callbacks.create().before("a").register_stage("b", noop()).unwrap();
        let err = callbacks.create().names().unwrap_err();
        assert!(matches!(err, OrmError::Callback(ref msg) if msg.contains("cyclic")));
    }

    #[test]
    fn duplicates_and_unknown_removals_are_rejected() {
        let callbacks = Callbacks::new();
        callbacks.query().register_stage("q", noop()).unwrap();
        assert!(callbacks.query().register_stage("q", noop()).is_err());
        assert!(callbacks.query().remove("missing").is_err());
        callbacks.query().remove("q").unwrap();
        assert!(callbacks.query().names().unwrap().is_empty());
    }

    #[test]
    fn replace_keeps_position() {
        let callbacks = Callbacks::new();
        callbacks.update().register_stage("a", noop()).unwrap();
        callbacks.update().register_stage("b", noop()).unwrap();
        callbacks.update().replace("a", noop()).unwrap();
        assert_eq!(callbacks.update().names().unwrap(), vec!["a", "b"]);
    }
}
