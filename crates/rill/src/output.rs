//! Output emission: walking the elaborated AST once per engine tick,
//! reading the value table through the cached FG back-references, and
//! producing the output graph the configuration engine consumes.
//!
//! The OG is a snapshot. It is never mutated after emission; the next tick
//! produces a fresh one.

use ahash::{AHashMap, AHashSet};
use indexmap::IndexMap;

use crate::{
    ast::{Arena, EdgeProp, ResContent, ResStmt, Stmt, StmtId},
    errors::{LangError, LangResult},
    fg::{FgBuild, VertexId},
    resources::{b64_to_res, KindRegistry},
    span::SrcSpan,
    value::Value,
};

/// Every recognised meta property, exhaustively.
///
/// The aggregate `meta` struct accepts any subset of these as fields;
/// anything else is an error.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    serde::Serialize,
    serde::Deserialize,
    strum::EnumString,
    strum::IntoStaticStr,
    strum::EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum MetaProp {
    Noop,
    Retry,
    Retryreset,
    Delay,
    Poll,
    Limit,
    Burst,
    Reset,
    Sema,
    Rewatch,
    Realize,
    Dollar,
    Hidden,
    Export,
    Reverse,
    Autoedge,
    Autogroup,
}

fn default_limit() -> f64 {
    f64::INFINITY
}

fn default_true() -> bool {
    true
}

/// Per-resource meta parameters with engine defaults.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MetaParams {
    pub noop: bool,
    /// Retries before giving up; negative means unlimited.
    pub retry: i16,
    pub retryreset: bool,
    /// Delay between retries, in milliseconds.
    pub delay: u64,
    /// Polling interval in seconds; zero means event-based watching.
    pub poll: u32,
    /// Maximum events per second.
    #[serde(default = "default_limit")]
    pub limit: f64,
    pub burst: i64,
    pub reset: bool,
    /// Semaphore ids this resource must hold while applying.
    pub sema: Vec<String>,
    pub rewatch: bool,
    pub realize: bool,
    pub dollar: bool,
    pub hidden: bool,
    /// Hosts this resource is exported to; empty means not exported.
    pub export: Vec<String>,
    pub reverse: bool,
    #[serde(default = "default_true")]
    pub autoedge: bool,
    #[serde(default = "default_true")]
    pub autogroup: bool,
}

impl Default for MetaParams {
    fn default() -> Self {
        Self {
            noop: false,
            retry: 0,
            retryreset: false,
            delay: 0,
            poll: 0,
            limit: f64::INFINITY,
            burst: 0,
            reset: false,
            sema: Vec::new(),
            rewatch: false,
            realize: false,
            dollar: false,
            hidden: false,
            export: Vec::new(),
            reverse: false,
            autoedge: true,
            autogroup: true,
        }
    }
}

impl MetaParams {
    /// Applies one property from a runtime value, converting and
    /// range-checking as needed.
    pub fn apply(&mut self, prop: MetaProp, value: &Value, span: SrcSpan) -> LangResult<()> {
        let bool_of = |v: &Value| {
            v.as_bool()
                .ok_or_else(|| LangError::type_error(format!("meta property expects bool, got `{v}`"), span))
        };
        let int_of = |v: &Value| {
            v.as_int()
                .ok_or_else(|| LangError::type_error(format!("meta property expects int, got `{v}`"), span))
        };
        let strs_of = |v: &Value| -> LangResult<Vec<String>> {
            match v {
                Value::Str(s) => Ok(vec![s.clone()]),
                Value::List(items) => items
                    .iter()
                    .map(|i| {
                        i.as_str()
                            .map(str::to_owned)
                            .ok_or_else(|| LangError::type_error("meta property expects strings", span))
                    })
                    .collect(),
                other => Err(LangError::type_error(
                    format!("meta property expects str or list<str>, got `{other}`"),
                    span,
                )),
            }
        };
        match prop {
            MetaProp::Noop => self.noop = bool_of(value)?,
            MetaProp::Retry => {
                self.retry = int_of(value)?
                    .try_into()
                    .map_err(|_| LangError::type_error("retry out of range", span))?;
            }
            MetaProp::Retryreset => self.retryreset = bool_of(value)?,
            MetaProp::Delay => {
                self.delay = int_of(value)?
                    .try_into()
                    .map_err(|_| LangError::type_error("delay must be non-negative", span))?;
            }
            MetaProp::Poll => {
                self.poll = int_of(value)?
                    .try_into()
                    .map_err(|_| LangError::type_error("poll must be non-negative", span))?;
            }
            MetaProp::Limit => {
                self.limit = match value {
                    Value::Float(x) => *x,
                    Value::Int(i) => *i as f64,
                    other => {
                        return Err(LangError::type_error(
                            format!("limit expects a number, got `{other}`"),
                            span,
                        ));
                    }
                };
            }
            MetaProp::Burst => self.burst = int_of(value)?,
            MetaProp::Reset => self.reset = bool_of(value)?,
            MetaProp::Sema => self.sema = strs_of(value)?,
            MetaProp::Rewatch => self.rewatch = bool_of(value)?,
            MetaProp::Realize => self.realize = bool_of(value)?,
            MetaProp::Dollar => self.dollar = bool_of(value)?,
            MetaProp::Hidden => self.hidden = bool_of(value)?,
            MetaProp::Export => self.export = strs_of(value)?,
            MetaProp::Reverse => self.reverse = bool_of(value)?,
            MetaProp::Autoedge => self.autoedge = bool_of(value)?,
            MetaProp::Autogroup => self.autogroup = bool_of(value)?,
        }
        Ok(())
    }
}

/// One emitted resource.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Resource {
    pub kind: String,
    pub name: String,
    /// Engine-side struct field name to value, in declaration order.
    pub fields: IndexMap<String, Value>,
    pub meta: MetaParams,
}

impl Resource {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            fields: IndexMap::new(),
            meta: MetaParams::default(),
        }
    }

    /// `kind/name`, the engine's canonical resource id.
    pub fn id(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }
}

/// One emitted edge between two resources.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OgEdge {
    pub kind1: String,
    pub name1: String,
    /// Field sent from the first resource, if this edge carries data.
    pub send: Option<String>,
    pub kind2: String,
    pub name2: String,
    /// Field received into the second resource, if this edge carries data.
    pub recv: Option<String>,
    /// Whether events propagate along the edge.
    pub notify: bool,
}

/// The output graph: a per-tick snapshot of resources and edges.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct OutputGraph {
    pub resources: Vec<Resource>,
    pub edges: Vec<OgEdge>,
}

impl OutputGraph {
    /// Adds a resource, deduplicating exact repeats (shared class bodies
    /// may be walked from several includes). Two different resources with
    /// one id are a conflict.
    fn push_resource(&mut self, res: Resource, span: SrcSpan) -> LangResult<()> {
        if let Some(existing) = self
            .resources
            .iter()
            .find(|r| r.kind == res.kind && r.name == res.name)
        {
            if *existing == res {
                return Ok(());
            }
            return Err(LangError::output(
                format!("duplicate resource `{}` with conflicting definitions", res.id()),
                span,
            ));
        }
        self.resources.push(res);
        Ok(())
    }

    fn push_edge(&mut self, edge: OgEdge) {
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
    }

    /// Serialises the snapshot as pretty JSON, for host tooling and
    /// debugging.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_owned())
    }
}

/// Everything output emission reads besides the AST.
pub struct OutputSources<'a> {
    pub kinds: &'a dyn KindRegistry,
    pub table: &'a AHashMap<VertexId, Value>,
    pub build: &'a FgBuild,
    /// Base64 blobs of resources exported by other hosts, available for
    /// collecting resources this tick.
    pub exported: &'a [String],
}

/// Walks the program and produces the OG snapshot for the current tick.
pub fn output(arena: &Arena, src: &OutputSources<'_>, program: StmtId) -> LangResult<OutputGraph> {
    let mut og = OutputGraph::default();
    out_stmt(arena, src, program, &mut og)?;
    Ok(og)
}

fn value_of(arena: &Arena, src: &OutputSources<'_>, expr: crate::ast::ExprId) -> LangResult<Value> {
    let span = arena.expr_span(expr);
    let vertex = arena
        .fg(expr)
        .ok_or_else(|| LangError::output("expression has no FG vertex", span))?;
    src.table
        .get(&vertex)
        .cloned()
        .ok_or_else(|| LangError::output("no value in the table for this expression", span))
}

/// The one or many names a resource-name value denotes.
fn names_of(value: &Value, span: SrcSpan) -> LangResult<Vec<String>> {
    match value {
        Value::Str(s) => Ok(vec![s.clone()]),
        Value::List(items) => items
            .iter()
            .map(|i| {
                i.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| LangError::output("resource name list must hold strings", span))
            })
            .collect(),
        other => Err(LangError::output(
            format!("resource name must be str or list<str>, got `{other}`"),
            span,
        )),
    }
}

fn out_stmt(arena: &Arena, src: &OutputSources<'_>, id: StmtId, og: &mut OutputGraph) -> LangResult<()> {
    if arena.is_pruned(id) {
        return Ok(());
    }
    match arena.stmt(id) {
        // These contribute via their references only.
        Stmt::Bind(_) | Stmt::Func(_) | Stmt::Class(_) | Stmt::Import(_) | Stmt::Comment(_) => Ok(()),
        Stmt::Program(s) => {
            let body = s.body.clone();
            for child in body {
                out_stmt(arena, src, child, og)?;
            }
            Ok(())
        }
        Stmt::Include(s) => match s.body {
            Some(body) => out_stmt(arena, src, body, og),
            None => Ok(()),
        },
        Stmt::Res(s) => out_res(arena, src, s, arena.stmt_span(id), og),
        Stmt::Edge(s) => {
            let span = arena.stmt_span(id);
            for pair in s.halves.windows(2) {
                let names1 = names_of(&value_of(arena, src, pair[0].name)?, span)?;
                let names2 = names_of(&value_of(arena, src, pair[1].name)?, span)?;
                for n1 in &names1 {
                    for n2 in &names2 {
                        og.push_edge(OgEdge {
                            kind1: pair[0].kind.clone(),
                            name1: n1.clone(),
                            send: pair[0].field.clone(),
                            kind2: pair[1].kind.clone(),
                            name2: n2.clone(),
                            recv: pair[1].field.clone(),
                            notify: s.notify,
                        });
                    }
                }
            }
            Ok(())
        }
        Stmt::If(s) => {
            let span = arena.stmt_span(id);
            let cond = value_of(arena, src, s.cond)?;
            let chosen = match cond {
                Value::Bool(true) => Some(s.then_),
                Value::Bool(false) => s.else_,
                other => {
                    return Err(LangError::output(
                        format!("if condition must be bool, got `{other}`"),
                        span,
                    ));
                }
            };
            match chosen {
                Some(branch) => out_stmt(arena, src, branch, og),
                None => Ok(()),
            }
        }
        Stmt::For(_) | Stmt::ForKv(_) => {
            // Per-iteration body snapshots live beside the statement.
            let bodies: Vec<StmtId> = src.build.with_iterations(id, |snaps| snaps.iter().map(|s| s.body).collect());
            for body in bodies {
                out_stmt(arena, src, body, og)?;
            }
            Ok(())
        }
    }
}

fn out_res(
    arena: &Arena,
    src: &OutputSources<'_>,
    s: &ResStmt,
    span: SrcSpan,
    og: &mut OutputGraph,
) -> LangResult<()> {
    if !src.kinds.is_kind(&s.kind) {
        return Err(LangError::output(format!("unknown resource kind `{}`", s.kind), span));
    }
    let names = names_of(&value_of(arena, src, s.name)?, span)?;

    for name in &names {
        let mut res = src.kinds.new_resource(&s.kind, name)?;
        let mut seen_meta: AHashSet<MetaProp> = AHashSet::new();

        for content in &s.contents {
            match content {
                ResContent::Field(f) => {
                    let struct_name = src.kinds.field_struct_name(&s.kind, &f.name).ok_or_else(|| {
                        LangError::output(format!("kind `{}` has no field `{}`", s.kind, f.name), span)
                    })?;
                    let value = value_of(arena, src, f.value)?;
                    res.fields.insert(struct_name, value);
                }
                ResContent::Meta(m) => {
                    let value = value_of(arena, src, m.value)?;
                    if m.property == "meta" {
                        let Value::Struct(fields) = &value else {
                            return Err(LangError::type_error("aggregate meta expects a struct", span));
                        };
                        for (fname, fval) in fields {
                            let prop: MetaProp = fname.parse().map_err(|_| {
                                LangError::type_error(format!("unknown meta property `{fname}`"), span)
                            })?;
                            if !seen_meta.insert(prop) {
                                return Err(LangError::structural(
                                    format!("duplicate meta property `{fname}` in resource"),
                                    span,
                                ));
                            }
                            res.meta.apply(prop, fval, span)?;
                        }
                    } else {
                        let prop: MetaProp = m.property.parse().map_err(|_| {
                            LangError::type_error(format!("unknown meta property `{}`", m.property), span)
                        })?;
                        if !seen_meta.insert(prop) {
                            return Err(LangError::structural(
                                format!("duplicate meta property `{}` in resource", m.property),
                                span,
                            ));
                        }
                        res.meta.apply(prop, &value, span)?;
                    }
                }
                ResContent::Edge(e) => {
                    let others = names_of(&value_of(arena, src, e.name)?, span)?;
                    for other in &others {
                        og.push_edge(auto_edge(&s.kind, name, e.property, &e.kind, other));
                    }
                }
                ResContent::Collect(c) => {
                    let filter = value_of(arena, src, c.value)?;
                    collect_exported(src, &s.kind, &filter, span, og)?;
                }
            }
        }
        og.push_resource(res, span)?;
    }
    Ok(())
}

/// Synthesises the edge a resource-internal `Notify`/`Before`/`Listen`/
/// `Depend` declaration implies. `Listen` and `Depend` reverse direction;
/// `Notify` and `Listen` carry event propagation.
fn auto_edge(kind: &str, name: &str, prop: EdgeProp, other_kind: &str, other_name: &str) -> OgEdge {
    let notify = prop.notifies();
    if prop.reversed() {
        OgEdge {
            kind1: other_kind.to_owned(),
            name1: other_name.to_owned(),
            send: None,
            kind2: kind.to_owned(),
            name2: name.to_owned(),
            recv: None,
            notify,
        }
    } else {
        OgEdge {
            kind1: kind.to_owned(),
            name1: name.to_owned(),
            send: None,
            kind2: other_kind.to_owned(),
            name2: other_name.to_owned(),
            recv: None,
            notify,
        }
    }
}

/// Filter pairs for a collect clause: `(name, optional host)`.
fn collect_filter(value: &Value, span: SrcSpan) -> LangResult<Vec<(String, Option<String>)>> {
    let pair_of = |v: &Value| -> LangResult<(String, Option<String>)> {
        match v {
            Value::Str(name) => Ok((name.clone(), None)),
            Value::Struct(fields) => {
                let name = fields
                    .get("name")
                    .and_then(Value::as_str)
                    .ok_or_else(|| LangError::output("collect struct needs a `name` field", span))?;
                let host = fields.get("host").and_then(Value::as_str).map(str::to_owned);
                Ok((name.to_owned(), host))
            }
            other => Err(LangError::output(
                format!("collect expects str or struct values, got `{other}`"),
                span,
            )),
        }
    };
    match value {
        Value::List(items) => items.iter().map(pair_of).collect(),
        single => Ok(vec![pair_of(single)?]),
    }
}

fn collect_exported(
    src: &OutputSources<'_>,
    kind: &str,
    filter: &Value,
    span: SrcSpan,
    og: &mut OutputGraph,
) -> LangResult<()> {
    let wanted = collect_filter(filter, span)?;
    for blob in src.exported {
        let exported = b64_to_res(blob)?;
        if exported.res.kind != kind {
            continue;
        }
        let matched = wanted.iter().any(|(name, host)| {
            *name == exported.res.name && host.as_ref().is_none_or(|h| *h == exported.host)
        });
        if matched {
            og.push_resource(exported.res, span)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_prop_names_parse_lowercase() {
        assert_eq!("noop".parse::<MetaProp>().ok(), Some(MetaProp::Noop));
        assert_eq!("retryreset".parse::<MetaProp>().ok(), Some(MetaProp::Retryreset));
        assert_eq!("autogroup".parse::<MetaProp>().ok(), Some(MetaProp::Autogroup));
        assert!("bogus".parse::<MetaProp>().is_err());
    }

    #[test]
    fn meta_defaults_match_engine_expectations() {
        let meta = MetaParams::default();
        assert!(!meta.noop);
        assert!(meta.autoedge);
        assert!(meta.autogroup);
        assert!(meta.limit.is_infinite());
    }

    #[test]
    fn meta_apply_converts_and_range_checks() {
        let mut meta = MetaParams::default();
        meta.apply(MetaProp::Retry, &Value::Int(3), SrcSpan::default()).expect("retry");
        assert_eq!(meta.retry, 3);
        assert!(meta.apply(MetaProp::Delay, &Value::Int(-1), SrcSpan::default()).is_err());
        meta.apply(
            MetaProp::Sema, &Value::Str("s1".to_owned()), SrcSpan::default(),
        )
        .expect("sema");
        assert_eq!(meta.sema, vec!["s1".to_owned()]);
    }

    #[test]
    fn listen_and_depend_reverse_edge_direction() {
        let edge = auto_edge("test", "a", EdgeProp::Listen, "test", "b");
        assert_eq!(edge.kind1, "test");
        assert_eq!(edge.name1, "b");
        assert_eq!(edge.name2, "a");
        assert!(edge.notify);
        let edge = auto_edge("test", "a", EdgeProp::Before, "test", "b");
        assert_eq!(edge.name1, "a");
        assert!(!edge.notify);
    }
}
