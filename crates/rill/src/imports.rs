//! Import machinery: parsing import names, resolving them against the
//! system registry, the local filesystem or a remote modules directory,
//! and tracking the module graph so recursive imports fail cleanly.
//!
//! The filesystem and the downloader are collaborator traits; the core
//! never touches `std::fs` directly. A [`MemFs`] implementation backs the
//! tests and doubles as the empty default.

use ahash::AHashMap;
use petgraph::graph::{DiGraph, NodeIndex};

use crate::{
    ast::{Arena, StmtId},
    errors::{LangError, LangResult},
    ordering::import_default_alias,
    span::{FileId, SrcSpan},
};

/// File extension of language source files.
pub const FILE_EXTENSION: &str = ".rl";

/// Name of the per-project modules directory searched for remote imports.
pub const MODULES_DIR: &str = "modules/";

/// The decomposition of an import name.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ImportData {
    /// The name as written in the source.
    pub name: String,
    /// Default scope alias: the last path component without extension.
    pub alias: String,
    /// Path to resolve, relative to the importing module's base (local) or
    /// to the modules directory (remote). Empty for system imports.
    pub path: String,
    /// True for imports resolved from the embedded system registry.
    pub is_system: bool,
    /// True for imports read from the local filesystem.
    pub is_local: bool,
}

/// Parses an import name into its [`ImportData`].
///
/// Three shapes exist: a bare word is a system import; a relative path
/// ending in the source extension is a local import; a URL is a remote
/// import materialised under the modules directory.
pub fn parse_import_name(name: &str, span: SrcSpan) -> LangResult<ImportData> {
    if name.is_empty() {
        return Err(LangError::import("empty import name", span));
    }
    if let Some((scheme, rest)) = name.split_once("://") {
        if scheme.is_empty() || rest.is_empty() {
            return Err(LangError::import(format!("malformed remote import `{name}`"), span));
        }
        // git://example.com/user/repo/ -> modules/example.com/user/repo/
        let path = rest.strip_suffix('/').unwrap_or(rest);
        return Ok(ImportData {
            name: name.to_owned(),
            alias: import_default_alias(path),
            path: format!("{path}/"),
            is_system: false,
            is_local: false,
        });
    }
    if name.ends_with(FILE_EXTENSION) || name.contains('/') {
        let path = if name.ends_with(FILE_EXTENSION) {
            name.to_owned()
        } else {
            // A bare directory import resolves to its metadata main file.
            format!("{}/main{FILE_EXTENSION}", name.strip_suffix('/').unwrap_or(name))
        };
        return Ok(ImportData {
            name: name.to_owned(),
            alias: import_default_alias(name),
            path,
            is_system: false,
            is_local: true,
        });
    }
    Ok(ImportData {
        name: name.to_owned(),
        alias: name.to_owned(),
        path: String::new(),
        is_system: true,
        is_local: false,
    })
}

/// Minimal filesystem surface the import machinery needs.
pub trait Fs: std::fmt::Debug {
    /// True when the path exists.
    fn stat(&self, path: &str) -> bool;

    /// Reads an entire file as text.
    fn read(&self, path: &str) -> Option<String>;

    /// A provenance string for diagnostics (scheme + root).
    fn uri(&self) -> String;
}

/// In-memory filesystem keyed by path. The default collaborator; tests
/// populate it directly.
#[derive(Debug, Default)]
pub struct MemFs {
    files: AHashMap<String, String>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, contents: impl Into<String>) {
        self.files.insert(path.into(), contents.into());
    }
}

impl Fs for MemFs {
    fn stat(&self, path: &str) -> bool {
        self.files.contains_key(path) || self.files.keys().any(|k| k.starts_with(path))
    }

    fn read(&self, path: &str) -> Option<String> {
        self.files.get(path).cloned()
    }

    fn uri(&self) -> String {
        "mem://".to_owned()
    }
}

/// Fetches a missing remote module into the modules directory.
pub trait Downloader: std::fmt::Debug {
    /// Ensures the module named by `data` exists under `modules_path`.
    fn get(&mut self, data: &ImportData, modules_path: &str) -> LangResult<()>;
}

/// The parser collaborator: turns module source text into a parsed
/// program inside the shared arena.
pub trait LexParse: std::fmt::Debug {
    fn lex_parse(&self, source: &str, file: FileId, arena: &mut Arena) -> LangResult<StmtId>;
}

/// A compilation unit read from the filesystem: where it lives and what
/// it contains. The base directory is what local imports resolve against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInput {
    /// Directory of the entry file.
    pub base: String,
    /// Path of the entry file itself.
    pub main: String,
    /// The entry file's source text.
    pub source: String,
}

/// Reads a compilation unit's entry file through the filesystem
/// collaborator. A directory path resolves to its metadata main file.
pub fn parse_input(path: &str, fs: &dyn Fs) -> LangResult<ParsedInput> {
    let main = if path.ends_with(FILE_EXTENSION) {
        path.to_owned()
    } else {
        format!("{}/main{FILE_EXTENSION}", path.trim_end_matches('/'))
    };
    let source = fs
        .read(&main)
        .ok_or_else(|| LangError::import(format!("cannot read `{main}`"), SrcSpan::default()))?;
    let base = main.rsplit_once('/').map(|(d, _)| d.to_owned()).unwrap_or_default();
    Ok(ParsedInput { base, main, source })
}

/// Registry of modules available without touching the filesystem:
/// pre-parsed programs registered by the host and embedded pure-text
/// system modules (which still need the parser collaborator).
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    parsed: AHashMap<String, StmtId>,
    text: AHashMap<String, String>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an already-parsed module program under an import name.
    pub fn register_parsed(&mut self, name: impl Into<String>, program: StmtId) {
        self.parsed.insert(name.into(), program);
    }

    /// Registers an embedded pure-text module under a system import name.
    pub fn register_text(&mut self, name: impl Into<String>, source: impl Into<String>) {
        self.text.insert(name.into(), source.into());
    }

    pub fn parsed(&self, name: &str) -> Option<StmtId> {
        self.parsed.get(name).copied()
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.text.get(name).map(String::as_str)
    }
}

/// The module import graph. Modules are vertices; an edge points from the
/// importing module to the imported one. Inserting an edge that closes a
/// cycle fails with a recursive-import error naming the offender.
#[derive(Debug, Default)]
pub struct ImportGraph {
    graph: DiGraph<String, ()>,
    nodes: AHashMap<String, NodeIndex>,
}

impl ImportGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns a module vertex, creating it on first use.
    pub fn vertex(&mut self, name: &str) -> NodeIndex {
        if let Some(n) = self.nodes.get(name) {
            return *n;
        }
        let n = self.graph.add_node(name.to_owned());
        self.nodes.insert(name.to_owned(), n);
        n
    }

    /// Records `from` importing `to`; fails when that makes the graph
    /// cyclic. The prettified chain in the error starts at `to`.
    pub fn add_import(&mut self, from: &str, to: &str, span: SrcSpan) -> LangResult<()> {
        let f = self.vertex(from);
        let t = self.vertex(to);
        let edge = self.graph.add_edge(f, t, ());
        if petgraph::algo::is_cyclic_directed(&self.graph) {
            self.graph.remove_edge(edge);
            return Err(LangError::RecursiveImport {
                name: to.to_owned(),
                span,
            });
        }
        Ok(())
    }
}

/// Where an import resolved to, for tracing and for reading the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportSource {
    /// Pre-parsed module registered with the host registry.
    Registered(StmtId),
    /// Embedded pure-text system module.
    SystemText(String),
    /// Builtin functions under the import's prefix; no source text.
    SystemBuiltins,
    /// A file on the collaborator filesystem.
    File(String),
}

/// Resolves an import to its source, searching in collaborator order:
/// registered modules, embedded text, builtin prefixes (system); base
/// relative file (local); modules directory with optional upward search
/// and downloader fallback (remote).
pub fn resolve<'a, 'b>(
    data: &ImportData,
    registry: &ModuleRegistry,
    fs: &dyn Fs,
    base: &str,
    modules_path: &str,
    downloader: Option<&'a mut (dyn Downloader + 'b)>,
    span: SrcSpan,
) -> LangResult<ImportSource>
where
    'b: 'a,
{
    if let Some(parsed) = registry.parsed(&data.name) {
        return Ok(ImportSource::Registered(parsed));
    }
    if data.is_system {
        if let Some(text) = registry.text(&data.name) {
            return Ok(ImportSource::SystemText(text.to_owned()));
        }
        // Builtin availability is checked by the caller, which owns the
        // function registry; resolution here just names the shape.
        return Ok(ImportSource::SystemBuiltins);
    }
    if data.is_local {
        let path = join(base, &data.path);
        if fs.stat(&path) {
            return Ok(ImportSource::File(path));
        }
        return Err(LangError::import(
            format!("local import `{}` not found at `{path}`", data.name),
            span,
        ));
    }
    // Remote: look under the modules directory, searching upward through
    // parent directories, then invoke the downloader once if configured.
    let rel = format!("{}main{FILE_EXTENSION}", data.path);
    if let Some(found) = search_upward(fs, base, modules_path, &rel) {
        return Ok(ImportSource::File(found));
    }
    if let Some(dl) = downloader {
        dl.get(data, modules_path)?;
        let path = join(modules_path, &rel);
        if fs.stat(&path) {
            return Ok(ImportSource::File(path));
        }
    }
    Err(LangError::import(
        format!("remote import `{}` not found under `{modules_path}`", data.name),
        span,
    ))
}

/// Looks for `modules_path/rel` beside `base`, then beside each parent of
/// `base`, then at `modules_path` itself.
fn search_upward(fs: &dyn Fs, base: &str, modules_path: &str, rel: &str) -> Option<String> {
    let mut dir = base.trim_end_matches('/').to_owned();
    loop {
        let candidate = join(&join(&format!("{dir}/"), MODULES_DIR), rel);
        if fs.stat(&candidate) {
            return Some(candidate);
        }
        match dir.rsplit_once('/') {
            Some((parent, _)) if !parent.is_empty() => dir = parent.to_owned(),
            _ => break,
        }
    }
    let candidate = join(modules_path, rel);
    fs.stat(&candidate).then_some(candidate)
}

fn join(base: &str, rel: &str) -> String {
    if base.is_empty() {
        return rel.to_owned();
    }
    format!("{}/{rel}", base.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_word_is_a_system_import() {
        let d = parse_import_name("fmt", SrcSpan::default()).expect("parse");
        assert!(d.is_system);
        assert_eq!(d.alias, "fmt");
        assert!(d.path.is_empty());
    }

    #[test]
    fn relative_file_is_a_local_import() {
        let d = parse_import_name("dir1/file.rl", SrcSpan::default()).expect("parse");
        assert!(d.is_local);
        assert_eq!(d.alias, "file");
        assert_eq!(d.path, "dir1/file.rl");
    }

    #[test]
    fn bare_directory_resolves_to_main() {
        let d = parse_import_name("dir1/", SrcSpan::default()).expect("parse");
        assert!(d.is_local);
        assert_eq!(d.path, "dir1/main.rl");
    }

    #[test]
    fn url_is_a_remote_import() {
        let d = parse_import_name("git://example.com/user/repo/", SrcSpan::default()).expect("parse");
        assert!(!d.is_system);
        assert!(!d.is_local);
        assert_eq!(d.alias, "repo");
        assert_eq!(d.path, "example.com/user/repo/");
    }

    #[test]
    fn import_cycle_is_rejected() {
        let mut g = ImportGraph::new();
        g.add_import("a", "b", SrcSpan::default()).expect("a->b");
        g.add_import("b", "c", SrcSpan::default()).expect("b->c");
        let err = g.add_import("c", "a", SrcSpan::default()).unwrap_err();
        assert!(matches!(err, LangError::RecursiveImport { name, .. } if name == "a"));
    }

    #[test]
    fn self_import_is_rejected() {
        let mut g = ImportGraph::new();
        let err = g.add_import("a", "a", SrcSpan::default()).unwrap_err();
        assert!(matches!(err, LangError::RecursiveImport { .. }));
    }
}
