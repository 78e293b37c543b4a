//! Output-side behavior: auto-edges from resource-internal declarations,
//! edge chains, and collection of exported resources.

mod common;

use common::{resource_ids, run, session_of, B};
use pretty_assertions::assert_eq;
use rill::{ast::EdgeProp, res_to_b64, ExportedResource, Resource, Value};

/// `Before => test["b"]` inside a resource synthesises a forward edge;
/// `Listen => test["b"]` synthesises a reversed, notifying edge.
#[test]
fn resource_edge_declarations_synthesise_edges() {
    let mut b = B::new();
    let nb = b.s("b");
    let rb = b.res("test", nb, vec![]);
    let na = b.s("a");
    let before_target = b.s("b");
    let before = b.res_edge(EdgeProp::Before, "test", before_target);
    let listen_target = b.s("b");
    let listen = b.res_edge(EdgeProp::Listen, "test", listen_target);
    let ra = b.res_full("test", na, vec![before, listen]);
    let program = b.program(vec![rb, ra]);

    let og = run(b, program);
    assert_eq!(og.edges.len(), 2);

    let forward = og.edges.iter().find(|e| !e.notify).expect("before edge");
    assert_eq!((forward.name1.as_str(), forward.name2.as_str()), ("a", "b"));

    let reversed = og.edges.iter().find(|e| e.notify).expect("listen edge");
    assert_eq!((reversed.name1.as_str(), reversed.name2.as_str()), ("b", "a"));
}

/// A three-endpoint chain produces one edge per adjacent pair.
#[test]
fn edge_chain_produces_adjacent_edges() {
    let mut b = B::new();
    let names: Vec<_> = ["a", "b", "c"].iter().map(|n| b.s(n)).collect();
    let resources: Vec<_> = names.iter().map(|n| b.res("test", *n, vec![])).collect();
    let ea = b.s("a");
    let eb = b.s("b");
    let ec = b.s("c");
    let edge = b.edge(
        vec![("test", ea, None), ("test", eb, None), ("test", ec, None)],
        true,
    );
    let mut body = resources;
    body.push(edge);
    let program = b.program(body);

    let og = run(b, program);
    assert_eq!(og.edges.len(), 2);
    assert!(og.edges.iter().all(|e| e.notify));
    assert_eq!((og.edges[0].name1.as_str(), og.edges[0].name2.as_str()), ("a", "b"));
    assert_eq!((og.edges[1].name1.as_str(), og.edges[1].name2.as_str()), ("b", "c"));
}

/// A list-named resource with an edge declaration fans the edge out per
/// name.
#[test]
fn list_name_fans_edges_out() {
    let mut b = B::new();
    let nt = b.s("target");
    let rt = b.res("test", nt, vec![]);
    let a = b.s("a");
    let bb = b.s("b");
    let names = b.list(vec![a, bb]);
    let target = b.s("target");
    let before = b.res_edge(EdgeProp::Before, "test", target);
    let ra = b.res_full("test", names, vec![before]);
    let program = b.program(vec![rt, ra]);

    let og = run(b, program);
    assert_eq!(og.edges.len(), 2);
    let mut froms: Vec<&str> = og.edges.iter().map(|e| e.name1.as_str()).collect();
    froms.sort_unstable();
    assert_eq!(froms, vec!["a", "b"]);
}

/// A collecting resource filters exported blobs by (name, host).
#[test]
fn collect_filters_exported_resources() {
    let mut b = B::new();
    let n = b.s("collector");
    let name_val = b.s("web1");
    let host_val = b.s("h1");
    let filter = b.strct(vec![("name", name_val), ("host", host_val)]);
    let collect = rill::ast::ResContent::Collect(rill::ast::ResCollect { value: filter });
    let res = b.res_full("test", n, vec![collect]);
    let program = b.program(vec![res]);

    let mut wanted = Resource::new("test", "web1");
    wanted
        .fields
        .insert("string_ptr".to_owned(), Value::Str("payload".to_owned()));
    let matching = res_to_b64(&ExportedResource {
        host: "h1".to_owned(),
        res: wanted.clone(),
    })
    .expect("encode");
    let wrong_host = res_to_b64(&ExportedResource {
        host: "h2".to_owned(),
        res: Resource::new("test", "web1"),
    })
    .expect("encode");
    let wrong_name = res_to_b64(&ExportedResource {
        host: "h1".to_owned(),
        res: Resource::new("test", "db1"),
    })
    .expect("encode");

    let mut session = session_of(b, program);
    session.set_exported(vec![matching, wrong_host, wrong_name]);
    let og = session.output().expect("output");
    assert_eq!(
        resource_ids(&og),
        vec!["test/collector".to_owned(), "test/web1".to_owned()]
    );
    let collected = og.resources.iter().find(|r| r.name == "web1").expect("collected");
    assert_eq!(collected.fields.get("string_ptr"), Some(&Value::Str("payload".to_owned())));
}

/// Exact duplicate resources (a shared constant class body walked from
/// two includes) collapse; conflicting ones are an error.
#[test]
fn duplicate_resources_deduplicate_when_identical() {
    let mut b = B::new();
    let n = b.s("fixed");
    let res = b.res("test", n, vec![]);
    let class = b.class("k", &[], vec![res]);
    let inc1 = b.include("k", vec![]);
    let inc2 = b.include("k", vec![]);
    let program = b.program(vec![class, inc1, inc2]);

    let og = run(b, program);
    assert_eq!(resource_ids(&og), vec!["test/fixed".to_owned()]);
}
