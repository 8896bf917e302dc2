#![allow(missing_docs)]

use std::io::Cursor;
use std::sync::Arc;

use graphcodec::reflect::TypeHandle;
use graphcodec::{
    BinaryFormatter, FormatterOptions, GraphCodecError, Inspector, ObjectGraph, ObjectId,
    Persistent, TypeCatalog, Value,
};
use uuid::Uuid;

#[derive(Persistent, Default, Debug, PartialEq)]
#[persist(name = "tests.api.Document", id = 10)]
struct Document {
    title: String,
    revision: u32,
    owner: Uuid,
    sections: Vec<ObjectId>,
}

#[derive(Persistent, Default, Debug, PartialEq)]
#[persist(name = "tests.api.Section")]
struct Section {
    heading: String,
    parent: Option<ObjectId>,
    children: Vec<ObjectId>,
}

#[derive(Persistent, Default, Debug)]
#[persist(name = "tests.api.Chain")]
struct Chain {
    next: Option<ObjectId>,
}

fn catalog() -> graphcodec::Result<Arc<TypeCatalog>> {
    let catalog = Arc::new(TypeCatalog::new());
    catalog
        .register::<Document>()?
        .register::<Section>()?
        .register::<Chain>()?;
    Ok(catalog)
}

// Generator of data
fn create_document(graph: &mut ObjectGraph) -> ObjectId {
    let doc = graph.insert(Document {
        title: "Integration Test".into(),
        revision: 3,
        owner: Uuid::from_u128(0x1234_5678),
        sections: Vec::new(),
    });
    let intro = graph.insert(Section {
        heading: "Intro".into(),
        parent: None,
        children: Vec::new(),
    });
    let detail = graph.insert(Section {
        heading: "Detail".into(),
        parent: Some(intro),
        children: Vec::new(),
    });
    graph
        .get_mut::<Section>(intro)
        .expect("intro")
        .children
        .push(detail);
    graph
        .get_mut::<Document>(doc)
        .expect("doc")
        .sections
        .extend([intro, detail]);
    doc
}

fn create_chain(graph: &mut ObjectGraph, len: usize) -> ObjectId {
    let mut head = graph.insert(Chain { next: None });
    for _ in 1..len {
        head = graph.insert(Chain { next: Some(head) });
    }
    head
}

fn assert_document(snapshot: &graphcodec::Snapshot) {
    let doc = snapshot.root_as::<Document>().expect("document root");
    assert_eq!(doc.title, "Integration Test");
    assert_eq!(doc.revision, 3);
    assert_eq!(doc.sections.len(), 2);

    let intro = snapshot.graph.get::<Section>(doc.sections[0]).expect("intro");
    let detail = snapshot.graph.get::<Section>(doc.sections[1]).expect("detail");
    assert_eq!(intro.children, vec![doc.sections[1]]);
    assert_eq!(detail.parent, Some(doc.sections[0]));
    assert_eq!(detail.heading, "Detail");
}

// --- TESTS ---

/// Standard File IO
/// Validate `BinaryFormatter::save`, `BinaryFormatter::load`
#[test]
#[cfg(not(target_arch = "wasm32"))]
fn test_standard_file_io() -> graphcodec::Result<()> {
    let dir = tempfile::tempdir()?;
    let file_path = dir.path().join("document.gc");
    let formatter = BinaryFormatter::new(catalog()?);

    let mut graph = ObjectGraph::new();
    let doc = create_document(&mut graph);
    formatter.save(&file_path, &graph, &Value::Object(doc))?;

    let snapshot = formatter.load(&file_path)?;
    assert_document(&snapshot);
    Ok(())
}

/// Empty files are truncated streams, not I/O failures.
#[test]
#[cfg(not(target_arch = "wasm32"))]
fn test_load_empty_file() -> graphcodec::Result<()> {
    let file = tempfile::NamedTempFile::new()?;
    let result = BinaryFormatter::new(catalog()?).load(file.path());
    assert!(matches!(
        result,
        Err(GraphCodecError::UnexpectedEndOfStream { .. })
    ));
    Ok(())
}

/// Missing files surface as I/O errors.
#[test]
fn test_load_missing_file() -> graphcodec::Result<()> {
    let dir = tempfile::tempdir()?;
    let result = BinaryFormatter::new(catalog()?).load(dir.path().join("absent.gc"));
    assert!(matches!(result, Err(GraphCodecError::Io(_))));
    Ok(())
}

/// Stream IO
/// Validate `serialize_into`, `deserialize_from`
#[test]
fn test_stream_io() -> graphcodec::Result<()> {
    let formatter = BinaryFormatter::new(catalog()?);
    let mut graph = ObjectGraph::new();
    let doc = create_document(&mut graph);

    let mut buffer = Vec::new();
    let written = formatter.serialize_into(&graph, &Value::Object(doc), &mut buffer)?;
    assert_eq!(written, buffer.len());
    assert_eq!(buffer, formatter.serialize(&graph, &Value::Object(doc))?);

    let snapshot = formatter.deserialize_from(Cursor::new(buffer))?;
    assert_document(&snapshot);
    Ok(())
}

/// Inspector
/// Validate `Inspector`, read the header without decoding the body
#[test]
fn test_inspector() -> graphcodec::Result<()> {
    let catalog = catalog()?;
    let formatter = BinaryFormatter::new(Arc::clone(&catalog));
    let mut graph = ObjectGraph::new();
    let doc = create_document(&mut graph);
    let bytes = formatter.serialize(&graph, &Value::Object(doc))?;

    let report = formatter.inspect(&bytes)?;
    assert_eq!(report.other_base, 20);
    assert_eq!(report.object_count, 3);
    assert_eq!(report.header_size + report.body_size, bytes.len());
    assert_eq!(report.root_tag.as_deref(), Some("Other+0"));

    assert_eq!(report.types.len(), 2);
    assert_eq!(report.types[0].tag, 20);
    assert_eq!(report.types[0].compact_id, Some(10));
    assert_eq!(report.types[0].name.as_deref(), Some("tests.api.Document"));
    assert!(report.types[0].resolved);
    assert_eq!(report.types[1].compact_id, None);
    assert_eq!(report.types[1].name.as_deref(), Some("tests.api.Section"));

    // Without a catalog, compact entries stay anonymous.
    let bare = Inspector::inspect(&bytes)?;
    assert_eq!(bare.types[0].name, None);
    assert!(!bare.types[0].resolved);

    let text = report.to_string();
    assert!(text.contains("3 objects"));
    assert!(text.contains("#10 tests.api.Document"));

    let json = serde_json::to_value(&report).expect("report serializes");
    assert_eq!(json["object_count"], 3);
    Ok(())
}

/// Compact ids can be switched off; headers then carry names only.
#[test]
fn test_compact_ids_disabled() -> graphcodec::Result<()> {
    let catalog = catalog()?;
    let mut graph = ObjectGraph::new();
    let doc = create_document(&mut graph);

    let compact = BinaryFormatter::new(Arc::clone(&catalog));
    let named = BinaryFormatter::builder()
        .catalog(Arc::clone(&catalog))
        .use_compact_ids(false)
        .build();

    let compact_bytes = compact.serialize(&graph, &Value::Object(doc))?;
    let named_bytes = named.serialize(&graph, &Value::Object(doc))?;
    assert!(compact_bytes.len() < named_bytes.len());

    let report = named.inspect(&named_bytes)?;
    assert_eq!(report.types[0].compact_id, None);
    assert_document(&compact.deserialize(&named_bytes)?);
    Ok(())
}

/// A compact id supplied at registration overrides the declared one.
#[test]
fn test_register_with_explicit_id() -> graphcodec::Result<()> {
    let catalog = Arc::new(TypeCatalog::new());
    catalog
        .register_with_id::<Document>(4242)?
        .register::<Section>()?;
    let formatter = BinaryFormatter::new(Arc::clone(&catalog));

    let mut graph = ObjectGraph::new();
    let doc = create_document(&mut graph);
    let bytes = formatter.serialize(&graph, &Value::Object(doc))?;

    assert_eq!(Inspector::inspect(&bytes)?.types[0].compact_id, Some(4242));
    assert_document(&formatter.deserialize(&bytes)?);
    Ok(())
}

/// Readers only resolve registered types; writers do not need registration.
#[test]
fn test_reader_requires_registration() -> graphcodec::Result<()> {
    let writer = BinaryFormatter::new(Arc::new(TypeCatalog::new()));
    let mut graph = ObjectGraph::new();
    let chain = create_chain(&mut graph, 3);
    let bytes = writer.serialize(&graph, &Value::Object(chain))?;

    assert!(matches!(
        writer.deserialize(&bytes),
        Err(GraphCodecError::UnresolvableType(_))
    ));
    let reader = BinaryFormatter::new(catalog()?);
    assert_eq!(reader.deserialize(&bytes)?.graph.len(), 3);
    Ok(())
}

/// Depth Limit
/// Validate the recursion guard on both sides of the codec
#[test]
fn test_depth_limit() -> graphcodec::Result<()> {
    let catalog = catalog()?;
    let mut graph = ObjectGraph::new();
    let head = create_chain(&mut graph, 64);

    let shallow = BinaryFormatter::builder()
        .catalog(Arc::clone(&catalog))
        .max_depth(16)
        .build();
    assert!(matches!(
        shallow.serialize(&graph, &Value::Object(head)),
        Err(GraphCodecError::DepthLimit(16))
    ));

    let deep = BinaryFormatter::new(Arc::clone(&catalog));
    let bytes = deep.serialize(&graph, &Value::Object(head))?;
    assert_eq!(deep.deserialize(&bytes)?.graph.len(), 64);
    assert!(matches!(
        shallow.deserialize(&bytes),
        Err(GraphCodecError::DepthLimit(16))
    ));
    Ok(())
}

/// Long acyclic chains exceed the default depth but encode with a raised limit.
#[test]
fn test_long_chain_with_raised_depth() -> graphcodec::Result<()> {
    let catalog = catalog()?;
    let mut graph = ObjectGraph::new();
    let head = create_chain(&mut graph, 600);

    let default = BinaryFormatter::new(Arc::clone(&catalog));
    assert!(matches!(
        default.serialize(&graph, &Value::Object(head)),
        Err(GraphCodecError::DepthLimit(512))
    ));

    let deep = BinaryFormatter::builder()
        .catalog(catalog)
        .max_depth(1024)
        .build();
    let worker = std::thread::Builder::new()
        .stack_size(64 * 1024 * 1024)
        .spawn(move || -> graphcodec::Result<usize> {
            let bytes = deep.serialize(&graph, &Value::Object(head))?;
            Ok(deep.deserialize(&bytes)?.graph.len())
        })?;
    assert_eq!(worker.join().expect("worker panicked")?, 600);
    Ok(())
}

/// Options load from partial JSON; missing keys keep their defaults.
#[test]
fn test_options_from_json() -> graphcodec::Result<()> {
    let options: FormatterOptions =
        serde_json::from_str(r#"{ "max_depth": 64, "allow_trailing_bytes": true }"#)
            .expect("valid options");

    assert_eq!(options.max_depth, 64);
    assert!(options.allow_trailing_bytes);
    assert!(options.run_callbacks);
    assert!(options.use_compact_ids);
    assert_eq!(options.initial_capacity, FormatterOptions::default().initial_capacity);

    let formatter = BinaryFormatter::with_options(catalog()?, options.clone());
    assert_eq!(formatter.options(), &options);
    Ok(())
}

/// The default formatter uses the global catalog.
#[test]
fn test_global_catalog() -> graphcodec::Result<()> {
    #[derive(Persistent, Default, Debug, PartialEq)]
    #[persist(name = "tests.api.GlobalOnly")]
    struct GlobalOnly {
        flag: bool,
    }

    TypeCatalog::global().register::<GlobalOnly>()?;
    let formatter = BinaryFormatter::default();
    assert!(Arc::ptr_eq(formatter.catalog(), &TypeCatalog::global()));

    let mut graph = ObjectGraph::new();
    let id = graph.insert(GlobalOnly { flag: true });
    let snapshot = formatter.deserialize(&formatter.serialize(&graph, &Value::Object(id))?)?;
    assert_eq!(
        snapshot.root_as::<GlobalOnly>(),
        Some(&GlobalOnly { flag: true })
    );
    Ok(())
}

/// Concurrent first use compiles each thunk exactly once.
#[test]
fn test_concurrent_thunk_compilation() -> graphcodec::Result<()> {
    let catalog = catalog()?;
    let mut graph = ObjectGraph::new();
    let doc = create_document(&mut graph);
    let graph = &graph;

    std::thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let formatter = BinaryFormatter::new(Arc::clone(&catalog));
                scope.spawn(move || -> graphcodec::Result<()> {
                    for _ in 0..20 {
                        let bytes = formatter.serialize(graph, &Value::Object(doc))?;
                        assert_document(&formatter.deserialize(&bytes)?);
                    }
                    Ok(())
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("worker panicked")?;
        }
        Ok::<_, GraphCodecError>(())
    })?;

    assert_eq!(catalog.compiler().compilations(), 2);
    assert_eq!(catalog.compiler().cached_len(), 2);
    assert!(catalog.thunk(&TypeHandle::of::<Document>()).is_ok());
    Ok(())
}
