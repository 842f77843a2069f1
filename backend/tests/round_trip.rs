//! End-to-end scenarios: source → store → export → source.

use bulkport::reader::CsvReader;
use bulkport::{
    Action, Automap, AutomapDictionary, AutomapOptions, CancellationToken, ExportConfig, Exporter,
    FieldMapping, FormatterRegistry, IdentifierKind, IdentifierResolver, ImportOptions,
    ImportSummary, JobLogger, MemoryStore, ProcessState, Processor, PropertyValue, Reader,
    ReaderOptions, Resource, ResourceStore, ResourceType, VocabularySet,
};

const MAPPING: &str = r#"{"id": "dcterms:identifier", "title": "dcterms:title", "subject": "dcterms:subject"}"#;

fn piped() -> ReaderOptions {
    ReaderOptions {
        separator: Some("|".to_string()),
        ..ReaderOptions::default()
    }
}

fn import(store: &MemoryStore, action: Action, content: &str) -> ImportSummary {
    let mapping = FieldMapping::from_json(MAPPING).unwrap();
    let options = ImportOptions {
        action,
        ..ImportOptions::default()
    };
    let mut reader = CsvReader::from_bytes("input.csv", content.as_bytes(), piped());
    let mut processor = Processor::new(store, mapping, options);
    processor
        .run(&mut reader, &CancellationToken::new(), &JobLogger::new())
        .unwrap()
}

fn snapshot(store: &MemoryStore) -> Vec<Resource> {
    store
        .ids(None)
        .unwrap()
        .into_iter()
        .filter_map(|id| store.get(id).unwrap())
        .collect()
}

fn subjects(store: &MemoryStore, id: u64) -> Vec<String> {
    store
        .get(id)
        .unwrap()
        .unwrap()
        .values_of("dcterms:subject")
        .iter()
        .map(PropertyValue::as_plain)
        .collect()
}

#[test]
fn test_csv_scenario_entry() {
    let content = "title,creator,description,tags,file\n\"A\",\"B\",\"C\",\"x|y\",\"f.jpg\"\n";
    let mut reader = CsvReader::from_bytes("scenario.csv", content.as_bytes(), piped());
    assert!(reader.is_valid());
    assert_eq!(reader.count().unwrap(), 1);

    let entry = reader.next_entry().unwrap().unwrap();
    assert_eq!(entry.get("title"), ["A"]);
    assert_eq!(entry.get("tags"), ["x", "y"]);
    assert_eq!(entry.get("file"), ["f.jpg"]);
    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn test_short_and_long_rows() {
    let content = "a,b,c,d,e\n1,2,3\n1,2,3,4,5,6,7\n";
    let mut reader = CsvReader::from_bytes("ragged.csv", content.as_bytes(), ReaderOptions::default());

    let short = reader.next_entry().unwrap().unwrap();
    assert_eq!(short.get("c"), ["3"]);
    assert!(short.get("d").is_empty());
    assert!(short.get("e").is_empty());

    let long = reader.next_entry().unwrap().unwrap();
    assert_eq!(long.get("e"), ["5"]);
    assert_eq!(long.fields().len(), 5);
}

#[test]
fn test_automap_keeps_field_count_and_order() {
    let automap = Automap::new(
        &VocabularySet::builtin(),
        AutomapDictionary::builtin(),
        AutomapOptions::default(),
    )
    .unwrap();
    let fields = ["Title", "nonsense", "dcterms:creator", "", "Dublin Core : Subject"];
    let targets = automap.resolve(&fields);
    assert_eq!(targets.len(), fields.len());
    assert!(targets[1].is_none());
    assert!(targets[3].is_none());
    assert_eq!(targets[2].as_ref().unwrap().to_string(), "dcterms:creator");
    assert_eq!(targets[4].as_ref().unwrap().to_string(), "dcterms:subject");
}

#[test]
fn test_import_export_round_trip() {
    let store = MemoryStore::new(VocabularySet::builtin());
    let summary = import(&store, Action::Create, "id,title,subject\nb-1,Alpha,x|y|z\nb-2,Beta,\n");
    assert_eq!(summary.state, ProcessState::Completed);
    assert_eq!(summary.created, 2);

    let config = ExportConfig {
        include: vec![
            "dcterms:identifier".to_string(),
            "dcterms:title".to_string(),
            "dcterms:subject".to_string(),
        ],
        ..ExportConfig::default()
    };
    let exporter = Exporter::new(&store, config).unwrap();
    let mut out = Vec::new();
    FormatterRegistry::default()
        .write("csv", &exporter, &mut out)
        .unwrap();

    let mut reader = CsvReader::from_bytes("export.csv", &out, piped());
    let first = reader.next_entry().unwrap().unwrap();
    assert_eq!(first.get("dcterms:identifier"), ["b-1"]);
    assert_eq!(first.get("dcterms:subject"), ["x", "y", "z"]);
    let second = reader.next_entry().unwrap().unwrap();
    assert!(second.get("dcterms:subject").is_empty());
}

#[test]
fn test_revise_twice_equals_once() {
    let store = MemoryStore::new(VocabularySet::builtin());
    import(&store, Action::Create, "id,title,subject\nb-1,Alpha,x\n");

    let revision = "id,title,subject\nb-1,Alpha (2nd),y|z\n";
    let summary = import(&store, Action::Revise, revision);
    assert_eq!(summary.updated, 1);
    let once = snapshot(&store);

    import(&store, Action::Revise, revision);
    assert_eq!(snapshot(&store), once);
    assert_eq!(subjects(&store, once[0].id), vec!["y", "z"]);
}

#[test]
fn test_append_never_reduces_cardinality() {
    let store = MemoryStore::new(VocabularySet::builtin());
    import(&store, Action::Create, "id,title,subject\nb-1,Alpha,a\n");
    let id = store.ids(Some(ResourceType::Items)).unwrap()[0];

    let mut previous = subjects(&store, id).len();
    let mut tags = vec!["a"];
    for next in ["b", "c", "d"] {
        tags.push(next);
        import(&store, Action::Append, &format!("id,title,subject\nb-1,Alpha,{}\n", tags.join("|")));
        let current = subjects(&store, id).len();
        assert!(current >= previous);
        previous = current;
    }
    assert_eq!(subjects(&store, id), vec!["a", "b", "c", "d"]);
}

#[test]
fn test_identifier_resolution_scenarios() {
    let store = MemoryStore::new(VocabularySet::builtin());
    let mut item = Resource::new(ResourceType::Items);
    item.add_value("dcterms:title", PropertyValue::literal("Foo"));
    store.insert(item).unwrap();
    let resolver = IdentifierResolver::new(&store).unwrap();
    let kind = IdentifierKind::Properties(vec!["dcterms:title".to_string()]);

    let foo = resolver.resolve_one("Foo", &kind, None, false).unwrap();
    assert!(foo.is_some());
    assert_eq!(resolver.resolve_one("foo", &kind, None, false).unwrap(), foo);

    let both = resolver.resolve(&["Foo", "foo"], &kind, None, false).unwrap();
    assert_eq!(both.get("Foo"), foo);
    assert_eq!(both.get("foo"), foo);

    let unique = resolver.resolve(&["Foo", "foo"], &kind, None, true).unwrap();
    assert_eq!(unique.count("Foo"), 1);
    assert_eq!(unique.count("foo"), 2);
    assert!(unique.has_duplicates);

    for scope in [None, Some(ResourceType::Items), Some(ResourceType::Media)] {
        assert_eq!(resolver.resolve_one("unknown", &kind, scope, true).unwrap(), None);
        assert_eq!(
            resolver.resolve_one("unknown", &IdentifierKind::InternalId, scope, false).unwrap(),
            None
        );
    }
}
