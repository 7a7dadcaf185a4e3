//! End-to-end extraction over the toy tree: naming, scoping, regions,
//! singletons, token scanning, and the walk's failure modes.

mod helpers;

use std::cell::Cell;

use rstest::rstest;
use tessera::{Extractor, NameSpec, NamedRegionKey, TextSize, TreeNode, VecTokenStream};

use helpers::toy_tree::{
    COMMENTS, DeclKind, GRAMMAR_NAME, HEADERS, RULE_BOUNDS, RULE_NAMES, ToyKind, ToyNode,
    comment_token, file, header, nested_rules, range, reference, referencing_rules, rule,
    toy_extractor,
};

#[test]
fn test_nested_declarations_get_qualified_names() {
    let extraction = toy_extractor().extract(&nested_rules());
    let names = extraction.named_regions(RULE_NAMES).unwrap();

    let all: Vec<_> = names.names().collect();
    assert_eq!(all, vec!["foo", "foo.bar", "foo.baz", "foo.baz.foo"]);
    assert!(!names.has_duplicates());

    // Qualified lookup is exact; a short name finds its first declaration.
    assert_eq!(names.get("foo.baz.foo").unwrap().range(), range(24, 27));
    assert_eq!(names.get("foo").unwrap().range(), range(0, 3));
    assert_eq!(names.get("bar").unwrap().name(), "foo.bar");
}

#[test]
fn test_bounds_and_positions_recorded_separately() {
    let extraction = toy_extractor().extract(&nested_rules());
    let positions = extraction.named_regions(RULE_NAMES).unwrap();
    let bounds = extraction.named_regions(RULE_BOUNDS).unwrap();

    // Positions cover the name token, bounds the whole declaration.
    assert_eq!(positions.get("foo.baz").unwrap().range(), range(16, 19));
    assert_eq!(bounds.get("foo.baz").unwrap().range(), range(16, 44));
    assert_eq!(positions.len(), bounds.len());
}

#[test]
fn test_repeated_declaration_goes_to_duplicates() {
    let tree = file(
        40,
        vec![rule("x", 0, 10, vec![]), rule("x", 12, 25, vec![])],
    );
    let extraction = toy_extractor().extract(&tree);
    let names = extraction.named_regions(RULE_NAMES).unwrap();

    assert_eq!(names.len(), 1);
    assert_eq!(names.get("x").unwrap().range(), range(0, 1));
    let dups = names.duplicates_of("x");
    assert_eq!(dups.len(), 1);
    assert_eq!(dups[0].range(), range(12, 13));
    assert_eq!(dups[0].index(), names.get("x").unwrap().index());
}

#[test]
fn test_headers_become_regions_and_singleton() {
    let tree = file(30, vec![header("Toy", 0, 12), rule("r", 14, 28, vec![])]);
    let extraction = toy_extractor().extract(&tree);

    let headers = extraction.regions(HEADERS).unwrap();
    assert_eq!(headers.len(), 1);
    assert_eq!(headers.get(0).unwrap().value(), "Toy");

    let name = extraction.singletons(GRAMMAR_NAME).unwrap();
    assert!(name.is_exactly(&"Toy".to_string()));
}

#[test]
fn test_singleton_with_no_encounters_is_present_and_empty() {
    let extraction = toy_extractor().extract(&nested_rules());
    let name = extraction.singletons(GRAMMAR_NAME).unwrap();
    assert!(name.is_empty());
    assert!(name.first().is_none());
}

#[test]
fn test_repeated_singleton_keeps_every_encounter() {
    let tree = file(30, vec![header("A", 0, 5), header("B", 10, 15)]);
    let extraction = toy_extractor().extract(&tree);

    let name = extraction.singletons(GRAMMAR_NAME).unwrap();
    assert_eq!(name.len(), 2);
    assert_eq!(name.first(), Some(&"A".to_string()));
    assert!(!name.is_exactly_one());
    assert_eq!(name.extras().count(), 1);
}

#[test]
fn test_token_scan_collects_comments() {
    let mut tokens = VecTokenStream::new(vec![comment_token(5, 9), comment_token(20, 30)]);
    let extraction =
        toy_extractor().extract_with(&nested_rules(), Some(&mut tokens), &|| false);

    let comments = extraction.regions(COMMENTS).unwrap();
    assert_eq!(comments.len(), 2);
    assert_eq!(comments.at_offset(6.into()).unwrap().range(), range(5, 9));
    assert!(comments.at_offset(10.into()).is_none());
}

#[rstest]
#[case(25, "foo.baz.foo")]
#[case(35, "foo.baz")]
#[case(9, "foo.bar")]
#[case(46, "foo")]
fn test_bounds_at_offset_prefers_innermost(#[case] offset: u32, #[case] expected: &str) {
    let extraction = toy_extractor().extract(&nested_rules());
    let bounds = extraction.named_regions(RULE_BOUNDS).unwrap();
    let hit = bounds.at_offset(TextSize::from(offset)).unwrap();
    assert_eq!(hit.name(), expected);
}

#[test]
fn test_ancestor_gated_strategy_only_fires_below_ancestor() {
    static GATED: NamedRegionKey<DeclKind> = NamedRegionKey::new("gated");
    let extractor = Extractor::<ToyNode>::builder()
        .named_regions::<DeclKind>()
        .recording_name_positions_under(GATED)
        .extracting_below(ToyKind::Rule, ToyKind::Ref, |node: &ToyNode, sink| {
            sink(NameSpec::new(node.text(), DeclKind::Fragment, node.range()));
        })
        .finish()
        .build();

    // Two refs inside rules, one stray ref after every rule has closed.
    let tree = file(
        60,
        vec![
            rule("a", 0, 20, vec![reference("b", 10)]),
            rule("b", 22, 50, vec![reference("c", 30)]),
            reference("a", 55),
        ],
    );
    let extraction = extractor.extract(&tree);
    let gated = extraction.named_regions(GATED).unwrap();

    let names: Vec<_> = gated.names().collect();
    assert_eq!(names, vec!["b", "c"]);
    assert_eq!(gated.get("b").unwrap().kind(), DeclKind::Fragment);
}

#[test]
fn test_panicking_strategy_loses_only_its_node() {
    static NAMES: NamedRegionKey<DeclKind> = NamedRegionKey::new("names");
    let extractor = Extractor::<ToyNode>::builder()
        .named_regions::<DeclKind>()
        .recording_name_positions_under(NAMES)
        .extracting(ToyKind::Rule, |node: &ToyNode, sink| {
            assert_ne!(node.text(), "bad", "strategy rejects this rule");
            sink(NameSpec::new(node.text(), DeclKind::Rule, node.text_range()));
        })
        .finish()
        .build();

    let tree = file(
        40,
        vec![
            rule("good", 0, 10, vec![]),
            rule("bad", 12, 22, vec![]),
            rule("fine", 24, 36, vec![]),
        ],
    );
    let extraction = extractor.extract(&tree);
    let names: Vec<_> = extraction.named_regions(NAMES).unwrap().names().collect();
    assert_eq!(names, vec!["good", "fine"]);
}

#[test]
fn test_cancellation_yields_partial_extraction() {
    let visited = Cell::new(0u32);
    let cancel = || {
        visited.set(visited.get() + 1);
        visited.get() > 3
    };
    let extraction = toy_extractor().extract_with(&nested_rules(), None, &cancel);

    let names = extraction.named_regions(RULE_NAMES).unwrap();
    assert!(names.len() < 4, "walk should have stopped early");
}

#[test]
fn test_extractor_is_shareable_across_threads() {
    fn assert_shareable<T: Send + Sync>(_: &T) {}
    let extractor = toy_extractor();
    assert_shareable(&extractor);
    assert_shareable(&extractor.extract(&nested_rules()));
}

#[test]
fn test_log_string_names_every_key() {
    let extraction = toy_extractor().extract(&referencing_rules());
    let log = extraction.log_string();
    assert!(log.contains("'rule.names'"));
    assert!(log.contains("'rule.bounds'"));
    assert!(log.contains("'rule.refs'"));
    assert!(log.contains("'grammar.name'"));
    assert!(log.contains("graph 'rule.refs'"));
}

#[test]
fn test_extraction_is_deterministic() {
    let extractor = toy_extractor();
    let a = extractor.extract(&nested_rules());
    let b = extractor.extract(&nested_rules());
    assert_eq!(a, b);
    assert_eq!(a.extractors_hash(), extractor.extractors_hash());
}
