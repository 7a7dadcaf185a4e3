//! A miniature grammar-file tree, just enough structure to exercise every
//! strategy family: named rule declarations (which nest), reference sites,
//! header directives, and comment tokens that only exist in the token
//! stream.

use std::sync::Arc;

use tessera::{
    Extractor, NameReferenceSetKey, NameSpec, NamedRegionKey, RefCandidate, RegionKind,
    RegionsKey, SingletonKey, TextRange, Token, TreeNode,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToyKind {
    File,
    Rule,
    Ref,
    Header,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeclKind {
    Rule,
    Fragment,
}

impl RegionKind for DeclKind {
    fn ordinal(self) -> u16 {
        match self {
            DeclKind::Rule => 0,
            DeclKind::Fragment => 1,
        }
    }

    fn from_ordinal(ordinal: u16) -> Option<Self> {
        match ordinal {
            0 => Some(DeclKind::Rule),
            1 => Some(DeclKind::Fragment),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct ToyData {
    kind: ToyKind,
    range: TextRange,
    text: String,
    text_range: TextRange,
    children: Vec<ToyNode>,
}

/// A cheap-to-clone tree node over shared data, the shape the engine
/// expects from real parser trees.
#[derive(Clone, Debug)]
pub struct ToyNode {
    data: Arc<ToyData>,
}

impl ToyNode {
    fn new(
        kind: ToyKind,
        range: TextRange,
        text: &str,
        text_range: TextRange,
        children: Vec<ToyNode>,
    ) -> Self {
        Self {
            data: Arc::new(ToyData {
                kind,
                range,
                text: text.to_string(),
                text_range,
                children,
            }),
        }
    }

    /// The declared or referenced identifier carried by this node.
    pub fn text(&self) -> &str {
        &self.data.text
    }

    /// Range of the identifier token itself.
    pub fn text_range(&self) -> TextRange {
        self.data.text_range
    }
}

impl TreeNode for ToyNode {
    type Kind = ToyKind;

    fn kind(&self) -> ToyKind {
        self.data.kind
    }

    fn range(&self) -> TextRange {
        self.data.range
    }

    fn children(&self) -> Vec<Self> {
        self.data.children.clone()
    }
}

pub fn range(start: u32, end: u32) -> TextRange {
    TextRange::new(start.into(), end.into())
}

pub fn file(end: u32, children: Vec<ToyNode>) -> ToyNode {
    ToyNode::new(ToyKind::File, range(0, end), "", range(0, 0), children)
}

/// A rule declaration; the name token starts at the rule's start offset.
pub fn rule(name: &str, start: u32, end: u32, children: Vec<ToyNode>) -> ToyNode {
    let name_end = start + name.len() as u32;
    ToyNode::new(
        ToyKind::Rule,
        range(start, end),
        name,
        range(start, name_end),
        children,
    )
}

pub fn reference(name: &str, start: u32) -> ToyNode {
    let end = start + name.len() as u32;
    ToyNode::new(ToyKind::Ref, range(start, end), name, range(start, end), vec![])
}

pub fn header(text: &str, start: u32, end: u32) -> ToyNode {
    ToyNode::new(ToyKind::Header, range(start, end), text, range(start, end), vec![])
}

pub const COMMENT_TOKEN: u16 = 99;

pub fn comment_token(start: u32, end: u32) -> Token {
    Token::new(COMMENT_TOKEN, range(start, end), "// c")
}

// Keys shared by every test; key identity is (name, declared type).
pub static RULE_NAMES: NamedRegionKey<DeclKind> = NamedRegionKey::new("rule.names");
pub static RULE_BOUNDS: NamedRegionKey<DeclKind> = NamedRegionKey::new("rule.bounds");
pub static RULE_REFS: NameReferenceSetKey<DeclKind> = NameReferenceSetKey::new("rule.refs");
pub static HEADERS: RegionsKey<String> = RegionsKey::new("headers");
pub static COMMENTS: RegionsKey<u8> = RegionsKey::new("comments");
pub static GRAMMAR_NAME: SingletonKey<String> = SingletonKey::new("grammar.name");

/// The full registration used by most tests: scoped rule names with
/// bounds, references matched against them, header regions, token-scanned
/// comments, and the grammar-name singleton.
pub fn toy_extractor() -> Extractor<ToyNode> {
    Extractor::<ToyNode>::builder()
        .named_regions::<DeclKind>()
        .recording_name_positions_under(RULE_NAMES)
        .recording_bounds_under(RULE_BOUNDS)
        .scoped_by(".")
        .extracting(ToyKind::Rule, |node: &ToyNode, sink| {
            sink(NameSpec::new(node.text(), DeclKind::Rule, node.text_range()));
        })
        .collecting_references_under(RULE_REFS)
        .on(ToyKind::Ref, |node: &ToyNode| {
            Some(RefCandidate::new(node.text(), node.range()))
        })
        .finish()
        .finish()
        .regions(HEADERS)
        .on(ToyKind::Header, |node: &ToyNode, emit| {
            emit(node.text().to_string(), node.range());
        })
        .finish()
        .regions(COMMENTS)
        .scanning_tokens(
            |token| token.kind == COMMENT_TOKEN,
            |token| Some((0u8, token.range)),
        )
        .finish()
        .singleton(GRAMMAR_NAME)
        .on(ToyKind::Header, |node: &ToyNode| {
            Some((node.text().to_string(), node.range()))
        })
        .finish()
        .build()
}

/// `foo { bar; baz { foo; } }` as a rule tree: nested declarations whose
/// short names repeat at different depths.
pub fn nested_rules() -> ToyNode {
    file(
        50,
        vec![rule(
            "foo",
            0,
            48,
            vec![
                rule("bar", 8, 14, vec![]),
                rule("baz", 16, 44, vec![rule("foo", 24, 30, vec![])]),
            ],
        )],
    )
}

/// Two top-level rules where `a` references `b`, `b` references a name
/// defined nowhere, and a stray reference to `a` sits outside any rule.
pub fn referencing_rules() -> ToyNode {
    file(
        60,
        vec![
            rule("a", 0, 20, vec![reference("b", 10)]),
            rule("b", 22, 50, vec![reference("missing", 30)]),
            reference("a", 55),
        ],
    )
}
