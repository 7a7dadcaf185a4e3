//! Abstraction over the caller's parse tree and token stream.
//!
//! The engine never parses source text itself. Callers adapt their parser's
//! tree to [`TreeNode`]; strategies are dispatched on the node's kind tag
//! rather than on concrete node types, so any tree shape with typed nodes
//! and byte-offset ranges fits.

use std::fmt;
use std::hash::Hash;

use smol_str::SmolStr;
use text_size::TextRange;

/// A node in the caller's parse tree.
///
/// Nodes are expected to be cheap handles (reference-counted or
/// index-based), cloned freely during traversal.
pub trait TreeNode: Clone + 'static {
    /// The closed set of node/rule types in the caller's grammar.
    type Kind: Copy + Eq + Hash + fmt::Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;

    /// Byte-offset range covered by this node, half-open.
    fn range(&self) -> TextRange;

    /// Child nodes in source order.
    fn children(&self) -> Vec<Self>;
}

/// A lexical token, for strategies that scan the token stream rather than
/// the tree (lexical facts with no grammar rule, such as comments).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: u16,
    pub range: TextRange,
    pub text: SmolStr,
}

impl Token {
    pub fn new(kind: u16, range: TextRange, text: impl Into<SmolStr>) -> Self {
        Self {
            kind,
            range,
            text: text.into(),
        }
    }
}

/// A token stream positioned over the same source as the tree, rewindable
/// to index 0 so several scan strategies can each see the full stream.
pub trait TokenStream {
    fn rewind(&mut self);

    fn next_token(&mut self) -> Option<Token>;
}

/// In-memory token stream over a pre-lexed token vector.
#[derive(Clone, Debug, Default)]
pub struct VecTokenStream {
    tokens: Vec<Token>,
    pos: usize,
}

impl VecTokenStream {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }
}

impl TokenStream for VecTokenStream {
    fn rewind(&mut self) {
        self.pos = 0;
    }

    fn next_token(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos)?.clone();
        self.pos += 1;
        Some(token)
    }
}
