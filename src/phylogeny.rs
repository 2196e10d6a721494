// Copyright 2020 Franklin Delehelle
// Licensed under the MIT license (http://opensource.org/licenses/MIT)
// This file may not be copied, modified, or distributed
// except according to those terms.

//! A rooted binary phylogeny stored as an arena of nodes.
//!
//! Leaves carry a taxon name and its sequence, internal nodes carry the
//! reconstructed ancestral sequence of their two children. Every node knows its
//! parent by index; the parent is set once, when the node is joined.
//!
//! A phylogeny has three read-only views:
//!
//! * the identity encoding ([`Phylogeny::to_newick`]), a Newick string with
//!   only leaf names, which parses back into the same topology,
//! * the display encoding (`Display`), the same bracket form with internal
//!   nodes labeled by their ancestral sequence, meant for inspection only,
//! * a generic graph ([`Phylogeny::to_graph`]). Each node is a taxon,
//!   identified as a string. Branch lengths are not estimated, so every edge
//!   is weighted f32::NAN.
//!
//! ```
//! use phylo_nj::phylogeny::Phylogeny;
//!
//! let tree: Phylogeny = "((a,b),('c d',e));".parse().unwrap();
//! assert_eq!(tree.leaf_names(), vec!["a", "b", "c d", "e"]);
//! assert_eq!(tree.to_newick(), "((a,b),('c d',e));");
//! ```

use std::collections::{BTreeSet, HashSet};
use std::fmt::{self, Display, Formatter, Write};
use std::ops::Index;
use std::str::FromStr;

use lazy_static::lazy_static;
use petgraph::graph::{Graph, NodeIndex};
use regex::Regex;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::sequence::Sequence;

pub type Taxon = String;
pub type Proximity = f32;

pub type Tree = Graph<Taxon, Proximity>;

/// Index of a node in its [`Phylogeny`]. Ids are handed out in creation order.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Leaf { name: Taxon },
    Internal { left: NodeId, right: NodeId },
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    id: NodeId,
    parent: Option<NodeId>,
    sequence: Sequence,
    kind: NodeKind,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// The input sequence of a leaf, or the reconstructed one of an internal node.
    pub fn sequence(&self) -> &[u8] {
        &self.sequence
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    pub fn name(&self) -> Option<&str> {
        match self.kind {
            NodeKind::Leaf { ref name } => Some(name),
            NodeKind::Internal { .. } => None,
        }
    }

    pub fn children(&self) -> Option<(NodeId, NodeId)> {
        match self.kind {
            NodeKind::Leaf { .. } => None,
            NodeKind::Internal { left, right } => Some((left, right)),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TreeError {
    #[error("node {0} does not exist")]
    UnknownNode(NodeId),
    #[error("node {0} already has a parent")]
    AlreadyJoined(NodeId),
    #[error("node {0} cannot be joined with itself")]
    SelfJoin(NodeId),
}

/// Arena of nodes forming a forest; a single root once all nodes are joined.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Phylogeny {
    nodes: Vec<Node>,
}

impl Phylogeny {
    pub fn new() -> Self {
        Phylogeny::default()
    }

    pub fn add_leaf<S: Into<Taxon>>(&mut self, name: S, sequence: Sequence) -> NodeId {
        self.push(
            sequence,
            NodeKind::Leaf {
                name: name.into(),
            },
        )
    }

    /// Create a new internal node above `left` and `right`.
    pub fn join(
        &mut self,
        left: NodeId,
        right: NodeId,
        sequence: Sequence,
    ) -> Result<NodeId, TreeError> {
        if left == right {
            return Err(TreeError::SelfJoin(left));
        }
        for &child in &[left, right] {
            match self.node(child) {
                None => return Err(TreeError::UnknownNode(child)),
                Some(node) if node.parent.is_some() => return Err(TreeError::AlreadyJoined(child)),
                Some(_) => (),
            }
        }
        let id = self.push(sequence, NodeKind::Internal { left, right });
        self.nodes[left.0].parent = Some(id);
        self.nodes[right.0].parent = Some(id);
        Ok(id)
    }

    fn push(&mut self, sequence: Sequence, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            id,
            parent: None,
            sequence,
            kind,
        });
        id
    }

    /// Total number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Leaves in creation order.
    pub fn leaves(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_leaf())
    }

    pub fn leaf_names(&self) -> Vec<&str> {
        self.leaves().filter_map(Node::name).collect()
    }

    pub fn internal_count(&self) -> usize {
        self.nodes.len() - self.leaves().count()
    }

    /// Nodes without a parent.
    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().filter(|n| n.parent.is_none()).map(Node::id)
    }

    /// The root, if the arena holds exactly one tree.
    pub fn root(&self) -> Option<NodeId> {
        let mut roots = self.roots();
        match (roots.next(), roots.next()) {
            (Some(root), None) => Some(root),
            _ => None,
        }
    }

    /// Leaves below `id` (including `id` itself if it is a leaf), left to right.
    pub fn leaves_under(&self, id: NodeId) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            match self.nodes[id.0].kind {
                NodeKind::Leaf { .. } => leaves.push(id),
                NodeKind::Internal { left, right } => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }
        leaves
    }

    /// The non-trivial bipartitions of the leaf set induced by the edges of the
    /// tree. Each split is represented by the side not containing the smallest
    /// leaf name, which makes the set independent of rooting and child order.
    pub fn splits(&self) -> BTreeSet<BTreeSet<String>> {
        let all: BTreeSet<String> = self.leaf_names().into_iter().map(str::to_owned).collect();
        let first = match all.iter().next() {
            Some(first) => first.clone(),
            None => return BTreeSet::new(),
        };
        self.nodes
            .iter()
            .filter(|n| n.parent.is_some())
            .filter_map(|n| {
                let side: BTreeSet<String> = self
                    .leaves_under(n.id)
                    .into_iter()
                    .filter_map(|l| self.nodes[l.0].name().map(str::to_owned))
                    .collect();
                if side.len() < 2 || side.len() + 2 > all.len() {
                    return None;
                }
                if side.contains(&first) {
                    Some(all.difference(&side).cloned().collect())
                } else {
                    Some(side)
                }
            })
            .collect()
    }

    /// Identity encoding: Newick with leaf names only, e.g. `((a,b),c);`.
    ///
    /// For a forest that has not been joined into a single tree, all roots are
    /// written as one multifurcation.
    pub fn to_newick(&self) -> String {
        let mut s = String::new();
        // writing into a String cannot fail
        let _ = self.write_bracketed(&mut s, Labels::Identity);
        s
    }

    fn write_bracketed<W: Write>(&self, w: &mut W, labels: Labels) -> fmt::Result {
        if let Some(root) = self.root() {
            self.write_node(w, root, labels)?;
        } else {
            w.write_char('(')?;
            for (i, root) in self.roots().enumerate() {
                if i > 0 {
                    w.write_char(',')?;
                }
                self.write_node(w, root, labels)?;
            }
            w.write_char(')')?;
        }
        w.write_char(';')
    }

    // iterative, trees may be arbitrarily deep
    fn write_node<W: Write>(&self, w: &mut W, id: NodeId, labels: Labels) -> fmt::Result {
        let mut stack = vec![Emit::Node(id)];
        while let Some(emit) = stack.pop() {
            match emit {
                Emit::Node(id) => match self.nodes[id.0].kind {
                    NodeKind::Leaf { ref name } => write_label(w, name)?,
                    NodeKind::Internal { left, right } => {
                        w.write_char('(')?;
                        stack.push(Emit::Close(id));
                        stack.push(Emit::Node(right));
                        stack.push(Emit::Comma);
                        stack.push(Emit::Node(left));
                    }
                },
                Emit::Comma => w.write_char(',')?,
                Emit::Close(id) => {
                    w.write_char(')')?;
                    if let Labels::Display = labels {
                        w.write_str(&String::from_utf8_lossy(&self.nodes[id.0].sequence))?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Generic graph view with one graph node per tree node (graph index `i`
    /// is `NodeId` `i`) and one edge from every parent to each child. Leaves are
    /// labeled by name, internal nodes by their id.
    pub fn to_graph(&self) -> Tree {
        let mut g = Tree::with_capacity(self.nodes.len(), self.nodes.len().saturating_sub(1));
        for node in &self.nodes {
            g.add_node(match node.kind {
                NodeKind::Leaf { ref name } => name.clone(),
                NodeKind::Internal { .. } => node.id.to_string(),
            });
        }
        for node in &self.nodes {
            if let Some(parent) = node.parent {
                g.add_edge(NodeIndex::new(parent.0), NodeIndex::new(node.id.0), f32::NAN);
            }
        }
        g
    }
}

/// Panics if `id` was not created by this phylogeny.
impl Index<NodeId> for Phylogeny {
    type Output = Node;
    fn index(&self, id: NodeId) -> &Self::Output {
        &self.nodes[id.0]
    }
}

#[derive(Debug, Clone, Copy)]
enum Emit {
    Node(NodeId),
    Comma,
    Close(NodeId),
}

#[derive(Debug, Clone, Copy)]
enum Labels {
    Identity,
    Display,
}

fn write_label<W: Write>(w: &mut W, label: &str) -> fmt::Result {
    let plain = !label.is_empty()
        && !label
            .chars()
            .any(|c| c.is_whitespace() || "()[]':;,".contains(c));
    if plain {
        w.write_str(label)
    } else {
        write!(w, "'{}'", label.replace('\'', "''"))
    }
}

/// Display encoding: internal nodes are labeled with their ancestral sequence.
/// Labels may repeat and are not guaranteed to parse back.
impl Display for Phylogeny {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        self.write_bracketed(f, Labels::Display)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseTreeError {
    #[error("unexpected character at offset {0}")]
    UnexpectedChar(usize),
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("expected {expected}, found {found:?}")]
    UnexpectedToken { expected: &'static str, found: String },
    #[error("node with {0} children, only binary trees are supported")]
    NotBinary(usize),
    #[error("leaf without a name")]
    MissingLabel,
    #[error("leaf name {0:?} appears more than once")]
    DuplicateLabel(String),
    #[error("branch length {0:?} is not a number")]
    BadBranchLength(String),
    #[error("input continues after the closing ';'")]
    TrailingInput,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Comma,
    Colon,
    Semicolon,
    Label(String),
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Open => "(".into(),
            Token::Close => ")".into(),
            Token::Comma => ",".into(),
            Token::Colon => ":".into(),
            Token::Semicolon => ";".into(),
            Token::Label(l) => l.clone(),
        }
    }
}

fn tokenize(s: &str) -> Result<Vec<Token>, ParseTreeError> {
    lazy_static! {
        static ref TOKEN_RE: Regex =
            Regex::new(r"^\s*(?:'((?:[^']|'')*)'|([(),:;])|([^\s(),:;'\[\]]+))").unwrap();
    }

    let mut tokens = Vec::new();
    let mut pos = 0;
    while pos < s.len() {
        let cap = match TOKEN_RE.captures(&s[pos..]) {
            Some(cap) => cap,
            None if s[pos..].trim().is_empty() => break,
            None => return Err(ParseTreeError::UnexpectedChar(pos)),
        };
        if let Some(quoted) = cap.get(1) {
            tokens.push(Token::Label(quoted.as_str().replace("''", "'")));
        } else if let Some(punct) = cap.get(2) {
            tokens.push(match punct.as_str() {
                "(" => Token::Open,
                ")" => Token::Close,
                "," => Token::Comma,
                ":" => Token::Colon,
                _ => Token::Semicolon,
            });
        } else if let Some(plain) = cap.get(3) {
            tokens.push(Token::Label(plain.as_str().to_owned()));
        }
        pos += cap[0].len();
    }
    Ok(tokens)
}

struct Parser {
    tokens: std::iter::Peekable<std::vec::IntoIter<Token>>,
    tree: Phylogeny,
    seen: HashSet<String>,
}

impl Parser {
    fn next(&mut self) -> Result<Token, ParseTreeError> {
        self.tokens.next().ok_or(ParseTreeError::UnexpectedEnd)
    }

    fn expect(&mut self, expected: Token, what: &'static str) -> Result<(), ParseTreeError> {
        let found = self.next()?;
        if found == expected {
            Ok(())
        } else {
            Err(ParseTreeError::UnexpectedToken {
                expected: what,
                found: found.describe(),
            })
        }
    }

    fn label(&mut self) -> Option<String> {
        match self.tokens.peek() {
            Some(Token::Label(_)) => match self.tokens.next() {
                Some(Token::Label(l)) => Some(l),
                _ => None,
            },
            _ => None,
        }
    }

    // branch lengths are checked but not kept
    fn branch_length(&mut self) -> Result<(), ParseTreeError> {
        if self.tokens.peek() == Some(&Token::Colon) {
            self.tokens.next();
            match self.next()? {
                Token::Label(l) => {
                    l.parse::<f64>()
                        .map_err(|_| ParseTreeError::BadBranchLength(l.clone()))?;
                }
                other => {
                    return Err(ParseTreeError::UnexpectedToken {
                        expected: "branch length",
                        found: other.describe(),
                    })
                }
            }
        }
        Ok(())
    }

    // groups still waiting for their ')' live on an explicit stack, so nesting
    // depth is not limited by the call stack
    fn subtree(&mut self) -> Result<NodeId, ParseTreeError> {
        let mut open: Vec<Vec<NodeId>> = Vec::new();
        loop {
            if self.tokens.peek() == Some(&Token::Open) {
                self.tokens.next();
                open.push(Vec::new());
                continue;
            }
            let name = self.label().ok_or(ParseTreeError::MissingLabel)?;
            if !self.seen.insert(name.clone()) {
                return Err(ParseTreeError::DuplicateLabel(name));
            }
            let mut id = self.tree.add_leaf(name, Sequence::new());
            self.branch_length()?;

            // attach the finished subtree and close every group ending here
            loop {
                let mut children = match open.pop() {
                    Some(children) => children,
                    None => return Ok(id),
                };
                children.push(id);
                match self.next()? {
                    Token::Comma => {
                        open.push(children);
                        break;
                    }
                    Token::Close => {
                        if children.len() != 2 {
                            return Err(ParseTreeError::NotBinary(children.len()));
                        }
                        // internal labels are not part of the identity encoding
                        self.label();
                        id = self
                            .tree
                            .join(children[0], children[1], Sequence::new())
                            .map_err(|_| ParseTreeError::NotBinary(children.len()))?;
                        self.branch_length()?;
                    }
                    other => {
                        return Err(ParseTreeError::UnexpectedToken {
                            expected: "',' or ')'",
                            found: other.describe(),
                        })
                    }
                }
            }
        }
    }
}

/// Parse the Newick bracket format. Node sequences are left empty.
impl FromStr for Phylogeny {
    type Err = ParseTreeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser {
            tokens: tokenize(s)?.into_iter().peekable(),
            tree: Phylogeny::new(),
            seen: HashSet::new(),
        };
        parser.subtree()?;
        parser.expect(Token::Semicolon, "';'")?;
        if parser.tokens.next().is_some() {
            return Err(ParseTreeError::TrailingInput);
        }
        Ok(parser.tree)
    }
}
