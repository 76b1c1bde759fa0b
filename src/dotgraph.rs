// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Netlist graph loader.
//!
//! The structural graph comes as a DOT description where every node
//! carries a (possibly multi-line) `label` attribute with the gate
//! text and every edge is a wire. We parse the DOT language directly
//! and build an arena-indexed graph: a node's position in
//! [`Graph::nodes`] is its sequence number for the whole run.

use compact_str::CompactString;
use indexmap::{IndexMap, IndexSet};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use crate::error::{ExtractError, Result};

/// Attributes of one node, in declaration order.
pub type NodeAttrs = IndexMap<CompactString, String>;

/// The nodes whose label contains the configured key register name.
///
/// Computed once by the loader and never mutated afterwards.
#[derive(Debug, Clone, Default)]
pub struct KeyNodeSet {
    members: IndexSet<usize>,
}

impl KeyNodeSet {
    #[inline]
    pub fn contains(&self, node: usize) -> bool {
        self.members.contains(&node)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.members.iter().copied()
    }
}

/// A directed netlist graph.
///
/// All per-node vectors are indexed by the node sequence number,
/// which is the order of first appearance in the source file.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    /// Node identifier to its attributes.
    pub nodes: IndexMap<CompactString, NodeAttrs>,
    /// Edges in discovery order. Parallel edges are kept.
    pub edges: Vec<(usize, usize)>,
    /// Successor lists, insertion order preserved.
    pub adjacency: Vec<Vec<usize>>,
    pub indegree: Vec<usize>,
    pub outdegree: Vec<usize>,
    pub key_nodes: KeyNodeSet,
}

impl Graph {
    /// Load a DOT file and mark the nodes whose label contains
    /// `key_register` (case-sensitive).
    pub fn from_dot_file(path: &Path, key_register: &str) -> Result<Graph> {
        let src = std::fs::read_to_string(path)
            .map_err(|e| ExtractError::io(path, e))?;
        Graph::from_dot_str(&src, key_register, path)
    }

    /// Parse DOT source. `origin` is only used in error messages.
    pub fn from_dot_str(src: &str, key_register: &str, origin: &Path) -> Result<Graph> {
        let tokens = Lexer::new(src, origin).tokenize()?;
        let mut builder = GraphBuilder::default();
        let mut parser = Parser {
            tokens, pos: 0, origin, builder: &mut builder
        };
        parser.parse_graph()?;
        Ok(builder.finish(key_register))
    }

    #[inline]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// The node identifier of a sequence number.
    #[inline]
    pub fn node_id(&self, node: usize) -> &str {
        self.nodes.get_index(node).map(|(k, _)| k.as_str()).unwrap_or("")
    }

    /// The `label` attribute of a node, empty if absent.
    #[inline]
    pub fn label(&self, node: usize) -> &str {
        self.nodes.get_index(node)
            .and_then(|(_, attrs)| attrs.get("label"))
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    #[inline]
    pub fn degree(&self, node: usize) -> usize {
        self.indegree[node] + self.outdegree[node]
    }

    /// Root nodes: sources of some edge that are never a destination.
    pub fn roots(&self) -> Result<Vec<usize>> {
        let roots = (0..self.num_nodes())
            .filter(|&i| self.outdegree[i] > 0 && self.indegree[i] == 0)
            .collect::<Vec<_>>();
        if roots.is_empty() {
            return Err(ExtractError::NoRoots)
        }
        Ok(roots)
    }

    /// Like [`Graph::roots`], but falls back to the first enumerated
    /// node as a pseudo-root when there are none.
    pub fn roots_or_first(&self) -> Vec<usize> {
        match self.roots() {
            Ok(roots) => roots,
            Err(_) if self.num_nodes() == 0 => {
                clilog::warn!(DOT_NO_ROOT, "graph is empty, no pseudo-root available");
                vec![]
            }
            Err(_) => {
                clilog::warn!(DOT_NO_ROOT,
                              "graph has no root nodes, using first node {:?} as pseudo-root",
                              self.node_id(0));
                vec![0]
            }
        }
    }

    /// Write every label as `@@label@@`, one entry per node.
    pub fn write_label_dump(&self, path: &Path) -> Result<()> {
        let f = std::fs::File::create(path).map_err(|e| ExtractError::io(path, e))?;
        let mut buf = BufWriter::new(f);
        for i in 0..self.num_nodes() {
            writeln!(buf, "@@{}@@", self.label(i)).map_err(|e| ExtractError::io(path, e))?;
        }
        buf.flush().map_err(|e| ExtractError::io(path, e))
    }
}

#[derive(Default)]
struct GraphBuilder {
    nodes: IndexMap<CompactString, NodeAttrs>,
    edges: Vec<(usize, usize)>,
}

impl GraphBuilder {
    /// Look up or create a node. The reserved name `node` yields None.
    fn touch(&mut self, id: &str) -> Option<usize> {
        if id.eq_ignore_ascii_case("node") {
            return None
        }
        let entry = self.nodes.entry(id.into());
        let idx = entry.index();
        entry.or_default();
        Some(idx)
    }

    fn finish(self, key_register: &str) -> Graph {
        let n = self.nodes.len();
        let mut adjacency = vec![Vec::new(); n];
        let mut indegree = vec![0; n];
        let mut outdegree = vec![0; n];
        for &(s, d) in &self.edges {
            adjacency[s].push(d);
            outdegree[s] += 1;
            indegree[d] += 1;
        }
        let members = self.nodes.values().enumerate()
            .filter(|(_, attrs)| match attrs.get("label") {
                Some(label) => !label.is_empty() && label.contains(key_register),
                None => false
            })
            .map(|(i, _)| i)
            .collect();
        Graph {
            nodes: self.nodes,
            edges: self.edges,
            adjacency, indegree, outdegree,
            key_nodes: KeyNodeSet { members },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    /// Bare identifier or numeral.
    Id(String),
    /// Double-quoted string, escapes resolved.
    Quoted(String),
    /// `<...>` HTML string, inner text.
    Html(String),
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Eq,
    Colon,
    EdgeOp,
}

impl Tok {
    fn as_id(&self) -> Option<&str> {
        match self {
            Tok::Id(s) | Tok::Quoted(s) | Tok::Html(s) => Some(s),
            _ => None
        }
    }

    fn is_keyword(&self, kw: &str) -> bool {
        matches!(self, Tok::Id(s) if s.eq_ignore_ascii_case(kw))
    }
}

struct Lexer<'i> {
    src: &'i str,
    pos: usize,
    line: usize,
    origin: &'i Path,
}

impl<'i> Lexer<'i> {
    fn new(src: &'i str, origin: &'i Path) -> Self {
        Lexer { src, pos: 0, line: 1, origin }
    }

    fn err(&self, message: impl Into<String>) -> ExtractError {
        ExtractError::DotSyntax {
            path: PathBuf::from(self.origin),
            line: self.line,
            message: message.into(),
        }
    }

    #[inline]
    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    #[inline]
    fn peek2(&self) -> Option<char> {
        let mut it = self.src[self.pos..].chars();
        it.next();
        it.next()
    }

    #[inline]
    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            match (self.peek(), self.peek2()) {
                (Some(c), _) if c.is_whitespace() => { self.bump(); }
                (Some('/'), Some('/')) | (Some('#'), _) => {
                    while let Some(c) = self.bump() {
                        if c == '\n' { break }
                    }
                }
                (Some('/'), Some('*')) => {
                    let start_line = self.line;
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('*') if self.peek() == Some('/') => {
                                self.bump();
                                break
                            }
                            Some(_) => {}
                            None => {
                                self.line = start_line;
                                return Err(self.err("unterminated block comment"))
                            }
                        }
                    }
                }
                _ => return Ok(())
            }
        }
    }

    fn quoted(&mut self) -> Result<String> {
        let start_line = self.line;
        self.bump();
        let mut s = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(s),
                Some('\\') => match self.bump() {
                    Some('"') => s.push('"'),
                    Some('\\') => s.push('\\'),
                    Some('n' | 'l' | 'r') => s.push('\n'),
                    Some('\n') => {}
                    Some(c) => {
                        s.push('\\');
                        s.push(c);
                    }
                    None => break
                },
                Some(c) => s.push(c),
                None => break
            }
        }
        self.line = start_line;
        Err(self.err("unterminated string"))
    }

    fn html(&mut self) -> Result<String> {
        let start_line = self.line;
        self.bump();
        let begin = self.pos;
        let mut depth = 1;
        while let Some(c) = self.bump() {
            match c {
                '<' => depth += 1,
                '>' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(self.src[begin..self.pos - 1].to_string())
                    }
                }
                _ => {}
            }
        }
        self.line = start_line;
        Err(self.err("unterminated HTML string"))
    }

    fn bare(&mut self) -> String {
        let begin = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' || c == '.' || !c.is_ascii() {
                self.bump();
            }
            else { break }
        }
        self.src[begin..self.pos].to_string()
    }

    fn tokenize(mut self) -> Result<Vec<(Tok, usize)>> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia()?;
            let line = self.line;
            let c = match self.peek() {
                Some(c) => c,
                None => break
            };
            let tok = match c {
                '{' => { self.bump(); Tok::LBrace }
                '}' => { self.bump(); Tok::RBrace }
                '[' => { self.bump(); Tok::LBracket }
                ']' => { self.bump(); Tok::RBracket }
                ';' => { self.bump(); Tok::Semi }
                ',' => { self.bump(); Tok::Comma }
                '=' => { self.bump(); Tok::Eq }
                ':' => { self.bump(); Tok::Colon }
                '-' if matches!(self.peek2(), Some('>' | '-')) => {
                    self.bump();
                    self.bump();
                    Tok::EdgeOp
                }
                '-' => {
                    self.bump();
                    let rest = self.bare();
                    Tok::Id(format!("-{}", rest))
                }
                '"' => {
                    let mut s = self.quoted()?;
                    // "a" + "b" concatenation
                    loop {
                        let save = (self.pos, self.line);
                        self.skip_trivia()?;
                        if self.peek() == Some('+') {
                            self.bump();
                            self.skip_trivia()?;
                            if self.peek() == Some('"') {
                                s.push_str(&self.quoted()?);
                                continue
                            }
                            return Err(self.err("expected string after '+'"))
                        }
                        (self.pos, self.line) = save;
                        break
                    }
                    Tok::Quoted(s)
                }
                '<' => Tok::Html(self.html()?),
                c if c.is_alphanumeric() || c == '_' || c == '.' || !c.is_ascii() => {
                    Tok::Id(self.bare())
                }
                c => return Err(self.err(format!("unexpected character {:?}", c)))
            };
            tokens.push((tok, line));
        }
        Ok(tokens)
    }
}

struct Parser<'i, 'b> {
    tokens: Vec<(Tok, usize)>,
    pos: usize,
    origin: &'i Path,
    builder: &'b mut GraphBuilder,
}

impl Parser<'_, '_> {
    fn err(&self, message: impl Into<String>) -> ExtractError {
        let line = self.tokens.get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|(_, l)| *l)
            .unwrap_or(1);
        ExtractError::DotSyntax {
            path: PathBuf::from(self.origin),
            line,
            message: message.into(),
        }
    }

    #[inline]
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    #[inline]
    fn peek_at(&self, offset: usize) -> Option<&Tok> {
        self.tokens.get(self.pos + offset).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<Tok> {
        let t = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, want: Tok) -> Result<()> {
        match self.next() {
            Some(t) if t == want => Ok(()),
            Some(t) => {
                self.pos -= 1;
                Err(self.err(format!("expected {:?}, found {:?}", want, t)))
            }
            None => Err(self.err(format!("expected {:?}, found end of file", want)))
        }
    }

    fn expect_id(&mut self) -> Result<String> {
        match self.next() {
            Some(t) => match t.as_id() {
                Some(s) => Ok(s.to_string()),
                None => {
                    self.pos -= 1;
                    Err(self.err(format!("expected identifier, found {:?}", t)))
                }
            },
            None => Err(self.err("expected identifier, found end of file"))
        }
    }

    fn parse_graph(&mut self) -> Result<()> {
        if matches!(self.peek(), Some(t) if t.is_keyword("strict")) {
            self.pos += 1;
        }
        match self.next() {
            Some(t) if t.is_keyword("digraph") || t.is_keyword("graph") => {}
            _ => {
                self.pos = self.pos.saturating_sub(1);
                return Err(self.err("expected `digraph` or `graph`"))
            }
        }
        if matches!(self.peek(), Some(t) if t.as_id().is_some()) {
            self.pos += 1;
        }
        self.expect(Tok::LBrace)?;
        self.parse_stmt_list()?;
        self.expect(Tok::RBrace)?;
        if self.peek().is_some() {
            clilog::warn!(DOT_TRAILING, "{}: ignoring content after the first graph",
                          self.origin.display());
        }
        Ok(())
    }

    /// Parse statements until the closing brace (not consumed).
    /// Returns every node mentioned, for subgraph edge operands.
    fn parse_stmt_list(&mut self) -> Result<Vec<usize>> {
        let mut mentioned = Vec::new();
        loop {
            match self.peek() {
                None | Some(Tok::RBrace) => return Ok(mentioned),
                Some(Tok::Semi) => { self.pos += 1; }
                Some(_) => self.parse_stmt(&mut mentioned)?,
            }
        }
    }

    fn parse_stmt(&mut self, mentioned: &mut Vec<usize>) -> Result<()> {
        let t = match self.peek() {
            Some(t) => t.clone(),
            None => return Err(self.err("unexpected end of file"))
        };
        if t.is_keyword("node") || t.is_keyword("edge") || t.is_keyword("graph") {
            if self.peek_at(1) == Some(&Tok::LBracket) {
                self.pos += 1;
                self.parse_attr_lists()?;
                return Ok(())
            }
        }
        if self.peek_at(1) == Some(&Tok::Eq) && t.as_id().is_some() {
            self.pos += 2;
            self.expect_id()?;
            return Ok(())
        }
        let first = self.parse_operand()?;
        mentioned.extend_from_slice(&first);
        if self.peek() != Some(&Tok::EdgeOp) {
            let attrs = self.parse_attr_lists()?;
            for &n in &first {
                self.builder.nodes[n].extend(attrs.iter().cloned());
            }
            return Ok(())
        }
        let mut lhs = first;
        while self.peek() == Some(&Tok::EdgeOp) {
            self.pos += 1;
            let rhs = self.parse_operand()?;
            mentioned.extend_from_slice(&rhs);
            for &a in &lhs {
                for &b in &rhs {
                    self.builder.edges.push((a, b));
                }
            }
            lhs = rhs;
        }
        self.parse_attr_lists()?;
        Ok(())
    }

    /// A node id (with optional port) or a subgraph.
    fn parse_operand(&mut self) -> Result<Vec<usize>> {
        match self.peek() {
            Some(t) if t.is_keyword("subgraph") || *t == Tok::LBrace => {
                if t.is_keyword("subgraph") {
                    self.pos += 1;
                    if matches!(self.peek(), Some(t) if t.as_id().is_some()) {
                        self.pos += 1;
                    }
                }
                self.expect(Tok::LBrace)?;
                let nodes = self.parse_stmt_list()?;
                self.expect(Tok::RBrace)?;
                Ok(nodes)
            }
            _ => {
                let id = self.expect_id()?;
                // port and compass point are not part of the node identity
                for _ in 0..2 {
                    if self.peek() == Some(&Tok::Colon) {
                        self.pos += 1;
                        self.expect_id()?;
                    }
                }
                match self.builder.touch(&id) {
                    Some(n) => Ok(vec![n]),
                    None => {
                        clilog::debug!("skipping reserved node name {:?}", id);
                        Ok(vec![])
                    }
                }
            }
        }
    }

    fn parse_attr_lists(&mut self) -> Result<Vec<(CompactString, String)>> {
        let mut attrs = Vec::new();
        while self.peek() == Some(&Tok::LBracket) {
            self.pos += 1;
            loop {
                match self.peek() {
                    Some(Tok::RBracket) => {
                        self.pos += 1;
                        break
                    }
                    Some(Tok::Comma | Tok::Semi) => { self.pos += 1; }
                    Some(_) => {
                        let key = self.expect_id()?;
                        let value = if self.peek() == Some(&Tok::Eq) {
                            self.pos += 1;
                            self.expect_id()?
                        }
                        else { "true".to_string() };
                        attrs.push((CompactString::from(key), value));
                    }
                    None => return Err(self.err("unterminated attribute list"))
                }
            }
        }
        Ok(attrs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str, key: &str) -> Graph {
        Graph::from_dot_str(src, key, Path::new("test.dot")).unwrap()
    }

    #[test]
    fn test_basic_digraph() {
        let g = parse(r#"
            digraph G {
                node [shape=box];
                A [label="key_reg"];
                B [label="x & y"];
                C;
                A -> B;
                B -> C;
                A -> C;
            }
        "#, "key_reg");
        assert_eq!(g.num_nodes(), 3);
        assert_eq!(g.node_id(0), "A");
        assert_eq!(g.edges, vec![(0, 1), (1, 2), (0, 2)]);
        assert_eq!(g.adjacency[0], vec![1, 2]);
        assert_eq!(g.degree(0), 2);
        assert_eq!(g.degree(2), 2);
        assert!(g.key_nodes.contains(0));
        assert_eq!(g.key_nodes.len(), 1);
        assert_eq!(g.label(2), "");
    }

    #[test]
    fn test_reserved_node_and_parallel_edges() {
        let g = parse(r#"digraph { "node" [label="meta"]; "Node"; a -> b; a -> b; }"#, "zz");
        assert_eq!(g.num_nodes(), 2);
        assert_eq!(g.edges.len(), 2);
        assert_eq!(g.outdegree[0], 2);
        assert_eq!(g.indegree[1], 2);
        assert!(g.key_nodes.is_empty());
    }

    #[test]
    fn test_edge_chain_ports_and_subgraph() {
        let g = parse(r#"
            strict digraph "top" {
                // a comment
                /* block
                   comment */
                rankdir = LR;
                a:out:e -> b -> c [color=red];
                subgraph cluster_0 { d; e; }
                c -> { d e };
            }
        "#, "k");
        assert_eq!(g.node_id(1), "b");
        assert_eq!(g.edges, vec![(0, 1), (1, 2), (2, 3), (2, 4)]);
    }

    #[test]
    fn test_label_escapes_and_concat() {
        let g = parse(r#"digraph { n1 [label="AES.12:AS\nq = \"a\" " + "^ b;"]; }"#, "AES");
        assert_eq!(g.label(0), "AES.12:AS\nq = \"a\" ^ b;");
        assert!(g.key_nodes.contains(0));
    }

    #[test]
    fn test_isolated_declared_node_is_kept() {
        let g = parse(r#"digraph { lone [label="KEY ^ x"]; a -> b; }"#, "KEY");
        assert_eq!(g.num_nodes(), 3);
        assert_eq!(g.node_id(0), "lone");
        assert_eq!(g.degree(0), 0);
        assert!(g.key_nodes.contains(0));
        assert_eq!(g.roots().unwrap(), vec![1]);
        assert_eq!(crate::paths::graph_path_counts(&g), vec![1, 0, 0]);
    }

    #[test]
    fn test_roots() {
        let g = parse("digraph { a -> b; b -> c; d -> c; }", "");
        assert_eq!(g.roots().unwrap(), vec![0, 3]);
        let cyc = parse("digraph { a -> b; b -> a; }", "");
        assert!(matches!(cyc.roots(), Err(ExtractError::NoRoots)));
        assert_eq!(cyc.roots_or_first(), vec![0]);
    }

    #[test]
    fn test_label_dump() {
        let g = parse(r#"digraph { a [label="x\ny"]; b; a -> b; }"#, "");
        let dir = tempdir::TempDir::new("leakfeat_dot").unwrap();
        let p = dir.path().join("labels.txt");
        g.write_label_dump(&p).unwrap();
        assert_eq!(std::fs::read_to_string(&p).unwrap(), "@@x\ny@@\n@@@@\n");
    }

    #[test]
    fn test_syntax_error_reports_line() {
        let err = Graph::from_dot_str("digraph {\n a -> ;\n}", "", Path::new("bad.dot"))
            .unwrap_err();
        match err {
            ExtractError::DotSyntax { path, line, .. } => {
                assert_eq!(path, PathBuf::from("bad.dot"));
                assert_eq!(line, 2);
            }
            e => panic!("unexpected error {e}")
        }
    }
}
