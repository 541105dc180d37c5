//! The route trie.
//!
//! Routes are collected into a builder tree, then serialized into a flat
//! array of nodes for cache-friendly resolution. Serialization walks the
//! builder depth-first, children in descending priority order, and
//! back-patches each node's `next_sibling` index to point just past its
//! subtree, so a resolver that follows `next_sibling` skips exactly one
//! subtree per hop. Literal segments and capture names are interned into
//! side tables; node entries index into them with `u16`s.

pub mod segment;

use std::collections::HashMap;

use self::segment::{RouterPath, Segment};
use crate::helpers::http::PercentDecoded;
use crate::helpers::split::{SegmentSplit, SplitSegment};
use crate::router::params::{Parameters, CATCH_ALL_KEY};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Token {
    Root,
    Static,
    Capture,
    PrefixCapture,
    SuffixCapture,
    Wildcard,
    PrefixWildcard,
    SuffixWildcard,
    Glob,
    Empty,
    DeadEnd,
}

#[derive(Clone, Debug)]
struct TrieNode {
    value: u16,
    token: Token,
    next_sibling: u16,
    constant: Option<u16>,
    parameter: Option<u16>,
}

enum MatchOutcome {
    Matched,
    Ignored,
    Mismatch,
}

/// Accumulates route insertions before serialization.
///
/// Insertion is lossless deduplication: two patterns sharing a key at the
/// same level merge their children, and inserting the same full pattern
/// twice overwrites the value.
pub struct TreeBuilder<V> {
    root: BuilderNode<V>,
}

struct BuilderNode<V> {
    key: Segment,
    value: Option<V>,
    children: Vec<BuilderNode<V>>,
}

impl<V> BuilderNode<V> {
    fn new(key: Segment) -> BuilderNode<V> {
        BuilderNode {
            key,
            value: None,
            children: Vec::new(),
        }
    }
}

impl<V> Default for TreeBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> TreeBuilder<V> {
    /// An empty builder.
    pub fn new() -> TreeBuilder<V> {
        TreeBuilder {
            root: BuilderNode::new(Segment::Empty),
        }
    }

    /// Inserts a route, overwriting the value of an identical earlier
    /// pattern.
    pub fn add(&mut self, path: RouterPath, value: V) {
        let mut node = &mut self.root;
        for segment in path.segments {
            let index = match node.children.iter().position(|c| c.key == segment) {
                Some(index) => index,
                None => {
                    node.children.push(BuilderNode::new(segment));
                    node.children.len() - 1
                }
            };
            node = &mut node.children[index];
        }
        node.value = Some(value);
    }

    /// Serializes the builder into its flat, immutable form.
    ///
    /// # Panics
    ///
    /// If the route table exceeds the `u16` index space (65534 nodes).
    pub fn finalize(self) -> Tree<V> {
        let mut tree = Tree {
            nodes: Vec::new(),
            constants: Vec::new(),
            parameters: Vec::new(),
            values: Vec::new(),
        };
        let mut interner = Interner::default();

        serialize(self.root, true, &mut tree, &mut interner);

        let end = tree.nodes.len() as u16;
        tree.nodes.push(TrieNode {
            value: 0,
            token: Token::DeadEnd,
            next_sibling: end + 1,
            constant: None,
            parameter: None,
        });
        tree
    }
}

#[derive(Default)]
struct Interner {
    constants: HashMap<String, u16>,
    parameters: HashMap<String, u16>,
}

fn intern(table: &mut Vec<String>, map: &mut HashMap<String, u16>, value: &str) -> u16 {
    if let Some(&index) = map.get(value) {
        return index;
    }
    assert!(
        table.len() < u16::MAX as usize,
        "route table exceeds u16 index space"
    );
    let index = table.len() as u16;
    table.push(value.to_string());
    map.insert(value.to_string(), index);
    index
}

fn serialize<V>(mut node: BuilderNode<V>, is_root: bool, tree: &mut Tree<V>, interner: &mut Interner) {
    assert!(
        tree.nodes.len() < u16::MAX as usize - 1,
        "route table exceeds u16 index space"
    );

    let value_index = tree.values.len() as u16;
    tree.values.push(node.value.take());

    let (token, constant, parameter) = match (&node.key, is_root) {
        (_, true) => (Token::Root, None, None),
        (Segment::Static(s), _) => (
            Token::Static,
            Some(intern(&mut tree.constants, &mut interner.constants, s)),
            None,
        ),
        (Segment::Capture(name), _) => (
            Token::Capture,
            None,
            Some(intern(&mut tree.parameters, &mut interner.parameters, name)),
        ),
        (Segment::PrefixCapture { suffix, name }, _) => (
            Token::PrefixCapture,
            Some(intern(&mut tree.constants, &mut interner.constants, suffix)),
            Some(intern(&mut tree.parameters, &mut interner.parameters, name)),
        ),
        (Segment::SuffixCapture { prefix, name }, _) => (
            Token::SuffixCapture,
            Some(intern(&mut tree.constants, &mut interner.constants, prefix)),
            Some(intern(&mut tree.parameters, &mut interner.parameters, name)),
        ),
        (Segment::Wildcard, _) => (Token::Wildcard, None, None),
        (Segment::PrefixWildcard(suffix), _) => (
            Token::PrefixWildcard,
            Some(intern(&mut tree.constants, &mut interner.constants, suffix)),
            None,
        ),
        (Segment::SuffixWildcard(prefix), _) => (
            Token::SuffixWildcard,
            Some(intern(&mut tree.constants, &mut interner.constants, prefix)),
            None,
        ),
        (Segment::Glob, _) => (Token::Glob, None, None),
        (Segment::Empty, _) => (Token::Empty, None, None),
    };

    let node_index = tree.nodes.len();
    tree.nodes.push(TrieNode {
        value: value_index,
        token,
        next_sibling: u16::MAX,
        constant,
        parameter,
    });

    // Descending priority; the stable sort keeps build order among equals.
    let mut children = std::mem::take(&mut node.children);
    children.sort_by_key(|c| std::cmp::Reverse(c.key.priority()));
    for child in children {
        serialize(child, false, tree, interner);
    }

    tree.nodes[node_index].next_sibling = tree.nodes.len() as u16;
}

/// The serialized route trie: parallel `nodes`/`values` arrays plus interned
/// constants and capture names.
pub struct Tree<V> {
    nodes: Vec<TrieNode>,
    constants: Vec<String>,
    parameters: Vec<String>,
    values: Vec<Option<V>>,
}

impl<V> Tree<V> {
    /// Resolves a request path to a value and its extracted parameters.
    ///
    /// Resolution is deterministic and never backtracks across levels: at
    /// each level the first matching sibling, in serialized priority order,
    /// decides the subtree descended.
    pub fn resolve(&self, path: &str) -> Option<(&V, Parameters)> {
        let components: Vec<SplitSegment<'_>> = SegmentSplit::new(path, b'/').collect();
        self.resolve_from(path, &components, 0, 0, Parameters::new())
    }

    fn resolve_from(
        &self,
        path: &str,
        components: &[SplitSegment<'_>],
        mut component_index: usize,
        mut matched_index: usize,
        mut parameters: Parameters,
    ) -> Option<(&V, Parameters)> {
        loop {
            let matched = &self.nodes[matched_index];
            let level_start = matched_index + 1;
            let level_end = matched.next_sibling as usize;

            if component_index >= components.len() {
                if let Some(value) = self.values[matched.value as usize].as_ref() {
                    return Some((value, parameters));
                }
                // `/` routes live on an Empty child; a glob child matches
                // zero trailing segments.
                if let Some(found) = self.find_token(level_start, level_end, Token::Empty) {
                    let node = &self.nodes[found];
                    if let Some(value) = self.values[node.value as usize].as_ref() {
                        return Some((value, parameters));
                    }
                }
                if let Some(found) = self.find_token(level_start, level_end, Token::Glob) {
                    let node = &self.nodes[found];
                    if let Some(value) = self.values[node.value as usize].as_ref() {
                        parameters.insert(CATCH_ALL_KEY, "");
                        return Some((value, parameters));
                    }
                }
                return None;
            }

            let decoded = PercentDecoded::new(components[component_index].value)?;
            let found =
                self.scan_level(level_start, level_end, decoded.as_ref(), &mut parameters)?;

            if self.nodes[found].token == Token::Glob {
                return self.resolve_glob(path, components, component_index, found, parameters);
            }

            matched_index = found;
            component_index += 1;
        }
    }

    /// Tail-mode resolution below a glob node: each further component first
    /// probes the glob's children; only when no child matches is the
    /// component swallowed into the catch-all range.
    fn resolve_glob(
        &self,
        path: &str,
        components: &[SplitSegment<'_>],
        glob_component: usize,
        glob_index: usize,
        mut parameters: Parameters,
    ) -> Option<(&V, Parameters)> {
        let glob = &self.nodes[glob_index];
        let child_start = glob_index + 1;
        let child_end = glob.next_sibling as usize;

        let raw_start = components[glob_component].start;
        let mut raw_end = components[glob_component].end;

        let mut probe = glob_component + 1;
        while probe < components.len() {
            let decoded = PercentDecoded::new(components[probe].value)?;
            if let Some(found) =
                self.scan_level(child_start, child_end, decoded.as_ref(), &mut parameters)
            {
                parameters.insert(CATCH_ALL_KEY, &path[raw_start..raw_end]);
                if self.nodes[found].token == Token::Glob {
                    return self.resolve_glob(path, components, probe, found, parameters);
                }
                return self.resolve_from(path, components, probe + 1, found, parameters);
            }
            raw_end = components[probe].end;
            probe += 1;
        }

        parameters.insert(CATCH_ALL_KEY, &path[raw_start..raw_end]);
        self.values[glob.value as usize]
            .as_ref()
            .map(|value| (value, parameters))
    }

    /// Scans one sibling chain. The scan is bounded by the parent's subtree
    /// end so a mismatch chain can never wander into an uncle level.
    fn scan_level(
        &self,
        start: usize,
        end: usize,
        component: &str,
        parameters: &mut Parameters,
    ) -> Option<usize> {
        let mut index = start;
        while index < end {
            let node = &self.nodes[index];
            match self.match_component(component, node, parameters) {
                MatchOutcome::Matched => return Some(index),
                MatchOutcome::Ignored => index += 1,
                MatchOutcome::Mismatch => index = node.next_sibling as usize,
            }
        }
        None
    }

    fn find_token(&self, start: usize, end: usize, token: Token) -> Option<usize> {
        let mut index = start;
        while index < end {
            let node = &self.nodes[index];
            if node.token == token {
                return Some(index);
            }
            index = node.next_sibling as usize;
        }
        None
    }

    fn match_component(
        &self,
        component: &str,
        node: &TrieNode,
        parameters: &mut Parameters,
    ) -> MatchOutcome {
        match node.token {
            Token::Static => {
                if self.constant(node).eq_ignore_ascii_case(component) {
                    MatchOutcome::Matched
                } else {
                    MatchOutcome::Mismatch
                }
            }
            Token::Capture => {
                parameters.insert(self.parameter(node), component);
                MatchOutcome::Matched
            }
            Token::PrefixCapture => match component.strip_suffix(self.constant(node)) {
                Some(head) => {
                    parameters.insert(self.parameter(node), head);
                    MatchOutcome::Matched
                }
                None => MatchOutcome::Mismatch,
            },
            Token::SuffixCapture => match component.strip_prefix(self.constant(node)) {
                Some(tail) => {
                    parameters.insert(self.parameter(node), tail);
                    MatchOutcome::Matched
                }
                None => MatchOutcome::Mismatch,
            },
            Token::Wildcard | Token::Glob => MatchOutcome::Matched,
            Token::PrefixWildcard => {
                if component.ends_with(self.constant(node)) {
                    MatchOutcome::Matched
                } else {
                    MatchOutcome::Mismatch
                }
            }
            Token::SuffixWildcard => {
                if component.starts_with(self.constant(node)) {
                    MatchOutcome::Matched
                } else {
                    MatchOutcome::Mismatch
                }
            }
            Token::Empty => MatchOutcome::Ignored,
            Token::Root | Token::DeadEnd => MatchOutcome::Mismatch,
        }
    }

    fn constant(&self, node: &TrieNode) -> &str {
        &self.constants[node.constant.expect("token carries a constant") as usize]
    }

    fn parameter(&self, node: &TrieNode) -> &str {
        &self.parameters[node.parameter.expect("token carries a parameter") as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(routes: &[&str]) -> Tree<String> {
        let mut builder = TreeBuilder::new();
        for route in routes {
            builder.add(RouterPath::parse(route), route.to_string());
        }
        builder.finalize()
    }

    fn hit<'a>(tree: &'a Tree<String>, path: &str) -> (&'a str, Parameters) {
        let (value, params) = tree
            .resolve(path)
            .unwrap_or_else(|| panic!("expected {} to resolve", path));
        (value.as_str(), params)
    }

    #[test]
    fn literal_routes_resolve() {
        let tree = tree(&["/activate/workflow", "/activate"]);
        assert_eq!(hit(&tree, "/activate/workflow").0, "/activate/workflow");
        assert_eq!(hit(&tree, "/activate").0, "/activate");
        assert!(tree.resolve("/activate/other").is_none());
        assert!(tree.resolve("/activate/workflow/deep").is_none());
    }

    #[test]
    fn literal_matching_is_case_insensitive() {
        let tree = tree(&["/Users/Me"]);
        assert_eq!(hit(&tree, "/users/me").0, "/Users/Me");
        assert_eq!(hit(&tree, "/USERS/ME").0, "/Users/Me");
    }

    #[test]
    fn literals_win_over_captures() {
        let tree = tree(&["/users/:id", "/users/me"]);
        assert_eq!(hit(&tree, "/users/me").0, "/users/me");
        let (value, params) = hit(&tree, "/users/42");
        assert_eq!(value, "/users/:id");
        assert_eq!(params.get("id"), Some("42"));
    }

    #[test]
    fn priority_order_among_siblings() {
        let tree = tree(&["/a/*", "/a/:name", "/a/:name.json", "/a/*.css", "/a/x"]);
        assert_eq!(hit(&tree, "/a/x").0, "/a/x");
        assert_eq!(hit(&tree, "/a/report.json").0, "/a/:name.json");
        assert_eq!(hit(&tree, "/a/site.css").0, "/a/*.css");
        assert_eq!(hit(&tree, "/a/other").0, "/a/:name");
    }

    #[test]
    fn build_order_breaks_ties() {
        let mut builder = TreeBuilder::new();
        builder.add(RouterPath::parse("/tie/:first"), "first");
        builder.add(RouterPath::parse("/tie/:second"), "second");
        let tree = builder.finalize();
        // Both captures always match; the earlier insertion wins.
        let (value, params) = tree.resolve("/tie/x").unwrap();
        assert_eq!(*value, "first");
        assert_eq!(params.get("first"), Some("x"));
    }

    #[test]
    fn duplicate_pattern_overwrites_the_value() {
        let mut builder = TreeBuilder::new();
        builder.add(RouterPath::parse("/dup"), 1);
        builder.add(RouterPath::parse("/dup"), 2);
        let tree = builder.finalize();
        assert_eq!(*tree.resolve("/dup").unwrap().0, 2);
    }

    #[test]
    fn capture_bindings_are_exact() {
        let tree = tree(&["/files/:file.json", "/avatar-:size", "/img-*"]);

        let (_, params) = hit(&tree, "/files/report.json");
        assert_eq!(params.get("file"), Some("report"));

        let (_, params) = hit(&tree, "/avatar-large");
        assert_eq!(params.get("size"), Some("large"));

        let (value, params) = hit(&tree, "/img-topbar");
        assert_eq!(value, "/img-*");
        assert!(params.is_empty());
    }

    #[test]
    fn the_empty_path_routes_through_the_sentinel() {
        let tree = tree(&["/", "/a"]);
        assert_eq!(hit(&tree, "/").0, "/");
        assert_eq!(hit(&tree, "").0, "/");
        assert_eq!(hit(&tree, "/a").0, "/a");
        assert_eq!(hit(&tree, "/a/").0, "/a");
    }

    #[test]
    fn missing_root_route_is_a_miss() {
        let tree = tree(&["/a"]);
        assert!(tree.resolve("/").is_none());
    }

    #[test]
    fn glob_binds_the_raw_tail() {
        let tree = tree(&["/files/**"]);
        let (_, params) = hit(&tree, "/files/a/b/c.txt");
        assert_eq!(params.catch_all(), Some("a/b/c.txt"));
        assert_eq!(params.get(CATCH_ALL_KEY), Some("a/b/c.txt"));
    }

    #[test]
    fn glob_matches_zero_trailing_segments() {
        let tree = tree(&["/files/**"]);
        let (_, params) = hit(&tree, "/files");
        assert_eq!(params.catch_all(), Some(""));
        let (_, params) = hit(&tree, "/files/");
        assert_eq!(params.catch_all(), Some(""));
    }

    #[test]
    fn glob_tail_is_undecoded() {
        let tree = tree(&["/files/**"]);
        let (_, params) = hit(&tree, "/files/a%20b/c");
        assert_eq!(params.catch_all(), Some("a%20b/c"));
    }

    #[test]
    fn glob_yields_to_matching_children() {
        // Mirrors a glob that resumes matching at a literal island.
        let tree = tree(&["/seg8/**", "/x"]);
        let (_, params) = hit(&tree, "/seg8/some/path");
        assert_eq!(params.catch_all(), Some("some/path"));

        let mut builder = TreeBuilder::new();
        builder.add(RouterPath::parse("/**"), "outer".to_string());
        builder.add(RouterPath::parse("/**/seg9/**"), "inner".to_string());
        let tree = builder.finalize();
        let (value, params) = tree.resolve("/some/path/seg9/another/branch").unwrap();
        assert_eq!(*value, "inner");
        assert_eq!(params.catch_all(), Some("another/branch"));
    }

    #[test]
    fn a_mismatch_cannot_escape_into_an_uncle_subtree() {
        let tree = tree(&["/a/x", "/b/c"]);
        assert!(tree.resolve("/a/b/c").is_none());
        assert!(tree.resolve("/a/c").is_none());
        assert_eq!(hit(&tree, "/b/c").0, "/b/c");
    }

    #[test]
    fn first_matching_sibling_decides_the_subtree() {
        let tree = tree(&["/a/:x", "/a/b/deep"]);
        // The static `b` outranks the capture and wins the scan; it holds no
        // value of its own, and resolution does not back up to try `:x`.
        assert!(tree.resolve("/a/b").is_none());
        assert_eq!(hit(&tree, "/a/c").0, "/a/:x");
        assert_eq!(hit(&tree, "/a/b/deep").0, "/a/b/deep");
        assert!(tree.resolve("/a/c/deep").is_none());
    }

    #[test]
    fn percent_encoded_components_match_decoded() {
        let tree = tree(&["/files/:name"]);
        let (_, params) = hit(&tree, "/files/a%20b");
        assert_eq!(params.get("name"), Some("a b"));
    }

    #[test]
    fn invalid_percent_encoding_misses() {
        let tree = tree(&["/files/:name"]);
        assert!(tree.resolve("/files/%c3%28").is_none());
    }

    #[test]
    fn repeated_capture_names_overwrite() {
        let tree = tree(&["/a/:x/b/:x"]);
        let (_, params) = hit(&tree, "/a/1/b/2");
        assert_eq!(params.get("x"), Some("2"));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn deep_trees_with_shared_prefixes_merge() {
        let tree = tree(&[
            "/api/v1/users",
            "/api/v1/users/:id",
            "/api/v1/groups",
            "/api/v2/users",
        ]);
        assert_eq!(hit(&tree, "/api/v1/groups").0, "/api/v1/groups");
        assert_eq!(hit(&tree, "/api/v2/users").0, "/api/v2/users");
        let (_, params) = hit(&tree, "/api/v1/users/7");
        assert_eq!(params.get("id"), Some("7"));
    }
}
