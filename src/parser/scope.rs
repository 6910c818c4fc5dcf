//! Tree-scoped include/exclude filtering.
//!
//! The filter is walked with [`ScopeFilter::enter_node`] and
//! [`ScopeFilter::exit_node`] while a document is parsed. Every open node has a
//! [`Frame`] on a stack that records whether the subtree from that node down is
//! included, whether the node is a skip point, and whether it passes the
//! localname filter.
//!
//! Each list entry is either a literal local name or, when it starts with `/`,
//! a regular expression matched against the whole full path of the node, e.g.
//! `/B/B1/B1a/` for `B1a` inside `B1` inside `B`.

use crate::constants::PATH_SEPARATOR;
use crate::errors::AppResult;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashSet;
use thiserror::Error;

/// Raised when a node is exited that was never entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("unbalanced tree: exit without matching enter")]
pub struct StructureError;

/// The four filter lists as they appear in configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilterLists {
    /// Subtrees switched on, starting at a matching node
    pub include: Vec<String>,
    /// Subtrees switched off inside an included subtree
    pub exclude: Vec<String>,
    /// Nodes after which the document is not read any further
    pub skip_after: Vec<String>,
    /// Only nodes matching one of these produce rows (empty = all)
    pub localnames: Vec<String>,
}

/// One entry of a filter list.
#[derive(Debug, Clone)]
pub enum FilterItem {
    Literal(String),
    PathPattern(Regex),
}

impl FilterItem {
    /// Parses a list entry; a leading separator marks a path pattern.
    pub fn parse(item: &str) -> AppResult<Self> {
        if item.starts_with(PATH_SEPARATOR) {
            // Anchored so the pattern has to match the whole path
            let regex = Regex::new(&format!("^(?:{item})$"))?;
            Ok(Self::PathPattern(regex))
        } else {
            Ok(Self::Literal(item.to_string()))
        }
    }
}

#[derive(Debug, Clone, Default)]
struct MatchList {
    literals: HashSet<String>,
    patterns: Vec<Regex>,
}

impl MatchList {
    fn new(items: &[String]) -> AppResult<Self> {
        let mut list = Self::default();
        for item in items {
            match FilterItem::parse(item)? {
                FilterItem::Literal(name) => {
                    list.literals.insert(name);
                }
                FilterItem::PathPattern(regex) => list.patterns.push(regex),
            }
        }
        Ok(list)
    }

    fn is_empty(&self) -> bool {
        self.literals.is_empty() && self.patterns.is_empty()
    }

    fn matches(&self, local_name: &str, full_path: &str) -> bool {
        self.literals.contains(local_name) || self.patterns.iter().any(|p| p.is_match(full_path))
    }
}

/// Stack entry for one open node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    included: bool,
    skipped: bool,
    localname_match: bool,
    path_len: usize,
}

impl Frame {
    pub fn is_included(&self) -> bool {
        self.included
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    pub fn matches_localname(&self) -> bool {
        self.localname_match
    }

    /// Bytes of the full path contributed by this node, separator included.
    pub fn path_len(&self) -> usize {
        self.path_len
    }
}

/// Tracks inclusion state while walking a tree.
#[derive(Debug, Clone)]
pub struct ScopeFilter {
    include: MatchList,
    exclude: MatchList,
    skip_after: MatchList,
    localnames: MatchList,
    stack: Vec<Frame>,
    full_path: String,
    include_parent: Option<String>,
    include_count: u32,
}

impl ScopeFilter {
    /// Compiles the filter lists. Fails if a path pattern is not a valid regex.
    pub fn new(lists: &FilterLists) -> AppResult<Self> {
        let mut filter = Self {
            include: MatchList::new(&lists.include)?,
            exclude: MatchList::new(&lists.exclude)?,
            skip_after: MatchList::new(&lists.skip_after)?,
            localnames: MatchList::new(&lists.localnames)?,
            stack: Vec::new(),
            full_path: String::new(),
            include_parent: None,
            include_count: 0,
        };
        filter.clear();
        Ok(filter)
    }

    /// Resets the walk to a fresh root frame.
    pub fn clear(&mut self) {
        self.full_path.clear();
        self.full_path.push(PATH_SEPARATOR);
        self.include_parent = None;
        self.include_count = 0;
        self.stack.clear();
        self.stack.push(Frame {
            included: self.include.is_empty(),
            skipped: false,
            localname_match: self.localnames.is_empty(),
            path_len: 0,
        });
    }

    /// Opens a node below the current one.
    pub fn enter_node(&mut self, local_name: &str) {
        self.full_path.push_str(local_name);
        self.full_path.push(PATH_SEPARATOR);

        let was_included = self.is_included();
        let mut included = was_included;
        if was_included {
            if self.exclude.matches(local_name, &self.full_path) {
                included = false;
            }
        } else if self.include.matches(local_name, &self.full_path) {
            included = true;
            self.include_parent = Some(local_name.to_string());
            self.include_count += 1;
        }

        let frame = Frame {
            included,
            skipped: self.skip_after.matches(local_name, &self.full_path),
            localname_match: self.localnames.is_empty()
                || self.localnames.matches(local_name, &self.full_path),
            path_len: local_name.len() + 1,
        };
        self.stack.push(frame);
    }

    /// Closes the current node and returns its frame.
    ///
    /// Exiting the root frame is an error and leaves the filter untouched.
    pub fn exit_node(&mut self) -> Result<Frame, StructureError> {
        if self.stack.len() <= 1 {
            return Err(StructureError);
        }
        let frame = self.stack.pop().ok_or(StructureError)?;
        let len = self.full_path.len().saturating_sub(frame.path_len);
        self.full_path.truncate(len);
        Ok(frame)
    }

    fn top(&self) -> &Frame {
        // The root frame is never popped
        &self.stack[self.stack.len() - 1]
    }

    pub fn is_included(&self) -> bool {
        self.top().included
    }

    pub fn is_skipped(&self) -> bool {
        self.top().skipped
    }

    pub fn matches_localname(&self) -> bool {
        self.top().localname_match
    }

    pub fn full_path(&self) -> &str {
        &self.full_path
    }

    pub fn include_parent(&self) -> Option<&str> {
        self.include_parent.as_deref()
    }

    pub fn include_count(&self) -> u32 {
        self.include_count
    }

    /// Number of open nodes below the root.
    #[cfg(test)]
    fn depth(&self) -> usize {
        self.stack.len() - 1
    }
}
