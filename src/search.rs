use std::collections::BTreeSet;

use regex::Regex;

use crate::tree::ConfigNode;
use crate::xpath::{build_path, name_predicate, segment_name, text_predicate, ENTRY_TAG};

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("keyword must contain something other than whitespace")]
    EmptyKeyword,
    #[error("invalid keyword pattern: {0}")]
    MalformedPattern(#[from] regex::Error),
    #[error("ordinal {ordinal} is not one of the listed xpaths (1-{total})")]
    OrdinalOutOfRange { ordinal: usize, total: usize },
}

/// Where in a node the keyword was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    Tag,
    Attribute,
    Text,
}

impl Category {
    /// Display order; ordinals are assigned across categories in this order.
    pub const ALL: [Category; 3] = [Category::Tag, Category::Attribute, Category::Text];

    pub fn heading(self) -> &'static str {
        match self {
            Category::Tag => "Xpaths with keyword in tags:",
            Category::Attribute => "Xpaths with keyword in attributes:",
            Category::Text => "Xpaths with keyword in text:",
        }
    }
}

/// Compiles a keyword into a case-sensitive, unanchored pattern.
pub fn compile_keyword(keyword: &str) -> Result<Regex, SearchError> {
    if keyword.trim().is_empty() {
        return Err(SearchError::EmptyKeyword);
    }
    Ok(Regex::new(keyword)?)
}

// ---------------------------------------------------------------------------
// Matchers
// ---------------------------------------------------------------------------

/// One hit: the terminal segment plus its root-to-parent ancestor chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    pub terminal: String,
    pub ancestors: Vec<String>,
}

impl MatchRecord {
    pub fn path(&self) -> String {
        build_path(&self.ancestors, &self.terminal)
    }
}

/// Depth-first walk handing every node its disambiguated ancestor chain.
/// The chain is extended and popped in place, so each node costs one segment.
fn walk<'a, N, F>(scope: &[&'a N], visit: &mut F)
where
    N: ConfigNode,
    F: FnMut(&'a N, &[String]),
{
    fn descend<'a, N, F>(node: &'a N, chain: &mut Vec<String>, visit: &mut F)
    where
        N: ConfigNode,
        F: FnMut(&'a N, &[String]),
    {
        visit(node, chain);
        chain.push(segment_name(node));
        for child in node.elements() {
            descend(child, chain, visit);
        }
        chain.pop();
    }

    let mut chain = Vec::new();
    for node in scope {
        descend(*node, &mut chain, visit);
    }
}

/// Nodes whose tag matches. Childless nodes with text end in a text predicate.
pub fn tag_matches<N: ConfigNode>(scope: &[&N], re: &Regex) -> Vec<MatchRecord> {
    let mut records = Vec::new();
    walk(scope, &mut |node: &N, ancestors: &[String]| {
        if !re.is_match(node.tag()) {
            return;
        }
        let segment = segment_name(node);
        let text = node.text();
        let terminal = if !node.has_elements() && !text.is_empty() {
            text_predicate(&segment, &text)
        } else {
            segment
        };
        records.push(MatchRecord { terminal, ancestors: ancestors.to_vec() });
    });
    records
}

/// Nodes whose `name` attribute matches.
pub fn attribute_matches<N: ConfigNode>(scope: &[&N], re: &Regex) -> Vec<MatchRecord> {
    let mut records = Vec::new();
    walk(scope, &mut |node: &N, ancestors: &[String]| {
        let Some(value) = node.attribute("name") else { return };
        if !re.is_match(value) {
            return;
        }
        // The matched value is the predicate itself, singleton or not.
        let terminal = if node.tag() == ENTRY_TAG {
            name_predicate(ENTRY_TAG, value)
        } else {
            node.tag().to_string()
        };
        records.push(MatchRecord { terminal, ancestors: ancestors.to_vec() });
    });
    records
}

/// Text runs that match, attached to the element that contains them.
pub fn text_matches<N: ConfigNode>(scope: &[&N], re: &Regex) -> Vec<MatchRecord> {
    let mut records = Vec::new();
    walk(scope, &mut |node: &N, ancestors: &[String]| {
        let mut segment = None;
        for run in node.text_runs().filter(|run| re.is_match(run)) {
            let segment = segment.get_or_insert_with(|| segment_name(node));
            records.push(MatchRecord {
                terminal: text_predicate(segment.as_str(), run),
                ancestors: ancestors.to_vec(),
            });
        }
    });
    records
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Result listing of one search cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResults {
    pub tags: Vec<String>,
    pub attributes: Vec<String>,
    pub text: Vec<String>,
}

/// A listed path picked by its ordinal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection<'a> {
    pub ordinal: usize,
    pub category: Category,
    pub index: usize,
    pub path: &'a str,
}

impl SearchResults {
    /// Deduplicates and sorts each list on its own.
    pub fn from_lists(
        tags: impl IntoIterator<Item = String>,
        attributes: impl IntoIterator<Item = String>,
        text: impl IntoIterator<Item = String>,
    ) -> Self {
        fn sorted(paths: impl IntoIterator<Item = String>) -> Vec<String> {
            paths.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
        }
        Self { tags: sorted(tags), attributes: sorted(attributes), text: sorted(text) }
    }

    pub fn list(&self, category: Category) -> &[String] {
        match category {
            Category::Tag => &self.tags,
            Category::Attribute => &self.attributes,
            Category::Text => &self.text,
        }
    }

    pub fn total(&self) -> usize {
        self.tags.len() + self.attributes.len() + self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Maps a 1-based ordinal to its category and index within that category.
    pub fn locate(&self, ordinal: usize) -> Option<(Category, usize)> {
        let mut offset = ordinal.checked_sub(1)?;
        for category in Category::ALL {
            let len = self.list(category).len();
            if offset < len {
                return Some((category, offset));
            }
            offset -= len;
        }
        None
    }

    pub fn select(&self, ordinal: usize) -> Result<Selection<'_>, SearchError> {
        let (category, index) = self
            .locate(ordinal)
            .ok_or(SearchError::OrdinalOutOfRange { ordinal, total: self.total() })?;
        Ok(Selection { ordinal, category, index, path: &self.list(category)[index] })
    }

    /// `(ordinal, category, path)` in display order.
    pub fn numbered(&self) -> impl Iterator<Item = (usize, Category, &str)> {
        Category::ALL
            .into_iter()
            .flat_map(move |category| self.list(category).iter().map(move |path| (category, path.as_str())))
            .enumerate()
            .map(|(i, (category, path))| (i + 1, category, path))
    }
}

/// Runs all three matchers over the scope and aggregates their paths.
pub fn search<N: ConfigNode>(scope: &[&N], keyword: &str) -> Result<SearchResults, SearchError> {
    let re = compile_keyword(keyword)?;
    Ok(SearchResults::from_lists(
        tag_matches(scope, &re).iter().map(MatchRecord::path),
        attribute_matches(scope, &re).iter().map(MatchRecord::path),
        text_matches(scope, &re).iter().map(MatchRecord::path),
    ))
}
