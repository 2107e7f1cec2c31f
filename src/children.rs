use crate::search::{SearchError, SearchResults};
use crate::tree::ConfigNode;
use crate::xpath::{name_predicate, resolve, strip_text_predicate, text_predicate};

/// Text made only of a newline and indentation: what an element holding
/// nothing but child elements carries before its first child.
fn is_structural_whitespace(text: &str) -> bool {
    text.strip_prefix('\n')
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(char::is_whitespace))
}

/// `parent/tag`, plus `[@name='..']` and `[text()='..']` when the child has them.
fn describe_child<N: ConfigNode>(parent: &str, child: &N) -> String {
    let mut segment = child.tag().to_string();
    if let Some(name) = child.attribute("name") {
        segment = name_predicate(&segment, name);
    }
    if let Some(text) = child.leading_text().filter(|t| !is_structural_whitespace(t)) {
        segment = text_predicate(&segment, &text);
    }
    format!("{parent}/{segment}")
}

/// Immediate children of the node at `path`, one descriptor each.
///
/// A trailing text predicate is dropped before resolving. An empty list means
/// there is nothing to show, including when the path no longer exists.
pub fn list_children<N: ConfigNode>(scope: &[&N], path: &str) -> Vec<String> {
    let parent = strip_text_predicate(path);
    let Some(node) = resolve(scope, parent) else {
        return Vec::new();
    };
    node.elements().map(|child| describe_child(parent, child)).collect()
}

/// Children of the path listed at `ordinal` in an earlier search.
pub fn children_for_ordinal<N: ConfigNode>(
    scope: &[&N],
    results: &SearchResults,
    ordinal: usize,
) -> Result<Vec<String>, SearchError> {
    let selection = results.select(ordinal)?;
    Ok(list_children(scope, selection.path))
}
