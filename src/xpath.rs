use crate::tree::ConfigNode;

// ---------------------------------------------------------------------------
// Segment rendering — disambiguation and predicates
// ---------------------------------------------------------------------------

/// Repeatable container tag, told apart from its siblings by `@name`.
pub const ENTRY_TAG: &str = "entry";

/// `name` values of entries that never repeat; they render as a bare `entry`.
pub const SINGLETON_NAMES: [&str; 2] = ["localhost.localdomain", "vsys1"];

const TEXT_PREDICATE: &str = "[text()=";

/// Display name of a node inside a path.
///
/// An `entry` carrying a `name` outside [`SINGLETON_NAMES`] becomes
/// `entry[@name='VALUE']`; everything else is the bare tag.
pub fn segment_name<N: ConfigNode>(node: &N) -> String {
    match node.attribute("name") {
        Some(name) if node.tag() == ENTRY_TAG && !SINGLETON_NAMES.contains(&name) => {
            name_predicate(ENTRY_TAG, name)
        }
        _ => node.tag().to_string(),
    }
}

pub fn name_predicate(segment: &str, value: &str) -> String {
    format!("{segment}[@name='{value}']")
}

pub fn text_predicate(segment: &str, text: &str) -> String {
    format!("{segment}[text()='{text}']")
}

/// Joins root-to-parent ancestors and the terminal segment into `/a/b/terminal`.
pub fn build_path(ancestors: &[String], terminal: &str) -> String {
    let len = ancestors.iter().map(|a| a.len() + 1).sum::<usize>() + terminal.len() + 1;
    let mut path = String::with_capacity(len);
    for segment in ancestors {
        path.push('/');
        path.push_str(segment);
    }
    path.push('/');
    path.push_str(terminal);
    path
}

/// Drops a trailing `[text()='...']` predicate, which is not a navigable step.
pub fn strip_text_predicate(path: &str) -> &str {
    match path.find(TEXT_PREDICATE) {
        Some(idx) => &path[..idx],
        None => path,
    }
}

// ---------------------------------------------------------------------------
// Path parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Attribute { name: String, value: String },
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub tag: String,
    pub predicates: Vec<Predicate>,
}

impl Step {
    pub fn matches<N: ConfigNode>(&self, node: &N) -> bool {
        node.tag() == self.tag
            && self.predicates.iter().all(|p| match p {
                Predicate::Attribute { name, value } => node.attribute(name) == Some(value.as_str()),
                Predicate::Text(text) => node.text() == *text,
            })
    }
}

/// Parses `/a/entry[@name='x']/b[text()='y']` into steps.
///
/// A leading `/` or `./` is optional. Values run to the next `']`, so they may
/// contain `/`. Returns `None` for anything that is not a well-formed path.
pub fn parse_path(path: &str) -> Option<Vec<Step>> {
    let mut rest = path
        .strip_prefix("./")
        .or_else(|| path.strip_prefix('/'))
        .unwrap_or(path);
    let mut steps = Vec::new();

    while !rest.is_empty() {
        let tag_end = rest.find(['/', '[', ']']).unwrap_or(rest.len());
        let tag = &rest[..tag_end];
        if tag.is_empty() {
            return None;
        }
        rest = &rest[tag_end..];

        let mut predicates = Vec::new();
        while let Some(body) = rest.strip_prefix('[') {
            let (predicate, after) = parse_predicate(body)?;
            predicates.push(predicate);
            rest = after;
        }
        steps.push(Step { tag: tag.to_string(), predicates });

        if let Some(after) = rest.strip_prefix('/') {
            if after.is_empty() {
                return None;
            }
            rest = after;
        } else if !rest.is_empty() {
            return None;
        }
    }

    (!steps.is_empty()).then_some(steps)
}

fn parse_predicate(body: &str) -> Option<(Predicate, &str)> {
    let (attr, quoted) = match body.strip_prefix("text()='") {
        Some(after) => (None, after),
        None => {
            let rest = body.strip_prefix('@')?;
            let eq = rest.find("='")?;
            let name = &rest[..eq];
            if name.is_empty() || name.contains(['[', ']', '/']) {
                return None;
            }
            (Some(name), &rest[eq + 2..])
        }
    };
    let close = quoted.find("']")?;
    let value = quoted[..close].to_string();
    let predicate = match attr {
        Some(name) => Predicate::Attribute { name: name.to_string(), value },
        None => Predicate::Text(value),
    };
    Some((predicate, &quoted[close + 2..]))
}

// ---------------------------------------------------------------------------
// Path resolution
// ---------------------------------------------------------------------------

/// Finds the node a path points at, starting from the scope elements.
///
/// Every step is applied to all current candidates in document order and the
/// first node left after the last step wins, so a bare `entry` picks the
/// first `entry` sibling. Malformed or dangling paths give `None`.
pub fn resolve<'a, N: ConfigNode>(scope: &[&'a N], path: &str) -> Option<&'a N> {
    let steps = parse_path(path)?;
    let (first, rest) = steps.split_first()?;

    let mut candidates: Vec<&'a N> = scope.iter().copied().filter(|n| first.matches(*n)).collect();
    for step in rest {
        if candidates.is_empty() {
            return None;
        }
        candidates = candidates
            .into_iter()
            .flat_map(|n| n.elements())
            .filter(|c| step.matches(*c))
            .collect();
    }
    candidates.into_iter().next()
}
