//! Minimal XPath evaluator for xpath-type filters.
//!
//! Supports the expressions NETCONF clients use against result trees:
//! absolute location paths over the child axis, local-name tests, the `*`
//! wildcard, `[child='value']` equality predicates and `|` unions, e.g.
//! `/devs/dev[name='dev2'] | /devs/dev[name='dev1']`. Matches are returned
//! as child-index paths so callers can prune without parent pointers.

use netconf_xml::{local_name_of, XmlElement};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unsupported xpath expression: {0}")]
pub struct XPathParseError(String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPathExpr {
    paths: Vec<Path>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Path {
    steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    name: NameTest,
    predicates: Vec<Predicate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    Any,
    Local(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Predicate {
    child: String,
    value: String,
}

impl XPathExpr {
    pub fn parse(input: &str) -> Result<Self, XPathParseError> {
        let mut paths = Vec::new();
        for part in input.split('|') {
            paths.push(parse_path(part.trim())?);
        }
        Ok(Self { paths })
    }

    /// Index paths (relative to `root`) of every matching node; an empty
    /// path denotes `root` itself. The expression is evaluated as if `root`
    /// were the document root, matching the re-rooted evaluation the filter
    /// engine performs per top-level result child.
    pub fn matches(&self, root: &XmlElement) -> Vec<Vec<usize>> {
        let mut found: Vec<Vec<usize>> = Vec::new();
        for path in &self.paths {
            let Some((first, rest)) = path.steps.split_first() else {
                continue;
            };
            if !first.matches(root) {
                continue;
            }
            descend(root, rest, &mut Vec::new(), &mut found);
        }
        found.sort();
        found.dedup();
        found
    }
}

fn descend(
    node: &XmlElement,
    steps: &[Step],
    prefix: &mut Vec<usize>,
    found: &mut Vec<Vec<usize>>,
) {
    let Some((step, rest)) = steps.split_first() else {
        found.push(prefix.clone());
        return;
    };
    for (index, child) in node.children.iter().enumerate() {
        if step.matches(child) {
            prefix.push(index);
            descend(child, rest, prefix, found);
            prefix.pop();
        }
    }
}

impl Step {
    fn matches(&self, node: &XmlElement) -> bool {
        let name_ok = match &self.name {
            NameTest::Any => true,
            NameTest::Local(local) => node.local_name() == local,
        };
        name_ok && self.predicates.iter().all(|predicate| predicate.matches(node))
    }
}

impl Predicate {
    fn matches(&self, node: &XmlElement) -> bool {
        node.children_named(&self.child)
            .any(|child| child.trimmed_text() == self.value)
    }
}

fn parse_path(input: &str) -> Result<Path, XPathParseError> {
    if input.is_empty() {
        return Err(XPathParseError("empty location path".to_string()));
    }
    let body = input.strip_prefix('/').unwrap_or(input);
    if body.starts_with('/') {
        // Descendant axis ("//") is outside the supported subset.
        return Err(XPathParseError(input.to_string()));
    }

    let mut steps = Vec::new();
    for raw_step in split_steps(body)? {
        steps.push(parse_step(&raw_step, input)?);
    }
    if steps.is_empty() {
        return Err(XPathParseError(input.to_string()));
    }
    Ok(Path { steps })
}

/// Split on `/` outside predicate brackets.
fn split_steps(body: &str) -> Result<Vec<String>, XPathParseError> {
    let mut steps = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for ch in body.chars() {
        match ch {
            '[' => {
                depth += 1;
                current.push(ch);
            }
            ']' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| XPathParseError(body.to_string()))?;
                current.push(ch);
            }
            '/' if depth == 0 => {
                steps.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    if depth != 0 {
        return Err(XPathParseError(body.to_string()));
    }
    steps.push(current);
    Ok(steps)
}

fn parse_step(raw: &str, whole: &str) -> Result<Step, XPathParseError> {
    let raw = raw.trim();
    let (name_part, mut rest) = match raw.find('[') {
        Some(at) => (&raw[..at], &raw[at..]),
        None => (raw, ""),
    };

    let name_part = name_part.trim();
    if name_part.is_empty() {
        return Err(XPathParseError(whole.to_string()));
    }
    let name = if name_part == "*" {
        NameTest::Any
    } else {
        if !is_name(name_part) {
            return Err(XPathParseError(whole.to_string()));
        }
        NameTest::Local(local_name_of(name_part).to_string())
    };

    let mut predicates = Vec::new();
    while !rest.is_empty() {
        let close = rest
            .find(']')
            .ok_or_else(|| XPathParseError(whole.to_string()))?;
        let inner = rest[1..close].trim();
        predicates.push(parse_predicate(inner, whole)?);
        rest = rest[close + 1..].trim_start();
        if !rest.is_empty() && !rest.starts_with('[') {
            return Err(XPathParseError(whole.to_string()));
        }
    }

    Ok(Step { name, predicates })
}

fn parse_predicate(inner: &str, whole: &str) -> Result<Predicate, XPathParseError> {
    let (child, value) = inner
        .split_once('=')
        .ok_or_else(|| XPathParseError(whole.to_string()))?;
    let child = child.trim();
    if !is_name(child) {
        return Err(XPathParseError(whole.to_string()));
    }
    let value = value.trim();
    let unquoted = value
        .strip_prefix('\'')
        .and_then(|v| v.strip_suffix('\''))
        .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
        .ok_or_else(|| XPathParseError(whole.to_string()))?;
    Ok(Predicate {
        child: local_name_of(child).to_string(),
        value: unquoted.to_string(),
    })
}

fn is_name(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|ch| ch.is_alphanumeric() || matches!(ch, '-' | '_' | '.' | ':'))
}
