//! XPath evaluation for statically fetched documents.
//!
//! Covers the expression shapes price pages actually need:
//! `//div[@class="price"]`, `/html/body/div`, `//span/@data-price`,
//! `//h1/text()`, `//li[2]`, `//li[last()]`, `//*[@id="total"]` and
//! `//span[contains(@class, "amount")]`. Anything outside this subset
//! evaluates to no result, which extraction reports as "absent" rather
//! than an error.

use std::collections::HashSet;

use ego_tree::{NodeId, NodeRef};
use scraper::{ElementRef, Html, Node};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq)]
enum NodeTest {
    Name(String),
    AnyElement,
    /// `text()`, only valid as the last step.
    Text,
    /// `@attr`, only valid as the last step.
    Attribute(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Predicate {
    /// `[3]`, 1-based like real XPath.
    Position(usize),
    Last,
    HasAttr(String),
    AttrEquals(String, String),
    AttrContains(String, String),
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Predicate>,
}

/// Evaluate `expr` against `doc` and return every result as a string.
/// Element results render their composed descendant text; `text()` and
/// `@attr` results are returned as-is. Unsupported expressions yield an
/// empty vector.
pub fn evaluate(doc: &Html, expr: &str) -> Vec<String> {
    let Some(steps) = parse_steps(expr) else {
        tracing::debug!("XPath expression outside the supported subset: {}", expr);
        return Vec::new();
    };
    apply_steps(doc.tree.root(), &steps)
}

/// First result of `expr`, trimmed. An empty match counts as no match.
pub fn evaluate_to_text(doc: &Html, expr: &str) -> Option<String> {
    evaluate(doc, expr)
        .into_iter()
        .next()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn apply_steps(root: NodeRef<'_, Node>, steps: &[Step]) -> Vec<String> {
    let mut context: Vec<NodeRef<'_, Node>> = vec![root];

    for (idx, step) in steps.iter().enumerate() {
        let terminal = idx + 1 == steps.len();
        match &step.test {
            NodeTest::Attribute(name) => {
                // The attribute axis reads off the context node itself.
                if !terminal || !step.predicates.is_empty() {
                    return Vec::new();
                }
                return context
                    .iter()
                    .filter_map(|node| ElementRef::wrap(*node))
                    .filter_map(|el| el.value().attr(name).map(str::to_string))
                    .collect();
            }
            NodeTest::Text => {
                if !terminal || !step.predicates.is_empty() {
                    return Vec::new();
                }
                let mut out = Vec::new();
                for node in &context {
                    collect_text(node, step.axis, &mut out);
                }
                return out;
            }
            NodeTest::Name(_) | NodeTest::AnyElement => {
                let mut next = Vec::new();
                let mut seen: HashSet<NodeId> = HashSet::new();
                for node in &context {
                    // Predicates index within each context node's own
                    // candidate list, so filtering stays per-group.
                    let mut local: Vec<NodeRef<'_, Node>> = match step.axis {
                        Axis::Child => node
                            .children()
                            .filter(|c| element_matches(c, &step.test))
                            .collect(),
                        Axis::Descendant => node
                            .descendants()
                            .skip(1)
                            .filter(|c| element_matches(c, &step.test))
                            .collect(),
                    };
                    for predicate in &step.predicates {
                        local = apply_predicate(local, predicate);
                    }
                    for candidate in local {
                        if seen.insert(candidate.id()) {
                            next.push(candidate);
                        }
                    }
                }
                context = next;
            }
        }
    }

    context
        .iter()
        .filter_map(|node| ElementRef::wrap(*node))
        .map(|el| el.text().collect::<Vec<_>>().join(" "))
        .collect()
}

fn collect_text(node: &NodeRef<'_, Node>, axis: Axis, out: &mut Vec<String>) {
    match axis {
        Axis::Child => {
            for child in node.children() {
                if let Node::Text(text) = child.value() {
                    out.push(text.text.to_string());
                }
            }
        }
        Axis::Descendant => {
            for desc in node.descendants().skip(1) {
                if let Node::Text(text) = desc.value() {
                    out.push(text.text.to_string());
                }
            }
        }
    }
}

fn element_matches(node: &NodeRef<'_, Node>, test: &NodeTest) -> bool {
    let Some(el) = ElementRef::wrap(*node) else {
        return false;
    };
    match test {
        NodeTest::AnyElement => true,
        NodeTest::Name(name) => el.value().name().eq_ignore_ascii_case(name),
        _ => false,
    }
}

fn apply_predicate<'a>(
    candidates: Vec<NodeRef<'a, Node>>,
    predicate: &Predicate,
) -> Vec<NodeRef<'a, Node>> {
    match predicate {
        Predicate::Position(position) => candidates
            .into_iter()
            .nth(position - 1)
            .into_iter()
            .collect(),
        Predicate::Last => candidates.into_iter().last().into_iter().collect(),
        Predicate::HasAttr(name) => candidates
            .into_iter()
            .filter(|c| attr_of(c, name).is_some())
            .collect(),
        Predicate::AttrEquals(name, value) => candidates
            .into_iter()
            .filter(|c| attr_of(c, name).is_some_and(|v| v == *value))
            .collect(),
        Predicate::AttrContains(name, value) => candidates
            .into_iter()
            .filter(|c| attr_of(c, name).is_some_and(|v| v.contains(value.as_str())))
            .collect(),
    }
}

fn attr_of(node: &NodeRef<'_, Node>, name: &str) -> Option<String> {
    ElementRef::wrap(*node).and_then(|el| el.value().attr(name).map(str::to_string))
}

fn parse_steps(expr: &str) -> Option<Vec<Step>> {
    let expr = expr.trim();
    if expr.is_empty() {
        return None;
    }

    // Relative expressions get descendant semantics, like a leading "//".
    let (mut pending_axis, mut rest) = if let Some(r) = expr.strip_prefix("//") {
        (Axis::Descendant, r)
    } else if let Some(r) = expr.strip_prefix('/') {
        (Axis::Child, r)
    } else {
        (Axis::Descendant, expr)
    };

    if rest.is_empty() {
        return None;
    }

    let mut steps = Vec::new();
    loop {
        let (token, next_axis, remainder) = split_step(rest)?;
        steps.push(parse_step(token, pending_axis)?);
        match next_axis {
            Some(axis) => {
                pending_axis = axis;
                rest = remainder;
            }
            None => break,
        }
    }
    Some(steps)
}

/// Split off the leading step at the first separator `/` that sits outside
/// brackets and quotes. Returns the step token, the axis introduced by the
/// separator (if any), and the remainder.
fn split_step(rest: &str) -> Option<(&str, Option<Axis>, &str)> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for (i, ch) in rest.char_indices() {
        match ch {
            '\'' | '"' => match quote {
                Some(q) if q == ch => quote = None,
                None => quote = Some(ch),
                _ => {}
            },
            '[' if quote.is_none() => depth += 1,
            ']' if quote.is_none() => depth = depth.checked_sub(1)?,
            '/' if quote.is_none() && depth == 0 => {
                let token = &rest[..i];
                let after = &rest[i..];
                let (axis, remainder) = match after.strip_prefix("//") {
                    Some(r) => (Axis::Descendant, r),
                    None => (Axis::Child, &after[1..]),
                };
                if token.is_empty() || remainder.is_empty() {
                    return None;
                }
                return Some((token, Some(axis), remainder));
            }
            _ => {}
        }
    }
    if quote.is_some() || depth != 0 {
        return None;
    }
    Some((rest, None, ""))
}

fn parse_step(token: &str, axis: Axis) -> Option<Step> {
    let token = token.trim();

    if let Some(attr) = token.strip_prefix('@') {
        if !is_valid_name(attr) {
            return None;
        }
        return Some(Step {
            axis,
            test: NodeTest::Attribute(attr.to_string()),
            predicates: Vec::new(),
        });
    }

    if token == "text()" {
        return Some(Step {
            axis,
            test: NodeTest::Text,
            predicates: Vec::new(),
        });
    }

    let (name_part, mut pred_part) = match token.find('[') {
        Some(i) => (&token[..i], &token[i..]),
        None => (token, ""),
    };

    let test = if name_part == "*" {
        NodeTest::AnyElement
    } else if is_valid_name(name_part) {
        NodeTest::Name(name_part.to_string())
    } else {
        return None;
    };

    let mut predicates = Vec::new();
    while !pred_part.is_empty() {
        let body = pred_part.strip_prefix('[')?;
        let close = predicate_end(body)?;
        predicates.push(parse_predicate(&body[..close])?);
        pred_part = &body[close + 1..];
    }

    Some(Step {
        axis,
        test,
        predicates,
    })
}

/// Position of the unquoted `]` that closes a predicate whose `[` has
/// already been consumed. Nested brackets are outside the subset.
fn predicate_end(s: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, ch) in s.char_indices() {
        match ch {
            '\'' | '"' => match quote {
                Some(q) if q == ch => quote = None,
                None => quote = Some(ch),
                _ => {}
            },
            ']' if quote.is_none() => return Some(i),
            '[' if quote.is_none() => return None,
            _ => {}
        }
    }
    None
}

fn parse_predicate(inner: &str) -> Option<Predicate> {
    let inner = inner.trim();
    if inner.is_empty() {
        return None;
    }

    if inner.chars().all(|c| c.is_ascii_digit()) {
        let position: usize = inner.parse().ok()?;
        if position == 0 {
            return None;
        }
        return Some(Predicate::Position(position));
    }

    if inner == "last()" {
        return Some(Predicate::Last);
    }

    if let Some(rest) = inner.strip_prefix("contains(") {
        let body = rest.strip_suffix(')')?;
        let (left, right) = body.split_once(',')?;
        let attr = left.trim().strip_prefix('@')?;
        if !is_valid_name(attr) {
            return None;
        }
        let value = parse_quoted(right.trim())?;
        return Some(Predicate::AttrContains(attr.to_string(), value));
    }

    if let Some(rest) = inner.strip_prefix('@') {
        if let Some((name, value)) = rest.split_once('=') {
            let name = name.trim();
            if !is_valid_name(name) {
                return None;
            }
            let value = parse_quoted(value.trim())?;
            return Some(Predicate::AttrEquals(name.to_string(), value));
        }
        let name = rest.trim();
        if !is_valid_name(name) {
            return None;
        }
        return Some(Predicate::HasAttr(name.to_string()));
    }

    None
}

fn parse_quoted(s: &str) -> Option<String> {
    let first = s.chars().next()?;
    if (first == '"' || first == '\'') && s.len() >= 2 && s.ends_with(first) {
        return Some(s[1..s.len() - 1].to_string());
    }
    None
}

fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == ':')
}
