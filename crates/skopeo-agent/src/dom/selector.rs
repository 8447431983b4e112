//! CSS selector subset for [`MemoryDocument`](super::MemoryDocument).
//!
//! Supported: type, universal, `#id`, `.class`, attribute conditions
//! (`[a]`, `=`, `~=`, `^=`, `$=`, `*=`), the structural pseudo-classes
//! `:first-child`, `:last-child`, `:first-of-type`, `:last-of-type`,
//! `:nth-child()` and `:nth-of-type()` (`n`, `odd`, `even`, `an+b`), the four
//! combinators, and comma-separated groups.

use super::{MemoryDocument, NodeId};
use crate::platform::LookupError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum AttrCondition {
    Exists(String),
    Equals(String, String),
    Includes(String, String),
    StartsWith(String, String),
    EndsWith(String, String),
    Contains(String, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Nth {
    a: i64,
    b: i64,
}

impl Nth {
    fn matches(self, position: usize) -> bool {
        let position = position as i64;
        if self.a == 0 {
            return position == self.b;
        }
        // Out-of-range arithmetic never matches.
        let Some(offset) = position.checked_sub(self.b) else {
            return false;
        };
        match (offset.checked_rem(self.a), offset.checked_div(self.a)) {
            (Some(0), Some(steps)) => steps >= 0,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pseudo {
    NthChild(Nth),
    NthLastChild(Nth),
    NthOfType(Nth),
    NthLastOfType(Nth),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrCondition>,
    pseudos: Vec<Pseudo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
    Adjacent,
    Sibling,
}

/// A compound selector plus its relation to the compound on its left.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Part {
    compound: Compound,
    combinator: Option<Combinator>,
}

/// Parsed, comma-separated selector list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    groups: Vec<Vec<Part>>,
}

impl SelectorList {
    pub fn parse(selector: &str) -> Result<Self, LookupError> {
        let invalid = || LookupError::invalid_selector(selector);
        let mut groups = Vec::new();
        for group in split_top_level(selector, ',').ok_or_else(invalid)? {
            groups.push(parse_chain(&group).ok_or_else(invalid)?);
        }
        if groups.is_empty() {
            return Err(invalid());
        }
        Ok(Self { groups })
    }

    pub fn matches(&self, doc: &MemoryDocument, node: NodeId) -> bool {
        self.groups.iter().any(|parts| matches_chain(doc, node, parts))
    }
}

fn split_top_level(selector: &str, separator: char) -> Option<Vec<String>> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut bracket = 0usize;
    let mut paren = 0usize;
    let mut quote: Option<char> = None;
    let mut chars = selector.chars();
    while let Some(ch) = chars.next() {
        if let Some(q) = quote {
            current.push(ch);
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '\\' => {
                current.push(ch);
                current.push(chars.next()?);
            }
            '"' | '\'' => {
                quote = Some(ch);
                current.push(ch);
            }
            '[' => {
                bracket += 1;
                current.push(ch);
            }
            ']' => {
                bracket = bracket.checked_sub(1)?;
                current.push(ch);
            }
            '(' => {
                paren += 1;
                current.push(ch);
            }
            ')' => {
                paren = paren.checked_sub(1)?;
                current.push(ch);
            }
            ch if ch == separator && bracket == 0 && paren == 0 => {
                let trimmed = current.trim();
                if trimmed.is_empty() {
                    return None;
                }
                out.push(trimmed.to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if bracket != 0 || paren != 0 || quote.is_some() {
        return None;
    }
    let trimmed = current.trim();
    if trimmed.is_empty() {
        return None;
    }
    out.push(trimmed.to_string());
    Some(out)
}

fn parse_chain(group: &str) -> Option<Vec<Part>> {
    let mut parts: Vec<Part> = Vec::new();
    let mut pending: Option<Combinator> = None;
    let mut current = String::new();
    let mut bracket = 0usize;
    let mut paren = 0usize;
    let mut chars = group.chars().peekable();

    let flush = |current: &mut String, pending: &mut Option<Combinator>, parts: &mut Vec<Part>| {
        if current.is_empty() {
            return Some(());
        }
        let compound = parse_compound(current)?;
        let combinator = if parts.is_empty() {
            if pending.is_some() {
                return None;
            }
            None
        } else {
            Some(pending.take().unwrap_or(Combinator::Descendant))
        };
        parts.push(Part {
            compound,
            combinator,
        });
        current.clear();
        Some(())
    };

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                current.push(ch);
                let first = chars.next()?;
                current.push(first);
                if first.is_ascii_hexdigit() {
                    let mut digits = 1;
                    while digits < 6 && chars.peek().is_some_and(char::is_ascii_hexdigit) {
                        current.push(chars.next()?);
                        digits += 1;
                    }
                    if chars.peek() == Some(&' ') {
                        current.push(chars.next()?);
                    }
                }
            }
            '[' => {
                bracket += 1;
                current.push(ch);
            }
            ']' => {
                bracket = bracket.checked_sub(1)?;
                current.push(ch);
            }
            '(' => {
                paren += 1;
                current.push(ch);
            }
            ')' => {
                paren = paren.checked_sub(1)?;
                current.push(ch);
            }
            '>' | '+' | '~' if bracket == 0 && paren == 0 => {
                flush(&mut current, &mut pending, &mut parts)?;
                if pending.is_some() || parts.is_empty() {
                    return None;
                }
                pending = Some(match ch {
                    '>' => Combinator::Child,
                    '+' => Combinator::Adjacent,
                    _ => Combinator::Sibling,
                });
            }
            ch if ch.is_whitespace() && bracket == 0 && paren == 0 => {
                flush(&mut current, &mut pending, &mut parts)?;
            }
            _ => current.push(ch),
        }
    }
    flush(&mut current, &mut pending, &mut parts)?;
    if parts.is_empty() || pending.is_some() {
        return None;
    }
    Some(parts)
}

fn parse_compound(src: &str) -> Option<Compound> {
    let mut compound = Compound::default();
    let mut universal = false;
    let mut i = 0usize;
    let bytes = src.as_bytes();

    while i < bytes.len() {
        match bytes[i] {
            b'*' => {
                if universal || compound.tag.is_some() || i != 0 {
                    return None;
                }
                universal = true;
                i += 1;
            }
            b'#' => {
                let (id, next) = parse_ident(src, i + 1)?;
                if compound.id.replace(id).is_some() {
                    return None;
                }
                i = next;
            }
            b'.' => {
                let (class, next) = parse_ident(src, i + 1)?;
                compound.classes.push(class);
                i = next;
            }
            b'[' => {
                let end = i + src[i..].find(']')?;
                compound.attrs.push(parse_attr(&src[i + 1..end])?);
                i = end + 1;
            }
            b':' => {
                let (pseudo, next) = parse_pseudo(src, i + 1)?;
                compound.pseudos.push(pseudo);
                i = next;
            }
            _ => {
                if i != 0 {
                    return None;
                }
                let (tag, next) = parse_ident(src, i)?;
                compound.tag = Some(tag.to_ascii_lowercase());
                i = next;
            }
        }
    }
    Some(compound)
}

/// Reads a CSS identifier starting at byte `start`, decoding backslash escapes.
fn parse_ident(src: &str, start: usize) -> Option<(String, usize)> {
    let mut out = String::new();
    let mut chars = src.get(start..)?.char_indices().peekable();
    let mut end = start;
    while let Some(&(offset, ch)) = chars.peek() {
        if ch == '\\' {
            chars.next();
            let mut hex = String::new();
            while hex.len() < 6 {
                match chars.peek() {
                    Some(&(_, h)) if h.is_ascii_hexdigit() => {
                        hex.push(h);
                        chars.next();
                    }
                    _ => break,
                }
            }
            if hex.is_empty() {
                let (literal_offset, literal) = chars.next()?;
                out.push(literal);
                end = start + literal_offset + literal.len_utf8();
            } else {
                out.push(char::from_u32(u32::from_str_radix(&hex, 16).ok()?)?);
                end = match chars.peek() {
                    Some(&(space_offset, ' ')) => {
                        chars.next();
                        start + space_offset + 1
                    }
                    Some(&(next_offset, _)) => start + next_offset,
                    None => src.len(),
                };
            }
            continue;
        }
        if ch.is_alphanumeric() || ch == '-' || ch == '_' || !ch.is_ascii() {
            out.push(ch);
            chars.next();
            end = start + offset + ch.len_utf8();
        } else {
            break;
        }
    }
    if out.is_empty() {
        return None;
    }
    Some((out, end))
}

fn parse_attr(inner: &str) -> Option<AttrCondition> {
    let inner = inner.trim();
    for (operator, build) in [
        ("~=", AttrCondition::Includes as fn(String, String) -> AttrCondition),
        ("^=", AttrCondition::StartsWith),
        ("$=", AttrCondition::EndsWith),
        ("*=", AttrCondition::Contains),
        ("=", AttrCondition::Equals),
    ] {
        if let Some((name, value)) = inner.split_once(operator) {
            let name = name.trim();
            if name.is_empty() || name.contains(|c: char| c.is_whitespace()) {
                return None;
            }
            let value = unquote(value.trim())?;
            return Some(build(name.to_ascii_lowercase(), value));
        }
    }
    if inner.is_empty() || inner.contains(|c: char| c.is_whitespace()) {
        return None;
    }
    Some(AttrCondition::Exists(inner.to_ascii_lowercase()))
}

fn unquote(value: &str) -> Option<String> {
    for quote in ['"', '\''] {
        if let Some(rest) = value.strip_prefix(quote) {
            return rest.strip_suffix(quote).map(str::to_string);
        }
    }
    if value.is_empty() || value.contains(|c: char| c.is_whitespace()) {
        return None;
    }
    Some(value.to_string())
}

fn parse_pseudo(src: &str, start: usize) -> Option<(Pseudo, usize)> {
    let tail = src.get(start..)?;
    let keyword_len = tail
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
        .unwrap_or(tail.len());
    let name = tail[..keyword_len].to_ascii_lowercase();
    let after = start + keyword_len;

    let simple = match name.as_str() {
        "first-child" => Some(Pseudo::NthChild(Nth { a: 0, b: 1 })),
        "last-child" => Some(Pseudo::NthLastChild(Nth { a: 0, b: 1 })),
        "first-of-type" => Some(Pseudo::NthOfType(Nth { a: 0, b: 1 })),
        "last-of-type" => Some(Pseudo::NthLastOfType(Nth { a: 0, b: 1 })),
        _ => None,
    };
    if let Some(pseudo) = simple {
        return Some((pseudo, after));
    }

    let args = src.get(after..)?.strip_prefix('(')?;
    let close = args.find(')')?;
    let nth = parse_nth(&args[..close])?;
    let next = after + 1 + close + 1;
    let pseudo = match name.as_str() {
        "nth-child" => Pseudo::NthChild(nth),
        "nth-last-child" => Pseudo::NthLastChild(nth),
        "nth-of-type" => Pseudo::NthOfType(nth),
        "nth-last-of-type" => Pseudo::NthLastOfType(nth),
        _ => return None,
    };
    Some((pseudo, next))
}

fn parse_nth(raw: &str) -> Option<Nth> {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    match compact.as_str() {
        "odd" => return Some(Nth { a: 2, b: 1 }),
        "even" => return Some(Nth { a: 2, b: 0 }),
        _ => {}
    }
    let Some((a_part, b_part)) = compact.split_once('n') else {
        return compact.parse::<i64>().ok().map(|b| Nth { a: 0, b });
    };
    let a = match a_part {
        "" | "+" => 1,
        "-" => -1,
        other => other.parse().ok()?,
    };
    let b = if b_part.is_empty() {
        0
    } else {
        b_part.parse().ok()?
    };
    Some(Nth { a, b })
}

fn matches_chain(doc: &MemoryDocument, node: NodeId, parts: &[Part]) -> bool {
    let Some((last, rest)) = parts.split_last() else {
        return false;
    };
    if !matches_compound(doc, node, &last.compound) {
        return false;
    }
    let Some(combinator) = last.combinator else {
        return rest.is_empty();
    };
    match combinator {
        Combinator::Child => doc
            .element_parent(node)
            .is_some_and(|parent| matches_chain(doc, parent, rest)),
        Combinator::Descendant => {
            let mut cursor = doc.element_parent(node);
            while let Some(ancestor) = cursor {
                if matches_chain(doc, ancestor, rest) {
                    return true;
                }
                cursor = doc.element_parent(ancestor);
            }
            false
        }
        Combinator::Adjacent => previous_sibling(doc, node)
            .is_some_and(|sibling| matches_chain(doc, sibling, rest)),
        Combinator::Sibling => {
            let mut cursor = previous_sibling(doc, node);
            while let Some(sibling) = cursor {
                if matches_chain(doc, sibling, rest) {
                    return true;
                }
                cursor = previous_sibling(doc, sibling);
            }
            false
        }
    }
}

fn previous_sibling(doc: &MemoryDocument, node: NodeId) -> Option<NodeId> {
    let siblings = doc.element_siblings(node);
    let index = siblings.iter().position(|candidate| *candidate == node)?;
    index.checked_sub(1).map(|prev| siblings[prev])
}

fn matches_compound(doc: &MemoryDocument, node: NodeId, compound: &Compound) -> bool {
    let Some(tag) = doc.tag(node) else {
        return false;
    };
    if compound.tag.as_deref().is_some_and(|wanted| wanted != tag) {
        return false;
    }
    if let Some(id) = &compound.id
        && doc.attr(node, "id") != Some(id.as_str())
    {
        return false;
    }
    if !compound.classes.is_empty() {
        let classes = doc.attr(node, "class").unwrap_or_default();
        if !compound
            .classes
            .iter()
            .all(|wanted| classes.split_ascii_whitespace().any(|have| have == wanted))
        {
            return false;
        }
    }
    if !compound
        .attrs
        .iter()
        .all(|condition| matches_attr(doc, node, condition))
    {
        return false;
    }
    compound
        .pseudos
        .iter()
        .all(|pseudo| matches_pseudo(doc, node, tag, *pseudo))
}

fn matches_attr(doc: &MemoryDocument, node: NodeId, condition: &AttrCondition) -> bool {
    match condition {
        AttrCondition::Exists(name) => doc.attr(node, name).is_some(),
        AttrCondition::Equals(name, value) => doc.attr(node, name) == Some(value.as_str()),
        AttrCondition::Includes(name, value) => doc
            .attr(node, name)
            .is_some_and(|have| have.split_ascii_whitespace().any(|token| token == value)),
        AttrCondition::StartsWith(name, value) => {
            !value.is_empty() && doc.attr(node, name).is_some_and(|have| have.starts_with(value.as_str()))
        }
        AttrCondition::EndsWith(name, value) => {
            !value.is_empty() && doc.attr(node, name).is_some_and(|have| have.ends_with(value.as_str()))
        }
        AttrCondition::Contains(name, value) => {
            !value.is_empty() && doc.attr(node, name).is_some_and(|have| have.contains(value.as_str()))
        }
    }
}

fn matches_pseudo(doc: &MemoryDocument, node: NodeId, tag: &str, pseudo: Pseudo) -> bool {
    let siblings = doc.element_siblings(node);
    let of_type: Vec<NodeId> = siblings
        .iter()
        .copied()
        .filter(|sibling| doc.tag(*sibling) == Some(tag))
        .collect();
    let position = |list: &[NodeId]| list.iter().position(|candidate| *candidate == node);
    match pseudo {
        Pseudo::NthChild(nth) => position(&siblings).is_some_and(|p| nth.matches(p + 1)),
        Pseudo::NthLastChild(nth) => {
            position(&siblings).is_some_and(|p| nth.matches(siblings.len() - p))
        }
        Pseudo::NthOfType(nth) => position(&of_type).is_some_and(|p| nth.matches(p + 1)),
        Pseudo::NthLastOfType(nth) => {
            position(&of_type).is_some_and(|p| nth.matches(of_type.len() - p))
        }
    }
}
