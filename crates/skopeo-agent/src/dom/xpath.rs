//! XPath 1.0 subset for [`MemoryDocument`](super::MemoryDocument).
//!
//! Location paths (`/`, `//`, `.`, `..`, `name`, `*`, `node()` and the
//! `axis::` forms for child, descendant, descendant-or-self, parent,
//! ancestor, self and the sibling axes), unions with `|`, and predicates
//! built from positions (`[2]`, `last()`, `position()`), attribute and text
//! tests, `contains`, `starts-with`, `normalize-space`, `not`, `and`, `or`.
//! Only element results are returned.

use std::collections::HashMap;

use super::{MemoryDocument, NodeId};
use crate::platform::LookupError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cmp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Cmp {
    fn holds(self, left: i64, right: i64) -> bool {
        match self {
            Self::Eq => left == right,
            Self::Ne => left != right,
            Self::Lt => left < right,
            Self::Le => left <= right,
            Self::Gt => left > right,
            Self::Ge => left >= right,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Slash,
    DoubleSlash,
    DoubleColon,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    At,
    Star,
    Dot,
    DotDot,
    Pipe,
    Minus,
    Cmp(Cmp),
    Name(String),
    Literal(String),
    Number(usize),
}

fn tokenize(src: &str) -> Option<Vec<Token>> {
    let chars: Vec<char> = src.chars().collect();
    let mut out = Vec::new();
    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();
        let (token, width) = match ch {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '/' if next == Some('/') => (Token::DoubleSlash, 2),
            '/' => (Token::Slash, 1),
            ':' if next == Some(':') => (Token::DoubleColon, 2),
            '[' => (Token::LBracket, 1),
            ']' => (Token::RBracket, 1),
            '(' => (Token::LParen, 1),
            ')' => (Token::RParen, 1),
            ',' => (Token::Comma, 1),
            '@' => (Token::At, 1),
            '*' => (Token::Star, 1),
            '|' => (Token::Pipe, 1),
            '-' => (Token::Minus, 1),
            '.' if next == Some('.') => (Token::DotDot, 2),
            '.' => (Token::Dot, 1),
            '=' => (Token::Cmp(Cmp::Eq), 1),
            '!' if next == Some('=') => (Token::Cmp(Cmp::Ne), 2),
            '<' if next == Some('=') => (Token::Cmp(Cmp::Le), 2),
            '<' => (Token::Cmp(Cmp::Lt), 1),
            '>' if next == Some('=') => (Token::Cmp(Cmp::Ge), 2),
            '>' => (Token::Cmp(Cmp::Gt), 1),
            '\'' | '"' => {
                let close = chars[i + 1..].iter().position(|c| *c == ch)?;
                let literal: String = chars[i + 1..i + 1 + close].iter().collect();
                (Token::Literal(literal), close + 2)
            }
            c if c.is_ascii_digit() => {
                let len = chars[i..].iter().take_while(|c| c.is_ascii_digit()).count();
                let digits: String = chars[i..i + len].iter().collect();
                (Token::Number(digits.parse().ok()?), len)
            }
            c if c.is_alphabetic() || c == '_' => {
                let len = chars[i..]
                    .iter()
                    .take_while(|c| c.is_alphanumeric() || **c == '-' || **c == '_')
                    .count();
                (Token::Name(chars[i..i + len].iter().collect()), len)
            }
            _ => return None,
        };
        out.push(token);
        i += width;
    }
    Some(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    Ancestor,
    SelfAxis,
    FollowingSibling,
    PrecedingSibling,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Self::Child,
            "descendant" => Self::Descendant,
            "descendant-or-self" => Self::DescendantOrSelf,
            "parent" => Self::Parent,
            "ancestor" => Self::Ancestor,
            "self" => Self::SelfAxis,
            "following-sibling" => Self::FollowingSibling,
            "preceding-sibling" => Self::PrecedingSibling,
            _ => return None,
        })
    }

    /// Candidate nodes in proximity order (reverse axes nearest first).
    fn nodes(self, doc: &MemoryDocument, node: NodeId) -> Vec<NodeId> {
        match self {
            Self::Child => doc.element_children(node),
            Self::Descendant => doc.descendant_elements(node),
            Self::DescendantOrSelf => {
                let mut out = vec![node];
                out.extend(doc.descendant_elements(node));
                out
            }
            Self::Parent => doc.parent_node(node).into_iter().collect(),
            Self::Ancestor => {
                let mut out = Vec::new();
                let mut cursor = doc.parent_node(node);
                while let Some(parent) = cursor {
                    out.push(parent);
                    cursor = doc.parent_node(parent);
                }
                out
            }
            Self::SelfAxis => vec![node],
            Self::FollowingSibling | Self::PrecedingSibling => {
                if !doc.is_element(node) {
                    return Vec::new();
                }
                let siblings = doc.element_siblings(node);
                let Some(index) = siblings.iter().position(|sibling| *sibling == node) else {
                    return Vec::new();
                };
                if self == Self::FollowingSibling {
                    siblings[index + 1..].to_vec()
                } else {
                    siblings[..index].iter().rev().copied().collect()
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeTest {
    AnyNode,
    AnyElement,
    Name(String),
}

impl NodeTest {
    fn matches(&self, doc: &MemoryDocument, node: NodeId) -> bool {
        match self {
            Self::AnyNode => true,
            Self::AnyElement => doc.is_element(node),
            Self::Name(name) => doc.tag(node) == Some(name.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Operand {
    Attr(String),
    Text,
    Context,
    Normalize(Box<Operand>),
}

impl Operand {
    fn strings(&self, doc: &MemoryDocument, node: NodeId) -> Vec<String> {
        match self {
            Self::Attr(name) => doc.attr(node, name).map(str::to_string).into_iter().collect(),
            Self::Text => doc
                .text_children(node)
                .into_iter()
                .map(str::to_string)
                .collect(),
            Self::Context => {
                let mut out = String::new();
                doc.text_content(node, &mut out);
                vec![out]
            }
            Self::Normalize(inner) => {
                let first = inner.strings(doc, node).into_iter().next().unwrap_or_default();
                vec![first.split_whitespace().collect::<Vec<_>>().join(" ")]
            }
        }
    }

    /// String value as a function argument: the first node's value, or empty.
    fn string(&self, doc: &MemoryDocument, node: NodeId) -> String {
        self.strings(doc, node).into_iter().next().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    Index(usize),
    /// `last()` minus an offset.
    Last(usize),
}

impl Position {
    fn resolve(self, size: usize) -> i64 {
        match self {
            Self::Index(index) => index as i64,
            Self::Last(offset) => size as i64 - offset as i64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Condition {
    Position(Cmp, Position),
    Exists(Operand),
    Compare {
        operand: Operand,
        equal: bool,
        value: String,
    },
    Contains(Operand, String),
    StartsWith(Operand, String),
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
}

impl Condition {
    fn holds(&self, doc: &MemoryDocument, node: NodeId, position: usize, size: usize) -> bool {
        match self {
            Self::Position(cmp, target) => cmp.holds(position as i64, target.resolve(size)),
            Self::Exists(Operand::Attr(name)) => doc.attr(node, name).is_some(),
            Self::Exists(Operand::Text) => !doc.text_children(node).is_empty(),
            Self::Exists(Operand::Context) => true,
            Self::Exists(operand) => !operand.string(doc, node).is_empty(),
            Self::Compare {
                operand,
                equal,
                value,
            } => operand
                .strings(doc, node)
                .iter()
                .any(|have| (have == value) == *equal),
            Self::Contains(operand, needle) => operand.string(doc, node).contains(needle.as_str()),
            Self::StartsWith(operand, prefix) => {
                operand.string(doc, node).starts_with(prefix.as_str())
            }
            Self::Not(inner) => !inner.holds(doc, node, position, size),
            Self::And(left, right) => {
                left.holds(doc, node, position, size) && right.holds(doc, node, position, size)
            }
            Self::Or(left, right) => {
                left.holds(doc, node, position, size) || right.holds(doc, node, position, size)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Condition>,
}

impl Step {
    /// The implicit `descendant-or-self::node()` step that `//` stands for.
    fn any_descendant_or_self() -> Self {
        Self {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::AnyNode,
            predicates: Vec::new(),
        }
    }

    fn apply(
        &self,
        doc: &MemoryDocument,
        context: &[NodeId],
        order: &HashMap<NodeId, usize>,
    ) -> Vec<NodeId> {
        let mut next = Vec::new();
        for &node in context {
            let mut candidates: Vec<NodeId> = self
                .axis
                .nodes(doc, node)
                .into_iter()
                .filter(|candidate| self.test.matches(doc, *candidate))
                .collect();
            for predicate in &self.predicates {
                let size = candidates.len();
                candidates = candidates
                    .into_iter()
                    .enumerate()
                    .filter(|(index, candidate)| predicate.holds(doc, *candidate, index + 1, size))
                    .map(|(_, candidate)| candidate)
                    .collect();
            }
            next.extend(candidates);
        }
        sort_document_order(&mut next, order);
        next
    }
}

fn sort_document_order(nodes: &mut Vec<NodeId>, order: &HashMap<NodeId, usize>) {
    nodes.sort_by_key(|node| order.get(node).copied().unwrap_or(usize::MAX));
    nodes.dedup();
}

/// Parsed XPath expression: a union of location paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPathExpr {
    paths: Vec<Vec<Step>>,
}

impl XPathExpr {
    pub fn parse(expression: &str) -> Result<Self, LookupError> {
        tokenize(expression)
            .and_then(|tokens| Parser { tokens, pos: 0 }.expression())
            .ok_or_else(|| LookupError::invalid_xpath(expression))
    }

    /// Matching elements in document order, without duplicates. Relative
    /// paths are evaluated with the document node as context.
    pub fn evaluate(&self, doc: &MemoryDocument) -> Vec<NodeId> {
        let order = doc.document_order();
        let mut out = Vec::new();
        for path in &self.paths {
            let mut context = vec![doc.root()];
            for step in path {
                context = step.apply(doc, &context, &order);
                if context.is_empty() {
                    break;
                }
            }
            out.extend(context);
        }
        out.retain(|node| doc.is_element(*node));
        sort_document_order(&mut out, &order);
        out
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn bump(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned()?;
        self.pos += 1;
        Some(token)
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Option<()> {
        self.eat(expected).then_some(())
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Name(name)) if name == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expression(mut self) -> Option<XPathExpr> {
        let mut paths = vec![self.path()?];
        while self.eat(&Token::Pipe) {
            paths.push(self.path()?);
        }
        if self.pos != self.tokens.len() {
            return None;
        }
        Some(XPathExpr { paths })
    }

    fn path(&mut self) -> Option<Vec<Step>> {
        let mut steps = Vec::new();
        match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                if matches!(self.peek(), None | Some(Token::Pipe)) {
                    return Some(steps);
                }
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                steps.push(Step::any_descendant_or_self());
            }
            _ => {}
        }
        loop {
            steps.push(self.step()?);
            if self.eat(&Token::Slash) {
                continue;
            }
            if self.eat(&Token::DoubleSlash) {
                steps.push(Step::any_descendant_or_self());
                continue;
            }
            return Some(steps);
        }
    }

    fn step(&mut self) -> Option<Step> {
        let (axis, test) = match self.bump()? {
            Token::Dot => (Axis::SelfAxis, NodeTest::AnyNode),
            Token::DotDot => (Axis::Parent, NodeTest::AnyNode),
            Token::Name(name) if self.peek() == Some(&Token::DoubleColon) => {
                let axis = Axis::from_name(&name)?;
                self.pos += 1;
                let token = self.bump()?;
                (axis, self.node_test(token)?)
            }
            token => (Axis::Child, self.node_test(token)?),
        };
        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.or_condition()?);
            self.expect(&Token::RBracket)?;
        }
        Some(Step {
            axis,
            test,
            predicates,
        })
    }

    fn node_test(&mut self, token: Token) -> Option<NodeTest> {
        match token {
            Token::Star => Some(NodeTest::AnyElement),
            Token::Name(name) if name == "node" && self.peek() == Some(&Token::LParen) => {
                self.pos += 1;
                self.expect(&Token::RParen)?;
                Some(NodeTest::AnyNode)
            }
            Token::Name(_) if self.peek() == Some(&Token::LParen) => None,
            Token::Name(name) => Some(NodeTest::Name(name.to_ascii_lowercase())),
            _ => None,
        }
    }

    fn or_condition(&mut self) -> Option<Condition> {
        let mut left = self.and_condition()?;
        while self.eat_keyword("or") {
            let right = self.and_condition()?;
            left = Condition::Or(Box::new(left), Box::new(right));
        }
        Some(left)
    }

    fn and_condition(&mut self) -> Option<Condition> {
        let mut left = self.primary()?;
        while self.eat_keyword("and") {
            let right = self.primary()?;
            left = Condition::And(Box::new(left), Box::new(right));
        }
        Some(left)
    }

    fn primary(&mut self) -> Option<Condition> {
        match self.peek()?.clone() {
            Token::LParen => {
                self.pos += 1;
                let inner = self.or_condition()?;
                self.expect(&Token::RParen)?;
                Some(inner)
            }
            Token::Number(index) => {
                self.pos += 1;
                Some(Condition::Position(Cmp::Eq, Position::Index(index)))
            }
            Token::Name(name) if self.peek_at(1) == Some(&Token::LParen) => match name.as_str() {
                "last" => {
                    let last = self.last_call()?;
                    Some(Condition::Position(Cmp::Eq, last))
                }
                "position" => {
                    self.pos += 1;
                    self.empty_args()?;
                    let Some(Token::Cmp(cmp)) = self.bump() else {
                        return None;
                    };
                    let target = match self.peek()?.clone() {
                        Token::Number(index) => {
                            self.pos += 1;
                            Position::Index(index)
                        }
                        Token::Name(name) if name == "last" => self.last_call()?,
                        _ => return None,
                    };
                    Some(Condition::Position(cmp, target))
                }
                "not" => {
                    self.pos += 2;
                    let inner = self.or_condition()?;
                    self.expect(&Token::RParen)?;
                    Some(Condition::Not(Box::new(inner)))
                }
                "contains" | "starts-with" => {
                    self.pos += 2;
                    let operand = self.operand()?;
                    self.expect(&Token::Comma)?;
                    let Some(Token::Literal(value)) = self.bump() else {
                        return None;
                    };
                    self.expect(&Token::RParen)?;
                    Some(if name == "contains" {
                        Condition::Contains(operand, value)
                    } else {
                        Condition::StartsWith(operand, value)
                    })
                }
                _ => self.comparison(),
            },
            _ => self.comparison(),
        }
    }

    /// `last()` with an optional `- n` offset.
    fn last_call(&mut self) -> Option<Position> {
        if !self.eat_keyword("last") {
            return None;
        }
        self.empty_args()?;
        if self.eat(&Token::Minus) {
            let Some(Token::Number(offset)) = self.bump() else {
                return None;
            };
            return Some(Position::Last(offset));
        }
        Some(Position::Last(0))
    }

    fn empty_args(&mut self) -> Option<()> {
        self.expect(&Token::LParen)?;
        self.expect(&Token::RParen)
    }

    fn comparison(&mut self) -> Option<Condition> {
        let operand = self.operand()?;
        let equal = match self.peek() {
            Some(Token::Cmp(Cmp::Eq)) => true,
            Some(Token::Cmp(Cmp::Ne)) => false,
            _ => return Some(Condition::Exists(operand)),
        };
        self.pos += 1;
        let value = match self.bump()? {
            Token::Literal(value) => value,
            Token::Number(number) => number.to_string(),
            _ => return None,
        };
        Some(Condition::Compare {
            operand,
            equal,
            value,
        })
    }

    fn operand(&mut self) -> Option<Operand> {
        match self.bump()? {
            Token::At => match self.bump()? {
                Token::Name(name) => Some(Operand::Attr(name.to_ascii_lowercase())),
                _ => None,
            },
            Token::Dot => Some(Operand::Context),
            Token::Name(name) if name == "text" => {
                self.empty_args()?;
                Some(Operand::Text)
            }
            Token::Name(name) if name == "normalize-space" => {
                self.expect(&Token::LParen)?;
                if self.eat(&Token::RParen) {
                    return Some(Operand::Normalize(Box::new(Operand::Context)));
                }
                let inner = self.operand()?;
                self.expect(&Token::RParen)?;
                Some(Operand::Normalize(Box::new(inner)))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Document;

    fn page() -> (MemoryDocument, Vec<NodeId>) {
        let mut doc = MemoryDocument::new();
        let body = doc.body();
        let main = doc.append_element(body, "main", &[("id", "content")]);
        let mut sections = Vec::new();
        for (index, title) in ["Intro", "Usage", "  Limits  "].into_iter().enumerate() {
            let section = doc.append_element(main, "section", &[("data-n", &index.to_string())]);
            let heading = doc.append_element(section, "h2", &[("class", "title")]);
            doc.append_text(heading, title);
            doc.append_element(section, "p", &[]);
            sections.push(section);
        }
        (doc, sections)
    }

    fn first(doc: &MemoryDocument, expression: &str) -> Option<NodeId> {
        doc.evaluate_xpath(expression).expect(expression)
    }

    #[test]
    fn absolute_paths_with_positions() {
        let (doc, sections) = page();
        assert_eq!(first(&doc, "/html/body/main/section[2]"), Some(sections[1]));
        assert_eq!(first(&doc, "/html/body/main/section[last()]"), Some(sections[2]));
        assert_eq!(first(&doc, "/html/body/main/section[last()-2]"), Some(sections[0]));
        assert_eq!(first(&doc, "/html/body/main/section[4]"), None);
        assert_eq!(first(&doc, "/HTML/BODY/MAIN"), doc.select_first("main").expect("valid"));
    }

    #[test]
    fn positions_apply_per_parent_under_descendant_steps() {
        let (doc, _) = page();
        let expr = XPathExpr::parse("//section/h2[1]").expect("valid");
        assert_eq!(expr.evaluate(&doc).len(), 3);
        let expr = XPathExpr::parse("(//h2)").map(|_| ());
        assert!(expr.is_err(), "filter expressions are outside the subset");
        let expr = XPathExpr::parse("//section[position() > 1]/p").expect("valid");
        assert_eq!(expr.evaluate(&doc).len(), 2);
    }

    #[test]
    fn attribute_and_text_predicates() {
        let (doc, sections) = page();
        assert_eq!(first(&doc, "//*[@id='content']"), doc.select_first("#content").expect("valid"));
        assert_eq!(first(&doc, "//section[@data-n=\"1\"]"), Some(sections[1]));
        assert_eq!(first(&doc, "//section[@data-n=2]"), Some(sections[2]));
        assert_eq!(first(&doc, "//h2[text()='Usage']/.."), Some(sections[1]));
        assert_eq!(
            first(&doc, "//h2[normalize-space()='Limits']/parent::section"),
            Some(sections[2])
        );
        assert!(
            XPathExpr::parse("//section[h2[contains(text(), 'tro')]]").is_err(),
            "nested location paths in predicates are outside the subset"
        );
    }

    #[test]
    fn boolean_predicates_and_unions() {
        let (doc, sections) = page();
        let expr = XPathExpr::parse("//section[@data-n='0' or @data-n='2']").expect("valid");
        assert_eq!(expr.evaluate(&doc), vec![sections[0], sections[2]]);
        let expr = XPathExpr::parse("//section[not(@data-n='0') and @data-n]").expect("valid");
        assert_eq!(expr.evaluate(&doc), vec![sections[1], sections[2]]);
        let expr = XPathExpr::parse("//p | //main").expect("valid");
        let hits = expr.evaluate(&doc);
        assert_eq!(hits.len(), 4);
        assert_eq!(doc.tag(hits[0]), Some("main"), "unions come back in document order");
        let expr = XPathExpr::parse("//h2[starts-with(@class, 'ti')]").expect("valid");
        assert_eq!(expr.evaluate(&doc).len(), 3);
    }

    #[test]
    fn sibling_and_ancestor_axes() {
        let (doc, sections) = page();
        assert_eq!(
            first(&doc, "//section[1]/following-sibling::section[1]"),
            Some(sections[1])
        );
        assert_eq!(
            first(&doc, "//section[3]/preceding-sibling::section[1]"),
            Some(sections[1])
        );
        assert_eq!(first(&doc, "//h2/ancestor::main"), doc.select_first("main").expect("valid"));
    }

    #[test]
    fn zero_matches_is_not_an_error() {
        let (doc, _) = page();
        assert_eq!(first(&doc, "//table"), None);
        assert_eq!(first(&doc, "/"), None, "the document node is not an element");
    }

    #[test]
    fn malformed_expressions_are_errors() {
        let doc = MemoryDocument::new();
        for bad in ["", "//", "//div[", "//div[@]", "bogus::div", "//p/text()", "//a[1", "//*[@a='x]"] {
            let err = doc.evaluate_xpath(bad).expect_err(bad);
            assert!(err.message().contains("is not a valid XPath expression"), "{bad}: {err}");
        }
    }
}
