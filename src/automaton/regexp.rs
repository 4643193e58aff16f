//! Regular expression parser producing code point automata.
//!
//! Supported syntax, from lowest to highest precedence:
//!
//! ```text
//! union       ::= inter ( '|' union )?
//! inter       ::= concat ( '&' inter )?
//! concat      ::= repeat concat?
//! repeat      ::= repeat ( '?' | '*' | '+' | '{n}' | '{n,}' | '{n,m}' ) | compl
//! compl       ::= '~' compl | class
//! class       ::= '[' '^'? items ']' | simple
//! items       ::= ( char ( '-' char )? | shorthand )+
//! simple      ::= char | '.' | '#' | '@' | '"' string '"' | '(' ')' | '(' union ')'
//! char        ::= literal | '\' any
//! shorthand   ::= '\d' | '\D' | '\s' | '\S' | '\w' | '\W'
//! ```
//!
//! `.` matches any code point, `#` the empty language, `@` any string and
//! `~` the complement of its operand.

use std::fmt;

use crate::automaton::{Automaton, MAX_CODE_POINT, basic, operations};
use crate::error::{QuiverError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Union(Box<Node>, Box<Node>),
    Intersection(Box<Node>, Box<Node>),
    Concatenation(Box<Node>, Box<Node>),
    Optional(Box<Node>),
    Repeat(Box<Node>),
    RepeatMin(Box<Node>, usize),
    RepeatRange(Box<Node>, usize, usize),
    Complement(Box<Node>),
    Class(Vec<(u32, u32)>),
    AnyChar,
    Empty,
    EmptyString,
    AnyString,
    Literal(String),
}

/// A parsed regular expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegExp {
    source: String,
    root: Node,
}

impl RegExp {
    /// Parse `pattern`. Fails with [`QuiverError::InvalidPattern`].
    pub fn new(pattern: &str) -> Result<Self> {
        let mut parser = Parser {
            chars: pattern.chars().collect(),
            pos: 0,
        };
        let root = if parser.chars.is_empty() {
            Node::EmptyString
        } else {
            let node = parser.parse_union()?;
            if parser.more() {
                return Err(parser.error("end-of-string expected"));
            }
            node
        };
        Ok(RegExp {
            source: pattern.to_string(),
            root,
        })
    }

    /// The pattern this expression was parsed from.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Build a minimal deterministic automaton over code points.
    ///
    /// A determinization overflow is reported with this expression's source
    /// as the offending pattern.
    pub fn to_automaton(&self, max_states: usize) -> Result<Automaton> {
        build(&self.root, max_states)
            .and_then(|a| operations::minimize(&a, max_states))
            .map_err(|e| e.with_pattern(self.source.as_str()))
    }
}

impl fmt::Display for RegExp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

fn build(node: &Node, max_states: usize) -> Result<Automaton> {
    Ok(match node {
        Node::Union(a, b) => operations::union(&build(a, max_states)?, &build(b, max_states)?),
        Node::Intersection(a, b) => {
            let a = operations::determinize(&build(a, max_states)?, max_states)?;
            let b = operations::determinize(&build(b, max_states)?, max_states)?;
            operations::intersection(&a, &b)
        }
        Node::Concatenation(a, b) => {
            operations::concatenate(&build(a, max_states)?, &build(b, max_states)?)
        }
        Node::Optional(a) => operations::optional(&build(a, max_states)?),
        Node::Repeat(a) => operations::repeat(&build(a, max_states)?),
        Node::RepeatMin(a, min) => operations::repeat_min(&build(a, max_states)?, *min),
        Node::RepeatRange(a, min, max) => {
            operations::repeat_range(&build(a, max_states)?, *min, *max)
        }
        Node::Complement(a) => operations::complement(&build(a, max_states)?, max_states)?,
        Node::Class(ranges) => {
            let mut a = Automaton::new();
            let s0 = a.create_state();
            let s1 = a.create_state();
            a.set_accept(s1, true);
            for &(min, max) in ranges {
                a.add_transition(s0, s1, min, max);
            }
            a.finish();
            a
        }
        Node::AnyChar => basic::any_char(),
        Node::Empty => Automaton::empty(),
        Node::EmptyString => Automaton::empty_string(),
        Node::AnyString => basic::any_string(),
        Node::Literal(s) => basic::string(s),
    })
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn error(&self, what: &str) -> QuiverError {
        QuiverError::invalid_pattern(format!("{what} at position {}", self.pos))
    }

    fn more(&self) -> bool {
        self.pos < self.chars.len()
    }

    fn peek(&self, set: &str) -> bool {
        self.chars.get(self.pos).is_some_and(|c| set.contains(*c))
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn eat(&mut self, c: char) -> bool {
        if self.chars.get(self.pos) == Some(&c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn next(&mut self) -> Result<char> {
        let c = self
            .chars
            .get(self.pos)
            .copied()
            .ok_or_else(|| self.error("unexpected end-of-string"))?;
        self.pos += 1;
        Ok(c)
    }

    fn parse_union(&mut self) -> Result<Node> {
        let e = self.parse_intersection()?;
        if self.eat('|') {
            let rest = self.parse_union()?;
            return Ok(Node::Union(Box::new(e), Box::new(rest)));
        }
        Ok(e)
    }

    fn parse_intersection(&mut self) -> Result<Node> {
        let e = self.parse_concatenation()?;
        if self.eat('&') {
            let rest = self.parse_intersection()?;
            return Ok(Node::Intersection(Box::new(e), Box::new(rest)));
        }
        Ok(e)
    }

    fn parse_concatenation(&mut self) -> Result<Node> {
        let e = self.parse_repeat()?;
        if self.more() && !self.peek(")|&") {
            let rest = self.parse_concatenation()?;
            return Ok(Node::Concatenation(Box::new(e), Box::new(rest)));
        }
        Ok(e)
    }

    fn parse_repeat(&mut self) -> Result<Node> {
        let mut e = self.parse_complement()?;
        while self.peek("?*+{") {
            e = match self.next()? {
                '?' => Node::Optional(Box::new(e)),
                '*' => Node::Repeat(Box::new(e)),
                '+' => Node::RepeatMin(Box::new(e), 1),
                _ => {
                    let min = self.parse_int()?;
                    let max = if self.eat(',') {
                        if self.peek("0123456789") {
                            Some(self.parse_int()?)
                        } else {
                            None
                        }
                    } else {
                        Some(min)
                    };
                    if !self.eat('}') {
                        return Err(self.error("expected '}'"));
                    }
                    match max {
                        None => Node::RepeatMin(Box::new(e), min),
                        Some(max) if max < min => {
                            return Err(self.error(&format!(
                                "invalid repeat range {{{min},{max}}}"
                            )));
                        }
                        Some(max) => Node::RepeatRange(Box::new(e), min, max),
                    }
                }
            };
        }
        Ok(e)
    }

    fn parse_int(&mut self) -> Result<usize> {
        let start = self.pos;
        while self.peek("0123456789") {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("integer expected"));
        }
        let digits: String = self.chars[start..self.pos].iter().collect();
        digits
            .parse()
            .map_err(|_| self.error(&format!("repeat count {digits} out of range")))
    }

    fn parse_complement(&mut self) -> Result<Node> {
        if self.eat('~') {
            let inner = self.parse_complement()?;
            return Ok(Node::Complement(Box::new(inner)));
        }
        self.parse_class()
    }

    fn parse_class(&mut self) -> Result<Node> {
        if !self.eat('[') {
            return self.parse_simple();
        }
        let negate = self.eat('^');
        let mut ranges = Vec::new();
        loop {
            self.parse_class_item(&mut ranges)?;
            if !self.more() || self.peek("]") {
                break;
            }
        }
        if !self.eat(']') {
            return Err(self.error("expected ']'"));
        }
        if negate {
            ranges = invert(ranges);
        }
        Ok(Node::Class(ranges))
    }

    fn parse_class_item(&mut self, ranges: &mut Vec<(u32, u32)>) -> Result<()> {
        if let Some(shorthand) = self.parse_shorthand() {
            ranges.extend(shorthand);
            return Ok(());
        }
        let start = self.parse_char()? as u32;
        if self.peek("-") && self.peek_at(1).is_some_and(|c| c != ']') {
            self.pos += 1;
            let end = self.parse_char()? as u32;
            if start > end {
                return Err(self.error(&format!(
                    "invalid range: from ({start}) cannot be > to ({end})"
                )));
            }
            ranges.push((start, end));
        } else {
            ranges.push((start, start));
        }
        Ok(())
    }

    fn parse_shorthand(&mut self) -> Option<Vec<(u32, u32)>> {
        if self.peek_at(0) != Some('\\') {
            return None;
        }
        let c = self.peek_at(1)?;
        let ranges: Vec<(u32, u32)> = match c.to_ascii_lowercase() {
            'd' => vec![('0' as u32, '9' as u32)],
            's' => vec![(0x09, 0x0D), (' ' as u32, ' ' as u32)],
            'w' => vec![
                ('0' as u32, '9' as u32),
                ('A' as u32, 'Z' as u32),
                ('_' as u32, '_' as u32),
                ('a' as u32, 'z' as u32),
            ],
            _ => return None,
        };
        self.pos += 2;
        Some(if c.is_ascii_uppercase() {
            invert(ranges)
        } else {
            ranges
        })
    }

    fn parse_simple(&mut self) -> Result<Node> {
        if let Some(shorthand) = self.parse_shorthand() {
            return Ok(Node::Class(shorthand));
        }
        if self.eat('.') {
            return Ok(Node::AnyChar);
        }
        if self.eat('#') {
            return Ok(Node::Empty);
        }
        if self.eat('@') {
            return Ok(Node::AnyString);
        }
        if self.eat('"') {
            let start = self.pos;
            while self.more() && !self.peek("\"") {
                self.pos += 1;
            }
            if !self.eat('"') {
                return Err(self.error("expected '\"'"));
            }
            let literal: String = self.chars[start..self.pos - 1].iter().collect();
            return Ok(Node::Literal(literal));
        }
        if self.eat('(') {
            if self.eat(')') {
                return Ok(Node::EmptyString);
            }
            let e = self.parse_union()?;
            if !self.eat(')') {
                return Err(self.error("expected ')'"));
            }
            return Ok(e);
        }
        if self.peek("|&)*+?{}]") && !self.peek("]") {
            return Err(self.error(&format!("unexpected '{}'", self.chars[self.pos])));
        }
        let c = self.parse_char()?;
        Ok(Node::Literal(c.to_string()))
    }

    fn parse_char(&mut self) -> Result<char> {
        self.eat('\\');
        self.next()
    }
}

/// Complement of a set of code point ranges within `0..=MAX_CODE_POINT`.
fn invert(mut ranges: Vec<(u32, u32)>) -> Vec<(u32, u32)> {
    ranges.sort_unstable();
    let mut out = Vec::new();
    let mut next = 0u32;
    for (min, max) in ranges {
        if min > next {
            out.push((next, min - 1));
        }
        next = next.max(max.saturating_add(1));
    }
    if next <= MAX_CODE_POINT {
        out.push((next, MAX_CODE_POINT));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automaton::operations::run_str;

    const MAX: usize = 10_000;

    fn matches(pattern: &str, s: &str) -> bool {
        let a = RegExp::new(pattern).unwrap().to_automaton(MAX).unwrap();
        run_str(&a, s)
    }

    #[test]
    fn test_basic_syntax() {
        assert!(matches("abc", "abc"));
        assert!(!matches("abc", "ab"));
        assert!(matches("a|bc", "bc"));
        assert!(matches("ab*c", "ac"));
        assert!(matches("ab*c", "abbbc"));
        assert!(matches("ab+c", "abc"));
        assert!(!matches("ab+c", "ac"));
        assert!(matches("ab?c", "ac"));
        assert!(matches("a.c", "aéc"));
        assert!(matches("a(b|c)d", "acd"));
        assert!(matches("a()b", "ab"));
        assert!(matches("", ""));
        assert!(!matches("", "a"));
    }

    #[test]
    fn test_repeat_counts() {
        assert!(matches("a{3}", "aaa"));
        assert!(!matches("a{3}", "aa"));
        assert!(matches("a{2,}", "aaaaa"));
        assert!(!matches("a{2,}", "a"));
        assert!(matches("a{1,2}", "aa"));
        assert!(!matches("a{1,2}", "aaa"));
        assert!(matches("a{0,1}b", "b"));
    }

    #[test]
    fn test_character_classes() {
        assert!(matches("[a-c]x", "bx"));
        assert!(!matches("[a-c]x", "dx"));
        assert!(matches("[^a-c]x", "dx"));
        assert!(!matches("[^a-c]x", "ax"));
        assert!(matches("[abc-]", "-"));
        assert!(matches("\\d+", "0123"));
        assert!(!matches("\\d", "a"));
        assert!(matches("\\W", " "));
        assert!(matches("[\\w.]+", "a_b.c"));
    }

    #[test]
    fn test_operators() {
        assert!(matches("@", "anything"));
        assert!(!matches("#", ""));
        assert!(matches("a.*&.*b", "axb"));
        assert!(!matches("a.*&.*b", "ax"));
        assert!(matches("~(abc)", "abd"));
        assert!(!matches("~(abc)", "abc"));
        assert!(matches("\"a|b\"", "a|b"));
        assert!(matches("a\\*", "a*"));
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["(ab", "[ab", "a{2", "a{x}", "\"ab", "a{3,1}", "*a", "ab)", "[z-a]"] {
            assert!(
                matches!(RegExp::new(bad), Err(QuiverError::InvalidPattern(_))),
                "pattern {bad}"
            );
        }
    }

    #[test]
    fn test_too_complex_reports_pattern() {
        let pattern = "(a|b)*a(a|b){12}";
        let err = RegExp::new(pattern).unwrap().to_automaton(100).unwrap_err();
        match err {
            QuiverError::TooComplexToDeterminize {
                pattern: Some(p),
                max_states: 100,
                ..
            } => assert_eq!(p, pattern),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
