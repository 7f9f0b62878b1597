//! Parsed stylesheet tree consumed by the auditor.
//!
//! Built on the `cssparser` tokenizer. The tree keeps only what the audit
//! needs: selector components, declarations and at-rule preludes. Parse
//! errors inside a rule are recovered by skipping to the next rule.

use cssparser::{Delimiter, ParseError as CssParseError, Parser, ParserInput, Token};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StyleError};

/// Top-level (or nested) stylesheet node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
    Rule(StyleRule),
    AtRule(AtRule),
}

/// A qualified rule: selector list plus declaration block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleRule {
    pub selector: Vec<SelectorComponent>,
    pub declarations: Vec<Declaration>,
    /// 1-based source line of the selector.
    pub line: u32,
}

impl StyleRule {
    /// Selector text reconstructed from its components.
    pub fn selector_text(&self) -> String {
        selector_text(&self.selector)
    }
}

/// An at-rule such as `@media`, `@keyframes` or `@import`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtRule {
    /// Lowercased name without the `@`.
    pub name: String,
    pub prelude: String,
    pub block: AtRuleBlock,
    pub line: u32,
}

/// Content of an at-rule block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "items", rename_all = "snake_case")]
pub enum AtRuleBlock {
    /// Statement at-rule without a block (`@import`, `@charset`).
    None,
    /// Conditional group rules (`@media`, `@supports`, ...).
    Rules(Vec<Node>),
    /// Keyframe blocks: frame selector plus declarations.
    Frames(Vec<Frame>),
    /// Declaration-only blocks (`@font-face`, `@page`, ...).
    Declarations(Vec<Declaration>),
}

/// One keyframe block, e.g. `from { opacity: 0 }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub selector: String,
    pub declarations: Vec<Declaration>,
}

/// A single `property: value` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    /// Lowercased property name.
    pub property: String,
    /// Value text without the `!important` flag.
    pub value: String,
    pub important: bool,
}

/// Selector building blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SelectorComponent {
    Type(String),
    Universal,
    Class(String),
    Id(String),
    PseudoClass(String),
    PseudoElement(String),
    Attribute(String),
    /// `' '`, `>`, `+` or `~`.
    Combinator(char),
    /// `,` between selectors in a list.
    Separator,
}

/// Reconstruct selector text from components.
pub fn selector_text(components: &[SelectorComponent]) -> String {
    let mut out = String::new();
    for component in components {
        match component {
            SelectorComponent::Type(name) => out.push_str(name),
            SelectorComponent::Universal => out.push('*'),
            SelectorComponent::Class(name) => {
                out.push('.');
                out.push_str(name);
            }
            SelectorComponent::Id(name) => {
                out.push('#');
                out.push_str(name);
            }
            SelectorComponent::PseudoClass(name) => {
                out.push(':');
                out.push_str(name);
            }
            SelectorComponent::PseudoElement(name) => {
                out.push_str("::");
                out.push_str(name);
            }
            SelectorComponent::Attribute(body) => {
                out.push('[');
                out.push_str(body);
                out.push(']');
            }
            SelectorComponent::Combinator(' ') => out.push(' '),
            SelectorComponent::Combinator(c) => {
                out.push(' ');
                out.push(*c);
                out.push(' ');
            }
            SelectorComponent::Separator => out.push_str(", "),
        }
    }
    out
}

/// Parsed stylesheet.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StylesheetTree {
    pub nodes: Vec<Node>,
    /// Messages for rules that were skipped during error recovery.
    pub skipped: Vec<String>,
}

type BlockResult<'i, T> = std::result::Result<T, CssParseError<'i, ()>>;

/// At-rules whose block holds nested rules.
const GROUP_AT_RULES: &[&str] = &["media", "supports", "document", "layer", "container", "scope"];

/// Parse stylesheet text into a tree.
///
/// Fails only when the input is non-blank and nothing at all could be
/// parsed; otherwise broken rules are skipped and listed in `skipped`.
pub fn parse_stylesheet(css: &str) -> Result<StylesheetTree> {
    let mut input = ParserInput::new(css);
    let mut parser = Parser::new(&mut input);
    let mut skipped = Vec::new();
    let nodes = parse_rule_list(&mut parser, &mut skipped);

    if nodes.is_empty() && !skipped.is_empty() {
        return Err(StyleError::Parse(format!(
            "no rule could be parsed: {}",
            skipped.join("; ")
        )));
    }

    for message in &skipped {
        tracing::warn!("CSS parse error: {}", message);
    }

    Ok(StylesheetTree { nodes, skipped })
}

fn parse_rule_list<'i>(parser: &mut Parser<'i, '_>, skipped: &mut Vec<String>) -> Vec<Node> {
    let mut nodes = Vec::new();

    loop {
        parser.skip_whitespace();
        if parser.is_exhausted() {
            break;
        }

        let line = parser.current_source_location().line + 1;
        let state = parser.state();
        let at_name = match parser.next() {
            Ok(Token::AtKeyword(name)) => Some(name.to_ascii_lowercase()),
            Ok(Token::CDO) | Ok(Token::CDC) | Ok(Token::Semicolon) => continue,
            Ok(_) => None,
            Err(_) => break,
        };

        let parsed = match at_name {
            Some(name) => parse_at_rule(parser, name, line, skipped).map(Node::AtRule),
            None => {
                parser.reset(&state);
                parse_style_rule(parser, line).map(Node::Rule)
            }
        };

        match parsed {
            Ok(node) => nodes.push(node),
            Err(e) => {
                skipped.push(format!("line {}: {:?}", line, e.kind));
                skip_to_next_rule(parser);
            }
        }
    }

    nodes
}

fn parse_style_rule<'i>(parser: &mut Parser<'i, '_>, line: u32) -> BlockResult<'i, StyleRule> {
    let selector = parser.parse_until_before(Delimiter::CurlyBracketBlock, parse_selector)?;

    match parser.next()? {
        Token::CurlyBracketBlock => {}
        other => {
            let other = other.clone();
            return Err(parser.new_unexpected_token_error(other));
        }
    }

    let declarations =
        parser.parse_nested_block(|p| Ok::<_, CssParseError<'i, ()>>(parse_declarations(p)))?;

    Ok(StyleRule {
        selector,
        declarations,
        line,
    })
}

fn parse_at_rule<'i>(
    parser: &mut Parser<'i, '_>,
    name: String,
    line: u32,
    skipped: &mut Vec<String>,
) -> BlockResult<'i, AtRule> {
    let start = parser.position();
    parser.parse_until_before(Delimiter::Semicolon | Delimiter::CurlyBracketBlock, consume_all)?;
    let prelude = parser.slice_from(start).trim().to_string();

    let block = match parser.next() {
        Ok(Token::CurlyBracketBlock) => {
            if GROUP_AT_RULES.contains(&name.as_str()) {
                AtRuleBlock::Rules(parser.parse_nested_block(|p| {
                    Ok::<_, CssParseError<'i, ()>>(parse_rule_list(p, skipped))
                })?)
            } else if name.ends_with("keyframes") {
                AtRuleBlock::Frames(parser.parse_nested_block(|p| {
                    Ok::<_, CssParseError<'i, ()>>(parse_frames(p))
                })?)
            } else {
                AtRuleBlock::Declarations(parser.parse_nested_block(|p| {
                    Ok::<_, CssParseError<'i, ()>>(parse_declarations(p))
                })?)
            }
        }
        _ => AtRuleBlock::None,
    };

    Ok(AtRule {
        name,
        prelude,
        block,
        line,
    })
}

fn parse_selector<'i>(parser: &mut Parser<'i, '_>) -> BlockResult<'i, Vec<SelectorComponent>> {
    let mut components = Vec::new();
    parser.skip_whitespace();

    loop {
        let token = match parser.next_including_whitespace() {
            Ok(t) => t.clone(),
            Err(_) => break,
        };

        match token {
            Token::WhiteSpace(_) => push_combinator(&mut components, ' '),
            Token::Ident(name) => components.push(SelectorComponent::Type(name.to_string())),
            Token::Delim('*') => components.push(SelectorComponent::Universal),
            Token::Delim('.') => {
                let class = parser.expect_ident()?.to_string();
                components.push(SelectorComponent::Class(class));
            }
            Token::IDHash(id) | Token::Hash(id) => {
                components.push(SelectorComponent::Id(id.to_string()))
            }
            Token::Delim(c @ ('>' | '+' | '~')) => push_combinator(&mut components, c),
            Token::Comma => {
                trim_trailing_combinator(&mut components);
                components.push(SelectorComponent::Separator);
                parser.skip_whitespace();
            }
            Token::Colon => match parser.next_including_whitespace()?.clone() {
                Token::Colon => {
                    let name = parser.expect_ident()?.to_string();
                    components.push(SelectorComponent::PseudoElement(name));
                }
                Token::Ident(name) => components.push(SelectorComponent::PseudoClass(name.to_string())),
                Token::Function(name) => {
                    let start = parser.position();
                    parser.parse_nested_block(consume_all)?;
                    let args = parser.slice_from(start);
                    let args = args.strip_suffix(')').unwrap_or(args);
                    components.push(SelectorComponent::PseudoClass(format!("{}({})", name, args.trim())));
                }
                other => return Err(parser.new_unexpected_token_error(other)),
            },
            Token::SquareBracketBlock => {
                let start = parser.position();
                parser.parse_nested_block(consume_all)?;
                let body = parser.slice_from(start);
                let body = body.strip_suffix(']').unwrap_or(body);
                components.push(SelectorComponent::Attribute(body.trim().to_string()));
            }
            other => return Err(parser.new_unexpected_token_error(other)),
        }
    }

    trim_trailing_combinator(&mut components);
    if components.is_empty() {
        return Err(parser.new_custom_error(()));
    }
    Ok(components)
}

/// Record a combinator, letting an explicit one replace the implied descendant space.
fn push_combinator(components: &mut Vec<SelectorComponent>, c: char) {
    match components.last() {
        None | Some(SelectorComponent::Separator) => {}
        Some(SelectorComponent::Combinator(' ')) => {
            if c != ' ' {
                components.pop();
                components.push(SelectorComponent::Combinator(c));
            }
        }
        Some(SelectorComponent::Combinator(_)) => {}
        Some(_) => components.push(SelectorComponent::Combinator(c)),
    }
}

fn trim_trailing_combinator(components: &mut Vec<SelectorComponent>) {
    if matches!(components.last(), Some(SelectorComponent::Combinator(' '))) {
        components.pop();
    }
}

fn parse_declarations<'i>(parser: &mut Parser<'i, '_>) -> Vec<Declaration> {
    let mut declarations = Vec::new();

    loop {
        parser.skip_whitespace();
        if parser.is_exhausted() {
            break;
        }

        let parsed = parser.try_parse(|p| -> BlockResult<'i, Declaration> {
            let property = p.expect_ident()?.to_ascii_lowercase();
            p.expect_colon()?;
            let start = p.position();
            p.parse_until_before(Delimiter::Semicolon, consume_all)?;
            let raw = p.slice_from(start).trim();
            let (value, important) = split_important(raw);
            Ok(Declaration {
                property,
                value,
                important,
            })
        });

        match parsed {
            Ok(declaration) => declarations.push(declaration),
            Err(_) => {
                let _ = parser.parse_until_before(Delimiter::Semicolon, consume_all);
            }
        }

        let _ = parser.try_parse(|p| p.expect_semicolon());
    }

    declarations
}

fn parse_frames<'i>(parser: &mut Parser<'i, '_>) -> Vec<Frame> {
    let mut frames = Vec::new();

    loop {
        parser.skip_whitespace();
        if parser.is_exhausted() {
            break;
        }

        let start = parser.position();
        if parser
            .parse_until_before(Delimiter::CurlyBracketBlock, consume_all)
            .is_err()
        {
            break;
        }
        let selector = parser.slice_from(start).trim().to_string();

        match parser.next() {
            Ok(Token::CurlyBracketBlock) => {}
            _ => break,
        }
        let declarations = parser
            .parse_nested_block(|p| Ok::<_, CssParseError<'i, ()>>(parse_declarations(p)))
            .unwrap_or_default();

        frames.push(Frame {
            selector,
            declarations,
        });
    }

    frames
}

/// Split a trailing `!important` off a raw declaration value.
fn split_important(raw: &str) -> (String, bool) {
    if let Some(idx) = raw.rfind('!') {
        let flag = raw[idx + 1..].trim();
        if flag.eq_ignore_ascii_case("important") {
            return (raw[..idx].trim_end().to_string(), true);
        }
    }
    (raw.to_string(), false)
}

fn consume_all<'i>(parser: &mut Parser<'i, '_>) -> BlockResult<'i, ()> {
    while parser.next_including_whitespace_and_comments().is_ok() {}
    Ok(())
}

/// Skip past the next `{...}` block or `;`, whichever ends the broken rule.
fn skip_to_next_rule(parser: &mut Parser<'_, '_>) {
    loop {
        match parser.next() {
            Ok(Token::CurlyBracketBlock) => {
                let _ = parser.parse_nested_block(consume_all);
                return;
            }
            Ok(Token::Semicolon) => return,
            Ok(_) => {}
            Err(_) => return,
        }
    }
}

impl StylesheetTree {
    /// Every style rule, including those nested inside group at-rules.
    pub fn style_rules(&self) -> Vec<&StyleRule> {
        let mut out = Vec::new();
        collect_rules(&self.nodes, &mut out);
        out
    }
}

fn collect_rules<'a>(nodes: &'a [Node], out: &mut Vec<&'a StyleRule>) {
    for node in nodes {
        match node {
            Node::Rule(rule) => out.push(rule),
            Node::AtRule(at) => {
                if let AtRuleBlock::Rules(children) = &at.block {
                    collect_rules(children, out);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_rule(css: &str) -> StyleRule {
        let tree = parse_stylesheet(css).expect("parse");
        match tree.nodes.into_iter().next() {
            Some(Node::Rule(rule)) => rule,
            other => panic!("expected a style rule, got {:?}", other),
        }
    }

    #[test]
    fn test_parses_simple_rule() {
        let rule = first_rule(".a { color: red; margin: 0 auto !important }");
        assert_eq!(rule.selector_text(), ".a");
        assert_eq!(rule.declarations.len(), 2);
        assert_eq!(rule.declarations[0].property, "color");
        assert_eq!(rule.declarations[0].value, "red");
        assert!(!rule.declarations[0].important);
        assert_eq!(rule.declarations[1].value, "0 auto");
        assert!(rule.declarations[1].important);
    }

    #[test]
    fn test_selector_reconstruction() {
        assert_eq!(first_rule("nav  ul>li.item{x:y}").selector_text(), "nav ul > li.item");
        assert_eq!(first_rule("#main .card , a:hover{x:y}").selector_text(), "#main .card, a:hover");
        assert_eq!(first_rule("input[type=\"text\"]::placeholder{x:y}").selector_text(), "input[type=\"text\"]::placeholder");
        assert_eq!(first_rule("li:nth-child(2n+1){x:y}").selector_text(), "li:nth-child(2n+1)");
    }

    #[test]
    fn test_media_block_nests_rules() {
        let tree = parse_stylesheet("@media (max-width: 600px) { .a { color: red } .b { color: blue } }")
            .expect("parse");
        assert_eq!(tree.nodes.len(), 1);
        match &tree.nodes[0] {
            Node::AtRule(at) => {
                assert_eq!(at.name, "media");
                assert_eq!(at.prelude, "(max-width: 600px)");
                assert!(matches!(&at.block, AtRuleBlock::Rules(children) if children.len() == 2));
            }
            other => panic!("expected at-rule, got {:?}", other),
        }
        assert_eq!(tree.style_rules().len(), 2);
    }

    #[test]
    fn test_keyframes_become_frames() {
        let tree = parse_stylesheet("@keyframes spin { from { transform: rotate(0) } to { transform: rotate(360deg) } }")
            .expect("parse");
        match &tree.nodes[0] {
            Node::AtRule(at) => match &at.block {
                AtRuleBlock::Frames(frames) => {
                    assert_eq!(frames.len(), 2);
                    assert_eq!(frames[0].selector, "from");
                    assert_eq!(frames[1].declarations[0].property, "transform");
                }
                other => panic!("expected frames, got {:?}", other),
            },
            other => panic!("expected at-rule, got {:?}", other),
        }
        assert!(tree.style_rules().is_empty());
    }

    #[test]
    fn test_statement_at_rule() {
        let tree = parse_stylesheet("@import url('a.css'); .a{}").expect("parse");
        assert_eq!(tree.nodes.len(), 2);
        assert!(matches!(&tree.nodes[0], Node::AtRule(at) if at.block == AtRuleBlock::None));
    }

    #[test]
    fn test_broken_rule_is_skipped() {
        let tree = parse_stylesheet(".a{color:red} ){oops} .b{color:blue}").expect("parse");
        assert_eq!(tree.style_rules().len(), 2);
        assert_eq!(tree.skipped.len(), 1);
    }

    #[test]
    fn test_nothing_parseable_is_an_error() {
        let err = parse_stylesheet("){}").unwrap_err();
        assert!(matches!(err, StyleError::Parse(_)));
        assert!(parse_stylesheet("").expect("empty parses").nodes.is_empty());
    }

    #[test]
    fn test_rule_line_numbers() {
        let tree = parse_stylesheet(".a{}\n\n.b{}").expect("parse");
        let lines: Vec<_> = tree.style_rules().iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![1, 3]);
    }

    #[test]
    fn test_split_important() {
        assert_eq!(split_important("red !important"), ("red".to_string(), true));
        assert_eq!(split_important("red!IMPORTANT"), ("red".to_string(), true));
        assert_eq!(split_important("red"), ("red".to_string(), false));
    }
}
