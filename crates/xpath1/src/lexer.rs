//! A table-driven tokenizer for XPath expression text.
//!
//! Each call to [`Lexer::next_token`] skips whitespace, tries every rule in
//! [`RULES`] anchored at the current offset and keeps the longest match.
//! Operator tokens are then reclassified against the previous token through
//! [`disambiguate`], which is the only place context-sensitive lexing happens.

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Terminal and nonterminal symbols of the expression grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    Number,
    Literal,
    Name,
    /// `*` as a name test.
    Star,
    /// A whole kind test such as `text()` or `processing-instruction('x')`.
    NodeType,
    /// An axis name including its `::`.
    AxisName,
    /// A function name including its opening parenthesis.
    FuncName,
    Dollar,
    At,
    Dot,
    DotDot,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Slash,
    DSlash,
    /// `/` at the start of a location path.
    RootSlash,
    /// `//` at the start of a location path.
    RootDSlash,
    Pipe,
    Plus,
    Minus,
    /// Unary minus.
    Neg,
    /// `*` as the multiplication operator.
    Multiply,
    Div,
    Mod,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    And,
    Or,
    // Nonterminals, produced only by grammar reductions.
    Test,
    Step,
    Pred,
    Path,
    Expr,
}

impl Tag {
    /// True for tags after which a `/`, `*`, `-` or operator keyword continues an
    /// expression rather than starting a new operand.
    pub fn ends_operand(self) -> bool {
        matches!(
            self,
            Tag::Name
                | Tag::Star
                | Tag::NodeType
                | Tag::Number
                | Tag::Literal
                | Tag::Dot
                | Tag::DotDot
                | Tag::RParen
                | Tag::RBracket
        )
    }

    pub fn is_nonterminal(self) -> bool {
        matches!(self, Tag::Test | Tag::Step | Tag::Pred | Tag::Path | Tag::Expr)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assoc {
    Left,
    Right,
}

/// Binding strength used by the parser when a reduction competes with a shift.
pub const HIGH: u8 = 20;

/// Precedence and associativity of a terminal. Higher binds tighter.
pub fn precedence(tag: Tag) -> (u8, Assoc) {
    use Tag::*;
    match tag {
        Or => (1, Assoc::Left),
        And => (2, Assoc::Left),
        Eq | Neq => (3, Assoc::Left),
        Lt | Lte | Gt | Gte => (4, Assoc::Left),
        Plus | Minus => (5, Assoc::Left),
        Multiply | Div | Mod => (6, Assoc::Left),
        Neg => (7, Assoc::Right),
        Pipe => (8, Assoc::Left),
        Slash | DSlash | RootSlash | RootDSlash => (9, Assoc::Left),
        LBracket => (10, Assoc::Left),
        Name | Star | Number | Literal | Dot | DotDot | NodeType | AxisName | FuncName | At
        | Dollar => (12, Assoc::Left),
        LParen | RParen | RBracket | Comma => (0, Assoc::Left),
        Test | Step | Pred | Path | Expr => (0, Assoc::Left),
    }
}

/// A lexed terminal. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tag: Tag,
    pub text: String,
    pub precedence: u8,
    pub assoc: Assoc,
}

impl Token {
    pub fn new(tag: Tag, text: impl Into<String>) -> Self {
        let (precedence, assoc) = precedence(tag);
        Self {
            tag,
            text: text.into(),
            precedence,
            assoc,
        }
    }
}

const NAME: &str = r"[^\W\d][\w.-]*";
const LITERAL: &str = r#""[^"]*"|'[^']*'"#;

/// The ordered rule table. Keyword rules come before `Name` so that ties on
/// length resolve to the keyword.
pub static RULES: Lazy<Vec<(Tag, Regex)>> = Lazy::new(|| {
    let axis_names = [
        "ancestor-or-self",
        "ancestor",
        "attribute",
        "child",
        "descendant-or-self",
        "descendant",
        "following-sibling",
        "following",
        "namespace",
        "parent",
        "preceding-sibling",
        "preceding",
        "self",
    ]
    .join("|");
    let table: Vec<(Tag, String)> = vec![
        (Tag::Number, r"\d+(?:\.\d*)?|\.\d+".to_string()),
        (Tag::Literal, LITERAL.to_string()),
        (Tag::AxisName, format!(r"(?:{})\s*::", axis_names)),
        (
            Tag::NodeType,
            format!(
                r"(?:text|node|comment)\s*\(\s*\)|processing-instruction\s*\(\s*(?:{})?\s*\)",
                LITERAL
            ),
        ),
        (Tag::FuncName, format!(r"{0}(?::{0})?\s*\(", NAME)),
        (Tag::And, "and".to_string()),
        (Tag::Or, "or".to_string()),
        (Tag::Div, "div".to_string()),
        (Tag::Mod, "mod".to_string()),
        (Tag::Name, format!(r"{0}(?::(?:{0}|\*))?", NAME)),
        (Tag::Multiply, r"\*".to_string()),
        (Tag::DSlash, "//".to_string()),
        (Tag::Slash, "/".to_string()),
        (Tag::Pipe, r"\|".to_string()),
        (Tag::Plus, r"\+".to_string()),
        (Tag::Minus, "-".to_string()),
        (Tag::Neq, "!=".to_string()),
        (Tag::Eq, "=".to_string()),
        (Tag::Lte, "<=|&lt;=".to_string()),
        (Tag::Lt, "<|&lt;".to_string()),
        (Tag::Gte, ">=|&gt;=".to_string()),
        (Tag::Gt, ">|&gt;".to_string()),
        (Tag::DotDot, r"\.\.".to_string()),
        (Tag::Dot, r"\.".to_string()),
        (Tag::Dollar, r"\$".to_string()),
        (Tag::At, "@".to_string()),
        (Tag::LParen, r"\(".to_string()),
        (Tag::RParen, r"\)".to_string()),
        (Tag::LBracket, r"\[".to_string()),
        (Tag::RBracket, r"\]".to_string()),
        (Tag::Comma, ",".to_string()),
    ];
    table
        .into_iter()
        .map(|(tag, pattern)| {
            let regex = Regex::new(&format!("^(?:{})", pattern))
                .unwrap_or_else(|e| panic!("invalid lexer rule for {:?}: {}", tag, e));
            (tag, regex)
        })
        .collect()
});

/// Lookback reclassification: `(lexed tag, tag used when the previous token
/// does not end an operand)`. The start of input counts as not ending one.
const DISAMBIGUATION: [(Tag, Tag); 8] = [
    (Tag::And, Tag::Name),
    (Tag::Or, Tag::Name),
    (Tag::Div, Tag::Name),
    (Tag::Mod, Tag::Name),
    (Tag::Multiply, Tag::Star),
    (Tag::Minus, Tag::Neg),
    (Tag::Slash, Tag::RootSlash),
    (Tag::DSlash, Tag::RootDSlash),
];

/// Operator keywords. After a token that ends an operand these win over a
/// longer name or function-call match, so `a and (b)` lexes `and` as `And`.
const OPERATOR_NAMES: [(&str, Tag); 4] = [
    ("and", Tag::And),
    ("or", Tag::Or),
    ("div", Tag::Div),
    ("mod", Tag::Mod),
];

/// The operator a `Name` or `FuncName` match stands for in operator
/// position, with the length of the keyword itself.
pub fn operator_name(tag: Tag, text: &str, previous: Option<Tag>) -> Option<(Tag, usize)> {
    if !matches!(tag, Tag::Name | Tag::FuncName) || !previous.is_some_and(Tag::ends_operand) {
        return None;
    }
    let name = text.trim_end_matches('(').trim_end();
    OPERATOR_NAMES
        .iter()
        .find(|(keyword, _)| *keyword == name)
        .map(|(keyword, operator)| (*operator, keyword.len()))
}

/// Reclassifies `tag` given the tag of the previous significant token.
pub fn disambiguate(tag: Tag, previous: Option<Tag>) -> Tag {
    if previous.is_some_and(Tag::ends_operand) {
        return tag;
    }
    DISAMBIGUATION
        .iter()
        .find(|(lexed, _)| *lexed == tag)
        .map_or(tag, |(_, replacement)| *replacement)
}

/// Tokenizer state: the unconsumed input plus one token of lookback.
#[derive(Debug, Clone)]
pub struct Lexer<'s> {
    rest: &'s str,
    previous: Option<Tag>,
}

impl<'s> Lexer<'s> {
    pub fn new(input: &'s str) -> Self {
        Self {
            rest: input,
            previous: None,
        }
    }

    /// The input not yet consumed, without leading whitespace.
    pub fn remaining(&self) -> &'s str {
        self.rest.trim_start()
    }

    /// Returns the next token, or `None` at end of input or when no rule
    /// matches. [`Lexer::remaining`] tells the two apart.
    pub fn next_token(&mut self) -> Option<Token> {
        let input = self.remaining();
        let mut best: Option<(Tag, usize)> = None;
        for (tag, regex) in RULES.iter() {
            if let Some(m) = regex.find(input) {
                let len = m.end();
                if len > 0 && best.is_none_or(|(_, best_len)| len > best_len) {
                    best = Some((*tag, len));
                }
            }
        }
        let (tag, len) = best?;
        let (tag, len) = operator_name(tag, &input[..len], self.previous)
            .unwrap_or_else(|| (disambiguate(tag, self.previous), len));
        let (text, rest) = input.split_at(len);
        self.rest = rest;
        self.previous = Some(tag);
        Some(Token::new(tag, text))
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        self.next_token()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(input: &str) -> Vec<Tag> {
        Lexer::new(input).map(|t| t.tag).collect()
    }

    #[test]
    fn test_longest_match_and_keywords() {
        assert_eq!(tags("android"), vec![Tag::Name]);
        assert_eq!(tags("a and b"), vec![Tag::Name, Tag::And, Tag::Name]);
        assert_eq!(tags("text()"), vec![Tag::NodeType]);
        assert_eq!(tags("text(1)"), vec![Tag::FuncName, Tag::Number, Tag::RParen]);
        assert_eq!(tags("child::x"), vec![Tag::AxisName, Tag::Name]);
        assert_eq!(tags("xsl:*"), vec![Tag::Name]);
        assert_eq!(tags(".5"), vec![Tag::Number]);
        assert_eq!(tags("..5"), vec![Tag::DotDot, Tag::Number]);
        assert_eq!(tags("a &lt;= 2"), vec![Tag::Name, Tag::Lte, Tag::Number]);
    }

    #[test]
    fn test_keywords_after_prefix_tokens_are_names() {
        assert_eq!(tags("@and"), vec![Tag::At, Tag::Name]);
        assert_eq!(tags("child::or"), vec![Tag::AxisName, Tag::Name]);
        assert_eq!(tags("a/div"), vec![Tag::Name, Tag::Slash, Tag::Name]);
        assert_eq!(tags("a//mod"), vec![Tag::Name, Tag::DSlash, Tag::Name]);
        assert_eq!(tags("$and"), vec![Tag::Dollar, Tag::Name]);
        assert_eq!(tags("div div div"), vec![Tag::Name, Tag::Div, Tag::Name]);
    }

    #[test]
    fn test_operator_keywords_before_parentheses() {
        use Tag::*;
        assert_eq!(tags("a and (b)"), vec![Name, And, LParen, Name, RParen]);
        assert_eq!(tags("x or(y)"), vec![Name, Or, LParen, Name, RParen]);
        assert_eq!(tags("6 div (3)"), vec![Number, Div, LParen, Number, RParen]);
        assert_eq!(tags("f() mod (4)"), vec![FuncName, RParen, Mod, LParen, Number, RParen]);
        // in operand position these are still function calls
        assert_eq!(tags("and(1)"), vec![FuncName, Number, RParen]);
        assert_eq!(tags("a or-else(1)"), vec![Name, FuncName, Number, RParen]);
    }

    #[test]
    fn test_operator_reclassification() {
        assert_eq!(tags("* * *"), vec![Tag::Star, Tag::Multiply, Tag::Star]);
        assert_eq!(tags("@*"), vec![Tag::At, Tag::Star]);
        assert_eq!(tags("1 - -2"), vec![Tag::Number, Tag::Minus, Tag::Neg, Tag::Number]);
        assert_eq!(tags("/a"), vec![Tag::RootSlash, Tag::Name]);
        assert_eq!(
            tags("count(//a)"),
            vec![Tag::FuncName, Tag::RootDSlash, Tag::Name, Tag::RParen]
        );
        assert_eq!(
            tags("(a)/b"),
            vec![Tag::LParen, Tag::Name, Tag::RParen, Tag::Slash, Tag::Name]
        );
    }

    #[test]
    fn test_token_metadata() {
        let token = Lexer::new("  'it''s'").next_token().unwrap();
        assert_eq!(token.tag, Tag::Literal);
        assert_eq!(token.text, "'it'");
        let neg = Token::new(Tag::Neg, "-");
        assert_eq!((neg.precedence, neg.assoc), (7, Assoc::Right));
    }

    #[test]
    fn test_unmatched_input_stops() {
        let mut lexer = Lexer::new("a # b");
        assert_eq!(lexer.next_token().map(|t| t.tag), Some(Tag::Name));
        assert!(lexer.next_token().is_none());
        assert_eq!(lexer.remaining(), "# b");
        let mut done = Lexer::new("  ");
        assert!(done.next_token().is_none());
        assert!(done.remaining().is_empty());
    }
}
