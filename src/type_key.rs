//! Type annotation normalization.
//!
//! Annotation text is parsed into a small expression tree and rendered back
//! in one canonical spelling, so `Dict[ str,User ]` and `Dict[str, User]`
//! produce the same key. Matching on keys is exact and case-sensitive; no
//! alias resolution and no implicit unwrapping of generics.
//!
//! ```
//! use iproxy_indexer::type_key::TypeKey;
//!
//! assert_eq!(TypeKey::normalize("Dict[ str ,User ]").as_str(), "Dict[str, User]");
//! assert_eq!(TypeKey::normalize("'User'").as_str(), "User");
//! assert_ne!(TypeKey::normalize("List[User]"), TypeKey::normalize("User"));
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Normalized lookup key for a type annotation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeKey(String);

impl TypeKey {
    /// Normalize annotation text into a key. Never fails: text that does
    /// not parse as a type expression (call arguments inside `Annotated`,
    /// for one) falls back to the same spacing rules applied to the text.
    pub fn normalize(raw: &str) -> Self {
        match TypeExpr::parse(raw) {
            Some(expr) => Self(expr.to_string()),
            None => Self(canonical_spacing(raw)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parsed form of this key, if it is a well-formed type expression
    pub fn expr(&self) -> Option<TypeExpr> {
        TypeExpr::parse(&self.0)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeKey {
    fn from(raw: &str) -> Self {
        Self::normalize(raw)
    }
}

/// Respace arbitrary annotation text the way `TypeExpr` renders: nothing
/// inside brackets or parentheses, `", "` after commas, `" | "` around
/// unions, and single spaces elsewhere. Quoted text is kept verbatim.
fn canonical_spacing(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for c in raw.trim().chars() {
        if let Some(q) = quote {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        if c.is_whitespace() {
            pending_space = true;
            continue;
        }

        let space_before = match (out.chars().last(), c) {
            (None, _) => false,
            (Some(_), ']' | ')' | ',') => false,
            (Some(','), _) => true,
            (Some('[' | '('), _) => false,
            (Some(_), '|') | (Some('|'), _) => true,
            _ => pending_space,
        };
        if space_before {
            out.push(' ');
        }
        out.push(c);
        pending_space = false;
        if c == '\'' || c == '"' {
            quote = Some(c);
        }
    }

    out
}

/// Structured form of a type annotation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeExpr {
    /// Possibly dotted name: `User`, `typing.List`, `None`
    Name(String),
    /// `Base[arg, ...]`
    Generic { base: String, args: Vec<TypeExpr> },
    /// Bare bracketed list, as in `Callable[[A, B], R]`
    List(Vec<TypeExpr>),
    /// `A | B`
    Union(Vec<TypeExpr>),
    /// String/number literal or `...`, kept verbatim
    Literal(String),
}

impl TypeExpr {
    /// Parse annotation text. Returns `None` for anything that is not a
    /// complete type expression.
    pub fn parse(raw: &str) -> Option<Self> {
        let tokens = tokenize(raw)?;
        let mut parser = ExprParser {
            tokens: &tokens,
            pos: 0,
        };
        let expr = parser.union(false)?;
        if parser.pos != tokens.len() {
            return None;
        }
        Some(expr)
    }

    /// Direct type arguments of a generic, empty otherwise
    pub fn args(&self) -> &[TypeExpr] {
        match self {
            Self::Generic { args, .. } | Self::List(args) | Self::Union(args) => args,
            _ => &[],
        }
    }

    /// True if `needle` appears strictly inside this expression.
    pub fn contains_nested(&self, needle: &TypeExpr) -> bool {
        self.args()
            .iter()
            .any(|arg| arg == needle || arg.contains_nested(needle))
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) | Self::Literal(name) => f.write_str(name),
            Self::Generic { base, args } => {
                write!(f, "{}[", base)?;
                write_joined(f, args, ", ")?;
                f.write_str("]")
            }
            Self::List(items) => {
                f.write_str("[")?;
                write_joined(f, items, ", ")?;
                f.write_str("]")
            }
            Self::Union(members) => write_joined(f, members, " | "),
        }
    }
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[TypeExpr], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Name(String),
    Str(String),
    Number(String),
    Ellipsis,
    Open,
    Close,
    OpenParen,
    CloseParen,
    Comma,
    Pipe,
}

fn tokenize(raw: &str) -> Option<Vec<Token>> {
    let chars: Vec<char> = raw.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '[' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ']' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '(' => {
                tokens.push(Token::OpenParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::CloseParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '.' if chars[i..].starts_with(&['.', '.', '.']) => {
                tokens.push(Token::Ellipsis);
                i += 3;
            }
            '\'' | '"' => {
                let quote = c;
                let start = i + 1;
                let end = chars[start..].iter().position(|&ch| ch == quote)? + start;
                tokens.push(Token::Str(chars[start..end].iter().collect()));
                i = end + 1;
            }
            c if c.is_ascii_digit() || c == '-' => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut name = String::new();
                // Dotted names may carry whitespace around the dots
                loop {
                    while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                        name.push(chars[i]);
                        i += 1;
                    }
                    let mut j = i;
                    while j < chars.len() && chars[j].is_whitespace() {
                        j += 1;
                    }
                    if j < chars.len() && chars[j] == '.' && !chars[j..].starts_with(&['.', '.', '.']) {
                        j += 1;
                        while j < chars.len() && chars[j].is_whitespace() {
                            j += 1;
                        }
                        if j < chars.len() && (chars[j].is_alphabetic() || chars[j] == '_') {
                            name.push('.');
                            i = j;
                            continue;
                        }
                        return None;
                    }
                    break;
                }
                tokens.push(Token::Name(name));
            }
            _ => return None,
        }
    }

    Some(tokens)
}

struct ExprParser<'t> {
    tokens: &'t [Token],
    pos: usize,
}

impl<'t> ExprParser<'t> {
    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// `atom ('|' atom)*`; `in_literal` keeps strings verbatim
    fn union(&mut self, in_literal: bool) -> Option<TypeExpr> {
        let mut members = vec![self.atom(in_literal)?];
        while self.eat(&Token::Pipe) {
            members.push(self.atom(in_literal)?);
        }
        Some(if members.len() == 1 {
            members.remove(0)
        } else {
            TypeExpr::Union(members)
        })
    }

    fn atom(&mut self, in_literal: bool) -> Option<TypeExpr> {
        match self.bump()? {
            Token::Name(name) => {
                if self.eat(&Token::Open) {
                    let is_literal = name == "Literal" || name.ends_with(".Literal");
                    let args = self.args(is_literal)?;
                    Some(TypeExpr::Generic {
                        base: name.clone(),
                        args,
                    })
                } else {
                    Some(TypeExpr::Name(name.clone()))
                }
            }
            Token::Str(text) => {
                if !in_literal {
                    // Forward reference: the string holds a type expression
                    if let Some(inner) = TypeExpr::parse(text) {
                        return Some(inner);
                    }
                }
                Some(TypeExpr::Literal(format!("'{}'", text)))
            }
            Token::Number(text) => Some(TypeExpr::Literal(text.clone())),
            Token::Ellipsis => Some(TypeExpr::Literal("...".to_string())),
            Token::Open => Some(TypeExpr::List(self.args(in_literal)?)),
            Token::OpenParen => {
                let inner = self.union(in_literal)?;
                if self.eat(&Token::CloseParen) {
                    Some(inner)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Comma-separated arguments up to and including the closing `]`
    fn args(&mut self, in_literal: bool) -> Option<Vec<TypeExpr>> {
        let mut args = Vec::new();
        if self.eat(&Token::Close) {
            return Some(args);
        }
        loop {
            args.push(self.union(in_literal)?);
            if self.eat(&Token::Close) {
                return Some(args);
            }
            if !self.eat(&Token::Comma) {
                return None;
            }
            // Trailing comma
            if self.eat(&Token::Close) {
                return Some(args);
            }
        }
    }
}
