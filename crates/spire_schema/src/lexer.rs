//! Lexical analysis for annotated SDL.
//!
//! Tokenization uses logos. Whitespace, commas and `#` comments are
//! insignificant and never reach the parser. Keywords are not tokens of their
//! own: `type`, `input` and friends are contextual [`Token::Name`]s, so they
//! remain usable as field names.

use logos::Logos;
use std::fmt;

/// SDL token
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n,\u{FEFF}]+")]
#[logos(skip r"#[^\n]*")]
pub enum Token {
    /// `{`
    #[token("{")]
    LBrace,
    /// `}`
    #[token("}")]
    RBrace,
    /// `(`
    #[token("(")]
    LParen,
    /// `)`
    #[token(")")]
    RParen,
    /// `[`
    #[token("[")]
    LBracket,
    /// `]`
    #[token("]")]
    RBracket,
    /// `:`
    #[token(":")]
    Colon,
    /// `!`
    #[token("!")]
    Bang,
    /// `=`
    #[token("=")]
    Equals,
    /// `@`
    #[token("@")]
    At,
    /// `|`
    #[token("|")]
    Pipe,
    /// `&`
    #[token("&")]
    Amp,
    /// `$`, only legal in executable documents
    #[token("$")]
    Dollar,
    /// `...`
    #[token("...")]
    Spread,

    /// Integer literal
    #[regex(r"-?[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    /// Float literal, kept as written
    #[regex(r"-?[0-9]+\.[0-9]+([eE][+-]?[0-9]+)?", |lex| lex.slice().to_string())]
    #[regex(r"-?[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().to_string())]
    Float(String),

    /// Quoted string, escapes resolved
    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| unescape(&lex.slice()[1..lex.slice().len() - 1]))]
    Str(String),

    /// Triple-quoted block string, indentation stripped
    #[regex(r#""""([^"]|"[^"]|""[^"])*""""#, |lex| block_string(&lex.slice()[3..lex.slice().len() - 3]))]
    BlockStr(String),

    /// Name (identifiers and contextual keywords)
    #[regex(r"[_A-Za-z][_0-9A-Za-z]*", |lex| lex.slice().to_string())]
    Name(String),
}

impl Token {
    /// Check if this token is the given contextual keyword
    #[must_use]
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Self::Name(name) if name == keyword)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LBrace => write!(f, "'{{'"),
            Self::RBrace => write!(f, "'}}'"),
            Self::LParen => write!(f, "'('"),
            Self::RParen => write!(f, "')'"),
            Self::LBracket => write!(f, "'['"),
            Self::RBracket => write!(f, "']'"),
            Self::Colon => write!(f, "':'"),
            Self::Bang => write!(f, "'!'"),
            Self::Equals => write!(f, "'='"),
            Self::At => write!(f, "'@'"),
            Self::Pipe => write!(f, "'|'"),
            Self::Amp => write!(f, "'&'"),
            Self::Dollar => write!(f, "'$'"),
            Self::Spread => write!(f, "'...'"),
            Self::Int(i) => write!(f, "integer {i}"),
            Self::Float(s) => write!(f, "float {s}"),
            Self::Str(_) | Self::BlockStr(_) => write!(f, "string"),
            Self::Name(name) => write!(f, "'{name}'"),
        }
    }
}

fn unescape(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next()? {
            '"' => out.push('"'),
            '\\' => out.push('\\'),
            '/' => out.push('/'),
            'b' => out.push('\u{0008}'),
            'f' => out.push('\u{000C}'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'u' => {
                let hex: String = chars.by_ref().take(4).collect();
                if hex.len() != 4 {
                    return None;
                }
                let code = u32::from_str_radix(&hex, 16).ok()?;
                out.push(char::from_u32(code)?);
            }
            _ => return None,
        }
    }
    Some(out)
}

fn block_string(raw: &str) -> String {
    let lines: Vec<&str> = raw.lines().collect();

    // Common indentation ignores the first line and blank lines
    let indent = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut out: Vec<String> = lines
        .iter()
        .enumerate()
        .map(|(i, l)| {
            if i == 0 || l.len() < indent {
                l.trim_end().to_string()
            } else {
                l[indent..].trim_end().to_string()
            }
        })
        .collect();

    while out.first().is_some_and(|l| l.trim().is_empty()) {
        out.remove(0);
    }
    while out.last().is_some_and(|l| l.trim().is_empty()) {
        out.pop();
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lex(src: &str) -> Vec<Token> {
        Token::lexer(src).map(|t| t.unwrap()).collect()
    }

    #[test]
    fn test_lex_type_header() {
        let tokens = lex("type Todo @model { id: ID! }");
        assert_eq!(tokens[0], Token::Name("type".to_string()));
        assert!(tokens[0].is_keyword("type"));
        assert_eq!(tokens[2], Token::At);
        assert_eq!(tokens[4], Token::LBrace);
        assert_eq!(tokens.len(), 10);
    }

    #[test]
    fn test_commas_and_comments_are_skipped() {
        let tokens = lex("a, b # trailing comment\n c");
        assert_eq!(
            tokens,
            vec![
                Token::Name("a".into()),
                Token::Name("b".into()),
                Token::Name("c".into())
            ]
        );
    }

    #[test]
    fn test_number_literals() {
        assert_eq!(lex("42"), vec![Token::Int(42)]);
        assert_eq!(lex("-7"), vec![Token::Int(-7)]);
        assert_eq!(lex("1.5"), vec![Token::Float("1.5".into())]);
        assert_eq!(lex("2e10"), vec![Token::Float("2e10".into())]);
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(lex(r#""a\"b\n""#), vec![Token::Str("a\"b\n".into())]);
        assert_eq!(lex(r#""A""#), vec![Token::Str("A".into())]);
    }

    #[test]
    fn test_block_string_dedent() {
        let tokens = lex("\"\"\"\n    First line\n      indented\n    \"\"\"");
        assert_eq!(tokens, vec![Token::BlockStr("First line\n  indented".into())]);
    }

    #[test]
    fn test_spread_and_invalid_char() {
        assert_eq!(lex("..."), vec![Token::Spread]);
        assert!(Token::lexer("%").next().unwrap().is_err());
    }
}
