use crate::error::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    /// Identifier or keyword (`and`, `or`, `in`, `true`, `false`, `null`).
    Name(String),
    /// Back-quoted field name; never a keyword.
    QuotedName(String),
    /// `$name`, `$` (empty) or `$$` (`"$"`).
    Variable(String),
    Dot,
    DotDot,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Comma,
    Colon,
    Semicolon,
    Question,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Assign,
    Eof,
}

#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub offset: usize,
}

fn err(src: &str, offset: usize, msg: impl Into<String>) -> SyntaxError {
    SyntaxError::new("expression", src, offset, msg)
}

pub fn lex(src: &str) -> Result<Vec<Spanned>, SyntaxError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0usize;

    while pos < chars.len() {
        let c = chars[pos];

        if c.is_whitespace() {
            pos += 1;
            continue;
        }

        // Block comment
        if c == '/' && chars.get(pos + 1) == Some(&'*') {
            pos += 2;
            loop {
                if pos + 1 >= chars.len() {
                    return Err(err(src, pos, "unterminated comment"));
                }
                if chars[pos] == '*' && chars[pos + 1] == '/' {
                    pos += 2;
                    break;
                }
                pos += 1;
            }
            continue;
        }

        let start = pos;

        if c == '"' || c == '\'' {
            pos += 1;
            let mut s = String::new();
            loop {
                let Some(&sc) = chars.get(pos) else {
                    return Err(err(src, start, "unterminated string literal"));
                };
                pos += 1;
                if sc == c {
                    break;
                }
                if sc != '\\' {
                    s.push(sc);
                    continue;
                }
                let Some(&esc) = chars.get(pos) else {
                    return Err(err(src, pos, "unterminated escape"));
                };
                pos += 1;
                match esc {
                    'n' => s.push('\n'),
                    't' => s.push('\t'),
                    'r' => s.push('\r'),
                    'u' => {
                        let hex: String = chars.iter().skip(pos).take(4).collect();
                        let code = u32::from_str_radix(&hex, 16)
                            .ok()
                            .and_then(char::from_u32)
                            .ok_or_else(|| err(src, pos, "invalid unicode escape"))?;
                        s.push(code);
                        pos += 4;
                    }
                    other => s.push(other),
                }
            }
            tokens.push(Spanned {
                token: Token::Str(s),
                offset: start,
            });
            continue;
        }

        if c.is_ascii_digit() {
            while pos < chars.len() && chars[pos].is_ascii_digit() {
                pos += 1;
            }
            if chars.get(pos) == Some(&'.') && chars.get(pos + 1).is_some_and(|d| d.is_ascii_digit())
            {
                pos += 1;
                while pos < chars.len() && chars[pos].is_ascii_digit() {
                    pos += 1;
                }
            }
            if matches!(chars.get(pos), Some('e') | Some('E')) {
                let mut look = pos + 1;
                if matches!(chars.get(look), Some('+') | Some('-')) {
                    look += 1;
                }
                if chars.get(look).is_some_and(|d| d.is_ascii_digit()) {
                    pos = look;
                    while pos < chars.len() && chars[pos].is_ascii_digit() {
                        pos += 1;
                    }
                }
            }
            let text: String = chars[start..pos].iter().collect();
            let n: f64 = text
                .parse()
                .map_err(|_| err(src, start, format!("invalid number '{}'", text)))?;
            tokens.push(Spanned {
                token: Token::Number(n),
                offset: start,
            });
            continue;
        }

        if c == '$' {
            pos += 1;
            if chars.get(pos) == Some(&'$') {
                pos += 1;
                tokens.push(Spanned {
                    token: Token::Variable("$".to_string()),
                    offset: start,
                });
                continue;
            }
            let name_start = pos;
            while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                pos += 1;
            }
            tokens.push(Spanned {
                token: Token::Variable(chars[name_start..pos].iter().collect()),
                offset: start,
            });
            continue;
        }

        if c == '`' {
            pos += 1;
            let name_start = pos;
            while pos < chars.len() && chars[pos] != '`' {
                pos += 1;
            }
            if pos >= chars.len() {
                return Err(err(src, start, "unterminated back-quoted name"));
            }
            let name: String = chars[name_start..pos].iter().collect();
            pos += 1;
            tokens.push(Spanned {
                token: Token::QuotedName(name),
                offset: start,
            });
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                pos += 1;
            }
            tokens.push(Spanned {
                token: Token::Name(chars[start..pos].iter().collect()),
                offset: start,
            });
            continue;
        }

        let next = chars.get(pos + 1).copied();
        let (token, width) = match (c, next) {
            ('.', Some('.')) => (Token::DotDot, 2),
            ('.', _) => (Token::Dot, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            ('{', _) => (Token::LBrace, 1),
            ('}', _) => (Token::RBrace, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            (',', _) => (Token::Comma, 1),
            (':', Some('=')) => (Token::Assign, 2),
            (':', _) => (Token::Colon, 1),
            (';', _) => (Token::Semicolon, 1),
            ('?', _) => (Token::Question, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            ('&', _) => (Token::Amp, 1),
            ('=', _) => (Token::Eq, 1),
            ('!', Some('=')) => (Token::Neq, 2),
            ('<', Some('=')) => (Token::Lte, 2),
            ('<', _) => (Token::Lt, 1),
            ('>', Some('=')) => (Token::Gte, 2),
            ('>', _) => (Token::Gt, 1),
            _ => return Err(err(src, pos, format!("unexpected character '{}'", c))),
        };
        tokens.push(Spanned {
            token,
            offset: start,
        });
        pos += width;
    }

    tokens.push(Spanned {
        token: Token::Eof,
        offset: chars.len(),
    });
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<Token> {
        lex(src).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn lexes_variables_and_paths() {
        assert_eq!(
            kinds("$states.input.amount > 100"),
            vec![
                Token::Variable("states".to_string()),
                Token::Dot,
                Token::Name("input".to_string()),
                Token::Dot,
                Token::Name("amount".to_string()),
                Token::Gt,
                Token::Number(100.0),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn range_is_not_a_decimal_point() {
        assert_eq!(
            kinds("[1..3]"),
            vec![
                Token::LBracket,
                Token::Number(1.0),
                Token::DotDot,
                Token::Number(3.0),
                Token::RBracket,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn strings_with_escapes() {
        assert_eq!(
            kinds(r#"'it\'s' "a\"b""#),
            vec![
                Token::Str("it's".to_string()),
                Token::Str("a\"b".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn bind_and_root_variable() {
        assert_eq!(
            kinds("$x := $$"),
            vec![
                Token::Variable("x".to_string()),
                Token::Assign,
                Token::Variable("$".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn rejects_stray_characters() {
        assert!(lex("a # b").is_err());
        assert!(lex("'open").is_err());
    }
}
