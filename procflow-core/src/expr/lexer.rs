use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Token::Int(i) => i.to_string(),
            Token::Float(f) => f.to_string(),
            Token::Str(s) => format!("'{s}'"),
            Token::Ident(s) => s.clone(),
            Token::True => "true".to_string(),
            Token::False => "false".to_string(),
            Token::Null => "null".to_string(),
            Token::LParen => "'('".to_string(),
            Token::RParen => "')'".to_string(),
            Token::LBracket => "'['".to_string(),
            Token::RBracket => "']'".to_string(),
            Token::Comma => "','".to_string(),
            Token::Dot => "'.'".to_string(),
            Token::Plus => "'+'".to_string(),
            Token::Minus => "'-'".to_string(),
            Token::Star => "'*'".to_string(),
            Token::Slash => "'/'".to_string(),
            Token::Percent => "'%'".to_string(),
            Token::Bang => "'!'".to_string(),
            Token::EqEq => "'=='".to_string(),
            Token::NotEq => "'!='".to_string(),
            Token::Lt => "'<'".to_string(),
            Token::Le => "'<='".to_string(),
            Token::Gt => "'>'".to_string(),
            Token::Ge => "'>='".to_string(),
            Token::AndAnd => "'&&'".to_string(),
            Token::OrOr => "'||'".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Spanned {
    pub tok: Token,
    pub pos: usize,
}

pub(crate) fn tokenize(input: &str) -> Result<Vec<Spanned>, ExprError> {
    let chars: Vec<(usize, char)> = input.char_indices().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let two = chars.get(i + 1).map(|(_, c2)| (c, *c2));
        let double = match two {
            Some(('=', '=')) => Some(Token::EqEq),
            Some(('!', '=')) => Some(Token::NotEq),
            Some(('<', '=')) => Some(Token::Le),
            Some(('>', '=')) => Some(Token::Ge),
            Some(('&', '&')) => Some(Token::AndAnd),
            Some(('|', '|')) => Some(Token::OrOr),
            _ => None,
        };
        if let Some(tok) = double {
            out.push(Spanned { tok, pos });
            i += 2;
            continue;
        }

        let single = match c {
            '(' => Some(Token::LParen),
            ')' => Some(Token::RParen),
            '[' => Some(Token::LBracket),
            ']' => Some(Token::RBracket),
            ',' => Some(Token::Comma),
            '.' => Some(Token::Dot),
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Star),
            '/' => Some(Token::Slash),
            '%' => Some(Token::Percent),
            '!' => Some(Token::Bang),
            '<' => Some(Token::Lt),
            '>' => Some(Token::Gt),
            _ => None,
        };
        if let Some(tok) = single {
            out.push(Spanned { tok, pos });
            i += 1;
            continue;
        }

        if c == '"' || c == '\'' {
            let (s, next) = read_string(&chars, i, c)?;
            out.push(Spanned {
                tok: Token::Str(s),
                pos,
            });
            i = next;
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            let mut is_float = false;
            while i < chars.len() {
                let ch = chars[i].1;
                if ch.is_ascii_digit() {
                    i += 1;
                } else if ch == '.'
                    && !is_float
                    && chars.get(i + 1).is_some_and(|(_, n)| n.is_ascii_digit())
                {
                    is_float = true;
                    i += 1;
                } else {
                    break;
                }
            }
            let text: String = chars[start..i].iter().map(|(_, ch)| ch).collect();
            let tok = if is_float {
                Token::Float(
                    text.parse()
                        .map_err(|_| ExprError::InvalidNumber(text.clone()))?,
                )
            } else {
                Token::Int(
                    text.parse()
                        .map_err(|_| ExprError::InvalidNumber(text.clone()))?,
                )
            };
            out.push(Spanned { tok, pos });
            continue;
        }

        if c.is_alphabetic() || c == '_' || c == '$' {
            let start = i;
            while i < chars.len() {
                let ch = chars[i].1;
                if ch.is_alphanumeric() || ch == '_' || ch == '$' {
                    i += 1;
                } else {
                    break;
                }
            }
            let word: String = chars[start..i].iter().map(|(_, ch)| ch).collect();
            let tok = match word.as_str() {
                "true" => Token::True,
                "false" => Token::False,
                "null" => Token::Null,
                "and" => Token::AndAnd,
                "or" => Token::OrOr,
                _ => Token::Ident(word),
            };
            out.push(Spanned { tok, pos });
            continue;
        }

        return Err(ExprError::UnexpectedChar { ch: c, pos });
    }

    Ok(out)
}

fn read_string(
    chars: &[(usize, char)],
    start: usize,
    quote: char,
) -> Result<(String, usize), ExprError> {
    let mut s = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i].1;
        if c == '\\' {
            let escaped = chars
                .get(i + 1)
                .map(|(_, e)| *e)
                .ok_or(ExprError::UnterminatedString(chars[start].0))?;
            s.push(match escaped {
                'n' => '\n',
                't' => '\t',
                other => other,
            });
            i += 2;
            continue;
        }
        if c == quote {
            return Ok((s, i + 1));
        }
        s.push(c);
        i += 1;
    }
    Err(ExprError::UnterminatedString(chars[start].0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(s: &str) -> Vec<Token> {
        tokenize(s).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn two_char_operators_win_over_single() {
        assert_eq!(
            toks("a<=1 && b!=2"),
            vec![
                Token::Ident("a".into()),
                Token::Le,
                Token::Int(1),
                Token::AndAnd,
                Token::Ident("b".into()),
                Token::NotEq,
                Token::Int(2),
            ]
        );
    }

    #[test]
    fn member_access_after_number_is_not_a_float() {
        assert_eq!(
            toks("items[0].qty + 1.5"),
            vec![
                Token::Ident("items".into()),
                Token::LBracket,
                Token::Int(0),
                Token::RBracket,
                Token::Dot,
                Token::Ident("qty".into()),
                Token::Plus,
                Token::Float(1.5),
            ]
        );
    }

    #[test]
    fn strings_support_both_quotes_and_escapes() {
        assert_eq!(toks(r#"'it\'s' "x""#), vec![Token::Str("it's".into()), Token::Str("x".into())]);
        assert_eq!(tokenize("'open"), Err(ExprError::UnterminatedString(0)));
    }

    #[test]
    fn stray_characters_are_rejected() {
        assert_eq!(
            tokenize("a # b"),
            Err(ExprError::UnexpectedChar { ch: '#', pos: 2 })
        );
    }
}
