use super::QueryError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    Number(i64),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Assign,
    /// `;` or a newline.
    Separator,
    Op(Op),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Tilde,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset into the query text.
    pub pos: usize,
}

fn parse_error(pos: usize, message: impl Into<String>) -> QueryError {
    QueryError::Parse { pos, message: message.into() }
}

/// Split query text into tokens.
pub fn tokenize(text: &str) -> Result<Vec<Token>, QueryError> {
    let bytes = text.as_bytes();
    let mut tokens: Vec<Token> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        let pos = i;

        if c == b'#' {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }
        if c == b'\n' || c == b';' {
            tokens.push(Token { kind: TokenKind::Separator, pos });
            i += 1;
            continue;
        }
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }

        // `%` starts a binary literal only where an operand is expected.
        let operand_expected = !matches!(
            tokens.last().map(|t| &t.kind),
            Some(
                TokenKind::Number(_)
                    | TokenKind::Ident(_)
                    | TokenKind::RParen
                    | TokenKind::RBracket
            )
        );
        let binary_literal =
            c == b'%' && operand_expected && matches!(bytes.get(i + 1), Some(b'0' | b'1'));

        if c.is_ascii_digit() || c == b'$' || binary_literal {
            let (radix, digits_start) = match (c, bytes.get(i + 1)) {
                (b'$', _) => (16, i + 1),
                (b'%', _) => (2, i + 1),
                (b'0', Some(b'x' | b'X')) => (16, i + 2),
                (b'0', Some(b'b' | b'B')) => (2, i + 2),
                _ => (10, i),
            };
            let mut end = digits_start;
            while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
                end += 1;
            }
            let digits: String = text[digits_start..end].chars().filter(|&ch| ch != '_').collect();
            if digits.is_empty() {
                return Err(parse_error(pos, "missing digits in number"));
            }
            let value = i64::from_str_radix(&digits, radix)
                .map_err(|_| parse_error(pos, format!("invalid number '{}'", &text[pos..end])))?;
            tokens.push(Token { kind: TokenKind::Number(value), pos });
            i = end;
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            let mut end = i;
            while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
                end += 1;
            }
            tokens.push(Token { kind: TokenKind::Ident(text[i..end].to_string()), pos });
            i = end;
            continue;
        }

        let next = bytes.get(i + 1).copied();
        let (kind, width) = match (c, next) {
            (b'<', Some(b'<')) => (TokenKind::Op(Op::Shl), 2),
            (b'>', Some(b'>')) => (TokenKind::Op(Op::Shr), 2),
            (b'=', Some(b'=')) => (TokenKind::Op(Op::Eq), 2),
            (b'!', Some(b'=')) => (TokenKind::Op(Op::Ne), 2),
            (b'<', Some(b'=')) => (TokenKind::Op(Op::Le), 2),
            (b'>', Some(b'=')) => (TokenKind::Op(Op::Ge), 2),
            (b'&', Some(b'&')) => (TokenKind::Op(Op::AndAnd), 2),
            (b'|', Some(b'|')) => (TokenKind::Op(Op::OrOr), 2),
            (b'(', _) => (TokenKind::LParen, 1),
            (b')', _) => (TokenKind::RParen, 1),
            (b'[', _) => (TokenKind::LBracket, 1),
            (b']', _) => (TokenKind::RBracket, 1),
            (b',', _) => (TokenKind::Comma, 1),
            (b'=', _) => (TokenKind::Assign, 1),
            (b'+', _) => (TokenKind::Op(Op::Plus), 1),
            (b'-', _) => (TokenKind::Op(Op::Minus), 1),
            (b'*', _) => (TokenKind::Op(Op::Star), 1),
            (b'/', _) => (TokenKind::Op(Op::Slash), 1),
            (b'%', _) => (TokenKind::Op(Op::Percent), 1),
            (b'&', _) => (TokenKind::Op(Op::Amp), 1),
            (b'|', _) => (TokenKind::Op(Op::Pipe), 1),
            (b'^', _) => (TokenKind::Op(Op::Caret), 1),
            (b'<', _) => (TokenKind::Op(Op::Lt), 1),
            (b'>', _) => (TokenKind::Op(Op::Gt), 1),
            (b'!', _) => (TokenKind::Op(Op::Bang), 1),
            (b'~', _) => (TokenKind::Op(Op::Tilde), 1),
            _ => {
                let ch = text[i..].chars().next().unwrap_or('?');
                return Err(parse_error(pos, format!("unexpected character '{ch}'")));
            }
        };
        tokens.push(Token { kind, pos });
        i += width;
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<TokenKind> {
        tokenize(text).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn number_forms() {
        let numbers: Vec<i64> = kinds("[10, 0x1f, $ff, %101, 0b11]")
            .into_iter()
            .filter_map(|kind| match kind {
                TokenKind::Number(n) => Some(n),
                _ => None,
            })
            .collect();
        assert_eq!(numbers, vec![10, 0x1f, 0xff, 5, 3]);
    }

    #[test]
    fn percent_after_operand_is_modulo() {
        assert_eq!(
            kinds("A %10"),
            vec![
                TokenKind::Ident("A".into()),
                TokenKind::Op(Op::Percent),
                TokenKind::Number(10),
            ]
        );
    }

    #[test]
    fn comments_and_separators() {
        assert_eq!(
            kinds("A = 1 # set A\nX = 2; Y = 3"),
            vec![
                TokenKind::Ident("A".into()),
                TokenKind::Assign,
                TokenKind::Number(1),
                TokenKind::Separator,
                TokenKind::Ident("X".into()),
                TokenKind::Assign,
                TokenKind::Number(2),
                TokenKind::Separator,
                TokenKind::Ident("Y".into()),
                TokenKind::Assign,
                TokenKind::Number(3),
            ]
        );
    }

    #[test]
    fn reports_position_of_bad_input() {
        match tokenize("A = 1 @ 2") {
            Err(QueryError::Parse { pos, .. }) => assert_eq!(pos, 6),
            other => panic!("unexpected {other:?}"),
        }
        assert!(tokenize("A = 0xzz").is_err());
    }
}
