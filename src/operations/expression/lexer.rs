use crate::clipping::BooleanOp;
use crate::error::AlgebraError;

/// A lexical token of the structure expression language.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A structure or intermediate-result name.
    Name(String),
    /// A numeric literal (only valid as a margin distance).
    Number(f64),
    Op(BooleanOp),
    LParen,
    RParen,
    Comma,
    Assign,
}

/// A token and the character offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

/// Returns `true` if `c` may continue a name.
#[must_use]
pub fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '#' | '-')
}

/// Returns `true` if `name` is a valid name: an ASCII letter followed by
/// letters, digits, `_`, `#` or `-`.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic()) && chars.all(is_name_char)
}

/// Splits an expression into tokens.
///
/// A `-` directly continuing a name belongs to the name (`PTV-5mm`); a `-`
/// that starts a token is the subtraction operator, or a negative sign when
/// it follows `(` or `,` and precedes a digit.
///
/// # Errors
///
/// Returns `AlgebraError::MalformedExpression` on a character that cannot
/// start a token or a number that does not parse.
pub fn tokenize(source: &str) -> Result<Vec<Spanned>, AlgebraError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens: Vec<Spanned> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        let negative_number = c == '-'
            && chars.get(i + 1).is_some_and(char::is_ascii_digit)
            && matches!(
                tokens.last().map(|t| &t.token),
                Some(Token::LParen | Token::Comma)
            );

        let token = if c.is_ascii_alphabetic() {
            while i < chars.len() && is_name_char(chars[i]) {
                i += 1;
            }
            Token::Name(chars[start..i].iter().collect())
        } else if c.is_ascii_digit() || c == '.' || negative_number {
            i += 1;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| AlgebraError::malformed(format!("invalid number '{text}'"), start))?;
            Token::Number(value)
        } else {
            i += 1;
            match c {
                '(' => Token::LParen,
                ')' => Token::RParen,
                ',' => Token::Comma,
                '=' => Token::Assign,
                _ => match BooleanOp::from_glyph(c) {
                    Some(op) => Token::Op(op),
                    None => {
                        return Err(AlgebraError::malformed(
                            format!("unexpected character '{c}'"),
                            start,
                        ))
                    }
                },
            }
        };
        tokens.push(Spanned {
            token,
            position: start,
        });
    }
    Ok(tokens)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        tokenize(source).unwrap().into_iter().map(|s| s.token).collect()
    }

    #[test]
    fn glyph_operators() {
        assert_eq!(
            kinds("A ∪ B ∩ C ⊕ D - E"),
            vec![
                Token::Name("A".into()),
                Token::Op(BooleanOp::Union),
                Token::Name("B".into()),
                Token::Op(BooleanOp::Intersect),
                Token::Name("C".into()),
                Token::Op(BooleanOp::Xor),
                Token::Name("D".into()),
                Token::Op(BooleanOp::Subtract),
                Token::Name("E".into()),
            ]
        );
    }

    #[test]
    fn dash_inside_name() {
        assert_eq!(
            kinds("PTV-5mm - Bladder#2"),
            vec![
                Token::Name("PTV-5mm".into()),
                Token::Op(BooleanOp::Subtract),
                Token::Name("Bladder#2".into()),
            ]
        );
    }

    #[test]
    fn assignment_and_margin_call() {
        assert_eq!(
            kinds("Ring = margin(CTV, -3.5)"),
            vec![
                Token::Name("Ring".into()),
                Token::Assign,
                Token::Name("margin".into()),
                Token::LParen,
                Token::Name("CTV".into()),
                Token::Comma,
                Token::Number(-3.5),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn positions_count_characters() {
        let tokens = tokenize("A ∪ B").unwrap();
        assert_eq!(tokens[2].position, 4);
    }

    #[test]
    fn unexpected_character() {
        let err = tokenize("A $ B").unwrap_err();
        assert!(matches!(err, AlgebraError::MalformedExpression { position: 2, .. }));
    }

    #[test]
    fn name_validation() {
        assert!(is_valid_name("GTV_1"));
        assert!(is_valid_name("PTV-CTV#3"));
        assert!(!is_valid_name("1GTV"));
        assert!(!is_valid_name("Spinal Cord"));
        assert!(!is_valid_name(""));
    }
}
