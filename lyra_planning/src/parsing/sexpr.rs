use crate::utils::disp_iter;
use anyhow::{bail, ensure, Result};
use std::fmt::{Debug, Display, Error, Formatter};

/// Nested s-expression over lower-cased string atoms.
#[derive(Eq, PartialEq, Clone)]
pub enum Expr {
    Atom(String),
    List(Vec<Expr>),
}

impl Expr {
    pub fn atom(s: impl Into<String>) -> Expr {
        Expr::Atom(s.into())
    }

    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Expr::Atom(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Expr]> {
        match self {
            Expr::List(es) => Some(es.as_slice()),
            _ => None,
        }
    }

    pub fn into_list(self) -> Option<Vec<Expr>> {
        match self {
            Expr::List(es) => Some(es),
            _ => None,
        }
    }

    /// If this expression is an application `(head arg1 arg2 …)`, returns the
    /// argument expressions.
    pub fn application_args(&self, head: &str) -> Option<&[Expr]> {
        match self {
            Expr::List(es) => match es.first() {
                Some(Expr::Atom(h)) if h == head => Some(&es[1..]),
                _ => None,
            },
            _ => None,
        }
    }
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        match self {
            Expr::Atom(a) => write!(f, "{a}"),
            Expr::List(es) => {
                write!(f, "(")?;
                disp_iter(f, es.as_slice(), " ")?;
                write!(f, ")")
            }
        }
    }
}

impl Debug for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        Display::fmt(self, f)
    }
}

#[derive(Debug, PartialEq)]
enum Token {
    Sym(String),
    LParen,
    RParen,
}

/// Reads a single s-expression covering the whole input.
pub fn parse(s: &str) -> Result<Expr> {
    let tokenized = tokenize(s);
    let mut tokens = tokenized.into_iter().peekable();
    ensure!(tokens.peek().is_some(), "Empty input");
    let e = read(&mut tokens)?;
    ensure!(tokens.next().is_none(), "Trailing content after the first expression");
    Ok(e)
}

fn tokenize(s: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let chars = &mut s.chars();
    let mut cur = String::new();
    while let Some(n) = chars.next() {
        if n == ';' {
            // drop the rest of the line, counting to force consuming the iterator
            chars.take_while(|c| *c != '\n').count();
        } else if n.is_whitespace() || n == '(' || n == ')' {
            if !cur.is_empty() {
                // the language is case insensitive
                cur.make_ascii_lowercase();
                tokens.push(Token::Sym(cur));
                cur = String::new();
            }
            if n == '(' {
                tokens.push(Token::LParen);
            }
            if n == ')' {
                tokens.push(Token::RParen);
            }
        } else {
            cur.push(n);
        }
    }
    if !cur.is_empty() {
        cur.make_ascii_lowercase();
        tokens.push(Token::Sym(cur));
    }
    tokens
}

fn read(tokens: &mut std::iter::Peekable<std::vec::IntoIter<Token>>) -> Result<Expr> {
    match tokens.next() {
        Some(Token::Sym(s)) => Ok(Expr::Atom(s)),
        Some(Token::LParen) => {
            let mut es = Vec::new();
            loop {
                match tokens.peek() {
                    Some(Token::RParen) => {
                        tokens.next();
                        return Ok(Expr::List(es));
                    }
                    Some(_) => es.push(read(tokens)?),
                    None => bail!("Missing closing parenthesis"),
                }
            }
        }
        Some(Token::RParen) => bail!("Unmatched closing parenthesis"),
        None => bail!("Unexpected end of input"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_nested_lists() {
        let e = parse("(define (domain Dinner) (:requirements :strips))").unwrap();
        assert_eq!(format!("{e}"), "(define (domain dinner) (:requirements :strips))");
    }

    #[test]
    fn strips_comments_and_folds_case() {
        let e = parse("(A ; comment (ignored\n B)").unwrap();
        let items = e.as_list().unwrap();
        assert_eq!(items[0].as_atom(), Some("a"));
        assert_eq!(items[1].as_atom(), Some("b"));
    }

    #[test]
    fn unbalanced_parentheses_are_errors() {
        assert!(parse("(a (b)").is_err());
        assert!(parse("(a))").is_err());
        assert!(parse("").is_err());
    }

    #[test]
    fn application_args() {
        let e = parse("(not (clean))").unwrap();
        let args = e.application_args("not").unwrap();
        assert_eq!(args.len(), 1);
        assert!(e.application_args("and").is_none());
    }
}
