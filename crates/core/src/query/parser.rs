//! Recursive-descent parser for query programs.

use super::lexer::{tokenize, Op, Token, TokenKind};
use super::QueryError;
use crate::symbols::Register;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LogicAnd,
    LogicOr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    S8,
    S16,
    Lo,
    Hi,
}

impl Func {
    fn from_name(name: &str) -> Option<Func> {
        match name {
            "s8" => Some(Func::S8),
            "s16" => Some(Func::S16),
            "lo" => Some(Func::Lo),
            "hi" => Some(Func::Hi),
            _ => None,
        }
    }
}

/// Something a query can read from or assign to.
#[derive(Debug, Clone, PartialEq)]
pub enum Place {
    Register(Register),
    /// `[addr]`
    Byte(Box<Expr>),
    /// `[a0, a1, ...]`, little-endian.
    Bytes(Vec<Expr>),
    /// `w[addr]`: `addr` and `addr + 1`, little-endian.
    Word(Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(i64),
    Read { place: Place, pos: usize },
    Unary { op: UnaryOp, expr: Box<Expr> },
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr>, pos: usize },
    Call { func: Func, arg: Box<Expr> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub target: Place,
    pub value: Expr,
    pub pos: usize,
}

/// A parsed query: assignments executed in order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}

impl Program {
    pub fn parse(text: &str) -> Result<Program, QueryError> {
        let tokens = tokenize(text)?;
        Parser { tokens, index: 0, end: text.len(), depth: 0 }.parse_program()
    }
}

/// Deepest nesting of parentheses, brackets, prefix operators and operator
/// chains a single expression may use.
const MAX_DEPTH: usize = 128;

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    end: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.index).map(|t| &t.kind)
    }

    fn pos(&self) -> usize {
        self.tokens.get(self.index).map(|t| t.pos).unwrap_or(self.end)
    }

    fn error(&self, message: impl Into<String>) -> QueryError {
        QueryError::Parse { pos: self.pos(), message: message.into() }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.peek() == Some(kind) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn enter(&mut self) -> Result<(), QueryError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        self.depth += 1;
        Ok(())
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<(), QueryError> {
        if self.eat(kind) {
            Ok(())
        } else {
            Err(self.error(format!("expected {what}")))
        }
    }

    fn parse_program(mut self) -> Result<Program, QueryError> {
        let mut statements = Vec::new();
        loop {
            while self.eat(&TokenKind::Separator) {}
            if self.peek().is_none() {
                break;
            }
            statements.push(self.parse_statement()?);
            match self.peek() {
                None | Some(TokenKind::Separator) => {}
                Some(_) => return Err(self.error("expected ';' or end of line")),
            }
        }
        Ok(Program { statements })
    }

    fn parse_statement(&mut self) -> Result<Statement, QueryError> {
        let pos = self.pos();
        let target = match self.parse_place()? {
            Some(place) => place,
            None => return Err(self.error("expected a register or memory target")),
        };
        self.expect(&TokenKind::Assign, "'='")?;
        let value = self.parse_expr()?;
        Ok(Statement { target, value, pos })
    }

    /// A register name, `[..]` or `w[..]`; `None` if the next token starts none of them.
    fn parse_place(&mut self) -> Result<Option<Place>, QueryError> {
        match self.peek() {
            Some(TokenKind::LBracket) => {
                self.index += 1;
                let mut addresses = vec![self.parse_expr()?];
                while self.eat(&TokenKind::Comma) {
                    addresses.push(self.parse_expr()?);
                }
                self.expect(&TokenKind::RBracket, "']'")?;
                if addresses.len() == 1 {
                    let address = addresses.remove(0);
                    Ok(Some(Place::Byte(Box::new(address))))
                } else {
                    Ok(Some(Place::Bytes(addresses)))
                }
            }
            Some(TokenKind::Ident(name)) if name == "w" => {
                if self.tokens.get(self.index + 1).map(|t| &t.kind) != Some(&TokenKind::LBracket) {
                    return Err(self.error("expected '[' after 'w'"));
                }
                self.index += 2;
                let address = self.parse_expr()?;
                self.expect(&TokenKind::RBracket, "']'")?;
                Ok(Some(Place::Word(Box::new(address))))
            }
            Some(TokenKind::Ident(name)) => match Register::from_name(name) {
                Some(reg) => {
                    self.index += 1;
                    Ok(Some(Place::Register(reg)))
                }
                None => Ok(None),
            },
            _ => Ok(None),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, QueryError> {
        self.parse_binary(0)
    }

    /// Precedence climbing over the binary operator levels, loosest first.
    fn parse_binary(&mut self, level: usize) -> Result<Expr, QueryError> {
        const LEVELS: &[&[(Op, BinaryOp)]] = &[
            &[(Op::OrOr, BinaryOp::LogicOr)],
            &[(Op::AndAnd, BinaryOp::LogicAnd)],
            &[(Op::Pipe, BinaryOp::Or)],
            &[(Op::Caret, BinaryOp::Xor)],
            &[(Op::Amp, BinaryOp::And)],
            &[(Op::Eq, BinaryOp::Eq), (Op::Ne, BinaryOp::Ne)],
            &[
                (Op::Lt, BinaryOp::Lt),
                (Op::Le, BinaryOp::Le),
                (Op::Gt, BinaryOp::Gt),
                (Op::Ge, BinaryOp::Ge),
            ],
            &[(Op::Shl, BinaryOp::Shl), (Op::Shr, BinaryOp::Shr)],
            &[(Op::Plus, BinaryOp::Add), (Op::Minus, BinaryOp::Sub)],
            &[(Op::Star, BinaryOp::Mul), (Op::Slash, BinaryOp::Div), (Op::Percent, BinaryOp::Mod)],
        ];

        if level == LEVELS.len() {
            return self.parse_unary();
        }
        let depth = self.depth;
        let mut node = self.parse_binary(level + 1)?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Op(op)) => {
                    LEVELS[level].iter().find(|(tok, _)| tok == op).map(|&(_, bin)| bin)
                }
                _ => None,
            };
            let Some(op) = op else { break };
            let pos = self.pos();
            self.index += 1;
            // Each operator deepens the left-leaning tree by one.
            self.enter()?;
            let right = self.parse_binary(level + 1)?;
            node = Expr::Binary { op, left: Box::new(node), right: Box::new(right), pos };
        }
        self.depth = depth;
        Ok(node)
    }

    fn parse_unary(&mut self) -> Result<Expr, QueryError> {
        self.enter()?;
        let expr = self.parse_prefixed()?;
        self.depth -= 1;
        Ok(expr)
    }

    fn parse_prefixed(&mut self) -> Result<Expr, QueryError> {
        let op = match self.peek() {
            Some(TokenKind::Op(Op::Minus)) => Some(UnaryOp::Neg),
            Some(TokenKind::Op(Op::Bang)) => Some(UnaryOp::Not),
            Some(TokenKind::Op(Op::Tilde)) => Some(UnaryOp::BitNot),
            Some(TokenKind::Op(Op::Plus)) => {
                self.index += 1;
                return self.parse_unary();
            }
            _ => None,
        };
        if let Some(op) = op {
            self.index += 1;
            let expr = self.parse_unary()?;
            return Ok(Expr::Unary { op, expr: Box::new(expr) });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, QueryError> {
        let pos = self.pos();
        if let Some(place) = self.parse_place()? {
            return Ok(Expr::Read { place, pos });
        }
        match self.peek().cloned() {
            Some(TokenKind::Number(n)) => {
                self.index += 1;
                Ok(Expr::Number(n))
            }
            Some(TokenKind::LParen) => {
                self.index += 1;
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(expr)
            }
            Some(TokenKind::Ident(name)) => {
                let Some(func) = Func::from_name(&name) else {
                    return Err(self.error(format!("unknown name '{name}'")));
                };
                self.index += 1;
                self.expect(&TokenKind::LParen, "'(' after function name")?;
                let arg = self.parse_expr()?;
                self.expect(&TokenKind::RParen, "')'")?;
                Ok(Expr::Call { func, arg: Box::new(arg) })
            }
            Some(_) => Err(self.error("expected an expression")),
            None => Err(self.error("unexpected end of query")),
        }
    }
}
