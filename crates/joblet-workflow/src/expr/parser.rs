// SPDX-License-Identifier: MIT
//! Recursive-descent parser for the dependency expression grammar (§4.6):
//!
//! ```text
//! expr    := or
//! or      := and (("OR"|"||") and)*
//! and     := not (("AND"|"&&") not)*
//! not     := ("NOT"|"!") not | atom
//! atom    := job "=" status | job "!=" status
//!         |  job "IN" "(" status ("," status)* ")"
//!         |  job "NOT_IN" "(" status ("," status)* ")"
//!         |  "(" expr ")"
//! ```

use super::lexer::{lex, Token};
use joblet_core::error::JobletError;
use joblet_core::job::JobStatus;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Eq(String, JobStatus),
    Ne(String, JobStatus),
    In(String, Vec<JobStatus>),
    NotIn(String, Vec<JobStatus>),
}

impl Expr {
    /// Every job name referenced anywhere in the expression, used by
    /// validation to check that all dependencies exist (§4.6).
    pub fn referenced_jobs(&self, out: &mut Vec<String>) {
        match self {
            Expr::Or(a, b) | Expr::And(a, b) => {
                a.referenced_jobs(out);
                b.referenced_jobs(out);
            }
            Expr::Not(a) => a.referenced_jobs(out),
            Expr::Eq(job, _) | Expr::Ne(job, _) | Expr::In(job, _) | Expr::NotIn(job, _) => {
                out.push(job.clone());
            }
        }
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    source: String,
}

pub fn parse(source: &str) -> Result<Expr, JobletError> {
    let tokens = lex(source)?;
    let mut parser = Parser { tokens, pos: 0, source: source.to_string() };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(JobletError::validation(&parser.source, "trailing tokens after expression"));
    }
    Ok(expr)
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn err(&self, message: impl Into<String>) -> JobletError {
        JobletError::validation(&self.source, message.into())
    }

    fn parse_or(&mut self) -> Result<Expr, JobletError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, JobletError> {
        let mut left = self.parse_not()?;
        while matches!(self.peek(), Some(Token::And)) {
            self.advance();
            let right = self.parse_not()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, JobletError> {
        if matches!(self.peek(), Some(Token::Not)) {
            self.advance();
            let inner = self.parse_not()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Expr, JobletError> {
        if matches!(self.peek(), Some(Token::LParen)) {
            self.advance();
            let inner = self.parse_or()?;
            match self.advance() {
                Some(Token::RParen) => return Ok(inner),
                _ => return Err(self.err("expected ')'")),
            }
        }

        let job = match self.advance() {
            Some(Token::Ident(name)) => name,
            _ => return Err(self.err("expected a job name")),
        };

        match self.advance() {
            Some(Token::Eq) => Ok(Expr::Eq(job, self.parse_status()?)),
            Some(Token::Ne) => Ok(Expr::Ne(job, self.parse_status()?)),
            Some(Token::In) => Ok(Expr::In(job, self.parse_status_list()?)),
            Some(Token::NotIn) => Ok(Expr::NotIn(job, self.parse_status_list()?)),
            _ => Err(self.err("expected '=', '!=', 'IN', or 'NOT_IN' after job name")),
        }
    }

    fn parse_status(&mut self) -> Result<JobStatus, JobletError> {
        match self.advance() {
            Some(Token::Ident(s)) => s.parse(),
            _ => Err(self.err("expected a status literal")),
        }
    }

    fn parse_status_list(&mut self) -> Result<Vec<JobStatus>, JobletError> {
        match self.advance() {
            Some(Token::LParen) => {}
            _ => return Err(self.err("expected '(' to start a status list")),
        }
        let mut statuses = vec![self.parse_status()?];
        while matches!(self.peek(), Some(Token::Comma)) {
            self.advance();
            statuses.push(self.parse_status()?);
        }
        match self.advance() {
            Some(Token::RParen) => Ok(statuses),
            _ => Err(self.err("expected ')' to close a status list")),
        }
    }
}
