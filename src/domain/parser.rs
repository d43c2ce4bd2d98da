//! Arithmetic expression parser.
//!
//! Formulas reach this module after every function call has been replaced by
//! its numeric result, so only numbers, the four arithmetic operators and
//! parentheses remain. Anything else is stripped before parsing.
//!
//! # Grammar
//!
//! ```bnf
//! Expression ::= Term ( ( "+" | "-" ) Term )*
//! Term       ::= Factor ( ( "*" | "/" ) Factor )*
//! Factor     ::= "(" Expression ")" | Number
//! Number     ::= "-"? [0-9]* ( "." [0-9]* )?
//! ```
//!
//! The sign of a number is part of the literal, so `2*-3` is valid while
//! `-(2+3)` is not.

use super::errors::{FormulaError, FormulaResult};

/// Represents a token in the expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Plus,
    Minus,
    Multiply,
    Divide,
    LeftParen,
    RightParen,
    Eof,
}

/// Represents an Abstract Syntax Tree node for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Binary {
        left: Box<Expr>,
        operator: BinaryOp,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// Removes every character outside `0-9 + - * / . ( )` and space.
pub fn sanitize(input: &str) -> String {
    input
        .chars()
        .filter(|ch| ch.is_ascii_digit() || matches!(ch, '+' | '-' | '*' | '/' | '.' | '(' | ')' | ' '))
        .collect()
}

/// Lexical analyzer for sanitized expressions.
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    current_char: Option<char>,
    /// Whether the previous token ends an operand; a `-` after an operand is
    /// subtraction, otherwise it starts a signed literal.
    after_operand: bool,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        let chars: Vec<char> = input.chars().collect();
        let current_char = chars.first().copied();

        Self {
            input: chars,
            position: 0,
            current_char,
            after_operand: false,
        }
    }

    fn advance(&mut self) {
        self.position += 1;
        self.current_char = self.input.get(self.position).copied();
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.current_char {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    /// Reads a literal: optional sign, digits and at most one decimal point.
    fn read_number(&mut self) -> FormulaResult<f64> {
        let mut number_str = String::new();

        if self.current_char == Some('-') {
            number_str.push('-');
            self.advance();
        }

        let mut seen_point = false;
        while let Some(ch) = self.current_char {
            if ch.is_ascii_digit() {
                number_str.push(ch);
            } else if ch == '.' && !seen_point {
                seen_point = true;
                number_str.push(ch);
            } else {
                break;
            }
            self.advance();
        }

        // "5." and ".5" are accepted, a lone sign or point is not.
        let digits = number_str.trim_start_matches('-');
        if !digits.chars().any(|c| c.is_ascii_digit()) {
            return Err(FormulaError::Parse(format!("Invalid number: '{}'", number_str)));
        }

        let normalized = if digits.ends_with('.') {
            number_str.trim_end_matches('.').to_string()
        } else {
            number_str.clone()
        };

        normalized
            .parse::<f64>()
            .map_err(|_| FormulaError::Parse(format!("Invalid number: '{}'", number_str)))
    }

    pub fn next_token(&mut self) -> FormulaResult<Token> {
        self.skip_whitespace();

        let token = match self.current_char {
            None => Token::Eof,
            Some(ch) => match ch {
                '0'..='9' | '.' => Token::Number(self.read_number()?),
                '-' if !self.after_operand => Token::Number(self.read_number()?),
                '-' => {
                    self.advance();
                    Token::Minus
                }
                '+' => {
                    self.advance();
                    Token::Plus
                }
                '*' => {
                    self.advance();
                    Token::Multiply
                }
                '/' => {
                    self.advance();
                    Token::Divide
                }
                '(' => {
                    self.advance();
                    Token::LeftParen
                }
                ')' => {
                    self.advance();
                    Token::RightParen
                }
                _ => return Err(FormulaError::Parse(format!("Unexpected character: '{}'", ch))),
            },
        };

        self.after_operand = matches!(token, Token::Number(_) | Token::RightParen);
        Ok(token)
    }
}

/// Recursive descent parser for sanitized expressions.
pub struct Parser {
    lexer: Lexer,
    current_token: Token,
}

impl Parser {
    pub fn new(input: &str) -> FormulaResult<Self> {
        let mut lexer = Lexer::new(input);
        let current_token = lexer.next_token()?;

        Ok(Self {
            lexer,
            current_token,
        })
    }

    fn advance(&mut self) -> FormulaResult<()> {
        self.current_token = self.lexer.next_token()?;
        Ok(())
    }

    fn expect(&mut self, expected: Token) -> FormulaResult<()> {
        if self.current_token == expected {
            self.advance()
        } else {
            Err(FormulaError::Parse(format!(
                "Expected {:?}, found {:?}",
                expected, self.current_token
            )))
        }
    }

    /// Parses the whole input; leftover tokens are an error.
    pub fn parse(&mut self) -> FormulaResult<Expr> {
        let expr = self.parse_addition()?;

        if self.current_token != Token::Eof {
            return Err(FormulaError::Parse(format!(
                "Unexpected token at end: {:?}",
                self.current_token
            )));
        }

        Ok(expr)
    }

    fn parse_addition(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_multiplication()?;

        while matches!(self.current_token, Token::Plus | Token::Minus) {
            let op = match self.current_token {
                Token::Plus => BinaryOp::Add,
                _ => BinaryOp::Subtract,
            };
            self.advance()?;
            let right = self.parse_multiplication()?;
            left = Expr::Binary {
                left: Box::new(left),
                operator: op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_multiplication(&mut self) -> FormulaResult<Expr> {
        let mut left = self.parse_factor()?;

        while matches!(self.current_token, Token::Multiply | Token::Divide) {
            let op = match self.current_token {
                Token::Multiply => BinaryOp::Multiply,
                _ => BinaryOp::Divide,
            };
            self.advance()?;
            let right = self.parse_factor()?;
            left = Expr::Binary {
                left: Box::new(left),
                operator: op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_factor(&mut self) -> FormulaResult<Expr> {
        match self.current_token {
            Token::Number(value) => {
                self.advance()?;
                Ok(Expr::Number(value))
            }
            Token::LeftParen => {
                self.advance()?;
                let expr = self.parse_addition()?;
                self.expect(Token::RightParen)
                    .map_err(|_| FormulaError::Parse("Mismatched parentheses".to_string()))?;
                Ok(expr)
            }
            _ => Err(FormulaError::Parse(format!(
                "Unexpected token: {:?}",
                self.current_token
            ))),
        }
    }
}

/// Walks an expression tree.
pub fn evaluate(expr: &Expr) -> FormulaResult<f64> {
    match expr {
        Expr::Number(value) => Ok(*value),
        Expr::Binary { left, operator, right } => {
            let left_val = evaluate(left)?;
            let right_val = evaluate(right)?;

            match operator {
                BinaryOp::Add => Ok(left_val + right_val),
                BinaryOp::Subtract => Ok(left_val - right_val),
                BinaryOp::Multiply => Ok(left_val * right_val),
                BinaryOp::Divide => {
                    if right_val == 0.0 {
                        Err(FormulaError::DivisionByZero)
                    } else {
                        Ok(left_val / right_val)
                    }
                }
            }
        }
    }
}

/// Sanitizes, parses and evaluates an arithmetic string.
pub fn evaluate_expression(input: &str) -> FormulaResult<f64> {
    let sanitized = sanitize(input);
    if sanitized.trim().is_empty() {
        return Err(FormulaError::Parse("Empty expression".to_string()));
    }

    let mut parser = Parser::new(&sanitized)?;
    let ast = parser.parse()?;
    evaluate(&ast)
}
