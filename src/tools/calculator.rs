//! 计算器工具：安全求值简单算术表达式
//!
//! 手写递归下降解析，仅支持数字、括号、一元 +/- 与 + - * / % **；不支持变量与函数调用。

use async_trait::async_trait;
use serde_json::{Map, Number, Value};

use crate::tools::{Tool, ToolSchema, ValueKind};

/// 括号与一元符号的最大嵌套层数
const MAX_DEPTH: usize = 64;

/// 计算器工具
pub struct CalculatorTool;

#[async_trait]
impl Tool for CalculatorTool {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate a simple arithmetic expression safely (+ - * / ** % and parentheses)."
    }

    fn input_schema(&self) -> ToolSchema {
        ToolSchema::new().required("expression", ValueKind::String, "Arithmetic expression, e.g. 2+2*10")
    }

    async fn execute(&self, args: &Map<String, Value>) -> Result<Value, String> {
        let expr = args
            .get("expression")
            .and_then(|v| v.as_str())
            .ok_or_else(|| "expression must be a string".to_string())?;
        let value = evaluate(expr)?;
        to_json_number(value)
    }
}

/// 整数结果渲染为整数，其余保持浮点
fn to_json_number(value: f64) -> Result<Value, String> {
    if !value.is_finite() {
        return Err(format!("Result is not finite: {}", value));
    }
    if (value - value.round()).abs() < 1e-12 && value.abs() < i64::MAX as f64 {
        return Ok(Value::Number(Number::from(value.round() as i64)));
    }
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| format!("Result is not representable: {}", value))
}

/// 求值入口
pub fn evaluate(expr: &str) -> Result<f64, String> {
    let tokens = tokenize(expr)?;
    if tokens.is_empty() {
        return Err("Empty expression".to_string());
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!(
            "Unexpected token {:?} at position {}",
            parser.tokens[parser.pos], parser.pos
        ));
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Pow,
    LParen,
    RParen,
}

fn tokenize(expr: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' => {}
            '+' => tokens.push(Token::Plus),
            '-' => tokens.push(Token::Minus),
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Pow);
                i += 1;
            }
            '*' => tokens.push(Token::Star),
            '/' => tokens.push(Token::Slash),
            '%' => tokens.push(Token::Percent),
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            d if d.is_ascii_digit() || d == '.' => {
                let start = i;
                while i + 1 < chars.len() && (chars[i + 1].is_ascii_digit() || chars[i + 1] == '.') {
                    i += 1;
                }
                let literal: String = chars[start..=i].iter().collect();
                let n = literal
                    .parse::<f64>()
                    .map_err(|_| format!("Invalid number literal: {}", literal))?;
                tokens.push(Token::Num(n));
            }
            other => return Err(format!("Disallowed character: '{}'", other)),
        }
        i += 1;
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// 当前 unary 递归深度；所有递归路径都经过 unary
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<f64, String> {
        let mut value = self.term()?;
        while let Some(op) = self.peek().cloned() {
            match op {
                Token::Plus => {
                    self.pos += 1;
                    value += self.term()?;
                }
                Token::Minus => {
                    self.pos += 1;
                    value -= self.term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    // term := unary (('*' | '/' | '%') unary)*
    fn term(&mut self) -> Result<f64, String> {
        let mut value = self.unary()?;
        while let Some(op) = self.peek().cloned() {
            match op {
                Token::Star => {
                    self.pos += 1;
                    value *= self.unary()?;
                }
                Token::Slash => {
                    self.pos += 1;
                    let rhs = self.unary()?;
                    if rhs == 0.0 {
                        return Err("division by zero".to_string());
                    }
                    value /= rhs;
                }
                Token::Percent => {
                    self.pos += 1;
                    let rhs = self.unary()?;
                    if rhs == 0.0 {
                        return Err("modulo by zero".to_string());
                    }
                    // 结果符号跟随除数
                    value -= rhs * (value / rhs).floor();
                }
                _ => break,
            }
        }
        Ok(value)
    }

    // unary := ('+' | '-') unary | power
    fn unary(&mut self) -> Result<f64, String> {
        if self.depth >= MAX_DEPTH {
            return Err("expression nested too deeply".to_string());
        }
        self.depth += 1;
        let value = self.signed();
        self.depth -= 1;
        value
    }

    fn signed(&mut self) -> Result<f64, String> {
        match self.peek().cloned() {
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            _ => self.power(),
        }
    }

    // power := atom ('**' unary)?，右结合
    fn power(&mut self) -> Result<f64, String> {
        let base = self.atom()?;
        if self.peek() == Some(&Token::Pow) {
            self.pos += 1;
            let exp = self.unary()?;
            return Ok(base.powf(exp));
        }
        Ok(base)
    }

    fn atom(&mut self) -> Result<f64, String> {
        match self.next() {
            Some(Token::Num(n)) => Ok(n),
            Some(Token::LParen) => {
                let value = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(value),
                    _ => Err("Missing closing parenthesis".to_string()),
                }
            }
            Some(other) => Err(format!("Unexpected token {:?}", other)),
            None => Err("Unexpected end of expression".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_precedence() {
        assert_eq!(evaluate("2+2*10").unwrap(), 22.0);
        assert_eq!(evaluate("(2+2)*10").unwrap(), 40.0);
    }

    #[test]
    fn test_deep_nesting_is_an_error() {
        let nested = format!("{}1{}", "(".repeat(200_000), ")".repeat(200_000));
        assert_eq!(evaluate(&nested).unwrap_err(), "expression nested too deeply");
        assert!(evaluate(&"-".repeat(100_000)).unwrap_err().contains("nested too deeply"));
        let shallow = format!("{}1{}", "(".repeat(20), ")".repeat(20));
        assert_eq!(evaluate(&shallow).unwrap(), 1.0);
        assert_eq!(evaluate("1+".repeat(500).trim_end_matches('+')).unwrap(), 500.0);
    }

    #[test]
    fn test_power_and_unary() {
        assert_eq!(evaluate("2**3**2").unwrap(), 512.0);
        assert_eq!(evaluate("-2**2").unwrap(), -4.0);
        assert_eq!(evaluate("2**-1").unwrap(), 0.5);
    }

    #[test]
    fn test_modulo_sign_follows_divisor() {
        assert_eq!(evaluate("7 % 3").unwrap(), 1.0);
        assert_eq!(evaluate("-7 % 3").unwrap(), 2.0);
    }

    #[test]
    fn test_errors() {
        assert!(evaluate("1/0").unwrap_err().contains("division by zero"));
        assert!(evaluate("import os").is_err());
        assert!(evaluate("(1+2").is_err());
        assert!(evaluate("").is_err());
        assert!(evaluate("1 2").is_err());
    }

    #[tokio::test]
    async fn test_integral_result_rendered_as_integer() {
        let args = json!({"expression": "2+2*10"});
        let out = CalculatorTool.execute(args.as_object().unwrap()).await;
        assert_eq!(out, Ok(json!(22)));
        let args = json!({"expression": "1/4"});
        let out = CalculatorTool.execute(args.as_object().unwrap()).await;
        assert_eq!(out, Ok(json!(0.25)));
    }
}
