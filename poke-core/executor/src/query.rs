//! 响应体查询
//!
//! 实现 jq 查询语言的一个子集：路径访问、迭代、管道、逗号、可选运算、
//! 替代运算 `//`、比较与逻辑运算、数组构造，以及常用内置函数
//! (`length` `keys` `values` `first` `last` `not` `type` `tostring`
//! `tonumber` `empty` `select` `map` `has`)。
//!
//! 查询对一个 JSON 值求值，产生零个或多个结果。

use serde_json::{Map, Number, Value};
use std::cmp::Ordering;
use thiserror::Error;

use crate::{ExecutorError, Result};

/// 查询内部错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("语法错误: {0}")]
    Parse(String),

    #[error("{0}")]
    Runtime(String),
}

type QResult<T> = std::result::Result<T, QueryError>;

/// 已编译的查询
#[derive(Debug, Clone)]
pub struct Query {
    source: String,
    expr: Expr,
}

impl Query {
    /// 编译查询表达式
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = lex(source).map_err(|e| query_error(source, e))?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_program().map_err(|e| query_error(source, e))?;

        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// 对输入求值，返回所有结果
    pub fn run(&self, input: &Value) -> Result<Vec<Value>> {
        eval(&self.expr, input).map_err(|e| query_error(&self.source, e))
    }

    /// 查询源文本
    pub fn source(&self) -> &str {
        &self.source
    }
}

fn query_error(source: &str, err: QueryError) -> ExecutorError {
    ExecutorError::Query {
        query: source.to_string(),
        reason: err.to_string(),
    }
}

// ============================================
// 词法分析
// ============================================

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Dot,
    DotDot,
    Field(String),
    Ident(String),
    Str(String),
    Num(f64),
    LBracket,
    RBracket,
    LParen,
    RParen,
    Pipe,
    Comma,
    Colon,
    Semicolon,
    Question,
    Alt,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn lex(source: &str) -> QResult<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();

        match c {
            c if c.is_whitespace() => {
                i += 1;
            }
            '.' if next == Some('.') => {
                tokens.push(Token::DotDot);
                i += 2;
            }
            '.' if next.is_some_and(|n| n.is_ascii_alphabetic() || n == '_') => {
                // `.name` 必须紧邻，`. and` 中的 and 是关键字
                let start = i + 1;
                i = start;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Field(chars[start..i].iter().collect()));
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ':' => {
                tokens.push(Token::Colon);
                i += 1;
            }
            ';' => {
                tokens.push(Token::Semicolon);
                i += 1;
            }
            '?' => {
                tokens.push(Token::Question);
                i += 1;
            }
            '/' if next == Some('/') => {
                tokens.push(Token::Alt);
                i += 2;
            }
            '=' if next == Some('=') => {
                tokens.push(Token::Eq);
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Ne);
                i += 2;
            }
            '<' if next == Some('=') => {
                tokens.push(Token::Le);
                i += 2;
            }
            '<' => {
                tokens.push(Token::Lt);
                i += 1;
            }
            '>' if next == Some('=') => {
                tokens.push(Token::Ge);
                i += 2;
            }
            '>' => {
                tokens.push(Token::Gt);
                i += 1;
            }
            '"' => {
                let (s, end) = lex_string(&chars, i + 1)?;
                tokens.push(Token::Str(s));
                i = end;
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len()
                    && (chars[i].is_ascii_digit()
                        || chars[i] == '.'
                        || chars[i] == 'e'
                        || chars[i] == 'E'
                        || ((chars[i] == '+' || chars[i] == '-')
                            && matches!(chars[i - 1], 'e' | 'E')))
                {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let num = text
                    .parse::<f64>()
                    .map_err(|_| QueryError::Parse(format!("非法数字: {}", text)))?;
                tokens.push(Token::Num(num));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => {
                return Err(QueryError::Parse(format!("无法识别的字符 '{}'", other)));
            }
        }
    }

    Ok(tokens)
}

fn lex_string(chars: &[char], mut i: usize) -> QResult<(String, usize)> {
    let mut out = String::new();

    while i < chars.len() {
        match chars[i] {
            '"' => return Ok((out, i + 1)),
            '\\' => {
                let escaped = chars
                    .get(i + 1)
                    .ok_or_else(|| QueryError::Parse("字符串未结束".to_string()))?;
                match escaped {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '"' => out.push('"'),
                    '\\' => out.push('\\'),
                    '/' => out.push('/'),
                    'u' => {
                        let hex: String = chars.iter().skip(i + 2).take(4).collect();
                        let code = u32::from_str_radix(&hex, 16)
                            .ok()
                            .and_then(char::from_u32)
                            .ok_or_else(|| {
                                QueryError::Parse(format!("非法 unicode 转义: \\u{}", hex))
                            })?;
                        out.push(code);
                        i += 4;
                    }
                    other => {
                        return Err(QueryError::Parse(format!("非法转义: \\{}", other)));
                    }
                }
                i += 2;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }

    Err(QueryError::Parse("字符串未结束".to_string()))
}

// ============================================
// 语法分析
// ============================================

#[derive(Debug, Clone, Copy, PartialEq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone)]
enum Expr {
    Identity,
    Recurse,
    Literal(Value),
    Field(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Slice(Box<Expr>, Option<Box<Expr>>, Option<Box<Expr>>),
    Iterate(Box<Expr>),
    Optional(Box<Expr>),
    Array(Option<Box<Expr>>),
    Pipe(Box<Expr>, Box<Expr>),
    Comma(Box<Expr>, Box<Expr>),
    Alternative(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

/// 内置函数及其参数个数
fn builtin_arity(name: &str) -> Option<usize> {
    match name {
        "length" | "keys" | "values" | "first" | "last" | "not" | "type" | "tostring"
        | "tonumber" | "empty" => Some(0),
        "select" | "map" | "has" => Some(1),
        _ => None,
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn expect(&mut self, expected: Token) -> QResult<()> {
        match self.advance() {
            Some(ref t) if *t == expected => Ok(()),
            Some(t) => Err(QueryError::Parse(format!(
                "期望 {:?}，实际为 {:?}",
                expected, t
            ))),
            None => Err(QueryError::Parse(format!(
                "期望 {:?}，但表达式已结束",
                expected
            ))),
        }
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(name)) if name == keyword)
    }

    fn parse_program(&mut self) -> QResult<Expr> {
        if self.tokens.is_empty() {
            return Err(QueryError::Parse("空表达式".to_string()));
        }
        let expr = self.parse_pipe()?;
        if let Some(token) = self.peek() {
            return Err(QueryError::Parse(format!("多余的符号 {:?}", token)));
        }
        Ok(expr)
    }

    fn parse_pipe(&mut self) -> QResult<Expr> {
        let mut left = self.parse_comma()?;
        while self.peek() == Some(&Token::Pipe) {
            self.advance();
            let right = self.parse_comma()?;
            left = Expr::Pipe(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comma(&mut self) -> QResult<Expr> {
        let mut left = self.parse_alternative()?;
        while self.peek() == Some(&Token::Comma) {
            self.advance();
            let right = self.parse_alternative()?;
            left = Expr::Comma(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_alternative(&mut self) -> QResult<Expr> {
        let left = self.parse_or()?;
        if self.peek() == Some(&Token::Alt) {
            self.advance();
            // 右结合
            let right = self.parse_alternative()?;
            return Ok(Expr::Alternative(Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn parse_or(&mut self) -> QResult<Expr> {
        let mut left = self.parse_and()?;
        while self.peek_keyword("or") {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> QResult<Expr> {
        let mut left = self.parse_comparison()?;
        while self.peek_keyword("and") {
            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> QResult<Expr> {
        let left = self.parse_postfix()?;
        let op = match self.peek() {
            Some(Token::Eq) => CmpOp::Eq,
            Some(Token::Ne) => CmpOp::Ne,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Le) => CmpOp::Le,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Ge) => CmpOp::Ge,
            _ => return Ok(left),
        };
        self.advance();
        let right = self.parse_postfix()?;
        Ok(Expr::Compare(op, Box::new(left), Box::new(right)))
    }

    fn parse_postfix(&mut self) -> QResult<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.peek() {
                Some(Token::Field(name)) => {
                    expr = Expr::Field(Box::new(expr), name.clone());
                    self.advance();
                }
                Some(Token::Dot) => match self.peek_at(1) {
                    Some(Token::Str(_)) => {
                        self.advance();
                        let name = self.field_name()?;
                        expr = Expr::Field(Box::new(expr), name);
                    }
                    Some(Token::LBracket) => {
                        self.advance();
                        expr = self.parse_bracket(expr)?;
                    }
                    _ => break,
                },
                Some(Token::LBracket) => {
                    expr = self.parse_bracket(expr)?;
                }
                Some(Token::Question) => {
                    self.advance();
                    expr = Expr::Optional(Box::new(expr));
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn field_name(&mut self) -> QResult<String> {
        match self.advance() {
            Some(Token::Str(name)) => Ok(name),
            other => Err(QueryError::Parse(format!("期望字段名，实际为 {:?}", other))),
        }
    }

    /// 解析 `[...]` 后缀：迭代、索引或切片
    fn parse_bracket(&mut self, target: Expr) -> QResult<Expr> {
        self.expect(Token::LBracket)?;

        if self.peek() == Some(&Token::RBracket) {
            self.advance();
            return Ok(Expr::Iterate(Box::new(target)));
        }

        if self.peek() == Some(&Token::Colon) {
            self.advance();
            let to = self.parse_pipe()?;
            self.expect(Token::RBracket)?;
            return Ok(Expr::Slice(Box::new(target), None, Some(Box::new(to))));
        }

        let index = self.parse_pipe()?;

        if self.peek() == Some(&Token::Colon) {
            self.advance();
            let to = if self.peek() == Some(&Token::RBracket) {
                None
            } else {
                Some(Box::new(self.parse_pipe()?))
            };
            self.expect(Token::RBracket)?;
            return Ok(Expr::Slice(Box::new(target), Some(Box::new(index)), to));
        }

        self.expect(Token::RBracket)?;
        Ok(Expr::Index(Box::new(target), Box::new(index)))
    }

    fn parse_primary(&mut self) -> QResult<Expr> {
        match self.advance() {
            Some(Token::DotDot) => Ok(Expr::Recurse),
            Some(Token::Field(name)) => Ok(Expr::Field(Box::new(Expr::Identity), name)),
            Some(Token::Dot) => match self.peek() {
                Some(Token::Str(_)) => {
                    let name = self.field_name()?;
                    Ok(Expr::Field(Box::new(Expr::Identity), name))
                }
                Some(Token::LBracket) => self.parse_bracket(Expr::Identity),
                _ => Ok(Expr::Identity),
            },
            Some(Token::Num(n)) => Ok(Expr::Literal(number_value(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::LParen) => {
                let inner = self.parse_pipe()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                if self.peek() == Some(&Token::RBracket) {
                    self.advance();
                    return Ok(Expr::Array(None));
                }
                let inner = self.parse_pipe()?;
                self.expect(Token::RBracket)?;
                Ok(Expr::Array(Some(Box::new(inner))))
            }
            Some(Token::Ident(name)) => self.parse_ident(name),
            Some(token) => Err(QueryError::Parse(format!("意外的符号 {:?}", token))),
            None => Err(QueryError::Parse("表达式意外结束".to_string())),
        }
    }

    fn parse_ident(&mut self, name: String) -> QResult<Expr> {
        match name.as_str() {
            "true" => return Ok(Expr::Literal(Value::Bool(true))),
            "false" => return Ok(Expr::Literal(Value::Bool(false))),
            "null" => return Ok(Expr::Literal(Value::Null)),
            _ => {}
        }

        let arity = builtin_arity(&name)
            .ok_or_else(|| QueryError::Parse(format!("未知函数: {}", name)))?;

        let mut args = Vec::new();
        if self.peek() == Some(&Token::LParen) {
            self.advance();
            loop {
                args.push(self.parse_pipe()?);
                if self.peek() == Some(&Token::Semicolon) {
                    self.advance();
                    continue;
                }
                break;
            }
            self.expect(Token::RParen)?;
        }

        if args.len() != arity {
            return Err(QueryError::Parse(format!(
                "函数 {} 需要 {} 个参数，实际 {} 个",
                name,
                arity,
                args.len()
            )));
        }

        Ok(Expr::Call(name, args))
    }
}

fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::Number(Number::from(n as i64))
    } else {
        Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
    }
}

// ============================================
// 求值
// ============================================

fn eval(expr: &Expr, input: &Value) -> QResult<Vec<Value>> {
    match expr {
        Expr::Identity => Ok(vec![input.clone()]),
        Expr::Recurse => {
            let mut out = Vec::new();
            recurse(input, &mut out);
            Ok(out)
        }
        Expr::Literal(value) => Ok(vec![value.clone()]),
        Expr::Field(target, name) => {
            let mut out = Vec::new();
            for value in eval(target, input)? {
                out.push(index_field(&value, name)?);
            }
            Ok(out)
        }
        Expr::Index(target, index) => {
            let mut out = Vec::new();
            for value in eval(target, input)? {
                // 索引表达式相对于原始输入求值
                for key in eval(index, input)? {
                    out.push(index_value(&value, &key)?);
                }
            }
            Ok(out)
        }
        Expr::Slice(target, from, to) => {
            let froms = match from {
                Some(e) => eval(e, input)?,
                None => vec![Value::Null],
            };
            let tos = match to {
                Some(e) => eval(e, input)?,
                None => vec![Value::Null],
            };
            let mut out = Vec::new();
            for value in eval(target, input)? {
                for f in &froms {
                    for t in &tos {
                        out.push(slice_value(&value, f, t)?);
                    }
                }
            }
            Ok(out)
        }
        Expr::Iterate(target) => {
            let mut out = Vec::new();
            for value in eval(target, input)? {
                match value {
                    Value::Array(items) => out.extend(items),
                    Value::Object(map) => out.extend(map.into_iter().map(|(_, v)| v)),
                    other => {
                        return Err(QueryError::Runtime(format!(
                            "Cannot iterate over {}",
                            type_name(&other)
                        )))
                    }
                }
            }
            Ok(out)
        }
        Expr::Optional(inner) => Ok(eval(inner, input).unwrap_or_default()),
        Expr::Array(inner) => match inner {
            Some(e) => Ok(vec![Value::Array(eval(e, input)?)]),
            None => Ok(vec![Value::Array(Vec::new())]),
        },
        Expr::Pipe(left, right) => {
            let mut out = Vec::new();
            for value in eval(left, input)? {
                out.extend(eval(right, &value)?);
            }
            Ok(out)
        }
        Expr::Comma(left, right) => {
            let mut out = eval(left, input)?;
            out.extend(eval(right, input)?);
            Ok(out)
        }
        Expr::Alternative(left, right) => {
            let truthy: Vec<Value> = eval(left, input)
                .unwrap_or_default()
                .into_iter()
                .filter(is_truthy)
                .collect();
            if truthy.is_empty() {
                eval(right, input)
            } else {
                Ok(truthy)
            }
        }
        Expr::And(left, right) => {
            let mut out = Vec::new();
            for l in eval(left, input)? {
                if !is_truthy(&l) {
                    out.push(Value::Bool(false));
                    continue;
                }
                for r in eval(right, input)? {
                    out.push(Value::Bool(is_truthy(&r)));
                }
            }
            Ok(out)
        }
        Expr::Or(left, right) => {
            let mut out = Vec::new();
            for l in eval(left, input)? {
                if is_truthy(&l) {
                    out.push(Value::Bool(true));
                    continue;
                }
                for r in eval(right, input)? {
                    out.push(Value::Bool(is_truthy(&r)));
                }
            }
            Ok(out)
        }
        Expr::Compare(op, left, right) => {
            let rights = eval(right, input)?;
            let mut out = Vec::new();
            for l in eval(left, input)? {
                for r in &rights {
                    let ordering = compare_values(&l, r);
                    let result = match op {
                        CmpOp::Eq => ordering == Ordering::Equal,
                        CmpOp::Ne => ordering != Ordering::Equal,
                        CmpOp::Lt => ordering == Ordering::Less,
                        CmpOp::Le => ordering != Ordering::Greater,
                        CmpOp::Gt => ordering == Ordering::Greater,
                        CmpOp::Ge => ordering != Ordering::Less,
                    };
                    out.push(Value::Bool(result));
                }
            }
            Ok(out)
        }
        Expr::Call(name, args) => call_builtin(name, args, input),
    }
}

fn recurse(value: &Value, out: &mut Vec<Value>) {
    out.push(value.clone());
    match value {
        Value::Array(items) => items.iter().for_each(|v| recurse(v, out)),
        Value::Object(map) => map.values().for_each(|v| recurse(v, out)),
        _ => {}
    }
}

fn index_field(value: &Value, name: &str) -> QResult<Value> {
    match value {
        Value::Object(map) => Ok(map.get(name).cloned().unwrap_or(Value::Null)),
        Value::Null => Ok(Value::Null),
        other => Err(QueryError::Runtime(format!(
            "Cannot index {} with \"{}\"",
            type_name(other),
            name
        ))),
    }
}

fn index_value(value: &Value, key: &Value) -> QResult<Value> {
    match (value, key) {
        (Value::Object(_), Value::String(name)) => index_field(value, name),
        (Value::Array(items), Value::Number(n)) => {
            let idx = n.as_f64().unwrap_or(0.0).floor() as i64;
            let len = items.len() as i64;
            let idx = if idx < 0 { len + idx } else { idx };
            if idx < 0 || idx >= len {
                Ok(Value::Null)
            } else {
                Ok(items[idx as usize].clone())
            }
        }
        (Value::Null, Value::String(_)) | (Value::Null, Value::Number(_)) => Ok(Value::Null),
        (target, key) => Err(QueryError::Runtime(format!(
            "Cannot index {} with {}",
            type_name(target),
            type_name(key)
        ))),
    }
}

fn slice_bounds(len: usize, from: &Value, to: &Value) -> QResult<(usize, usize)> {
    let clamp = |v: &Value, default: i64| -> QResult<usize> {
        let raw = match v {
            Value::Null => default,
            Value::Number(n) => n.as_f64().unwrap_or(0.0).floor() as i64,
            other => {
                return Err(QueryError::Runtime(format!(
                    "Start and end indices of a slice must be numbers, got {}",
                    type_name(other)
                )))
            }
        };
        let len = len as i64;
        let idx = if raw < 0 { len + raw } else { raw };
        Ok(idx.clamp(0, len) as usize)
    };
    let start = clamp(from, 0)?;
    let end = clamp(to, len as i64)?;
    Ok((start, end.max(start)))
}

fn slice_value(value: &Value, from: &Value, to: &Value) -> QResult<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Array(items) => {
            let (start, end) = slice_bounds(items.len(), from, to)?;
            Ok(Value::Array(items[start..end].to_vec()))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (start, end) = slice_bounds(chars.len(), from, to)?;
            Ok(Value::String(chars[start..end].iter().collect()))
        }
        other => Err(QueryError::Runtime(format!(
            "Cannot index {} with object",
            type_name(other)
        ))),
    }
}

fn call_builtin(name: &str, args: &[Expr], input: &Value) -> QResult<Vec<Value>> {
    match name {
        "empty" => Ok(Vec::new()),
        "length" => {
            let len = match input {
                Value::Null => Value::from(0),
                Value::Bool(_) => {
                    return Err(QueryError::Runtime("boolean has no length".to_string()))
                }
                Value::Number(n) => number_value(n.as_f64().unwrap_or(0.0).abs()),
                Value::String(s) => Value::from(s.chars().count()),
                Value::Array(items) => Value::from(items.len()),
                Value::Object(map) => Value::from(map.len()),
            };
            Ok(vec![len])
        }
        "keys" => match input {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                Ok(vec![Value::Array(
                    keys.into_iter().map(|k| Value::String(k.clone())).collect(),
                )])
            }
            Value::Array(items) => Ok(vec![Value::Array(
                (0..items.len()).map(Value::from).collect(),
            )]),
            other => Err(QueryError::Runtime(format!(
                "{} has no keys",
                type_name(other)
            ))),
        },
        "values" => Ok(if input.is_null() {
            Vec::new()
        } else {
            vec![input.clone()]
        }),
        "first" => Ok(vec![index_value(input, &Value::from(0))?]),
        "last" => Ok(vec![index_value(input, &Value::from(-1))?]),
        "not" => Ok(vec![Value::Bool(!is_truthy(input))]),
        "type" => Ok(vec![Value::String(type_name(input).to_string())]),
        "tostring" => Ok(vec![match input {
            Value::String(_) => input.clone(),
            other => Value::String(other.to_string()),
        }]),
        "tonumber" => match input {
            Value::Number(_) => Ok(vec![input.clone()]),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(|n| vec![number_value(n)])
                .map_err(|_| QueryError::Runtime(format!("Cannot parse '{}' as number", s))),
            other => Err(QueryError::Runtime(format!(
                "{} cannot be parsed as a number",
                type_name(other)
            ))),
        },
        "select" => {
            let mut out = Vec::new();
            for cond in eval(&args[0], input)? {
                if is_truthy(&cond) {
                    out.push(input.clone());
                }
            }
            Ok(out)
        }
        "map" => {
            let items: Vec<Value> = match input {
                Value::Array(items) => items.clone(),
                Value::Object(map) => map.values().cloned().collect(),
                other => {
                    return Err(QueryError::Runtime(format!(
                        "Cannot iterate over {}",
                        type_name(other)
                    )))
                }
            };
            let mut mapped = Vec::new();
            for item in &items {
                mapped.extend(eval(&args[0], item)?);
            }
            Ok(vec![Value::Array(mapped)])
        }
        "has" => {
            let mut out = Vec::new();
            for key in eval(&args[0], input)? {
                let found = match (input, &key) {
                    (Value::Object(map), Value::String(k)) => map.contains_key(k),
                    (Value::Array(items), Value::Number(n)) => {
                        let idx = n.as_f64().unwrap_or(-1.0);
                        idx >= 0.0 && (idx as usize) < items.len()
                    }
                    (target, key) => {
                        return Err(QueryError::Runtime(format!(
                            "Cannot check whether {} has a {} key",
                            type_name(target),
                            type_name(key)
                        )))
                    }
                };
                out.push(Value::Bool(found));
            }
            Ok(out)
        }
        other => Err(QueryError::Runtime(format!("未知函数: {}", other))),
    }
}

fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

/// jq 类型名称
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(false) => 1,
        Value::Bool(true) => 2,
        Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Array(_) => 5,
        Value::Object(_) => 6,
    }
}

/// 按 jq 排序规则比较两个值
///
/// null < false < true < 数字 < 字符串 < 数组 < 对象；数字按数值比较，
/// 对象先比较排序后的键集合，再逐键比较值。
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => compare_objects(x, y),
        _ => Ordering::Equal,
    }
}

fn compare_objects(x: &Map<String, Value>, y: &Map<String, Value>) -> Ordering {
    let mut x_keys: Vec<&String> = x.keys().collect();
    let mut y_keys: Vec<&String> = y.keys().collect();
    x_keys.sort();
    y_keys.sort();

    let keys_ord = x_keys.cmp(&y_keys);
    if keys_ord != Ordering::Equal {
        return keys_ord;
    }

    for key in x_keys {
        let ord = compare_values(&x[key], &y[key]);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// 结构相等 (数字按数值比较，1 与 1.0 相等)
pub fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Ordering::Equal
}
