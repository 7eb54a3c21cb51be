//! Pattern query language
//!
//! A small Cypher-like subset evaluated on top of any `Transaction`:
//!
//! ```text
//! MATCH (a:Person {name: $name})-[r:KNOWS]->(b) WHERE b.age = 42 RETURN a, id(b), r.since LIMIT 10
//! CREATE (n:Person:Admin {name: 'Alice'}) RETURN n
//! ```
//!
//! Parse and evaluation errors are `Error::Query` (400).

use std::collections::HashMap;
use std::fmt;

use tracing::debug;

use crate::error::{Error, Result};
use crate::graph::{QueryResult, Transaction};
use crate::value::{Map, Node, Properties, Value};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Int(i64),
    Float(f64),
    Param(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Colon,
    Comma,
    Dot,
    Eq,
    NotEq,
    Dash,
    Arrow,
}

fn query_error(message: impl Into<String>) -> Error {
    Error::Query(message.into())
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((start, ch)) = chars.next() {
        let token = match ch {
            c if c.is_whitespace() => continue,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            ':' => Token::Colon,
            ',' => Token::Comma,
            '.' => Token::Dot,
            '=' => Token::Eq,
            '<' if chars.peek().map(|(_, c)| *c) == Some('>') => {
                chars.next();
                Token::NotEq
            }
            '-' if chars.peek().map(|(_, c)| *c) == Some('>') => {
                chars.next();
                Token::Arrow
            }
            '-' => Token::Dash,
            '\'' | '"' => {
                let mut s = String::new();
                let mut closed = false;
                while let Some((_, c)) = chars.next() {
                    match c {
                        '\\' => {
                            if let Some((_, escaped)) = chars.next() {
                                s.push(match escaped {
                                    'n' => '\n',
                                    't' => '\t',
                                    other => other,
                                });
                            }
                        }
                        c if c == ch => {
                            closed = true;
                            break;
                        }
                        c => s.push(c),
                    }
                }
                if !closed {
                    return Err(query_error("Unterminated string literal"));
                }
                Token::Str(s)
            }
            '$' => {
                let mut name = String::new();
                while let Some((_, c)) = chars.peek().copied() {
                    if c.is_alphanumeric() || c == '_' {
                        name.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if name.is_empty() {
                    return Err(query_error(format!("Empty parameter name at offset {}", start)));
                }
                Token::Param(name)
            }
            '`' => {
                let mut name = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == '`' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }
                if !closed {
                    return Err(query_error("Unterminated quoted identifier"));
                }
                Token::Ident(name)
            }
            c if c.is_ascii_digit() => {
                let mut end = start + c.len_utf8();
                let mut is_float = false;
                while let Some((i, c)) = chars.peek().copied() {
                    if c.is_ascii_digit() || (c == '.' && !is_float) {
                        is_float |= c == '.';
                        end = i + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                let literal = &text[start..end];
                if is_float {
                    Token::Float(literal.parse().map_err(|_| query_error(format!("Bad number {}", literal)))?)
                } else {
                    Token::Int(literal.parse().map_err(|_| query_error(format!("Bad number {}", literal)))?)
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut end = start + c.len_utf8();
                while let Some((i, c)) = chars.peek().copied() {
                    if c.is_alphanumeric() || c == '_' {
                        end = i + c.len_utf8();
                        chars.next();
                    } else {
                        break;
                    }
                }
                Token::Ident(text[start..end].to_string())
            }
            other => return Err(query_error(format!("Unexpected character {:?} at offset {}", other, start))),
        };
        tokens.push(token);
    }
    Ok(tokens)
}

// ============================================================================
// Syntax tree
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Param(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
struct NodePattern {
    var: Option<String>,
    labels: Vec<String>,
    properties: Vec<(String, Expr)>,
}

#[derive(Debug, Clone, PartialEq)]
struct RelPattern {
    var: Option<String>,
    rel_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum Item {
    Var(String),
    Property(String, String),
    Id(String),
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Var(var) => f.write_str(var),
            Item::Property(var, key) => write!(f, "{}.{}", var, key),
            Item::Id(var) => write!(f, "id({})", var),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Condition {
    item: Item,
    negated: bool,
    expected: Expr,
}

#[derive(Debug, Clone, PartialEq)]
enum Statement {
    Match {
        start: NodePattern,
        hop: Option<(RelPattern, NodePattern)>,
        conditions: Vec<Condition>,
        items: Vec<Item>,
        limit: Option<usize>,
    },
    Create {
        node: NodePattern,
        items: Vec<Item>,
    },
}

// ============================================================================
// Parser
// ============================================================================

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        match self.next() {
            Some(t) if t == token => Ok(()),
            Some(t) => Err(query_error(format!("Expected {:?}, found {:?}", token, t))),
            None => Err(query_error(format!("Expected {:?}, found end of query", token))),
        }
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword))
    }

    fn keyword(&mut self, keyword: &str) -> Result<()> {
        if self.at_keyword(keyword) {
            self.pos += 1;
            Ok(())
        } else {
            Err(query_error(format!("Expected {}, found {:?}", keyword, self.peek())))
        }
    }

    fn ident(&mut self) -> Result<String> {
        match self.next() {
            Some(Token::Ident(name)) => Ok(name),
            other => Err(query_error(format!("Expected a name, found {:?}", other))),
        }
    }

    fn statement(&mut self) -> Result<Statement> {
        let statement = if self.at_keyword("MATCH") {
            self.pos += 1;
            self.match_clause()?
        } else if self.at_keyword("CREATE") {
            self.pos += 1;
            let node = self.node_pattern()?;
            let items = if self.at_keyword("RETURN") {
                self.pos += 1;
                self.items()?
            } else {
                Vec::new()
            };
            Statement::Create { node, items }
        } else {
            return Err(query_error("Query must start with MATCH or CREATE"));
        };

        match self.peek() {
            None => Ok(statement),
            Some(token) => Err(query_error(format!("Unexpected {:?} after end of query", token))),
        }
    }

    fn match_clause(&mut self) -> Result<Statement> {
        let start = self.node_pattern()?;
        let hop = if self.eat(&Token::Dash) {
            self.expect(Token::LBracket)?;
            let var = match self.peek() {
                Some(Token::Ident(_)) => Some(self.ident()?),
                _ => None,
            };
            let rel_type = if self.eat(&Token::Colon) { Some(self.ident()?) } else { None };
            self.expect(Token::RBracket)?;
            self.expect(Token::Arrow)?;
            Some((RelPattern { var, rel_type }, self.node_pattern()?))
        } else {
            None
        };

        let mut conditions = Vec::new();
        if self.at_keyword("WHERE") {
            self.pos += 1;
            loop {
                let item = self.item()?;
                let negated = match self.next() {
                    Some(Token::Eq) => false,
                    Some(Token::NotEq) => true,
                    other => return Err(query_error(format!("Expected = or <>, found {:?}", other))),
                };
                conditions.push(Condition { item, negated, expected: self.expr()? });
                if !self.at_keyword("AND") {
                    break;
                }
                self.pos += 1;
            }
        }

        self.keyword("RETURN")?;
        let items = self.items()?;

        let limit = if self.at_keyword("LIMIT") {
            self.pos += 1;
            match self.next() {
                Some(Token::Int(n)) if n >= 0 => Some(n as usize),
                other => return Err(query_error(format!("LIMIT needs a non-negative integer, found {:?}", other))),
            }
        } else {
            None
        };

        Ok(Statement::Match { start, hop, conditions, items, limit })
    }

    fn node_pattern(&mut self) -> Result<NodePattern> {
        self.expect(Token::LParen)?;
        let mut pattern = NodePattern::default();
        if let Some(Token::Ident(_)) = self.peek() {
            pattern.var = Some(self.ident()?);
        }
        while self.eat(&Token::Colon) {
            pattern.labels.push(self.ident()?);
        }
        if self.eat(&Token::LBrace) {
            if !self.eat(&Token::RBrace) {
                loop {
                    let key = self.ident()?;
                    self.expect(Token::Colon)?;
                    pattern.properties.push((key, self.expr()?));
                    if self.eat(&Token::RBrace) {
                        break;
                    }
                    self.expect(Token::Comma)?;
                }
            }
        }
        self.expect(Token::RParen)?;
        Ok(pattern)
    }

    fn items(&mut self) -> Result<Vec<Item>> {
        let mut items = vec![self.item()?];
        while self.eat(&Token::Comma) {
            items.push(self.item()?);
        }
        Ok(items)
    }

    fn item(&mut self) -> Result<Item> {
        let name = self.ident()?;
        if name.eq_ignore_ascii_case("id") && self.eat(&Token::LParen) {
            let var = self.ident()?;
            self.expect(Token::RParen)?;
            return Ok(Item::Id(var));
        }
        if self.eat(&Token::Dot) {
            return Ok(Item::Property(name, self.ident()?));
        }
        Ok(Item::Var(name))
    }

    fn expr(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Param(name)) => Ok(Expr::Param(name)),
            Some(_) => {
                self.pos -= 1;
                self.literal().map(Expr::Literal)
            }
            None => Err(query_error("Expected a value, found end of query")),
        }
    }

    fn literal(&mut self) -> Result<Value> {
        match self.next() {
            Some(Token::Str(s)) => Ok(Value::String(s)),
            Some(Token::Int(i)) => Ok(Value::Int(i)),
            Some(Token::Float(f)) => Ok(Value::Float(f)),
            Some(Token::Dash) => match self.next() {
                Some(Token::Int(i)) => Ok(Value::Int(-i)),
                Some(Token::Float(f)) => Ok(Value::Float(-f)),
                other => Err(query_error(format!("Expected a number after '-', found {:?}", other))),
            },
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("true") => Ok(Value::Bool(true)),
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("false") => Ok(Value::Bool(false)),
            Some(Token::Ident(word)) if word.eq_ignore_ascii_case("null") => Ok(Value::Null),
            Some(Token::LBracket) => {
                let mut items = Vec::new();
                if !self.eat(&Token::RBracket) {
                    loop {
                        items.push(self.literal()?);
                        if self.eat(&Token::RBracket) {
                            break;
                        }
                        self.expect(Token::Comma)?;
                    }
                }
                Ok(Value::List(items))
            }
            other => Err(query_error(format!("Expected a value, found {:?}", other))),
        }
    }
}

fn parse(text: &str) -> Result<Statement> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(query_error("Empty query"));
    }
    Parser { tokens, pos: 0 }.statement()
}

// ============================================================================
// Evaluation
// ============================================================================

type Binding = HashMap<String, Value>;

fn resolve(expr: &Expr, params: &Map) -> Result<Value> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Param(name) => params
            .get(name)
            .cloned()
            .ok_or_else(|| query_error(format!("Missing parameter ${}", name))),
    }
}

fn resolve_properties(pattern: &NodePattern, params: &Map) -> Result<Properties> {
    pattern
        .properties
        .iter()
        .map(|(key, expr)| resolve(expr, params).map(|v| (key.clone(), v)))
        .collect()
}

fn node_matches(node: &Node, pattern: &NodePattern, properties: &Properties) -> bool {
    pattern.labels.iter().all(|l| node.labels.contains(l))
        && properties.iter().all(|(k, v)| node.properties.get(k) == Some(v))
}

fn bind(binding: &mut Binding, var: &Option<String>, value: Value) {
    if let Some(var) = var {
        binding.insert(var.clone(), value);
    }
}

fn evaluate(item: &Item, binding: &Binding) -> Result<Value> {
    let var = match item {
        Item::Var(var) | Item::Property(var, _) | Item::Id(var) => var,
    };
    let value = binding
        .get(var)
        .ok_or_else(|| query_error(format!("Variable {} is not defined", var)))?;
    Ok(match (item, value) {
        (Item::Var(_), value) => value.clone(),
        (Item::Property(_, key), Value::Node(node)) => node.properties.get(key).cloned().unwrap_or(Value::Null),
        (Item::Property(_, key), Value::Rel(rel)) => rel.properties.get(key).cloned().unwrap_or(Value::Null),
        (Item::Id(_), Value::Node(node)) => Value::Int(node.id as i64),
        (Item::Id(_), Value::Rel(rel)) => Value::Int(rel.id as i64),
        _ => Value::Null,
    })
}

fn project(items: &[Item], bindings: &[Binding]) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
    let columns = items.iter().map(Item::to_string).collect();
    let rows = bindings
        .iter()
        .map(|binding| items.iter().map(|item| evaluate(item, binding)).collect::<Result<Vec<_>>>())
        .collect::<Result<_>>()?;
    Ok((columns, rows))
}

fn stats(nodes_created: usize) -> Map {
    let mut stats = Map::new();
    stats.insert("nodes_created".into(), Value::Int(nodes_created as i64));
    stats
}

/// Parse and evaluate one query inside `tx`
pub fn run(tx: &mut dyn Transaction, text: &str, params: &Map) -> Result<QueryResult> {
    let statement = parse(text)?;
    debug!(query = text, "Running query");

    match statement {
        Statement::Create { node, items } => {
            let properties = resolve_properties(&node, params)?;
            let created = tx.create_node(&node.labels, &properties)?;
            let mut binding = Binding::new();
            bind(&mut binding, &node.var, Value::Node(created));
            let (columns, rows) = if items.is_empty() {
                (Vec::new(), Vec::new())
            } else {
                project(&items, &[binding])?
            };
            Ok(QueryResult { columns, rows, stats: stats(1) })
        }
        Statement::Match { start, hop, conditions, items, limit } => {
            let anchor = start
                .labels
                .first()
                .ok_or_else(|| query_error("MATCH needs a label on its first node"))?;
            let start_properties = resolve_properties(&start, params)?;

            let mut bindings = Vec::new();
            for a in tx.match_nodes(anchor, None, None)? {
                if !node_matches(&a, &start, &start_properties) {
                    continue;
                }
                let mut binding = Binding::new();
                let a_id = a.id;
                bind(&mut binding, &start.var, Value::Node(a));

                match &hop {
                    None => bindings.push(binding),
                    Some((rel_pattern, end)) => {
                        let end_properties = resolve_properties(end, params)?;
                        for rel in tx.match_relationships(Some(a_id), None, rel_pattern.rel_type.as_deref())? {
                            let b = tx.get_node(rel.end)?;
                            if !node_matches(&b, end, &end_properties) {
                                continue;
                            }
                            let mut row = binding.clone();
                            bind(&mut row, &rel_pattern.var, Value::Rel(rel));
                            bind(&mut row, &end.var, Value::Node(b));
                            bindings.push(row);
                        }
                    }
                }
            }

            let mut selected = Vec::new();
            for binding in bindings {
                if limit.map_or(false, |n| selected.len() >= n) {
                    break;
                }
                let mut keep = true;
                for condition in &conditions {
                    let actual = evaluate(&condition.item, &binding)?;
                    let expected = resolve(&condition.expected, params)?;
                    if (actual == expected) == condition.negated {
                        keep = false;
                        break;
                    }
                }
                if keep {
                    selected.push(binding);
                }
            }

            let (columns, rows) = project(&items, &selected)?;
            Ok(QueryResult { columns, rows, stats: stats(0) })
        }
    }
}
