//! The sandboxed query engine, the one capability exposed to the planner.
//!
//! Queries are a small pipeline language, parsed and resolved against the
//! dataset's actual columns before anything executes:
//!
//! ```text
//! query    := stage ('|' stage)* ['|' terminal] | terminal
//! stage    := 'filter' COLUMN CMP literal
//!           | 'select' COLUMN (',' COLUMN)*
//!           | 'head' NUMBER
//! terminal := scalar-expr
//!           | 'group' COLUMN ':' scalar-expr
//! scalar   := term (('+'|'-'|'*'|'/') term)*
//! term     := ('sum'|'avg'|'min'|'max') '(' COLUMN ')' | 'count' '(' ')'
//!           | NUMBER | '-' term | '(' scalar ')'
//! CMP      := == | != | > | >= | < | <=
//! ```
//!
//! Examples:
//!
//! ```text
//! filter Account == "Revenue" | filter Month == Jan | sum(Actuals) - sum(Plan)
//! filter Account == COGS | group Month : sum(Actuals)
//! filter Plan > 50 | select Account, Month | head 10
//! count()
//! ```
//!
//! Evaluation touches nothing but the borrowed [`Dataset`]: there is no
//! filesystem, network, or ambient process capability anywhere in this
//! module, so planner-generated queries cannot reach outside the table.
//! Every failure is a short [`QueryError`] meant to be fed back to the
//! planner as an observation, never a call failure.

use crate::dataset::{Dataset, Value};
use serde::Serialize;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Outcome & error
// ---------------------------------------------------------------------------

/// The literal result of an executed query, tagged for the tool boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryOutcome {
    Scalar {
        value: f64,
    },
    Series {
        points: Vec<SeriesPoint>,
    },
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<Value>>,
        truncated: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub key: String,
    pub value: f64,
}

impl QueryOutcome {
    /// Compact text rendering fed to the planner as the observation.
    pub fn render(&self) -> String {
        match self {
            QueryOutcome::Scalar { value } => format_num(*value),
            QueryOutcome::Series { points } => points
                .iter()
                .map(|p| format!("{}: {}", p.key, format_num(p.value)))
                .collect::<Vec<_>>()
                .join("\n"),
            QueryOutcome::Table {
                columns,
                rows,
                truncated,
            } => {
                let mut out = columns.join(" | ");
                for row in rows {
                    out.push('\n');
                    out.push_str(
                        &row.iter()
                            .map(|v| v.to_string())
                            .collect::<Vec<_>>()
                            .join(" | "),
                    );
                }
                if *truncated {
                    out.push_str(&format!("\n… ({} rows shown, more exist)", rows.len()));
                }
                if rows.is_empty() {
                    out.push_str("\n(no rows)");
                }
                out
            }
        }
    }
}

fn format_num(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("parse error: {0}")]
    Parse(String),

    #[error("unknown column '{name}' (available: {available})")]
    UnknownColumn { name: String, available: String },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("{agg} over zero rows has no value")]
    EmptyAggregate { agg: String },
}

type QResult<T> = std::result::Result<T, QueryError>;

// ---------------------------------------------------------------------------
// Plan representation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cmp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Number(f64),
    Text(String),
}

#[derive(Debug)]
enum Stage {
    Filter { col: usize, cmp: Cmp, lit: Literal },
    Select(Vec<usize>),
    Head(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AggFunc {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

impl AggFunc {
    fn name(&self) -> &'static str {
        match self {
            AggFunc::Sum => "sum",
            AggFunc::Avg => "avg",
            AggFunc::Min => "min",
            AggFunc::Max => "max",
            AggFunc::Count => "count",
        }
    }
}

#[derive(Debug)]
enum Expr {
    Number(f64),
    Agg { func: AggFunc, col: Option<usize> },
    Neg(Box<Expr>),
    Binary { op: char, lhs: Box<Expr>, rhs: Box<Expr> },
}

#[derive(Debug)]
enum Terminal {
    Scalar(Expr),
    Group { key: usize, expr: Expr },
}

struct Plan {
    stages: Vec<Stage>,
    terminal: Option<Terminal>,
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    Cmp(Cmp),
    Pipe,
    Comma,
    Colon,
    LParen,
    RParen,
    Op(char),
}

fn tokenize(input: &str) -> QResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
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
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '+' | '-' | '*' | '/' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            '=' | '!' | '>' | '<' => {
                let next_eq = chars.get(i + 1) == Some(&'=');
                let cmp = match (c, next_eq) {
                    ('=', true) => Cmp::Eq,
                    ('!', true) => Cmp::Ne,
                    ('>', true) => Cmp::Ge,
                    ('<', true) => Cmp::Le,
                    ('>', false) => Cmp::Gt,
                    ('<', false) => Cmp::Lt,
                    _ => return Err(QueryError::Parse(format!("unexpected '{c}'"))),
                };
                tokens.push(Token::Cmp(cmp));
                i += if next_eq { 2 } else { 1 };
            }
            '"' | '\'' => {
                let quote = c;
                let start = i + 1;
                let mut j = start;
                while j < chars.len() && chars[j] != quote {
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(QueryError::Parse("unterminated string literal".to_string()));
                }
                tokens.push(Token::Str(chars[start..j].iter().collect()));
                i = j + 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let n = text
                    .parse::<f64>()
                    .map_err(|_| QueryError::Parse(format!("bad number '{text}'")))?;
                tokens.push(Token::Number(n));
            }
            c if c.is_alphanumeric() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            other => return Err(QueryError::Parse(format!("unexpected character '{other}'"))),
        }
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser: resolves column names against the dataset as it goes
// ---------------------------------------------------------------------------

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    dataset: &'a Dataset,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, want: &Token, what: &str) -> QResult<()> {
        match self.next() {
            Some(ref t) if t == want => Ok(()),
            other => Err(QueryError::Parse(format!(
                "expected {what}, got {}",
                describe(other.as_ref())
            ))),
        }
    }

    fn resolve_column(&self, name: &str) -> QResult<usize> {
        self.dataset
            .column_index(name)
            .ok_or_else(|| QueryError::UnknownColumn {
                name: name.to_string(),
                available: self.dataset.columns.join(", "),
            })
    }

    fn column_name(&mut self, what: &str) -> QResult<usize> {
        match self.next() {
            Some(Token::Ident(name)) => self.resolve_column(&name),
            Some(Token::Str(name)) => self.resolve_column(&name),
            other => Err(QueryError::Parse(format!(
                "expected {what}, got {}",
                describe(other.as_ref())
            ))),
        }
    }

    fn parse_plan(&mut self) -> QResult<Plan> {
        let mut stages = Vec::new();
        let mut terminal = None;
        loop {
            match self.peek() {
                Some(Token::Ident(kw)) if kw == "filter" => {
                    self.pos += 1;
                    stages.push(self.parse_filter()?);
                }
                Some(Token::Ident(kw)) if kw == "select" => {
                    self.pos += 1;
                    stages.push(self.parse_select()?);
                }
                Some(Token::Ident(kw)) if kw == "head" => {
                    self.pos += 1;
                    match self.next() {
                        Some(Token::Number(n)) if n >= 0.0 => {
                            stages.push(Stage::Head(n as usize));
                        }
                        other => {
                            return Err(QueryError::Parse(format!(
                                "head needs a row count, got {}",
                                describe(other.as_ref())
                            )))
                        }
                    }
                }
                Some(Token::Ident(kw)) if kw == "group" => {
                    self.pos += 1;
                    let key = self.column_name("a column to group by")?;
                    self.expect(&Token::Colon, "':' after the group column")?;
                    let expr = self.parse_expr()?;
                    terminal = Some(Terminal::Group { key, expr });
                }
                Some(_) => {
                    let expr = self.parse_expr()?;
                    terminal = Some(Terminal::Scalar(expr));
                }
                None => {
                    return Err(QueryError::Parse("empty query".to_string()));
                }
            }
            match self.next() {
                Some(Token::Pipe) => {
                    if terminal.is_some() {
                        return Err(QueryError::Parse(
                            "aggregates and group must be the last stage".to_string(),
                        ));
                    }
                }
                Some(t) => {
                    return Err(QueryError::Parse(format!(
                        "expected '|' or end of query, got {}",
                        describe(Some(&t))
                    )))
                }
                None => break,
            }
        }
        Ok(Plan { stages, terminal })
    }

    fn parse_filter(&mut self) -> QResult<Stage> {
        let col = self.column_name("a column to filter on")?;
        let cmp = match self.next() {
            Some(Token::Cmp(c)) => c,
            other => {
                return Err(QueryError::Parse(format!(
                    "expected a comparison (==, !=, >, >=, <, <=), got {}",
                    describe(other.as_ref())
                )))
            }
        };
        let lit = match self.next() {
            Some(Token::Number(n)) => Literal::Number(n),
            Some(Token::Op('-')) => match self.next() {
                Some(Token::Number(n)) => Literal::Number(-n),
                other => {
                    return Err(QueryError::Parse(format!(
                        "expected a number after '-', got {}",
                        describe(other.as_ref())
                    )))
                }
            },
            Some(Token::Str(s)) => Literal::Text(s),
            Some(Token::Ident(s)) => Literal::Text(s),
            other => {
                return Err(QueryError::Parse(format!(
                    "expected a literal to compare against, got {}",
                    describe(other.as_ref())
                )))
            }
        };
        Ok(Stage::Filter { col, cmp, lit })
    }

    fn parse_select(&mut self) -> QResult<Stage> {
        let mut cols = vec![self.column_name("a column to select")?];
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            cols.push(self.column_name("a column to select")?);
        }
        Ok(Stage::Select(cols))
    }

    fn parse_expr(&mut self) -> QResult<Expr> {
        let mut lhs = self.parse_mul()?;
        while let Some(Token::Op(op @ ('+' | '-'))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let rhs = self.parse_mul()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> QResult<Expr> {
        let mut lhs = self.parse_term()?;
        while let Some(Token::Op(op @ ('*' | '/'))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let rhs = self.parse_term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn parse_term(&mut self) -> QResult<Expr> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Op('-')) => Ok(Expr::Neg(Box::new(self.parse_term()?))),
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => {
                let func = match name.as_str() {
                    "sum" => AggFunc::Sum,
                    "avg" => AggFunc::Avg,
                    "min" => AggFunc::Min,
                    "max" => AggFunc::Max,
                    "count" => AggFunc::Count,
                    other => {
                        return Err(QueryError::Parse(format!(
                            "unknown function '{other}' (expected sum, avg, min, max, or count)"
                        )))
                    }
                };
                self.expect(&Token::LParen, "'(' after aggregate name")?;
                let col = if self.peek() == Some(&Token::RParen) {
                    None
                } else {
                    Some(self.column_name("a column to aggregate")?)
                };
                self.expect(&Token::RParen, "')'")?;
                if func != AggFunc::Count && col.is_none() {
                    return Err(QueryError::Parse(format!(
                        "{}() needs a column argument",
                        func.name()
                    )));
                }
                Ok(Expr::Agg { func, col })
            }
            other => Err(QueryError::Parse(format!(
                "expected a number, aggregate, or '(', got {}",
                describe(other.as_ref())
            ))),
        }
    }
}

fn describe(token: Option<&Token>) -> String {
    match token {
        None => "end of query".to_string(),
        Some(Token::Ident(s)) => format!("'{s}'"),
        Some(Token::Number(n)) => format!("'{n}'"),
        Some(Token::Str(s)) => format!("\"{s}\""),
        Some(Token::Cmp(_)) => "a comparison".to_string(),
        Some(Token::Pipe) => "'|'".to_string(),
        Some(Token::Comma) => "','".to_string(),
        Some(Token::Colon) => "':'".to_string(),
        Some(Token::LParen) => "'('".to_string(),
        Some(Token::RParen) => "')'".to_string(),
        Some(Token::Op(c)) => format!("'{c}'"),
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Default cap on rows in a table outcome, so observations stay small.
pub const DEFAULT_TABLE_CAP: usize = 50;

/// Parse, validate, and execute one query against the dataset.
pub fn execute(dataset: &Dataset, input: &str) -> QResult<QueryOutcome> {
    execute_capped(dataset, input, DEFAULT_TABLE_CAP)
}

pub fn execute_capped(dataset: &Dataset, input: &str, table_cap: usize) -> QResult<QueryOutcome> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        dataset,
    };
    let plan = parser.parse_plan()?;

    let mut rows: Vec<usize> = (0..dataset.rows.len()).collect();
    let mut selected: Option<Vec<usize>> = None;
    let mut clipped = false;

    for stage in &plan.stages {
        match stage {
            Stage::Filter { col, cmp, lit } => {
                let mut kept = Vec::with_capacity(rows.len());
                for &r in &rows {
                    if matches_filter(dataset, r, *col, *cmp, lit)? {
                        kept.push(r);
                    }
                }
                rows = kept;
            }
            Stage::Select(cols) => selected = Some(cols.clone()),
            // head applies in pipeline position: later stages and the
            // terminal see the truncated row set.
            Stage::Head(n) => {
                if rows.len() > *n {
                    clipped = true;
                }
                rows.truncate(*n);
            }
        }
    }

    match plan.terminal {
        Some(Terminal::Scalar(expr)) => {
            let value = eval_expr(dataset, &rows, &expr)?;
            Ok(QueryOutcome::Scalar { value })
        }
        Some(Terminal::Group { key, expr }) => {
            let mut keys: Vec<String> = Vec::new();
            let mut buckets: Vec<Vec<usize>> = Vec::new();
            for &r in &rows {
                let k = dataset.rows[r][key].to_string();
                match keys.iter().position(|existing| *existing == k) {
                    Some(i) => buckets[i].push(r),
                    None => {
                        keys.push(k);
                        buckets.push(vec![r]);
                    }
                }
            }
            let mut points: Vec<SeriesPoint> = keys
                .into_iter()
                .zip(buckets)
                .map(|(k, bucket)| {
                    eval_expr(dataset, &bucket, &expr).map(|value| SeriesPoint { key: k, value })
                })
                .collect::<QResult<_>>()?;
            points.sort_by_key(|p| crate::period::sort_key(&p.key));
            Ok(QueryOutcome::Series { points })
        }
        None => {
            let cols = selected.unwrap_or_else(|| (0..dataset.columns.len()).collect());
            let truncated = clipped || rows.len() > table_cap;
            let out_rows = rows
                .iter()
                .take(table_cap)
                .map(|&r| cols.iter().map(|&c| dataset.rows[r][c].clone()).collect())
                .collect();
            Ok(QueryOutcome::Table {
                columns: cols.iter().map(|&c| dataset.columns[c].clone()).collect(),
                rows: out_rows,
                truncated,
            })
        }
    }
}

fn matches_filter(
    dataset: &Dataset,
    row: usize,
    col: usize,
    cmp: Cmp,
    lit: &Literal,
) -> QResult<bool> {
    let cell = &dataset.rows[row][col];
    match cmp {
        Cmp::Eq | Cmp::Ne => {
            let equal = match (cell, lit) {
                (Value::Number(n), Literal::Number(m)) => n == m,
                (Value::Text(s), Literal::Text(t)) => s == t,
                // A numeric literal never equals a text cell and vice versa,
                // except when the text literal happens to spell the number.
                (Value::Number(n), Literal::Text(t)) => t.parse::<f64>() == Ok(*n),
                (Value::Text(_), Literal::Number(_)) => false,
            };
            Ok(if cmp == Cmp::Eq { equal } else { !equal })
        }
        Cmp::Gt | Cmp::Ge | Cmp::Lt | Cmp::Le => {
            let Literal::Number(m) = lit else {
                return Err(QueryError::TypeMismatch(format!(
                    "ordering comparison on column '{}' needs a numeric literal",
                    dataset.columns[col]
                )));
            };
            let Some(n) = cell.as_number() else {
                return Err(QueryError::TypeMismatch(format!(
                    "ordering comparison on non-numeric value '{cell}' in column '{}'",
                    dataset.columns[col]
                )));
            };
            Ok(match cmp {
                Cmp::Gt => n > *m,
                Cmp::Ge => n >= *m,
                Cmp::Lt => n < *m,
                Cmp::Le => n <= *m,
                Cmp::Eq | Cmp::Ne => unreachable!(),
            })
        }
    }
}

fn eval_expr(dataset: &Dataset, rows: &[usize], expr: &Expr) -> QResult<f64> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::Neg(inner) => Ok(-eval_expr(dataset, rows, inner)?),
        Expr::Binary { op, lhs, rhs } => {
            let l = eval_expr(dataset, rows, lhs)?;
            let r = eval_expr(dataset, rows, rhs)?;
            match op {
                '+' => Ok(l + r),
                '-' => Ok(l - r),
                '*' => Ok(l * r),
                '/' => {
                    if r == 0.0 {
                        Err(QueryError::DivisionByZero)
                    } else {
                        Ok(l / r)
                    }
                }
                _ => unreachable!(),
            }
        }
        Expr::Agg { func, col } => eval_agg(dataset, rows, *func, *col),
    }
}

fn eval_agg(dataset: &Dataset, rows: &[usize], func: AggFunc, col: Option<usize>) -> QResult<f64> {
    if func == AggFunc::Count {
        return Ok(rows.len() as f64);
    }
    // The parser rejects column-less aggregates other than count().
    let Some(col) = col else {
        return Err(QueryError::Parse(format!(
            "{}() needs a column argument",
            func.name()
        )));
    };
    let mut values = Vec::with_capacity(rows.len());
    for &r in rows {
        let cell = &dataset.rows[r][col];
        match cell.as_number() {
            Some(n) => values.push(n),
            None => {
                return Err(QueryError::TypeMismatch(format!(
                    "{}() over non-numeric value '{cell}' in column '{}'",
                    func.name(),
                    dataset.columns[col]
                )))
            }
        }
    }
    match func {
        AggFunc::Sum => Ok(values.iter().sum()),
        AggFunc::Avg => {
            if values.is_empty() {
                Err(QueryError::EmptyAggregate {
                    agg: "avg".to_string(),
                })
            } else {
                Ok(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
        AggFunc::Min => values
            .iter()
            .copied()
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.min(v))))
            .ok_or(QueryError::EmptyAggregate {
                agg: "min".to_string(),
            }),
        AggFunc::Max => values
            .iter()
            .copied()
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))))
            .ok_or(QueryError::EmptyAggregate {
                agg: "max".to_string(),
            }),
        AggFunc::Count => unreachable!(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
