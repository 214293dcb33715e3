//! Line-oriented call scripts evaluated against a [`ScriptContext`].
//!
//! One statement per line:
//!
//! ```text
//! # comment
//! [let NAME =] [await] [new] PATH(ARGS)
//! ```
//!
//! `PATH` is dotted and rooted at a local binding or a global. `ARGS` are JSON
//! values separated by commas; objects and arrays are passed as their JSON
//! text, and `$NAME` refers to a local binding.

use anyhow::{Context as _, Result, anyhow, bail};
use js::{JSValue, ScriptContext};
use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::mem;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Delay between two `poll()` calls while awaiting.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A call argument before evaluation.
#[derive(Clone, Debug, PartialEq)]
pub enum Arg {
    /// Literal value parsed from JSON.
    Literal(Literal),
    /// `$name` reference to a local binding.
    Local(String),
}

/// JSON literal restricted to what maps onto a `JSValue`.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
}

impl Literal {
    fn to_value(&self) -> JSValue {
        match self {
            Self::Null => JSValue::Null,
            Self::Boolean(value) => JSValue::Boolean(*value),
            Self::Number(value) => JSValue::Number(*value),
            Self::String(value) => JSValue::String(value.clone()),
        }
    }
}

/// One parsed line.
#[derive(Clone, Debug, PartialEq)]
pub struct Statement {
    /// 1-based source line.
    pub line: usize,
    /// `let NAME =` target.
    pub binding: Option<String>,
    /// Poll the result until it settles.
    pub awaited: bool,
    /// Invoke with `new`.
    pub construct: bool,
    /// Dotted callee path.
    pub callee: String,
    /// Call arguments.
    pub args: Vec<Arg>,
}

/// Parse a whole script.
///
/// # Errors
/// The first malformed line, with its line number.
pub fn parse_script(source: &str) -> Result<Vec<Statement>> {
    let mut statements = Vec::new();
    for (index, raw) in source.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with("//") {
            continue;
        }
        let statement = parse_statement(index + 1, line)
            .with_context(|| format!("line {}: {line}", index + 1))?;
        statements.push(statement);
    }
    Ok(statements)
}

fn parse_statement(line_no: usize, line: &str) -> Result<Statement> {
    let mut rest = line.strip_suffix(';').unwrap_or(line).trim();

    let binding = match rest.strip_prefix("let ") {
        Some(after) => {
            let (name, value) = after
                .split_once('=')
                .ok_or_else(|| anyhow!("expected `=` after let binding"))?;
            let name = name.trim();
            if !is_identifier(name) {
                bail!("invalid binding name {name:?}");
            }
            rest = value.trim();
            Some(name.to_owned())
        }
        None => None,
    };

    let awaited = strip_keyword(&mut rest, "await");
    let construct = strip_keyword(&mut rest, "new");

    let open = rest.find('(').ok_or_else(|| anyhow!("expected a call"))?;
    let inner = rest[open + 1..]
        .strip_suffix(')')
        .ok_or_else(|| anyhow!("expected `)` at end of call"))?;
    let callee = rest[..open].trim();
    if callee.is_empty() || !callee.split('.').all(is_identifier) {
        bail!("invalid callee {callee:?}");
    }

    let args = split_args(inner)?
        .iter()
        .map(|token| parse_arg(token))
        .collect::<Result<Vec<_>>>()?;

    Ok(Statement {
        line: line_no,
        binding,
        awaited,
        construct,
        callee: callee.to_owned(),
        args,
    })
}

fn strip_keyword(rest: &mut &str, keyword: &str) -> bool {
    match rest.strip_prefix(keyword) {
        Some(after) if after.starts_with(char::is_whitespace) => {
            *rest = after.trim_start();
            true
        }
        _ => false,
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_' || first == '$')
        && chars.all(|rest| rest.is_ascii_alphanumeric() || rest == '_' || rest == '$')
}

/// Split on top-level commas, leaving strings and nested JSON intact.
fn split_args(inner: &str) -> Result<Vec<String>> {
    if inner.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0_usize;
    let mut in_string = false;
    let mut escaped = false;
    for character in inner.chars() {
        if in_string {
            current.push(character);
            if escaped {
                escaped = false;
            } else if character == '\\' {
                escaped = true;
            } else if character == '"' {
                in_string = false;
            }
            continue;
        }
        match character {
            '"' => {
                in_string = true;
                current.push(character);
            }
            '[' | '{' => {
                depth += 1;
                current.push(character);
            }
            ']' | '}' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| anyhow!("unbalanced `{character}`"))?;
                current.push(character);
            }
            ',' if depth == 0 => tokens.push(mem::take(&mut current)),
            _ => current.push(character),
        }
    }
    if in_string || depth != 0 {
        bail!("unterminated argument list");
    }
    tokens.push(current);
    tokens
        .into_iter()
        .map(|token| {
            let token = token.trim().to_owned();
            if token.is_empty() {
                Err(anyhow!("empty argument"))
            } else {
                Ok(token)
            }
        })
        .collect()
}

fn parse_arg(token: &str) -> Result<Arg> {
    if let Some(name) = token.strip_prefix('$') {
        if !is_identifier(name) {
            bail!("invalid local reference {token:?}");
        }
        return Ok(Arg::Local(name.to_owned()));
    }
    let value: Value =
        serde_json::from_str(token).with_context(|| format!("argument {token:?} is not JSON"))?;
    Ok(Arg::Literal(match value {
        Value::Null => Literal::Null,
        Value::Bool(flag) => Literal::Boolean(flag),
        Value::Number(number) => Literal::Number(number.as_f64().unwrap_or(f64::NAN)),
        Value::String(text) => Literal::String(text),
        nested @ (Value::Array(_) | Value::Object(_)) => Literal::String(nested.to_string()),
    }))
}

/// Evaluates statements against one context, keeping `let` bindings local to
/// the script.
pub struct Interpreter<'ctx> {
    context: &'ctx ScriptContext,
    locals: HashMap<String, JSValue>,
    await_timeout: Duration,
}

impl<'ctx> Interpreter<'ctx> {
    /// Create an interpreter with no local bindings.
    pub fn new(context: &'ctx ScriptContext, await_timeout: Duration) -> Self {
        Self {
            context,
            locals: HashMap::new(),
            await_timeout,
        }
    }

    /// Look up a local binding.
    pub fn local(&self, name: &str) -> Option<&JSValue> {
        self.locals.get(name)
    }

    /// Run statements in order, stopping at the first uncaught error.
    ///
    /// # Errors
    /// The failing statement's error, tagged with its line.
    pub async fn run(&mut self, statements: &[Statement]) -> Result<()> {
        for statement in statements {
            self.execute(statement)
                .await
                .with_context(|| format!("line {}: {}", statement.line, statement.callee))?;
        }
        Ok(())
    }

    /// Evaluate one statement and return its value.
    ///
    /// # Errors
    /// Unknown callee or local, a thrown host error, or an await timeout.
    pub async fn execute(&mut self, statement: &Statement) -> Result<JSValue> {
        let callee = self.resolve(&statement.callee)?;
        let args = statement
            .args
            .iter()
            .map(|arg| match arg {
                Arg::Literal(literal) => Ok(literal.to_value()),
                Arg::Local(name) => self
                    .locals
                    .get(name)
                    .cloned()
                    .ok_or_else(|| anyhow!("${name} is not bound")),
            })
            .collect::<Result<Vec<_>>>()?;

        let mut value = if statement.construct {
            self.context.construct_value(&callee, args)?
        } else {
            self.context.call_value(&callee, args)?
        };
        if statement.awaited {
            value = self.settle(value).await?;
        }
        if let Some(name) = &statement.binding {
            self.locals.insert(name.clone(), value.clone());
        }
        Ok(value)
    }

    fn resolve(&self, path: &str) -> Result<JSValue> {
        let (root, rest) = path.split_once('.').unwrap_or((path, ""));
        let Some(local) = self.locals.get(root) else {
            return self
                .context
                .globals()
                .resolve(path)
                .ok_or_else(|| anyhow!("{path} is not defined"));
        };
        let mut value = local.clone();
        for segment in rest.split('.').filter(|segment| !segment.is_empty()) {
            value = value
                .as_object()
                .and_then(|object| object.get(segment))
                .ok_or_else(|| anyhow!("{path} is not defined"))?;
        }
        Ok(value)
    }

    /// Poll a pending handle until it yields a value. Anything without a
    /// `poll()` method is already settled.
    async fn settle(&self, value: JSValue) -> Result<JSValue> {
        let Some(pending) = value
            .as_object()
            .filter(|object| object.functions.contains_key("poll"))
            .cloned()
        else {
            return Ok(value);
        };
        let deadline = Instant::now() + self.await_timeout;
        loop {
            match pending.call_method(self.context.host(), "poll", Vec::new())? {
                JSValue::Null => {
                    if Instant::now() >= deadline {
                        bail!("await timed out after {:?}", self.await_timeout);
                    }
                    sleep(POLL_INTERVAL).await;
                }
                settled => {
                    debug!("script: {} settled", pending.class_name);
                    return Ok(settled);
                }
            }
        }
    }
}
