// ABOUTME: Sandboxed execution for "javascript" hotkey actions via an allow-listed effect interpreter
// ABOUTME: Includes the advisory risk scan that flags sensitive browser APIs in user scripts

use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskSeverity {
    Low,
    Medium,
    High,
}

/// One sensitive API usage spotted in a script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskFinding {
    pub pattern: &'static str,
    pub severity: RiskSeverity,
    pub message: &'static str,
}

struct RiskRule {
    regex: Regex,
    pattern: &'static str,
    severity: RiskSeverity,
    message: &'static str,
}

const RISK_RULES: &[(&str, &str, RiskSeverity, &str)] = &[
    (
        r"document\s*\.\s*cookie",
        "document.cookie",
        RiskSeverity::High,
        "Reads or writes cookies, which can expose login sessions",
    ),
    (
        r"\blocalStorage\b",
        "localStorage",
        RiskSeverity::Medium,
        "Accesses saved site data",
    ),
    (
        r"\bsessionStorage\b",
        "sessionStorage",
        RiskSeverity::Medium,
        "Accesses session data",
    ),
    (
        r"\bindexedDB\b",
        "indexedDB",
        RiskSeverity::Medium,
        "Accesses the browser database",
    ),
    (
        r"\bfetch\s*\(",
        "fetch(",
        RiskSeverity::High,
        "Sends network requests, possibly to third parties",
    ),
    (
        r"\bXMLHttpRequest\b",
        "XMLHttpRequest",
        RiskSeverity::High,
        "Sends network requests, possibly to third parties",
    ),
    (
        r"\bWebSocket\b",
        "WebSocket",
        RiskSeverity::High,
        "Opens a persistent network connection",
    ),
    (
        r"\bsendBeacon\b",
        "sendBeacon",
        RiskSeverity::High,
        "Sends data in the background",
    ),
    (
        r"\beval\s*\(",
        "eval(",
        RiskSeverity::High,
        "Runs arbitrary code built at runtime",
    ),
    (
        r"\bnew\s+Function\b",
        "new Function",
        RiskSeverity::High,
        "Runs arbitrary code built at runtime",
    ),
    (
        r"\bpostMessage\s*\(",
        "postMessage(",
        RiskSeverity::Medium,
        "Talks to other windows or frames",
    ),
    (
        r"window\s*\.\s*open\s*\(",
        "window.open(",
        RiskSeverity::Low,
        "Opens new windows or tabs",
    ),
    (
        r"\blocation\b",
        "location",
        RiskSeverity::Low,
        "Changes or reads the current address",
    ),
    (
        r"\b(atob|btoa)\s*\(",
        "atob/btoa",
        RiskSeverity::Low,
        "Encodes or decodes hidden data",
    ),
];

fn rules() -> &'static [RiskRule] {
    static RULES: OnceLock<Vec<RiskRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        RISK_RULES
            .iter()
            .filter_map(|&(re, pattern, severity, message)| match Regex::new(re) {
                Ok(regex) => Some(RiskRule {
                    regex,
                    pattern,
                    severity,
                    message,
                }),
                Err(e) => {
                    tracing::error!(pattern = %pattern, error = %e, "Invalid risk pattern");
                    None
                }
            })
            .collect()
    })
}

/// Scan script text for sensitive browser APIs.
///
/// Advisory only: the settings UI shows these before saving, nothing is
/// blocked. Findings are ordered most severe first.
pub fn analyze_script(script: &str) -> Vec<RiskFinding> {
    let mut findings: Vec<RiskFinding> = rules()
        .iter()
        .filter(|rule| rule.regex.is_match(script))
        .map(|rule| RiskFinding {
            pattern: rule.pattern,
            severity: rule.severity,
            message: rule.message,
        })
        .collect();
    findings.sort_by(|a, b| b.severity.cmp(&a.severity));
    findings
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScriptError {
    #[error("Syntax error at {position}: {message}")]
    Syntax { position: usize, message: String },
    #[error("'{0}' is not an allowed script function")]
    Forbidden(String),
    #[error("Unknown attribute '{0}'")]
    UnknownAttribute(String),
    #[error("'{name}' takes {expected} argument(s), got {got}")]
    Arity {
        name: String,
        expected: usize,
        got: usize,
    },
}

/// Side effects a hotkey script may request.
pub trait ScriptEffects {
    fn navigate(&mut self, url: &str);
    fn open(&mut self, url: &str);
    fn alert(&mut self, message: &str);
    fn set_title(&mut self, title: &str);
    fn set_favicon(&mut self, href: &str);
    fn reload(&mut self);
    fn back(&mut self);
    fn forward(&mut self);
}

/// Pluggable script execution capability.
pub trait ScriptEngine: Send + Sync {
    fn run(
        &self,
        script: &str,
        attributes: &BTreeMap<String, String>,
        effects: &mut dyn ScriptEffects,
    ) -> Result<(), ScriptError>;
}

/// A single resolved effect call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Navigate(String),
    Open(String),
    Alert(String),
    Title(String),
    Favicon(String),
    Log(String),
    Reload,
    Back,
    Forward,
}

/// Restricted interpreter: statements of the form `name(arg, ...)`.
///
/// Arguments are quoted strings or bare attribute names. The whole script is
/// parsed and checked before the first effect runs, so a rejected script has
/// no partial effect.
#[derive(Debug, Default, Clone, Copy)]
pub struct EffectScriptEngine;

impl EffectScriptEngine {
    pub fn compile(
        &self,
        script: &str,
        attributes: &BTreeMap<String, String>,
    ) -> Result<Vec<Effect>, ScriptError> {
        let calls = Parser::new(script).parse()?;
        calls
            .into_iter()
            .map(|call| resolve_call(call, attributes))
            .collect()
    }
}

impl ScriptEngine for EffectScriptEngine {
    fn run(
        &self,
        script: &str,
        attributes: &BTreeMap<String, String>,
        effects: &mut dyn ScriptEffects,
    ) -> Result<(), ScriptError> {
        for effect in self.compile(script, attributes)? {
            match effect {
                Effect::Navigate(url) => effects.navigate(&url),
                Effect::Open(url) => effects.open(&url),
                Effect::Alert(message) => effects.alert(&message),
                Effect::Title(title) => effects.set_title(&title),
                Effect::Favicon(href) => effects.set_favicon(&href),
                Effect::Log(text) => tracing::info!(text = %text, "Hotkey script log"),
                Effect::Reload => effects.reload(),
                Effect::Back => effects.back(),
                Effect::Forward => effects.forward(),
            }
        }
        Ok(())
    }
}

#[derive(Debug)]
enum Arg {
    Literal(String),
    Attribute(String),
}

#[derive(Debug)]
struct Call {
    name: String,
    args: Vec<Arg>,
}

fn resolve_call(call: Call, attributes: &BTreeMap<String, String>) -> Result<Effect, ScriptError> {
    let expected = match call.name.as_str() {
        "navigate" | "open" | "alert" | "title" | "favicon" | "log" => 1,
        "reload" | "back" | "forward" => 0,
        _ => return Err(ScriptError::Forbidden(call.name)),
    };
    if call.args.len() != expected {
        return Err(ScriptError::Arity {
            name: call.name,
            expected,
            got: call.args.len(),
        });
    }

    let mut values = Vec::with_capacity(call.args.len());
    for arg in call.args {
        values.push(match arg {
            Arg::Literal(s) => s,
            Arg::Attribute(name) => attributes
                .get(&name)
                .cloned()
                .ok_or(ScriptError::UnknownAttribute(name))?,
        });
    }
    let first = values.into_iter().next().unwrap_or_default();

    Ok(match call.name.as_str() {
        "navigate" => Effect::Navigate(first),
        "open" => Effect::Open(first),
        "alert" => Effect::Alert(first),
        "title" => Effect::Title(first),
        "favicon" => Effect::Favicon(first),
        "log" => Effect::Log(first),
        "reload" => Effect::Reload,
        "back" => Effect::Back,
        _ => Effect::Forward,
    })
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn new(src: &str) -> Self {
        Self {
            chars: src.chars().collect(),
            pos: 0,
        }
    }

    fn parse(mut self) -> Result<Vec<Call>, ScriptError> {
        let mut calls = Vec::new();
        loop {
            self.skip_separators();
            if self.pos >= self.chars.len() {
                return Ok(calls);
            }
            calls.push(self.call()?);
        }
    }

    fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Syntax {
            position: self.pos,
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    /// Whitespace, newlines, `;` and `//` comments between statements.
    fn skip_separators(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == ';' {
                self.pos += 1;
            } else if c == '/' && self.chars.get(self.pos + 1) == Some(&'/') {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn skip_inline_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn ident(&mut self) -> Result<String, ScriptError> {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_' || c == '$') {
            self.pos += 1;
        }
        if start == self.pos {
            return Err(self.error("expected a name"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn expect(&mut self, expected: char) -> Result<(), ScriptError> {
        self.skip_inline_whitespace();
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", expected)))
        }
    }

    fn call(&mut self) -> Result<Call, ScriptError> {
        let name = self.ident()?;
        // Member access like `window.open` is never part of the allow-list
        if self.peek() == Some('.') {
            return Err(ScriptError::Forbidden(name));
        }
        self.expect('(')?;
        let mut args = Vec::new();
        self.skip_inline_whitespace();
        if self.peek() == Some(')') {
            self.pos += 1;
            return Ok(Call { name, args });
        }
        loop {
            self.skip_inline_whitespace();
            args.push(self.arg()?);
            self.skip_inline_whitespace();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(')') => {
                    self.pos += 1;
                    return Ok(Call { name, args });
                }
                _ => return Err(self.error("expected ',' or ')'")),
            }
        }
    }

    fn arg(&mut self) -> Result<Arg, ScriptError> {
        match self.peek() {
            Some(q @ ('"' | '\'' | '`')) => {
                self.pos += 1;
                self.string(q).map(Arg::Literal)
            }
            Some(_) => self.ident().map(Arg::Attribute),
            None => Err(self.error("unexpected end of script")),
        }
    }

    fn string(&mut self, quote: char) -> Result<String, ScriptError> {
        let mut out = String::new();
        while let Some(c) = self.peek() {
            self.pos += 1;
            match c {
                c if c == quote => return Ok(out),
                '\\' => {
                    let escaped = self.peek().ok_or_else(|| self.error("dangling escape"))?;
                    self.pos += 1;
                    out.push(match escaped {
                        'n' => '\n',
                        't' => '\t',
                        other => other,
                    });
                }
                c => out.push(c),
            }
        }
        Err(self.error("unterminated string"))
    }
}
