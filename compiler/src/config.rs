use std::fmt;
use std::path::PathBuf;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::error::ColfError;
use crate::utils::quote;

lazy_static! {
    static ref EXPR_TOKEN:   Regex = Regex::new(r"^\s*(0[xX][0-9A-Fa-f]+|\d+|<<|[-+*/()])").unwrap();
    static ref PREFIX:       Regex = Regex::new(r"^[a-z0-9][a-z0-9_.\-]*(/[a-z0-9][a-z0-9_.\-]*)*$").unwrap();
    static ref CLASS_NAME:   Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(/[A-Za-z_][A-Za-z0-9_]*)*$").unwrap();
}

pub const DEFAULT_SIZE_MAX: &str = "16 * 1024 * 1024";
pub const DEFAULT_LIST_MAX: &str = "64 * 1024";

/// Largest ceiling accepted; every target language holds it in a signed
/// 32-bit integer.
pub const CEILING_LIMIT: u64 = i32::MAX as u64;

/// A ceiling as given by the user together with its evaluated value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ceiling {
    pub expr:  String,
    pub value: u64,
}

impl Ceiling {
    /// Evaluates a ceiling expression: unsigned integer literals (decimal or
    /// `0x` hex) combined with `+ - * / <<` and parentheses.
    pub fn parse(expr: &str) -> Result<Ceiling, ColfError> {
        let value = eval(expr).map_err(|msg| {
            ColfError::Config(format!("ceiling expression {}: {}", quote(expr), msg))
        })?;
        if value == 0 || value > CEILING_LIMIT {
            return Err(ColfError::Config(format!(
                "ceiling expression {} evaluates to {}, which is outside 1..={}",
                quote(expr),
                value,
                CEILING_LIMIT
            )));
        }
        Ok(Ceiling { expr: expr.trim().to_string(), value })
    }
}

fn eval(expr: &str) -> Result<u64, String> {
    let mut tokens = Vec::new();
    let mut rest = expr;
    while !rest.trim().is_empty() {
        let caps = EXPR_TOKEN
            .captures(rest)
            .ok_or_else(|| format!("unexpected {}", quote(rest.trim())))?;
        let whole = caps.get(0).map_or(0, |m| m.end());
        tokens.push(caps.get(1).map_or("", |m| m.as_str()));
        rest = &rest[whole..];
    }
    if tokens.is_empty() {
        return Err("empty expression".to_string());
    }

    let mut eval = Eval { tokens, index: 0 };
    let value = eval.shift()?;
    if let Some(tok) = eval.tokens.get(eval.index) {
        return Err(format!("unexpected {}", quote(tok)));
    }
    Ok(value)
}

/// Recursive descent over C precedence: `<<` binds weaker than `+ -`, which
/// bind weaker than `* /`.
struct Eval<'a> {
    tokens: Vec<&'a str>,
    index:  usize,
}

impl<'a> Eval<'a> {
    fn eat(&mut self, tok: &str) -> bool {
        if self.tokens.get(self.index) == Some(&tok) {
            self.index += 1;
            true
        } else {
            false
        }
    }

    fn shift(&mut self) -> Result<u64, String> {
        let mut value = self.sum()?;
        while self.eat("<<") {
            let n = self.sum()?;
            value = u32::try_from(n)
                .ok()
                .and_then(|n| value.checked_shl(n))
                .filter(|v| v >> n == value)
                .ok_or("overflow")?;
        }
        Ok(value)
    }

    fn sum(&mut self) -> Result<u64, String> {
        let mut value = self.product()?;
        loop {
            if self.eat("+") {
                value = value.checked_add(self.product()?).ok_or("overflow")?;
            } else if self.eat("-") {
                value = value.checked_sub(self.product()?).ok_or("negative value")?;
            } else {
                return Ok(value);
            }
        }
    }

    fn product(&mut self) -> Result<u64, String> {
        let mut value = self.atom()?;
        loop {
            if self.eat("*") {
                value = value.checked_mul(self.atom()?).ok_or("overflow")?;
            } else if self.eat("/") {
                value = value.checked_div(self.atom()?).ok_or("division by zero")?;
            } else {
                return Ok(value);
            }
        }
    }

    fn atom(&mut self) -> Result<u64, String> {
        let tok = match self.tokens.get(self.index) {
            Some(tok) => *tok,
            None => return Err("unexpected end of expression".to_string()),
        };
        self.index += 1;
        if tok == "(" {
            let value = self.shift()?;
            if !self.eat(")") {
                return Err("missing \")\"".to_string());
            }
            return Ok(value);
        }
        let parsed = match tok.strip_prefix("0x").or_else(|| tok.strip_prefix("0X")) {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => tok.parse::<u64>(),
        };
        parsed.map_err(|_| format!("unexpected {}", quote(tok)))
    }
}

/// Optional code generation directives. Only some generators honour them;
/// the others reject a configuration that sets one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    SuperClass,
    Interfaces,
    Snippet,
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Directive::SuperClass => "super class",
            Directive::Interfaces => "interfaces",
            Directive::Snippet => "snippet",
        })
    }
}

/// Compiler configuration, built once per invocation and shared read-only
/// with every generator.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub dest:        PathBuf,
    pub prefix:      String,
    pub size_max:    Ceiling,
    pub list_max:    Ceiling,
    pub super_class: Option<String>,
    pub interfaces:  Vec<String>,
    pub snippet:     Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            dest:        PathBuf::from("."),
            prefix:      String::new(),
            size_max:    Ceiling { expr: DEFAULT_SIZE_MAX.to_string(), value: colf_wire::DEFAULT_SIZE_MAX as u64 },
            list_max:    Ceiling { expr: DEFAULT_LIST_MAX.to_string(), value: colf_wire::DEFAULT_LIST_MAX as u64 },
            super_class: None,
            interfaces:  Vec::new(),
            snippet:     None,
        }
    }
}

impl Config {
    pub fn new(dest: impl Into<PathBuf>) -> Self {
        Config { dest: dest.into(), ..Config::default() }
    }

    /// Sets the package prefix; use slash as a separator when nesting. Go
    /// module paths such as `example.com/app` are accepted.
    pub fn with_prefix(mut self, prefix: &str) -> Result<Self, ColfError> {
        let prefix = prefix.trim_matches('/');
        if !prefix.is_empty() && !PREFIX.is_match(prefix) {
            return Err(ColfError::Config(format!("invalid package prefix {}", quote(prefix))));
        }
        self.prefix = prefix.to_string();
        Ok(self)
    }

    pub fn with_size_max(mut self, expr: &str) -> Result<Self, ColfError> {
        self.size_max = Ceiling::parse(expr)?;
        Ok(self)
    }

    pub fn with_list_max(mut self, expr: &str) -> Result<Self, ColfError> {
        self.list_max = Ceiling::parse(expr)?;
        Ok(self)
    }

    /// Makes all generated classes extend `class`; slash separates packages.
    pub fn with_super_class(mut self, class: &str) -> Result<Self, ColfError> {
        if !CLASS_NAME.is_match(class) {
            return Err(ColfError::Config(format!("invalid super class {}", quote(class))));
        }
        self.super_class = Some(class.to_string());
        Ok(self)
    }

    /// Makes all generated classes implement a comma-separated list of
    /// interfaces.
    pub fn with_interfaces(mut self, list: &str) -> Result<Self, ColfError> {
        let mut interfaces = Vec::new();
        for name in list.split(',').map(str::trim) {
            if !CLASS_NAME.is_match(name) {
                return Err(ColfError::Config(format!("invalid interface {}", quote(name))));
            }
            interfaces.push(name.to_string());
        }
        self.interfaces = interfaces;
        Ok(self)
    }

    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    /// The optional directives this configuration sets.
    pub fn directives(&self) -> Vec<Directive> {
        let mut set = Vec::new();
        if self.super_class.is_some() {
            set.push(Directive::SuperClass);
        }
        if !self.interfaces.is_empty() {
            set.push(Directive::Interfaces);
        }
        if self.snippet.is_some() {
            set.push(Directive::Snippet);
        }
        set
    }

    /// Fails on the first directive that the named language does not
    /// support.
    pub fn check_support(&self, language: &str, supported: &[Directive]) -> Result<(), ColfError> {
        match self.directives().into_iter().find(|d| !supported.contains(d)) {
            Some(d) => Err(ColfError::Config(format!("{} not supported with {}", d, language))),
            None => Ok(()),
        }
    }

    /// Joins the prefix and a package name with a slash.
    pub fn prefixed(&self, package: &str) -> String {
        if self.prefix.is_empty() {
            package.to_string()
        } else {
            format!("{}/{}", self.prefix, package)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_message(r: Result<Config, ColfError>) -> String {
        match r {
            Err(ColfError::Config(msg)) => msg,
            other => panic!("expected a configuration error, got {:?}", other),
        }
    }

    #[test]
    fn ceiling_expressions() {
        let eval = |s| Ceiling::parse(s).map(|c| c.value).ok();
        assert_eq!(eval("16 * 1024 * 1024"), Some(16 * 1024 * 1024));
        assert_eq!(eval("64*1024"), Some(65536));
        assert_eq!(eval("2048"), Some(2048));
        assert_eq!(eval("0x100"), Some(256));
        assert_eq!(eval("1 << 10 + 2"), Some(4096));
        assert_eq!(eval("(1 << 10) + 2"), Some(1026));
        assert_eq!(eval("10 - 4 - 3"), Some(3));
        assert_eq!(eval("100 / 3"), Some(33));
        assert_eq!(eval("0"), None);
        assert_eq!(eval("1 << 40"), None);
        assert_eq!(eval("3 - 4"), None);
        assert_eq!(eval("1 / 0"), None);
        assert_eq!(eval(""), None);
        assert_eq!(eval("16 MiB"), None);
        assert_eq!(eval("(2"), None);
        assert_eq!(eval("2 3"), None);
    }

    #[test]
    fn ceiling_error_messages() {
        match Ceiling::parse("16 MiB") {
            Err(ColfError::Config(msg)) => assert_eq!(msg, "ceiling expression \"16 MiB\": unexpected \"MiB\""),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn defaults_match_the_wire_crate() {
        let config = Config::default();
        assert_eq!(Ceiling::parse(DEFAULT_SIZE_MAX).unwrap(), config.size_max);
        assert_eq!(Ceiling::parse(DEFAULT_LIST_MAX).unwrap(), config.list_max);
    }

    #[test]
    fn directives_and_support() {
        let config = Config::new("out")
            .with_super_class("com/example/Parent")
            .unwrap()
            .with_interfaces("java/io/Serializable, com/example/Tagged")
            .unwrap();
        assert_eq!(config.interfaces, vec!["java/io/Serializable", "com/example/Tagged"]);
        assert_eq!(config.directives(), vec![Directive::SuperClass, Directive::Interfaces]);
        assert!(config
            .check_support("Java", &[Directive::SuperClass, Directive::Interfaces, Directive::Snippet])
            .is_ok());
        match config.check_support("Go", &[]) {
            Err(ColfError::Config(msg)) => assert_eq!(msg, "super class not supported with Go"),
            other => panic!("unexpected {:?}", other),
        }
        let snippet_only = Config::new("out").with_snippet("// hi");
        match snippet_only.check_support("ECMAScript", &[]) {
            Err(ColfError::Config(msg)) => assert_eq!(msg, "snippet not supported with ECMAScript"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn invalid_names() {
        assert_eq!(
            config_message(Config::new("out").with_super_class("com.example.Parent")),
            "invalid super class \"com.example.Parent\""
        );
        assert_eq!(
            config_message(Config::new("out").with_interfaces("a/B,")),
            "invalid interface \"\""
        );
        assert_eq!(
            config_message(Config::new("out").with_prefix("Com/Example")),
            "invalid package prefix \"Com/Example\""
        );
    }

    #[test]
    fn prefixing() {
        let config = Config::new("out").with_prefix("com/example/").unwrap();
        assert_eq!(config.prefixed("demo"), "com/example/demo");
        assert_eq!(Config::new("out").prefixed("demo"), "demo");
    }
}
