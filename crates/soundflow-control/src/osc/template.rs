//! User-configurable OSC message templates
//!
//! A template is the text form of an outgoing message: an address followed
//! by whitespace-separated arguments, e.g. `/eos/sub/3/fire` or
//! `/strobe/level $v`. The `$v` placeholder is replaced with the runtime
//! value at send time. A template without `$v` appends a provided value as a
//! trailing argument, which keeps bare-address level commands working.

use super::{OscArg, OscMessage};
use crate::error::{ControlError, Result};

/// Runtime value substituted into a template
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateValue {
    /// Float argument
    Float(f32),
    /// Integer argument
    Int(i32),
    /// String argument
    Str(String),
}

impl From<TemplateValue> for OscArg {
    fn from(value: TemplateValue) -> Self {
        match value {
            TemplateValue::Float(v) => OscArg::Float(v),
            TemplateValue::Int(v) => OscArg::Int(v),
            TemplateValue::Str(v) => OscArg::Str(v),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TemplateArg {
    Literal(OscArg),
    Placeholder,
}

/// A parsed outgoing message template
#[derive(Debug, Clone, PartialEq)]
pub struct MessageTemplate {
    addr: String,
    args: Vec<TemplateArg>,
    source: String,
}

impl MessageTemplate {
    /// Parse a template from its text form
    ///
    /// Numeric tokens become typed literals (`7` → int, `0.5` → float),
    /// `$v` becomes the value placeholder, anything else a string literal.
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let mut tokens = trimmed.split_whitespace();
        let addr = tokens
            .next()
            .ok_or_else(|| ControlError::InvalidAddress(String::from("(empty)")))?;
        if !addr.starts_with('/') {
            return Err(ControlError::InvalidAddress(addr.to_string()));
        }

        let args = tokens
            .map(|token| {
                if token == "$v" {
                    TemplateArg::Placeholder
                } else if let Ok(i) = token.parse::<i32>() {
                    TemplateArg::Literal(OscArg::Int(i))
                } else if let Ok(f) = token.parse::<f32>() {
                    TemplateArg::Literal(OscArg::Float(f))
                } else {
                    TemplateArg::Literal(OscArg::Str(token.to_string()))
                }
            })
            .collect();

        Ok(Self {
            addr: addr.to_string(),
            args,
            source: trimmed.to_string(),
        })
    }

    /// The original text form
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the template consumes a runtime value
    pub fn has_placeholder(&self) -> bool {
        self.args.iter().any(|a| matches!(a, TemplateArg::Placeholder))
    }

    /// Build the message, substituting `value` for each `$v`
    ///
    /// With no placeholder present, a provided value is appended as the
    /// final argument.
    pub fn realize(&self, value: Option<TemplateValue>) -> OscMessage {
        let mut args: Vec<OscArg> = Vec::with_capacity(self.args.len() + 1);
        for arg in &self.args {
            match arg {
                TemplateArg::Literal(literal) => args.push(literal.clone()),
                TemplateArg::Placeholder => {
                    if let Some(value) = value.clone() {
                        args.push(value.into());
                    }
                }
            }
        }
        if !self.has_placeholder() {
            if let Some(value) = value {
                args.push(value.into());
            }
        }
        OscMessage::with_args(self.addr.clone(), args)
    }

    /// Build the message without any runtime value
    pub fn realize_plain(&self) -> OscMessage {
        self.realize(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_address() {
        let tpl = MessageTemplate::parse("/eos/sub/3/fire").unwrap();
        assert!(!tpl.has_placeholder());
        let msg = tpl.realize_plain();
        assert_eq!(msg.addr, "/eos/sub/3/fire");
        assert!(msg.args.is_empty());
    }

    #[test]
    fn test_placeholder_substitution() {
        let tpl = MessageTemplate::parse("/strobe/level $v").unwrap();
        assert!(tpl.has_placeholder());
        let msg = tpl.realize(Some(TemplateValue::Float(0.75)));
        assert_eq!(msg.args, vec![OscArg::Float(0.75)]);
    }

    #[test]
    fn test_typed_literals() {
        let tpl = MessageTemplate::parse("/cue go 3 0.5 $v").unwrap();
        let msg = tpl.realize(Some(TemplateValue::Int(1)));
        assert_eq!(
            msg.args,
            vec![
                OscArg::Str("go".into()),
                OscArg::Int(3),
                OscArg::Float(0.5),
                OscArg::Int(1),
            ]
        );
    }

    #[test]
    fn test_value_appended_without_placeholder() {
        let tpl = MessageTemplate::parse("/bass/level").unwrap();
        let msg = tpl.realize(Some(TemplateValue::Float(0.2)));
        assert_eq!(msg.args, vec![OscArg::Float(0.2)]);
    }

    #[test]
    fn test_invalid_templates() {
        assert!(MessageTemplate::parse("").is_err());
        assert!(MessageTemplate::parse("   ").is_err());
        assert!(MessageTemplate::parse("no/leading/slash").is_err());
    }
}
