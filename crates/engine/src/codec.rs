//! Argument text of the provider console, in both directions.
//!
//! Outgoing arguments are rendered as the literals the console's generic
//! deserializer reads. Incoming call expressions are split at top-level
//! commas and each piece is classified into a [`CallArgument`] once.

use std::fmt;
use std::fmt::Write as _;

use dubbo_invoke_types::argument::CLASS_FIELD;
use dubbo_invoke_types::{CallArgument, InvokeError};
use serde_json::{Number, Value};

/// Console command that performs a generic call.
pub const INVOKE_COMMAND: &str = "invoke";

/// Renders arguments as they appear between the parentheses of an
/// `invoke` command.
pub fn format(arguments: &[CallArgument]) -> String {
    let mut out = String::new();
    write_sequence(&mut out, arguments);
    out
}

/// Full command line, newline included.
pub fn invoke_command(service: &str, method: &str, arguments: &[CallArgument]) -> String {
    format!("{INVOKE_COMMAND} {service}.{method}({})\n", format(arguments))
}

fn write_sequence(out: &mut String, items: &[CallArgument]) {
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            out.push_str(", ");
        }
        write_argument(out, item);
    }
}

fn write_argument(out: &mut String, argument: &CallArgument) {
    match argument {
        CallArgument::Null => out.push_str("null"),
        CallArgument::Bool(flag) => out.push_str(if *flag { "true" } else { "false" }),
        CallArgument::Int(value) => {
            let _ = write!(out, "{value}");
        }
        CallArgument::Float(value) => match Number::from_f64(*value) {
            Some(number) => out.push_str(&number.to_string()),
            None => out.push_str("null"),
        },
        CallArgument::Str(text) => write_string(out, text),
        CallArgument::OversizedInteger(digits) => out.push_str(digits),
        CallArgument::Array(items) => {
            out.push('[');
            write_sequence(out, items);
            out.push(']');
        }
        CallArgument::Object { type_hint, fields } => {
            out.push('{');
            let mut first = true;
            if let Some(hint) = type_hint {
                write_string(out, CLASS_FIELD);
                out.push(':');
                write_string(out, hint);
                first = false;
            }
            for (key, value) in fields {
                if !first {
                    out.push(',');
                }
                first = false;
                write_string(out, key);
                out.push(':');
                write_argument(out, value);
            }
            out.push('}');
        }
    }
}

/// JSON string escaping; non-ASCII text is kept literally.
fn write_string(out: &mut String, text: &str) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            control if u32::from(control) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", u32::from(control));
            }
            other => out.push(other),
        }
    }
    out.push('"');
}

/// Classifies one argument's text.
///
/// Blank text is `null`. Structured text must nest correctly and decode as
/// JSON; anything that is not a literal is taken as a plain string.
pub fn parse(raw: &str) -> Result<CallArgument, InvokeError> {
    let lead = raw.len() - raw.trim_start().len();
    parse_trimmed(raw.trim()).map_err(|error| shift_offset(error, lead))
}

fn parse_trimmed(text: &str) -> Result<CallArgument, InvokeError> {
    match text {
        "" | "null" => return Ok(CallArgument::Null),
        "true" => return Ok(CallArgument::Bool(true)),
        "false" => return Ok(CallArgument::Bool(false)),
        _ => {}
    }
    if let Ok(number) = serde_json::from_str::<Number>(text) {
        return Ok(CallArgument::from_numeral(&number.to_string()));
    }
    if text.starts_with('"') {
        return Ok(match serde_json::from_str::<String>(text) {
            Ok(decoded) => CallArgument::Str(decoded),
            Err(_) => CallArgument::Str(text.to_string()),
        });
    }
    if text.starts_with(['{', '[']) {
        return decode_json(text).map(CallArgument::from_json);
    }
    Ok(CallArgument::Str(text.to_string()))
}

/// Reads a request body holding the argument array. A body that is not an
/// array is a single argument; a blank body is no arguments.
pub fn parse_argument_list(json: &str) -> Result<Vec<CallArgument>, InvokeError> {
    let lead = json.len() - json.trim_start().len();
    let text = json.trim();
    if text.is_empty() {
        return Ok(Vec::new());
    }
    match decode_json(text).map_err(|error| shift_offset(error, lead))? {
        Value::Array(items) => Ok(items.into_iter().map(CallArgument::from_json).collect()),
        other => Ok(vec![CallArgument::from_json(other)]),
    }
}

/// Splits an argument list at top-level commas. Pieces come back trimmed.
pub fn split_arguments(text: &str) -> Result<Vec<&str>, InvokeError> {
    Ok(argument_spans(text)?.into_iter().map(|(_, piece)| piece).collect())
}

/// Parses every argument of a comma separated list.
pub fn parse_arguments(text: &str) -> Result<Vec<CallArgument>, InvokeError> {
    argument_spans(text)?
        .into_iter()
        .map(|(offset, piece)| parse(piece).map_err(|error| shift_offset(error, offset)))
        .collect()
}

fn argument_spans(text: &str) -> Result<Vec<(usize, &str)>, InvokeError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let commas = top_level_commas(text)?;
    let mut spans = Vec::with_capacity(commas.len() + 1);
    let mut start = 0;
    for end in commas.into_iter().chain(std::iter::once(text.len())) {
        let piece = &text[start..end];
        let offset = start + (piece.len() - piece.trim_start().len());
        let trimmed = piece.trim();
        if trimmed.is_empty() {
            return Err(InvokeError::syntax(offset, "empty argument"));
        }
        spans.push((offset, trimmed));
        start = end + 1;
    }
    Ok(spans)
}

/// Byte offsets of commas outside strings and brackets. Fails on the first
/// closing delimiter without a partner, or at the end of input when a string
/// or bracket is left open.
fn top_level_commas(text: &str) -> Result<Vec<usize>, InvokeError> {
    let mut commas = Vec::new();
    let mut open: Vec<(char, usize)> = Vec::new();
    let mut string_start: Option<usize> = None;
    let mut escaped = false;

    for (index, character) in text.char_indices() {
        if string_start.is_some() {
            if escaped {
                escaped = false;
            } else if character == '\\' {
                escaped = true;
            } else if character == '"' {
                string_start = None;
            }
            continue;
        }
        match character {
            '"' => string_start = Some(index),
            '{' | '[' => open.push((character, index)),
            '}' | ']' => {
                let expected = if character == '}' { '{' } else { '[' };
                match open.pop() {
                    Some((opener, _)) if opener == expected => {}
                    Some((opener, at)) => {
                        return Err(InvokeError::syntax(
                            index,
                            format!("'{character}' does not close '{opener}' opened at byte {at}"),
                        ));
                    }
                    None => return Err(InvokeError::syntax(index, format!("unmatched '{character}'"))),
                }
            }
            ',' if open.is_empty() => commas.push(index),
            _ => {}
        }
    }

    if let Some(at) = string_start {
        return Err(InvokeError::syntax(text.len(), format!("string opened at byte {at} is not terminated")));
    }
    if let Some((opener, at)) = open.last() {
        return Err(InvokeError::syntax(text.len(), format!("'{opener}' opened at byte {at} is not closed")));
    }
    Ok(commas)
}

/// Nesting is checked first so delimiter mistakes report their own offset;
/// JSON that nests but does not decode reports the decoder's position.
fn decode_json(text: &str) -> Result<Value, InvokeError> {
    top_level_commas(text)?;
    serde_json::from_str::<Value>(text).map_err(|error| {
        let line_start: usize = text.split_inclusive('\n').take(error.line().saturating_sub(1)).map(str::len).sum();
        let offset = (line_start + error.column().saturating_sub(1)).min(text.len());
        InvokeError::syntax(offset, error.to_string())
    })
}

fn shift_offset(error: InvokeError, by: usize) -> InvokeError {
    match error {
        InvokeError::ExpressionSyntaxError { offset, message } => InvokeError::ExpressionSyntaxError {
            offset: offset + by,
            message,
        },
        other => other,
    }
}

/// `<service>.<method>(<arguments>)`, optionally prefixed with `invoke`.
#[derive(Debug, Clone, PartialEq)]
pub struct CallExpression {
    pub service: String,
    pub method: String,
    pub arguments: Vec<CallArgument>,
}

impl CallExpression {
    /// The first `(` ends the call target; the last `.` before it separates
    /// service from method. Error offsets index into `expression`.
    pub fn parse(expression: &str) -> Result<Self, InvokeError> {
        let mut lead = expression.len() - expression.trim_start().len();
        let mut body = expression.trim();
        if let Some(rest) = body.strip_prefix(INVOKE_COMMAND)
            && rest.starts_with(char::is_whitespace)
        {
            let rest_trimmed = rest.trim_start();
            lead += body.len() - rest_trimmed.len();
            body = rest_trimmed;
        }

        let open = body
            .find('(')
            .ok_or_else(|| InvokeError::syntax(lead + body.len(), "expected '(' after the method name"))?;
        let target = body[..open].trim_end();
        let dot = target
            .rfind('.')
            .ok_or_else(|| InvokeError::syntax(lead, "expected <service>.<method> before '('"))?;
        let service = target[..dot].trim();
        let method = target[dot + 1..].trim();
        if service.is_empty() || method.is_empty() {
            return Err(InvokeError::syntax(lead + dot, "service and method names must not be empty"));
        }
        if !body.ends_with(')') {
            return Err(InvokeError::syntax(lead + body.len(), "expected ')' at the end of the call"));
        }

        let inner = &body[open + 1..body.len() - 1];
        let arguments = parse_arguments(inner).map_err(|error| shift_offset(error, lead + open + 1))?;
        Ok(Self {
            service: service.to_string(),
            method: method.to_string(),
            arguments,
        })
    }

    pub fn command(&self) -> String {
        invoke_command(&self.service, &self.method, &self.arguments)
    }
}

impl fmt::Display for CallExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}({})", self.service, self.method, format(&self.arguments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn syntax_offset(result: Result<impl fmt::Debug, InvokeError>) -> usize {
        match result {
            Err(InvokeError::ExpressionSyntaxError { offset, .. }) => offset,
            other => panic!("expected a syntax error, got {other:?}"),
        }
    }

    #[test]
    fn formats_canonical_literals() {
        let text = format(&[
            CallArgument::Str("a\"b\\c 中文".into()),
            CallArgument::Int(42),
            CallArgument::OversizedInteger("12345678901234567890".into()),
            CallArgument::Null,
            CallArgument::Bool(true),
            CallArgument::Float(1.5),
            CallArgument::Array(vec![]),
        ]);
        assert_eq!(text, r#""a\"b\\c 中文", 42, 12345678901234567890, null, true, 1.5, []"#);
    }

    #[test]
    fn class_hint_is_written_first() {
        let mut fields = IndexMap::new();
        fields.insert("name".to_string(), CallArgument::Str("Ann".into()));
        fields.insert("tags".to_string(), CallArgument::Array(vec![CallArgument::Int(1), CallArgument::Int(2)]));
        let user = CallArgument::Object {
            type_hint: Some("com.acme.User".into()),
            fields,
        };
        assert_eq!(format(&[user]), r#"{"class":"com.acme.User","name":"Ann","tags":[1, 2]}"#);

        let parsed = parse(r#"{"name":"Ann","class":"com.acme.User"}"#).expect("object");
        assert_eq!(format(&[parsed]), r#"{"class":"com.acme.User","name":"Ann"}"#);
    }

    #[test]
    fn oversized_integers_keep_their_digits() {
        let argument = parse("12345678901234567890").expect("numeral");
        assert_eq!(argument, CallArgument::OversizedInteger("12345678901234567890".into()));
        assert_eq!(format(&[argument]), "12345678901234567890");

        let nested = parse(r#"{"id":9007199254740993,"n":7}"#).expect("object");
        assert_eq!(format(&[nested]), r#"{"id":9007199254740993,"n":7}"#);
    }

    #[test]
    fn classifies_scalars() {
        assert_eq!(parse("   ").expect("blank"), CallArgument::Null);
        assert_eq!(parse(" true ").expect("bool"), CallArgument::Bool(true));
        assert_eq!(parse("-3.5").expect("float"), CallArgument::Float(-3.5));
        assert_eq!(parse("17").expect("int"), CallArgument::Int(17));
        assert_eq!(parse(r#""quoted""#).expect("string"), CallArgument::Str("quoted".into()));
        assert_eq!(parse("hello world").expect("bare"), CallArgument::Str("hello world".into()));
    }

    #[test]
    fn splits_at_top_level_commas_only() {
        let pieces = split_arguments(r#" "a,b", {"x":[1,2]} ,3, "q\"," "#).expect("split");
        assert_eq!(pieces, vec![r#""a,b""#, r#"{"x":[1,2]}"#, "3", r#""q\",""#]);
        assert!(split_arguments("  ").expect("blank").is_empty());
    }

    #[test]
    fn nesting_errors_report_offsets() {
        assert_eq!(syntax_offset(split_arguments(r#"{"a":1]"#)), 6);
        assert_eq!(syntax_offset(split_arguments("[1, 2")), 5);
        assert_eq!(syntax_offset(split_arguments(r#""abc"#)), 4);
        assert_eq!(syntax_offset(split_arguments("1, }")), 3);
        assert_eq!(syntax_offset(split_arguments("1,,2")), 2);
    }

    #[test]
    fn undecodable_json_is_a_syntax_error() {
        let text = r#"{"a":}"#;
        let offset = syntax_offset(parse(text));
        assert!(offset <= text.len());
    }

    #[test]
    fn parses_call_expressions() {
        let call = CallExpression::parse(r#"com.acme.UserService.getUser(1, "x", {"class":"com.acme.Q","ids":[1,2]})"#)
            .expect("expression");
        assert_eq!(call.service, "com.acme.UserService");
        assert_eq!(call.method, "getUser");
        assert_eq!(call.arguments.len(), 3);
        assert_eq!(call.arguments[0], CallArgument::Int(1));
        assert_eq!(
            call.command(),
            "invoke com.acme.UserService.getUser(1, \"x\", {\"class\":\"com.acme.Q\",\"ids\":[1, 2]})\n"
        );

        let empty = CallExpression::parse("invoke com.acme.Health.ping()").expect("no arguments");
        assert!(empty.arguments.is_empty());
        assert_eq!(empty.to_string(), "com.acme.Health.ping()");
    }

    #[test]
    fn expression_errors_index_the_whole_expression() {
        assert_eq!(syntax_offset(CallExpression::parse(r#"svc.m({"a":1)"#)), 12);
        assert_eq!(syntax_offset(CallExpression::parse("svc.m(1")), 7);
        assert_eq!(syntax_offset(CallExpression::parse("method(1)")), 0);
        assert_eq!(syntax_offset(CallExpression::parse("svc.method")), 10);
    }

    #[test]
    fn reads_argument_list_bodies() {
        let arguments = parse_argument_list(r#"["a", 1, {"class":"X","v":9007199254740993}]"#).expect("list");
        assert_eq!(arguments.len(), 3);
        match &arguments[2] {
            CallArgument::Object { type_hint, fields } => {
                assert_eq!(type_hint.as_deref(), Some("X"));
                assert_eq!(fields["v"], CallArgument::OversizedInteger("9007199254740993".into()));
            }
            other => panic!("expected an object, got {other:?}"),
        }
        assert!(parse_argument_list(" ").expect("blank").is_empty());
        assert_eq!(parse_argument_list(r#"{"k":1}"#).expect("single").len(), 1);
        assert!(parse_argument_list("[1, 2").is_err());
    }
}
