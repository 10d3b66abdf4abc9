//! Splits one logical source line into an optional label, a mnemonic, and
//! a comma-separated operand list.
//!
//! Grounded on `ExpandTokens`/`StringListToVector` (spec.md 4.3 and 13): a
//! hand-rolled state machine tracking quote and bracket depth rather than a
//! regex, because the same splitter is reused for both the top-level
//! operand list and the semicolon-delimited `SUB` option list.

use crate::error::{AssemblyError, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParsedLine {
    pub label: Option<String>,
    pub mnemonic: Option<String>,
    pub operands: String,
}

fn is_label_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Strips trailing whitespace and an unquoted `;` comment.
pub fn strip_comment(line: &str) -> &str {
    let chars: Vec<char> = line.chars().collect();
    let mut in_single = false;
    let mut in_double = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_single || in_double => escaped = true,
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            ';' if !in_single && !in_double => {
                let byte_idx: usize = chars[..i].iter().map(|c| c.len_utf8()).sum();
                return line[..byte_idx].trim_end();
            }
            _ => {}
        }
    }
    line.trim_end()
}

/// Parses a logical line (comment already stripped) into label/mnemonic/
/// operand text, matching `^((LABEL:? )|\s+)?(MNEMONIC(\s+OPERANDS)?)?$`.
pub fn parse_line(line: &str) -> Result<ParsedLine> {
    let trimmed = line.trim_end();
    if trimmed.trim().is_empty() {
        return Ok(ParsedLine {
            label: None,
            mnemonic: None,
            operands: String::new(),
        });
    }

    let mut rest = trimmed;
    let mut label = None;

    if !trimmed.starts_with(|c: char| c.is_whitespace()) {
        let label_end = trimmed
            .find(|c: char| !is_label_char(c))
            .unwrap_or(trimmed.len());
        let candidate = &trimmed[..label_end];
        if candidate.is_empty() {
            return Err(AssemblyError::error(format!("Invalid Label: '{}'", trimmed)));
        }
        if !candidate.chars().next().unwrap().is_ascii_alphabetic() && !candidate.starts_with('_') {
            return Err(AssemblyError::error(format!("Invalid Label: '{}'", candidate)));
        }

        let after = &trimmed[label_end..];
        let after = if let Some(stripped) = after.strip_prefix(':') {
            stripped
        } else {
            after
        };

        if !after.is_empty() && !after.starts_with(|c: char| c.is_whitespace()) {
            return Err(AssemblyError::error("Unable to parse line"));
        }

        label = Some(candidate.to_ascii_uppercase());
        rest = after.trim_start();
    } else {
        rest = trimmed.trim_start();
    }

    if rest.is_empty() {
        return Ok(ParsedLine {
            label,
            mnemonic: None,
            operands: String::new(),
        });
    }

    let mnem_end = rest.find(char::is_whitespace).unwrap_or(rest.len());
    let mnemonic = rest[..mnem_end].to_ascii_uppercase();
    let operands = rest[mnem_end..].trim_start().to_owned();

    Ok(ParsedLine {
        label,
        mnemonic: Some(mnemonic),
        operands,
    })
}

/// Splits `text` on top-level commas, honoring single/double quotes
/// (with `\`-escapes) and balanced parens. Each field is trimmed of
/// surrounding whitespace. Used both for operand lists and, with `;` as
/// the delimiter, `SUB` option lists.
pub fn split_fields(text: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut depth = 0i32;
    let mut escaped = false;

    for c in text.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_single || in_double => {
                current.push(c);
                escaped = true;
            }
            '\'' if !in_double => {
                in_single = !in_single;
                current.push(c);
            }
            '"' if !in_single => {
                in_double = !in_double;
                current.push(c);
            }
            '(' if !in_single && !in_double => {
                depth += 1;
                current.push(c);
            }
            ')' if !in_single && !in_double => {
                depth -= 1;
                current.push(c);
            }
            c if c == delimiter && !in_single && !in_double && depth <= 0 => {
                fields.push(current.trim().to_owned());
                current = String::new();
            }
            _ => current.push(c),
        }
    }

    if !current.trim().is_empty() || !fields.is_empty() {
        fields.push(current.trim().to_owned());
    }

    fields
}

pub fn split_operands(operands: &str) -> Vec<String> {
    if operands.trim().is_empty() {
        Vec::new()
    } else {
        split_fields(operands, ',')
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn strips_trailing_comment() {
        assert_eq!(strip_comment("LDI 5 ; load five"), "LDI 5");
    }

    #[test]
    fn semicolon_inside_string_is_not_a_comment() {
        assert_eq!(strip_comment("DB \"a;b\""), "DB \"a;b\"");
    }

    #[test]
    fn label_and_mnemonic() {
        let parsed = parse_line("LOOP: LDI 5").unwrap();
        assert_eq!(parsed.label.as_deref(), Some("LOOP"));
        assert_eq!(parsed.mnemonic.as_deref(), Some("LDI"));
        assert_eq!(parsed.operands, "5");
    }

    #[test]
    fn label_without_colon() {
        let parsed = parse_line("LOOP LDI 5").unwrap();
        assert_eq!(parsed.label.as_deref(), Some("LOOP"));
        assert_eq!(parsed.mnemonic.as_deref(), Some("LDI"));
    }

    #[test]
    fn label_only_line() {
        let parsed = parse_line("LOOP:").unwrap();
        assert_eq!(parsed.label.as_deref(), Some("LOOP"));
        assert_eq!(parsed.mnemonic, None);
    }

    #[test]
    fn mnemonic_only_no_label() {
        let parsed = parse_line("    SEP R1").unwrap();
        assert_eq!(parsed.label, None);
        assert_eq!(parsed.mnemonic.as_deref(), Some("SEP"));
        assert_eq!(parsed.operands, "R1");
    }

    #[test]
    fn blank_line_is_empty() {
        let parsed = parse_line("   ").unwrap();
        assert_eq!(parsed, ParsedLine { label: None, mnemonic: None, operands: String::new() });
    }

    #[test]
    fn operand_split_honors_parens_and_quotes() {
        let fields = split_operands("FOO(1,2), \"a,b\", 'x'");
        assert_eq!(fields, vec!["FOO(1,2)", "\"a,b\"", "'x'"]);
    }

    #[test]
    fn sub_options_split_on_semicolon() {
        let fields = split_fields("ALIGN=4; STATIC; PAD=0xFF", ';');
        assert_eq!(fields, vec!["ALIGN=4", "STATIC", "PAD=0xFF"]);
    }
}
