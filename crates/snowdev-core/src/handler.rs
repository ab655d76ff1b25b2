//! Reads the `handler` function of a component's entry file and maps its
//! Python type annotations onto platform SQL types.
//!
//! Only top-level `def handler(...)` is recognized. Procedures must take the
//! session as their first parameter; it is not part of the SQL signature.

use crate::component::EntityKind;
use crate::error::{Result, SnowdevError};
use regex::Regex;
use serde::Serialize;
use std::path::Path;
use std::sync::OnceLock;

pub const HANDLER_FUNCTION: &str = "handler";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerParam {
    pub name: String,
    pub sql_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerSignature {
    pub params: Vec<HandlerParam>,
    pub returns: String,
}

impl HandlerSignature {
    /// `a NUMBER, b STRING` for use inside `CREATE ... (<here>)`.
    pub fn sql_params(&self) -> String {
        self.params
            .iter()
            .map(|p| format!("{} {}", p.name, p.sql_type))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Read and parse the handler signature from `path`.
pub fn read_handler(path: &Path, kind: EntityKind) -> Result<HandlerSignature> {
    let source = std::fs::read_to_string(path)?;
    parse_handler(&source, kind).map_err(|reason| SnowdevError::InvalidHandler {
        path: path.display().to_string(),
        reason,
    })
}

static DEF_RE: OnceLock<Regex> = OnceLock::new();

fn def_re() -> &'static Regex {
    DEF_RE.get_or_init(|| Regex::new(r"(?m)^def[ \t]+handler[ \t]*\(").unwrap())
}

pub fn parse_handler(source: &str, kind: EntityKind) -> std::result::Result<HandlerSignature, String> {
    let m = def_re()
        .find(source)
        .ok_or_else(|| format!("no top-level 'def {HANDLER_FUNCTION}(' found"))?;
    let open = m.end();
    let close = matching_paren(source, open).ok_or("unbalanced parentheses in handler definition")?;
    let params_src = strip_comments(&source[open..close]);

    let rest = &source[close + 1..];
    let header_end = find_top_level(rest, ':').ok_or("handler definition has no ':'")?;
    let header = rest[..header_end].trim();
    let return_ann = header
        .strip_prefix("->")
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or("handler has no return type annotation")?;

    let mut params = Vec::new();
    let mut saw_session = false;
    for (i, raw) in split_top_level(&params_src, ',').into_iter().enumerate() {
        let raw = raw.trim();
        if raw.is_empty() || raw == "/" || raw == "*" {
            continue;
        }
        if raw.starts_with('*') {
            return Err(format!("variadic parameter '{raw}' is not supported"));
        }
        let decl = split_top_level(raw, '=')[0].trim();
        let (name, ann) = match find_top_level(decl, ':') {
            Some(idx) => (decl[..idx].trim(), Some(decl[idx + 1..].trim())),
            None => (decl, None),
        };

        let is_session = ann.map(is_session_annotation).unwrap_or(name == "session");
        if is_session {
            if kind == EntityKind::Function {
                return Err("a function handler cannot take a session".to_string());
            }
            if i != 0 {
                return Err("the session must be the first handler parameter".to_string());
            }
            saw_session = true;
            continue;
        }

        let ann = ann.ok_or_else(|| format!("parameter '{name}' has no type annotation"))?;
        let sql_type =
            sql_type(ann).ok_or_else(|| format!("parameter '{name}' has unsupported type '{ann}'"))?;
        params.push(HandlerParam {
            name: name.to_string(),
            sql_type,
        });
    }

    if kind == EntityKind::Procedure && !saw_session {
        return Err("a procedure handler must take the session as its first parameter".to_string());
    }

    let returns =
        sql_type(return_ann).ok_or_else(|| format!("unsupported return type '{return_ann}'"))?;
    Ok(HandlerSignature { params, returns })
}

fn is_session_annotation(ann: &str) -> bool {
    matches!(
        ann,
        "Session" | "snowpark.Session" | "snowflake.snowpark.Session" | "snowflake.snowpark.session.Session"
    )
}

/// Map a Python annotation onto a SQL type.
pub fn sql_type(annotation: &str) -> Option<String> {
    let mut ann = annotation.trim().trim_matches(|c| c == '"' || c == '\'');
    ann = ann.strip_prefix("typing.").unwrap_or(ann);

    if let Some(inner) = ann.strip_prefix("Optional[").and_then(|s| s.strip_suffix(']')) {
        return sql_type(inner);
    }
    if let Some((lhs, rhs)) = ann.split_once('|') {
        let (lhs, rhs) = (lhs.trim(), rhs.trim());
        return match (lhs, rhs) {
            ("None", other) | (other, "None") => sql_type(other),
            _ => None,
        };
    }

    let base = ann.split('[').next().unwrap_or(ann).trim();
    let ty = match base {
        "int" => "NUMBER",
        "float" => "FLOAT",
        "str" => "STRING",
        "bool" => "BOOLEAN",
        "bytes" | "bytearray" => "BINARY",
        "list" | "List" | "tuple" | "Tuple" => "ARRAY",
        "dict" | "Dict" => "OBJECT",
        "date" | "datetime.date" => "DATE",
        "datetime" | "datetime.datetime" => "TIMESTAMP_NTZ",
        "time" | "datetime.time" => "TIME",
        "Decimal" | "decimal.Decimal" => "NUMBER(38, 18)",
        "Variant" => "VARIANT",
        _ => return None,
    };
    Some(ty.to_string())
}

// ---------------------------------------------------------------------------
// Scanning helpers
// ---------------------------------------------------------------------------

/// Index of the `)` closing the paren opened just before `start`.
fn matching_paren(s: &str, start: usize) -> Option<usize> {
    let mut depth = 1i32;
    let mut quote: Option<char> = None;
    for (i, c) in s[start..].char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')' | ']' | '}') => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + i);
                }
            }
            _ => {}
        }
    }
    None
}

fn find_top_level(s: &str, needle: char) -> Option<usize> {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for (i, c) in s.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')' | ']' | '}') => depth -= 1,
            (None, c) if c == needle && depth == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut rest = s;
    while let Some(idx) = find_top_level(rest, sep) {
        parts.push(&rest[..idx]);
        rest = &rest[idx + sep.len_utf8()..];
    }
    parts.push(rest);
    parts
}

fn strip_comments(s: &str) -> String {
    s.lines()
        .map(|line| line.split('#').next().unwrap_or(""))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn udf_scalar_handler() {
        let src = "import x\n\ndef handler(df: str) -> str:\n    return df\n";
        let sig = parse_handler(src, EntityKind::Function).unwrap();
        assert_eq!(
            sig.params,
            vec![HandlerParam {
                name: "df".to_string(),
                sql_type: "STRING".to_string()
            }]
        );
        assert_eq!(sig.returns, "STRING");
        assert_eq!(sig.sql_params(), "df STRING");
    }

    #[test]
    fn udf_without_arguments() {
        let sig = parse_handler("def handler() -> int:\n    return 1\n", EntityKind::Function)
            .unwrap();
        assert!(sig.params.is_empty());
        assert_eq!(sig.returns, "NUMBER");
        assert_eq!(sig.sql_params(), "");
    }

    #[test]
    fn sproc_skips_session_and_spans_lines() {
        let src = r#"
from snowflake.snowpark import Session

def handler(
    session: Session,  # injected
    table: str,
    limit: Optional[int] = 10,
    tags: List[str] = [],
) -> dict:
    return {}
"#;
        let sig = parse_handler(src, EntityKind::Procedure).unwrap();
        assert_eq!(sig.sql_params(), "table STRING, limit NUMBER, tags ARRAY");
        assert_eq!(sig.returns, "OBJECT");
    }

    #[test]
    fn sproc_requires_session() {
        let err = parse_handler("def handler(x: int) -> int:\n    pass\n", EntityKind::Procedure)
            .unwrap_err();
        assert!(err.contains("session"));
    }

    #[test]
    fn function_rejects_session() {
        let err = parse_handler(
            "def handler(session: Session) -> str:\n    pass\n",
            EntityKind::Function,
        )
        .unwrap_err();
        assert!(err.contains("cannot take a session"));
    }

    #[test]
    fn missing_pieces_are_reported() {
        assert!(parse_handler("def other() -> int:\n  pass\n", EntityKind::Function)
            .unwrap_err()
            .contains("no top-level"));
        assert!(parse_handler("def handler(x: int):\n  pass\n", EntityKind::Function)
            .unwrap_err()
            .contains("return type"));
        assert!(parse_handler("def handler(x) -> int:\n  pass\n", EntityKind::Function)
            .unwrap_err()
            .contains("no type annotation"));
        assert!(parse_handler("def handler(*args: int) -> int:\n  pass\n", EntityKind::Function)
            .unwrap_err()
            .contains("variadic"));
    }

    #[test]
    fn nested_handler_is_ignored() {
        let src = "class A:\n    def handler(self) -> int:\n        return 1\n";
        assert!(parse_handler(src, EntityKind::Function).is_err());
    }

    #[test]
    fn type_mapping() {
        assert_eq!(sql_type("float").as_deref(), Some("FLOAT"));
        assert_eq!(sql_type("bytes").as_deref(), Some("BINARY"));
        assert_eq!(sql_type("Dict[str, int]").as_deref(), Some("OBJECT"));
        assert_eq!(sql_type("datetime.date").as_deref(), Some("DATE"));
        assert_eq!(sql_type("datetime").as_deref(), Some("TIMESTAMP_NTZ"));
        assert_eq!(sql_type("Decimal").as_deref(), Some("NUMBER(38, 18)"));
        assert_eq!(sql_type("str | None").as_deref(), Some("STRING"));
        assert_eq!(sql_type("typing.Optional[bool]").as_deref(), Some("BOOLEAN"));
        assert_eq!(sql_type("pd.DataFrame"), None);
        assert_eq!(sql_type("int | str"), None);
    }

    #[test]
    fn read_handler_wraps_reason_with_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("app.py");
        std::fs::write(&path, "print('no handler')\n").unwrap();
        let err = read_handler(&path, EntityKind::Function).unwrap_err();
        assert!(matches!(err, SnowdevError::InvalidHandler { .. }));
        assert!(err.to_string().contains("app.py"));
    }
}
