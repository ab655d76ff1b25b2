//! Existence checks and argument-signature extraction for registered
//! functions and procedures.
//!
//! The platform requires the full argument type list to drop an overloaded
//! name, so the signature reported by `SHOW ... LIKE` is reduced to the text
//! between its outer parentheses: `TEMP_F(NUMBER, VARCHAR) RETURN VARCHAR`
//! becomes `NUMBER, VARCHAR`.

use crate::component::EntityKind;
use crate::error::Result;
use crate::session::{Row, Session};

fn show_statement(name: &str, kind: EntityKind) -> String {
    format!("SHOW {} LIKE '{}'", kind.show_keyword(), name)
}

/// Rows describing exactly `name`. `LIKE` treats `_` as a wildcard, so
/// `temp_F` also matches `TEMPXF`.
fn named<'a>(rows: &'a [Row], name: &'a str) -> impl Iterator<Item = &'a Row> + 'a {
    rows.iter()
        .filter(move |row| row.get("name").is_some_and(|n| n.eq_ignore_ascii_case(name)))
}

/// True if an entity of `kind` is named exactly `name`. Query failures
/// are logged and reported as "does not exist".
pub fn entity_exists(session: &mut dyn Session, name: &str, kind: EntityKind) -> bool {
    match session.sql(&show_statement(name, kind)) {
        Ok(rows) => named(&rows, name).next().is_some(),
        Err(e) => {
            tracing::warn!(entity = name, %kind, error = %e, "failed to check existence");
            false
        }
    }
}

/// The argument types of `name`, `Some("")` for a no-argument entity, or
/// `None` when the signature cannot be determined.
pub fn entity_signature(session: &mut dyn Session, name: &str, kind: EntityKind) -> Option<String> {
    let rows = match session.sql(&show_statement(name, kind)) {
        Ok(rows) => rows,
        Err(e) => {
            tracing::warn!(entity = name, %kind, error = %e, "failed to read signature");
            return None;
        }
    };
    let Some(row) = named(&rows, name).next() else {
        tracing::warn!(entity = name, %kind, "entity not found while reading signature");
        return None;
    };
    let Some(arguments) = row.get("arguments") else {
        tracing::warn!(entity = name, %kind, "metadata row has no arguments column");
        return None;
    };
    tracing::debug!(entity = name, %kind, arguments, "reported signature");
    let signature = parse_signature(arguments);
    if signature.is_none() {
        tracing::warn!(entity = name, %kind, arguments, "unparseable signature");
    }
    signature
}

/// Text inside the first balanced pair of parentheses, trimmed.
pub fn parse_signature(arguments: &str) -> Option<String> {
    let open = arguments.find('(')?;
    let mut depth = 0usize;
    for (i, c) in arguments[open..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(arguments[open + 1..open + i].trim().to_string());
                }
            }
            _ => {}
        }
    }
    None
}

pub fn drop_statement(name: &str, signature: &str, kind: EntityKind) -> String {
    format!("DROP {} {}({})", kind.sql_keyword(), name, signature)
}

pub fn drop_entity(
    session: &mut dyn Session,
    name: &str,
    signature: &str,
    kind: EntityKind,
) -> Result<()> {
    let statement = drop_statement(name, signature, kind);
    tracing::info!(%statement, "dropping");
    session.sql(&statement)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
