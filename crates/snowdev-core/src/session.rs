use crate::error::{Result, SnowdevError};
use serde::Serialize;
use std::path::Path;

// ---------------------------------------------------------------------------
// Row
// ---------------------------------------------------------------------------

/// One result row. Values are the platform's string renderings; SQL NULL is `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<Option<String>>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<Option<String>>) -> Self {
        Self { columns, values }
    }

    /// Column lookup, case-insensitive (`SHOW` output is lowercase, queries are not).
    pub fn get(&self, column: &str) -> Option<&str> {
        let idx = self
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))?;
        self.values.get(idx)?.as_deref()
    }

    pub fn value(&self, idx: usize) -> Option<&str> {
        self.values.get(idx)?.as_deref()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PutResult {
    pub source: String,
    pub target: String,
    pub status: String,
}

/// The platform surface snowdev needs: run a statement, stage a file.
pub trait Session {
    fn sql(&mut self, statement: &str) -> Result<Vec<Row>>;

    /// Upload `local` into `stage_path` (`@stage/sub/path`), overwriting and
    /// without compression.
    fn put(&mut self, local: &Path, stage_path: &str) -> Result<PutResult>;
}

// ---------------------------------------------------------------------------
// Environment helpers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvironmentInfo {
    pub user: String,
    pub role: String,
    pub database: String,
    pub schema: String,
    pub version: String,
    pub warehouse: String,
}

pub fn environment_info(session: &mut dyn Session) -> Result<EnvironmentInfo> {
    let rows = session.sql(
        "SELECT current_user(), current_role(), current_database(), current_schema(), \
         current_version(), current_warehouse()",
    )?;
    let row = rows
        .first()
        .ok_or_else(|| SnowdevError::UnexpectedResponse("environment query returned no rows".into()))?;
    let col = |i: usize| unquote(row.value(i).unwrap_or_default()).to_string();
    Ok(EnvironmentInfo {
        user: col(0),
        role: col(1),
        database: col(2),
        schema: col(3),
        version: col(4),
        warehouse: col(5),
    })
}

pub fn current_database(session: &mut dyn Session) -> Result<String> {
    scalar(session, "SELECT current_database()")
}

pub fn current_schema(session: &mut dyn Session) -> Result<String> {
    scalar(session, "SELECT current_schema()")
}

pub fn current_warehouse(session: &mut dyn Session) -> Result<String> {
    scalar(session, "SELECT current_warehouse()")
}

fn scalar(session: &mut dyn Session, query: &str) -> Result<String> {
    let rows = session.sql(query)?;
    rows.first()
        .and_then(|r| r.value(0))
        .map(|v| unquote(v).to_string())
        .ok_or_else(|| SnowdevError::UnexpectedResponse(format!("no value for: {query}")))
}

fn unquote(s: &str) -> &str {
    s.trim().trim_matches('"')
}

// ---------------------------------------------------------------------------
// In-memory platform for tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::{BTreeMap, HashMap, HashSet};
    use std::path::PathBuf;

    /// Simulates function/procedure registration, introspection and drops.
    /// Entity names are stored uppercased, as the platform does for
    /// unquoted identifiers.
    #[derive(Default)]
    pub struct FakePlatform {
        pub entities: BTreeMap<String, String>,
        pub log: Vec<String>,
        pub puts: Vec<(PathBuf, String)>,
        pub fail_create: HashMap<String, String>,
        pub fail_show: HashSet<String>,
        pub fail_drop: bool,
        pub arguments_override: HashMap<String, String>,
        pub canned: Vec<(String, Vec<Row>)>,
        /// Statements starting with the prefix fail with the message.
        pub failing: Vec<(String, String)>,
        /// Created with `CREATE TEMPORARY`; gone after `end_session`.
        pub temporary: HashSet<String>,
    }

    impl FakePlatform {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_rows(mut self, prefix: &str, rows: Vec<Row>) -> Self {
            self.canned.push((prefix.to_string(), rows));
            self
        }

        pub fn failing_on(mut self, prefix: &str, message: &str) -> Self {
            self.failing.push((prefix.to_string(), message.to_string()));
            self
        }

        /// Close the platform session: temporary entities disappear.
        pub fn end_session(&mut self) {
            for name in self.temporary.drain() {
                self.entities.remove(&name);
            }
        }

        pub fn exists(&self, name: &str) -> bool {
            self.entities.contains_key(&name.to_uppercase())
        }

        pub fn statements_starting_with(&self, prefix: &str) -> Vec<&String> {
            self.log.iter().filter(|s| s.starts_with(prefix)).collect()
        }

        fn error(message: impl Into<String>) -> SnowdevError {
            SnowdevError::Platform {
                code: Some("002002".to_string()),
                message: message.into(),
            }
        }

        fn create(&mut self, statement: &str) -> Result<Vec<Row>> {
            let keyword = if statement.contains(" FUNCTION ") {
                " FUNCTION "
            } else {
                " PROCEDURE "
            };
            let after = statement.split_once(keyword).map(|(_, r)| r).unwrap_or("");
            let open = after.find('(').unwrap_or(after.len());
            let name = after[..open].trim().to_uppercase();
            if let Some(message) = self.fail_create.get(&name) {
                return Err(Self::error(message.clone()));
            }
            if !statement.contains("OR REPLACE") && self.entities.contains_key(&name) {
                return Err(Self::error(format!("Object '{name}' already exists.")));
            }
            let close = after.find(")\n").unwrap_or(open);
            let types: Vec<&str> = after[(open + 1).min(close)..close]
                .split(", ")
                .filter(|p| !p.is_empty())
                .filter_map(|p| p.split_once(' ').map(|(_, t)| t))
                .collect();
            let returns = statement
                .split_once("RETURNS ")
                .and_then(|(_, r)| r.lines().next())
                .unwrap_or("STRING");
            if statement.starts_with("CREATE TEMPORARY") {
                self.temporary.insert(name.clone());
            }
            self.entities.insert(
                name.clone(),
                format!("{name}({}) RETURN {returns}", types.join(", ")),
            );
            Ok(vec![Row::new(
                vec!["status".to_string()],
                vec![Some(format!("{name} successfully created."))],
            )])
        }
    }

    impl Session for FakePlatform {
        fn sql(&mut self, statement: &str) -> Result<Vec<Row>> {
            self.log.push(statement.to_string());
            if let Some((_, message)) = self.failing.iter().find(|(p, _)| statement.starts_with(p.as_str())) {
                return Err(Self::error(message.clone()));
            }
            let registers = statement.contains(" FUNCTION ") || statement.contains(" PROCEDURE ");
            if statement.starts_with("CREATE") && registers {
                return self.create(statement);
            }
            if let Some(rest) = statement.strip_prefix("SHOW ") {
                let pattern = rest.split('\'').nth(1).unwrap_or("").to_uppercase();
                if self.fail_show.contains(&pattern) {
                    return Err(Self::error("network failure"));
                }
                let rows = self
                    .entities
                    .iter()
                    .filter(|(name, _)| like(&pattern, name))
                    .map(|(name, args)| {
                        let args = self.arguments_override.get(name).unwrap_or(args);
                        Row::new(
                            vec!["name".to_string(), "arguments".to_string()],
                            vec![Some(name.clone()), Some(args.clone())],
                        )
                    })
                    .collect();
                return Ok(rows);
            }
            if let Some(rest) = statement.strip_prefix("DROP ") {
                if self.fail_drop {
                    return Err(Self::error("insufficient privileges"));
                }
                let target = rest.split_once(' ').map(|(_, r)| r).unwrap_or("");
                let name = target.split('(').next().unwrap_or("").trim().to_uppercase();
                return match self.entities.remove(&name) {
                    Some(_) => Ok(Vec::new()),
                    None => Err(Self::error(format!("'{name}' does not exist"))),
                };
            }
            for (prefix, rows) in &self.canned {
                if statement.starts_with(prefix.as_str()) {
                    return Ok(rows.clone());
                }
            }
            Ok(Vec::new())
        }

        fn put(&mut self, local: &Path, stage_path: &str) -> Result<PutResult> {
            self.puts.push((local.to_path_buf(), stage_path.to_string()));
            Ok(PutResult {
                source: local.display().to_string(),
                target: stage_path.to_string(),
                status: "UPLOADED".to_string(),
            })
        }
    }

    /// SQL `LIKE`: `_` is any one character, `%` any run.
    fn like(pattern: &str, name: &str) -> bool {
        fn go(p: &[char], n: &[char]) -> bool {
            match p.split_first() {
                None => n.is_empty(),
                Some(('%', rest)) => (0..=n.len()).any(|i| go(rest, &n[i..])),
                Some(('_', rest)) => !n.is_empty() && go(rest, &n[1..]),
                Some((c, rest)) => n.first() == Some(c) && go(rest, &n[1..]),
            }
        }
        let p: Vec<char> = pattern.chars().collect();
        let n: Vec<char> = name.chars().collect();
        go(&p, &n)
    }

    pub fn scalar_row(value: &str) -> Row {
        Row::new(vec!["value".to_string()], vec![Some(value.to_string())])
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
