use serde::Serialize;
use snowdev_core::session::{EnvironmentInfo, PutResult};

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// A result printed as one line of an aligned listing.
pub trait Tabular {
    const COLUMNS: &'static [&'static str];

    fn cells(&self) -> Vec<String>;
}

impl Tabular for PutResult {
    const COLUMNS: &'static [&'static str] = &["SOURCE", "TARGET", "STATUS"];

    fn cells(&self) -> Vec<String> {
        vec![self.source.clone(), self.target.clone(), self.status.clone()]
    }
}

/// One line of `snowdev info`.
pub struct Setting<'a> {
    pub name: &'static str,
    pub value: &'a str,
}

impl Tabular for Setting<'_> {
    const COLUMNS: &'static [&'static str] = &["SETTING", "VALUE"];

    fn cells(&self) -> Vec<String> {
        vec![self.name.to_string(), self.value.to_string()]
    }
}

pub fn settings(info: &EnvironmentInfo) -> Vec<Setting<'_>> {
    [
        ("user", &info.user),
        ("role", &info.role),
        ("database", &info.database),
        ("schema", &info.schema),
        ("warehouse", &info.warehouse),
        ("version", &info.version),
    ]
    .into_iter()
    .map(|(name, value)| Setting { name, value })
    .collect()
}

/// Header, rule, then one line per row. Columns are padded to their widest
/// cell except the last, so lines carry no trailing blanks.
pub fn render<T: Tabular>(rows: &[T]) -> String {
    let body: Vec<Vec<String>> = rows.iter().map(Tabular::cells).collect();
    let mut widths: Vec<usize> = T::COLUMNS.iter().map(|c| c.chars().count()).collect();
    for row in &body {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let header: Vec<String> = T::COLUMNS.iter().map(|c| c.to_string()).collect();
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    let mut out = String::new();
    for line in [header, rule].into_iter().chain(body) {
        out.push_str(&aligned(&line, &widths));
        out.push('\n');
    }
    out
}

fn aligned(cells: &[String], widths: &[usize]) -> String {
    let last = cells.len().saturating_sub(1);
    cells
        .iter()
        .zip(widths)
        .enumerate()
        .map(|(i, (cell, &width))| {
            if i == last {
                cell.clone()
            } else {
                format!("{cell:<width$}")
            }
        })
        .collect::<Vec<_>>()
        .join("  ")
}

pub fn print_table<T: Tabular>(rows: &[T]) {
    print!("{}", render(rows));
}
