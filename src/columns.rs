//! Column layout of the workers table and the rendering seam.
//!
//! The table is described as a list of [`Column`]s that know how to turn a
//! [`WorkerRow`] into a [`Cell`]. Drawing is left to a [`TableSurface`], so the
//! same description drives the terminal renderer and the tests.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::models::{DerivedQuantities, Health, Worker, WorkerRow};

/// Capacity accounting categories shown per resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Total,
    Unschedulable,
    Used,
    Preemptable,
    Available,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 5] = [
        ResourceKind::Total,
        ResourceKind::Unschedulable,
        ResourceKind::Used,
        ResourceKind::Preemptable,
        ResourceKind::Available,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::Total => "Total",
            ResourceKind::Unschedulable => "Unschedulable",
            ResourceKind::Used => "Used",
            ResourceKind::Preemptable => "Preemptable",
            ResourceKind::Available => "Available",
        }
    }

    pub fn value(&self, quantities: &DerivedQuantities) -> Option<f64> {
        match self {
            ResourceKind::Total => quantities.total,
            ResourceKind::Unschedulable => Some(quantities.unschedulable),
            ResourceKind::Used => quantities.used,
            ResourceKind::Preemptable => quantities.preemptable,
            ResourceKind::Available => Some(quantities.available),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum ColumnKind {
    Id,
    Resource { kind: ResourceKind, resource: String },
    GpuUtilization,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub title: String,
    pub kind: ColumnKind,
    pub numeric: bool,
}

/// What a surface should draw for one (row, column) pair.
#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    /// Activatable worker identifier; `warning` marks an unhealthy worker.
    Link { text: String, warning: bool },
    Text(String),
    /// Right-aligned value, empty when there is nothing to show.
    Numeric(String),
}

#[derive(Clone, Debug, PartialEq)]
enum SortValue<'a> {
    Text(&'a str),
    Number(f64),
}

impl Column {
    pub fn id() -> Self {
        Self {
            title: "Worker".to_string(),
            kind: ColumnKind::Id,
            numeric: false,
        }
    }

    pub fn resource(kind: ResourceKind, resource: &str) -> Self {
        Self {
            title: format!("{} {}", kind.name(), resource_label(resource)),
            kind: ColumnKind::Resource {
                kind,
                resource: resource.to_string(),
            },
            numeric: true,
        }
    }

    pub fn gpu_utilization() -> Self {
        Self {
            title: "GPU Utilization".to_string(),
            kind: ColumnKind::GpuUtilization,
            numeric: true,
        }
    }

    pub fn cell(&self, row: &WorkerRow) -> Cell {
        match &self.kind {
            ColumnKind::Id => match row.healthy {
                Health::Healthy => Cell::Link {
                    text: row.id.clone(),
                    warning: false,
                },
                Health::Unhealthy => Cell::Link {
                    text: row.id.clone(),
                    warning: true,
                },
                Health::Unknown => Cell::Text(row.id.clone()),
            },
            ColumnKind::Resource { .. } => {
                Cell::Numeric(self.number(row).map(format_quantity).unwrap_or_default())
            }
            ColumnKind::GpuUtilization => Cell::Numeric(format_utilization(row.gpu_utilization)),
        }
    }

    fn number(&self, row: &WorkerRow) -> Option<f64> {
        match &self.kind {
            ColumnKind::Id => None,
            ColumnKind::Resource { kind, resource } => {
                row.status.get(resource).and_then(|q| kind.value(q))
            }
            ColumnKind::GpuUtilization => row.gpu_utilization,
        }
    }

    fn sort_value<'a>(&self, row: &'a WorkerRow) -> Option<SortValue<'a>> {
        match &self.kind {
            ColumnKind::Id => Some(SortValue::Text(&row.id)),
            _ => self.number(row).map(SortValue::Number),
        }
    }
}

fn resource_label(resource: &str) -> String {
    match resource {
        "cpu" | "gpu" => resource.to_uppercase(),
        "memory" => "Memory".to_string(),
        other => other.to_string(),
    }
}

/// One column per (kind, resource) pair, grouped by kind.
pub fn resource_columns(kinds: &[ResourceKind], resources: &[String]) -> Vec<Column> {
    kinds
        .iter()
        .flat_map(|kind| {
            resources
                .iter()
                .map(move |resource| Column::resource(*kind, resource))
        })
        .collect()
}

/// Union of resource names reported by any worker, in name order.
pub fn resource_names(workers: &BTreeMap<String, Worker>) -> Vec<String> {
    workers
        .values()
        .flat_map(|worker| worker.status.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Full column list: identifier, resource columns, GPU utilization.
pub fn worker_columns(resources: &[String]) -> Vec<Column> {
    let mut columns = vec![Column::id()];
    columns.extend(resource_columns(&ResourceKind::ALL, resources));
    columns.push(Column::gpu_utilization());
    columns
}

/// A drawing backend for the workers table.
pub trait TableSurface {
    fn describe_columns(&mut self, columns: &[Column]);
    fn render_row(&mut self, row: &WorkerRow, cells: Vec<Cell>);
}

pub fn render_table<S: TableSurface + ?Sized>(
    surface: &mut S,
    columns: &[Column],
    rows: &[WorkerRow],
) {
    surface.describe_columns(columns);
    for row in rows {
        let cells = columns.iter().map(|column| column.cell(row)).collect();
        surface.render_row(row, cells);
    }
}

/// Follows the identifier link of `row`.
///
/// Returns `false` without calling `on_search_pods` when the worker reports no
/// health, since its identifier is rendered as plain text.
pub fn activate(row: &WorkerRow, on_search_pods: &mut dyn FnMut(&str)) -> bool {
    if !row.healthy.is_known() {
        return false;
    }
    on_search_pods(&row.id);
    true
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn flip(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }

    pub fn arrow(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "▲",
            SortDirection::Descending => "▼",
        }
    }
}

/// Stable sort by `column`; blank cells stay at the bottom either way.
pub fn sort_rows(rows: &mut [WorkerRow], column: &Column, direction: SortDirection) {
    rows.sort_by(|a, b| match (column.sort_value(a), column.sort_value(b)) {
        (Some(x), Some(y)) => {
            let ordering = match (x, y) {
                (SortValue::Number(x), SortValue::Number(y)) => x.total_cmp(&y),
                (SortValue::Text(x), SortValue::Text(y)) => x.cmp(y),
                _ => Ordering::Equal,
            };
            match direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

/// Two significant digits with a percent sign; blank when absent.
pub fn format_utilization(value: Option<f64>) -> String {
    value
        .map(|v| format!("{}%", to_precision(v, 2)))
        .unwrap_or_default()
}

pub fn format_quantity(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let text = format!("{:.2}", value);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Formats `value` with `precision` significant digits, switching to
/// exponent notation when the exponent is below -6 or at least `precision`
/// (the ECMAScript `Number.prototype.toPrecision` layout).
pub fn to_precision(value: f64, precision: usize) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    let precision = precision.max(1);
    if value == 0.0 {
        return if precision == 1 {
            "0".to_string()
        } else {
            format!("0.{}", "0".repeat(precision - 1))
        };
    }

    let sign = if value < 0.0 { "-" } else { "" };
    let (digits, exponent) = significant_digits(value.abs(), precision);

    let body = if exponent < -6 || exponent >= precision as i32 {
        let (lead, rest) = digits.split_at(1);
        let mantissa = if rest.is_empty() {
            lead.to_string()
        } else {
            format!("{lead}.{rest}")
        };
        let exp_sign = if exponent < 0 { '-' } else { '+' };
        format!("{mantissa}e{exp_sign}{}", exponent.abs())
    } else if exponent >= 0 {
        let split = exponent as usize + 1;
        if split >= digits.len() {
            digits
        } else {
            format!("{}.{}", &digits[..split], &digits[split..])
        }
    } else {
        format!("0.{}{}", "0".repeat((-exponent - 1) as usize), digits)
    };
    format!("{sign}{body}")
}

/// The first `precision` decimal digits of a positive finite `value` and the
/// decimal exponent of the first one. Halfway cases round away from zero.
fn significant_digits(value: f64, precision: usize) -> (String, i32) {
    // 1100 places hold the exact expansion of any f64, so a tie is seen as one.
    let exact = format!("{:.1100e}", value);
    let (mantissa, exponent) = exact.split_once('e').unwrap_or((exact.as_str(), "0"));
    let mut exponent: i32 = exponent.parse().unwrap_or(0);
    let all: Vec<u8> = mantissa.bytes().filter(u8::is_ascii_digit).collect();

    let mut digits = all[..precision.min(all.len())].to_vec();
    let round_up = all.get(precision).is_some_and(|d| *d >= b'5');
    if round_up {
        let mut carry = true;
        for digit in digits.iter_mut().rev() {
            if *digit == b'9' {
                *digit = b'0';
            } else {
                *digit += 1;
                carry = false;
                break;
            }
        }
        if carry {
            digits.insert(0, b'1');
            digits.truncate(precision);
            exponent += 1;
        }
    }
    (String::from_utf8_lossy(&digits).into_owned(), exponent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Quantities;

    fn row(id: &str, healthy: Health, gpu_used: Option<f64>, util: Option<f64>) -> WorkerRow {
        let mut status = BTreeMap::new();
        if let Some(used) = gpu_used {
            status.insert(
                "gpu".to_string(),
                DerivedQuantities::from(&Quantities {
                    total: Some(8.0),
                    allocatable: Some(8.0),
                    used: Some(used),
                    preemptable: None,
                }),
            );
        }
        WorkerRow {
            id: id.to_string(),
            ip: Some("10.0.0.1".to_string()),
            worker_type: Some("p40".to_string()),
            healthy,
            status,
            gpu_utilization: util,
        }
    }

    #[derive(Default)]
    struct RecordingSurface {
        titles: Vec<String>,
        rows: Vec<(String, Vec<Cell>)>,
    }

    impl TableSurface for RecordingSurface {
        fn describe_columns(&mut self, columns: &[Column]) {
            self.titles = columns.iter().map(|c| c.title.clone()).collect();
        }

        fn render_row(&mut self, row: &WorkerRow, cells: Vec<Cell>) {
            self.rows.push((row.id.clone(), cells));
        }
    }

    #[test]
    fn test_to_precision() {
        assert_eq!(to_precision(45.678, 2), "46");
        assert_eq!(to_precision(5.4321, 2), "5.4");
        assert_eq!(to_precision(0.0, 2), "0.0");
        assert_eq!(to_precision(100.0, 2), "1.0e+2");
        assert_eq!(to_precision(99.96, 2), "1.0e+2");
        assert_eq!(to_precision(0.05, 2), "0.050");
        assert_eq!(to_precision(0.0000001234, 2), "1.2e-7");
        assert_eq!(to_precision(-3.14159, 3), "-3.14");
        assert_eq!(to_precision(f64::NAN, 2), "NaN");
    }

    #[test]
    fn test_to_precision_rounds_ties_up() {
        assert_eq!(to_precision(12.5, 2), "13");
        assert_eq!(to_precision(62.5, 2), "63");
        assert_eq!(to_precision(0.125, 2), "0.13");
        assert_eq!(to_precision(2.25, 2), "2.3");
        assert_eq!(to_precision(-2.25, 2), "-2.3");
        assert_eq!(to_precision(99.5, 2), "1.0e+2");
        // 0.35 is stored just below the midpoint.
        assert_eq!(to_precision(0.35, 1), "0.3");
    }

    #[test]
    fn test_format_utilization() {
        assert_eq!(format_utilization(Some(45.678)), "46%");
        assert_eq!(format_utilization(Some(0.0)), "0.0%");
        assert_eq!(format_utilization(None), "");
    }

    #[test]
    fn test_format_quantity() {
        assert_eq!(format_quantity(4.0), "4");
        assert_eq!(format_quantity(-2.0), "-2");
        assert_eq!(format_quantity(1.5), "1.5");
        assert_eq!(format_quantity(0.126), "0.13");
    }

    #[test]
    fn test_worker_columns_layout() {
        let columns = worker_columns(&["cpu".to_string(), "gpu".to_string()]);
        assert_eq!(columns.len(), 1 + 5 * 2 + 1);
        assert_eq!(columns[0].kind, ColumnKind::Id);
        assert_eq!(columns[1].title, "Total CPU");
        assert_eq!(columns[2].title, "Total GPU");
        assert_eq!(columns[3].title, "Unschedulable CPU");
        assert_eq!(columns[10].title, "Available GPU");
        assert_eq!(columns[11].kind, ColumnKind::GpuUtilization);
    }

    #[test]
    fn test_resource_names_is_union_of_status_keys() {
        let mut a = Worker::default();
        a.status.insert("gpu".to_string(), Quantities::default());
        let mut b = Worker::default();
        b.status.insert("cpu".to_string(), Quantities::default());
        b.status.insert("gpu".to_string(), Quantities::default());
        let workers = BTreeMap::from([("a".to_string(), a), ("b".to_string(), b)]);

        assert_eq!(resource_names(&workers), vec!["cpu", "gpu"]);
    }

    #[test]
    fn test_id_cell_reflects_health() {
        let id = Column::id();
        assert_eq!(
            id.cell(&row("n1", Health::Healthy, None, None)),
            Cell::Link {
                text: "n1".to_string(),
                warning: false
            }
        );
        assert_eq!(
            id.cell(&row("n2", Health::Unhealthy, None, None)),
            Cell::Link {
                text: "n2".to_string(),
                warning: true
            }
        );
        assert_eq!(
            id.cell(&row("n3", Health::Unknown, None, None)),
            Cell::Text("n3".to_string())
        );
    }

    #[test]
    fn test_resource_cell_values() {
        let r = row("n1", Health::Healthy, Some(3.0), None);
        assert_eq!(
            Column::resource(ResourceKind::Available, "gpu").cell(&r),
            Cell::Numeric("5".to_string())
        );
        assert_eq!(
            Column::resource(ResourceKind::Unschedulable, "gpu").cell(&r),
            Cell::Numeric("0".to_string())
        );
        assert_eq!(
            Column::resource(ResourceKind::Preemptable, "gpu").cell(&r),
            Cell::Numeric(String::new())
        );
        assert_eq!(
            Column::resource(ResourceKind::Total, "cpu").cell(&r),
            Cell::Numeric(String::new())
        );
    }

    #[test]
    fn test_render_table_drives_surface() {
        let rows = vec![
            row("n1", Health::Healthy, Some(3.0), Some(12.34)),
            row("n2", Health::Unknown, Some(1.0), None),
        ];
        let columns = worker_columns(&["gpu".to_string()]);
        let mut surface = RecordingSurface::default();

        render_table(&mut surface, &columns, &rows);

        assert_eq!(surface.titles.len(), columns.len());
        assert_eq!(surface.rows.len(), 2);
        assert_eq!(surface.rows[0].0, "n1");
        assert_eq!(
            surface.rows[0].1.last(),
            Some(&Cell::Numeric("12%".to_string()))
        );
        assert_eq!(surface.rows[1].1[0], Cell::Text("n2".to_string()));
        assert_eq!(
            surface.rows[1].1.last(),
            Some(&Cell::Numeric(String::new()))
        );
    }

    #[test]
    fn test_activate_calls_back_once_with_id() {
        let mut calls = Vec::new();
        let activated = activate(&row("n1", Health::Unhealthy, None, None), &mut |q: &str| {
            calls.push(q.to_string())
        });
        assert!(activated);
        assert_eq!(calls, vec!["n1".to_string()]);
    }

    #[test]
    fn test_activate_ignores_unknown_health() {
        let mut calls = 0;
        let activated = activate(&row("n1", Health::Unknown, None, None), &mut |_: &str| {
            calls += 1
        });
        assert!(!activated);
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_sort_rows_numeric_with_blanks_last() {
        let mut rows = vec![
            row("a", Health::Healthy, None, None),
            row("b", Health::Healthy, None, Some(80.0)),
            row("c", Health::Healthy, None, Some(20.0)),
        ];
        let column = Column::gpu_utilization();

        sort_rows(&mut rows, &column, SortDirection::Ascending);
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);

        sort_rows(&mut rows, &column, SortDirection::Descending);
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_sort_rows_by_id() {
        let mut rows = vec![
            row("b", Health::Healthy, None, None),
            row("a", Health::Healthy, None, None),
        ];
        sort_rows(&mut rows, &Column::id(), SortDirection::Descending);
        assert_eq!(rows[0].id, "b");
        sort_rows(&mut rows, &Column::id(), SortDirection::Ascending);
        assert_eq!(rows[0].id, "a");
    }
}
