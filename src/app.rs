use std::collections::BTreeMap;

use crossterm::event::KeyCode;
use ratatui::widgets::TableState;

use crate::columns::{activate, resource_names, sort_rows, worker_columns, Column, SortDirection};
use crate::models::{ClusterData, MetricsSnapshot, Worker, WorkerRow};
use crate::refresh::Revisioned;
use crate::view::{derive_rows, utilization_by_instance, Memo, TypeFilter, UtilizationMap};

static NO_WORKERS: BTreeMap<String, Worker> = BTreeMap::new();

#[derive(Clone, Debug, PartialEq)]
struct RowsKey {
    cluster: Option<u64>,
    metrics: Option<u64>,
    filter: TypeFilter,
    sort_column: usize,
    sort_direction: SortDirection,
}

/// Main application state
pub struct App {
    pub team: String,
    pub source: String,
    pub cluster: Option<Revisioned<ClusterData>>,
    pub metrics: Option<Revisioned<MetricsSnapshot>>,
    pub filter: TypeFilter,
    pub sort_column: usize,
    pub sort_direction: SortDirection,
    pub table_state: TableState,
    /// Worker whose detail panel is open.
    pub expanded: Option<String>,
    pub status: Option<String>,
    /// Worker handed to the search-pods callback, if any.
    pub picked: Option<String>,
    pub should_quit: bool,
    pub frame_count: u64,
    selected_id: Option<String>,
    on_search_pods: Box<dyn FnMut(&str)>,
    utilization: Memo<Option<u64>, UtilizationMap>,
    columns: Memo<Option<u64>, Vec<Column>>,
    rows: Memo<RowsKey, Vec<WorkerRow>>,
}

impl App {
    pub fn new(
        team: String,
        source: String,
        filter: TypeFilter,
        on_search_pods: Box<dyn FnMut(&str)>,
    ) -> Self {
        let mut app = App {
            team,
            source,
            cluster: None,
            metrics: None,
            filter,
            sort_column: 0,
            sort_direction: SortDirection::Ascending,
            table_state: TableState::default(),
            expanded: None,
            status: None,
            picked: None,
            should_quit: false,
            frame_count: 0,
            selected_id: None,
            on_search_pods,
            utilization: Memo::new(),
            columns: Memo::new(),
            rows: Memo::new(),
        };
        app.refresh_view();
        app
    }

    pub fn apply_cluster(&mut self, cluster: Revisioned<ClusterData>) {
        self.cluster = Some(cluster);
        self.refresh_view();
    }

    /// `None` drops the previous snapshot, blanking every utilization cell.
    pub fn apply_metrics(&mut self, metrics: Option<Revisioned<MetricsSnapshot>>) {
        self.metrics = metrics;
        self.refresh_view();
    }

    /// Increment frame counter
    pub fn tick(&mut self) {
        self.frame_count += 1;
    }

    pub fn grafana(&self) -> Option<&str> {
        self.cluster
            .as_ref()
            .and_then(|c| c.value.config.grafana.as_deref())
    }

    pub fn cluster_name(&self) -> Option<&str> {
        self.cluster.as_ref().and_then(|c| c.value.config.name.as_deref())
    }

    pub fn columns(&self) -> &[Column] {
        self.columns.get().map(Vec::as_slice).unwrap_or_default()
    }

    pub fn rows(&self) -> &[WorkerRow] {
        self.rows.get().map(Vec::as_slice).unwrap_or_default()
    }

    pub fn selected_row(&self) -> Option<&WorkerRow> {
        self.table_state.selected().and_then(|i| self.rows().get(i))
    }

    pub fn expanded_row(&self) -> Option<&WorkerRow> {
        let id = self.expanded.as_deref()?;
        self.rows().iter().find(|row| row.id == id)
    }

    /// Recomputes memoized columns and rows, then re-anchors the selection.
    pub fn refresh_view(&mut self) {
        let cluster_revision = self.cluster.as_ref().map(|c| c.revision);
        let metrics_revision = self.metrics.as_ref().map(|m| m.revision);
        let workers = self
            .cluster
            .as_ref()
            .map_or(&NO_WORKERS, |c| &c.value.workers);

        let utilization = self.utilization.get_or_compute(metrics_revision, || {
            utilization_by_instance(self.metrics.as_ref().map(|m| m.value.as_ref()))
        });
        let columns = self
            .columns
            .get_or_compute(cluster_revision, || worker_columns(&resource_names(workers)));

        if self.sort_column >= columns.len() {
            self.sort_column = 0;
        }
        let key = RowsKey {
            cluster: cluster_revision,
            metrics: metrics_revision,
            filter: self.filter.clone(),
            sort_column: self.sort_column,
            sort_direction: self.sort_direction,
        };
        let (filter, sort_column, sort_direction) =
            (&self.filter, self.sort_column, self.sort_direction);
        self.rows.get_or_compute(key, || {
            let mut rows = derive_rows(workers, utilization, filter);
            if let Some(column) = columns.get(sort_column) {
                sort_rows(&mut rows, column, sort_direction);
            }
            rows
        });

        self.sync_selection();
    }

    // Keeps the same worker selected across re-derivations when it is still shown.
    fn sync_selection(&mut self) {
        let len = self.rows().len();
        if len == 0 {
            self.table_state.select(None);
            self.selected_id = None;
            return;
        }
        let index = self
            .selected_id
            .as_deref()
            .and_then(|id| self.rows().iter().position(|row| row.id == id))
            .unwrap_or_else(|| self.table_state.selected().unwrap_or(0).min(len - 1));
        self.table_state.select(Some(index));
        self.selected_id = Some(self.rows()[index].id.clone());

        if self.expanded.is_some() && self.expanded_row().is_none() {
            self.expanded = None;
        }
    }

    fn select(&mut self, index: usize) {
        self.selected_id = self.rows().get(index).map(|row| row.id.clone());
        self.sync_selection();
    }

    pub fn next_row(&mut self) {
        let len = self.rows().len();
        if len > 0 {
            let current = self.table_state.selected().unwrap_or(0);
            self.select((current + 1).min(len - 1));
        }
    }

    pub fn previous_row(&mut self) {
        let current = self.table_state.selected().unwrap_or(0);
        self.select(current.saturating_sub(1));
    }

    pub fn set_filter(&mut self, filter: TypeFilter) {
        self.filter = filter;
        self.refresh_view();
    }

    pub fn next_filter(&mut self) {
        let next = match &self.cluster {
            Some(c) => self.filter.next(&c.value.types),
            None => TypeFilter::All,
        };
        self.set_filter(next);
    }

    pub fn previous_filter(&mut self) {
        let previous = match &self.cluster {
            Some(c) => self.filter.previous(&c.value.types),
            None => TypeFilter::All,
        };
        self.set_filter(previous);
    }

    pub fn next_sort_column(&mut self) {
        let len = self.columns().len().max(1);
        self.sort_column = (self.sort_column + 1) % len;
        self.refresh_view();
    }

    pub fn flip_sort(&mut self) {
        self.sort_direction = self.sort_direction.flip();
        self.refresh_view();
    }

    /// Opens the detail panel of the selected row, or closes it if open.
    pub fn toggle_detail(&mut self) {
        let Some(id) = self.selected_row().map(|row| row.id.clone()) else {
            return;
        };
        if self.expanded.as_deref() == Some(id.as_str()) {
            self.expanded = None;
        } else {
            self.expanded = Some(id);
        }
    }

    /// Follows the identifier link of the selected row.
    pub fn activate_selected(&mut self) {
        let Some(row) = self.table_state.selected().and_then(|i| self.rows.get()?.get(i)) else {
            return;
        };
        let id = row.id.clone();
        if activate(row, &mut *self.on_search_pods) {
            self.status = Some(format!("Searching pods on {id}"));
        } else {
            self.status = Some(format!("{id} reports no health; nothing to search"));
        }
    }

    pub fn handle_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Down | KeyCode::Char('j') => self.next_row(),
            KeyCode::Up | KeyCode::Char('k') => self.previous_row(),
            KeyCode::Char('t') => self.next_filter(),
            KeyCode::Char('T') => self.previous_filter(),
            KeyCode::Char(' ') | KeyCode::Right => self.toggle_detail(),
            KeyCode::Left => self.expanded = None,
            KeyCode::Char('s') => self.next_sort_column(),
            KeyCode::Char('S') => self.flip_sort(),
            KeyCode::Enter => self.activate_selected(),
            _ => {}
        }
    }
}
