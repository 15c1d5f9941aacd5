use crate::config::{Config, PrefsBackendKind};
use crate::edit::{EditForm, WriteOutcome, WriteStep};
use crate::poller::{PollEvent, PollState, SeedBundle, SeedQuery, SourceView};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use ratatui::{layout::Rect, widgets::TableState};
use seedbank_core::{
    overlay::HoverTracker,
    view::{filter_and_sort, SortDir, SortKey, SortState},
    AgentContext, MemoryType, Seed,
};
use seedbank_storage::{
    JsonFileBackend, MemoryBackend, Persistent, PreferenceBackend, PreferenceStore, SqliteBackend,
};
use std::time::Duration;
use tracing::{info, warn};

pub const PREF_DASHBOARD_QUERY: &str = "dashboard_query";
pub const PREF_SEARCH_BUFFER: &str = "inventory_search_buffer";
pub const PREF_SORT_KEY: &str = "inventory_sort_key";
pub const PREF_SORT_DIR: &str = "inventory_sort_dir";

pub type Prefs = PreferenceStore<Box<dyn PreferenceBackend>>;

pub fn open_preferences(config: &Config) -> Prefs {
    let backend: Box<dyn PreferenceBackend> = match config.prefs_backend {
        PrefsBackendKind::Memory => Box::new(MemoryBackend::new()),
        PrefsBackendKind::File => Box::new(JsonFileBackend::open(&config.prefs_path)),
        PrefsBackendKind::Sqlite => match SqliteBackend::open(&config.prefs_path) {
            Ok(backend) => Box::new(backend),
            Err(err) => {
                warn!(
                    event = "preference_store_unavailable",
                    path = %config.prefs_path.display(),
                    error = %err
                );
                Box::new(MemoryBackend::new())
            }
        },
    };
    info!(event = "preferences_open", backend = backend.label());
    PreferenceStore::new(backend)
}

/// Side effects the event loop carries out on the app's behalf.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    SetQuery(String),
    SetMemoryFilter(Option<MemoryType>),
    Refresh,
    Save(Vec<WriteStep>),
    Quit,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    Normal,
    Filter,
    Form(EditForm),
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Connecting,
    Live,
    Offline,
}

pub struct App {
    prefs: Prefs,
    pub api_base: String,
    pub seed_poll: Duration,
    default_query: String,
    search_limit: u32,
    search_threshold: f64,
    remote_query: Persistent<String>,
    filter: Persistent<String>,
    sort_key: Persistent<SortKey>,
    sort_dir: Persistent<SortDir>,
    pub seeds: SourceView<SeedBundle>,
    pub contexts: SourceView<Vec<AgentContext>>,
    pub memory_filter: Option<MemoryType>,
    pub hover: HoverTracker<i64>,
    pub table_state: TableState,
    pub mode: Mode,
    pub pinned_detail: bool,
    pub status_note: Option<String>,
    table_body: Option<Rect>,
    header_cells: Vec<(SortKey, Rect)>,
    should_quit: bool,
    dirty: bool,
}

impl App {
    pub fn new(config: &Config, prefs: Prefs) -> Self {
        let remote_query = Persistent::load(&prefs, PREF_DASHBOARD_QUERY, config.default_query.clone());
        let filter = Persistent::load(&prefs, PREF_SEARCH_BUFFER, String::new());
        let sort_key = Persistent::load(&prefs, PREF_SORT_KEY, SortKey::Id);
        let sort_dir = Persistent::load(&prefs, PREF_SORT_DIR, SortDir::Asc);
        Self {
            prefs,
            api_base: config.api_base.clone(),
            seed_poll: config.seed_poll,
            default_query: config.default_query.clone(),
            search_limit: config.search_limit,
            search_threshold: config.search_threshold,
            remote_query,
            filter,
            sort_key,
            sort_dir,
            seeds: SourceView::default(),
            contexts: SourceView::default(),
            memory_filter: None,
            hover: HoverTracker::new(),
            table_state: TableState::default().with_selected(Some(0)),
            mode: Mode::Normal,
            pinned_detail: false,
            status_note: None,
            table_body: None,
            header_cells: Vec::new(),
            should_quit: false,
            dirty: true,
        }
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Returns whether a redraw is pending and clears the flag.
    pub fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn seed_query(&self) -> SeedQuery {
        SeedQuery {
            query: self.remote_query.value().clone(),
            limit: self.search_limit,
            threshold: self.search_threshold,
        }
    }

    pub fn remote_query(&self) -> &str {
        self.remote_query.value()
    }

    pub fn filter_text(&self) -> &str {
        self.filter.value()
    }

    pub fn sort(&self) -> SortState {
        SortState::new(*self.sort_key.value(), *self.sort_dir.value())
    }

    pub fn liveness(&self) -> Liveness {
        match (self.seeds.state(), self.seeds.snapshot()) {
            (PollState::Idle, _) => Liveness::Connecting,
            (PollState::Fetching, None) => Liveness::Connecting,
            _ if self.seeds.is_live() && self.seeds.snapshot().is_some_and(|b| b.healthy) => {
                Liveness::Live
            }
            _ => Liveness::Offline,
        }
    }

    /// Store-wide record count, not the size of the fetched page.
    pub fn total_seeds(&self) -> u64 {
        self.seeds.snapshot().map_or(0, |bundle| bundle.stats.seeds_count)
    }

    pub fn visible_rows(&self) -> Vec<&Seed> {
        match self.seeds.snapshot() {
            Some(bundle) => filter_and_sort(&bundle.seeds, self.filter.value(), self.sort()),
            None => Vec::new(),
        }
    }

    pub fn find_seed(&self, id: i64) -> Option<&Seed> {
        self.seeds
            .snapshot()
            .and_then(|bundle| bundle.seeds.iter().find(|seed| seed.id == id))
    }

    pub fn selected_seed(&self) -> Option<&Seed> {
        let idx = self.table_state.selected()?;
        self.visible_rows().get(idx).copied()
    }

    /// The record the detail overlay describes: hover wins over the pinned
    /// selection.
    pub fn detail_seed(&self) -> Option<&Seed> {
        if let Some(id) = self.hover.hovered() {
            return self.find_seed(*id);
        }
        if self.pinned_detail {
            return self.selected_seed();
        }
        None
    }

    pub fn apply_seed_event(&mut self, event: PollEvent<SeedBundle>) {
        let settled = matches!(event, PollEvent::Settled(_));
        if self.seeds.apply(event) {
            if settled {
                self.clamp_selection();
            }
            self.mark_dirty();
        }
    }

    pub fn apply_context_event(&mut self, event: PollEvent<Vec<AgentContext>>) {
        if self.contexts.apply(event) {
            self.mark_dirty();
        }
    }

    /// Stops accepting poll results. Called once on quit.
    pub fn close(&mut self) {
        self.seeds.close();
        self.contexts.close();
        self.should_quit = true;
    }

    pub fn apply_write_result(&mut self, result: Result<WriteOutcome, String>) -> Option<Action> {
        self.mark_dirty();
        match result {
            Ok(outcome) => {
                if matches!(self.mode, Mode::Form(_)) {
                    self.mode = Mode::Normal;
                }
                self.status_note = Some(outcome.note());
                outcome.needs_refresh().then_some(Action::Refresh)
            }
            Err(err) => {
                if let Mode::Form(form) = &mut self.mode {
                    form.saving = false;
                    form.error = Some(err);
                } else {
                    self.status_note = Some(err);
                }
                None
            }
        }
    }

    pub fn update_layout(&mut self, table_body: Rect, header_cells: Vec<(SortKey, Rect)>) {
        self.table_body = Some(table_body);
        self.header_cells = header_cells;
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> Option<Action> {
        self.mark_dirty();
        match self.mode {
            Mode::Filter => self.handle_filter_key(key),
            Mode::Form(_) => self.handle_form_key(key),
            Mode::Help => {
                if matches!(key.code, KeyCode::Esc | KeyCode::Char('?') | KeyCode::Char('q')) {
                    self.mode = Mode::Normal;
                }
                None
            }
            Mode::Normal => self.handle_normal_key(key),
        }
    }

    fn handle_normal_key(&mut self, key: KeyEvent) -> Option<Action> {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            return match key.code {
                KeyCode::Char('c') => self.quit(),
                KeyCode::Char('u') => self.clear_query(),
                _ => None,
            };
        }
        match key.code {
            KeyCode::Char('q') => self.quit(),
            KeyCode::Char('?') => {
                self.mode = Mode::Help;
                None
            }
            KeyCode::Char('r') => {
                self.status_note = Some("Refreshing…".to_string());
                Some(Action::Refresh)
            }
            KeyCode::Char('/') => {
                self.mode = Mode::Filter;
                None
            }
            KeyCode::Char(ch @ '1'..='6') => {
                let idx = ch as usize - '1' as usize;
                self.toggle_sort(SortKey::COLUMNS[idx]);
                None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.move_selection(1);
                None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.move_selection(-1);
                None
            }
            KeyCode::Enter => {
                self.pinned_detail = !self.pinned_detail;
                None
            }
            KeyCode::Char('e') => {
                if let Some(seed) = self.selected_seed() {
                    self.mode = Mode::Form(EditForm::for_seed(seed));
                    self.pinned_detail = false;
                }
                None
            }
            KeyCode::Char('n') => {
                self.mode = Mode::Form(EditForm::blank());
                None
            }
            KeyCode::Char('m') => {
                self.memory_filter = MemoryType::cycle(self.memory_filter);
                Some(Action::SetMemoryFilter(self.memory_filter))
            }
            KeyCode::Esc => {
                self.pinned_detail = false;
                self.status_note = None;
                None
            }
            _ => None,
        }
    }

    fn handle_filter_key(&mut self, key: KeyEvent) -> Option<Action> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('u') if ctrl => {
                self.filter.set(&mut self.prefs, String::new());
                self.clamp_selection();
                None
            }
            KeyCode::Char(ch) if !ctrl => {
                self.filter.update(&mut self.prefs, |buffer| buffer.push(ch));
                self.clamp_selection();
                None
            }
            KeyCode::Backspace => {
                self.filter.update(&mut self.prefs, |buffer| {
                    buffer.pop();
                });
                self.clamp_selection();
                None
            }
            KeyCode::Enter => {
                self.mode = Mode::Normal;
                self.submit_query()
            }
            KeyCode::Esc => {
                self.mode = Mode::Normal;
                None
            }
            _ => None,
        }
    }

    fn handle_form_key(&mut self, key: KeyEvent) -> Option<Action> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let Mode::Form(form) = &mut self.mode else {
            return None;
        };
        if form.saving {
            return None;
        }
        match key.code {
            KeyCode::Esc => {
                self.mode = Mode::Normal;
                None
            }
            KeyCode::Char('s') if ctrl => self.save_form(),
            KeyCode::Char('u') if ctrl => {
                form.clear_field();
                None
            }
            KeyCode::Enter if form.focus + 1 == form.fields.len() => self.save_form(),
            KeyCode::Tab | KeyCode::Down | KeyCode::Enter => {
                form.focus_next();
                None
            }
            KeyCode::BackTab | KeyCode::Up => {
                form.focus_prev();
                None
            }
            KeyCode::Backspace => {
                form.pop_char();
                None
            }
            KeyCode::Char(ch) if !ctrl => {
                form.push_char(ch);
                None
            }
            _ => None,
        }
    }

    fn save_form(&mut self) -> Option<Action> {
        let Mode::Form(form) = &mut self.mode else {
            return None;
        };
        match form.plan() {
            Err(err) => {
                form.error = Some(err);
                None
            }
            Ok(steps) if steps.is_empty() => {
                self.mode = Mode::Normal;
                self.status_note = Some(WriteOutcome::Unchanged.note());
                None
            }
            Ok(steps) => {
                form.saving = true;
                form.error = None;
                Some(Action::Save(steps))
            }
        }
    }

    /// The filter buffer becomes the remote query; blank means the default.
    fn submit_query(&mut self) -> Option<Action> {
        let trimmed = self.filter.value().trim();
        let query = if trimmed.is_empty() {
            self.default_query.clone()
        } else {
            trimmed.to_string()
        };
        self.remote_query.set(&mut self.prefs, query.clone());
        Some(Action::SetQuery(query))
    }

    fn clear_query(&mut self) -> Option<Action> {
        self.filter.set(&mut self.prefs, String::new());
        self.clamp_selection();
        self.submit_query()
    }

    fn quit(&mut self) -> Option<Action> {
        self.close();
        Some(Action::Quit)
    }

    fn toggle_sort(&mut self, column: SortKey) {
        let next = self.sort().toggle(column);
        self.sort_key.set(&mut self.prefs, next.key);
        self.sort_dir.set(&mut self.prefs, next.dir);
    }

    fn move_selection(&mut self, delta: i64) {
        let len = self.visible_rows().len();
        if len == 0 {
            self.table_state.select(None);
            return;
        }
        let current = self.table_state.selected().unwrap_or(0) as i64;
        let next = (current + delta).clamp(0, len as i64 - 1);
        self.table_state.select(Some(next as usize));
    }

    fn clamp_selection(&mut self) {
        let len = self.visible_rows().len();
        let selected = match self.table_state.selected() {
            _ if len == 0 => None,
            Some(idx) => Some(idx.min(len - 1)),
            None => Some(0),
        };
        self.table_state.select(selected);
    }

    pub fn handle_mouse(&mut self, event: MouseEvent) {
        match event.kind {
            MouseEventKind::Moved | MouseEventKind::Drag(_) => {
                self.update_hover(event.column, event.row);
            }
            MouseEventKind::Down(MouseButton::Left) => {
                if let Some(column) = self.header_at(event.column, event.row) {
                    self.toggle_sort(column);
                } else if let Some(idx) = self.row_at(event.column, event.row) {
                    self.table_state.select(Some(idx));
                }
            }
            MouseEventKind::ScrollDown => self.move_selection(1),
            MouseEventKind::ScrollUp => self.move_selection(-1),
            _ => return,
        }
        self.mark_dirty();
    }

    fn update_hover(&mut self, column: u16, row: u16) {
        self.hover.move_to(i32::from(column), i32::from(row));
        let hovered = self
            .row_at(column, row)
            .and_then(|idx| self.visible_rows().get(idx).map(|seed| seed.id));
        match hovered {
            Some(id) => self.hover.enter(id),
            None => self.hover.leave(),
        }
    }

    fn header_at(&self, column: u16, row: u16) -> Option<SortKey> {
        self.header_cells
            .iter()
            .find(|(_, rect)| within(*rect, column, row))
            .map(|(key, _)| *key)
    }

    fn row_at(&self, column: u16, row: u16) -> Option<usize> {
        let body = self.table_body?;
        if !within(body, column, row) {
            return None;
        }
        let idx = self.table_state.offset() + usize::from(row - body.y);
        (idx < self.visible_rows().len()).then_some(idx)
    }
}

fn within(rect: Rect, column: u16, row: u16) -> bool {
    column >= rect.x && column < rect.right() && row >= rect.y && row < rect.bottom()
}
