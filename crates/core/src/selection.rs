//! Dashboard selection: current project, key under edit, multi-selection and active filter.

use std::collections::BTreeSet;

use parking_lot::Mutex;

use crate::filters::KeyFilter;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    pub current_project: Option<String>,
    pub editing_key: Option<String>,
    pub selected_keys: BTreeSet<String>,
    pub filter: KeyFilter,
}

#[derive(Debug, Default)]
pub struct SelectionStore {
    state: Mutex<SelectionState>,
}

impl SelectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> SelectionState {
        self.state.lock().clone()
    }

    pub fn current_project(&self) -> Option<String> {
        self.state.lock().current_project.clone()
    }

    /// Switching project drops the key selection and any edit in progress.
    pub fn select_project(&self, project_id: Option<&str>) {
        let mut state = self.state.lock();
        if state.current_project.as_deref() == project_id {
            return;
        }
        state.current_project = project_id.map(str::to_string);
        state.editing_key = None;
        state.selected_keys.clear();
    }

    pub fn start_editing(&self, key_id: &str) {
        self.state.lock().editing_key = Some(key_id.to_string());
    }

    pub fn stop_editing(&self) {
        self.state.lock().editing_key = None;
    }

    /// Returns whether the key is selected afterwards.
    pub fn toggle_key(&self, key_id: &str) -> bool {
        let mut state = self.state.lock();
        if state.selected_keys.remove(key_id) {
            false
        } else {
            state.selected_keys.insert(key_id.to_string());
            true
        }
    }

    pub fn clear_selected(&self) {
        self.state.lock().selected_keys.clear();
    }

    pub fn filter(&self) -> KeyFilter {
        self.state.lock().filter.clone()
    }

    pub fn set_filter(&self, filter: KeyFilter) {
        self.state.lock().filter = filter;
    }

    pub fn forget_key(&self, key_id: &str) {
        let mut state = self.state.lock();
        state.selected_keys.remove(key_id);
        if state.editing_key.as_deref() == Some(key_id) {
            state.editing_key = None;
        }
    }

    pub fn forget_project(&self, project_id: &str) {
        let mut state = self.state.lock();
        if state.current_project.as_deref() == Some(project_id) {
            state.current_project = None;
            state.editing_key = None;
            state.selected_keys.clear();
        }
    }
}
