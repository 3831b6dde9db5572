use std::sync::Arc;

use notes_service::NoteService;

/// Shared application state.
pub struct AppState {
    pub notes: Arc<NoteService>,
}

impl AppState {
    pub fn new(notes: Arc<NoteService>) -> Self {
        Self { notes }
    }
}
