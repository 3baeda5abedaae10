// HTTP mutation surface

mod mutations;

pub use mutations::{create_router, AppState};
