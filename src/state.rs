use crate::admission::VoteAdmission;
use crate::store::EventStore;

#[derive(Debug, Clone)]
pub struct AppState {
    pub store: EventStore,
    pub admission: VoteAdmission,
}

impl AppState {
    pub fn new(store: EventStore) -> Self {
        Self {
            admission: VoteAdmission::new(store.clone()),
            store,
        }
    }
}
