//! Persistent client state: a string key-value store that survives page reloads,
//! and the repository that maps the client's session onto it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::errors::AppError;
use crate::models::{Message, Session, UiFlags};

pub const USER_ID_KEY: &str = "poke_user_id";
pub const MESSAGES_KEY: &str = "poke_messages";
pub const IS_TYPING_KEY: &str = "poke_is_typing";
pub const IS_LOADING_KEY: &str = "poke_is_loading";

/// Synchronous string store, shaped after the browser's `localStorage`.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
    fn remove(&self, key: &str) -> Result<(), AppError>;
}

/// In-process store, used where no browser storage exists.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.entries.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.entries.borrow_mut().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), AppError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

/// Everything a page reload can bring back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PersistedState {
    pub session: Session,
    /// `None` when nothing usable was stored.
    pub messages: Option<Vec<Message>>,
    pub flags: UiFlags,
}

/// Explicit load/save/clear over the persisted layout.
///
/// Reads never fail: a corrupt entry is logged and that piece falls back to its default.
/// Writes report errors to the caller, which decides whether they matter.
#[derive(Clone)]
pub struct SessionRepository {
    store: Rc<dyn KeyValueStore>,
}

impl SessionRepository {
    pub fn new(store: Rc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn load(&self) -> PersistedState {
        let user_id = match self.store.get(USER_ID_KEY) {
            Ok(id) => id.filter(|id| !id.is_empty()),
            Err(e) => {
                error!("Failed to read stored user id: {e}");
                None
            }
        };
        if user_id.is_none() {
            return PersistedState::default();
        }

        let messages = self.read_json::<Vec<Message>>(MESSAGES_KEY);
        let flags = UiFlags {
            is_typing: self.read_json(IS_TYPING_KEY).unwrap_or_default(),
            is_loading: self.read_json(IS_LOADING_KEY).unwrap_or_default(),
        };
        debug!(
            "Restored session {user_id:?} with {} stored messages",
            messages.as_ref().map_or(0, Vec::len)
        );

        PersistedState { session: Session { user_id }, messages, flags }
    }

    pub fn save_user_id(&self, user_id: &str) -> Result<(), AppError> {
        self.store.set(USER_ID_KEY, user_id)
    }

    pub fn save_transcript(&self, messages: &[Message]) -> Result<(), AppError> {
        self.write_json(MESSAGES_KEY, messages)
    }

    pub fn save_flags(&self, flags: UiFlags) -> Result<(), AppError> {
        self.write_json(IS_TYPING_KEY, &flags.is_typing)?;
        self.write_json(IS_LOADING_KEY, &flags.is_loading)
    }

    /// Drops the transcript and flags but keeps the user id.
    pub fn clear_conversation(&self) -> Result<(), AppError> {
        for key in [MESSAGES_KEY, IS_TYPING_KEY, IS_LOADING_KEY] {
            self.store.remove(key)?;
        }
        Ok(())
    }

    pub fn clear_all(&self) -> Result<(), AppError> {
        self.store.remove(USER_ID_KEY)?;
        self.clear_conversation()
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                error!("Failed to read '{key}': {e}");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(source) => {
                warn!("{}", AppError::storage_parse(key, source));
                None
            }
        }
    }

    fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), AppError> {
        let raw = serde_json::to_string(value).map_err(|e| AppError::StorageWrite {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.store.set(key, &raw)
    }
}
