use poke_chat::errors::AppError;
use poke_chat::KeyValueStore;

/// `window.localStorage`, looked up on every access.
pub struct BrowserStore;

impl BrowserStore {
    fn storage() -> Result<web_sys::Storage, AppError> {
        let window = web_sys::window()
            .ok_or_else(|| AppError::StorageUnavailable("no window".to_string()))?;
        window
            .local_storage()
            .map_err(|_| AppError::StorageUnavailable("access denied".to_string()))?
            .ok_or_else(|| AppError::StorageUnavailable("not supported".to_string()))
    }
}

impl KeyValueStore for BrowserStore {
    fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Self::storage()?
            .get_item(key)
            .map_err(|_| AppError::StorageUnavailable(format!("failed to read '{key}'")))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        Self::storage()?.set_item(key, value).map_err(|e| AppError::StorageWrite {
            key: key.to_string(),
            message: format!("{e:?}"),
        })
    }

    fn remove(&self, key: &str) -> Result<(), AppError> {
        Self::storage()?.remove_item(key).map_err(|e| AppError::StorageWrite {
            key: key.to_string(),
            message: format!("{e:?}"),
        })
    }
}
