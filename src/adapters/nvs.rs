//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`StoragePort`], [`ConfigPort`] and [`CounterPort`] for the
//! pinpad.
//!
//! | Namespace | Key        | Contents                               |
//! |-----------|------------|----------------------------------------|
//! | `pinpad`  | `config`   | postcard-encoded [`PinpadConfig`]      |
//! | `pinpad`  | `hotp_ctr` | HOTP counter, 4 bytes little-endian    |
//! | `auth`    | `otp_secret` | shared secret (ASCII)                |
//!
//! # Security
//!
//! - Config validation: all fields are range-checked before persistence.
//! - The secret never enters the config blob; it lives in the `auth`
//!   namespace, which sits on the encrypted NVS partition on ESP32.  The
//!   simulation backend uses plaintext (dev/test only).
//! - Atomic writes: ESP-IDF NVS commits are atomic per `nvs_commit()`.

use crate::app::ports::{ConfigError, ConfigPort, CounterPort, StorageError, StoragePort};
use crate::config::PinpadConfig;
use log::{info, warn};

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

const PINPAD_NAMESPACE: &str = "pinpad";
const CONFIG_KEY: &str = "config";
const COUNTER_KEY: &str = "hotp_ctr";

const CRED_NAMESPACE: &str = "auth";
const SECRET_KEY: &str = "otp_secret";

/// Upper bound for any blob we read back.
#[cfg(target_os = "espidf")]
const MAX_BLOB_SIZE: usize = 2048;
/// Longest secret accepted from storage.
const MAX_SECRET_LEN: usize = 128;

pub struct NvsAdapter {
    #[cfg(not(target_os = "espidf"))]
    store: HashMap<String, Vec<u8>>,
}

impl NvsAdapter {
    /// Create a new NvsAdapter and initialise NVS flash.
    ///
    /// On first boot or after a version mismatch the NVS partition is
    /// erased and re-initialised automatically.
    pub fn new() -> Result<Self, StorageError> {
        #[cfg(target_os = "espidf")]
        {
            // SAFETY: nvs_flash_init / nvs_flash_erase are called from the
            // single main-task context before any concurrent NVS access.
            let ret = unsafe { nvs_flash_init() };
            if ret == ESP_ERR_NVS_NO_FREE_PAGES || ret == ESP_ERR_NVS_NEW_VERSION_FOUND {
                warn!("NVS: erasing and re-initialising flash partition");
                if unsafe { nvs_flash_erase() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
                if unsafe { nvs_flash_init() } != ESP_OK {
                    return Err(StorageError::IoError);
                }
            } else if ret != ESP_OK {
                return Err(StorageError::IoError);
            }
            info!("NvsAdapter: ESP-IDF NVS initialised");
            Ok(Self {})
        }

        #[cfg(not(target_os = "espidf"))]
        {
            info!("NvsAdapter: simulation backend");
            Ok(Self {
                store: HashMap::new(),
            })
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }

    /// NUL-terminated copy of a namespace or key (NVS limit: 15 chars).
    #[cfg(target_os = "espidf")]
    fn c_name(name: &str) -> [u8; 16] {
        let mut buf = [0u8; 16];
        let bytes = name.as_bytes();
        let len = bytes.len().min(15);
        buf[..len].copy_from_slice(&bytes[..len]);
        buf
    }

    /// Open an NVS namespace, execute a closure with the handle, then close.
    #[cfg(target_os = "espidf")]
    fn with_nvs_handle<F, T>(namespace: &str, write: bool, f: F) -> Result<T, i32>
    where
        F: FnOnce(nvs_handle_t) -> Result<T, i32>,
    {
        let ns = Self::c_name(namespace);
        let mut handle: nvs_handle_t = 0;
        let mode = if write {
            nvs_open_mode_t_NVS_READWRITE
        } else {
            nvs_open_mode_t_NVS_READONLY
        };

        // SAFETY: `ns` is NUL-terminated and outlives the call.
        let ret = unsafe { nvs_open(ns.as_ptr().cast(), mode, &mut handle) };
        if ret != ESP_OK {
            return Err(ret);
        }

        let result = f(handle);
        // SAFETY: `handle` was opened above and is not used afterwards.
        unsafe {
            nvs_close(handle);
        }
        result
    }

    /// Read a whole blob, sized by a first length query.
    fn read_blob(&self, namespace: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .get(&Self::composite_key(namespace, key))
                .cloned()
                .ok_or(StorageError::NotFound)
        }

        #[cfg(target_os = "espidf")]
        {
            let k = Self::c_name(key);
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let mut size: usize = 0;
                // SAFETY: a null buffer asks NVS for the stored length only.
                let ret = unsafe {
                    nvs_get_blob(handle, k.as_ptr().cast(), core::ptr::null_mut(), &mut size)
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                if size == 0 || size > MAX_BLOB_SIZE {
                    return Err(ESP_ERR_NVS_INVALID_LENGTH);
                }
                let mut buf = vec![0u8; size];
                // SAFETY: `buf` holds exactly `size` bytes.
                let ret = unsafe {
                    nvs_get_blob(handle, k.as_ptr().cast(), buf.as_mut_ptr().cast(), &mut size)
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                buf.truncate(size);
                Ok(buf)
            });
            result.map_err(map_esp_err)
        }
    }
}

#[cfg(target_os = "espidf")]
fn map_esp_err(e: i32) -> StorageError {
    match e {
        ESP_ERR_NVS_NOT_FOUND => StorageError::NotFound,
        ESP_ERR_NVS_NOT_ENOUGH_SPACE => StorageError::Full,
        ESP_ERR_NVS_INVALID_LENGTH => StorageError::Corrupted,
        _ => StorageError::IoError,
    }
}

// ── Configuration ──────────────────────────────────────────────────

impl ConfigPort for NvsAdapter {
    fn load(&self) -> Result<PinpadConfig, ConfigError> {
        let bytes = match self.read_blob(PINPAD_NAMESPACE, CONFIG_KEY) {
            Ok(b) => b,
            Err(StorageError::NotFound) => return Err(ConfigError::NotFound),
            Err(e) => {
                warn!("NvsAdapter: config read failed: {}", e);
                return Err(ConfigError::IoError);
            }
        };
        let mut cfg: PinpadConfig =
            postcard::from_bytes(&bytes).map_err(|_| ConfigError::Corrupted)?;

        match self.read_credential(SECRET_KEY) {
            Ok(secret) => {
                cfg.secret = String::from_utf8(secret).map_err(|_| ConfigError::Corrupted)?;
            }
            Err(StorageError::NotFound) => {}
            Err(_) => return Err(ConfigError::IoError),
        }

        info!("NvsAdapter: loaded config ({} bytes)", bytes.len());
        Ok(cfg)
    }

    fn save(&mut self, config: &PinpadConfig) -> Result<(), ConfigError> {
        config.validate()?;

        let bytes = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
        self.write(PINPAD_NAMESPACE, CONFIG_KEY, &bytes)
            .map_err(|_| ConfigError::IoError)?;

        let secret = if config.secret.is_empty() {
            self.delete_credential(SECRET_KEY)
        } else {
            self.store_credential(SECRET_KEY, config.secret.as_bytes())
        };
        secret.map_err(|_| ConfigError::IoError)?;

        info!("NvsAdapter: config saved ({} bytes)", bytes.len());
        Ok(())
    }
}

// ── HOTP counter ───────────────────────────────────────────────────

impl CounterPort for NvsAdapter {
    fn load_counter(&self) -> Result<Option<u32>, StorageError> {
        let mut buf = [0u8; 4];
        match self.read(PINPAD_NAMESPACE, COUNTER_KEY, &mut buf) {
            Ok(4) => Ok(Some(u32::from_le_bytes(buf))),
            Ok(_) => Err(StorageError::Corrupted),
            Err(StorageError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn save_counter(&mut self, value: u32) -> Result<(), StorageError> {
        self.write(PINPAD_NAMESPACE, COUNTER_KEY, &value.to_le_bytes())
    }
}

// ── Raw key-value access ───────────────────────────────────────────

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            match self.store.get(&Self::composite_key(namespace, key)) {
                Some(data) if data.len() > buf.len() => Err(StorageError::Corrupted),
                Some(data) => {
                    buf[..data.len()].copy_from_slice(data);
                    Ok(data.len())
                }
                None => Err(StorageError::NotFound),
            }
        }

        #[cfg(target_os = "espidf")]
        {
            let k = Self::c_name(key);
            let result = Self::with_nvs_handle(namespace, false, |handle| {
                let mut size = buf.len();
                // SAFETY: `buf` is valid for `size` bytes.
                let ret = unsafe {
                    nvs_get_blob(handle, k.as_ptr().cast(), buf.as_mut_ptr().cast(), &mut size)
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(size)
            });
            result.map_err(map_esp_err)
        }
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .insert(Self::composite_key(namespace, key), data.to_vec());
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let k = Self::c_name(key);
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                // SAFETY: `data` is valid for `data.len()` bytes.
                let ret = unsafe {
                    nvs_set_blob(handle, k.as_ptr().cast(), data.as_ptr().cast(), data.len())
                };
                if ret != ESP_OK {
                    return Err(ret);
                }
                // SAFETY: `handle` is open read-write.
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            result.map_err(map_esp_err)
        }
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store.remove(&Self::composite_key(namespace, key));
            Ok(())
        }

        #[cfg(target_os = "espidf")]
        {
            let k = Self::c_name(key);
            let result = Self::with_nvs_handle(namespace, true, |handle| {
                // SAFETY: `k` is NUL-terminated.
                let ret = unsafe { nvs_erase_key(handle, k.as_ptr().cast()) };
                if ret != ESP_OK && ret != ESP_ERR_NVS_NOT_FOUND {
                    return Err(ret);
                }
                // SAFETY: `handle` is open read-write.
                let ret = unsafe { nvs_commit(handle) };
                if ret != ESP_OK {
                    return Err(ret);
                }
                Ok(())
            });
            match result {
                // Namespace never created: nothing to delete.
                Err(ESP_ERR_NVS_NOT_FOUND) => Ok(()),
                other => other.map_err(map_esp_err),
            }
        }
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        #[cfg(not(target_os = "espidf"))]
        {
            self.store
                .contains_key(&Self::composite_key(namespace, key))
        }

        #[cfg(target_os = "espidf")]
        {
            let k = Self::c_name(key);
            Self::with_nvs_handle(namespace, false, |handle| {
                // SAFETY: `k` is NUL-terminated; a null type pointer is allowed.
                let ret =
                    unsafe { nvs_find_key(handle, k.as_ptr().cast(), core::ptr::null_mut()) };
                Ok(ret == ESP_OK)
            })
            .unwrap_or(false)
        }
    }
}

// ── Secure credential storage ──────────────────────────────────────
//
// The shared secret is stored in the "auth" NVS namespace.  With
// CONFIG_NVS_ENCRYPTION set and an nvs_key partition present, all
// nvs_get / nvs_set calls on it are transparently AES-XTS encrypted.
impl NvsAdapter {
    /// Store a credential blob in the "auth" namespace.
    pub fn store_credential(&mut self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.write(CRED_NAMESPACE, key, data)
    }

    /// Read a credential blob from the "auth" namespace.
    pub fn read_credential(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let data = self.read_blob(CRED_NAMESPACE, key)?;
        if data.len() > MAX_SECRET_LEN {
            return Err(StorageError::Corrupted);
        }
        Ok(data)
    }

    /// Delete a credential from the "auth" namespace.
    pub fn delete_credential(&mut self, key: &str) -> Result<(), StorageError> {
        self.delete(CRED_NAMESPACE, key)
    }

    pub fn credential_exists(&self, key: &str) -> bool {
        self.exists(CRED_NAMESPACE, key)
    }
}
