mod errors;
pub mod structs;

pub use errors::{Error, Result};

use log::{debug, info};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use structs::Document;

pub const DATA_PATH: &str = "./bot_data.json";

/// Handle on the JSON data file. Saves serialize against each other through
/// the write lock; the snapshot closure passed to `save` runs under that
/// lock so each write captures a coherent view.
pub struct Store {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl Store {
    pub fn new<P: AsRef<Path>>(path: P) -> Store {
        Store {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    /// Reads the on-disk document. A missing file is a fresh start and
    /// yields an empty document; an unreadable or unparseable file is an
    /// error for the caller to decide on.
    pub fn load(&self) -> Result<Document> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(why) if why.kind() == io::ErrorKind::NotFound => {
                info!("no data file at {}, starting fresh", self.path.display());
                return Ok(Document::default());
            }
            Err(why) => return Err(why.into()),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    /// Serializes the snapshot and rewrites the data file in full. Later
    /// overlapping save wins.
    pub fn save<F>(&self, snapshot: F) -> Result<()>
    where
        F: FnOnce() -> Document,
    {
        let _guard = match self.write_lock.lock() {
            Ok(guard) => guard,
            Err(_why) => return Err(Error::ConstStr("Failed to acquire save lock")),
        };

        let raw = serde_json::to_string_pretty(&snapshot())?;
        fs::write(&self.path, raw)?;
        debug!("wrote data file at {}", self.path.display());
        Ok(())
    }
}
