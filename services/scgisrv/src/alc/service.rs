//! Allocation lists keyed by program CRC, persisted as `crc-<crc>.alc`

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use regex::Regex;
use tracing::{error, info, warn};

use super::parser;
use super::var_info::Alc;
use crate::error::{ErrorExt, Result};
use crate::utils::text::{latin1_decode, latin1_encode};

pub struct AlcService {
    alc_dir: PathBuf,
    by_crc: RwLock<HashMap<u32, Arc<Alc>>>,
}

impl AlcService {
    pub fn new(alc_dir: impl Into<PathBuf>) -> Self {
        Self {
            alc_dir: alc_dir.into(),
            by_crc: RwLock::new(HashMap::new()),
        }
    }

    /// Create the directory or load every stored list from it
    pub async fn initialize_with_alc_files(&self) -> Result<()> {
        if !tokio::fs::try_exists(&self.alc_dir).await.unwrap_or(false) {
            tokio::fs::create_dir_all(&self.alc_dir)
                .await
                .io_error(&format!("Can't create alc dir {}", self.alc_dir.display()))?;
            return Ok(());
        }

        let mut entries = tokio::fs::read_dir(&self.alc_dir)
            .await
            .io_error(&format!("Can't read alc dir {}", self.alc_dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await.is_ok_and(|t| t.is_file()) {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(crc) = filename_to_crc(&name) else {
                error!("Invalid alc filename \"{}\"", name);
                continue;
            };
            let Some(text) = load_text(&entry.path()).await else {
                continue;
            };
            match parser::parse(&text) {
                Ok(alc) => self.insert(crc, alc),
                Err(e) => warn!("Skipped {}: {}", name, e),
            }
        }
        Ok(())
    }

    pub fn get(&self, crc: u32) -> Option<Arc<Alc>> {
        self.by_crc.read().get(&crc).cloned()
    }

    /// Parse and cache `text`, writing it to disk in the background
    pub fn set_alc_text(&self, text: String, crc: u32) -> Result<Arc<Alc>> {
        let alc = Arc::new(parser::parse(&text)?);
        info!("Add alc with crc={}", crc);
        self.by_crc.write().insert(crc, alc.clone());

        let path = self.path_for(crc);
        tokio::spawn(async move {
            if let Err(e) = tokio::fs::write(&path, latin1_encode(&text)).await {
                error!("Can't save alc file \"{}\": {}", path.display(), e);
            }
        });
        Ok(alc)
    }

    /// Raw text of a stored list
    pub async fn load_alc_text(&self, crc: u32) -> Option<String> {
        load_text(&self.path_for(crc)).await
    }

    fn insert(&self, crc: u32, alc: Alc) {
        info!("Add alc with crc={}", crc);
        self.by_crc.write().insert(crc, Arc::new(alc));
    }

    fn path_for(&self, crc: u32) -> PathBuf {
        self.alc_dir.join(format!("crc-{crc}.alc"))
    }
}

async fn load_text(path: &Path) -> Option<String> {
    match tokio::fs::read(path).await {
        Ok(raw) => Some(latin1_decode(&raw)),
        Err(e) => {
            error!("Can't load alc file \"{}\": {}", path.display(), e);
            None
        },
    }
}

fn filename_to_crc(name: &str) -> Option<u32> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^crc-(\d+)\.alc$").ok())
        .as_ref()?
        .captures(name)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::time::Duration;

    const LINE: &str = "0050  00000 1     0      1    global bit   lc00_general_error   Fehler \u{e4}";

    #[test]
    fn test_filename_to_crc() {
        assert_eq!(filename_to_crc("crc-1234.alc"), Some(1234));
        assert_eq!(filename_to_crc("crc-12.alc.bak"), None);
        assert_eq!(filename_to_crc("notes.txt"), None);
    }

    #[tokio::test]
    async fn test_missing_dir_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("alc");
        let service = AlcService::new(&dir);
        service.initialize_with_alc_files().await.unwrap();
        assert!(dir.is_dir());
        assert!(service.get(1).is_none());
    }

    #[tokio::test]
    async fn test_stored_files_are_loaded() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("crc-77.alc"), latin1_encode(LINE)).unwrap();
        std::fs::write(tmp.path().join("garbage.alc"), b"x").unwrap();

        let service = AlcService::new(tmp.path());
        service.initialize_with_alc_files().await.unwrap();

        let alc = service.get(77).unwrap();
        let var = alc.get("lc00_general_error").unwrap();
        assert_eq!(var.description, "Fehler \u{e4}");
    }

    #[tokio::test]
    async fn test_set_alc_text_persists_latin1() {
        let tmp = tempfile::tempdir().unwrap();
        let service = AlcService::new(tmp.path());
        service.set_alc_text(LINE.to_string(), 5).unwrap();
        assert!(service.get(5).is_some());

        let path = tmp.path().join("crc-5.alc");
        let expected = LINE.chars().count() as u64;
        for _ in 0..50 {
            if std::fs::metadata(&path).is_ok_and(|m| m.len() == expected) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let raw = std::fs::read(&path).unwrap();
        assert_eq!(raw.last(), Some(&0xE4));
        assert_eq!(service.load_alc_text(5).await.as_deref(), Some(LINE));
    }

    #[tokio::test]
    async fn test_unparsable_text_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let service = AlcService::new(tmp.path());
        assert!(service.set_alc_text("zz 1 1 0 1 g bit x".into(), 1).is_err());
        assert!(service.get(1).is_none());
    }
}
