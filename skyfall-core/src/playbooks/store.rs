use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use serde_yaml::{Mapping, Value as YamlValue};
use tracing::{debug, info, warn};

use crate::error::{ModelError, SkyfallResult};

use super::types::Playbook;

const EXTENSIONS: [&str; 2] = ["yml", "yaml"];

/// One YAML file per playbook under a single directory, named `<name>.yml`.
///
/// No locking: concurrent writers to the same playbook race and the last rename wins.
#[derive(Debug, Clone)]
pub struct PlaybookStore {
    dir: PathBuf,
}

impl PlaybookStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn ensure_dir(&self) -> SkyfallResult<()> {
        fs::create_dir_all(&self.dir)?;
        Ok(())
    }

    /// Persists a new playbook with an empty sequence.
    pub fn create(
        &self,
        name: &str,
        description: &str,
        author: &str,
        references: Vec<String>,
    ) -> SkyfallResult<Playbook> {
        validate_name(name)?;
        self.ensure_dir()?;

        if self.locate(name).is_some() || self.scan_for(name)?.is_some() {
            return Err(ModelError::AlreadyExists(name.to_string()).into());
        }

        let playbook = Playbook::new(name, description, author, references);
        let content = serde_yaml::to_string(&playbook)?;

        let path = self.default_path(name);
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(ModelError::AlreadyExists(name.to_string()).into());
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(content.as_bytes())?;

        info!(playbook = %name, path = %path.display(), "Created playbook");
        Ok(playbook)
    }

    /// Loads the playbook stored under the file stem `identifier`.
    pub fn load(&self, identifier: &str) -> SkyfallResult<Playbook> {
        validate_name(identifier)?;
        let path = self
            .locate(identifier)
            .ok_or_else(|| ModelError::NotFound(identifier.to_string()))?;
        read_playbook(&path, identifier)
    }

    /// Writes the in-memory sequence back to disk.
    ///
    /// The file is re-read first and only its `sequence` key is replaced, so metadata
    /// edited on disk (or keys this type does not model) survives.
    pub fn save(&self, playbook: &Playbook) -> SkyfallResult<()> {
        validate_name(&playbook.name)?;
        let (path, _) = self
            .resolve(&playbook.name)?
            .ok_or_else(|| ModelError::NotFound(playbook.name.clone()))?;

        let content = fs::read_to_string(&path)?;
        let mut record: Mapping = match serde_yaml::from_str::<YamlValue>(&content) {
            Ok(YamlValue::Mapping(mapping)) => mapping,
            Ok(_) => {
                return Err(ModelError::Corrupt {
                    name: playbook.name.clone(),
                    message: "top level is not a mapping".to_string(),
                }
                .into())
            }
            Err(e) => {
                return Err(ModelError::Corrupt {
                    name: playbook.name.clone(),
                    message: e.to_string(),
                }
                .into())
            }
        };

        record.insert(
            YamlValue::String("sequence".to_string()),
            serde_yaml::to_value(&playbook.sequence)?,
        );

        write_replacing(&path, serde_yaml::to_string(&record)?.as_bytes())?;

        debug!(
            playbook = %playbook.name,
            steps = playbook.step_count(),
            "Saved playbook sequence"
        );
        Ok(())
    }

    /// Stores externally authored bytes verbatim as `filename`.
    ///
    /// Only the file name is checked; the content is validated when it is loaded.
    pub fn import(&self, raw: &[u8], filename: &str) -> SkyfallResult<PathBuf> {
        validate_name(filename)?;
        self.ensure_dir()?;

        let has_extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| EXTENSIONS.contains(&e))
            .unwrap_or(false);
        let path = if has_extension {
            self.dir.join(filename)
        } else {
            self.dir.join(format!("{}.yml", filename))
        };

        if path.exists() {
            warn!(path = %path.display(), "Import replaces an existing playbook file");
        }
        write_replacing(&path, raw)?;

        info!(path = %path.display(), bytes = raw.len(), "Imported playbook");
        Ok(path)
    }

    /// Raw bytes of the stored playbook file.
    pub fn export(&self, name: &str) -> SkyfallResult<Vec<u8>> {
        validate_name(name)?;
        let path = self
            .locate(name)
            .ok_or_else(|| ModelError::NotFound(name.to_string()))?;
        Ok(fs::read(path)?)
    }

    pub fn delete(&self, name: &str) -> SkyfallResult<()> {
        validate_name(name)?;
        let path = self
            .locate(name)
            .ok_or_else(|| ModelError::NotFound(name.to_string()))?;
        fs::remove_file(&path)?;
        info!(playbook = %name, "Deleted playbook");
        Ok(())
    }

    pub fn exists(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.locate(name).is_some()
    }

    /// Finds the playbook whose `name` field equals `name` exactly (case-sensitive).
    ///
    /// The file named after the playbook is checked first, then every other file.
    pub fn find(&self, name: &str) -> SkyfallResult<Option<Playbook>> {
        Ok(self.resolve(name)?.map(|(_, playbook)| playbook))
    }

    /// The file holding the playbook named `name`, matched on the `name` field.
    fn resolve(&self, name: &str) -> SkyfallResult<Option<(PathBuf, Playbook)>> {
        if validate_name(name).is_ok() {
            if let Some(path) = self.locate(name) {
                let playbook = read_playbook(&path, name)?;
                if playbook.name == name {
                    return Ok(Some((path, playbook)));
                }
            }
        }

        self.scan_for(name)
    }

    /// Every parseable playbook, sorted by name. Malformed files are skipped.
    pub fn list(&self) -> SkyfallResult<Vec<Playbook>> {
        let mut playbooks = Vec::new();

        for path in self.playbook_files()? {
            let stem = file_stem(&path);
            match read_playbook(&path, &stem) {
                Ok(playbook) => playbooks.push(playbook),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable playbook");
                }
            }
        }

        playbooks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(playbooks)
    }

    fn default_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.yml", name))
    }

    fn locate(&self, name: &str) -> Option<PathBuf> {
        EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{}.{}", name, ext)))
            .find(|path| path.is_file())
    }

    /// First file, in path order, whose `name` field equals `name`.
    fn scan_for(&self, name: &str) -> SkyfallResult<Option<(PathBuf, Playbook)>> {
        for path in self.playbook_files()? {
            let stem = file_stem(&path);
            match read_playbook(&path, &stem) {
                Ok(playbook) if playbook.name == name => return Ok(Some((path, playbook))),
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable playbook");
                }
            }
        }
        Ok(None)
    }

    fn playbook_files(&self) -> SkyfallResult<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_playbook = path.is_file()
                && path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| EXTENSIONS.contains(&e))
                    .unwrap_or(false);
            if is_playbook {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

fn read_playbook(path: &Path, name: &str) -> SkyfallResult<Playbook> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ModelError::NotFound(name.to_string()).into())
        }
        Err(e) if e.kind() == ErrorKind::InvalidData => {
            return Err(ModelError::Corrupt {
                name: name.to_string(),
                message: e.to_string(),
            }
            .into())
        }
        Err(e) => return Err(e.into()),
    };

    serde_yaml::from_str(&content).map_err(|e| {
        ModelError::Corrupt {
            name: name.to_string(),
            message: e.to_string(),
        }
        .into()
    })
}

/// Writes to a hidden sibling and renames it over `path`.
fn write_replacing(path: &Path, content: &[u8]) -> SkyfallResult<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("playbook");
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    fs::write(&tmp, content)?;
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Playbook names double as file names, so they must be one plain path component.
pub fn validate_name(name: &str) -> Result<(), ModelError> {
    let mut components = Path::new(name).components();
    let single_normal = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );

    if name.trim().is_empty() || !single_normal || name.contains(['/', '\\']) {
        return Err(ModelError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SkyfallError;
    use tempfile::TempDir;

    fn store() -> (TempDir, PlaybookStore) {
        let temp_dir = TempDir::new().unwrap();
        let store = PlaybookStore::new(temp_dir.path().join("playbooks"));
        (temp_dir, store)
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("Recon").is_ok());
        assert!(validate_name("recon.yml").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("..").is_err());
        assert!(validate_name(".").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("a\\b").is_err());
        assert!(validate_name("/etc/passwd").is_err());
    }

    #[test]
    fn test_create_rejects_duplicates() {
        let (_tmp, store) = store();
        store
            .create("Recon", "Initial discovery", "red-team", vec![])
            .unwrap();

        let err = store.create("Recon", "", "", vec![]).unwrap_err();
        assert!(matches!(
            err,
            SkyfallError::Model(ModelError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_load_missing_and_corrupt() {
        let (_tmp, store) = store();
        store.ensure_dir().unwrap();

        let err = store.load("Ghost").unwrap_err();
        assert!(matches!(err, SkyfallError::Model(ModelError::NotFound(_))));

        fs::write(store.dir().join("Broken.yml"), "name: [unclosed").unwrap();
        let err = store.load("Broken").unwrap_err();
        assert!(matches!(
            err,
            SkyfallError::Model(ModelError::Corrupt { .. })
        ));
    }

    #[test]
    fn test_save_requires_existing_record() {
        let (_tmp, store) = store();
        let playbook = Playbook::new("Unsaved", "", "", vec![]);
        let err = store.save(&playbook).unwrap_err();
        assert!(matches!(err, SkyfallError::Model(ModelError::NotFound(_))));
    }

    #[test]
    fn test_list_skips_corrupt_files() {
        let (_tmp, store) = store();
        store.create("Bravo", "", "", vec![]).unwrap();
        store.create("Alpha", "", "", vec![]).unwrap();
        fs::write(store.dir().join("Broken.yml"), "::::").unwrap();
        fs::write(store.dir().join("notes.txt"), "ignored").unwrap();

        let names: Vec<String> = store.list().unwrap().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["Alpha", "Bravo"]);
    }

    #[test]
    fn test_find_is_case_sensitive_and_matches_name_field() {
        let (_tmp, store) = store();
        store.create("Recon", "", "", vec![]).unwrap();
        store
            .import(
                b"name: Lateral\ncreation_date: 2024-01-01\nsequence: {}\n",
                "movement.yml",
            )
            .unwrap();

        assert!(store.find("Recon").unwrap().is_some());
        assert!(store.find("recon").unwrap().is_none());
        assert_eq!(store.find("Lateral").unwrap().unwrap().name, "Lateral");
    }

    #[test]
    fn test_save_writes_back_to_imported_file() {
        let (_tmp, store) = store();
        store
            .import(
                b"name: Lateral\ncreation_date: 2024-01-01\nsequence: {}\n",
                "movement.yml",
            )
            .unwrap();

        let mut playbook = store.find("Lateral").unwrap().unwrap();
        playbook.add_step("AZ-000", None, 0).unwrap();
        store.save(&playbook).unwrap();

        assert_eq!(store.load("movement").unwrap().step_count(), 1);
        assert!(!store.dir().join("Lateral.yml").exists());
    }

    #[test]
    fn test_export_and_delete() {
        let (_tmp, store) = store();
        store.create("Recon", "", "", vec![]).unwrap();

        let bytes = store.export("Recon").unwrap();
        assert!(String::from_utf8(bytes).unwrap().contains("name: Recon"));

        store.delete("Recon").unwrap();
        assert!(!store.exists("Recon"));
        assert!(store.delete("Recon").is_err());
    }
}
