use crate::error::CorpusError;
use crate::models::CorpusEntry;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, Default)]
pub struct Corpus {
    entries: Vec<CorpusEntry>,
    positions: HashMap<String, usize>,
}

impl Corpus {
    /// Builds a corpus; a later entry with an already-seen id replaces the earlier one.
    pub fn from_entries(entries: Vec<CorpusEntry>) -> Result<Self, CorpusError> {
        let mut corpus = Self::default();
        for entry in entries {
            corpus.insert(validate_entry(entry)?);
        }
        Ok(corpus)
    }

    pub fn insert(&mut self, entry: CorpusEntry) {
        match self.positions.get(&entry.id) {
            Some(&position) => {
                warn!(id = %entry.id, "duplicate corpus id, keeping the later entry");
                self.entries[position] = entry;
            }
            None => {
                self.positions.insert(entry.id.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&CorpusEntry> {
        self.positions.get(id).map(|&position| &self.entries[position])
    }

    pub fn entries(&self) -> &[CorpusEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub fn discover_corpus_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_json = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn parse_corpus_json(raw: &str) -> Result<Vec<CorpusEntry>, CorpusError> {
    let entries: Vec<CorpusEntry> = serde_json::from_str(raw)?;
    entries.into_iter().map(validate_entry).collect()
}

pub fn load_corpus_file(path: &Path) -> Result<Vec<CorpusEntry>, CorpusError> {
    let raw = fs::read_to_string(path)?;
    parse_corpus_json(&raw)
}

pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: String,
}

pub struct CorpusReport {
    pub corpus: Corpus,
    pub skipped_files: Vec<SkippedFile>,
}

pub fn load_corpus_dir_best_effort(folder: &Path) -> Result<CorpusReport, CorpusError> {
    let files = discover_corpus_files(folder);

    if files.is_empty() {
        return Err(CorpusError::InvalidArgument(format!(
            "no json files found in {}",
            folder.display()
        )));
    }

    let mut corpus = Corpus::default();
    let mut skipped_files = Vec::new();

    for path in files {
        match load_corpus_file(&path) {
            Ok(entries) => {
                debug!(path = %path.display(), count = entries.len(), "loaded corpus file");
                for entry in entries {
                    corpus.insert(entry);
                }
            }
            Err(error) => skipped_files.push(SkippedFile {
                path,
                reason: error.to_string(),
            }),
        }
    }

    Ok(CorpusReport {
        corpus,
        skipped_files,
    })
}

pub fn load_corpus(path: &Path) -> Result<CorpusReport, CorpusError> {
    if path.is_dir() {
        return load_corpus_dir_best_effort(path);
    }

    Ok(CorpusReport {
        corpus: Corpus::from_entries(load_corpus_file(path)?)?,
        skipped_files: Vec::new(),
    })
}

fn validate_entry(mut entry: CorpusEntry) -> Result<CorpusEntry, CorpusError> {
    url::Url::parse(&entry.url)?;

    if entry.title.trim().is_empty() {
        return Err(CorpusError::InvalidEntry(format!(
            "entry for {} has no title",
            entry.url
        )));
    }
    if entry.source.trim().is_empty() {
        return Err(CorpusError::InvalidEntry(format!(
            "entry for {} has no source",
            entry.url
        )));
    }

    if entry.id.trim().is_empty() {
        entry.id = derive_entry_id(&entry.url);
    }
    Ok(entry)
}

pub fn derive_entry_id(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

pub const SAMPLE_CORPUS_JSON: &str = include_str!("../data/sample_corpus.json");

pub fn sample_corpus() -> Result<Corpus, CorpusError> {
    Corpus::from_entries(parse_corpus_json(SAMPLE_CORPUS_JSON)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    const ENTRY: &str = r#"[{
        "title": "Ledger basics",
        "url": "https://example.com/ledger",
        "body": "A ledger records transactions.",
        "source": "CryptoJournal",
        "published_at": "2024-01-13T14:30:00Z"
    }]"#;

    #[test]
    fn discover_corpus_files_is_recursive() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let nested = dir.path().join("nested");
        fs::create_dir(&nested)?;

        File::create(dir.path().join("a.json")).and_then(|mut file| file.write_all(b"[]"))?;
        File::create(nested.join("b.JSON")).and_then(|mut file| file.write_all(b"[]"))?;
        File::create(nested.join("notes.txt")).and_then(|mut file| file.write_all(b"skip"))?;

        assert_eq!(discover_corpus_files(dir.path()).len(), 2);
        Ok(())
    }

    #[test]
    fn missing_ids_are_derived_from_url() -> Result<(), Box<dyn std::error::Error>> {
        let entries = parse_corpus_json(ENTRY)?;
        assert_eq!(entries[0].id, derive_entry_id("https://example.com/ledger"));
        assert_eq!(entries[0].id.len(), 16);
        Ok(())
    }

    #[test]
    fn invalid_url_is_rejected() {
        let raw = ENTRY.replace("https://example.com/ledger", "not a url");
        assert!(matches!(parse_corpus_json(&raw), Err(CorpusError::InvalidUrl(_))));
    }

    #[test]
    fn best_effort_skips_broken_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("good.json"), ENTRY)?;
        fs::write(dir.path().join("broken.json"), b"{not json")?;

        let report = load_corpus_dir_best_effort(dir.path())?;

        assert_eq!(report.corpus.len(), 1);
        assert_eq!(report.skipped_files.len(), 1);
        assert_eq!(
            report.skipped_files[0]
                .path
                .file_name()
                .and_then(|name| name.to_str()),
            Some("broken.json")
        );
        Ok(())
    }

    #[test]
    fn loading_fails_without_json_files() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        assert!(load_corpus_dir_best_effort(dir.path()).is_err());
        Ok(())
    }

    #[test]
    fn duplicate_ids_keep_the_later_entry() -> Result<(), Box<dyn std::error::Error>> {
        let mut entries = parse_corpus_json(ENTRY)?;
        let mut newer = entries[0].clone();
        newer.title = "Ledger basics, revised".to_string();
        entries.push(newer);

        let corpus = Corpus::from_entries(entries)?;
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus.entries()[0].title, "Ledger basics, revised");
        Ok(())
    }

    #[test]
    fn sample_corpus_loads() -> Result<(), Box<dyn std::error::Error>> {
        let corpus = sample_corpus()?;
        assert!(corpus.len() >= 15);
        Ok(())
    }
}
