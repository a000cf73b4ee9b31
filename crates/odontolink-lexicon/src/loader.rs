//! Loading of the pre-built lexicon artifacts.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use odontolink_config::ArtifactPaths;
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use crate::alias::AliasMap;
use crate::entry::LexiconEntry;
use crate::index::{LexiconBuilder, LexiconIndex};
use crate::{LexiconError, Result};

/// Read-only lexicon resources shared by every worker.
#[derive(Debug, Clone)]
pub struct LoadedLexicon {
    pub index: Arc<LexiconIndex>,
    pub aliases: Arc<AliasMap>,
}

/// Read a JSONL lexicon. Malformed lines are skipped with a warning.
pub fn read_entries(path: &Path) -> Result<Vec<LexiconEntry>> {
    let content = std::fs::read_to_string(path).map_err(|source| LexiconError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut entries = Vec::new();
    let mut malformed = 0usize;
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<LexiconEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                malformed += 1;
                warn!("Skipping malformed lexicon record {}:{}: {}", path.display(), line_no + 1, e);
            }
        }
    }
    if malformed > 0 {
        warn!("{} malformed lexicon records skipped", malformed);
    }
    Ok(entries)
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path).map_err(|source| LexiconError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| LexiconError::Parse {
        path: path.to_path_buf(),
        line: source.line(),
        source,
    })
}

/// Load the lexicon plus the optional abbreviation, brand and alias dictionaries.
pub fn load_artifacts(paths: &ArtifactPaths) -> Result<LoadedLexicon> {
    let entries = read_entries(&paths.lexicon)?;
    let known: HashSet<String> = entries.iter().map(|e| e.iri.clone()).collect();

    let mut builder = LexiconBuilder::default();
    for entry in entries {
        builder.add_entry(entry);
    }

    if let Some(path) = &paths.abbreviations {
        let abbreviations: HashMap<String, String> = read_json(path)?;
        info!("Loaded {} clinic abbreviations", abbreviations.len());
        for (abbr, expansion) in &abbreviations {
            builder.add_abbreviation(abbr, expansion);
        }
    }

    if let Some(path) = &paths.brands {
        let brands: HashMap<String, Vec<String>> = read_json(path)?;
        info!("Loaded {} brand names", brands.len());
        for (brand, alternates) in &brands {
            builder.add_brand(brand, alternates);
        }
    }

    let aliases = match &paths.alias_map {
        Some(path) => AliasMap::load(path, |iri| known.contains(iri))?,
        None => AliasMap::new(),
    };
    for (surface, target) in aliases.entries() {
        builder.add_alias(&surface, &target);
    }
    info!("Loaded {} alias surfaces", aliases.len());

    let index = builder.build()?;
    if index.is_empty() {
        return Err(LexiconError::Empty(paths.lexicon.clone()));
    }

    Ok(LoadedLexicon {
        index: Arc::new(index),
        aliases: Arc::new(aliases),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, content: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("odontolink-lexicon-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_artifacts_with_dictionaries() {
        let lexicon = write_temp(
            "lex.jsonl",
            concat!(
                r#"{"iri":"OHD:mua","label":"multi-unit abutment","synonyms":["MUA abutment"],"kind":"device"}"#,
                "\n\nnot json\n",
                r#"{"iri":"OHD:implant","label":"dental implant","synonyms":["שתל"],"frequency_prior":0.7}"#,
                "\n"
            ),
        );
        let abbreviations = write_temp("abbr.json", r#"{"MU": "multi-unit abutment"}"#);
        let aliases = write_temp("alias.json", r#"{"מולטיוניט": "OHD:mua"}"#);

        let paths = ArtifactPaths {
            lexicon,
            abbreviations: Some(abbreviations),
            alias_map: Some(aliases),
            ..ArtifactPaths::default()
        };
        let loaded = load_artifacts(&paths).unwrap();
        assert_eq!(loaded.index.len(), 2);
        assert!(loaded.aliases.get("מולטיוניט").unwrap().is_resolved());
        assert_eq!(loaded.index.lookup("mu")[0].iri, "ABBR:MU");
        assert_eq!(loaded.index.lookup("מולטיוניט")[0].iri, "OHD:mua");
    }

    #[test]
    fn test_missing_lexicon_is_an_error() {
        let paths = ArtifactPaths {
            lexicon: std::env::temp_dir().join("odontolink-no-such-lexicon.jsonl"),
            ..ArtifactPaths::default()
        };
        assert!(matches!(load_artifacts(&paths), Err(LexiconError::Io { .. })));
    }
}
