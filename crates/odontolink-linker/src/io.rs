//! JSONL input and the four output artifacts.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use odontolink_common::{Bundle, Candidate, LineRecord, Mention, Result, Span};
use odontolink_embed::VectorHit;
use serde::Serialize;
use tracing::warn;

use crate::pipeline::{LineOutput, RescueRecord};

pub const GAZETTEER_HITS: &str = "gazetteer_hits.jsonl";
pub const VECTOR_HITS: &str = "vector_hits.jsonl";
pub const MERGED_CANDIDATES: &str = "merged_candidates.jsonl";
pub const FINAL_VIEW: &str = "final.jsonl";

/// Input lines plus the count of records that could not be parsed.
#[derive(Debug, Default)]
pub struct InputBatch {
    pub records: Vec<LineRecord>,
    pub malformed: usize,
}

/// Read tokenizer output, one record per line. Unparseable lines are
/// logged and skipped; only an unreadable file is an error.
pub fn read_records(path: &Path) -> Result<InputBatch> {
    let reader = BufReader::new(File::open(path)?);
    let mut batch = InputBatch::default();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LineRecord>(&line) {
            Ok(record) => batch.records.push(record),
            Err(e) => {
                batch.malformed += 1;
                warn!("Skipping malformed record {}:{}: {}", path.display(), line_no + 1, e);
            }
        }
    }
    Ok(batch)
}

// ── Artifact records ──────────────────────────────────────────────────────────

#[derive(Serialize)]
struct MentionsRecord<'a> {
    line_id: &'a str,
    mentions: &'a [Mention],
}

#[derive(Serialize)]
struct VectorRecord<'a> {
    line_id: &'a str,
    hits: &'a [VectorHit],
}

/// One linked mention in the final view.
#[derive(Debug, Serialize)]
pub struct FinalMention<'a> {
    pub mention_id: &'a str,
    pub surface: &'a str,
    pub span: Span,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_surface: Option<&'a str>,
    pub selected: &'a Candidate,
    pub alternatives: usize,
    pub confident_singleton: bool,
    #[serde(skip_serializing_if = "is_empty_slice")]
    pub notes: &'a [String],
}

impl<'a> FinalMention<'a> {
    pub fn from_mention(mention: &'a Mention) -> Option<Self> {
        let selected = mention.top()?;
        Some(Self {
            mention_id: &mention.mention_id,
            surface: &mention.surface,
            span: mention.span,
            normalized_surface: mention.normalized_surface.as_deref(),
            selected,
            alternatives: mention.candidates.len() - 1,
            confident_singleton: mention.confident_singleton,
            notes: &mention.notes,
        })
    }
}

#[derive(Serialize)]
struct FinalRecord<'a> {
    line_id: &'a str,
    mentions: Vec<FinalMention<'a>>,
    bundles: &'a [Bundle],
    #[serde(skip_serializing_if = "is_empty_slice")]
    rescues: &'a [RescueRecord],
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    lexical_only: bool,
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// Writes the four artifacts side by side, one record per processed line.
pub struct ArtifactWriter {
    dir: PathBuf,
    gazetteer: BufWriter<File>,
    vector: BufWriter<File>,
    merged: BufWriter<File>,
    final_view: BufWriter<File>,
    lines: usize,
}

impl ArtifactWriter {
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let open = |name: &str| -> Result<BufWriter<File>> { Ok(BufWriter::new(File::create(dir.join(name))?)) };
        Ok(Self {
            dir: dir.to_path_buf(),
            gazetteer: open(GAZETTEER_HITS)?,
            vector: open(VECTOR_HITS)?,
            merged: open(MERGED_CANDIDATES)?,
            final_view: open(FINAL_VIEW)?,
            lines: 0,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn lines_written(&self) -> usize {
        self.lines
    }

    pub fn write(&mut self, output: &LineOutput) -> Result<()> {
        let line_id = output.line_id.as_str();
        write_json(
            &mut self.gazetteer,
            &MentionsRecord { line_id, mentions: &output.gazetteer },
        )?;
        write_json(&mut self.vector, &VectorRecord { line_id, hits: &output.vector })?;
        write_json(
            &mut self.merged,
            &MentionsRecord { line_id, mentions: &output.mentions },
        )?;
        write_json(
            &mut self.final_view,
            &FinalRecord {
                line_id,
                mentions: output.mentions.iter().filter_map(FinalMention::from_mention).collect(),
                bundles: &output.bundles,
                rescues: &output.rescues,
                lexical_only: output.lexical_only,
            },
        )?;
        self.lines += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<usize> {
        for w in [&mut self.gazetteer, &mut self.vector, &mut self.merged, &mut self.final_view] {
            w.flush()?;
        }
        Ok(self.lines)
    }
}

fn is_empty_slice<T>(slice: &&[T]) -> bool {
    slice.is_empty()
}

fn write_json<W: Write, T: Serialize>(writer: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer(&mut *writer, value)?;
    writer.write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use odontolink_common::{IriSource, MentionState, Scores};

    fn output() -> LineOutput {
        let mut m = Mention::new("שתל", Span::new(0, 3), vec![0]);
        let mut c = Candidate::new("OHD:implant", "dental implant", IriSource::OhdSynonym)
            .with_scores(Scores::lexical(0.9));
        c.score_final = 0.9;
        m.candidates.push(c);
        m.state = MentionState::Final;
        LineOutput {
            line_id: "42".to_string(),
            gazetteer: vec![m.clone()],
            vector: Vec::new(),
            mentions: vec![m],
            bundles: Vec::new(),
            rescues: Vec::new(),
            lexical_only: true,
        }
    }

    #[test]
    fn test_writer_emits_one_record_per_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ArtifactWriter::create(dir.path()).unwrap();
        writer.write(&output()).unwrap();
        assert_eq!(writer.finish().unwrap(), 1);

        for name in [GAZETTEER_HITS, VECTOR_HITS, MERGED_CANDIDATES, FINAL_VIEW] {
            let content = std::fs::read_to_string(dir.path().join(name)).unwrap();
            assert_eq!(content.lines().count(), 1, "{name}");
        }
        let final_line = std::fs::read_to_string(dir.path().join(FINAL_VIEW)).unwrap();
        let v: serde_json::Value = serde_json::from_str(final_line.trim()).unwrap();
        assert_eq!(v["line_id"], "42");
        assert_eq!(v["mentions"][0]["selected"]["iri"], "OHD:implant");
        assert_eq!(v["mentions"][0]["span"], serde_json::json!([0, 3]));
        assert_eq!(v["lexical_only"], true);
        assert!(v.get("rescues").is_none());
    }

    #[test]
    fn test_reader_skips_malformed_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tokens.jsonl");
        let good = serde_json::to_string(&LineRecord::new(
            "1",
            vec![odontolink_common::Token::word(0, "שתל", 0)],
        ))
        .unwrap();
        std::fs::write(&path, format!("{good}\n{{not json\n\n")).unwrap();
        let batch = read_records(&path).unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(batch.malformed, 1);
        assert_eq!(batch.records[0].tokens[0].text, "שתל");
    }
}
