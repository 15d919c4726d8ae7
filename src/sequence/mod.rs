//! Owned sequence storage.
//!
//! The store owns every target and query sequence for an alignment run;
//! the index, aligner and stitcher all borrow from it. Nucleotide data is
//! normalized to lowercase ASCII on load so comparisons are byte equality.

use std::path::Path;

use anyhow::{Context, Result};
use bio::io::fasta;
use rustc_hash::FxHashMap;

use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alphabet {
    Dna,
    Protein,
}

impl Alphabet {
    /// The neutral ambiguity code for this alphabet ('n' or 'x').
    pub fn wildcard(self) -> u8 {
        match self {
            Alphabet::Dna => b'n',
            Alphabet::Protein => b'x',
        }
    }
}

/// One named, immutable sequence.
#[derive(Debug, Clone)]
pub struct Sequence {
    pub name: String,
    pub alphabet: Alphabet,
    data: Vec<u8>,
}

impl Sequence {
    pub fn new(name: impl Into<String>, alphabet: Alphabet, data: impl AsRef<[u8]>) -> Self {
        let data = data.as_ref().iter().map(|b| b.to_ascii_lowercase()).collect();
        Sequence {
            name: name.into(),
            alphabet,
            data,
        }
    }

    pub fn dna(name: impl Into<String>, data: impl AsRef<[u8]>) -> Self {
        Sequence::new(name, Alphabet::Dna, data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn bases(&self) -> &[u8] {
        &self.data
    }

    /// Reverse complement of a DNA sequence. Ambiguity codes map to 'n'.
    pub fn reverse_complement(&self) -> Sequence {
        let data: Vec<u8> = self.data.iter().rev().map(|&b| complement(b)).collect();
        Sequence {
            name: self.name.clone(),
            alphabet: self.alphabet,
            data,
        }
    }
}

pub fn complement(base: u8) -> u8 {
    match base {
        b'a' => b't',
        b'c' => b'g',
        b'g' => b'c',
        b't' => b'a',
        _ => b'n',
    }
}

/// 2-bit value of a nucleotide, or `None` for ambiguity codes.
#[inline]
pub fn base_val(base: u8) -> Option<u32> {
    match base {
        b't' => Some(0),
        b'c' => Some(1),
        b'a' => Some(2),
        b'g' => Some(3),
        _ => None,
    }
}

/// Identifier of a sequence within a [`SequenceStore`].
pub type SeqId = u32;

/// Owns the sequences of one alignment run.
///
/// Targets and queries share one id space. Repeat masks are optional,
/// per-base, and used only for scoring (repeat bases count as
/// repeat-matches in summaries, never affecting the alignment itself).
#[derive(Debug, Default)]
pub struct SequenceStore {
    seqs: Vec<Sequence>,
    by_name: FxHashMap<String, SeqId>,
    repeat_masks: FxHashMap<SeqId, Vec<bool>>,
}

impl SequenceStore {
    pub fn new() -> Self {
        SequenceStore::default()
    }

    pub fn add(&mut self, seq: Sequence) -> SeqId {
        let id = self.seqs.len() as SeqId;
        self.by_name.insert(seq.name.clone(), id);
        self.seqs.push(seq);
        id
    }

    /// Attach a per-base repeat mask to a sequence. The mask length must
    /// match the sequence length.
    pub fn set_repeat_mask(&mut self, id: SeqId, mask: Vec<bool>) -> crate::error::Result<()> {
        let seq = self
            .seqs
            .get(id as usize)
            .ok_or_else(|| EngineError::DataInconsistency(format!("no sequence with id {id}")))?;
        if mask.len() != seq.len() {
            return Err(EngineError::DataInconsistency(format!(
                "repeat mask length {} does not match sequence {} length {}",
                mask.len(),
                seq.name,
                seq.len()
            )));
        }
        self.repeat_masks.insert(id, mask);
        Ok(())
    }

    pub fn get(&self, id: SeqId) -> crate::error::Result<&Sequence> {
        self.seqs
            .get(id as usize)
            .ok_or_else(|| EngineError::DataInconsistency(format!("no sequence with id {id}")))
    }

    pub fn lookup(&self, name: &str) -> Option<SeqId> {
        self.by_name.get(name).copied()
    }

    pub fn repeat_mask(&self, id: SeqId) -> Option<&[bool]> {
        self.repeat_masks.get(&id).map(|m| m.as_slice())
    }

    pub fn len(&self) -> usize {
        self.seqs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seqs.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = SeqId> + '_ {
        0..self.seqs.len() as SeqId
    }

    /// Load every record of a FASTA file into the store.
    ///
    /// Record ids are truncated at the first whitespace, matching the
    /// common convention for FASTA headers.
    pub fn load_fasta(&mut self, path: impl AsRef<Path>, alphabet: Alphabet) -> Result<Vec<SeqId>> {
        let path = path.as_ref();
        let reader = fasta::Reader::from_file(path)
            .with_context(|| format!("opening FASTA file {}", path.display()))?;
        let mut ids = Vec::new();
        for record in reader.records() {
            let record = record.with_context(|| format!("reading {}", path.display()))?;
            let name = record
                .id()
                .split_whitespace()
                .next()
                .unwrap_or("unknown")
                .to_string();
            ids.push(self.add(Sequence::new(name, alphabet, record.seq())));
        }
        Ok(ids)
    }
}
