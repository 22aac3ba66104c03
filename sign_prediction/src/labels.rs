use crate::registry::ModelRegistry;
use serde::Deserialize;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fs,
    path::Path,
    sync::Arc,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LabelIndexError {
    #[error("Failed to read label index: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid label index JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Label index is empty")]
    Empty,
    #[error("Label at index {0} is blank")]
    BlankLabel(usize),
    #[error("Label `{0}` appears more than once")]
    Duplicate(String),
    #[error("Class indices must be 0..{expected}, found {found}")]
    NonContiguous { expected: usize, found: usize },
}

/// Class index to label mapping for one backend. Indices are always the dense
/// range `0..len()`.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelIndex {
    labels: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LabelIndexFile {
    ClassIndices(BTreeMap<String, usize>),
    Labels(Vec<String>),
}

impl LabelIndex {
    pub fn new(labels: Vec<String>) -> Result<Self, LabelIndexError> {
        if labels.is_empty() {
            return Err(LabelIndexError::Empty);
        }

        let mut seen = HashSet::with_capacity(labels.len());
        for (index, label) in labels.iter().enumerate() {
            if label.trim().is_empty() {
                return Err(LabelIndexError::BlankLabel(index));
            }
            if !seen.insert(label.as_str()) {
                return Err(LabelIndexError::Duplicate(label.clone()));
            }
        }

        Ok(Self { labels })
    }

    /// Reads `.json` files as either a `{"label": index}` object or a label
    /// array. Anything else is read as one label per line.
    pub fn from_file(path: &Path) -> Result<Self, LabelIndexError> {
        let contents = fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            Self::parse_json(&contents)
        } else {
            Self::parse_lines(&contents)
        }
    }

    pub fn parse_json(contents: &str) -> Result<Self, LabelIndexError> {
        match serde_json::from_str::<LabelIndexFile>(contents)? {
            LabelIndexFile::Labels(labels) => Self::new(labels),
            LabelIndexFile::ClassIndices(class_indices) => {
                let expected = class_indices.len();
                let mut labels = vec![None; expected];
                for (label, index) in class_indices {
                    match labels.get_mut(index) {
                        Some(slot) if slot.is_none() => *slot = Some(label),
                        _ => {
                            return Err(LabelIndexError::NonContiguous {
                                expected,
                                found: index,
                            })
                        }
                    }
                }
                // Every slot is filled: `expected` distinct indices all below `expected`.
                Self::new(labels.into_iter().flatten().collect())
            }
        }
    }

    pub fn parse_lines(contents: &str) -> Result<Self, LabelIndexError> {
        let labels = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        Self::new(labels)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

/// Resolves class indices to sign labels per backend, and sign labels to the
/// short words shown to users.
#[derive(Debug, Clone, Default)]
pub struct LabelMapper {
    indices: HashMap<String, Arc<LabelIndex>>,
    semantic_words: bool,
}

impl LabelMapper {
    pub fn from_registry(registry: &ModelRegistry, semantic_words: bool) -> Self {
        let indices = registry
            .live()
            .map(|(id, backend)| (id.to_string(), backend.labels.clone()))
            .collect();
        Self {
            indices,
            semantic_words,
        }
    }

    /// `None` only when the backend is unknown or the index is out of range,
    /// both of which the registry rules out when it loads a backend.
    pub fn decode(&self, backend_id: &str, class_index: usize) -> Option<&str> {
        self.indices.get(backend_id)?.label(class_index)
    }

    pub fn word_for(&self, label: &str) -> Option<String> {
        self.semantic_words
            .then(|| to_semantic_word(label).to_string())
    }
}

/// Word shown for a sign. Unmapped labels come back unchanged.
pub fn to_semantic_word(label: &str) -> &str {
    match label {
        "A" => "How",
        "B" => "Are",
        "C" => "You",
        "D" => "I",
        "E" => "Am",
        "F" => "Fine",
        "G" => "About",
        "H" => "Hat",
        "I" => "Ice",
        "J" => "Juice",
        "K" => "Kite",
        "L" => "Lion",
        "M" => "Mouse",
        "N" => "Nest",
        "O" => "Orange",
        "P" => "Pen",
        "Q" => "Queen",
        "R" => "Rabbit",
        "S" => "Sun",
        "T" => "Tree",
        "U" => "Umbrella",
        "V" => "Van",
        "W" => "Water",
        "X" => "Xray",
        "Y" => "Yellow",
        "Z" => "Zebra",
        "del" | "Z_delete" => "Delete",
        "space" | "Z_space" => "Space",
        "nothing" | "Z_nothing" => "Nothing",
        other => other,
    }
}
