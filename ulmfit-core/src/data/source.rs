//! Text sources for labelled classification examples.

use crate::error::ScenarioError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

/// A labelled text as read from a source, before class indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledText {
    pub text: String,
    pub label: String,
}

/// Where a split's examples come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextSource {
    /// Examples embedded in the configuration.
    Inline { examples: Vec<LabeledText> },
    /// JSON Lines file: one object per line.
    Jsonl {
        path: PathBuf,
        #[serde(default = "default_text_field")]
        text_field: String,
        #[serde(default = "default_label_field")]
        label_field: String,
    },
}

fn default_text_field() -> String {
    "text".to_string()
}

fn default_label_field() -> String {
    "label".to_string()
}

impl TextSource {
    pub fn load(&self) -> Result<Vec<LabeledText>, ScenarioError> {
        match self {
            Self::Inline { examples } => Ok(examples.clone()),
            Self::Jsonl {
                path,
                text_field,
                label_field,
            } => load_jsonl(path, text_field, label_field),
        }
    }

    /// Short description for logs.
    pub fn location(&self) -> String {
        match self {
            Self::Inline { examples } => format!("inline ({} examples)", examples.len()),
            Self::Jsonl { path, .. } => path.display().to_string(),
        }
    }
}

fn load_jsonl(
    path: &Path,
    text_field: &str,
    label_field: &str,
) -> Result<Vec<LabeledText>, ScenarioError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ScenarioError::dataset(format!("failed to read {}: {e}", path.display()))
    })?;

    let mut examples = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line).map_err(|e| {
            ScenarioError::dataset(format!("{}:{}: {e}", path.display(), line_no + 1))
        })?;
        let text = value
            .get(text_field)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ScenarioError::dataset(format!(
                    "{}:{}: missing string field '{text_field}'",
                    path.display(),
                    line_no + 1
                ))
            })?;
        let label = match value.get(label_field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => {
                return Err(ScenarioError::dataset(format!(
                    "{}:{}: missing label field '{label_field}'",
                    path.display(),
                    line_no + 1
                )));
            }
        };
        examples.push(LabeledText {
            text: text.to_string(),
            label,
        });
    }
    Ok(examples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_inline_source() {
        let source: TextSource = serde_json::from_value(serde_json::json!({
            "type": "inline",
            "examples": [{"text": "good film", "label": "pos"}]
        }))
        .unwrap();
        let examples = source.load().unwrap();
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].label, "pos");
    }

    #[test]
    fn test_jsonl_source_custom_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"review": "great", "stars": 5}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"review": "awful", "stars": 1}}"#).unwrap();

        let source = TextSource::Jsonl {
            path: file.path().to_path_buf(),
            text_field: "review".to_string(),
            label_field: "stars".to_string(),
        };
        let examples = source.load().unwrap();
        assert_eq!(examples.len(), 2);
        assert_eq!(examples[1].text, "awful");
        assert_eq!(examples[0].label, "5");
    }

    #[test]
    fn test_jsonl_missing_field() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"text": "no label"}}"#).unwrap();
        let source = TextSource::Jsonl {
            path: file.path().to_path_buf(),
            text_field: default_text_field(),
            label_field: default_label_field(),
        };
        assert!(matches!(source.load(), Err(ScenarioError::Dataset(_))));
    }

    #[test]
    fn test_jsonl_missing_file() {
        let source = TextSource::Jsonl {
            path: PathBuf::from("/nonexistent/train.jsonl"),
            text_field: default_text_field(),
            label_field: default_label_field(),
        };
        assert!(matches!(source.load(), Err(ScenarioError::Dataset(_))));
    }
}
