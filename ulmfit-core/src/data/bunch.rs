//! Indexed examples and the train/valid bundles handed to learners.

use serde::{Deserialize, Serialize};

/// A text with its class index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    pub text: String,
    pub label: usize,
}

/// Which half of a [`DataBunch`] to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Train,
    Valid,
}

/// Training and validation examples sharing one class vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataBunch {
    pub train: Vec<Example>,
    pub valid: Vec<Example>,
    pub classes: Vec<String>,
}

impl DataBunch {
    pub fn split(&self, split: Split) -> &[Example] {
        match split {
            Split::Train => &self.train,
            Split::Valid => &self.valid,
        }
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Labels of a split, in example order.
    pub fn labels(&self, split: Split) -> Vec<usize> {
        self.split(split).iter().map(|e| e.label).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_access() {
        let bunch = DataBunch {
            train: vec![Example {
                text: "a".into(),
                label: 1,
            }],
            valid: vec![],
            classes: vec!["neg".into(), "pos".into()],
        };
        assert_eq!(bunch.labels(Split::Train), vec![1]);
        assert!(bunch.split(Split::Valid).is_empty());
        assert_eq!(bunch.num_classes(), 2);
    }
}
