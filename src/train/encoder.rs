use std::collections::BTreeMap;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

/// Maps each distinct label to its rank in sorted order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelEncoder {
    classes: BTreeMap<String, usize>,
}

impl LabelEncoder {
    pub fn fit<'a, I: IntoIterator<Item = &'a str>>(labels: I) -> Self {
        let mut classes: BTreeMap<String, usize> =
            labels.into_iter().map(|l| (l.to_owned(), 0)).collect();
        for (i, code) in classes.values_mut().enumerate() {
            *code = i;
        }
        Self { classes }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn transform(&self, label: &str) -> anyhow::Result<usize> {
        self.classes
            .get(label)
            .copied()
            .ok_or_else(|| anyhow!("Unseen label {label:?}"))
    }
}
