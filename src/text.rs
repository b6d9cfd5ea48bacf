use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentSource {
    Structured,
    Recognized,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub source: FragmentSource,
    pub text: String,
}

/// Per-document text accumulator: at most one fragment per page, rendered in
/// ascending page order.
#[derive(Debug, Clone, Default)]
pub struct ExtractedText {
    pages: BTreeMap<u32, Fragment>,
}

impl ExtractedText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, page: u32, source: FragmentSource, text: String) -> bool {
        if self.pages.contains_key(&page) {
            return false;
        }
        self.pages.insert(page, Fragment { source, text });
        true
    }

    pub fn replace(&mut self, page: u32, source: FragmentSource, text: String) -> Option<Fragment> {
        self.pages.insert(page, Fragment { source, text })
    }

    pub fn has_page(&self, page: u32) -> bool {
        self.pages.contains_key(&page)
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn count(&self, source: FragmentSource) -> usize {
        self.pages.values().filter(|f| f.source == source).count()
    }

    pub fn render(&self, delimiter: &str) -> String {
        let mut out = String::new();
        for (page, frag) in &self.pages {
            out.push_str(&delimiter.replace("{page}", &page.to_string()));
            out.push_str(&frag.text);
        }
        out
    }
}
