use crate::resp::Command;

pub const DEFAULT_OFFSET: usize = 0;
pub const DEFAULT_COUNT: usize = 100;

/// A search request in the store's native query grammar, with a result window
/// and optional sorting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    text: String,
    offset: usize,
    count: usize,
    sort: Option<SortBy>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortBy {
    pub field: String,
    /// `None` leaves the direction to the store.
    pub ascending: Option<bool>,
}

impl SearchQuery {
    /// An empty query string matches every document in the index.
    pub fn new(text: &str) -> Self {
        SearchQuery {
            text: text.to_string(),
            offset: DEFAULT_OFFSET,
            count: DEFAULT_COUNT,
            sort: None,
        }
    }

    /// Return at most `count` results starting at `offset`.
    pub fn limit(mut self, offset: usize, count: usize) -> Self {
        self.offset = offset;
        self.count = count;
        self
    }

    pub fn sort_by(mut self, field: &str, ascending: Option<bool>) -> Self {
        self.sort = Some(SortBy {
            field: field.to_string(),
            ascending,
        });
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn sort(&self) -> Option<&SortBy> {
        self.sort.as_ref()
    }

    /// The query string as sent; blank queries become the match-all `*`.
    pub fn effective_text(&self) -> &str {
        let trimmed = self.text.trim();
        if trimmed.is_empty() {
            "*"
        } else {
            trimmed
        }
    }

    /// `FT.SEARCH <index> <query> LIMIT <offset> <count> [SORTBY <field> [ASC|DESC]]`
    pub fn to_command(&self, index: &str) -> Command {
        let mut cmd = Command::new("FT.SEARCH")
            .arg(index)
            .arg(self.effective_text())
            .arg("LIMIT")
            .arg(self.offset.to_string())
            .arg(self.count.to_string());

        if let Some(sort) = &self.sort {
            cmd = cmd.arg("SORTBY").arg(&sort.field);
            match sort.ascending {
                Some(true) => cmd = cmd.arg("ASC"),
                Some(false) => cmd = cmd.arg("DESC"),
                None => {}
            }
        }
        cmd
    }
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self::new("")
    }
}
