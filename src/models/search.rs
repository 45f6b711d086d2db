use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a reader was searching for, carried as its numeric code on the wire
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(into = "i16", from = "i16")]
pub enum SearchType {
    Work,
    Author,
    Tag,
}

impl SearchType {
    pub fn code(self) -> i16 {
        match self {
            SearchType::Work => 1,
            SearchType::Author => 2,
            SearchType::Tag => 3,
        }
    }

    /// Unknown codes are treated as plain work searches
    pub fn from_code(code: i16) -> Self {
        match code {
            2 => SearchType::Author,
            3 => SearchType::Tag,
            _ => SearchType::Work,
        }
    }

    /// Infers the search type from the submitted keyword
    pub fn infer(keyword: &str, by_author: bool) -> Self {
        if by_author {
            SearchType::Author
        } else if keyword.trim_start().starts_with('#') {
            SearchType::Tag
        } else {
            SearchType::Work
        }
    }
}

impl From<SearchType> for i16 {
    fn from(search_type: SearchType) -> Self {
        search_type.code()
    }
}

impl From<i16> for SearchType {
    fn from(code: i16) -> Self {
        SearchType::from_code(code)
    }
}

/// One search-history entry
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchRecord {
    pub keyword: String,
    pub search_time: DateTime<Utc>,
    pub search_type: SearchType,
}
