//! Listing queries: pagination and sorting

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use super::models::{Patient, TherapySession};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    pub fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => anyhow::bail!("Unknown sort order: {}", s),
        }
    }

    fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

/// Page/sort parameters for list endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub page: u32,
    pub page_size: u32,
    pub sort_by: Option<String>,
    pub order: SortOrder,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
            sort_by: None,
            order: SortOrder::Asc,
        }
    }
}

impl ListQuery {
    /// Query-string pairs understood by the backend (`skip` / `limit`)
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let page = u64::from(self.page.max(1));
        let skip = (page - 1) * u64::from(self.page_size);
        let mut pairs = vec![
            ("skip".to_string(), skip.to_string()),
            ("limit".to_string(), self.page_size.to_string()),
        ];
        if let Some(sort_by) = &self.sort_by {
            pairs.push(("sort_by".to_string(), sort_by.clone()));
            pairs.push(("order".to_string(), self.order.as_str().to_string()));
        }
        pairs
    }
}

/// One page of an already-fetched collection
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub page_size: u32,
    pub total: usize,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u32 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(self.page_size as usize) as u32
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }
}

/// Slice a collection into a page (1-based)
pub fn paginate<T: Clone>(items: &[T], page: u32, page_size: u32) -> Page<T> {
    let page = page.max(1);
    let start = ((page - 1) as usize).saturating_mul(page_size as usize);
    let slice = if start >= items.len() || page_size == 0 {
        Vec::new()
    } else {
        let end = (start + page_size as usize).min(items.len());
        items[start..end].to_vec()
    };
    Page {
        items: slice,
        page,
        page_size,
        total: items.len(),
    }
}

/// Collections that can be sorted by a named column
pub trait Sortable {
    fn compare_by(&self, other: &Self, column: &str) -> Option<Ordering>;
}

impl Sortable for Patient {
    fn compare_by(&self, other: &Self, column: &str) -> Option<Ordering> {
        match column {
            "name" => Some(self.name.to_lowercase().cmp(&other.name.to_lowercase())),
            "email" => Some(self.email.cmp(&other.email)),
            "created_at" => Some(self.created_at.cmp(&other.created_at)),
            _ => None,
        }
    }
}

impl Sortable for TherapySession {
    fn compare_by(&self, other: &Self, column: &str) -> Option<Ordering> {
        match column {
            "session_date" => Some(self.session_date.cmp(&other.session_date)),
            "status" => Some(self.status.as_str().cmp(other.status.as_str())),
            "created_at" => Some(self.created_at.cmp(&other.created_at)),
            _ => None,
        }
    }
}

/// Stable sort; unknown columns leave the order untouched
pub fn sort_by_column<T: Sortable>(items: &mut [T], column: &str, order: SortOrder) {
    items.sort_by(|a, b| {
        a.compare_by(b, column)
            .map(|ordering| order.apply(ordering))
            .unwrap_or(Ordering::Equal)
    });
}
