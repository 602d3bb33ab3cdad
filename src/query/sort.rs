//! Sorting and paging

use super::QueryError;
use super::filter::quote_field;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

/// Requested ordering: field and direction pairs, applied in order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortSpec {
    fields: Vec<(String, Direction)>,
}

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by(field: &str, direction: Direction) -> Self {
        let mut spec = Self::new();
        spec.push(field, direction);
        spec
    }

    pub fn push(&mut self, field: &str, direction: Direction) -> &mut Self {
        self.fields.push((field.to_string(), direction));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Compose into an ORDER BY body (without the keyword)
    pub fn compose(&self) -> Result<Option<String>, QueryError> {
        if self.fields.is_empty() {
            return Ok(None);
        }
        let clauses = self
            .fields
            .iter()
            .map(|(field, direction)| {
                Ok(format!("{} {}", quote_field(field)?, direction.as_sql()))
            })
            .collect::<Result<Vec<_>, QueryError>>()?;
        Ok(Some(clauses.join(", ")))
    }
}

/// Offset/limit window plus the separately-queried total record count
#[derive(Debug, Clone, PartialEq)]
pub struct Pager {
    limit: u64,
    offset: u64,
    records: Option<u64>,
}

impl Pager {
    pub fn new(limit: u64, offset: u64) -> Self {
        Self {
            limit,
            offset,
            records: None,
        }
    }

    /// Construct from a 1-based page number
    pub fn from_page(page: u64, per_page: u64) -> Self {
        let page = page.max(1);
        Self::new(per_page, (page - 1) * per_page)
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Total record count; populated only after the companion count query
    pub fn records_count(&self) -> Option<u64> {
        self.records
    }

    pub fn set_records_count(&mut self, count: u64) {
        self.records = Some(count);
    }

    /// Number of pages for the current window size
    pub fn page_count(&self) -> Option<u64> {
        let records = self.records?;
        if self.limit == 0 {
            return Some(0);
        }
        Some(records.div_ceil(self.limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_composes_in_declaration_order() {
        let mut sort = SortSpec::by("parent_id", Direction::Asc);
        sort.push("b.page_name", Direction::Desc);
        assert_eq!(
            sort.compose().unwrap().as_deref(),
            Some("\"parent_id\" ASC, \"b\".\"page_name\" DESC")
        );
        assert!(SortSpec::new().compose().unwrap().is_none());
    }

    #[test]
    fn sort_rejects_bad_identifiers() {
        let sort = SortSpec::by("name; DROP TABLE x", Direction::Asc);
        assert!(sort.compose().is_err());
    }

    #[test]
    fn pager_window_and_page_count() {
        let mut pager = Pager::from_page(3, 10);
        assert_eq!(pager.limit(), 10);
        assert_eq!(pager.offset(), 20);
        assert_eq!(pager.records_count(), None);
        pager.set_records_count(25);
        assert_eq!(pager.page_count(), Some(3));
    }
}
