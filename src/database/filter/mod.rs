#[cfg(test)]
mod tests;

use itertools::Itertools;

use super::StoredRow;
use super::schema::fields;

/// Conjunction of exact-match restrictions applied to queries and searches
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    file_id: Option<i64>,
    categories: Option<Vec<String>>,
}

impl Filter {
    /// Filter that matches every row
    #[inline]
    pub fn all() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_file_id(mut self, file_id: i64) -> Self {
        self.file_id = Some(file_id);
        self
    }

    /// Restrict to rows whose category is one of `categories`. An empty set matches
    /// nothing.
    #[inline]
    pub fn with_categories<I, S>(mut self, categories: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories = Some(categories.into_iter().map(Into::into).collect());
        self
    }

    #[inline]
    pub fn file_id(&self) -> Option<i64> {
        self.file_id
    }

    #[inline]
    pub fn categories(&self) -> Option<&[String]> {
        self.categories.as_deref()
    }

    #[inline]
    pub fn is_unrestricted(&self) -> bool {
        self.file_id.is_none() && self.categories.is_none()
    }

    /// Render as a SQL predicate, or `None` when nothing is restricted
    #[inline]
    pub fn to_sql(&self) -> Option<String> {
        let mut clauses = Vec::new();

        if let Some(file_id) = self.file_id {
            clauses.push(format!("{} = {}", fields::FILE_ID, file_id));
        }

        if let Some(categories) = &self.categories {
            if categories.is_empty() {
                clauses.push("1 = 0".to_string());
            } else {
                clauses.push(format!(
                    "{} IN ({})",
                    fields::CATEGORY,
                    categories.iter().map(|c| quote(c)).join(", ")
                ));
            }
        }

        (!clauses.is_empty()).then(|| clauses.join(" AND "))
    }

    #[inline]
    pub fn matches(&self, row: &StoredRow) -> bool {
        if self.file_id.is_some_and(|id| id != row.file_id) {
            return false;
        }

        match &self.categories {
            Some(categories) => categories.iter().any(|c| *c == row.category),
            None => true,
        }
    }
}

/// Quote a string literal, doubling embedded single quotes
fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
