use crate::record::Transaction;
use ahash::AHashSet;

/// Distinct article and customer ids referenced by retained transactions.
/// Owned by the run; each batch step borrows it mutably.
#[derive(Debug, Default)]
pub struct KeyAccumulator {
    articles: AHashSet<i64>,
    customers: AHashSet<String>,
}

impl KeyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the keys of rows that were kept. Sets only grow.
    pub fn record(&mut self, retained: &[Transaction]) {
        for row in retained {
            self.articles.insert(row.article_id);
            if !self.customers.contains(row.customer_id.as_str()) {
                self.customers.insert(row.customer_id.clone());
            }
        }
    }

    /// Freeze once the last batch has been processed.
    pub fn finish(self) -> RetainedKeys {
        RetainedKeys { articles: self.articles, customers: self.customers }
    }
}

/// Read-only membership filter for the catalog pass.
#[derive(Debug, Default)]
pub struct RetainedKeys {
    articles: AHashSet<i64>,
    customers: AHashSet<String>,
}

impl RetainedKeys {
    pub fn from_sets(articles: AHashSet<i64>, customers: AHashSet<String>) -> Self {
        Self { articles, customers }
    }

    #[inline]
    pub fn has_article(&self, id: i64) -> bool {
        self.articles.contains(&id)
    }

    #[inline]
    pub fn has_customer(&self, id: &str) -> bool {
        self.customers.contains(id)
    }

    pub fn article_count(&self) -> usize {
        self.articles.len()
    }

    pub fn customer_count(&self) -> usize {
        self.customers.len()
    }
}
