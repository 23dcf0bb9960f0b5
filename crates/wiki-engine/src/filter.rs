use tracing::{debug, warn};

use wiki_types::WikiPath;

use crate::error::{EngineError, EngineResult};

/// A veto raised by a [`PageFilter`].
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct FilterError(pub String);

impl FilterError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Hook run around every page save.
///
/// `pre_save` may rewrite the proposed text or reject it outright. A
/// rejection aborts the save before anything is stored. `post_save` sees
/// the text that was stored; its errors are reported but the save stands.
pub trait PageFilter: Send + Sync {
    fn name(&self) -> &str;

    fn pre_save(&self, _path: &WikiPath, text: &str) -> Result<String, FilterError> {
        Ok(text.to_string())
    }

    fn post_save(&self, _path: &WikiPath, _text: &str) -> Result<(), FilterError> {
        Ok(())
    }
}

/// Ordered chain of page filters.
#[derive(Default)]
pub struct FilterManager {
    filters: Vec<Box<dyn PageFilter>>,
}

impl FilterManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a filter; filters run in insertion order.
    pub fn add(&mut self, filter: Box<dyn PageFilter>) {
        debug!(filter = filter.name(), "registered page filter");
        self.filters.push(filter);
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Pass `text` through every filter's `pre_save`, each seeing the
    /// previous one's output.
    pub fn pre_save(&self, path: &WikiPath, text: &str) -> EngineResult<String> {
        let mut text = text.to_string();
        for filter in &self.filters {
            text = filter
                .pre_save(path, &text)
                .map_err(|e| rejected(filter.as_ref(), path, e))?;
        }
        Ok(text)
    }

    /// Run every filter's `post_save`, stopping at the first error.
    pub fn post_save(&self, path: &WikiPath, text: &str) -> EngineResult<()> {
        for filter in &self.filters {
            filter
                .post_save(path, text)
                .map_err(|e| rejected(filter.as_ref(), path, e))?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for FilterManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.filters.iter().map(|f| f.name()).collect();
        f.debug_struct("FilterManager").field("filters", &names).finish()
    }
}

fn rejected(filter: &dyn PageFilter, path: &WikiPath, err: FilterError) -> EngineError {
    warn!(filter = filter.name(), %path, reason = %err, "filter rejected change");
    EngineError::FilterRejected {
        filter: filter.name().to_string(),
        message: err.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Upper;

    impl PageFilter for Upper {
        fn name(&self) -> &str {
            "upper"
        }

        fn pre_save(&self, _path: &WikiPath, text: &str) -> Result<String, FilterError> {
            Ok(text.to_uppercase())
        }
    }

    struct NoSpam;

    impl PageFilter for NoSpam {
        fn name(&self) -> &str {
            "no-spam"
        }

        fn pre_save(&self, _path: &WikiPath, text: &str) -> Result<String, FilterError> {
            if text.contains("SPAM") {
                return Err(FilterError::new("spam detected"));
            }
            Ok(text.to_string())
        }
    }

    fn p() -> WikiPath {
        WikiPath::parse("Foo").unwrap()
    }

    #[test]
    fn filters_chain_in_order() {
        let mut filters = FilterManager::new();
        filters.add(Box::new(Upper));
        filters.add(Box::new(NoSpam));
        assert_eq!(filters.pre_save(&p(), "hello").unwrap(), "HELLO");

        let err = filters.pre_save(&p(), "buy spam").unwrap_err();
        assert!(matches!(
            err,
            EngineError::FilterRejected { ref filter, ref message }
                if filter == "no-spam" && message == "spam detected"
        ));
    }

    #[test]
    fn empty_chain_passes_text_through() {
        let filters = FilterManager::new();
        assert!(filters.is_empty());
        assert_eq!(filters.pre_save(&p(), "x").unwrap(), "x");
        assert!(filters.post_save(&p(), "x").is_ok());
    }
}
