//! Language/test selector: detected languages to default security tests.

use std::sync::Arc;

use crate::db::{Field, Filter, Store};
use crate::models::security_test::{SecurityTest, GENERIC_LANGUAGE};

#[derive(Clone)]
pub struct Selector {
    store: Arc<dyn Store>,
}

impl Selector {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Default tests for each language in detection order, generic defaults last.
    ///
    /// Duplicates are kept. A lookup failure for one language is logged and
    /// that language contributes nothing.
    pub async fn select_tests(&self, languages: &[String]) -> Vec<SecurityTest> {
        let mut selected = Vec::new();
        for language in languages {
            selected.extend(self.defaults_for(&language.to_lowercase()).await);
        }
        selected.extend(self.defaults_for(GENERIC_LANGUAGE).await);
        selected
    }

    async fn defaults_for(&self, language: &str) -> Vec<SecurityTest> {
        let filter = Filter::new()
            .eq(Field::Language, language)
            .eq(Field::Default, true);
        match self.store.find_security_tests(&filter).await {
            Ok(tests) => {
                if tests.is_empty() {
                    tracing::debug!(language = %language, "No default security test for language");
                }
                tests
            }
            Err(e) => {
                tracing::warn!(
                    language = %language,
                    error = %e,
                    "Security test lookup failed, skipping language"
                );
                Vec::new()
            }
        }
    }
}
