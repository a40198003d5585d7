//! Repository and security-test registration.

use chrono::Utc;
use validator::Validate;

use crate::db::{Field, Filter, Store};
use crate::errors::AppError;
use crate::models::repository::{CreateRepository, Repository};
use crate::models::security_test::{CreateSecurityTest, SecurityTest, GENERIC_LANGUAGE};

/// Most security tests a repository registration may name.
pub const MAX_NAMED_TESTS: usize = 8;

/// Register a repository.
///
/// With no named tests the generic defaults are attached. Named tests are
/// de-duplicated, capped at `MAX_NAMED_TESTS`, and unknown names are skipped.
pub async fn register_repository(
    store: &dyn Store,
    input: CreateRepository,
) -> Result<Repository, AppError> {
    input.validate()?;
    let url = input.url.trim().to_string();
    if url.is_empty() {
        return Err(AppError::Validation("repositoryURL must not be blank".to_string()));
    }

    let mut names: Vec<String> = Vec::new();
    for name in input.security_test_names {
        let name = name.trim().to_lowercase();
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    if names.len() > MAX_NAMED_TESTS {
        tracing::warn!(
            repository = %url,
            requested = names.len(),
            max = MAX_NAMED_TESTS,
            "Too many security tests named, truncating"
        );
        names.truncate(MAX_NAMED_TESTS);
    }

    let security_tests = if names.is_empty() {
        store
            .find_security_tests(
                &Filter::new()
                    .eq(Field::Language, GENERIC_LANGUAGE)
                    .eq(Field::Default, true),
            )
            .await?
    } else {
        let mut found = Vec::with_capacity(names.len());
        for name in &names {
            match store
                .find_security_test(&Filter::new().eq(Field::Name, name.as_str()))
                .await?
            {
                Some(test) => found.push(test),
                None => tracing::warn!(
                    repository = %url,
                    security_test = %name,
                    "Unknown security test, skipping"
                ),
            }
        }
        found
    };

    let repository = Repository {
        url,
        vm: input.vm,
        security_tests,
        languages: Vec::new(),
        created_at: Utc::now(),
        deleted_at: None,
    };
    store.insert_repository(&repository).await?;

    tracing::info!(
        repository = %repository.url,
        security_tests = repository.security_tests.len(),
        "Repository registered"
    );
    Ok(repository)
}

/// Register a security test. Duplicate names fail with `Conflict`.
pub async fn register_security_test(
    store: &dyn Store,
    input: CreateSecurityTest,
) -> Result<SecurityTest, AppError> {
    input.validate()?;
    let test = input.into_security_test();
    store.insert_security_test(&test).await?;
    tracing::info!(security_test = %test.name, language = %test.language, "Security test registered");
    Ok(test)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;

    fn create_test(name: &str, language: &str) -> CreateSecurityTest {
        CreateSecurityTest {
            name: name.to_string(),
            image: format!("huskyci/{name}"),
            image_tag: None,
            cmd: format!("{name} ."),
            language: language.to_string(),
            default: true,
            timeout_seconds: 120,
        }
    }

    fn create_repository(names: &[&str]) -> CreateRepository {
        CreateRepository {
            url: "https://github.com/acme/api.git".to_string(),
            vm: None,
            security_test_names: names.iter().map(|n| n.to_string()).collect(),
        }
    }

    #[tokio::test]
    async fn duplicate_security_test_is_conflict() {
        let store = MemoryStore::new();
        register_security_test(&store, create_test("bandit", "python"))
            .await
            .unwrap();
        let err = register_security_test(&store, create_test("Bandit", "python"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn invalid_security_test_is_rejected() {
        let store = MemoryStore::new();
        let mut input = create_test("bandit", "python");
        input.timeout_seconds = 0;
        let err = register_security_test(&store, input).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn repository_without_names_gets_generic_defaults() {
        let store = MemoryStore::new();
        register_security_test(&store, create_test("enry", "Generic"))
            .await
            .unwrap();
        register_security_test(&store, create_test("bandit", "python"))
            .await
            .unwrap();

        let repository = register_repository(&store, create_repository(&[]))
            .await
            .unwrap();
        let names: Vec<&str> = repository.security_tests.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["enry"]);
        assert!(repository.languages.is_empty());
    }

    #[tokio::test]
    async fn named_tests_are_deduplicated_and_unknown_skipped() {
        let store = MemoryStore::new();
        register_security_test(&store, create_test("bandit", "python"))
            .await
            .unwrap();

        let repository =
            register_repository(&store, create_repository(&["bandit", "BANDIT", "zap"]))
                .await
                .unwrap();
        assert_eq!(repository.security_tests.len(), 1);
        assert_eq!(repository.security_tests[0].name, "bandit");
    }

    #[tokio::test]
    async fn duplicate_repository_is_conflict() {
        let store = MemoryStore::new();
        register_repository(&store, create_repository(&[])).await.unwrap();
        let err = register_repository(&store, create_repository(&[]))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }
}
