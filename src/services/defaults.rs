//! Built-in security tests inserted at boot when missing.

use crate::db::{Field, Filter, Store};
use crate::errors::AppError;
use crate::models::security_test::{SecurityTest, DETECTOR_TEST_NAME, GENERIC_LANGUAGE};

/// Clone step shared by every built-in command. Prints the cloning-failure
/// marker and stops when the source cannot be fetched.
const CLONE: &str = "mkdir -p ~/.ssh && echo 'GIT_PRIVATE_SSH_KEY' > ~/.ssh/id_rsa && chmod 600 ~/.ssh/id_rsa && \
    git clone -q %GIT_REPO% code 2>/dev/null || { echo 'ERROR_CLONING'; exit 1; }; cd code";

fn builtin(
    name: &str,
    language: &str,
    tool_cmd: &str,
    timeout_seconds: i32,
) -> SecurityTest {
    SecurityTest {
        name: name.to_string(),
        image: format!("huskyci/{name}"),
        image_tag: "latest".to_string(),
        cmd: format!("{CLONE} && {tool_cmd}"),
        language: language.to_string(),
        default: true,
        timeout_seconds,
    }
}

pub fn default_security_tests() -> Vec<SecurityTest> {
    vec![
        builtin(DETECTOR_TEST_NAME, GENERIC_LANGUAGE, "enry --json", 60),
        builtin("gosec", "go", "gosec -quiet -fmt=json ./... 2>/dev/null", 360),
        builtin("bandit", "python", "bandit -r . -f json 2>/dev/null", 360),
        builtin("safety", "python", "safety check -r requirements.txt --json 2>/dev/null", 360),
        builtin("brakeman", "ruby", "brakeman -q --no-exit-on-warn -f json .", 360),
        builtin(
            "retirejs",
            "javascript",
            "retire --outputformat json --outputpath /dev/stdout 2>/dev/null",
            360,
        ),
    ]
}

/// Insert every built-in test not yet registered. Returns how many were added.
pub async fn ensure_defaults(store: &dyn Store) -> Result<usize, AppError> {
    let mut inserted = 0;
    for test in default_security_tests() {
        let existing = store
            .find_security_test(&Filter::new().eq(Field::Name, test.name.as_str()))
            .await?;
        if existing.is_some() {
            continue;
        }
        match store.insert_security_test(&test).await {
            Ok(()) => {
                tracing::warn!(security_test = %test.name, "Default security test missing, inserted");
                inserted += 1;
            }
            Err(e) if e.is_conflict() => {}
            Err(e) => return Err(e),
        }
    }
    Ok(inserted)
}
