//! Security test (scan tool) definitions.

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Pseudo-language whose default tests apply to every repository.
pub const GENERIC_LANGUAGE: &str = "generic";

/// Name of the language detector test that feeds job selection.
pub const DETECTOR_TEST_NAME: &str = "enry";

/// Placeholder in a command template replaced by the configured secret at run time.
pub const SECRET_PLACEHOLDER: &str = "GIT_PRIVATE_SSH_KEY";

/// A registered scan tool: which image to run, how, and for which language.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SecurityTest {
    pub name: String,
    pub image: String,
    #[serde(rename = "imageTag")]
    pub image_tag: String,
    pub cmd: String,
    pub language: String,
    pub default: bool,
    #[serde(rename = "timeOutSeconds")]
    pub timeout_seconds: i32,
}

impl SecurityTest {
    /// Full image reference (`image:tag`) handed to the execution backend.
    pub fn image_ref(&self) -> String {
        if self.image_tag.is_empty() {
            format!("{}:latest", self.image)
        } else {
            format!("{}:{}", self.image, self.image_tag)
        }
    }

    /// Wait timeout, never below one second.
    pub fn timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.timeout_seconds.max(1) as u64)
    }
}

/// Registration payload for a new security test.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateSecurityTest {
    #[validate(length(min = 1, max = 64))]
    pub name: String,
    #[validate(length(min = 1))]
    pub image: String,
    #[serde(rename = "imageTag", default)]
    pub image_tag: Option<String>,
    #[validate(length(min = 1))]
    pub cmd: String,
    #[validate(length(min = 1))]
    pub language: String,
    #[serde(default)]
    pub default: bool,
    #[serde(rename = "timeOutSeconds")]
    #[validate(range(min = 1, max = 86400))]
    pub timeout_seconds: i32,
}

impl CreateSecurityTest {
    /// Build the stored record. Names and languages are lowercased so that
    /// selection by detected language is case-insensitive.
    pub fn into_security_test(self) -> SecurityTest {
        SecurityTest {
            name: self.name.trim().to_lowercase(),
            image: self.image.trim().to_string(),
            image_tag: self
                .image_tag
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| "latest".to_string()),
            cmd: self.cmd,
            language: self.language.trim().to_lowercase(),
            default: self.default,
            timeout_seconds: self.timeout_seconds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_payload() -> CreateSecurityTest {
        CreateSecurityTest {
            name: " Bandit ".to_string(),
            image: "huskyci/bandit".to_string(),
            image_tag: None,
            cmd: "bandit -r code -f json".to_string(),
            language: "Python".to_string(),
            default: true,
            timeout_seconds: 360,
        }
    }

    #[test]
    fn into_security_test_normalizes_name_and_language() {
        let test = create_payload().into_security_test();
        assert_eq!(test.name, "bandit");
        assert_eq!(test.language, "python");
        assert_eq!(test.image_tag, "latest");
    }

    #[test]
    fn image_ref_joins_tag() {
        let mut test = create_payload().into_security_test();
        assert_eq!(test.image_ref(), "huskyci/bandit:latest");
        test.image_tag = "1.7.5".to_string();
        assert_eq!(test.image_ref(), "huskyci/bandit:1.7.5");
    }

    #[test]
    fn timeout_has_floor_of_one_second() {
        let mut test = create_payload().into_security_test();
        test.timeout_seconds = 0;
        assert_eq!(test.timeout(), std::time::Duration::from_secs(1));
    }

    #[test]
    fn validation_rejects_empty_name() {
        let mut payload = create_payload();
        payload.name = String::new();
        assert!(payload.validate().is_err());
    }

    #[test]
    fn serializes_with_wire_field_names() {
        let test = create_payload().into_security_test();
        let json = serde_json::to_value(&test).unwrap();
        assert_eq!(json["timeOutSeconds"], 360);
        assert_eq!(json["imageTag"], "latest");
        assert_eq!(json["default"], true);
    }
}
