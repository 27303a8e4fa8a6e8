//! Batch job ids.
//!
//! Batch requires ids matching `^[a-z]([a-z0-9-]{0,61}[a-z0-9])?$`.

use uuid::Uuid;

use crate::error::CoreError;

const MAX_JOB_ID_LEN: usize = 63;

/// Generate a unique job id: `{prefix}-{uuid v4}`.
pub fn generate(prefix: &str) -> Result<String, CoreError> {
    let id = format!("{prefix}-{}", Uuid::new_v4());
    if is_valid_job_id(&id) {
        Ok(id)
    } else {
        Err(CoreError::InvalidJobId(id))
    }
}

pub fn is_valid_job_id(id: &str) -> bool {
    let bytes = id.as_bytes();
    match (bytes.first(), bytes.last()) {
        (Some(first), Some(last)) => {
            id.len() <= MAX_JOB_ID_LEN
                && first.is_ascii_lowercase()
                && (last.is_ascii_lowercase() || last.is_ascii_digit())
                && bytes
                    .iter()
                    .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn generated_ids_are_valid_and_unique() {
        let a = generate("netcat-job").expect("valid id");
        let b = generate("netcat-job").expect("valid id");
        assert!(a.starts_with("netcat-job-"));
        assert_eq!(a.len(), "netcat-job-".len() + 36);
        assert_ne!(a, b);
    }

    #[test]
    fn overlong_prefix_is_rejected() {
        let prefix = "x".repeat(40);
        assert_matches!(generate(&prefix), Err(CoreError::InvalidJobId(_)));
    }

    #[test]
    fn validity_rules() {
        assert!(is_valid_job_id("a"));
        assert!(is_valid_job_id("nfs-test-1"));
        assert!(!is_valid_job_id(""));
        assert!(!is_valid_job_id("1abc"));
        assert!(!is_valid_job_id("abc-"));
        assert!(!is_valid_job_id("Upper"));
        assert!(!is_valid_job_id("under_score"));
        assert!(!is_valid_job_id(&"a".repeat(64)));
    }
}
