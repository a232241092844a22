//! External syntax checker for candidate documents.

use std::ffi::OsStr;
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, error};

use promsync_core::error::{ReconcileError, ValidationError};
use promsync_scrape::assembler::CandidateBytes;

/// Validates candidate bytes before they are allowed near the live file.
#[async_trait]
pub trait ConfigCheck: Send + Sync {
    async fn check(&self, candidate: &CandidateBytes) -> Result<(), ReconcileError>;

    /// Checker version string, used as a readiness probe.
    async fn version(&self) -> Result<String, ReconcileError>;
}

/// Runs a promtool-compatible CLI: `<checker> check config <file>`.
pub struct PromtoolChecker {
    path: PathBuf,
    timeout: Duration,
    classifier: OutputClassifier,
}

impl PromtoolChecker {
    pub fn new(path: PathBuf, timeout: Duration) -> Result<Self, ReconcileError> {
        let classifier =
            OutputClassifier::new().map_err(|e| ReconcileError::Infrastructure(e.to_string()))?;
        Ok(Self {
            path,
            timeout,
            classifier,
        })
    }

    /// Run the checker with `args`, returning (success, combined output).
    async fn run(&self, args: &[&OsStr]) -> Result<(bool, String), ReconcileError> {
        let child = tokio::process::Command::new(&self.path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ReconcileError::Infrastructure(format!(
                    "failed to launch {}: {e}",
                    self.path.display()
                ))
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                ReconcileError::Infrastructure(format!(
                    "{} timed out after {}ms",
                    self.path.display(),
                    self.timeout.as_millis()
                ))
            })?
            .map_err(|e| ReconcileError::Infrastructure(e.to_string()))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok((output.status.success(), combined))
    }
}

#[async_trait]
impl ConfigCheck for PromtoolChecker {
    async fn check(&self, candidate: &CandidateBytes) -> Result<(), ReconcileError> {
        let mut file = tempfile::Builder::new()
            .prefix("promsync-config-")
            .suffix(".yml")
            .tempfile()
            .map_err(|e| ReconcileError::Infrastructure(format!("temp file: {e}")))?;
        file.write_all(candidate.as_bytes())
            .and_then(|()| file.flush())
            .map_err(|e| ReconcileError::Infrastructure(format!("temp file: {e}")))?;

        let (success, output) = self
            .run(&[OsStr::new("check"), OsStr::new("config"), file.path().as_os_str()])
            .await?;

        let result = self.classifier.classify(success, &output);
        match &result {
            Ok(()) => debug!(%output, "Checker accepted configuration"),
            Err(e) => error!(%e, %output, "Checker rejected configuration"),
        }
        result
    }

    async fn version(&self) -> Result<String, ReconcileError> {
        let (success, output) = self.run(&[OsStr::new("--version")]).await?;
        if !success {
            return Err(ReconcileError::Infrastructure(output));
        }
        debug!(%output, "Checker version");
        Ok(output.trim().to_string())
    }
}

/// Maps checker exit status and output to a verdict.
pub struct OutputClassifier {
    failed: Regex,
    zero: Regex,
}

impl OutputClassifier {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            failed: Regex::new(r"FAILED: parsing YAML file \S+: (.+)")?,
            zero: Regex::new(r"SUCCESS: 0 (?:rules|jobs) found")?,
        })
    }

    pub fn classify(&self, success: bool, output: &str) -> Result<(), ReconcileError> {
        if success {
            if self.zero.is_match(output) {
                return Err(ValidationError::Empty.into());
            }
            return Ok(());
        }
        match self.failed.captures(output).and_then(|c| c.get(1)) {
            Some(reason) => Err(ValidationError::Rejected(reason.as_str().trim_end().to_string()).into()),
            None => Err(ReconcileError::Infrastructure(format!(
                "checker failed: {}",
                output.trim()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::fake_checker;

    fn classifier() -> OutputClassifier {
        OutputClassifier::new().unwrap()
    }

    fn candidate() -> CandidateBytes {
        let doc = promsync_core::document::Document::default();
        promsync_scrape::assembler::to_candidate_bytes(&doc, "test").unwrap()
    }

    #[test]
    fn test_classify_success() {
        let out = "Checking /tmp/x.yml\n  SUCCESS: 0 rule files found\n";
        assert!(classifier().classify(true, out).is_ok());
    }

    #[test]
    fn test_classify_empty() {
        let err = classifier()
            .classify(true, "Checking /tmp/x\n  SUCCESS: 0 rules found\n")
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Validation(ValidationError::Empty)));
    }

    #[test]
    fn test_classify_rejected_reason_verbatim() {
        let out = "Checking /tmp/promsync-config-1.yml\n  FAILED: parsing YAML file /tmp/promsync-config-1.yml: bad indentation\n";
        let err = classifier().classify(false, out).unwrap_err();
        assert_eq!(err.to_string(), "bad indentation");
        assert!(matches!(err, ReconcileError::Validation(ValidationError::Rejected(_))));
    }

    #[test]
    fn test_classify_other_failure_is_infrastructure() {
        let err = classifier().classify(false, "segfault").unwrap_err();
        assert!(err.is_infrastructure());
    }

    #[tokio::test]
    async fn test_checker_accepts() {
        let dir = tempfile::tempdir().unwrap();
        let path = fake_checker(dir.path(), r#"[ "$1 $2" = "check config" ] && [ -f "$3" ] && echo "SUCCESS: $3 is valid""#);
        let checker = PromtoolChecker::new(path, Duration::from_secs(3)).unwrap();
        checker.check(&candidate()).await.unwrap();
    }

    #[tokio::test]
    async fn test_checker_rejects_with_reason() {
        let dir = tempfile::tempdir().unwrap();
        let path = fake_checker(
            dir.path(),
            r#"echo "  FAILED: parsing YAML file $3: bad indentation" >&2; exit 1"#,
        );
        let checker = PromtoolChecker::new(path, Duration::from_secs(3)).unwrap();
        let err = checker.check(&candidate()).await.unwrap_err();
        assert_eq!(err.to_string(), "bad indentation");
    }

    #[tokio::test]
    async fn test_checker_temp_file_removed() {
        let dir = tempfile::tempdir().unwrap();
        let record = dir.path().join("seen");
        let path = fake_checker(
            dir.path(),
            &format!(r#"echo "$3" > {}; exit 0"#, record.display()),
        );
        let checker = PromtoolChecker::new(path, Duration::from_secs(3)).unwrap();
        checker.check(&candidate()).await.unwrap();

        let seen = std::fs::read_to_string(&record).unwrap();
        assert!(!std::path::Path::new(seen.trim()).exists());
    }

    #[tokio::test]
    async fn test_checker_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = fake_checker(dir.path(), "sleep 5");
        let checker = PromtoolChecker::new(path, Duration::from_millis(200)).unwrap();
        let err = checker.check(&candidate()).await.unwrap_err();
        assert!(err.is_infrastructure());
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_checker_missing_binary() {
        let checker =
            PromtoolChecker::new("/nonexistent/promtool".into(), Duration::from_secs(1)).unwrap();
        assert!(checker.check(&candidate()).await.unwrap_err().is_infrastructure());
        assert!(checker.version().await.unwrap_err().is_infrastructure());
    }

    #[tokio::test]
    async fn test_checker_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = fake_checker(dir.path(), r#"echo "promtool, version 2.45.0""#);
        let checker = PromtoolChecker::new(path, Duration::from_secs(3)).unwrap();
        assert_eq!(checker.version().await.unwrap(), "promtool, version 2.45.0");
    }
}
