//! The yt-dlp subprocess runner.
//!
//! Extraction is delegated to an external `yt-dlp` binary so format and
//! site churn stay out of this codebase. The runner is behind a trait so
//! the cache can be exercised without network or a real binary.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{EnsembleError, EnsembleResult};
use crate::state::ExtractionConfig;

/// Produces an mp3 file for a video id inside `dest_dir`.
///
/// Implementations must be safe to call concurrently for distinct ids; the
/// cache guarantees at most one in-flight call per id.
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    async fn extract(&self, video_id: &str, dest_dir: &Path) -> EnsembleResult<PathBuf>;
}

pub struct YtDlpExtractor {
    bin: PathBuf,
    cookies_path: Option<PathBuf>,
    timeout: Duration,
}

impl YtDlpExtractor {
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            bin: config.yt_dlp_path.clone(),
            cookies_path: config.cookies_path.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn build_command(&self, video_id: &str, dest_dir: &Path) -> Command {
        // The output template keeps yt-dlp's post-processor in charge of
        // the final extension; with --audio-format mp3 it lands on .mp3.
        let template = dest_dir.join(format!("{video_id}.%(ext)s"));
        let url = format!("https://www.youtube.com/watch?v={video_id}");

        let mut cmd = Command::new(&self.bin);
        cmd.arg("-f")
            .arg("bestaudio")
            .arg("--extract-audio")
            .arg("--audio-format")
            .arg("mp3")
            .arg("--geo-bypass")
            .arg("--no-playlist")
            .arg("-o")
            .arg(&template);
        if let Some(cookies) = &self.cookies_path {
            cmd.arg("--cookies").arg(cookies);
        }
        cmd.arg(&url);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl AudioExtractor for YtDlpExtractor {
    async fn extract(&self, video_id: &str, dest_dir: &Path) -> EnsembleResult<PathBuf> {
        let final_path = dest_dir.join(format!("{video_id}.mp3"));
        let mut cmd = self.build_command(video_id, dest_dir);

        log::info!("[Extract] Spawning {} for {}", self.bin.display(), video_id);
        let child = cmd.spawn().map_err(|e| EnsembleError::Extraction {
            video_id: video_id.to_string(),
            cause: format!("failed to spawn {}: {}", self.bin.display(), e),
        })?;

        // kill_on_drop reaps the child when the timeout fires
        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| EnsembleError::Extraction {
                video_id: video_id.to_string(),
                cause: format!("{} timed out after {:?}", self.bin.display(), self.timeout),
            })?
            .map_err(|e| EnsembleError::Extraction {
                video_id: video_id.to_string(),
                cause: format!("failed to wait on {}: {}", self.bin.display(), e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let cause = stderr
                .lines()
                .rev()
                .find(|l| !l.trim().is_empty())
                .unwrap_or("no stderr output")
                .to_string();
            return Err(EnsembleError::Extraction {
                video_id: video_id.to_string(),
                cause: format!("{} exited with {}: {}", self.bin.display(), output.status, cause),
            });
        }

        match tokio::fs::metadata(&final_path).await {
            Ok(meta) if meta.is_file() => Ok(final_path),
            _ => Err(EnsembleError::Extraction {
                video_id: video_id.to_string(),
                cause: format!("{} reported success but produced no file", self.bin.display()),
            }),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_bin(bin: &str) -> ExtractionConfig {
        ExtractionConfig {
            yt_dlp_path: PathBuf::from(bin),
            ..ExtractionConfig::default()
        }
    }

    #[test]
    fn command_carries_extraction_flags() {
        let extractor = YtDlpExtractor::new(&config_with_bin("yt-dlp"));
        let cmd = extractor.build_command("abc12345678", Path::new("/tmp/cache"));
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        for flag in ["-f", "bestaudio", "--extract-audio", "--geo-bypass", "--no-playlist"] {
            assert!(args.contains(&flag.to_string()), "missing {}", flag);
        }
        assert!(args
            .iter()
            .any(|a| a == "https://www.youtube.com/watch?v=abc12345678"));
        assert!(args.iter().any(|a| a.contains("abc12345678.%(ext)s")));
        // No cookies configured, no cookies flag
        assert!(!args.contains(&"--cookies".to_string()));
    }

    #[test]
    fn command_carries_cookies_when_configured() {
        let mut config = config_with_bin("yt-dlp");
        config.cookies_path = Some(PathBuf::from("/etc/ensemble/cookies.txt"));
        let extractor = YtDlpExtractor::new(&config);
        let cmd = extractor.build_command("abc12345678", Path::new("/tmp/cache"));
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert!(args.contains(&"--cookies".to_string()));
        assert!(args.contains(&"/etc/ensemble/cookies.txt".to_string()));
    }

    #[cfg(unix)]
    mod subprocess {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        /// Writes an executable stand-in for yt-dlp into `dir`.
        fn fake_yt_dlp(dir: &Path, body: &str) -> String {
            let path = dir.join("yt-dlp");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            path.to_string_lossy().into_owned()
        }

        // Resolves the -o template the way yt-dlp's mp3 post-processor would
        const WRITE_OUTPUT: &str = r#"
out=""
prev=""
for a in "$@"; do
  if [ "$prev" = "-o" ]; then out="$a"; fi
  prev="$a"
done
printf 'audio' > "$(printf '%s' "$out" | sed 's/%(ext)s/mp3/')"
"#;

        #[tokio::test]
        async fn successful_run_yields_mp3_path() {
            let dir = tempfile::tempdir().unwrap();
            let bin = fake_yt_dlp(dir.path(), WRITE_OUTPUT);
            let extractor = YtDlpExtractor::new(&config_with_bin(&bin));

            let path = extractor.extract("abc12345678", dir.path()).await.unwrap();
            assert_eq!(path, dir.path().join("abc12345678.mp3"));
            assert_eq!(std::fs::read(&path).unwrap(), b"audio");
        }

        #[tokio::test]
        async fn nonzero_exit_surfaces_stderr() {
            let dir = tempfile::tempdir().unwrap();
            let bin = fake_yt_dlp(dir.path(), "echo 'ERROR: video unavailable' >&2\nexit 1");
            let extractor = YtDlpExtractor::new(&config_with_bin(&bin));

            let err = extractor
                .extract("abc12345678", dir.path())
                .await
                .unwrap_err();
            match err {
                EnsembleError::Extraction { video_id, cause } => {
                    assert_eq!(video_id, "abc12345678");
                    assert!(cause.contains("video unavailable"), "cause: {}", cause);
                }
                other => panic!("expected extraction error, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn success_without_output_file_is_an_error() {
            let dir = tempfile::tempdir().unwrap();
            let bin = fake_yt_dlp(dir.path(), "exit 0");
            let extractor = YtDlpExtractor::new(&config_with_bin(&bin));

            let err = extractor
                .extract("abc12345678", dir.path())
                .await
                .unwrap_err();
            assert!(matches!(err, EnsembleError::Extraction { .. }));
        }

        #[tokio::test]
        async fn hung_process_times_out() {
            let dir = tempfile::tempdir().unwrap();
            let bin = fake_yt_dlp(dir.path(), "sleep 30");
            let mut config = config_with_bin(&bin);
            config.timeout_secs = 1;
            let extractor = YtDlpExtractor::new(&config);

            let err = extractor
                .extract("abc12345678", dir.path())
                .await
                .unwrap_err();
            match err {
                EnsembleError::Extraction { cause, .. } => {
                    assert!(cause.contains("timed out"), "cause: {}", cause)
                }
                other => panic!("expected extraction error, got {:?}", other),
            }
        }
    }
}
