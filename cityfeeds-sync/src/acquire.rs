//! Obtain the bytes of one feed according to its [`Directive`].

use std::io::{ErrorKind, Read};
use std::path::Path;
use std::process::{Command, Stdio};

use cityfeeds_core::{Directive, FeedKey};

use crate::error::{io_err, SyncError};
use crate::transitfeeds::{FeedVersion, TransitFeeds};
use crate::transport::{HttpResponse, Transport};

const CHUNK: usize = 64 * 1024;
const MIB: u64 = 1024 * 1024;

/// A payload and, for network strategies, the URL it was served from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquired {
    pub payload: Vec<u8>,
    pub final_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
    Acquired(Acquired),
    /// Nothing to persist; the feed is skipped for this run.
    Unavailable(String),
}

/// Runs acquisition strategies for the feeds of one city.
pub struct FeedAcquirer<'a> {
    pub feeds: &'a TransitFeeds,
    pub transport: &'a dyn Transport,
    pub city_dir: &'a Path,
}

impl FeedAcquirer<'_> {
    /// `bundle` is the feed's cache file, read by [`Directive::LocalFile`].
    pub fn acquire(
        &self,
        key: &FeedKey,
        directive: Directive<'_>,
        bundle: &Path,
    ) -> Result<Acquisition, SyncError> {
        tracing::info!("{key}: acquiring via {}", directive.label());
        match directive {
            Directive::Script(command) => self.run_script(command),
            Directive::RemoteFeed(feed_id) => match self.feeds.latest_feed_version(feed_id)? {
                FeedVersion::Payload(response) => download(key, response),
                FeedVersion::ServiceError(reason) => {
                    tracing::warn!("{key}: feed service error: {reason}");
                    Ok(Acquisition::Unavailable(reason))
                }
            },
            Directive::DirectUrl(url) => {
                let response = self.transport.get(url, &[])?;
                if !response.is_success() {
                    let reason = format!("HTTP {} from {url}", response.status);
                    tracing::warn!("{key}: {reason}");
                    return Ok(Acquisition::Unavailable(reason));
                }
                if response.is_json() {
                    let reason = format!("JSON error body from {url}");
                    tracing::warn!("{key}: {reason}");
                    return Ok(Acquisition::Unavailable(reason));
                }
                download(key, response)
            }
            Directive::LocalFile => match std::fs::read(bundle) {
                Ok(payload) => Ok(Acquisition::Acquired(Acquired {
                    payload,
                    final_url: None,
                })),
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    let reason = format!("no cached file at {}", bundle.display());
                    tracing::warn!("{key}: {reason}");
                    Ok(Acquisition::Unavailable(reason))
                }
                Err(err) => Err(io_err(bundle, err)),
            },
        }
    }

    /// Run `command` with `sh -c` in the city directory. The last non-empty
    /// line of stdout names the produced file, relative to the city directory.
    fn run_script(&self, command: &str) -> Result<Acquisition, SyncError> {
        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(self.city_dir)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| SyncError::CommandSpawn {
                command: command.to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SyncError::CommandFailed {
                command: command.to_string(),
                reason: format!("{}: {}", output.status, tail(&stderr)),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let produced = stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .ok_or_else(|| SyncError::CommandFailed {
                command: command.to_string(),
                reason: "no output file reported on stdout".to_string(),
            })?;

        let path = self.city_dir.join(produced);
        let payload = std::fs::read(&path).map_err(|e| io_err(&path, e))?;
        Ok(Acquisition::Acquired(Acquired {
            payload,
            final_url: None,
        }))
    }
}

fn tail(stderr: &str) -> &str {
    stderr.trim().lines().last().unwrap_or("")
}

/// Read the whole body, logging progress per 10% of a known length or per
/// MiB otherwise.
fn download(key: &FeedKey, response: HttpResponse) -> Result<Acquisition, SyncError> {
    let HttpResponse {
        final_url,
        content_length,
        mut body,
        ..
    } = response;

    let total = content_length.filter(|len| *len > 0);
    let mut payload = Vec::with_capacity(total.unwrap_or(0).min(64 * MIB) as usize);
    let mut chunk = vec![0u8; CHUNK];
    let mut reported = 0u64;
    loop {
        let read = body.read(&mut chunk).map_err(|e| SyncError::Transport {
            url: final_url.clone(),
            message: e.to_string(),
        })?;
        if read == 0 {
            break;
        }
        payload.extend_from_slice(&chunk[..read]);
        let done = payload.len() as u64;
        match total {
            Some(total) => {
                let step = (done * 10 / total).min(10);
                if step > reported {
                    reported = step;
                    tracing::info!("{key}: {}% ({done}/{total} bytes)", step * 10);
                }
            }
            None => {
                let mib = done / MIB;
                if mib > reported {
                    reported = mib;
                    tracing::info!("{key}: {mib} MiB");
                }
            }
        }
    }

    tracing::info!("{key}: downloaded {} bytes from {final_url}", payload.len());
    Ok(Acquisition::Acquired(Acquired {
        payload,
        final_url: Some(final_url),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::config::SyncConfig;
    use crate::transitfeeds::testing::{Canned, FakeTransport};
    use crate::transport::RateLimiter;

    const BASE: &str = "http://feeds.test/";

    fn setup(transport: FakeTransport) -> (Arc<FakeTransport>, TransitFeeds) {
        let config = SyncConfig {
            api_base: BASE.to_string(),
            api_key: None,
            ..SyncConfig::default()
        };
        let transport = Arc::new(transport);
        let feeds = TransitFeeds::new(
            &config,
            transport.clone(),
            Arc::new(RateLimiter::new(Duration::ZERO)),
        );
        (transport, feeds)
    }

    fn acquire(
        transport: &FakeTransport,
        feeds: &TransitFeeds,
        dir: &Path,
        directive: Directive<'_>,
    ) -> Result<Acquisition, SyncError> {
        let acquirer = FeedAcquirer {
            feeds,
            transport,
            city_dir: dir,
        };
        acquirer.acquire(&FeedKey::from("vbb"), directive, &dir.join("data/vbb.bundle"))
    }

    #[test]
    fn direct_url_reports_final_url() {
        let (transport, feeds) = setup(FakeTransport::default().route(
            "http://example.com/gtfs.zip",
            Canned::bytes(b"PKDATA").redirected_to("http://cdn.example.com/gtfs-2024.zip"),
        ));
        let dir = TempDir::new().unwrap();

        let got = acquire(&transport, &feeds, dir.path(), Directive::DirectUrl("http://example.com/gtfs.zip"))
            .unwrap();
        assert_eq!(
            got,
            Acquisition::Acquired(Acquired {
                payload: b"PKDATA".to_vec(),
                final_url: Some("http://cdn.example.com/gtfs-2024.zip".to_string()),
            })
        );
    }

    #[test]
    fn direct_url_error_status_is_unavailable() {
        let mut gone = Canned::bytes(b"not found");
        gone.status = 404;
        let (transport, feeds) =
            setup(FakeTransport::default().route("http://example.com/gtfs.zip", gone));
        let dir = TempDir::new().unwrap();

        let got = acquire(&transport, &feeds, dir.path(), Directive::DirectUrl("http://example.com/gtfs.zip"))
            .unwrap();
        assert!(matches!(got, Acquisition::Unavailable(reason) if reason.contains("404")));
    }

    #[test]
    fn direct_url_json_body_is_unavailable() {
        let (transport, feeds) = setup(FakeTransport::default().route(
            "http://example.com/gtfs.zip",
            Canned::json(200, r#"{"status":"ERROR","msg":"rate limited"}"#),
        ));
        let dir = TempDir::new().unwrap();

        let got = acquire(&transport, &feeds, dir.path(), Directive::DirectUrl("http://example.com/gtfs.zip"))
            .unwrap();
        assert!(matches!(got, Acquisition::Unavailable(reason) if reason.contains("JSON")));
    }

    #[test]
    fn unreachable_url_is_an_error() {
        let (transport, feeds) = setup(FakeTransport::default());
        let dir = TempDir::new().unwrap();
        let err = acquire(&transport, &feeds, dir.path(), Directive::DirectUrl("http://down.test/x"))
            .unwrap_err();
        assert!(matches!(err, SyncError::Transport { .. }));
    }

    #[test]
    fn remote_feed_json_is_unavailable() {
        let (transport, feeds) = setup(FakeTransport::default().route(
            &format!("{BASE}getLatestFeedVersion"),
            Canned::json(200, r#"{"status":"ERROR","msg":"Feed not found"}"#),
        ));
        let dir = TempDir::new().unwrap();
        let got = acquire(&transport, &feeds, dir.path(), Directive::RemoteFeed("x/1")).unwrap();
        assert!(matches!(got, Acquisition::Unavailable(reason) if reason.contains("Feed not found")));
    }

    #[test]
    fn remote_feed_payload_is_downloaded() {
        let (transport, feeds) = setup(FakeTransport::default().route(
            &format!("{BASE}getLatestFeedVersion"),
            Canned::bytes(b"B").redirected_to("http://files.test/x/1/latest.zip"),
        ));
        let dir = TempDir::new().unwrap();
        match acquire(&transport, &feeds, dir.path(), Directive::RemoteFeed("x/1")).unwrap() {
            Acquisition::Acquired(acquired) => {
                assert_eq!(acquired.payload, b"B");
                assert_eq!(acquired.final_url.as_deref(), Some("http://files.test/x/1/latest.zip"));
            }
            other => panic!("expected payload, got {other:?}"),
        }
        assert_eq!(transport.calls(), vec![format!("{BASE}getLatestFeedVersion?feed=x/1")]);
    }

    #[test]
    fn large_download_is_read_completely() {
        let body = vec![7u8; 3 * CHUNK + 17];
        let (transport, feeds) =
            setup(FakeTransport::default().route("http://example.com/big.zip", Canned::bytes(&body)));
        let dir = TempDir::new().unwrap();
        match acquire(&transport, &feeds, dir.path(), Directive::DirectUrl("http://example.com/big.zip"))
            .unwrap()
        {
            Acquisition::Acquired(acquired) => assert_eq!(acquired.payload, body),
            other => panic!("expected payload, got {other:?}"),
        }
    }

    #[test]
    fn local_file_reads_bundle() {
        let (transport, feeds) = setup(FakeTransport::default());
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("data")).unwrap();
        std::fs::write(dir.path().join("data/vbb.bundle"), b"cached").unwrap();

        let got = acquire(&transport, &feeds, dir.path(), Directive::LocalFile).unwrap();
        assert_eq!(
            got,
            Acquisition::Acquired(Acquired {
                payload: b"cached".to_vec(),
                final_url: None
            })
        );
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn local_file_missing_is_unavailable() {
        let (transport, feeds) = setup(FakeTransport::default());
        let dir = TempDir::new().unwrap();
        let got = acquire(&transport, &feeds, dir.path(), Directive::LocalFile).unwrap();
        assert!(matches!(got, Acquisition::Unavailable(_)));
    }

    #[test]
    #[cfg(unix)]
    fn script_output_names_the_payload() {
        let (transport, feeds) = setup(FakeTransport::default());
        let dir = TempDir::new().unwrap();
        let script = "mkdir -p out && printf 'S' > out/feed.zip && echo building && echo out/feed.zip";

        let got = acquire(&transport, &feeds, dir.path(), Directive::Script(script)).unwrap();
        assert_eq!(
            got,
            Acquisition::Acquired(Acquired {
                payload: b"S".to_vec(),
                final_url: None
            })
        );
        assert!(transport.calls().is_empty());
    }

    #[test]
    #[cfg(unix)]
    fn script_failure_is_an_error() {
        let (transport, feeds) = setup(FakeTransport::default());
        let dir = TempDir::new().unwrap();
        let err = acquire(&transport, &feeds, dir.path(), Directive::Script("echo boom >&2; exit 3"))
            .unwrap_err();
        match err {
            SyncError::CommandFailed { reason, .. } => assert!(reason.contains("boom")),
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[test]
    #[cfg(unix)]
    fn script_without_output_is_an_error() {
        let (transport, feeds) = setup(FakeTransport::default());
        let dir = TempDir::new().unwrap();
        let err = acquire(&transport, &feeds, dir.path(), Directive::Script("true")).unwrap_err();
        assert!(matches!(err, SyncError::CommandFailed { .. }));
    }
}
