//! HTTP medium: one request per batch using blocking I/O.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::warn;

use super::{Medium, MediumCtor};
use crate::error::{Error, Result};
use crate::extension::{ArgSpec, Descriptor, ExtensionArgs};
use crate::record::Payload;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Sends each batch as one HTTP request body.
///
/// Server errors (5xx) and transport failures are treated as retriable
/// and retried with a short backoff; client errors fail immediately.
pub struct HttpMedium {
    agent: ureq::Agent,
    url: String,
    method: String,
    gzip: bool,
}

impl HttpMedium {
    /// Create a medium for `url` with the given method.
    pub fn new(url: impl Into<String>, method: impl Into<String>, gzip: bool) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            url: url.into(),
            method: method.into().to_uppercase(),
            gzip,
        }
    }

    fn body(&self, payload: &Payload) -> Result<Vec<u8>> {
        if !self.gzip {
            return Ok(payload.as_bytes().to_vec());
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(payload.as_bytes())
            .and_then(|_| encoder.finish())
            .map_err(|e| Error::MediumWrite {
                cause: format!("gzip compression failed: {e}"),
                retriable: false,
            })
    }
}

impl Medium for HttpMedium {
    fn write(&self, payload: &Payload) -> Result<()> {
        let body = self.body(payload)?;

        let mut last_cause = String::new();
        for attempt in 0..=MAX_RETRIES {
            if attempt > 0 {
                std::thread::sleep(RETRY_BACKOFF * attempt);
            }

            let mut request = self.agent.request(&self.method, &self.url);
            if self.gzip {
                request = request.set("Content-Encoding", "gzip");
            }

            match request.send_bytes(&body) {
                Ok(_) => return Ok(()),
                Err(ureq::Error::Status(code, _)) if code >= 500 => {
                    last_cause = format!("{} {} returned {code}", self.method, self.url);
                    warn!(url = self.url.as_str(), code, attempt, "retriable HTTP failure");
                }
                Err(ureq::Error::Status(code, _)) => {
                    return Err(Error::MediumWrite {
                        cause: format!("{} {} returned {code}", self.method, self.url),
                        retriable: false,
                    });
                }
                Err(ureq::Error::Transport(transport)) => {
                    last_cause = format!("{} {}: {transport}", self.method, self.url);
                    warn!(url = self.url.as_str(), attempt, "transport failure");
                }
            }
        }

        Err(Error::MediumWrite {
            cause: format!("{last_cause} (after {MAX_RETRIES} retries)"),
            retriable: true,
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn construct(args: &ExtensionArgs) -> Result<Arc<dyn Medium>> {
    let url = args.require_str("url")?;
    let method = args.get_str("method").unwrap_or_else(|| "POST".to_string());
    let gzip = args.get_bool("gzip");
    Ok(Arc::new(HttpMedium::new(url, method, gzip)))
}

/// Descriptor for the built-in `http` medium.
pub fn descriptor() -> Descriptor<MediumCtor> {
    Descriptor::new("http", construct as MediumCtor).with_args(vec![
        ArgSpec::value("http-url", "<url>", "Send each batch to <url>")
            .default_str("http://localhost:8081/avalon"),
        ArgSpec::value("http-method", "<method>", "HTTP method for batch requests")
            .default_str("POST"),
        ArgSpec::flag("http-gzip", "Compress request bodies with gzip"),
    ])
}
