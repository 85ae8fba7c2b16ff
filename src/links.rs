//! Link classification and content-type probing
//!
//! A task's [`Source`] is resolved once into a [`SourceKind`] that selects the
//! transfer backend. Links that are not a recognized transfer scheme are
//! probed first; landing pages (HTML or plain text) are handed to the
//! [`LinkResolver`](crate::collaborators::LinkResolver).

use crate::collaborators::{BackendKind, DownloadSource, LinkProber};
use crate::config::LinkConfig;
use crate::error::{Error, Result};
use crate::task::{AttachmentRef, DirectDescriptor, Source, TaskOptions};
use crate::types::SeedPolicy;
use crate::utils::basic_auth_header;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

// Literal patterns; compilation cannot fail.
#[allow(clippy::expect_used)]
fn literal(pattern: &str) -> Regex {
    Regex::new(pattern).expect("literal pattern")
}

static MAGNET: LazyLock<Regex> =
    LazyLock::new(|| literal(r"^magnet:\?xt=urn:(btih|btmh):[a-zA-Z0-9]*"));

static GDRIVE_ID: LazyLock<Regex> = LazyLock::new(|| {
    literal(r"^(tp:|sa:|mtp:)?([a-zA-Z0-9_-]{33}|[a-zA-Z0-9_-]{19})$|^gdl$|^(tp:|mtp:)?root$")
});

static LANDING_PAGE: LazyLock<Regex> = LazyLock::new(|| literal(r"^(text/html|text/plain)"));

const URL_SCHEMES: [&str; 7] = [
    "http://", "https://", "ftp://", "rtmp://", "rtmps://", "mms://", "rtsp://",
];

/// Magnet URI with a BitTorrent info hash
pub fn is_magnet(link: &str) -> bool {
    MAGNET.is_match(link)
}

/// Cloud-drive share link
pub fn is_gdrive_link(link: &str) -> bool {
    link.contains("drive.google.com") || link.contains("drive.usercontent.google.com")
}

/// Bare cloud-drive file/folder ID, optionally prefixed with an account selector
pub fn is_gdrive_id(link: &str) -> bool {
    GDRIVE_ID.is_match(link)
}

/// Remote-storage path (`remote:path`), the `rcl` selector, or an `mrcc:`-prefixed path
pub fn is_rclone_path(link: &str) -> bool {
    if link == "rcl" {
        return true;
    }
    let link = link.strip_prefix("mrcc:").unwrap_or(link);
    if ["magnet:", "mtp:", "sa:", "tp:"]
        .iter()
        .any(|prefix| link.starts_with(prefix))
    {
        return false;
    }
    let Some((remote, path)) = link.split_once(':') else {
        return false;
    };
    !remote.is_empty()
        && !remote.starts_with(['-', ' '])
        && !remote.ends_with(' ')
        && remote
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ' ' | '-'))
        && !path.contains("//")
}

/// Link pointing at a `.torrent` file
pub fn is_torrent_file(link: &str) -> bool {
    link.ends_with(".torrent")
}

/// Network URL with a dotted host, scheme optional
pub fn is_url(link: &str) -> bool {
    if link.starts_with('/') || link.chars().any(char::is_whitespace) {
        return false;
    }
    let candidate = if URL_SCHEMES.iter().any(|s| link.starts_with(s)) {
        link.to_string()
    } else {
        format!("http://{}", link)
    };
    match url::Url::parse(&candidate) {
        Ok(url) => url.host_str().is_some_and(|host| {
            host.rsplit_once('.')
                .is_some_and(|(name, tld)| !name.is_empty() && !tld.is_empty())
        }),
        Err(_) => false,
    }
}

/// Whether a probed content type denotes a landing page rather than a file
pub fn is_landing_page(content_type: Option<&str>) -> bool {
    content_type.is_none_or(|ct| LANDING_PAGE.is_match(ct))
}

/// Whether the link has to be probed (and possibly unwrapped) before dispatch
///
/// Attachments, pre-resolved descriptors, backend-hinted tasks and the
/// recognized transfer schemes go straight to their backend. So do links
/// that are not network URLs (local paths), which have nothing to probe.
pub fn needs_probe(source: &Source, options: &TaskOptions) -> bool {
    let Source::Link { link } = source else {
        return false;
    };
    !options.is_jd
        && !options.is_nzb
        && !options.is_qbit
        && !is_magnet(link)
        && !is_rclone_path(link)
        && !is_gdrive_link(link)
        && !is_torrent_file(link)
        && !is_gdrive_id(link)
        && is_url(link)
}

/// Resolved source of a task, one variant per backend
#[derive(Clone, Debug, PartialEq)]
pub enum SourceKind {
    /// Chat attachment
    Attachment(AttachmentRef),
    /// Pre-resolved multi-source descriptor
    Direct(DirectDescriptor),
    /// Link-grabber queue
    QueueClient {
        /// Link handed to the queue
        link: String,
    },
    /// Torrent client
    Torrent {
        /// Magnet, `.torrent` URL or path
        link: String,
        /// Seeding policy
        seed: Option<SeedPolicy>,
    },
    /// Newsgroup retrieval
    Newsgroup {
        /// NZB link or path
        link: String,
    },
    /// Remote-storage copy
    RemoteStorage {
        /// `remote:path`
        path: String,
    },
    /// Cloud-drive download
    CloudDrive {
        /// Share link or ID
        id: String,
    },
    /// Generic URI download
    Uri {
        /// URL or magnet
        link: String,
        /// Request headers, including basic auth when configured
        headers: Vec<String>,
        /// Seeding policy for magnets
        seed: Option<SeedPolicy>,
    },
}

impl SourceKind {
    /// Backend serving this kind
    pub fn backend(&self) -> BackendKind {
        match self {
            SourceKind::Attachment(_) => BackendKind::Attachment,
            SourceKind::Direct(_) => BackendKind::Direct,
            SourceKind::QueueClient { .. } => BackendKind::QueueClient,
            SourceKind::Torrent { .. } => BackendKind::TorrentClient,
            SourceKind::Newsgroup { .. } => BackendKind::Newsgroup,
            SourceKind::RemoteStorage { .. } => BackendKind::RemoteStorage,
            SourceKind::CloudDrive { .. } => BackendKind::CloudDrive,
            SourceKind::Uri { .. } => BackendKind::Uri,
        }
    }

    /// What the backend is asked to fetch
    pub fn download_source(&self) -> DownloadSource {
        match self {
            SourceKind::Attachment(attachment) => DownloadSource::Attachment(attachment.clone()),
            SourceKind::Direct(descriptor) => DownloadSource::Direct(descriptor.clone()),
            SourceKind::QueueClient { link }
            | SourceKind::Torrent { link, .. }
            | SourceKind::Newsgroup { link }
            | SourceKind::Uri { link, .. } => DownloadSource::Link(link.clone()),
            SourceKind::RemoteStorage { path } => DownloadSource::Link(path.clone()),
            SourceKind::CloudDrive { id } => DownloadSource::Link(id.clone()),
        }
    }

    /// Request headers handed to the backend
    pub fn headers(&self) -> Vec<String> {
        match self {
            SourceKind::Uri { headers, .. } => headers.clone(),
            SourceKind::Direct(descriptor) => descriptor.headers.clone(),
            _ => Vec::new(),
        }
    }

    /// Seeding policy handed to the backend
    pub fn seed(&self) -> Option<SeedPolicy> {
        match self {
            SourceKind::Torrent { seed, .. } | SourceKind::Uri { seed, .. } => seed.clone(),
            _ => None,
        }
    }
}

/// Classify a (possibly resolved) source
///
/// Priority: attachment, direct descriptor, queue client, torrent client,
/// newsgroup, remote storage, cloud drive, generic URI. `headers` are the
/// headers gathered during resolution; basic-auth credentials from the task
/// options are appended for generic downloads.
pub fn classify(source: &Source, options: &TaskOptions, headers: Vec<String>) -> SourceKind {
    let link = match source {
        Source::Attachment(attachment) => return SourceKind::Attachment(attachment.clone()),
        Source::Direct(descriptor) => return SourceKind::Direct(descriptor.clone()),
        Source::Link { link } => link.clone(),
    };

    if options.is_jd {
        SourceKind::QueueClient { link }
    } else if options.is_qbit {
        SourceKind::Torrent {
            link,
            seed: options.seed.clone(),
        }
    } else if options.is_nzb {
        SourceKind::Newsgroup { link }
    } else if is_rclone_path(&link) {
        SourceKind::RemoteStorage { path: link }
    } else if is_gdrive_link(&link) || is_gdrive_id(&link) {
        SourceKind::CloudDrive { id: link }
    } else {
        let mut headers = headers;
        headers.extend(options.headers.iter().cloned());
        let username = options.auth_username.as_deref().unwrap_or_default();
        let password = options.auth_password.as_deref().unwrap_or_default();
        if !username.is_empty() || !password.is_empty() {
            headers.push(basic_auth_header(username, password));
        }
        SourceKind::Uri {
            link,
            headers,
            seed: options.seed.clone(),
        }
    }
}

/// [`LinkProber`] that issues an HTTP `HEAD` request
#[derive(Clone, Debug)]
pub struct HttpLinkProber {
    client: reqwest::Client,
}

impl HttpLinkProber {
    /// Create a prober with the configured timeout and user agent
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created
    pub fn new(config: &LinkConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.probe_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Config {
                message: format!("failed to create HTTP client: {}", e),
                key: Some("user_agent".to_string()),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl LinkProber for HttpLinkProber {
    async fn content_type(&self, link: &str) -> Option<String> {
        let response = match self.client.head(link).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::debug!(link, error = %e, "content-type probe failed");
                return None;
            }
        };
        response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    }
}
