//! Directory-style listings of an archive prefix.
//!
//! A listing merges every page of a `/`-delimited listing and renders it as
//! a small HTML index, so recursive fetchers such as `wget -r` can walk the
//! archive without talking to the object store directly.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::debug;

use crate::html::HtmlWriter;
use crate::storage::backend::{ArchiveStore, ObjectEntry, StoreError};

/// Delimiter used to group keys into directories.
pub const DELIMITER: &str = "/";

/// Encode everything except unreserved characters and '/'.
const KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Every page of a prefix listing, merged in store order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingPage {
    /// The listed prefix.
    pub prefix: String,
    /// Common prefixes, each ending in `/`.
    pub prefixes: Vec<String>,
    /// Objects directly under the prefix.
    pub objects: Vec<ObjectEntry>,
}

impl ListingPage {
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty() && self.objects.is_empty()
    }
}

/// List `prefix` in `bucket`, following continuation tokens until the
/// store reports the last page.
///
/// Returns `StoreError::NotFound` when the prefix holds neither
/// directories nor objects.
pub async fn list_prefix(
    store: &dyn ArchiveStore,
    bucket: &str,
    prefix: &str,
) -> Result<ListingPage, StoreError> {
    let mut listing = ListingPage {
        prefix: prefix.to_string(),
        ..ListingPage::default()
    };
    let mut continuation: Option<String> = None;
    let mut pages = 0usize;

    loop {
        let page = store
            .list_page(bucket, prefix, DELIMITER, continuation.as_deref())
            .await?;
        pages += 1;
        listing.prefixes.extend(page.prefixes);
        // Zero-byte folder markers such as `dir/` are not files.
        listing
            .objects
            .extend(page.objects.into_iter().filter(|o| !o.key.ends_with('/')));
        match page.next_continuation {
            Some(token) => continuation = Some(token),
            None => break,
        }
    }

    debug!(
        bucket = %bucket,
        prefix = %prefix,
        pages,
        dirs = listing.prefixes.len(),
        files = listing.objects.len(),
        "listed prefix"
    );

    if listing.is_empty() {
        return Err(StoreError::not_found(bucket, prefix));
    }
    Ok(listing)
}

/// Where listing entries link to.
#[derive(Debug, Clone)]
pub struct ListingLinks {
    /// Absolute URL of the listed directory, ending in `/`.
    pub base_url: String,
    /// When set, file links point at `bypass + key` instead of the gateway.
    pub bypass: Option<String>,
}

impl ListingLinks {
    pub fn new(request_url: &str, bypass: Option<String>) -> Self {
        Self {
            base_url: request_base(request_url),
            bypass,
        }
    }
}

/// Directory form of a request URL: query dropped, trailing `/` ensured.
pub fn request_base(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

/// Display name of a common prefix: its last segment plus `/`.
pub fn dir_name(prefix: &str) -> String {
    let trimmed = prefix.strip_suffix('/').unwrap_or(prefix);
    let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
    format!("{last}/")
}

/// Display name of an object: the last segment of its key.
pub fn file_name(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

/// Format `n` with `,` thousands separators.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn encode_path(path: &str) -> String {
    utf8_percent_encode(path, KEY_ENCODE_SET).to_string()
}

/// Render `listing` as an HTML index page.
pub fn render_listing(listing: &ListingPage, links: &ListingLinks) -> String {
    let mut w = HtmlWriter::new();
    w.open("html");
    w.open("body");
    w.text_element("h1", &listing.prefix);
    w.newline();

    w.text_element("h2", "Sub directories:");
    w.open("ul");
    w.newline();
    for prefix in &listing.prefixes {
        let name = dir_name(prefix);
        let href = format!("{}{}", links.base_url, encode_path(&name));
        w.open("li");
        w.link(&href, &name);
        w.close("li");
        w.newline();
    }
    w.close("ul");
    w.newline();

    w.text_element("h2", "Downloads:");
    w.open("table");
    w.newline();
    if !listing.objects.is_empty() {
        w.open("tr");
        for heading in ["Name", "Size", "Mod Date"] {
            w.text_element("th", heading);
        }
        w.close("tr");
    }
    for obj in &listing.objects {
        let name = file_name(&obj.key);
        let href = match &links.bypass {
            Some(bypass) => format!("{}{}", bypass, encode_path(&obj.key)),
            None => format!("{}{}", links.base_url, encode_path(name)),
        };
        w.open("tr");
        w.open("td");
        w.link(&href, name);
        w.close("td");
        w.text_element("td", &format!(" {}", group_thousands(obj.size)));
        w.text_element(
            "td",
            &obj.last_modified.format("%Y-%m-%d %H:%M:%S%:z").to_string(),
        );
        w.close("tr");
        w.newline();
    }
    w.close("table");
    w.newline();
    w.close("body");
    w.close("html");
    w.finish()
}
