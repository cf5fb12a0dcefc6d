//! Static file serving from the document root.
//!
//! Files are served by `ServeDir`: content type from the extension, `index.html`
//! for directories, a redirect to the trailing-slash form for directory paths,
//! and 404 for anything missing. When a directory has no `index.html` the
//! request falls through to [`list_directory`], which renders a plain HTML
//! index of the directory, like a classic development file server.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use axum::extract::State;
use axum::http::Uri;
use axum::response::Html;
use axum::routing::{get, MethodRouter};
use tower_http::services::ServeDir;

use crate::config::FilesConfig;
use crate::error::FileError;

#[derive(Clone)]
struct ListingState {
    root: Arc<PathBuf>,
    enabled: bool,
}

/// A directory entry as shown in the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub is_dir: bool,
    pub is_symlink: bool,
}

/// Create the static file service for the configured document root.
pub fn create_static_service(files: &FilesConfig) -> ServeDir<MethodRouter> {
    let state = ListingState {
        root: Arc::new(files.root.clone()),
        enabled: files.directory_listing,
    };
    let listing: MethodRouter = get(list_directory).with_state(state);

    ServeDir::new(&files.root)
        .append_index_html_on_directories(true)
        .fallback(listing)
}

/// Fallback for requests `ServeDir` could not answer with a file.
async fn list_directory(
    State(state): State<ListingState>,
    uri: Uri,
) -> Result<Html<String>, FileError> {
    let request_path = uri.path();

    if !state.enabled {
        return Err(FileError::NotFound(request_path.to_string()));
    }

    let relative = resolve_request_path(request_path)
        .ok_or_else(|| FileError::NotFound(request_path.to_string()))?;
    let dir = state.root.join(relative);

    let metadata = tokio::fs::metadata(&dir)
        .await
        .map_err(|e| classify_io(e, request_path))?;
    if !metadata.is_dir() {
        return Err(FileError::NotFound(request_path.to_string()));
    }

    let entries = read_entries(&dir)
        .await
        .map_err(|e| classify_io(e, request_path))?;

    tracing::debug!(path = %request_path, entries = entries.len(), "Rendered directory listing");
    Ok(Html(render_listing(request_path, &entries)))
}

fn classify_io(e: std::io::Error, request_path: &str) -> FileError {
    match e.kind() {
        std::io::ErrorKind::NotFound => FileError::NotFound(request_path.to_string()),
        std::io::ErrorKind::PermissionDenied => FileError::Forbidden(request_path.to_string()),
        _ => FileError::Io(e),
    }
}

/// Map a URL path to a path relative to the document root.
///
/// Returns `None` for paths that would leave the root.
pub fn resolve_request_path(request_path: &str) -> Option<PathBuf> {
    let decoded = urlencoding::decode(request_path).ok()?;
    let mut relative = PathBuf::new();

    for segment in decoded.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        if segment.contains('\\') || segment.contains('\0') {
            return None;
        }
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => relative.push(part),
            _ => return None,
        }
    }

    Some(relative)
}

/// Read and sort the entries of a directory, case-insensitively by name.
pub async fn read_entries(dir: &Path) -> std::io::Result<Vec<ListingEntry>> {
    let mut reader = tokio::fs::read_dir(dir).await?;
    let mut entries = Vec::new();

    while let Some(entry) = reader.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        let is_symlink = entry.file_type().await?.is_symlink();
        // Follow links so a linked directory still gets its trailing slash
        let is_dir = tokio::fs::metadata(entry.path())
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false);
        entries.push(ListingEntry {
            name,
            is_dir,
            is_symlink,
        });
    }

    entries.sort_by_key(|entry| entry.name.to_lowercase());
    Ok(entries)
}

/// Render the HTML index page for a directory.
pub fn render_listing(request_path: &str, entries: &[ListingEntry]) -> String {
    let title = format!(
        "Directory listing for {}",
        escape_html(&urlencoding::decode(request_path).unwrap_or_else(|_| request_path.into()))
    );

    let mut html = String::new();
    html.push_str("<!DOCTYPE HTML>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n");
    html.push_str(&format!("<title>{title}</title>\n</head>\n<body>\n<h1>{title}</h1>\n<hr>\n<ul>\n"));

    for entry in entries {
        let (mut display, link) = if entry.is_dir {
            (format!("{}/", entry.name), format!("{}/", urlencoding::encode(&entry.name)))
        } else {
            (entry.name.clone(), urlencoding::encode(&entry.name).into_owned())
        };
        // A linked directory keeps its slash link but is shown as a link
        if entry.is_symlink {
            display = format!("{}@", entry.name);
        }
        html.push_str(&format!(
            "<li><a href=\"{}\">{}</a></li>\n",
            link,
            escape_html(&display)
        ));
    }

    html.push_str("</ul>\n<hr>\n</body>\n</html>\n");
    html
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
