//! Directory index generation.

use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use tokio::fs;

/// Characters escaped inside a single path segment of an href.
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// Read a directory's entries, directories first then by name.
pub async fn read_entries(dir: &Path) -> std::io::Result<Vec<ListingEntry>> {
    let mut entries = Vec::new();
    let mut read_dir = fs::read_dir(dir).await?;

    while let Some(entry) = read_dir.next_entry().await? {
        let meta = match entry.metadata().await {
            Ok(meta) => meta,
            // Entry vanished between readdir and stat.
            Err(_) => continue,
        };
        entries.push(ListingEntry {
            name: entry.file_name().to_string_lossy().into_owned(),
            is_dir: meta.is_dir(),
            size: if meta.is_dir() { 0 } else { meta.len() },
            modified: meta.modified().ok(),
        });
    }

    entries.sort_by(|a, b| b.is_dir.cmp(&a.is_dir).then_with(|| a.name.cmp(&b.name)));
    Ok(entries)
}

/// Render an HTML index for `request_path` (already normalized).
pub fn render(request_path: &str, entries: &[ListingEntry]) -> String {
    let title = escape_html(request_path);
    let base = request_path.trim_end_matches('/');

    let mut html = String::with_capacity(512 + entries.len() * 128);
    html.push_str("<!DOCTYPE html>\n<html>\n<head>\n");
    html.push_str(&format!("<title>Index of {title}</title>\n"));
    html.push_str("<style>\n");
    html.push_str("body { font-family: Arial, sans-serif; margin: 20px; }\n");
    html.push_str("h1 { color: #2c3e50; }\n");
    html.push_str("th, td { padding: 4px 16px; text-align: left; }\n");
    html.push_str("a { text-decoration: none; color: #3498db; }\n");
    html.push_str("a:hover { text-decoration: underline; }\n");
    html.push_str("</style>\n</head>\n<body>\n");
    html.push_str(&format!("<h1>Index of {title}</h1>\n"));
    html.push_str("<table>\n<tr><th>Name</th><th>Size</th><th>Modified</th></tr>\n");

    if request_path != "/" {
        let parent = match base.rfind('/') {
            Some(0) | None => "/".to_string(),
            Some(i) => base[..i].to_string(),
        };
        html.push_str(&format!(
            "<tr><td><a href=\"{}\">../</a></td><td>-</td><td>-</td></tr>\n",
            href_for(&parent)
        ));
    }

    for entry in entries {
        let href = format!("{}/{}", href_for(base), utf8_percent_encode(&entry.name, SEGMENT));
        let name = escape_html(&entry.name);
        let (display, size) = if entry.is_dir {
            (format!("{name}/"), "-".to_string())
        } else {
            (name, format_size(entry.size))
        };
        let modified = entry
            .modified
            .map(|t| DateTime::<Utc>::from(t).format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        html.push_str(&format!(
            "<tr><td><a href=\"{href}\">{display}</a></td><td>{size}</td><td>{modified}</td></tr>\n"
        ));
    }

    html.push_str("</table>\n</body>\n</html>\n");
    html
}

fn href_for(path: &str) -> String {
    path.split('/')
        .map(|segment| utf8_percent_encode(segment, SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Human readable size.
fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1}G", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1}M", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1}K", bytes as f64 / KB as f64)
    } else {
        format!("{bytes}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;

    fn entry(name: &str, is_dir: bool, size: u64) -> ListingEntry {
        ListingEntry {
            name: name.to_string(),
            is_dir,
            size,
            modified: Some(UNIX_EPOCH),
        }
    }

    #[test]
    fn renders_entries_with_sizes() {
        let html = render("/test", &[entry("docs", true, 0), entry("file1.txt", false, 2048)]);
        assert!(html.contains("Index of /test"));
        assert!(html.contains("<a href=\"/test/docs\">docs/</a>"));
        assert!(html.contains("<a href=\"/test/file1.txt\">file1.txt</a></td><td>2.0K</td>"));
        assert!(html.contains("1970-01-01 00:00:00"));
        assert!(html.contains("<a href=\"/\">../</a>"));
    }

    #[test]
    fn root_has_no_parent_link() {
        let html = render("/", &[entry("a.txt", false, 3)]);
        assert!(!html.contains("../"));
        assert!(html.contains("<a href=\"/a.txt\">a.txt</a>"));
    }

    #[test]
    fn escapes_names() {
        let html = render("/", &[entry("<script>.txt", false, 1), entry("a b.txt", false, 1)]);
        assert!(html.contains("&lt;script&gt;.txt"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("href=\"/a%20b.txt\""));
    }

    #[tokio::test]
    async fn reads_directories_first() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), b"bb").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("z")).unwrap();

        let entries = read_entries(dir.path()).await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["z", "a.txt", "b.txt"]);
        assert_eq!(entries[2].size, 2);
    }
}
