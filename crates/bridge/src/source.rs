use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use url::Url;

const NETWORK_SCHEMES: &[&str] = &["http", "https", "ws", "wss"];

/// Stable label for a loaded bundle, used in stack traces and logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CanonicalSourceName(String);

impl CanonicalSourceName {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CanonicalSourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalSourceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<CanonicalSourceName> for String {
    fn from(name: CanonicalSourceName) -> Self {
        name.0
    }
}

/// Derives the canonical source name for a bundle url or filesystem path.
pub fn canonicalize(location: &str) -> CanonicalSourceName {
    canonicalize_with(
        location,
        &|| std::env::current_dir().ok(),
        &|path| std::fs::canonicalize(path).ok(),
    )
}

pub fn canonicalize_with<Cwd, Resolve>(
    location: &str,
    cwd: &Cwd,
    resolve: &Resolve,
) -> CanonicalSourceName
where
    Cwd: Fn() -> Option<PathBuf>,
    Resolve: Fn(&Path) -> Option<PathBuf>,
{
    if location.is_empty() {
        return CanonicalSourceName(String::new());
    }

    if has_network_scheme(location) {
        return CanonicalSourceName(strip_query_and_fragment(location).to_string());
    }

    match Url::parse(location) {
        Ok(url) if url.scheme() == "file" => match url.to_file_path() {
            Ok(path) => canonicalize_path_with(&path, cwd, resolve),
            Err(()) => CanonicalSourceName(location.to_string()),
        },
        // Single letter schemes are Windows drive prefixes, not urls.
        Ok(url) if url.scheme().len() > 1 => CanonicalSourceName(location.to_string()),
        _ => canonicalize_path_with(Path::new(location), cwd, resolve),
    }
}

fn canonicalize_path_with<Cwd, Resolve>(
    path: &Path,
    cwd: &Cwd,
    resolve: &Resolve,
) -> CanonicalSourceName
where
    Cwd: Fn() -> Option<PathBuf>,
    Resolve: Fn(&Path) -> Option<PathBuf>,
{
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match cwd() {
            Some(dir) => dir.join(path),
            None => path.to_path_buf(),
        }
    };

    // `..` after a symlink refers to the link target's parent, so links are
    // resolved before any lexical folding.
    let resolved = match resolve(&absolute) {
        Some(real) => real,
        None => normalize_lexically(&absolute),
    };
    CanonicalSourceName(resolved.to_string_lossy().into_owned())
}

/// Matched on the text so urls that fail strict parsing still count.
fn has_network_scheme(location: &str) -> bool {
    location.split_once("://").is_some_and(|(scheme, _)| {
        NETWORK_SCHEMES
            .iter()
            .any(|known| scheme.eq_ignore_ascii_case(known))
    })
}

fn strip_query_and_fragment(location: &str) -> &str {
    match location.find(['?', '#']) {
        Some(end) => &location[..end],
        None => location,
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if matches!(out.components().next_back(), Some(Component::Normal(_))) {
                    out.pop();
                } else if !out.has_root() {
                    out.push("..");
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cwd() -> Option<PathBuf> {
        Some(PathBuf::from("/work/app"))
    }

    fn no_links(_: &Path) -> Option<PathBuf> {
        None
    }

    fn name(location: &str) -> String {
        canonicalize_with(location, &cwd, &no_links).into_string()
    }

    #[test]
    fn strips_query_from_network_urls() {
        assert_eq!(
            canonicalize("https://host/app.bundle?platform=ios&hot=false"),
            canonicalize("https://host/app.bundle")
        );
        assert_eq!(name("http://localhost:8081/index.bundle#frag"), "http://localhost:8081/index.bundle");
        assert_eq!(name("wss://host/socket?token=1"), "wss://host/socket");
    }

    #[test]
    fn network_urls_are_otherwise_verbatim() {
        assert_eq!(name("https://Example.com"), "https://Example.com");
        assert_eq!(name("HTTPS://host/a/../b.js?x"), "HTTPS://host/a/../b.js");
    }

    #[test]
    fn unparseable_network_urls_still_strip_query() {
        assert_eq!(
            name("https://host:99999/app.bundle?platform=ios"),
            "https://host:99999/app.bundle"
        );
        assert_eq!(name("ws://bad host/socket#x"), "ws://bad host/socket");
    }

    #[test]
    fn normalizes_dot_segments() {
        assert_eq!(canonicalize("/var/app/./bundle.js").as_str(), "/var/app/bundle.js");
        assert_eq!(name("/var/app/../lib/./bundle.js"), "/var/lib/bundle.js");
        assert_eq!(name("/../../bundle.js"), "/bundle.js");
    }

    #[test]
    fn relative_paths_resolve_against_cwd() {
        assert_eq!(name("dist/main.js"), "/work/app/dist/main.js");
        assert_eq!(name("../shared/main.js"), "/work/shared/main.js");
        assert_eq!(
            canonicalize_with("dist/main.js", &|| None, &no_links).as_str(),
            "dist/main.js"
        );
    }

    #[test]
    fn file_urls_become_paths() {
        assert_eq!(name("file:///var/app/./bundle.js"), "/var/app/bundle.js");
        assert_eq!(name("file:///var/app/my%20bundle.js"), "/var/app/my bundle.js");
    }

    #[test]
    fn other_schemes_are_verbatim() {
        assert_eq!(name("data:text/javascript,1"), "data:text/javascript,1");
        assert_eq!(name("asset://bundle.js?x=1"), "asset://bundle.js?x=1");
    }

    #[test]
    fn empty_location_yields_empty_name() {
        assert_eq!(name(""), "");
    }

    #[test]
    fn resolved_links_replace_the_lexical_path() {
        let resolve = |path: &Path| {
            (path == Path::new("/work/app/current/bundle.js"))
                .then(|| PathBuf::from("/releases/42/bundle.js"))
        };
        let resolved = canonicalize_with("current/./bundle.js", &cwd, &resolve);
        assert_eq!(resolved.as_str(), "/releases/42/bundle.js");
    }

    #[test]
    fn links_resolve_before_parent_segments_fold() {
        let resolve = |path: &Path| {
            (path == Path::new("/work/app/current/../bundle.js"))
                .then(|| PathBuf::from("/releases/bundle.js"))
        };
        let resolved = canonicalize_with("current/../bundle.js", &cwd, &resolve);
        assert_eq!(resolved.as_str(), "/releases/bundle.js");
    }

    #[test]
    fn local_paths_are_idempotent() {
        for location in ["/var/app/./bundle.js", "dist/../main.js", "file:///a/b/../c.js", "/"] {
            let once = name(location);
            assert_eq!(name(&once), once, "location {}", location);
        }
    }

    #[cfg(unix)]
    #[test]
    fn follows_symlinks_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let real = dir.path().join("real.js");
        std::fs::write(&real, "export {}").expect("write bundle");
        let link = dir.path().join("link.js");
        std::os::unix::fs::symlink(&real, &link).expect("symlink");

        let expected = std::fs::canonicalize(&real).expect("canonical real path");
        let via_link = canonicalize(&link.to_string_lossy());
        assert_eq!(via_link.as_str(), expected.to_string_lossy());
        assert_eq!(canonicalize(via_link.as_str()), via_link);
    }

    #[cfg(unix)]
    #[test]
    fn parent_segment_after_symlink_follows_the_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        let release = dir.path().join("releases").join("v1");
        std::fs::create_dir_all(release.join("sub")).expect("create release dirs");
        std::fs::write(release.join("bundle.js"), "export {}").expect("write bundle");
        std::os::unix::fs::symlink(release.join("sub"), dir.path().join("current"))
            .expect("symlink");

        let location = dir.path().join("current").join("..").join("bundle.js");
        let expected = std::fs::canonicalize(release.join("bundle.js")).expect("canonical bundle");
        assert_eq!(
            canonicalize(&location.to_string_lossy()).as_str(),
            expected.to_string_lossy()
        );
    }
}
