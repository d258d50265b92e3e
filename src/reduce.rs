//! Directory-set reduction.
//!
//! Pure helpers that collapse a batch of target folder paths before the
//! engines touch the filesystem: creating every requested folder would
//! redo work its ancestors or descendants already imply. Inputs are
//! absolute paths; outputs preserve first-seen order. Quadratic scans
//! are fine here — batches are dozens of paths, not thousands.

use crate::location::has_parent;

/// Remove every path that has another input path as an ancestor.
///
/// `["/a/b/c", "/a/b", "/x/y"]` reduces to `["/a/b", "/x/y"]`: probing
/// or creating `/a/b` covers `/a/b/c` as well.
pub fn find_unique_parents<I, S>(paths: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let paths = distinct(paths);
    paths
        .iter()
        .filter(|path| !paths.iter().any(|other| has_parent(path, other)))
        .cloned()
        .collect()
}

/// Remove every path that has another input path as a descendant.
///
/// `["/a/b", "/a/b/c", "/x/y"]` reduces to `["/a/b/c", "/x/y"]`:
/// creating the deepest folder creates its ancestors implicitly.
pub fn find_unique_deepest_sub_folders<I, S>(paths: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let paths = distinct(paths);
    paths
        .iter()
        .filter(|path| !paths.iter().any(|other| has_parent(other, path)))
        .cloned()
        .collect()
}

fn distinct<I, S>(paths: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: Vec<String> = Vec::new();
    for p in paths {
        let p = p.into();
        let p = if p.len() > 1 {
            p.trim_end_matches('/').to_string()
        } else {
            p
        };
        if !out.contains(&p) {
            out.push(p);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_parents_drops_descendants() {
        let got = find_unique_parents(["/a/b/c", "/a/b", "/x/y"]);
        assert_eq!(got, vec!["/a/b", "/x/y"]);
    }

    #[test]
    fn unique_deepest_drops_ancestors() {
        let got = find_unique_deepest_sub_folders(["/a/b", "/a/b/c", "/x/y"]);
        assert_eq!(got, vec!["/a/b/c", "/x/y"]);
    }

    #[test]
    fn mixed_batch_matches_reference_semantics() {
        let input = [
            "/storage/9016-4EF8/Downloads",
            "/storage/9016-4EF8/Downloads/Archive",
            "/storage/9016-4EF8/Video",
            "/storage/9016-4EF8/Music",
            "/storage/9016-4EF8/Music/Favorites/Pop",
            "/storage/emulated/0/Music",
        ];
        assert_eq!(
            find_unique_parents(input),
            vec![
                "/storage/9016-4EF8/Downloads",
                "/storage/9016-4EF8/Video",
                "/storage/9016-4EF8/Music",
                "/storage/emulated/0/Music",
            ]
        );
        assert_eq!(
            find_unique_deepest_sub_folders(input),
            vec![
                "/storage/9016-4EF8/Downloads/Archive",
                "/storage/9016-4EF8/Video",
                "/storage/9016-4EF8/Music/Favorites/Pop",
                "/storage/emulated/0/Music",
            ]
        );
    }

    #[test]
    fn duplicates_and_trailing_separators_collapse() {
        let got = find_unique_parents(["/a/b/", "/a/b", "/a/b/c"]);
        assert_eq!(got, vec!["/a/b"]);
    }

    #[test]
    fn sibling_prefixes_are_not_ancestors() {
        let got = find_unique_parents(["/a/bc", "/a/b"]);
        assert_eq!(got, vec!["/a/bc", "/a/b"]);
    }

    #[test]
    fn empty_input_is_empty_output() {
        assert!(find_unique_parents(Vec::<String>::new()).is_empty());
        assert!(find_unique_deepest_sub_folders(Vec::<String>::new()).is_empty());
    }
}
