use crate::oracles::PathOracle;

const DEFAULT_ROOT_PREFIX: &str = "src/";

const COMMON_SUFFIXES: &[&str] = &[
    "impl",
    "browser_tests",
    "browser_test",
    "browsertest",
    "browsertests",
    "unittests",
    "unittest",
    "tests",
    "test",
    "gcc",
    "msvc",
    "arm",
    "arm64",
    "mips",
    "portable",
    "x86",
    "android",
    "ios",
    "linux",
    "mac",
    "ozone",
    "posix",
    "win",
    "aura",
    "x",
    "x11",
];

const COMMON_TEST_SUFFIXES: &[&str] = &[
    "browser_tests",
    "browser_test",
    "browsertest",
    "browsertests",
    "unittests",
    "unittest",
    "tests",
    "test",
];

const RELATED_FILETYPES: &[&[&str]] = &[
    &["h", "hh", "c", "cc", "cpp", "m", "mm", "o", "obj"],
    &["py", "pyc"],
    &["gyp", "gypi"],
];

const SOURCE_EXTENSIONS: &[&str] = &["c", "cc", "cpp", "m", "mm"];

/// Path heuristics for a Chromium-style checkout.
///
/// Paths in logs are often partial (`base/x.h` for `chrome/base/x.h`) or
/// point at object files, so equality alone is not enough.
#[derive(Debug, Clone)]
pub struct ChromiumPathOracle {
    root_prefix: String,
}

impl Default for ChromiumPathOracle {
    fn default() -> Self {
        Self::new(DEFAULT_ROOT_PREFIX)
    }
}

impl ChromiumPathOracle {
    pub fn new(root_prefix: impl Into<String>) -> Self {
        Self {
            root_prefix: root_prefix.into(),
        }
    }
}

impl PathOracle for ChromiumPathOracle {
    /// True: (`chrome/test/base/x.h`, `base/x.h`), (`a/b/x.cc`, `a/b/x.cc`).
    /// False: (`c/x.cc`, `a/b/c/x.cc`).
    fn same_file(&self, changed_path: &str, path_in_log: &str) -> bool {
        let changed = changed_path.to_lowercase();
        let in_log = path_in_log.to_lowercase();

        changed == in_log || changed.ends_with(&format!("/{in_log}"))
    }

    /// Related: `file.h` / `file_impl.cc`, `file_impl.cc` / `file_unittest.cc`,
    /// `file_win.cc` / `file_mac.cc`. Not related: `a_tests.py` /
    /// `a_browsertests.py`, `a.isolate` / `a.cc`, `a.py` / `a.cpp`.
    fn is_related(&self, changed_path: &str, path_in_log: &str) -> bool {
        let changed_ext = extension(changed_path);
        let log_ext = extension(path_in_log);

        if !related_extensions(changed_ext).contains(&log_ext) {
            return false;
        }

        let path_in_log = if path_in_log.ends_with(".o") || path_in_log.ends_with(".obj") {
            normalize_object_file_path(path_in_log)
        } else {
            path_in_log.to_string()
        };

        if are_both_test_related(changed_path, &path_in_log) {
            return false;
        }

        self.same_file(
            &strip_extension_and_common_suffix(changed_path),
            &strip_extension_and_common_suffix(&path_in_log),
        )
    }

    fn strip_root(&self, path: &str) -> String {
        path.strip_prefix(self.root_prefix.as_str())
            .unwrap_or(path)
            .to_string()
    }
}

/// Final path component.
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn split_dir(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    }
}

/// Splits a file name into stem and extension; leading dots are not extensions.
fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rfind('.') {
        Some(idx) if file_name[..idx].chars().any(|c| c != '.') => {
            (&file_name[..idx], &file_name[idx + 1..])
        }
        _ => (file_name, ""),
    }
}

fn extension(path: &str) -> &str {
    split_extension(base_name(path)).1
}

fn stem(path: &str) -> &str {
    split_extension(base_name(path)).0
}

fn related_extensions(ext: &str) -> &'static [&'static str] {
    RELATED_FILETYPES
        .iter()
        .find(|family| family.contains(&ext))
        .copied()
        .unwrap_or_default()
}

fn join_dir(dir: &str, file_name: &str) -> String {
    if dir.is_empty() {
        file_name.to_string()
    } else {
        format!("{dir}/{file_name}")
    }
}

/// `obj/a/b/TARGET.file.o` -> `a/b/file.o`; `obj/a/file.cc.o` is kept as is.
fn normalize_object_file_path(path: &str) -> String {
    let path = path.strip_prefix("obj/").unwrap_or(path);
    let (dir, file_name) = split_dir(path);

    let mut normalized = file_name;
    if let Some((_, object_file)) = file_name.split_once('.') {
        if object_file.ends_with(".o") || object_file.ends_with(".obj") {
            let (name, _) = split_extension(object_file);
            if !SOURCE_EXTENSIONS.contains(&name) {
                normalized = object_file;
            }
        }
    }

    join_dir(dir, normalized)
}

fn ends_with_suffix<'a>(name: &str, suffixes: &[&'a str]) -> Option<&'a str> {
    suffixes.iter().copied().find(|suffix| {
        name.strip_suffix(suffix)
            .is_some_and(|rest| rest.ends_with('_'))
    })
}

fn are_both_test_related(changed_path: &str, path_in_log: &str) -> bool {
    ends_with_suffix(stem(changed_path), COMMON_TEST_SUFFIXES).is_some()
        && ends_with_suffix(stem(path_in_log), COMMON_TEST_SUFFIXES).is_some()
}

/// `file_impl.cc`, `file_unittest.cc`, `file_impl_mac.h` -> `file`.
fn strip_extension_and_common_suffix(path: &str) -> String {
    let (dir, file_name) = split_dir(path);
    let mut name = split_extension(file_name).0;

    while let Some(suffix) = ends_with_suffix(name, COMMON_SUFFIXES) {
        name = &name[..name.len() - suffix.len() - 1];
    }

    join_dir(dir, name)
}
