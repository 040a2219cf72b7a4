//! Include/exclude matching of archive entry names.

use crate::manifest::MANIFEST_FILE;
use regex::Regex;

/// Compiled include and exclude patterns.
///
/// Include patterns are OR-combined and authoritative when present; exclude
/// patterns are OR-combined and always applied on top.
#[derive(Debug, Clone, Default)]
pub struct EntryFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl EntryFilter {
    /// Builds a filter from comma separated glob lists.
    ///
    /// Each item becomes one anchored matcher where `*` matches any run of
    /// characters. As soon as one include pattern is given the manifest
    /// (`backup.json`) is implicitly included as well.
    ///
    /// # Examples
    ///
    /// ```
    /// use habackup::filter::EntryFilter;
    ///
    /// let filter = EntryFilter::from_globs("homeassistant*", "*.log").unwrap();
    /// assert!(filter.allows("homeassistant.tar.gz"));
    /// assert!(filter.allows("./backup.json"));
    /// assert!(!filter.allows("homeassistant.log"));
    /// assert!(!filter.allows("addon_core_ssh.tar.gz"));
    /// ```
    pub fn from_globs(include: &str, exclude: &str) -> Result<Self, regex::Error> {
        let mut include = compile_globs(include)?;
        if !include.is_empty() {
            include.push(Regex::new(&format!("^.*{}$", regex::escape(MANIFEST_FILE)))?);
        }

        Ok(Self {
            include,
            exclude: compile_globs(exclude)?,
        })
    }

    /// Whether an entry with this raw archive name should be extracted.
    pub fn allows(&self, name: &str) -> bool {
        if !self.include.is_empty() && !self.include.iter().any(|re| re.is_match(name)) {
            return false;
        }

        !self.exclude.iter().any(|re| re.is_match(name))
    }

    /// Whether no pattern was given, so every entry is allowed.
    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }
}

fn compile_globs(list: &str) -> Result<Vec<Regex>, regex::Error> {
    list.split(',')
        .map(str::trim)
        .filter(|glob| !glob.is_empty())
        .map(|glob| Regex::new(&glob_to_regex(glob)))
        .collect()
}

fn glob_to_regex(glob: &str) -> String {
    let body = glob
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    format!("^{body}$")
}
