//! Request payload fixtures with `${token}` substitution.

use crate::error::FixtureError;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::debug;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}")
        .expect("failed to compile fixture token regex")
});

/// Replace `${token}` markers with values from `values`.
///
/// Tokens without a value are left untouched.
pub fn substitute(template: &str, values: &HashMap<&str, &str>) -> String {
    TOKEN_RE
        .replace_all(template, |caps: &regex::Captures| {
            match values.get(&caps[1]) {
                Some(v) => (*v).to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Supplies payload content by logical name.
///
/// Inline fixtures win over files; files are looked up as
/// `<dir>/<name>.json`, then `<dir>/<name>`.
#[derive(Debug, Clone, Default)]
pub struct FixtureProvider {
    dir: Option<PathBuf>,
    inline: HashMap<String, String>,
}

impl FixtureProvider {
    /// Provider backed by a fixture directory.
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: Some(dir.as_ref().to_path_buf()),
            inline: HashMap::new(),
        }
    }

    /// Provider with no directory; only inline fixtures resolve.
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_inline(
        mut self,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        self.inline.insert(name.into(), content.into());
        self
    }

    fn candidates(&self, name: &str) -> Vec<PathBuf> {
        match &self.dir {
            Some(dir) => vec![dir.join(format!("{name}.json")), dir.join(name)],
            None => vec![],
        }
    }

    /// Raw content of the named fixture.
    pub fn load(&self, name: &str) -> Result<String, FixtureError> {
        if let Some(content) = self.inline.get(name) {
            debug!("Using inline fixture '{}'", name);
            return Ok(content.clone());
        }

        let candidates = self.candidates(name);
        for path in &candidates {
            match fs::read_to_string(path) {
                Ok(content) => {
                    debug!("Loaded fixture '{}' from {}", name, path.display());
                    return Ok(content);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(source) => {
                    return Err(FixtureError::Io {
                        path: path.clone(),
                        source,
                    })
                }
            }
        }

        let searched = if candidates.is_empty() {
            "inline fixtures".to_string()
        } else {
            candidates
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        Err(FixtureError::NotFound {
            name: name.to_string(),
            searched,
        })
    }

    /// Load the named fixture and substitute `${token}` markers.
    pub fn render(
        &self,
        name: &str,
        values: &HashMap<&str, &str>,
    ) -> Result<String, FixtureError> {
        let template = self.load(name)?;
        Ok(substitute(&template, values))
    }
}
