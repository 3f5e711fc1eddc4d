//! Operator cost profiles.
//!
//! A process-wide map from operator names to polynomial cost models
//! f(order) = Σ aₖ·orderᵏ, loaded from an INI-style file whose groups name
//! machines or build variants. The file format is the key-file dialect the
//! profiling tools write: `[group]` headers, `#`/`;` comments, and values
//! as `;`-separated coefficient lists.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use once_cell::sync::Lazy;
use thiserror::Error;

/// Environment variable overriding the default database path.
pub const PROFILE_DB_ENV: &str = "ARAN_PROFILE_DB";

/// Environment variable overriding the default group.
pub const PROFILE_GROUP_ENV: &str = "ARAN_PROFILE_GROUP";

const DEFAULT_PATH: &str = "profiledb.ini";
const DEFAULT_GROUP: &str = "default";

/// A dense polynomial in one variable.
#[derive(Clone, Debug, PartialEq)]
pub struct Poly1d {
    terms: Vec<f64>,
}

impl Poly1d {
    /// The zero polynomial of the given degree.
    pub fn new(degree: usize) -> Poly1d {
        Poly1d {
            terms: vec![0.0; degree + 1],
        }
    }

    pub fn with_terms(terms: &[f64]) -> Poly1d {
        assert!(!terms.is_empty());
        Poly1d {
            terms: terms.to_vec(),
        }
    }

    pub fn degree(&self) -> usize {
        self.terms.len() - 1
    }

    pub fn term(&self, i: usize) -> f64 {
        self.terms[i]
    }

    pub fn term_mut(&mut self, i: usize) -> &mut f64 {
        &mut self.terms[i]
    }

    /// Horner evaluation.
    pub fn eval(&self, x: f64) -> f64 {
        let mut ret = self.terms[self.degree()];
        for i in (0..self.degree()).rev() {
            ret = ret * x + self.terms[i];
        }
        ret
    }

    pub fn add(&self, other: &Poly1d) -> Poly1d {
        let mut ret = Poly1d::new(self.degree().max(other.degree()));
        for i in 0..=ret.degree() {
            let l = self.terms.get(i).copied().unwrap_or(0.0);
            let r = other.terms.get(i).copied().unwrap_or(0.0);
            ret.terms[i] = l + r;
        }
        ret
    }

    pub fn sub(&self, other: &Poly1d) -> Poly1d {
        let mut ret = Poly1d::new(self.degree().max(other.degree()));
        for i in 0..=ret.degree() {
            let l = self.terms.get(i).copied().unwrap_or(0.0);
            let r = other.terms.get(i).copied().unwrap_or(0.0);
            ret.terms[i] = l - r;
        }
        ret
    }

    pub fn scale(&self, factor: f64) -> Poly1d {
        Poly1d {
            terms: self.terms.iter().map(|t| t * factor).collect(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ProfileDbError {
    #[error("unable to open profile database {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("group [{group}] not present in profile database {path:?}")]
    MissingGroup { group: String, path: PathBuf },
    #[error("malformed entry {line:?} in profile database {path:?}")]
    Malformed { line: String, path: PathBuf },
}

static DB: Lazy<RwLock<HashMap<String, Poly1d>>> = Lazy::new(|| RwLock::new(HashMap::new()));

/// Stores a cost polynomial under an operator name.
pub fn set(name: &str, value: Poly1d) {
    DB.write().unwrap().insert(name.to_string(), value);
}

/// The stored polynomial for `name`, if any.
pub fn get(name: &str) -> Option<Poly1d> {
    DB.read().unwrap().get(name).cloned()
}

/// Evaluates the cost model for `name` at `x`; NaN when the operator has no
/// profile so the caller can detect the absence.
pub fn eval(name: &str, x: f64) -> f64 {
    match DB.read().unwrap().get(name) {
        Some(poly) => poly.eval(x),
        None => f64::NAN,
    }
}

/// Drops every stored profile.
pub fn clear() {
    DB.write().unwrap().clear();
}

/// Loads a group of profiles from an INI-style file into the database.
///
/// `path` defaults to `$ARAN_PROFILE_DB` then to `profiledb.ini`; `group`
/// defaults to `$ARAN_PROFILE_GROUP` then to `default`. On error the
/// database is left unchanged; the caller may retry with another path.
pub fn read_file(path: Option<&Path>, group: Option<&str>) -> Result<(), ProfileDbError> {
    let path: PathBuf = match path {
        Some(p) => p.to_path_buf(),
        None => std::env::var_os(PROFILE_DB_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PATH)),
    };

    let group = match group {
        Some(g) => g.to_string(),
        None => std::env::var(PROFILE_GROUP_ENV).unwrap_or_else(|_| DEFAULT_GROUP.to_string()),
    };

    let text = std::fs::read_to_string(&path).map_err(|source| ProfileDbError::Io {
        path: path.clone(),
        source,
    })?;

    let mut in_group = false;
    let mut seen_group = false;
    let mut loaded: Vec<(String, Poly1d)> = Vec::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_group = header.trim() == group;
            seen_group |= in_group;
            continue;
        }

        if !in_group {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| ProfileDbError::Malformed {
            line: line.to_string(),
            path: path.clone(),
        })?;

        let terms: Result<Vec<f64>, _> = value
            .split(';')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::parse::<f64>)
            .collect();

        let terms = terms.map_err(|_| ProfileDbError::Malformed {
            line: line.to_string(),
            path: path.clone(),
        })?;

        if terms.is_empty() {
            return Err(ProfileDbError::Malformed {
                line: line.to_string(),
                path: path.clone(),
            });
        }

        loaded.push((key.trim().to_string(), Poly1d::with_terms(&terms)));
    }

    if !seen_group {
        return Err(ProfileDbError::MissingGroup { group, path });
    }

    let mut db = DB.write().unwrap();
    for (name, poly) in loaded {
        log::debug!("loaded profile for {name:?}");
        db.insert(name, poly);
    }

    Ok(())
}
