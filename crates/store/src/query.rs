use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use defmap_model::{Error, Kind, Result};

/// Controls whether non-exported defs are included in query results.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Locality {
    /// Return only exported defs.
    ExportedOnly,
    /// Return everything from the primary store, only exported defs from
    /// dependent stores.
    ExportedDependents,
    /// Return exported and non-exported defs from all stores.
    All,
}

impl Locality {
    /// Whether a store at this position should restrict to exported defs.
    pub fn exported_only(self, primary_store: bool) -> bool {
        match self {
            Locality::ExportedOnly => true,
            Locality::ExportedDependents => !primary_store,
            Locality::All => false,
        }
    }
}

/// A name lookup: exact or prefix, over a set of kinds, with a locality
/// policy. Names compare case-insensitively; the constructor lowercases.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Query {
    /// The kinds to consider.
    pub kinds: Vec<Kind>,
    /// The name, or name prefix, to match. Always lowercase.
    pub name: String,
    /// Whether `name` is a prefix rather than exact.
    pub prefix: bool,
    /// Criteria for including non-exported defs.
    pub locality: Locality,
}

impl Query {
    /// A query matching `name` completely.
    pub fn name(name: &str) -> Query {
        Query::new(name, false)
    }

    /// A query matching `name` as a prefix.
    pub fn prefix(name: &str) -> Query {
        Query::new(name, true)
    }

    fn new(name: &str, prefix: bool) -> Query {
        Query {
            kinds: Kind::ALL.to_vec(),
            name: name.to_lowercase(),
            prefix,
            locality: Locality::ExportedDependents,
        }
    }

    /// Copies this query restricted to just `kind`.
    #[must_use]
    pub fn kind(mut self, kind: Kind) -> Query {
        self.kinds = vec![kind];
        self
    }

    /// Copies this query restricted to `kinds`.
    #[must_use]
    pub fn kinds(mut self, kinds: &[Kind]) -> Query {
        self.kinds = kinds.to_vec();
        self
    }

    /// Copies this query configured to return only exported defs.
    #[must_use]
    pub fn exported_only(mut self) -> Query {
        self.locality = Locality::ExportedOnly;
        self
    }

    /// Copies this query configured to return all defs from all stores.
    #[must_use]
    pub fn all(mut self) -> Query {
        self.locality = Locality::All;
        self
    }

    /// Whether an index entry name satisfies this query.
    pub fn matches(&self, name: &str) -> bool {
        if self.prefix {
            name.starts_with(&self.name)
        } else {
            name == self.name
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Query({}, pre={}, loc={:?}, kinds={:?})",
            self.name, self.prefix, self.locality, self.kinds
        )
    }
}

/// Cooperative cancellation for long queries. Checked at iterator-step
/// boundaries; a cancelled operation fails with `Error::Cancelled`,
/// leaving whatever the caller accumulated so far intact.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_lowercased() {
        let q = Query::name("FooBar");
        assert_eq!(q.name, "foobar");
        assert!(q.matches("foobar"));
        assert!(!q.matches("foobarbaz"));
        assert!(Query::prefix("Foo").matches("foobarbaz"));
    }

    #[test]
    fn defaults() {
        let q = Query::name("x");
        assert_eq!(q.kinds, Kind::ALL.to_vec());
        assert_eq!(q.locality, Locality::ExportedDependents);
    }

    #[test]
    fn locality_policies() {
        assert!(Locality::ExportedOnly.exported_only(true));
        assert!(Locality::ExportedOnly.exported_only(false));
        assert!(!Locality::ExportedDependents.exported_only(true));
        assert!(Locality::ExportedDependents.exported_only(false));
        assert!(!Locality::All.exported_only(true));
        assert!(!Locality::All.exported_only(false));
    }

    #[test]
    fn cancellation_trips_check() {
        let token = CancelToken::new();
        assert!(token.check().is_ok());
        token.cancel();
        assert!(matches!(token.check(), Err(Error::Cancelled)));
    }
}
