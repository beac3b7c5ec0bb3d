use std::collections::HashSet;
use std::sync::Mutex;

use once_cell::sync::Lazy;

static POOL: Lazy<Mutex<HashSet<&'static str>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// Interns `s` into the global segment pool and returns the canonical
/// `&'static str` for it. Interned strings are never freed; pointer
/// equality on the result is string equality.
pub fn intern(s: &str) -> &'static str {
    let mut pool = POOL.lock().expect("intern pool poisoned");
    if let Some(&have) = pool.get(s) {
        return have;
    }
    let leaked: &'static str = Box::leak(s.to_owned().into_boxed_str());
    pool.insert(leaked);
    leaked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interned_strings_are_pointer_equal() {
        let a = intern("com.test");
        let b = intern(&"com.test".to_string());
        assert!(std::ptr::eq(a, b));
        assert_eq!(a, "com.test");
    }

    #[test]
    fn distinct_strings_stay_distinct() {
        let a = intern("foo");
        let b = intern("bar");
        assert!(!std::ptr::eq(a, b));
    }
}
