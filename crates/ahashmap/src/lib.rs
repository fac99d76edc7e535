//! Thin aliases over [`std::collections::HashMap`]/`HashSet` using `ahash` as
//! the hasher when the `ahash` feature is enabled, falling back to the
//! standard hasher otherwise.

#[cfg(feature = "ahash")]
pub type AHashMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;
#[cfg(feature = "ahash")]
pub type AHashSet<T> = std::collections::HashSet<T, ahash::RandomState>;

#[cfg(not(feature = "ahash"))]
pub type AHashMap<K, V> = std::collections::HashMap<K, V>;
#[cfg(not(feature = "ahash"))]
pub type AHashSet<T> = std::collections::HashSet<T>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn map_roundtrip() {
        let mut m: AHashMap<String, u32> = AHashMap::default();
        m.insert("a".to_string(), 1);
        assert_eq!(m.get("a"), Some(&1));
    }

    #[test]
    fn set_roundtrip() {
        let mut s: AHashSet<u32> = AHashSet::default();
        s.insert(1);
        assert!(s.contains(&1));
    }
}
