//! Request parameter canonicalization and fingerprinting.
//!
//! A transform request can carry parameters in three places: the optional
//! path segment (`/{url}`), the request body, and the query string. They are
//! merged into one flat [`TransformRequest`] before anything else happens, so
//! the rest of the pipeline never has to care where a value came from.
//!
//! ## Merge order
//!
//! Sources are applied in [`ParamSource`] declaration order:
//!
//! ```text
//! Route  →  Body  →  Query
//! ```
//!
//! A later source overwrites an earlier one for the same key, so the query
//! string wins over the body, which wins over the route segment.
//!
//! ## Flags
//!
//! `flip`, `flop`, `greyscale`/`grayscale`, `negate` and `normalize`/`normalise`
//! are presence-only: `?flip`, `?flip=1` and `?flip=false` all flip. They are
//! collected into [`Flags`] once, at canonicalization time.
//!
//! ## Fingerprint
//!
//! [`fingerprint`] is a SHA-256 over the merged mapping in sorted key order,
//! with every key and value length-prefixed. Two requests with the same
//! key/value pairs always produce the same fingerprint no matter how their
//! sources were ordered, and the fingerprint doubles as the cache file name.

use bitflags::bitflags;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Name of the one required parameter.
pub const URL_KEY: &str = "url";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("no image url provided")]
    MissingUrl,
}

/// Where a parameter was supplied. Declaration order is merge order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ParamSource {
    Route,
    Body,
    Query,
}

bitflags! {
    /// Presence-only transform switches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Flags: u8 {
        const FLIP = 1;
        const FLOP = 1 << 1;
        const GREYSCALE = 1 << 2;
        const NEGATE = 1 << 3;
        const NORMALIZE = 1 << 4;
    }
}

/// Parameter names that switch a flag on, including spelling aliases.
const FLAG_KEYS: &[(&str, Flags)] = &[
    ("flip", Flags::FLIP),
    ("flop", Flags::FLOP),
    ("greyscale", Flags::GREYSCALE),
    ("grayscale", Flags::GREYSCALE),
    ("negate", Flags::NEGATE),
    ("normalize", Flags::NORMALIZE),
    ("normalise", Flags::NORMALIZE),
];

impl Flags {
    /// Collect the flags switched on by the given parameter names.
    pub fn from_keys<'a>(keys: impl IntoIterator<Item = &'a str>) -> Self {
        keys.into_iter()
            .filter_map(|key| {
                FLAG_KEYS
                    .iter()
                    .find(|(name, _)| *name == key)
                    .map(|(_, flag)| *flag)
            })
            .fold(Flags::empty(), |acc, flag| acc | flag)
    }
}

/// The merged, validated parameter set of one request.
///
/// Invariant: `url` is present and non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformRequest {
    params: BTreeMap<String, String>,
    flags: Flags,
}

impl TransformRequest {
    /// Validate a merged mapping and derive its flags.
    pub fn from_params(params: BTreeMap<String, String>) -> Result<Self, RequestError> {
        match params.get(URL_KEY) {
            Some(url) if !url.is_empty() => {}
            _ => return Err(RequestError::MissingUrl),
        }
        let flags = Flags::from_keys(params.keys().map(String::as_str));
        Ok(Self { params, flags })
    }

    /// The source image URL.
    pub fn url(&self) -> &str {
        self.params
            .get(URL_KEY)
            .map(String::as_str)
            .unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn fingerprint(&self) -> Fingerprint {
        fingerprint(self)
    }
}

/// Parameters collected per source, merged in [`ParamSource`] order.
#[derive(Debug, Default)]
pub struct ParamLayers {
    layers: BTreeMap<ParamSource, Vec<(String, String)>>,
}

impl ParamLayers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add parameters from one source. Within a source, the last
    /// occurrence of a key wins.
    pub fn with<I>(mut self, source: ParamSource, params: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.layers.entry(source).or_default().extend(params);
        self
    }

    /// Flatten all layers into one mapping and validate it.
    pub fn canonicalize(self) -> Result<TransformRequest, RequestError> {
        let mut merged = BTreeMap::new();
        for (_, params) in self.layers {
            merged.extend(params);
        }
        TransformRequest::from_params(merged)
    }
}

/// Merge route, body and query parameters into a [`TransformRequest`].
pub fn canonicalize<R, B, Q>(route: R, body: B, query: Q) -> Result<TransformRequest, RequestError>
where
    R: IntoIterator<Item = (String, String)>,
    B: IntoIterator<Item = (String, String)>,
    Q: IntoIterator<Item = (String, String)>,
{
    ParamLayers::new()
        .with(ParamSource::Route, route)
        .with(ParamSource::Body, body)
        .with(ParamSource::Query, query)
        .canonicalize()
}

/// Flatten a JSON body object into string parameters.
///
/// Strings are taken as-is, other scalars use their JSON text (`100`,
/// `true`), `null` becomes an empty string, and nested arrays or objects are
/// kept as compact JSON.
pub fn json_fields(body: serde_json::Map<String, serde_json::Value>) -> Vec<(String, String)> {
    body.into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            (key, value)
        })
        .collect()
}

/// SHA-256 identity of a [`TransformRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Hash the full parameter mapping in sorted key order.
pub fn fingerprint(request: &TransformRequest) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(b"transform\0");
    for (key, value) in &request.params {
        hasher.update((key.len() as u64).to_le_bytes());
        hasher.update(key.as_bytes());
        hasher.update((value.len() as u64).to_le_bytes());
        hasher.update(value.as_bytes());
    }
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    Fingerprint(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn none() -> Vec<(String, String)> {
        Vec::new()
    }

    // =========================================================================
    // Merge order
    // =========================================================================

    #[test]
    fn query_overrides_body_overrides_route() {
        let request = canonicalize(
            pairs(&[("url", "http://route/a.jpg"), ("width", "10")]),
            pairs(&[("url", "http://body/a.jpg"), ("height", "20")]),
            pairs(&[("url", "http://query/a.jpg")]),
        )
        .unwrap();

        assert_eq!(request.url(), "http://query/a.jpg");
        assert_eq!(request.get("width"), Some("10"));
        assert_eq!(request.get("height"), Some("20"));
    }

    #[test]
    fn body_overrides_route() {
        let request = canonicalize(
            pairs(&[("url", "http://route/a.jpg")]),
            pairs(&[("url", "http://body/a.jpg")]),
            none(),
        )
        .unwrap();
        assert_eq!(request.url(), "http://body/a.jpg");
    }

    #[test]
    fn route_url_used_when_nothing_else_supplies_one() {
        let request = canonicalize(
            pairs(&[("url", "http://route/a.jpg")]),
            none(),
            pairs(&[("width", "100")]),
        )
        .unwrap();
        assert_eq!(request.url(), "http://route/a.jpg");
    }

    #[test]
    fn repeated_key_within_source_last_wins() {
        let request = canonicalize(
            none(),
            none(),
            pairs(&[("url", "u"), ("width", "1"), ("width", "2")]),
        )
        .unwrap();
        assert_eq!(request.get("width"), Some("2"));
    }

    #[test]
    fn layers_added_out_of_order_still_merge_in_source_order() {
        let request = ParamLayers::new()
            .with(ParamSource::Query, pairs(&[("url", "query")]))
            .with(ParamSource::Route, pairs(&[("url", "route")]))
            .canonicalize()
            .unwrap();
        assert_eq!(request.url(), "query");
    }

    // =========================================================================
    // url validation
    // =========================================================================

    #[test]
    fn missing_url_is_rejected() {
        let result = canonicalize(none(), none(), pairs(&[("width", "100")]));
        assert_eq!(result, Err(RequestError::MissingUrl));
    }

    #[test]
    fn empty_url_is_rejected() {
        let result = canonicalize(none(), none(), pairs(&[("url", "")]));
        assert_eq!(result, Err(RequestError::MissingUrl));
    }

    #[test]
    fn empty_query_url_overrides_route_url() {
        let result = canonicalize(pairs(&[("url", "http://a/b.png")]), none(), pairs(&[("url", "")]));
        assert_eq!(result, Err(RequestError::MissingUrl));
    }

    // =========================================================================
    // Flags
    // =========================================================================

    #[test]
    fn flags_are_set_by_presence_not_value() {
        let request = canonicalize(
            none(),
            none(),
            pairs(&[("url", "u"), ("flip", "false"), ("negate", "")]),
        )
        .unwrap();
        assert_eq!(request.flags(), Flags::FLIP | Flags::NEGATE);
    }

    #[test]
    fn flag_aliases_map_to_same_flag() {
        assert_eq!(Flags::from_keys(["grayscale"]), Flags::GREYSCALE);
        assert_eq!(Flags::from_keys(["greyscale"]), Flags::GREYSCALE);
        assert_eq!(Flags::from_keys(["normalise"]), Flags::NORMALIZE);
        assert_eq!(Flags::from_keys(["normalize"]), Flags::NORMALIZE);
    }

    #[test]
    fn unrelated_keys_set_no_flags() {
        assert_eq!(Flags::from_keys(["url", "width", "rotate", "Flip"]), Flags::empty());
    }

    // =========================================================================
    // JSON body
    // =========================================================================

    #[test]
    fn json_fields_stringify_scalars() {
        let body: serde_json::Map<String, serde_json::Value> = serde_json::from_str(
            r#"{"url": "http://a/b.png", "width": 100, "flip": true, "fit": null, "x": [1, 2]}"#,
        )
        .unwrap();
        let mut fields = json_fields(body);
        fields.sort();
        assert_eq!(
            fields,
            pairs(&[
                ("fit", ""),
                ("flip", "true"),
                ("url", "http://a/b.png"),
                ("width", "100"),
                ("x", "[1,2]"),
            ])
        );
    }

    // =========================================================================
    // Fingerprint
    // =========================================================================

    #[test]
    fn fingerprint_is_64_hex_chars() {
        let request = canonicalize(none(), none(), pairs(&[("url", "u")])).unwrap();
        let hex = request.fingerprint().to_string();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn fingerprint_ignores_source_of_a_value() {
        let from_query = canonicalize(none(), none(), pairs(&[("url", "u"), ("width", "5")])).unwrap();
        let from_mixed = canonicalize(pairs(&[("url", "u")]), pairs(&[("width", "5")]), none()).unwrap();
        assert_eq!(from_query.fingerprint(), from_mixed.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_value() {
        let a = canonicalize(none(), none(), pairs(&[("url", "u"), ("width", "5")])).unwrap();
        let b = canonicalize(none(), none(), pairs(&[("url", "u"), ("width", "6")])).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_is_not_fooled_by_shifting_boundaries() {
        let a = canonicalize(none(), none(), pairs(&[("url", "u"), ("ab", "c")])).unwrap();
        let b = canonicalize(none(), none(), pairs(&[("url", "u"), ("a", "bc")])).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn flag_spelling_still_changes_fingerprint() {
        // Same effect, different parameter set: cached separately.
        let a = canonicalize(none(), none(), pairs(&[("url", "u"), ("grayscale", "")])).unwrap();
        let b = canonicalize(none(), none(), pairs(&[("url", "u"), ("greyscale", "")])).unwrap();
        assert_eq!(a.flags(), b.flags());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    proptest! {
        #[test]
        fn fingerprint_independent_of_insertion_order(
            entries in proptest::collection::btree_map("[a-t]{1,8}", "[a-z0-9]{0,8}", 0..8),
            seed in any::<u64>(),
        ) {
            let mut forward: Vec<(String, String)> = entries.into_iter().collect();
            forward.push(("url".into(), "http://example.com/a.png".into()));
            let mut shuffled = forward.clone();
            // Deterministic rotation stands in for a shuffle.
            let len = shuffled.len();
            shuffled.rotate_left((seed as usize) % len);
            shuffled.reverse();

            let a = canonicalize(none(), none(), forward).unwrap();
            let b = canonicalize(none(), none(), shuffled).unwrap();
            prop_assert_eq!(a.fingerprint(), b.fingerprint());
        }

        #[test]
        fn fingerprint_changes_with_any_edit(
            entries in proptest::collection::btree_map("[a-t]{1,8}", "[a-z0-9]{0,8}", 1..8),
            edit in 0u8..3,
            pick in any::<proptest::sample::Index>(),
            suffix in "[a-z0-9]{1,4}",
        ) {
            let keys: Vec<String> = entries.keys().cloned().collect();
            let key = pick.get(&keys).clone();
            let mut edited = entries.clone();
            match edit {
                // Changed value
                0 => {
                    if let Some(value) = edited.get_mut(&key) {
                        value.push_str(&suffix);
                    }
                }
                // Added key; 'u' is outside the generated key alphabet
                1 => {
                    edited.insert(format!("{key}u"), suffix.clone());
                }
                // Removed key
                _ => {
                    edited.remove(&key);
                }
            }

            let with_url = |map: std::collections::BTreeMap<String, String>| {
                let mut pairs: Vec<(String, String)> = map.into_iter().collect();
                pairs.push(("url".into(), "http://example.com/a.png".into()));
                pairs
            };
            let a = canonicalize(none(), none(), with_url(entries)).unwrap();
            let b = canonicalize(none(), none(), with_url(edited)).unwrap();
            prop_assert_ne!(a.fingerprint(), b.fingerprint());
        }
    }
}
