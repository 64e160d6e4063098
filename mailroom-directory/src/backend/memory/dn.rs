//! Distinguished name handling for the in-memory backend.

/// Split `dn` into its RDNs at every comma not escaped with a backslash.
pub fn rdns(dn: &str) -> Vec<&str> {
    let mut rdns = Vec::new();
    let mut start = 0;
    let mut escaped = false;

    for (index, c) in dn.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            ',' => {
                rdns.push(&dn[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    rdns.push(&dn[start..]);

    rdns
}

/// Lowercase `dn` and trim the space around each RDN's type and value.
pub fn normalize(dn: &str) -> String {
    rdns(dn)
        .into_iter()
        .map(|rdn| match rdn.split_once('=') {
            Some((attribute, value)) => format!("{}={}", attribute.trim(), value.trim()),
            None => rdn.trim().to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
        .to_lowercase()
}

/// Depth of `dn` below `base`, if `dn` is `base` or one of its descendants.
///
/// Both DNs must already be normalized.
pub fn relation(dn: &str, base: &str) -> Option<usize> {
    let dn = rdns(dn);
    let base = rdns(base);
    let depth = dn.len().checked_sub(base.len())?;

    (dn[depth..] == base[..]).then_some(depth)
}

/// Value of the `attribute` RDN type anywhere in `dn`, for `:dn` matching.
pub fn rdn_values<'a>(dn: &'a str, attribute: &str) -> impl Iterator<Item = &'a str> {
    rdns(dn).into_iter().filter_map(move |rdn| {
        let (name, value) = rdn.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case(attribute)
            .then(|| value.trim())
    })
}
