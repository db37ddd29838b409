//! Claim sets: the names and addresses an assertion speaks for.
//!
//! Claims are an ordered, deduplicated set of four claim families. The wire
//! encoding fixes the family order and sorts entries within each family, so
//! the same logical claim set always encodes to the same bytes regardless of
//! input order.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::codec::{CodecError, Decoder, Encoder};

use super::CheckError;

/// Longest hostname accepted, in bytes.
const MAX_HOSTNAME: usize = 253;

/// Longest hostname label accepted, in bytes.
const MAX_LABEL: usize = 63;

/// An ordered, duplicate-free set of claims.
///
/// Construction canonicalizes: entries are sorted within each family and
/// duplicates dropped. Decoding rejects non-canonical input instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Claims {
    dns: Vec<String>,
    dns_wildcard: Vec<String>,
    ens: Vec<String>,
    ipv4: Vec<Ipv4Addr>,
    ipv6: Vec<Ipv6Addr>,
}

impl Claims {
    /// Builds a canonical claim set: each family sorted and deduplicated.
    ///
    /// Wildcard names are stored as their base name; strip any leading `*.`
    /// before calling (see [`Claims::from_strings`]).
    #[must_use]
    pub fn new(
        mut dns: Vec<String>,
        mut dns_wildcard: Vec<String>,
        mut ens: Vec<String>,
        mut ipv4: Vec<Ipv4Addr>,
        mut ipv6: Vec<Ipv6Addr>,
    ) -> Self {
        dns.sort_unstable();
        dns.dedup();
        dns_wildcard.sort_unstable();
        dns_wildcard.dedup();
        ens.sort_unstable();
        ens.dedup();
        ipv4.sort_unstable();
        ipv4.dedup();
        ipv6.sort_unstable();
        ipv6.dedup();
        Self {
            dns,
            dns_wildcard,
            ens,
            ipv4,
            ipv6,
        }
    }

    /// Builds a claim set from raw command-line strings.
    ///
    /// Wildcard names may carry a leading `*.`, which is stripped; addresses
    /// are parsed per family.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::BadAddress`] for addresses that do not parse
    /// under their family.
    pub fn from_strings(
        dns: Vec<String>,
        dns_wildcard: Vec<String>,
        ens: Vec<String>,
        ip4: &[String],
        ip6: &[String],
    ) -> Result<Self, CheckError> {
        let dns_wildcard = dns_wildcard
            .into_iter()
            .map(|name| match name.strip_prefix("*.") {
                Some(base) => base.to_string(),
                None => name,
            })
            .collect();

        let ipv4 = ip4
            .iter()
            .map(|s| {
                s.parse::<Ipv4Addr>().map_err(|_| CheckError::BadAddress {
                    value: s.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let ipv6 = ip6
            .iter()
            .map(|s| {
                s.parse::<Ipv6Addr>().map_err(|_| CheckError::BadAddress {
                    value: s.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(dns, dns_wildcard, ens, ipv4, ipv6))
    }

    /// DNS name claims.
    #[must_use]
    pub fn dns(&self) -> &[String] {
        &self.dns
    }

    /// DNS wildcard claims, as base names (without the `*.`).
    #[must_use]
    pub fn dns_wildcard(&self) -> &[String] {
        &self.dns_wildcard
    }

    /// ENS name claims.
    #[must_use]
    pub fn ens(&self) -> &[String] {
        &self.ens
    }

    /// IPv4 address claims.
    #[must_use]
    pub fn ipv4(&self) -> &[Ipv4Addr] {
        &self.ipv4
    }

    /// IPv6 address claims.
    #[must_use]
    pub fn ipv6(&self) -> &[Ipv6Addr] {
        &self.ipv6
    }

    /// Total number of claim entries across all families.
    #[must_use]
    pub fn len(&self) -> usize {
        self.dns.len()
            + self.dns_wildcard.len()
            + self.ens.len()
            + self.ipv4.len()
            + self.ipv6.len()
    }

    /// Whether no family carries any entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Validates every claim entry.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::EmptyClaims`] for an empty set and
    /// [`CheckError::BadLabel`] for malformed names. Addresses are valid by
    /// construction.
    pub fn check(&self) -> Result<(), CheckError> {
        if self.is_empty() {
            return Err(CheckError::EmptyClaims);
        }
        for name in self.dns.iter().chain(&self.dns_wildcard) {
            check_hostname(name)?;
        }
        for name in &self.ens {
            check_ens_name(name)?;
        }
        Ok(())
    }

    /// Encodes the five families in fixed order.
    pub(crate) fn encode(&self, enc: &mut Encoder) -> Result<(), CodecError> {
        enc.length_prefixed::<2>(|e| {
            for name in &self.dns {
                e.vec::<1>(name.as_bytes())?;
            }
            Ok(())
        })?;
        enc.length_prefixed::<2>(|e| {
            for name in &self.dns_wildcard {
                e.vec::<1>(name.as_bytes())?;
            }
            Ok(())
        })?;
        enc.length_prefixed::<2>(|e| {
            for name in &self.ens {
                e.vec::<1>(name.as_bytes())?;
            }
            Ok(())
        })?;
        enc.length_prefixed::<2>(|e| {
            for ip in &self.ipv4 {
                e.bytes(&ip.octets());
            }
            Ok(())
        })?;
        enc.length_prefixed::<2>(|e| {
            for ip in &self.ipv6 {
                e.bytes(&ip.octets());
            }
            Ok(())
        })
    }

    /// Decodes the five families, enforcing sort order and uniqueness.
    pub(crate) fn decode(dec: &mut Decoder<'_>) -> Result<Self, CodecError> {
        let dns = decode_names(&mut dec.nested_vec::<2>()?)?;
        let dns_wildcard = decode_names(&mut dec.nested_vec::<2>()?)?;
        let ens = decode_names(&mut dec.nested_vec::<2>()?)?;

        let mut ipv4 = Vec::new();
        let mut inner = dec.nested_vec::<2>()?;
        while !inner.is_empty() {
            let addr = Ipv4Addr::from(inner.array::<4>()?);
            if let Some(prev) = ipv4.last() {
                if *prev >= addr {
                    return Err(inner.non_canonical("unsorted or duplicate address"));
                }
            }
            ipv4.push(addr);
        }

        let mut ipv6 = Vec::new();
        let mut inner = dec.nested_vec::<2>()?;
        while !inner.is_empty() {
            let addr = Ipv6Addr::from(inner.array::<16>()?);
            if let Some(prev) = ipv6.last() {
                if *prev >= addr {
                    return Err(inner.non_canonical("unsorted or duplicate address"));
                }
            }
            ipv6.push(addr);
        }

        Ok(Self {
            dns,
            dns_wildcard,
            ens,
            ipv4,
            ipv6,
        })
    }
}

fn decode_names(dec: &mut Decoder<'_>) -> Result<Vec<String>, CodecError> {
    let mut names: Vec<String> = Vec::new();
    while !dec.is_empty() {
        let bytes = dec.vec::<1>()?;
        let name = std::str::from_utf8(bytes)
            .map_err(|_| dec.non_canonical("claim name is not valid UTF-8"))?
            .to_string();
        if let Some(prev) = names.last() {
            if prev.as_str() >= name.as_str() {
                return Err(dec.non_canonical("unsorted or duplicate claim name"));
            }
        }
        names.push(name);
    }
    Ok(names)
}

/// Validates a hostname: lowercase LDH labels, 1-63 bytes each, at most 253
/// bytes total.
fn check_hostname(name: &str) -> Result<(), CheckError> {
    let bad = |reason: &'static str| CheckError::BadLabel {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(bad("empty name"));
    }
    if name.len() > MAX_HOSTNAME {
        return Err(bad("name too long"));
    }
    for label in name.split('.') {
        if label.is_empty() {
            return Err(bad("empty label"));
        }
        if label.len() > MAX_LABEL {
            return Err(bad("label too long"));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(bad("label starts or ends with hyphen"));
        }
        if !label
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
        {
            return Err(bad("label contains invalid character"));
        }
    }
    Ok(())
}

/// Validates an ENS name: `.eth` suffix, non-empty labels, length-bounded.
fn check_ens_name(name: &str) -> Result<(), CheckError> {
    let bad = |reason: &'static str| CheckError::BadLabel {
        name: name.to_string(),
        reason,
    };

    if !name.ends_with(".eth") {
        return Err(bad("ENS name must end in .eth"));
    }
    if name.len() > MAX_HOSTNAME {
        return Err(bad("name too long"));
    }
    for label in name.split('.') {
        if label.is_empty() {
            return Err(bad("empty label"));
        }
        if label.len() > MAX_LABEL {
            return Err(bad("label too long"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn construction_sorts_and_dedups() {
        let claims = Claims::new(
            names(&["b.example.com", "a.example.com", "b.example.com"]),
            Vec::new(),
            Vec::new(),
            vec![Ipv4Addr::new(10, 0, 0, 2), Ipv4Addr::new(10, 0, 0, 1)],
            Vec::new(),
        );
        assert_eq!(claims.dns(), &["a.example.com", "b.example.com"]);
        assert_eq!(
            claims.ipv4(),
            &[Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)]
        );
    }

    #[test]
    fn permuted_input_encodes_identically() {
        let a = Claims::new(
            names(&["x.example.com", "y.example.com"]),
            Vec::new(),
            names(&["alpha.eth", "beta.eth"]),
            Vec::new(),
            Vec::new(),
        );
        let b = Claims::new(
            names(&["y.example.com", "x.example.com"]),
            Vec::new(),
            names(&["beta.eth", "alpha.eth"]),
            Vec::new(),
            Vec::new(),
        );

        let mut enc_a = Encoder::new();
        a.encode(&mut enc_a).unwrap();
        let mut enc_b = Encoder::new();
        b.encode(&mut enc_b).unwrap();
        assert_eq!(enc_a.into_bytes(), enc_b.into_bytes());
    }

    #[test]
    fn round_trip() {
        let claims = Claims::new(
            names(&["example.com"]),
            names(&["example.org"]),
            names(&["vitalik.eth"]),
            vec![Ipv4Addr::new(192, 0, 2, 1)],
            vec!["2001:db8::1".parse().unwrap()],
        );
        let mut enc = Encoder::new();
        claims.encode(&mut enc).unwrap();
        let bytes = enc.into_bytes();

        let mut dec = Decoder::new(&bytes);
        let decoded = Claims::decode(&mut dec).unwrap();
        dec.finish().unwrap();
        assert_eq!(decoded, claims);
    }

    #[test]
    fn decode_rejects_unsorted_names() {
        let claims = Claims::new(
            names(&["a.example.com", "b.example.com"]),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
        );
        let mut enc = Encoder::new();
        claims.encode(&mut enc).unwrap();
        let mut bytes = enc.into_bytes();

        // Swap the two names in place: both are 13 bytes behind 1-byte
        // prefixes inside the first family.
        let body = &mut bytes[2..2 + 28];
        let (first, second) = body.split_at_mut(14);
        first.swap_with_slice(second);

        let mut dec = Decoder::new(&bytes);
        assert!(matches!(
            Claims::decode(&mut dec),
            Err(CodecError::NonCanonical { .. })
        ));
    }

    #[test]
    fn from_strings_strips_wildcard_prefix() {
        let claims = Claims::from_strings(
            Vec::new(),
            names(&["*.example.com", "example.net"]),
            Vec::new(),
            &[],
            &[],
        )
        .unwrap();
        assert_eq!(claims.dns_wildcard(), &["example.com", "example.net"]);
    }

    #[test]
    fn from_strings_rejects_bad_address() {
        let err = Claims::from_strings(
            Vec::new(),
            Vec::new(),
            Vec::new(),
            &["2001:db8::1".to_string()],
            &[],
        )
        .unwrap_err();
        assert!(matches!(err, CheckError::BadAddress { .. }));
    }

    #[test]
    fn check_rejects_empty_and_bad_labels() {
        assert_eq!(Claims::default().check(), Err(CheckError::EmptyClaims));

        let claims = Claims::new(
            names(&["Example.com"]),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
        );
        assert!(matches!(claims.check(), Err(CheckError::BadLabel { .. })));

        let claims = Claims::new(
            names(&["-bad.example.com"]),
            Vec::new(),
            Vec::new(),
            Vec::new(),
            Vec::new(),
        );
        assert!(matches!(claims.check(), Err(CheckError::BadLabel { .. })));
    }

    #[test]
    fn check_rejects_non_eth_ens() {
        let claims = Claims::new(
            Vec::new(),
            Vec::new(),
            names(&["vitalik.xyz"]),
            Vec::new(),
            Vec::new(),
        );
        assert!(matches!(claims.check(), Err(CheckError::BadLabel { .. })));
    }
}
