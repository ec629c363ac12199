//! Server version parsing and comparison.
//!
//! Swimlane has shipped two version-string shapes over its life: the legacy
//! single token `M.m.p-build` (e.g. `2.15.0-1234`) and the newer
//! `product+build+buildno` triple (e.g. `10.5.0+7.2.0+173456`). Both decode
//! into a [`ServerVersion`].

use std::cmp::Ordering;

use crate::error::{Error, ErrorKind, Result};

/// Decoded server version information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerVersion {
    /// Product version, e.g. `10.5.0`.
    pub product_version: String,
    /// Build version. Equal to the product version on legacy servers.
    pub build_version: String,
    /// Opaque build number.
    pub build_number: String,
}

impl ServerVersion {
    /// Parse a raw `apiVersion` string from the settings endpoint.
    pub fn parse(raw: &str) -> Self {
        if raw.contains('+') {
            let mut parts = raw.splitn(3, '+');
            let product = parts.next().unwrap_or_default().to_string();
            let build = parts.next().unwrap_or_default().to_string();
            let number = parts.next().unwrap_or_default().to_string();
            Self {
                product_version: product.clone(),
                build_version: if build.is_empty() { product } else { build },
                build_number: number,
            }
        } else {
            // Legacy M.m.p-build
            let mut parts = raw.splitn(2, '-');
            let product = parts.next().unwrap_or_default().to_string();
            let number = parts.next().unwrap_or_default().to_string();
            Self {
                product_version: product.clone(),
                build_version: product,
                build_number: number,
            }
        }
    }

    /// Check the product version against an optional inclusive range,
    /// returning a `ProductVersion` error when outside it.
    pub fn require_product(&self, min: Option<&str>, max: Option<&str>) -> Result<()> {
        check_range(&self.product_version, min, max).map_err(|required| {
            Error::new(ErrorKind::ProductVersion {
                required,
                actual: self.product_version.clone(),
            })
        })
    }

    /// Check the build version against an optional inclusive range.
    pub fn require_build(&self, min: Option<&str>, max: Option<&str>) -> Result<()> {
        check_range(&self.build_version, min, max).map_err(|required| {
            Error::new(ErrorKind::BuildVersion {
                required,
                actual: self.build_version.clone(),
            })
        })
    }
}

fn check_range(
    actual: &str,
    min: Option<&str>,
    max: Option<&str>,
) -> std::result::Result<(), String> {
    if let Some(min) = min {
        if compare_versions(actual, min, true) == Ordering::Less {
            return Err(format!(">= {}", min));
        }
    }
    if let Some(max) = max {
        if compare_versions(actual, max, true) == Ordering::Greater {
            return Err(format!("<= {}", max));
        }
    }
    Ok(())
}

/// Compare two dotted version strings segment by segment.
///
/// Non-numeric segments compare as zero. With `zerofill` the shorter version
/// is padded with zero segments (so `"2.15" < "2.15.1"`); without it the
/// comparison stops at the shorter length (so `"2.15"` equals `"2.15.1"`).
pub fn compare_versions(a: &str, b: &str, zerofill: bool) -> Ordering {
    let mut a_parts: Vec<u64> = a.split('.').map(numeric_segment).collect();
    let mut b_parts: Vec<u64> = b.split('.').map(numeric_segment).collect();

    if zerofill {
        let len = a_parts.len().max(b_parts.len());
        a_parts.resize(len, 0);
        b_parts.resize(len, 0);
    } else {
        let len = a_parts.len().min(b_parts.len());
        a_parts.truncate(len);
        b_parts.truncate(len);
    }

    a_parts.cmp(&b_parts)
}

fn numeric_segment(segment: &str) -> u64 {
    let digits: String = segment.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_legacy_form() {
        let v = ServerVersion::parse("2.15.0-1234");
        assert_eq!(v.product_version, "2.15.0");
        assert_eq!(v.build_version, "2.15.0");
        assert_eq!(v.build_number, "1234");
    }

    #[test]
    fn test_parse_triple_form() {
        let v = ServerVersion::parse("10.5.0+7.2.0+173456");
        assert_eq!(v.product_version, "10.5.0");
        assert_eq!(v.build_version, "7.2.0");
        assert_eq!(v.build_number, "173456");
    }

    #[test]
    fn test_compare_versions_total_order() {
        assert_eq!(compare_versions("2.15.0", "2.15.0", true), Ordering::Equal);
        assert_eq!(compare_versions("2.15.0", "2.16.0", true), Ordering::Less);
        assert_eq!(compare_versions("10.0.0", "9.9.9", true), Ordering::Greater);
        // Numeric, not lexical
        assert_eq!(compare_versions("2.10.0", "2.9.0", true), Ordering::Greater);
    }

    #[test]
    fn test_compare_versions_zerofill() {
        assert_eq!(compare_versions("2.15", "2.15.1", true), Ordering::Less);
        assert_eq!(compare_versions("2.15", "2.15.1", false), Ordering::Equal);
        assert_eq!(compare_versions("2.15", "2.15.0", true), Ordering::Equal);
    }

    #[test]
    fn test_require_product_range() {
        let v = ServerVersion::parse("10.5.0+7.2.0+173456");
        assert!(v.require_product(Some("10.0.0"), None).is_ok());
        assert!(v.require_product(Some("10.0.0"), Some("11.0.0")).is_ok());

        let err = v.require_product(Some("11.0.0"), None).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::ProductVersion { .. }));

        let err = v.require_build(Some("8.0.0"), None).unwrap_err();
        assert!(matches!(err.kind, ErrorKind::BuildVersion { .. }));
    }
}
