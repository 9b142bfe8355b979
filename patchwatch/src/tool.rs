/// Known domain fragments and the product each one publishes advisories for.
const KNOWN_DOMAINS: &[(&str, &str)] = &[
    ("postgresql.org", "PostgreSQL"),
    ("python.org", "Python"),
    ("nodejs.org", "Node.js"),
    ("github.com", "GitHub"),
    ("msrc.microsoft.com", "Microsoft"),
    ("nvd.nist.gov", "NVD"),
    ("osv.dev", "OSV"),
];

pub const UNKNOWN_TOOL: &str = "Unknown";

/// Derive a canonical product name from a source url.
pub fn extract_tool(url: &str) -> &'static str {
    let lowered = url.to_lowercase();
    KNOWN_DOMAINS
        .iter()
        .find(|(domain, _)| lowered.contains(domain))
        .map(|(_, tool)| *tool)
        .unwrap_or(UNKNOWN_TOOL)
}

/// Product component of a CPE 2.3 string, e.g. `cpe:2.3:a:vendor:product:1.0:...`.
pub fn product_from_cpe(cpe: &str) -> Option<&str> {
    let mut parts = cpe.split(':');
    if parts.next()? != "cpe" {
        return None;
    }
    parts
        .nth(3)
        .filter(|p| !p.is_empty() && *p != "*" && *p != "-")
}
