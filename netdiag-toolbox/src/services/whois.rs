//! WHOIS lookup module.

use std::sync::LazyLock;

use regex::Regex;
use whois_rust::{WhoIs, WhoIsLookupOptions};

use crate::error::{ToolboxError, ToolboxResult};
use crate::types::WhoisResult;

/// Embedded WHOIS server mapping (TLD → server).
const WHOIS_SERVERS: &str = include_str!("whois_servers.json");

static REGISTRAR: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?im)^\s*Registrar:[ \t]*(.+)$",
        r"(?im)^\s*Registrar Name:[ \t]*(.+)$",
        r"(?im)^\s*Sponsoring Registrar:[ \t]*(.+)$",
    ])
});

static CREATED: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?im)^\s*Creation Date:[ \t]*(.+)$",
        r"(?im)^\s*Created(?: Date)?:[ \t]*(.+)$",
        r"(?im)^\s*Registration (?:Time|Date):[ \t]*(.+)$",
    ])
});

static EXPIRES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?im)^\s*Registry Expiry Date:[ \t]*(.+)$",
        r"(?im)^\s*Expir(?:y|ation) (?:Date|Time):[ \t]*(.+)$",
        r"(?im)^\s*paid-till:[ \t]*(.+)$",
    ])
});

static UPDATED: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?im)^\s*Updated Date:[ \t]*(.+)$",
        r"(?im)^\s*Last (?:Updated|Modified):[ \t]*(.+)$",
    ])
});

static NAME_SERVERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?im)^\s*Name Server:[ \t]*(\S+)",
        r"(?im)^\s*nserver:[ \t]*(\S+)",
    ])
});

static STATUS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?im)^\s*Domain Status:[ \t]*(\S+)",
        r"(?im)^\s*Status:[ \t]*(\S+)",
        r"(?im)^\s*state:[ \t]*(\S+)",
    ])
});

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|p| match Regex::new(p) {
            Ok(re) => Some(re),
            Err(e) => {
                log::error!("Invalid WHOIS pattern {p}: {e}");
                None
            }
        })
        .collect()
}

/// Fetch the raw WHOIS record for `domain` and parse the common fields.
pub async fn whois_lookup(domain: &str) -> ToolboxResult<WhoisResult> {
    let whois = WhoIs::from_string(WHOIS_SERVERS).map_err(|e| {
        ToolboxError::UpstreamError(format!("Failed to initialize WHOIS client: {e}"))
    })?;

    let options = WhoIsLookupOptions::from_string(domain)
        .map_err(|e| ToolboxError::InvalidArgument(format!("Invalid domain: {e}")))?;

    let raw = whois
        .lookup_async(options)
        .await
        .map_err(|e| ToolboxError::UpstreamError(format!("WHOIS query failed: {e}")))?;

    log::debug!("WHOIS {domain}: {} bytes", raw.len());
    Ok(parse_record(domain, raw))
}

fn parse_record(domain: &str, raw: String) -> WhoisResult {
    WhoisResult {
        domain: domain.to_string(),
        registrar: first_match(&raw, &REGISTRAR),
        creation_date: first_match(&raw, &CREATED),
        expiration_date: first_match(&raw, &EXPIRES),
        updated_date: first_match(&raw, &UPDATED),
        name_servers: all_matches(&raw, &NAME_SERVERS, true),
        status: all_matches(&raw, &STATUS, false),
        raw,
    }
}

/// First non-empty capture of the first pattern that matches.
fn first_match(text: &str, patterns: &[Regex]) -> Option<String> {
    patterns
        .iter()
        .filter_map(|re| re.captures(text))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .find(|value| !value.is_empty())
}

/// Every distinct capture across all patterns, in order of appearance per pattern.
fn all_matches(text: &str, patterns: &[Regex], lowercase: bool) -> Vec<String> {
    let mut values: Vec<String> = Vec::new();
    for re in patterns {
        for caps in re.captures_iter(text) {
            let Some(m) = caps.get(1) else { continue };
            let value = m.as_str().trim().trim_end_matches(',');
            let value = if lowercase {
                value.trim_end_matches('.').to_lowercase()
            } else {
                value.to_string()
            };
            if !value.is_empty() && !values.contains(&value) {
                values.push(value);
            }
        }
    }
    values
}
