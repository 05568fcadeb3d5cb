use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const DEFAULT_URL: &str = "https://cds.climate.copernicus.eu/api";

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base API URL, typically `https://cds.climate.copernicus.eu/api`.
    pub url: String,
    /// Personal access token, sent as the `PRIVATE-TOKEN` header.
    pub key: String,
    /// Whether to verify TLS certificates.
    pub verify: bool,
}

#[derive(Debug, Default, PartialEq)]
struct RcConfig {
    url: Option<String>,
    key: Option<String>,
    verify: Option<bool>,
}

/// Resolves configuration from (in order of precedence) explicit arguments,
/// `CADS_API_*` environment variables and the first rc file found.
pub(crate) fn load_config(
    url: Option<String>,
    key: Option<String>,
    verify: Option<bool>,
) -> Result<ClientConfig> {
    let env = |name: &str| std::env::var(name).ok();
    let candidates = rc_candidates(env("CADS_API_RC"));
    resolve(url, key, verify, &env, &candidates)
}

fn resolve(
    url: Option<String>,
    key: Option<String>,
    verify: Option<bool>,
    env: &dyn Fn(&str) -> Option<String>,
    rc_candidates: &[PathBuf],
) -> Result<ClientConfig> {
    let mut url = url.or_else(|| env("CADS_API_URL"));
    let mut key = key.or_else(|| env("CADS_API_KEY"));
    let mut verify = verify.or_else(|| env("CADS_API_VERIFY").map(|v| parse_verify(&v)));

    if url.is_none() || key.is_none() || verify.is_none() {
        if let Some(rc_path) = rc_candidates.iter().find(|p| p.exists()) {
            let cfg = read_rc(rc_path)?;
            url = url.or(cfg.url);
            key = key.or(cfg.key);
            verify = verify.or(cfg.verify);
        }
    }

    let key = match key {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => {
            return Err(Error::Config(if rc_candidates.is_empty() {
                "Missing configuration: key (set CADS_API_KEY or create .cadsapirc)".to_string()
            } else {
                format!(
                    "Missing configuration: key (set CADS_API_KEY or put `key:` in one of: {})",
                    rc_candidates
                        .iter()
                        .map(|p| p.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            }));
        }
    };

    Ok(ClientConfig {
        url: url.unwrap_or_else(|| DEFAULT_URL.to_string()),
        key,
        verify: verify.unwrap_or(true),
    })
}

fn parse_verify(v: &str) -> bool {
    !matches!(
        v.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

fn read_rc(path: &Path) -> Result<RcConfig> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        Error::io(
            format!("failed to read configuration file {}", path.display()),
            e,
        )
    })?;
    Ok(parse_rc(&text))
}

fn parse_rc(text: &str) -> RcConfig {
    let mut cfg = RcConfig::default();

    // Support formatting where `key:` is on one line and the token is on the next line.
    let mut pending_key: Option<&str> = None;

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        if let Some(pk) = pending_key.take() {
            if !line.contains(':') {
                let v = strip_quotes(line);
                match pk {
                    "url" => cfg.url = Some(v.to_string()),
                    "key" => cfg.key = Some(v.to_string()),
                    _ => {}
                }
                continue;
            }
        }

        let Some((k, v)) = line.split_once(':') else {
            continue;
        };
        let v = strip_quotes(v.trim());
        match k.trim() {
            "url" if v.is_empty() => pending_key = Some("url"),
            "url" => cfg.url = Some(v.to_string()),
            "key" if v.is_empty() => pending_key = Some("key"),
            "key" => cfg.key = Some(v.to_string()),
            "verify" if !v.is_empty() => cfg.verify = Some(parse_verify(v)),
            _ => {}
        }
    }

    cfg
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

fn rc_candidates(explicit: Option<String>) -> Vec<PathBuf> {
    // 1) CADS_API_RC (explicit)
    // 2) ./.cadsapirc
    // 3) ~/.cadsapirc
    if let Some(p) = explicit {
        return vec![PathBuf::from(p)];
    }

    let mut v = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        v.push(cwd.join(".cadsapirc"));
    }
    if let Some(home) = dirs::home_dir() {
        v.push(home.join(".cadsapirc"));
    }
    v
}
