//! Runtime configuration, read once from the environment.

use chrono::{Duration, FixedOffset};

/// Default secrets are only acceptable outside production.
pub const DEV_ACCESS_SECRET: &str = "dev-access-secret";
pub const DEV_REFRESH_SECRET: &str = "dev-refresh-secret";

lazy_static::lazy_static! {
    pub static ref CONFIG: AppConfig = AppConfig::from_env();
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: String,
    pub client_urls: Vec<String>,
    pub jwt: JwtConfig,
    pub cookie_domain: Option<String>,
    pub site_offset: FixedOffset,
    pub upload_dir: String,
    pub comments_require_approval: bool,
    pub cron_secret: Option<String>,
    pub daily_marker: bool,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let shared_secret = var("JWT_SECRET");

        let client_urls = var("ALLOWED_ORIGINS")
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty())
            .or_else(|| var("CLIENT_URL").map(|u| vec![u]))
            .unwrap_or_else(|| vec!["http://localhost:5173".to_string()]);

        let site_offset = var("SITE_UTC_OFFSET")
            .and_then(|s| {
                let parsed = parse_utc_offset(&s);
                if parsed.is_none() {
                    tracing::warn!("Invalid SITE_UTC_OFFSET '{}', using +08:00", s);
                }
                parsed
            })
            .unwrap_or_else(default_offset);

        Self {
            environment: var("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            client_urls,
            jwt: JwtConfig {
                access_secret: var("JWT_ACCESS_SECRET")
                    .or_else(|| shared_secret.clone())
                    .unwrap_or_else(|| DEV_ACCESS_SECRET.to_string()),
                refresh_secret: var("JWT_REFRESH_SECRET")
                    .or(shared_secret)
                    .unwrap_or_else(|| DEV_REFRESH_SECRET.to_string()),
                access_ttl: duration_var("JWT_ACCESS_EXPIRES", Duration::minutes(15)),
                refresh_ttl: duration_var("JWT_REFRESH_EXPIRES", Duration::days(7)),
            },
            cookie_domain: var("COOKIE_DOMAIN"),
            site_offset,
            upload_dir: var("UPLOAD_DIR").unwrap_or_else(|| "uploads".to_string()),
            comments_require_approval: flag("COMMENTS_REQUIRE_APPROVAL", false),
            cron_secret: var("CRON_SECRET"),
            daily_marker: flag("DAILY_MARKER", true),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// True while either signing key is still a built-in development default.
    pub fn uses_default_secrets(&self) -> bool {
        self.jwt.access_secret == DEV_ACCESS_SECRET
            || self.jwt.refresh_secret == DEV_REFRESH_SECRET
    }
}

/// Non-empty environment variable.
fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn flag(key: &str, default: bool) -> bool {
    match var(key).map(|v| v.to_ascii_lowercase()) {
        Some(v) => matches!(v.as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

fn duration_var(key: &str, default: Duration) -> Duration {
    match var(key) {
        Some(raw) => parse_duration(&raw).unwrap_or_else(|| {
            tracing::warn!("Invalid {} value '{}', using default", key, raw);
            default
        }),
        None => default,
    }
}

fn default_offset() -> FixedOffset {
    // Asia/Singapore, no DST
    FixedOffset::east_opt(8 * 3600).unwrap()
}

/// Parses lifetimes written as `<n><unit>` with unit `s`, `m`, `h` or `d`.
/// A bare number is taken as seconds. Out-of-range values are rejected.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(raw.len());
    let (digits, unit) = raw.split_at(split);
    let n: i64 = digits.parse().ok()?;
    if n <= 0 {
        return None;
    }
    match unit {
        "" | "s" => Duration::try_seconds(n),
        "m" => Duration::try_minutes(n),
        "h" => Duration::try_hours(n),
        "d" => Duration::try_days(n),
        _ => None,
    }
}

/// Parses `+HH:MM`, `-HH:MM`, `+HH` or `UTC`.
pub fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("utc") || raw == "Z" {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };
    let (hours, minutes) = match rest.split_once(':') {
        Some((h, m)) => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        None => (rest.parse::<i32>().ok()?, 0),
    };
    if hours > 14 || minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("15m"), Some(Duration::minutes(15)));
        assert_eq!(parse_duration("7d"), Some(Duration::days(7)));
        assert_eq!(parse_duration("12h"), Some(Duration::hours(12)));
        assert_eq!(parse_duration("3600"), Some(Duration::seconds(3600)));
        assert_eq!(parse_duration("3600s"), Some(Duration::seconds(3600)));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("0m"), None);
        assert_eq!(parse_duration("10w"), None);
        assert_eq!(parse_duration("m"), None);
    }

    #[test]
    fn test_parse_duration_rejects_out_of_range() {
        assert_eq!(parse_duration("999999999999d"), None);
        assert_eq!(parse_duration("9223372036854775807s"), None);
        assert_eq!(parse_duration("99999999999999999999h"), None);
        assert_eq!(parse_duration("36500d"), Some(Duration::days(36500)));
    }

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("+08:00"), FixedOffset::east_opt(8 * 3600));
        assert_eq!(parse_utc_offset("-05:30"), FixedOffset::west_opt(5 * 3600 + 1800));
        assert_eq!(parse_utc_offset("+9"), FixedOffset::east_opt(9 * 3600));
        assert_eq!(parse_utc_offset("UTC"), FixedOffset::east_opt(0));
        assert_eq!(parse_utc_offset("Asia/Singapore"), None);
        assert_eq!(parse_utc_offset("+25:00"), None);
    }

    #[test]
    fn test_default_config_is_development() {
        let config = AppConfig::from_env();
        assert!(!config.client_urls.is_empty());
        assert!(config.jwt.access_ttl < config.jwt.refresh_ttl);
        assert!(!config.upload_dir.is_empty());
    }
}
