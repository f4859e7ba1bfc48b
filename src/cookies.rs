//! Minimal cookie handling: reading the `Cookie` header and building
//! `Set-Cookie` values for the session and visitor cookies.

use axum::http::{header, HeaderMap};

use crate::config::CONFIG;

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";
pub const ANON_COOKIE: &str = "anon_id";

/// Value of the named cookie, if the request carries it.
pub fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.trim_matches('"').to_string())
        .filter(|v| !v.is_empty())
}

/// `Set-Cookie` value with the site's attributes: HttpOnly, SameSite=Lax,
/// Path=/, plus Secure in production and Domain when configured.
pub fn build_cookie(name: &str, value: &str, max_age_secs: i64) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        name,
        value,
        max_age_secs.max(0)
    );
    if CONFIG.is_production() {
        cookie.push_str("; Secure");
    }
    if let Some(domain) = &CONFIG.cookie_domain {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    cookie
}

/// Expires the named cookie immediately.
pub fn clear_cookie(name: &str) -> String {
    build_cookie(name, "", 0)
}
