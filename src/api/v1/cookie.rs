use crate::domain_model::FamilyId;
use std::time::Duration;

pub const REFRESH_COOKIE: &str = "refresh_token_id";

/// `Set-Cookie` value carrying the refresh family id. Lives as long as the
/// session record behind it.
pub fn refresh_cookie(family_id: &FamilyId, max_age: Duration, secure: bool) -> String {
    build(&family_id.to_string(), max_age.as_secs() as i64, secure)
}

/// Expires the refresh cookie in the browser.
pub fn cleared_refresh_cookie(secure: bool) -> String {
    build("", -1, secure)
}

fn build(value: &str, max_age: i64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Max-Age={}; Path=/; HttpOnly",
        REFRESH_COOKIE, value, max_age
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_cookie_attributes() {
        let fid = FamilyId::generate();
        let cookie = refresh_cookie(&fid, Duration::from_secs(7 * 24 * 3600), true);
        assert_eq!(
            cookie,
            format!("refresh_token_id={}; Max-Age=604800; Path=/; HttpOnly; Secure", fid)
        );
    }

    #[test]
    fn cleared_cookie_expires_immediately() {
        let cookie = cleared_refresh_cookie(true);
        assert!(cookie.starts_with("refresh_token_id=;"));
        assert!(cookie.contains("Max-Age=-1"));
    }

    #[test]
    fn insecure_cookie_for_plain_http() {
        assert!(!cleared_refresh_cookie(false).contains("Secure"));
    }
}
