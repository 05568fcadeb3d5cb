use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::time::Duration;
use url::Url;

pub(crate) fn retriable_status(code: u16) -> bool {
    matches!(code, 500 | 502 | 503 | 504 | 429 | 408)
}

/// First polling interval: one second, or less if `max` is smaller.
pub(crate) fn initial_sleep(max: Duration) -> Duration {
    Duration::from_secs(1).min(max)
}

pub(crate) fn backoff(current: Duration, max: Duration) -> Duration {
    Duration::try_from_secs_f64((current.as_secs_f64() * 1.5).max(1.0))
        .map_or(max, |next| next.min(max))
}

/// Delay-seconds form of `Retry-After`; HTTP-date values are ignored.
///
/// Delays too large for a [`Duration`] saturate; callers cap them with `sleep_max`.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|s| !s.is_nan() && *s >= 0.0)
        .map(|s| Duration::try_from_secs_f64(s).unwrap_or(Duration::MAX))
}

pub(crate) fn guess_filename_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().and_then(|s| {
        if s.is_empty() {
            None
        } else {
            Some(s.to_string())
        }
    })
}

/// Resolves `href` against `base` the way a browser would (`./x` replaces the last segment).
pub(crate) fn urljoin(base: &str, href: &str) -> String {
    match Url::parse(base).and_then(|b| b.join(href)) {
        Ok(u) => u.to_string(),
        Err(_) => href.to_string(),
    }
}

/// Appends `segment` to the path of `base`, percent-encoding it (`/` included).
pub(crate) fn push_segment(base: &str, segment: &str) -> String {
    let Ok(mut url) = Url::parse(base) else {
        return format!("{}/{}", base.trim_end_matches('/'), segment);
    };
    match url.path_segments_mut() {
        Ok(mut segments) => {
            segments.pop_if_empty().push(segment);
        }
        Err(()) => return format!("{}/{}", base.trim_end_matches('/'), segment),
    }
    url.to_string()
}

/// Parses RFC 3339 timestamps, and naive ones (no offset) as UTC.
pub(crate) fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(d) = DateTime::parse_from_rfc3339(raw) {
        return Some(d.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|d| d.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn backoff_grows_and_caps() {
        let max = Duration::from_secs(10);
        let mut d = initial_sleep(max);
        assert_eq!(d, Duration::from_secs(1));
        d = backoff(d, max);
        assert_eq!(d, Duration::from_millis(1500));
        for _ in 0..20 {
            d = backoff(d, max);
        }
        assert_eq!(d, max);
    }

    #[test]
    fn small_sleep_max_caps_first_interval() {
        let max = Duration::from_millis(5);
        assert_eq!(initial_sleep(max), max);
        assert_eq!(backoff(max, max), max);
    }

    #[test]
    fn retry_after_reads_seconds_only() {
        let mut h = HeaderMap::new();
        assert_eq!(retry_after(&h), None);
        h.insert(RETRY_AFTER, HeaderValue::from_static("3"));
        assert_eq!(retry_after(&h), Some(Duration::from_secs(3)));
        h.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&h), None);
        h.insert(RETRY_AFTER, HeaderValue::from_static("-1"));
        assert_eq!(retry_after(&h), None);
    }

    #[test]
    fn huge_retry_after_saturates() {
        let mut h = HeaderMap::new();
        h.insert(RETRY_AFTER, HeaderValue::from_static("1e20"));
        assert_eq!(retry_after(&h), Some(Duration::MAX));
        h.insert(RETRY_AFTER, HeaderValue::from_static("inf"));
        assert_eq!(retry_after(&h), Some(Duration::MAX));
        assert_eq!(
            retry_after(&h).unwrap().min(Duration::from_millis(20)),
            Duration::from_millis(20)
        );
    }

    #[test]
    fn retriable_statuses() {
        assert!(retriable_status(503));
        assert!(retriable_status(429));
        assert!(!retriable_status(404));
        assert!(!retriable_status(401));
    }

    #[test]
    fn filename_from_url_ignores_query() {
        assert_eq!(
            guess_filename_from_url("https://host/cache/abc.grib?token=1").as_deref(),
            Some("abc.grib")
        );
        assert_eq!(guess_filename_from_url("https://host/cache/"), None);
    }

    #[test]
    fn parses_naive_and_offset_datetimes() {
        let naive = parse_datetime("2022-09-02T17:30:48.201213").unwrap();
        assert_eq!(naive.to_rfc3339(), "2022-09-02T17:30:48.201213+00:00");
        let zoned = parse_datetime("1959-01-01T00:00:00Z").unwrap();
        assert_eq!(zoned.to_rfc3339(), "1959-01-01T00:00:00+00:00");
        assert!(parse_datetime("yesterday").is_none());
    }

    #[test]
    fn ids_are_percent_encoded_as_one_segment() {
        let jobs = "http://localhost:8080/api/retrieve/v1/jobs";
        assert_eq!(
            push_segment(jobs, "9bfc1362-2832"),
            "http://localhost:8080/api/retrieve/v1/jobs/9bfc1362-2832"
        );
        assert_eq!(
            push_segment(jobs, "a b/../c?d"),
            "http://localhost:8080/api/retrieve/v1/jobs/a%20b%2F..%2Fc%3Fd"
        );
        assert_eq!(
            push_segment("http://localhost:8080/api/", "x"),
            "http://localhost:8080/api/x"
        );
    }

    #[test]
    fn urljoin_resolves_relative_asset_hrefs() {
        let results = "http://localhost:8080/api/retrieve/v1/jobs/9bfc/results";
        assert_eq!(
            urljoin(results, "./e7d452.nc"),
            "http://localhost:8080/api/retrieve/v1/jobs/9bfc/e7d452.nc"
        );
        assert_eq!(
            urljoin(results, "https://cache.example/e7d452.nc"),
            "https://cache.example/e7d452.nc"
        );
    }
}
