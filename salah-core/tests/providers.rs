use std::{net::TcpListener, time::Duration};

use chrono::{Days, NaiveDate};
use salah_core::{
    FetchError, Location, PrayerProvider, PrayerService, PrayerSource,
    cache::CacheStore,
    provider::{
        RetryPolicy,
        aladhan::AladhanProvider,
        diyanet::{DiyanetProvider, regional_today},
    },
};
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path, path_regex, query_param},
};

// ============================================================================
// Helper Functions
// ============================================================================

fn istanbul() -> Location {
    Location::new("Istanbul", "Türkiye", "TR", 41.0082, 28.9784).with_diyanet_ilce_id("9541")
}

fn berlin() -> Location {
    Location::new("Berlin", "Germany", "DE", 52.52, 13.405)
}

fn diyanet_day(date: NaiveDate, fajr: &str) -> Value {
    json!({
        "MiladiTarihKisa": date.format("%d.%m.%Y").to_string(),
        "HicriTarihKisa": "1.1.1448",
        "Imsak": fajr,
        "Gunes": "07:48",
        "Ogle": "13:23",
        "Ikindi": "16:19",
        "Aksam": "18:48",
        "Yatsi": "20:08"
    })
}

fn diyanet_schedule() -> Value {
    let today = regional_today();
    let tomorrow = today.checked_add_days(Days::new(1)).expect("valid date");
    json!([diyanet_day(today, "6:22"), diyanet_day(tomorrow, "06:21")])
}

fn aladhan_body(fajr: &str) -> Value {
    json!({
        "code": 200,
        "status": "OK",
        "data": {
            "timings": {
                "Fajr": format!("{fajr} (CET)"),
                "Sunrise": "07:45 (CET)",
                "Dhuhr": "12:59 (CET)",
                "Asr": "15:40 (CET)",
                "Sunset": "18:12 (CET)",
                "Maghrib": "18:12 (CET)",
                "Isha": "19:55 (CET)"
            },
            "meta": { "timezone": "Europe/Berlin" }
        }
    })
}

fn diyanet(server: &MockServer) -> DiyanetProvider {
    DiyanetProvider::with_base_url(format!("{}/vakitler", server.uri()), RetryPolicy::immediate())
}

fn aladhan(server: &MockServer) -> AladhanProvider {
    AladhanProvider::with_base_url(server.uri(), RetryPolicy::immediate())
}

// ============================================================================
// Diyanet Provider Tests
// ============================================================================

#[tokio::test]
async fn test_diyanet_parses_today_and_tomorrow() {
    let server = MockServer::start().await;

    let body = format!("\u{feff}{}", diyanet_schedule());
    Mock::given(method("GET"))
        .and(path("/vakitler/9541"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .expect(2)
        .mount(&server)
        .await;

    let day = diyanet(&server).fetch_day(&istanbul()).await.expect("schedule parses");

    assert_eq!(day.times.fajr, "06:22");
    assert_eq!(day.times.isha, "20:08");
    assert_eq!(day.tomorrow_fajr, "06:21");
    assert_eq!(day.time_zone.as_deref(), Some("Europe/Istanbul"));
}

#[tokio::test]
async fn test_diyanet_resolves_district_from_builtin_table() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/vakitler/9206"))
        .respond_with(ResponseTemplate::new(200).set_body_json(diyanet_schedule()))
        .mount(&server)
        .await;

    let ankara = Location::new("Çankaya", "Türkiye", "TR", 39.90, 32.86);
    let day = diyanet(&server).fetch_day(&ankara).await.expect("schedule parses");

    assert_eq!(day.times.dhuhr, "13:23");
}

#[tokio::test]
async fn test_diyanet_without_district_is_unresolvable() {
    let server = MockServer::start().await;

    let err = diyanet(&server).fetch_day(&berlin()).await.unwrap_err();
    assert!(matches!(err, FetchError::UnresolvableLocation(_)));
}

#[tokio::test]
async fn test_diyanet_missing_day_is_an_error() {
    let server = MockServer::start().await;

    let old = NaiveDate::from_ymd_opt(2000, 1, 1).expect("valid date");
    Mock::given(method("GET"))
        .and(path("/vakitler/9541"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([diyanet_day(old, "06:00")])))
        .mount(&server)
        .await;

    let err = diyanet(&server).fetch_day(&istanbul()).await.unwrap_err();
    assert!(matches!(err, FetchError::PermanentUpstream(ref m) if m.contains("today")));
}

#[tokio::test]
async fn test_diyanet_missing_tomorrow_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/vakitler/9541"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([diyanet_day(regional_today(), "06:22")])))
        .expect(2)
        .mount(&server)
        .await;

    let err = diyanet(&server).fetch_day(&istanbul()).await.unwrap_err();
    assert!(matches!(err, FetchError::PermanentUpstream(ref m) if m.contains("tomorrow")));
}

#[tokio::test]
async fn test_diyanet_bad_field_names_the_field() {
    let server = MockServer::start().await;

    let mut schedule = diyanet_schedule();
    schedule[0]["Ikindi"] = json!("ikindi vakti");
    Mock::given(method("GET"))
        .and(path("/vakitler/9541"))
        .respond_with(ResponseTemplate::new(200).set_body_json(schedule))
        .mount(&server)
        .await;

    let err = diyanet(&server).fetch_day(&istanbul()).await.unwrap_err();
    assert_eq!(err, FetchError::DataIntegrity("Invalid time format for Ikindi".to_string()));
}

#[tokio::test]
async fn test_diyanet_non_list_payload_is_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/vakitler/9541"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "error": "nope" })))
        .mount(&server)
        .await;

    let err = diyanet(&server).fetch_day(&istanbul()).await.unwrap_err();
    assert!(matches!(err, FetchError::PermanentUpstream(_)));
}

// ============================================================================
// Retry Contract Tests
// ============================================================================

#[tokio::test]
async fn test_server_errors_are_retried_three_times() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/vakitler/9541"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(3)
        .mount(&server)
        .await;

    let err = diyanet(&server).fetch_day(&istanbul()).await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_server_error_then_success_recovers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/vakitler/9541"))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/vakitler/9541"))
        .respond_with(ResponseTemplate::new(200).set_body_json(diyanet_schedule()))
        .mount(&server)
        .await;

    let day = diyanet(&server).fetch_day(&istanbul()).await.expect("recovers after retries");
    assert_eq!(day.tomorrow_fajr, "06:21");
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/vakitler/9541"))
        .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
        .expect(1)
        .mount(&server)
        .await;

    let err = diyanet(&server).fetch_day(&istanbul()).await.unwrap_err();
    assert!(matches!(err, FetchError::PermanentUpstream(_)));
}

#[tokio::test]
async fn test_connection_refused_is_transient() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
        listener.local_addr().expect("local addr").port()
    };

    let provider =
        DiyanetProvider::with_base_url(format!("http://127.0.0.1:{port}/vakitler"), RetryPolicy::immediate());
    let err = provider.fetch_day(&istanbul()).await.unwrap_err();

    assert!(err.is_transient());
    assert!(err.to_string().starts_with("Failed to fetch prayer times from Diyanet"));
}

#[tokio::test]
async fn test_timeouts_are_retried_three_times() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/vakitler/9541"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(diyanet_schedule())
                .set_delay(Duration::from_millis(500)),
        )
        .expect(3)
        .mount(&server)
        .await;

    let provider = diyanet(&server).with_timeout(Duration::from_millis(50));
    let err = provider.fetch_day(&istanbul()).await.unwrap_err();

    assert!(err.is_transient());
    assert_eq!(server.received_requests().await.map(|r| r.len()), Some(3));
}

#[tokio::test]
async fn test_malformed_json_is_not_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/vakitler/9541"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let err = diyanet(&server).fetch_day(&istanbul()).await.unwrap_err();
    assert!(matches!(err, FetchError::PermanentUpstream(_)));
}

// ============================================================================
// AlAdhan Provider Tests
// ============================================================================

#[tokio::test]
async fn test_aladhan_parses_timings_and_zone() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/timings/\d+$"))
        .and(query_param("latitude", "52.52"))
        .and(query_param("longitude", "13.405"))
        .and(query_param("method", "3"))
        .and(query_param("school", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(aladhan_body("5:58")))
        .expect(2)
        .mount(&server)
        .await;

    let day = aladhan(&server).fetch_day(&berlin()).await.expect("timings parse");

    assert_eq!(day.times.fajr, "05:58");
    assert_eq!(day.times.maghrib, "18:12");
    assert_eq!(day.tomorrow_fajr, "05:58");
    assert_eq!(day.time_zone.as_deref(), Some("Europe/Berlin"));
}

#[tokio::test]
async fn test_aladhan_missing_timings_object_is_rejected() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path_regex(r"^/timings/\d+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "timings": "n/a" } })))
        .mount(&server)
        .await;

    let err = aladhan(&server).fetch_day(&berlin()).await.unwrap_err();
    assert!(matches!(err, FetchError::PermanentUpstream(_)));
}

#[tokio::test]
async fn test_aladhan_non_string_field_is_data_error() {
    let server = MockServer::start().await;

    let mut body = aladhan_body("05:58");
    body["data"]["timings"]["Asr"] = json!(1540);
    Mock::given(method("GET"))
        .and(path_regex(r"^/timings/\d+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let err = aladhan(&server).fetch_day(&berlin()).await.unwrap_err();
    assert_eq!(err, FetchError::DataIntegrity("Missing time field: Asr".to_string()));
}

// ============================================================================
// Orchestrator Tests (real adapters against a mock server)
// ============================================================================

#[tokio::test]
async fn test_service_caches_and_falls_back_when_upstream_dies() {
    let server = MockServer::start().await;
    let dir = TempDir::new().expect("tempdir");
    let cache_path = dir.path().join("prayer_cache.json");

    Mock::given(method("GET"))
        .and(path_regex(r"^/timings/\d+$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(aladhan_body("05:58")))
        .expect(2)
        .mount(&server)
        .await;

    let service = PrayerService::new(
        CacheStore::new(&cache_path),
        Box::new(diyanet(&server)),
        Box::new(aladhan(&server)),
    );

    // Berlin cannot use Diyanet, so the request is served by AlAdhan.
    let fetched = service.fetch_bundle(&berlin(), PrayerSource::Diyanet).await.expect("fetched");
    assert_eq!(fetched.resolved_source, PrayerSource::Mwl);
    assert_eq!(fetched.time_zone.as_deref(), Some("Europe/Berlin"));

    // Second call is served from the fresh cache.
    let cached = service.fetch_bundle(&berlin(), PrayerSource::Mwl).await.expect("cached");
    assert_eq!(cached.times, fetched.times);
    let received = server.received_requests().await.expect("request recording enabled");
    assert_eq!(received.len(), 2);

    // Age the entry, then take the upstream down.
    let mut raw: Value = serde_json::from_str(&std::fs::read_to_string(&cache_path).expect("cache written"))
        .expect("cache is JSON");
    for entry in raw.as_object_mut().expect("object").values_mut() {
        entry["date"] = json!("2000-01-01");
    }
    std::fs::write(&cache_path, raw.to_string()).expect("rewrite cache");

    server.reset().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let stale = service.fetch_bundle(&berlin(), PrayerSource::Mwl).await.expect("stale fallback");
    assert_eq!(stale.times, fetched.times);
    assert_eq!(stale.tomorrow_fajr, "05:58");
}
