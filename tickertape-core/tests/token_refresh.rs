//! Integration tests for token refresh through the API client.
//!
//! These tests verify that the client:
//! - Refreshes before the first call and derives the expiry from `expires_in`
//! - Makes no token request while the cached token is still valid
//! - Refreshes again once the clock passes the expiry
//! - Keeps polling with the stale token when a refresh fails

use tickertape_core::transport::http_response;
use tickertape_core::{
    ClientConfig, Credentials, ManualClock, MemoryTransport, SpotifyClient, TokenState,
};

const TOKEN_OK: &str = r#"{"access_token":"AAA","token_type":"Bearer","expires_in":3600}"#;
const TOKEN_OK_2: &str = r#"{"access_token":"BBB","token_type":"Bearer","expires_in":3600}"#;

fn client(transport: MemoryTransport, clock: &ManualClock) -> SpotifyClient<MemoryTransport, ManualClock> {
    SpotifyClient::with_clock(
        transport,
        Credentials::new("client-id", "client-secret", "refresh-token"),
        ClientConfig::default(),
        clock.clone(),
    )
}

#[test]
fn test_first_poll_refreshes_token() {
    let clock = ManualClock::starting_at(50_000);
    let transport = MemoryTransport::new()
        .with_response(http_response(200, TOKEN_OK))
        .with_response(http_response(204, ""));
    let mut client = client(transport, &clock);

    let snapshot = client.currently_playing(None);
    assert!(!snapshot.error);

    assert_eq!(client.tokens().expires_at_ms(), Some(50_000 + 3_600_000 - 2000));

    let requests = client.transport().requests();
    assert_eq!(requests.len(), 2);

    let token_request = client.transport().request_text(0).unwrap();
    assert!(token_request.starts_with("POST /api/token HTTP/1.1\r\n"));

    let poll = client.transport().request_text(1).unwrap();
    assert!(poll.contains("Authorization: Bearer AAA\r\n"));

    assert_eq!(
        client.transport().connections(),
        &[
            ("accounts.spotify.com".to_string(), 443),
            ("api.spotify.com".to_string(), 443),
        ]
    );
}

#[test]
fn test_no_network_call_before_expiry() {
    let clock = ManualClock::starting_at(0);
    let mut transport = MemoryTransport::new().with_response(http_response(200, TOKEN_OK));
    for _ in 0..3 {
        transport.push_response(http_response(204, ""));
    }
    let mut client = client(transport, &clock);

    assert!(client.ensure_valid_token());
    assert_eq!(client.transport().requests().len(), 1);

    clock.set(3_600_000 - 2000 - 1);
    assert!(client.ensure_valid_token());
    assert_eq!(client.tokens().state(), TokenState::Valid);
    assert_eq!(client.transport().requests().len(), 1);

    for _ in 0..3 {
        client.currently_playing(None);
    }
    let token_requests = client
        .transport()
        .requests()
        .iter()
        .filter(|r| r.starts_with(b"POST /api/token"))
        .count();
    assert_eq!(token_requests, 1);
}

#[test]
fn test_refresh_after_expiry() {
    let clock = ManualClock::starting_at(0);
    let transport = MemoryTransport::new()
        .with_response(http_response(200, TOKEN_OK))
        .with_response(http_response(200, TOKEN_OK_2))
        .with_response(http_response(204, ""));
    let mut client = client(transport, &clock);

    assert!(client.ensure_valid_token());
    clock.set(3_598_000);
    assert_eq!(client.tokens().state(), TokenState::Expiring);

    client.pause("");
    assert_eq!(client.tokens().expires_at_ms(), Some(3_598_000 + 3_598_000));

    let command = client.transport().last_request_text().unwrap();
    assert!(command.starts_with("PUT /v1/me/player/pause HTTP/1.1\r\n"));
    assert!(command.contains("Authorization: Bearer BBB\r\n"));
}

#[test]
fn test_failed_refresh_keeps_stale_token() {
    let clock = ManualClock::starting_at(0);
    let transport = MemoryTransport::new()
        .with_response(http_response(200, TOKEN_OK))
        .with_response(http_response(400, r#"{"error":"invalid_grant"}"#))
        .with_response(http_response(401, r#"{"error":{"status":401,"message":"The access token expired"}}"#));
    let mut client = client(transport, &clock);

    assert!(client.ensure_valid_token());
    clock.advance(4_000_000);

    let snapshot = client.currently_playing(None);
    assert!(snapshot.error);
    assert_eq!(snapshot.status_code, Some(401));

    let poll = client.transport().last_request_text().unwrap();
    assert!(poll.contains("Authorization: Bearer AAA\r\n"));
}

#[test]
fn test_auto_refresh_disabled() {
    let clock = ManualClock::starting_at(0);
    let transport = MemoryTransport::new().with_response(http_response(204, ""));
    let config = ClientConfig {
        auto_token_refresh: false,
        ..ClientConfig::default()
    };
    let mut client = SpotifyClient::with_clock(
        transport,
        Credentials::new("client-id", "client-secret", "refresh-token"),
        config,
        clock,
    );

    client.currently_playing(None);
    assert_eq!(client.transport().requests().len(), 1);

    let poll = client.transport().last_request_text().unwrap();
    assert!(!poll.contains("Authorization:"));
}

#[test]
fn test_exchange_then_refresh_uses_new_refresh_token() {
    let clock = ManualClock::starting_at(0);
    let transport = MemoryTransport::new()
        .with_response(http_response(
            200,
            r#"{"access_token":"AAA","expires_in":3600,"refresh_token":"fresh-refresh"}"#,
        ))
        .with_response(http_response(200, TOKEN_OK_2));
    let mut client = client(transport, &clock);

    let refresh = client.exchange_authorization_code("auth-code", "http://127.0.0.1:8888/callback");
    assert_eq!(refresh, "fresh-refresh");

    assert!(client.refresh_access_token());
    let refresh_request = client.transport().last_request_text().unwrap();
    assert!(refresh_request.contains("refresh_token=fresh-refresh"));
}
